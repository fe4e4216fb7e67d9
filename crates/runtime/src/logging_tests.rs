use super::*;
use log::{Level, Metadata, Record};
use serial_test::serial;

#[test]
#[serial]
fn get_level_from_env_parses_cases() {
    let cases: &[(Option<&str>, Level, Level)] = &[
        (None, Level::Warn, Level::Warn),
        (None, Level::Info, Level::Info),
        (Some("debug"), Level::Warn, Level::Debug),
        (Some("DEBUG"), Level::Warn, Level::Debug),
        (Some("info"), Level::Warn, Level::Info),
        (Some("warn"), Level::Info, Level::Warn),
        (Some("error"), Level::Info, Level::Error),
        (Some("TRACE"), Level::Warn, Level::Trace),
        (Some("garbage"), Level::Info, Level::Info),
        (Some("off"), Level::Warn, Level::Warn),
    ];

    for (value, default, expected) in cases {
        match value {
            Some(v) => unsafe { std::env::set_var(PROGRAM_LOG_LEVEL, v) },
            None => unsafe { std::env::remove_var(PROGRAM_LOG_LEVEL) },
        }

        let lvl = get_level_from_env(*default);
        assert_eq!(
            lvl, *expected,
            "env {:?} with default {:?} should yield {:?}, got {:?}",
            value, default, expected, lvl
        );
    }

    unsafe { std::env::remove_var(PROGRAM_LOG_LEVEL) };
}

#[test]
fn enabled_respects_level_threshold() {
    let levels = [
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
        Level::Trace,
    ];

    for logger_level in levels {
        let logger = Logger {
            level: logger_level,
            target: LogTarget::Stderr,
        };

        for record_level in levels {
            let meta = Metadata::builder()
                .level(record_level)
                .target("test_target")
                .build();

            assert_eq!(
                logger.enabled(&meta),
                record_level <= logger_level,
                "logger level {:?}, record level {:?}",
                logger_level,
                record_level
            );
        }
    }
}

#[test]
fn file_target_appends_formatted_lines() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("sluice.log");
    let file = open_log_file(&path).expect("open log file");

    let logger = Logger {
        level: Level::Info,
        target: LogTarget::File(Mutex::new(file)),
    };

    let cases = [
        (Level::Info, "kept"),
        (Level::Debug, "filtered"),
        (Level::Error, "also kept"),
    ];
    for (lvl, msg) in &cases {
        let args = format_args!("{msg}");
        let record = Record::builder()
            .level(*lvl)
            .target("sluice::test")
            .args(args)
            .build();
        logger.log(&record);
    }
    logger.flush();

    let contents = std::fs::read_to_string(&path).expect("read log");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2, "debug record should be filtered: {contents}");
    assert!(lines[0].contains("INFO") && lines[0].contains("[sluice::test] kept"));
    assert!(lines[1].contains("ERROR") && lines[1].ends_with("also kept"));
}

#[test]
#[serial]
fn unwritable_log_file_falls_back_to_stderr() {
    let dir = tempfile::tempdir().expect("temp dir");
    let bogus = dir.path().join("missing").join("nested").join("x.log");
    unsafe { std::env::set_var(PROGRAM_LOG_FILE, &bogus) };

    assert!(matches!(get_target_from_env(), LogTarget::Stderr));

    unsafe { std::env::remove_var(PROGRAM_LOG_FILE) };
    assert!(matches!(get_target_from_env(), LogTarget::Stderr));
}
