use super::*;
use serial_test::serial;

#[test]
#[serial]
fn xdg_or_home_prefers_xdg_var() {
    unsafe { std::env::set_var("SLUICE_TEST_XDG", "/tmp/xdg-test") };
    assert_eq!(
        xdg_or_home("SLUICE_TEST_XDG", ".cache"),
        PathBuf::from("/tmp/xdg-test")
    );
    unsafe { std::env::remove_var("SLUICE_TEST_XDG") };
}

#[test]
#[serial]
fn xdg_or_home_falls_back_to_home_suffix() {
    unsafe { std::env::remove_var("SLUICE_TEST_XDG") };
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    assert_eq!(xdg_or_home("SLUICE_TEST_XDG", ".cache"), home.join(".cache"));
}

#[test]
#[serial]
fn empty_xdg_var_is_ignored() {
    unsafe { std::env::set_var("SLUICE_TEST_XDG", "") };
    let got = xdg_or_home("SLUICE_TEST_XDG", ".cache");
    assert!(got.ends_with(".cache"), "got {}", got.display());
    unsafe { std::env::remove_var("SLUICE_TEST_XDG") };
}

#[test]
#[serial]
fn default_sink_path_uses_xdg_data_home() {
    let prev = std::env::var_os("XDG_DATA_HOME");
    unsafe { std::env::set_var("XDG_DATA_HOME", "/tmp/sluice-data") };

    assert_eq!(
        default_sink_path(),
        PathBuf::from("/tmp/sluice-data/sluice/records.jsonl")
    );

    match prev {
        Some(v) => unsafe { std::env::set_var("XDG_DATA_HOME", v) },
        None => unsafe { std::env::remove_var("XDG_DATA_HOME") },
    }
}

#[test]
#[serial]
fn sluice_data_dir_ends_with_program_name() {
    assert!(sluice_data_dir().ends_with(PROGRAM_NAME));
}
