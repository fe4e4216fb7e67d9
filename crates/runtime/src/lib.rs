mod config;
pub mod logging;

pub use config::{
    DEFAULT_BIND_ADDRESS, DEFAULT_CONNECT_ADDRESS, PROGRAM_NAME, default_sink_path,
    sluice_data_dir, xdg_or_home,
};

pub use logging::init;
