use std::path::Path;
use std::sync::Mutex;

pub fn init_logging(log_file_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    if let Some(parent) = log_file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(log_file_path)?;
    let file_writer = std::io::BufWriter::new(file);

    // The terminal belongs to the UI, so everything goes to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file_writer))
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_file(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging initialized to: {}", log_file_path.display());

    Ok(())
}

pub fn log_debug(message: &str) {
    tracing::debug!("{}", message);
}

pub fn log_info(message: &str) {
    tracing::info!("{}", message);
}

pub fn log_warn(message: &str) {
    tracing::warn!("{}", message);
}

pub fn log_error(message: &str) {
    tracing::error!("{}", message);
}

#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        $crate::utils::log_debug(&format!($($arg)*));
    };
}

#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        $crate::utils::log_info(&format!($($arg)*));
    };
}

#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        $crate::utils::log_warn(&format!($($arg)*));
    };
}

#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {
        $crate::utils::log_error(&format!($($arg)*));
    };
}
