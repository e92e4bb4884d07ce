use std::sync::Once;

use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

/// Config file looked up relative to the working directory.
pub const LOGGING_CONFIG_FILE: &str = "logging_config.yaml";

static LOGGER_INIT: Once = Once::new();

/// Initializes the `log4rs` logger from `logging_config.yaml`, or a plain
/// console logger at `Info` level if the file cannot be loaded. Only the
/// first call has an effect.
pub fn init() {
    LOGGER_INIT.call_once(|| {
        match log4rs::init_file(LOGGING_CONFIG_FILE, Default::default()) {
            Ok(_) => {
                log::info!(
                    "aggcore logging initialized from {}",
                    LOGGING_CONFIG_FILE
                );
            }
            Err(e) => {
                // No logger yet, stderr is all we have.
                eprintln!(
                    "ERROR: Failed to initialize logger from {}: {}",
                    LOGGING_CONFIG_FILE, e
                );
                init_console_fallback();
            }
        }
    });
}

fn init_console_fallback() {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)(utc)} {l} {t} - {m}{n}",
        )))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(
            Root::builder()
                .appender("stdout")
                .build(log::LevelFilter::Info),
        );

    match config {
        Ok(config) => match log4rs::init_config(config) {
            Ok(_) => log::warn!("aggcore logging using console fallback"),
            Err(e) => eprintln!(
                "ERROR: Failed to initialize fallback logger: {}. \
                 No logging will be available.",
                e
            ),
        },
        Err(e) => eprintln!(
            "ERROR: Failed to build fallback logging configuration: {}",
            e
        ),
    }
}
