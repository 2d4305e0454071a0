use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use std::fs;
use std::sync::Once;

use crate::api::runtime_config_dto::LoggingConfigDto;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "runtime.log";

static INIT: Once = Once::new();

/// Initializes the global logger with the defaults: console plus `logs/runtime.log`.
///
/// Log level is controlled by the `RUST_LOG` environment variable.
/// Example: `RUST_LOG=debug cargo run -- --config runtime.json --app app.json`
///
/// If `RUST_LOG` is not set, it defaults to `info`.
pub fn init() {
    init_with(&LoggingConfigDto::default());
}

/// Initializes the global logger from the logging section of the runtime configuration.
///
/// Only the first call installs a dispatcher; later calls are ignored, so tests and
/// the binary may both call it freely.
pub fn init_with(config: &LoggingConfigDto) {
    INIT.call_once(|| apply(config));
}

fn apply(config: &LoggingConfigDto) {
    // RUST_LOG wins over the configured level so a run can be debugged without editing the config.
    let log_level = std::env::var("RUST_LOG").ok().or_else(|| config.level.clone()).unwrap_or_else(|| "info".to_string());
    let log_level_filter = log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);

    let mut base_config = Dispatch::new()
        .level(log_level_filter)
        .level_for("actix", LevelFilter::Warn)
        .level_for("actix_rt", LevelFilter::Warn)
        .level_for("mio", LevelFilter::Warn);

    let console_config = Dispatch::new()
        .format(|out, message, record| {
            let colors = fern::colors::ColoredLevelConfig::new()
                .error(fern::colors::Color::Red)
                .warn(fern::colors::Color::Yellow)
                .info(fern::colors::Color::Green)
                .debug(fern::colors::Color::Blue)
                .trace(fern::colors::Color::BrightBlack);

            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    base_config = base_config.chain(console_config);

    let mut log_file_path = None;
    if config.log_to_file {
        let log_dir = config.log_dir.clone().unwrap_or_else(|| LOG_DIR.to_string());
        let path = format!("{}/{}", log_dir, LOG_FILE);

        match fs::create_dir_all(&log_dir).and_then(|_| fern::log_file(&path)) {
            Ok(file) => {
                let file_config = Dispatch::new()
                    .format(|out, message, record| {
                        out.finish(format_args!(
                            "[{} {} {}] {}",
                            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                            record.level(),
                            record.target(),
                            message
                        ))
                    })
                    .chain(file);
                base_config = base_config.chain(file_config);
                log_file_path = Some(path);
            }
            Err(e) => eprintln!("Failed to open log file '{}': {}", path, e),
        }
    }

    if let Err(e) = base_config.apply() {
        eprintln!("Failed to apply logger configuration: {}", e);
        return;
    }

    match log_file_path {
        Some(path) => log::info!("Logger initialized. Logging to console and '{}'.", path),
        None => log::info!("Logger initialized. Logging to console only."),
    }
}
