use std::sync::Arc;

use crate::api::runtime_config_dto::RuntimeConfigDto;
use crate::domain::clock::clock::SystemClock;
use crate::domain::runtime::executor::JobExecutor;
use crate::domain::runtime::runtime::Runtime;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Reads the runtime configuration and installs the logger it describes.
pub fn load_runtime_config(file_path: &str) -> Result<RuntimeConfigDto> {
    let config: RuntimeConfigDto = parse_json_file::<RuntimeConfigDto>(file_path)?;
    logger::init_with(&config.logging);
    log::info!("Runtime configuration '{}' parsed: {} workers, {} core elements.", file_path, config.workers.len(), config.core_elements.len());
    Ok(config)
}

/// Loads the configuration and starts a runtime on the wall clock. Must be called from within a
/// running actix system.
pub fn start_runtime(file_path: &str, executor: Arc<dyn JobExecutor>) -> Result<Runtime> {
    let config = load_runtime_config(file_path)?;
    let runtime = Runtime::start(&config, executor, SystemClock::shared())?;
    log::info!("Runtime started.");
    Ok(runtime)
}
