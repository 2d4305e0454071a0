use serde::{Deserialize, Serialize};

/// Root of the runtime configuration document.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfigDto {
    #[serde(default)]
    pub scheduler: SchedulerConfigDto,

    #[serde(default)]
    pub logging: LoggingConfigDto,

    pub workers: Vec<WorkerDto>,

    pub core_elements: Vec<CoreElementDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfigDto {
    /// Number of failed execution attempts tolerated before an action fails terminally.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Period of the global timeline optimization, `0` disables the periodic trigger.
    #[serde(default = "default_optimization_interval")]
    pub optimization_interval_ms: u64,

    /// Simulated look-ahead of one local optimization pass. `None` simulates until the queue drains.
    #[serde(default)]
    pub optimization_horizon_ms: Option<i64>,

    #[serde(default = "default_max_donation_rounds")]
    pub max_donation_rounds: u32,
}

fn default_max_retries() -> u32 {
    2
}

fn default_optimization_interval() -> u64 {
    5000
}

fn default_max_donation_rounds() -> u32 {
    16
}

impl Default for SchedulerConfigDto {
    fn default() -> Self {
        SchedulerConfigDto {
            max_retries: default_max_retries(),
            optimization_interval_ms: default_optimization_interval(),
            optimization_horizon_ms: None,
            max_donation_rounds: default_max_donation_rounds(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfigDto {
    pub level: Option<String>,
    pub log_dir: Option<String>,
    #[serde(default = "default_log_to_file")]
    pub log_to_file: bool,
}

fn default_log_to_file() -> bool {
    true
}

impl Default for LoggingConfigDto {
    fn default() -> Self {
        LoggingConfigDto { level: None, log_dir: None, log_to_file: default_log_to_file() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDto {
    pub name: String,
    pub computing_units: i64,
    #[serde(default)]
    pub memory_mb: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CoreElementDto {
    pub signature: String,
    pub implementations: Vec<ImplementationDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationDto {
    #[serde(default = "default_units")]
    pub computing_units: i64,
    #[serde(default)]
    pub memory_mb: i64,
    /// Seed for the execution profile until real executions are observed.
    pub expected_duration_ms: Option<i64>,
}

fn default_units() -> i64 {
    1
}
