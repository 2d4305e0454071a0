#![allow(dead_code)]

use std::sync::Arc;

use task_runtime::api::runtime_config_dto::RuntimeConfigDto;
use task_runtime::domain::clock::clock_mock::MockClock;
use task_runtime::domain::data::access::{AccessMode, DataReference};
use task_runtime::domain::runtime::executor::RecordingExecutor;
use task_runtime::domain::runtime::requests::TaskCall;
use task_runtime::domain::runtime::runtime::Runtime;
use task_runtime::domain::task::task::Parameter;
use task_runtime::domain::utils::id::AppId;
use task_runtime::loader::parser::parse_json_str;
use task_runtime::logger;

pub const APP: AppId = AppId::new(1);

/// One worker with two units; `produce`, `consume` and `update` each take one unit for 10 ms.
pub fn config(max_retries: u32) -> RuntimeConfigDto {
    let json = format!(
        r#"{{
            "scheduler": {{ "maxRetries": {}, "optimizationIntervalMs": 0 }},
            "logging": {{ "logToFile": false }},
            "workers": [ {{ "name": "w1", "computingUnits": 2 }} ],
            "coreElements": [
                {{ "signature": "produce", "implementations": [ {{ "computingUnits": 1, "expectedDurationMs": 10 }} ] }},
                {{ "signature": "consume", "implementations": [ {{ "computingUnits": 1, "expectedDurationMs": 10 }} ] }},
                {{ "signature": "update", "implementations": [ {{ "computingUnits": 1, "expectedDurationMs": 10 }} ] }}
            ]
        }}"#,
        max_retries
    );
    parse_json_str(&json).unwrap()
}

pub struct Harness {
    pub runtime: Runtime,
    pub executor: RecordingExecutor,
    pub clock: MockClock,
}

/// Must be called from within an actix system.
pub fn start(max_retries: u32) -> Harness {
    let config = config(max_retries);
    logger::init_with(&config.logging);

    let executor = RecordingExecutor::new();
    let clock = MockClock::new(0);
    let runtime = Runtime::start(&config, Arc::new(executor.clone()), clock.shared()).unwrap();
    Harness { runtime, executor, clock }
}

impl Harness {
    /// Waits until every request sent so far has been processed.
    pub async fn sync(&self) {
        self.runtime.tasks_state().await.unwrap();
    }

    /// Lets spawned requesters enqueue their request before the test goes on.
    pub async fn settle(&self) {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        self.sync().await;
    }
}

pub fn file(direction: AccessMode, name: &str) -> Parameter {
    Parameter::new(direction, DataReference::File(name.to_string()))
}

pub fn call(signature: &str, parameters: Vec<Parameter>) -> TaskCall {
    TaskCall::new(signature, parameters)
}
