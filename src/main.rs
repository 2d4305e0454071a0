use bytes::Bytes;
use clap::Parser;
use std::sync::Arc;

use task_runtime::api::application_dto::{ApplicationDto, DataDto};
use task_runtime::domain::data::access::{AccessMode, AccessParams, DataReference};
use task_runtime::domain::runtime::executor::SimulatedExecutor;
use task_runtime::domain::runtime::requests::TaskCall;
use task_runtime::domain::utils::id::AppId;
use task_runtime::loader::parser::parse_json_file;
use task_runtime::start_runtime;

/// Runs an application description on simulated workers.
#[derive(Parser, Debug)]
#[command(name = "task_runtime")]
#[command(version)]
struct Cli {
    /// Runtime configuration: workers, core elements, scheduler and logging settings
    #[arg(short, long)]
    config: String,

    /// Application description: initial data and task calls in program order
    #[arg(short, long)]
    app: String,

    /// Probability that a simulated attempt fails
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Simulated milliseconds per real millisecond
    #[arg(long, default_value_t = 1)]
    speedup: u32,

    /// Writes the task graph in DOT format to this file instead of stdout
    #[arg(long)]
    dot: Option<String>,
}

#[actix_rt::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let executor = SimulatedExecutor { failure_rate: cli.failure_rate, speedup: cli.speedup, ..SimulatedExecutor::default() };
    let runtime = start_runtime(&cli.config, Arc::new(executor))?;

    let app: ApplicationDto = parse_json_file(&cli.app)?;
    let app_id = AppId::new(app.app_id);
    log::info!("Loaded application {} with {} tasks", app_id, app.tasks.len());

    for data in &app.initial_data {
        let reference = DataReference::from_dto(data);
        let access = runtime.register_data_access(AccessParams::new(AccessMode::W, reference.clone())).await?;
        if let (DataDto::Object { .. }, Some(written)) = (data, access.written_instance()) {
            runtime.set_object_version_value(written.renaming(), Bytes::from(format!("initial value of {}", reference)));
        }
        runtime.finish_access(AccessMode::W, reference).await?;
    }

    for call in &app.tasks {
        match runtime.execute_task(app_id, TaskCall::from_dto(call)).await {
            Ok(task_id) => log::debug!("Submitted '{}' as task {}", call.signature, task_id),
            Err(e) => log::error!("Task call '{}' rejected: {}", call.signature, e),
        }
    }

    let dot = runtime.graph_dot().await?;
    match &cli.dot {
        Some(path) => std::fs::write(path, dot)?,
        None => println!("{}", dot),
    }

    if let Err(e) = runtime.barrier(app_id).await {
        log::error!("{}", e);
    }
    let state = runtime.tasks_state().await?;
    println!("{}", serde_json::to_string_pretty(&state)?);

    runtime.end_of_app(app_id).await?;
    runtime.shutdown().await?;
    log::info!("Application {} done", app_id);
    Ok(())
}
