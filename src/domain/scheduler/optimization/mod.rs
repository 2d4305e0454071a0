pub mod local_optimization_state;
pub mod optimization_worker;
pub mod schedule_optimizer;
pub mod scheduling_event;

#[cfg(test)]
mod test_optimization;
