pub mod task;
pub mod task_analyser;

#[cfg(test)]
mod test_task_analyser;
