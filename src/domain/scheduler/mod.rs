pub mod action;
pub mod action_arena;
pub mod gap;
pub mod optimization;
pub mod resource_scheduler;
pub mod score;
pub mod task_scheduler;

#[cfg(test)]
mod test_action_arena;
#[cfg(test)]
mod test_resource_scheduler;
