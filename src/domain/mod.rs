pub mod clock;
pub mod data;
pub mod graph;
pub mod resource;
pub mod runtime;
pub mod scheduler;
pub mod task;
pub mod utils;
