pub mod access_processor;
pub mod executor;
pub mod requests;
pub mod runtime;
