pub mod access;
pub mod data_info;
pub mod data_registry;

#[cfg(test)]
mod test_data_registry;
