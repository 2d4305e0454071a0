pub mod core_element;
pub mod profile;
pub mod resource_description;
pub mod worker;

#[cfg(test)]
mod test_resources;
