pub mod application_dto;
pub mod runtime_config_dto;
