pub mod check_config;
pub mod fetch;
pub mod status;
