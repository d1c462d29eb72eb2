pub mod capture;
pub mod configuration;
pub mod encoder;
pub mod error_handling;
pub mod server;
pub mod session_management;
