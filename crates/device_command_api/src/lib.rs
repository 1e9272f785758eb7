pub mod device_command_api;
pub mod domain;
pub mod http;

pub use device_command_api::*;
pub use domain::*;
pub use http::*;
