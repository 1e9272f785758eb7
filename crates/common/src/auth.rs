mod authorization_service;
mod config;
mod context;
mod jwt;
mod traits;

pub use authorization_service::*;
pub use config::*;
pub use context::*;
pub use jwt::*;
pub use traits::*;
