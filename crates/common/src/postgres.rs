mod account_repository;
mod client;
mod command_log_repository;
mod config;

pub use account_repository::*;
pub use client::*;
pub use command_log_repository::*;
pub use config::*;
