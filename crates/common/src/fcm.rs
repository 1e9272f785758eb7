mod config;
mod sender;
mod token_provider;

pub use config::*;
pub use sender::*;
pub use token_provider::*;
