mod acknowledgement_service;
mod command_dispatch_service;
mod command_log_service;

#[cfg(test)]
mod test_support;

pub use acknowledgement_service::*;
pub use command_dispatch_service::*;
pub use command_log_service::*;
