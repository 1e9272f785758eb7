mod account;
mod command;
mod command_log;
mod notification;
mod push;
mod result;

#[cfg(any(test, feature = "testing"))]
mod in_memory_command_store;

pub use account::*;
pub use command::*;
pub use command_log::*;
pub use notification::*;
pub use push::*;
pub use result::*;

#[cfg(any(test, feature = "testing"))]
pub use in_memory_command_store::InMemoryCommandStore;
