mod acknowledgement_notifier;
mod client;
mod trace_context;
mod traits;

pub use acknowledgement_notifier::*;
pub use client::*;
pub use trace_context::*;
pub use traits::*;
