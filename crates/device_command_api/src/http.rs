mod auth;
mod handlers;
mod router;

pub use auth::*;
pub use handlers::*;
pub use router::*;
