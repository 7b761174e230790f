//! basecampd — the Basecamp tracker daemon.
//!
//! Exposed as a library so the integration suite can run the dispatcher
//! in-process against an ephemeral port; `main.rs` is a thin binary
//! wrapper over these modules.

pub mod dispatcher;
pub mod session;

pub use dispatcher::Dispatcher;
pub use session::{Session, SessionError};
