//! Shared types for the Coderun execution session protocol.

mod execution;
mod session;
mod wire;

pub use execution::*;
pub use session::*;
pub use wire::*;
