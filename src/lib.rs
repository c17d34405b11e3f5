//! Protocol bridge between RISC-V firmware debug backends and an editor debug adapter.
//!
//! * [`mi`] - decoder of GDB machine interface output.
//! * [`assert`] - decoder of simulator assert prompts and reply sanitizing.
//! * [`session`] - backend sessions: simulator, hardware probe servers, external servers.

pub mod assert;
pub mod config;
pub mod error;
pub mod mi;
pub mod session;

pub use error::Error;
