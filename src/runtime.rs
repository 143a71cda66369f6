//! Runtime for delivering messages into the engine
//!
//! Collaborator traits, their production adapters, and the dispatcher that
//! binds a transport to the engine.

mod dispatcher;
pub mod locks;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use dispatcher::{Dispatcher, Inbound};
pub use locks::UserLocks;
pub use traits::*;
