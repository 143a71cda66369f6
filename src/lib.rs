//! statebot - conversational state machines for chat bots
//!
//! Bots are described as a set of named states. Each state may have an
//! `on_enter` handler (runs when the user arrives) and an `on_response`
//! handler (runs for every message while the user is there). Handlers return
//! the next state or nothing; the engine chains `on_enter` handlers until one
//! stays put and persists the result once per step.
//!
//! ```no_run
//! use statebot::{goto, stay, Dispatcher, Engine, EngineConfig, HandlerRegistry};
//! # use statebot::{Database, DatabaseStorage, Transport};
//! # use std::sync::Arc;
//! # fn transport() -> Arc<dyn Transport> { unimplemented!() }
//!
//! let mut registry = HandlerRegistry::new();
//! registry.for_state("idle").on_enter(|_| async { goto("menu") });
//! registry
//!     .for_state("menu")
//!     .on_enter(|ctx| async move {
//!         ctx.send("1) Order  2) Help").await;
//!         stay()
//!     })
//!     .on_response(|_, text| async move {
//!         match text.as_str() {
//!             "1" => goto("order"),
//!             _ => stay(),
//!         }
//!     });
//!
//! let storage = DatabaseStorage::new(Database::open_in_memory()?);
//! let engine = Engine::new(registry, EngineConfig::from_env());
//! let dispatcher = Dispatcher::new(engine, storage, transport());
//! # Ok::<(), statebot::DbError>(())
//! ```

pub mod config;
pub mod context;
pub mod db;
pub mod engine;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod state;

pub use config::{EngineConfig, SameStatePolicy};
pub use context::{Context, StateData};
pub use db::{Database, DbError};
pub use engine::{CycleOutcome, Engine, EngineError, Phase, Trigger};
pub use registry::{goto, stay, HandlerError, HandlerRegistry, HandlerResult, RegistryError};
pub use runtime::{ChatId, DatabaseStorage, Dispatcher, Inbound, Transport, UserId, UserStore};
pub use session::{Session, SessionError, SessionManager};
pub use state::{StateId, StateKind, INITIAL_STATE};
