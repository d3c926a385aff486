//! The cache server engine's main crate: configuration, the request
//! handler, the main dispatcher, and the external-interface contracts that
//! tie this engine to a wire-protocol listener, a replication binary log,
//! and replica fan-out — none of which live in this crate.

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod interfaces;
pub mod logging;
pub mod sinks;
pub mod state;
pub mod status;
pub mod worker;

pub use commands::{Command, FpcCommand, SessionCommand};
pub use config::{Cli, CoreConfig};
pub use dispatcher::Dispatcher;
pub use error::{CoreError, CoreResult};
pub use interfaces::{BinlogLoader, BinlogWriter, ResponseConsumer, Replicator};
pub use state::CoreState;
pub use status::HandlerStatus;
pub use worker::Worker;
