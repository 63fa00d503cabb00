//! Crawler + monitor + processor pipeline for a desktop filesystem
//! indexing daemon.
//!
//! The pieces compose roughly like this: a [`monitor::Monitor`] turns raw
//! OS notifications into item events, a [`crawler::Crawler`] walks a
//! module's configured roots on startup and on demand, and
//! [`processor::Processor`] is the single event loop that queues both
//! streams and dispatches them to an [`indexer::IndexerClient`], all under
//! the pause/run-level rules owned by [`status::StatusHandle`].

pub mod bus;
pub mod config;
pub mod crawler;
pub mod error;
pub mod events;
pub mod indexer;
pub mod model;
pub mod monitor;
pub mod processor;
pub mod status;
pub mod volume;

pub use bus::Bus;
pub use config::Config;
pub use error::{MinerError, Result};
pub use events::MinerEvent;
pub use model::{Device, EventKind, Module, PathItem};
pub use processor::{Processor, StopHandle};
