//! Channel document engine for UHF broadcast schedules.
//!
//! A channel is a directory holding a manifest, one JSON file per schedule
//! (usually a week) and optional filler lists. [`Channel`] owns the open
//! documents and exposes the editing intents; the [`resolver`] module fills
//! in media durations in the background.

pub mod channel;
pub mod content;
pub mod day_index;
pub mod dirty;
pub mod error;
pub mod models;
pub mod paths;
pub mod resolver;
pub mod resource_db;
pub mod storage;
pub mod timefmt;

pub use channel::{Channel, DayProgram, ResourceField, SaveReport, ValidationIssue, ValidationReport};
pub use error::{ChannelError, Result};
pub use resolver::{
    LocateRequest, LocateResponse, ProbeChain, ProbeConfig, ResolutionReport, Resolver,
    ResolverEvent, ResolverSession,
};
pub use storage::{FsStorage, MemoryStorage, Storage, StorageError};
