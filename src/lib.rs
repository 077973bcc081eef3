//! Keeps a local `mods` folder in sync with a folder published in a git
//! hosting repository.
//!
//! A run resolves the repository URL ([`resolver`]), fetches the remote listing
//! ([`listing`]) into a [`manifest::Manifest`], diffs it against the local folder
//! ([`plan`]) and applies the result ([`sync`]), recording which files the tool
//! owns ([`state`]). [`engine`] strings these together on a background worker.

pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod listing;
pub mod manifest;
pub mod plan;
pub mod progress;
pub mod resolver;
pub mod state;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use engine::state::{SyncOutcome, SyncSession, SyncState};
pub use engine::{EngineOptions, PreparedSync, SyncEngine, SyncHandle, spawn_sync};
pub use error::{ParseFailure, SyncError};
pub use manifest::{Manifest, ModEntry};
pub use plan::UpdatePlan;
pub use progress::{DownloadProgress, ProgressCell, ProgressReader};
pub use sync::{SyncExecutor, SyncReport};
