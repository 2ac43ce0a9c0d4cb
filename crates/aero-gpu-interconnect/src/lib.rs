//! `aero-gpu-interconnect` translates the register state of a fixed-function 3D engine into
//! operations on an explicit graphics API.
//!
//! Currently this crate provides:
//! - A pipeline cache keyed by packed register state, with per-pipeline transition and
//!   binding-compatibility caches (see [`PipelineManager`]).
//! - Descriptor synchronization, either full or limited to rebound constant buffers
//!   (see [`Pipeline::sync_descriptors_quick_bind`]).
//! - Deferred state-update lists replayed against a [`CommandRecorder`]
//!   (see [`StateUpdateBuilder`]).
//! - Draw and clear orchestration for one engine channel (see [`Maxwell3D`]).
//!
//! Shader translation, memory management, pipeline compilation and submission are provided by
//! the embedder through the traits in [`backend`] and [`memory`].

#![forbid(unsafe_code)]

mod config;
mod error;
mod stats;

pub mod backend;
pub mod constant_buffers;
pub mod descriptor;
pub mod engine;
pub mod maxwell3d;
pub mod memory;
pub mod packed_state;
pub mod pipeline;
pub mod shader;
pub mod state_updater;
pub mod topology;

pub use backend::InterconnectContext;
pub use config::{InterconnectConfig, DEFAULT_DESCRIPTOR_BATCH_SIZE};
pub use error::{InterconnectError, Result};
pub use maxwell3d::{ClearOp, ColorClear, DrawOp, DrawParams, Maxwell3D, RecordedOp};
pub use packed_state::PackedPipelineState;
pub use pipeline::{Pipeline, PipelineCacheStats, PipelineId, PipelineManager};
pub use state_updater::{CommandRecorder, StateUpdateBuilder, StateUpdateCmd, StateUpdater};
pub use stats::InterconnectStats;
