// SPDX-License-Identifier: Apache-2.0
//! mycel-core: a continuously-running, self-organizing associative
//! graph substrate.
//!
//! The engine ingests an unbounded byte stream, grows a directed
//! weighted graph whose vertices represent observed patterns, and emits
//! a byte stream produced by the graph's own activation dynamics. The
//! same graph carries learning, prediction, and action selection; a
//! homeostatic feedback loop keeps fourteen adaptive parameters inside
//! healthy operating bands.
//!
//! Determinism contract: given a fixed seed, fixed capacities, and an
//! identical input byte sequence, the emitted byte sequence is
//! bit-identical across runs on the same host. All randomness flows
//! through one explicit PRNG and all transcendentals go through `libm`.
#![deny(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

/// Deterministic math subsystem (PRNG, logistic curves).
pub mod math;

mod action;
mod arena;
/// Fixed tunables: weight bounds, learning rates, homeostat targets.
pub mod constants;
mod edge_index;
mod engine;
mod homeostat;
mod ident;
mod learn;
mod params;
mod plasticity;
mod propagate;
mod record;
mod ring;
mod sense;
mod snapshot;
mod telemetry;
mod thought;

// Re-exports for the stable public API.
/// Macro table types consumed by the action selector.
pub use action::{MacroDef, MacroTable};
/// The owning arena and its recoverable error kinds.
pub use arena::{Arena, ArenaError};
/// The engine, its configuration, errors, and the stats inspector.
pub use engine::{Engine, EngineConfig, EngineError, GraphStats};
/// Measured graph health, as sampled by the homeostat.
pub use homeostat::GraphHealth;
/// Stable handles into the arena.
pub use ident::{EdgeSlot, VertexId};
/// The fourteen adaptive parameters and their clamp bounds.
pub use params::{AdaptiveParams, Bounds};
/// Storage records and vertex flag bits.
pub use record::{
    EdgeRecord, VertexRecord, FLAG_LIVE, FLAG_META, FLAG_OUTPUT, FLAG_PROTECTED, FLAG_SENSORY,
};
/// Bounded byte rings used for stream plumbing.
pub use ring::ByteRing;
/// The sensing seam and the default byte detector set.
pub use sense::{ByteDetectors, DetectorSet};
/// Snapshot persistence errors and the advisory lock guard.
pub use snapshot::{LockGuard, SnapshotError};
/// Recoverable-error counters surfaced by [`GraphStats`].
pub use telemetry::{Counters, Telemetry};
/// Thought loop outcome.
pub use thought::ThoughtStats;
