// SPDX-License-Identifier: Apache-2.0
//! Fixed tunables shared across the substrate.
//!
//! Everything here is a compile-time constant on purpose: the fourteen
//! *adaptive* parameters live in [`crate::params::AdaptiveParams`] and
//! are regulated at runtime by the homeostat; these are the reference
//! points and rate constants the regulation steers against.

/// Upper bound for both plastic weights.
pub const W_MAX: f32 = 255.0;

/// Clamp bound for the per-edge credit accumulator.
pub const CREDIT_MAX: f32 = 127.0;

/// Convex blend factor for effective weight and action utility:
/// `gamma * slow + (1 - gamma) * fast`.
pub const GAMMA_SLOW: f32 = 0.6;

/// Activation level above which a vertex counts as active, everywhere
/// activity is discretized (signatures, firing, homeostat activity).
pub const ACTIVATION_FLOOR: f32 = 0.5;

/// Seed weight for edges created by structural plasticity.
pub const INITIAL_WEIGHT: f32 = 16.0;

/// Initial firing threshold for freshly created vertices.
pub const INITIAL_THETA: f32 = 64.0;

// ── Learner ─────────────────────────────────────────────────────────

/// Exponential decay applied to the C11/C10 co-occurrence counts.
pub const LAMBDA_DECAY: f32 = 0.99;

/// Denominator guard for the conditional-probability estimate.
pub const LIFT_EPS: f32 = 1e-3;

/// Blend between predictive lift and instantaneous credit in the
/// usefulness signal.
pub const BETA_LIFT: f32 = 0.5;

/// Eligibility trace decay.
pub const LAMBDA_ELIGIBILITY: f32 = 0.9;

/// Fast-weight learning rate.
pub const ETA_FAST: f32 = 2.0;

/// Soft clamp bound on a single fast-weight step.
pub const DELTA_MAX: f32 = 8.0;

/// Gentle per-update decay of the fast weight toward zero.
pub const ALPHA_FAST: f32 = 0.999;

/// `avg_U` magnitude required to move the slow weight by one step.
pub const THETA_CONSOLIDATE: f32 = 0.05;

/// Slow-weight consolidation runs once per this many ticks.
pub const CONSOLIDATE_PERIOD: u64 = 16;

/// EMA rate for the per-destination activation baseline (`p_base`).
pub const BASELINE_RATE: f32 = 0.01;

/// Learning rate for per-vertex threshold plasticity.
pub const THETA_RATE: f32 = 0.02;

/// Lower clamp for the plastic firing threshold.
pub const THETA_MIN: f32 = -1024.0;

/// Upper clamp for the plastic firing threshold.
pub const THETA_MAX: f32 = 1024.0;

// ── Structural plasticity ───────────────────────────────────────────

/// Minimum signature similarity (fraction of matching bits) for
/// co-activation node creation.
pub const SIM_FLOOR: f32 = 0.7;

/// Reference co-occurrence count in the novelty estimate.
pub const CO_FREQ_REF: f32 = 8.0;

/// Pairs sampled per tick by the probabilistic structural operators.
pub const PAIR_SAMPLES: usize = 8;

/// Effective weight below which an edge is soft-classified as weak.
pub const PRUNE_WEIGHT_REF: f32 = W_MAX / 20.0;

/// Staleness reference for edge pruning.
pub const STALE_REF: f32 = 50.0;

/// Idle ticks after which an isolated vertex becomes prunable.
pub const NODE_STALE_REF: u64 = 100;

/// Deletion probability for a prunable isolated vertex.
pub const NODE_PRUNE_PROB: f32 = 0.1;

/// Neighbourhood density reference for layer emergence.
pub const DENSITY_REF: f32 = 0.5;

/// Minimum neighbour count for layer emergence.
pub const LAYER_MIN_SIZE: usize = 4;

/// Neighbours linked into a newly emerged meta-vertex.
pub const LAYER_LINK_SAMPLE: usize = 8;

/// Capacity of each decayed pair co-occurrence table.
pub const COOC_TABLE_CAP: usize = 8192;

// ── Homeostat ───────────────────────────────────────────────────────

/// Target edge density (`edges / (v * (v - 1))`).
pub const TARGET_DENSITY: f32 = 0.15;

/// Target fraction of vertices above the activation floor.
pub const TARGET_ACTIVITY: f32 = 0.15;

/// Target prediction accuracy (`1 - mean_surprise`).
pub const TARGET_ACC: f32 = 0.7;

/// Target fraction of thoughts that settle before the hop limit.
pub const TARGET_SETTLE: f32 = 0.9;

/// Target mean thought depth, in hops.
pub const TARGET_DEPTH: f32 = 4.0;

/// Global proportional-control gain.
pub const ADAPT_RATE: f32 = 0.1;

/// Ticks between homeostat adaptation passes.
pub const ADAPT_PERIOD: u64 = 10;

/// EMA rate for the homeostat's per-tick statistics.
pub const STAT_EMA_RATE: f32 = 0.05;

/// Capacity usage above which the safety valve engages.
pub const CAPACITY_VALVE: f32 = 0.8;

// ── Thought loop ────────────────────────────────────────────────────

/// Lower clamp for the adaptive hop limit.
pub const MIN_HOPS: u32 = 2;

/// Absolute upper bound on propagation passes per tick.
pub const MAX_HOPS_LIMIT: u32 = 64;

// ── I/O and scheduling ──────────────────────────────────────────────

/// Largest input frame processed per tick.
pub const FRAME_SIZE_MAX: usize = 4096;

/// Default input ring capacity in bytes.
pub const INPUT_RING_CAP: usize = 65536;

/// Default output ring capacity in bytes.
pub const OUTPUT_RING_CAP: usize = 65536;

/// Ticks between periodic snapshots.
pub const SNAPSHOT_PERIOD: u64 = 2000;

/// Ticks between telemetry lines.
pub const LOG_PERIOD: u64 = 10;

// ── Snapshot format ─────────────────────────────────────────────────

/// Magic number at offset 0 of a snapshot file.
pub const SNAPSHOT_MAGIC: u32 = 0xBEEF_2024;

/// Snapshot layout version; bump on any record or header change.
pub const SNAPSHOT_VERSION: u32 = 1;
