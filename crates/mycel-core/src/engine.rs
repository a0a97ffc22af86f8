// SPDX-License-Identifier: Apache-2.0
//! The engine: single owning value for the arena, rings, PRNG,
//! parameters, and macro table, plus the tick driver that sequences
//! sense → think → learn → restructure → regulate → act → persist.
//!
//! Ordering guarantees (per tick): sensing strictly precedes thought,
//! thought precedes learning, learning precedes structural plasticity,
//! plasticity precedes homeostasis, and everything precedes action
//! emission. Recoverable errors (capacity, dead ids) are counted and
//! skipped; only lock conflicts at startup and irrecoverable capacity
//! starvation are fatal.

use std::path::PathBuf;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::action::MacroTable;
use crate::arena::Arena;
use crate::constants::{
    ACTIVATION_FLOOR, ADAPT_PERIOD, CONSOLIDATE_PERIOD, FRAME_SIZE_MAX, INPUT_RING_CAP,
    LOG_PERIOD, OUTPUT_RING_CAP, SNAPSHOT_PERIOD,
};
use crate::homeostat::{GraphHealth, Homeostat};
use crate::learn;
use crate::math::{sigmoid, Prng};
use crate::params::AdaptiveParams;
use crate::plasticity::{self, Plasticity};
use crate::ring::ByteRing;
use crate::sense::{ByteDetectors, DetectorSet};
use crate::snapshot::{self, LockGuard, SnapshotError, SnapshotState};
use crate::telemetry::{Counters, Telemetry};
use crate::thought::{self, ThoughtStats};

/// Ticks of total sensing starvation tolerated before the engine
/// declares capacity exhaustion irrecoverable.
const STARVATION_LIMIT: u32 = 100;

/// Construction-time configuration for [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Vertex capacity of the arena.
    pub vertex_cap: u32,
    /// Edge capacity of the arena.
    pub edge_cap: u32,
    /// PRNG seed; identical seeds with identical input reproduce the
    /// output byte stream bit for bit.
    pub seed: u64,
    /// Snapshot file path; `None` disables persistence entirely.
    pub state_path: Option<PathBuf>,
    /// Whether emitted bytes feed back into the next tick's frame.
    pub self_observe: bool,
    /// Ticks between periodic snapshots (0 disables).
    pub snapshot_period: u64,
    /// Ticks between homeostat adaptations.
    pub adapt_period: u64,
    /// Ticks between telemetry lines (0 disables).
    pub log_period: u64,
    /// Largest input frame per tick.
    pub frame_size_max: usize,
    /// Input ring capacity in bytes.
    pub input_ring_cap: usize,
    /// Output ring capacity in bytes.
    pub output_ring_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vertex_cap: 8192,
            edge_cap: 65536,
            seed: 0,
            state_path: None,
            self_observe: true,
            snapshot_period: SNAPSHOT_PERIOD,
            adapt_period: ADAPT_PERIOD,
            log_period: LOG_PERIOD,
            frame_size_max: FRAME_SIZE_MAX,
            input_ring_cap: INPUT_RING_CAP,
            output_ring_cap: OUTPUT_RING_CAP,
        }
    }
}

/// Errors emitted by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration was rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Another process holds the state file lock.
    #[error("state file locked by another process: {0}")]
    AlreadyRunning(PathBuf),
    /// Sensing found no usable vertex for many consecutive ticks and
    /// forced pruning freed nothing.
    #[error("arena capacity irrecoverably exhausted")]
    CapacityIrrecoverable,
}

/// Inspector surface: one coherent view of graph health, dynamics, and
/// error counters.
#[derive(Debug, Clone, Copy)]
pub struct GraphStats {
    /// Current tick.
    pub tick: u64,
    /// Live vertices.
    pub vertex_count: u32,
    /// Live edges.
    pub edge_count: u32,
    /// Vertex capacity.
    pub vertex_cap: u32,
    /// Edge capacity.
    pub edge_cap: u32,
    /// Measured graph health (density, activity, distances, EMAs).
    pub health: GraphHealth,
    /// Energy field (EMA of squared surprise).
    pub energy: f32,
    /// Current exploration rate.
    pub epsilon: f32,
    /// Most recent mean surprise.
    pub mean_surprise: f32,
    /// Hops used by the most recent thought.
    pub hops_used: u32,
    /// Whether the most recent thought settled.
    pub settled: bool,
    /// Recoverable-error counters.
    pub counters: Counters,
}

/// The core value owning every piece of substrate state.
pub struct Engine {
    config: EngineConfig,
    arena: Arena,
    detectors: Box<dyn DetectorSet>,
    macros: MacroTable,
    prng: Prng,
    params: AdaptiveParams,
    homeostat: Homeostat,
    plasticity: Plasticity,
    input_ring: ByteRing,
    output_ring: ByteRing,
    last_emitted: Vec<u8>,
    last_macro: Option<usize>,
    sensed: FxHashMap<u32, f32>,
    assignments: Vec<(crate::ident::VertexId, f32)>,
    soma_scratch: Vec<f32>,
    frame: Vec<u8>,
    tick: u64,
    energy: f32,
    epsilon: f32,
    mean_surprise: f32,
    last_thought: ThoughtStats,
    counters: Counters,
    telemetry: Telemetry,
    starved_ticks: u32,
    _lock: Option<LockGuard>,
}

impl Engine {
    /// Builds an engine with the default byte detectors and the
    /// single-byte macro table.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_parts(
            config,
            Box::new(ByteDetectors::new()),
            MacroTable::single_bytes(),
        )
    }

    /// Builds an engine with injected collaborators.
    ///
    /// When a state path is configured, the advisory lock is taken and
    /// an existing valid snapshot is restored; a corrupt or mismatched
    /// file logs a warning and the engine starts from an empty arena.
    pub fn with_parts(
        config: EngineConfig,
        detectors: Box<dyn DetectorSet>,
        macros: MacroTable,
    ) -> Result<Self, EngineError> {
        if config.vertex_cap == 0 {
            return Err(EngineError::InvalidConfig(
                "vertex capacity must be at least 1".into(),
            ));
        }
        if config.edge_cap == 0 {
            return Err(EngineError::InvalidConfig(
                "edge capacity must be at least 1".into(),
            ));
        }
        if config.frame_size_max == 0 {
            return Err(EngineError::InvalidConfig(
                "frame size must be at least 1".into(),
            ));
        }

        let mut lock = None;
        let mut restored: Option<SnapshotState> = None;
        if let Some(path) = &config.state_path {
            lock = Some(match snapshot::lock(path) {
                Ok(guard) => guard,
                Err(SnapshotError::Locked(p)) => return Err(EngineError::AlreadyRunning(p)),
                Err(err) => {
                    return Err(EngineError::InvalidConfig(format!(
                        "cannot lock state file: {err}"
                    )))
                }
            });
            if path.exists() {
                match snapshot::load(path) {
                    Ok(state) => restored = Some(state),
                    Err(err) => {
                        tracing::warn!(error = %err, "snapshot rejected, starting fresh");
                    }
                }
            }
        }

        let params = AdaptiveParams::default();
        let energy = 0.25;
        let telemetry = Telemetry::stderr(config.log_period);
        let mut engine = Self {
            arena: Arena::new(config.vertex_cap, config.edge_cap),
            detectors,
            macros,
            prng: Prng::from_seed(config.seed),
            epsilon: derive_epsilon(&params, energy),
            params,
            homeostat: Homeostat::default(),
            plasticity: Plasticity::default(),
            input_ring: ByteRing::with_capacity(config.input_ring_cap),
            output_ring: ByteRing::with_capacity(config.output_ring_cap),
            last_emitted: Vec::new(),
            last_macro: None,
            sensed: FxHashMap::default(),
            assignments: Vec::new(),
            soma_scratch: Vec::new(),
            frame: Vec::new(),
            tick: 0,
            energy,
            mean_surprise: 0.0,
            last_thought: ThoughtStats::default(),
            counters: Counters::default(),
            telemetry,
            starved_ticks: 0,
            _lock: lock,
            config,
        };
        if let Some(state) = restored {
            engine.restore(state);
            engine.detectors.rebind(&engine.arena);
        }
        Ok(engine)
    }

    fn restore(&mut self, state: SnapshotState) {
        let file_vertex_cap = state.vertices.len() as u32;
        let file_edge_cap = state.edges.len() as u32;
        if file_vertex_cap != self.config.vertex_cap || file_edge_cap != self.config.edge_cap {
            tracing::warn!(
                file_vertex_cap,
                file_edge_cap,
                "snapshot capacities override configured capacities"
            );
        }
        let Some(arena) = Arena::from_parts(
            state.vertices,
            state.edges,
            state.vertex_free,
            state.edge_free,
        ) else {
            tracing::warn!("snapshot tables inconsistent, starting fresh");
            return;
        };
        self.arena = arena;
        self.config.vertex_cap = file_vertex_cap;
        self.config.edge_cap = file_edge_cap;
        self.tick = state.tick;
        self.prng = Prng::from_state(state.prng_state);
        self.params = AdaptiveParams::from_array(state.params);
        self.energy = state.energy;
        self.epsilon = derive_epsilon(&self.params, self.energy);
        self.mean_surprise = state.mean_surprise;
        self.homeostat = Homeostat::from_emas(state.acc_ema, state.settle_ema, state.depth_ema);
        tracing::info!(
            tick = state.tick,
            vertices = state.vertex_count,
            edges = state.edge_count,
            "snapshot restored"
        );
    }

    /// Queues input bytes for the next tick's frame.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input_ring.push_slice(bytes);
    }

    /// Moves emitted bytes out of the output ring.
    pub fn drain_output(&mut self, out: &mut Vec<u8>) {
        let len = self.output_ring.len();
        self.output_ring.drain_into(out, len);
    }

    /// Bytes waiting in the output ring.
    pub fn output_pending(&self) -> usize {
        self.output_ring.len()
    }

    /// True when the input ring is drained and no self-observation is
    /// pending; together with upstream EOF this is the termination
    /// condition. With self-observation disabled, emitted bytes never
    /// return, so only the input ring counts.
    pub fn idle(&self) -> bool {
        self.input_ring.is_empty()
            && (!self.config.self_observe || self.last_emitted.is_empty())
    }

    /// Replaces the telemetry emitter (stderr by default).
    pub fn set_telemetry(&mut self, telemetry: Telemetry) {
        self.telemetry = telemetry;
    }

    /// The adaptive parameter set as currently tuned.
    pub fn params(&self) -> &AdaptiveParams {
        &self.params
    }

    /// Current tick counter.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Runs exactly one tick of the pipeline.
    pub fn tick(&mut self) -> Result<(), EngineError> {
        let tick = self.tick;

        // Carry the previous tick's settled predictions and activations
        // over as the learner's references before anything overwrites
        // them.
        {
            let high = self.arena.vertex_high();
            for vertex in self.arena.vertex_table_mut()[..high]
                .iter_mut()
                .filter(|v| v.is_live())
            {
                vertex.predicted_prev = vertex.predicted;
                vertex.prev_tick_activation = vertex.activation;
            }
        }

        // 1-2. Assemble the frame: pending input plus self-observation.
        self.frame.clear();
        self.input_ring
            .drain_into(&mut self.frame, self.config.frame_size_max);
        if self.config.self_observe && !self.last_emitted.is_empty() {
            let room = self.config.frame_size_max.saturating_sub(self.frame.len());
            let take = self.last_emitted.len().min(room);
            self.frame.extend_from_slice(&self.last_emitted[..take]);
        }
        self.last_emitted.clear();

        // 3. Sense, with one forced-prune retry on capacity misses.
        self.assignments.clear();
        let misses = self
            .detectors
            .detect(&self.frame, tick, &mut self.arena, &mut self.assignments);
        if misses > 0 {
            self.counters.capacity_exhausted += u64::from(misses);
            plasticity::forced_prune(&mut self.arena, tick);
            self.assignments.clear();
            let retry = self
                .detectors
                .detect(&self.frame, tick, &mut self.arena, &mut self.assignments);
            if retry > 0 {
                self.counters.capacity_exhausted += u64::from(retry);
            }
        }
        if !self.frame.is_empty() && self.assignments.is_empty() && self.arena.vertex_count() == 0 {
            self.starved_ticks += 1;
            if self.starved_ticks > STARVATION_LIMIT {
                return Err(EngineError::CapacityIrrecoverable);
            }
        } else {
            self.starved_ticks = 0;
        }

        self.sensed.clear();
        for &(id, activation) in &self.assignments {
            let Some(vertex) = self.arena.vertex(id) else {
                self.counters.invalid_vertex += 1;
                continue;
            };
            debug_assert!(vertex.is_sensory());
            let slot = id.slot() as u32;
            let activation = activation.clamp(0.0, 1.0);
            let entry = self.sensed.entry(slot).or_insert(0.0);
            if activation > *entry {
                *entry = activation;
            }
        }
        {
            let vertices = self.arena.vertex_table_mut();
            for (&slot, &activation) in &self.sensed {
                let vertex = &mut vertices[slot as usize];
                vertex.activation = activation;
                if activation > ACTIVATION_FLOOR {
                    vertex.last_active_tick = tick;
                }
            }
        }

        // 4. Thought: iterated propagation until stability.
        let thought = thought::run(
            &mut self.arena,
            &self.params,
            &self.sensed,
            &mut self.soma_scratch,
        );
        self.last_thought = thought;

        // 5. Learner pass plus the global energy/exploration update,
        // and the deferred reward for the previous action.
        let consolidate = tick % CONSOLIDATE_PERIOD == 0;
        let report = learn::observe(&mut self.arena, &self.params, tick, consolidate);
        self.mean_surprise = report.mean_surprise;
        learn::update_energy(
            &mut self.energy,
            &mut self.epsilon,
            &self.params,
            self.mean_surprise,
        );
        if let Some(index) = self.last_macro.take() {
            self.macros.reward(index, 1.0 - self.mean_surprise);
        }

        // 6. Structural plasticity.
        let structural = self.plasticity.step(
            &mut self.arena,
            &self.params,
            &mut self.prng,
            tick,
            self.energy,
        );
        self.counters.capacity_exhausted += u64::from(structural.capacity_misses);
        self.counters.invalid_vertex += u64::from(structural.invalid_refs);

        // 7. Homeostat: continuous EMAs, periodic adaptation, and the
        // per-tick capacity valve.
        self.homeostat.observe_tick(self.mean_surprise, thought);
        if self.config.adapt_period > 0 && tick > 0 && tick % self.config.adapt_period == 0 {
            self.homeostat.adapt(&self.arena, &mut self.params);
        }
        Homeostat::capacity_valve(&self.arena, &mut self.params);

        // 8. Action selection and emission. An empty graph has no
        // activation dynamics to act from, so a never-fed engine stays
        // silent (and can terminate on EOF).
        if self.arena.vertex_count() > 0 {
            self.emit_action(tick);
        }

        // 9. Periodic snapshot; failures are counted, never fatal.
        if self.config.state_path.is_some()
            && self.config.snapshot_period > 0
            && tick > 0
            && tick % self.config.snapshot_period == 0
        {
            if let Err(err) = self.snapshot_now() {
                self.counters.snapshot_failures += 1;
                tracing::warn!(error = %err, "periodic snapshot failed");
            }
        }

        // 10. Telemetry, then advance the clock.
        if self.telemetry.due(tick) {
            let stats = self.stats();
            self.telemetry.line(
                tick,
                format_args!(
                    "verts={} edges={} density={:.4} activity={:.3} acc={:.3} energy={:.3} eps={:.3} hops={} settled={} capmiss={} badref={}",
                    stats.vertex_count,
                    stats.edge_count,
                    stats.health.density,
                    stats.health.activity,
                    stats.health.prediction_acc,
                    stats.energy,
                    stats.epsilon,
                    stats.hops_used,
                    u8::from(stats.settled),
                    stats.counters.capacity_exhausted,
                    stats.counters.invalid_vertex,
                ),
            );
        }
        self.tick += 1;
        Ok(())
    }

    fn emit_action(&mut self, tick: u64) {
        let Some(index) = self.macros.select(self.epsilon, &mut self.prng, tick) else {
            return;
        };
        let payload = self
            .macros
            .get(index)
            .map(|m| m.payload.clone())
            .unwrap_or_default();
        self.output_ring.push_slice(&payload);
        self.last_emitted = payload;
        self.last_macro = Some(index);
    }

    /// Writes a snapshot to the configured state path right now.
    ///
    /// # Errors
    /// [`SnapshotError::WriteFailed`] when the write or rename fails;
    /// the partial temp file is removed.
    pub fn snapshot_now(&mut self) -> Result<(), SnapshotError> {
        let Some(path) = self.config.state_path.clone() else {
            return Ok(());
        };
        let (acc_ema, settle_ema, depth_ema) = self.homeostat.emas();
        let (vertex_free, edge_free) = self.arena.free_lists();
        let state = SnapshotState {
            tick: self.tick,
            vertex_count: self.arena.vertex_count(),
            edge_count: self.arena.edge_count(),
            prng_state: self.prng.state(),
            params: self.params.to_array(),
            energy: self.energy,
            acc_ema,
            settle_ema,
            depth_ema,
            mean_surprise: self.mean_surprise,
            vertices: self.arena.vertex_table().to_vec(),
            edges: self.arena.edge_table().to_vec(),
            vertex_free: vertex_free.to_vec(),
            edge_free: edge_free.to_vec(),
        };
        snapshot::save(&path, &state)
    }

    /// Attempts the final snapshot at shutdown.
    ///
    /// # Errors
    /// Propagates the snapshot failure so callers can log it; the engine
    /// is still considered cleanly terminated.
    pub fn finalize(&mut self) -> Result<(), SnapshotError> {
        let result = self.snapshot_now();
        if let Err(err) = &result {
            self.counters.snapshot_failures += 1;
            tracing::warn!(error = %err, "final snapshot failed");
        }
        result
    }

    /// One coherent view of current graph health and counters.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            tick: self.tick,
            vertex_count: self.arena.vertex_count(),
            edge_count: self.arena.edge_count(),
            vertex_cap: self.arena.vertex_cap(),
            edge_cap: self.arena.edge_cap(),
            health: self.homeostat.measure(&self.arena),
            energy: self.energy,
            epsilon: self.epsilon,
            mean_surprise: self.mean_surprise,
            hops_used: self.last_thought.hops_used,
            settled: self.last_thought.settled,
            counters: self.counters,
        }
    }

    /// Direct read access to the arena for inspection and tests.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }
}

fn derive_epsilon(params: &AdaptiveParams, energy: f32) -> f32 {
    params.epsilon_min
        + (params.epsilon_max - params.epsilon_min)
            * sigmoid((energy - 0.5) * params.sigmoid_k * 10.0)
}
