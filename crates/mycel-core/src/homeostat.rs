// SPDX-License-Identifier: Apache-2.0
//! The homeostat: proportional feedback from measured graph health onto
//! the fourteen adaptive parameters.
//!
//! Per-tick statistics (accuracy, settle ratio, thought depth) are
//! folded into EMAs continuously; the structural measurements and the
//! parameter updates run once per adaptation period. Every update is a
//! single proportional step followed by a re-clamp.

use crate::arena::Arena;
use crate::constants::{
    ACTIVATION_FLOOR, ADAPT_RATE, CAPACITY_VALVE, STAT_EMA_RATE, TARGET_ACC, TARGET_ACTIVITY,
    TARGET_DENSITY, TARGET_DEPTH, TARGET_SETTLE,
};
use crate::params::AdaptiveParams;
use crate::thought::ThoughtStats;

/// Structural measurements taken during an adaptation pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphHealth {
    /// `edge_count / (v * (v - 1))`, zero for graphs below two vertices.
    pub density: f32,
    /// Fraction of live vertices above the activation floor.
    pub activity: f32,
    /// EMA of `1 - mean_surprise`.
    pub prediction_acc: f32,
    /// Mean edge staleness, the emergent temporal distance.
    pub mean_temporal_distance: f32,
    /// Mean `1 + ln(1 + degree)` over live vertices.
    pub mean_spatial_distance: f32,
    /// EMA of the settled flag.
    pub settle_ratio: f32,
    /// EMA of hops used.
    pub thought_depth: f32,
    /// Fuller of the two table usages.
    pub capacity_usage: f32,
}

/// Feedback controller state.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Homeostat {
    acc_ema: f32,
    settle_ema: f32,
    depth_ema: f32,
}

impl Default for Homeostat {
    fn default() -> Self {
        Self {
            acc_ema: TARGET_ACC,
            settle_ema: 1.0,
            depth_ema: TARGET_DEPTH,
        }
    }
}

impl Homeostat {
    /// Folds one tick's observations into the running EMAs.
    pub(crate) fn observe_tick(&mut self, mean_surprise: f32, thought: ThoughtStats) {
        let acc = 1.0 - mean_surprise;
        self.acc_ema += STAT_EMA_RATE * (acc - self.acc_ema);
        let settled = if thought.settled { 1.0 } else { 0.0 };
        self.settle_ema += STAT_EMA_RATE * (settled - self.settle_ema);
        self.depth_ema += STAT_EMA_RATE * (thought.hops_used as f32 - self.depth_ema);
    }

    /// Restores EMA state from a snapshot.
    pub(crate) fn from_emas(acc: f32, settle: f32, depth: f32) -> Self {
        Self {
            acc_ema: acc,
            settle_ema: settle,
            depth_ema: depth,
        }
    }

    /// EMA state for snapshotting: `(accuracy, settle, depth)`.
    pub(crate) fn emas(&self) -> (f32, f32, f32) {
        (self.acc_ema, self.settle_ema, self.depth_ema)
    }

    /// Measures graph health without touching the parameters.
    pub(crate) fn measure(&self, arena: &Arena) -> GraphHealth {
        let v = arena.vertex_count();
        let e = arena.edge_count();

        let density = if v >= 2 {
            e as f32 / (v as f32 * (v as f32 - 1.0))
        } else {
            0.0
        };

        let mut active = 0u32;
        let mut spatial_sum = 0.0f32;
        for (_, vertex) in arena.iter_live_vertices() {
            if vertex.activation > ACTIVATION_FLOOR {
                active += 1;
            }
            spatial_sum += 1.0 + libm::log1pf(vertex.degree() as f32);
        }
        let activity = if v > 0 { active as f32 / v as f32 } else { 0.0 };
        let mean_spatial_distance = if v > 0 { spatial_sum / v as f32 } else { 0.0 };

        let mut stale_sum = 0.0f32;
        for (_, edge) in arena.iter_live_edges() {
            stale_sum += edge.stale_ticks as f32;
        }
        let mean_temporal_distance = if e > 0 { stale_sum / e as f32 } else { 0.0 };

        GraphHealth {
            density,
            activity,
            prediction_acc: self.acc_ema,
            mean_temporal_distance,
            mean_spatial_distance,
            settle_ratio: self.settle_ema,
            thought_depth: self.depth_ema,
            capacity_usage: arena.capacity_usage(),
        }
    }

    /// One adaptation pass: measure, then nudge every parameter with
    /// proportional feedback.
    pub(crate) fn adapt(&mut self, arena: &Arena, params: &mut AdaptiveParams) -> GraphHealth {
        let health = self.measure(arena);
        let acc = health.prediction_acc;

        // Under capacity pressure the valve owns these two rates: the
        // density term may tighten them further but never relax them,
        // otherwise the two controllers oscillate against each other.
        let pressured = health.capacity_usage > CAPACITY_VALVE;
        let prune_err = health.density - TARGET_DENSITY;
        if !pressured || prune_err > 0.0 {
            params.prune_rate += ADAPT_RATE * prune_err;
        }
        let create_err = (TARGET_DENSITY - health.density) * (1.0 + acc - TARGET_ACC);
        if !pressured || create_err < 0.0 {
            params.create_rate += ADAPT_RATE * create_err;
        }
        params.activation_scale += ADAPT_RATE * (health.activity - TARGET_ACTIVITY) * 100.0;
        params.energy_alpha += ADAPT_RATE * (TARGET_ACC - acc) * 0.1;
        params.energy_decay += ADAPT_RATE * (1.0 - (TARGET_ACC - acc).abs() - 0.5) * 0.01;

        let activity_in_band = (0.05..=0.5).contains(&health.activity);
        let band_err = if activity_in_band { -1.0 } else { 1.0 };
        params.sigmoid_k += ADAPT_RATE * band_err;

        let acc_err = if acc < TARGET_ACC { 1.0 } else { -1.0 };
        params.epsilon_max += ADAPT_RATE * acc_err * 0.1;
        params.layer_rate += ADAPT_RATE * (health.density * acc - 0.1) * 0.01;

        let depth_err = (health.thought_depth - TARGET_DEPTH) / TARGET_DEPTH;
        let hops_err = -(health.settle_ratio - TARGET_SETTLE) - 0.5 * depth_err;
        params.max_thought_hops += ADAPT_RATE * hops_err * 10.0;
        params.stability_eps += ADAPT_RATE * depth_err * 0.01;
        params.activation_eps += ADAPT_RATE * depth_err * 0.02;

        params.temporal_decay += ADAPT_RATE * (health.mean_temporal_distance - 10.0) / 10.0 * 0.1;
        params.spatial_k += ADAPT_RATE * (health.mean_spatial_distance - 2.0) / 2.0;

        params.clamp_all();
        health
    }

    /// Per-tick capacity safety valve: above the usage threshold,
    /// pruning ramps up and creation ramps down until pressure drops.
    pub(crate) fn capacity_valve(arena: &Arena, params: &mut AdaptiveParams) {
        if arena.capacity_usage() > CAPACITY_VALVE {
            params.prune_rate *= 1.01;
            params.create_rate *= 0.99;
            params.clamp_all();
        }
    }
}
