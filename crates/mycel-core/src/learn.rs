// SPDX-License-Identifier: Apache-2.0
//! Per-edge plasticity: eligibility, predictive lift, surprise credit,
//! and the two-timescale weight updates.
//!
//! Runs once per tick, after the thought loop settles. The reference
//! prediction for surprise is `predicted_prev`, the settled prediction
//! carried over from the previous tick; the engine refreshes it at the
//! top of every tick.

use crate::arena::Arena;
use crate::constants::{
    ACTIVATION_FLOOR, ALPHA_FAST, BASELINE_RATE, BETA_LIFT, CREDIT_MAX, DELTA_MAX, ETA_FAST,
    LAMBDA_DECAY, LAMBDA_ELIGIBILITY, LIFT_EPS, THETA_CONSOLIDATE, THETA_MAX, THETA_MIN,
    THETA_RATE, W_MAX,
};
use crate::ident::VertexId;
use crate::math::{sigmoid, soft_clamp};
use crate::params::AdaptiveParams;

/// Result of one observation step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LearnReport {
    /// `|activation - predicted_prev|` averaged over live vertices.
    pub mean_surprise: f32,
}

/// Runs the observation step over every live vertex and edge.
///
/// `consolidate` gates the slow-weight update (step 8), which runs once
/// per `CONSOLIDATE_PERIOD` ticks.
pub(crate) fn observe(
    arena: &mut Arena,
    params: &AdaptiveParams,
    tick: u64,
    consolidate: bool,
) -> LearnReport {
    let vertex_high = arena.vertex_high();
    let edge_high = arena.edge_high();

    // Vertex pass: surprise, threshold plasticity, baseline EMA,
    // signature, staleness clock.
    let mut surprise_sum = 0.0f32;
    let mut live = 0u32;
    {
        let vertices = arena.vertex_table_mut();
        for vertex in vertices[..vertex_high].iter_mut().filter(|v| v.is_live()) {
            surprise_sum += (vertex.activation - vertex.predicted_prev).abs();
            // Threshold plasticity: an under-predicted vertex lowers its
            // threshold, an over-predicted one raises it, so repeated
            // observations become predictable even without inputs.
            let theta_step =
                THETA_RATE * (vertex.activation - vertex.predicted_prev) * params.activation_scale;
            vertex.theta = (vertex.theta - theta_step).clamp(THETA_MIN, THETA_MAX);
            vertex.baseline =
                (1.0 - BASELINE_RATE) * vertex.baseline + BASELINE_RATE * vertex.activation;
            let active = vertex.activation > ACTIVATION_FLOOR;
            vertex.signature = (vertex.signature << 1) | u32::from(active);
            if active {
                vertex.last_active_tick = tick;
            }
            live += 1;
        }
    }

    // Edge pass: steps 1-10 of the plasticity kernel for every edge
    // whose source was active in the just-completed tick. The source
    // side is one tick behind the destination: an edge s -> d carries
    // the claim "s now means d next", so its counts pair the source's
    // previous settled activation with the destination's current one.
    let (vertices, edges) = arena.tables_mut();
    for edge in edges[..edge_high].iter_mut().filter(|e| e.is_live()) {
        let src_slot = VertexId::from_raw(edge.src).slot();
        let dst_slot = VertexId::from_raw(edge.dst).slot();
        let a_src = vertices[src_slot].prev_tick_activation;
        if a_src <= 0.0 {
            edge.stale_ticks = edge.stale_ticks.saturating_add(1);
            continue;
        }
        let dst = &vertices[dst_slot];
        let a_dst = dst.activation;

        edge.c11 = LAMBDA_DECAY * edge.c11 + a_src * a_dst;
        edge.c10 = LAMBDA_DECAY * edge.c10 + a_src * (1.0 - a_dst);
        let p_cond = edge.c11 / (edge.c11 + edge.c10 + LIFT_EPS);
        let lift = p_cond - dst.baseline;

        let credit_instant = (a_src * (a_dst - dst.predicted_prev)).clamp(-1.0, 1.0);
        let usefulness = BETA_LIFT * lift + (1.0 - BETA_LIFT) * credit_instant;

        edge.eligibility = (LAMBDA_ELIGIBILITY * edge.eligibility + a_src).clamp(0.0, 1.0);

        let step = soft_clamp(ETA_FAST * usefulness * edge.eligibility, DELTA_MAX);
        edge.w_fast = (edge.w_fast + step).clamp(0.0, W_MAX);
        edge.w_fast *= ALPHA_FAST;

        if consolidate {
            edge.avg_u = 0.95 * edge.avg_u + 0.05 * usefulness;
            if edge.avg_u > THETA_CONSOLIDATE {
                edge.w_slow = (edge.w_slow + 1.0).min(W_MAX);
            } else if edge.avg_u < -THETA_CONSOLIDATE {
                edge.w_slow = (edge.w_slow - 1.0).max(0.0);
            }
        }

        let contribution = if credit_instant > 0.0 {
            1.0
        } else if credit_instant < 0.0 {
            -1.0
        } else {
            0.0
        };
        edge.credit = (edge.credit + contribution).clamp(-CREDIT_MAX, CREDIT_MAX);

        let fired = a_src > ACTIVATION_FLOOR && a_dst > ACTIVATION_FLOOR;
        if fired {
            edge.use_count = edge.use_count.saturating_add(1);
            edge.stale_ticks = 0;
        } else {
            edge.stale_ticks = edge.stale_ticks.saturating_add(1);
        }
    }

    LearnReport {
        mean_surprise: surprise_sum / live.max(1) as f32,
    }
}

/// Global energy and exploration update, run once per tick after the
/// per-edge pass: energy integrates squared surprise, epsilon is a
/// bounded sigmoid of energy.
pub(crate) fn update_energy(
    energy: &mut f32,
    epsilon: &mut f32,
    params: &AdaptiveParams,
    mean_surprise: f32,
) {
    *energy = (params.energy_decay * *energy
        + params.energy_alpha * mean_surprise * mean_surprise)
        .clamp(0.0, 1.0);
    *epsilon = params.epsilon_min
        + (params.epsilon_max - params.epsilon_min)
            * sigmoid((*energy - 0.5) * params.sigmoid_k * 10.0);
}
