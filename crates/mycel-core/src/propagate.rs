// SPDX-License-Identifier: Apache-2.0
//! One pass of weighted activation spreading.
//!
//! Determinism contract
//! - The pass is two-phase: all somas are gathered from the *current*
//!   activations, then all vertices commit. No update ever observes a
//!   partially committed pass, so the result is independent of edge
//!   iteration order.
//! - Sensed vertices keep their externally imposed activation for every
//!   pass of the tick; everything else takes the sigmoid prediction.

use rustc_hash::FxHashMap;

use crate::arena::Arena;
use crate::ident::VertexId;
use crate::math::sigmoid;
use crate::params::AdaptiveParams;

/// Mean per-vertex deltas of one pass, the thought loop's convergence
/// signal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PassDeltas {
    pub mean_activation_delta: f32,
    pub mean_predicted_delta: f32,
}

/// Runs one propagation pass over every live vertex.
///
/// `sensed` maps vertex slots to externally imposed activations for this
/// tick. `soma_scratch` is reused across passes to avoid per-pass
/// allocation.
pub(crate) fn pass(
    arena: &mut Arena,
    params: &AdaptiveParams,
    sensed: &FxHashMap<u32, f32>,
    soma_scratch: &mut Vec<f32>,
) -> PassDeltas {
    let vertex_high = arena.vertex_high();
    let edge_high = arena.edge_high();

    soma_scratch.clear();
    soma_scratch.resize(vertex_high, 0.0);

    // Phase 1: gather weighted input per destination.
    {
        let edges = arena.edge_table();
        let vertices = arena.vertex_table();
        for edge in edges[..edge_high].iter().filter(|e| e.is_live()) {
            let src_slot = VertexId::from_raw(edge.src).slot();
            let dst_slot = VertexId::from_raw(edge.dst).slot();
            let activation = vertices[src_slot].activation;
            if activation <= 0.0 {
                continue;
            }
            let temporal = 1.0 / (1.0 + edge.stale_ticks as f32 * params.temporal_decay);
            let degree = vertices[src_slot].out_degree + vertices[dst_slot].in_degree;
            let spatial = 1.0 / (1.0 + params.spatial_k * libm::log1pf(degree as f32));
            soma_scratch[dst_slot] += edge.w_eff() * activation * temporal * spatial;
        }
    }

    // Phase 2: commit activations and predictions.
    let mut activation_delta = 0.0f32;
    let mut predicted_delta = 0.0f32;
    let mut live = 0u32;
    let vertices = arena.vertex_table_mut();
    for (slot, vertex) in vertices[..vertex_high]
        .iter_mut()
        .enumerate()
        .filter(|(_, v)| v.is_live())
    {
        vertex.soma = soma_scratch[slot];
        let predicted = sigmoid((vertex.soma - vertex.theta) / params.activation_scale);
        predicted_delta += (predicted - vertex.predicted).abs();
        vertex.predicted = predicted;
        vertex.prev_activation = vertex.activation;
        // Sensory vertices carry exactly what sensing imposed this tick
        // (zero when nothing did); everything else takes its prediction.
        let next = if vertex.is_sensory() {
            sensed.get(&(slot as u32)).copied().unwrap_or(0.0)
        } else {
            predicted
        };
        let next = next.clamp(0.0, 1.0);
        activation_delta += (next - vertex.activation).abs();
        vertex.activation = next;
        live += 1;
    }

    let denom = live.max(1) as f32;
    PassDeltas {
        mean_activation_delta: activation_delta / denom,
        mean_predicted_delta: predicted_delta / denom,
    }
}
