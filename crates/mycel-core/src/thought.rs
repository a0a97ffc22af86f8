// SPDX-License-Identifier: Apache-2.0
//! The thought loop: iterated propagation until stability.

use rustc_hash::FxHashMap;

use crate::arena::Arena;
use crate::params::AdaptiveParams;
use crate::propagate;

/// Outcome of one tick's thought.
#[derive(Debug, Clone, Copy)]
pub struct ThoughtStats {
    /// Propagation passes executed.
    pub hops_used: u32,
    /// Whether both deltas fell under their thresholds before the hop
    /// limit.
    pub settled: bool,
}

impl Default for ThoughtStats {
    fn default() -> Self {
        Self {
            hops_used: 0,
            settled: true,
        }
    }
}

/// Iterates the propagator until convergence or the adaptive hop limit.
///
/// Convergence requires *both* the mean activation delta to fall under
/// `activation_eps` and the mean prediction delta to fall under
/// `stability_eps` on the same pass.
pub(crate) fn run(
    arena: &mut Arena,
    params: &AdaptiveParams,
    sensed: &FxHashMap<u32, f32>,
    soma_scratch: &mut Vec<f32>,
) -> ThoughtStats {
    let limit = params.hop_limit();
    for hop in 1..=limit {
        let deltas = propagate::pass(arena, params, sensed, soma_scratch);
        if deltas.mean_activation_delta < params.activation_eps
            && deltas.mean_predicted_delta < params.stability_eps
        {
            return ThoughtStats {
                hops_used: hop,
                settled: true,
            };
        }
    }
    ThoughtStats {
        hops_used: limit,
        settled: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{INITIAL_THETA, MAX_HOPS_LIMIT, MIN_HOPS};
    use crate::record::FLAG_SENSORY;

    #[test]
    fn empty_graph_settles_immediately() {
        let mut arena = Arena::new(4, 4);
        let params = AdaptiveParams::default();
        let sensed = FxHashMap::default();
        let mut scratch = Vec::new();
        let stats = run(&mut arena, &params, &sensed, &mut scratch);
        assert!(stats.settled);
        assert_eq!(stats.hops_used, 1);
    }

    #[test]
    fn hop_limit_bounds_unsettled_thoughts() {
        let mut arena = Arena::new(4, 4);
        let a = arena.allocate_vertex().unwrap();
        {
            let v = arena.vertex_mut(a).unwrap();
            v.flags |= FLAG_SENSORY;
            v.theta = INITIAL_THETA;
        }
        let mut params = AdaptiveParams::default();
        // Impossible thresholds force the limit to be the stopping rule.
        params.activation_eps = 0.0;
        params.stability_eps = 0.0;
        params.max_thought_hops = 3.0;
        let mut sensed = FxHashMap::default();
        sensed.insert(a.slot() as u32, 1.0);
        let mut scratch = Vec::new();
        let stats = run(&mut arena, &params, &sensed, &mut scratch);
        assert!(!stats.settled);
        assert_eq!(stats.hops_used, 3);
    }

    #[test]
    fn hop_limit_is_clamped_to_the_absolute_bounds() {
        let mut params = AdaptiveParams::default();
        params.max_thought_hops = 1e9;
        assert_eq!(params.hop_limit(), MAX_HOPS_LIMIT);
        params.max_thought_hops = 0.0;
        assert_eq!(params.hop_limit(), MIN_HOPS);
    }
}
