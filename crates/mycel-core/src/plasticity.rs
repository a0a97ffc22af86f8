// SPDX-License-Identifier: Apache-2.0
//! Structural plasticity: probabilistic node creation, edge creation,
//! pruning, and meta-node (layer) emergence.
//!
//! Every operation here samples O(k) candidates instead of scanning all
//! pairs, and every random draw comes from the engine's PRNG in a fixed
//! order (slot order for scans, sample order for pairs), which keeps
//! structural evolution replayable.

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaError};
use crate::constants::{
    ACTIVATION_FLOOR, COOC_TABLE_CAP, CO_FREQ_REF, DENSITY_REF, INITIAL_THETA, INITIAL_WEIGHT,
    LAMBDA_DECAY, LAYER_LINK_SAMPLE, LAYER_MIN_SIZE, NODE_PRUNE_PROB, NODE_STALE_REF,
    PAIR_SAMPLES, PRUNE_WEIGHT_REF, STALE_REF,
};
use crate::ident::VertexId;
use crate::math::{sigmoid, soft_above, soft_below, Prng};
use crate::params::AdaptiveParams;
use crate::record::FLAG_META;

/// Structural changes applied during one tick.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PlasticityReport {
    pub nodes_created: u32,
    pub edges_created: u32,
    pub edges_pruned: u32,
    pub nodes_pruned: u32,
    pub metas_created: u32,
    pub capacity_misses: u32,
    pub invalid_refs: u32,
}

/// Cross-tick state of the structural engine: decayed co-occurrence
/// tables and the previous tick's active set.
#[derive(Debug, Default)]
pub(crate) struct Plasticity {
    /// Unordered same-tick co-activation counts, keyed by slot pair.
    cooc_same: FxHashMap<u64, f32>,
    /// Ordered tick-to-next-tick co-occurrence counts.
    cooc_seq: FxHashMap<u64, f32>,
    /// Slots above the activation floor on the previous tick.
    prev_active: Vec<u32>,
}

fn unordered_key(a: u32, b: u32) -> u64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    (u64::from(hi) << 32) | u64::from(lo)
}

fn ordered_key(from: u32, to: u32) -> u64 {
    (u64::from(from) << 32) | u64::from(to)
}

fn bump(table: &mut FxHashMap<u64, f32>, key: u64, amount: f32) {
    if let Some(v) = table.get_mut(&key) {
        *v += amount;
    } else if table.len() < COOC_TABLE_CAP {
        table.insert(key, amount);
    }
}

fn decay(table: &mut FxHashMap<u64, f32>) {
    table.retain(|_, v| {
        *v *= LAMBDA_DECAY;
        *v > 0.05
    });
}

/// Fraction of matching bits between two activation signatures.
fn signature_similarity(a: u32, b: u32) -> f32 {
    (32 - (a ^ b).count_ones()) as f32 / 32.0
}

impl Plasticity {
    /// Runs all structural operations for one tick.
    pub(crate) fn step(
        &mut self,
        arena: &mut Arena,
        params: &AdaptiveParams,
        prng: &mut Prng,
        tick: u64,
        energy: f32,
    ) -> PlasticityReport {
        let mut report = PlasticityReport::default();
        let mut forced_used = false;

        let active: Vec<u32> = arena
            .iter_live_vertices()
            .filter(|(_, v)| v.activation > ACTIVATION_FLOOR)
            .map(|(id, _)| id.slot() as u32)
            .collect();

        decay(&mut self.cooc_same);
        decay(&mut self.cooc_seq);

        self.create_nodes(arena, params, prng, tick, energy, &active, &mut forced_used, &mut report);
        self.create_edges(arena, params, prng, tick, &active, &mut forced_used, &mut report);
        Self::prune_edges(arena, params, prng, &mut report);
        Self::prune_nodes(arena, prng, tick, &mut report);
        self.emerge_layer(arena, params, prng, tick, energy, &active, &mut forced_used, &mut report);

        self.prev_active = active;
        report
    }

    /// Co-activation node creation: sampled active pairs with similar
    /// signatures and a history of firing together spawn a shared
    /// meta-vertex.
    #[allow(clippy::too_many_arguments)]
    fn create_nodes(
        &mut self,
        arena: &mut Arena,
        params: &AdaptiveParams,
        prng: &mut Prng,
        tick: u64,
        energy: f32,
        active: &[u32],
        forced_used: &mut bool,
        report: &mut PlasticityReport,
    ) {
        if active.len() < 2 {
            return;
        }
        for _ in 0..PAIR_SAMPLES {
            let i = active[prng.next_index(active.len())];
            let j = active[prng.next_index(active.len())];
            if i == j {
                continue;
            }
            let key = unordered_key(i, j);
            bump(&mut self.cooc_same, key, 1.0);
            let co_freq = self.cooc_same.get(&key).copied().unwrap_or(0.0);

            let (sig_i, sig_j, act_i, act_j) = {
                let vertices = arena.vertex_table();
                let a = &vertices[i as usize];
                let b = &vertices[j as usize];
                (a.signature, b.signature, a.activation, b.activation)
            };
            let similarity = signature_similarity(sig_i, sig_j);
            if similarity <= crate::constants::SIM_FLOOR || co_freq <= CO_FREQ_REF {
                continue;
            }
            let novelty = (co_freq / CO_FREQ_REF) * similarity;
            let p = params.create_rate * sigmoid(10.0 * novelty - 5.0) * (1.0 + energy);
            if !prng.chance(p) {
                continue;
            }
            let (Some(vi), Some(vj)) = (arena.vertex_id_at(i as usize), arena.vertex_id_at(j as usize))
            else {
                report.invalid_refs += 1;
                continue;
            };
            let Some(meta) = alloc_vertex_recovering(arena, tick, forced_used, report) else {
                continue;
            };
            if let Some(v) = arena.vertex_mut(meta) {
                v.flags |= FLAG_META;
                v.theta = INITIAL_THETA;
                v.last_active_tick = tick;
                v.activation = act_i.min(act_j);
            }
            for src in [vi, vj] {
                if let Some(slot) = alloc_edge_recovering(arena, src, meta, tick, forced_used, report)
                {
                    if let Some(e) = arena.edge_mut(slot) {
                        e.w_fast = INITIAL_WEIGHT;
                    }
                }
            }
            report.nodes_created += 1;
        }
    }

    /// Edge creation from temporal succession: vertex active at `t`
    /// followed by a vertex active at `t+1` earns a directed edge once
    /// the pairing repeats.
    #[allow(clippy::too_many_arguments)]
    fn create_edges(
        &mut self,
        arena: &mut Arena,
        params: &AdaptiveParams,
        prng: &mut Prng,
        tick: u64,
        active: &[u32],
        forced_used: &mut bool,
        report: &mut PlasticityReport,
    ) {
        if self.prev_active.is_empty() || active.is_empty() {
            return;
        }
        for _ in 0..PAIR_SAMPLES {
            let from = self.prev_active[prng.next_index(self.prev_active.len())];
            let to = active[prng.next_index(active.len())];
            if from == to {
                continue;
            }
            let key = ordered_key(from, to);
            bump(&mut self.cooc_seq, key, 1.0);
            let co_freq = self.cooc_seq.get(&key).copied().unwrap_or(0.0);

            let (Some(src), Some(dst)) = (
                arena.vertex_id_at(from as usize),
                arena.vertex_id_at(to as usize),
            ) else {
                report.invalid_refs += 1;
                continue;
            };
            if arena.edge_between(src, dst).is_some() {
                continue;
            }
            // Usefulness of the reverse path, when one exists, argues
            // that this direction carries signal too.
            let reverse_bonus = arena
                .edge_between(dst, src)
                .and_then(|slot| arena.edge(slot))
                .map_or(0.0, |e| e.avg_u.max(0.0));
            let p = params.create_rate * (co_freq / (co_freq + CO_FREQ_REF)) * (1.0 + reverse_bonus);
            if !prng.chance(p) {
                continue;
            }
            if let Some(slot) = alloc_edge_recovering(arena, src, dst, tick, forced_used, report) {
                if let Some(e) = arena.edge_mut(slot) {
                    if e.use_count == 0 && e.w_fast == 0.0 {
                        e.w_fast = INITIAL_WEIGHT;
                    }
                }
                report.edges_created += 1;
            }
        }
    }

    /// Probabilistic edge pruning over weak, unused, stale edges.
    fn prune_edges(
        arena: &mut Arena,
        params: &AdaptiveParams,
        prng: &mut Prng,
        report: &mut PlasticityReport,
    ) {
        for slot in 0..arena.edge_high() {
            let Some(handle) = arena.edge_slot_at(slot) else {
                continue;
            };
            let (w_eff, use_count, stale) = {
                let edge = &arena.edge_table()[slot];
                (edge.w_eff(), edge.use_count, edge.stale_ticks)
            };
            let p_weak = soft_below(w_eff, PRUNE_WEIGHT_REF);
            let p_unused = soft_below(use_count as f32, 10.0);
            let p_stale = soft_above(stale as f32, STALE_REF);
            let p_prune = params.prune_rate * p_weak * p_unused * p_stale;
            if prng.chance(p_prune) && arena.free_edge(handle).is_ok() {
                report.edges_pruned += 1;
            }
        }
    }

    /// Deletes isolated, stale, unprotected vertices with a fixed
    /// probability.
    fn prune_nodes(arena: &mut Arena, prng: &mut Prng, tick: u64, report: &mut PlasticityReport) {
        for slot in 0..arena.vertex_high() {
            let Some(handle) = arena.vertex_id_at(slot) else {
                continue;
            };
            let prunable = {
                let v = &arena.vertex_table()[slot];
                !v.is_protected()
                    && !v.is_meta()
                    && v.in_degree == 0
                    && v.out_degree == 0
                    && tick.saturating_sub(v.last_active_tick) > NODE_STALE_REF
            };
            if prunable && prng.chance(NODE_PRUNE_PROB) && arena.free_vertex(handle).is_ok() {
                report.nodes_pruned += 1;
            }
        }
    }

    /// Meta-node emergence: a dense, active neighbourhood around a
    /// sampled vertex gets summarised by a fresh meta-vertex.
    #[allow(clippy::too_many_arguments)]
    fn emerge_layer(
        &mut self,
        arena: &mut Arena,
        params: &AdaptiveParams,
        prng: &mut Prng,
        tick: u64,
        energy: f32,
        active: &[u32],
        forced_used: &mut bool,
        report: &mut PlasticityReport,
    ) {
        if active.is_empty() || !prng.chance(params.layer_rate * (1.0 + 0.5 * energy)) {
            return;
        }
        let centre = active[prng.next_index(active.len())];

        let mut neighbours: Vec<u32> = Vec::new();
        for (_, edge) in arena.iter_live_edges() {
            let src = VertexId::from_raw(edge.src).slot() as u32;
            let dst = VertexId::from_raw(edge.dst).slot() as u32;
            if src == centre {
                neighbours.push(dst);
            } else if dst == centre {
                neighbours.push(src);
            }
        }
        neighbours.sort_unstable();
        neighbours.dedup();
        if neighbours.len() < LAYER_MIN_SIZE {
            return;
        }
        let active_count = neighbours
            .iter()
            .filter(|&&slot| arena.vertex_table()[slot as usize].activation > ACTIVATION_FLOOR)
            .count();
        let density = active_count as f32 / neighbours.len() as f32;
        let p = soft_above(density, DENSITY_REF) * soft_above(neighbours.len() as f32, LAYER_MIN_SIZE as f32);
        if !prng.chance(p) {
            return;
        }

        let Some(meta) = alloc_vertex_recovering(arena, tick, forced_used, report) else {
            return;
        };
        let cluster_tag = meta.slot() as u32 + 1;
        if let Some(v) = arena.vertex_mut(meta) {
            v.flags |= FLAG_META;
            v.theta = INITIAL_THETA;
            v.last_active_tick = tick;
            v.cluster_id = cluster_tag;
        }
        let link_count = neighbours.len().min(LAYER_LINK_SAMPLE);
        for _ in 0..link_count {
            let slot = neighbours[prng.next_index(neighbours.len())];
            let Some(member) = arena.vertex_id_at(slot as usize) else {
                report.invalid_refs += 1;
                continue;
            };
            if let Some(edge) = alloc_edge_recovering(arena, member, meta, tick, forced_used, report)
            {
                if let Some(e) = arena.edge_mut(edge) {
                    if e.use_count == 0 && e.w_fast == 0.0 {
                        e.w_fast = INITIAL_WEIGHT;
                    }
                }
                if let Some(v) = arena.vertex_mut(member) {
                    v.cluster_id = cluster_tag;
                }
            }
        }
        report.metas_created += 1;
    }
}

/// Aggressive deterministic pruning pass used to recover from capacity
/// exhaustion: weak stale edges first, then isolated stale vertices.
///
/// Returns how many objects were freed.
pub(crate) fn forced_prune(arena: &mut Arena, tick: u64) -> u32 {
    let mut freed = 0u32;
    for slot in 0..arena.edge_high() {
        let Some(handle) = arena.edge_slot_at(slot) else {
            continue;
        };
        let weak_and_stale = {
            let edge = &arena.edge_table()[slot];
            edge.w_eff() < PRUNE_WEIGHT_REF && edge.stale_ticks > 10
        };
        if weak_and_stale && arena.free_edge(handle).is_ok() {
            freed += 1;
        }
    }
    for slot in 0..arena.vertex_high() {
        let Some(handle) = arena.vertex_id_at(slot) else {
            continue;
        };
        let prunable = {
            let v = &arena.vertex_table()[slot];
            !v.is_protected()
                && v.in_degree == 0
                && v.out_degree == 0
                && tick.saturating_sub(v.last_active_tick) > 10
        };
        if prunable && arena.free_vertex(handle).is_ok() {
            freed += 1;
        }
    }
    freed
}

fn alloc_vertex_recovering(
    arena: &mut Arena,
    tick: u64,
    forced_used: &mut bool,
    report: &mut PlasticityReport,
) -> Option<VertexId> {
    match arena.allocate_vertex() {
        Ok(id) => Some(id),
        Err(ArenaError::CapacityExhausted) => {
            report.capacity_misses += 1;
            if *forced_used {
                return None;
            }
            *forced_used = true;
            forced_prune(arena, tick);
            arena.allocate_vertex().ok()
        }
        Err(_) => {
            report.invalid_refs += 1;
            None
        }
    }
}

fn alloc_edge_recovering(
    arena: &mut Arena,
    src: VertexId,
    dst: VertexId,
    tick: u64,
    forced_used: &mut bool,
    report: &mut PlasticityReport,
) -> Option<crate::ident::EdgeSlot> {
    match arena.allocate_edge(src, dst) {
        Ok(slot) => Some(slot),
        Err(ArenaError::CapacityExhausted) => {
            report.capacity_misses += 1;
            if *forced_used {
                return None;
            }
            *forced_used = true;
            forced_prune(arena, tick);
            arena.allocate_edge(src, dst).ok()
        }
        Err(ArenaError::InvalidVertex | ArenaError::SelfLoop) => {
            report.invalid_refs += 1;
            None
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::W_MAX;

    fn active_arena(n: usize) -> Arena {
        let mut arena = Arena::new(64, 256);
        for _ in 0..n {
            let id = arena.allocate_vertex().unwrap();
            let v = arena.vertex_mut(id).unwrap();
            v.activation = 1.0;
            v.signature = 0xffff_ffff;
        }
        arena
    }

    #[test]
    fn repeated_co_activation_eventually_creates_a_meta_node() {
        let mut arena = active_arena(2);
        let mut plasticity = Plasticity::default();
        let mut params = AdaptiveParams::default();
        params.create_rate = 0.1;
        let mut prng = Prng::from_seed(11);
        let mut created = 0;
        for tick in 0..500 {
            let report = plasticity.step(&mut arena, &params, &mut prng, tick, 0.5);
            created += report.nodes_created;
            // Keep the pair co-active between steps.
            for slot in 0..2 {
                let id = arena.vertex_id_at(slot).unwrap();
                let v = arena.vertex_mut(id).unwrap();
                v.activation = 1.0;
                v.signature = 0xffff_ffff;
            }
        }
        assert!(created > 0, "no meta node after 500 co-active ticks");
        assert!(arena
            .iter_live_vertices()
            .any(|(_, v)| v.is_meta() && v.in_degree >= 2));
    }

    #[test]
    fn succession_creates_directed_edges() {
        let mut arena = active_arena(2);
        let mut plasticity = Plasticity::default();
        let mut params = AdaptiveParams::default();
        params.create_rate = 0.1;
        let mut prng = Prng::from_seed(3);
        // Alternate which vertex is active so ordered pairs repeat.
        for tick in 0..500 {
            let a = arena.vertex_id_at(0).unwrap();
            let b = arena.vertex_id_at(1).unwrap();
            let phase = tick % 2 == 0;
            // Distinct signatures keep same-tick node creation quiet.
            {
                let v = arena.vertex_mut(a).unwrap();
                v.activation = if phase { 1.0 } else { 0.0 };
                v.signature = 0xaaaa_aaaa;
            }
            {
                let v = arena.vertex_mut(b).unwrap();
                v.activation = if phase { 0.0 } else { 1.0 };
                v.signature = 0x5555_5555;
            }
            plasticity.step(&mut arena, &params, &mut prng, tick, 0.2);
        }
        assert!(arena.edge_count() > 0, "no succession edge created");
    }

    #[test]
    fn weak_stale_edges_get_pruned() {
        let mut arena = Arena::new(8, 8);
        let a = arena.allocate_vertex().unwrap();
        let b = arena.allocate_vertex().unwrap();
        let e = arena.allocate_edge(a, b).unwrap();
        {
            let edge = arena.edge_mut(e).unwrap();
            edge.w_fast = 0.5;
            edge.stale_ticks = 1000;
        }
        let mut params = AdaptiveParams::default();
        params.prune_rate = 1e-2;
        let mut prng = Prng::from_seed(17);
        let mut report = PlasticityReport::default();
        for _ in 0..5000 {
            Plasticity::prune_edges(&mut arena, &params, &mut prng, &mut report);
            if report.edges_pruned > 0 {
                break;
            }
        }
        assert_eq!(report.edges_pruned, 1);
        assert_eq!(arena.edge_count(), 0);
    }

    #[test]
    fn strong_edges_survive_pruning() {
        let mut arena = Arena::new(8, 8);
        let a = arena.allocate_vertex().unwrap();
        let b = arena.allocate_vertex().unwrap();
        let e = arena.allocate_edge(a, b).unwrap();
        {
            let edge = arena.edge_mut(e).unwrap();
            edge.w_fast = W_MAX;
            edge.w_slow = W_MAX;
            edge.use_count = 10_000;
            edge.stale_ticks = 0;
        }
        let mut params = AdaptiveParams::default();
        params.prune_rate = 1e-2;
        let mut prng = Prng::from_seed(23);
        let mut report = PlasticityReport::default();
        for _ in 0..5000 {
            Plasticity::prune_edges(&mut arena, &params, &mut prng, &mut report);
        }
        assert_eq!(arena.edge_count(), 1);
    }

    #[test]
    fn isolated_stale_nodes_are_pruned_but_sensory_nodes_survive() {
        let mut arena = Arena::new(8, 8);
        let plain = arena.allocate_vertex().unwrap();
        let sensory = arena.allocate_vertex().unwrap();
        arena.vertex_mut(sensory).unwrap().flags |= crate::record::FLAG_SENSORY;
        let mut prng = Prng::from_seed(41);
        let mut report = PlasticityReport::default();
        for _ in 0..2000 {
            Plasticity::prune_nodes(&mut arena, &mut prng, 10_000, &mut report);
        }
        assert!(arena.vertex(plain).is_none(), "stale isolated vertex kept");
        assert!(arena.vertex(sensory).is_some(), "sensory vertex pruned");
    }

    #[test]
    fn forced_prune_frees_capacity() {
        let mut arena = Arena::new(4, 4);
        let a = arena.allocate_vertex().unwrap();
        let b = arena.allocate_vertex().unwrap();
        let e = arena.allocate_edge(a, b).unwrap();
        arena.edge_mut(e).unwrap().stale_ticks = 100;
        let freed = forced_prune(&mut arena, 1000);
        // The weak edge goes first, then both isolated stale vertices.
        assert_eq!(freed, 3);
        assert_eq!(arena.vertex_count(), 0);
        assert_eq!(arena.edge_count(), 0);
    }

    #[test]
    fn dense_active_neighbourhood_emerges_a_layer() {
        let mut arena = Arena::new(64, 256);
        let hub = arena.allocate_vertex().unwrap();
        arena.vertex_mut(hub).unwrap().activation = 1.0;
        let mut members = Vec::new();
        for _ in 0..10 {
            let m = arena.allocate_vertex().unwrap();
            arena.vertex_mut(m).unwrap().activation = 1.0;
            arena.allocate_edge(hub, m).unwrap();
            members.push(m);
        }
        let mut plasticity = Plasticity::default();
        let mut params = AdaptiveParams::default();
        // Force the emergence path well above its clamped runtime rate
        // so the sampled centre hits the hub within the iteration bound.
        params.layer_rate = 0.05;
        // Keep co-activation node creation quiet so the assertion sees
        // the layer path.
        params.create_rate = 1e-3;
        let mut prng = Prng::from_seed(7);
        let mut metas = 0;
        for tick in 0..5000 {
            let report = plasticity.step(&mut arena, &params, &mut prng, tick, 0.5);
            metas += report.metas_created;
            for slot in 0..11 {
                if let Some(id) = arena.vertex_id_at(slot) {
                    arena.vertex_mut(id).unwrap().activation = 1.0;
                }
            }
            if metas > 0 {
                break;
            }
        }
        assert!(metas > 0, "no layer emerged from a dense active cluster");
        assert!(arena.iter_live_vertices().any(|(_, v)| v.is_meta()));
    }
}
