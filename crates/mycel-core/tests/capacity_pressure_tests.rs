// SPDX-License-Identifier: Apache-2.0
#![allow(missing_docs)]
//! Behavior under sustained capacity pressure: the arena never
//! overflows, exhaustion is counted, and the homeostat tightens
//! pruning instead of crashing.

use mycel_core::math::Prng;
use mycel_core::{Engine, EngineConfig};

#[test]
fn noise_against_a_tiny_arena_stays_within_caps() {
    let mut engine = Engine::new(EngineConfig {
        vertex_cap: 16,
        edge_cap: 64,
        seed: 8,
        log_period: 0,
        ..EngineConfig::default()
    })
    .unwrap();
    let initial_prune_rate = engine.params().prune_rate;

    let mut noise = Prng::from_seed(1234);
    for _ in 0..300 {
        let frame: Vec<u8> = (0..16).map(|_| noise.next_index(256) as u8).collect();
        engine.push_input(&frame);
        engine.tick().unwrap();

        let stats = engine.stats();
        assert!(stats.vertex_count <= 16);
        assert!(stats.edge_count <= 64);
    }

    let stats = engine.stats();
    assert!(
        stats.counters.capacity_exhausted > 0,
        "256 byte values against 16 vertices must miss"
    );
    assert!(
        engine.params().prune_rate > initial_prune_rate,
        "capacity pressure must tighten pruning: {} -> {}",
        initial_prune_rate,
        engine.params().prune_rate
    );
}

#[test]
fn adaptive_parameters_hold_their_bounds_under_pressure() {
    let mut engine = Engine::new(EngineConfig {
        vertex_cap: 8,
        edge_cap: 16,
        seed: 9,
        log_period: 0,
        ..EngineConfig::default()
    })
    .unwrap();

    let mut noise = Prng::from_seed(77);
    for _ in 0..500 {
        let frame: Vec<u8> = (0..8).map(|_| noise.next_index(256) as u8).collect();
        engine.push_input(&frame);
        engine.tick().unwrap();
    }

    let mut clamped = *engine.params();
    clamped.clamp_all();
    assert_eq!(*engine.params(), clamped);

    let stats = engine.stats();
    assert!(stats.epsilon >= engine.params().epsilon_min - 1e-6);
    assert!(stats.epsilon <= engine.params().epsilon_max + 1e-6);
    assert!((0.0..=1.0).contains(&stats.energy));
}

#[test]
fn degree_sums_survive_churn() {
    let mut engine = Engine::new(EngineConfig {
        vertex_cap: 24,
        edge_cap: 48,
        seed: 10,
        log_period: 0,
        ..EngineConfig::default()
    })
    .unwrap();

    let mut noise = Prng::from_seed(555);
    for _ in 0..400 {
        let frame: Vec<u8> = (0..12).map(|_| noise.next_index(64) as u8).collect();
        engine.push_input(&frame);
        engine.tick().unwrap();
    }

    let mut in_sum = 0u64;
    let mut out_sum = 0u64;
    for (_, v) in engine.arena().iter_live_vertices() {
        in_sum += u64::from(v.in_degree);
        out_sum += u64::from(v.out_degree);
    }
    let edges = u64::from(engine.arena().edge_count());
    assert_eq!(in_sum, edges);
    assert_eq!(out_sum, edges);

    // Every live edge references live endpoints.
    for (_, e) in engine.arena().iter_live_edges() {
        let src = mycel_core::VertexId::from_raw(e.src);
        let dst = mycel_core::VertexId::from_raw(e.dst);
        assert!(engine.arena().vertex(src).is_some());
        assert!(engine.arena().vertex(dst).is_some());
    }
}
