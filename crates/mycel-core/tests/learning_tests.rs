// SPDX-License-Identifier: Apache-2.0
#![allow(missing_docs)]
//! Learning dynamics end to end: temporal succession grows directed
//! structure, and a fully predictable stream drives surprise (and with
//! it exploration) toward the floor.

use mycel_core::{Engine, EngineConfig, VertexId};

fn quiet(vertex_cap: u32, edge_cap: u32, seed: u64) -> EngineConfig {
    EngineConfig {
        vertex_cap,
        edge_cap,
        seed,
        self_observe: false,
        log_period: 0,
        ..EngineConfig::default()
    }
}

fn sensory_ids(engine: &Engine) -> Vec<VertexId> {
    engine
        .arena()
        .iter_live_vertices()
        .filter(|(_, v)| v.is_sensory())
        .map(|(id, _)| id)
        .collect()
}

#[test]
fn alternating_bytes_grow_an_association_between_their_vertices() {
    let mut engine = Engine::new(quiet(256, 1024, 2)).unwrap();
    for t in 0..3000u64 {
        let byte = if t % 2 == 0 { b'A' } else { b'B' };
        engine.push_input(&[byte]);
        engine.tick().unwrap();
    }

    let sensory = sensory_ids(&engine);
    assert_eq!(sensory.len(), 2, "exactly A and B sensory vertices");
    let (a, b) = (sensory[0], sensory[1]);
    let forward = engine.arena().edge_between(a, b);
    let backward = engine.arena().edge_between(b, a);
    assert!(
        forward.is_some() || backward.is_some(),
        "no association formed between alternating bytes"
    );

    let strongest = [forward, backward]
        .into_iter()
        .flatten()
        .filter_map(|slot| engine.arena().edge(slot))
        .map(|e| e.w_eff())
        .fold(0.0f32, f32::max);
    assert!(strongest > 0.0);
}

#[test]
fn a_fully_predictable_stream_quenches_surprise_and_exploration() {
    let mut engine = Engine::new(quiet(64, 256, 3)).unwrap();
    let mut energy_mid = 0.0;
    for t in 0..8000u64 {
        engine.push_input(b"z");
        engine.tick().unwrap();
        if t == 2000 {
            energy_mid = engine.stats().energy;
        }
    }

    let stats = engine.stats();
    let params = engine.params();
    assert!(
        stats.health.prediction_acc > 0.9,
        "accuracy stalled at {}",
        stats.health.prediction_acc
    );
    assert!(
        stats.energy <= energy_mid + 1e-3,
        "energy rose late in a stationary stream: {energy_mid} -> {}",
        stats.energy
    );
    assert!(
        stats.epsilon < params.epsilon_min + 0.1 * (params.epsilon_max - params.epsilon_min),
        "exploration stayed high: {}",
        stats.epsilon
    );
}

#[test]
fn a_single_vertex_arena_still_senses_and_never_wires() {
    let mut engine = Engine::new(EngineConfig {
        vertex_cap: 1,
        edge_cap: 1,
        seed: 4,
        log_period: 0,
        ..EngineConfig::default()
    })
    .unwrap();

    for t in 0..500u64 {
        engine.push_input(&[(t % 256) as u8]);
        engine.tick().unwrap();
        assert_eq!(engine.stats().vertex_count, 1);
        assert_eq!(engine.stats().edge_count, 0);
    }
    assert!(engine.stats().counters.capacity_exhausted > 0);
}

#[test]
fn prediction_accuracy_beats_chance_on_a_short_cycle() {
    let mut engine = Engine::new(quiet(128, 512, 6)).unwrap();
    let pattern = b"abcabcabc";
    for t in 0..4000usize {
        engine.push_input(&[pattern[t % pattern.len()]]);
        engine.tick().unwrap();
    }
    let stats = engine.stats();
    assert!(
        stats.health.prediction_acc > 0.5,
        "cycle stayed unpredictable: {}",
        stats.health.prediction_acc
    );
}
