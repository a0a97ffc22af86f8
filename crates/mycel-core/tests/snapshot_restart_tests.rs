// SPDX-License-Identifier: Apache-2.0
#![allow(missing_docs)]
//! Snapshot persistence laws: restore reproduces the terminal state,
//! and snapshot -> restore -> snapshot is byte-stable when no ticks run
//! in between.

use mycel_core::{Engine, EngineConfig, VertexId};

fn config(path: &std::path::Path) -> EngineConfig {
    EngineConfig {
        vertex_cap: 64,
        edge_cap: 256,
        seed: 5,
        state_path: Some(path.to_path_buf()),
        // Keep the byte population to exactly what the tests feed.
        self_observe: false,
        log_period: 0,
        ..EngineConfig::default()
    }
}

fn live_ids(engine: &Engine) -> Vec<u64> {
    let mut ids: Vec<u64> = engine
        .arena()
        .iter_live_vertices()
        .map(|(id, _)| id.raw())
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn restore_reproduces_tick_and_live_vertex_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.state");

    let (tick, ids, params_before) = {
        let mut engine = Engine::new(config(&path)).unwrap();
        for i in 0..120u32 {
            engine.push_input(&[(i % 17) as u8, (i % 5) as u8]);
            engine.tick().unwrap();
        }
        engine.snapshot_now().unwrap();
        (engine.current_tick(), live_ids(&engine), *engine.params())
        // Dropping the engine releases the advisory lock.
    };

    let restored = Engine::new(config(&path)).unwrap();
    assert_eq!(restored.current_tick(), tick);
    assert_eq!(live_ids(&restored), ids);
    assert_eq!(*restored.params(), params_before);
}

#[test]
fn restore_then_snapshot_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.state");

    {
        let mut engine = Engine::new(config(&path)).unwrap();
        for i in 0..80u32 {
            engine.push_input(&[(i % 11) as u8]);
            engine.tick().unwrap();
        }
        engine.snapshot_now().unwrap();
    }

    let before = std::fs::read(&path).unwrap();
    let mut restored = Engine::new(config(&path)).unwrap();
    restored.snapshot_now().unwrap();
    let after = std::fs::read(&path).unwrap();
    assert_eq!(before, after);
}

#[test]
fn corrupt_snapshot_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.state");

    {
        let mut engine = Engine::new(config(&path)).unwrap();
        for _ in 0..40 {
            engine.push_input(b"abc");
            engine.tick().unwrap();
        }
        engine.snapshot_now().unwrap();
    }

    // Flip a byte inside the vertex table; the checksum must catch it.
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();

    let engine = Engine::new(config(&path)).unwrap();
    assert_eq!(engine.current_tick(), 0);
    assert_eq!(engine.stats().vertex_count, 0);
}

#[test]
fn second_engine_on_the_same_state_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.state");
    let _first = Engine::new(config(&path)).unwrap();
    let second = Engine::new(config(&path));
    assert!(matches!(
        second,
        Err(mycel_core::EngineError::AlreadyRunning(_))
    ));
}

#[test]
fn restored_runs_reuse_their_sensory_vertices() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.state");

    let count = {
        let mut engine = Engine::new(config(&path)).unwrap();
        for _ in 0..30 {
            engine.push_input(b"pq");
            engine.tick().unwrap();
        }
        engine.snapshot_now().unwrap();
        engine.stats().vertex_count
    };

    let mut restored = Engine::new(config(&path)).unwrap();
    for _ in 0..30 {
        restored.push_input(b"pq");
        restored.tick().unwrap();
    }
    // The same two byte patterns must not grow new sensory vertices.
    let sensory: Vec<_> = restored
        .arena()
        .iter_live_vertices()
        .filter(|(_, v)| v.is_sensory())
        .collect();
    assert_eq!(sensory.len(), 2);
    assert!(restored.stats().vertex_count >= count.min(2));
}

#[test]
fn restored_handles_stay_valid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.state");

    let id = {
        let mut engine = Engine::new(config(&path)).unwrap();
        engine.push_input(b"q");
        engine.tick().unwrap();
        engine.snapshot_now().unwrap();
        live_ids(&engine)[0]
    };

    let restored = Engine::new(config(&path)).unwrap();
    let handle = VertexId::from_raw(id);
    let vertex = restored.arena().vertex(handle).unwrap();
    assert!(vertex.is_sensory());
}
