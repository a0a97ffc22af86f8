// SPDX-License-Identifier: Apache-2.0
//! The sensing seam: byte frames become activations on sensory vertices.
//!
//! The core contracts only the [`DetectorSet`] trait; which patterns are
//! detected is the collaborator's concern. [`ByteDetectors`] is the
//! default set shipped with the crate: one sensory vertex per distinct
//! byte value, created on first sight.

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaError};
use crate::constants::INITIAL_THETA;
use crate::ident::VertexId;
use crate::record::{FLAG_PROTECTED, FLAG_SENSORY};

/// Maps input byte frames to activation assignments on sensory vertices.
///
/// Implementations may allocate vertices through the arena on first
/// sight of a new pattern; such vertices must be flagged sensory.
/// Assignments push `(vertex, activation)` pairs into `out`; when two
/// assignments target the same vertex in one frame, the engine keeps the
/// maximum. The return value counts capacity misses (allocation attempts
/// the arena refused), which the engine accumulates and may answer with
/// a forced pruning pass and one retry.
pub trait DetectorSet {
    /// Scans `frame` at `tick` and emits activation assignments.
    fn detect(
        &mut self,
        frame: &[u8],
        tick: u64,
        arena: &mut Arena,
        out: &mut Vec<(VertexId, f32)>,
    ) -> u32;

    /// Re-associates detector state with a freshly restored arena.
    ///
    /// Called once after snapshot restoration; the default does
    /// nothing, which suits stateless detector sets.
    fn rebind(&mut self, arena: &Arena) {
        let _ = arena;
    }
}

/// Default detector set: one sensory vertex per distinct byte value.
///
/// When the arena cannot grow, unseen bytes fall back to re-targeting an
/// already-created sensory vertex (byte value modulo the sensory count),
/// so even a one-vertex arena keeps sensing every frame.
#[derive(Debug, Default)]
pub struct ByteDetectors {
    map: FxHashMap<u8, VertexId>,
    created: Vec<VertexId>,
}

impl ByteDetectors {
    /// Builds an empty detector set.
    pub fn new() -> Self {
        Self::default()
    }

    fn vertex_for(&mut self, byte: u8, arena: &mut Arena, misses: &mut u32) -> Option<VertexId> {
        if let Some(&id) = self.map.get(&byte) {
            if arena.vertex(id).is_some() {
                return Some(id);
            }
            // The mapped vertex died (only possible through snapshot
            // restore mismatch); fall through and remap.
            self.map.remove(&byte);
            self.created.retain(|&v| v != id);
        }
        match arena.allocate_vertex() {
            Ok(id) => {
                if let Some(v) = arena.vertex_mut(id) {
                    v.flags |= FLAG_SENSORY | FLAG_PROTECTED;
                    v.set_pattern_tag(u16::from(byte));
                    v.theta = INITIAL_THETA;
                }
                self.map.insert(byte, id);
                self.created.push(id);
                Some(id)
            }
            Err(ArenaError::CapacityExhausted) => {
                *misses += 1;
                if self.created.is_empty() {
                    None
                } else {
                    let idx = byte as usize % self.created.len();
                    Some(self.created[idx])
                }
            }
            Err(_) => None,
        }
    }
}

impl DetectorSet for ByteDetectors {
    fn rebind(&mut self, arena: &Arena) {
        self.map.clear();
        self.created.clear();
        for (id, vertex) in arena.iter_live_vertices() {
            if !vertex.is_sensory() {
                continue;
            }
            if let Some(tag) = vertex.pattern_tag() {
                if tag <= u16::from(u8::MAX) {
                    self.map.insert(tag as u8, id);
                    self.created.push(id);
                }
            }
        }
    }

    fn detect(
        &mut self,
        frame: &[u8],
        _tick: u64,
        arena: &mut Arena,
        out: &mut Vec<(VertexId, f32)>,
    ) -> u32 {
        let mut misses = 0;
        for &byte in frame {
            if let Some(id) = self.vertex_for(byte, arena, &mut misses) {
                out.push((id, 1.0));
            }
        }
        misses
    }
}
