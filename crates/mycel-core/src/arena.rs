// SPDX-License-Identifier: Apache-2.0
//! Fixed-capacity vertex/edge arena with free-list recycling.
//!
//! The arena exclusively owns all vertex and edge storage; every other
//! component holds only [`VertexId`]/[`EdgeSlot`] handles into it.
//! Slots are recycled through explicit free lists while handle values
//! stay unique for the process lifetime (generation bump on reuse).
//! Live iteration order is slot order, which together with the explicit
//! PRNG makes every structural decision replayable.

use bytemuck::Zeroable;
use thiserror::Error;

use crate::edge_index::{pair_key, EdgeIndex};
use crate::ident::{EdgeSlot, VertexId};
use crate::record::{EdgeRecord, VertexRecord, FLAG_LIVE};

/// Errors produced by arena operations.
///
/// All of these are recoverable at the tick level: the engine counts
/// them and skips the operation rather than aborting the pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    /// No free slot remains for the requested allocation.
    #[error("arena capacity exhausted")]
    CapacityExhausted,
    /// An operation referenced a dead or out-of-range vertex.
    #[error("invalid vertex handle")]
    InvalidVertex,
    /// An operation referenced a dead or out-of-range edge.
    #[error("invalid edge handle")]
    InvalidEdge,
    /// Self-loops are rejected.
    #[error("self-loop rejected")]
    SelfLoop,
    /// A vertex with live incident edges cannot be freed.
    #[error("vertex still has live edges")]
    VertexInUse,
}

/// The owning container for all vertex and edge storage.
#[derive(Debug)]
pub struct Arena {
    vertices: Vec<VertexRecord>,
    edges: Vec<EdgeRecord>,
    vertex_free: Vec<u32>,
    edge_free: Vec<u32>,
    /// Slots below this bound have been used at least once.
    vertex_high: u32,
    edge_high: u32,
    vertex_live: u32,
    edge_live: u32,
    index: EdgeIndex,
}

impl Arena {
    /// Builds an empty arena with the given capacities.
    pub fn new(vertex_cap: u32, edge_cap: u32) -> Self {
        Self {
            vertices: vec![VertexRecord::zeroed(); vertex_cap as usize],
            edges: vec![EdgeRecord::zeroed(); edge_cap as usize],
            vertex_free: Vec::new(),
            edge_free: Vec::new(),
            vertex_high: 0,
            edge_high: 0,
            vertex_live: 0,
            edge_live: 0,
            index: EdgeIndex::with_capacity(edge_cap as usize),
        }
    }

    /// Vertex capacity.
    pub fn vertex_cap(&self) -> u32 {
        self.vertices.len() as u32
    }

    /// Edge capacity.
    pub fn edge_cap(&self) -> u32 {
        self.edges.len() as u32
    }

    /// Count of live vertices.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_live
    }

    /// Count of live edges.
    pub fn edge_count(&self) -> u32 {
        self.edge_live
    }

    /// Fraction of the fuller of the two tables that is in use.
    pub fn capacity_usage(&self) -> f32 {
        let v = self.vertex_live as f32 / (self.vertices.len().max(1)) as f32;
        let e = self.edge_live as f32 / (self.edges.len().max(1)) as f32;
        v.max(e)
    }

    /// Allocates a fresh vertex with zero-default fields.
    ///
    /// # Errors
    /// [`ArenaError::CapacityExhausted`] when no free slot exists.
    pub fn allocate_vertex(&mut self) -> Result<VertexId, ArenaError> {
        let slot = if let Some(slot) = self.vertex_free.pop() {
            slot
        } else if self.vertex_high < self.vertex_cap() {
            let slot = self.vertex_high;
            self.vertex_high += 1;
            slot
        } else {
            return Err(ArenaError::CapacityExhausted);
        };
        let gen = self.vertices[slot as usize].gen.wrapping_add(1).max(1);
        let record = &mut self.vertices[slot as usize];
        *record = VertexRecord::zeroed();
        record.gen = gen;
        record.flags = FLAG_LIVE;
        self.vertex_live += 1;
        Ok(VertexId::new(slot, gen))
    }

    /// Frees an isolated vertex and recycles its slot.
    ///
    /// # Errors
    /// [`ArenaError::InvalidVertex`] for dead handles;
    /// [`ArenaError::VertexInUse`] when live edges still touch it.
    pub fn free_vertex(&mut self, id: VertexId) -> Result<(), ArenaError> {
        let slot = self.resolve_vertex(id)?;
        let record = &mut self.vertices[slot];
        if record.in_degree != 0 || record.out_degree != 0 {
            return Err(ArenaError::VertexInUse);
        }
        record.flags &= !FLAG_LIVE;
        self.vertex_free.push(slot as u32);
        self.vertex_live -= 1;
        Ok(())
    }

    /// Registers a directed edge, or returns the existing slot when the
    /// ordered pair is already present.
    ///
    /// # Errors
    /// [`ArenaError::InvalidVertex`] for dead endpoints;
    /// [`ArenaError::SelfLoop`] when `src == dst`;
    /// [`ArenaError::CapacityExhausted`] when no free slot exists.
    pub fn allocate_edge(&mut self, src: VertexId, dst: VertexId) -> Result<EdgeSlot, ArenaError> {
        let src_slot = self.resolve_vertex(src)?;
        let dst_slot = self.resolve_vertex(dst)?;
        if src_slot == dst_slot {
            return Err(ArenaError::SelfLoop);
        }
        let key = pair_key(src_slot, dst_slot);
        if let Some(existing) = self.index.get(key) {
            let gen = self.edges[existing as usize].gen;
            return Ok(EdgeSlot::new(existing, gen));
        }
        let slot = if let Some(slot) = self.edge_free.pop() {
            slot
        } else if self.edge_high < self.edge_cap() {
            let slot = self.edge_high;
            self.edge_high += 1;
            slot
        } else {
            return Err(ArenaError::CapacityExhausted);
        };
        let gen = self.edges[slot as usize].gen.wrapping_add(1).max(1);
        let record = &mut self.edges[slot as usize];
        *record = EdgeRecord::zeroed();
        record.gen = gen;
        record.flags = FLAG_LIVE;
        record.src = src.raw();
        record.dst = dst.raw();
        self.index.insert(key, slot);
        self.vertices[src_slot].out_degree += 1;
        self.vertices[dst_slot].in_degree += 1;
        self.edge_live += 1;
        Ok(EdgeSlot::new(slot, gen))
    }

    /// Frees an edge, unregisters it, and restores endpoint degrees.
    ///
    /// # Errors
    /// [`ArenaError::InvalidEdge`] for dead handles.
    pub fn free_edge(&mut self, slot: EdgeSlot) -> Result<(), ArenaError> {
        let idx = self.resolve_edge(slot)?;
        let (src_raw, dst_raw) = {
            let record = &self.edges[idx];
            (record.src, record.dst)
        };
        let src_slot = VertexId::from_raw(src_raw).slot();
        let dst_slot = VertexId::from_raw(dst_raw).slot();
        let removed = self.index.remove(pair_key(src_slot, dst_slot));
        debug_assert_eq!(removed, Some(idx as u32), "edge index out of sync");
        debug_assert!(self.vertices[src_slot].out_degree > 0);
        debug_assert!(self.vertices[dst_slot].in_degree > 0);
        self.vertices[src_slot].out_degree = self.vertices[src_slot].out_degree.saturating_sub(1);
        self.vertices[dst_slot].in_degree = self.vertices[dst_slot].in_degree.saturating_sub(1);
        self.edges[idx].flags &= !FLAG_LIVE;
        self.edge_free.push(idx as u32);
        self.edge_live -= 1;
        // Deletion is the only producer of tombstones; reclaim them here
        // so a long-lived process under edge churn never drains the
        // index's EMPTY slots.
        if self.index.needs_rebuild() {
            self.rebuild_index();
        }
        Ok(())
    }

    /// Rebuilds the edge index from the live edge table, discarding
    /// accumulated tombstones.
    fn rebuild_index(&mut self) {
        self.index.clear();
        for slot in 0..self.edge_high as usize {
            let record = self.edges[slot];
            if !record.is_live() {
                continue;
            }
            let src_slot = VertexId::from_raw(record.src).slot();
            let dst_slot = VertexId::from_raw(record.dst).slot();
            self.index.insert(pair_key(src_slot, dst_slot), slot as u32);
        }
    }

    /// Looks up the live edge for an ordered vertex pair.
    pub fn edge_between(&self, src: VertexId, dst: VertexId) -> Option<EdgeSlot> {
        let src_slot = self.resolve_vertex(src).ok()?;
        let dst_slot = self.resolve_vertex(dst).ok()?;
        let idx = self.index.get(pair_key(src_slot, dst_slot))?;
        Some(EdgeSlot::new(idx, self.edges[idx as usize].gen))
    }

    /// Shared access to a live vertex record.
    pub fn vertex(&self, id: VertexId) -> Option<&VertexRecord> {
        let slot = self.resolve_vertex(id).ok()?;
        Some(&self.vertices[slot])
    }

    /// Mutable access to a live vertex record.
    ///
    /// The reference must not be held across allocation or snapshot
    /// operations.
    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut VertexRecord> {
        let slot = self.resolve_vertex(id).ok()?;
        Some(&mut self.vertices[slot])
    }

    /// Shared access to a live edge record.
    pub fn edge(&self, slot: EdgeSlot) -> Option<&EdgeRecord> {
        let idx = self.resolve_edge(slot).ok()?;
        Some(&self.edges[idx])
    }

    /// Mutable access to a live edge record.
    pub fn edge_mut(&mut self, slot: EdgeSlot) -> Option<&mut EdgeRecord> {
        let idx = self.resolve_edge(slot).ok()?;
        Some(&mut self.edges[idx])
    }

    /// Handle of the live vertex occupying `slot`, if any.
    pub fn vertex_id_at(&self, slot: usize) -> Option<VertexId> {
        let record = self.vertices.get(slot)?;
        record
            .is_live()
            .then(|| VertexId::new(slot as u32, record.gen))
    }

    /// Handle of the live edge occupying `slot`, if any.
    pub fn edge_slot_at(&self, slot: usize) -> Option<EdgeSlot> {
        let record = self.edges.get(slot)?;
        record
            .is_live()
            .then(|| EdgeSlot::new(slot as u32, record.gen))
    }

    /// Iterates live vertices in slot order.
    pub fn iter_live_vertices(&self) -> impl Iterator<Item = (VertexId, &VertexRecord)> {
        self.vertices[..self.vertex_high as usize]
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_live())
            .map(|(slot, r)| (VertexId::new(slot as u32, r.gen), r))
    }

    /// Iterates live edges in slot order.
    pub fn iter_live_edges(&self) -> impl Iterator<Item = (EdgeSlot, &EdgeRecord)> {
        self.edges[..self.edge_high as usize]
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_live())
            .map(|(slot, r)| (EdgeSlot::new(slot as u32, r.gen), r))
    }

    fn resolve_vertex(&self, id: VertexId) -> Result<usize, ArenaError> {
        let slot = id.slot();
        match self.vertices.get(slot) {
            Some(r) if r.is_live() && r.gen == id.generation() => Ok(slot),
            _ => Err(ArenaError::InvalidVertex),
        }
    }

    fn resolve_edge(&self, slot: EdgeSlot) -> Result<usize, ArenaError> {
        let idx = slot.slot();
        match self.edges.get(idx) {
            Some(r) if r.is_live() && r.gen == slot.generation() => Ok(idx),
            _ => Err(ArenaError::InvalidEdge),
        }
    }

    // ── crate-internal raw access ───────────────────────────────────
    //
    // The hot loops (propagator, learner) walk the tables by slot with
    // split borrows. These stay `pub(crate)` so arena invariants cannot
    // be broken from outside the crate.

    pub(crate) fn vertex_high(&self) -> usize {
        self.vertex_high as usize
    }

    pub(crate) fn edge_high(&self) -> usize {
        self.edge_high as usize
    }

    pub(crate) fn vertex_table(&self) -> &[VertexRecord] {
        &self.vertices
    }

    pub(crate) fn vertex_table_mut(&mut self) -> &mut [VertexRecord] {
        &mut self.vertices
    }

    pub(crate) fn edge_table(&self) -> &[EdgeRecord] {
        &self.edges
    }

    pub(crate) fn tables_mut(&mut self) -> (&mut [VertexRecord], &mut [EdgeRecord]) {
        (&mut self.vertices, &mut self.edges)
    }

    pub(crate) fn free_lists(&self) -> (&[u32], &[u32]) {
        (&self.vertex_free, &self.edge_free)
    }

    /// Rebuilds an arena from snapshot tables.
    ///
    /// Recomputes high-water marks and live counts, validates that the
    /// free lists account for every used-but-dead slot, and rebuilds
    /// the edge index. Returns `None` when the tables are inconsistent
    /// (the caller treats that as a corrupt snapshot).
    pub(crate) fn from_parts(
        vertices: Vec<VertexRecord>,
        edges: Vec<EdgeRecord>,
        vertex_free: Vec<u32>,
        edge_free: Vec<u32>,
    ) -> Option<Self> {
        let vertex_cap = vertices.len();
        let edge_cap = edges.len();

        let mut vertex_live = 0u32;
        let mut vertex_high = 0u32;
        for (slot, record) in vertices.iter().enumerate() {
            if record.is_live() {
                vertex_live += 1;
                vertex_high = vertex_high.max(slot as u32 + 1);
            }
        }
        for &slot in &vertex_free {
            if slot as usize >= vertex_cap || vertices[slot as usize].is_live() {
                return None;
            }
            vertex_high = vertex_high.max(slot + 1);
        }
        if u64::from(vertex_live) + vertex_free.len() as u64 != u64::from(vertex_high) {
            return None;
        }

        let mut edge_live = 0u32;
        let mut edge_high = 0u32;
        let mut index = EdgeIndex::with_capacity(edge_cap);
        for (slot, record) in edges.iter().enumerate() {
            if !record.is_live() {
                continue;
            }
            edge_live += 1;
            edge_high = edge_high.max(slot as u32 + 1);
            let src = VertexId::from_raw(record.src);
            let dst = VertexId::from_raw(record.dst);
            let live_endpoint = |id: VertexId| {
                vertices
                    .get(id.slot())
                    .is_some_and(|r| r.is_live() && r.gen == id.generation())
            };
            if !live_endpoint(src) || !live_endpoint(dst) || src.slot() == dst.slot() {
                return None;
            }
            let key = pair_key(src.slot(), dst.slot());
            if index.get(key).is_some() {
                return None;
            }
            index.insert(key, slot as u32);
        }
        for &slot in &edge_free {
            if slot as usize >= edge_cap || edges[slot as usize].is_live() {
                return None;
            }
            edge_high = edge_high.max(slot + 1);
        }
        if u64::from(edge_live) + edge_free.len() as u64 != u64::from(edge_high) {
            return None;
        }

        Some(Self {
            vertices,
            edges,
            vertex_free,
            edge_free,
            vertex_high,
            edge_high,
            vertex_live,
            edge_live,
            index,
        })
    }
}
