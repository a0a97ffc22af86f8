// SPDX-License-Identifier: Apache-2.0
//! Generational handles for arena slots.
//!
//! Slots recycle through free lists, but handle *values* never repeat
//! within a process lifetime: each handle packs `generation << 32 | slot`
//! into a `u64`, and the arena bumps a slot's generation on every reuse.
//! A handle whose generation no longer matches the slot's current record
//! refers to a dead object and is rejected in O(1).

/// Stable identity of a vertex.
///
/// Invariants
/// - The packed value is never reused: freeing a vertex and allocating a
///   new one in the same slot yields a different `VertexId`.
/// - `slot()` is always below the arena's vertex capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(u64);

impl VertexId {
    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        Self((u64::from(generation) << 32) | u64::from(slot))
    }

    /// Arena slot index this handle points at.
    pub fn slot(self) -> usize {
        (self.0 & 0xffff_ffff) as usize
    }

    /// Reuse generation of the slot when this handle was issued.
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The raw packed value, as stored in edge records and snapshots.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Reconstructs a handle from its packed value.
    ///
    /// The result is only meaningful for values previously produced by
    /// [`VertexId::raw`]; liveness is still checked at the arena.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Stable identity of an edge slot.
///
/// Same packing and non-reuse guarantees as [`VertexId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeSlot(u64);

impl EdgeSlot {
    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        Self((u64::from(generation) << 32) | u64::from(slot))
    }

    /// Arena slot index this handle points at.
    pub fn slot(self) -> usize {
        (self.0 & 0xffff_ffff) as usize
    }

    /// Reuse generation of the slot when this handle was issued.
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The raw packed value.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Reconstructs a handle from its packed value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}
