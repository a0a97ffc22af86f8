// SPDX-License-Identifier: Apache-2.0
//! Arena storage records for vertices and edges.
//!
//! Both records are fixed-size `#[repr(C)]` Pod structs with explicit
//! field order and no implicit padding, so the snapshot codec can cast
//! whole tables to bytes and back without a serializer. Changing any
//! field here is a snapshot layout change and must bump
//! [`crate::constants::SNAPSHOT_VERSION`].

use bytemuck::{Pod, Zeroable};

use crate::constants::GAMMA_SLOW;

/// Record is occupied by a live object.
pub const FLAG_LIVE: u32 = 1 << 0;
/// Vertex is driven by sensing and exempt from pruning.
pub const FLAG_SENSORY: u32 = 1 << 1;
/// Vertex was created by meta-node (layer) emergence.
pub const FLAG_META: u32 = 1 << 2;
/// Vertex participates in action output.
pub const FLAG_OUTPUT: u32 = 1 << 3;
/// Vertex is protected from pruning regardless of other flags.
pub const FLAG_PROTECTED: u32 = 1 << 4;

/// The upper half of `flags` carries a detector pattern tag (stored as
/// `tag + 1`, so zero means untagged). Sensory vertices keep their
/// pattern identity across snapshot restores this way.
const PATTERN_SHIFT: u32 = 16;

/// Storage record for one vertex (64 bytes).
///
/// Invariants
/// - `activation`, `prev_activation`, `predicted`, `predicted_prev` stay
///   in `[0, 1]`.
/// - `in_degree`/`out_degree` equal the count of live incident edges.
/// - `gen` matches the generation of every live handle pointing here.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct VertexRecord {
    /// Slot reuse generation.
    pub gen: u32,
    /// Bit set over the `FLAG_*` constants.
    pub flags: u32,
    /// Current continuous activation in `[0, 1]`.
    pub activation: f32,
    /// Activation from the previous propagation pass.
    pub prev_activation: f32,
    /// Firing threshold, plastic per vertex.
    pub theta: f32,
    /// Per-pass accumulator of weighted input (transient).
    pub soma: f32,
    /// Most recent prediction, post-nonlinearity.
    pub predicted: f32,
    /// Settled prediction carried over from the previous tick; the
    /// learner's reference when computing surprise.
    pub predicted_prev: f32,
    /// EMA of this vertex's activation, the per-destination baseline for
    /// predictive lift.
    pub baseline: f32,
    /// Count of live incoming edges.
    pub in_degree: u32,
    /// Count of live outgoing edges.
    pub out_degree: u32,
    /// Rolling 32-bit activation history, newest bit last.
    pub signature: u32,
    /// Cluster tag assigned by meta-node emergence (0 = untagged).
    pub cluster_id: u32,
    /// Settled activation at the end of the previous tick; the source
    /// side of the learner's one-tick-lagged co-occurrence counts.
    pub prev_tick_activation: f32,
    /// Tick of the most recent above-floor activation.
    pub last_active_tick: u64,
}

impl VertexRecord {
    /// Whether the slot holds a live vertex.
    pub fn is_live(&self) -> bool {
        self.flags & FLAG_LIVE != 0
    }

    /// Whether this vertex is sensory.
    pub fn is_sensory(&self) -> bool {
        self.flags & FLAG_SENSORY != 0
    }

    /// Whether this vertex was created by layer emergence.
    pub fn is_meta(&self) -> bool {
        self.flags & FLAG_META != 0
    }

    /// Whether pruning must leave this vertex alone.
    pub fn is_protected(&self) -> bool {
        self.flags & (FLAG_SENSORY | FLAG_PROTECTED) != 0
    }

    /// Total live degree.
    pub fn degree(&self) -> u32 {
        self.in_degree + self.out_degree
    }

    /// Tags this vertex with a detector pattern identity.
    pub fn set_pattern_tag(&mut self, tag: u16) {
        self.flags = (self.flags & 0x0000_ffff) | ((u32::from(tag) + 1) << PATTERN_SHIFT);
    }

    /// The detector pattern tag, when one was set.
    pub fn pattern_tag(&self) -> Option<u16> {
        let raw = self.flags >> PATTERN_SHIFT;
        (raw != 0).then(|| (raw - 1) as u16)
    }
}

/// Storage record for one directed edge (64 bytes).
///
/// Invariants
/// - `src != dst`.
/// - `w_fast`, `w_slow` stay in `[0, W_MAX]`; `eligibility` in `[0, 1]`;
///   `credit` in `[-CREDIT_MAX, CREDIT_MAX]`.
/// - `src`/`dst` hold packed [`crate::VertexId`] values of live vertices.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct EdgeRecord {
    /// Slot reuse generation.
    pub gen: u32,
    /// Bit set over the `FLAG_*` constants (only `FLAG_LIVE` applies).
    pub flags: u32,
    /// Packed id of the source vertex.
    pub src: u64,
    /// Packed id of the destination vertex.
    pub dst: u64,
    /// Fast plastic weight.
    pub w_fast: f32,
    /// Slow consolidated weight.
    pub w_slow: f32,
    /// Signed accumulator of prediction contributions.
    pub credit: f32,
    /// Exponentially decaying trace of source activation, in `[0, 1]`.
    pub eligibility: f32,
    /// Decayed count of (src active, dst active next) observations.
    pub c11: f32,
    /// Decayed count of (src active, dst inactive next) observations.
    pub c10: f32,
    /// EMA of recent usefulness.
    pub avg_u: f32,
    /// Lifetime firings.
    pub use_count: u32,
    /// Ticks since last firing; the emergent time carrier.
    pub stale_ticks: u32,
    /// Layout padding; always zero.
    pub reserved: u32,
}

impl EdgeRecord {
    /// Whether the slot holds a live edge.
    pub fn is_live(&self) -> bool {
        self.flags & FLAG_LIVE != 0
    }

    /// Effective weight used by the propagator: a convex blend of the
    /// slow and fast weights.
    pub fn w_eff(&self) -> f32 {
        GAMMA_SLOW * self.w_slow + (1.0 - GAMMA_SLOW) * self.w_fast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_64_bytes() {
        assert_eq!(core::mem::size_of::<VertexRecord>(), 64);
        assert_eq!(core::mem::size_of::<EdgeRecord>(), 64);
    }

    #[test]
    fn zeroed_records_are_dead() {
        let v = VertexRecord::zeroed();
        let e = EdgeRecord::zeroed();
        assert!(!v.is_live());
        assert!(!e.is_live());
    }

    #[test]
    fn effective_weight_blends_fast_and_slow() {
        let mut e = EdgeRecord::zeroed();
        e.w_fast = 10.0;
        e.w_slow = 20.0;
        let expected = GAMMA_SLOW * 20.0 + (1.0 - GAMMA_SLOW) * 10.0;
        assert!((e.w_eff() - expected).abs() < 1e-6);
    }

    #[test]
    fn sensory_implies_protected() {
        let mut v = VertexRecord::zeroed();
        v.flags = FLAG_LIVE | FLAG_SENSORY;
        assert!(v.is_protected());
    }

    #[test]
    fn pattern_tags_round_trip_and_preserve_flags() {
        let mut v = VertexRecord::zeroed();
        v.flags = FLAG_LIVE | FLAG_SENSORY;
        assert_eq!(v.pattern_tag(), None);
        v.set_pattern_tag(0);
        assert_eq!(v.pattern_tag(), Some(0));
        v.set_pattern_tag(255);
        assert_eq!(v.pattern_tag(), Some(255));
        assert!(v.is_live());
        assert!(v.is_sensory());
    }
}
