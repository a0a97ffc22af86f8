// SPDX-License-Identifier: Apache-2.0
//! Crash-safe persistence of the arena and globals.
//!
//! Layout (single little-endian file)
//! - Fixed 136-byte header: magic, version, tick, capacities, counts,
//!   PRNG state, the fourteen adaptive parameters, energy and the
//!   homeostat EMAs, free-list lengths.
//! - Vertex table: `vertex_cap` fixed 64-byte records (dead slots carry
//!   a cleared live flag).
//! - Edge table: `edge_cap` fixed 64-byte records.
//! - Vertex then edge free lists as raw `u32` slot arrays.
//! - Trailing CRC32 over everything above.
//!
//! Writes go to a sibling temp file and rename into place, so a crash
//! mid-write leaves the previous snapshot intact. Loads validate length,
//! magic, version, and checksum before any field is trusted; a failed
//! validation means the caller starts from an empty arena, never from a
//! half-loaded one. The layout is bit-exact for a single host only;
//! any record or header change must bump [`SNAPSHOT_VERSION`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::constants::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
use crate::record::{EdgeRecord, VertexRecord};

/// Errors from snapshot persistence.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The file failed structural validation (length, magic, checksum,
    /// or internal consistency).
    #[error("snapshot corrupt: {reason}")]
    Corrupt {
        /// Which validation failed.
        reason: &'static str,
    },
    /// The file carries an unsupported layout version.
    #[error("snapshot layout version {found} unsupported (expected {SNAPSHOT_VERSION})")]
    VersionMismatch {
        /// Version found in the header.
        found: u32,
    },
    /// Reading the file failed at the I/O layer.
    #[error("snapshot read failed")]
    ReadFailed(#[source] io::Error),
    /// Writing the file failed; any partial temp file was removed.
    #[error("snapshot write failed")]
    WriteFailed(#[source] io::Error),
    /// Another process holds the advisory lock.
    #[error("state file locked by another process: {0}")]
    Locked(PathBuf),
}

const HEADER_SIZE: usize = core::mem::size_of::<SnapshotHeader>();
const RECORD_SIZE: usize = 64;
const CRC_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct SnapshotHeader {
    magic: u32,
    version: u32,
    tick: u64,
    vertex_cap: u32,
    vertex_count: u32,
    edge_cap: u32,
    edge_count: u32,
    prng_s0: u64,
    prng_s1: u64,
    params: [f32; 14],
    energy: f32,
    acc_ema: f32,
    settle_ema: f32,
    depth_ema: f32,
    mean_surprise: f32,
    vertex_free_len: u32,
    edge_free_len: u32,
    reserved: u32,
}

/// Everything a snapshot carries, in memory.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotState {
    pub tick: u64,
    pub vertex_count: u32,
    pub edge_count: u32,
    pub prng_state: [u64; 2],
    pub params: [f32; 14],
    pub energy: f32,
    pub acc_ema: f32,
    pub settle_ema: f32,
    pub depth_ema: f32,
    pub mean_surprise: f32,
    pub vertices: Vec<VertexRecord>,
    pub edges: Vec<EdgeRecord>,
    pub vertex_free: Vec<u32>,
    pub edge_free: Vec<u32>,
}

impl SnapshotState {
    fn encode(&self) -> Vec<u8> {
        let header = SnapshotHeader {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            tick: self.tick,
            vertex_cap: self.vertices.len() as u32,
            vertex_count: self.vertex_count,
            edge_cap: self.edges.len() as u32,
            edge_count: self.edge_count,
            prng_s0: self.prng_state[0],
            prng_s1: self.prng_state[1],
            params: self.params,
            energy: self.energy,
            acc_ema: self.acc_ema,
            settle_ema: self.settle_ema,
            depth_ema: self.depth_ema,
            mean_surprise: self.mean_surprise,
            vertex_free_len: self.vertex_free.len() as u32,
            edge_free_len: self.edge_free.len() as u32,
            reserved: 0,
        };

        let mut buf = Vec::with_capacity(
            HEADER_SIZE
                + self.vertices.len() * RECORD_SIZE
                + self.edges.len() * RECORD_SIZE
                + (self.vertex_free.len() + self.edge_free.len()) * 4
                + CRC_SIZE,
        );
        buf.extend_from_slice(bytemuck::bytes_of(&header));
        buf.extend_from_slice(bytemuck::cast_slice(&self.vertices));
        buf.extend_from_slice(bytemuck::cast_slice(&self.edges));
        buf.extend_from_slice(bytemuck::cast_slice(&self.vertex_free));
        buf.extend_from_slice(bytemuck::cast_slice(&self.edge_free));

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        buf.extend_from_slice(&hasher.finalize().to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() < HEADER_SIZE + CRC_SIZE {
            return Err(SnapshotError::Corrupt {
                reason: "file shorter than header",
            });
        }
        let (body, crc_bytes) = bytes.split_at(bytes.len() - CRC_SIZE);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(body);
        let mut stored = [0u8; CRC_SIZE];
        stored.copy_from_slice(crc_bytes);
        if hasher.finalize() != u32::from_le_bytes(stored) {
            return Err(SnapshotError::Corrupt {
                reason: "checksum mismatch",
            });
        }

        let header: SnapshotHeader = bytemuck::pod_read_unaligned(&body[..HEADER_SIZE]);
        if header.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::Corrupt {
                reason: "bad magic",
            });
        }
        if header.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: header.version,
            });
        }

        let vertex_cap = header.vertex_cap as usize;
        let edge_cap = header.edge_cap as usize;
        let vertex_free_len = header.vertex_free_len as usize;
        let edge_free_len = header.edge_free_len as usize;
        let expected = HEADER_SIZE
            + (vertex_cap + edge_cap) * RECORD_SIZE
            + (vertex_free_len + edge_free_len) * 4;
        if body.len() != expected {
            return Err(SnapshotError::Corrupt {
                reason: "length does not match header capacities",
            });
        }
        if header.vertex_count > header.vertex_cap || header.edge_count > header.edge_cap {
            return Err(SnapshotError::Corrupt {
                reason: "counts exceed capacities",
            });
        }

        let mut offset = HEADER_SIZE;
        let mut vertices = vec![VertexRecord::zeroed(); vertex_cap];
        let vertex_bytes = vertex_cap * RECORD_SIZE;
        bytemuck::cast_slice_mut::<VertexRecord, u8>(&mut vertices)
            .copy_from_slice(&body[offset..offset + vertex_bytes]);
        offset += vertex_bytes;

        let mut edges = vec![EdgeRecord::zeroed(); edge_cap];
        let edge_bytes = edge_cap * RECORD_SIZE;
        bytemuck::cast_slice_mut::<EdgeRecord, u8>(&mut edges)
            .copy_from_slice(&body[offset..offset + edge_bytes]);
        offset += edge_bytes;

        let mut vertex_free = vec![0u32; vertex_free_len];
        bytemuck::cast_slice_mut::<u32, u8>(&mut vertex_free)
            .copy_from_slice(&body[offset..offset + vertex_free_len * 4]);
        offset += vertex_free_len * 4;

        let mut edge_free = vec![0u32; edge_free_len];
        bytemuck::cast_slice_mut::<u32, u8>(&mut edge_free)
            .copy_from_slice(&body[offset..offset + edge_free_len * 4]);

        Ok(Self {
            tick: header.tick,
            vertex_count: header.vertex_count,
            edge_count: header.edge_count,
            prng_state: [header.prng_s0, header.prng_s1],
            params: header.params,
            energy: header.energy,
            acc_ema: header.acc_ema,
            settle_ema: header.settle_ema,
            depth_ema: header.depth_ema,
            mean_surprise: header.mean_surprise,
            vertices,
            edges,
            vertex_free,
            edge_free,
        })
    }
}

/// Atomically writes `state` to `path` (temp file, then rename).
pub(crate) fn save(path: &Path, state: &SnapshotState) -> Result<(), SnapshotError> {
    let bytes = state.encode();
    let tmp = sibling(path, ".tmp");
    let write_result = fs::write(&tmp, &bytes).and_then(|()| fs::rename(&tmp, path));
    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp);
        return Err(SnapshotError::WriteFailed(err));
    }
    Ok(())
}

/// Loads and validates a snapshot from `path`.
// Exception to the workspace unsafe ban: `memmap2` exposes mapping as an
// unsafe constructor because the file must not be truncated by another
// process while mapped. The advisory lock taken at startup makes this
// process the sole owner of the state file.
#[allow(unsafe_code)]
pub(crate) fn load(path: &Path) -> Result<SnapshotState, SnapshotError> {
    let file = File::open(path).map_err(SnapshotError::ReadFailed)?;
    let map = unsafe { memmap2::Mmap::map(&file) }.map_err(SnapshotError::ReadFailed)?;
    SnapshotState::decode(&map)
}

/// Advisory lock over a state file.
///
/// Holding the guard means this process owns the file; the lock is a
/// sibling `.lock` file created exclusively and removed on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquires the advisory lock for `path`.
///
/// # Errors
/// [`SnapshotError::Locked`] when another process already holds it.
pub(crate) fn lock(path: &Path) -> Result<LockGuard, SnapshotError> {
    let lock_path = sibling(path, ".lock");
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&lock_path)
    {
        Ok(mut file) => {
            let _ = write!(file, "{}", std::process::id());
            Ok(LockGuard { path: lock_path })
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            Err(SnapshotError::Locked(lock_path))
        }
        Err(err) => Err(SnapshotError::WriteFailed(err)),
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}
