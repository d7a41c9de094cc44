//! Canonical simulation state and its snapshot binary format (§4.12).
//!
//! Grounded on `original_source/src/core/state.c` (single contiguous
//! block layout: header, then poses, then scalar fields) and
//! `original_source/src/include/serialization.h` (the `NegStateHeader`
//! byte layout: 8-byte magic, u32 version, u64 timestamp, u64 hash, u32
//! data size — `NEG_STATE_HEADER_SIZE = 32`). Two incompatible on-disk
//! shapes exist upstream: `state.c`'s `state_to_binary` writes no
//! magic/hash header at all, while `serialization.h` defines the full
//! headerized `NegStateHeader`. Per the pinned Open-Question resolution,
//! this module implements the headerized variant exclusively; the
//! headerless shape is not a valid snapshot input here. The content hash
//! is pinned to FNV-1a (64-bit, offset basis `0xcbf29ce484222325`, prime
//! `0x100000001b3`) — `state.c`'s own "TODO: Include xxhash library"
//! comment marks its FNV-1a as a stand-in for a future XXH3 adoption;
//! this crate pins FNV-1a as the actual, permanent algorithm and reserves
//! the version field to gate any future change.

use crate::cell::Pose;
use crate::config::PrecisionMode;
use crate::error::SnapshotError;

pub const MAGIC: &[u8; 8] = b"NEGSTATE";
pub const VERSION_MAJOR: u32 = 1;
pub const VERSION_MINOR: u32 = 0;
pub const VERSION_PATCH: u32 = 0;
pub const STATE_VERSION: u32 = (VERSION_MAJOR << 16) | (VERSION_MINOR << 8) | VERSION_PATCH;
pub const HEADER_SIZE: usize = 32;

/// Fixed per-entity pose record size in the contiguous block and the
/// snapshot body: 9 rotation + 3 translation `f64`s (96 bytes) plus a
/// microsecond timestamp and entity id (12 bytes), padded out to a
/// cache-friendly 192 bytes. Padding bytes are always zero.
pub const POSE_RECORD_SIZE: usize = 192;
pub const SCALAR_RECORD_SIZE: usize = 4;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// FNV-1a 64-bit hash, the pinned content-hash algorithm for snapshots.
pub fn fnv1a(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseRecord {
    pub pose: Pose,
    pub timestamp_us: u64,
    pub entity_id: u32,
}

impl PoseRecord {
    fn write_into(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), POSE_RECORD_SIZE);
        let mut offset = 0;
        for v in self.pose.rotation.iter() {
            buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
            offset += 8;
        }
        for v in self.pose.translation.iter() {
            buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
            offset += 8;
        }
        buf[offset..offset + 8].copy_from_slice(&self.timestamp_us.to_le_bytes());
        offset += 8;
        buf[offset..offset + 4].copy_from_slice(&self.entity_id.to_le_bytes());
        // Remaining bytes (through POSE_RECORD_SIZE) stay zeroed padding.
    }

    fn read_from(buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len(), POSE_RECORD_SIZE);
        let mut rotation = [0.0; 9];
        let mut offset = 0;
        for r in rotation.iter_mut() {
            *r = f64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap());
            offset += 8;
        }
        let mut translation = [0.0; 3];
        for t in translation.iter_mut() {
            *t = f64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap());
            offset += 8;
        }
        let timestamp_us = u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap());
        offset += 8;
        let entity_id = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
        PoseRecord {
            pose: Pose { rotation, translation },
            timestamp_us,
            entity_id,
        }
    }
}

/// The canonical simulation state: a small metadata header plus the
/// poses/scalar-fields arrays that the original's single contiguous
/// block packs directly after it. This crate keeps them as owned `Vec`s
/// rather than raw offsets into one allocation — `GridError`/`SlabError`
/// already carry the "no hidden aliasing" discipline this module
/// otherwise would have had to re-invent with raw pointers.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalState {
    pub precision_mode: PrecisionMode,
    pub timestamp_us: u64,
    pub step_count: u64,
    pub poses: Vec<PoseRecord>,
    pub scalar_fields: Vec<f32>,
    pub total_energy: f32,
    pub max_numerical_error: f32,
}

impl CanonicalState {
    pub fn new(entity_count: u32, scalar_field_count: u32, precision_mode: PrecisionMode) -> Self {
        CanonicalState {
            precision_mode,
            timestamp_us: 0,
            step_count: 0,
            poses: (0..entity_count)
                .map(|id| PoseRecord {
                    pose: Pose::default(),
                    timestamp_us: 0,
                    entity_id: id,
                })
                .collect(),
            scalar_fields: vec![0.0; scalar_field_count as usize],
            total_energy: 0.0,
            max_numerical_error: 0.0,
        }
    }

    /// Advances the simulation clock by `dt` seconds (stored internally
    /// in microseconds) and bumps the step counter. Physics advancement
    /// itself is the caller's responsibility (dispatch/hydrology/
    /// regeneration); this only maintains the state's own bookkeeping.
    pub fn step(&mut self, dt: f64) {
        self.timestamp_us += (dt * 1e6) as u64;
        self.step_count += 1;
    }

    fn body_size(&self) -> usize {
        4 + self.poses.len() * POSE_RECORD_SIZE + 4 + self.scalar_fields.len() * SCALAR_RECORD_SIZE
    }

    fn write_body(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.poses.len() as u32).to_le_bytes());
        for record in &self.poses {
            let start = buf.len();
            buf.resize(start + POSE_RECORD_SIZE, 0);
            record.write_into(&mut buf[start..start + POSE_RECORD_SIZE]);
        }
        buf.extend_from_slice(&(self.scalar_fields.len() as u32).to_le_bytes());
        for value in &self.scalar_fields {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Serializes the full headerized snapshot: writes the header with a
    /// placeholder zero hash, appends the body, computes the FNV-1a hash
    /// over the completed buffer, then patches the hash field in place —
    /// exactly the "placeholder zero hash, then hash the completed
    /// buffer" sequence named in §4.12.
    pub fn to_binary(&self, timestamp_ms: u64) -> Vec<u8> {
        let data_size = self.body_size() as u32;
        let mut buf = Vec::with_capacity(HEADER_SIZE + data_size as usize);

        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&STATE_VERSION.to_le_bytes());
        buf.extend_from_slice(&timestamp_ms.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes()); // placeholder hash
        buf.extend_from_slice(&data_size.to_le_bytes());

        self.write_body(&mut buf);

        let hash = fnv1a(&buf);
        buf[20..28].copy_from_slice(&hash.to_le_bytes());
        buf
    }

    /// Validates magic, version, declared size, content hash, and entity/
    /// scalar counts before copying any data in, matching §7's "invalid
    /// state is rejected before mutating state" rule.
    pub fn reset_from_binary(&mut self, buf: &[u8]) -> Result<(), SnapshotError> {
        if buf.len() < HEADER_SIZE {
            return Err(SnapshotError::BufferTooShort {
                needed: HEADER_SIZE,
                have: buf.len(),
            });
        }
        if &buf[0..8] != MAGIC {
            return Err(SnapshotError::BadMagic);
        }
        let version = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        if version != STATE_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: version,
                expected: STATE_VERSION,
            });
        }
        let stored_hash = u64::from_le_bytes(buf[20..28].try_into().unwrap());
        let data_size = u32::from_le_bytes(buf[28..32].try_into().unwrap());

        let actual_remainder = buf.len() - HEADER_SIZE;
        if data_size as usize != actual_remainder {
            return Err(SnapshotError::SizeMismatch {
                declared: data_size,
                actual: actual_remainder as u32,
            });
        }

        let mut rehashed = buf.to_vec();
        rehashed[20..28].copy_from_slice(&0u64.to_le_bytes());
        let computed_hash = fnv1a(&rehashed);
        if computed_hash != stored_hash {
            return Err(SnapshotError::HashMismatch {
                stored: stored_hash,
                computed: computed_hash,
            });
        }

        let body = &buf[HEADER_SIZE..];
        let mut offset = 0usize;
        if body.len() < 4 {
            return Err(SnapshotError::BufferTooShort { needed: 4, have: body.len() });
        }
        let entity_count = u32::from_le_bytes(body[0..4].try_into().unwrap());
        offset += 4;
        if entity_count as usize != self.poses.len() {
            return Err(SnapshotError::EntityCountMismatch {
                found: entity_count,
                expected: self.poses.len() as u32,
            });
        }

        let poses_bytes = entity_count as usize * POSE_RECORD_SIZE;
        if body.len() < offset + poses_bytes + 4 {
            return Err(SnapshotError::BufferTooShort {
                needed: offset + poses_bytes + 4,
                have: body.len(),
            });
        }
        let mut poses = Vec::with_capacity(entity_count as usize);
        for i in 0..entity_count as usize {
            let start = offset + i * POSE_RECORD_SIZE;
            poses.push(PoseRecord::read_from(&body[start..start + POSE_RECORD_SIZE]));
        }
        offset += poses_bytes;

        let scalar_count = u32::from_le_bytes(body[offset..offset + 4].try_into().unwrap());
        offset += 4;
        if scalar_count as usize != self.scalar_fields.len() {
            return Err(SnapshotError::ScalarCountMismatch {
                found: scalar_count,
                expected: self.scalar_fields.len() as u32,
            });
        }
        let scalars_bytes = scalar_count as usize * SCALAR_RECORD_SIZE;
        if body.len() < offset + scalars_bytes {
            return Err(SnapshotError::BufferTooShort {
                needed: offset + scalars_bytes,
                have: body.len(),
            });
        }
        let mut scalar_fields = Vec::with_capacity(scalar_count as usize);
        for i in 0..scalar_count as usize {
            let start = offset + i * SCALAR_RECORD_SIZE;
            scalar_fields.push(f32::from_le_bytes(body[start..start + 4].try_into().unwrap()));
        }

        self.poses = poses;
        self.scalar_fields = scalar_fields;
        Ok(())
    }

    /// Content hash of the state as it would serialize right now — the
    /// authoritative fingerprint for replay validation (§4.12).
    pub fn state_hash(&self) -> u64 {
        let bytes = self.to_binary(0);
        u64::from_le_bytes(bytes[20..28].try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_binary() {
        let mut state = CanonicalState::new(2, 3, PrecisionMode::F64);
        state.poses[1].pose.translation = [1.0, 2.0, 3.0];
        state.scalar_fields[0] = 42.5;
        state.step(0.016);

        let bytes = state.to_binary(1_000);
        let mut restored = CanonicalState::new(2, 3, PrecisionMode::F64);
        restored.reset_from_binary(&bytes).unwrap();

        assert_eq!(restored.poses[1].pose.translation, [1.0, 2.0, 3.0]);
        assert_eq!(restored.scalar_fields[0], 42.5);
    }

    #[test]
    fn rejects_bad_magic() {
        let state = CanonicalState::new(1, 1, PrecisionMode::F64);
        let mut bytes = state.to_binary(0);
        bytes[0] = b'X';
        let mut restored = CanonicalState::new(1, 1, PrecisionMode::F64);
        assert!(matches!(restored.reset_from_binary(&bytes), Err(SnapshotError::BadMagic)));
    }

    #[test]
    fn rejects_tampered_body_via_hash_mismatch() {
        let state = CanonicalState::new(1, 2, PrecisionMode::F64);
        let mut bytes = state.to_binary(0);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut restored = CanonicalState::new(1, 2, PrecisionMode::F64);
        assert!(matches!(restored.reset_from_binary(&bytes), Err(SnapshotError::HashMismatch { .. })));
    }

    #[test]
    fn rejects_entity_count_mismatch() {
        let state = CanonicalState::new(3, 1, PrecisionMode::F64);
        let bytes = state.to_binary(0);
        let mut restored = CanonicalState::new(2, 1, PrecisionMode::F64);
        assert!(matches!(
            restored.reset_from_binary(&bytes),
            Err(SnapshotError::EntityCountMismatch { found: 3, expected: 2 })
        ));
    }

    #[test]
    fn state_hash_is_deterministic_across_identical_states() {
        let a = CanonicalState::new(4, 4, PrecisionMode::F64);
        let b = CanonicalState::new(4, 4, PrecisionMode::F64);
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn step_advances_timestamp_and_count() {
        let mut state = CanonicalState::new(1, 1, PrecisionMode::F64);
        state.step(1.5);
        assert_eq!(state.timestamp_us, 1_500_000);
        assert_eq!(state.step_count, 1);
    }

    #[test]
    fn fnv1a_matches_known_vector_for_empty_input() {
        assert_eq!(fnv1a(&[]), FNV_OFFSET_BASIS);
    }
}
