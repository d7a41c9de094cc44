//! Zero-malloc workspace slab allocator.
//!
//! Grounded on `original_source/src/core/integrators/workspace_slab.c`:
//! two fixed pools (integrator: 16 slots, Clebsch: 8 slots), one atomic
//! bitmap per pool, compare-and-swap claim with retry on contention,
//! zero-on-claim slots. The reference identifies a foreign release by
//! pointer-offset validation because C has no ownership types; here the
//! claim returns an RAII guard that borrows the pool, so a slot cannot be
//! released against the wrong pool and cannot be forgotten (§9,
//! "in-place mutation of workspace" / ownership-token rearchitecture).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use crate::error::SlabError;
use crate::workspace::{ClebschWorkspace, IntegratorWorkspace};

pub const INTEGRATOR_POOL_CAPACITY: usize = 16;
pub const CLEBSCH_POOL_CAPACITY: usize = 8;

struct Pool<T> {
    bitmap: AtomicU32,
    slots: Vec<std::sync::Mutex<T>>,
}

impl<T: Default> Pool<T> {
    fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(std::sync::Mutex::new(T::default()));
        }
        Pool {
            bitmap: AtomicU32::new(0),
            slots,
        }
    }

    fn claim(&self) -> Result<usize, SlabError> {
        let capacity = self.slots.len();
        let capacity_mask = if capacity >= 32 { u32::MAX } else { (1u32 << capacity) - 1 };
        loop {
            let current = self.bitmap.load(Ordering::Acquire);
            let free_mask = !current & capacity_mask;
            if free_mask == 0 {
                return Err(SlabError::Exhausted { capacity });
            }
            let slot = free_mask.trailing_zeros() as usize;
            let bit = 1u32 << slot;
            if self
                .bitmap
                .compare_exchange(current, current | bit, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if let Ok(mut guard) = self.slots[slot].lock() {
                    *guard = T::default();
                }
                return Ok(slot);
            }
            // Lost the race to another claimant; retry.
        }
    }

    fn release(&self, slot: usize) {
        if slot >= self.slots.len() {
            // Foreign/out-of-range slot: ignore, matching the reference's
            // "detect and ignore release of foreign pointers" contract.
            return;
        }
        let bit = 1u32 << slot;
        self.bitmap.fetch_and(!bit, Ordering::AcqRel);
    }

    fn is_exhausted(&self) -> bool {
        let capacity = self.slots.len();
        let mask = if capacity == 32 { u32::MAX } else { (1u32 << capacity) - 1 };
        self.bitmap.load(Ordering::Acquire) & mask == mask
    }

    fn claimed_count(&self) -> u32 {
        self.bitmap.load(Ordering::Acquire).count_ones()
    }
}

static INTEGRATOR_POOL: OnceLock<Pool<IntegratorWorkspace>> = OnceLock::new();
static CLEBSCH_POOL: OnceLock<Pool<ClebschWorkspace>> = OnceLock::new();

fn integrator_pool() -> &'static Pool<IntegratorWorkspace> {
    INTEGRATOR_POOL.get_or_init(|| Pool::new(INTEGRATOR_POOL_CAPACITY))
}

fn clebsch_pool() -> &'static Pool<ClebschWorkspace> {
    CLEBSCH_POOL.get_or_init(|| Pool::new(CLEBSCH_POOL_CAPACITY))
}

/// An exclusively-owned integrator workspace slot, released automatically
/// on drop.
pub struct IntegratorSlot {
    slot: usize,
}

impl IntegratorSlot {
    pub fn claim() -> Result<Self, SlabError> {
        let slot = integrator_pool().claim()?;
        Ok(IntegratorSlot { slot })
    }

    pub fn with_workspace<R>(&self, f: impl FnOnce(&mut IntegratorWorkspace) -> R) -> R {
        let mut guard = integrator_pool().slots[self.slot].lock().expect("workspace mutex poisoned");
        f(&mut guard)
    }
}

impl Drop for IntegratorSlot {
    fn drop(&mut self) {
        integrator_pool().release(self.slot);
    }
}

/// An exclusively-owned Clebsch workspace slot. A shared LUT handle is
/// attached on claim (see `workspace.rs`) and detached on release.
pub struct ClebschSlot {
    slot: usize,
}

impl ClebschSlot {
    pub fn claim() -> Result<Self, SlabError> {
        let slot = clebsch_pool().claim()?;
        {
            let mut guard = clebsch_pool().slots[slot].lock().expect("workspace mutex poisoned");
            guard.attach_shared_lut();
        }
        Ok(ClebschSlot { slot })
    }

    pub fn with_workspace<R>(&self, f: impl FnOnce(&mut ClebschWorkspace) -> R) -> R {
        let mut guard = clebsch_pool().slots[self.slot].lock().expect("workspace mutex poisoned");
        f(&mut guard)
    }
}

impl Drop for ClebschSlot {
    fn drop(&mut self) {
        {
            if let Ok(mut guard) = clebsch_pool().slots[self.slot].lock() {
                guard.detach_shared_lut();
            }
        }
        clebsch_pool().release(self.slot);
    }
}

pub fn integrator_pool_is_exhausted() -> bool {
    integrator_pool().is_exhausted()
}

pub fn clebsch_pool_is_exhausted() -> bool {
    clebsch_pool().is_exhausted()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabStats {
    pub integrator_claimed: u32,
    pub integrator_capacity: u32,
    pub clebsch_claimed: u32,
    pub clebsch_capacity: u32,
}

pub fn slab_stats() -> SlabStats {
    SlabStats {
        integrator_claimed: integrator_pool().claimed_count(),
        integrator_capacity: INTEGRATOR_POOL_CAPACITY as u32,
        clebsch_claimed: clebsch_pool().claimed_count(),
        clebsch_capacity: CLEBSCH_POOL_CAPACITY as u32,
    }
}
