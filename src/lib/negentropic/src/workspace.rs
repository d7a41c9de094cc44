//! Integrator scratch workspaces, the Clebsch LUT singleton, and
//! `IntegratorConfig`.
//!
//! Grounded on `original_source/src/core/integrators/workspace_slab.c`
//! (workspace shapes) and `clebsch_collective.c` (LUT shape and
//! per-workspace Casimir bookkeeping). Workspaces are claimed from the
//! pools in `slab.rs`; this module owns only their contents.

use std::sync::OnceLock;

use crate::cell::Twist;
use crate::config::IntegratorKind;

/// Maximum scalar-field state dimension a single workspace can stage.
pub const MAX_STATE_DIM: usize = 128;
pub const CLEBSCH_LUT_SIZE: usize = 512;
pub const CLEBSCH_DIM: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct IntegratorConfig {
    pub dt: f64,
    pub method: IntegratorKind,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        IntegratorConfig {
            dt: 1.0,
            method: IntegratorKind::Rk4,
        }
    }
}

/// Scratch buffers for RK4 and RKMK4. Reset zeroes every scratch array;
/// `step_count`/`fallback_count` persist across resets per §3, since they
/// are workspace-lifetime diagnostics rather than per-step scratch.
pub struct IntegratorWorkspace {
    pub rk_k1: [f64; MAX_STATE_DIM],
    pub rk_k2: [f64; MAX_STATE_DIM],
    pub rk_k3: [f64; MAX_STATE_DIM],
    pub rk_k4: [f64; MAX_STATE_DIM],
    pub rkmk_k1: Twist,
    pub rkmk_k2: Twist,
    pub rkmk_k3: Twist,
    pub rkmk_k4: Twist,
    pub step_count: u64,
    pub fallback_count: u64,
}

impl Default for IntegratorWorkspace {
    fn default() -> Self {
        IntegratorWorkspace {
            rk_k1: [0.0; MAX_STATE_DIM],
            rk_k2: [0.0; MAX_STATE_DIM],
            rk_k3: [0.0; MAX_STATE_DIM],
            rk_k4: [0.0; MAX_STATE_DIM],
            rkmk_k1: Twist::default(),
            rkmk_k2: Twist::default(),
            rkmk_k3: Twist::default(),
            rkmk_k4: Twist::default(),
            step_count: 0,
            fallback_count: 0,
        }
    }
}

impl IntegratorWorkspace {
    pub fn reset_scratch(&mut self) {
        self.rk_k1 = [0.0; MAX_STATE_DIM];
        self.rk_k2 = [0.0; MAX_STATE_DIM];
        self.rk_k3 = [0.0; MAX_STATE_DIM];
        self.rk_k4 = [0.0; MAX_STATE_DIM];
        self.rkmk_k1 = Twist::default();
        self.rkmk_k2 = Twist::default();
        self.rkmk_k3 = Twist::default();
        self.rkmk_k4 = Twist::default();
    }
}

/// One Clebsch LUT bin: canonical `(q,p)` pairs and the expected Casimir
/// value for this bin's vorticity magnitude.
#[derive(Debug, Clone, Copy)]
pub struct ClebschBin {
    pub q: [f64; CLEBSCH_DIM],
    pub p: [f64; CLEBSCH_DIM],
    pub casimir: f64,
}

/// 512-bin lift table from a scalar Lie-Poisson vorticity variable to
/// canonical `(q,p)`, keyed by vorticity magnitude up to `vorticity_max`.
///
/// `clebsch_collective.c`'s own table is an acknowledged placeholder
/// (linear ramp, not physically derived). This table instead uses a
/// deterministic, self-consistent construction: each bin's `q`/`p` use a
/// fixed asymmetric weighting across the eight canonical components so
/// that `casimir = sum(q_i * p_i)` is strictly increasing in the bin's
/// vorticity magnitude — giving `clebsch_lift`/`clebsch_project`/the
/// Casimir correction sweep a single consistent invariant to track,
/// rather than the placeholder's unrelated linear fill.
pub struct ClebschLut {
    pub bins: Vec<ClebschBin>,
    pub vorticity_max: f64,
}

impl ClebschLut {
    fn generate() -> Self {
        let vorticity_max = 1.0;
        let mut bins = Vec::with_capacity(CLEBSCH_LUT_SIZE);
        // sum_{k=0}^{7} (k+1)(8-k) used below to normalize casimir scale.
        let weight_sum: f64 = (0..CLEBSCH_DIM).map(|k| ((k + 1) * (CLEBSCH_DIM - k)) as f64).sum();
        for i in 0..CLEBSCH_LUT_SIZE {
            let omega = vorticity_max * (i as f64) / (CLEBSCH_LUT_SIZE as f64 - 1.0);
            let amplitude = omega.abs().sqrt();
            let mut q = [0.0; CLEBSCH_DIM];
            let mut p = [0.0; CLEBSCH_DIM];
            for k in 0..CLEBSCH_DIM {
                q[k] = amplitude * (k as f64 + 1.0) / CLEBSCH_DIM as f64;
                p[k] = amplitude * (CLEBSCH_DIM - k) as f64 / CLEBSCH_DIM as f64;
            }
            let casimir = omega * weight_sum / (CLEBSCH_DIM as f64 * CLEBSCH_DIM as f64);
            bins.push(ClebschBin { q, p, casimir });
        }
        ClebschLut { bins, vorticity_max }
    }

    /// Linear interpolation in both q and p tables by vorticity magnitude.
    pub fn lift(&self, vorticity: f64) -> ClebschBin {
        let mag = vorticity.abs().min(self.vorticity_max);
        let pos = mag / self.vorticity_max * (CLEBSCH_LUT_SIZE as f64 - 1.0);
        let idx = pos.floor() as usize;
        let idx = idx.min(CLEBSCH_LUT_SIZE - 2);
        let frac = pos - idx as f64;
        let lo = &self.bins[idx];
        let hi = &self.bins[idx + 1];
        let mut q = [0.0; CLEBSCH_DIM];
        let mut p = [0.0; CLEBSCH_DIM];
        for k in 0..CLEBSCH_DIM {
            q[k] = lo.q[k] + frac * (hi.q[k] - lo.q[k]);
            p[k] = lo.p[k] + frac * (hi.p[k] - lo.p[k]);
        }
        let casimir = lo.casimir + frac * (hi.casimir - lo.casimir);
        ClebschBin { q, p, casimir }
    }
}

static CLEBSCH_LUT: OnceLock<ClebschLut> = OnceLock::new();

pub fn clebsch_lut() -> &'static ClebschLut {
    CLEBSCH_LUT.get_or_init(ClebschLut::generate)
}

/// Per-claim Clebsch scratch: the active `(q,p)` stage state, a handle to
/// the shared immutable LUT (attached on claim, detached on release), and
/// Newton/fallback bookkeeping.
pub struct ClebschWorkspace {
    pub q: [f64; CLEBSCH_DIM],
    pub p: [f64; CLEBSCH_DIM],
    pub casimir_initial: f64,
    pub casimir_tolerance: f64,
    pub step_count: u64,
    pub fallback_count: u64,
    lut_attached: bool,
    /// Whether `clebsch::lift` has staged `(q,p)` for this claim yet. A
    /// freshly-claimed workspace always starts unlifted; `slab::Pool`
    /// zeroes on claim, so a stale `true` from a prior occupant can never
    /// leak through.
    lifted: bool,
}

impl Default for ClebschWorkspace {
    fn default() -> Self {
        ClebschWorkspace {
            q: [0.0; CLEBSCH_DIM],
            p: [0.0; CLEBSCH_DIM],
            casimir_initial: 0.0,
            casimir_tolerance: 1e-6,
            step_count: 0,
            fallback_count: 0,
            lut_attached: false,
            lifted: false,
        }
    }
}

impl ClebschWorkspace {
    pub fn attach_shared_lut(&mut self) {
        let _ = clebsch_lut();
        self.lut_attached = true;
    }

    pub fn detach_shared_lut(&mut self) {
        self.lut_attached = false;
    }

    pub fn has_shared_lut(&self) -> bool {
        self.lut_attached
    }

    pub fn lut(&self) -> &'static ClebschLut {
        clebsch_lut()
    }

    pub fn is_lifted(&self) -> bool {
        self.lifted
    }

    pub fn mark_lifted(&mut self) {
        self.lifted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lut_is_a_singleton() {
        let a = clebsch_lut() as *const ClebschLut;
        let b = clebsch_lut() as *const ClebschLut;
        assert_eq!(a, b);
    }

    #[test]
    fn casimir_increases_with_vorticity_magnitude() {
        let lut = clebsch_lut();
        let low = lut.lift(0.1).casimir;
        let high = lut.lift(0.9).casimir;
        assert!(high > low);
    }

    #[test]
    fn lift_clamps_to_vorticity_max() {
        let lut = clebsch_lut();
        let at_max = lut.lift(lut.vorticity_max);
        let beyond = lut.lift(lut.vorticity_max * 10.0);
        assert!((at_max.casimir - beyond.casimir).abs() < 1e-9);
    }

    #[test]
    fn integrator_workspace_reset_clears_scratch_but_not_counters() {
        let mut ws = IntegratorWorkspace::default();
        ws.rk_k1[0] = 42.0;
        ws.step_count = 5;
        ws.reset_scratch();
        assert_eq!(ws.rk_k1[0], 0.0);
        assert_eq!(ws.step_count, 5);
    }
}
