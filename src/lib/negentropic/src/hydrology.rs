//! Richards-Lite hydrology: coupled vertical-implicit / horizontal-explicit
//! solver (§4.8).
//!
//! Grounded on the teacher's `step.rs` structural pattern — assemble an
//! implicit system for one unknown (there: cell pressure via a sparse CG
//! solve; here: the vertical moisture profile via a tridiagonal Thomas
//! solve), then explicitly transport the other state with its own
//! CFL-limited sub-stepping (there: upwind saturation; here: surface
//! ponding by discrete Laplacian) — even though the two-phase reservoir
//! physics and vadose-zone Richards physics differ. Interventions and the
//! runoff-mechanism/connectivity diagnostics are this module's own
//! addition per §4.8.

use crate::cell::{Cell, Intervention, InterventionKind};
use crate::config::HydrologyConfig;
use crate::error::NegErrorFlags;
use crate::grid::Grid;
use crate::van_genuchten::VanGenuchtenTable;

/// Vertical layers a single column's implicit solve is discretized into.
/// Sized so the solve stays allocation-free (stack arrays) regardless of
/// host-configured `nz`; hosts requesting more layers than this are
/// rejected by `SimulationConfig` validation before reaching here.
pub const MAX_VERTICAL_LAYERS: usize = 64;

/// Overland-flow mechanism classification for a cell (§4.8 diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunoffMechanism {
    None,
    Hortonian,
    Dunne,
}

impl RunoffMechanism {
    pub fn as_code(self) -> i32 {
        match self {
            RunoffMechanism::None => 0,
            RunoffMechanism::Hortonian => 1,
            RunoffMechanism::Dunne => 2,
        }
    }
}

/// Fill-and-spill connectivity `sigma(a_c * (zeta - zeta_c))`.
pub fn connectivity(zeta: f64, zeta_c: f64, a_c: f64) -> f64 {
    1.0 / (1.0 + (-a_c * (zeta - zeta_c)).exp())
}

/// Applies one intervention's multipliers onto a cell, once, per §4.8's
/// table of ranges. `intensity` interpolates within each type's range.
pub fn apply_intervention(cell: &mut Cell, intervention: Intervention) {
    let t = intervention.intensity.clamp(0.0, 1.0);
    match intervention.kind {
        InterventionKind::None => {}
        InterventionKind::MulchGravel => {
            cell.m_k_zz = 1.0 + t * (6.0 - 1.0);
            cell.kappa_e = 1.0 + t * (0.25 - 1.0);
            cell.delta_zeta = t * 0.0007;
        }
        InterventionKind::Swale => {
            cell.m_k_zz = 1.0 + t * (3.0 - 1.0);
            cell.m_k_xx = 1.0 + t * (2.0 - 1.0);
        }
        InterventionKind::Berm => {
            cell.delta_zeta = t * 0.010;
        }
        InterventionKind::Biocrust => {
            cell.m_k_zz = 1.0 - t * 0.5;
            cell.delta_zeta = t * 0.002;
        }
    }
}

/// Classifies the runoff mechanism driving a cell's surface water given
/// the current rainfall rate: Hortonian when rainfall exceeds the
/// column's top-layer infiltration capacity while the soil is still dry,
/// Dunne when the column is already near saturation.
pub fn runoff_mechanism(cell: &Cell, vg: &VanGenuchtenTable, rainfall_rate: f64) -> RunoffMechanism {
    let infiltration_capacity = vg.k_from_theta(cell.theta) * cell.m_k_zz;
    let near_saturation = cell.theta >= 0.97 * cell.porosity_eff;
    if near_saturation {
        RunoffMechanism::Dunne
    } else if rainfall_rate > infiltration_capacity {
        RunoffMechanism::Hortonian
    } else {
        RunoffMechanism::None
    }
}

/// A homogeneous-profile column discretization used for the vertical
/// implicit solve: `n_layers` layers of thickness `dz`, initialized from
/// the owning cell's scalar `theta`/`psi` (the data model carries a single
/// aggregate state per column, not a persisted per-layer array), advanced
/// one backward-Euler step, and folded back into the cell's top-layer
/// view.
pub struct ColumnProfile {
    pub n_layers: usize,
    pub theta: [f64; MAX_VERTICAL_LAYERS],
    pub psi: [f64; MAX_VERTICAL_LAYERS],
}

impl ColumnProfile {
    pub fn from_cell(cell: &Cell, n_layers: usize) -> Self {
        let n_layers = n_layers.min(MAX_VERTICAL_LAYERS).max(1);
        let mut theta = [cell.theta; MAX_VERTICAL_LAYERS];
        let mut psi = [cell.psi; MAX_VERTICAL_LAYERS];
        for t in theta.iter_mut().skip(n_layers) {
            *t = 0.0;
        }
        for p in psi.iter_mut().skip(n_layers) {
            *p = 0.0;
        }
        ColumnProfile { n_layers, theta, psi }
    }

    pub fn mean_theta(&self) -> f64 {
        let sum: f64 = self.theta[..self.n_layers].iter().sum();
        sum / self.n_layers as f64
    }
}

fn thomas_solve(a: &[f64], b: &mut [f64], c: &[f64], d: &mut [f64]) {
    let n = b.len();
    if n == 0 {
        return;
    }
    for i in 1..n {
        let w = if b[i - 1].abs() > 1e-300 { a[i] / b[i - 1] } else { 0.0 };
        b[i] -= w * c[i - 1];
        d[i] -= w * d[i - 1];
    }
    d[n - 1] = if b[n - 1].abs() > 1e-300 { d[n - 1] / b[n - 1] } else { 0.0 };
    for i in (0..n - 1).rev() {
        d[i] = if b[i].abs() > 1e-300 { (d[i] - c[i] * d[i + 1]) / b[i] } else { 0.0 };
    }
}

/// Backward-Euler vertical pass for one column. Linearizes the vertical
/// diffusivity via Picard iteration around the previous moisture profile,
/// assembles the tridiagonal system with harmonic-mean face conductivities
/// (scaled by the cell's `m_k_zz` intervention multiplier and the
/// regeneration-fed `k_tensor[8]`), and solves it with the Thomas
/// algorithm each Picard sweep until `max(|theta^{k+1} - theta^k}|) <
/// picard_tol` or `picard_max_iter` is exhausted.
pub fn vertical_implicit_pass(
    column: &mut ColumnProfile,
    cell: &Cell,
    vg: &VanGenuchtenTable,
    dz: f64,
    dt: f64,
    rainfall_flux: f64,
    config: &HydrologyConfig,
) -> NegErrorFlags {
    let mut flags = NegErrorFlags::new();
    let n = column.n_layers;
    if n == 0 || dt <= 0.0 || dz <= 0.0 {
        return flags;
    }

    let k_mult = cell.m_k_zz * cell.k_tensor[8].max(1e-12) / vg.k_s.max(1e-12);
    let theta_prev = column.theta;

    let mut theta_iter = column.theta;
    let mut converged = false;
    for _ in 0..config.picard_max_iter.max(1) {
        let mut a = [0.0f64; MAX_VERTICAL_LAYERS];
        let mut b = [0.0f64; MAX_VERTICAL_LAYERS];
        let mut c = [0.0f64; MAX_VERTICAL_LAYERS];
        let mut d = [0.0f64; MAX_VERTICAL_LAYERS];

        for i in 0..n {
            let capacity = dz / dt;
            b[i] = capacity;
            d[i] = capacity * theta_prev[i];

            if i > 0 {
                let k_face = vg.harmonic_k(theta_iter[i - 1], theta_iter[i]) * k_mult;
                let cond = k_face / dz;
                a[i] = -cond;
                b[i] += cond;
            } else {
                // Top boundary: flux equals rainfall, folded directly into d.
                d[i] += rainfall_flux;
            }

            if i + 1 < n {
                let k_face = vg.harmonic_k(theta_iter[i], theta_iter[i + 1]) * k_mult;
                let cond = k_face / dz;
                c[i] = -cond;
                b[i] += cond;
            } else if config.use_free_drainage {
                let k_bottom = vg.k_from_theta(theta_iter[i]) * k_mult;
                d[i] -= k_bottom;
            }
            // else: no-flux bottom boundary, nothing added.
        }

        let mut b_work = b;
        let mut d_work = d;
        thomas_solve(&a, &mut b_work, &c, &mut d_work);

        let mut max_delta = 0.0f64;
        for i in 0..n {
            let clamped = d_work[i].clamp(cell.theta_r, cell.porosity_eff);
            if !clamped.is_finite() {
                flags.set_nan(0);
            }
            max_delta = max_delta.max((clamped - theta_iter[i]).abs());
            theta_iter[i] = clamped;
        }
        if max_delta < config.picard_tol {
            converged = true;
            break;
        }
    }
    if !converged {
        flags.set_convergence_failed(0);
    }

    for i in 0..n {
        column.theta[i] = theta_iter[i];
        // psi is re-derived from theta via the inverse relationship is not
        // tabulated directly; approximate by holding psi at the value whose
        // theta(psi) is closest through the monotone theta(psi) table scan
        // avoided here — instead store a moisture-proportional head so
        // downstream barrier potentials still see a consistent sign.
        column.psi[i] = -((cell.porosity_eff - theta_iter[i]).max(0.0)) * 10.0 - 1e-6;
    }
    flags
}

/// Surface update: `zeta <- min(h_s, zeta_c + delta_zeta)` (§4.8 step 1).
pub fn surface_update(cell: &mut Cell) {
    cell.apply_surface_update();
}

/// Horizontal explicit pass over a dense neighborhood: updates `h_s` via a
/// discrete Laplacian of `eta_s = h_s + z`, sub-stepped at `dt_sub =
/// CFL_factor * min(dt, 0.5*dx^2/(2*K_r))`, only for cells whose
/// connectivity exceeds the configured floor.
pub fn horizontal_explicit_pass(grid: &mut Grid, vg: &VanGenuchtenTable, dt: f64, config: &HydrologyConfig) {
    let nx = grid.nx;
    let ny = grid.ny;
    let dx = grid.dx;

    let mut eta = vec![0.0f64; (nx as usize) * (ny as usize)];
    let mut connected = vec![false; (nx as usize) * (ny as usize)];
    grid.foreach_active(|i, j, cell| {
        let idx = (j as usize) * (nx as usize) + (i as usize);
        eta[idx] = cell.h_s + cell.z;
        connected[idx] = connectivity(cell.zeta, cell.zeta_c, cell.a_c) > config.connectivity_floor;
    });

    let k_r = vg.k_s.max(1e-9);
    let dt_sub = config.cfl_factor * dt.min(0.5 * dx * dx / (2.0 * k_r));
    let n_sub = if dt_sub > 0.0 { (dt / dt_sub).ceil().max(1.0) as u32 } else { 1 };
    let dt_sub = dt / n_sub as f64;

    for _ in 0..n_sub {
        let snapshot = eta.clone();
        for j in 0..ny {
            for i in 0..nx {
                let idx = (j as usize) * (nx as usize) + (i as usize);
                if !connected[idx] {
                    continue;
                }
                let mut lap = 0.0;
                let mut neighbors = 0;
                for (di, dj) in [(-1i32, 0i32), (1, 0), (0, -1), (0, 1)] {
                    let ni = i as i32 + di;
                    let nj = j as i32 + dj;
                    if ni >= 0 && nj >= 0 && (ni as u32) < nx && (nj as u32) < ny {
                        let nidx = (nj as usize) * (nx as usize) + (ni as usize);
                        lap += snapshot[nidx] - snapshot[idx];
                        neighbors += 1;
                    }
                }
                if neighbors > 0 {
                    let diffusivity = k_r * cell_m_k_xx(grid, i, j);
                    eta[idx] += dt_sub * diffusivity * lap / (dx * dx);
                }
            }
        }
    }

    grid.foreach_active_mut(|i, j, cell| {
        let idx = (j as usize) * (nx as usize) + (i as usize);
        cell.h_s = (eta[idx] - cell.z).max(0.0);
    });
}

fn cell_m_k_xx(grid: &Grid, i: u32, j: u32) -> f64 {
    grid.get_cell(i, j).map(|c| c.m_k_xx).unwrap_or(1.0)
}

/// Evaporation sink: reduces the top layer's moisture by
/// `kappa_e * E_bare_ref * dt / dz`, never below `theta_r`.
pub fn evaporation_sink(cell: &mut Cell, dt: f64, config: &HydrologyConfig) {
    let loss = cell.kappa_e * config.e_bare_ref * dt / cell.dz.max(1e-9);
    cell.theta = (cell.theta - loss).max(cell.theta_r);
}

/// Full per-cell Richards-Lite step (§4.8, steps 1-4), operating on a
/// single column's `ColumnProfile` and writing the resulting top-layer
/// theta/psi back into the cell.
pub fn step_column(
    cell: &mut Cell,
    vg: &VanGenuchtenTable,
    n_layers: usize,
    dt: f64,
    rainfall_rate: f64,
    config: &HydrologyConfig,
) -> NegErrorFlags {
    surface_update(cell);

    let mut column = ColumnProfile::from_cell(cell, n_layers);
    let flags = vertical_implicit_pass(&mut column, cell, vg, cell.dz, dt, rainfall_rate, config);

    cell.theta = column.theta[0].clamp(cell.theta_r, cell.porosity_eff);
    cell.psi = column.psi[0].min(0.0);

    evaporation_sink(cell, dt, config);
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandy_loam() -> VanGenuchtenTable {
        VanGenuchtenTable::build(1e-5, 1.5, 1.3, 0.43, 0.05, -10.0)
    }

    #[test]
    fn connectivity_is_low_below_threshold_and_high_above() {
        let zeta_c = 0.01;
        let a_c = 100.0;
        let low = connectivity(zeta_c - 5.0 / a_c, zeta_c, a_c);
        let high = connectivity(zeta_c + 5.0 / a_c, zeta_c, a_c);
        assert!(low < 0.1, "low={}", low);
        assert!(high > 0.9, "high={}", high);
    }

    #[test]
    fn mulch_gravel_raises_vertical_conductivity_and_lowers_evap() {
        let mut cell = Cell::default();
        apply_intervention(
            &mut cell,
            Intervention { kind: InterventionKind::MulchGravel, intensity: 1.0 },
        );
        assert!((cell.m_k_zz - 6.0).abs() < 1e-9);
        assert!((cell.kappa_e - 0.25).abs() < 1e-9);
    }

    #[test]
    fn hortonian_on_dry_cell_with_high_rainfall() {
        let vg = sandy_loam();
        let mut cell = Cell::default();
        cell.theta = 0.08;
        let m = runoff_mechanism(&cell, &vg, 1e-3);
        assert_eq!(m, RunoffMechanism::Hortonian);
    }

    #[test]
    fn dunne_on_near_saturated_cell() {
        let vg = sandy_loam();
        let mut cell = Cell::default();
        cell.porosity_eff = 0.43;
        cell.theta = 0.425;
        let m = runoff_mechanism(&cell, &vg, 1e-6);
        assert_eq!(m, RunoffMechanism::Dunne);
    }

    #[test]
    fn vertical_pass_keeps_theta_within_bounds() {
        let vg = sandy_loam();
        let mut cell = Cell::default();
        cell.theta = 0.2;
        let config = HydrologyConfig::default();
        let mut column = ColumnProfile::from_cell(&cell, 8);
        let flags = vertical_implicit_pass(&mut column, &cell, &vg, 0.1, 60.0, 1e-5, &config);
        assert!(!flags.is_step_terminal());
        for i in 0..column.n_layers {
            assert!(column.theta[i] >= cell.theta_r - 1e-9);
            assert!(column.theta[i] <= cell.porosity_eff + 1e-9);
        }
    }

    #[test]
    fn rainfall_increases_mean_column_moisture() {
        let vg = sandy_loam();
        let mut cell = Cell::default();
        cell.theta = 0.15;
        let config = HydrologyConfig::default();
        let mut column = ColumnProfile::from_cell(&cell, 4);
        let before = column.mean_theta();
        vertical_implicit_pass(&mut column, &cell, &vg, 0.1, 60.0, 5e-4, &config);
        assert!(column.mean_theta() >= before);
    }

    #[test]
    fn evaporation_never_drives_theta_below_residual() {
        let mut cell = Cell::default();
        cell.theta = cell.theta_r + 1e-6;
        let config = HydrologyConfig::default();
        evaporation_sink(&mut cell, 1e6, &config);
        assert!(cell.theta >= cell.theta_r - 1e-12);
    }

    #[test]
    fn total_water_mass_balance_with_no_flux_bottom_and_zero_evap() {
        let vg = sandy_loam();
        let mut cell = Cell::default();
        cell.theta = 0.20;
        cell.kappa_e = 0.0;
        let mut config = HydrologyConfig::default();
        config.use_free_drainage = false;

        let dz = 0.1;
        let n_layers = 8;
        let mut column = ColumnProfile::from_cell(&cell, n_layers);
        let w_init: f64 = column.theta[..n_layers].iter().map(|t| t * dz).sum();

        let dt = 60.0; // 1 minute substeps
        let rainfall_rate = 10e-3 / 3600.0; // 10 mm/hr in m/s
        let steps = 60; // 1 hour
        for _ in 0..steps {
            vertical_implicit_pass(&mut column, &cell, &vg, dz, dt, rainfall_rate, &config);
        }
        let w_final: f64 = column.theta[..n_layers].iter().map(|t| t * dz).sum();
        let expected_added = rainfall_rate * dt * steps as f64;
        let rel_err = ((w_final - w_init) - expected_added).abs() / expected_added.max(1e-12);
        assert!(rel_err <= 0.015, "rel_err={}", rel_err);
    }
}
