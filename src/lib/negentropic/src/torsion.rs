//! Torsion kernel (§4.7): horizontal vorticity of the momentum field,
//! momentum-tendency coupling, and cloud-probability enhancement.
//!
//! Grounded on the teacher's per-cell finite-difference style (no
//! cross-object aliasing, boundary cells handled with one-sided
//! differences) seen throughout `step.rs`'s flux assembly, applied here to
//! the grid's `momentum_u`/`momentum_v` fields instead of reservoir flux.

use crate::cell::Cell;
use crate::config::TorsionConfig;
use crate::grid::Grid;

/// Vertical vorticity `omega_z = dv/dx - du/dy` at `(i,j)`, using central
/// differences in the interior and one-sided differences at the grid
/// boundary. 2.5D: `omega_x = omega_y = 0` always.
pub fn vorticity_at(grid: &Grid, i: u32, j: u32) -> f64 {
    let dx = grid.dx;
    let dy = grid.dy;

    let dv_dx = if i > 0 && i + 1 < grid.nx {
        let left = grid.get_cell(i - 1, j).map(|c| c.momentum_v).unwrap_or(0.0);
        let right = grid.get_cell(i + 1, j).map(|c| c.momentum_v).unwrap_or(0.0);
        (right - left) / (2.0 * dx)
    } else if i + 1 < grid.nx {
        let here = grid.get_cell(i, j).map(|c| c.momentum_v).unwrap_or(0.0);
        let right = grid.get_cell(i + 1, j).map(|c| c.momentum_v).unwrap_or(0.0);
        (right - here) / dx
    } else if i > 0 {
        let left = grid.get_cell(i - 1, j).map(|c| c.momentum_v).unwrap_or(0.0);
        let here = grid.get_cell(i, j).map(|c| c.momentum_v).unwrap_or(0.0);
        (here - left) / dx
    } else {
        0.0
    };

    let du_dy = if j > 0 && j + 1 < grid.ny {
        let below = grid.get_cell(i, j - 1).map(|c| c.momentum_u).unwrap_or(0.0);
        let above = grid.get_cell(i, j + 1).map(|c| c.momentum_u).unwrap_or(0.0);
        (above - below) / (2.0 * dy)
    } else if j + 1 < grid.ny {
        let here = grid.get_cell(i, j).map(|c| c.momentum_u).unwrap_or(0.0);
        let above = grid.get_cell(i, j + 1).map(|c| c.momentum_u).unwrap_or(0.0);
        (above - here) / dy
    } else if j > 0 {
        let below = grid.get_cell(i, j - 1).map(|c| c.momentum_u).unwrap_or(0.0);
        let here = grid.get_cell(i, j).map(|c| c.momentum_u).unwrap_or(0.0);
        (here - below) / dy
    } else {
        0.0
    };

    dv_dx - du_dy
}

/// `alpha = 8e-4 * (lod/3)^1.5`: minimal coupling at coarse LoD, rising
/// super-linearly at fine LoD.
pub fn momentum_coupling_alpha(base: f64, lod_level: u8) -> f64 {
    base * (lod_level as f64 / 3.0).powf(1.5)
}

/// Increments a cell's momentum symmetrically by `alpha*|omega|*dt`, and
/// raises cloud probability by `kappa*|omega|` when the respective
/// couplings are enabled and `|omega|` exceeds the configured floor.
pub fn apply_torsion_tendency(cell: &mut Cell, omega_z: f64, dt: f64, config: &TorsionConfig, cloud_probability: &mut f64) {
    let magnitude = omega_z.abs();
    if magnitude < config.min_magnitude_threshold {
        return;
    }
    cell.vorticity_m = omega_z;

    if config.enable_momentum_coupling {
        let alpha = momentum_coupling_alpha(config.momentum_coupling_alpha_base, cell.lod_level);
        let tendency = alpha * magnitude * dt;
        cell.momentum_u += tendency;
        cell.momentum_v += tendency;
    }

    if config.enable_cloud_coupling {
        *cloud_probability = (*cloud_probability + config.cloud_coupling_kappa * magnitude).clamp(0.0, 1.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TorsionStatistics {
    pub mean_vorticity: f64,
    pub max_vorticity: f64,
    pub total_enstrophy: f64,
}

/// Aggregates mean/max |omega| and total enstrophy `1/2 * sum(omega_z^2) *
/// dx * dy` over the active cells visited by `grid.foreach_active`.
pub fn torsion_statistics(grid: &Grid) -> TorsionStatistics {
    let mut sum = 0.0f64;
    let mut max = 0.0f64;
    let mut enstrophy = 0.0f64;
    let mut count = 0u64;

    grid.foreach_active(|i, j, _cell| {
        let omega = vorticity_at(grid, i, j);
        let mag = omega.abs();
        sum += mag;
        if mag > max {
            max = mag;
        }
        enstrophy += omega * omega;
        count += 1;
    });

    let mean = if count > 0 { sum / count as f64 } else { 0.0 };
    TorsionStatistics {
        mean_vorticity: mean,
        max_vorticity: max,
        total_enstrophy: 0.5 * enstrophy * grid.dx * grid.dy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_momentum_field_has_zero_vorticity() {
        let mut grid = Grid::create(8, 8, 1, 1.0, 1.0, 0.1);
        grid.foreach_active_mut(|_, _, c| {
            c.momentum_u = 1.0;
            c.momentum_v = 2.0;
        });
        assert!(vorticity_at(&grid, 3, 3).abs() < 1e-12);
    }

    #[test]
    fn shear_field_produces_nonzero_vorticity() {
        let mut grid = Grid::create(8, 8, 1, 1.0, 1.0, 0.1);
        grid.foreach_active_mut(|i, _, c| {
            c.momentum_v = i as f64;
        });
        let omega = vorticity_at(&grid, 3, 3);
        assert!((omega - 1.0).abs() < 1e-9, "{}", omega);
    }

    #[test]
    fn alpha_is_minimal_at_coarse_lod_and_grows_at_fine_lod() {
        let coarse = momentum_coupling_alpha(8e-4, 0);
        let fine = momentum_coupling_alpha(8e-4, 3);
        assert!(coarse < fine);
        assert!((fine - 8e-4).abs() < 1e-12);
    }

    #[test]
    fn torsion_tendency_below_floor_is_a_noop() {
        let mut cell = Cell::default();
        let config = TorsionConfig {
            min_magnitude_threshold: 1e-3,
            ..TorsionConfig::default()
        };
        let mut p = 0.0;
        apply_torsion_tendency(&mut cell, 1e-6, 1.0, &config, &mut p);
        assert_eq!(cell.momentum_u, 0.0);
        assert_eq!(p, 0.0);
    }

    #[test]
    fn torsion_tendency_raises_momentum_and_cloud_probability() {
        let mut cell = Cell::default();
        cell.lod_level = 3;
        let config = TorsionConfig::default();
        let mut p = 0.0;
        apply_torsion_tendency(&mut cell, 0.5, 1.0, &config, &mut p);
        assert!(cell.momentum_u > 0.0);
        assert!(cell.momentum_v > 0.0);
        assert!(p > 0.0);
    }

    #[test]
    fn statistics_report_zero_on_uniform_field() {
        let mut grid = Grid::create(8, 8, 1, 1.0, 1.0, 0.1);
        grid.foreach_active_mut(|_, _, c| {
            c.momentum_u = 1.0;
            c.momentum_v = 1.0;
        });
        let stats = torsion_statistics(&grid);
        assert!(stats.mean_vorticity < 1e-9);
        assert!(stats.total_enstrophy < 1e-9);
    }
}
