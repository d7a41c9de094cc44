//! Data-only `Cell` and integrator capability flags.
//!
//! This module exists to break the `Grid -> Cell -> Grid` cyclic
//! dependency named in the design notes: grids and solvers depend on the
//! types here, but this module depends on neither. `Cell` is plain data —
//! no methods that reach back into grid or solver state.

use serde::{Deserialize, Serialize};

/// Per-cell capability/activity flags consumed by LoD-gated dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellFlags(u8);

impl CellFlags {
    pub const REQUIRES_SE3: CellFlags = CellFlags(1 << 0);
    pub const REQUIRES_LP: CellFlags = CellFlags(1 << 1);
    pub const ACTIVE: CellFlags = CellFlags(1 << 2);
    pub const BOUNDARY: CellFlags = CellFlags(1 << 3);

    pub fn empty() -> Self {
        CellFlags(0)
    }

    pub fn contains(self, other: CellFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CellFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CellFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for CellFlags {
    type Output = CellFlags;
    fn bitor(self, rhs: CellFlags) -> CellFlags {
        CellFlags(self.0 | rhs.0)
    }
}

/// A rigid-body pose in SE(3): rotation as a row-major 3x3 matrix plus a
/// translation vector. Kept as plain arrays (not `nalgebra::Matrix3`
/// directly) so the layout matches the 192-byte pose record in the
/// canonical state block byte-for-byte; conversions to/from
/// `nalgebra::Matrix3`/`Vector3` are provided for the integrator math.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: [f64; 9],
    pub translation: [f64; 3],
}

impl Default for Pose {
    fn default() -> Self {
        Pose {
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            translation: [0.0; 3],
        }
    }
}

impl Pose {
    pub fn to_nalgebra(self) -> (nalgebra::Matrix3<f64>, nalgebra::Vector3<f64>) {
        let r = nalgebra::Matrix3::from_row_slice(&self.rotation);
        let t = nalgebra::Vector3::from_row_slice(&self.translation);
        (r, t)
    }

    pub fn from_nalgebra(r: nalgebra::Matrix3<f64>, t: nalgebra::Vector3<f64>) -> Self {
        let mut rotation = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                rotation[row * 3 + col] = r[(row, col)];
            }
        }
        Pose {
            rotation,
            translation: [t.x, t.y, t.z],
        }
    }
}

/// A twist (se(3) element): angular velocity then linear velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    pub omega: [f64; 3],
    pub v: [f64; 3],
}

/// The enabled intervention applied once per cell by the hydrology
/// module (§4.8). `Intensity` interpolates within each type's stated
/// range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterventionKind {
    None,
    MulchGravel,
    Swale,
    Berm,
    Biocrust,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub kind: InterventionKind,
    /// In `[0,1]`; interpolates within the intervention's parameter range.
    pub intensity: f64,
}

impl Default for Intervention {
    fn default() -> Self {
        Intervention {
            kind: InterventionKind::None,
            intensity: 0.0,
        }
    }
}

/// One column of a 2.5D surface tile. Field groups mirror the data model:
/// hydrological state, soil hydraulic parameters, intervention
/// multipliers, microtopography, regeneration state, effective
/// (regeneration-to-hydrology) parameters, microbial state, geometry, and
/// the dynamical/dispatch state used by the integrator stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    // Hydrological state
    pub theta: f64,
    pub psi: f64,
    pub h_s: f64,
    pub zeta: f64,

    // Soil hydraulic parameters
    pub k_s: f64,
    pub van_genuchten_alpha: f64,
    pub van_genuchten_n: f64,
    pub theta_s: f64,
    pub theta_r: f64,

    // Intervention multipliers
    pub m_k_zz: f64,
    pub m_k_xx: f64,
    pub kappa_e: f64,
    pub delta_zeta: f64,

    // Microtopography
    pub zeta_c: f64,
    pub a_c: f64,

    // Regeneration state (float view; Q16.16 mirrors live in regeneration.rs)
    pub vegetation_cover: f64,
    pub som_percent: f64,

    // Effective (REG -> HYD) parameters
    pub porosity_eff: f64,
    pub k_tensor: [f64; 9],

    // Microbial state
    pub labile_c: f64,
    pub soil_temp_c: f64,
    pub n_fixation: f64,
    pub aggregate_index: f64,
    pub fb_ratio: f64,
    pub hyphal_density: f64,
    pub o2_fraction: f64,
    pub canopy_lai: f64,
    pub theta_deep: f64,
    pub condenser_neighbor_count: u32,

    // Geometry
    pub z: f64,
    pub dz: f64,
    pub dx: f64,

    // Dynamical / dispatch state
    pub pose: Pose,
    pub twist_rate: Twist,
    pub vorticity_m: f64,
    pub momentum_u: f64,
    pub momentum_v: f64,
    /// Cloud-formation likelihood in `[0,1]`, raised by the torsion
    /// kernel's cloud coupling (§4.7) and consulted by the atmosphere
    /// solver's moisture terms.
    pub cloud_probability: f64,
    pub lod_level: u8,
    pub flags: CellFlags,

    pub intervention: Intervention,
}

impl Cell {
    /// `theta*dz + h_s`: the diagnostic total water content of a column.
    pub fn total_water(&self) -> f64 {
        self.theta * self.dz + self.h_s
    }

    /// Fill-and-spill connectivity, applied before the surface update:
    /// `zeta <- min(h_s, zeta_c + delta_zeta)`.
    pub fn apply_surface_update(&mut self) {
        self.zeta = self.h_s.min(self.zeta_c + self.delta_zeta);
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell {
            theta: 0.2,
            psi: -1.0,
            h_s: 0.0,
            zeta: 0.0,
            k_s: 1e-5,
            van_genuchten_alpha: 1.5,
            van_genuchten_n: 1.3,
            theta_s: 0.43,
            theta_r: 0.05,
            m_k_zz: 1.0,
            m_k_xx: 1.0,
            kappa_e: 1.0,
            delta_zeta: 0.0,
            zeta_c: 0.01,
            a_c: 100.0,
            vegetation_cover: 0.1,
            som_percent: 0.5,
            porosity_eff: 0.43,
            k_tensor: [0.0; 9],
            labile_c: 10.0,
            soil_temp_c: 20.0,
            n_fixation: 0.0,
            aggregate_index: 0.3,
            fb_ratio: 1.0,
            hyphal_density: 0.0,
            o2_fraction: 0.21,
            canopy_lai: 1.0,
            theta_deep: 0.2,
            condenser_neighbor_count: 0,
            z: 0.0,
            dz: 0.1,
            dx: 1.0,
            pose: Pose::default(),
            twist_rate: Twist::default(),
            vorticity_m: 0.0,
            momentum_u: 0.0,
            momentum_v: 0.0,
            cloud_probability: 0.0,
            lod_level: 0,
            flags: CellFlags::ACTIVE,
            intervention: Intervention::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_water_combines_moisture_and_ponding() {
        let mut c = Cell::default();
        c.theta = 0.3;
        c.dz = 0.5;
        c.h_s = 0.01;
        assert!((c.total_water() - 0.16).abs() < 1e-9);
    }

    #[test]
    fn surface_update_caps_zeta_at_threshold_plus_delta() {
        let mut c = Cell::default();
        c.zeta_c = 0.01;
        c.delta_zeta = 0.0007;
        c.h_s = 10.0;
        c.apply_surface_update();
        assert!((c.zeta - 0.0107).abs() < 1e-9);
    }

    #[test]
    fn pose_round_trips_through_nalgebra() {
        let p = Pose::default();
        let (r, t) = p.to_nalgebra();
        let back = Pose::from_nalgebra(r, t);
        assert_eq!(p, back);
    }

    #[test]
    fn cell_flags_insert_and_contains() {
        let mut f = CellFlags::empty();
        f.insert(CellFlags::ACTIVE);
        f.insert(CellFlags::REQUIRES_SE3);
        assert!(f.contains(CellFlags::ACTIVE));
        assert!(f.contains(CellFlags::REQUIRES_SE3));
        assert!(!f.contains(CellFlags::REQUIRES_LP));
    }
}
