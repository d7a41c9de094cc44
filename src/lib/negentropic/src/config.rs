//! Host-facing configuration and parameter record types.
//!
//! JSON/TOML parsing is the host's job (out of scope, per §1); this module
//! owns the typed shape those bytes decode into, sensible defaults, and
//! the validation the core performs before accepting a record — mirroring
//! the teacher's `Well::validate(nx,ny,nz) -> Result<(), String>` pattern,
//! generalized to a typed `ParameterError`/`ConfigError` instead of a bare
//! `String`.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ParameterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecisionMode {
    F16,
    F32,
    F64,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegratorKind {
    Rk4,
    SymplecticPrk,
    Rkmk4,
    Clebsch,
    ExplicitEuler,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub entity_count: u32,
    pub scalar_field_count: u32,
    pub nx: u32,
    pub ny: u32,
    pub nz: u32,
    pub default_dt: f64,
    pub precision: PrecisionMode,
    pub integrator: IntegratorKind,
    pub enable_hydrology: bool,
    pub enable_regeneration: bool,
    pub enable_microbial: bool,
    pub enable_atmosphere: bool,
    /// Cadence (in hydrology steps) at which the regeneration cascade
    /// runs, default 128 per §4.9.
    pub regeneration_interval_steps: u32,
    /// Configurable bottom boundary for the vertical hydrology pass; see
    /// the pinned Open-Question resolution in §9 — this never changes at
    /// runtime based on solver state, only via this field.
    pub use_free_drainage: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            entity_count: 1,
            scalar_field_count: 1,
            nx: 16,
            ny: 16,
            nz: 8,
            default_dt: 1.0,
            precision: PrecisionMode::F64,
            integrator: IntegratorKind::Rk4,
            enable_hydrology: true,
            enable_regeneration: true,
            enable_microbial: false,
            enable_atmosphere: false,
            regeneration_interval_steps: 128,
            use_free_drainage: true,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_count == 0 {
            return Err(ConfigError::ZeroEntityCount);
        }
        if self.scalar_field_count == 0 {
            return Err(ConfigError::ZeroScalarFieldCount);
        }
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(ConfigError::ZeroGridDim(self.nx, self.ny, self.nz));
        }
        if !(self.default_dt > 0.0) {
            return Err(ConfigError::NonPositiveDt(self.default_dt));
        }
        Ok(())
    }
}

/// Regeneration cascade parameters (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegenerationParams {
    pub r_v: f64,
    pub k_v: f64,
    pub lambda_1: f64,
    pub lambda_2: f64,
    pub theta_star: f64,
    pub som_star: f64,
    pub a_1: f64,
    pub a_2: f64,
    pub eta_1: f64,
    pub k_mult: f64,
    pub use_regv2: bool,
}

impl Default for RegenerationParams {
    fn default() -> Self {
        RegenerationParams {
            r_v: 0.15,
            k_v: 1.0,
            lambda_1: 0.5,
            lambda_2: 0.1,
            theta_star: 0.18,
            som_star: 1.5,
            a_1: 0.2,
            a_2: 0.05,
            eta_1: 5.0,
            k_mult: 1.02,
            use_regv2: false,
        }
    }
}

impl RegenerationParams {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(self.r_v > 0.0 && self.r_v < 1.0) {
            return Err(ParameterError::InvalidGrowthRate(self.r_v));
        }
        if !(self.k_v > 0.0) {
            return Err(ParameterError::NonPositiveCarryingCapacity(self.k_v));
        }
        Ok(())
    }
}

/// SOM microbial kinetics sub-record (§4.10), defaults from
/// `regeneration_microbial.h`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SomKineticsParams {
    pub p_max: f64,
    pub k_c: f64,
    pub k_theta: f64,
    pub alpha_t: f64,
    pub t0: f64,
    pub beta_n: f64,
    pub beta_phi: f64,
    pub r_base: f64,
    pub q10: f64,
    pub k_theta_r: f64,
}

impl Default for SomKineticsParams {
    fn default() -> Self {
        SomKineticsParams {
            p_max: 2.5,
            k_c: 20.0,
            k_theta: 0.10,
            alpha_t: 0.07,
            t0: 20.0,
            beta_n: 0.25,
            beta_phi: 0.3,
            r_base: 0.3,
            q10: 2.0,
            k_theta_r: 0.08,
        }
    }
}

/// Fungal:bacterial lookup table. Anchors must be strictly increasing in
/// FB; lookup uses nearest-greater-bin semantics (§4.10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FungalBacterialTable {
    pub fb_ratio: Vec<f64>,
    pub multiplier: Vec<f64>,
}

impl Default for FungalBacterialTable {
    fn default() -> Self {
        FungalBacterialTable {
            fb_ratio: vec![0.1, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0],
            multiplier: vec![1.0, 1.8, 2.5, 3.5, 4.5, 5.5, 6.5],
        }
    }
}

impl FungalBacterialTable {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.fb_ratio.len() != self.multiplier.len() || self.fb_ratio.is_empty() {
            return Err(ParameterError::NonMonotoneFbTable(0));
        }
        for i in 1..self.fb_ratio.len() {
            if self.fb_ratio[i] <= self.fb_ratio[i - 1] {
                return Err(ParameterError::NonMonotoneFbTable(i));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregationParams {
    pub m_agg: f64,
    pub phi_c: f64,
    pub gamma: f64,
    pub alpha_myco: f64,
    pub theta_rep: f64,
    pub eta: f64,
    pub c_thr: f64,
}

impl Default for AggregationParams {
    fn default() -> Self {
        AggregationParams {
            m_agg: 0.3,
            phi_c: 0.5,
            gamma: 10.0,
            alpha_myco: 0.3,
            theta_rep: 0.05,
            eta: 50.0,
            c_thr: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CondensationParams {
    pub lambda: f64,
    pub rho_w: f64,
    pub beta_rock: f64,
    pub beta_veg: f64,
    pub condenser_bonus: f64,
    pub rh_sat: f64,
}

impl Default for CondensationParams {
    fn default() -> Self {
        CondensationParams {
            lambda: 1e-4,
            rho_w: 1000.0,
            beta_rock: 1.2,
            beta_veg: 0.05,
            condenser_bonus: 0.3,
            rh_sat: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BioRainParams {
    pub delta_min: f64,
    pub delta_max: f64,
    pub veg_threshold: f64,
    pub fb_threshold: f64,
    pub fb_saturation: f64,
}

impl Default for BioRainParams {
    fn default() -> Self {
        BioRainParams {
            delta_min: 0.05,
            delta_max: 0.12,
            veg_threshold: 0.6,
            fb_threshold: 2.0,
            fb_saturation: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HydraulicLiftParams {
    pub k_root: f64,
    pub h: f64,
    pub q_lift_min: f64,
    pub q_lift_max: f64,
    pub night_gated: bool,
}

impl Default for HydraulicLiftParams {
    fn default() -> Self {
        HydraulicLiftParams {
            k_root: 1e-6,
            h: 1.5,
            q_lift_min: 0.1,
            q_lift_max: 1.3,
            night_gated: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrobialParams {
    pub som_kinetics: SomKineticsParams,
    pub fb_table: FungalBacterialTable,
    pub aggregation: AggregationParams,
    pub condensation: CondensationParams,
    pub bio_rain: BioRainParams,
    pub hydraulic_lift: HydraulicLiftParams,
}

impl Default for MicrobialParams {
    fn default() -> Self {
        MicrobialParams {
            som_kinetics: SomKineticsParams::default(),
            fb_table: FungalBacterialTable::default(),
            aggregation: AggregationParams::default(),
            condensation: CondensationParams::default(),
            bio_rain: BioRainParams::default(),
            hydraulic_lift: HydraulicLiftParams::default(),
        }
    }
}

impl MicrobialParams {
    pub fn validate(&self) -> Result<(), ParameterError> {
        self.fb_table.validate()
    }
}

/// Torsion kernel configuration (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TorsionConfig {
    pub momentum_coupling_alpha_base: f64,
    pub cloud_coupling_kappa: f64,
    pub min_magnitude_threshold: f64,
    pub enable_momentum_coupling: bool,
    pub enable_cloud_coupling: bool,
}

impl Default for TorsionConfig {
    fn default() -> Self {
        TorsionConfig {
            momentum_coupling_alpha_base: 8e-4,
            cloud_coupling_kappa: 0.1,
            min_magnitude_threshold: 1e-6,
            enable_momentum_coupling: true,
            enable_cloud_coupling: true,
        }
    }
}

/// Hydrology solver configuration (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HydrologyConfig {
    pub picard_tol: f64,
    pub picard_max_iter: u32,
    pub cfl_factor: f64,
    pub connectivity_floor: f64,
    pub use_free_drainage: bool,
    pub e_bare_ref: f64,
}

impl Default for HydrologyConfig {
    fn default() -> Self {
        HydrologyConfig {
            picard_tol: 1e-6,
            picard_max_iter: 10,
            cfl_factor: 0.9,
            connectivity_floor: 0.1,
            use_free_drainage: true,
            e_bare_ref: 2e-3,
        }
    }
}

/// Clebsch integrator configuration (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClebschConfig {
    pub max_newton_iter: u32,
    pub newton_tol: f64,
    pub casimir_tol: f64,
    /// Strength of the quartic Casimir-coupling term in the canonical
    /// Hamiltonian `H = 1/2*sum(q_i^2+p_i^2) + nonlinear_coupling*C(q,p)^2`;
    /// this is what makes the partitioned implicit stage genuinely
    /// nonlinear rather than a linear oscillator solvable in closed form.
    pub nonlinear_coupling: f64,
}

impl Default for ClebschConfig {
    fn default() -> Self {
        ClebschConfig {
            max_newton_iter: 4,
            newton_tol: 1e-6,
            casimir_tol: 1e-6,
            nonlinear_coupling: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_entity_count_rejected() {
        let mut c = SimulationConfig::default();
        c.entity_count = 0;
        assert!(matches!(c.validate(), Err(ConfigError::ZeroEntityCount)));
    }

    #[test]
    fn growth_rate_out_of_range_rejected() {
        let mut p = RegenerationParams::default();
        p.r_v = 1.5;
        assert!(p.validate().is_err());
        p.r_v = 0.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn default_fb_table_is_monotone() {
        assert!(FungalBacterialTable::default().validate().is_ok());
    }

    #[test]
    fn non_monotone_fb_table_rejected() {
        let t = FungalBacterialTable {
            fb_ratio: vec![0.1, 0.5, 0.3],
            multiplier: vec![1.0, 1.8, 2.0],
        };
        assert!(t.validate().is_err());
    }
}
