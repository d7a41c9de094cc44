//! Microbial priming module (§4.10): pure, side-effect-free functions over
//! a cell's microbial state and a shared parameter record.
//!
//! Grounded on the teacher's `capillary.rs` style — closed-form functions
//! with doc comments naming units and the originating relation, no
//! internal mutable state — generalized from one closed form to the set
//! named in the data model's microbial field group.

use crate::config::{AggregationParams, BioRainParams, CondensationParams, FungalBacterialTable, HydraulicLiftParams, SomKineticsParams};

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Nearest-greater-bin lookup over the fungal:bacterial multiplier table.
/// `FB` below the first anchor uses the first anchor's multiplier; at or
/// beyond the last anchor the multiplier is capped at 8.0 regardless of
/// the table's own last entry, per the pinned anchor `FB>3.0 -> 6-8`.
pub fn lookup_p_fb(table: &FungalBacterialTable, fb: f64) -> f64 {
    if table.fb_ratio.is_empty() {
        return 1.0;
    }
    if fb <= table.fb_ratio[0] {
        return table.multiplier[0];
    }
    for i in 0..table.fb_ratio.len() {
        if fb <= table.fb_ratio[i] {
            return table.multiplier[i];
        }
    }
    8.0f64.min(table.multiplier[table.multiplier.len() - 1].max(6.0))
}

/// Microbial SOM production rate.
pub fn p_micro(
    params: &SomKineticsParams,
    p_fb: f64,
    labile_c: f64,
    theta: f64,
    soil_temp_c: f64,
    n_fixation: f64,
    aggregate_index: f64,
) -> f64 {
    let c_term = labile_c / (params.k_c + labile_c);
    let theta_term = theta / (params.k_theta + theta);
    let temp_term = (params.alpha_t * (soil_temp_c - params.t0)).exp();
    let n_term = 1.0 + params.beta_n * n_fixation;
    let agg_term = 1.0 + params.beta_phi * aggregate_index;
    params.p_max * p_fb * c_term * theta_term * temp_term * n_term * agg_term
}

/// Heterotrophic respiration loss rate.
pub fn d_resp(params: &SomKineticsParams, theta: f64, soil_temp_c: f64, o2_fraction: f64) -> f64 {
    let q10_term = params.q10.powf((soil_temp_c - params.t0) / 10.0);
    let theta_term = theta / (params.k_theta_r + theta);
    params.r_base * q10_term * theta_term * o2_fraction
}

/// Unsaturated conductivity modifier from aggregation and hyphal/carbon
/// support, reducing sharply once `theta` exceeds `theta_rep`.
pub fn k_unsat(
    params: &AggregationParams,
    k0: f64,
    theta: f64,
    phi_agg: f64,
    phi_hyphae: f64,
    c_sup: f64,
) -> f64 {
    let agg_term = 1.0 + params.m_agg * phi_agg * sigmoid(params.gamma * (phi_agg - params.phi_c));
    let myco_term = 1.0 + params.alpha_myco * phi_hyphae * sigmoid(c_sup - params.c_thr);
    let repellency_term = 1.0 / (1.0 + (params.eta * (params.theta_rep - theta)).exp());
    k0 * agg_term * myco_term * repellency_term
}

/// Dew/fog condensation rate delivered to the surface.
pub fn c_cond(
    params: &CondensationParams,
    relative_humidity: f64,
    lai: f64,
    delta_t_night: f64,
    n_condenser_neighbors: u32,
) -> f64 {
    let supersaturation = (relative_humidity - params.rh_sat).max(0.0);
    let veg_term = 1.0 + params.beta_veg * lai;
    let rock_term = 1.0 + params.beta_rock * delta_t_night;
    let base = params.rho_w * params.lambda * supersaturation * veg_term * rock_term;
    let bonus = params.condenser_bonus * n_condenser_neighbors as f64 * delta_t_night;
    base + bonus
}

/// Bio-precipitation bonus: a ramp in F:B ratio between `fb_threshold`
/// and `fb_saturation`, gated on vegetation cover exceeding
/// `veg_threshold`, else zero.
pub fn bio_rain_bonus(params: &BioRainParams, vegetation_cover: f64, fb_ratio: f64) -> f64 {
    if vegetation_cover <= params.veg_threshold {
        return 0.0;
    }
    let span = (params.fb_saturation - params.fb_threshold).max(1e-12);
    let t = ((fb_ratio - params.fb_threshold) / span).clamp(0.0, 1.0);
    let bonus = params.delta_min + t * (params.delta_max - params.delta_min);
    bonus.clamp(params.delta_min, params.delta_max)
}

/// Hydraulic lift flux from deep to shallow moisture, gated to nighttime
/// when `params.night_gated` is set.
pub fn q_lift(params: &HydraulicLiftParams, theta_deep: f64, theta_shallow: f64, is_night: bool) -> f64 {
    if params.night_gated && !is_night {
        return 0.0;
    }
    (params.k_root * (theta_deep - theta_shallow) * params.h).max(0.0)
}

/// Swale storage state, updated in place by `update_swale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwaleState {
    pub storage: f64,
}

/// Swale mass balance over one step: infiltration `I`, runon/area
/// catchment inflow, evaporation loss, and condensation gain. `area`,
/// `depress_storage`, and `catchment_length` are swale geometry; `k_theta`
/// is the current unsaturated conductivity (e.g. from `k_unsat`).
pub fn update_swale(
    state: &mut SwaleState,
    dt: f64,
    k_theta: f64,
    area: f64,
    depress_storage: f64,
    catchment_length: f64,
    runon_rate: f64,
    catchment_area: f64,
    evaporation: f64,
    condensation: f64,
) -> f64 {
    let excess = (state.storage / area.max(1e-12) - depress_storage).max(0.0);
    let infiltration = k_theta * excess / catchment_length.max(1e-12);
    state.storage += dt * (runon_rate * catchment_area - infiltration - evaporation + condensation);
    state.storage = state.storage.max(0.0);
    infiltration
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fb_lookup_matches_pinned_anchors() {
        let t = FungalBacterialTable::default();
        assert!((lookup_p_fb(&t, 0.1) - 1.0).abs() < 1e-9);
        assert!((lookup_p_fb(&t, 1.0) - 2.5).abs() < 1e-9);
        let at_3 = lookup_p_fb(&t, 3.0);
        assert!(at_3 >= 6.0 && at_3 <= 8.0, "{}", at_3);
        assert!((lookup_p_fb(&t, 1000.0) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn bio_rain_bonus_zero_below_vegetation_threshold() {
        let p = BioRainParams::default();
        assert_eq!(bio_rain_bonus(&p, 0.5, 2.5), 0.0);
    }

    #[test]
    fn bio_rain_bonus_in_range_above_threshold() {
        let p = BioRainParams::default();
        let b = bio_rain_bonus(&p, 0.7, 2.5);
        assert!(b >= 0.05 && b <= 0.15, "{}", b);
    }

    #[test]
    fn hydraulic_lift_positive_at_night_zero_by_day() {
        let p = HydraulicLiftParams::default();
        let night = q_lift(&p, 0.3, 0.1, true);
        let day = q_lift(&p, 0.3, 0.1, false);
        assert!(night > 0.0);
        assert_eq!(day, 0.0);
    }

    #[test]
    fn respiration_increases_with_temperature_q10() {
        let p = SomKineticsParams::default();
        let cold = d_resp(&p, 0.2, 10.0, 0.21);
        let warm = d_resp(&p, 0.2, 30.0, 0.21);
        assert!(warm > cold);
    }

    #[test]
    fn k_unsat_drops_as_theta_exceeds_repellency_threshold() {
        let p = AggregationParams::default();
        let wet = k_unsat(&p, 1e-5, 0.20, 0.3, 0.0, 0.0);
        let dry = k_unsat(&p, 1e-5, 0.01, 0.3, 0.0, 0.0);
        assert!(dry > wet);
    }

    #[test]
    fn condensation_zero_below_saturation() {
        let p = CondensationParams::default();
        let c = c_cond(&p, 0.5, 1.0, 5.0, 0);
        assert_eq!(c, 0.0);
    }

    #[test]
    fn swale_storage_never_goes_negative() {
        let mut s = SwaleState { storage: 0.0 };
        let infiltration = update_swale(&mut s, 60.0, 1e-5, 10.0, 0.01, 5.0, 0.0, 1.0, 1.0, 0.0);
        assert!(s.storage >= 0.0);
        assert!(infiltration >= 0.0);
    }
}
