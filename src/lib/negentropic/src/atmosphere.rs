//! Biotic-pump atmosphere solver (§4.11): saturation vapor pressure,
//! forest-continuity-driven pressure gradients, and a Coriolis/drag wind
//! update over a 1D transect.
//!
//! Grounded on `original_source/src/solvers/atmosphere_biotic.c`, which
//! documents the Makarieva & Gorshkov biotic-pump equations this module
//! implements. `e_s(T)` is pinned to the Tetens/Clausius-Clapeyron closed
//! form the original's own comments cite (`611.2*exp(17.67*(T-273.15)/
//! (T-29.65))` Pa), sampled over a 256-bin LUT spanning `[243,333]` K, per
//! the pinned Open-Question resolution.

use std::sync::OnceLock;

pub const LUT_SIZE: usize = 256;
pub const T_MIN: f64 = 243.0;
pub const T_MAX: f64 = 333.0;

/// Forest-continuity length-scale power law bounds and exponent.
pub const L_MIN: f64 = 6.0e5;
pub const L_MAX: f64 = 2.0e6;
pub const L_BETA: f64 = 2.5;

/// Aerodynamic mixing reference LAI/canopy height.
pub const LAI_REF: f64 = 5.0;
pub const H_C_REF: f64 = 30.0;

/// Closed-form saturation vapor pressure (Pa) at temperature `t_kelvin`,
/// per the pinned Tetens/Clausius-Clapeyron form.
fn e_s_exact(t_kelvin: f64) -> f64 {
    let t_celsius = t_kelvin - 273.15;
    611.2 * (17.67 * t_celsius / (t_kelvin - 29.65)).exp()
}

fn build_lut() -> Vec<f64> {
    (0..LUT_SIZE)
        .map(|i| {
            let t = T_MIN + (T_MAX - T_MIN) * (i as f64) / (LUT_SIZE as f64 - 1.0);
            e_s_exact(t)
        })
        .collect()
}

static ES_LUT: OnceLock<Vec<f64>> = OnceLock::new();

fn es_lut() -> &'static [f64] {
    ES_LUT.get_or_init(build_lut)
}

/// Saturation vapor pressure via clamp + linear interpolation over the
/// 256-bin LUT spanning `[243,333]` K.
pub fn saturation_vapor_pressure(t_kelvin: f64) -> f64 {
    let lut = es_lut();
    let clamped = t_kelvin.clamp(T_MIN, T_MAX);
    let pos = (clamped - T_MIN) / (T_MAX - T_MIN) * (LUT_SIZE as f64 - 1.0);
    let idx = (pos.floor() as usize).min(LUT_SIZE - 2);
    let frac = pos - idx as f64;
    lut[idx] + frac * (lut[idx + 1] - lut[idx])
}

/// Forest-continuity length scale: a power law between `L_MIN` and
/// `L_MAX` in forest-continuity fraction `phi_f`, clamped to `[0,1]`.
pub fn forest_continuity_length(phi_f: f64) -> f64 {
    let phi = phi_f.clamp(0.0, 1.0);
    L_MIN + (L_MAX - L_MIN) * phi.powf(L_BETA)
}

/// Aerodynamic mixing coefficient from leaf area index and canopy
/// height, floored at `LAI >= 0.1`, `H_c >= 1.0`.
pub fn aerodynamic_mixing(lai: f64, canopy_height: f64) -> f64 {
    let lai = lai.max(0.1);
    let h_c = canopy_height.max(1.0);
    (lai / LAI_REF) * (h_c / H_C_REF).sqrt()
}

/// Vapor partial pressure at one transect cell: `r_T*e_s(T)*(RH0 +
/// k_E*ET*phi_aero)`. `et_mm_per_day` is converted to the per-second rate
/// internally.
pub fn vapor_partial_pressure(r_t: f64, t_kelvin: f64, rh0: f64, k_e: f64, et_mm_per_day: f64, phi_aero: f64) -> f64 {
    let et_per_second = et_mm_per_day / 86400.0;
    r_t * saturation_vapor_pressure(t_kelvin) * (rh0 + k_e * et_per_second * phi_aero)
}

/// One transect cell's wind/pressure state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransectCell {
    pub t_kelvin: f64,
    pub rh0: f64,
    pub et_mm_per_day: f64,
    pub lai: f64,
    pub canopy_height: f64,
    pub phi_f: f64,
    pub u: f64,
    pub v: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmosphereConfig {
    pub r_t: f64,
    pub k_e: f64,
    pub h_gamma: f64,
    pub h_c: f64,
    pub coriolis_f: f64,
    pub drag_coefficient: f64,
    pub dx: f64,
}

impl Default for AtmosphereConfig {
    fn default() -> Self {
        AtmosphereConfig {
            r_t: 1.0,
            k_e: 1.0,
            h_gamma: 1.0,
            h_c: 1000.0,
            coriolis_f: 1e-4,
            drag_coefficient: 1e-3,
            dx: 1000.0,
        }
    }
}

fn central_or_one_sided(values: &[f64], i: usize, dx: f64) -> f64 {
    let n = values.len();
    if i > 0 && i + 1 < n {
        (values[i + 1] - values[i - 1]) / (2.0 * dx)
    } else if i + 1 < n {
        (values[i + 1] - values[i]) / dx
    } else if i > 0 {
        (values[i] - values[i - 1]) / dx
    } else {
        0.0
    }
}

/// sqrt-free speed approximation `max(|u|,|v|) + 0.5*min(|u|,|v|)` used by
/// the semi-implicit drag update.
fn approx_speed(u: f64, v: f64) -> f64 {
    let au = u.abs();
    let av = v.abs();
    au.max(av) + 0.5 * au.min(av)
}

/// One explicit-Euler-plus-semi-implicit-drag wind update over the whole
/// transect. Mutates `u`/`v` on every cell in place.
pub fn step_wind(cells: &mut [TransectCell], config: &AtmosphereConfig, dt: f64) {
    let n = cells.len();
    let p_v: Vec<f64> = cells
        .iter()
        .map(|c| {
            let phi_aero = aerodynamic_mixing(c.lai, c.canopy_height);
            vapor_partial_pressure(config.r_t, c.t_kelvin, c.rh0, config.k_e, c.et_mm_per_day, phi_aero)
        })
        .collect();

    let mut u_t = vec![0.0; n];
    let mut v_t = vec![0.0; n];

    for i in 0..n {
        let dp_v_dx = central_or_one_sided(&p_v, i, config.dx);
        let length_scale = forest_continuity_length(cells[i].phi_f);
        let scale_factor = (config.h_gamma / length_scale) * (1.0 / config.h_c);
        // Higher vapor pressure means lower atmospheric pressure: the
        // sign is flipped relative to the raw vapor-pressure gradient.
        let d_p_dx = -scale_factor * dp_v_dx;

        let u = cells[i].u;
        let v = cells[i].v;
        u_t[i] = u + dt * (-d_p_dx + config.coriolis_f * v);
        v_t[i] = v + dt * (-config.coriolis_f * u);
    }

    for i in 0..n {
        let speed = approx_speed(u_t[i], v_t[i]).max(0.01);
        let drag_factor = 1.0 + dt * config.drag_coefficient * speed;
        cells[i].u = u_t[i] / drag_factor;
        cells[i].v = v_t[i] / drag_factor;
    }
}

/// Moisture convergence diagnostic `C = -d(u*W)/dx`, `W` the per-cell
/// moisture field, matching the boundary differencing rules used for the
/// pressure gradient.
pub fn moisture_convergence(u: &[f64], moisture: &[f64], dx: f64) -> Vec<f64> {
    let flux: Vec<f64> = u.iter().zip(moisture.iter()).map(|(a, b)| a * b).collect();
    (0..flux.len()).map(|i| -central_or_one_sided(&flux, i, dx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e_s_matches_closed_form_at_freezing() {
        let p = saturation_vapor_pressure(273.15);
        // August-Roche-Magnus at 0C is ~611 Pa.
        assert!((p - 611.2).abs() < 2.0, "{}", p);
    }

    #[test]
    fn e_s_increases_monotonically_with_temperature() {
        let low = saturation_vapor_pressure(260.0);
        let high = saturation_vapor_pressure(320.0);
        assert!(high > low);
    }

    #[test]
    fn lut_clamps_outside_domain() {
        let below = saturation_vapor_pressure(100.0);
        let at_min = saturation_vapor_pressure(T_MIN);
        assert!((below - at_min).abs() < 1e-9);
    }

    #[test]
    fn length_scale_spans_bounds_with_continuity() {
        assert!((forest_continuity_length(0.0) - L_MIN).abs() < 1e-6);
        assert!((forest_continuity_length(1.0) - L_MAX).abs() < 1e-6);
        let mid = forest_continuity_length(0.5);
        assert!(mid > L_MIN && mid < L_MAX);
    }

    #[test]
    fn aerodynamic_mixing_floors_lai_and_height() {
        let floored = aerodynamic_mixing(0.0, 0.0);
        let reference = (0.1 / LAI_REF) * (1.0 / H_C_REF).sqrt();
        assert!((floored - reference).abs() < 1e-12);
    }

    #[test]
    fn drag_update_is_unconditionally_stable_for_large_dt() {
        let mut cells = vec![
            TransectCell {
                t_kelvin: 300.0,
                rh0: 0.6,
                et_mm_per_day: 3.0,
                lai: 3.0,
                canopy_height: 20.0,
                phi_f: 0.7,
                u: 5.0,
                v: -2.0,
            };
            4
        ];
        let config = AtmosphereConfig::default();
        step_wind(&mut cells, &config, 1000.0);
        for c in &cells {
            assert!(c.u.is_finite() && c.v.is_finite());
            assert!(c.u.abs() < 10.0 && c.v.abs() < 10.0);
        }
    }

    #[test]
    fn moisture_convergence_is_zero_for_uniform_flux() {
        let u = vec![1.0; 5];
        let w = vec![2.0; 5];
        let conv = moisture_convergence(&u, &w, 1.0);
        for c in conv {
            assert!(c.abs() < 1e-12);
        }
    }
}
