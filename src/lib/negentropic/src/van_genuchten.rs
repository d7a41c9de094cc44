//! van Genuchten/Mualem soil-water retention and conductivity lookup
//! tables (§4.8).
//!
//! Grounded on the teacher's own LUT-construction idiom in
//! `fixed_point.rs` (build once from a closed form, sample linearly,
//! interpolate at lookup time) generalized to per-soil-type tables: a
//! single global singleton does not fit here because different cells in
//! the same grid may carry different soil hydraulic parameters (`k_s`,
//! `van_genuchten_alpha`, `van_genuchten_n`, `theta_s`, `theta_r`), so a
//! `VanGenuchtenTable` is constructed once per distinct soil type a host
//! uses (e.g. held alongside an `Intervention` or soil-class record) and
//! shared by every cell of that type, rather than rebuilt per cell per
//! step.

pub const VG_LUT_SIZE: usize = 256;

/// `theta(psi) = theta_r + (theta_s - theta_r) * (1 + |alpha*psi|^n)^(-m)`,
/// `m = 1 - 1/n`, sampled at 256 points over `[psi_min, 0]`; `K(theta) =
/// k_s * sqrt(Se) * (1 - (1 - Se^(1/m))^m)^2` sampled at 256 points over
/// `[theta_r, theta_s]`; `dtheta/dpsi` sampled on the same grid as
/// `theta(psi)`. All three use linear interpolation between entries.
pub struct VanGenuchtenTable {
    pub k_s: f64,
    pub alpha: f64,
    pub n: f64,
    pub m: f64,
    pub theta_s: f64,
    pub theta_r: f64,
    psi_min: f64,
    theta_of_psi: [f64; VG_LUT_SIZE],
    dtheta_dpsi_of_psi: [f64; VG_LUT_SIZE],
    k_of_theta: [f64; VG_LUT_SIZE],
}

fn theta_closed_form(psi: f64, alpha: f64, n: f64, m: f64, theta_s: f64, theta_r: f64) -> f64 {
    if psi >= 0.0 {
        return theta_s;
    }
    let u = alpha * (-psi);
    theta_r + (theta_s - theta_r) * (1.0 + u.powf(n)).powf(-m)
}

fn dtheta_dpsi_closed_form(psi: f64, alpha: f64, n: f64, m: f64, theta_s: f64, theta_r: f64) -> f64 {
    if psi >= 0.0 {
        return 0.0;
    }
    let u = alpha * (-psi);
    if u <= 0.0 {
        return 0.0;
    }
    (theta_s - theta_r) * m * n * alpha * u.powf(n - 1.0) * (1.0 + u.powf(n)).powf(-m - 1.0)
}

fn k_closed_form(theta: f64, k_s: f64, m: f64, theta_s: f64, theta_r: f64) -> f64 {
    let se = ((theta - theta_r) / (theta_s - theta_r)).clamp(0.0, 1.0);
    if se <= 0.0 {
        return 0.0;
    }
    let inner = 1.0 - (1.0 - se.powf(1.0 / m)).max(0.0).powf(m);
    k_s * se.sqrt() * inner * inner
}

impl VanGenuchtenTable {
    /// Builds the three tables once for a soil type. `psi_min` is the
    /// driest matric head the table must cover (e.g. -10.0 m); `theta(psi)`
    /// and `dtheta/dpsi` are sampled over `[psi_min, 0]`, `K(theta)` over
    /// `[theta_r, theta_s]`.
    pub fn build(k_s: f64, alpha: f64, n: f64, theta_s: f64, theta_r: f64, psi_min: f64) -> Self {
        let m = 1.0 - 1.0 / n;
        let mut theta_of_psi = [0.0f64; VG_LUT_SIZE];
        let mut dtheta_dpsi_of_psi = [0.0f64; VG_LUT_SIZE];
        let mut k_of_theta = [0.0f64; VG_LUT_SIZE];

        let psi_step = -psi_min / (VG_LUT_SIZE as f64 - 1.0);
        for (i, slot) in theta_of_psi.iter_mut().enumerate() {
            let psi = psi_min + psi_step * i as f64;
            *slot = theta_closed_form(psi, alpha, n, m, theta_s, theta_r);
        }
        for (i, slot) in dtheta_dpsi_of_psi.iter_mut().enumerate() {
            let psi = psi_min + psi_step * i as f64;
            *slot = dtheta_dpsi_closed_form(psi, alpha, n, m, theta_s, theta_r);
        }
        let theta_step = (theta_s - theta_r) / (VG_LUT_SIZE as f64 - 1.0);
        for (i, slot) in k_of_theta.iter_mut().enumerate() {
            let theta = theta_r + theta_step * i as f64;
            *slot = k_closed_form(theta, k_s, m, theta_s, theta_r);
        }

        VanGenuchtenTable {
            k_s,
            alpha,
            n,
            m,
            theta_s,
            theta_r,
            psi_min,
            theta_of_psi,
            dtheta_dpsi_of_psi,
            k_of_theta,
        }
    }

    fn lerp_over_psi(&self, psi: f64, table: &[f64; VG_LUT_SIZE]) -> f64 {
        let psi = psi.clamp(self.psi_min, 0.0);
        let pos = (psi - self.psi_min) / (-self.psi_min) * (VG_LUT_SIZE as f64 - 1.0);
        let idx = (pos.floor() as usize).min(VG_LUT_SIZE - 2);
        let frac = pos - idx as f64;
        table[idx] + frac * (table[idx + 1] - table[idx])
    }

    pub fn theta_from_psi(&self, psi: f64) -> f64 {
        self.lerp_over_psi(psi, &self.theta_of_psi)
    }

    pub fn dtheta_dpsi_from_psi(&self, psi: f64) -> f64 {
        self.lerp_over_psi(psi, &self.dtheta_dpsi_of_psi)
    }

    pub fn k_from_theta(&self, theta: f64) -> f64 {
        let theta = theta.clamp(self.theta_r, self.theta_s);
        let pos = (theta - self.theta_r) / (self.theta_s - self.theta_r) * (VG_LUT_SIZE as f64 - 1.0);
        let idx = (pos.floor() as usize).min(VG_LUT_SIZE - 2);
        let frac = pos - idx as f64;
        self.k_of_theta[idx] + frac * (self.k_of_theta[idx + 1] - self.k_of_theta[idx])
    }

    /// Harmonic mean of conductivities at two saturations, used at vertical
    /// interfaces per §4.8 step 2.
    pub fn harmonic_k(&self, theta_a: f64, theta_b: f64) -> f64 {
        let k_a = self.k_from_theta(theta_a);
        let k_b = self.k_from_theta(theta_b);
        if k_a + k_b <= 0.0 {
            0.0
        } else {
            2.0 * k_a * k_b / (k_a + k_b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandy_loam() -> VanGenuchtenTable {
        VanGenuchtenTable::build(1e-5, 1.5, 1.3, 0.43, 0.05, -10.0)
    }

    #[test]
    fn theta_at_zero_psi_is_saturation() {
        let t = sandy_loam();
        assert!((t.theta_from_psi(0.0) - 0.43).abs() < 1e-3);
    }

    #[test]
    fn theta_at_dry_end_approaches_residual() {
        let t = sandy_loam();
        let theta_dry = t.theta_from_psi(-10.0);
        assert!(theta_dry < 0.15, "expected near-residual theta, got {}", theta_dry);
        assert!(theta_dry >= 0.05 - 1e-6);
    }

    #[test]
    fn theta_is_monotone_increasing_in_psi() {
        let t = sandy_loam();
        let mut prev = t.theta_from_psi(-10.0);
        for i in 1..=20 {
            let psi = -10.0 + i as f64 * 0.5;
            let v = t.theta_from_psi(psi);
            assert!(v >= prev - 1e-9, "theta(psi) must be non-decreasing in psi");
            prev = v;
        }
    }

    #[test]
    fn conductivity_increases_with_moisture() {
        let t = sandy_loam();
        let k_dry = t.k_from_theta(0.10);
        let k_wet = t.k_from_theta(0.40);
        assert!(k_wet > k_dry);
    }

    #[test]
    fn conductivity_at_saturation_matches_k_s() {
        let t = sandy_loam();
        assert!((t.k_from_theta(0.43) - t.k_s).abs() / t.k_s < 1e-2);
    }

    #[test]
    fn harmonic_mean_is_between_the_two_values_and_zero_when_either_is_zero() {
        let t = sandy_loam();
        let h = t.harmonic_k(0.40, 0.43);
        let (lo, hi) = (t.k_from_theta(0.40).min(t.k_from_theta(0.43)), t.k_from_theta(0.40).max(t.k_from_theta(0.43)));
        assert!(h >= lo - 1e-12 && h <= hi + 1e-12);
        assert_eq!(t.harmonic_k(t.theta_r, 0.43), 0.0);
    }
}
