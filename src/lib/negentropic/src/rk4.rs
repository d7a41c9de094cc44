//! Classical RK4 and the one-stage Euler fallbacks (§4.6, coarse LoD
//! path and Clebsch non-convergence fallback), plus the shared
//! scalar-field state vector used by the integrator error estimator.
//!
//! Grounded on the teacher's `solver.rs` bounded-iteration-free, purely
//! numerical style: small free functions over plain arrays, no workspace
//! coupling beyond what's passed in.

use crate::cell::Cell;

/// Scalar fields carried through RK4 and compared by the L2 error
/// estimator: theta, surface water, SOM, temperature, vegetation,
/// momentum u/v, per §4.6's error-estimation input list.
pub const STATE_DIM: usize = 7;

pub fn extract_state(cell: &Cell) -> [f64; STATE_DIM] {
    [
        cell.theta,
        cell.h_s,
        cell.som_percent,
        cell.soil_temp_c,
        cell.vegetation_cover,
        cell.momentum_u,
        cell.momentum_v,
    ]
}

pub fn write_state(cell: &mut Cell, s: [f64; STATE_DIM]) {
    cell.theta = s[0];
    cell.h_s = s[1];
    cell.som_percent = s[2];
    cell.soil_temp_c = s[3];
    cell.vegetation_cover = s[4];
    cell.momentum_u = s[5];
    cell.momentum_v = s[6];
}

/// L2 norm of the difference between two state vectors divided by `dt`;
/// `dt <= 0` yields infinity per §4.6.
pub fn error_rate(before: &[f64; STATE_DIM], after: &[f64; STATE_DIM], dt: f64) -> f64 {
    if dt <= 0.0 {
        return f64::INFINITY;
    }
    let sum_sq: f64 = before.iter().zip(after.iter()).map(|(a, b)| (b - a) * (b - a)).sum();
    sum_sq.sqrt() / dt
}

fn add_scaled(base: &[f64; STATE_DIM], delta: &[f64; STATE_DIM], scale: f64) -> [f64; STATE_DIM] {
    let mut out = [0.0; STATE_DIM];
    for i in 0..STATE_DIM {
        out[i] = base[i] + scale * delta[i];
    }
    out
}

/// Classical fourth-order Runge-Kutta over an arbitrary derivative
/// function of the state vector.
pub fn classical_rk4(y0: [f64; STATE_DIM], dt: f64, deriv: impl Fn(&[f64; STATE_DIM]) -> [f64; STATE_DIM]) -> [f64; STATE_DIM] {
    let k1 = deriv(&y0);
    let k2 = deriv(&add_scaled(&y0, &k1, dt / 2.0));
    let k3 = deriv(&add_scaled(&y0, &k2, dt / 2.0));
    let k4 = deriv(&add_scaled(&y0, &k3, dt));

    let mut out = [0.0; STATE_DIM];
    for i in 0..STATE_DIM {
        out[i] = y0[i] + dt / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
    out
}

/// Single-stage explicit Euler, used by the plain `ExplicitEuler` method
/// and as a building block by the Clebsch fallback.
pub fn explicit_euler(y0: [f64; STATE_DIM], dt: f64, deriv: impl Fn(&[f64; STATE_DIM]) -> [f64; STATE_DIM]) -> [f64; STATE_DIM] {
    let k1 = deriv(&y0);
    add_scaled(&y0, &k1, dt)
}

/// Symplectic (semi-implicit) Euler for a separable `(q,p)` pair: update
/// momentum from position first, then position from the new momentum.
pub fn symplectic_euler<const N: usize>(
    q0: [f64; N],
    p0: [f64; N],
    dt: f64,
    dh_dq: impl Fn(&[f64; N]) -> [f64; N],
    dh_dp: impl Fn(&[f64; N]) -> [f64; N],
) -> ([f64; N], [f64; N]) {
    let grad_q = dh_dq(&q0);
    let mut p1 = [0.0; N];
    for i in 0..N {
        p1[i] = p0[i] - dt * grad_q[i];
    }
    let grad_p = dh_dp(&p1);
    let mut q1 = [0.0; N];
    for i in 0..N {
        q1[i] = q0[i] + dt * grad_p[i];
    }
    (q1, p1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rk4_integrates_exponential_decay_accurately() {
        let y0 = [1.0; STATE_DIM];
        let dt = 0.1;
        let y1 = classical_rk4(y0, dt, |y| {
            let mut d = [0.0; STATE_DIM];
            for i in 0..STATE_DIM {
                d[i] = -y[i];
            }
            d
        });
        let expected = (-dt as f64).exp();
        for v in y1.iter() {
            assert!((v - expected).abs() < 1e-4, "{} vs {}", v, expected);
        }
    }

    #[test]
    fn error_rate_is_infinite_for_nonpositive_dt() {
        let a = [0.0; STATE_DIM];
        let b = [1.0; STATE_DIM];
        assert_eq!(error_rate(&a, &b, 0.0), f64::INFINITY);
        assert_eq!(error_rate(&a, &b, -1.0), f64::INFINITY);
    }

    #[test]
    fn error_rate_zero_for_identical_states() {
        let a = [1.0; STATE_DIM];
        assert_eq!(error_rate(&a, &a, 1.0), 0.0);
    }

    #[test]
    fn symplectic_euler_preserves_harmonic_oscillator_energy_approximately() {
        let mut q = [1.0f64];
        let mut p = [0.0f64];
        let dt = 0.01;
        for _ in 0..1000 {
            let (q1, p1) = symplectic_euler(q, p, dt, |q| [q[0]], |p| [p[0]]);
            q = q1;
            p = p1;
        }
        let energy = 0.5 * q[0] * q[0] + 0.5 * p[0] * p[0];
        assert!((energy - 0.5).abs() < 0.05, "energy drifted to {}", energy);
    }
}
