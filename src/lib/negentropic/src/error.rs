//! Hot-path error flags and boundary-facing error types.
//!
//! The kernel distinguishes two error surfaces. Conditions a step can
//! continue past (saturation, drift, non-convergence) are recorded in
//! [`NegErrorFlags`], a plain bitfield returned by value and merged by the
//! caller — never an `Err`, since the hash in `state.rs` must remain a
//! function of the actual stored state regardless of warnings. Conditions
//! that must reject an operation before it mutates anything (malformed
//! snapshots, invalid parameter records, exhausted pools) are ordinary
//! `thiserror` enums.

use thiserror::Error;

/// Bitfield of conditions observed during a step. Field order and bit
/// positions are part of the state hash's stability contract: do not
/// reorder without bumping the snapshot version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NegErrorFlags {
    bits: u32,
    pub total_errors: u32,
    pub last_error_step: u64,
}

const BIT_OVERFLOW: u32 = 1 << 0;
const BIT_UNDERFLOW: u32 = 1 << 1;
const BIT_NAN: u32 = 1 << 2;
const BIT_INF: u32 = 1 << 3;
const BIT_SO3_DRIFT: u32 = 1 << 4;
const BIT_ENERGY_DRIFT: u32 = 1 << 5;
const BIT_STEP_FAILED: u32 = 1 << 6;
const BIT_MASS_VIOLATION: u32 = 1 << 7;
const BIT_CONVERGENCE_FAILED: u32 = 1 << 8;
const BIT_MEMORY: u32 = 1 << 9;
const BIT_INVALID_STATE: u32 = 1 << 10;

/// Severity ordering used to decide whether a step must abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    None = 0,
    Warning = 1,
    Critical = 2,
    Fatal = 3,
}

macro_rules! flag_accessor {
    ($get:ident, $set:ident, $bit:expr) => {
        pub fn $get(&self) -> bool {
            self.bits & $bit != 0
        }

        pub fn $set(&mut self, step: u64) {
            if self.bits & $bit == 0 {
                self.bits |= $bit;
            }
            self.total_errors += 1;
            self.last_error_step = step;
        }
    };
}

impl NegErrorFlags {
    pub fn new() -> Self {
        Self::default()
    }

    flag_accessor!(overflow, set_overflow, BIT_OVERFLOW);
    flag_accessor!(underflow, set_underflow, BIT_UNDERFLOW);
    flag_accessor!(nan, set_nan, BIT_NAN);
    flag_accessor!(inf, set_inf, BIT_INF);
    flag_accessor!(so3_drift, set_so3_drift, BIT_SO3_DRIFT);
    flag_accessor!(energy_drift, set_energy_drift, BIT_ENERGY_DRIFT);
    flag_accessor!(step_failed, set_step_failed, BIT_STEP_FAILED);
    flag_accessor!(mass_violation, set_mass_violation, BIT_MASS_VIOLATION);
    flag_accessor!(
        convergence_failed,
        set_convergence_failed,
        BIT_CONVERGENCE_FAILED
    );
    flag_accessor!(memory, set_memory, BIT_MEMORY);
    flag_accessor!(invalid_state, set_invalid_state, BIT_INVALID_STATE);

    pub fn has_errors(&self) -> bool {
        self.bits != 0
    }

    pub fn clear(&mut self) {
        self.bits = 0;
        self.total_errors = 0;
        self.last_error_step = 0;
    }

    /// Merge another flag set's bits into this one, keeping the later step
    /// index and accumulating the total count. Used by callers folding
    /// per-cell/per-tile error deltas into a simulation-wide accumulator.
    pub fn merge(&mut self, other: &NegErrorFlags) {
        self.bits |= other.bits;
        self.total_errors += other.total_errors;
        if other.last_error_step >= self.last_error_step {
            self.last_error_step = other.last_error_step;
        }
    }

    pub fn severity(&self) -> Severity {
        if self.bits & (BIT_NAN | BIT_INF | BIT_INVALID_STATE) != 0 {
            Severity::Fatal
        } else if self.bits & (BIT_SO3_DRIFT | BIT_MASS_VIOLATION | BIT_CONVERGENCE_FAILED | BIT_MEMORY) != 0 {
            Severity::Critical
        } else if self.bits != 0 {
            Severity::Warning
        } else {
            Severity::None
        }
    }

    /// Whether the dispatch boundary must reject the current step rather
    /// than continue with a flagged-but-stored result. Per the propagation
    /// policy, only invalid state and NaN/Inf are hot-path terminal.
    pub fn is_step_terminal(&self) -> bool {
        self.bits & (BIT_NAN | BIT_INF | BIT_INVALID_STATE) != 0
    }

    /// Human-readable names of every currently-set flag, in bit order.
    pub fn active_flag_names(&self) -> Vec<&'static str> {
        let table: [(u32, &'static str); 11] = [
            (BIT_OVERFLOW, "overflow"),
            (BIT_UNDERFLOW, "underflow"),
            (BIT_NAN, "nan"),
            (BIT_INF, "inf"),
            (BIT_SO3_DRIFT, "so3_drift"),
            (BIT_ENERGY_DRIFT, "energy_drift"),
            (BIT_STEP_FAILED, "step_failed"),
            (BIT_MASS_VIOLATION, "mass_violation"),
            (BIT_CONVERGENCE_FAILED, "convergence_failed"),
            (BIT_MEMORY, "memory"),
            (BIT_INVALID_STATE, "invalid_state"),
        ];
        table
            .iter()
            .filter(|(bit, _)| self.bits & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }

    /// Raw bit pattern, used verbatim by the snapshot encoder so the hash
    /// stays a function of the stored bitfield rather than of derived text.
    pub fn raw_bits(&self) -> u32 {
        self.bits
    }

    pub fn from_raw_bits(bits: u32, total_errors: u32, last_error_step: u64) -> Self {
        Self {
            bits,
            total_errors,
            last_error_step,
        }
    }
}

/// Dispatch-level result code mirroring the original C contract: 0 success,
/// 1 fallback used, negative specific failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    FallbackUsed,
    InvalidParameters,
    Diverged,
    Unstable,
    Unsupported,
}

impl StepOutcome {
    pub fn as_code(self) -> i32 {
        match self {
            StepOutcome::Success => 0,
            StepOutcome::FallbackUsed => 1,
            StepOutcome::InvalidParameters => -1,
            StepOutcome::Diverged => -2,
            StepOutcome::Unstable => -3,
            StepOutcome::Unsupported => -4,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("entity count must be nonzero")]
    ZeroEntityCount,
    #[error("scalar field count must be nonzero")]
    ZeroScalarFieldCount,
    #[error("grid dimensions must all be nonzero, got ({0},{1},{2})")]
    ZeroGridDim(u32, u32, u32),
    #[error("default dt must be positive, got {0}")]
    NonPositiveDt(f64),
    #[error("unsupported precision mode {0}")]
    UnsupportedPrecision(u32),
}

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("regeneration r_V must lie in (0,1), got {0}")]
    InvalidGrowthRate(f64),
    #[error("regeneration K_V must be positive, got {0}")]
    NonPositiveCarryingCapacity(f64),
    #[error("F:B lookup table anchors must be strictly increasing in FB, violated at index {0}")]
    NonMonotoneFbTable(usize),
    #[error("value {field} must lie in [{min},{max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("magic mismatch: expected NEGSTATE")]
    BadMagic,
    #[error("unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("content hash mismatch: stored {stored:#018x}, computed {computed:#018x}")]
    HashMismatch { stored: u64, computed: u64 },
    #[error("declared data size {declared} does not match buffer remainder {actual}")]
    SizeMismatch { declared: u32, actual: u32 },
    #[error("entity count {found} does not match state's configured count {expected}")]
    EntityCountMismatch { found: u32, expected: u32 },
    #[error("scalar field count {found} does not match state's configured count {expected}")]
    ScalarCountMismatch { found: u32, expected: u32 },
    #[error("buffer too short: need at least {needed} bytes, have {have}")]
    BufferTooShort { needed: usize, have: usize },
}

#[derive(Debug, Error)]
pub enum SlabError {
    #[error("pool exhausted: all {capacity} slots claimed")]
    Exhausted { capacity: usize },
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("index ({0},{1},{2}) out of bounds for grid of size ({3},{4},{5})")]
    OutOfBounds(i64, i64, i64, u32, u32, u32),
    #[error("activating cell would exceed memory budget of {budget} bytes (projected {projected})")]
    BudgetExceeded { budget: usize, projected: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_taxonomy() {
        let mut f = NegErrorFlags::new();
        assert_eq!(f.severity(), Severity::None);
        f.set_overflow(1);
        assert_eq!(f.severity(), Severity::Warning);
        f.set_mass_violation(2);
        assert_eq!(f.severity(), Severity::Critical);
        f.set_nan(3);
        assert_eq!(f.severity(), Severity::Fatal);
    }

    #[test]
    fn only_nan_inf_invalid_state_are_step_terminal() {
        let mut f = NegErrorFlags::new();
        f.set_convergence_failed(1);
        assert!(!f.is_step_terminal());
        f.set_nan(2);
        assert!(f.is_step_terminal());
    }

    #[test]
    fn merge_accumulates_counts_and_keeps_latest_step() {
        let mut a = NegErrorFlags::new();
        a.set_overflow(5);
        let mut b = NegErrorFlags::new();
        b.set_underflow(9);
        a.merge(&b);
        assert!(a.overflow());
        assert!(a.underflow());
        assert_eq!(a.total_errors, 2);
        assert_eq!(a.last_error_step, 9);
    }

    #[test]
    fn flags_clear_to_none() {
        let mut f = NegErrorFlags::new();
        f.set_overflow(1);
        f.clear();
        assert!(!f.has_errors());
        assert_eq!(f.total_errors, 0);
    }
}
