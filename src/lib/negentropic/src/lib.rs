// File: `src/lib/negentropic/src/lib.rs`
//
// UNIT SYSTEM: SI, CONSISTENT THROUGHOUT
// =======================================
// Length: meter (m)
// Time: second (s)
// Mass: kilogram (kg)
// Pressure: pascal (Pa)
// Temperature: kelvin (K)
// Vorticity/angular rate: radians/second (rad/s)
// Fixed-point fields: Q16.16, one fractional LSB = 1/65536
//
// All physics modules operate on these units with no hidden conversions;
// any deviation (e.g. `atmosphere`'s `et_mm_per_day`) is named in that
// module's own doc comments.

pub mod atmosphere;
pub mod barriers;
pub mod cell;
pub mod clebsch;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fixed_point;
pub mod grid;
pub mod hydrology;
pub mod microbial;
pub mod octree;
pub mod prng;
pub mod regeneration;
pub mod rk4;
pub mod rkmk4;
pub mod slab;
pub mod state;
pub mod torsion;
pub mod van_genuchten;
pub mod workspace;

pub use cell::{Cell, CellFlags, Pose, Twist};
pub use config::{ClebschConfig, IntegratorKind, PrecisionMode, TorsionConfig};
pub use dispatch::{lod_gated_step_cell, lod_gated_step_tile, LodStats};
pub use error::{NegErrorFlags, StepOutcome};
pub use grid::Grid;
pub use state::CanonicalState;
