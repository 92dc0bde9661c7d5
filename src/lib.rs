//! Finite-difference time-domain electromagnetic solver core.
//!
//! Maxwell's curl equations are integrated on a staggered Yee lattice with
//! leapfrog time stepping, in normalized units where the vacuum speed of
//! light and impedance are 1. The pieces:
//!
//! - [`grid`]: staggered field storage and interpolation
//! - [`geometry`] / [`material`]: continuous material input resolved onto
//!   the lattice with subpixel averaging
//! - [`boundary`]: metallic, Bloch-periodic and graded-absorber faces
//! - [`symmetry`]: mirror/rotation storage reduction
//! - [`source`]: current sources with Gaussian-pulse and CW profiles
//! - [`stepper`]: the time loop, stability guards and probes
//! - [`dft`] / [`flux`]: running Fourier transforms and Poynting flux
//!
//! The discretization follows the standard treatment (Yee 1966; Taflove &
//! Hagness, *Computational Electrodynamics*), with materials handled through
//! a separate D/B layer so dispersion and nonlinearity stay local to the
//! constitutive update.

pub mod boundary;
pub mod dft;
pub mod error;
pub mod flux;
pub mod geometry;
pub mod grid;
pub mod material;
pub mod source;
pub mod stepper;
pub mod symmetry;

pub use boundary::{Boundary, BoundarySet, PmlConfig, Side};
pub use dft::{DftAccumulator, DftRegion};
pub use error::{FdtdError, Result};
pub use flux::{FluxAccumulator, FluxRegion, FluxSnapshot};
pub use geometry::{FnMaterial, MaterialMap, Scene, Shape, Solid};
pub use grid::{Component, FieldPlane, Grid};
pub use material::{MaterialField, Medium, ResponseSpec, SmoothingOptions};
pub use source::{Source, SourceTime};
pub use stepper::{Monitor, Simulation, SimulationConfig};
pub use symmetry::SymmetryOp;
