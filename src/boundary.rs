//! Boundary conditions applied at domain faces.
//!
//! Each of the six cell faces carries one of three behaviors:
//! - Metallic (perfect electric conductor): tangential E and normal D pinned
//!   to zero at the face. Trivially exact, and the default.
//! - Bloch-periodic: stencil samples wrapping across the face pick up the
//!   phase factor e^{i k L}.
//! - PML: an extra spatially-graded conductivity inside the layer, zero at
//!   the interior edge and rising polynomially to the outer face. The layer
//!   is backed by a metallic wall; residual reflection is a discretization
//!   property that shrinks as the layer thickens.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FdtdError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Lo = 0,
    Hi = 1,
}

impl Side {
    pub fn name(self) -> &'static str {
        match self {
            Side::Lo => "lower",
            Side::Hi => "upper",
        }
    }
}

/// Absorbing-layer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmlConfig {
    /// Layer thickness in physical length units.
    pub thickness: f64,
    /// Polynomial grading order of the conductivity profile.
    pub order: f64,
    /// Peak damping rate at the outer face; 0 picks the optimal value for
    /// the cell size.
    pub sigma_max: f64,
}

impl Default for PmlConfig {
    fn default() -> Self {
        Self {
            thickness: 1.0,
            order: 3.0,
            sigma_max: 0.0,
        }
    }
}

impl PmlConfig {
    /// Near-optimal peak conductivity for polynomial grading, in normalized
    /// units (c = impedance = 1): sigma_max = 0.8 (m+1) / dx.
    pub fn optimal_sigma_max(dx: f64, order: f64) -> f64 {
        0.8 * (order + 1.0) / dx
    }

    pub fn resolved_sigma_max(&self, dx: f64) -> f64 {
        if self.sigma_max > 0.0 {
            self.sigma_max
        } else {
            Self::optimal_sigma_max(dx, self.order)
        }
    }
}

/// Behavior of a single domain face.
#[derive(Debug, Clone, PartialEq)]
pub enum Boundary {
    Metallic,
    /// Periodic wrap with Bloch wavevector component `bloch_k` along the
    /// axis; the wrap phase is e^{i k L} with L the domain period.
    Periodic { bloch_k: f64 },
    Pml(PmlConfig),
}

/// Per-face boundary declarations. Unset faces default to metallic.
#[derive(Debug, Clone, Default)]
pub struct BoundarySet {
    faces: [[Option<Boundary>; 2]; 3],
}

const METALLIC: Boundary = Boundary::Metallic;

impl BoundarySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare one face. Redeclaring a face with a different behavior is the
    /// conflicting-declarations fatal error.
    pub fn declare(&mut self, axis: usize, side: Side, boundary: Boundary) -> Result<()> {
        let slot = &mut self.faces[axis][side as usize];
        match slot {
            Some(existing) if *existing != boundary => Err(FdtdError::BoundaryConflict {
                axis,
                side: side.name(),
            }),
            _ => {
                *slot = Some(boundary);
                Ok(())
            }
        }
    }

    /// Declare PML on both faces of every axis.
    pub fn pml_all(config: PmlConfig) -> Self {
        let mut set = Self::new();
        for axis in 0..3 {
            for side in 0..2 {
                set.faces[axis][side] = Some(Boundary::Pml(config.clone()));
            }
        }
        set
    }

    /// Declare a Bloch-periodic pair on one axis.
    pub fn periodic(&mut self, axis: usize, bloch_k: f64) -> Result<()> {
        self.declare(axis, Side::Lo, Boundary::Periodic { bloch_k })?;
        self.declare(axis, Side::Hi, Boundary::Periodic { bloch_k })
    }

    pub fn face(&self, axis: usize, side: Side) -> &Boundary {
        self.faces[axis][side as usize].as_ref().unwrap_or(&METALLIC)
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        matches!(self.face(axis, Side::Lo), Boundary::Periodic { .. })
    }

    /// Bloch wavevector of a periodic axis.
    pub fn bloch_k(&self, axis: usize) -> f64 {
        match self.face(axis, Side::Lo) {
            Boundary::Periodic { bloch_k } => *bloch_k,
            _ => 0.0,
        }
    }

    /// Check pairing and fit of all declarations against the grid.
    pub(crate) fn validate(&self, dims: [usize; 3], dx: f64) -> Result<()> {
        for axis in 0..3 {
            if dims[axis] == 1 {
                continue;
            }
            let extent = (dims[axis] - 1) as f64 * dx;
            let lo = self.face(axis, Side::Lo);
            let hi = self.face(axis, Side::Hi);

            match (lo, hi) {
                (Boundary::Periodic { bloch_k: ka }, Boundary::Periodic { bloch_k: kb }) => {
                    if (ka - kb).abs() > 1e-12 {
                        return Err(FdtdError::BlochMismatch { axis });
                    }
                }
                (Boundary::Periodic { .. }, _) | (_, Boundary::Periodic { .. }) => {
                    return Err(FdtdError::BlochMismatch { axis });
                }
                _ => {}
            }

            let mut total_pml = 0.0;
            for side in [Side::Lo, Side::Hi] {
                if let Boundary::Pml(cfg) = self.face(axis, side) {
                    total_pml += cfg.thickness;
                    let cells = (cfg.thickness / dx).round() as usize;
                    if cells < 8 {
                        warn!(
                            axis,
                            side = side.name(),
                            cells,
                            "PML thinner than 8 cells; expect elevated residual reflection"
                        );
                    }
                }
            }
            if total_pml >= extent {
                return Err(FdtdError::PmlTooThick {
                    axis,
                    thickness: total_pml,
                    extent,
                });
            }
        }
        Ok(())
    }

    /// Phase factor picked up when a stencil sample wraps across the `side`
    /// face of a periodic axis with period `length`.
    pub(crate) fn bloch_phase(&self, axis: usize, side: Side, length: f64) -> Complex64 {
        let k = self.bloch_k(axis);
        let sign = match side {
            Side::Hi => 1.0,
            Side::Lo => -1.0,
        };
        Complex64::from_polar(1.0, sign * k * length)
    }

    /// Damping-rate profiles, one per axis, sampled at both integer and
    /// half-integer lattice positions of the full domain.
    pub(crate) fn gamma_profiles(&self, dims: [usize; 3], dx: f64) -> [GammaProfile; 3] {
        [
            self.axis_profile(0, dims, dx),
            self.axis_profile(1, dims, dx),
            self.axis_profile(2, dims, dx),
        ]
    }

    fn axis_profile(&self, axis: usize, dims: [usize; 3], dx: f64) -> GammaProfile {
        let n = dims[axis];
        let mut integer = vec![0.0; n];
        let mut half = vec![0.0; n];
        if n == 1 {
            return GammaProfile { integer, half };
        }
        let last = (n - 1) as f64;
        let gamma_at = |pos: f64| -> f64 {
            let mut g = 0.0;
            if let Boundary::Pml(cfg) = self.face(axis, Side::Lo) {
                let t = cfg.thickness / dx;
                if pos < t {
                    let rho = (t - pos) / t;
                    g += cfg.resolved_sigma_max(dx) * rho.powf(cfg.order);
                }
            }
            if let Boundary::Pml(cfg) = self.face(axis, Side::Hi) {
                let t = cfg.thickness / dx;
                if pos > last - t {
                    let rho = (pos - (last - t)) / t;
                    g += cfg.resolved_sigma_max(dx) * rho.powf(cfg.order);
                }
            }
            g
        };
        for i in 0..n {
            integer[i] = gamma_at(i as f64);
            half[i] = gamma_at(i as f64 + 0.5);
        }
        GammaProfile { integer, half }
    }
}

/// Per-axis damping-rate samples at integer and half-integer positions.
#[derive(Debug, Clone)]
pub struct GammaProfile {
    integer: Vec<f64>,
    half: Vec<f64>,
}

impl GammaProfile {
    #[inline]
    pub fn at(&self, index: usize, half_offset: bool) -> f64 {
        if half_offset {
            self.half[index]
        } else {
            self.integer[index]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaring_a_face_differently_is_a_conflict() {
        let mut set = BoundarySet::new();
        set.declare(0, Side::Lo, Boundary::Metallic).unwrap();
        let err = set.declare(0, Side::Lo, Boundary::Pml(PmlConfig::default()));
        assert!(matches!(err, Err(FdtdError::BoundaryConflict { axis: 0, .. })));
        // Redeclaring identically is allowed.
        set.declare(0, Side::Lo, Boundary::Metallic).unwrap();
    }

    #[test]
    fn periodic_must_pair_with_matching_phase() {
        let mut set = BoundarySet::new();
        set.declare(0, Side::Lo, Boundary::Periodic { bloch_k: 0.3 })
            .unwrap();
        // Only one face periodic: fatal.
        let err = set.validate([64, 1, 1], 0.1);
        assert!(matches!(err, Err(FdtdError::BlochMismatch { axis: 0 })));

        set.declare(0, Side::Hi, Boundary::Periodic { bloch_k: 0.7 })
            .unwrap();
        let err = set.validate([64, 1, 1], 0.1);
        assert!(matches!(err, Err(FdtdError::BlochMismatch { axis: 0 })));
    }

    #[test]
    fn pml_thicker_than_the_domain_is_fatal() {
        let set = BoundarySet::pml_all(PmlConfig {
            thickness: 3.0,
            ..Default::default()
        });
        // Extent 4.0, two layers of 3.0 cannot fit.
        let err = set.validate([41, 1, 1], 0.1);
        assert!(matches!(err, Err(FdtdError::PmlTooThick { axis: 0, .. })));

        let set = BoundarySet::pml_all(PmlConfig {
            thickness: 1.0,
            ..Default::default()
        });
        set.validate([41, 1, 1], 0.1).unwrap();
    }

    #[test]
    fn pml_profile_is_zero_inside_and_monotone_into_the_layer() {
        let set = BoundarySet::pml_all(PmlConfig {
            thickness: 1.0,
            ..Default::default()
        });
        let profiles = set.gamma_profiles([41, 1, 1], 0.1);
        let p = &profiles[0];
        // Interior: no damping.
        assert_eq!(p.at(20, false), 0.0);
        // Zero at the interior edge of the layer.
        assert_eq!(p.at(10, false), 0.0);
        // Strictly increasing towards the outer face on the lower side.
        let mut prev = p.at(9, false);
        for i in (0..9).rev() {
            let g = p.at(i, false);
            assert!(g > prev, "profile must grow into the layer");
            prev = g;
        }
        // Symmetric on the upper side.
        assert!((p.at(0, false) - p.at(40, false)).abs() < 1e-9);
    }

    #[test]
    fn bloch_phase_wraps_with_conjugate_phases() {
        let mut set = BoundarySet::new();
        set.periodic(0, 0.5).unwrap();
        let hi = set.bloch_phase(0, Side::Hi, 4.0);
        let lo = set.bloch_phase(0, Side::Lo, 4.0);
        assert!((hi * lo - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        assert!((hi.arg() - 2.0).abs() < 1e-12);
    }
}
