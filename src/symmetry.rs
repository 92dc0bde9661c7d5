//! Symmetry-reduced storage.
//!
//! When the geometry, sources and boundaries all share a mirror or two-fold
//! rotation symmetry, only half the domain needs to be stored and stepped.
//! The stored half is the lower half along one axis (the symmetry plane row
//! included); stencil samples that land beyond the plane are answered by
//! reflecting the index back into the stored half and applying the component
//! parity sign. E transforms as a vector and H as a pseudovector, so a mirror
//! flips the E component normal to the plane but the tangential H components.
//!
//! Reflection negates and reorders the same stored values the full-domain
//! stencil would read, so a reduced run reproduces the full run bitwise.

use nalgebra::Vector3;

use crate::error::{FdtdError, Result};
use crate::grid::Component;

/// A declared symmetry of the whole problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymmetryOp {
    /// Mirror through the domain midplane normal to `axis`. `phase` is the
    /// field eigenvalue under the mirror, +1 or -1.
    Mirror { axis: usize, phase: f64 },
    /// Two-fold rotation about the z axis through the domain center.
    Rotate2 { phase: f64 },
}

impl SymmetryOp {
    /// The axis whose storage is halved.
    pub fn reduced_axis(self) -> usize {
        match self {
            SymmetryOp::Mirror { axis, .. } => axis,
            SymmetryOp::Rotate2 { .. } => 0,
        }
    }

    pub fn name(self) -> String {
        match self {
            SymmetryOp::Mirror { axis, phase } => {
                format!("mirror(axis={axis}, phase={phase:+.0})")
            }
            SymmetryOp::Rotate2 { phase } => format!("rotate2(phase={phase:+.0})"),
        }
    }

    /// Parity of a field component under this operation, including the
    /// declared phase.
    pub fn sign(self, comp: Component) -> f64 {
        match self {
            SymmetryOp::Mirror { axis, phase } => {
                let flips = if comp.is_electric() {
                    comp.axis() == axis
                } else {
                    comp.axis() != axis
                };
                if flips {
                    -phase
                } else {
                    phase
                }
            }
            SymmetryOp::Rotate2 { phase } => {
                // In-plane components flip under a 180 degree rotation; the z
                // components are invariant. E and H transform alike under a
                // proper rotation.
                if comp.axis() == 2 {
                    phase
                } else {
                    -phase
                }
            }
        }
    }

    /// Storage dims for the reduced grid. The symmetry plane must coincide
    /// with a lattice row, which requires an odd point count along each
    /// reflected axis.
    pub fn reduced_dims(self, full: [usize; 3]) -> Result<[usize; 3]> {
        let check_odd = |axis: usize| -> Result<usize> {
            let n = full[axis];
            if n == 1 || n % 2 == 0 {
                return Err(FdtdError::SymmetryIncompatible {
                    op: self.name(),
                    reason: format!(
                        "axis {axis} has {n} points; the symmetry plane must sit on a lattice row"
                    ),
                });
            }
            Ok((n - 1) / 2)
        };
        let mut dims = full;
        match self {
            SymmetryOp::Mirror { axis, .. } => {
                let c = check_odd(axis)?;
                dims[axis] = c + 1;
            }
            SymmetryOp::Rotate2 { .. } => {
                let c = check_odd(0)?;
                check_odd(1)?;
                dims[0] = c + 1;
            }
        }
        Ok(dims)
    }

    /// The image of a continuous position under the operation, given the full
    /// domain dims.
    pub fn image_position(self, p: Vector3<f64>, full: [usize; 3], dx: f64) -> Vector3<f64> {
        let center = |axis: usize| (full[axis] - 1) as f64 / 2.0 * dx;
        let mut q = p;
        match self {
            SymmetryOp::Mirror { axis, .. } => {
                q[axis] = 2.0 * center(axis) - p[axis];
            }
            SymmetryOp::Rotate2 { .. } => {
                q[0] = 2.0 * center(0) - p[0];
                q[1] = 2.0 * center(1) - p[1];
            }
        }
        q
    }

    /// Fold a full-domain lattice index of `comp` into the stored half,
    /// returning the stored index and the parity sign (1.0 when the index
    /// was already stored). Half-offset samples reflect about the plane as
    /// i + 1/2 -> 2c - i - 1/2.
    pub fn fold_index(
        self,
        comp: Component,
        index: [usize; 3],
        full: [usize; 3],
    ) -> ([usize; 3], f64) {
        let reflect_axis = |axis: usize, idx: &mut [usize; 3]| -> bool {
            let c = (full[axis] - 1) / 2;
            let half = comp.half_offset(axis);
            let stored_max = if half { c.saturating_sub(1) } else { c };
            if idx[axis] <= stored_max {
                return false;
            }
            idx[axis] = if half {
                2 * c - 1 - idx[axis]
            } else {
                2 * c - idx[axis]
            };
            true
        };
        let mut idx = index;
        let reflected = match self {
            SymmetryOp::Mirror { axis, .. } => reflect_axis(axis, &mut idx),
            SymmetryOp::Rotate2 { .. } => {
                // The stored region is the lower half in x with the full y
                // range; images of unstored points reflect both axes.
                if reflect_axis(0, &mut idx) {
                    let c = (full[1] - 1) / 2;
                    let half = comp.half_offset(1);
                    idx[1] = if half {
                        2 * c - 1 - idx[1]
                    } else {
                        2 * c - idx[1]
                    };
                    true
                } else {
                    false
                }
            }
        };
        if reflected {
            (idx, self.sign(comp))
        } else {
            (idx, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_parity_flips_normal_e_and_tangential_h() {
        let op = SymmetryOp::Mirror { axis: 0, phase: 1.0 };
        assert_eq!(op.sign(Component::Ex), -1.0);
        assert_eq!(op.sign(Component::Ey), 1.0);
        assert_eq!(op.sign(Component::Ez), 1.0);
        assert_eq!(op.sign(Component::Hx), 1.0);
        assert_eq!(op.sign(Component::Hy), -1.0);
        assert_eq!(op.sign(Component::Hz), -1.0);

        // The declared phase multiplies everything.
        let odd = SymmetryOp::Mirror { axis: 0, phase: -1.0 };
        assert_eq!(odd.sign(Component::Ez), -1.0);
        assert_eq!(odd.sign(Component::Ex), 1.0);
    }

    #[test]
    fn rotation_parity_flips_in_plane_components_only() {
        let op = SymmetryOp::Rotate2 { phase: 1.0 };
        assert_eq!(op.sign(Component::Ex), -1.0);
        assert_eq!(op.sign(Component::Ey), -1.0);
        assert_eq!(op.sign(Component::Ez), 1.0);
        assert_eq!(op.sign(Component::Hz), 1.0);
    }

    #[test]
    fn reduction_requires_a_lattice_row_on_the_plane() {
        let op = SymmetryOp::Mirror { axis: 0, phase: 1.0 };
        assert_eq!(op.reduced_dims([161, 1, 1]).unwrap(), [81, 1, 1]);
        assert!(op.reduced_dims([160, 1, 1]).is_err());
        assert!(op.reduced_dims([1, 41, 1]).is_err());
    }

    #[test]
    fn folding_reflects_integer_and_half_samples_correctly() {
        let op = SymmetryOp::Mirror { axis: 0, phase: 1.0 };
        let full = [9, 1, 1];
        // c = 4. Integer-positioned Ez: index 6 reflects to 2.
        let (idx, s) = op.fold_index(Component::Ez, [6, 0, 0], full);
        assert_eq!(idx, [2, 0, 0]);
        assert_eq!(s, 1.0);
        // The plane row itself stays put.
        let (idx, s) = op.fold_index(Component::Ez, [4, 0, 0], full);
        assert_eq!(idx, [4, 0, 0]);
        assert_eq!(s, 1.0);
        // Half-offset Ex: sample 4 sits at 4.5, reflecting to 3.5 = index 3.
        let (idx, s) = op.fold_index(Component::Ex, [4, 0, 0], full);
        assert_eq!(idx, [3, 0, 0]);
        assert_eq!(s, -1.0);
        // Stored half passes through untouched.
        let (idx, s) = op.fold_index(Component::Ex, [2, 0, 0], full);
        assert_eq!(idx, [2, 0, 0]);
        assert_eq!(s, 1.0);
    }

    #[test]
    fn image_position_reflects_through_the_domain_center() {
        let op = SymmetryOp::Mirror { axis: 0, phase: 1.0 };
        let q = op.image_position(Vector3::new(1.0, 2.0, 0.0), [81, 81, 1], 0.1);
        assert!((q[0] - 7.0).abs() < 1e-12);
        assert!((q[1] - 2.0).abs() < 1e-12);

        let rot = SymmetryOp::Rotate2 { phase: 1.0 };
        let q = rot.image_position(Vector3::new(1.0, 2.0, 0.0), [81, 81, 1], 0.1);
        assert!((q[0] - 7.0).abs() < 1e-12);
        assert!((q[1] - 6.0).abs() < 1e-12);
    }
}
