//! Staggered Yee-lattice field storage.
//!
//! Six field components (three electric, three magnetic) live at half-integer
//! offsets within each cell: E components sit on cell edges, H components on
//! cell faces. D is co-located with E and B with H. All component arrays
//! share one lattice spacing; collapsed axes (size 1) give 1D/2D grids.

use nalgebra::Vector3;
use num_complex::Complex64;

use crate::error::{FdtdError, Result};

/// A single field component on the Yee lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Ex,
    Ey,
    Ez,
    Hx,
    Hy,
    Hz,
}

impl Component {
    pub const ALL: [Component; 6] = [
        Component::Ex,
        Component::Ey,
        Component::Ez,
        Component::Hx,
        Component::Hy,
        Component::Hz,
    ];
    pub const ELECTRIC: [Component; 3] = [Component::Ex, Component::Ey, Component::Ez];
    pub const MAGNETIC: [Component; 3] = [Component::Hx, Component::Hy, Component::Hz];

    /// The Cartesian axis this component points along.
    pub fn axis(self) -> usize {
        match self {
            Component::Ex | Component::Hx => 0,
            Component::Ey | Component::Hy => 1,
            Component::Ez | Component::Hz => 2,
        }
    }

    pub fn is_electric(self) -> bool {
        matches!(self, Component::Ex | Component::Ey | Component::Ez)
    }

    pub fn electric(axis: usize) -> Component {
        Component::ELECTRIC[axis]
    }

    pub fn magnetic(axis: usize) -> Component {
        Component::MAGNETIC[axis]
    }

    /// Yee offset: whether this component sits at a half-integer position
    /// along `axis`. E components are offset along their own axis, H
    /// components along the two transverse axes.
    pub fn half_offset(self, axis: usize) -> bool {
        if self.is_electric() {
            self.axis() == axis
        } else {
            self.axis() != axis
        }
    }

    /// Fractional lattice offset (0.0 or 0.5) along `axis`.
    pub fn offset(self, axis: usize) -> f64 {
        if self.half_offset(axis) {
            0.5
        } else {
            0.0
        }
    }
}

/// Plane selector for 2D field slices.
#[derive(Debug, Clone, Copy)]
pub enum FieldPlane {
    /// Plane at z = k.
    Xy(usize),
    /// Plane at y = j.
    Xz(usize),
    /// Plane at x = i.
    Yz(usize),
}

/// Rectangular staggered lattice owning the six E/H arrays plus the
/// co-located D/B arrays.
pub struct Grid {
    pub dims: [usize; 3],
    pub dx: f64,
    pub(crate) e: [Vec<Complex64>; 3],
    pub(crate) d: [Vec<Complex64>; 3],
    pub(crate) h: [Vec<Complex64>; 3],
    pub(crate) b: [Vec<Complex64>; 3],
}

impl Grid {
    pub fn new(dims: [usize; 3], dx: f64) -> Self {
        let n = dims[0] * dims[1] * dims[2];
        let zeros = || {
            [
                vec![Complex64::new(0.0, 0.0); n],
                vec![Complex64::new(0.0, 0.0); n],
                vec![Complex64::new(0.0, 0.0); n],
            ]
        };
        Self {
            dims,
            dx,
            e: zeros(),
            d: zeros(),
            h: zeros(),
            b: zeros(),
        }
    }

    /// Total lattice points per component array.
    pub fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-collapsed axes (1, 2 or 3).
    pub fn active_dims(&self) -> usize {
        self.dims.iter().filter(|&&n| n > 1).count()
    }

    /// Linear index from lattice coordinates.
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    /// Lattice coordinates from a linear index.
    #[inline]
    pub fn unflatten(&self, idx: usize) -> [usize; 3] {
        let i = idx % self.dims[0];
        let j = (idx / self.dims[0]) % self.dims[1];
        let k = idx / (self.dims[0] * self.dims[1]);
        [i, j, k]
    }

    fn check(&self, index: [usize; 3]) -> Result<usize> {
        for a in 0..3 {
            if index[a] >= self.dims[a] {
                return Err(FdtdError::OutOfBounds {
                    index,
                    dims: self.dims,
                });
            }
        }
        Ok(self.idx(index[0], index[1], index[2]))
    }

    pub(crate) fn primary(&self, comp: Component) -> &[Complex64] {
        if comp.is_electric() {
            &self.e[comp.axis()]
        } else {
            &self.h[comp.axis()]
        }
    }

    pub(crate) fn primary_mut(&mut self, comp: Component) -> &mut Vec<Complex64> {
        if comp.is_electric() {
            &mut self.e[comp.axis()]
        } else {
            &mut self.h[comp.axis()]
        }
    }

    /// Read one field sample at a lattice coordinate.
    pub fn get(&self, comp: Component, index: [usize; 3]) -> Result<Complex64> {
        let flat = self.check(index)?;
        Ok(self.primary(comp)[flat])
    }

    /// Write one field sample at a lattice coordinate (the E/H value; the
    /// bound D/B sample is the caller's responsibility, see
    /// `Simulation::set_field`).
    pub fn set(&mut self, comp: Component, index: [usize; 3], value: Complex64) -> Result<()> {
        let flat = self.check(index)?;
        self.primary_mut(comp)[flat] = value;
        Ok(())
    }

    /// Physical position of a component sample, including its Yee offset.
    pub fn position(&self, comp: Component, index: [usize; 3]) -> Vector3<f64> {
        Vector3::new(
            (index[0] as f64 + comp.offset(0)) * self.dx,
            (index[1] as f64 + comp.offset(1)) * self.dx,
            (index[2] as f64 + comp.offset(2)) * self.dx,
        )
    }

    /// Largest valid index + 1 for a component along an axis, ignoring
    /// boundary conditions: half-offset samples lose the last lattice point.
    pub fn extent(&self, comp: Component, axis: usize) -> usize {
        let n = self.dims[axis];
        if n == 1 {
            1
        } else if comp.half_offset(axis) {
            n - 1
        } else {
            n
        }
    }

    /// Map a continuous position to the nearest staggered samples of `comp`
    /// and their bilinear/trilinear weights. Moving the position continuously
    /// changes the weights continuously, which is what makes interpolated
    /// source injection and off-grid probes well behaved.
    pub fn interp(&self, comp: Component, p: Vector3<f64>) -> Vec<(usize, f64)> {
        let mut base = [0usize; 3];
        let mut frac = [0.0f64; 3];
        let mut active = [false; 3];
        for a in 0..3 {
            let ext = self.extent(comp, a);
            if ext <= 1 {
                base[a] = 0;
                frac[a] = 0.0;
                active[a] = false;
                continue;
            }
            let u = p[a] / self.dx - comp.offset(a);
            let clamped = u.clamp(0.0, (ext - 1) as f64);
            let i0 = (clamped.floor() as usize).min(ext - 2);
            base[a] = i0;
            frac[a] = (clamped - i0 as f64).clamp(0.0, 1.0);
            active[a] = true;
        }

        let mut taps = Vec::with_capacity(8);
        for mask in 0..8usize {
            let mut idx = base;
            let mut w = 1.0;
            let mut skip = false;
            for a in 0..3 {
                let hi = mask & (1 << a) != 0;
                if hi {
                    if !active[a] {
                        skip = true;
                        break;
                    }
                    idx[a] += 1;
                    w *= frac[a];
                } else if active[a] {
                    w *= 1.0 - frac[a];
                }
            }
            if skip || w == 0.0 {
                continue;
            }
            taps.push((self.idx(idx[0], idx[1], idx[2]), w));
        }
        taps
    }

    /// Sample a component averaged onto the integer lattice point `index`:
    /// half-offset axes are averaged between the two straddling samples.
    /// Used by flux integration, which needs E and H co-located.
    pub fn centered(&self, comp: Component, index: [usize; 3]) -> Complex64 {
        let mut sum = Complex64::new(0.0, 0.0);
        let mut count = 0.0;
        for mask in 0..8usize {
            let mut idx = index;
            let mut valid = true;
            for a in 0..3 {
                let lo = mask & (1 << a) != 0;
                if !comp.half_offset(a) || self.dims[a] == 1 {
                    if lo {
                        valid = false;
                    }
                    continue;
                }
                if lo {
                    if idx[a] == 0 {
                        valid = false;
                        break;
                    }
                    idx[a] -= 1;
                }
            }
            if !valid {
                continue;
            }
            let mut ok = true;
            for a in 0..3 {
                if idx[a] >= self.extent(comp, a) {
                    ok = false;
                }
            }
            if !ok {
                continue;
            }
            sum += self.primary(comp)[self.idx(idx[0], idx[1], idx[2])];
            count += 1.0;
        }
        if count > 0.0 {
            sum * (1.0 / count)
        } else {
            Complex64::new(0.0, 0.0)
        }
    }

    /// Extract a 2D slice of one component for visualization consumers.
    pub fn field_slice(&self, plane: FieldPlane, comp: Component) -> Vec<Complex64> {
        let arr = self.primary(comp);
        let mut out = Vec::new();
        match plane {
            FieldPlane::Xy(k) => {
                for j in 0..self.dims[1] {
                    for i in 0..self.dims[0] {
                        out.push(arr[self.idx(i, j, k)]);
                    }
                }
            }
            FieldPlane::Xz(j) => {
                for k in 0..self.dims[2] {
                    for i in 0..self.dims[0] {
                        out.push(arr[self.idx(i, j, k)]);
                    }
                }
            }
            FieldPlane::Yz(i) => {
                for k in 0..self.dims[2] {
                    for j in 0..self.dims[1] {
                        out.push(arr[self.idx(i, j, k)]);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yee_offsets_follow_the_standard_arrangement() {
        // E components: half along their own axis only.
        assert!(Component::Ex.half_offset(0));
        assert!(!Component::Ex.half_offset(1));
        assert!(!Component::Ex.half_offset(2));
        // H components: half along the two transverse axes.
        assert!(!Component::Hx.half_offset(0));
        assert!(Component::Hx.half_offset(1));
        assert!(Component::Hx.half_offset(2));
    }

    #[test]
    fn linear_index_matches_row_major_order() {
        let g = Grid::new([4, 3, 2], 0.5);
        assert_eq!(g.idx(0, 0, 0), 0);
        assert_eq!(g.idx(1, 0, 0), 1);
        assert_eq!(g.idx(0, 1, 0), 4);
        assert_eq!(g.idx(0, 0, 1), 12);
        assert_eq!(g.unflatten(g.idx(3, 2, 1)), [3, 2, 1]);
    }

    #[test]
    fn position_includes_stagger() {
        let g = Grid::new([8, 8, 8], 0.25);
        let p = g.position(Component::Ex, [2, 3, 4]);
        assert!((p[0] - 2.5 * 0.25).abs() < 1e-12, "Ex offset half in x");
        assert!((p[1] - 3.0 * 0.25).abs() < 1e-12);
    }

    #[test]
    fn interp_weights_sum_to_one_and_vary_continuously() {
        let g = Grid::new([21, 21, 1], 0.1);
        let taps = g.interp(Component::Ez, Vector3::new(0.53, 0.71, 0.0));
        let total: f64 = taps.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-12, "weights must sum to 1");

        // A tiny move in position produces a tiny change in weights.
        let t1 = g.interp(Component::Ez, Vector3::new(0.530001, 0.71, 0.0));
        for ((ia, wa), (ib, wb)) in taps.iter().zip(t1.iter()) {
            assert_eq!(ia, ib);
            assert!((wa - wb).abs() < 1e-3);
        }
    }

    #[test]
    fn interp_on_grid_point_is_a_single_tap() {
        let g = Grid::new([41, 1, 1], 0.05);
        let taps = g.interp(Component::Ez, Vector3::new(1.0, 0.0, 0.0));
        let on: Vec<_> = taps.iter().filter(|(_, w)| *w > 1e-12).collect();
        assert_eq!(on.len(), 1);
        assert_eq!(on[0].0, 20);
        assert!((on[0].1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn centered_average_straddles_half_offsets() {
        let mut g = Grid::new([8, 1, 1], 1.0);
        // Hy is half-offset in x: centered at i=3 averages samples 2 and 3.
        g.set(Component::Hy, [2, 0, 0], Complex64::new(1.0, 0.0))
            .unwrap();
        g.set(Component::Hy, [3, 0, 0], Complex64::new(3.0, 0.0))
            .unwrap();
        let v = g.centered(Component::Hy, [3, 0, 0]);
        assert!((v.re - 2.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_bounds_reads_are_reported() {
        let g = Grid::new([4, 4, 1], 1.0);
        assert!(g.get(Component::Ez, [4, 0, 0]).is_err());
    }
}
