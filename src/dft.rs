//! Running discrete Fourier transforms of field regions.
//!
//! Frequency-domain responses accumulate during time stepping instead of
//! storing time series: every step adds e^{i 2 pi f t} field(t) dt into a
//! per-point, per-frequency bin. Memory is proportional to region size times
//! frequency count and independent of run length. Electric components are
//! accumulated at integer time steps and magnetic components at the
//! interleaved half steps, matching where the leapfrog defines them.

use nalgebra::Vector3;
use num_complex::Complex64;

use crate::error::{FdtdError, Result};
use crate::grid::{Component, Grid};

/// One Fourier term of the running transform.
#[inline]
pub(crate) fn fourier_term(freq: f64, t: f64, dt: f64) -> Complex64 {
    Complex64::from_polar(dt, 2.0 * std::f64::consts::PI * freq * t)
}

/// A rectangular region and the components/frequencies to transform in it.
#[derive(Debug, Clone)]
pub struct DftRegion {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
    pub components: Vec<Component>,
    pub frequencies: Vec<f64>,
}

impl DftRegion {
    /// A single-point region.
    pub fn point(p: Vector3<f64>, components: Vec<Component>, frequencies: Vec<f64>) -> Self {
        Self {
            min: p,
            max: p,
            components,
            frequencies,
        }
    }
}

struct ComponentBox {
    comp: Component,
    lo: [usize; 3],
    hi: [usize; 3],
    /// npts * nfreq bins, frequency-major per point.
    data: Vec<Complex64>,
}

impl ComponentBox {
    fn npts(&self) -> usize {
        (0..3).map(|a| self.hi[a] - self.lo[a] + 1).product()
    }
}

/// Accumulates the running transform of one region.
pub struct DftAccumulator {
    frequencies: Vec<f64>,
    boxes: Vec<ComponentBox>,
}

/// Lattice index range of `comp` samples inside [min, max] along one axis.
fn axis_range(grid: &Grid, comp: Component, axis: usize, min: f64, max: f64) -> Result<(usize, usize)> {
    let ext = grid.extent(comp, axis);
    if ext == 1 {
        return Ok((0, 0));
    }
    let off = comp.offset(axis);
    let u_min = min / grid.dx - off;
    let u_max = max / grid.dx - off;
    if u_max < -0.5 || u_min > (ext - 1) as f64 + 0.5 {
        return Err(FdtdError::EmptyRegion);
    }
    let lo = (u_min - 1e-9).ceil().max(0.0) as usize;
    let hi = ((u_max + 1e-9).floor().max(0.0) as usize).min(ext - 1);
    if lo > hi {
        // Zero-thickness region between samples: take the nearest one.
        let mid = (((u_min + u_max) / 2.0).round().max(0.0) as usize).min(ext - 1);
        return Ok((mid, mid));
    }
    Ok((lo, hi))
}

impl DftAccumulator {
    pub fn new(region: &DftRegion, grid: &Grid) -> Result<Self> {
        let mut boxes = Vec::with_capacity(region.components.len());
        for &comp in &region.components {
            let mut lo = [0usize; 3];
            let mut hi = [0usize; 3];
            for a in 0..3 {
                let (l, h) = axis_range(grid, comp, a, region.min[a], region.max[a])?;
                lo[a] = l;
                hi[a] = h;
            }
            let mut cb = ComponentBox {
                comp,
                lo,
                hi,
                data: Vec::new(),
            };
            cb.data = vec![Complex64::new(0.0, 0.0); cb.npts() * region.frequencies.len()];
            boxes.push(cb);
        }
        Ok(Self {
            frequencies: region.frequencies.clone(),
            boxes,
        })
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Add one time sample for all components of the given parity.
    pub(crate) fn feed(&mut self, grid: &Grid, electric: bool, t: f64, dt: f64) {
        let phases: Vec<Complex64> = self
            .frequencies
            .iter()
            .map(|&f| fourier_term(f, t, dt))
            .collect();
        let nf = phases.len();
        for cb in &mut self.boxes {
            if cb.comp.is_electric() != electric {
                continue;
            }
            let arr = grid.primary(cb.comp);
            let mut pt = 0;
            for k in cb.lo[2]..=cb.hi[2] {
                for j in cb.lo[1]..=cb.hi[1] {
                    for i in cb.lo[0]..=cb.hi[0] {
                        let v = arr[grid.idx(i, j, k)];
                        let bins = &mut cb.data[pt * nf..(pt + 1) * nf];
                        for (bin, ph) in bins.iter_mut().zip(&phases) {
                            *bin += ph * v;
                        }
                        pt += 1;
                    }
                }
            }
        }
    }

    /// All accumulated bins of one component at one frequency, in row-major
    /// order over the region.
    pub fn values(&self, comp: Component, freq_idx: usize) -> Result<Vec<Complex64>> {
        let cb = self.find(comp)?;
        let nf = self.frequencies.len();
        Ok((0..cb.npts()).map(|pt| cb.data[pt * nf + freq_idx]).collect())
    }

    /// One accumulated bin at a full lattice index inside the region.
    pub fn value_at(&self, comp: Component, index: [usize; 3], freq_idx: usize) -> Result<Complex64> {
        let cb = self.find(comp)?;
        for a in 0..3 {
            if index[a] < cb.lo[a] || index[a] > cb.hi[a] {
                return Err(FdtdError::OutOfBounds {
                    index,
                    dims: [
                        cb.hi[0] - cb.lo[0] + 1,
                        cb.hi[1] - cb.lo[1] + 1,
                        cb.hi[2] - cb.lo[2] + 1,
                    ],
                });
            }
        }
        let rel = [index[0] - cb.lo[0], index[1] - cb.lo[1], index[2] - cb.lo[2]];
        let pt = (rel[2] * (cb.hi[1] - cb.lo[1] + 1) + rel[1]) * (cb.hi[0] - cb.lo[0] + 1) + rel[0];
        Ok(cb.data[pt * self.frequencies.len() + freq_idx])
    }

    fn find(&self, comp: Component) -> Result<&ComponentBox> {
        self.boxes
            .iter()
            .find(|cb| cb.comp == comp)
            .ok_or_else(|| FdtdError::ShapeMismatch(format!("component {comp:?} not accumulated")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_transform_matches_the_direct_sum() {
        let mut grid = Grid::new([9, 1, 1], 0.1);
        let region = DftRegion::point(
            Vector3::new(0.4, 0.0, 0.0),
            vec![Component::Ez],
            vec![0.7, 1.3],
        );
        let mut acc = DftAccumulator::new(&region, &grid).unwrap();

        let dt = 0.05;
        let mut direct = [Complex64::new(0.0, 0.0); 2];
        for n in 0..200 {
            let t = (n + 1) as f64 * dt;
            let v = Complex64::new((1.7 * t).sin(), 0.3 * (0.9 * t).cos());
            grid.set(Component::Ez, [4, 0, 0], v).unwrap();
            acc.feed(&grid, true, t, dt);
            for (s, &f) in direct.iter_mut().zip(&[0.7, 1.3]) {
                *s += fourier_term(f, t, dt) * v;
            }
        }
        for fi in 0..2 {
            let got = acc.value_at(Component::Ez, [4, 0, 0], fi).unwrap();
            assert!((got - direct[fi]).norm() < 1e-12);
        }
    }

    #[test]
    fn region_outside_the_grid_is_rejected() {
        let grid = Grid::new([9, 1, 1], 0.1);
        let region = DftRegion::point(
            Vector3::new(5.0, 0.0, 0.0),
            vec![Component::Ez],
            vec![1.0],
        );
        assert!(matches!(
            DftAccumulator::new(&region, &grid),
            Err(FdtdError::EmptyRegion)
        ));
    }

    #[test]
    fn point_region_on_a_half_offset_component_snaps_to_one_sample() {
        let grid = Grid::new([9, 1, 1], 0.1);
        let region = DftRegion::point(
            Vector3::new(0.4, 0.0, 0.0),
            vec![Component::Ex],
            vec![1.0],
        );
        let acc = DftAccumulator::new(&region, &grid).unwrap();
        assert_eq!(acc.values(Component::Ex, 0).unwrap().len(), 1);
    }

    #[test]
    fn magnetic_components_ignore_electric_feeds() {
        let mut grid = Grid::new([9, 1, 1], 0.1);
        let region = DftRegion::point(
            Vector3::new(0.4, 0.0, 0.0),
            vec![Component::Hy],
            vec![1.0],
        );
        let mut acc = DftAccumulator::new(&region, &grid).unwrap();
        grid.set(Component::Hy, [4, 0, 0], Complex64::new(2.0, 0.0))
            .unwrap();
        acc.feed(&grid, true, 0.05, 0.05);
        assert_eq!(
            acc.values(Component::Hy, 0).unwrap()[0],
            Complex64::new(0.0, 0.0)
        );
        acc.feed(&grid, false, 0.05, 0.05);
        assert!(acc.values(Component::Hy, 0).unwrap()[0].norm() > 0.0);
    }
}
