//! The leapfrog time stepper tying fields, materials, boundaries and
//! analysis together.
//!
//! One step advances B/H by half a time step from the curl of E, then D/E by
//! a full step from the curl of H, with current sources injected into the
//! D (or B) update and the constitutive response recovering E from D point
//! by point. E lives at integer multiples of dt and H at the interleaved
//! half steps.
//!
//! Each component sweep is element-parallel; a sweep reads only fields of
//! the opposite kind, so every lattice point sees identical inputs no matter
//! how the iteration is split across threads and results are reproducible
//! run to run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nalgebra::Vector3;
use num_complex::Complex64;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::boundary::{Boundary, BoundarySet, Side};
use crate::dft::{DftAccumulator, DftRegion};
use crate::error::{FdtdError, Result};
use crate::flux::{FluxAccumulator, FluxRegion};
use crate::geometry::MaterialMap;
use crate::grid::{Component, FieldPlane, Grid};
use crate::material::{MaterialField, SmoothingOptions};
use crate::source::Source;
use crate::symmetry::SymmetryOp;

/// Domain and stepping parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Physical extent per axis; 0 collapses the axis.
    pub size: [f64; 3],
    /// Lattice points per unit length.
    pub resolution: f64,
    /// Courant factor S = c dt / dx.
    pub courant: f64,
    pub smoothing: SmoothingOptions,
    /// Field magnitude beyond which the run aborts as diverged.
    pub divergence_limit: f64,
    /// Steps between divergence checks.
    pub check_interval: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            size: [1.0, 1.0, 1.0],
            resolution: 10.0,
            courant: 0.5,
            smoothing: SmoothingOptions::default(),
            divergence_limit: 1e20,
            check_interval: 50,
        }
    }
}

impl SimulationConfig {
    /// Lattice dims implied by size and resolution.
    pub fn dims(&self) -> [usize; 3] {
        let mut dims = [1usize; 3];
        for a in 0..3 {
            if self.size[a] > 0.0 {
                dims[a] = (self.size[a] * self.resolution).round() as usize + 1;
            }
        }
        dims
    }
}

/// A point probe recording one component every step.
#[derive(Debug)]
pub struct Monitor {
    pub position: Vector3<f64>,
    pub component: Component,
    /// One sample per completed step.
    pub samples: Vec<Complex64>,
    taps: Vec<(usize, f64)>,
    sign: f64,
}

struct SourceTap {
    source: Source,
    taps: Vec<(usize, f64)>,
    active: bool,
}

/// A complete time-domain problem: stored fields, resolved materials,
/// boundaries, sources and attached analysis accumulators.
pub struct Simulation {
    config: SimulationConfig,
    grid: Grid,
    materials: MaterialField,
    boundaries: BoundarySet,
    symmetry: Option<SymmetryOp>,
    full_dims: [usize; 3],
    dt: f64,
    sources: Vec<SourceTap>,
    monitors: Vec<Monitor>,
    dfts: Vec<DftAccumulator>,
    fluxes: Vec<FluxAccumulator>,
    step_count: usize,
    prepared: bool,
    stop: Arc<AtomicBool>,
}

fn media_close(a: &crate::material::Medium, b: &crate::material::Medium) -> bool {
    (a.epsilon - b.epsilon).abs() < 1e-9
        && (a.mu - b.mu).abs() < 1e-9
        && (a.sigma_d - b.sigma_d).abs() < 1e-9
        && (a.sigma_b - b.sigma_b).abs() < 1e-9
        && a.response == b.response
}

impl Simulation {
    /// Resolve the problem onto a grid. All structural validation happens
    /// here: boundary pairing and fit, symmetry compatibility of grid,
    /// boundaries and materials, and the Courant stability bound.
    pub fn new(
        config: SimulationConfig,
        map: &dyn MaterialMap,
        boundaries: BoundarySet,
        symmetry: Option<SymmetryOp>,
    ) -> Result<Self> {
        let full_dims = config.dims();
        let dx = 1.0 / config.resolution;
        boundaries.validate(full_dims, dx)?;

        let storage_dims = match symmetry {
            Some(op) => {
                let axis = op.reduced_axis();
                if boundaries.is_periodic(axis) {
                    return Err(FdtdError::SymmetryIncompatible {
                        op: op.name(),
                        reason: format!("axis {axis} is Bloch-periodic"),
                    });
                }
                let check_faces = |a: usize| -> Result<()> {
                    if boundaries.face(a, Side::Lo) != boundaries.face(a, Side::Hi) {
                        return Err(FdtdError::SymmetryIncompatible {
                            op: op.name(),
                            reason: format!("boundary conditions on axis {a} differ between faces"),
                        });
                    }
                    Ok(())
                };
                match op {
                    SymmetryOp::Mirror { axis, .. } => check_faces(axis)?,
                    SymmetryOp::Rotate2 { .. } => {
                        check_faces(0)?;
                        check_faces(1)?;
                        // The rotation maps y to L - y, which only commutes
                        // with a Bloch condition of zero wavevector.
                        if boundaries.is_periodic(1) && boundaries.bloch_k(1) != 0.0 {
                            return Err(FdtdError::SymmetryIncompatible {
                                op: op.name(),
                                reason: "axis 1 carries a nonzero Bloch wavevector".into(),
                            });
                        }
                    }
                }
                op.reduced_dims(full_dims)?
            }
            None => full_dims,
        };

        let grid = Grid::new(storage_dims, dx);
        let mut materials = MaterialField::build(map, &grid, &config.smoothing);

        if let Some(op) = symmetry {
            // The stored half must be the image of the unstored half.
            let full = Grid::new(full_dims, dx);
            for flat in 0..full.len() {
                let ijk = full.unflatten(flat);
                let p = Vector3::new(
                    ijk[0] as f64 * dx,
                    ijk[1] as f64 * dx,
                    ijk[2] as f64 * dx,
                );
                let q = op.image_position(p, full_dims, dx);
                if !media_close(&map.medium_at(p), &map.medium_at(q)) {
                    return Err(FdtdError::AsymmetricMaterial {
                        position: [p[0], p[1], p[2]],
                    });
                }
            }
        }

        let d = full_dims.iter().filter(|&&n| n > 1).count().max(1);
        let limit = materials.refractive_index_min() / (d as f64).sqrt();
        if config.courant >= limit {
            return Err(FdtdError::CourantUnstable {
                s: config.courant,
                limit,
            });
        }
        let dt = config.courant * dx;

        let profiles = boundaries.gamma_profiles(full_dims, dx);
        materials.add_pml(&profiles, &grid);
        materials.finalize(dt, dx);

        info!(
            dims = ?full_dims,
            storage = ?storage_dims,
            dx,
            dt,
            "simulation grid resolved"
        );

        Ok(Self {
            config,
            grid,
            materials,
            boundaries,
            symmetry,
            full_dims,
            dt,
            sources: Vec::new(),
            monitors: Vec::new(),
            dfts: Vec::new(),
            fluxes: Vec::new(),
            step_count: 0,
            prepared: false,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn dx(&self) -> f64 {
        self.grid.dx
    }

    /// Elapsed simulated time (E-field clock).
    pub fn time(&self) -> f64 {
        self.step_count as f64 * self.dt
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn full_dims(&self) -> [usize; 3] {
        self.full_dims
    }

    /// Storage dims, halved along the reduced axis when a symmetry is
    /// declared.
    pub fn storage_dims(&self) -> [usize; 3] {
        self.grid.dims
    }

    /// A handle other threads may set to interrupt a long run at the next
    /// step boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn add_source(&mut self, source: Source) {
        self.sources.push(SourceTap {
            source,
            taps: Vec::new(),
            active: true,
        });
        self.prepared = false;
    }

    pub fn add_monitor(&mut self, position: Vector3<f64>, component: Component) -> usize {
        let (p, sign) = self.fold_point(component, position);
        let taps = self.grid.interp(component, p);
        self.monitors.push(Monitor {
            position,
            component,
            samples: Vec::new(),
            taps,
            sign,
        });
        self.monitors.len() - 1
    }

    pub fn monitor(&self, id: usize) -> &Monitor {
        &self.monitors[id]
    }

    /// Time stamp of monitor sample `n`. Electric components are recorded at
    /// the end of each step, (n+1) dt; magnetic components live on the
    /// interleaved half-step clock, (n+1/2) dt.
    pub fn monitor_time(&self, id: usize, n: usize) -> f64 {
        let offset = if self.monitors[id].component.is_electric() {
            1.0
        } else {
            0.5
        };
        (n as f64 + offset) * self.dt
    }

    pub fn add_dft(&mut self, region: &DftRegion) -> Result<usize> {
        self.dfts.push(DftAccumulator::new(region, &self.grid)?);
        Ok(self.dfts.len() - 1)
    }

    pub fn dft(&self, id: usize) -> &DftAccumulator {
        &self.dfts[id]
    }

    pub fn add_flux(&mut self, region: &FluxRegion) -> Result<usize> {
        self.fluxes.push(FluxAccumulator::new(region, &self.grid)?);
        Ok(self.fluxes.len() - 1)
    }

    pub fn flux(&self, id: usize) -> &FluxAccumulator {
        &self.fluxes[id]
    }

    pub fn flux_mut(&mut self, id: usize) -> &mut FluxAccumulator {
        &mut self.fluxes[id]
    }

    /// Map a continuous position into the stored half, with the parity sign
    /// picked up if it was reflected.
    fn fold_point(&self, comp: Component, p: Vector3<f64>) -> (Vector3<f64>, f64) {
        let Some(op) = self.symmetry else {
            return (p, 1.0);
        };
        let axis = op.reduced_axis();
        let center = (self.full_dims[axis] - 1) as f64 / 2.0 * self.grid.dx;
        if p[axis] > center + 1e-9 {
            (op.image_position(p, self.full_dims, self.grid.dx), op.sign(comp))
        } else {
            (p, 1.0)
        }
    }

    /// Source bookkeeping deferred until the first step, so sources can be
    /// added in any order before validation.
    fn prepare(&mut self) -> Result<()> {
        if self.prepared {
            return Ok(());
        }
        if let Some(op) = self.symmetry {
            self.validate_sources(op)?;
        }
        let axis_center = self.symmetry.map(|op| {
            let a = op.reduced_axis();
            (a, (self.full_dims[a] - 1) as f64 / 2.0 * self.grid.dx)
        });
        for st in &mut self.sources {
            if let Some((axis, center)) = axis_center {
                if st.source.position[axis] > center + 1e-9 {
                    // The stored-half partner carries its effect.
                    st.active = false;
                    continue;
                }
            }
            st.taps = self.grid.interp(st.source.component, st.source.position);
        }
        self.sanity_warnings();
        self.prepared = true;
        Ok(())
    }

    /// Every source must map onto a declared partner (or onto itself) under
    /// the symmetry, with the parity-transformed amplitude.
    fn validate_sources(&self, op: SymmetryOp) -> Result<()> {
        for st in &self.sources {
            let s = &st.source;
            let q = op.image_position(s.position, self.full_dims, self.grid.dx);
            let sign = op.sign(s.component);
            let want = s.amplitude * sign;
            let on_plane = (q - s.position).norm() < 1e-9;
            if on_plane {
                if sign < 0.0 && s.amplitude.norm() > 0.0 {
                    return Err(FdtdError::AsymmetricSource {
                        position: [s.position[0], s.position[1], s.position[2]],
                    });
                }
                continue;
            }
            let partner = self.sources.iter().any(|other| {
                let o = &other.source;
                o.component == s.component
                    && o.time == s.time
                    && (o.position - q).norm() < 1e-9
                    && (o.amplitude - want).norm() < 1e-9
            });
            if !partner {
                return Err(FdtdError::AsymmetricSource {
                    position: [s.position[0], s.position[1], s.position[2]],
                });
            }
        }
        Ok(())
    }

    fn sanity_warnings(&self) {
        let mut f_lo = f64::INFINITY;
        let mut f_hi: f64 = 0.0;
        for st in &self.sources {
            let (lo, hi) = st.source.time.band();
            if lo > 0.0 {
                f_lo = f_lo.min(lo);
            }
            f_hi = f_hi.max(hi);
        }
        if f_lo.is_finite() && f_lo > 0.0 {
            let wavelength = 1.0 / f_lo;
            for axis in 0..3 {
                for side in [Side::Lo, Side::Hi] {
                    if let Boundary::Pml(cfg) = self.boundaries.face(axis, side) {
                        if cfg.thickness < wavelength / 2.0 {
                            warn!(
                                axis,
                                side = side.name(),
                                thickness = cfg.thickness,
                                wavelength,
                                "PML thinner than half the longest source wavelength"
                            );
                        }
                    }
                }
            }
        }
        if f_hi > 0.0 {
            let outside = |f: f64| f < f_lo - 1e-12 || f > f_hi + 1e-12;
            for acc in &self.dfts {
                if acc.frequencies().iter().any(|&f| outside(f)) {
                    warn!("transform frequency outside the driven band [{f_lo}, {f_hi}]");
                }
            }
            for acc in &self.fluxes {
                if acc.frequencies().iter().any(|&f| outside(f)) {
                    warn!("flux frequency outside the driven band [{f_lo}, {f_hi}]");
                }
            }
        }
    }

    /// Inclusive-lo/exclusive-hi update range per axis for one component.
    /// Half-offset samples stop one short of the last row; tangential E on
    /// metallic walls is pinned at zero by skipping the wall rows; periodic
    /// axes skip the wrap row, which aliases row 0.
    fn update_bounds(&self, comp: Component) -> [[usize; 2]; 3] {
        let mut bounds = [[0usize, 1]; 3];
        let reduced = self.symmetry.map(|op| op.reduced_axis());
        for a in 0..3 {
            let n = self.grid.dims[a];
            if self.full_dims[a] == 1 {
                bounds[a] = [0, 1];
                continue;
            }
            if comp.half_offset(a) {
                bounds[a] = [0, n - 1];
                continue;
            }
            let mut lo = 0;
            let mut hi = n;
            if self.boundaries.is_periodic(a) {
                hi = n - 1;
            } else if comp.is_electric() {
                lo = 1;
                if reduced != Some(a) {
                    hi = n - 1;
                }
            }
            bounds[a] = [lo, hi];
        }
        bounds
    }

    /// Read a stencil neighbor of `comp` at `base` displaced by `delta`
    /// along `axis`, resolving boundary wraps and symmetry folds. Samples
    /// beyond a metallic wall read zero.
    fn sample(&self, comp: Component, base: [usize; 3], axis: usize, delta: i64) -> Complex64 {
        let arr = self.grid.primary(comp);
        if self.full_dims[axis] == 1 {
            return arr[self.grid.idx(base[0], base[1], base[2])];
        }
        let mut t = base[axis] as i64 + delta;
        let mut phase = Complex64::new(1.0, 0.0);
        if self.boundaries.is_periodic(axis) {
            let period = (self.full_dims[axis] - 1) as i64;
            let length = period as f64 * self.grid.dx;
            if t < 0 {
                t += period;
                phase = self.boundaries.bloch_phase(axis, Side::Lo, length);
            } else if t >= period {
                t -= period;
                phase = self.boundaries.bloch_phase(axis, Side::Hi, length);
            }
        }
        if t < 0 {
            return Complex64::new(0.0, 0.0);
        }
        let mut idx = base;
        idx[axis] = t as usize;
        let (idx, sign) = match self.symmetry {
            Some(op) => op.fold_index(comp, idx, self.full_dims),
            None => (idx, 1.0),
        };
        let (idx, wrap) = self.wrap_alias(idx);
        for a in 0..3 {
            if idx[a] >= self.grid.dims[a] {
                return Complex64::new(0.0, 0.0);
            }
        }
        phase * wrap * sign * arr[self.grid.idx(idx[0], idx[1], idx[2])]
    }

    /// The wrap row of a periodic axis aliases row zero: it is never updated
    /// itself, so reads of it redirect and pick up the Bloch phase.
    fn wrap_alias(&self, mut idx: [usize; 3]) -> ([usize; 3], Complex64) {
        let mut phase = Complex64::new(1.0, 0.0);
        for a in 0..3 {
            let n = self.full_dims[a];
            if n > 1 && self.boundaries.is_periodic(a) && idx[a] == n - 1 {
                idx[a] = 0;
                phase *= self
                    .boundaries
                    .bloch_phase(a, Side::Hi, (n - 1) as f64 * self.grid.dx);
            }
        }
        (idx, phase)
    }

    /// Half-step B/H from -curl E, then recover H through the permeability.
    fn update_magnetic(&mut self) {
        let t_src = self.step_count as f64 * self.dt;
        for ci in 0..3 {
            let comp = Component::magnetic(ci);
            let bounds = self.update_bounds(comp);
            let a1 = (ci + 1) % 3;
            let a2 = (ci + 2) % 3;
            let mut b = std::mem::take(&mut self.grid.b[ci]);
            {
                let this = &*self;
                b.par_iter_mut().enumerate().for_each(|(flat, bv)| {
                    let ijk = this.grid.unflatten(flat);
                    for a in 0..3 {
                        if ijk[a] < bounds[a][0] || ijk[a] >= bounds[a][1] {
                            return;
                        }
                    }
                    let e2 = Component::electric(a2);
                    let e1 = Component::electric(a1);
                    let curl = (this.sample(e2, ijk, a1, 1) - this.grid.e[a2][flat])
                        - (this.sample(e1, ijk, a2, 1) - this.grid.e[a1][flat]);
                    *bv = this.materials.ca_h[ci][flat] * *bv
                        - this.materials.cb_h[ci][flat] * curl;
                });
            }
            for st in &self.sources {
                if !st.active || st.source.component != comp {
                    continue;
                }
                let env = st.source.time.eval(t_src);
                if env == 0.0 {
                    continue;
                }
                let amp = st.source.amplitude * env;
                for &(flat, w) in &st.taps {
                    b[flat] -= self.materials.cb_h[ci][flat] * self.grid.dx * w * amp;
                }
            }
            self.grid.b[ci] = b;

            let mut h = std::mem::take(&mut self.grid.h[ci]);
            self.materials.advance_h(ci, &self.grid.b[ci], &mut h);
            self.grid.h[ci] = h;
        }
    }

    /// Full-step D/E from curl H, inject electric currents, then run the
    /// constitutive response.
    fn update_electric(&mut self) {
        let t_src = (self.step_count as f64 + 0.5) * self.dt;
        for ci in 0..3 {
            let comp = Component::electric(ci);
            let bounds = self.update_bounds(comp);
            let a1 = (ci + 1) % 3;
            let a2 = (ci + 2) % 3;
            let mut d = std::mem::take(&mut self.grid.d[ci]);
            {
                let this = &*self;
                d.par_iter_mut().enumerate().for_each(|(flat, dv)| {
                    let ijk = this.grid.unflatten(flat);
                    for a in 0..3 {
                        if ijk[a] < bounds[a][0] || ijk[a] >= bounds[a][1] {
                            return;
                        }
                    }
                    let h2 = Component::magnetic(a2);
                    let h1 = Component::magnetic(a1);
                    // The zero-displacement samples still fold: on the
                    // symmetry plane row the half-offset H samples live just
                    // beyond the stored half.
                    let curl = (this.sample(h2, ijk, a1, 0) - this.sample(h2, ijk, a1, -1))
                        - (this.sample(h1, ijk, a2, 0) - this.sample(h1, ijk, a2, -1));
                    *dv = this.materials.ca_e[ci][flat] * *dv
                        + this.materials.cb_e[ci][flat] * curl;
                });
            }
            for st in &self.sources {
                if !st.active || st.source.component != comp {
                    continue;
                }
                let env = st.source.time.eval(t_src);
                if env == 0.0 {
                    continue;
                }
                let amp = st.source.amplitude * env;
                for &(flat, w) in &st.taps {
                    d[flat] -= self.materials.cb_e[ci][flat] * self.grid.dx * w * amp;
                }
            }
            self.grid.d[ci] = d;

            let mut e = std::mem::take(&mut self.grid.e[ci]);
            self.materials.advance_e(ci, &self.grid.d[ci], &mut e);
            self.grid.e[ci] = e;
        }
    }

    /// Advance one full time step.
    pub fn step(&mut self) -> Result<()> {
        self.prepare()?;

        self.update_magnetic();
        let t_half = (self.step_count as f64 + 0.5) * self.dt;
        for acc in &mut self.dfts {
            acc.feed(&self.grid, false, t_half, self.dt);
        }
        for acc in &mut self.fluxes {
            acc.feed_magnetic(&self.grid, t_half, self.dt);
        }
        // Magnetic probes are recorded here, on the half-step clock where H
        // is defined.
        for m in &mut self.monitors {
            if m.component.is_electric() {
                continue;
            }
            let arr = self.grid.primary(m.component);
            let mut v = Complex64::new(0.0, 0.0);
            for &(flat, w) in &m.taps {
                v += arr[flat] * w;
            }
            m.samples.push(v * m.sign);
        }

        self.update_electric();
        let t_full = (self.step_count + 1) as f64 * self.dt;
        for acc in &mut self.dfts {
            acc.feed(&self.grid, true, t_full, self.dt);
        }
        for acc in &mut self.fluxes {
            acc.feed_electric(&self.grid, t_full, self.dt);
        }
        for m in &mut self.monitors {
            if !m.component.is_electric() {
                continue;
            }
            let arr = self.grid.primary(m.component);
            let mut v = Complex64::new(0.0, 0.0);
            for &(flat, w) in &m.taps {
                v += arr[flat] * w;
            }
            m.samples.push(v * m.sign);
        }

        self.step_count += 1;
        if self.step_count % self.config.check_interval == 0 {
            self.check_divergence()?;
        }
        Ok(())
    }

    fn check_divergence(&self) -> Result<()> {
        let limit2 = self.config.divergence_limit * self.config.divergence_limit;
        let mut worst = 0.0f64;
        for ci in 0..3 {
            for arr in [&self.grid.e[ci], &self.grid.h[ci]] {
                for v in arr.iter() {
                    let m = v.norm_sqr();
                    if m > worst {
                        worst = m;
                    }
                }
            }
        }
        if worst > limit2 {
            return Err(FdtdError::FieldsDiverged {
                step: self.step_count,
                magnitude: worst.sqrt(),
                limit: self.config.divergence_limit,
            });
        }
        Ok(())
    }

    /// Run for `duration` units of simulated time.
    pub fn run(&mut self, duration: f64) -> Result<()> {
        self.run_until(self.time() + duration)
    }

    /// Run until the E-field clock reaches `t_end`.
    pub fn run_until(&mut self, t_end: f64) -> Result<()> {
        while self.time() + self.dt / 2.0 < t_end {
            if self.stop.load(Ordering::Relaxed) {
                info!(step = self.step_count, "run interrupted");
                return Ok(());
            }
            self.step()?;
        }
        // Runs shorter than one check interval still get a final guard pass.
        if self.step_count % self.config.check_interval != 0 {
            self.check_divergence()?;
        }
        Ok(())
    }

    /// Run until all sources are exhausted and the probed component has
    /// decayed below `decay_by` times its running peak, checking every
    /// `check_time` units. Returns the stop time.
    pub fn run_until_decayed(
        &mut self,
        probe: Vector3<f64>,
        component: Component,
        check_time: f64,
        decay_by: f64,
    ) -> Result<f64> {
        let steps_per_check = ((check_time / self.dt).round() as usize).max(1);
        let mut peak = 0.0f64;
        loop {
            for _ in 0..steps_per_check {
                if self.stop.load(Ordering::Relaxed) {
                    return Ok(self.time());
                }
                self.step()?;
            }
            let mag = self.field_at_point(component, probe).norm();
            peak = peak.max(mag);
            let sources_done = self
                .sources
                .iter()
                .all(|st| st.source.time.is_exhausted(self.time()));
            debug!(t = self.time(), mag, peak, "decay check");
            if sources_done && (peak == 0.0 || mag <= decay_by * peak) {
                return Ok(self.time());
            }
        }
    }

    /// Read a field sample at a full-domain lattice index, folding through
    /// any declared symmetry.
    pub fn field_at(&self, comp: Component, index: [usize; 3]) -> Result<Complex64> {
        let (idx, sign) = match self.symmetry {
            Some(op) => op.fold_index(comp, index, self.full_dims),
            None => (index, 1.0),
        };
        let (idx, wrap) = self.wrap_alias(idx);
        Ok(self.grid.get(comp, idx)? * sign * wrap)
    }

    /// Interpolated field value at a continuous position.
    pub fn field_at_point(&self, comp: Component, p: Vector3<f64>) -> Complex64 {
        let (p, sign) = self.fold_point(comp, p);
        let arr = self.grid.primary(comp);
        let mut v = Complex64::new(0.0, 0.0);
        for (flat, w) in self.grid.interp(comp, p) {
            let (idx, wrap) = self.wrap_alias(self.grid.unflatten(flat));
            v += wrap * arr[self.grid.idx(idx[0], idx[1], idx[2])] * w;
        }
        v * sign
    }

    /// Overwrite one field sample, keeping the bound auxiliary field (D or
    /// B) consistent with the local material.
    pub fn set_field(&mut self, comp: Component, index: [usize; 3], value: Complex64) -> Result<()> {
        let (idx, sign) = match self.symmetry {
            Some(op) => op.fold_index(comp, index, self.full_dims),
            None => (index, 1.0),
        };
        let v = value * sign;
        self.grid.set(comp, idx, v)?;
        let ci = comp.axis();
        let flat = self.grid.idx(idx[0], idx[1], idx[2]);
        if comp.is_electric() {
            self.grid.d[ci][flat] = v * self.materials.epsilon(ci, flat);
        } else {
            self.grid.b[ci][flat] = v * self.materials.mu(ci, flat);
        }
        Ok(())
    }

    /// Re-resolve the material field against updated geometry, leaving
    /// fields, sources and accumulators in place. Intended for slowly
    /// varying media; the stability bound is re-checked since the minimum
    /// index may have dropped.
    pub fn rebuild_materials(&mut self, map: &dyn MaterialMap) -> Result<()> {
        if let Some(op) = self.symmetry {
            let dx = self.grid.dx;
            let full = Grid::new(self.full_dims, dx);
            for flat in 0..full.len() {
                let ijk = full.unflatten(flat);
                let p = Vector3::new(
                    ijk[0] as f64 * dx,
                    ijk[1] as f64 * dx,
                    ijk[2] as f64 * dx,
                );
                let q = op.image_position(p, self.full_dims, dx);
                if !media_close(&map.medium_at(p), &map.medium_at(q)) {
                    return Err(FdtdError::AsymmetricMaterial {
                        position: [p[0], p[1], p[2]],
                    });
                }
            }
        }
        let mut materials = MaterialField::build(map, &self.grid, &self.config.smoothing);
        let d = self.full_dims.iter().filter(|&&n| n > 1).count().max(1);
        let limit = materials.refractive_index_min() / (d as f64).sqrt();
        if self.config.courant >= limit {
            return Err(FdtdError::CourantUnstable {
                s: self.config.courant,
                limit,
            });
        }
        let profiles = self.boundaries.gamma_profiles(self.full_dims, self.grid.dx);
        materials.add_pml(&profiles, &self.grid);
        materials.finalize(self.dt, self.grid.dx);
        self.materials = materials;
        Ok(())
    }

    /// Total electromagnetic energy over the full domain,
    /// (1/2) sum (eps |E|^2 + mu |H|^2) dV. Under a declared symmetry the
    /// unstored half mirrors the stored one, so off-plane samples count
    /// twice; parity signs square away.
    pub fn field_energy(&self) -> f64 {
        let d = self.full_dims.iter().filter(|&&n| n > 1).count();
        let dv = self.grid.dx.powi(d as i32);
        let plane = self.symmetry.map(|op| {
            let a = op.reduced_axis();
            (a, (self.full_dims[a] - 1) / 2)
        });
        let mut total = 0.0;
        for ci in 0..3 {
            for flat in 0..self.grid.len() {
                let w = match plane {
                    Some((axis, c)) if self.grid.unflatten(flat)[axis] == c => 1.0,
                    Some(_) => 2.0,
                    None => 1.0,
                };
                let cell = self.materials.epsilon(ci, flat) * self.grid.e[ci][flat].norm_sqr()
                    + self.materials.mu(ci, flat) * self.grid.h[ci][flat].norm_sqr();
                total += w * cell;
            }
        }
        0.5 * total * dv
    }

    /// A 2D slice of one stored component for visualization.
    pub fn field_slice(&self, plane: FieldPlane, comp: Component) -> Vec<Complex64> {
        self.grid.field_slice(plane, comp)
    }
}
