//! Current sources driving the fields.
//!
//! A source is a point current with a prescribed time profile, injected into
//! one field component. Off-grid positions spread the current over the
//! neighboring staggered samples with interpolation weights, so moving a
//! source continuously moves its effect continuously.

use nalgebra::Vector3;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::grid::Component;

/// Time dependence of a current source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SourceTime {
    /// Gaussian-enveloped carrier centered on `fcen` with spectral width
    /// `fwidth`. The envelope peaks at `cutoff` widths after t = 0 and the
    /// source switches off the same interval after the peak.
    GaussianPulse {
        fcen: f64,
        fwidth: f64,
        cutoff: f64,
    },
    /// Steady sinusoid at `frequency`, optionally stopping at `end_time`
    /// (0 runs forever). Switched on smoothly over a few periods to limit
    /// spurious broadband transients.
    ContinuousWave { frequency: f64, end_time: f64 },
}

impl SourceTime {
    pub fn gaussian(fcen: f64, fwidth: f64) -> Self {
        SourceTime::GaussianPulse {
            fcen,
            fwidth,
            cutoff: 5.0,
        }
    }

    pub fn continuous(frequency: f64) -> Self {
        SourceTime::ContinuousWave {
            frequency,
            end_time: 0.0,
        }
    }

    fn tau(fwidth: f64) -> f64 {
        1.0 / (std::f64::consts::PI * fwidth)
    }

    /// Current amplitude at time `t`.
    pub fn eval(&self, t: f64) -> f64 {
        match *self {
            SourceTime::GaussianPulse {
                fcen,
                fwidth,
                cutoff,
            } => {
                let tau = Self::tau(fwidth);
                let t0 = cutoff * tau;
                if t < 0.0 || t > 2.0 * t0 {
                    return 0.0;
                }
                let arg = (t - t0) / tau;
                (-0.5 * arg * arg).exp() * (2.0 * std::f64::consts::PI * fcen * (t - t0)).sin()
            }
            SourceTime::ContinuousWave {
                frequency,
                end_time,
            } => {
                if t < 0.0 || (end_time > 0.0 && t > end_time) {
                    return 0.0;
                }
                let ramp_len = 3.0 / frequency;
                let ramp = (t / ramp_len).min(1.0);
                // Smoothstep turn-on.
                let ramp = ramp * ramp * (3.0 - 2.0 * ramp);
                ramp * (2.0 * std::f64::consts::PI * frequency * t).sin()
            }
        }
    }

    /// Whether the profile is identically zero from `t` onwards.
    pub fn is_exhausted(&self, t: f64) -> bool {
        match *self {
            SourceTime::GaussianPulse { fwidth, cutoff, .. } => {
                t > 2.0 * cutoff * Self::tau(fwidth)
            }
            SourceTime::ContinuousWave { end_time, .. } => end_time > 0.0 && t > end_time,
        }
    }

    /// Frequency band carrying appreciable source energy, for sanity
    /// warnings on analysis frequencies.
    pub fn band(&self) -> (f64, f64) {
        match *self {
            SourceTime::GaussianPulse { fcen, fwidth, .. } => {
                ((fcen - fwidth).max(0.0), fcen + fwidth)
            }
            SourceTime::ContinuousWave { frequency, .. } => (frequency, frequency),
        }
    }
}

/// A point current source.
#[derive(Debug, Clone)]
pub struct Source {
    pub position: Vector3<f64>,
    pub component: Component,
    pub amplitude: Complex64,
    pub time: SourceTime,
}

impl Source {
    pub fn new(position: Vector3<f64>, component: Component, time: SourceTime) -> Self {
        Self {
            position,
            component,
            amplitude: Complex64::new(1.0, 0.0),
            time,
        }
    }

    pub fn with_amplitude(mut self, amplitude: Complex64) -> Self {
        self.amplitude = amplitude;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_pulse_peaks_at_cutoff_and_dies_out() {
        let t = SourceTime::gaussian(1.0, 0.2);
        let tau = 1.0 / (std::f64::consts::PI * 0.2);
        let t0 = 5.0 * tau;
        // Envelope maximal near the peak time, tiny at the edges.
        let near_peak: f64 = (0..20)
            .map(|i| t.eval(t0 - 0.5 + i as f64 * 0.05).abs())
            .fold(0.0, f64::max);
        assert!(near_peak > 0.5);
        assert!(t.eval(0.0).abs() < 1e-5);
        assert!(t.eval(2.0 * t0 + 0.1) == 0.0);
        assert!(t.is_exhausted(2.0 * t0 + 0.1));
        assert!(!t.is_exhausted(t0));
    }

    #[test]
    fn continuous_wave_ramps_then_holds_amplitude() {
        let t = SourceTime::continuous(0.5);
        // During the ramp the amplitude is suppressed.
        assert!(t.eval(0.3).abs() < 1.0);
        // Past the ramp, peaks reach full amplitude.
        let peak: f64 = (0..200)
            .map(|i| t.eval(10.0 + i as f64 * 0.01).abs())
            .fold(0.0, f64::max);
        assert!((peak - 1.0).abs() < 1e-2);
        assert!(!t.is_exhausted(1e6));
    }

    #[test]
    fn cw_with_end_time_switches_off() {
        let t = SourceTime::ContinuousWave {
            frequency: 1.0,
            end_time: 10.0,
        };
        assert!(t.eval(10.5) == 0.0);
        assert!(t.is_exhausted(10.5));
    }
}
