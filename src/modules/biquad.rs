//! Streaming biquad (second-order section) filter
//!
//! Carries the named second-order designs used by the loudness weighting
//! stages (the ITU-R BS.1770 RLB high-pass and pre-filter, both specified
//! at 48 kHz) alongside explicit coefficients. When the operating sample
//! rate differs from the rate the coefficients were designed for, an
//! equivalent section is re-derived at initialise time following
//! Neunaber, "Parameter Quantization in Direct-Form Recursive Audio
//! Filters" (2008). Coefficients never change mid-stream.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::bank::SignalBank;
use crate::error::{LoudnessError, Result};
use crate::impl_module_common;
use crate::module::{Module, ModuleBase};
use crate::modules::filter::{kill_denormal, Filter};

/// Which second-order section to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiquadDesign {
    /// Revised low-frequency B-weighting high-pass (ITU-R BS.1770),
    /// designed at 48 kHz
    Rlb,
    /// Head-effect pre-filter (ITU-R BS.1770), designed at 48 kHz
    Prefilter,
    /// Explicit coefficients; `design_fs` of 0.0 means "use as given at
    /// any sample rate"
    Coefficients {
        b: [f64; 3],
        a: [f64; 3],
        design_fs: f64,
    },
}

impl BiquadDesign {
    /// Serialize the design to JSON for persistence.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize a design persisted with `to_json`.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Second-order recursive filter with cross-hop state continuity.
pub struct Biquad {
    base: ModuleBase,
    filter: Filter,
    design: BiquadDesign,
}

impl Biquad {
    pub fn new(design: BiquadDesign) -> Self {
        Self {
            base: ModuleBase::new("Biquad"),
            filter: Filter::new(),
            design,
        }
    }

    /// Construct from explicit coefficients valid at any sample rate.
    pub fn with_coefs(b: [f64; 3], a: [f64; 3]) -> Self {
        Self::new(BiquadDesign::Coefficients {
            b,
            a,
            design_fs: 0.0,
        })
    }

    /// Linear input gain applied before filtering (default 1.0).
    pub fn set_gain(&mut self, gain: f64) {
        self.filter.set_gain(gain);
    }

    fn design_coefs(&self) -> ([f64; 3], [f64; 3], f64) {
        match &self.design {
            BiquadDesign::Rlb => (
                [1.0, -2.0, 1.0],
                [1.0, -1.99004745483398, 0.99007225036621],
                48000.0,
            ),
            BiquadDesign::Prefilter => (
                [1.53512485958697, -2.69169618940638, 1.19839281085285],
                [1.0, -1.69065929318241, 0.73248077421585],
                48000.0,
            ),
            BiquadDesign::Coefficients { b, a, design_fs } => (*b, *a, *design_fs),
        }
    }
}

/// Re-derive a second-order section designed at `design_fs` for operation
/// at `fs`, preserving its corner frequency, Q and band gains.
fn redesign_for_fs(b: &mut [f64], a: &mut [f64], design_fs: f64, fs: f64) {
    let fc = (design_fs / PI) * ((1.0 + a[1] + a[2]) / (1.0 - a[1] + a[2])).sqrt().atan();
    let q = ((a[2] + 1.0) * (a[2] + 1.0) - a[1] * a[1]).sqrt() / (2.0 * (1.0 - a[2]).abs());
    let v_l = (b[0] + b[1] + b[2]) / (1.0 + a[1] + a[2]);
    let v_b = (b[0] - b[2]) / (1.0 - a[2]);
    let v_h = (b[0] - b[1] + b[2]) / (1.0 - a[1] + a[2]);

    let omega = (PI * fc / fs).tan();
    let omega_sqrd = omega * omega;
    let denom = omega_sqrd + omega / q + 1.0;

    a[0] = 1.0;
    a[1] = 2.0 * (omega_sqrd - 1.0) / denom;
    a[2] = (omega_sqrd - (omega / q) + 1.0) / denom;

    b[0] = (v_l * omega_sqrd + v_b * (omega / q) + v_h) / denom;
    b[1] = 2.0 * (v_l * omega_sqrd - v_h) / denom;
    b[2] = (v_l * omega_sqrd - (v_b * omega / q) + v_h) / denom;
}

impl Module for Biquad {
    impl_module_common!();

    fn initialize(&mut self, input: &SignalBank) -> Result<()> {
        self.base.begin_initialize();
        let (mut b, mut a, design_fs) = self.design_coefs();
        if a[0] == 0.0 {
            return Err(LoudnessError::InvalidParameter {
                module: self.base.name().to_string(),
                details: "leading feedback coefficient a[0] must be non-zero".to_string(),
            });
        }

        // normalise by a[0] before any re-design
        if a[0] != 1.0 {
            let a0 = a[0];
            for c in b.iter_mut() {
                *c /= a0;
            }
            for c in a.iter_mut() {
                *c /= a0;
            }
        }

        if design_fs != 0.0 && design_fs != input.fs() {
            redesign_for_fs(&mut b, &mut a, design_fs, input.fs());
        }

        self.filter.set_b_coefs(&b);
        self.filter.set_a_coefs(&a);
        self.filter.initialize_delay_line(input, 2)?;
        self.base.output_mut().initialize_from(input)?;
        self.base.finish_initialize();
        Ok(())
    }

    fn process(&mut self, input: &SignalBank) {
        if !self.base.begin_process(input) {
            return;
        }

        let gain = self.filter.gain();
        for source in 0..input.num_sources() {
            for ear in 0..input.num_ears() {
                for channel in 0..input.num_channels() {
                    let in_signal = input.signal(source, ear, channel);
                    let (b, a, z) = self.filter.coefs_and_delay_mut(source, ear, channel);
                    let out_signal = self.base.output_mut().signal_mut(source, ear, channel);
                    for (out, &sample) in out_signal.iter_mut().zip(in_signal) {
                        let x = gain * sample;
                        let y = b[0] * x + z[0];
                        z[0] = b[1] * x - a[1] * y + z[1];
                        z[1] = b[2] * x - a[2] * y;
                        *out = y;
                    }
                    kill_denormal(&mut z[0]);
                    kill_denormal(&mut z[1]);
                }
            }
        }
    }

    fn reset(&mut self) {
        self.filter.reset_delay_line();
        self.base.reset_output();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::Iir;
    use approx::assert_abs_diff_eq;

    fn triggered(fs: f64, data: &[f64]) -> SignalBank {
        let mut bank = SignalBank::with_shape(1, 1, 1, data.len(), fs).unwrap();
        bank.set_signal(0, 0, 0, data);
        bank.set_trig(true);
        bank
    }

    #[test]
    fn test_matches_general_iir() {
        let b = [0.2, 0.1, 0.05];
        let a = [1.0, -0.5, 0.25];
        let x: Vec<f64> = (0..256).map(|i| (i as f64 * 0.11).sin()).collect();
        let input = triggered(48000.0, &x);

        let mut biquad = Biquad::with_coefs(b, a);
        biquad.initialize(&input).unwrap();
        biquad.process(&input);

        let mut iir = Iir::new(&b, &a);
        iir.initialize(&input).unwrap();
        iir.process(&input);

        for (got, want) in biquad
            .output()
            .signal(0, 0, 0)
            .iter()
            .zip(iir.output().signal(0, 0, 0))
        {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rlb_at_design_rate_uses_published_coefficients() {
        // DC must be rejected by the RLB high-pass
        let x = vec![1.0; 4096];
        let input = triggered(48000.0, &x);
        let mut biquad = Biquad::new(BiquadDesign::Rlb);
        biquad.initialize(&input).unwrap();
        biquad.process(&input);

        let out = biquad.output().signal(0, 0, 0);
        assert!(out[4095].abs() < 1e-2, "DC leak: {}", out[4095]);
    }

    #[test]
    fn test_redesign_preserves_response_at_other_rate() {
        // the re-designed RLB at 32 kHz must still reject DC and pass
        // high frequencies with roughly unity gain
        let fs = 32000.0;
        let n = 8192;
        let dc = vec![1.0; n];
        let input = triggered(fs, &dc);
        let mut biquad = Biquad::new(BiquadDesign::Rlb);
        biquad.initialize(&input).unwrap();
        biquad.process(&input);
        let out = biquad.output().signal(0, 0, 0);
        assert!(out[n - 1].abs() < 1e-2);

        let tone: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 8000.0 * i as f64 / fs).sin())
            .collect();
        let input = triggered(fs, &tone);
        let mut biquad = Biquad::new(BiquadDesign::Rlb);
        biquad.initialize(&input).unwrap();
        biquad.process(&input);
        let out = biquad.output().signal(0, 0, 0);
        let rms: f64 = (out[n / 2..].iter().map(|y| y * y).sum::<f64>()
            / (n / 2) as f64)
            .sqrt();
        assert_abs_diff_eq!(rms, 1.0 / 2.0_f64.sqrt(), epsilon = 0.05);
    }

    #[test]
    fn test_zero_a0_is_config_error() {
        let mut biquad = Biquad::new(BiquadDesign::Coefficients {
            b: [1.0, 0.0, 0.0],
            a: [0.0, 1.0, 0.0],
            design_fs: 0.0,
        });
        let input = triggered(48000.0, &[0.0; 8]);
        assert!(biquad.initialize(&input).is_err());
    }

    #[test]
    fn test_design_json_round_trip() {
        for design in [
            BiquadDesign::Rlb,
            BiquadDesign::Prefilter,
            BiquadDesign::Coefficients {
                b: [0.2, 0.1, 0.05],
                a: [1.0, -0.5, 0.25],
                design_fs: 44100.0,
            },
        ] {
            let json = design.to_json().unwrap();
            assert_eq!(BiquadDesign::from_json(&json).unwrap(), design);
        }
    }

    #[test]
    fn test_state_persists_across_hops() {
        let b = [0.3, 0.2, 0.1];
        let a = [1.0, -0.8, 0.3];
        let x: Vec<f64> = (0..64).map(|i| (i as f64 * 0.9).cos()).collect();

        let mut single = Biquad::with_coefs(b, a);
        let whole = triggered(48000.0, &x);
        single.initialize(&whole).unwrap();
        single.process(&whole);
        let reference = single.output().signal(0, 0, 0).to_vec();

        let mut hopped = Biquad::with_coefs(b, a);
        let mut input = triggered(48000.0, &x[..8]);
        hopped.initialize(&input).unwrap();
        let mut streamed = Vec::new();
        for hop in 0..8 {
            input.set_signal(0, 0, 0, &x[hop * 8..(hop + 1) * 8]);
            hopped.process(&input);
            streamed.extend_from_slice(hopped.output().signal(0, 0, 0));
        }
        for (got, want) in streamed.iter().zip(&reference) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-12);
        }
    }
}
