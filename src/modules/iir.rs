//! Streaming IIR filter
//!
//! Transposed direct form II recursion over every lane, with the delay
//! line carried across `process()` calls. Feedforward and feedback
//! coefficient vectors are padded to a common order at initialisation and
//! normalised so `a[0] == 1`.

use crate::bank::SignalBank;
use crate::error::{LoudnessError, Result};
use crate::impl_module_common;
use crate::module::{Module, ModuleBase};
use crate::modules::filter::{kill_denormal, Filter};

/// Infinite impulse response filter with cross-hop state continuity.
pub struct Iir {
    base: ModuleBase,
    filter: Filter,
}

impl Iir {
    /// Construct from feedforward (`b`) and feedback (`a`) coefficients.
    pub fn new(b_coefs: &[f64], a_coefs: &[f64]) -> Self {
        let mut filter = Filter::new();
        filter.set_b_coefs(b_coefs);
        filter.set_a_coefs(a_coefs);
        Self {
            base: ModuleBase::new("IIR"),
            filter,
        }
    }

    /// Linear input gain applied before filtering (default 1.0).
    pub fn set_gain(&mut self, gain: f64) {
        self.filter.set_gain(gain);
    }

    pub fn order(&self) -> usize {
        self.filter.order()
    }
}

impl Module for Iir {
    impl_module_common!();

    fn initialize(&mut self, input: &SignalBank) -> Result<()> {
        self.base.begin_initialize();
        let n_b = self.filter.b_coefs().len();
        let n_a = self.filter.a_coefs().len();
        if n_b == 0 || n_a == 0 {
            return Err(LoudnessError::InvalidParameter {
                module: self.base.name().to_string(),
                details: "no filter coefficients".to_string(),
            });
        }

        // pad the shorter vector so both share one order
        let order = n_b.max(n_a) - 1;
        if order == 0 {
            return Err(LoudnessError::InvalidParameter {
                module: self.base.name().to_string(),
                details: "filter order must be at least 1".to_string(),
            });
        }
        let mut b = self.filter.b_coefs().to_vec();
        let mut a = self.filter.a_coefs().to_vec();
        b.resize(order + 1, 0.0);
        a.resize(order + 1, 0.0);
        self.filter.set_b_coefs(&b);
        self.filter.set_a_coefs(&a);
        self.filter.normalise_coefs();

        self.filter.initialize_delay_line(input, order)?;
        self.base.output_mut().initialize_from(input)?;
        self.base.finish_initialize();
        Ok(())
    }

    fn process(&mut self, input: &SignalBank) {
        if !self.base.begin_process(input) {
            return;
        }

        let order = self.filter.order();
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
                        *out = y;

                        for j in 1..order {
                            z[j - 1] = b[j] * x + z[j];
                        }
                        z[order - 1] = b[order] * x;

                        for j in 1..order {
                            z[j - 1] -= a[j] * y;
                        }
                        z[order - 1] -= a[order] * y;
                    }
                    for state in z.iter_mut() {
                        kill_denormal(state);
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.filter.reset_delay_line();
        self.base.reset_output();
    }
}
