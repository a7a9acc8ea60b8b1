//! Streaming FIR filter
//!
//! Filters every (source, ear, channel) lane with the same feedforward
//! coefficients using a transposed direct-form structure. The delay line
//! persists across `process()` calls, so filtering a signal hop by hop is
//! identical to filtering it in one pass.

use crate::bank::SignalBank;
use crate::error::{LoudnessError, Result};
use crate::impl_module_common;
use crate::module::{Module, ModuleBase};
use crate::modules::filter::Filter;

/// Finite impulse response filter with cross-hop state continuity.
pub struct Fir {
    base: ModuleBase,
    filter: Filter,
}

impl Fir {
    /// Construct from feedforward coefficients. The filter order is
    /// `b_coefs.len() - 1`.
    pub fn new(b_coefs: &[f64]) -> Self {
        let mut filter = Filter::new();
        filter.set_b_coefs(b_coefs);
        Self {
            base: ModuleBase::new("FIR"),
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

impl Module for Fir {
    impl_module_common!();

    fn initialize(&mut self, input: &SignalBank) -> Result<()> {
        self.base.begin_initialize();
        if self.filter.b_coefs().is_empty() {
            return Err(LoudnessError::InvalidParameter {
                module: self.base.name().to_string(),
                details: "no filter coefficients".to_string(),
            });
        }

        let order = self.filter.b_coefs().len() - 1;
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
                    let (b, _, z) = self.filter.coefs_and_delay_mut(source, ear, channel);
                    let out_signal = self.base.output_mut().signal_mut(source, ear, channel);
                    for (out, &sample) in out_signal.iter_mut().zip(in_signal) {
                        let x = gain * sample;
                        if order == 0 {
                            *out = b[0] * x;
                            continue;
                        }
                        *out = b[0] * x + z[0];
                        for j in 1..order {
                            z[j - 1] = b[j] * x + z[j];
                        }
                        z[order - 1] = b[order] * x;
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
