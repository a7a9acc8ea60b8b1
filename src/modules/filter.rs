//! Shared support for the streaming filter modules
//!
//! Holds the feedforward/feedback coefficients and the per-lane delay
//! line used by `Fir`, `Iir` and `Biquad`. The delay line is itself a
//! `SignalBank` shaped (sources, ears, channels, order) so filter state
//! lines up with the lanes it filters.

use crate::bank::SignalBank;
use crate::error::Result;

/// Coefficients plus per-lane delay state for a direct-form filter.
#[derive(Debug, Default)]
pub(crate) struct Filter {
    b_coefs: Vec<f64>,
    a_coefs: Vec<f64>,
    gain: f64,
    order: usize,
    delay_line: SignalBank,
}

impl Filter {
    pub fn new() -> Self {
        Self {
            gain: 1.0,
            ..Self::default()
        }
    }

    pub fn set_b_coefs(&mut self, b_coefs: &[f64]) {
        self.b_coefs = b_coefs.to_vec();
    }

    pub fn set_a_coefs(&mut self, a_coefs: &[f64]) {
        self.a_coefs = a_coefs.to_vec();
    }

    pub fn b_coefs(&self) -> &[f64] {
        &self.b_coefs
    }

    pub fn a_coefs(&self) -> &[f64] {
        &self.a_coefs
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain;
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Divide all coefficients through by `a[0]` so the recursion can
    /// assume a unity leading feedback coefficient.
    pub fn normalise_coefs(&mut self) {
        if let Some(&a0) = self.a_coefs.first() {
            if a0 != 1.0 {
                for b in &mut self.b_coefs {
                    *b /= a0;
                }
                for a in &mut self.a_coefs {
                    *a /= a0;
                }
            }
        }
    }

    /// Allocate one delay lane per (source, ear, channel) of the input,
    /// `order` samples deep, zero-filled.
    pub fn initialize_delay_line(&mut self, input: &SignalBank, order: usize) -> Result<()> {
        self.order = order;
        self.delay_line.initialize(
            input.num_sources(),
            input.num_ears(),
            input.num_channels(),
            order.max(1),
            input.fs(),
        )
    }

    /// The delay state for one lane.
    pub fn delay_line_mut(&mut self, source: usize, ear: usize, channel: usize) -> &mut [f64] {
        self.delay_line.signal_mut(source, ear, channel)
    }

    /// Coefficients together with one lane's delay state, for the inner
    /// filtering loop.
    pub fn coefs_and_delay_mut(
        &mut self,
        source: usize,
        ear: usize,
        channel: usize,
    ) -> (&[f64], &[f64], &mut [f64]) {
        (
            &self.b_coefs,
            &self.a_coefs,
            self.delay_line.signal_mut(source, ear, channel),
        )
    }

    /// Zero all filter state, leaving coefficients untouched.
    pub fn reset_delay_line(&mut self) {
        self.delay_line.zero_signals();
    }
}

/// Flush a value that has decayed into the denormal range to exactly
/// zero, keeping the recursion out of slow denormal arithmetic.
#[inline]
pub(crate) fn kill_denormal(x: &mut f64) {
    if x.abs() < f64::MIN_POSITIVE {
        *x = 0.0;
    }
}
