//! SignalBank: the multi-dimensional sample container
//!
//! A SignalBank stores a bank of signals laid out over four fixed axes:
//! source, ear, channel and sample. The sample data is held in one
//! contiguous row-major buffer with samples fastest-varying, so the signal
//! for a single (source, ear, channel) lane is one contiguous slice.
//!
//! Banks carry metadata alongside the samples: the sampling frequency, a
//! frame rate (equal to `fs` by default, lowered by rate-converting
//! modules to `fs / hop`), and per-channel centre frequencies used by
//! spectral modules. The trigger flag signals downstream modules that new
//! output is available on the current hop; it is false after
//! `initialize()` and only set by the producing module (or the top-level
//! caller for a pipeline's input bank).
//!
//! Shape is immutable after `initialize()`. Writes that disagree with the
//! declared shape panic rather than truncating or reshaping.

use crate::error::{LoudnessError, Result};

/// Number of frames worth of capacity reserved for the aggregation buffer
/// before the first append, to avoid per-frame reallocation.
const AGGREGATION_RESERVE_FRAMES: usize = 1000;

/// Multi-dimensional signal buffer shared between processing modules.
///
/// Exactly one module (or the top-level caller) writes a given bank; any
/// number of downstream modules read it through a shared borrow.
#[derive(Debug, Clone, Default)]
pub struct SignalBank {
    n_sources: usize,
    n_ears: usize,
    n_channels: usize,
    n_samples: usize,
    n_total_samples: usize,
    fs: f64,
    frame_rate: f64,
    trig: bool,
    initialized: bool,
    signals: Vec<f64>,
    centre_freqs: Vec<f64>,
    /// Time-major accumulation of triggered frames (dynamic models)
    aggregated: Vec<f64>,
}

impl SignalBank {
    /// Create an uninitialised bank. Modules allocate their output this
    /// way and give it a shape during their own `initialize()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bank with the given shape, zero-filled.
    pub fn with_shape(
        n_sources: usize,
        n_ears: usize,
        n_channels: usize,
        n_samples: usize,
        fs: f64,
    ) -> Result<Self> {
        let mut bank = Self::new();
        bank.initialize(n_sources, n_ears, n_channels, n_samples, fs)?;
        Ok(bank)
    }

    /// Allocate a zero-filled buffer of the given shape.
    ///
    /// Every dimension must be positive and `fs` must be a positive,
    /// finite frequency in Hz. The frame rate defaults to `fs` and the
    /// trigger to false.
    pub fn initialize(
        &mut self,
        n_sources: usize,
        n_ears: usize,
        n_channels: usize,
        n_samples: usize,
        fs: f64,
    ) -> Result<()> {
        self.initialized = false;
        if n_sources == 0 || n_ears == 0 || n_channels == 0 || n_samples == 0 {
            return Err(LoudnessError::InvalidShape {
                details: format!(
                    "dimensions must be positive, got {} x {} x {} x {}",
                    n_sources, n_ears, n_channels, n_samples
                ),
            });
        }
        if !(fs.is_finite() && fs > 0.0) {
            return Err(LoudnessError::InvalidShape {
                details: format!("sampling frequency must be positive, got {}", fs),
            });
        }

        self.n_sources = n_sources;
        self.n_ears = n_ears;
        self.n_channels = n_channels;
        self.n_samples = n_samples;
        self.n_total_samples = n_sources * n_ears * n_channels * n_samples;
        self.fs = fs;
        self.frame_rate = fs;
        self.trig = false;
        self.signals = vec![0.0; self.n_total_samples];
        self.centre_freqs = vec![0.0; n_channels];
        self.aggregated = Vec::new();
        self.initialized = true;
        Ok(())
    }

    /// Initialise with the same shape and metadata as `input`. The sample
    /// data is zeroed, not copied.
    pub fn initialize_from(&mut self, input: &SignalBank) -> Result<()> {
        if !input.initialized {
            return Err(LoudnessError::NotInitialized {
                what: "input SignalBank".to_string(),
            });
        }
        self.initialize(
            input.n_sources,
            input.n_ears,
            input.n_channels,
            input.n_samples,
            input.fs,
        )?;
        self.frame_rate = input.frame_rate;
        self.centre_freqs = input.centre_freqs.clone();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shape and metadata
    // ------------------------------------------------------------------

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn num_sources(&self) -> usize {
        self.n_sources
    }

    pub fn num_ears(&self) -> usize {
        self.n_ears
    }

    pub fn num_channels(&self) -> usize {
        self.n_channels
    }

    /// Number of samples per (source, ear, channel) lane
    pub fn num_samples(&self) -> usize {
        self.n_samples
    }

    /// Total number of samples held, equal to
    /// `n_sources * n_ears * n_channels * n_samples`
    pub fn total_samples(&self) -> usize {
        self.n_total_samples
    }

    /// Sampling frequency in Hz
    pub fn fs(&self) -> f64 {
        self.fs
    }

    /// Frame rate in Hz. Defaults to `fs`; modules that emit one frame per
    /// hop publish `fs / hop_size` here.
    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn set_frame_rate(&mut self, frame_rate: f64) {
        self.frame_rate = frame_rate;
    }

    /// True when the two banks have identical (source, ear, channel,
    /// sample) dimensions.
    pub fn has_same_shape(&self, other: &SignalBank) -> bool {
        self.n_sources == other.n_sources
            && self.n_ears == other.n_ears
            && self.n_channels == other.n_channels
            && self.n_samples == other.n_samples
    }

    // ------------------------------------------------------------------
    // Trigger
    // ------------------------------------------------------------------

    /// The multi-rate readiness flag: true on hops where the producing
    /// module wrote a new frame.
    pub fn trig(&self) -> bool {
        self.trig
    }

    pub fn set_trig(&mut self, trig: bool) {
        self.trig = trig;
    }

    // ------------------------------------------------------------------
    // Centre frequencies
    // ------------------------------------------------------------------

    /// Set the centre frequency in Hz of a single channel.
    pub fn set_centre_freq(&mut self, channel: usize, freq: f64) {
        assert!(
            channel < self.n_channels,
            "SignalBank: channel {} out of range (nChannels = {})",
            channel,
            self.n_channels
        );
        self.centre_freqs[channel] = freq;
    }

    /// Set the centre frequencies of all channels at once. The vector
    /// length must equal the channel count.
    pub fn set_centre_freqs(&mut self, freqs: &[f64]) {
        assert!(
            freqs.len() == self.n_channels,
            "SignalBank: centre frequency vector length {} != nChannels {}",
            freqs.len(),
            self.n_channels
        );
        self.centre_freqs.copy_from_slice(freqs);
    }

    pub fn centre_freq(&self, channel: usize) -> f64 {
        assert!(
            channel < self.n_channels,
            "SignalBank: channel {} out of range (nChannels = {})",
            channel,
            self.n_channels
        );
        self.centre_freqs[channel]
    }

    pub fn centre_freqs(&self) -> &[f64] {
        &self.centre_freqs
    }

    // ------------------------------------------------------------------
    // Sample access
    // ------------------------------------------------------------------

    #[inline]
    fn lane_offset(&self, source: usize, ear: usize, channel: usize) -> usize {
        assert!(
            source < self.n_sources && ear < self.n_ears && channel < self.n_channels,
            "SignalBank: lane ({}, {}, {}) out of range ({} x {} x {})",
            source,
            ear,
            channel,
            self.n_sources,
            self.n_ears,
            self.n_channels
        );
        ((source * self.n_ears + ear) * self.n_channels + channel) * self.n_samples
    }

    /// Get a single sample.
    #[inline]
    pub fn sample(&self, source: usize, ear: usize, channel: usize, index: usize) -> f64 {
        assert!(
            index < self.n_samples,
            "SignalBank: sample {} out of range (nSamples = {})",
            index,
            self.n_samples
        );
        self.signals[self.lane_offset(source, ear, channel) + index]
    }

    /// Set a single sample.
    #[inline]
    pub fn set_sample(
        &mut self,
        source: usize,
        ear: usize,
        channel: usize,
        index: usize,
        value: f64,
    ) {
        assert!(
            index < self.n_samples,
            "SignalBank: sample {} out of range (nSamples = {})",
            index,
            self.n_samples
        );
        let offset = self.lane_offset(source, ear, channel);
        self.signals[offset + index] = value;
    }

    /// The contiguous signal for one (source, ear, channel) lane.
    #[inline]
    pub fn signal(&self, source: usize, ear: usize, channel: usize) -> &[f64] {
        let offset = self.lane_offset(source, ear, channel);
        &self.signals[offset..offset + self.n_samples]
    }

    /// Mutable access to one lane. Reserved for the bank's owning module.
    #[inline]
    pub fn signal_mut(&mut self, source: usize, ear: usize, channel: usize) -> &mut [f64] {
        let offset = self.lane_offset(source, ear, channel);
        &mut self.signals[offset..offset + self.n_samples]
    }

    /// Overwrite one lane. The slice length must equal `num_samples`.
    pub fn set_signal(&mut self, source: usize, ear: usize, channel: usize, signal: &[f64]) {
        assert!(
            signal.len() == self.n_samples,
            "SignalBank: signal length {} != nSamples {}",
            signal.len(),
            self.n_samples
        );
        self.signal_mut(source, ear, channel).copy_from_slice(signal);
    }

    /// The whole bank as one flat row-major slice.
    pub fn signals(&self) -> &[f64] {
        &self.signals
    }

    /// Overwrite the whole bank. The slice length must equal
    /// `total_samples`.
    pub fn set_signals(&mut self, signals: &[f64]) {
        assert!(
            signals.len() == self.n_total_samples,
            "SignalBank: bulk write length {} != total samples {}",
            signals.len(),
            self.n_total_samples
        );
        self.signals.copy_from_slice(signals);
    }

    /// Zero the sample data, leaving shape, metadata and aggregation
    /// untouched.
    pub fn zero_signals(&mut self) {
        self.signals.fill(0.0);
    }

    /// Zero the sample data, drop aggregated frames and clear the trigger.
    pub fn clear(&mut self) {
        self.zero_signals();
        self.aggregated.clear();
        self.trig = false;
    }

    // ------------------------------------------------------------------
    // Aggregation
    // ------------------------------------------------------------------

    /// Append the current contents as one frame of the aggregation
    /// buffer. Called by the model on hops where this bank's trigger
    /// fired. Capacity is reserved once; the buffer only ever grows.
    pub fn aggregate(&mut self) {
        if self.aggregated.is_empty() {
            self.aggregated
                .reserve(self.n_total_samples * AGGREGATION_RESERVE_FRAMES);
        }
        self.aggregated.extend_from_slice(&self.signals);
    }

    /// The accumulated time series: `num_aggregated_frames` frames of
    /// `total_samples` values each, time-major.
    pub fn aggregated_signals(&self) -> &[f64] {
        &self.aggregated
    }

    /// Number of frames appended since the last clear.
    pub fn num_aggregated_frames(&self) -> usize {
        if self.n_total_samples == 0 {
            0
        } else {
            self.aggregated.len() / self.n_total_samples
        }
    }

    pub fn clear_aggregated(&mut self) {
        self.aggregated.clear();
    }
}
