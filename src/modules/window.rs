//! Windowing: applies a taper to assembled analysis frames
//!
//! A single window tapers every channel of the input frame in place
//! shape. Multiple window lengths on a one-channel input run as parallel
//! windows (multi-resolution analysis): the output gets one channel per
//! window, and each shorter window is offset so its centre coincides
//! with the centre of the largest, keeping every resolution centred on
//! the same instant.

use serde::{Deserialize, Serialize};

use crate::bank::SignalBank;
use crate::error::{LoudnessError, Result};
use crate::impl_module_common;
use crate::module::{Module, ModuleBase};

/// Taper shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowShape {
    /// Raised cosine; periodic uses the DFT-even denominator N
    /// (Harris 1978, eq. 27b), symmetric uses N-1 and reaches zero at
    /// both ends
    Hann { periodic: bool },
}

/// Scaling applied to the generated window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalisation {
    #[default]
    None,
    /// Unit mean square: `w /= sqrt(sum(w^2) / N)`
    Energy,
    /// Unit sum: `w /= sum(w)`
    Amplitude,
}

/// Windowing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub shape: WindowShape,
    /// Window lengths, largest first. More than one length selects
    /// parallel multi-resolution windowing.
    pub lengths: Vec<usize>,
    pub normalisation: Normalisation,
    /// Write each window's result at its centred offset in the output
    /// frame (true) or packed at sample zero (false)
    pub align_output: bool,
}

impl WindowConfig {
    /// Single Hann window over the whole frame.
    pub fn hann(length: usize, periodic: bool) -> Self {
        Self {
            shape: WindowShape::Hann { periodic },
            lengths: vec![length],
            normalisation: Normalisation::None,
            align_output: true,
        }
    }

    /// Serialize the configuration to JSON for persistence.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize a configuration persisted with `to_json`.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Stateless taper stage.
pub struct Window {
    base: ModuleBase,
    config: WindowConfig,
    windows: Vec<Vec<f64>>,
    /// Per-window start offset centring each on the largest window
    offsets: Vec<usize>,
    parallel: bool,
}

impl Window {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            base: ModuleBase::new("Window"),
            config,
            windows: Vec::new(),
            offsets: Vec::new(),
            parallel: false,
        }
    }

    fn generate(shape: WindowShape, length: usize) -> Vec<f64> {
        if length == 1 {
            return vec![1.0];
        }
        match shape {
            WindowShape::Hann { periodic } => {
                let denom = if periodic { length } else { length - 1 } as f64;
                (0..length)
                    .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / denom).cos())
                    .collect()
            }
        }
    }

    fn normalise(window: &mut [f64], normalisation: Normalisation) {
        let factor = match normalisation {
            Normalisation::None => return,
            Normalisation::Energy => {
                let sum_squares: f64 = window.iter().map(|w| w * w).sum();
                1.0 / (sum_squares / window.len() as f64).sqrt()
            }
            Normalisation::Amplitude => {
                let sum: f64 = window.iter().sum();
                1.0 / sum
            }
        };
        for w in window.iter_mut() {
            *w *= factor;
        }
    }
}

impl Module for Window {
    impl_module_common!();

    fn initialize(&mut self, input: &SignalBank) -> Result<()> {
        self.base.begin_initialize();
        let lengths = &self.config.lengths;
        if lengths.is_empty() || lengths.contains(&0) {
            return Err(LoudnessError::InvalidParameter {
                module: self.base.name().to_string(),
                details: "at least one positive window length required".to_string(),
            });
        }
        if lengths.windows(2).any(|pair| pair[1] > pair[0]) {
            return Err(LoudnessError::InvalidParameter {
                module: self.base.name().to_string(),
                details: "window lengths must be in descending order".to_string(),
            });
        }
        let largest = lengths[0];
        if input.num_samples() != largest {
            return Err(LoudnessError::IncompatibleInput {
                module: self.base.name().to_string(),
                details: format!(
                    "input frame has {} samples but the largest window is {}",
                    input.num_samples(),
                    largest
                ),
            });
        }

        self.parallel = lengths.len() > 1;
        if self.parallel && input.num_channels() != 1 {
            return Err(LoudnessError::IncompatibleInput {
                module: self.base.name().to_string(),
                details: format!(
                    "parallel windows need a single input channel, got {}",
                    input.num_channels()
                ),
            });
        }

        // centre every window on the centre of the largest
        let alignment_sample = (largest - 1).div_ceil(2);
        self.offsets = lengths
            .iter()
            .map(|&len| alignment_sample - (len - 1).div_ceil(2))
            .collect();

        self.windows = lengths
            .iter()
            .map(|&len| {
                let mut window = Self::generate(self.config.shape, len);
                Self::normalise(&mut window, self.config.normalisation);
                window
            })
            .collect();

        let output = self.base.output_mut();
        if self.parallel {
            output.initialize(
                input.num_sources(),
                input.num_ears(),
                lengths.len(),
                largest,
                input.fs(),
            )?;
            output.set_frame_rate(input.frame_rate());
        } else {
            output.initialize_from(input)?;
        }

        self.base.finish_initialize();
        Ok(())
    }

    fn process(&mut self, input: &SignalBank) {
        if !self.base.begin_process(input) {
            return;
        }

        let output = self.base.output_mut();
        for source in 0..input.num_sources() {
            for ear in 0..input.num_ears() {
                if self.parallel {
                    for (w, window) in self.windows.iter().enumerate() {
                        let read_offset = self.offsets[w];
                        let write_offset = if self.config.align_output {
                            read_offset
                        } else {
                            0
                        };
                        let in_signal = input.signal(source, ear, 0);
                        let out_signal = output.signal_mut(source, ear, w);
                        for (i, &coef) in window.iter().enumerate() {
                            out_signal[write_offset + i] = coef * in_signal[read_offset + i];
                        }
                    }
                } else {
                    let window = &self.windows[0];
                    for channel in 0..input.num_channels() {
                        let in_signal = input.signal(source, ear, channel);
                        let out_signal = output.signal_mut(source, ear, channel);
                        for (out, (&coef, &sample)) in
                            out_signal.iter_mut().zip(window.iter().zip(in_signal))
                        {
                            *out = coef * sample;
                        }
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.base.reset_output();
    }
}
