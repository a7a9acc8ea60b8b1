//! Multi-rate framing: assembles analysis frames from hop-sized input
//!
//! The frame generator accumulates incoming hops into a rolling per-lane
//! history and emits a `frame_size`-sample frame once enough history
//! exists, thereafter once per `hop_size` consumed samples. The output
//! trigger is cleared at the top of every `process()` call and set only
//! on hops where a frame came out; downstream modules are gated on it.
//!
//! Two alignment policies: frames may start at time zero (causal), or be
//! centred on the hop boundary, in which case the stream is implicitly
//! preceded by `ceil((frame_size - 1) / 2)` zero samples so the first
//! window's midpoint lines up with the first received block.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::bank::SignalBank;
use crate::error::{LoudnessError, Result};
use crate::impl_module_common;
use crate::module::{Module, ModuleBase};

/// Framing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeneratorConfig {
    /// Number of samples per emitted frame
    pub frame_size: usize,
    /// Number of new samples between successive frames
    pub hop_size: usize,
    /// Centre the analysis window on the hop boundary instead of
    /// starting frames at time zero
    pub start_at_window_centre: bool,
}

impl Default for FrameGeneratorConfig {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 512,
            start_at_window_centre: false,
        }
    }
}

impl FrameGeneratorConfig {
    /// Serialize the configuration to JSON for persistence.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize a configuration persisted with `to_json`.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Rate-converting module that turns a sample stream into overlapping
/// analysis frames.
pub struct FrameGenerator {
    base: ModuleBase,
    config: FrameGeneratorConfig,
    /// Hop after correction to a whole number of input blocks
    hop_size: usize,
    input_block_size: usize,
    /// Rolling history per lane; long enough to still contain a frame
    /// that ended mid-block
    history: SignalBank,
    history_len: usize,
    /// Samples still needed before the next frame is complete; deficit
    /// goes non-positive on emitting hops
    samples_until_frame: i64,
}

impl FrameGenerator {
    pub fn new(config: FrameGeneratorConfig) -> Self {
        Self {
            base: ModuleBase::new("FrameGenerator"),
            config,
            hop_size: 0,
            input_block_size: 0,
            history: SignalBank::new(),
            history_len: 0,
            samples_until_frame: 0,
        }
    }

    /// Frame size in samples.
    pub fn frame_size(&self) -> usize {
        self.config.frame_size
    }

    /// Effective hop size in samples; after `initialize()` this is the
    /// configured hop rounded up to a whole number of input blocks.
    pub fn hop_size(&self) -> usize {
        if self.hop_size > 0 {
            self.hop_size
        } else {
            self.config.hop_size
        }
    }

    pub fn start_at_window_centre(&self) -> bool {
        self.config.start_at_window_centre
    }

    /// Implicit zero padding before the first sample of the stream.
    fn start_padding(&self) -> usize {
        if self.config.start_at_window_centre {
            (self.config.frame_size - 1).div_ceil(2)
        } else {
            0
        }
    }

    fn initial_deficit(&self) -> i64 {
        (self.config.frame_size - self.start_padding()) as i64
    }
}

impl Module for FrameGenerator {
    impl_module_common!();

    fn initialize(&mut self, input: &SignalBank) -> Result<()> {
        self.base.begin_initialize();
        let frame_size = self.config.frame_size;
        if frame_size == 0 || self.config.hop_size == 0 {
            return Err(LoudnessError::InvalidParameter {
                module: self.base.name().to_string(),
                details: "frame size and hop size must be positive".to_string(),
            });
        }
        if self.config.hop_size > frame_size {
            return Err(LoudnessError::InvalidParameter {
                module: self.base.name().to_string(),
                details: format!(
                    "hop size {} cannot be greater than frame size {}",
                    self.config.hop_size, frame_size
                ),
            });
        }

        if !input.is_initialized() {
            return Err(LoudnessError::IncompatibleInput {
                module: self.base.name().to_string(),
                details: "input SignalBank is not initialized".to_string(),
            });
        }

        self.input_block_size = input.num_samples();
        self.hop_size = self.config.hop_size;
        if self.input_block_size > self.hop_size || self.hop_size % self.input_block_size != 0 {
            self.hop_size =
                self.input_block_size * self.config.hop_size.div_ceil(self.input_block_size);
            warn!(
                "{}: hop size {} is not a whole number of {}-sample input blocks; \
                 correcting to {}",
                self.base.name(),
                self.config.hop_size,
                self.input_block_size,
                self.hop_size
            );
        }
        if self.hop_size > frame_size {
            return Err(LoudnessError::IncompatibleInput {
                module: self.base.name().to_string(),
                details: format!(
                    "corrected hop size {} exceeds frame size {} (input block {})",
                    self.hop_size, frame_size, self.input_block_size
                ),
            });
        }

        // A frame boundary may fall inside an input block; keep enough
        // extra history so the frame that ended mid-block is still there.
        let deficit = self.initial_deficit() as usize;
        let lateness = (self.input_block_size - deficit % self.input_block_size)
            % self.input_block_size;
        self.history_len = frame_size + lateness;
        self.history.initialize(
            input.num_sources(),
            input.num_ears(),
            input.num_channels(),
            self.history_len,
            input.fs(),
        )?;

        self.samples_until_frame = self.initial_deficit();

        let output = self.base.output_mut();
        output.initialize(
            input.num_sources(),
            input.num_ears(),
            input.num_channels(),
            frame_size,
            input.fs(),
        )?;
        output.set_frame_rate(input.fs() / self.hop_size as f64);
        output.set_centre_freqs(input.centre_freqs());

        self.base.finish_initialize();
        Ok(())
    }

    fn process(&mut self, input: &SignalBank) {
        if !self.base.begin_process(input) {
            return;
        }

        let block = self.input_block_size;
        let keep = self.history_len - block;
        for source in 0..input.num_sources() {
            for ear in 0..input.num_ears() {
                for channel in 0..input.num_channels() {
                    let lane = self.history.signal_mut(source, ear, channel);
                    lane.copy_within(block.., 0);
                    lane[keep..].copy_from_slice(input.signal(source, ear, channel));
                }
            }
        }

        self.samples_until_frame -= block as i64;
        if self.samples_until_frame <= 0 {
            let frame_size = self.config.frame_size;
            let output = self.base.output_mut();
            for source in 0..input.num_sources() {
                for ear in 0..input.num_ears() {
                    for channel in 0..input.num_channels() {
                        let lane = self.history.signal(source, ear, channel);
                        output.set_signal(source, ear, channel, &lane[..frame_size]);
                    }
                }
            }
            output.set_trig(true);
            self.samples_until_frame += self.hop_size as i64;
        } else {
            self.base.output_mut().set_trig(false);
        }
    }

    fn reset(&mut self) {
        self.history.zero_signals();
        self.samples_until_frame = self.initial_deficit();
        self.base.reset_output();
    }
}
