//! Streaming building blocks for psychoacoustic loudness models
//!
//! Audio flows through the crate in [`SignalBank`] containers: contiguous
//! blocks of samples organised by source, ear and channel, with the
//! sampling metadata and trigger flag riding alongside the data.
//!
//! # Architecture
//!
//! Processing stages implement the [`Module`] trait: configure against an
//! input bank once with `initialize`, then feed it blocks with `process`
//! and read the result from `output`. A [`Model`] chains modules into a
//! pipeline, feeding each module the output of its predecessor, and can
//! aggregate triggered frames from any stage over the run.
//!
//! Multi-rate operation falls out of the trigger flag: a
//! [`modules::FrameGenerator`] fires its output only when a full analysis
//! frame is ready, and every downstream module stays idle on the blocks
//! in between.

pub mod bank;
pub mod error;
pub mod model;
pub mod module;
pub mod modules;

pub use bank::SignalBank;
pub use error::{LoudnessError, Result};
pub use model::Model;
pub use module::{Module, ModuleBase};
