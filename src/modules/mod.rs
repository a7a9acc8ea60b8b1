//! Concrete processing modules
//!
//! Each module implements the `Module` trait for one algorithm family:
//! multi-rate framing, windowing, and the streaming filters. Algorithm
//! parameters live in each module's own configuration type.

mod biquad;
mod filter;
mod fir;
mod frame_generator;
mod iir;
mod window;

pub use biquad::{Biquad, BiquadDesign};
pub use fir::Fir;
pub use frame_generator::{FrameGenerator, FrameGeneratorConfig};
pub use iir::Iir;
pub use window::{Normalisation, Window, WindowConfig, WindowShape};
