//! Native audio backend: symphonia decoding, rubato resampling, cpal output

pub mod backend;
pub mod decoder;
pub mod output;
pub mod resampler;

pub use backend::{SymphoniaPlayer, SymphoniaPlayerFactory};
pub use decoder::{DecodedAudio, SimpleDecoder};
pub use output::OutputDevice;
pub use resampler::Resampler;
