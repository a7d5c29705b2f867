//! Voice Activity Detection from WebRTC.
//!
//! A pure-Rust port of the fixed-point GMM voice activity detector from
//! `webrtc/common_audio/vad`. Frames of 16-bit mono PCM at 8, 16, 32 or
//! 48 kHz are normalized to 8 kHz, reduced to six sub-band log-energies
//! by an all-pass filterbank, and classified by a per-band two-component
//! Gaussian mixture that adapts online.
//!
//! ```
//! use webrtc_vad::{Vad, VadMode};
//!
//! let mut vad = Vad::new(VadMode::Quality);
//! for frame in [[0i16; 160]; 4] {
//!     let voiced = vad.process(&frame, 16000).unwrap();
//!     assert!(!voiced);
//! }
//! ```
//!
//! Every intermediate of the fixed-point pipeline follows the reference
//! implementation bit for bit; the per-frame decisions match the
//! upstream detector on all supported rates and frame lengths.

pub mod config;
pub mod error;
pub mod vad;

pub(crate) mod core;
pub(crate) mod filterbank;
pub(crate) mod gmm;
pub(crate) mod minimum_tracker;
pub(crate) mod resampler;
pub(crate) mod signal_processing;

pub use config::VadMode;
pub use error::Error;
pub use vad::{valid_rate_and_frame_length, SampleRate, Vad, VadBuilder};
