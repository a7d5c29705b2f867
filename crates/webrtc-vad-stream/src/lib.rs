//! Streaming voice activity detection over a byte stream.
//!
//! [`StreamVad`] accepts arbitrarily sized chunks of little-endian
//! 16-bit mono PCM, slices them into fixed detector frames, attributes
//! wall-clock timestamps from the running byte count, and merges
//! consecutive equal decisions into [`VoiceSegment`]s. The per-frame
//! decisions are exactly those of feeding the same frames to
//! [`Vad::is_speech`] directly; the framer adds no smoothing of its own.
//!
//! ```
//! use webrtc_vad::VadMode;
//! use webrtc_vad_stream::StreamVad;
//!
//! let mut stream = StreamVad::new(VadMode::Quality, 16000, 20).unwrap();
//! let segments = stream.write(&vec![0u8; 2000]).unwrap();
//! assert_eq!(segments.len(), 1);
//! assert!(!segments[0].is_speech);
//! ```

use std::time::Duration;

use webrtc_vad::{Error, Vad, VadMode};

/// A run of consecutive frames sharing one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceSegment {
    /// Stream time at which the run begins.
    pub start: Duration,
    /// Stream time at which the run currently ends (exclusive).
    pub end: Duration,
    /// Whether the run was classified as speech.
    pub is_speech: bool,
}

/// Buffering frontend for a [`Vad`].
///
/// Holds back partial frames between calls to [`write`](Self::write);
/// a frame is only ever classified once.
#[derive(Debug)]
pub struct StreamVad {
    vad: Vad,
    mode: VadMode,
    sample_rate_hz: i32,
    frame_size: usize,
    buffer: Vec<u8>,
    segments: Vec<VoiceSegment>,
    total_bytes: u64,
}

impl StreamVad {
    /// Creates a streaming detector.
    ///
    /// `frame_ms` selects the detector frame and therefore the
    /// granularity of the timestamps; only 10, 20 and 30 ms are
    /// supported. Fails with [`Error::InvalidSampleRate`] or
    /// [`Error::InvalidFrameLength`] on unsupported parameters.
    pub fn new(mode: VadMode, sample_rate_hz: i32, frame_ms: u32) -> Result<Self, Error> {
        if !matches!(sample_rate_hz, 8000 | 16000 | 32000 | 48000) {
            return Err(Error::InvalidSampleRate);
        }
        if !matches!(frame_ms, 10 | 20 | 30) {
            return Err(Error::InvalidFrameLength);
        }

        let frame_size = (sample_rate_hz as usize / 1000) * frame_ms as usize * 2;
        Ok(Self {
            vad: Vad::new(mode),
            mode,
            sample_rate_hz,
            frame_size,
            buffer: Vec::with_capacity(frame_size * 2),
            segments: Vec::new(),
            total_bytes: 0,
        })
    }

    /// Feeds PCM bytes and classifies every complete frame.
    ///
    /// Returns the segments *opened* by this call; a decision that
    /// merely extends the current segment updates its `end` in place and
    /// reports nothing. Trailing bytes short of a frame stay buffered.
    pub fn write(&mut self, data: &[u8]) -> Result<Vec<VoiceSegment>, Error> {
        self.buffer.extend_from_slice(data);

        let mut opened = Vec::new();
        let mut consumed = 0;
        while self.buffer.len() - consumed >= self.frame_size {
            let frame = &self.buffer[consumed..consumed + self.frame_size];
            let is_speech = self.vad.is_speech(frame, self.sample_rate_hz)?;
            consumed += self.frame_size;

            let start = self.byte_offset_to_duration(self.total_bytes);
            self.total_bytes += self.frame_size as u64;
            let end = self.byte_offset_to_duration(self.total_bytes);

            match self.segments.last_mut() {
                Some(last) if last.is_speech == is_speech => {
                    last.end = end;
                }
                _ => {
                    let segment = VoiceSegment {
                        start,
                        end,
                        is_speech,
                    };
                    tracing::trace!(?start, is_speech, "segment transition");
                    self.segments.push(segment);
                    opened.push(segment);
                }
            }
        }
        self.buffer.drain(..consumed);

        Ok(opened)
    }

    /// All segments seen so far, in stream order. The last segment's
    /// `end` still grows while matching frames keep arriving.
    pub fn segments(&self) -> &[VoiceSegment] {
        &self.segments
    }

    /// The segments classified as speech.
    pub fn speech_segments(&self) -> Vec<VoiceSegment> {
        self.segments.iter().copied().filter(|s| s.is_speech).collect()
    }

    /// The segments classified as silence or noise.
    pub fn silence_segments(&self) -> Vec<VoiceSegment> {
        self.segments.iter().copied().filter(|s| !s.is_speech).collect()
    }

    /// Bytes currently held back waiting for a complete frame.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes classified so far (excluding the held-back tail).
    pub fn total_processed_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Stream time covered by the classified frames.
    pub fn total_duration(&self) -> Duration {
        self.byte_offset_to_duration(self.total_bytes)
    }

    /// Drops buffered bytes and segments and re-initializes the
    /// detector for a new stream. The mode is retained.
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!(bytes = self.buffer.len(), "discarding buffered tail on reset");
        }
        self.buffer.clear();
        self.segments.clear();
        self.total_bytes = 0;
        self.vad.reset();
        // Re-initialization falls back to the default mode.
        self.vad
            .set_mode(self.mode)
            .expect("detector was just re-initialized");
    }

    fn byte_offset_to_duration(&self, bytes: u64) -> Duration {
        let samples = bytes / 2;
        Duration::from_nanos(samples * 1_000_000_000 / self.sample_rate_hz as u64)
    }
}
