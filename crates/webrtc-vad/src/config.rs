//! Operating modes, decision thresholds and common sizing constants.
//!
//! C source: `common_audio/vad/vad_core.c` (mode tables),
//!           `common_audio/vad/include/webrtc_vad.h`

use crate::error::Error;

/// Number of frequency sub-bands.
pub(crate) const NUM_CHANNELS: usize = 6;
/// Number of Gaussians per sub-band and hypothesis.
pub(crate) const NUM_GAUSSIANS: usize = 2;
/// Flattened size of the per-band, per-Gaussian parameter tables.
pub(crate) const TABLE_SIZE: usize = NUM_CHANNELS * NUM_GAUSSIANS;

/// Minimum total energy required to run the likelihood computation.
pub(crate) const MIN_ENERGY: i16 = 10;
/// Maximum number of consecutive frames counted as speech before the
/// longer hang-over applies.
pub(crate) const MAX_SPEECH_FRAMES: i16 = 6;
/// Floor for every Gaussian standard deviation, in Q7.
pub(crate) const MIN_STD: i16 = 384;

/// Aggressiveness of the detector.
///
/// A more aggressive mode applies stricter thresholds: fewer false
/// positives, at the cost of clipping soft speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VadMode {
    /// Mode 0, the least aggressive; keeps as much probable speech as
    /// possible.
    #[default]
    Quality,
    /// Mode 1, tuned for low-bitrate links.
    LowBitrate,
    /// Mode 2.
    Aggressive,
    /// Mode 3, the most restrictive speech gate.
    VeryAggressive,
}

impl TryFrom<i32> for VadMode {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Quality),
            1 => Ok(Self::LowBitrate),
            2 => Ok(Self::Aggressive),
            3 => Ok(Self::VeryAggressive),
            _ => Err(Error::InvalidMode),
        }
    }
}

/// Per-mode decision thresholds, one entry per 10/20/30 ms frame length.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ModeThresholds {
    pub(crate) over_hang_max_1: [i16; 3],
    pub(crate) over_hang_max_2: [i16; 3],
    pub(crate) individual: [i16; 3],
    pub(crate) total: [i16; 3],
}

/// Mode 0 (quality).
pub(crate) const THRESHOLDS_QUALITY: ModeThresholds = ModeThresholds {
    over_hang_max_1: [8, 4, 3],
    over_hang_max_2: [14, 7, 5],
    individual: [24, 21, 24],
    total: [57, 48, 57],
};

/// Mode 1 (low bitrate).
pub(crate) const THRESHOLDS_LOW_BITRATE: ModeThresholds = ModeThresholds {
    over_hang_max_1: [8, 4, 3],
    over_hang_max_2: [14, 7, 5],
    individual: [37, 32, 37],
    total: [100, 80, 100],
};

/// Mode 2 (aggressive).
pub(crate) const THRESHOLDS_AGGRESSIVE: ModeThresholds = ModeThresholds {
    over_hang_max_1: [6, 3, 2],
    over_hang_max_2: [9, 5, 3],
    individual: [82, 78, 82],
    total: [285, 260, 285],
};

/// Mode 3 (very aggressive).
pub(crate) const THRESHOLDS_VERY_AGGRESSIVE: ModeThresholds = ModeThresholds {
    over_hang_max_1: [6, 3, 2],
    over_hang_max_2: [9, 5, 3],
    individual: [94, 94, 94],
    total: [1100, 1050, 1100],
};

impl VadMode {
    pub(crate) fn thresholds(self) -> &'static ModeThresholds {
        match self {
            Self::Quality => &THRESHOLDS_QUALITY,
            Self::LowBitrate => &THRESHOLDS_LOW_BITRATE,
            Self::Aggressive => &THRESHOLDS_AGGRESSIVE,
            Self::VeryAggressive => &THRESHOLDS_VERY_AGGRESSIVE,
        }
    }
}
