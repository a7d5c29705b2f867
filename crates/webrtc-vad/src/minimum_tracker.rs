//! Long-term noise floor estimation per sub-band.
//!
//! Each band keeps the 16 smallest feature values seen during roughly
//! the last 100 frames, together with their ages. The floor estimate is
//! a smoothed median of the smallest entries.
//!
//! C source: `common_audio/vad/vad_sp.c` (`WebRtcVad_FindMinimum`)

use crate::config::NUM_CHANNELS;

/// Entries are evicted once they reach this age (in frames).
const MAX_AGE: i16 = 100;
/// Placeholder written to freed slots, larger than any real Q4 feature.
const VALUE_SENTINEL: i16 = 10000;

/// Smoothing coefficients in Q15: fast tracking downwards (~0.2), slow
/// recovery upwards (~0.99).
const SMOOTHING_DOWN: i16 = 6553;
const SMOOTHING_UP: i16 = 32439;

/// Sorted per-band buffers of recent minima with their ages, plus the
/// smoothed median in Q4.
#[derive(Debug, Clone)]
pub(crate) struct MinimumTracker {
    low_value_vector: [i16; 16 * NUM_CHANNELS],
    index_vector: [i16; 16 * NUM_CHANNELS],
    mean_value: [i16; NUM_CHANNELS],
}

impl MinimumTracker {
    pub(crate) fn new() -> Self {
        let mut tracker = Self {
            low_value_vector: [0; 16 * NUM_CHANNELS],
            index_vector: [0; 16 * NUM_CHANNELS],
            mean_value: [0; NUM_CHANNELS],
        };
        tracker.reset();
        tracker
    }

    pub(crate) fn reset(&mut self) {
        self.low_value_vector = [VALUE_SENTINEL; 16 * NUM_CHANNELS];
        self.index_vector = [0; 16 * NUM_CHANNELS];
        self.mean_value = [1600; NUM_CHANNELS];
    }

    /// Offers `feature_value` (Q4) to `channel`'s minimum buffer and
    /// returns the updated smoothed floor estimate in Q4.
    ///
    /// `frame_counter` is the number of frames processed so far; the
    /// median source switches from the smallest to the third-smallest
    /// entry once enough history exists.
    pub(crate) fn update(
        &mut self,
        feature_value: i16,
        channel: usize,
        frame_counter: i32,
    ) -> i16 {
        let offset = channel << 4;
        let age = &mut self.index_vector[offset..offset + 16];
        let smallest_values = &mut self.low_value_vector[offset..offset + 16];

        // Every stored value ages by one frame; a value that reached the
        // age limit is dropped by sliding the larger entries down. The
        // freed top slot gets the sentinel and an age past the limit.
        for i in 0..16 {
            if age[i] != MAX_AGE {
                age[i] += 1;
            } else {
                for j in i..15 {
                    smallest_values[j] = smallest_values[j + 1];
                    age[j] = age[j + 1];
                }
                age[15] = MAX_AGE + 1;
                smallest_values[15] = VALUE_SENTINEL;
            }
        }

        // Insert the new value at its sorted position, if it beats the
        // current maximum, shifting larger entries up.
        let position = if feature_value < smallest_values[15] {
            smallest_values.iter().position(|&v| feature_value < v)
        } else {
            None
        };
        if let Some(position) = position {
            for i in (position + 1..16).rev() {
                smallest_values[i] = smallest_values[i - 1];
                age[i] = age[i - 1];
            }
            smallest_values[position] = feature_value;
            age[position] = 1;
        }

        let current_median = if frame_counter > 2 {
            smallest_values[2]
        } else if frame_counter > 0 {
            smallest_values[0]
        } else {
            1600
        };

        // Smooth the median: fast alpha when the estimate drops, slow
        // when it rises.
        let mut alpha: i16 = 0;
        if frame_counter > 0 {
            alpha = if current_median < self.mean_value[channel] {
                SMOOTHING_DOWN
            } else {
                SMOOTHING_UP
            };
        }

        let mut tmp32 = (alpha as i32 + 1) * self.mean_value[channel] as i32;
        tmp32 += (i16::MAX - alpha) as i32 * current_median as i32;
        tmp32 += 16384;
        self.mean_value[channel] = (tmp32 >> 15) as i16;

        self.mean_value[channel]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallest_values_are_kept_sorted() {
        let mut tracker = MinimumTracker::new();
        for (i, value) in [900i16, 300, 700, 100, 500].iter().enumerate() {
            tracker.update(*value, 0, i as i32);
        }
        let stored = &tracker.low_value_vector[..16];
        for pair in stored.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(stored[0], 100);
    }

    #[test]
    fn floor_tracks_down_quickly_and_up_slowly() {
        let mut tracker = MinimumTracker::new();
        let mut frame = 0;

        for _ in 0..20 {
            tracker.update(200, 0, frame);
            frame += 1;
        }
        let low = tracker.mean_value[0];
        assert!(low < 400, "floor did not follow the minimum down: {low}");

        // A single loud frame barely moves the floor back up.
        tracker.update(2000, 0, frame);
        let after_spike = tracker.mean_value[0];
        assert!(after_spike < low + 32);
    }

    #[test]
    fn old_entries_are_evicted() {
        let mut tracker = MinimumTracker::new();
        let mut frame = 0;

        // Seed one small value, then keep the buffer busy with larger
        // ones for more than the age limit.
        tracker.update(50, 0, frame);
        frame += 1;
        for _ in 0..(MAX_AGE as i32 + 1) {
            tracker.update(500, 0, frame);
            frame += 1;
        }

        let stored = &tracker.low_value_vector[..16];
        assert!(
            stored.iter().all(|&v| v != 50),
            "aged-out minimum still present: {stored:?}"
        );
        // The eviction path stamps an over-age marker on freed slots.
        let ages = &tracker.index_vector[..16];
        assert!(ages.iter().any(|&a| a > MAX_AGE));
    }

    #[test]
    fn channels_are_independent() {
        let mut tracker = MinimumTracker::new();
        for frame in 0..30 {
            tracker.update(100, 0, frame);
            tracker.update(1200, 3, frame);
        }
        assert!(tracker.mean_value[0] < tracker.mean_value[3]);
        // Untouched channels keep the initial estimate.
        assert_eq!(tracker.mean_value[5], 1600);
    }
}
