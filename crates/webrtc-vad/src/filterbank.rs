//! Six-band filterbank and log-energy feature extraction.
//!
//! An 8 kHz frame is run through a tree of critically sampled all-pass
//! pair splits (2000, 3000, 1000, 500 and 250 Hz), an 80 Hz high-pass
//! removes the lowest bin, and each band is reduced to its energy in dB.
//!
//! C source: `common_audio/vad/vad_filterbank.c`

use crate::config::{MIN_ENERGY, NUM_CHANNELS};
use crate::signal_processing::{energy, norm_u32};

/// 160 * log10(2) in Q9, the dB-per-octave conversion factor.
const LOG_CONST: i16 = 24660;
/// log2 of the leading bit of a 15-bit normalized energy, in Q10.
const LOG_ENERGY_INT_PART: i16 = 14336;

/// High-pass filter coefficients in Q14: zeros and poles of a biquad with
/// an 80 Hz cutoff at the 500 Hz band rate.
const HP_ZERO_COEFS: [i16; 3] = [6631, -13262, 6631];
const HP_POLE_COEFS: [i16; 3] = [16384, -7756, 5620];

/// All-pass filter coefficients in Q15, upper and lower branch
/// (~0.64 and ~0.17).
const ALL_PASS_COEFS_Q15: [i16; 2] = [20972, 5571];

/// Per-band adjustment added to the log-energy, in Q4.
const OFFSET_VECTOR: [i16; 6] = [368, 368, 272, 176, 176, 176];

/// Filter memory of the split tree and the high-pass filter.
///
/// One `(upper, lower)` state pair per split node, in Q(-1); four
/// samples of biquad state for the 80 Hz high-pass.
#[derive(Debug, Clone)]
pub(crate) struct FilterbankState {
    upper_state: [i16; 5],
    lower_state: [i16; 5],
    hp_filter_state: [i16; 4],
}

impl FilterbankState {
    pub(crate) fn new() -> Self {
        Self {
            upper_state: [0; 5],
            lower_state: [0; 5],
            hp_filter_state: [0; 4],
        }
    }

    pub(crate) fn reset(&mut self) {
        self.upper_state = [0; 5];
        self.lower_state = [0; 5];
        self.hp_filter_state = [0; 4];
    }
}

/// High-pass filters `data_in` with a cutoff of 80 Hz, assuming a 500 Hz
/// input rate. Output covers the 80 - 250 Hz band.
fn high_pass_filter(data_in: &[i16], filter_state: &mut [i16; 4], data_out: &mut [i16]) {
    debug_assert!(data_out.len() >= data_in.len());

    for (i, &sample) in data_in.iter().enumerate() {
        // All-zero section (filter coefficients in Q14).
        let mut tmp32 = HP_ZERO_COEFS[0] as i32 * sample as i32;
        tmp32 += HP_ZERO_COEFS[1] as i32 * filter_state[0] as i32;
        tmp32 += HP_ZERO_COEFS[2] as i32 * filter_state[1] as i32;
        filter_state[1] = filter_state[0];
        filter_state[0] = sample;

        // All-pole section (filter coefficients in Q14).
        tmp32 -= HP_POLE_COEFS[1] as i32 * filter_state[2] as i32;
        tmp32 -= HP_POLE_COEFS[2] as i32 * filter_state[3] as i32;
        filter_state[3] = filter_state[2];
        filter_state[2] = (tmp32 >> 14) as i16;
        data_out[i] = filter_state[2];
    }
}

/// One-multiply all-pass section over one polyphase of `data_in`.
///
/// Reads every second sample of `data_in` (the caller selects the phase
/// by offsetting the slice), producing `length` output samples in Q(-1).
/// The single filter state is kept in Q(-1) as well.
fn all_pass_filter(
    data_in: &[i16],
    length: usize,
    filter_coefficient: i16,
    filter_state: &mut i16,
    data_out: &mut [i16],
) {
    // State scaled up to Q15 for the duration of the loop.
    let mut state32 = (*filter_state as i32) << 16;

    for i in 0..length {
        let sample = data_in[2 * i] as i32;
        let tmp32 = state32 + filter_coefficient as i32 * sample;
        let tmp16 = (tmp32 >> 16) as i16; // Q(-1)
        data_out[i] = tmp16;
        // New state in Q14, scaled back up to Q15.
        state32 = (sample << 14) - filter_coefficient as i32 * tmp16 as i32;
        state32 *= 2;
    }

    *filter_state = (state32 >> 16) as i16; // Q(-1)
}

/// Splits `data_in` into a high-pass and a low-pass half-band, each
/// downsampled by two.
///
/// The upper branch filters even samples, the lower branch odd samples;
/// their sum and difference form the two bands. The difference is taken
/// before the in-place sum so that it sees the original upper output.
fn split_filter(
    data_in: &[i16],
    upper_state: &mut i16,
    lower_state: &mut i16,
    hp_data_out: &mut [i16],
    lp_data_out: &mut [i16],
) {
    let half_length = data_in.len() >> 1;
    debug_assert!(hp_data_out.len() >= half_length);
    debug_assert!(lp_data_out.len() >= half_length);

    all_pass_filter(
        data_in,
        half_length,
        ALL_PASS_COEFS_Q15[0],
        upper_state,
        hp_data_out,
    );
    all_pass_filter(
        &data_in[1..],
        half_length,
        ALL_PASS_COEFS_Q15[1],
        lower_state,
        lp_data_out,
    );

    for i in 0..half_length {
        let tmp = hp_data_out[i];
        hp_data_out[i] = tmp.wrapping_sub(lp_data_out[i]);
        lp_data_out[i] = lp_data_out[i].wrapping_add(tmp);
    }
}

/// Computes `10 * log10(energy)` of `data_in` in Q4 and adds `offset`.
///
/// While `total_energy` has not yet passed the minimum-energy gate it is
/// topped up with the (descaled) band energy; the caller uses it as a
/// cheap silence indicator.
fn log_of_energy(data_in: &[i16], offset: i16, total_energy: &mut i16, log_energy: &mut i16) {
    debug_assert!(!data_in.is_empty());

    // `tot_rshifts` accumulates every right shift applied to `energy`,
    // i.e. `energy` is in Q(-tot_rshifts).
    let (mut energy, mut tot_rshifts) = energy(data_in);

    if energy == 0 {
        *log_energy = offset;
        return;
    }

    // Normalize `energy` to 15 bits, which for an unsigned 32-bit value
    // means 17 leading zeros.
    let normalizing_rshifts = 17 - norm_u32(energy);
    tot_rshifts += normalizing_rshifts;
    if normalizing_rshifts < 0 {
        energy <<= (-normalizing_rshifts) as u32;
    } else {
        energy >>= normalizing_rshifts as u32;
    }

    // The leading bit of the 15-bit representation is 2^14, so the
    // integer part of log2 starts at 14 in Q10. The fraction is read off
    // the bits below the leading one:
    //
    //   10 * log10(true energy) in Q4
    //     = 160 * log10(2) * (log2(energy) + tot_rshifts)
    //     = LOG_CONST * (log2_energy + tot_rshifts)
    let log2_energy = LOG_ENERGY_INT_PART + ((energy & 0x0000_3FFF) >> 4) as i16;

    *log_energy = (((LOG_CONST as i32 * log2_energy as i32) >> 19) as i16)
        .wrapping_add(((tot_rshifts * LOG_CONST as i32) >> 9) as i16);

    if *log_energy < 0 {
        *log_energy = 0;
    }
    *log_energy += offset;

    if *total_energy <= MIN_ENERGY {
        if tot_rshifts >= 0 {
            // The un-shifted energy exceeded 16 bits, so it is certainly
            // above the gate; any value pushing the total past the gate
            // will do.
            *total_energy += MIN_ENERGY + 1;
        } else {
            // The normalized energy fits 15 bits, so the shift back to
            // Q0 fits an i16.
            let descaled = (energy >> ((-tot_rshifts) as u32)) as i16;
            *total_energy = total_energy.wrapping_add(descaled);
        }
    }
}

/// Extracts the six sub-band log-energies of an 8 kHz frame.
///
/// `data_in` must hold 80, 160 or 240 samples (10, 20 or 30 ms). Returns
/// the clamped total-energy indicator used as the processing gate.
pub(crate) fn calculate_features(
    state: &mut FilterbankState,
    data_in: &[i16],
    features: &mut [i16; NUM_CHANNELS],
) -> i16 {
    let data_length = data_in.len();
    debug_assert!(matches!(data_length, 80 | 160 | 240));

    // Intermediate buffers sized for the 30 ms case: at most 120 samples
    // after the first split, 60 after the second.
    let mut hp_120 = [0i16; 120];
    let mut lp_120 = [0i16; 120];
    let mut hp_60 = [0i16; 60];
    let mut lp_60 = [0i16; 60];

    let half_data_length = data_length >> 1;
    let mut length = half_data_length;
    let mut total_energy: i16 = 0;

    // Split at 2000 Hz and downsample: [0, 4000] -> [2000, 4000] + [0, 2000].
    split_filter(
        data_in,
        &mut state.upper_state[0],
        &mut state.lower_state[0],
        &mut hp_120[..half_data_length],
        &mut lp_120[..half_data_length],
    );

    // Upper band: split at 3000 Hz into [3000, 4000] + [2000, 3000].
    split_filter(
        &hp_120[..length],
        &mut state.upper_state[1],
        &mut state.lower_state[1],
        &mut hp_60[..length >> 1],
        &mut lp_60[..length >> 1],
    );
    length >>= 1;

    // Energy in 3000 - 4000 Hz.
    log_of_energy(&hp_60[..length], OFFSET_VECTOR[5], &mut total_energy, &mut features[5]);
    // Energy in 2000 - 3000 Hz.
    log_of_energy(&lp_60[..length], OFFSET_VECTOR[4], &mut total_energy, &mut features[4]);

    // Lower band: split at 1000 Hz into [1000, 2000] + [0, 1000].
    length = half_data_length;
    split_filter(
        &lp_120[..length],
        &mut state.upper_state[2],
        &mut state.lower_state[2],
        &mut hp_60[..length >> 1],
        &mut lp_60[..length >> 1],
    );
    length >>= 1;

    // Energy in 1000 - 2000 Hz.
    log_of_energy(&hp_60[..length], OFFSET_VECTOR[3], &mut total_energy, &mut features[3]);

    // Split at 500 Hz into [500, 1000] + [0, 500].
    split_filter(
        &lp_60[..length],
        &mut state.upper_state[3],
        &mut state.lower_state[3],
        &mut hp_120[..length >> 1],
        &mut lp_120[..length >> 1],
    );
    length >>= 1;

    // Energy in 500 - 1000 Hz.
    log_of_energy(&hp_120[..length], OFFSET_VECTOR[2], &mut total_energy, &mut features[2]);

    // Split at 250 Hz into [250, 500] + [0, 250].
    split_filter(
        &lp_120[..length],
        &mut state.upper_state[4],
        &mut state.lower_state[4],
        &mut hp_60[..length >> 1],
        &mut lp_60[..length >> 1],
    );
    length >>= 1;

    // Energy in 250 - 500 Hz.
    log_of_energy(&hp_60[..length], OFFSET_VECTOR[1], &mut total_energy, &mut features[1]);

    // Remove 0 - 80 Hz before the lowest band.
    high_pass_filter(&lp_60[..length], &mut state.hp_filter_state, &mut hp_120[..length]);

    // Energy in 80 - 250 Hz.
    log_of_energy(&hp_120[..length], OFFSET_VECTOR[0], &mut total_energy, &mut features[0]);

    total_energy
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine_frame(frequency_hz: f64, amplitude: f64, start: usize, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = (start + i) as f64 / 8000.0;
                (amplitude * (2.0 * PI * frequency_hz * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn zero_input_yields_offsets_and_no_energy() {
        let mut state = FilterbankState::new();
        let mut features = [0i16; NUM_CHANNELS];
        let total_energy = calculate_features(&mut state, &[0i16; 240], &mut features);

        assert_eq!(total_energy, 0);
        assert_eq!(features, OFFSET_VECTOR);
    }

    #[test]
    fn loud_frame_passes_the_energy_gate() {
        let mut state = FilterbankState::new();
        let mut features = [0i16; NUM_CHANNELS];
        let frame = sine_frame(1000.0, 8000.0, 0, 240);
        let total_energy = calculate_features(&mut state, &frame, &mut features);
        assert!(total_energy > MIN_ENERGY);
    }

    /// Runs six settling frames of a sine and returns the band energies
    /// with the per-band offsets removed.
    fn settled_band_energies(frequency_hz: f64) -> [i32; NUM_CHANNELS] {
        let mut state = FilterbankState::new();
        let mut features = [0i16; NUM_CHANNELS];
        for frame_index in 0..6 {
            let frame = sine_frame(frequency_hz, 8000.0, frame_index * 240, 240);
            calculate_features(&mut state, &frame, &mut features);
        }
        let mut raw = [0i32; NUM_CHANNELS];
        for (slot, (&f, &o)) in raw.iter_mut().zip(features.iter().zip(OFFSET_VECTOR.iter())) {
            *slot = f as i32 - o as i32;
        }
        raw
    }

    fn dominant_band(raw: &[i32; NUM_CHANNELS]) -> usize {
        let mut best = 0;
        for band in 1..NUM_CHANNELS {
            if raw[band] > raw[best] {
                best = band;
            }
        }
        best
    }

    #[test]
    fn sine_lands_in_the_matching_band() {
        // Band edges are 80/250/500/1000/2000 Hz on the low-pass side of
        // the tree; tones near band centers must dominate their band
        // once the filter states have settled.
        let cases = [(160.0, 0usize), (350.0, 1), (700.0, 2), (1400.0, 3)];
        for (frequency_hz, band) in cases {
            let raw = settled_band_energies(frequency_hz);
            assert_eq!(
                dominant_band(&raw),
                band,
                "{frequency_hz} Hz: energies {raw:?}"
            );
        }
    }

    #[test]
    fn upper_band_tones_separate_at_the_3khz_split() {
        // 2.5 and 3.6 kHz both pass the 2 kHz split into the high
        // branch; the 3 kHz split must route them to the two different
        // upper bands.
        let low = settled_band_energies(2500.0);
        let high = settled_band_energies(3600.0);

        let low_band = dominant_band(&low);
        let high_band = dominant_band(&high);
        assert!(low_band >= 4, "2.5 kHz energies {low:?}");
        assert!(high_band >= 4, "3.6 kHz energies {high:?}");
        assert_ne!(low_band, high_band);
    }

    #[test]
    fn all_frame_lengths_are_accepted() {
        let mut state = FilterbankState::new();
        let mut features = [0i16; NUM_CHANNELS];
        for len in [80usize, 160, 240] {
            let frame = sine_frame(500.0, 2000.0, 0, len);
            calculate_features(&mut state, &frame, &mut features);
            assert!(features.iter().all(|&f| f >= 0));
        }
    }

    #[test]
    fn filter_state_carries_across_frames() {
        // The same input processed through fresh state and through state
        // warmed by a different signal must differ — the tree is an IIR
        // structure with memory.
        let frame = sine_frame(700.0, 4000.0, 0, 240);

        let mut fresh = FilterbankState::new();
        let mut features_fresh = [0i16; NUM_CHANNELS];
        calculate_features(&mut fresh, &frame, &mut features_fresh);

        let mut warmed = FilterbankState::new();
        let mut features_warm = [0i16; NUM_CHANNELS];
        let warmup = sine_frame(3600.0, 12000.0, 0, 240);
        calculate_features(&mut warmed, &warmup, &mut features_warm);
        calculate_features(&mut warmed, &frame, &mut features_warm);

        assert_ne!(features_fresh, features_warm);
    }
}
