//! Detector core: GMM likelihood test, model adaptation and hysteresis.
//!
//! The detector keeps, per sub-band, a two-component Gaussian mixture
//! for each hypothesis (noise, speech). Every processed frame runs a
//! combined local/global likelihood ratio test over the six band
//! log-energies, then updates the mixtures in place with the decision it
//! just made.
//!
//! C source: `common_audio/vad/vad_core.c`

use crate::config::{
    ModeThresholds, VadMode, MAX_SPEECH_FRAMES, MIN_ENERGY, MIN_STD, NUM_CHANNELS, NUM_GAUSSIANS,
    TABLE_SIZE,
};
use crate::error::Error;
use crate::filterbank::{calculate_features, FilterbankState};
use crate::gmm::gaussian_probability;
use crate::minimum_tracker::MinimumTracker;
use crate::resampler::{downsample_by_2, resample_48khz_to_8khz, Resampler48To8};
use crate::signal_processing::{div_w32_w16, norm_w32};
use crate::SampleRate;

/// Initialization sentinel; every public operation checks it.
const INIT_CHECK: i16 = 42;

/// Spectrum weighting of the per-band log-likelihood ratios.
const SPECTRUM_WEIGHT: [i16; NUM_CHANNELS] = [6, 8, 10, 12, 14, 16];

/// Model update step sizes.
const NOISE_UPDATE_CONST: i32 = 655; // Q15
const SPEECH_UPDATE_CONST: i32 = 6554; // Q15
const BACK_ETA: i32 = 154; // Q8

/// Minimum allowed spread between the global speech and noise means, in
/// Q5.
const MINIMUM_DIFFERENCE: [i16; NUM_CHANNELS] = [544, 544, 576, 576, 576, 576];

/// Upper bound on the global speech mean, in Q7.
const MAXIMUM_SPEECH: [i16; NUM_CHANNELS] = [11392, 11392, 11520, 11520, 11520, 11520];

/// Lower bound per Gaussian on the speech means, in Q7.
const MINIMUM_MEAN: [i16; NUM_GAUSSIANS] = [640, 768];

/// Upper bound on the global noise mean, in Q7.
const MAXIMUM_NOISE: [i16; NUM_CHANNELS] = [9216, 9088, 8960, 8832, 8704, 8576];

// Trained mixture starting values, all in Q7 and flattened as
// `channel + gaussian * NUM_CHANNELS`.

const NOISE_DATA_WEIGHTS: [i16; TABLE_SIZE] =
    [34, 62, 72, 66, 53, 25, 94, 66, 56, 62, 75, 103];

const SPEECH_DATA_WEIGHTS: [i16; TABLE_SIZE] =
    [48, 82, 45, 87, 50, 47, 80, 46, 83, 41, 78, 81];

const NOISE_DATA_MEANS: [i16; TABLE_SIZE] = [
    6738, 4892, 7065, 6715, 6771, 3369, 7646, 3863, 7820, 7266, 5020, 4362,
];

const SPEECH_DATA_MEANS: [i16; TABLE_SIZE] = [
    8306, 10085, 10078, 11823, 11843, 6309, 9473, 9571, 10879, 7581, 8180, 7483,
];

const NOISE_DATA_STDS: [i16; TABLE_SIZE] = [
    378, 1064, 493, 582, 688, 593, 474, 697, 475, 688, 421, 455,
];

const SPEECH_DATA_STDS: [i16; TABLE_SIZE] = [
    555, 505, 567, 524, 585, 1231, 509, 828, 492, 1540, 1079, 850,
];

/// Weighted average of one band's Gaussian means, with `offset` added to
/// each mean beforehand.
///
/// The offset is written back into `data`, which is how the push-apart
/// step moves the mixtures; the weighted sum is Q14 (Q7 * Q7).
fn weighted_average(
    data: &mut [i16; TABLE_SIZE],
    channel: usize,
    offset: i16,
    weights: &[i16; TABLE_SIZE],
) -> i32 {
    let mut average: i32 = 0;
    for k in 0..NUM_GAUSSIANS {
        let index = channel + k * NUM_CHANNELS;
        data[index] = data[index].wrapping_add(offset);
        average += data[index] as i32 * weights[index] as i32;
    }
    average
}

/// Mutable per-stream state of the detector.
///
/// Mirrors the layout described in the port source: mixture parameters
/// as flat Q7 arrays, the minimum-tracker ring, the filterbank and
/// resampler filter memories, the hysteresis counters and the active
/// threshold tables.
#[derive(Debug, Clone)]
pub(crate) struct VadCore {
    vad: i16,
    downsampling_states: [[i32; 2]; 2],
    state_48_to_8: Resampler48To8,
    noise_means: [i16; TABLE_SIZE],
    speech_means: [i16; TABLE_SIZE],
    noise_stds: [i16; TABLE_SIZE],
    speech_stds: [i16; TABLE_SIZE],
    frame_counter: i32,
    over_hang: i16,
    num_of_speech: i16,
    minimum_tracker: MinimumTracker,
    filterbank: FilterbankState,
    over_hang_max_1: [i16; 3],
    over_hang_max_2: [i16; 3],
    individual: [i16; 3],
    total: [i16; 3],
    init_flag: i16,
}

impl VadCore {
    pub(crate) fn new(mode: VadMode) -> Self {
        let mut core = Self {
            vad: 0,
            downsampling_states: [[0; 2]; 2],
            state_48_to_8: Resampler48To8::new(),
            noise_means: NOISE_DATA_MEANS,
            speech_means: SPEECH_DATA_MEANS,
            noise_stds: NOISE_DATA_STDS,
            speech_stds: SPEECH_DATA_STDS,
            frame_counter: 0,
            over_hang: 0,
            num_of_speech: 0,
            minimum_tracker: MinimumTracker::new(),
            filterbank: FilterbankState::new(),
            over_hang_max_1: [0; 3],
            over_hang_max_2: [0; 3],
            individual: [0; 3],
            total: [0; 3],
            init_flag: 0,
        };
        core.init();
        core.set_mode(mode);
        core
    }

    /// Restores the freshly-initialized state: default mixtures, zeroed
    /// filter memories, mode 0 thresholds.
    pub(crate) fn init(&mut self) {
        self.vad = 1; // Speech-active until the first decision.
        self.frame_counter = 0;
        self.over_hang = 0;
        self.num_of_speech = 0;

        self.downsampling_states = [[0; 2]; 2];
        self.state_48_to_8.reset();

        self.noise_means = NOISE_DATA_MEANS;
        self.speech_means = SPEECH_DATA_MEANS;
        self.noise_stds = NOISE_DATA_STDS;
        self.speech_stds = SPEECH_DATA_STDS;

        self.minimum_tracker.reset();
        self.filterbank.reset();

        self.set_mode(VadMode::default());
        self.init_flag = INIT_CHECK;
    }

    pub(crate) fn set_mode(&mut self, mode: VadMode) {
        let ModeThresholds {
            over_hang_max_1,
            over_hang_max_2,
            individual,
            total,
        } = *mode.thresholds();
        self.over_hang_max_1 = over_hang_max_1;
        self.over_hang_max_2 = over_hang_max_2;
        self.individual = individual;
        self.total = total;
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.init_flag == INIT_CHECK
    }

    /// Runs the detector on one frame, dispatching on the input rate.
    ///
    /// `frame` has already been validated against the supported
    /// (rate, duration) grid. `scratch` is the caller-owned resampler
    /// workspace. Returns the raw hysteresis-shaped decision; any
    /// positive value means speech.
    pub(crate) fn process(
        &mut self,
        rate: SampleRate,
        frame: &[i16],
        scratch: &mut [i32],
    ) -> Result<i16, Error> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        let decision = match rate {
            SampleRate::R8 => self.calc_vad_8khz(frame),
            SampleRate::R16 => self.calc_vad_16khz(frame),
            SampleRate::R32 => self.calc_vad_32khz(frame),
            SampleRate::R48 => self.calc_vad_48khz(frame, scratch),
        };
        Ok(decision)
    }

    fn calc_vad_8khz(&mut self, frame: &[i16]) -> i16 {
        let mut features = [0i16; NUM_CHANNELS];
        let total_power = calculate_features(&mut self.filterbank, frame, &mut features);
        self.vad = self.gmm_probability(&features, total_power, frame.len());
        self.vad
    }

    fn calc_vad_16khz(&mut self, frame: &[i16]) -> i16 {
        // Downsample to narrowband before analysis; at most 240 samples
        // for a 30 ms frame.
        let mut speech_nb = [0i16; 240];
        let length = frame.len() / 2;
        downsample_by_2(frame, &mut speech_nb[..length], &mut self.downsampling_states[0]);
        self.calc_vad_8khz(&speech_nb[..length])
    }

    fn calc_vad_32khz(&mut self, frame: &[i16]) -> i16 {
        // Two cascaded 2x stages: 32 -> 16 -> 8.
        let mut speech_wb = [0i16; 480];
        let length = frame.len() / 2;
        downsample_by_2(frame, &mut speech_wb[..length], &mut self.downsampling_states[1]);
        self.calc_vad_16khz(&speech_wb[..length])
    }

    fn calc_vad_48khz(&mut self, frame: &[i16], scratch: &mut [i32]) -> i16 {
        const FRAME_10MS_48KHZ: usize = 480;
        const FRAME_10MS_8KHZ: usize = 80;

        let mut speech_nb = [0i16; 240];
        let subframes = frame.len() / FRAME_10MS_48KHZ;
        for i in 0..subframes {
            resample_48khz_to_8khz(
                &frame[i * FRAME_10MS_48KHZ..(i + 1) * FRAME_10MS_48KHZ],
                &mut speech_nb[i * FRAME_10MS_8KHZ..(i + 1) * FRAME_10MS_8KHZ],
                &mut self.state_48_to_8,
                scratch,
            );
        }
        self.calc_vad_8khz(&speech_nb[..frame.len() / 6])
    }

    /// The hypothesis test and model update.
    ///
    /// Combines a global LRT with per-band local tests (H0: noise, H1:
    /// speech), adapts the mixtures with the resulting label, and shapes
    /// the output with the hang-over counters. Returns 0 for noise; any
    /// positive value encodes speech.
    fn gmm_probability(
        &mut self,
        features: &[i16; NUM_CHANNELS],
        total_power: i16,
        frame_length: usize,
    ) -> i16 {
        let threshold_index = match frame_length {
            80 => 0,
            160 => 1,
            _ => 2,
        };
        let overhead_1 = self.over_hang_max_1[threshold_index];
        let overhead_2 = self.over_hang_max_2[threshold_index];
        let individual_test = self.individual[threshold_index];
        let total_test = self.total[threshold_index];

        let mut delta_n = [0i16; TABLE_SIZE];
        let mut delta_s = [0i16; TABLE_SIZE];
        let mut ngprvec = [0i16; TABLE_SIZE]; // Conditional noise posteriors.
        let mut sgprvec = [0i16; TABLE_SIZE]; // Conditional speech posteriors.
        let mut noise_probability = [0i32; NUM_GAUSSIANS];
        let mut speech_probability = [0i32; NUM_GAUSSIANS];
        let mut sum_log_likelihood_ratios: i32 = 0;
        let mut vadflag: i16 = 0;

        if total_power > MIN_ENERGY {
            // The signal power is large enough to process. Two parts:
            // compute the speech likelihood for the decision, then
            // update the model with that decision.
            for channel in 0..NUM_CHANNELS {
                let mut h0_test: i32 = 0;
                let mut h1_test: i32 = 0;

                for k in 0..NUM_GAUSSIANS {
                    let gaussian = channel + k * NUM_CHANNELS;

                    // Probability of the frame being noise under this
                    // Gaussian, in Q27 = Q7 * Q20.
                    let probability = gaussian_probability(
                        features[channel],
                        self.noise_means[gaussian],
                        self.noise_stds[gaussian],
                        &mut delta_n[gaussian],
                    );
                    noise_probability[k] = NOISE_DATA_WEIGHTS[gaussian] as i32 * probability;
                    h0_test += noise_probability[k];

                    // Probability of the frame being speech, Q27.
                    let probability = gaussian_probability(
                        features[channel],
                        self.speech_means[gaussian],
                        self.speech_stds[gaussian],
                        &mut delta_s[gaussian],
                    );
                    speech_probability[k] = SPEECH_DATA_WEIGHTS[gaussian] as i32 * probability;
                    h1_test += speech_probability[k];
                }

                // log2(Pr{X|H1} / Pr{X|H0}) approximated by the
                // difference of the norms: the fractional log2 terms of
                // the two sums are independent and cancel on average.
                let mut shifts_h0 = norm_w32(h0_test);
                let mut shifts_h1 = norm_w32(h1_test);
                if h0_test == 0 {
                    shifts_h0 = 31;
                }
                if h1_test == 0 {
                    shifts_h1 = 31;
                }
                let log_likelihood_ratio = shifts_h0 - shifts_h1;

                // Weighted contribution to the global decision.
                sum_log_likelihood_ratios +=
                    log_likelihood_ratio as i32 * SPECTRUM_WEIGHT[channel] as i32;

                // Local decision.
                if log_likelihood_ratio.wrapping_mul(4) > individual_test {
                    vadflag = 1;
                }

                // Conditional posterior of the first noise Gaussian, in
                // Q14, for the update step. On underflow the first
                // Gaussian takes all of the mass.
                let h0 = (h0_test >> 12) as i16;
                if h0 > 0 {
                    let tmp = ((noise_probability[0] as u32 & 0xFFFF_F000) << 2) as i32; // Q29
                    ngprvec[channel] = div_w32_w16(tmp, h0) as i16; // Q14
                    ngprvec[channel + NUM_CHANNELS] = 16384 - ngprvec[channel];
                } else {
                    ngprvec[channel] = 16384;
                }

                // Conditional posterior of the first speech Gaussian;
                // on underflow both stay zero.
                let h1 = (h1_test >> 12) as i16;
                if h1 > 0 {
                    let tmp = ((speech_probability[0] as u32 & 0xFFFF_F000) << 2) as i32; // Q29
                    sgprvec[channel] = div_w32_w16(tmp, h1) as i16; // Q14
                    sgprvec[channel + NUM_CHANNELS] = 16384 - sgprvec[channel];
                }
            }

            // Global decision.
            if sum_log_likelihood_ratios >= total_test as i32 {
                vadflag = 1;
            }

            // Model update.
            let mut maxspe: i16 = 12800;
            for channel in 0..NUM_CHANNELS {
                // Long-term minimum of this band's feature, in Q4.
                let feature_minimum = self.minimum_tracker.update(
                    features[channel],
                    channel,
                    self.frame_counter,
                );

                // Global noise mean in Q14; its Q8 form feeds the
                // long-term correction below.
                let noise_global_mean =
                    weighted_average(&mut self.noise_means, channel, 0, &NOISE_DATA_WEIGHTS);
                let noise_mean_q8 = (noise_global_mean >> 6) as i16;

                for k in 0..NUM_GAUSSIANS {
                    let gaussian = channel + k * NUM_CHANNELS;

                    let nmk = self.noise_means[gaussian];
                    let smk = self.speech_means[gaussian];
                    let nsk = self.noise_stds[gaussian];
                    let ssk = self.speech_stds[gaussian];

                    // Noise mean update, only for frames judged to be
                    // noise: nmk += p(k|x) * delta_n * step.
                    let mut nmk2 = nmk;
                    if vadflag == 0 {
                        // (Q14 * Q11 >> 11) = Q14.
                        let delt = ((ngprvec[gaussian] as i32 * delta_n[gaussian] as i32) >> 11)
                            as i16;
                        // Q7 + (Q14 * Q15 >> 22) = Q7.
                        nmk2 = nmk.wrapping_add(((delt as i32 * NOISE_UPDATE_CONST) >> 22) as i16);
                    }

                    // Long-term correction toward the tracked minimum,
                    // applied on every frame. Q8 - Q8 = Q8.
                    let ndelt = (feature_minimum << 4).wrapping_sub(noise_mean_q8);
                    // Q7 + (Q8 * Q8) >> 9 = Q7.
                    let mut nmk3 = nmk2.wrapping_add(((ndelt as i32 * BACK_ETA) >> 9) as i16);

                    // Keep the noise mean from drifting away.
                    let lower = ((k + 5) << 7) as i16;
                    let upper = ((72 + k - channel) << 7) as i16;
                    nmk3 = nmk3.clamp(lower, upper);
                    self.noise_means[gaussian] = nmk3;

                    if vadflag != 0 {
                        // Speech mean update:
                        //   delta_s = (x - mu) / sigma^2
                        //   sgprvec[k] = p(k | x, H1)
                        // (Q14 * Q11) >> 11 = Q14.
                        let delt = ((sgprvec[gaussian] as i32 * delta_s[gaussian] as i32) >> 11)
                            as i16;
                        // Q14 * Q15 >> 21 = Q8.
                        let tmp = ((delt as i32 * SPEECH_UPDATE_CONST) >> 21) as i16;
                        // Q7 + (Q8 >> 1) = Q7, rounded.
                        let smk2 = smk.wrapping_add((tmp.wrapping_add(1)) >> 1);

                        // Keep the speech mean inside its corridor.
                        let maxmu = maxspe.wrapping_add(640);
                        self.speech_means[gaussian] = smk2.clamp(MINIMUM_MEAN[k], maxmu);

                        // Speech std update. (Q7 >> 3) = Q4, rounded.
                        let tmp = (smk.wrapping_add(4)) >> 3;
                        let tmp = features[channel].wrapping_sub(tmp); // Q4
                        // (Q11 * Q4 >> 3) = Q12.
                        let tmp1 = (delta_s[gaussian] as i32 * tmp as i32) >> 3;
                        let tmp2 = tmp1 - 4096;
                        let tmp = sgprvec[gaussian] >> 2;
                        // (Q14 >> 2) * Q12 = Q24.
                        let tmp1 = tmp as i32 * tmp2;

                        let tmp2 = tmp1 >> 4; // Q20

                        // 0.1 * Q20 / Q7 = Q13.
                        let mut tmp = if tmp2 > 0 {
                            div_w32_w16(tmp2, ssk.wrapping_mul(10)) as i16
                        } else {
                            (div_w32_w16(-tmp2, ssk.wrapping_mul(10)) as i16).wrapping_neg()
                        };
                        // Divide by four for an effective step of 0.025;
                        // (Q13 >> 8) = (Q13 >> 6) / 4 = Q7.
                        tmp = tmp.wrapping_add(128); // Rounding.
                        let mut ssk = ssk.wrapping_add(tmp >> 8);
                        if ssk < MIN_STD {
                            ssk = MIN_STD;
                        }
                        self.speech_stds[gaussian] = ssk;
                    } else {
                        // Noise std update:
                        //   delta_n * (x - nmk) - 1
                        // Q4 - (Q7 >> 3) = Q4.
                        let tmp = features[channel].wrapping_sub(nmk >> 3);
                        // (Q11 * Q4 >> 3) = Q12.
                        let mut tmp1 = (delta_n[gaussian] as i32 * tmp as i32) >> 3;
                        tmp1 -= 4096;

                        // (Q14 >> 2) * Q12 = Q24. The product may wrap;
                        // the reference arithmetic wraps with it.
                        let tmp = (ngprvec[gaussian].wrapping_add(2)) >> 2;
                        let tmp2 = (tmp as i32).wrapping_mul(tmp1);
                        // Q20 * approx 0.001 (2^-10):
                        // (Q24 >> 14) = (Q24 >> 4) / 2^10 = Q20.
                        let tmp1 = tmp2 >> 14;

                        // Q20 / Q7 = Q13.
                        let mut tmp = if tmp1 > 0 {
                            div_w32_w16(tmp1, nsk) as i16
                        } else {
                            (div_w32_w16(-tmp1, nsk) as i16).wrapping_neg()
                        };
                        tmp = tmp.wrapping_add(32); // Rounding.
                        let mut nsk = nsk.wrapping_add(tmp >> 6); // Q13 >> 6 = Q7.
                        if nsk < MIN_STD {
                            nsk = MIN_STD;
                        }
                        self.noise_stds[gaussian] = nsk;
                    }
                }

                // Pull the two hypotheses apart if their global means
                // got too close. Both averages are Q14 (Q7 * Q7).
                let mut speech_global_mean =
                    weighted_average(&mut self.speech_means, channel, 0, &SPEECH_DATA_WEIGHTS);
                let mut noise_global_mean =
                    weighted_average(&mut self.noise_means, channel, 0, &NOISE_DATA_WEIGHTS);

                // (Q14 >> 9) - (Q14 >> 9) = Q5.
                let diff = ((speech_global_mean >> 9) as i16)
                    .wrapping_sub((noise_global_mean >> 9) as i16);
                if diff < MINIMUM_DIFFERENCE[channel] {
                    let gap = MINIMUM_DIFFERENCE[channel].wrapping_sub(diff);

                    // ~0.8 of the gap onto the speech means, ~0.2 off
                    // the noise means, both in Q7.
                    let speech_shift = ((13 * gap as i32) >> 2) as i16;
                    let noise_shift = ((3 * gap as i32) >> 2) as i16;

                    speech_global_mean = weighted_average(
                        &mut self.speech_means,
                        channel,
                        speech_shift,
                        &SPEECH_DATA_WEIGHTS,
                    );
                    noise_global_mean = weighted_average(
                        &mut self.noise_means,
                        channel,
                        -noise_shift,
                        &NOISE_DATA_WEIGHTS,
                    );
                }

                // Final clipping of the global means.
                maxspe = MAXIMUM_SPEECH[channel];
                let mut excess = (speech_global_mean >> 7) as i16;
                if excess > maxspe {
                    excess -= maxspe;
                    for k in 0..NUM_GAUSSIANS {
                        let index = channel + k * NUM_CHANNELS;
                        self.speech_means[index] = self.speech_means[index].wrapping_sub(excess);
                    }
                }

                let mut excess = (noise_global_mean >> 7) as i16;
                if excess > MAXIMUM_NOISE[channel] {
                    excess -= MAXIMUM_NOISE[channel];
                    for k in 0..NUM_GAUSSIANS {
                        let index = channel + k * NUM_CHANNELS;
                        self.noise_means[index] = self.noise_means[index].wrapping_sub(excess);
                    }
                }
            }

            self.frame_counter += 1;
        }

        // Hang-over smoothing of the transition to noise.
        if vadflag == 0 {
            if self.over_hang > 0 {
                vadflag = 2 + self.over_hang;
                self.over_hang -= 1;
            }
            self.num_of_speech = 0;
        } else {
            self.num_of_speech += 1;
            if self.num_of_speech > MAX_SPEECH_FRAMES {
                self.num_of_speech = MAX_SPEECH_FRAMES;
                self.over_hang = overhead_2;
            } else {
                self.over_hang = overhead_1;
            }
        }

        vadflag
    }

    #[cfg(test)]
    pub(crate) fn noise_stds(&self) -> &[i16; TABLE_SIZE] {
        &self.noise_stds
    }

    #[cfg(test)]
    pub(crate) fn speech_stds(&self) -> &[i16; TABLE_SIZE] {
        &self.speech_stds
    }

    #[cfg(test)]
    pub(crate) fn weighted_mean_separation_q5(&mut self, channel: usize) -> i16 {
        let speech = weighted_average(&mut self.speech_means, channel, 0, &SPEECH_DATA_WEIGHTS);
        let noise = weighted_average(&mut self.noise_means, channel, 0, &NOISE_DATA_WEIGHTS);
        ((speech >> 9) as i16).wrapping_sub((noise >> 9) as i16)
    }
}
