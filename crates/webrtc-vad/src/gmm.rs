//! Gaussian kernel for the GMM likelihood computation.
//!
//! C source: `common_audio/vad/vad_gmm.c`

use crate::signal_processing::div_w32_w16;

/// Probabilities below `exp(-kCompVar / 2)` are rounded to zero.
const COMP_VAR: i32 = 22005;
/// log2(exp(1)) in Q12.
const LOG2_EXP: i32 = 5909;

/// Evaluates `(1 / s) * exp(-(x - m)^2 / (2 * s^2))` for one Gaussian.
///
/// `input` is the feature in Q4, `mean` and `std` are model parameters in
/// Q7. The return value is the probability in Q20; `delta`, the
/// normalized distance `(x - m) / s^2` in Q11, is stored for the model
/// update step.
pub(crate) fn gaussian_probability(input: i16, mean: i16, std: i16, delta: &mut i16) -> i32 {
    // inv_std = 1 / s in Q10. 131072 is 1 in Q17 and `std >> 1` rounds
    // the division instead of truncating. Q17 / Q7 = Q10.
    let tmp32 = 131072 + (std >> 1) as i32;
    let inv_std = div_w32_w16(tmp32, std) as i16;

    // inv_std2 = 1 / s^2 in Q14: (Q8 * Q8) >> 2.
    let tmp16 = inv_std >> 2;
    let inv_std2 = ((tmp16 as i32 * tmp16 as i32) >> 2) as i16;

    // Q4 -> Q7, then the Q7 distance to the mean.
    let tmp16 = (input << 3).wrapping_sub(mean);

    // delta = (x - m) / s^2 in Q11: (Q14 * Q7) >> 10.
    *delta = ((inv_std2 as i32 * tmp16 as i32) >> 10) as i16;

    // Exponent argument (x - m)^2 / (2 * s^2) in Q10, the division by two
    // folded into the shift: (Q11 * Q7) >> 8 >> 1.
    let tmp32 = (*delta as i32 * tmp16 as i32) >> 9;

    let mut exp_value: i16 = 0;
    if tmp32 < COMP_VAR {
        // exp(-t) = exp2(-log2(e) * t), evaluated with the integer
        // exponent trick: the mantissa is the low ten bits with an
        // implicit leading one, the shift count comes from the high bits.
        // (Q12 * Q10) >> 12 = Q10.
        let mut tmp16 = ((LOG2_EXP * tmp32) >> 12) as i16;
        tmp16 = -tmp16;
        exp_value = 0x0400 | (tmp16 & 0x03FF);
        tmp16 = !tmp16;
        tmp16 >>= 10;
        tmp16 += 1;
        debug_assert!((0..=31).contains(&tmp16));
        exp_value = ((exp_value as i32) >> tmp16) as i16;
    }

    // (1 / s) * exp(...) in Q20 = Q10 * Q10.
    inv_std as i32 * exp_value as i32
}
