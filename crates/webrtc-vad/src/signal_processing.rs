//! Fixed-point helpers from the WebRTC signal processing library.
//!
//! Only the operations the detector actually uses are ported. The exact
//! rounding, truncation and saturation behavior of each helper is part of
//! the detector contract: a single-bit difference in an intermediate
//! result can flip a band's local decision.
//!
//! C source: `common_audio/signal_processing/include/spl_inl.h`,
//!           `common_audio/signal_processing/division_operations.c`,
//!           `common_audio/signal_processing/energy.c`

/// Number of leading zero bits of `a`, counting on the bitwise complement
/// for negative inputs. Returns 0 for `a == 0`.
///
/// Used for the log-likelihood ratio, where only the difference of two
/// norms matters.
pub(crate) fn norm_w32(a: i32) -> i16 {
    if a == 0 {
        return 0;
    }
    let ua = if a < 0 { !a as u32 } else { a as u32 };
    let zeros = ua.leading_zeros() as i16;
    // `!(-1) == 0` would report 32 bits; cap at the sign-bit position.
    if a < 0 && zeros == 32 {
        31
    } else {
        zeros
    }
}

/// Number of leading zero bits of an unsigned word. Returns 0 for zero.
pub(crate) fn norm_u32(a: u32) -> i32 {
    if a == 0 {
        return 0;
    }
    a.leading_zeros() as i32
}

/// 32-bit by 16-bit signed division with sign extraction.
///
/// The quotient is computed on absolute values and the sign reapplied
/// afterwards; a zero denominator saturates to `0x7FFFFFFF`. The
/// standard-deviation update paths rely on both behaviors.
pub(crate) fn div_w32_w16(num: i32, den: i16) -> i32 {
    if den == 0 {
        return 0x7FFF_FFFF;
    }
    let mut num = num;
    let mut den = den as i32;
    let mut sign = 1i32;
    if num < 0 {
        num = -num;
        sign = -sign;
    }
    if den < 0 {
        den = -den;
        sign = -sign;
    }
    sign * (num / den)
}

/// Sum of squares with an overflow guard.
///
/// Samples are squared and accumulated four at a time; whenever the
/// running sum exceeds `0x40000000` it is halved and the scale factor
/// incremented, so the result is the energy in `Q(-scale)`.
pub(crate) fn energy(vector: &[i16]) -> (u32, i32) {
    let mut energy: u32 = 0;
    let mut scale_factor: i32 = 0;

    let mut chunks = vector.chunks_exact(4);
    for chunk in &mut chunks {
        let tmp0 = chunk[0] as i32;
        let tmp1 = chunk[1] as i32;
        let tmp2 = chunk[2] as i32;
        let tmp3 = chunk[3] as i32;

        let sum = (tmp0 * tmp0)
            .wrapping_add(tmp1 * tmp1)
            .wrapping_add(tmp2 * tmp2)
            .wrapping_add(tmp3 * tmp3);
        energy = energy.wrapping_add(sum as u32);

        if energy > 0x4000_0000 {
            energy >>= 1;
            scale_factor += 1;
        }
    }
    for &sample in chunks.remainder() {
        let tmp = sample as i32;
        energy = energy.wrapping_add((tmp * tmp) as u32);

        if energy > 0x4000_0000 {
            energy >>= 1;
            scale_factor += 1;
        }
    }

    (energy, scale_factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_w32_counts_redundant_bits() {
        assert_eq!(norm_w32(0), 0);
        assert_eq!(norm_w32(1), 31);
        assert_eq!(norm_w32(0x4000_0000), 1);
        assert_eq!(norm_w32(i32::MAX), 1);
        assert_eq!(norm_w32(-1), 31);
        assert_eq!(norm_w32(i32::MIN), 0);
    }

    #[test]
    fn norm_u32_counts_leading_zeros() {
        assert_eq!(norm_u32(0), 0);
        assert_eq!(norm_u32(1), 31);
        assert_eq!(norm_u32(0x8000), 16);
        assert_eq!(norm_u32(u32::MAX), 0);
    }

    #[test]
    fn div_saturates_on_zero_denominator() {
        assert_eq!(div_w32_w16(123_456, 0), 0x7FFF_FFFF);
    }

    #[test]
    fn div_truncates_toward_zero_with_sign() {
        assert_eq!(div_w32_w16(7, 2), 3);
        assert_eq!(div_w32_w16(-7, 2), -3);
        assert_eq!(div_w32_w16(7, -2), -3);
        assert_eq!(div_w32_w16(-7, -2), 3);
    }

    #[test]
    fn energy_of_short_vector_is_exact() {
        let (e, scale) = energy(&[3, -4, 12, 50, 7]);
        assert_eq!(e, 9 + 16 + 144 + 2500 + 49);
        assert_eq!(scale, 0);
    }

    #[test]
    fn energy_scale_factor_preserves_magnitude() {
        // 240 samples at amplitude 4096 overflow the 30-bit guard several
        // times; the descaled energy must still be close to the true sum.
        let samples = [4096i16; 240];
        let (e, scale) = energy(&samples);
        assert!(scale > 0);

        let reconstructed = (e as u64) << scale;
        let exact: u64 = samples.iter().map(|&s| (s as u64) * (s as u64)).sum();
        let error = reconstructed.abs_diff(exact);
        assert!(
            error * 1000 < exact,
            "reconstructed={reconstructed}, exact={exact}"
        );
    }

    #[test]
    fn energy_of_zeros_is_zero() {
        let (e, scale) = energy(&[0i16; 160]);
        assert_eq!(e, 0);
        assert_eq!(scale, 0);
    }
}
