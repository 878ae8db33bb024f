//! Sliding maxima over the frequency axis
//!
//! Two regimes: low bins use a naive filter with perceptually-weighted,
//! per-bin bandwidths; from [`NAIVE_STOP_BIN`] upward the bandwidth is fixed
//! and a Van Herk-Gil-Werman running maximum does the same work in amortized
//! O(1) per output bin.

/// Fixed filter width of the running-maximum region.
pub const VAN_HERK_FILTER_WIDTH: usize = 103;

/// First bin handled by the fixed-width filter. Below it the perceptual
/// bandwidth changes per bin, which the running-maximum scheme cannot absorb.
pub const NAIVE_STOP_BIN: usize = 82;

/// Inclusive window start per bin for 512-bin spectra.
#[rustfmt::skip]
pub const PERCEPTUAL_MIN_IDX: [usize; 512] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 9, 9, 9, 9, 9, 9, 9,
    9, 10, 10, 11, 12, 12, 12, 13, 14, 14, 14, 15, 15, 16, 16, 17,
    17, 18, 19, 19, 19, 21, 21, 22, 22, 23, 23, 25, 25, 25, 26, 26,
    26, 27, 27, 27, 29, 29, 29, 31, 31, 31, 33, 33, 33, 35, 35, 35,
    35, 37, 37, 37, 37, 39, 39, 39, 39, 41, 41, 41, 41, 43, 43, 43,
    43, 43, 47, 47, 47, 47, 47, 51, 51, 51, 51, 51, 53, 53, 53, 53,
    53, 55, 55, 55, 55, 55, 55, 59, 59, 59, 59, 59, 59, 63, 63, 63,
    63, 63, 63, 63, 67, 67, 67, 67, 67, 67, 67, 71, 71, 71, 71, 71,
    71, 71, 75, 75, 75, 75, 75, 75, 75, 75, 79, 79, 79, 79, 79, 79,
    79, 79, 83, 83, 83, 83, 83, 83, 83, 83, 83, 87, 87, 87, 87, 87,
    87, 87, 87, 87, 95, 95, 95, 95, 95, 95, 95, 95, 95, 95, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99, 103, 103, 103, 103, 103, 103, 103, 103,
    103, 103, 103, 111, 111, 111, 111, 111, 111, 111, 111, 111, 111, 111, 111, 119,
    119, 119, 119, 119, 119, 119, 119, 119, 119, 119, 119, 127, 127, 127, 127, 127,
    127, 127, 127, 127, 127, 127, 127, 127, 135, 135, 135, 135, 135, 135, 135, 135,
    135, 135, 135, 135, 135, 135, 143, 143, 143, 143, 143, 143, 143, 143, 143, 143,
    143, 143, 143, 143, 151, 151, 151, 151, 151, 151, 151, 151, 151, 151, 151, 151,
    151, 151, 151, 151, 159, 159, 159, 159, 159, 159, 159, 159, 159, 159, 159, 159,
    159, 159, 159, 159, 167, 167, 167, 167, 167, 167, 167, 167, 167, 167, 167, 167,
    167, 167, 167, 167, 167, 167, 175, 175, 175, 175, 175, 175, 175, 175, 175, 175,
    175, 175, 175, 175, 175, 175, 175, 175, 191, 191, 191, 191, 191, 191, 191, 191,
    191, 191, 191, 191, 191, 191, 191, 191, 191, 191, 191, 199, 199, 199, 199, 199,
    199, 199, 199, 199, 199, 199, 199, 199, 199, 199, 199, 199, 199, 199, 199, 199,
    207, 207, 207, 207, 207, 207, 207, 207, 207, 207, 207, 207, 207, 207, 207, 207,
    207, 207, 207, 207, 207, 207, 223, 223, 223, 223, 223, 223, 223, 223, 223, 223,
    223, 223, 223, 223, 223, 223, 223, 223, 223, 223, 223, 223, 223, 239, 239, 239,
    239, 239, 239, 239, 239, 239, 239, 239, 239, 239, 239, 239, 239, 239, 239, 239,
    239, 239, 239, 239, 239, 239, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255,
    271, 271, 271, 271, 271, 271, 271, 271, 271, 271, 271, 271, 271, 271, 271, 271,
    271, 271, 271, 271, 271, 271, 271, 271, 271, 271, 271, 287, 287, 287, 287, 287,
    287, 287, 287, 287, 287, 287, 287, 287, 287, 287, 287, 287, 287, 287, 287, 287,
];

/// Exclusive window stop per bin for 512-bin spectra.
#[rustfmt::skip]
pub const PERCEPTUAL_MAX_IDX: [usize; 512] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 16, 18, 19, 22, 23, 26, 27,
    29, 31, 33, 35, 37, 37, 39, 41, 43, 43, 47, 51, 51, 53, 53, 55,
    55, 59, 63, 63, 63, 67, 67, 71, 71, 75, 75, 79, 79, 79, 83, 83,
    83, 87, 87, 87, 95, 95, 95, 99, 99, 99, 103, 103, 103, 111, 111, 111,
    111, 119, 119, 119, 119, 127, 127, 127, 127, 135, 135, 135, 135, 143, 143, 143,
    143, 143, 151, 151, 151, 151, 151, 159, 159, 159, 159, 159, 167, 167, 167, 167,
    167, 175, 175, 175, 175, 175, 175, 191, 191, 191, 191, 191, 191, 199, 199, 199,
    199, 199, 199, 199, 207, 207, 207, 207, 207, 207, 207, 223, 223, 223, 223, 223,
    223, 223, 239, 239, 239, 239, 239, 239, 239, 239, 255, 255, 255, 255, 255, 255,
    255, 255, 271, 271, 271, 271, 271, 271, 271, 271, 271, 287, 287, 287, 287, 287,
    287, 287, 287, 287, 303, 303, 303, 303, 303, 303, 303, 303, 303, 303, 319, 319,
    319, 319, 319, 319, 319, 319, 319, 319, 335, 335, 335, 335, 335, 335, 335, 335,
    335, 335, 335, 351, 351, 351, 351, 351, 351, 351, 351, 351, 351, 351, 351, 383,
    383, 383, 383, 383, 383, 383, 383, 383, 383, 383, 383, 399, 399, 399, 399, 399,
    399, 399, 399, 399, 399, 399, 399, 399, 415, 415, 415, 415, 415, 415, 415, 415,
    415, 415, 415, 415, 415, 415, 447, 447, 447, 447, 447, 447, 447, 447, 447, 447,
    447, 447, 447, 447, 479, 479, 479, 479, 479, 479, 479, 479, 479, 479, 479, 479,
    479, 479, 479, 479, 495, 495, 495, 495, 495, 495, 495, 495, 495, 495, 495, 495,
    495, 495, 495, 495, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
    512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512, 512,
];

/// Naive centered max filter, used as the reference implementation in tests.
pub fn max_filter_naive(array: &[f32], filter_width: usize, maxvalues: &mut [f32]) {
    let half_filter_width = filter_width / 2;
    for i in 0..array.len() {
        let start_index = i.saturating_sub(half_filter_width);
        let stop_index = (i + half_filter_width + 1).min(array.len());

        let mut max_value = f32::NEG_INFINITY;
        for &value in &array[start_index..stop_index] {
            max_value = max_value.max(value);
        }
        maxvalues[i] = max_value;
    }
}

/// Van Herk-Gil-Werman running maximum with a fixed window of
/// [`VAN_HERK_FILTER_WIDTH`], processed in window-sized chunks with two
/// scratch arrays. Output for chunk offset `j` lands at
/// `maxvalues[output_offset + j..]`, which centers the window when the
/// caller passes an offset of half the filter width.
///
/// Based on <https://github.com/lemire/runningmaxmin> (LGPL). Returns the
/// number of outputs written starting at `output_offset`.
pub fn max_filter_van_herk(array: &[f32], maxvalues: &mut [f32], output_offset: usize) -> usize {
    const W: usize = VAN_HERK_FILTER_WIDTH;
    let array_size = array.len();

    let mut r = [0.0f32; W];
    let mut s = [0.0f32; W];

    let mut written = 0;
    let mut j = 0;
    while j + W <= array_size {
        let rpos = (j + W - 1).min(array_size - 1);

        // Suffix maxima of the chunk, right to left.
        r[0] = array[rpos];
        for i in (j..rpos).rev() {
            r[rpos - i] = r[rpos - i - 1].max(array[i]);
        }

        // Prefix maxima running into the next chunk.
        s[0] = array[rpos];
        let m1 = (j + 2 * W - 1).min(array_size);
        for i in (rpos + 1)..m1 {
            s[i - rpos] = s[i - rpos - 1].max(array[i]);
        }

        for i in 0..(m1 - rpos) {
            maxvalues[output_offset + j + i] = s[i].max(r[rpos - j - i]);
        }
        written = j + (m1 - rpos);

        j += W;
    }
    written
}

/// Perceptually-weighted max filter over a 512-bin magnitude spectrum.
///
/// Bins below [the minimum frequency bin] stay zero, bins up to
/// [`NAIVE_STOP_BIN`] get the per-bin perceptual bandwidth, and the remainder
/// is covered by the centered fixed-width running maximum. Bins the
/// fixed-width pass cannot center a full window on are zeroed and therefore
/// never produce peaks.
pub fn max_filter(array: &[f32], maxvalues: &mut [f32]) {
    assert_eq!(array.len(), 512, "perceptual max filter requires 512 bins");
    assert_eq!(maxvalues.len(), 512);

    maxvalues[..9].fill(0.0);

    for f in 9..NAIVE_STOP_BIN {
        let start_index = PERCEPTUAL_MIN_IDX[f];
        let stop_index = PERCEPTUAL_MAX_IDX[f];
        debug_assert!(stop_index - start_index < VAN_HERK_FILTER_WIDTH);

        let mut max_value = f32::NEG_INFINITY;
        for &value in &array[start_index..stop_index] {
            max_value = max_value.max(value);
        }
        maxvalues[f] = max_value;
    }

    let output_offset = NAIVE_STOP_BIN + VAN_HERK_FILTER_WIDTH / 2;
    maxvalues[NAIVE_STOP_BIN..output_offset].fill(0.0);

    // The chunked pass stops once a full window no longer fits; the
    // unreachable tail is zeroed.
    let written = max_filter_van_herk(&array[NAIVE_STOP_BIN..], maxvalues, output_offset);
    maxvalues[output_offset + written..].fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_spectrum() -> Vec<f32> {
        (0..512).map(|i| ((i * 37 + 11) % 97) as f32 * 0.01 + 0.1).collect()
    }

    #[test]
    fn tables_are_monotone_and_bounded() {
        for f in 10..512 {
            assert!(PERCEPTUAL_MIN_IDX[f] >= PERCEPTUAL_MIN_IDX[f - 1]);
            assert!(PERCEPTUAL_MAX_IDX[f] >= PERCEPTUAL_MAX_IDX[f - 1]);
            assert!(PERCEPTUAL_MAX_IDX[f] <= 512);
        }
        for f in 9..NAIVE_STOP_BIN {
            assert!(PERCEPTUAL_MAX_IDX[f] - PERCEPTUAL_MIN_IDX[f] < VAN_HERK_FILTER_WIDTH);
        }
    }

    #[test]
    fn perceptual_region_matches_window_maximum() {
        let spectrum = ramp_spectrum();
        let mut maxvalues = vec![0.0f32; 512];
        max_filter(&spectrum, &mut maxvalues);

        for f in 9..NAIVE_STOP_BIN {
            let window = &spectrum[PERCEPTUAL_MIN_IDX[f]..PERCEPTUAL_MAX_IDX[f]];
            let expected = window.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            assert_eq!(maxvalues[f], expected, "bin {}", f);
            for &value in window {
                assert!(maxvalues[f] >= value);
            }
        }
    }

    #[test]
    fn low_bins_are_zero() {
        let spectrum = vec![1.0f32; 512];
        let mut maxvalues = vec![0.5f32; 512];
        max_filter(&spectrum, &mut maxvalues);
        for f in 0..9 {
            assert_eq!(maxvalues[f], 0.0);
        }
    }

    #[test]
    fn van_herk_region_matches_naive_fixed_width() {
        let spectrum = ramp_spectrum();
        let mut maxvalues = vec![0.0f32; 512];
        max_filter(&spectrum, &mut maxvalues);

        let mut naive = vec![0.0f32; 512];
        max_filter_naive(&spectrum, VAN_HERK_FILTER_WIDTH, &mut naive);

        // The chunked pass over bins 82.. writes centered outputs for
        // 133..=460; everything it writes must agree with the naive filter.
        for f in (NAIVE_STOP_BIN + VAN_HERK_FILTER_WIDTH / 2)..=460 {
            assert_eq!(maxvalues[f], naive[f], "bin {}", f);
        }
    }

    #[test]
    fn van_herk_matches_naive_on_exact_chunks() {
        // 206 = 2 full chunks; all outputs have a full window.
        let data: Vec<f32> = (0..206).map(|i| ((i * 53) % 101) as f32).collect();
        let mut out = vec![0.0f32; 206 + VAN_HERK_FILTER_WIDTH];
        max_filter_van_herk(&data, &mut out, VAN_HERK_FILTER_WIDTH / 2);

        let mut naive = vec![0.0f32; 206];
        max_filter_naive(&data, VAN_HERK_FILTER_WIDTH, &mut naive);

        for i in (VAN_HERK_FILTER_WIDTH / 2)..(206 - VAN_HERK_FILTER_WIDTH / 2) {
            assert_eq!(out[i], naive[i], "index {}", i);
        }
    }
}
