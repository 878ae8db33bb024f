//! Windowed forward FFT for one audio block
//!
//! Converts a block of 16-bit PCM to floats, applies a Hamming window and
//! runs a forward FFT, exposing the first half of the spectrum as
//! interleaved (re, im) pairs. All buffers are allocated once.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Precomputed Hamming window of the given length.
pub fn hamming_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / (size - 1) as f32;
            0.54 - 0.46 * (2.0 * PI * x).cos()
        })
        .collect()
}

/// Per-stream transform state: window table, FFT plan and scratch buffers.
pub struct BlockTransform {
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Interleaved (re, im) pairs for bins `0..block_size / 2`.
    output: Vec<f32>,
}

impl BlockTransform {
    pub fn new(block_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(block_size);
        let scratch_len = fft.get_inplace_scratch_len();

        Self {
            window: hamming_window(block_size),
            fft,
            buffer: vec![Complex::new(0.0, 0.0); block_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            output: vec![0.0; block_size],
        }
    }

    /// Window and transform one PCM block. The result stays valid until the
    /// next call.
    pub fn process(&mut self, block: &[i16]) -> &[f32] {
        debug_assert_eq!(block.len(), self.window.len());

        for ((slot, &sample), &weight) in
            self.buffer.iter_mut().zip(block).zip(&self.window)
        {
            *slot = Complex::new((sample as f32 / 32_768.0) * weight, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (pair, bin) in self
            .output
            .chunks_exact_mut(2)
            .zip(&self.buffer[..self.window.len() / 2])
        {
            pair[0] = bin.re;
            pair[1] = bin.im;
        }

        &self.output
    }
}
