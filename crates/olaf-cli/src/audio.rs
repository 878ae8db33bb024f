//! Audio decoding for the command-line tools
//!
//! Decodes WAV, FLAC and Ogg Vorbis files, downmixes to mono, resamples to
//! the engine's rate and converts to the 16-bit PCM blocks the engine
//! consumes. The engine itself never touches files.

use anyhow::{Context, Result};
use std::path::Path;

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Flac,
    Ogg,
    Unknown,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("wav") | Some("wave") => AudioFormat::Wav,
            Some("flac") => AudioFormat::Flac,
            Some("ogg") => AudioFormat::Ogg,
            _ => AudioFormat::Unknown,
        }
    }
}

/// Decoded audio data
#[derive(Debug, Clone)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u32,
}

impl AudioData {
    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }

        let mut mono = Vec::with_capacity(self.samples.len() / self.channels as usize);
        for frame in self.samples.chunks(self.channels as usize) {
            let avg: f32 = frame.iter().sum::<f32>() / frame.len() as f32;
            mono.push(avg);
        }
        mono
    }
}

/// Decode an audio file to mono 16-bit PCM at the target sample rate.
pub fn decode_to_pcm16(path: &Path, target_sample_rate: u32) -> Result<(Vec<i16>, u32)> {
    if !path.exists() {
        anyhow::bail!("Audio file not found: {}", path.display());
    }

    let audio = match AudioFormat::from_path(path) {
        AudioFormat::Wav => decode_wav(path)?,
        AudioFormat::Flac => decode_flac(path)?,
        AudioFormat::Ogg => decode_ogg(path)?,
        AudioFormat::Unknown => {
            anyhow::bail!("Unsupported audio format: {}", path.display());
        }
    };

    let duration_ms = audio.duration_ms;
    let mut mono = audio.to_mono();
    if audio.sample_rate != target_sample_rate {
        mono = resample(&mono, audio.sample_rate, target_sample_rate);
    }

    let pcm: Vec<i16> = mono
        .iter()
        .map(|&sample| (sample.clamp(-1.0, 1.0) * 32_767.0) as i16)
        .collect();

    Ok((pcm, duration_ms))
}

/// Resample with linear interpolation; adequate for the narrow-band
/// spectra the engine works with.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        if src_idx + 1 < samples.len() {
            output.push(samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac);
        } else if src_idx < samples.len() {
            output.push(samples[src_idx]);
        }
    }

    output
}

fn decode_wav(path: &Path) -> Result<AudioData> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(finish(samples, sample_rate, channels))
}

fn decode_flac(path: &Path) -> Result<AudioData> {
    let mut reader = claxon::FlacReader::open(path)
        .with_context(|| format!("Failed to open FLAC file: {}", path.display()))?;

    let info = reader.streaminfo();
    let sample_rate = info.sample_rate;
    let channels = info.channels as u16;
    let max_val = (1i64 << (info.bits_per_sample - 1)) as f32;

    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / max_val))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(finish(samples, sample_rate, channels))
}

fn decode_ogg(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open OGG file: {}", path.display()))?;

    let mut reader = lewton::inside_ogg::OggStreamReader::new(file)?;
    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = reader.ident_hdr.audio_channels as u16;

    let mut samples = Vec::new();
    while let Some(packet) = reader.read_dec_packet_itl()? {
        for &sample in &packet {
            samples.push(sample as f32 / 32_768.0);
        }
    }

    Ok(finish(samples, sample_rate, channels))
}

fn finish(samples: Vec<f32>, sample_rate: u32, channels: u16) -> AudioData {
    let duration_ms =
        (samples.len() as f64 / (sample_rate as f64 * channels as f64) * 1000.0) as u32;
    AudioData {
        samples,
        sample_rate,
        channels,
        duration_ms,
    }
}
