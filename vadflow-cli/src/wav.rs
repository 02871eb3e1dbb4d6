//! WAV decoding into mono 16-bit PCM.

use std::path::Path;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use vadflow_core::audio::frame::f32_to_pcm16;

#[derive(Debug, Clone)]
pub struct WavAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    /// Channel count of the file before downmixing.
    pub channels: u16,
}

impl WavAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }
}

pub fn read_wav(path: &Path) -> Result<WavAudio> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("opening WAV file {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        bail!("{} declares zero channels", path.display());
    }

    let channels = spec.channels as usize;
    let samples = match (spec.sample_format, spec.bits_per_sample) {
        // Native frame format: keep the exact sample values.
        (SampleFormat::Int, 16) => {
            let interleaved: Vec<i16> = reader
                .samples::<i16>()
                .collect::<std::result::Result<_, _>>()
                .context("decoding 16-bit samples")?;
            downmix_pcm16(interleaved, channels)
        }
        (SampleFormat::Float, 32) => {
            let interleaved: Vec<f32> = reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .context("decoding float samples")?;
            downmix_f32(&interleaved, channels)
        }
        (SampleFormat::Int, bits @ 1..=32) => {
            let scale = (1i64 << (bits - 1)) as f32;
            let interleaved: Vec<f32> = reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("decoding integer samples")?;
            downmix_f32(&interleaved, channels)
        }
        (format, bits) => bail!("unsupported WAV encoding: {format:?} at {bits} bits"),
    };

    Ok(WavAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Average interleaved 16-bit channels in integer arithmetic.
fn downmix_pcm16(interleaved: Vec<i16>, channels: usize) -> Vec<i16> {
    if channels == 1 {
        return interleaved;
    }
    interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

/// Average interleaved channels into one and convert to 16-bit PCM.
fn downmix_f32(interleaved: &[f32], channels: usize) -> Vec<i16> {
    interleaved
        .chunks(channels)
        .map(|frame| f32_to_pcm16(frame.iter().sum::<f32>() / frame.len() as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(name: &str, spec: WavSpec, samples: &[i16]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("vadflow-wav-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn mono_pcm16_is_read_unchanged() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let written = [0, 1000, -1000, 20_000, -20_000, 30_000, 16_385, i16::MAX, i16::MIN];
        let path = write_wav("mono.wav", spec, &written);
        let audio = read_wav(&path).unwrap();
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.samples, written);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn stereo_is_averaged() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let path = write_wav("stereo.wav", spec, &[2000, 0, -4000, -4000]);
        let audio = read_wav(&path).unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.samples.len(), 2);
        assert_eq!(audio.samples, vec![1000, -4000]);
        assert!((audio.duration_secs() - 2.0 / 48_000.0).abs() < 1e-12);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn full_scale_stereo_does_not_overflow() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let path = write_wav(
            "stereo_full_scale.wav",
            spec,
            &[i16::MAX, i16::MAX, i16::MIN, i16::MIN, 30_001, 30_000],
        );
        let audio = read_wav(&path).unwrap();
        assert_eq!(audio.samples, vec![i16::MAX, i16::MIN, 30_000]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_wav(Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/clip.wav"));
    }
}
