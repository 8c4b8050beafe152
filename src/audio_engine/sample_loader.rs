//! Audio file decoding for the file source.
//!
//! Files are decoded once, up front, into planar `f32` channels at the file's own sample rate.

use std::fs::File;
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::audio_engine::errors::SampleLoadError;
use crate::messages::AudioBlock;

/// A fully decoded audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    /// Planar samples, one `Vec` per channel, all the same length.
    pub channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Copies `frames` frames starting at `start` into a block, zero-filling past the end.
    pub fn block_at(&self, start: usize, frames: usize) -> AudioBlock {
        let mut block = AudioBlock::silence(self.channel_count(), frames);
        for (dest, src) in block.channels_mut().iter_mut().zip(&self.channels) {
            let end = (start + frames).min(src.len());
            if start < end {
                dest[..end - start].copy_from_slice(&src[start..end]);
            }
        }
        block
    }
}

/// Decodes an audio file into planar float samples.
///
/// # Errors
///
/// - The file cannot be opened
/// - The format is not recognized or the data is corrupt
/// - The default track lacks a sample rate or channel layout
/// - The file decodes to zero frames
pub fn decode_audio_file(path: &Path) -> Result<DecodedAudio, SampleLoadError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or(SampleLoadError::NoDefaultTrack)?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(SampleLoadError::MissingSampleRate)?;
    let channel_count = track
        .codec_params
        .channels
        .ok_or(SampleLoadError::MissingChannels)?
        .count();

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut channels = vec![Vec::new(); channel_count];
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(SampleLoadError::Decode(err)),
        };

        let audio_buf = decoder.decode(&packet)?;
        let spec = *audio_buf.spec();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        for frame in sample_buf.samples().chunks_exact(channel_count.max(1)) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
    }

    let decoded = DecodedAudio {
        sample_rate,
        channels,
    };
    if decoded.frame_count() == 0 {
        return Err(SampleLoadError::Empty);
    }
    log::debug!(
        "Decoded {}: {} channels, {} frames at {} Hz",
        path.display(),
        decoded.channel_count(),
        decoded.frame_count(),
        decoded.sample_rate
    );
    Ok(decoded)
}

/// PCM16 WAV writer for tests that need real files on disk.
#[cfg(test)]
pub(crate) fn write_pcm16_wav(
    path: &Path,
    channels: u16,
    sample_rate_hz: u32,
    samples: &[i16],
) -> std::io::Result<()> {
    use std::io::Write;

    let bits_per_sample = 16u16;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate_hz * u32::from(block_align);
    let data_len_bytes = u32::try_from(samples.len() * 2).expect("sample data too large");
    let chunk_size = 36 + data_len_bytes;

    let mut file = File::create(path)?;
    file.write_all(b"RIFF")?;
    file.write_all(&chunk_size.to_le_bytes())?;
    file.write_all(b"WAVE")?;

    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?; // PCM
    file.write_all(&channels.to_le_bytes())?;
    file.write_all(&sample_rate_hz.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&bits_per_sample.to_le_bytes())?;

    file.write_all(b"data")?;
    file.write_all(&data_len_bytes.to_le_bytes())?;
    for sample in samples {
        file.write_all(&sample.to_le_bytes())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_stereo_wav_to_planar() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stereo.wav");

        let samples = [0i16, 16_384, -16_384, 32_767, 8_192, -8_192];
        write_pcm16_wav(&path, 2, 48_000, &samples).unwrap();

        let decoded = decode_audio_file(&path).unwrap();
        assert_eq!(decoded.sample_rate, 48_000);
        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.frame_count(), 3);
        assert!((decoded.channels[0][1] + 0.5).abs() < 1e-4);
        assert!((decoded.channels[1][0] - 0.5).abs() < 1e-4);
        assert!(decoded.channels.iter().flatten().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.wav");
        write_pcm16_wav(&path, 1, 44_100, &[]).unwrap();

        assert!(decode_audio_file(&path).is_err());
    }

    #[test]
    fn test_decode_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nonexistent.wav");

        assert!(matches!(decode_audio_file(&path), Err(SampleLoadError::Io(_))));
    }

    #[test]
    fn test_block_at_zero_fills_past_end() {
        let decoded = DecodedAudio {
            sample_rate: 8_000,
            channels: vec![vec![1.0, 2.0, 3.0]],
        };
        let block = decoded.block_at(2, 3);
        assert_eq!(block.channel(0), Some(&[3.0, 0.0, 0.0][..]));
        assert_eq!(decoded.block_at(5, 2), AudioBlock::silence(1, 2));
    }
}
