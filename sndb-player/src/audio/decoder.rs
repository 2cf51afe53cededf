//! Audio decoder using symphonia
//!
//! Decodes a whole sound file (MP3, FLAC, AAC, Vorbis, WAV) to interleaved
//! f32 PCM. Sound effects are short, so decoding everything up front keeps
//! the output callback a plain buffer read.

use crate::playback::native::NativeError;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::IntoSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::{debug, warn};

/// Fully decoded sound.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Simple whole-file decoder.
pub struct SimpleDecoder;

impl SimpleDecoder {
    /// Open `path` to check it is readable, without decoding.
    pub fn probe_source(path: &Path) -> Result<(), NativeError> {
        File::open(path).map(|_| ()).map_err(|e| open_error(path, e))
    }

    /// Decode the entire file.
    ///
    /// Packet-level decode errors are skipped; failures to open, probe, or
    /// find an audio track are returned.
    pub fn decode_file(path: &Path) -> Result<DecodedAudio, NativeError> {
        debug!("Decoding entire file: {}", path.display());

        let file = File::open(path).map_err(|e| open_error(path, e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| match e {
                // Probing ran off the end without recognizing a container.
                SymphoniaError::IoError(ref io) if io.kind() == ErrorKind::UnexpectedEof => {
                    NativeError::Unsupported("no suitable format reader found".to_string())
                }
                other => map_symphonia_error(other),
            })?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| NativeError::Unsupported("no audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| NativeError::Malformed("sample rate not found".to_string()))?;
        let mut channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);

        debug!("Audio format: sample_rate={}, channels={}", sample_rate, channels);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(map_symphonia_error)?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    debug!("Reached end of file");
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Stream reset requested, stopping at current position");
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    if channels == 0 {
                        channels = decoded.spec().channels.count() as u16;
                    }
                    append_interleaved(&decoded, &mut samples);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => return Err(map_symphonia_error(e)),
            }
        }

        if channels == 0 {
            return Err(NativeError::Malformed("channel count not found".to_string()));
        }

        debug!(
            "Decoded {} samples ({} frames)",
            samples.len(),
            samples.len() / channels as usize
        );

        Ok(DecodedAudio {
            samples,
            sample_rate,
            channels,
        })
    }
}

fn open_error(path: &Path, e: std::io::Error) -> NativeError {
    match e.kind() {
        ErrorKind::NotFound => NativeError::NotFound(path.to_path_buf()),
        _ => NativeError::Io(format!("failed to open {}: {}", path.display(), e)),
    }
}

fn map_symphonia_error(e: SymphoniaError) -> NativeError {
    match e {
        SymphoniaError::IoError(e) => NativeError::Io(e.to_string()),
        SymphoniaError::Unsupported(what) => NativeError::Unsupported(what.to_string()),
        SymphoniaError::DecodeError(what) => NativeError::Malformed(what.to_string()),
        other => NativeError::Malformed(other.to_string()),
    }
}

/// Convert any symphonia sample buffer to interleaved f32.
fn append_interleaved(decoded: &AudioBufferRef, output: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::U8(buf) => interleave(&**buf, output),
        AudioBufferRef::U16(buf) => interleave(&**buf, output),
        AudioBufferRef::U24(buf) => interleave(&**buf, output),
        AudioBufferRef::U32(buf) => interleave(&**buf, output),
        AudioBufferRef::S8(buf) => interleave(&**buf, output),
        AudioBufferRef::S16(buf) => interleave(&**buf, output),
        AudioBufferRef::S24(buf) => interleave(&**buf, output),
        AudioBufferRef::S32(buf) => interleave(&**buf, output),
        AudioBufferRef::F32(buf) => interleave(&**buf, output),
        AudioBufferRef::F64(buf) => interleave(&**buf, output),
    }
}

fn interleave<S>(buf: &AudioBuffer<S>, output: &mut Vec<f32>)
where
    S: Sample + IntoSample<f32>,
{
    let num_channels = buf.spec().channels.count();
    let num_frames = buf.frames();
    output.reserve(num_frames * num_channels);

    for frame_idx in 0..num_frames {
        for ch_idx in 0..num_channels {
            output.push(buf.chan(ch_idx)[frame_idx].into_sample());
        }
    }
}
