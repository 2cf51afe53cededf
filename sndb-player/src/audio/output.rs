//! Audio output using cpal
//!
//! Opens an output device and plays a fully prepared [`Track`] through a
//! cpal stream. The stream callback reads frames at an atomic cursor shared
//! with the owning player, applies per-side gain, and reports completion
//! exactly once through the player's event sink.

use crate::playback::native::{
    EngineFault, NativeError, NativeEvent, NativeEventSink, ProgressProbe, MEDIA_ERROR_IO,
    MEDIA_ERROR_UNKNOWN,
};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Preferred output rate when the device supports it.
pub const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Interleaved samples already converted to the device rate and layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    samples: Vec<f32>,
    channels: usize,
}

impl Track {
    pub fn new(samples: Vec<f32>, channels: u16) -> Self {
        Self {
            samples,
            channels: usize::from(channels.max(1)),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    fn frame(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.channels)?;
        self.samples.get(start..start + self.channels)
    }
}

/// Playback position and control flags shared with the stream callback.
pub struct PlaybackCursor {
    frame: AtomicUsize,
    total_frames: AtomicUsize,
    sample_rate: AtomicU32,
    running: AtomicBool,
    finished: AtomicBool,
    gain_left: AtomicU32,
    gain_right: AtomicU32,
    sink: Mutex<Option<NativeEventSink>>,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self {
            frame: AtomicUsize::new(0),
            total_frames: AtomicUsize::new(0),
            sample_rate: AtomicU32::new(0),
            running: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            gain_left: AtomicU32::new(1.0f32.to_bits()),
            gain_right: AtomicU32::new(1.0f32.to_bits()),
            sink: Mutex::new(None),
        }
    }

    pub fn set_sink(&self, sink: Option<NativeEventSink>) {
        match self.sink.lock() {
            Ok(mut guard) => *guard = sink,
            Err(poisoned) => *poisoned.into_inner() = sink,
        }
    }

    /// Point the cursor at a freshly prepared track.
    pub fn load(&self, total_frames: usize, sample_rate: u32) {
        self.running.store(false, Ordering::Release);
        self.total_frames.store(total_frames, Ordering::Release);
        self.sample_rate.store(sample_rate, Ordering::Release);
        self.rewind();
    }

    pub fn clear(&self) {
        self.load(0, 0);
    }

    pub fn rewind(&self) {
        self.frame.store(0, Ordering::Release);
        self.finished.store(false, Ordering::Release);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn set_gains(&self, left: f32, right: f32) {
        self.gain_left
            .store(left.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        self.gain_right
            .store(right.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn gains(&self) -> (f32, f32) {
        (
            f32::from_bits(self.gain_left.load(Ordering::Relaxed)),
            f32::from_bits(self.gain_right.load(Ordering::Relaxed)),
        )
    }

    fn finish(&self) {
        if !self.finished.swap(true, Ordering::AcqRel) {
            self.running.store(false, Ordering::Release);
            self.emit(NativeEvent::Completed);
        }
    }

    fn fail(&self, fault: EngineFault) {
        self.running.store(false, Ordering::Release);
        self.emit(NativeEvent::Failed(fault));
    }

    fn emit(&self, event: NativeEvent) {
        let sink = match self.sink.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(sink) = sink {
            sink(event);
        }
    }
}

impl Default for PlaybackCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressProbe for PlaybackCursor {
    fn position_ms(&self) -> u64 {
        let rate = self.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return 0;
        }
        self.frame.load(Ordering::Acquire) as u64 * 1000 / rate as u64
    }

    fn duration_ms(&self) -> Option<u64> {
        let rate = self.sample_rate.load(Ordering::Acquire);
        let total = self.total_frames.load(Ordering::Acquire);
        if rate == 0 || total == 0 {
            return None;
        }
        Some(total as u64 * 1000 / rate as u64)
    }
}

/// Fill one output buffer from `track`, advancing the cursor.
pub fn render<T>(data: &mut [T], track: &Track, cursor: &PlaybackCursor)
where
    T: SizedSample + FromSample<f32>,
{
    if !cursor.is_running() {
        data.fill(T::EQUILIBRIUM);
        return;
    }

    let (left, right) = cursor.gains();
    let mut index = cursor.frame.load(Ordering::Acquire);

    for out in data.chunks_mut(track.channels()) {
        match track.frame(index) {
            Some(frame) => {
                for (ch_idx, (slot, sample)) in out.iter_mut().zip(frame).enumerate() {
                    let gain = if ch_idx % 2 == 0 { left } else { right };
                    *slot = T::from_sample((sample * gain).clamp(-1.0, 1.0));
                }
                index += 1;
            }
            None => out.fill(T::EQUILIBRIUM),
        }
    }

    cursor.frame.store(index, Ordering::Release);
    if index >= track.frames() {
        cursor.finish();
    }
}

/// Convert interleaved audio between channel layouts.
///
/// Mono is duplicated to every output channel; downmixing to mono averages;
/// otherwise channels map by position and missing ones are silent.
pub fn remix(samples: &[f32], from_channels: u16, to_channels: u16) -> Vec<f32> {
    let from = usize::from(from_channels.max(1));
    let to = usize::from(to_channels.max(1));
    if from == to {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut output = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        if from == 1 {
            output.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            output.extend((0..to).map(|ch| frame.get(ch).copied().unwrap_or(0.0)));
        }
    }

    output
}

/// An opened cpal output device and the stream layout chosen for it.
pub struct OutputDevice {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    name: String,
}

impl OutputDevice {
    /// Names of the available output devices.
    pub fn list_devices() -> Result<Vec<String>, NativeError> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| NativeError::Device(format!("Failed to enumerate devices: {}", e)))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    /// Open `device_name`, falling back to the default device when it is not
    /// found.
    pub fn open(device_name: Option<&str>) -> Result<Self, NativeError> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    NativeError::Device(format!("Failed to enumerate devices: {}", e))
                })?;
                match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    Some(device) => device,
                    None => {
                        warn!("Requested device '{}' not found, falling back to default device", name);
                        host.default_output_device().ok_or_else(|| {
                            NativeError::Device(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| NativeError::Device("No default output device found".to_string()))?,
        };

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let (config, sample_format) = Self::best_config(&device)?;

        debug!(
            "Audio device '{}': sample_rate={}, channels={}, format={:?}",
            name, config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            name,
        })
    }

    /// Prefer 44.1kHz stereo f32, else the device default.
    fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat), NativeError> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| NativeError::Device(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(config) = preferred {
            let config = config.with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE));
            return Ok((config.config(), SampleFormat::F32));
        }

        let default = device
            .default_output_config()
            .map_err(|e| NativeError::Device(format!("Failed to get default config: {}", e)))?;
        let sample_format = default.sample_format();
        Ok((default.config(), sample_format))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Build a (not yet playing) stream over `track`.
    pub fn build_stream(
        &self,
        track: Arc<Track>,
        cursor: Arc<PlaybackCursor>,
    ) -> Result<Stream, NativeError> {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_typed::<f32>(track, cursor)?,
            SampleFormat::I16 => self.build_typed::<i16>(track, cursor)?,
            SampleFormat::U16 => self.build_typed::<u16>(track, cursor)?,
            sample_format => {
                return Err(NativeError::Device(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };
        info!("Audio stream built on '{}'", self.name);
        Ok(stream)
    }

    fn build_typed<T>(
        &self,
        track: Arc<Track>,
        cursor: Arc<PlaybackCursor>,
    ) -> Result<Stream, NativeError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let error_cursor = Arc::clone(&cursor);
        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    render(data, &track, &cursor);
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_cursor.fail(EngineFault::new(MEDIA_ERROR_UNKNOWN, MEDIA_ERROR_IO));
                },
                None,
            )
            .map_err(|e| NativeError::Device(format!("Failed to build stream: {}", e)))
    }
}
