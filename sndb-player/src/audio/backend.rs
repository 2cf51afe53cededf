//! symphonia + cpal native player
//!
//! `prepare` decodes the whole file, resamples it to the device rate and
//! remixes it to the device layout. `start` builds the output stream on
//! first use and resumes it afterwards.

use super::decoder::SimpleDecoder;
use super::output::{remix, OutputDevice, PlaybackCursor, Track};
use super::resampler::Resampler;
use crate::playback::native::{
    NativeError, NativeEventSink, NativePlayer, NativePlayerFactory, ProgressProbe,
};
use cpal::traits::StreamTrait;
use cpal::Stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct SymphoniaPlayer {
    output: OutputDevice,
    cursor: Arc<PlaybackCursor>,
    source: Option<PathBuf>,
    track: Option<Arc<Track>>,
    stream: Option<Stream>,
}

impl SymphoniaPlayer {
    pub fn new(output: OutputDevice) -> Self {
        Self {
            output,
            cursor: Arc::new(PlaybackCursor::new()),
            source: None,
            track: None,
            stream: None,
        }
    }

    fn drop_stream(&mut self) {
        self.cursor.set_running(false);
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("Pausing stream before drop failed: {}", e);
            }
        }
    }
}

impl NativePlayer for SymphoniaPlayer {
    fn set_event_sink(&mut self, sink: Option<NativeEventSink>) {
        self.cursor.set_sink(sink);
    }

    fn reset(&mut self) {
        self.drop_stream();
        self.track = None;
        self.source = None;
        self.cursor.clear();
    }

    fn set_data_source(&mut self, path: &Path) -> Result<(), NativeError> {
        SimpleDecoder::probe_source(path)?;
        self.source = Some(path.to_path_buf());
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), NativeError> {
        let path = self
            .source
            .as_deref()
            .ok_or_else(|| NativeError::IllegalState("prepare without data source".to_string()))?;

        let decoded = SimpleDecoder::decode_file(path)?;
        let device_rate = self.output.sample_rate();
        let device_channels = self.output.channels();

        let resampled = Resampler::resample(
            &decoded.samples,
            decoded.sample_rate,
            device_rate,
            decoded.channels,
        )?;
        let samples = remix(&resampled, decoded.channels, device_channels);
        let track = Track::new(samples, device_channels);

        info!(
            "Prepared {} ({} frames at {}Hz on '{}')",
            path.display(),
            track.frames(),
            device_rate,
            self.output.name()
        );

        self.drop_stream();
        self.cursor.load(track.frames(), device_rate);
        self.track = Some(Arc::new(track));
        Ok(())
    }

    fn start(&mut self) -> Result<(), NativeError> {
        let track = self
            .track
            .clone()
            .ok_or_else(|| NativeError::IllegalState("start before prepare".to_string()))?;

        if self.cursor.is_finished() {
            self.cursor.rewind();
        }

        if self.stream.is_none() {
            let stream = self.output.build_stream(track, Arc::clone(&self.cursor))?;
            self.stream = Some(stream);
        }

        self.cursor.set_running(true);
        if let Some(stream) = self.stream.as_ref() {
            stream.play().map_err(|e| {
                self.cursor.set_running(false);
                NativeError::Device(format!("Failed to start stream: {}", e))
            })?;
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), NativeError> {
        self.cursor.set_running(false);
        match self.stream.as_ref() {
            Some(stream) => stream
                .pause()
                .map_err(|e| NativeError::Device(format!("Failed to pause stream: {}", e))),
            None => Ok(()),
        }
    }

    fn stop(&mut self) -> Result<(), NativeError> {
        self.drop_stream();
        self.cursor.rewind();
        Ok(())
    }

    fn set_volume(&mut self, left: f32, right: f32) {
        self.cursor.set_gains(left, right);
    }

    fn progress(&self) -> Arc<dyn ProgressProbe> {
        self.cursor.clone()
    }

    fn release(&mut self) {
        self.reset();
        self.cursor.set_sink(None);
        debug!("Native player released");
    }
}

/// Opens the configured output device for each new player.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaPlayerFactory {
    device_name: Option<String>,
}

impl SymphoniaPlayerFactory {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl NativePlayerFactory for SymphoniaPlayerFactory {
    fn create(&mut self) -> Result<Box<dyn NativePlayer>, NativeError> {
        let output = OutputDevice::open(self.device_name.as_deref())?;
        Ok(Box::new(SymphoniaPlayer::new(output)))
    }
}
