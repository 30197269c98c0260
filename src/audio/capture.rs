use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig, SupportedStreamConfigRange};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::frame::{downmix, Frame, FrameError};

/// How often a blocked read wakes up to look at the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no default input device found")]
    NoDefaultDevice,
    #[error("input device {0:?} not found")]
    DeviceNotFound(String),
    #[error("device {device:?} supports no i16/f32/u16 input at {sample_rate} Hz")]
    UnsupportedConfig { device: String, sample_rate: u32 },
    #[error("audio file is {actual} Hz, expected {expected} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },
    #[error("audio file has no decodable track")]
    NoTrack,
    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),
    #[error("failed to query input configs: {0}")]
    Configs(#[from] cpal::SupportedStreamConfigsError),
    #[error("failed to build input stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("failed to start input stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("input stream error: {0}")]
    Stream(String),
    #[error("input stream closed unexpectedly")]
    Disconnected,
    #[error("failed to open audio file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode audio file: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A blocking supplier of fixed-size mono frames.
pub trait FrameSource {
    /// Block until one full frame is available. `Ok(None)` means the source is
    /// exhausted or was asked to shut down.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Stream time at the end of the last returned frame, counted in samples so
    /// that a backlog drained late keeps its capture timing. `None` makes the
    /// listener fall back to wall clock.
    fn position(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

pub fn list_devices() -> Result<Vec<InputDeviceInfo>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut infos = Vec::new();
    for device in host.input_devices()? {
        let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
        let is_default = default_name.as_deref() == Some(name.as_str());
        infos.push(InputDeviceInfo { name, is_default });
    }
    Ok(infos)
}

type Chunk = Result<Vec<i16>, String>;

/// Cuts the callback's arbitrarily sized chunks into exact frames and keeps
/// a sample clock for them.
pub(crate) struct FrameAssembler {
    rx: Receiver<Chunk>,
    pending: Vec<i16>,
    frame_len: usize,
    sample_rate: u32,
    served: u64,
    shutdown: Arc<AtomicBool>,
    poll: Duration,
}

impl FrameAssembler {
    pub(crate) fn new(
        rx: Receiver<Chunk>,
        frame_len: usize,
        sample_rate: u32,
        shutdown: Arc<AtomicBool>,
        poll: Duration,
    ) -> Self {
        Self {
            rx,
            pending: Vec::with_capacity(frame_len * 2),
            frame_len,
            sample_rate,
            served: 0,
            shutdown,
            poll,
        }
    }
}

impl FrameSource for FrameAssembler {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        loop {
            if self.pending.len() >= self.frame_len {
                let rest = self.pending.split_off(self.frame_len);
                let samples = std::mem::replace(&mut self.pending, rest);
                self.served += self.frame_len as u64;
                return Ok(Some(Frame::new(samples, self.frame_len)?));
            }
            if self.shutdown.load(Ordering::Acquire) {
                return Ok(None);
            }
            match self.rx.recv_timeout(self.poll) {
                Ok(Ok(chunk)) => self.pending.extend_from_slice(&chunk),
                Ok(Err(msg)) => return Err(CaptureError::Stream(msg)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(CaptureError::Disconnected),
            }
        }
    }

    fn position(&self) -> Option<Duration> {
        Some(Duration::from_nanos(self.served * 1_000_000_000 / self.sample_rate as u64))
    }
}

/// Live microphone capture. The device is released when this is dropped.
pub struct MicrophoneSource {
    _stream: cpal::Stream,
    frames: FrameAssembler,
    device_name: String,
}

impl MicrophoneSource {
    pub fn open(
        device_name: Option<&str>,
        sample_rate: u32,
        frame_len: usize,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.to_string()))?,
            None => host.default_input_device().ok_or(CaptureError::NoDefaultDevice)?,
        };
        let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());

        let supported = pick_config(&device, sample_rate)?.ok_or_else(|| {
            CaptureError::UnsupportedConfig {
                device: name.clone(),
                sample_rate,
            }
        })?;
        let format = supported.sample_format();
        let supported = supported.with_sample_rate(cpal::SampleRate(sample_rate));
        let config: StreamConfig = supported.into();

        log::info!(
            "Opening input device {:?}: {} Hz, {} ch, {:?}",
            name, sample_rate, config.channels, format
        );

        let (tx, rx) = mpsc::channel();
        let stream = match format {
            SampleFormat::I16 => build_stream::<i16>(&device, &config, tx)?,
            SampleFormat::F32 => build_stream::<f32>(&device, &config, tx)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, tx)?,
            _ => {
                return Err(CaptureError::UnsupportedConfig {
                    device: name,
                    sample_rate,
                })
            }
        };
        stream.play()?;

        Ok(Self {
            _stream: stream,
            frames: FrameAssembler::new(rx, frame_len, sample_rate, shutdown, POLL_INTERVAL),
            device_name: name,
        })
    }
}

impl FrameSource for MicrophoneSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.frames.next_frame()
    }

    fn position(&self) -> Option<Duration> {
        self.frames.position()
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        log::info!("Releasing input device {:?}", self.device_name);
    }
}

/// Prefer the fewest channels, then native i16, among configs covering the rate.
fn pick_config(
    device: &Device,
    sample_rate: u32,
) -> Result<Option<SupportedStreamConfigRange>, CaptureError> {
    let rate = cpal::SampleRate(sample_rate);
    Ok(device
        .supported_input_configs()?
        .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
        .filter_map(|c| format_rank(c.sample_format()).map(|rank| (c.channels(), rank, c)))
        .min_by_key(|(channels, rank, _)| (*channels, *rank))
        .map(|(_, _, c)| c))
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    tx: Sender<Chunk>,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::SizedSample + Send + 'static,
    i16: cpal::FromSample<T>,
{
    let channels = config.channels as usize;
    let err_tx = tx.clone();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<i16> = data.iter().map(|&s| cpal::Sample::from_sample(s)).collect();
            // Receiver gone means the source is shutting down
            let _ = tx.send(Ok(downmix(&samples, channels)));
        },
        move |err| forward_stream_error(err, &err_tx),
        None,
    )?;
    Ok(stream)
}

/// Only a vanished device ends capture; backend hiccups such as xruns are logged
/// and the stream keeps running.
fn forward_stream_error(err: cpal::StreamError, tx: &Sender<Chunk>) {
    log::error!("Input stream error: {}", err);
    if matches!(err, cpal::StreamError::DeviceNotAvailable) {
        let _ = tx.send(Err(err.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler(frame_len: usize) -> (Sender<Chunk>, Arc<AtomicBool>, FrameAssembler) {
        let (tx, rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let frames =
            FrameAssembler::new(rx, frame_len, 16_000, shutdown.clone(), Duration::from_millis(10));
        (tx, shutdown, frames)
    }

    #[test]
    fn format_preference_order() {
        assert!(format_rank(SampleFormat::I16) < format_rank(SampleFormat::F32));
        assert!(format_rank(SampleFormat::F32) < format_rank(SampleFormat::U16));
        assert_eq!(format_rank(SampleFormat::I8), None);
    }

    #[test]
    fn errors_are_readable() {
        let err = CaptureError::SampleRateMismatch { expected: 16_000, actual: 44_100 };
        assert_eq!(err.to_string(), "audio file is 44100 Hz, expected 16000 Hz");
    }

    #[test]
    fn reassembles_uneven_chunks_into_exact_frames() {
        let (tx, _shutdown, mut frames) = assembler(4);
        tx.send(Ok(vec![1, 2, 3])).unwrap();
        tx.send(Ok(vec![4, 5])).unwrap();
        tx.send(Ok(vec![6, 7, 8, 9])).unwrap();
        assert_eq!(frames.next_frame().unwrap().unwrap().samples(), &[1, 2, 3, 4]);
        assert_eq!(frames.next_frame().unwrap().unwrap().samples(), &[5, 6, 7, 8]);
    }

    #[test]
    fn shutdown_unblocks_a_pending_read() {
        let (tx, shutdown, mut frames) = assembler(4);
        tx.send(Ok(vec![1, 2])).unwrap();
        shutdown.store(true, Ordering::Release);
        assert!(frames.next_frame().unwrap().is_none());
        drop(tx);
    }

    #[test]
    fn stream_error_is_surfaced() {
        let (tx, _shutdown, mut frames) = assembler(4);
        tx.send(Err("device unplugged".into())).unwrap();
        assert!(matches!(frames.next_frame(), Err(CaptureError::Stream(msg)) if msg == "device unplugged"));
    }

    #[test]
    fn dropped_sender_is_disconnect() {
        let (tx, _shutdown, mut frames) = assembler(4);
        drop(tx);
        assert!(matches!(frames.next_frame(), Err(CaptureError::Disconnected)));
    }

    #[test]
    fn position_counts_served_samples() {
        let (tx, _shutdown, mut frames) = assembler(1024);
        assert_eq!(frames.position(), Some(Duration::ZERO));
        tx.send(Ok(vec![0; 2048])).unwrap();
        frames.next_frame().unwrap().unwrap();
        assert_eq!(frames.position(), Some(Duration::from_millis(64)));
        frames.next_frame().unwrap().unwrap();
        assert_eq!(frames.position(), Some(Duration::from_millis(128)));
    }

    #[test]
    fn lost_device_ends_capture() {
        let (tx, _shutdown, mut frames) = assembler(4);
        forward_stream_error(cpal::StreamError::DeviceNotAvailable, &tx);
        assert!(matches!(frames.next_frame(), Err(CaptureError::Stream(_))));
    }

    #[test]
    fn backend_hiccup_keeps_capturing() {
        let (tx, _shutdown, mut frames) = assembler(4);
        let xrun = cpal::BackendSpecificError { description: "buffer overrun".into() };
        forward_stream_error(cpal::StreamError::BackendSpecific { err: xrun }, &tx);
        tx.send(Ok(vec![5; 4])).unwrap();
        assert_eq!(frames.next_frame().unwrap().unwrap().samples(), &[5; 4]);
    }
}
