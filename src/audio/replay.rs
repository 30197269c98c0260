use std::path::Path;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::capture::{CaptureError, FrameSource};
use super::frame::{downmix, Frame};

/// Serves frames from a decoded recording, stamped with their position in the file
/// rather than wall clock, so a replay classifies identically on every run.
pub struct ReplaySource {
    samples: Vec<i16>,
    sample_rate: u32,
    frame_len: usize,
    served: usize,
}

impl ReplaySource {
    pub fn open(path: &Path, sample_rate: u32, frame_len: usize) -> Result<Self, CaptureError> {
        let (samples, file_rate) = decode_mono_i16(path)?;
        if file_rate != sample_rate {
            return Err(CaptureError::SampleRateMismatch {
                expected: sample_rate,
                actual: file_rate,
            });
        }
        let dropped = samples.len() % frame_len;
        if dropped > 0 {
            log::debug!("Dropping {} trailing samples that do not fill a frame", dropped);
        }
        Ok(Self::from_samples(samples, sample_rate, frame_len))
    }

    pub fn from_samples(samples: Vec<i16>, sample_rate: u32, frame_len: usize) -> Self {
        Self {
            samples,
            sample_rate,
            frame_len,
            served: 0,
        }
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let start = self.served * self.frame_len;
        let end = start + self.frame_len;
        if end > self.samples.len() {
            return Ok(None);
        }
        self.served += 1;
        Ok(Some(Frame::new(self.samples[start..end].to_vec(), self.frame_len)?))
    }

    fn position(&self) -> Option<Duration> {
        let samples = (self.served * self.frame_len) as u64;
        Some(Duration::from_nanos(samples * 1_000_000_000 / self.sample_rate as u64))
    }
}

fn decode_mono_i16(path: &Path) -> Result<(Vec<i16>, u32), CaptureError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or(CaptureError::NoTrack)?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track.codec_params.sample_rate.ok_or(CaptureError::NoTrack)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())?;

    let mut mono: Vec<i16> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(err)) => {
                log::warn!("Skipping undecodable packet: {}", err);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<i16>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        mono.extend(downmix(sample_buf.samples(), channels));
    }

    log::info!(
        "Decoded {}: {} samples, {}Hz, {:.1}s",
        path.display(),
        mono.len(),
        sample_rate,
        mono.len() as f32 / sample_rate as f32
    );

    Ok((mono, sample_rate))
}
