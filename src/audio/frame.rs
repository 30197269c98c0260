use thiserror::Error;

/// Capture rate the detector thresholds were tuned at.
pub const SAMPLE_RATE: u32 = 16_000;
/// Samples per analysis frame.
pub const FRAME_LEN: usize = 1024;

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("frame has {actual} samples, expected {expected}")]
    Length { expected: usize, actual: usize },
}

/// One block of mono 16-bit PCM, exactly as long as the configured frame length.
#[derive(Clone, Debug)]
pub struct Frame {
    samples: Vec<i16>,
}

impl Frame {
    pub fn new(samples: Vec<i16>, expected_len: usize) -> Result<Self, FrameError> {
        if samples.len() != expected_len {
            return Err(FrameError::Length {
                expected: expected_len,
                actual: samples.len(),
            });
        }
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }
}

/// Average interleaved channels down to a single mono stream.
pub fn downmix(interleaved: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}
