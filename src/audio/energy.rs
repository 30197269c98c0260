use super::frame::Frame;

const SHORT_NORMALIZE: f64 = 1.0 / 32768.0;
/// Scales normalized RMS into the range the detector threshold is expressed in.
const LOUDNESS_SCALE: f64 = 1000.0;

/// Root-mean-square energy of a frame, normalized to [-1, 1] samples and scaled by 1000.
pub fn loudness(frame: &Frame) -> f32 {
    rms_loudness(frame.samples())
}

pub fn rms_loudness(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let n = s as f64 * SHORT_NORMALIZE;
            n * n
        })
        .sum();
    ((sum_squares / samples.len() as f64).sqrt() * LOUDNESS_SCALE) as f32
}
