use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actuator::Actuator;
use crate::audio::capture::{CaptureError, FrameSource};
use crate::audio::energy;
use crate::gesture::{GestureClassifier, GestureEvent};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub forward: u64,
    pub backward: u64,
    pub actuator_failures: u64,
    /// Stream time of the last accepted crossing.
    pub last_trigger: Option<Duration>,
}

/// Frame source → energy meter → classifier → actuator, one frame at a time.
pub struct Listener<S, A> {
    source: S,
    classifier: GestureClassifier,
    actuator: A,
    shutdown: Arc<AtomicBool>,
}

impl<S: FrameSource, A: Actuator> Listener<S, A> {
    pub fn new(
        source: S,
        classifier: GestureClassifier,
        actuator: A,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            classifier,
            actuator,
            shutdown,
        }
    }

    /// Runs until the shutdown flag is set or the source runs dry.
    pub fn listen(&mut self) -> Result<RunSummary, CaptureError> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        log::info!(
            "Listening (threshold={:.1}, debounce={:?}, isolation={:?})...",
            self.classifier.config().threshold,
            self.classifier.config().debounce,
            self.classifier.config().isolation
        );

        while !self.shutdown.load(Ordering::Acquire) {
            let Some(frame) = self.source.next_frame()? else {
                break;
            };
            summary.frames += 1;

            let loudness = energy::loudness(&frame);
            let t = self.source.position().unwrap_or_else(|| started.elapsed());
            let verdict = self.classifier.observe(t, loudness);

            for &event in verdict.events() {
                match event {
                    GestureEvent::Forward => summary.forward += 1,
                    GestureEvent::Backward => summary.backward += 1,
                }
                if let Err(err) = self.actuator.dispatch(event) {
                    // Actuation failures never touch classifier timing
                    summary.actuator_failures += 1;
                    log::warn!("Could not turn page {}: {}", event, err);
                }
            }
        }

        summary.last_trigger = self.classifier.last_trigger();
        log::info!(
            "Stopped after {} frames: {} forward, {} backward, {} actuator failures",
            summary.frames, summary.forward, summary.backward, summary.actuator_failures
        );
        Ok(summary)
    }

    pub fn into_parts(self) -> (S, A) {
        (self.source, self.actuator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ActuatorError;
    use crate::audio::capture::FrameAssembler;
    use crate::audio::frame::Frame;
    use std::sync::mpsc;
    use crate::audio::replay::ReplaySource;
    use crate::gesture::ClassifierConfig;

    const FRAME_LEN: usize = 1024;
    const RATE: u32 = 16_000;

    #[derive(Default)]
    struct Recorder {
        events: Vec<GestureEvent>,
        fail: bool,
        delay: Duration,
    }

    impl Actuator for Recorder {
        fn dispatch(&mut self, event: GestureEvent) -> Result<(), ActuatorError> {
            self.events.push(event);
            std::thread::sleep(self.delay);
            if self.fail {
                Err(ActuatorError::TargetNotFound)
            } else {
                Ok(())
            }
        }
    }

    /// Each entry is one frame: `true` for a loud frame, `false` for silence.
    fn recording(pattern: &[bool]) -> ReplaySource {
        let samples = pattern
            .iter()
            .flat_map(|&loud| {
                let level: i16 = if loud { 8000 } else { 0 };
                std::iter::repeat(level).take(FRAME_LEN)
            })
            .collect();
        ReplaySource::from_samples(samples, RATE, FRAME_LEN)
    }

    fn silence(frames: usize) -> Vec<bool> {
        vec![false; frames]
    }

    fn listener<S: FrameSource>(source: S, actuator: Recorder) -> Listener<S, Recorder> {
        Listener::new(
            source,
            GestureClassifier::new(ClassifierConfig::default()),
            actuator,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn silence_dispatches_nothing() {
        let mut l = listener(recording(&silence(50)), Recorder::default());
        let summary = l.listen().unwrap();
        assert_eq!(summary.frames, 50);
        assert_eq!(summary.forward + summary.backward, 0);
        assert!(l.into_parts().1.events.is_empty());
    }

    #[test]
    fn single_whistle_turns_forward_once() {
        // a whistle held for four frames stays inside the debounce window
        let mut pattern = silence(5);
        pattern.extend([true; 4]);
        pattern.extend(silence(10));
        let mut l = listener(recording(&pattern), Recorder::default());
        let summary = l.listen().unwrap();
        assert_eq!(summary.forward, 1);
        assert_eq!(summary.backward, 0);
        // end of the first loud frame: 6 frames of 64 ms
        assert_eq!(summary.last_trigger, Some(Duration::from_millis(384)));
        assert_eq!(l.into_parts().1.events, vec![GestureEvent::Forward]);
    }

    #[test]
    fn double_whistle_turns_backward_twice() {
        // frames are 64 ms: loud at 0.064 s, loud again at ~0.64 s
        let mut pattern = vec![true];
        pattern.extend(silence(8));
        pattern.push(true);
        pattern.extend(silence(5));
        let mut l = listener(recording(&pattern), Recorder::default());
        l.listen().unwrap();
        assert_eq!(
            l.into_parts().1.events,
            vec![GestureEvent::Forward, GestureEvent::Backward, GestureEvent::Backward]
        );
    }

    #[test]
    fn well_separated_whistles_are_independent() {
        let mut pattern = vec![true];
        pattern.extend(silence(50)); // 3.2 s
        pattern.push(true);
        let mut l = listener(recording(&pattern), Recorder::default());
        l.listen().unwrap();
        assert_eq!(
            l.into_parts().1.events,
            vec![GestureEvent::Forward, GestureEvent::Forward]
        );
    }

    #[test]
    fn actuator_failures_are_counted_not_fatal() {
        let mut pattern = vec![true];
        pattern.extend(silence(8));
        pattern.push(true);
        let mut l = listener(recording(&pattern), Recorder { fail: true, ..Default::default() });
        let summary = l.listen().unwrap();
        assert_eq!(summary.actuator_failures, 3);
        assert_eq!(summary.forward, 1);
        assert_eq!(summary.backward, 2);
    }

    #[test]
    fn shutdown_flag_stops_before_reading() {
        let shutdown = Arc::new(AtomicBool::new(true));
        let mut l = Listener::new(
            recording(&[true; 4]),
            GestureClassifier::new(ClassifierConfig::default()),
            Recorder::default(),
            shutdown,
        );
        assert_eq!(l.listen().unwrap(), RunSummary::default());
    }

    struct Broken;

    impl FrameSource for Broken {
        fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            Ok(Some(Frame::new(vec![0; 10], FRAME_LEN)?))
        }
    }

    #[test]
    fn malformed_frame_is_fatal() {
        let mut l = listener(Broken, Recorder::default());
        assert!(matches!(l.listen(), Err(CaptureError::Frame(_))));
    }

    #[test]
    fn slow_actuator_does_not_split_a_queued_whistle() {
        // the whole 256 ms whistle is already captured while the page turn blocks
        let (tx, rx) = mpsc::channel();
        for loud in [true, true, true, true, false, false, false, false] {
            let level: i16 = if loud { 8000 } else { 0 };
            tx.send(Ok(vec![level; FRAME_LEN])).unwrap();
        }
        drop(tx);

        let shutdown = Arc::new(AtomicBool::new(false));
        let source = FrameAssembler::new(rx, FRAME_LEN, RATE, shutdown, Duration::from_millis(10));
        let slow = Recorder {
            delay: Duration::from_millis(400),
            ..Default::default()
        };
        let mut l = listener(source, slow);

        // the drained channel ends the run
        assert!(matches!(l.listen(), Err(CaptureError::Disconnected)));
        let (source, recorder) = l.into_parts();
        assert_eq!(recorder.events, vec![GestureEvent::Forward]);
        assert_eq!(source.position(), Some(Duration::from_millis(512)));
    }
}
