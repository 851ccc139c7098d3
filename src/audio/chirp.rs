use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44100;
const TOTAL_SECS: f32 = 0.4;
const START_GAIN: f32 = 0.6;
const END_GAIN: f32 = 0.01;

/// Short rising success chirp: 800 Hz → 1200 Hz → 1000 Hz in 100 ms steps
/// with an exponential fade-out. Finite, so a sink plays it once and drains.
pub struct SuccessChirp {
    sample_rate: u32,
    num_sample: usize,
    total_samples: usize,
}

impl SuccessChirp {
    pub fn new() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            num_sample: 0,
            total_samples: (TOTAL_SECS * SAMPLE_RATE as f32) as usize,
        }
    }

    fn frequency_at(t: f32) -> f32 {
        if t < 0.1 {
            800.0
        } else if t < 0.2 {
            1200.0
        } else {
            1000.0
        }
    }

    fn gain_at(t: f32) -> f32 {
        START_GAIN * (END_GAIN / START_GAIN).powf(t / TOTAL_SECS)
    }
}

impl Iterator for SuccessChirp {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }

        let t = self.num_sample as f32 / self.sample_rate as f32;
        self.num_sample += 1;

        let sample = (2.0 * PI * Self::frequency_at(t) * t).sin();
        Some(sample * Self::gain_at(t))
    }
}

impl Source for SuccessChirp {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(TOTAL_SECS))
    }
}
