//! Delay: stereo feedback delay line.

/// A stereo delay with configurable time, feedback, and dry/wet mix.
///
/// The buffer holds up to `max_delay_seconds`; `delay_time` may move freely
/// below that and is clamped on every read.
#[derive(Debug, Clone)]
pub struct Delay {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,

    /// Delay time in seconds.
    pub delay_time: f64,
    /// Feedback amount (0.0 = single echo, clamped below 1.0).
    pub feedback: f64,
    /// Dry/wet mix (0.0 = fully dry, 1.0 = fully wet).
    pub mix: f64,
}

impl Delay {
    pub fn new(sample_rate: f64, max_delay_seconds: f64) -> Self {
        let buffer_size = (sample_rate * max_delay_seconds.max(0.0)) as usize + 1;
        Self {
            buffer_l: vec![0.0; buffer_size],
            buffer_r: vec![0.0; buffer_size],
            write_pos: 0,
            sample_rate,
            delay_time: 0.5,
            feedback: 0.3,
            mix: 0.5,
        }
    }

    pub fn with_params(
        sample_rate: f64,
        max_delay_seconds: f64,
        delay_time: f64,
        feedback: f64,
        mix: f64,
    ) -> Self {
        let mut d = Self::new(sample_rate, max_delay_seconds);
        d.delay_time = delay_time.clamp(0.0, max_delay_seconds);
        d.feedback = feedback.clamp(0.0, 0.95);
        d.mix = mix.clamp(0.0, 1.0);
        d
    }

    /// Process a stereo sample pair, returning the processed output.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let buffer_len = self.buffer_l.len();
        let delay_samples = ((self.delay_time.max(0.0) * self.sample_rate) as usize)
            .clamp(1, buffer_len.saturating_sub(1).max(1));

        let read_pos = (self.write_pos + buffer_len - delay_samples) % buffer_len;
        let delayed_l = self.buffer_l[read_pos];
        let delayed_r = self.buffer_r[read_pos];

        let feedback = self.feedback.clamp(0.0, 0.95) as f32;
        self.buffer_l[self.write_pos] = left + delayed_l * feedback;
        self.buffer_r[self.write_pos] = right + delayed_r * feedback;
        self.write_pos = (self.write_pos + 1) % buffer_len;

        let mix = self.mix.clamp(0.0, 1.0) as f32;
        (
            left * (1.0 - mix) + delayed_l * mix,
            right * (1.0 - mix) + delayed_r * mix,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_dry() {
        let mut delay = Delay::with_params(44100.0, 2.0, 0.5, 0.0, 0.0);
        let (out_l, out_r) = delay.process(0.5, -0.5);
        assert!((out_l - 0.5).abs() < 1e-6);
        assert!((out_r + 0.5).abs() < 1e-6);
    }

    #[test]
    fn echoes_arrive_on_time_and_decay_by_feedback() {
        let sample_rate = 1000.0;
        let mut delay = Delay::with_params(sample_rate, 1.0, 0.01, 0.5, 1.0);

        delay.process(1.0, 1.0);
        for _ in 1..10 {
            let (out, _) = delay.process(0.0, 0.0);
            assert!(out.abs() < 1e-6, "nothing before the delay time");
        }
        let (first, _) = delay.process(0.0, 0.0);
        assert!((first - 1.0).abs() < 1e-6);

        for _ in 1..10 {
            delay.process(0.0, 0.0);
        }
        let (second, _) = delay.process(0.0, 0.0);
        assert!((second - 0.5).abs() < 1e-6);
    }

    #[test]
    fn delay_time_beyond_buffer_is_clamped() {
        let mut delay = Delay::with_params(1000.0, 0.1, 0.05, 0.0, 1.0);
        delay.delay_time = 5.0;
        for _ in 0..500 {
            let (l, r) = delay.process(1.0, 1.0);
            assert!(l.is_finite() && r.is_finite());
        }
    }
}
