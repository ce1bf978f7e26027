//! Mixer: stereo master bus that collects rendered frames for one block.

/// Accumulates a block of stereo frames and applies master gain plus soft
/// clipping on the way out.
#[derive(Debug, Clone)]
pub struct Mixer {
    pub master_gain: f64,
    left: Vec<f64>,
    right: Vec<f64>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Mixer {
            master_gain: 1.0,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    /// Prepare a zeroed block of `num_frames`.
    pub fn clear(&mut self, num_frames: usize) {
        self.left.clear();
        self.left.resize(num_frames, 0.0);
        self.right.clear();
        self.right.resize(num_frames, 0.0);
    }

    /// Add a frame at the given index.
    pub fn add(&mut self, index: usize, left: f64, right: f64) {
        if index < self.left.len() {
            self.left[index] += left;
            self.right[index] += right;
        }
    }

    /// Append the processed block to the output channels.
    pub fn drain_into(&self, out_left: &mut Vec<f32>, out_right: &mut Vec<f32>) {
        out_left.extend(self.left.iter().map(|&s| soft_clip(s * self.master_gain) as f32));
        out_right.extend(self.right.iter().map(|&s| soft_clip(s * self.master_gain) as f32));
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_block_is_silent() {
        let mut m = Mixer::new();
        m.clear(128);
        let (mut l, mut r) = (Vec::new(), Vec::new());
        m.drain_into(&mut l, &mut r);
        assert_eq!(l.len(), 128);
        assert!(l.iter().chain(r.iter()).all(|&s| s == 0.0));
    }

    #[test]
    fn accumulates_frames_per_channel() {
        let mut m = Mixer::new();
        m.clear(4);
        m.add(0, 0.5, 0.0);
        m.add(0, 0.3, 0.1);
        m.add(1, 1.0, -1.0);
        m.add(9, 1.0, 1.0);
        let (mut l, mut r) = (Vec::new(), Vec::new());
        m.drain_into(&mut l, &mut r);
        assert!((l[0] as f64 - soft_clip(0.8)).abs() < 1e-6);
        assert!((r[0] as f64 - soft_clip(0.1)).abs() < 1e-6);
        assert!((r[1] as f64 + soft_clip(1.0)).abs() < 1e-6);
        assert_eq!(l.len(), 4);
    }

    #[test]
    fn soft_clip_prevents_overflow() {
        let mut m = Mixer::new();
        m.clear(1);
        m.add(0, 100.0, -100.0);
        let (mut l, mut r) = (Vec::new(), Vec::new());
        m.drain_into(&mut l, &mut r);
        assert!(l[0] <= 1.0 && r[0] >= -1.0);
    }
}
