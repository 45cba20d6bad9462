//! Two-stage position smoothing: moving average then single-pole IIR.

use crate::error::{Result, SliderError};

#[derive(Debug, Clone)]
pub struct PositionFilter {
    window: Vec<u32>,
    idx: usize,
    /// Next sample pre-fills the window and seeds the IIR.
    first_sample: bool,
    iir_factor: u32,
    position: u32,
    last_position: u32,
}

impl PositionFilter {
    pub fn new(window_size: usize, iir_factor: u32) -> Result<Self> {
        if window_size == 0 {
            return Err(SliderError::invalid("filter window must hold at least one sample"));
        }
        let mut window = Vec::new();
        window.try_reserve_exact(window_size)?;
        window.resize(window_size, 0);
        Ok(Self {
            window,
            idx: 0,
            first_sample: true,
            iir_factor,
            position: 0,
            last_position: 0,
        })
    }

    /// Forgets all history; the next sample starts a fresh track.
    pub fn reset(&mut self) {
        self.window.fill(0);
        self.idx = 0;
        self.first_sample = true;
        self.position = 0;
        self.last_position = 0;
    }

    /// Feeds one raw centroid and returns the filtered position.
    pub fn update(&mut self, raw: u32) -> u32 {
        let seeding = self.first_sample;
        let average = self.moving_average(raw);
        self.last_position = if seeding { average } else { self.position };
        self.position = iir(average, self.last_position, self.iir_factor);
        self.position
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    /// Output of the call before the latest `update`.
    pub fn last_position(&self) -> u32 {
        self.last_position
    }

    pub fn is_seeded(&self) -> bool {
        !self.first_sample
    }

    pub fn window(&self) -> &[u32] {
        &self.window
    }

    fn moving_average(&mut self, raw: u32) -> u32 {
        if self.first_sample {
            self.window.fill(raw);
            self.first_sample = false;
        } else {
            self.window[self.idx] = raw;
            self.idx = (self.idx + 1) % self.window.len();
        }
        let n = self.window.len() as u64;
        let sum: u64 = self.window.iter().map(|&v| v as u64).sum();
        ((sum + n / 2) / n) as u32
    }
}

/// `out = (in + (k - 1) * prev) / k`, pass-through for `k == 0`.
pub fn iir(input: u32, prev: u32, k: u32) -> u32 {
    if k == 0 {
        return input;
    }
    let k = k as u64;
    ((input as u64 + (k - 1) * prev as u64) / k) as u32
}
