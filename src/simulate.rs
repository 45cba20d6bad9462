//! Synthetic finger on a slider.
//!
//! Produces the smoothed reading and active flag each channel would show if
//! a finger sat at a given position, splitting the touch between the two
//! nearest pads. Used by the `simulate` command and scenario tests.

use crate::config::SliderConfig;
use crate::error::{Result, SliderError};
use crate::scripted::ScriptedFsm;

/// Peak channel response, in multiples of the channel threshold.
pub const DEFAULT_GAIN: f32 = 4.0;

#[derive(Debug, Clone)]
pub struct SyntheticSlider {
    base: u32,
    gain: f32,
    position_range: u32,
    thresholds: Vec<f32>,
}

/// One tick of channel readings, in channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub smoothed: Vec<u32>,
    pub active: Vec<bool>,
}

impl SyntheticSlider {
    pub fn new(config: &SliderConfig, base: u32) -> Result<Self> {
        config.validate()?;
        if base == 0 {
            return Err(SliderError::invalid("synthetic base reading must be non-zero"));
        }
        Ok(Self {
            base,
            gain: DEFAULT_GAIN,
            position_range: config.position_range,
            thresholds: config.thresholds.clone(),
        })
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Readings with nothing touching the slider.
    pub fn idle(&self) -> Frame {
        let n = self.thresholds.len();
        Frame {
            smoothed: vec![self.base; n],
            active: vec![false; n],
        }
    }

    /// Readings for a finger at `position`, clamped to the slider range.
    pub fn touch(&self, position: u32) -> Frame {
        let last = self.thresholds.len() - 1;
        let x = position.min(self.position_range) as f32 * last as f32
            / self.position_range as f32;
        let left = (x.floor() as usize).min(last);
        let t = x - left as f32;

        let mut frame = self.idle();
        for (i, weight) in [(left, 1.0 - t), (left + 1, t)] {
            if i > last || weight <= 0.0 {
                continue;
            }
            let rise = self.thresholds[i] * self.gain * weight;
            frame.smoothed[i] = self.base.saturating_add((self.base as f32 * rise).round() as u32);
            frame.active[i] = rise > self.thresholds[i];
        }
        frame
    }

    /// Loads `frame` (or the idle frame) into `fsm`.
    pub fn apply(&self, fsm: &mut ScriptedFsm, position: Option<u32>) -> Result<()> {
        let frame = match position {
            Some(p) => self.touch(p),
            None => self.idle(),
        };
        fsm.set_frame(&frame.smoothed, &frame.active)
    }
}

/// `ticks` evenly spaced positions from `from` to `to`, both ends included.
pub fn ramp(from: u32, to: u32, ticks: usize) -> impl Iterator<Item = u32> {
    let span = to as i64 - from as i64;
    let steps = ticks.saturating_sub(1).max(1) as i64;
    (0..ticks).map(move |i| (from as i64 + span * i as i64 / steps) as u32)
}
