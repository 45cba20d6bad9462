//! Runtime configuration for a slider sensor.
//!
//! Everything that used to be a build-time knob is a field here with a
//! documented default, so a TOML profile only has to name what it changes.

use serde::Deserialize;

use crate::error::{Result, SliderError};

/// Upper bound on channels a single slider may own.
pub const MAX_CHANNELS: usize = 14;
/// Upper bound on sampling frequencies a Channel FSM may expose.
pub const MAX_FREQUENCIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SliderConfig {
    /// Channel IDs ordered left to right along the slider.
    pub channel_ids: Vec<u32>,
    /// Per-channel activation threshold, as a fraction of the benchmark.
    pub thresholds: Vec<f32>,
    /// Optional factory-calibrated untouched readings, one per channel.
    pub gold_values: Option<Vec<u32>>,
    /// Consecutive over-threshold samples before a channel turns active.
    pub debounce_times: u32,
    /// Idle ticks before the position filter is reseeded.
    pub filter_reset_times: u32,
    /// Position reported at the far end of the slider.
    pub position_range: u32,
    pub swipe_threshold: f32,
    pub swipe_hysteresis: f32,
    /// Speed smoothing factor in `[0, 1)`; higher is smoother.
    pub swipe_alpha: f32,
    /// Leave raw sampler start/stop to the caller.
    pub skip_lowlevel_init: bool,
    pub tuning: Tuning,
    pub fsm: FsmTuning,
}

impl Default for SliderConfig {
    fn default() -> Self {
        Self {
            channel_ids: Vec::new(),
            thresholds: Vec::new(),
            gold_values: None,
            debounce_times: 2,
            filter_reset_times: 5,
            position_range: 10_000,
            swipe_threshold: 50.0,
            swipe_hysteresis: 40.0,
            swipe_alpha: 0.9,
            skip_lowlevel_init: false,
            tuning: Tuning::default(),
            fsm: FsmTuning::default(),
        }
    }
}

/// Signal-processing tunables of the gesture engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Moving-average window length.
    pub filter_window_size: usize,
    /// IIR divisor `k`; 0 disables the stage.
    pub iir_factor: u32,
    /// Threshold-to-noise ratio for the positive noise margin.
    pub snr_positive: f32,
    /// Threshold-to-noise ratio for the negative noise margin.
    pub snr_negative: f32,
    /// Quantified values below this are treated as no signal.
    pub lower_clamp_ratio: f32,
    /// Idle ticks between benchmark refreshes.
    pub benchmark_idle_ticks: u32,
    /// Width of the sliding window used to find the touched channels.
    pub centroid_window: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            filter_window_size: 10,
            iir_factor: 2,
            snr_positive: 5.0,
            snr_negative: 5.0,
            lower_clamp_ratio: 0.3,
            benchmark_idle_ticks: 25,
            centroid_window: 2,
        }
    }
}

/// Tunables for the reference software Channel FSM.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FsmTuning {
    pub frequencies: usize,
    pub smooth_coef: f32,
    pub baseline_coef: f32,
    pub calibration_times: u32,
    pub debounce_inactive: u32,
    /// Release happens below `threshold * (1 - hysteresis)`.
    pub hysteresis: f32,
    /// Touch lowers the raw count instead of raising it.
    pub active_low: bool,
}

impl Default for FsmTuning {
    fn default() -> Self {
        Self {
            frequencies: 1,
            smooth_coef: 0.5,
            baseline_coef: 0.05,
            calibration_times: 10,
            debounce_inactive: 1,
            hysteresis: 0.1,
            active_low: false,
        }
    }
}

impl SliderConfig {
    pub fn new(channel_ids: &[u32], thresholds: &[f32]) -> Self {
        Self {
            channel_ids: channel_ids.to_vec(),
            thresholds: thresholds.to_vec(),
            ..Self::default()
        }
    }

    pub fn channel_num(&self) -> usize {
        self.channel_ids.len()
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.channel_num();
        if n < 2 {
            return Err(SliderError::invalid(format!(
                "a slider needs at least 2 channels, got {n}"
            )));
        }
        if n > MAX_CHANNELS {
            return Err(SliderError::invalid(format!(
                "{n} channels exceeds the supported maximum of {MAX_CHANNELS}"
            )));
        }
        if self.thresholds.len() != n {
            return Err(SliderError::invalid(format!(
                "expected {n} thresholds, got {}",
                self.thresholds.len()
            )));
        }
        if let Some(i) = self
            .thresholds
            .iter()
            .position(|t| !t.is_finite() || *t <= 0.0)
        {
            return Err(SliderError::invalid(format!(
                "threshold of channel {} must be positive, got {}",
                self.channel_ids[i], self.thresholds[i]
            )));
        }
        if let Some(gold) = &self.gold_values {
            if gold.len() != n {
                return Err(SliderError::invalid(format!(
                    "expected {n} gold values, got {}",
                    gold.len()
                )));
            }
        }
        for (i, id) in self.channel_ids.iter().enumerate() {
            if self.channel_ids[..i].contains(id) {
                return Err(SliderError::invalid(format!("duplicate channel id {id}")));
            }
        }
        if self.position_range == 0 {
            return Err(SliderError::invalid("position_range must be positive"));
        }
        if !(0.0..1.0).contains(&self.swipe_alpha) {
            return Err(SliderError::invalid("swipe_alpha must be in [0, 1)"));
        }
        if !self.swipe_threshold.is_finite() || !self.swipe_hysteresis.is_finite() {
            return Err(SliderError::invalid("swipe threshold/hysteresis must be finite"));
        }
        if self.swipe_hysteresis < 0.0 {
            return Err(SliderError::invalid("swipe_hysteresis must not be negative"));
        }
        self.tuning.validate(n)?;
        self.fsm.validate()
    }
}

impl Tuning {
    fn validate(&self, channel_num: usize) -> Result<()> {
        if self.filter_window_size == 0 {
            return Err(SliderError::invalid("filter_window_size must be at least 1"));
        }
        if self.centroid_window == 0 || self.centroid_window > channel_num {
            return Err(SliderError::invalid(format!(
                "centroid_window must be in 1..={channel_num}, got {}",
                self.centroid_window
            )));
        }
        if self.snr_positive <= 0.0 || self.snr_negative <= 0.0 {
            return Err(SliderError::invalid("noise SNRs must be positive"));
        }
        if !self.lower_clamp_ratio.is_finite() || self.lower_clamp_ratio < 0.0 {
            return Err(SliderError::invalid("lower_clamp_ratio must not be negative"));
        }
        Ok(())
    }
}

impl FsmTuning {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.frequencies == 0 || self.frequencies > MAX_FREQUENCIES {
            return Err(SliderError::invalid(format!(
                "frequencies must be in 1..={MAX_FREQUENCIES}, got {}",
                self.frequencies
            )));
        }
        if !(0.0..=1.0).contains(&self.smooth_coef) || !(0.0..=1.0).contains(&self.baseline_coef) {
            return Err(SliderError::invalid("fsm coefficients must be in [0, 1]"));
        }
        if !(0.0..1.0).contains(&self.hysteresis) {
            return Err(SliderError::invalid("fsm hysteresis must be in [0, 1)"));
        }
        Ok(())
    }
}
