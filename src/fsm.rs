//! Channel FSM: turns raw counts into smoothed readings and debounced
//! active flags.
//!
//! The slider engine only depends on the `ChannelFsm` trait. `SoftwareFsm`
//! is a host-side implementation over any `RawChannelSampler`.

use log::{debug, info};

use crate::config::{FsmTuning, MAX_FREQUENCIES};
use crate::error::{Result, SliderError};
use crate::input::{RawChannelSampler, RawSample};
use crate::registry::ChannelState;

/// What the slider tells its FSM at creation time.
#[derive(Debug, Clone, Copy)]
pub struct FsmSettings<'a> {
    /// Ids, thresholds and noise margins of every channel.
    pub channels: &'a [ChannelState],
    pub gold_values: Option<&'a [u32]>,
    pub debounce_active: u32,
}

pub trait ChannelFsm {
    fn configure(&mut self, settings: &FsmSettings<'_>) -> Result<()>;

    /// Starts the raw sampling hardware behind this FSM.
    fn start_lowlevel(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop_lowlevel(&mut self) {}

    fn frequency_count(&self) -> usize;

    /// Processes pending samples for one sampling frequency.
    fn handle_events(&mut self, freq_index: usize) -> Result<()>;

    fn get_smoothed_value(&self, channel: u32, freq_index: usize) -> Result<u32>;

    fn is_active(&self, channel: u32) -> bool;
}

/// Lets a sensor borrow an FSM that outlives it.
impl<T: ChannelFsm + ?Sized> ChannelFsm for &mut T {
    fn configure(&mut self, settings: &FsmSettings<'_>) -> Result<()> {
        (**self).configure(settings)
    }
    fn start_lowlevel(&mut self) -> Result<()> {
        (**self).start_lowlevel()
    }
    fn stop_lowlevel(&mut self) {
        (**self).stop_lowlevel()
    }
    fn frequency_count(&self) -> usize {
        (**self).frequency_count()
    }
    fn handle_events(&mut self, freq_index: usize) -> Result<()> {
        (**self).handle_events(freq_index)
    }
    fn get_smoothed_value(&self, channel: u32, freq_index: usize) -> Result<u32> {
        (**self).get_smoothed_value(channel, freq_index)
    }
    fn is_active(&self, channel: u32) -> bool {
        (**self).is_active(channel)
    }
}

impl<T: ChannelFsm + ?Sized> ChannelFsm for Box<T> {
    fn configure(&mut self, settings: &FsmSettings<'_>) -> Result<()> {
        (**self).configure(settings)
    }
    fn start_lowlevel(&mut self) -> Result<()> {
        (**self).start_lowlevel()
    }
    fn stop_lowlevel(&mut self) {
        (**self).stop_lowlevel()
    }
    fn frequency_count(&self) -> usize {
        (**self).frequency_count()
    }
    fn handle_events(&mut self, freq_index: usize) -> Result<()> {
        (**self).handle_events(freq_index)
    }
    fn get_smoothed_value(&self, channel: u32, freq_index: usize) -> Result<u32> {
        (**self).get_smoothed_value(channel, freq_index)
    }
    fn is_active(&self, channel: u32) -> bool {
        (**self).is_active(channel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Calibrating,
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy)]
struct FreqTrack {
    pending: Option<u32>,
    smooth: f32,
    baseline: f32,
    calib_sum: f64,
    calib_count: u32,
    debounce: u32,
    state: TrackState,
}

impl FreqTrack {
    fn new(gold: Option<u32>) -> Self {
        let (baseline, state) = match gold {
            Some(g) if g > 0 => (g as f32, TrackState::Idle),
            _ => (0.0, TrackState::Calibrating),
        };
        Self {
            pending: None,
            smooth: 0.0,
            baseline,
            calib_sum: 0.0,
            calib_count: 0,
            debounce: 0,
            state,
        }
    }
}

#[derive(Debug, Clone)]
struct ChannelTrack {
    id: u32,
    threshold: f32,
    noise_positive: f32,
    noise_negative: f32,
    seen: [bool; MAX_FREQUENCIES],
    freqs: [FreqTrack; MAX_FREQUENCIES],
}

#[derive(Debug)]
pub struct SoftwareFsm<S> {
    sampler: S,
    tuning: FsmTuning,
    pending_tuning: Option<FsmTuning>,
    debounce_active: u32,
    ids: Vec<u32>,
    channels: Vec<ChannelTrack>,
}

impl<S: RawChannelSampler> SoftwareFsm<S> {
    pub fn new(sampler: S, tuning: FsmTuning) -> Self {
        Self {
            sampler,
            tuning,
            pending_tuning: None,
            debounce_active: 1,
            ids: Vec::new(),
            channels: Vec::new(),
        }
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Replaces the tunables. Takes effect at the next `configure`.
    pub fn set_tuning(&mut self, tuning: FsmTuning) -> Result<()> {
        tuning.validate()?;
        self.pending_tuning = Some(tuning);
        Ok(())
    }

    /// Current baseline of `channel` at `freq_index`, once calibrated.
    pub fn baseline(&self, channel: u32, freq_index: usize) -> Option<u32> {
        let track = self.channels.iter().find(|c| c.id == channel)?;
        let f = track.freqs.get(freq_index)?;
        (f.state != TrackState::Calibrating).then(|| f.baseline.round() as u32)
    }

    fn track(&self, channel: u32) -> Result<&ChannelTrack> {
        self.channels
            .iter()
            .find(|c| c.id == channel)
            .ok_or(SliderError::NotFound(channel))
    }

    fn check_freq(&self, freq_index: usize) -> Result<()> {
        if freq_index >= self.tuning.frequencies {
            return Err(SliderError::invalid(format!(
                "frequency index {freq_index} out of range (have {})",
                self.tuning.frequencies
            )));
        }
        Ok(())
    }

    fn collect_pending(&mut self) -> Result<()> {
        let channels = &mut self.channels;
        self.sampler.collect(&self.ids, &mut |sample: RawSample| {
            if let Some(track) = channels.iter_mut().find(|c| c.id == sample.channel) {
                for (f, value) in track.freqs.iter_mut().zip(sample.values) {
                    f.pending = Some(value);
                }
            }
        })
    }
}

fn step(track: &mut ChannelTrack, freq_index: usize, tuning: &FsmTuning, debounce_active: u32) {
    let first = !track.seen[freq_index];
    let threshold = track.threshold;
    let (noise_p, noise_n) = (track.noise_positive, track.noise_negative);
    let id = track.id;
    let f = &mut track.freqs[freq_index];
    let Some(raw) = f.pending.take() else {
        return;
    };
    track.seen[freq_index] = true;

    let raw = raw as f32;
    f.smooth = if first {
        raw
    } else {
        f.smooth + (raw - f.smooth) * tuning.smooth_coef
    };

    if f.state == TrackState::Calibrating {
        f.calib_sum += f.smooth as f64;
        f.calib_count += 1;
        if f.calib_count >= tuning.calibration_times.max(1) {
            f.baseline = (f.calib_sum / f.calib_count as f64) as f32;
            f.state = TrackState::Idle;
            debug!("channel {id} freq {freq_index} calibrated at {}", f.baseline);
        }
        return;
    }
    if f.baseline <= 0.0 {
        return;
    }

    let mut ratio = (f.smooth - f.baseline) / f.baseline;
    if tuning.active_low {
        ratio = -ratio;
    }

    match f.state {
        TrackState::Idle => {
            if ratio > threshold {
                f.debounce += 1;
                if f.debounce >= debounce_active.max(1) {
                    f.debounce = 0;
                    f.state = TrackState::Active;
                    debug!("channel {id} freq {freq_index} active (ratio {ratio:.4})");
                }
            } else {
                f.debounce = 0;
                if ratio <= noise_p && ratio >= -noise_n {
                    f.baseline += (f.smooth - f.baseline) * tuning.baseline_coef;
                }
            }
        }
        TrackState::Active => {
            if ratio < threshold * (1.0 - tuning.hysteresis) {
                f.debounce += 1;
                if f.debounce >= tuning.debounce_inactive.max(1) {
                    f.debounce = 0;
                    f.state = TrackState::Idle;
                    debug!("channel {id} freq {freq_index} inactive (ratio {ratio:.4})");
                }
            } else {
                f.debounce = 0;
            }
        }
        TrackState::Calibrating => {}
    }
}

impl<S: RawChannelSampler> ChannelFsm for SoftwareFsm<S> {
    fn configure(&mut self, settings: &FsmSettings<'_>) -> Result<()> {
        if let Some(tuning) = self.pending_tuning.take() {
            self.tuning = tuning;
        }
        self.tuning.validate()?;
        let n = settings.channels.len();
        if let Some(gold) = settings.gold_values {
            if gold.len() != n {
                return Err(SliderError::invalid("gold value count does not match channels"));
            }
        }
        let mut ids = Vec::new();
        ids.try_reserve_exact(n)?;
        let mut channels = Vec::new();
        channels.try_reserve_exact(n)?;
        for (i, ch) in settings.channels.iter().enumerate() {
            let gold = settings.gold_values.map(|g| g[i]);
            ids.push(ch.id);
            channels.push(ChannelTrack {
                id: ch.id,
                threshold: ch.threshold,
                noise_positive: ch.noise_positive,
                noise_negative: ch.noise_negative,
                seen: [false; MAX_FREQUENCIES],
                freqs: [FreqTrack::new(gold); MAX_FREQUENCIES],
            });
        }
        self.ids = ids;
        self.channels = channels;
        self.debounce_active = settings.debounce_active;
        info!(
            "software fsm configured for {n} channels at {} frequencies",
            self.tuning.frequencies
        );
        Ok(())
    }

    fn start_lowlevel(&mut self) -> Result<()> {
        self.sampler.start()
    }

    fn stop_lowlevel(&mut self) {
        self.sampler.stop();
    }

    fn frequency_count(&self) -> usize {
        self.tuning.frequencies
    }

    fn handle_events(&mut self, freq_index: usize) -> Result<()> {
        self.check_freq(freq_index)?;
        if freq_index == 0 {
            self.collect_pending()?;
        }
        let (tuning, debounce_active) = (&self.tuning, self.debounce_active);
        for track in &mut self.channels {
            step(track, freq_index, tuning, debounce_active);
        }
        Ok(())
    }

    fn get_smoothed_value(&self, channel: u32, freq_index: usize) -> Result<u32> {
        self.check_freq(freq_index)?;
        let track = self.track(channel)?;
        Ok(track.freqs[freq_index].smooth.max(0.0).round() as u32)
    }

    fn is_active(&self, channel: u32) -> bool {
        self.track(channel)
            .map(|t| t.freqs[0].state == TrackState::Active)
            .unwrap_or(false)
    }
}
