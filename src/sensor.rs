//! The slider aggregate: owns channel state and filters, borrows or owns a
//! Channel FSM, and turns each `handle_events` tick into slider events.

use std::fmt::Write as _;

use log::{Level, debug, info, log_enabled, warn};

use crate::centroid;
use crate::config::{MAX_CHANNELS, SliderConfig, Tuning};
use crate::error::{Result, SliderError};
use crate::events::{SliderEvent, SliderEventHandler};
use crate::fsm::{ChannelFsm, FsmSettings};
use crate::gestures::{Swipe, SwipeClassifier};
use crate::idle::IdleManager;
use crate::quantify::quantify;
use crate::registry::{ChannelRegistry, ChannelState};
use crate::tracker::PositionFilter;

/// Snapshot returned by `SliderSensor::get_state`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderState {
    pub pressed: bool,
    pub position: u32,
    pub speed: f32,
}

pub struct SliderSensor<F: ChannelFsm, H: SliderEventHandler> {
    registry: ChannelRegistry,
    tuning: Tuning,
    position_range: u32,
    filter: PositionFilter,
    swipe: SwipeClassifier,
    idle: IdleManager,
    fsm: F,
    handler: H,
    pressed: bool,
    start_position: Option<u32>,
    skip_lowlevel_init: bool,
    is_initialized: bool,
}

impl<F: ChannelFsm, H: SliderEventHandler> SliderSensor<F, H> {
    /// Validates `config`, copies everything it needs out of it, configures
    /// `fsm` and (unless `skip_lowlevel_init`) starts its sampler.
    pub fn create(config: &SliderConfig, mut fsm: F, handler: H) -> Result<Self> {
        config.validate()?;
        let registry = ChannelRegistry::new(
            &config.channel_ids,
            &config.thresholds,
            config.tuning.snr_positive,
            config.tuning.snr_negative,
        )?;
        let filter = PositionFilter::new(config.tuning.filter_window_size, config.tuning.iir_factor)?;

        fsm.configure(&FsmSettings {
            channels: registry.channels(),
            gold_values: config.gold_values.as_deref(),
            debounce_active: config.debounce_times,
        })?;
        if !config.skip_lowlevel_init {
            fsm.start_lowlevel()?;
        }

        let mut sensor = Self {
            registry,
            tuning: config.tuning.clone(),
            position_range: config.position_range,
            filter,
            swipe: SwipeClassifier::new(
                config.swipe_threshold,
                config.swipe_hysteresis,
                config.swipe_alpha,
            ),
            idle: IdleManager::new(config.tuning.benchmark_idle_ticks, config.filter_reset_times),
            fsm,
            handler,
            pressed: false,
            start_position: None,
            skip_lowlevel_init: config.skip_lowlevel_init,
            is_initialized: true,
        };
        sensor.seed_benchmarks(config.gold_values.as_deref());
        info!(
            "slider created: {} channels, range {}",
            sensor.registry.len(),
            sensor.position_range
        );
        Ok(sensor)
    }

    /// Stops the sensor. Later calls on it fail with `InvalidState`.
    pub fn delete(&mut self) -> Result<()> {
        if !self.is_initialized {
            return Err(SliderError::InvalidState("sensor not initialized"));
        }
        if !self.skip_lowlevel_init {
            self.fsm.stop_lowlevel();
        }
        self.is_initialized = false;
        self.start_position = None;
        self.pressed = false;
        info!("slider deleted");
        Ok(())
    }

    /// Smoothed reading of `channel_id` as seen by the FSM at `freq_index`.
    pub fn get_data(&self, channel_id: u32, freq_index: usize) -> Result<u32> {
        if freq_index >= self.fsm.frequency_count() {
            return Err(SliderError::invalid(format!(
                "frequency index {freq_index} out of range"
            )));
        }
        self.ensure_initialized()?;
        self.registry.index_of(channel_id)?;
        self.fsm.get_smoothed_value(channel_id, freq_index)
    }

    pub fn get_state(&self) -> SliderState {
        SliderState {
            pressed: self.pressed,
            position: self.filter.position(),
            speed: self.swipe.speed(),
        }
    }

    /// Advances the FSM and the slider by one tick, dispatching events.
    pub fn handle_events(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        for freq in 0..self.fsm.frequency_count() {
            self.fsm.handle_events(freq)?;
        }
        if log_enabled!(Level::Debug) {
            debug!("{}", self.channel_dump());
        }
        self.update_state()
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn channels(&self) -> &[ChannelState] {
        self.registry.channels()
    }

    pub fn fsm(&self) -> &F {
        &self.fsm
    }

    pub fn fsm_mut(&mut self) -> &mut F {
        &mut self.fsm
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized {
            Ok(())
        } else {
            Err(SliderError::InvalidState("sensor not initialized"))
        }
    }

    fn update_state(&mut self) -> Result<()> {
        let was_pressed = self.pressed;
        for ch in self.registry.channels_mut() {
            let active = self.fsm.is_active(ch.id);
            if active != ch.active {
                debug!("channel {} {}", ch.id, if active { "active" } else { "inactive" });
            }
            ch.active = active;
        }
        self.pressed = self.registry.any_active();

        if self.pressed {
            self.idle.touched();
            if !self.registry.benchmarks_ready() {
                if !was_pressed {
                    warn!("touch ignored: channel benchmarks not yet sampled");
                }
                return Ok(());
            }
            self.update_position()?;
            let position = self.filter.position();
            let swipe = self.swipe.update(position, self.filter.last_position());
            if self.start_position.is_none() {
                self.start_position = Some(position);
            }

            self.dispatch(SliderEvent::Position(position));
            match swipe {
                Some(Swipe::Right) => self.dispatch(SliderEvent::RightSwipe),
                Some(Swipe::Left) => self.dispatch(SliderEvent::LeftSwipe),
                None => {}
            }
        } else {
            if let Some(start) = self.start_position.take() {
                let travel = self.filter.position() as i64 - start as i64;
                let travel = travel.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                self.dispatch(SliderEvent::Release(travel));
            }
            let actions = self.idle.idle_tick();
            if actions.reset_filter {
                self.filter.reset();
                self.swipe.reset();
            }
            if actions.refresh_benchmark {
                self.refresh_benchmarks()?;
            }
        }
        Ok(())
    }

    fn update_position(&mut self) -> Result<()> {
        let n = self.registry.len();
        let mut smoothed = [0u32; MAX_CHANNELS];
        for (slot, id) in smoothed.iter_mut().zip(self.registry.ids()) {
            *slot = self.fsm.get_smoothed_value(id, 0)?;
        }
        quantify(
            self.registry.channels_mut(),
            &smoothed[..n],
            self.tuning.lower_clamp_ratio,
        );

        let mut signal = [0f32; MAX_CHANNELS];
        for (slot, ch) in signal.iter_mut().zip(self.registry.channels()) {
            *slot = ch.quantified;
        }
        let raw = centroid::locate(
            &signal[..n],
            self.tuning.centroid_window,
            self.position_range,
            self.filter.position(),
        );
        let filtered = self.filter.update(raw);
        debug!("slider raw {raw} filtered {filtered}");
        Ok(())
    }

    fn seed_benchmarks(&mut self, gold_values: Option<&[u32]>) {
        for (i, ch) in self.registry.channels_mut().iter_mut().enumerate() {
            let seed = match gold_values {
                Some(gold) => gold[i],
                None => self.fsm.get_smoothed_value(ch.id, 0).unwrap_or_else(|e| {
                    debug!("no initial reading for channel {}: {e}", ch.id);
                    0
                }),
            };
            ch.benchmark = seed;
        }
    }

    /// All channels are read before any benchmark changes, so a failed read
    /// leaves the previous set intact.
    fn refresh_benchmarks(&mut self) -> Result<()> {
        let mut fresh = [0u32; MAX_CHANNELS];
        for (slot, id) in fresh.iter_mut().zip(self.registry.ids()) {
            *slot = self.fsm.get_smoothed_value(id, 0)?;
        }
        for (ch, &value) in self.registry.channels_mut().iter_mut().zip(&fresh) {
            if value == 0 {
                warn!("channel {} read 0, keeping benchmark {}", ch.id, ch.benchmark);
                continue;
            }
            ch.benchmark = value;
        }
        Ok(())
    }

    /// One line per tick: `id:smoothed/benchmark` for every channel, `*`
    /// marking active ones.
    fn channel_dump(&self) -> String {
        let mut line = String::from("channels");
        for ch in self.registry.channels() {
            let _ = write!(line, " {}:", ch.id);
            match self.fsm.get_smoothed_value(ch.id, 0) {
                Ok(v) => {
                    let _ = write!(line, "{v}");
                }
                Err(_) => line.push('?'),
            }
            let _ = write!(line, "/{}", ch.benchmark);
            if self.fsm.is_active(ch.id) {
                line.push('*');
            }
        }
        line
    }

    fn dispatch(&mut self, event: SliderEvent) {
        debug!("slider event {event:?}");
        self.handler.on_event(event);
    }
}

impl<F: ChannelFsm, H: SliderEventHandler> Drop for SliderSensor<F, H> {
    fn drop(&mut self) {
        if self.is_initialized && !self.skip_lowlevel_init {
            self.fsm.stop_lowlevel();
        }
    }
}

/// Deletes `handle` if there is one; a missing handle is not an error.
pub fn delete<F: ChannelFsm, H: SliderEventHandler>(
    handle: Option<&mut SliderSensor<F, H>>,
) -> Result<()> {
    match handle {
        Some(sensor) => sensor.delete(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{EventLog, ScriptedFsm};

    const BASE: u32 = 10_000;

    fn config() -> SliderConfig {
        let mut cfg = SliderConfig::new(&[10, 11, 12, 13], &[0.02; 4]);
        cfg.position_range = 300;
        cfg.filter_reset_times = 3;
        cfg.tuning.filter_window_size = 1;
        cfg.tuning.iir_factor = 0;
        cfg.swipe_threshold = 40.0;
        cfg.swipe_hysteresis = 10.0;
        cfg.swipe_alpha = 0.0;
        cfg
    }

    type Sensor = SliderSensor<ScriptedFsm, EventLog>;

    fn sensor() -> Sensor {
        SliderSensor::create(&config(), ScriptedFsm::new(BASE), EventLog::default()).unwrap()
    }

    fn touch(s: &mut Sensor, index: usize, delta: u32) {
        s.fsm_mut().set(10 + index as u32, BASE + delta, true).unwrap();
    }

    fn lift(s: &mut Sensor) {
        s.fsm_mut().release_all(BASE);
    }

    fn take_events(s: &mut Sensor) -> Vec<SliderEvent> {
        s.handler_mut().take()
    }

    #[test]
    fn create_rejects_bad_config() {
        let mut cfg = config();
        cfg.channel_ids.truncate(1);
        cfg.thresholds.truncate(1);
        let r = SliderSensor::create(&cfg, ScriptedFsm::new(BASE), EventLog::default());
        assert!(matches!(r, Err(SliderError::InvalidArgument(_))));
    }

    #[test]
    fn create_starts_and_delete_stops_lowlevel() {
        let mut s = sensor();
        assert!(s.fsm().is_running());
        s.delete().unwrap();
        assert!(!s.fsm().is_running());
        assert_eq!(s.delete(), Err(SliderError::InvalidState("sensor not initialized")));
        assert!(matches!(s.handle_events(), Err(SliderError::InvalidState(_))));
        assert!(matches!(s.get_data(10, 0), Err(SliderError::InvalidState(_))));
        assert_eq!(delete::<ScriptedFsm, EventLog>(None), Ok(()));
    }

    #[test]
    fn dropping_a_live_sensor_stops_lowlevel() {
        let mut fsm = ScriptedFsm::new(BASE);
        {
            let _s = SliderSensor::create(&config(), &mut fsm, EventLog::default()).unwrap();
        }
        assert!(!fsm.is_running());
        assert_eq!(fsm.start_count(), 1);
    }

    #[test]
    fn skip_lowlevel_init_leaves_sampler_alone() {
        let mut cfg = config();
        cfg.skip_lowlevel_init = true;
        let mut s =
            SliderSensor::create(&cfg, ScriptedFsm::new(BASE), EventLog::default()).unwrap();
        assert!(!s.fsm().is_running());
        assert_eq!(s.fsm().start_count(), 0);
        s.delete().unwrap();
    }

    #[test]
    fn get_data_validates_channel_and_frequency() {
        let s = sensor();
        assert_eq!(s.get_data(12, 0), Ok(BASE));
        assert_eq!(s.get_data(99, 0), Err(SliderError::NotFound(99)));
        assert!(matches!(s.get_data(12, 1), Err(SliderError::InvalidArgument(_))));
    }

    #[test]
    fn press_reports_position_and_release_reports_travel() {
        let mut s = sensor();
        s.handle_events().unwrap();
        assert!(take_events(&mut s).is_empty());

        touch(&mut s, 1, 400);
        s.handle_events().unwrap();
        assert_eq!(take_events(&mut s), vec![SliderEvent::Position(100)]);
        assert!(s.get_state().pressed);

        lift(&mut s);
        touch(&mut s, 2, 400);
        s.handle_events().unwrap();
        assert_eq!(
            take_events(&mut s),
            vec![SliderEvent::Position(200), SliderEvent::RightSwipe]
        );

        lift(&mut s);
        s.handle_events().unwrap();
        assert_eq!(take_events(&mut s), vec![SliderEvent::Release(100)]);
        assert!(!s.get_state().pressed);

        s.handle_events().unwrap();
        assert!(take_events(&mut s).is_empty());
    }

    #[test]
    fn noise_dropout_holds_position() {
        let mut s = sensor();
        touch(&mut s, 3, 400);
        s.handle_events().unwrap();
        // still flagged active but the reading fell into the noise floor
        touch(&mut s, 3, 10);
        s.handle_events().unwrap();
        assert_eq!(
            take_events(&mut s),
            vec![SliderEvent::Position(300), SliderEvent::Position(300)]
        );
    }

    #[test]
    fn idle_resets_filter_and_swipe_state() {
        let mut s = sensor();
        touch(&mut s, 1, 400);
        s.handle_events().unwrap();
        lift(&mut s);
        touch(&mut s, 3, 400);
        s.handle_events().unwrap();
        assert_eq!(s.get_state().speed, 200.0);

        lift(&mut s);
        s.handle_events().unwrap();
        s.handle_events().unwrap();
        assert_eq!(s.get_state().position, 300);

        s.handle_events().unwrap();
        assert_eq!(
            s.get_state(),
            SliderState {
                pressed: false,
                position: 0,
                speed: 0.0
            }
        );
    }

    #[test]
    fn benchmarks_track_idle_drift() {
        let mut cfg = config();
        cfg.tuning.benchmark_idle_ticks = 2;
        let mut s =
            SliderSensor::create(&cfg, ScriptedFsm::new(BASE), EventLog::default()).unwrap();
        s.fsm_mut().release_all(BASE + 300);
        s.handle_events().unwrap();
        assert!(s.channels().iter().all(|c| c.benchmark == BASE + 300));

        // a 300 count rise is now just the baseline
        touch(&mut s, 1, 300);
        s.handle_events().unwrap();
        assert_eq!(s.get_state().position, 0);
    }

    #[test]
    fn press_before_benchmarks_is_ignored() {
        let mut s =
            SliderSensor::create(&config(), ScriptedFsm::new(0), EventLog::default()).unwrap();
        s.fsm_mut().set(11, 500, true).unwrap();
        s.handle_events().unwrap();
        assert!(take_events(&mut s).is_empty());
        assert!(s.get_state().pressed);
    }

    #[test]
    fn fsm_errors_are_propagated_unchanged() {
        let mut s = sensor();
        s.fsm_mut().fail_next(SliderError::Fsm("adc stuck".into()));
        assert_eq!(s.handle_events(), Err(SliderError::Fsm("adc stuck".into())));
        assert!(s.handle_events().is_ok());
    }

    #[test]
    fn failed_benchmark_refresh_still_resets_and_commits_nothing() {
        let mut cfg = config();
        cfg.tuning.benchmark_idle_ticks = 3;
        let mut s =
            SliderSensor::create(&cfg, ScriptedFsm::new(BASE), EventLog::default()).unwrap();
        touch(&mut s, 3, 400);
        s.handle_events().unwrap();
        assert_eq!(s.get_state().position, 300);

        s.fsm_mut().release_all(BASE + 200);
        s.fsm_mut().fail_reads(13, SliderError::Fsm("read failed".into()));
        s.handle_events().unwrap();
        s.handle_events().unwrap();
        assert_eq!(s.handle_events(), Err(SliderError::Fsm("read failed".into())));

        assert_eq!(s.get_state().position, 0);
        assert_eq!(s.get_state().speed, 0.0);
        assert!(s.channels().iter().all(|c| c.benchmark == BASE));

        s.fsm_mut().clear_read_failure();
        for _ in 0..3 {
            s.handle_events().unwrap();
        }
        assert!(s.channels().iter().all(|c| c.benchmark == BASE + 200));
    }

    #[test]
    fn channel_dump_lists_readings_and_benchmarks() {
        let mut s = sensor();
        touch(&mut s, 1, 400);
        assert_eq!(
            s.channel_dump(),
            "channels 10:10000/10000 11:10400/10000* 12:10000/10000 13:10000/10000"
        );
        s.fsm_mut().fail_reads(12, SliderError::Fsm("x".into()));
        assert!(s.channel_dump().contains(" 12:?/10000 "));
    }

    #[test]
    fn gold_values_seed_benchmarks() {
        let mut cfg = config();
        cfg.gold_values = Some(vec![9_000, 9_100, 9_200, 9_300]);
        let s = SliderSensor::create(&cfg, ScriptedFsm::new(0), EventLog::default()).unwrap();
        let bcm: Vec<u32> = s.channels().iter().map(|c| c.benchmark).collect();
        assert_eq!(bcm, vec![9_000, 9_100, 9_200, 9_300]);
        assert_eq!(s.fsm().gold_values(), Some(&[9_000, 9_100, 9_200, 9_300][..]));
    }
}
