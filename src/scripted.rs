//! A Channel FSM whose readings are set directly by the caller.
//!
//! Drives trace replay and synthetic runs, where smoothed values and active
//! flags are already known, and doubles as the FSM in tests.

use crate::config::MAX_FREQUENCIES;
use crate::error::{Result, SliderError};
use crate::events::{SliderEvent, SliderEventHandler};
use crate::fsm::{ChannelFsm, FsmSettings};

#[derive(Debug, Clone)]
pub struct ScriptedFsm {
    initial: u32,
    frequencies: usize,
    ids: Vec<u32>,
    smoothed: Vec<u32>,
    active: Vec<bool>,
    gold_values: Option<Vec<u32>>,
    running: bool,
    start_count: u32,
    fail_next: Option<SliderError>,
    fail_reads: Option<(u32, SliderError)>,
}

impl ScriptedFsm {
    /// Every channel reads `initial` and is inactive until told otherwise.
    pub fn new(initial: u32) -> Self {
        Self {
            initial,
            frequencies: 1,
            ids: Vec::new(),
            smoothed: Vec::new(),
            active: Vec::new(),
            gold_values: None,
            running: false,
            start_count: 0,
            fail_next: None,
            fail_reads: None,
        }
    }

    pub fn with_frequencies(mut self, frequencies: usize) -> Self {
        self.frequencies = frequencies.clamp(1, MAX_FREQUENCIES);
        self
    }

    pub fn set(&mut self, channel: u32, smoothed: u32, active: bool) -> Result<()> {
        let i = self.index(channel)?;
        self.smoothed[i] = smoothed;
        self.active[i] = active;
        Ok(())
    }

    /// Replaces every channel's reading at once, in channel order.
    pub fn set_frame(&mut self, smoothed: &[u32], active: &[bool]) -> Result<()> {
        if smoothed.len() != self.ids.len() || active.len() != self.ids.len() {
            return Err(SliderError::invalid(format!(
                "frame has {}/{} values for {} channels",
                smoothed.len(),
                active.len(),
                self.ids.len()
            )));
        }
        self.smoothed.copy_from_slice(smoothed);
        self.active.copy_from_slice(active);
        Ok(())
    }

    pub fn release_all(&mut self, smoothed: u32) {
        self.smoothed.fill(smoothed);
        self.active.fill(false);
    }

    /// Makes the next `handle_events` call fail with `err`.
    pub fn fail_next(&mut self, err: SliderError) {
        self.fail_next = Some(err);
    }

    /// Makes every read of `channel` fail with `err` until cleared.
    pub fn fail_reads(&mut self, channel: u32, err: SliderError) {
        self.fail_reads = Some((channel, err));
    }

    pub fn clear_read_failure(&mut self) {
        self.fail_reads = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start_count(&self) -> u32 {
        self.start_count
    }

    pub fn gold_values(&self) -> Option<&[u32]> {
        self.gold_values.as_deref()
    }

    pub fn channel_ids(&self) -> &[u32] {
        &self.ids
    }

    fn index(&self, channel: u32) -> Result<usize> {
        self.ids
            .iter()
            .position(|&id| id == channel)
            .ok_or(SliderError::NotFound(channel))
    }
}

impl ChannelFsm for ScriptedFsm {
    fn configure(&mut self, settings: &FsmSettings<'_>) -> Result<()> {
        let n = settings.channels.len();
        self.ids = settings.channels.iter().map(|c| c.id).collect();
        self.smoothed = vec![self.initial; n];
        self.active = vec![false; n];
        self.gold_values = settings.gold_values.map(<[u32]>::to_vec);
        Ok(())
    }

    fn start_lowlevel(&mut self) -> Result<()> {
        self.running = true;
        self.start_count += 1;
        Ok(())
    }

    fn stop_lowlevel(&mut self) {
        self.running = false;
    }

    fn frequency_count(&self) -> usize {
        self.frequencies
    }

    fn handle_events(&mut self, freq_index: usize) -> Result<()> {
        if freq_index >= self.frequencies {
            return Err(SliderError::invalid("frequency index out of range"));
        }
        match self.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn get_smoothed_value(&self, channel: u32, freq_index: usize) -> Result<u32> {
        if freq_index >= self.frequencies {
            return Err(SliderError::invalid("frequency index out of range"));
        }
        if let Some((failing, err)) = &self.fail_reads {
            if *failing == channel {
                return Err(err.clone());
            }
        }
        Ok(self.smoothed[self.index(channel)?])
    }

    fn is_active(&self, channel: u32) -> bool {
        self.index(channel).map(|i| self.active[i]).unwrap_or(false)
    }
}

/// Handler that keeps every event it receives.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<SliderEvent>,
}

impl EventLog {
    pub fn events(&self) -> &[SliderEvent] {
        &self.events
    }

    pub fn take(&mut self) -> Vec<SliderEvent> {
        std::mem::take(&mut self.events)
    }
}

impl SliderEventHandler for EventLog {
    fn on_event(&mut self, event: SliderEvent) {
        self.events.push(event);
    }
}
