//! Raw capacitive sample sources feeding the Channel FSM.
//!
//! Hardware either pushes a sample set per channel from its interrupt
//! (`PushSampler`) or has to be read on a timer (`PollingSampler`). The FSM
//! only sees `RawChannelSampler` and does not care which.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use log::{debug, warn};

use crate::config::MAX_FREQUENCIES;
use crate::error::{Result, SliderError};

/// One raw reading per sampling frequency for a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub channel: u32,
    pub values: [u32; MAX_FREQUENCIES],
}

impl RawSample {
    pub fn single(channel: u32, value: u32) -> Self {
        let mut values = [0; MAX_FREQUENCIES];
        values[0] = value;
        Self { channel, values }
    }
}

pub trait RawChannelSampler {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    /// Hands every sample that became available since the last call to `sink`.
    fn collect(&mut self, channels: &[u32], sink: &mut dyn FnMut(RawSample)) -> Result<()>;
}

/// Consumer side of a push-fed queue.
#[derive(Debug)]
pub struct PushSampler {
    rx: Receiver<RawSample>,
    running: bool,
}

/// Producer side of a `PushSampler`; cheap to clone into interrupt or
/// reader threads. Never blocks: when the queue is full the sample is dropped.
#[derive(Debug, Clone)]
pub struct SampleFeeder {
    tx: SyncSender<RawSample>,
}

impl PushSampler {
    pub fn new(capacity: usize) -> (Self, SampleFeeder) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        (Self { rx, running: false }, SampleFeeder { tx })
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl SampleFeeder {
    /// Queues a sample; returns false if it was dropped.
    pub fn push(&self, sample: RawSample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(s)) => {
                debug!("sample queue full, dropping channel {}", s.channel);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

impl RawChannelSampler for PushSampler {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn collect(&mut self, channels: &[u32], sink: &mut dyn FnMut(RawSample)) -> Result<()> {
        for sample in self.rx.try_iter() {
            if !self.running {
                continue;
            }
            if channels.contains(&sample.channel) {
                sink(sample);
            } else {
                warn!("sample for unregistered channel {}", sample.channel);
            }
        }
        Ok(())
    }
}

/// Reads every channel through `read` each time it is collected.
pub struct PollingSampler<R> {
    read: R,
}

impl<R> PollingSampler<R>
where
    R: FnMut(u32) -> Result<[u32; MAX_FREQUENCIES]>,
{
    pub fn new(read: R) -> Self {
        Self { read }
    }
}

impl<R> RawChannelSampler for PollingSampler<R>
where
    R: FnMut(u32) -> Result<[u32; MAX_FREQUENCIES]>,
{
    fn collect(&mut self, channels: &[u32], sink: &mut dyn FnMut(RawSample)) -> Result<()> {
        for &channel in channels {
            let values = (self.read)(channel)?;
            sink(RawSample { channel, values });
        }
        Ok(())
    }
}

impl<R> std::fmt::Debug for PollingSampler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingSampler").finish_non_exhaustive()
    }
}

/// Convenience for polling closures that can only fail with a message.
pub fn sampler_error(msg: impl std::fmt::Display) -> SliderError {
    SliderError::Sampler(msg.to_string())
}
