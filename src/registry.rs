//! Owned per-channel state of a slider.

use crate::config::MAX_CHANNELS;
use crate::error::{Result, SliderError};

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    pub id: u32,
    pub threshold: f32,
    pub noise_positive: f32,
    pub noise_negative: f32,
    /// Last untouched reading; only written while the slider is idle.
    pub benchmark: u32,
    pub quantified: f32,
    pub active: bool,
}

/// Validated, owned copy of the caller's channel description.
///
/// Channels keep the caller's order, which is the physical left-to-right
/// order of the pads.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<ChannelState>,
}

impl ChannelRegistry {
    pub fn new(
        channel_ids: &[u32],
        thresholds: &[f32],
        snr_positive: f32,
        snr_negative: f32,
    ) -> Result<Self> {
        let n = channel_ids.len();
        if n < 2 {
            return Err(SliderError::invalid("a slider needs at least 2 channels"));
        }
        if n > MAX_CHANNELS {
            return Err(SliderError::invalid(format!(
                "{n} channels exceeds capacity {MAX_CHANNELS}"
            )));
        }
        if thresholds.len() != n {
            return Err(SliderError::invalid("threshold count does not match channel count"));
        }
        if thresholds.iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(SliderError::invalid("thresholds must be positive"));
        }

        let mut channels = Vec::new();
        channels.try_reserve_exact(n)?;
        for (&id, &threshold) in channel_ids.iter().zip(thresholds) {
            channels.push(ChannelState {
                id,
                threshold,
                noise_positive: threshold / snr_positive,
                noise_negative: threshold / snr_negative,
                benchmark: 0,
                quantified: 0.0,
                active: false,
            });
        }
        Ok(Self { channels })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[ChannelState] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [ChannelState] {
        &mut self.channels
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.channels.iter().map(|c| c.id)
    }

    pub fn index_of(&self, channel_id: u32) -> Result<usize> {
        self.channels
            .iter()
            .position(|c| c.id == channel_id)
            .ok_or(SliderError::NotFound(channel_id))
    }

    pub fn any_active(&self) -> bool {
        self.channels.iter().any(|c| c.active)
    }

    pub fn benchmarks_ready(&self) -> bool {
        self.channels.iter().all(|c| c.benchmark != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_caller_arrays() {
        let mut ids = vec![4, 5, 6];
        let mut th = vec![0.02, 0.04, 0.02];
        let reg = ChannelRegistry::new(&ids, &th, 5.0, 4.0).unwrap();
        ids[0] = 99;
        th[0] = 9.0;

        assert_eq!(reg.len(), 3);
        assert_eq!(reg.channels()[0].id, 4);
        assert_eq!(reg.channels()[0].threshold, 0.02);
        assert!((reg.channels()[1].noise_positive - 0.008).abs() < 1e-6);
        assert!((reg.channels()[1].noise_negative - 0.01).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_channel_lists() {
        assert!(matches!(
            ChannelRegistry::new(&[1], &[0.1], 5.0, 5.0),
            Err(SliderError::InvalidArgument(_))
        ));
        assert!(matches!(
            ChannelRegistry::new(&[], &[], 5.0, 5.0),
            Err(SliderError::InvalidArgument(_))
        ));
        assert!(ChannelRegistry::new(&[1, 2], &[0.1], 5.0, 5.0).is_err());
        assert!(ChannelRegistry::new(&[1, 2], &[0.1, 0.0], 5.0, 5.0).is_err());
        let many: Vec<u32> = (0..=MAX_CHANNELS as u32).collect();
        let th = vec![0.1; many.len()];
        assert!(ChannelRegistry::new(&many, &th, 5.0, 5.0).is_err());
    }

    #[test]
    fn looks_up_channels_by_id() {
        let reg = ChannelRegistry::new(&[7, 3, 9], &[0.1; 3], 5.0, 5.0).unwrap();
        assert_eq!(reg.index_of(3), Ok(1));
        assert_eq!(reg.index_of(8), Err(SliderError::NotFound(8)));
        assert!(!reg.benchmarks_ready());
    }
}
