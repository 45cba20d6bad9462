//! Cross-channel signal normalisation.
//!
//! Pads of different sizes see different raw deltas for the same finger.
//! Each channel's change over its benchmark is expressed in units of its own
//! threshold, then scaled by `Σthreshold / threshold` so every channel lands
//! on a comparable scale before the centroid search.

use crate::registry::ChannelState;

/// Writes the quantified signal of every channel from its smoothed reading.
///
/// # Panics
///
/// Panics if a benchmark is zero. The sensor never calls this before all
/// benchmarks are seeded.
pub fn quantify(channels: &mut [ChannelState], smoothed: &[u32], lower_clamp_ratio: f32) {
    debug_assert_eq!(channels.len(), smoothed.len());

    let weight_sum: f32 = channels.iter().map(|c| c.threshold).sum();
    for (ch, &reading) in channels.iter_mut().zip(smoothed) {
        assert!(ch.benchmark != 0, "channel {} has no benchmark", ch.id);
        let diff = reading as i64 - ch.benchmark as i64;
        let diff_rate = diff as f32 / ch.benchmark as f32;
        let mut q = diff_rate / ch.threshold;
        if q < lower_clamp_ratio {
            q = 0.0;
        }
        ch.quantified = q * weight_sum / ch.threshold;
    }
}
