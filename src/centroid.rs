//! Touch centroid from the quantified channel signals.

/// The highest-energy run of adjacent channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: usize,
    pub width: usize,
    pub sum: f32,
    /// Channels inside the window carrying any signal.
    pub non_zero: usize,
}

/// Finds the `width`-wide window with the largest sum. The leftmost window
/// wins ties, and an all-zero array yields the window at index 0.
pub fn search_max_window(signal: &[f32], width: usize) -> Window {
    let width = width.clamp(1, signal.len().max(1));
    let mut start = 0;
    let mut best = 0.0f32;
    for (s, w) in signal.windows(width).enumerate() {
        let sum: f32 = w.iter().sum();
        if sum > best {
            best = sum;
            start = s;
        }
    }
    let non_zero = signal
        .iter()
        .skip(start)
        .take(width)
        .filter(|v| **v > 0.0)
        .count();
    Window {
        start,
        width,
        sum: best,
        non_zero,
    }
}

/// Maps the winning window to a position in `[0, position_range]`.
///
/// With no signal in the window the previous position is held.
pub fn locate(signal: &[f32], width: usize, position_range: u32, previous: u32) -> u32 {
    let last = signal.len().saturating_sub(1);
    if last == 0 {
        return previous;
    }
    let scale = position_range as f32 / last as f32;
    let window = search_max_window(signal, width);
    let span = window.start..window.start + window.width;

    match window.non_zero {
        0 => previous,
        1 => {
            let idx = signal[span.clone()]
                .iter()
                .position(|v| *v > 0.0)
                .map_or(window.start, |i| window.start + i);
            if idx == last {
                position_range
            } else {
                ((idx as f32 * scale) as u32).min(position_range)
            }
        }
        _ => {
            let moment: f32 = span.map(|i| i as f32 * signal[i]).sum();
            ((moment * scale / window.sum) as u32).min(position_range)
        }
    }
}
