//! JSON-lines slider traces: one `{"smoothed": [..], "active": [..]}`
//! object per tick, channels in slider order. Blank lines and lines
//! starting with `#` are skipped.
//!
//! The sensor seeds its benchmarks from the first idle tick, so a trace
//! should open with the slider untouched.

use anyhow::{Context, Result};
use serde::Deserialize;
use slidectl::scripted::ScriptedFsm;
use slidectl::{SliderConfig, SliderEvent, SliderSensor};
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TraceFrame {
    pub smoothed: Vec<u32>,
    #[serde(default)]
    pub active: Vec<bool>,
}

pub fn parse_frames<R: BufRead>(reader: R) -> Result<Vec<TraceFrame>> {
    let mut frames = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut frame: TraceFrame = serde_json::from_str(line)
            .with_context(|| format!("trace line {}: malformed frame", i + 1))?;
        if frame.active.is_empty() {
            frame.active = vec![false; frame.smoothed.len()];
        }
        frames.push(frame);
    }
    Ok(frames)
}

/// Feeds every frame through a fresh sensor, one `handle_events` per frame.
/// `on_event` receives the frame index with each event.
pub fn replay(
    config: &SliderConfig,
    frames: &[TraceFrame],
    mut on_event: impl FnMut(u64, SliderEvent),
) -> Result<()> {
    let tick = std::cell::Cell::new(0u64);
    let mut sensor = SliderSensor::create(config, ScriptedFsm::new(0), |e: SliderEvent| {
        on_event(tick.get(), e)
    })?;
    for (i, frame) in frames.iter().enumerate() {
        tick.set(i as u64);
        sensor
            .fsm_mut()
            .set_frame(&frame.smoothed, &frame.active)
            .with_context(|| format!("trace frame {i}"))?;
        sensor.handle_events()?;
    }
    sensor.delete()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SliderConfig {
        let mut cfg = SliderConfig::new(&[0, 1, 2], &[0.02; 3]);
        cfg.position_range = 200;
        cfg.tuning.filter_window_size = 1;
        cfg.tuning.iir_factor = 0;
        cfg
    }

    #[test]
    fn parses_frames_and_skips_comments() {
        let text = "# idle\n{\"smoothed\":[100,100,100]}\n\n{\"smoothed\":[100,110,100],\"active\":[false,true,false]}\n";
        let frames = parse_frames(text.as_bytes()).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].active, vec![false; 3]);
        assert!(frames[1].active[1]);
    }

    #[test]
    fn reports_bad_line_numbers() {
        let err = parse_frames("{\"smoothed\":[1]}\nnot json\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn replays_a_tap_into_events() {
        let idle = TraceFrame {
            smoothed: vec![1_000; 3],
            active: vec![false; 3],
        };
        let touch = TraceFrame {
            smoothed: vec![1_000, 1_000, 1_080],
            active: vec![false, false, true],
        };
        let frames = vec![idle.clone(), touch.clone(), touch, idle];

        let mut seen = Vec::new();
        replay(&config(), &frames, |t, e| seen.push((t, e))).unwrap();
        assert_eq!(
            seen,
            vec![
                (1, SliderEvent::Position(200)),
                (2, SliderEvent::Position(200)),
                (3, SliderEvent::Release(0)),
            ]
        );
    }

    #[test]
    fn frame_width_must_match_channels() {
        let frames = vec![TraceFrame {
            smoothed: vec![1_000; 2],
            active: vec![false; 2],
        }];
        assert!(replay(&config(), &frames, |_, _| {}).is_err());
    }
}
