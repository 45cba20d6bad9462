use anyhow::Result;
use log::info;
use serde_json::Value;
use slidectl::SliderEvent;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    /// One JSON object per event on the output.
    Json,
    /// Events go to the log at `info`.
    Log,
}

/// Where slider events end up.
pub struct EventSink {
    mode: SinkMode,
    out: Box<dyn Write>,
    emitted: u64,
}

impl EventSink {
    pub fn new(mode: SinkMode, out: Box<dyn Write>) -> Self {
        Self {
            mode,
            out,
            emitted: 0,
        }
    }

    pub fn stdout(mode: SinkMode) -> Self {
        Self::new(mode, Box::new(std::io::stdout()))
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn emit(&mut self, tick: u64, event: SliderEvent) -> Result<()> {
        self.emitted += 1;
        match self.mode {
            SinkMode::Log => {
                info!("tick {tick}: {} {}", event.name(), event.data());
                Ok(())
            }
            SinkMode::Json => {
                let mut line = serde_json::to_value(event)?;
                if let Value::Object(map) = &mut line {
                    map.insert("tick".into(), tick.into());
                }
                writeln!(self.out, "{line}")?;
                Ok(())
            }
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
