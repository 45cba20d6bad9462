//! Capacitive touch slider gesture engine.
//!
//! A `SliderSensor` sits on top of a `ChannelFsm` that reports smoothed
//! readings and active flags for a row of touch pads. Each `handle_events`
//! tick turns those into a filtered finger position, swipe gestures and a
//! release displacement, delivered to a `SliderEventHandler`.

pub mod centroid;
pub mod config;
pub mod error;
pub mod events;
pub mod fsm;
pub mod gestures;
pub mod idle;
pub mod input;
pub mod quantify;
pub mod registry;
pub mod scripted;
pub mod sensor;
pub mod simulate;
pub mod tracker;

pub use config::{FsmTuning, MAX_CHANNELS, MAX_FREQUENCIES, SliderConfig, Tuning};
pub use error::{Result, SliderError};
pub use events::{NoopHandler, SliderEvent, SliderEventHandler};
pub use fsm::{ChannelFsm, FsmSettings, SoftwareFsm};
pub use input::{PollingSampler, PushSampler, RawChannelSampler, RawSample, SampleFeeder};
pub use sensor::{SliderSensor, SliderState};
