use serde::Serialize;

/// Events delivered from `SliderSensor::handle_events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SliderEvent {
    /// Filtered position, sent on every pressed tick.
    Position(u32),
    RightSwipe,
    LeftSwipe,
    /// Signed travel between touch-down and release.
    Release(i32),
}

impl SliderEvent {
    /// The int32 payload carried alongside the event kind.
    pub fn data(&self) -> i32 {
        match *self {
            SliderEvent::Position(p) => p.min(i32::MAX as u32) as i32,
            SliderEvent::RightSwipe | SliderEvent::LeftSwipe => 0,
            SliderEvent::Release(d) => d,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SliderEvent::Position(_) => "position",
            SliderEvent::RightSwipe => "right_swipe",
            SliderEvent::LeftSwipe => "left_swipe",
            SliderEvent::Release(_) => "release",
        }
    }
}

/// Receiver of slider events.
///
/// Called synchronously from inside `handle_events`; implementations must
/// not drive the same sensor from here.
pub trait SliderEventHandler {
    fn on_position(&mut self, _position: u32) {}
    fn on_right_swipe(&mut self) {}
    fn on_left_swipe(&mut self) {}
    fn on_release(&mut self, _displacement: i32) {}

    fn on_event(&mut self, event: SliderEvent) {
        match event {
            SliderEvent::Position(p) => self.on_position(p),
            SliderEvent::RightSwipe => self.on_right_swipe(),
            SliderEvent::LeftSwipe => self.on_left_swipe(),
            SliderEvent::Release(d) => self.on_release(d),
        }
    }
}

impl<F: FnMut(SliderEvent)> SliderEventHandler for F {
    fn on_event(&mut self, event: SliderEvent) {
        self(event)
    }
}

/// Handler that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl SliderEventHandler for NoopHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counts {
        positions: u32,
        swipes: u32,
        released: Option<i32>,
    }

    impl SliderEventHandler for Counts {
        fn on_position(&mut self, _: u32) {
            self.positions += 1;
        }
        fn on_right_swipe(&mut self) {
            self.swipes += 1;
        }
        fn on_left_swipe(&mut self) {
            self.swipes += 1;
        }
        fn on_release(&mut self, d: i32) {
            self.released = Some(d);
        }
    }

    #[test]
    fn routes_to_per_event_methods() {
        let mut c = Counts::default();
        for e in [
            SliderEvent::Position(1),
            SliderEvent::Position(2),
            SliderEvent::LeftSwipe,
            SliderEvent::Release(-40),
        ] {
            c.on_event(e);
        }
        assert_eq!((c.positions, c.swipes, c.released), (2, 1, Some(-40)));
    }

    #[test]
    fn closures_are_handlers() {
        let mut seen = Vec::new();
        let mut h = |e: SliderEvent| seen.push(e.data());
        h.on_event(SliderEvent::Position(42));
        h.on_event(SliderEvent::RightSwipe);
        assert_eq!(seen, vec![42, 0]);
    }

    #[test]
    fn serialises_as_tagged_json() {
        let json = serde_json::to_string(&SliderEvent::Release(-12)).unwrap();
        assert_eq!(json, r#"{"event":"release","data":-12}"#);
        let json = serde_json::to_string(&SliderEvent::RightSwipe).unwrap();
        assert_eq!(json, r#"{"event":"right_swipe"}"#);
    }
}
