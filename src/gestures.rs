//! Velocity tracking and edge-triggered swipe classification.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwipeState {
    #[default]
    None,
    Right,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swipe {
    Right,
    Left,
}

#[derive(Debug, Clone)]
pub struct SwipeClassifier {
    threshold: f32,
    hysteresis: f32,
    alpha: f32,
    speed: f32,
    state: SwipeState,
}

impl SwipeClassifier {
    pub fn new(threshold: f32, hysteresis: f32, alpha: f32) -> Self {
        Self {
            threshold,
            hysteresis,
            alpha,
            speed: 0.0,
            state: SwipeState::None,
        }
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn state(&self) -> SwipeState {
        self.state
    }

    pub fn reset(&mut self) {
        self.speed = 0.0;
        self.state = SwipeState::None;
    }

    /// Folds the latest filtered position delta into the smoothed speed.
    ///
    /// Returns a swipe only on the tick the classifier latches into it. A
    /// position of 0 means no centroid yet and leaves everything untouched.
    pub fn update(&mut self, position: u32, previous: u32) -> Option<Swipe> {
        if position == 0 {
            return None;
        }
        let raw = position as i64 - previous as i64;
        self.feed(raw as f32)
    }

    fn feed(&mut self, raw_speed: f32) -> Option<Swipe> {
        self.speed = self.speed * self.alpha + raw_speed * (1.0 - self.alpha);
        let trigger = self.threshold + self.hysteresis;
        let release = self.threshold - self.hysteresis;

        // Right -> Left may happen without passing through None on a hard flick.
        if self.state != SwipeState::Right && self.speed > trigger {
            self.state = SwipeState::Right;
            Some(Swipe::Right)
        } else if self.state != SwipeState::Left && -self.speed > trigger {
            self.state = SwipeState::Left;
            Some(Swipe::Left)
        } else {
            if self.state != SwipeState::None && self.speed.abs() < release {
                self.state = SwipeState::None;
            }
            None
        }
    }
}
