//! Viewable impression bookkeeping.
//!
//! The tracker is pure state; the ad unit owns the timer and reports back
//! with the generation it was armed for, so a timer armed before the ad left
//! the screen can never fire `viewable`.

use crate::events::AdEvent;
use crate::surface::Visibility;
use std::time::Duration;

/// Share of the surface that has to be on screen
pub const VIEWABLE_RATIO: f64 = 0.5;

/// How long the surface has to stay on screen
pub const VIEWABLE_DURATION: Duration = Duration::from_secs(2);

pub fn is_in_view(visibility: Visibility) -> Option<bool> {
    match visibility {
        Visibility::Ratio(ratio) => Some(ratio >= VIEWABLE_RATIO),
        Visibility::Undetermined => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Observing { in_view: bool },
    Viewable,
    Undetermined,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewAction {
    /// Start a timer of [`VIEWABLE_DURATION`] for this generation
    ArmTimer(u64),
    Fire(AdEvent),
}

#[derive(Debug)]
pub struct ViewableImpressionTracker {
    state: State,
    generation: u64,
}

impl Default for ViewableImpressionTracker {
    fn default() -> Self {
        ViewableImpressionTracker {
            state: State::Observing { in_view: false },
            generation: 0,
        }
    }
}

impl ViewableImpressionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, visibility: Visibility) -> Option<ViewAction> {
        let State::Observing { in_view } = self.state else {
            return None;
        };

        match is_in_view(visibility) {
            None => {
                self.state = State::Undetermined;
                Some(ViewAction::Fire(AdEvent::ViewUndetermined))
            }
            Some(now_in_view) if now_in_view == in_view => None,
            Some(now_in_view) => {
                self.generation += 1;
                self.state = State::Observing { in_view: now_in_view };
                now_in_view.then_some(ViewAction::ArmTimer(self.generation))
            }
        }
    }

    pub fn timer_elapsed(&mut self, generation: u64) -> Option<AdEvent> {
        match self.state {
            State::Observing { in_view: true } if generation == self.generation => {
                self.state = State::Viewable;
                Some(AdEvent::Viewable)
            }
            _ => None,
        }
    }

    /// The unit is done; reports `notViewable` if it never became viewable
    pub fn finish(&mut self) -> Option<AdEvent> {
        let state = std::mem::replace(&mut self.state, State::Done);
        matches!(state, State::Observing { .. }).then_some(AdEvent::NotViewable)
    }

    pub fn is_viewable(&self) -> bool {
        self.state == State::Viewable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_seconds_in_view_is_viewable() {
        let mut tracker = ViewableImpressionTracker::new();

        assert_eq!(tracker.observe(Visibility::Ratio(0.8)), Some(ViewAction::ArmTimer(1)));
        assert_eq!(tracker.observe(Visibility::Ratio(0.9)), None);
        assert_eq!(tracker.timer_elapsed(1), Some(AdEvent::Viewable));
        assert!(tracker.is_viewable());
        assert_eq!(tracker.finish(), None);
    }

    #[test]
    fn leaving_the_screen_disarms_the_timer() {
        let mut tracker = ViewableImpressionTracker::new();

        tracker.observe(Visibility::Ratio(0.6));
        assert_eq!(tracker.observe(Visibility::Ratio(0.3)), None);
        assert_eq!(tracker.timer_elapsed(1), None);

        assert_eq!(tracker.observe(Visibility::Ratio(0.5)), Some(ViewAction::ArmTimer(3)));
        assert_eq!(tracker.timer_elapsed(1), None);
        assert_eq!(tracker.finish(), Some(AdEvent::NotViewable));
        assert_eq!(tracker.finish(), None);
    }

    #[test]
    fn undetermined_fires_once_and_sticks() {
        let mut tracker = ViewableImpressionTracker::new();

        assert_eq!(
            tracker.observe(Visibility::Undetermined),
            Some(ViewAction::Fire(AdEvent::ViewUndetermined))
        );
        assert_eq!(tracker.observe(Visibility::Undetermined), None);
        assert_eq!(tracker.observe(Visibility::Ratio(1.0)), None);
        assert_eq!(tracker.finish(), None);
    }
}
