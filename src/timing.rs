//! Time budgets and VAST time offsets.

use std::time::Duration;
use tokio::time::Instant;

/// An absolute point in time by which an ad has to be playing
///
/// Threaded through every wrapper hop and waterfall attempt; each stage asks
/// for what is left instead of subtracting its own cost from a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never expires
    pub fn unbounded() -> Self {
        Deadline(None)
    }

    pub fn after(budget: Duration) -> Self {
        Deadline(Some(Instant::now() + budget))
    }

    /// Optional millisecond budget, as found in options
    pub fn from_millis(budget: Option<u64>) -> Self {
        budget.map_or_else(Self::unbounded, |ms| Self::after(Duration::from_millis(ms)))
    }

    /// Time left, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Whichever of the two expires first
    pub fn earliest(self, other: Deadline) -> Deadline {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Deadline(Some(a.min(b))),
            (a, b) => Deadline(a.or(b)),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// A VAST offset: `HH:MM:SS(.mmm)` or `NN%`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Offset {
    Seconds(f64),
    Percent(f64),
}

impl Offset {
    pub fn parse(value: &str) -> Option<Offset> {
        let value = value.trim();
        if let Some(percent) = value.strip_suffix('%') {
            return percent
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|pct| (0.0..=100.0).contains(pct))
                .map(Offset::Percent);
        }
        parse_clock(value).map(Offset::Seconds)
    }

    /// Resolve against a duration in seconds; percentages need a known duration
    pub fn seconds(&self, duration: Option<f64>) -> Option<f64> {
        match *self {
            Offset::Seconds(seconds) => Some(seconds),
            Offset::Percent(pct) => duration
                .filter(|duration| duration.is_finite() && *duration > 0.0)
                .map(|duration| duration * pct / 100.0),
        }
    }
}

/// Parse `HH:MM:SS` or `HH:MM:SS.mmm` into seconds
pub fn parse_clock(value: &str) -> Option<f64> {
    let mut parts = value.trim().split(':');
    let hours = parts.next()?.parse::<u64>().ok()?;
    let minutes = parts.next()?.parse::<u64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some((hours * 3600 + minutes * 60) as f64 + seconds)
}

/// Format seconds as `HH:MM:SS.mmm` for the `[CONTENTPLAYHEAD]` macro
pub fn format_clock(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clock_offsets() {
        assert_eq!(parse_clock("00:00:05"), Some(5.0));
        assert_eq!(parse_clock("01:02:03.500"), Some(3723.5));
        assert_eq!(parse_clock("00:61:00"), None);
        assert_eq!(parse_clock("5"), None);
    }

    #[test]
    fn resolves_percentages_against_duration() {
        let offset = Offset::parse("25%").unwrap();
        assert_eq!(offset, Offset::Percent(25.0));
        assert_eq!(offset.seconds(Some(40.0)), Some(10.0));
        assert_eq!(offset.seconds(None), None);
        assert_eq!(Offset::parse("150%"), None);
        assert_eq!(Offset::parse("00:00:10").unwrap().seconds(None), Some(10.0));
    }

    #[test]
    fn formats_playhead() {
        assert_eq!(format_clock(3723.5), "01:02:03.500");
        assert_eq!(format_clock(-1.0), "00:00:00.000");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_counts_down_with_the_clock() {
        let deadline = Deadline::after(Duration::from_millis(1000));
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(deadline.remaining(), Some(Duration::from_millis(600)));

        tokio::time::advance(Duration::from_millis(700)).await;
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
        assert_eq!(Deadline::unbounded().remaining(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn earliest_of_two_budgets_wins() {
        let shared = Deadline::after(Duration::from_millis(3000));
        let stage = Deadline::after(Duration::from_millis(1000));

        assert_eq!(shared.earliest(stage), stage);
        assert_eq!(stage.earliest(shared), stage);
        assert_eq!(Deadline::unbounded().earliest(shared), shared);
        assert_eq!(Deadline::unbounded().earliest(Deadline::unbounded()), Deadline::unbounded());
    }
}
