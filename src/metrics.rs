//! Turns native video notifications into ad events.

use crate::events::AdEvent;
use crate::surface::SurfaceEvent;
use crate::timing::Offset;

/// Moving back at least this far counts as a rewind, in seconds
const REWIND_THRESHOLD: f64 = 1.0;

const QUARTILES: [(f64, AdEvent); 4] = [
    (0.25, AdEvent::FirstQuartile),
    (0.5, AdEvent::Midpoint),
    (0.75, AdEvent::ThirdQuartile),
    (0.99, AdEvent::Complete),
];

/// What the unit should do after a surface event
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Event(AdEvent),
    /// Playback passed the skip offset
    SkipAvailable,
    MediaError(String),
}

/// Playback bookkeeping of a native ad
#[derive(Debug)]
pub struct PlaybackMetrics {
    skip_offset: Option<Offset>,
    progress: Vec<(Offset, bool)>,
    quartiles: [bool; 4],
    started: bool,
    paused: bool,
    muted: bool,
    fullscreen: bool,
    skippable: bool,
    completed: bool,
    last_time: f64,
    duration: Option<f64>,
}

impl PlaybackMetrics {
    pub fn new(skip_offset: Option<Offset>, progress: Vec<Offset>, muted: bool) -> Self {
        PlaybackMetrics {
            skip_offset,
            progress: progress.into_iter().map(|offset| (offset, false)).collect(),
            quartiles: [false; 4],
            started: false,
            paused: false,
            muted,
            fullscreen: false,
            skippable: false,
            completed: false,
            last_time: 0.0,
            duration: None,
        }
    }

    pub fn is_skippable(&self) -> bool {
        self.skippable
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// The last playback position seen, in seconds
    pub fn current_time(&self) -> f64 {
        self.last_time
    }

    pub fn observe(&mut self, event: &SurfaceEvent) -> Vec<Signal> {
        let mut signals = Vec::new();

        match event {
            SurfaceEvent::TimeUpdate { current_time, duration } => {
                self.time_update(*current_time, *duration, &mut signals);
            }
            SurfaceEvent::Play if self.started && self.paused => {
                self.paused = false;
                signals.push(Signal::Event(AdEvent::Resume));
            }
            SurfaceEvent::Pause if self.started && !self.paused && !self.completed => {
                self.paused = true;
                signals.push(Signal::Event(AdEvent::Pause));
            }
            SurfaceEvent::Ended => self.complete(&mut signals),
            SurfaceEvent::VolumeChange { muted, .. } => {
                if *muted != self.muted {
                    self.muted = *muted;
                    let event = if *muted { AdEvent::Mute } else { AdEvent::Unmute };
                    signals.push(Signal::Event(event));
                }
                signals.push(Signal::Event(AdEvent::AdVolumeChange));
            }
            SurfaceEvent::FullscreenChange(fullscreen) if *fullscreen != self.fullscreen => {
                self.fullscreen = *fullscreen;
                let events = if *fullscreen {
                    [AdEvent::Fullscreen, AdEvent::PlayerExpand]
                } else {
                    [AdEvent::ExitFullscreen, AdEvent::PlayerCollapse]
                };
                signals.extend(events.into_iter().map(Signal::Event));
            }
            SurfaceEvent::Click if self.started => {
                signals.push(Signal::Event(AdEvent::ClickThrough));
            }
            SurfaceEvent::SkipControlClick if self.skippable => {
                signals.push(Signal::Event(AdEvent::Skip));
            }
            SurfaceEvent::Error { message } => signals.push(Signal::MediaError(message.clone())),
            _ => (),
        }

        signals
    }

    fn time_update(&mut self, current_time: f64, duration: Option<f64>, signals: &mut Vec<Signal>) {
        if let Some(duration) = duration.filter(|d| d.is_finite() && *d > 0.0) {
            self.duration = Some(duration);
        }

        if !self.started {
            if current_time <= 0.0 {
                return;
            }
            self.started = true;
            signals.extend(
                [AdEvent::CreativeView, AdEvent::Start, AdEvent::Impression]
                    .into_iter()
                    .map(Signal::Event),
            );
        }

        if self.last_time - current_time >= REWIND_THRESHOLD {
            signals.push(Signal::Event(AdEvent::Rewind));
        }
        self.last_time = current_time;

        for (offset, fired) in &mut self.progress {
            if *fired {
                continue;
            }
            if let Some(at) = offset.seconds(self.duration).filter(|at| *at <= current_time) {
                *fired = true;
                signals.push(Signal::Event(AdEvent::Progress { offset: at }));
            }
        }

        if !self.skippable {
            let skip_at = self.skip_offset.and_then(|offset| offset.seconds(self.duration));
            if skip_at.is_some_and(|at| current_time >= at) {
                self.skippable = true;
                signals.push(Signal::SkipAvailable);
                signals.push(Signal::Event(AdEvent::AdSkippableStateChange));
            }
        }

        if let Some(duration) = self.duration {
            let ratio = current_time / duration;
            for (index, (threshold, event)) in QUARTILES.iter().enumerate() {
                if self.quartiles[index] || ratio < *threshold {
                    continue;
                }
                self.quartiles[index] = true;
                if *event == AdEvent::Complete {
                    self.complete(signals);
                } else {
                    signals.push(Signal::Event(event.clone()));
                }
            }
        }

        signals.push(Signal::Event(AdEvent::AdProgress));
    }

    fn complete(&mut self, signals: &mut Vec<Signal>) {
        if self.started && !self.completed {
            self.completed = true;
            signals.push(Signal::Event(AdEvent::Complete));
        }
    }
}
