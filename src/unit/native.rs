//! Native playback on the surface's video element.

use super::{AdUnit, State};
use crate::error::{Result, VastError};
use crate::events::AdEvent;
use crate::media::{best_fit, playable_media};
use crate::metrics::{PlaybackMetrics, Signal};
use crate::models::{Ad, MediaFile};
use crate::surface::{Size, SurfaceEvent};
use crate::timing::Offset;
use crate::tracking::progress_marks;
use log::{debug, info};

/// Seeking further ahead than this past the furthest played position is undone
const SEEK_TOLERANCE: f64 = 1.0;

pub(super) fn start(unit: &AdUnit) -> Result<()> {
    let inner = &unit.inner;
    let video = inner.surface.video();
    let size = inner.state.lock().size;

    let media = select_media(unit, size).ok_or(VastError::NoSuitableMedia)?;
    let metrics = PlaybackMetrics::new(skip_offset(unit), progress_marks(&inner.chain), video.muted());

    {
        let mut state = inner.state.lock();
        state.metrics = Some(metrics);
        state.media = Some(media.clone());
        state.starting = false;
        state.started = true;
    }
    info!("Playing {}", media.url);

    unit.redraw_icons(0.0);
    video.set_source(&media.url);
    video.play();
    Ok(())
}

fn select_media(unit: &AdUnit, size: Size) -> Option<MediaFile> {
    let linear = unit.ad().and_then(Ad::linear)?;
    let video = unit.inner.surface.video();
    let playable = playable_media(&linear.media_files, video.as_ref());

    match &unit.inner.hooks.get_media_file {
        Some(select) => {
            let playable: Vec<MediaFile> = playable.into_iter().cloned().collect();
            select(&playable, size)
        }
        None => best_fit(&playable, size).cloned(),
    }
}

fn skip_offset(unit: &AdUnit) -> Option<Offset> {
    if let Some(select) = &unit.inner.hooks.get_skip_offset {
        return select(&unit.inner.chain).map(Offset::Seconds);
    }

    unit.ad()
        .and_then(Ad::linear)
        .and_then(|linear| linear.skip_offset.as_deref())
        .and_then(Offset::parse)
}

pub(super) fn skip(unit: &AdUnit) -> Result<()> {
    let skippable = unit
        .inner
        .state
        .lock()
        .metrics
        .as_ref()
        .is_some_and(PlaybackMetrics::is_skippable);
    if !skippable {
        return Err(VastError::NotSkippable);
    }

    unit.inner.surface.video().pause();
    unit.emit(AdEvent::Skip);
    unit.finish();
    Ok(())
}

/// Switch to the media that best fits the new size, keeping position and
/// play state
pub(super) fn refit_media(unit: &AdUnit) {
    let inner = &unit.inner;
    let (size, current) = {
        let state = inner.state.lock();
        (state.size, state.media.as_ref().map(|media| media.url.clone()))
    };

    let Some(media) = select_media(unit, size) else { return };
    if current.as_deref() == Some(media.url.as_str()) {
        return;
    }

    let video = inner.surface.video();
    let time = video.current_time();
    let paused = video.is_paused();
    debug!("Switching media to {} at {:.2}s", media.url, time);

    video.set_source(&media.url);
    inner.state.lock().media = Some(media);
    video.set_current_time(time);
    if paused {
        video.pause();
    } else {
        video.play();
    }
}

pub(super) fn on_surface_event(unit: &AdUnit, event: SurfaceEvent) {
    let inner = &unit.inner;

    if let SurfaceEvent::Seeking { target } = event {
        let guard = inner.state.lock().seek_guard;
        if target - guard > SEEK_TOLERANCE {
            debug!("Rejecting seek to {:.2}s", target);
            inner.surface.video().set_current_time(guard);
        }
        return;
    }

    let signals = {
        let mut state = inner.state.lock();
        if !state.started {
            return;
        }
        let State { metrics, seek_guard, .. } = &mut *state;
        let Some(metrics) = metrics.as_mut() else { return };

        let signals = metrics.observe(&event);
        if let SurfaceEvent::TimeUpdate { current_time, .. } = event {
            *seek_guard = seek_guard.max(current_time);
        }
        signals
    };

    for signal in signals {
        match signal {
            Signal::Event(AdEvent::ClickThrough) => click_through(unit),
            Signal::Event(event @ (AdEvent::Complete | AdEvent::Skip)) => {
                if event == AdEvent::Skip {
                    inner.surface.video().pause();
                }
                unit.emit(event);
                unit.finish();
                return;
            }
            Signal::Event(event) => unit.emit(event),
            Signal::SkipAvailable => inner.surface.show_skip_control(true),
            Signal::MediaError(message) => {
                unit.fail(VastError::MediaPlayback(message));
                return;
            }
        }
    }

    if let SurfaceEvent::TimeUpdate { current_time, .. } = event {
        unit.redraw_icons(current_time);
    }
}

fn click_through(unit: &AdUnit) {
    if let Some(url) = unit.click_through_url() {
        unit.inner.surface.open_url(&url);
    }
    if unit.inner.options.pause_on_ad_click {
        unit.inner.surface.video().pause();
    }
    unit.emit(AdEvent::ClickThrough);
}
