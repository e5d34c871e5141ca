//! Playback delegated to an executable creative through the bridge.

use super::{AdUnit, Inner};
use crate::bridge::{
    finishes_unit, CreativeBridge, CreativeData, EnvironmentVars, EventTranslator, InitAdParams,
    VpaidEvent, VpaidEventHandler,
};
use crate::error::{Result, VastError};
use crate::models::{Ad, MediaFile};
use log::{debug, info};
use std::sync::{Arc, Weak};

pub(super) async fn start(unit: &AdUnit) -> Result<()> {
    let inner = &unit.inner;
    let media_files: Vec<MediaFile> = unit
        .ad()
        .into_iter()
        .flat_map(Ad::linears)
        .flat_map(|linear| linear.media_files.iter())
        .filter(|media| media.is_vpaid())
        .cloned()
        .collect();

    let handler = event_handler(Arc::downgrade(inner));
    let bridge = Arc::new(CreativeBridge::load(inner.surface.as_ref(), &media_files, handler).await?);
    info!("Creative {} loaded, version {}", bridge.handle().src, bridge.handle().version);

    *inner.bridge.lock() = Some(bridge.clone());
    inner.state.lock().media = media_files
        .iter()
        .find(|media| media.url == bridge.handle().src)
        .cloned();

    bridge.init(&init_params(unit, &bridge.handle().src)).await?;

    if bridge.creative().get_ad_icons() == Some(true) {
        debug!("Creative draws its own icons");
        let icons = inner.state.lock().icons.take();
        if let Some(mut icons) = icons {
            icons.clear(inner.surface.as_ref());
        }
    }
    ensure_alive(unit)?;

    let video = inner.surface.video();
    let volume = if video.muted() { 0.0 } else { video.volume() };
    bridge.creative().set_ad_volume(volume);
    inner.state.lock().translator = EventTranslator::new(volume);

    bridge.start().await?;
    ensure_alive(unit)?;

    {
        let mut state = inner.state.lock();
        state.starting = false;
        state.started = true;
    }
    unit.redraw_icons(current_time(unit));
    Ok(())
}

/// The unit may be torn down while the creative is loading
fn ensure_alive(unit: &AdUnit) -> Result<()> {
    if unit.inner.surface.is_destroyed() {
        return Err(VastError::SurfaceDestroyed);
    }
    if unit.is_finished() {
        return Err(VastError::AlreadyFinished);
    }
    Ok(())
}

fn init_params(unit: &AdUnit, src: &str) -> InitAdParams {
    let surface = &unit.inner.surface;
    let (size, view_mode) = unit.size();

    let ad_parameters = unit
        .ad()
        .into_iter()
        .flat_map(Ad::linears)
        .find(|linear| linear.media_files.iter().any(|media| media.url == src))
        .and_then(|linear| linear.ad_parameters.as_ref())
        .map(|parameters| parameters.value.clone())
        .unwrap_or_default();

    InitAdParams {
        width: size.width,
        height: size.height,
        view_mode,
        desired_bitrate: -1,
        creative_data: CreativeData { ad_parameters },
        environment: EnvironmentVars {
            slot: surface.slot_handle(),
            video_slot: surface.video(),
            video_slot_can_autoplay: surface.supports_autoplay(),
        },
    }
}

/// Seconds played, as far as the creative reports it
pub(super) fn current_time(unit: &AdUnit) -> f64 {
    let Some(bridge) = unit.bridge() else { return 0.0 };
    let creative = bridge.creative();

    match (creative.get_ad_duration(), creative.get_ad_remaining_time()) {
        (Some(duration), Some(remaining)) if duration >= remaining => duration - remaining,
        _ => 0.0,
    }
}

fn event_handler(unit: Weak<Inner>) -> VpaidEventHandler {
    Arc::new(move |event| {
        if let Some(inner) = unit.upgrade() {
            on_creative_event(&AdUnit { inner }, event);
        }
    })
}

fn on_creative_event(unit: &AdUnit, event: VpaidEvent) {
    if unit.is_finished() {
        return;
    }
    debug!("Creative event {}", event.name());

    match &event {
        VpaidEvent::AdError(message) => {
            unit.fail(VastError::Creative(message.clone()));
            return;
        }
        VpaidEvent::AdClickThru { url, player_handles: true, .. } => {
            let url = url
                .clone()
                .filter(|url| !url.is_empty())
                .or_else(|| unit.click_through_url());
            if let Some(url) = url {
                unit.inner.surface.open_url(&url);
            }
        }
        _ => (),
    }

    let volume = match event {
        VpaidEvent::AdVolumeChange => unit
            .bridge()
            .map_or(0.0, |bridge| bridge.creative().get_ad_volume()),
        _ => 0.0,
    };
    let events = unit.inner.state.lock().translator.translate(&event, volume);
    for translated in events {
        unit.emit(translated);
    }

    if matches!(event, VpaidEvent::AdRemainingTimeChange | VpaidEvent::AdDurationChange) {
        unit.redraw_icons(current_time(unit));
    }
    if finishes_unit(&event) {
        unit.finish();
    }
}
