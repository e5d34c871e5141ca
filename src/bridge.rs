//! Bridge to executable (VPAID) creatives.
//!
//! The creative runs in the surface's sandbox and talks back through
//! [`VpaidEvent`]s. The bridge loads it, negotiates the protocol version,
//! relays its events and lets callers wait for a named event.

use crate::error::{Result, VastError};
use crate::events::AdEvent;
use crate::models::MediaFile;
use crate::surface::{PlaybackSurface, VideoElement, ViewMode};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Protocol version offered to creatives
pub const VPAID_VERSION: &str = "2.0";

/// Bound on waiting for a creative to acknowledge `startAd` or `resizeAd`
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// The creative's own callback vocabulary
#[derive(Debug, Clone, PartialEq)]
pub enum VpaidEvent {
    AdLoaded,
    AdStarted,
    AdStopped,
    AdSkipped,
    AdSkippableStateChange,
    AdSizeChange,
    AdLinearChange,
    AdDurationChange,
    AdExpandedChange,
    AdRemainingTimeChange,
    AdVolumeChange,
    AdImpression,
    AdVideoStart,
    AdVideoFirstQuartile,
    AdVideoMidpoint,
    AdVideoThirdQuartile,
    AdVideoComplete,
    AdClickThru {
        url: Option<String>,
        id: Option<String>,
        player_handles: bool,
    },
    AdInteraction { id: Option<String> },
    AdUserAcceptInvitation,
    AdUserMinimize,
    AdUserClose,
    AdPaused,
    AdPlaying,
    AdLog(String),
    AdError(String),
}

impl VpaidEvent {
    pub fn name(&self) -> &'static str {
        use VpaidEvent::*;

        match self {
            AdLoaded => "AdLoaded",
            AdStarted => "AdStarted",
            AdStopped => "AdStopped",
            AdSkipped => "AdSkipped",
            AdSkippableStateChange => "AdSkippableStateChange",
            AdSizeChange => "AdSizeChange",
            AdLinearChange => "AdLinearChange",
            AdDurationChange => "AdDurationChange",
            AdExpandedChange => "AdExpandedChange",
            AdRemainingTimeChange => "AdRemainingTimeChange",
            AdVolumeChange => "AdVolumeChange",
            AdImpression => "AdImpression",
            AdVideoStart => "AdVideoStart",
            AdVideoFirstQuartile => "AdVideoFirstQuartile",
            AdVideoMidpoint => "AdVideoMidpoint",
            AdVideoThirdQuartile => "AdVideoThirdQuartile",
            AdVideoComplete => "AdVideoComplete",
            AdClickThru { .. } => "AdClickThru",
            AdInteraction { .. } => "AdInteraction",
            AdUserAcceptInvitation => "AdUserAcceptInvitation",
            AdUserMinimize => "AdUserMinimize",
            AdUserClose => "AdUserClose",
            AdPaused => "AdPaused",
            AdPlaying => "AdPlaying",
            AdLog(_) => "AdLog",
            AdError(_) => "AdError",
        }
    }
}

/// `creativeData` argument of `initAd`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreativeData {
    pub ad_parameters: String,
}

/// `environmentVars` argument of `initAd`
#[derive(Clone)]
pub struct EnvironmentVars {
    pub slot: String,
    pub video_slot: Arc<dyn VideoElement>,
    pub video_slot_can_autoplay: bool,
}

impl fmt::Debug for EnvironmentVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentVars")
            .field("slot", &self.slot)
            .field("video_slot_can_autoplay", &self.video_slot_can_autoplay)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct InitAdParams {
    pub width: f64,
    pub height: f64,
    pub view_mode: ViewMode,
    /// -1 leaves the choice to the creative
    pub desired_bitrate: i32,
    pub creative_data: CreativeData,
    pub environment: EnvironmentVars,
}

/// Entry point of a loaded creative
pub trait VpaidCreative: Send + Sync {
    /// Offered the player's version, answers with its own
    fn handshake_version(&self, player_version: &str) -> String;
    fn init_ad(&self, params: &InitAdParams);
    fn start_ad(&self);
    fn stop_ad(&self);
    fn pause_ad(&self);
    fn resume_ad(&self);
    fn skip_ad(&self);
    fn resize_ad(&self, width: f64, height: f64, view_mode: ViewMode);
    fn set_ad_volume(&self, volume: f64);
    fn get_ad_volume(&self) -> f64;

    /// Whether the creative draws its own industry icons
    fn get_ad_icons(&self) -> Option<bool> {
        None
    }

    fn get_ad_duration(&self) -> Option<f64> {
        None
    }

    fn get_ad_remaining_time(&self) -> Option<f64> {
        None
    }

    /// Send every event of the creative to `events`
    fn subscribe(&self, events: mpsc::UnboundedSender<VpaidEvent>);
}

/// Major version of a creative the bridge can drive
pub fn is_supported_version(version: &str) -> bool {
    let supported = major_version(VPAID_VERSION).unwrap_or(0);
    major_version(version).is_some_and(|major| (1..=supported).contains(&major))
}

fn major_version(version: &str) -> Option<u32> {
    version.trim().split('.').next()?.parse().ok()
}

/// Creative events that abort a start still waiting on the creative
pub const START_ABORTS: [&str; 2] = ["AdUserClose", "AdStopped"];

pub fn aborts_start(name: &str) -> bool {
    START_ABORTS.contains(&name)
}

/// Creative events that end the ad
pub fn finishes_unit(event: &VpaidEvent) -> bool {
    matches!(
        event,
        VpaidEvent::AdStopped | VpaidEvent::AdSkipped | VpaidEvent::AdUserClose | VpaidEvent::AdVideoComplete
    )
}

/// Unit event for a creative event, `None` for events with no counterpart
pub fn mapped_event(event: &VpaidEvent) -> Option<AdEvent> {
    use VpaidEvent::*;

    let mapped = match event {
        AdStarted => AdEvent::CreativeView,
        AdStopped => AdEvent::AdStopped,
        AdSkipped => AdEvent::Skip,
        AdSkippableStateChange => AdEvent::AdSkippableStateChange,
        AdSizeChange => AdEvent::AdSizeChange,
        AdLinearChange => AdEvent::AdLinearChange,
        AdDurationChange => AdEvent::AdDurationChange,
        AdExpandedChange => AdEvent::AdExpandedChange,
        AdRemainingTimeChange => AdEvent::AdRemainingTimeChange,
        AdVolumeChange => AdEvent::AdVolumeChange,
        AdImpression => AdEvent::Impression,
        AdVideoStart => AdEvent::Start,
        AdVideoFirstQuartile => AdEvent::FirstQuartile,
        AdVideoMidpoint => AdEvent::Midpoint,
        AdVideoThirdQuartile => AdEvent::ThirdQuartile,
        AdVideoComplete => AdEvent::Complete,
        AdClickThru { .. } => AdEvent::ClickThrough,
        AdInteraction { .. } => AdEvent::OtherAdInteraction,
        AdUserAcceptInvitation => AdEvent::AcceptInvitation,
        AdUserMinimize => AdEvent::PlayerCollapse,
        AdUserClose => AdEvent::CloseLinear,
        AdPaused => AdEvent::Pause,
        AdPlaying => AdEvent::Resume,
        AdLoaded | AdLog(_) | AdError(_) => return None,
    };

    Some(mapped)
}

/// A creative that reports an impression without ever sending
/// `AdVideoStart` still produces a `start`
pub fn synthesized_start(event: &VpaidEvent, video_started: bool) -> Option<AdEvent> {
    (*event == VpaidEvent::AdImpression && !video_started).then_some(AdEvent::Start)
}

/// Mute or unmute implied by a volume change
pub fn volume_transition(previous: f64, current: f64) -> Option<AdEvent> {
    if previous > 0.0 && current <= 0.0 {
        Some(AdEvent::Mute)
    } else if previous <= 0.0 && current > 0.0 {
        Some(AdEvent::Unmute)
    } else {
        None
    }
}

/// Applies the translation table and its repair policies to a stream of
/// creative events
#[derive(Debug)]
pub struct EventTranslator {
    video_started: bool,
    volume: f64,
}

impl EventTranslator {
    pub fn new(volume: f64) -> Self {
        EventTranslator {
            video_started: false,
            volume,
        }
    }

    /// Unit events for `event`, the raw passthrough last
    ///
    /// `volume` is the creative's volume after the event.
    pub fn translate(&mut self, event: &VpaidEvent, volume: f64) -> Vec<AdEvent> {
        let mut events = Vec::new();

        if *event == VpaidEvent::AdLoaded {
            return events;
        }

        if let Some(start) = synthesized_start(event, self.video_started) {
            self.video_started = true;
            events.push(start);
        }
        if *event == VpaidEvent::AdVideoStart {
            if self.video_started {
                // already synthesized from the impression
                events.push(AdEvent::Creative(event.name().to_string()));
                return events;
            }
            self.video_started = true;
        }

        if *event == VpaidEvent::AdVolumeChange {
            if let Some(transition) = volume_transition(self.volume, volume) {
                events.push(transition);
            }
            self.volume = volume;
        }

        events.extend(mapped_event(event));
        events.push(AdEvent::Creative(event.name().to_string()));
        events
    }
}

/// A loaded creative and the protocol version it agreed to
#[derive(Clone)]
pub struct CreativeHandle {
    pub creative: Arc<dyn VpaidCreative>,
    pub version: String,
    /// Where the creative was loaded from
    pub src: String,
}

impl fmt::Debug for CreativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreativeHandle")
            .field("version", &self.version)
            .field("src", &self.src)
            .finish_non_exhaustive()
    }
}

/// Receives every creative event before anyone waiting on it is woken
pub type VpaidEventHandler = Arc<dyn Fn(VpaidEvent) + Send + Sync>;

pub struct CreativeBridge {
    handle: CreativeHandle,
    signals: broadcast::Sender<&'static str>,
    pump: JoinHandle<()>,
}

impl CreativeBridge {
    /// Load the first creative the sandbox can execute and shake hands with it
    pub async fn load(
        surface: &dyn PlaybackSurface,
        media_files: &[MediaFile],
        handler: VpaidEventHandler,
    ) -> Result<Self> {
        let sandbox = surface.sandbox().await?;

        let media = media_files
            .iter()
            .filter(|media| media.is_vpaid())
            .find(|media| sandbox.can_execute(&media.mime_type))
            .ok_or(VastError::NoExecutableCreative)?;
        debug!("Loading creative {}", media.url);

        let creative = sandbox.load_creative(&media.url).await?;
        let mut bridge = Self::attach(creative, media.url.clone(), handler);

        let version = bridge.handle.creative.handshake_version(VPAID_VERSION);
        if !is_supported_version(&version) {
            warn!("Creative version '{}' rejected", version);
            return Err(VastError::UnsupportedCreativeVersion(version));
        }
        bridge.handle.version = version;

        Ok(bridge)
    }

    /// Subscribe to the creative and start relaying its events
    fn attach(creative: Arc<dyn VpaidCreative>, src: String, handler: VpaidEventHandler) -> Self {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        creative.subscribe(events_tx);

        let (signals, _) = broadcast::channel(64);
        let relay = signals.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let name = event.name();
                handler(event);
                let _ = relay.send(name);
            }
        });

        CreativeBridge {
            handle: CreativeHandle {
                creative,
                version: String::new(),
                src,
            },
            signals,
            pump,
        }
    }

    pub fn handle(&self) -> &CreativeHandle {
        &self.handle
    }

    pub fn creative(&self) -> &dyn VpaidCreative {
        self.handle.creative.as_ref()
    }

    /// Resolves on the next `name` event; listens from the moment of the call
    pub fn wait_for(&self, name: &'static str) -> BoxFuture<'static, Result<()>> {
        self.wait_for_any(&[name]).map(|received| received.map(|_| ())).boxed()
    }

    /// Resolves with the first of `names` to arrive
    pub fn wait_for_any(&self, names: &[&'static str]) -> BoxFuture<'static, Result<&'static str>> {
        let mut signals = self.signals.subscribe();
        let names = names.to_vec();

        async move {
            loop {
                match signals.recv().await {
                    Ok(received) if names.contains(&received) => return Ok(received),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(VastError::Creative(format!("closed while waiting for {}", names.join("|"))));
                    }
                }
            }
        }
        .boxed()
    }

    /// Run a start step unless the creative closes or stops first
    async fn unless_aborted<F>(&self, aborted: BoxFuture<'static, Result<&'static str>>, step: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        tokio::select! {
            biased;
            closed = aborted => {
                let name = closed?;
                debug!("Creative sent {} while starting", name);
                Err(VastError::StartAborted(name.to_string()))
            }
            result = step => result,
        }
    }

    /// Call into the creative and wait for its acknowledgement
    pub async fn call_and_wait<F>(&self, name: &'static str, call: F) -> Result<()>
    where
        F: FnOnce(&dyn VpaidCreative),
    {
        let acknowledged = self.wait_for(name);
        call(self.creative());
        tokio::time::timeout(EVENT_TIMEOUT, acknowledged)
            .await
            .map_err(|_| VastError::CreativeEventTimeout(name.to_string()))?
    }

    /// `initAd`, then wait for `AdLoaded` without a bound
    pub async fn init(&self, params: &InitAdParams) -> Result<()> {
        let aborted = self.wait_for_any(&START_ABORTS);
        let loaded = self.wait_for("AdLoaded");
        self.creative().init_ad(params);
        self.unless_aborted(aborted, loaded).await
    }

    /// `startAd`; a creative that does not acknowledge in time is stopped
    ///
    /// A creative that closes or stops before acknowledging aborts the start
    /// with [`VastError::StartAborted`] carrying the event name.
    pub async fn start(&self) -> Result<()> {
        let aborted = self.wait_for_any(&START_ABORTS);
        let started = self
            .unless_aborted(aborted, self.call_and_wait("AdStarted", |creative| creative.start_ad()))
            .await;
        if let Err(VastError::CreativeEventTimeout(_)) = &started {
            self.creative().stop_ad();
        }
        started
    }

    pub async fn resize(&self, width: f64, height: f64, view_mode: ViewMode) -> Result<()> {
        self.call_and_wait("AdSizeChange", |creative| creative.resize_ad(width, height, view_mode))
            .await
    }
}

impl Drop for CreativeBridge {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
