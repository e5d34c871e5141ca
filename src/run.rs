//! Plays a resolved chain: surface, unit, start.

use crate::bridge::aborts_start;
use crate::chain::ResolutionChain;
use crate::error::{ErrorCode, Result, VastError};
use crate::events::AdEvent;
use crate::options::{Hooks, UnitOptions};
use crate::surface::SurfaceHost;
use crate::timing::Deadline;
use crate::tracking::{track_error, HttpPixelTracker, PixelTracker};
use crate::unit::{AdUnit, UnitConfig, UnitKind};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

pub type AdReadyCallback = Arc<dyn Fn(&AdUnit) + Send + Sync>;

#[derive(Clone)]
pub struct RunOptions {
    pub unit: UnitOptions,
    pub hooks: Hooks,
    pub tracker: Arc<dyn PixelTracker>,
    /// Called with the unit before it starts, to attach listeners
    pub on_ad_ready: Option<AdReadyCallback>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            unit: UnitOptions::default(),
            hooks: Hooks::default(),
            tracker: Arc::new(HttpPixelTracker::new()),
            on_ad_ready: None,
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("unit", &self.unit)
            .field("hooks", &self.hooks)
            .field("on_ad_ready", &self.on_ad_ready.is_some())
            .finish_non_exhaustive()
    }
}

/// Play `chain` on a fresh surface of `host`, bounded by `options.unit.timeout`
pub async fn run(chain: &ResolutionChain, host: &dyn SurfaceHost, options: &RunOptions) -> Result<AdUnit> {
    run_within(chain, host, options, Deadline::from_millis(options.unit.timeout)).await
}

/// Play `chain` and wait for the ad to start
///
/// Resolves with the playing unit once it emits `start`. The surface is
/// destroyed when the unit finishes, or straight away if the start fails.
pub async fn run_within(
    chain: &ResolutionChain,
    host: &dyn SurfaceHost,
    options: &RunOptions,
    deadline: Deadline,
) -> Result<AdUnit> {
    let surface = host.create_surface()?;
    let kind = UnitKind::for_chain(chain, &options.unit);
    debug!("Running {:?} unit", kind);

    let unit = AdUnit::new(
        kind,
        chain.clone(),
        surface.clone(),
        UnitConfig {
            options: options.unit.clone(),
            hooks: options.hooks.clone(),
            tracker: options.tracker.clone(),
        },
    );
    if let Some(ready) = &options.on_ad_ready {
        ready(&unit);
    }

    let started = start_unit(&unit);
    let outcome = match deadline.remaining() {
        Some(budget) => tokio::time::timeout(budget, started)
            .await
            .unwrap_or(Err(VastError::StartTimeout)),
        None => started.await,
    };

    match outcome {
        Ok(()) => {
            info!("Ad started");
            let surface = surface.clone();
            unit.on_finish(move || surface.destroy());
            Ok(unit)
        }
        Err(error) => {
            warn!("Ad failed to start: {}", error);
            if let VastError::StartTimeout = error {
                track_error(chain, ErrorCode::MediaLoadTimeout, options.tracker.as_ref());
            }
            if !unit.is_finished() {
                let _ = unit.cancel();
            }
            surface.destroy();
            Err(error)
        }
    }
}

/// Start `unit` and wait for its `start` event
async fn start_unit(unit: &AdUnit) -> Result<()> {
    let (settle, settled) = oneshot::channel::<Result<()>>();
    let settle = Arc::new(Mutex::new(Some(settle)));

    let resolve = {
        let settle = settle.clone();
        move |outcome: Result<()>| {
            if let Some(settle) = settle.lock().take() {
                let _ = settle.send(outcome);
            }
        }
    };

    {
        let resolve = resolve.clone();
        // creatives are matched on their raw event name, which follows the mapped one
        let native = unit.kind() == UnitKind::Native;
        unit.on(move |event| match event {
            AdEvent::Start => resolve(Ok(())),
            AdEvent::CloseLinear if native => {
                resolve(Err(VastError::StartAborted(event.to_string())));
            }
            AdEvent::Creative(name) if aborts_start(name) => {
                resolve(Err(VastError::StartAborted(name.clone())));
            }
            _ => (),
        });
    }
    {
        let resolve = resolve.clone();
        unit.on_error(move |error| resolve(Err(error.clone())));
    }
    unit.on_finish(move || resolve(Err(aborted())));

    let start = unit.start();
    tokio::pin!(start);
    let mut settled = settled;

    let first = tokio::select! {
        started = &mut start => First::Started(started),
        outcome = &mut settled => First::Settled(outcome.unwrap_or_else(|_| Err(aborted()))),
    };

    match first {
        First::Started(started) => {
            started?;
            settled.await.unwrap_or_else(|_| Err(aborted()))
        }
        First::Settled(outcome) => {
            outcome?;
            start.await
        }
    }
}

/// Whichever of `start()` and the first decisive event came back first
enum First {
    Started(Result<()>),
    Settled(Result<()>),
}

fn aborted() -> VastError {
    VastError::StartAborted("finished".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::VpaidEvent;
    use crate::chain::{ResolutionRecord, VastDocument};
    use crate::parser::parse_vast;
    use crate::surface::{PlaybackSurface, Size, VideoElement};
    use crate::test_support::{inline_xml, vpaid_xml, MockCreative, MockHost, RecordingTracker};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chain_for(xml: &str) -> ResolutionChain {
        let document = Arc::new(VastDocument::new(parse_vast(xml).unwrap()));
        ResolutionChain::new().prepend(ResolutionRecord::resolved("tag", document, 0))
    }

    fn options(tracker: &RecordingTracker) -> RunOptions {
        RunOptions {
            tracker: Arc::new(tracker.clone()),
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn resolves_once_the_ad_starts() {
        let host = MockHost::new(Size::new(640.0, 360.0));
        let tracker = RecordingTracker::default();
        let ready = Arc::new(AtomicUsize::new(0));
        let counter = ready.clone();
        let options = RunOptions {
            on_ad_ready: Some(Arc::new(move |unit: &AdUnit| {
                assert!(!unit.is_started());
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..options(&tracker)
        };

        let unit = run(&chain_for(&inline_xml("ad", &[640])), &host, &options).await.unwrap();

        assert!(unit.is_started());
        assert_eq!(unit.kind(), UnitKind::Native);
        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert!(tracker.urls().contains(&"http://track/ad/start".to_string()));

        let surface = host.surfaces().remove(0);
        assert!(!surface.is_destroyed());
        unit.cancel().unwrap();
        assert!(surface.is_destroyed());
    }

    #[tokio::test]
    async fn unit_errors_reject_and_destroy_the_surface() {
        let host = MockHost::new(Size::new(640.0, 360.0));
        let tracker = RecordingTracker::default();
        let xml = inline_xml("ad", &[640]).replace("video/mp4", "video/ogg");

        let result = run(&chain_for(&xml), &host, &options(&tracker)).await;

        assert!(matches!(result, Err(VastError::NoSuitableMedia)));
        assert!(host.surfaces()[0].is_destroyed());
        assert_eq!(tracker.urls(), vec!["http://track/ad/error?code=403"]);
    }

    #[tokio::test(start_paused = true)]
    async fn start_timeout_is_a_402() {
        let host = MockHost::new(Size::new(640.0, 360.0)).silent();
        let tracker = RecordingTracker::default();
        let mut options = options(&tracker);
        options.unit.timeout = Some(500);

        let result = run(&chain_for(&inline_xml("ad", &[640])), &host, &options).await;

        assert!(matches!(result, Err(VastError::StartTimeout)));
        assert!(tracker.urls().contains(&"http://track/ad/error?code=402".to_string()));
        let surface = host.surfaces().remove(0);
        assert!(surface.is_destroyed());
        assert!(surface.video_mock().is_paused());
    }

    #[tokio::test]
    async fn vpaid_chains_run_through_the_bridge() {
        let creative = MockCreative::new("2.0");
        let host = MockHost::new(Size::new(640.0, 360.0)).with_creative(creative.clone());
        let tracker = RecordingTracker::default();
        let chain = chain_for(&vpaid_xml("vp"));

        let options = options(&tracker);
        let running = run(&chain, &host, &options);
        let playing = async {
            while !creative.calls().contains(&"startAd".to_string()) {
                tokio::task::yield_now().await;
            }
            creative.emit(VpaidEvent::AdImpression);
        };
        let (result, _) = tokio::join!(running, playing);

        let unit = result.unwrap();
        assert_eq!(unit.kind(), UnitKind::Creative);
        assert!(tracker.urls().contains(&"http://track/vp/start".to_string()));
    }

    #[tokio::test]
    async fn vpaid_disabled_falls_back_to_native() {
        let host = MockHost::new(Size::new(640.0, 360.0));
        let tracker = RecordingTracker::default();
        let mut options = options(&tracker);
        options.unit.vpaid_enabled = false;

        let unit = run(&chain_for(&vpaid_xml("vp")), &host, &options).await.unwrap();

        assert_eq!(unit.kind(), UnitKind::Native);
        assert_eq!(
            host.surfaces()[0].video_mock().source().as_deref(),
            Some("http://cdn/vp/640.mp4")
        );
    }

    #[tokio::test]
    async fn closing_before_start_aborts() {
        let creative = MockCreative::new("2.0");
        let host = MockHost::new(Size::new(640.0, 360.0)).with_creative(creative.clone());
        let tracker = RecordingTracker::default();
        let chain = chain_for(&vpaid_xml("vp"));

        let options = options(&tracker);
        let running = run(&chain, &host, &options);
        let closing = async {
            while !creative.calls().contains(&"startAd".to_string()) {
                tokio::task::yield_now().await;
            }
            creative.emit(VpaidEvent::AdUserClose);
        };
        let (result, _) = tokio::join!(running, closing);

        assert!(matches!(result, Err(VastError::StartAborted(event)) if event == "AdUserClose"));
        assert!(host.surfaces()[0].is_destroyed());
        assert!(tracker.urls().iter().all(|url| !url.contains("error")));
    }

    #[tokio::test]
    async fn stopping_before_start_aborts_with_the_creative_event() {
        let creative = MockCreative::new("2.0").silent_on_start();
        let host = MockHost::new(Size::new(640.0, 360.0)).with_creative(creative.clone());
        let tracker = RecordingTracker::default();
        let chain = chain_for(&vpaid_xml("vp"));
        let options = options(&tracker);

        let running = run(&chain, &host, &options);
        let stopping = async {
            while !creative.calls().contains(&"startAd".to_string()) {
                tokio::task::yield_now().await;
            }
            creative.emit(VpaidEvent::AdStopped);
        };
        let (result, _) = tokio::join!(running, stopping);

        assert!(matches!(result, Err(VastError::StartAborted(event)) if event == "AdStopped"));
        assert!(host.surfaces()[0].is_destroyed());
        assert!(!creative.calls().contains(&"stopAd".to_string()));
    }
}
