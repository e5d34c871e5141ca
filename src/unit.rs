//! The ad unit: one resolved chain playing on one surface.
//!
//! A unit moves from constructed to started to finished and never back.
//! Native units drive the surface's video element themselves; creative
//! units hand playback to a VPAID creative through the bridge. Both expose
//! the same controls and emit the same [`AdEvent`]s.

mod creative;
mod native;

use crate::bridge::{CreativeBridge, EventTranslator};
use crate::chain::ResolutionChain;
use crate::error::{ErrorCode, Result, VastError};
use crate::events::AdEvent;
use crate::icons::{retrieve_icons, IconPlacement, IconSet};
use crate::metrics::PlaybackMetrics;
use crate::models::{Ad, MediaFile};
use crate::options::{Hooks, UnitOptions};
use crate::surface::{PlaybackSurface, Size, SurfaceEvent, ViewMode, Visibility};
use crate::tracking::{track_error, track_event, track_uris, HttpPixelTracker, PixelTracker, TrackingContext};
use crate::viewability::{is_in_view, ViewAction, ViewableImpressionTracker, VIEWABLE_DURATION};
use log::{debug, error};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Plays a media file on the surface's video element
    Native,
    /// Runs an executable creative in the surface's sandbox
    Creative,
}

impl UnitKind {
    /// Creative when allowed and the ad ships an executable creative
    pub fn for_chain(chain: &ResolutionChain, options: &UnitOptions) -> Self {
        let executable = chain
            .head()
            .and_then(|record| record.ad())
            .is_some_and(Ad::has_executable_creative);

        if options.vpaid_enabled && executable {
            UnitKind::Creative
        } else {
            UnitKind::Native
        }
    }
}

pub type EventListener = Arc<dyn Fn(&AdEvent) + Send + Sync>;
pub type ErrorListener = Arc<dyn Fn(&VastError) + Send + Sync>;
type FinishCallback = Box<dyn FnOnce() + Send>;

/// What a unit needs besides its chain and surface
#[derive(Clone)]
pub struct UnitConfig {
    pub options: UnitOptions,
    pub hooks: Hooks,
    pub tracker: Arc<dyn PixelTracker>,
}

impl Default for UnitConfig {
    fn default() -> Self {
        UnitConfig {
            options: UnitOptions::default(),
            hooks: Hooks::default(),
            tracker: Arc::new(HttpPixelTracker::new()),
        }
    }
}

struct State {
    starting: bool,
    started: bool,
    finished: bool,
    error: Option<VastError>,
    size: Size,
    view_mode: ViewMode,
    icons: Option<IconSet>,
    viewability: Option<ViewableImpressionTracker>,
    paused_for_visibility: bool,
    metrics: Option<PlaybackMetrics>,
    media: Option<MediaFile>,
    /// Furthest position reached by normal playback
    seek_guard: f64,
    translator: EventTranslator,
}

struct Inner {
    kind: UnitKind,
    chain: ResolutionChain,
    surface: Arc<dyn PlaybackSurface>,
    options: UnitOptions,
    hooks: Hooks,
    tracker: Arc<dyn PixelTracker>,
    state: Mutex<State>,
    listeners: Mutex<Vec<EventListener>>,
    error_listeners: Mutex<Vec<ErrorListener>>,
    finish_callbacks: Mutex<Vec<FinishCallback>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    bridge: Mutex<Option<Arc<CreativeBridge>>>,
}

/// Handle to an ad unit; clones share the same unit
#[derive(Clone)]
pub struct AdUnit {
    inner: Arc<Inner>,
}

impl fmt::Debug for AdUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("AdUnit")
            .field("kind", &self.inner.kind)
            .field("started", &state.started)
            .field("finished", &state.finished)
            .field("error", &state.error)
            .finish_non_exhaustive()
    }
}

impl AdUnit {
    pub fn new(
        kind: UnitKind,
        chain: ResolutionChain,
        surface: Arc<dyn PlaybackSurface>,
        config: UnitConfig,
    ) -> Self {
        let icons = retrieve_icons(&chain, surface.pixel_ratio());
        let wants_viewable = chain.ads().any(|ad| ad.viewable_impression().is_some());

        // the ad plays once, from start to end
        surface.video().set_loop(false);

        let state = State {
            starting: false,
            started: false,
            finished: false,
            error: None,
            size: surface.size(),
            view_mode: surface.view_mode(),
            icons: (!icons.is_empty()).then(|| IconSet::new(icons)),
            viewability: wants_viewable.then(ViewableImpressionTracker::new),
            paused_for_visibility: false,
            metrics: None,
            media: None,
            seek_guard: 0.0,
            translator: EventTranslator::new(1.0),
        };

        AdUnit {
            inner: Arc::new(Inner {
                kind,
                chain,
                surface,
                options: config.options,
                hooks: config.hooks,
                tracker: config.tracker,
                state: Mutex::new(state),
                listeners: Mutex::new(Vec::new()),
                error_listeners: Mutex::new(Vec::new()),
                finish_callbacks: Mutex::new(Vec::new()),
                tasks: Mutex::new(Vec::new()),
                bridge: Mutex::new(None),
            }),
        }
    }

    pub fn kind(&self) -> UnitKind {
        self.inner.kind
    }

    pub fn chain(&self) -> &ResolutionChain {
        &self.inner.chain
    }

    pub fn surface(&self) -> &Arc<dyn PlaybackSurface> {
        &self.inner.surface
    }

    pub fn is_started(&self) -> bool {
        self.inner.state.lock().started
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().finished
    }

    pub fn is_viewable(&self) -> bool {
        self.inner
            .state
            .lock()
            .viewability
            .as_ref()
            .is_some_and(ViewableImpressionTracker::is_viewable)
    }

    /// The error that ended the unit, if any
    pub fn error(&self) -> Option<VastError> {
        self.inner.state.lock().error.clone()
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.inner.state.lock().error.as_ref().and_then(VastError::code)
    }

    pub fn size(&self) -> (Size, ViewMode) {
        let state = self.inner.state.lock();
        (state.size, state.view_mode)
    }

    /// Geometry of the icons currently drawn
    pub fn icon_placements(&self) -> Vec<(usize, IconPlacement)> {
        self.inner
            .state
            .lock()
            .icons
            .as_ref()
            .map(IconSet::placements)
            .unwrap_or_default()
    }

    /// The media file or creative being played
    pub fn media(&self) -> Option<MediaFile> {
        self.inner.state.lock().media.clone()
    }

    pub fn on<F>(&self, listener: F)
    where
        F: Fn(&AdEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Arc::new(listener));
    }

    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&VastError) + Send + Sync + 'static,
    {
        self.inner.error_listeners.lock().push(Arc::new(listener));
    }

    /// Run `callback` once the unit finishes; immediately if it already has
    pub fn on_finish<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let state = self.inner.state.lock();
        if state.finished {
            drop(state);
            callback();
            return;
        }
        self.inner.finish_callbacks.lock().push(Box::new(callback));
    }

    /// Start playback
    ///
    /// Fails if the unit was started before or is finished. A failed start
    /// also goes through the error listeners and finishes the unit.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.finished {
                return Err(VastError::AlreadyFinished);
            }
            if state.started || state.starting {
                return Err(VastError::AlreadyStarted);
            }
            state.starting = true;
        }

        self.spawn_surface_pump();

        let result = match self.inner.kind {
            UnitKind::Native => native::start(self),
            UnitKind::Creative => creative::start(self).await,
        };

        if let Err(error) = &result {
            self.inner.state.lock().starting = false;
            self.fail(error.clone());
        }
        result
    }

    pub fn pause(&self) -> Result<()> {
        self.ensure_running()?;
        match self.inner.kind {
            UnitKind::Native => self.inner.surface.video().pause(),
            UnitKind::Creative => self.with_creative(|bridge| bridge.creative().pause_ad()),
        }
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.ensure_running()?;
        match self.inner.kind {
            UnitKind::Native => self.inner.surface.video().play(),
            UnitKind::Creative => self.with_creative(|bridge| bridge.creative().resume_ad()),
        }
        Ok(())
    }

    pub fn set_volume(&self, volume: f64) -> Result<()> {
        self.ensure_running()?;
        let volume = volume.clamp(0.0, 1.0);
        match self.inner.kind {
            UnitKind::Native => self.inner.surface.video().set_volume(volume),
            UnitKind::Creative => self.with_creative(|bridge| bridge.creative().set_ad_volume(volume)),
        }
        Ok(())
    }

    pub fn volume(&self) -> f64 {
        match self.inner.kind {
            UnitKind::Native => self.inner.surface.video().volume(),
            UnitKind::Creative => self
                .bridge()
                .map_or(0.0, |bridge| bridge.creative().get_ad_volume()),
        }
    }

    /// Skip the ad; native ads only once the skip offset is reached
    pub fn skip(&self) -> Result<()> {
        self.ensure_running()?;
        match self.inner.kind {
            UnitKind::Native => native::skip(self),
            UnitKind::Creative => {
                self.with_creative(|bridge| bridge.creative().skip_ad());
                Ok(())
            }
        }
    }

    /// Stop playback and finish the unit
    pub fn cancel(&self) -> Result<()> {
        if self.is_finished() {
            return Err(VastError::AlreadyFinished);
        }
        debug!("Cancelling ad unit");

        match self.inner.kind {
            UnitKind::Native => self.inner.surface.video().pause(),
            UnitKind::Creative => self.with_creative(|bridge| bridge.creative().stop_ad()),
        }
        self.finish();
        Ok(())
    }

    /// Store the new geometry; a started unit redraws its icons and adapts
    /// its media or creative
    pub async fn resize(&self, width: f64, height: f64, view_mode: ViewMode) -> Result<()> {
        let (started, time) = {
            let mut state = self.inner.state.lock();
            if state.finished {
                return Err(VastError::AlreadyFinished);
            }
            state.size = Size::new(width, height);
            state.view_mode = view_mode;
            (state.started, state.seek_guard)
        };

        if !started {
            return Ok(());
        }

        match self.inner.kind {
            UnitKind::Native => {
                self.redraw_icons(time);
                native::refit_media(self);
                Ok(())
            }
            UnitKind::Creative => {
                self.redraw_icons(creative::current_time(self));
                match self.bridge() {
                    Some(bridge) => bridge.resize(width, height, view_mode).await,
                    None => Ok(()),
                }
            }
        }
    }

    /// React to a notification of the surface
    ///
    /// Called for every event the surface broadcasts once the unit started.
    pub fn handle_surface_event(&self, event: SurfaceEvent) {
        if self.is_finished() {
            return;
        }

        match event {
            SurfaceEvent::Visibility(visibility) => self.on_visibility(visibility),
            SurfaceEvent::Resized(size) if self.inner.options.responsive => {
                let unit = self.clone();
                let view_mode = self.inner.surface.view_mode();
                tokio::spawn(async move {
                    if let Err(e) = unit.resize(size.width, size.height, view_mode).await {
                        debug!("Resize ignored: {}", e);
                    }
                });
            }
            SurfaceEvent::IconClick(index) => self.on_icon_click(index),
            event if self.inner.kind == UnitKind::Native => native::on_surface_event(self, event),
            _ => (),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        let state = self.inner.state.lock();
        if state.finished {
            Err(VastError::AlreadyFinished)
        } else if !state.started {
            Err(VastError::NotStarted)
        } else {
            Ok(())
        }
    }

    fn ad(&self) -> Option<&Ad> {
        self.inner.chain.head().and_then(|record| record.ad())
    }

    /// First click-through URI of the chain, inline ad first
    fn click_through_url(&self) -> Option<String> {
        self.inner
            .chain
            .ads()
            .flat_map(Ad::linears)
            .find_map(|linear| linear.video_clicks.as_ref()?.click_through.clone())
    }

    fn bridge(&self) -> Option<Arc<CreativeBridge>> {
        self.inner.bridge.lock().clone()
    }

    fn with_creative<F: FnOnce(&CreativeBridge)>(&self, call: F) {
        if let Some(bridge) = self.bridge() {
            call(&bridge);
        }
    }

    fn spawn_surface_pump(&self) {
        let mut events = self.inner.surface.subscribe();
        let unit = Arc::downgrade(&self.inner);

        let pump = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inner) = unit.upgrade() else { break };
                        AdUnit { inner }.handle_surface_event(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Surface pump skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.inner.tasks.lock().push(pump);
    }

    fn tracking_context(&self) -> TrackingContext {
        let state = self.inner.state.lock();
        let metrics = state.metrics.as_ref();
        TrackingContext {
            error_code: None,
            content_playhead: metrics.map(PlaybackMetrics::current_time),
            asset_uri: state.media.as_ref().map(|media| media.url.clone()),
            duration: metrics.and_then(PlaybackMetrics::duration),
        }
    }

    /// Track `event` and hand it to the listeners
    fn emit(&self, event: AdEvent) {
        debug!("Ad event: {}", event);
        let context = self.tracking_context();
        track_event(&self.inner.chain, &event, &context, self.inner.tracker.as_ref());

        let listeners: Vec<EventListener> = self.inner.listeners.lock().clone();
        for listener in listeners {
            listener(&event);
        }
    }

    /// End the unit with an error
    fn fail(&self, error: VastError) {
        {
            let mut state = self.inner.state.lock();
            if state.finished {
                return;
            }
            state.error = Some(error.clone());
        }
        error!("Ad unit failed: {}", error);

        if let Some(code) = error.code() {
            track_error(&self.inner.chain, code, self.inner.tracker.as_ref());
        }
        let listeners: Vec<ErrorListener> = self.inner.error_listeners.lock().clone();
        for listener in listeners {
            listener(&error);
        }
        self.finish();
    }

    /// The one transition to finished; later calls do nothing
    fn finish(&self) {
        let (not_viewable, icons) = {
            let mut state = self.inner.state.lock();
            if state.finished {
                return;
            }
            state.finished = true;
            state.starting = false;
            let started = state.started;
            let not_viewable = match state.viewability.as_mut() {
                Some(tracker) if started => tracker.finish(),
                _ => None,
            };
            (not_viewable, state.icons.take())
        };
        debug!("Ad unit finished");

        if let Some(event) = not_viewable {
            self.emit(event);
        }
        if let Some(mut icons) = icons {
            icons.clear(self.inner.surface.as_ref());
        }
        self.inner.surface.show_skip_control(false);

        drop(self.inner.bridge.lock().take());
        for task in std::mem::take(&mut *self.inner.tasks.lock()) {
            task.abort();
        }

        let callbacks = std::mem::take(&mut *self.inner.finish_callbacks.lock());
        for callback in callbacks {
            callback();
        }
        self.inner.listeners.lock().clear();
        self.inner.error_listeners.lock().clear();
    }

    /// Draw the icons due at `time`, firing view tracking for new ones
    fn redraw_icons(&self, time: f64) {
        let first_views: Vec<(usize, Vec<String>)> = {
            let mut state = self.inner.state.lock();
            let State { icons, size, .. } = &mut *state;
            let Some(icons) = icons.as_mut() else { return };

            icons
                .redraw(self.inner.surface.as_ref(), *size, time)
                .into_iter()
                .filter_map(|index| icons.get(index).map(|icon| (index, icon.view_tracking.clone())))
                .collect()
        };

        for (index, uris) in first_views {
            track_uris(&uris, &self.tracking_context(), self.inner.tracker.as_ref());
            self.emit(AdEvent::IconView(index));
        }
    }

    fn on_icon_click(&self, index: usize) {
        let icon = {
            let state = self.inner.state.lock();
            state.icons.as_ref().and_then(|icons| icons.get(index)).cloned()
        };
        let Some(icon) = icon else { return };

        if let Some(url) = &icon.click_through {
            self.inner.surface.open_url(url);
        }
        track_uris(&icon.click_tracking, &self.tracking_context(), self.inner.tracker.as_ref());
        self.emit(AdEvent::IconClick(index));
    }

    fn on_visibility(&self, visibility: Visibility) {
        let (action, pause, resume) = {
            let mut state = self.inner.state.lock();
            if !state.started {
                return;
            }
            let action = state
                .viewability
                .as_mut()
                .and_then(|tracker| tracker.observe(visibility));

            let mut pause = false;
            let mut resume = false;
            if self.inner.options.viewability {
                match is_in_view(visibility) {
                    Some(false) if !state.paused_for_visibility => {
                        state.paused_for_visibility = true;
                        pause = true;
                    }
                    Some(true) if state.paused_for_visibility => {
                        state.paused_for_visibility = false;
                        resume = true;
                    }
                    _ => (),
                }
            }
            (action, pause, resume)
        };

        if pause {
            let _ = self.pause();
        }
        if resume {
            let _ = self.resume();
        }

        match action {
            Some(ViewAction::ArmTimer(generation)) => self.arm_viewability_timer(generation),
            Some(ViewAction::Fire(event)) => self.emit(event),
            None => (),
        }
    }

    fn arm_viewability_timer(&self, generation: u64) {
        let unit: Weak<Inner> = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(VIEWABLE_DURATION).await;
            if let Some(inner) = unit.upgrade() {
                AdUnit { inner }.viewability_elapsed(generation);
            }
        });
        self.inner.tasks.lock().push(timer);
    }

    fn viewability_elapsed(&self, generation: u64) {
        let event = {
            let mut state = self.inner.state.lock();
            if state.finished {
                return;
            }
            state
                .viewability
                .as_mut()
                .and_then(|tracker| tracker.timer_elapsed(generation))
        };
        if let Some(event) = event {
            self.emit(event);
        }
    }
}
