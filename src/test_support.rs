//! Fixtures and mock collaborators shared by the unit tests.

use crate::bridge::{CreativeData, EnvironmentVars, InitAdParams, VpaidCreative, VpaidEvent};
use crate::error::{Result, VastError};
use crate::fetch::{FetchedTag, TagFetcher, TagResponse};
use crate::icons::{IconDefinition, IconPlacement};
use crate::surface::{
    PlaybackSurface, ScriptSandbox, Size, SurfaceEvent, SurfaceHost, VideoElement, ViewMode,
};
use crate::tracking::PixelTracker;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

fn media_files(id: &str, widths: &[u32]) -> String {
    widths
        .iter()
        .map(|width| {
            format!(
                "<MediaFile delivery=\"progressive\" type=\"video/mp4\" width=\"{w}\" height=\"{h}\">http://cdn/{id}/{w}.mp4</MediaFile>",
                w = width,
                h = width * 9 / 16,
                id = id
            )
        })
        .collect()
}

fn inline_ad_with(id: &str, media: &str, ad_parameters: &str) -> String {
    format!(
        r#"<Ad id="{id}"><InLine>
  <AdSystem>test</AdSystem>
  <AdTitle>{id}</AdTitle>
  <Impression>http://track/{id}/impression</Impression>
  <Error>http://track/{id}/error?code=[ERRORCODE]</Error>
  <Creatives><Creative><Linear skipoffset="00:00:05">
    <Duration>00:00:20</Duration>
    {ad_parameters}
    <TrackingEvents>
      <Tracking event="start">http://track/{id}/start</Tracking>
      <Tracking event="firstQuartile">http://track/{id}/firstQuartile</Tracking>
      <Tracking event="complete">http://track/{id}/complete</Tracking>
      <Tracking event="skip">http://track/{id}/skip</Tracking>
      <Tracking event="progress" offset="00:00:05">http://track/{id}/progress-5</Tracking>
      <Tracking event="progress" offset="50%">http://track/{id}/progress-50</Tracking>
    </TrackingEvents>
    <VideoClicks>
      <ClickThrough>http://advertiser/{id}</ClickThrough>
      <ClickTracking>http://track/{id}/click</ClickTracking>
    </VideoClicks>
    <MediaFiles>{media}</MediaFiles>
    <Icons>
      <Icon program="AdChoices" width="20" height="20" xPosition="right" yPosition="top">
        <StaticResource creativeType="image/png">http://icons/{id}.png</StaticResource>
        <IconClicks>
          <IconClickThrough>http://adchoices/{id}</IconClickThrough>
          <IconClickTracking>http://track/{id}/icon-click</IconClickTracking>
        </IconClicks>
        <IconViewTracking>http://track/{id}/icon-view</IconViewTracking>
      </Icon>
    </Icons>
  </Linear></Creative></Creatives>
  <ViewableImpression>
    <Viewable>http://track/{id}/viewable</Viewable>
    <NotViewable>http://track/{id}/not-viewable</NotViewable>
    <ViewUndetermined>http://track/{id}/view-undetermined</ViewUndetermined>
  </ViewableImpression>
</InLine></Ad>"#,
        id = id,
        media = media,
        ad_parameters = ad_parameters
    )
}

/// Inline ad with one mp4 rendition per width, 20s long, skippable at 5s
pub fn inline_ad(id: &str, widths: &[u32]) -> String {
    inline_ad_with(id, &media_files(id, widths), "")
}

pub fn wrapper_ad(id: &str, tag: &str) -> String {
    format!(
        r#"<Ad id="{id}"><Wrapper>
  <AdSystem>test</AdSystem>
  <VASTAdTagURI>{tag}</VASTAdTagURI>
  <Impression>http://track/{id}/impression</Impression>
  <Error>http://track/{id}/error?code=[ERRORCODE]</Error>
  <Creatives><Creative><Linear>
    <TrackingEvents>
      <Tracking event="start">http://track/{id}/start</Tracking>
    </TrackingEvents>
  </Linear></Creative></Creatives>
</Wrapper></Ad>"#,
        id = id,
        tag = tag
    )
}

fn document(ads: &str) -> String {
    format!("<VAST version=\"4.0\">{}</VAST>", ads)
}

pub fn inline_xml(id: &str, widths: &[u32]) -> String {
    document(&inline_ad(id, widths))
}

pub fn wrapper_xml(tag: &str) -> String {
    document(&wrapper_ad(&format!("w-{}", tag), tag))
}

/// Ad pod with sequences 1..=n in the given order
pub fn pod_xml(ids: &[&str]) -> String {
    let ads: String = ids
        .iter()
        .enumerate()
        .map(|(index, id)| inline_ad(id, &[640]).replacen("<Ad ", &format!("<Ad sequence=\"{}\" ", index + 1), 1))
        .collect();
    document(&ads)
}

/// Inline ad shipping a VPAID creative next to an mp4 fallback
pub fn vpaid_xml(id: &str) -> String {
    let media = format!(
        "<MediaFile delivery=\"progressive\" type=\"application/javascript\" apiFramework=\"VPAID\" width=\"640\" height=\"360\">http://cdn/{id}/creative.js</MediaFile>{mp4}",
        id = id,
        mp4 = media_files(id, &[640])
    );
    let ad_parameters = format!("<AdParameters><![CDATA[{{\"id\":\"{}\"}}]]></AdParameters>", id);
    document(&inline_ad_with(id, &media, &ad_parameters))
}

/// Serves canned documents by tag
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<HashMap<String, String>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, tag: &str, body: impl Into<String>) -> Self {
        self.responses.lock().insert(tag.to_string(), body.into());
        self
    }

    /// Answer `tag` only after `delay`
    pub fn delayed(self, tag: &str, delay: Duration) -> Self {
        self.delays.lock().insert(tag.to_string(), delay);
        self
    }

    /// Tags requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TagFetcher for MockFetcher {
    async fn fetch(&self, tag: &str) -> Result<FetchedTag> {
        self.requests.lock().push(tag.to_string());

        let delay = self.delays.lock().get(tag).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let body = self.responses.lock().get(tag).cloned();
        let body = body.ok_or_else(|| VastError::Fetch {
            tag: tag.to_string(),
            reason: "404 Not Found".into(),
        })?;

        Ok(FetchedTag {
            body,
            response: TagResponse {
                url: tag.to_string(),
                status: Some(200),
                content_type: Some("application/xml".into()),
            },
        })
    }
}

/// Records every pixel instead of firing it
#[derive(Clone, Default)]
pub struct RecordingTracker {
    urls: Arc<Mutex<Vec<String>>>,
}

impl RecordingTracker {
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

impl PixelTracker for RecordingTracker {
    fn track(&self, url: &str) {
        self.urls.lock().push(url.to_string());
    }
}

struct VideoState {
    source: Option<String>,
    paused: bool,
    current_time: f64,
    volume: f64,
    muted: bool,
    looping: bool,
    calls: Vec<String>,
}

/// Video element that plays `video/mp4` only
#[derive(Clone)]
pub struct MockVideo {
    state: Arc<Mutex<VideoState>>,
    /// Announces playback on `play()`, like an element that starts at once
    autoplay: Option<broadcast::Sender<SurfaceEvent>>,
}

impl MockVideo {
    pub fn new() -> Self {
        MockVideo {
            state: Arc::new(Mutex::new(VideoState {
                source: None,
                paused: true,
                current_time: 0.0,
                volume: 1.0,
                muted: false,
                looping: true,
                calls: Vec::new(),
            })),
            autoplay: None,
        }
    }

    pub fn looping(&self) -> bool {
        self.state.lock().looping
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: &str) {
        self.state.lock().calls.push(call.to_string());
    }
}

impl VideoElement for MockVideo {
    fn can_play_type(&self, mime_type: &str) -> bool {
        mime_type == "video/mp4"
    }

    fn set_source(&self, url: &str) {
        self.record("setSource");
        let mut state = self.state.lock();
        state.source = Some(url.to_string());
        state.paused = true;
        state.current_time = 0.0;
    }

    fn source(&self) -> Option<String> {
        self.state.lock().source.clone()
    }

    fn play(&self) {
        self.record("play");
        self.state.lock().paused = false;
        if let Some(events) = &self.autoplay {
            let _ = events.send(SurfaceEvent::Play);
            let _ = events.send(SurfaceEvent::TimeUpdate {
                current_time: 0.1,
                duration: Some(20.0),
            });
        }
    }

    fn pause(&self) {
        self.record("pause");
        self.state.lock().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, seconds: f64) {
        self.record("setCurrentTime");
        self.state.lock().current_time = seconds;
    }

    fn duration(&self) -> Option<f64> {
        Some(20.0)
    }

    fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    fn set_volume(&self, volume: f64) {
        self.record("setVolume");
        self.state.lock().volume = volume;
    }

    fn muted(&self) -> bool {
        self.state.lock().muted
    }

    fn set_muted(&self, muted: bool) {
        self.record("setMuted");
        self.state.lock().muted = muted;
    }

    fn set_loop(&self, looping: bool) {
        self.state.lock().looping = looping;
    }
}

/// Creative that acknowledges every call the way a well-behaved one does
#[derive(Clone)]
pub struct MockCreative {
    version: String,
    silent_on_start: bool,
    silent_on_resize: bool,
    draws_icons: bool,
    calls: Arc<Mutex<Vec<String>>>,
    volume: Arc<Mutex<f64>>,
    init: Arc<Mutex<Option<InitAdParams>>>,
    events: Arc<Mutex<Option<mpsc::UnboundedSender<VpaidEvent>>>>,
}

impl MockCreative {
    pub fn new(version: &str) -> Self {
        MockCreative {
            version: version.to_string(),
            silent_on_start: false,
            silent_on_resize: false,
            draws_icons: false,
            calls: Arc::default(),
            volume: Arc::new(Mutex::new(1.0)),
            init: Arc::default(),
            events: Arc::default(),
        }
    }

    /// Never answers `startAd`
    pub fn silent_on_start(mut self) -> Self {
        self.silent_on_start = true;
        self
    }

    /// Never answers `resizeAd`
    pub fn silent_on_resize(mut self) -> Self {
        self.silent_on_resize = true;
        self
    }

    /// Reports that it draws its own icons
    pub fn with_icons(mut self) -> Self {
        self.draws_icons = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn init_params(&self) -> Option<InitAdParams> {
        self.init.lock().clone()
    }

    /// Send `event` as if the creative raised it
    pub fn emit(&self, event: VpaidEvent) {
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.send(event);
        }
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }
}

impl VpaidCreative for MockCreative {
    fn handshake_version(&self, _player_version: &str) -> String {
        self.record("handshakeVersion");
        self.version.clone()
    }

    fn init_ad(&self, params: &InitAdParams) {
        self.record("initAd");
        *self.init.lock() = Some(params.clone());
        self.emit(VpaidEvent::AdLoaded);
    }

    fn start_ad(&self) {
        self.record("startAd");
        if !self.silent_on_start {
            self.emit(VpaidEvent::AdStarted);
        }
    }

    fn stop_ad(&self) {
        self.record("stopAd");
        self.emit(VpaidEvent::AdStopped);
    }

    fn pause_ad(&self) {
        self.record("pauseAd");
        self.emit(VpaidEvent::AdPaused);
    }

    fn resume_ad(&self) {
        self.record("resumeAd");
        self.emit(VpaidEvent::AdPlaying);
    }

    fn skip_ad(&self) {
        self.record("skipAd");
        self.emit(VpaidEvent::AdSkipped);
    }

    fn resize_ad(&self, _width: f64, _height: f64, _view_mode: ViewMode) {
        self.record("resizeAd");
        if !self.silent_on_resize {
            self.emit(VpaidEvent::AdSizeChange);
        }
    }

    fn set_ad_volume(&self, volume: f64) {
        self.record("setAdVolume");
        *self.volume.lock() = volume;
    }

    fn get_ad_volume(&self) -> f64 {
        *self.volume.lock()
    }

    fn get_ad_icons(&self) -> Option<bool> {
        Some(self.draws_icons)
    }

    fn subscribe(&self, events: mpsc::UnboundedSender<VpaidEvent>) {
        *self.events.lock() = Some(events);
    }
}

/// Executes `application/javascript` and hands out the provided creative
#[derive(Clone, Default)]
pub struct MockSandbox {
    creative: Arc<Mutex<Option<MockCreative>>>,
    loaded: Arc<Mutex<Vec<String>>>,
}

impl MockSandbox {
    pub fn provide(&self, creative: MockCreative) {
        *self.creative.lock() = Some(creative);
    }

    /// Sources loaded so far
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }
}

#[async_trait]
impl ScriptSandbox for MockSandbox {
    fn can_execute(&self, mime_type: &str) -> bool {
        mime_type == "application/javascript"
    }

    async fn load_creative(&self, src: &str) -> Result<Arc<dyn VpaidCreative>> {
        self.loaded.lock().push(src.to_string());
        let creative = self.creative.lock().clone();
        match creative {
            Some(creative) => Ok(Arc::new(creative)),
            None => Err(VastError::Creative(format!("{} exposes no entry point", src))),
        }
    }
}

struct SurfaceState {
    size: Size,
    rendered: Vec<(usize, IconPlacement)>,
    removed: Vec<usize>,
    opened: Vec<String>,
    skip_control: bool,
}

/// In-memory surface; clones share state
#[derive(Clone)]
pub struct MockSurface {
    state: Arc<Mutex<SurfaceState>>,
    video: MockVideo,
    sandbox: MockSandbox,
    events: broadcast::Sender<SurfaceEvent>,
    destroyed: Arc<AtomicBool>,
}

impl MockSurface {
    pub fn new(size: Size) -> Self {
        let (events, _) = broadcast::channel(64);
        MockSurface {
            state: Arc::new(Mutex::new(SurfaceState {
                size,
                rendered: Vec::new(),
                removed: Vec::new(),
                opened: Vec::new(),
                skip_control: false,
            })),
            video: MockVideo::new(),
            sandbox: MockSandbox::default(),
            events,
            destroyed: Arc::default(),
        }
    }

    /// A surface whose video reports progress as soon as it plays
    pub fn autoplaying(size: Size) -> Self {
        let mut surface = Self::new(size);
        surface.video.autoplay = Some(surface.events.clone());
        surface
    }

    /// Broadcast `event` to the subscribers
    pub fn send(&self, event: SurfaceEvent) {
        let _ = self.events.send(event);
    }

    pub fn video_mock(&self) -> MockVideo {
        self.video.clone()
    }

    pub fn sandbox_mock(&self) -> MockSandbox {
        self.sandbox.clone()
    }

    pub fn rendered_icons(&self) -> Vec<(usize, IconPlacement)> {
        self.state.lock().rendered.clone()
    }

    pub fn removed_icons(&self) -> Vec<usize> {
        self.state.lock().removed.clone()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }

    pub fn skip_control_visible(&self) -> bool {
        self.state.lock().skip_control
    }
}

#[async_trait]
impl PlaybackSurface for MockSurface {
    fn size(&self) -> Size {
        self.state.lock().size
    }

    fn view_mode(&self) -> ViewMode {
        ViewMode::Normal
    }

    fn pixel_ratio(&self) -> f64 {
        1.0
    }

    fn video(&self) -> Arc<dyn VideoElement> {
        Arc::new(self.video.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    fn supports_autoplay(&self) -> bool {
        true
    }

    fn slot_handle(&self) -> String {
        "slot-1".into()
    }

    async fn sandbox(&self) -> Result<Arc<dyn ScriptSandbox>> {
        Ok(Arc::new(self.sandbox.clone()))
    }

    fn render_icon(&self, index: usize, _icon: &IconDefinition, placement: IconPlacement) {
        self.state.lock().rendered.push((index, placement));
    }

    fn remove_icon(&self, index: usize) {
        self.state.lock().removed.push(index);
    }

    fn show_skip_control(&self, visible: bool) {
        self.state.lock().skip_control = visible;
    }

    fn open_url(&self, url: &str) {
        self.state.lock().opened.push(url.to_string());
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Hands out mock surfaces and keeps them for inspection
#[derive(Clone)]
pub struct MockHost {
    size: Size,
    autoplay: bool,
    creative: Option<MockCreative>,
    surfaces: Arc<Mutex<Vec<MockSurface>>>,
}

impl MockHost {
    /// Surfaces whose video reports progress as soon as it plays
    pub fn new(size: Size) -> Self {
        MockHost {
            size,
            autoplay: true,
            creative: None,
            surfaces: Arc::default(),
        }
    }

    /// Surfaces whose video never reports progress
    pub fn silent(mut self) -> Self {
        self.autoplay = false;
        self
    }

    /// Every sandbox hands out `creative`
    pub fn with_creative(mut self, creative: MockCreative) -> Self {
        self.creative = Some(creative);
        self
    }

    pub fn surfaces(&self) -> Vec<MockSurface> {
        self.surfaces.lock().clone()
    }
}

impl SurfaceHost for MockHost {
    fn create_surface(&self) -> Result<Arc<dyn PlaybackSurface>> {
        let surface = if self.autoplay {
            MockSurface::autoplaying(self.size)
        } else {
            MockSurface::new(self.size)
        };
        if let Some(creative) = &self.creative {
            surface.sandbox_mock().provide(creative.clone());
        }
        self.surfaces.lock().push(surface.clone());
        Ok(Arc::new(surface))
    }
}

/// `initAd` arguments for a creative playing on `surface`
pub fn init_params(surface: &MockSurface) -> InitAdParams {
    let size = surface.size();
    InitAdParams {
        width: size.width,
        height: size.height,
        view_mode: ViewMode::Normal,
        desired_bitrate: -1,
        creative_data: CreativeData::default(),
        environment: EnvironmentVars {
            slot: surface.slot_handle(),
            video_slot: surface.video(),
            video_slot_can_autoplay: surface.supports_autoplay(),
        },
    }
}
