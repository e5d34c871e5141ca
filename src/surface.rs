//! The playback surface an ad unit renders into.
//!
//! Rendering itself happens elsewhere; these traits are the seam a host
//! (browser bridge, native player, test double) implements.

use crate::bridge::VpaidCreative;
use crate::error::Result;
use crate::icons::{IconDefinition, IconPlacement};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Size { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Normal,
    Fullscreen,
    Thumbnail,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Normal => "normal",
            ViewMode::Fullscreen => "fullscreen",
            ViewMode::Thumbnail => "thumbnail",
        }
    }
}

/// Share of the surface currently on screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Visibility {
    /// Between 0 and 1
    Ratio(f64),
    /// The host can not measure visibility
    Undetermined,
}

/// Notifications from the surface and its video element
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    TimeUpdate { current_time: f64, duration: Option<f64> },
    Play,
    Pause,
    Ended,
    VolumeChange { volume: f64, muted: bool },
    FullscreenChange(bool),
    /// The user or page asked to move the playhead
    Seeking { target: f64 },
    Error { message: String },
    /// Click on the ad itself
    Click,
    SkipControlClick,
    IconClick(usize),
    Visibility(Visibility),
    Resized(Size),
}

/// The video element of a surface
pub trait VideoElement: Send + Sync {
    /// Whether the element can play `mime_type`
    fn can_play_type(&self, mime_type: &str) -> bool;
    fn set_source(&self, url: &str);
    fn source(&self) -> Option<String>;
    fn play(&self);
    fn pause(&self);
    fn is_paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&self, seconds: f64);
    fn duration(&self) -> Option<f64>;
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool);
    fn set_loop(&self, looping: bool);
}

/// Isolated environment executable creatives run in
#[async_trait]
pub trait ScriptSandbox: Send + Sync {
    fn can_execute(&self, mime_type: &str) -> bool;

    /// Load the creative at `src` and hand back its entry point
    async fn load_creative(&self, src: &str) -> Result<Arc<dyn VpaidCreative>>;
}

/// Where an ad unit plays; owned by exactly one unit at a time
#[async_trait]
pub trait PlaybackSurface: Send + Sync {
    fn size(&self) -> Size;
    fn view_mode(&self) -> ViewMode;

    /// Device pixel ratio, used to pick icon resources
    fn pixel_ratio(&self) -> f64;

    fn video(&self) -> Arc<dyn VideoElement>;

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent>;

    fn supports_autoplay(&self) -> bool;

    /// Opaque handle of the slot element handed to creatives
    fn slot_handle(&self) -> String;

    /// Create (or return) the sandbox of this surface
    async fn sandbox(&self) -> Result<Arc<dyn ScriptSandbox>>;

    fn render_icon(&self, index: usize, icon: &IconDefinition, placement: IconPlacement);
    fn remove_icon(&self, index: usize);

    fn show_skip_control(&self, visible: bool);

    fn open_url(&self, url: &str);

    /// Tear down everything the surface created
    fn destroy(&self);
    fn is_destroyed(&self) -> bool;
}

/// Creates a fresh surface for every playback attempt
pub trait SurfaceHost: Send + Sync {
    fn create_surface(&self) -> Result<Arc<dyn PlaybackSurface>>;
}
