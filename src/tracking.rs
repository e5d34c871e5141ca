//! Tracking pixels and their macros.
//!
//! URIs are gathered from every ad of the chain, so wrapper impressions,
//! tracking events and error URIs fire together with the inline ad's own.

use crate::chain::ResolutionChain;
use crate::error::ErrorCode;
use crate::events::AdEvent;
use crate::models::Ad;
use crate::timing::{format_clock, Offset};
use chrono::{SecondsFormat, Utc};
use log::{debug, trace};
use rand::{thread_rng, Rng};

/// Fires a tracking pixel
pub trait PixelTracker: Send + Sync {
    fn track(&self, url: &str);
}

/// Fire-and-forget GET requests on the current tokio runtime
#[derive(Debug, Clone, Default)]
pub struct HttpPixelTracker {
    client: reqwest::Client,
}

impl HttpPixelTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PixelTracker for HttpPixelTracker {
    fn track(&self, url: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime to fire pixel {}", url);
            return;
        };
        let client = self.client.clone();
        let url = url.to_string();
        handle.spawn(async move {
            if let Err(e) = client.get(&url).send().await {
                debug!("Pixel {} failed: {}", url, e);
            }
        });
    }
}

/// Values substituted into tracking URIs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingContext {
    pub error_code: Option<ErrorCode>,

    /// Current playback position in seconds
    pub content_playhead: Option<f64>,

    pub asset_uri: Option<String>,

    /// Ad duration, needed to place percentage progress offsets
    pub duration: Option<f64>,
}

/// Replace the VAST macros of `url`; macros without a value are left as they are
pub fn substitute_macros(url: &str, context: &TrackingContext) -> String {
    let cache_busting = format!("{:08}", thread_rng().gen_range(0..100_000_000u32));
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let mut url = url
        .replace("[CACHEBUSTING]", &cache_busting)
        .replace("[TIMESTAMP]", &encode(&timestamp));

    if let Some(code) = context.error_code {
        url = url.replace("[ERRORCODE]", &code.to_string());
    }
    if let Some(playhead) = context.content_playhead {
        url = url.replace("[CONTENTPLAYHEAD]", &encode(&format_clock(playhead)));
    }
    if let Some(asset_uri) = &context.asset_uri {
        url = url.replace("[ASSETURI]", &encode(asset_uri));
    }

    url
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// URIs tracked for `event` across every ad of the chain
pub fn event_uris(chain: &ResolutionChain, event: &AdEvent, duration: Option<f64>) -> Vec<String> {
    chain
        .ads()
        .flat_map(|ad| ad_event_uris(ad, event, duration))
        .collect()
}

fn ad_event_uris(ad: &Ad, event: &AdEvent, duration: Option<f64>) -> Vec<String> {
    match event {
        AdEvent::Impression => ad.impressions().iter().map(|i| i.url.clone()).collect(),
        AdEvent::ClickThrough => ad
            .linears()
            .filter_map(|linear| linear.video_clicks.as_ref())
            .flat_map(|clicks| clicks.click_tracking.iter().cloned())
            .collect(),
        AdEvent::Viewable | AdEvent::NotViewable | AdEvent::ViewUndetermined => {
            let Some(viewable) = ad.viewable_impression() else {
                return Vec::new();
            };
            match event {
                AdEvent::Viewable => viewable.viewable.clone(),
                AdEvent::NotViewable => viewable.not_viewable.clone(),
                _ => viewable.view_undetermined.clone(),
            }
        }
        AdEvent::Progress { offset } => ad
            .linears()
            .flat_map(|linear| linear.tracking_events.iter())
            .filter(|tracking| tracking.event == "progress")
            .filter(|tracking| {
                tracking
                    .offset
                    .as_deref()
                    .and_then(Offset::parse)
                    .and_then(|at| at.seconds(duration))
                    .is_some_and(|at| (at - offset).abs() < 1e-3)
            })
            .map(|tracking| tracking.url.clone())
            .collect(),
        _ => match event.tracking_name() {
            Some(name) => ad
                .linears()
                .flat_map(|linear| linear.tracking_events.iter())
                .filter(|tracking| tracking.event == name)
                .map(|tracking| tracking.url.clone())
                .collect(),
            None => Vec::new(),
        },
    }
}

/// `progress` offsets declared anywhere in the chain
pub fn progress_marks(chain: &ResolutionChain) -> Vec<Offset> {
    chain
        .ads()
        .flat_map(Ad::linears)
        .flat_map(|linear| linear.tracking_events.iter())
        .filter(|tracking| tracking.event == "progress")
        .filter_map(|tracking| tracking.offset.as_deref().and_then(Offset::parse))
        .collect()
}

pub fn track_uris<I, S>(uris: I, context: &TrackingContext, tracker: &dyn PixelTracker)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for uri in uris {
        let url = substitute_macros(uri.as_ref(), context);
        trace!("Tracking {}", url);
        tracker.track(&url);
    }
}

pub fn track_event(
    chain: &ResolutionChain,
    event: &AdEvent,
    context: &TrackingContext,
    tracker: &dyn PixelTracker,
) {
    track_uris(event_uris(chain, event, context.duration), context, tracker);
}

/// Report `code` to the error URIs of every record in the chain
pub fn track_error(chain: &ResolutionChain, code: ErrorCode, tracker: &dyn PixelTracker) {
    debug!("Tracking error {}", code);
    let context = TrackingContext {
        error_code: Some(code),
        ..TrackingContext::default()
    };
    let uris: Vec<String> = chain.iter().flat_map(|record| record.error_uris()).collect();
    track_uris(uris, &context, tracker);
}
