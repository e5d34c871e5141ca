use serde::{Deserialize, Serialize};

/// Represents a VAST document (Video Ad Serving Template)
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Vast {
    /// The VAST version (e.g., "2.0", "3.0", "4.0", etc.)
    pub version: String,

    /// The Ad elements within the VAST document
    pub ads: Vec<Ad>,

    /// Root level error URIs, used by "no ad" responses
    pub errors: Vec<String>,
}

/// Represents an Ad within a VAST document
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Ad {
    /// The ad ID
    pub id: Option<String>,

    /// The ad sequence number (for ad pods)
    pub sequence: Option<u32>,

    /// The conditional ad flag (VAST 4.0+)
    pub conditional_ad: Option<bool>,

    /// The in-line ad details
    pub inline: Option<InLine>,

    /// The wrapper ad details
    pub wrapper: Option<Wrapper>,
}

impl Ad {
    pub fn is_wrapper(&self) -> bool {
        self.wrapper.is_some()
    }

    pub fn is_inline(&self) -> bool {
        self.inline.is_some()
    }

    /// Whether the ad belongs to a pod
    pub fn is_pod_ad(&self) -> bool {
        self.sequence.is_some()
    }

    /// The tag to request next when this ad is a wrapper
    pub fn vast_ad_tag_uri(&self) -> Option<&str> {
        self.wrapper
            .as_ref()
            .map(|wrapper| wrapper.vast_ad_tag_uri.trim())
            .filter(|uri| !uri.is_empty())
    }

    pub fn impressions(&self) -> &[Impression] {
        match (&self.inline, &self.wrapper) {
            (Some(inline), _) => &inline.impressions,
            (None, Some(wrapper)) => &wrapper.impressions,
            _ => &[],
        }
    }

    pub fn errors(&self) -> &[String] {
        match (&self.inline, &self.wrapper) {
            (Some(inline), _) => &inline.errors,
            (None, Some(wrapper)) => &wrapper.errors,
            _ => &[],
        }
    }

    pub fn creatives(&self) -> &[Creative] {
        match (&self.inline, &self.wrapper) {
            (Some(inline), _) => &inline.creatives,
            (None, Some(wrapper)) => &wrapper.creatives,
            _ => &[],
        }
    }

    pub fn viewable_impression(&self) -> Option<&ViewableImpression> {
        match (&self.inline, &self.wrapper) {
            (Some(inline), _) => inline.viewable_impression.as_ref(),
            (None, Some(wrapper)) => wrapper.viewable_impression.as_ref(),
            _ => None,
        }
    }

    /// Linear creatives of the ad, in document order
    pub fn linears(&self) -> impl Iterator<Item = &Linear> {
        self.creatives()
            .iter()
            .filter_map(|creative| creative.linear.as_ref())
    }

    /// The first linear creative
    pub fn linear(&self) -> Option<&Linear> {
        self.linears().next()
    }

    /// Whether the ad ships an executable (VPAID) creative
    pub fn has_executable_creative(&self) -> bool {
        self.linears()
            .flat_map(|linear| linear.media_files.iter())
            .any(MediaFile::is_vpaid)
    }
}

/// Represents an InLine ad, which contains all the media files and tracking information
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct InLine {
    /// The ad system name and version
    pub ad_system: AdSystem,

    /// The ad title
    pub ad_title: String,

    /// Impression tracking URLs
    pub impressions: Vec<Impression>,

    pub description: Option<String>,

    pub advertiser: Option<String>,

    /// Error tracking URLs
    pub errors: Vec<String>,

    /// Pricing information
    pub pricing: Option<Pricing>,

    pub extensions: Vec<Extension>,

    /// Creative elements
    pub creatives: Vec<Creative>,

    /// Viewable impression tracking (VAST 4.0+)
    pub viewable_impression: Option<ViewableImpression>,
}

/// Represents a Wrapper ad, which references another VAST document
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Wrapper {
    /// The ad system name and version
    pub ad_system: AdSystem,

    /// The URL of the next VAST document
    pub vast_ad_tag_uri: String,

    /// Impression tracking URLs
    pub impressions: Vec<Impression>,

    /// Error tracking URLs
    pub errors: Vec<String>,

    pub extensions: Vec<Extension>,

    /// Creative elements, usually carrying tracking only
    pub creatives: Vec<Creative>,

    pub viewable_impression: Option<ViewableImpression>,

    /// `followAdditionalWrappers` attribute
    pub follow_additional_wrappers: Option<bool>,

    /// `allowMultipleAds` attribute
    pub allow_multiple_ads: Option<bool>,

    /// `fallbackOnNoAd` attribute
    pub fallback_on_no_ad: Option<bool>,
}

/// Represents the ad system information
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct AdSystem {
    pub name: String,
    pub version: Option<String>,
}

/// Represents an impression tracking URL
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Impression {
    pub id: Option<String>,
    pub url: String,
}

/// Represents pricing information
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Pricing {
    /// The pricing model (e.g., "CPM", "CPC", etc.)
    pub model: String,

    /// The pricing currency (e.g., "USD", "EUR", etc.)
    pub currency: String,

    pub value: String,
}

/// Represents an extension
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Extension {
    pub r#type: Option<String>,
    pub content: String,
}

/// Represents a creative element
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Creative {
    pub id: Option<String>,
    pub sequence: Option<u32>,
    pub ad_id: Option<String>,
    pub api_framework: Option<String>,

    /// Linear ad details
    pub linear: Option<Linear>,
}

/// Represents a linear ad
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Linear {
    /// The duration of the ad (HH:MM:SS or HH:MM:SS.mmm)
    pub duration: Option<String>,

    /// The `skipoffset` attribute, a time or a percentage
    pub skip_offset: Option<String>,

    /// Opaque data handed to executable creatives
    pub ad_parameters: Option<AdParameters>,

    pub media_files: Vec<MediaFile>,

    pub video_clicks: Option<VideoClicks>,

    pub tracking_events: Vec<TrackingEvent>,

    pub icons: Vec<Icon>,
}

/// Represents the AdParameters element
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AdParameters {
    pub xml_encoded: bool,
    pub value: String,
}

/// Represents a media file
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct MediaFile {
    /// The media file URL
    pub url: String,

    /// The media file MIME type
    pub mime_type: String,

    pub codec: Option<String>,

    pub bitrate: Option<u32>,

    pub width: Option<u32>,

    pub height: Option<u32>,

    /// The media file delivery type (progressive or streaming)
    pub delivery: Option<String>,

    /// The API framework, "VPAID" for executable creatives
    pub api_framework: Option<String>,
}

impl MediaFile {
    pub fn is_vpaid(&self) -> bool {
        self.api_framework
            .as_deref()
            .is_some_and(|framework| framework.eq_ignore_ascii_case("VPAID"))
    }
}

/// Represents video click-through and click-tracking URLs
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct VideoClicks {
    pub click_through: Option<String>,
    pub click_tracking: Vec<String>,
    pub custom_click: Vec<String>,
}

/// Represents a tracking event
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TrackingEvent {
    /// The event type (e.g., "start", "firstQuartile", "midpoint", "thirdQuartile", "complete", etc.)
    pub event: String,

    /// The tracking URL
    pub url: String,

    /// Offset of "progress" events
    pub offset: Option<String>,
}

/// Represents an industry icon (AdChoices and friends)
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Icon {
    pub program: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,

    /// "left", "right" or a pixel offset
    pub x_position: Option<String>,

    /// "top", "bottom" or a pixel offset
    pub y_position: Option<String>,

    pub offset: Option<String>,
    pub duration: Option<String>,
    pub api_framework: Option<String>,
    pub px_ratio: Option<f64>,
    pub resource: Option<IconResource>,
    pub click_through: Option<String>,
    pub click_tracking: Vec<String>,
    pub view_tracking: Vec<String>,
}

/// The renderable resource of an icon
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IconResource {
    Static {
        uri: String,
        creative_type: Option<String>,
    },
    Html(String),
    IFrame(String),
}

impl IconResource {
    /// The URI or markup that identifies the resource
    pub fn key(&self) -> &str {
        match self {
            IconResource::Static { uri, .. } => uri,
            IconResource::Html(markup) => markup,
            IconResource::IFrame(uri) => uri,
        }
    }
}

/// Represents the ViewableImpression element
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct ViewableImpression {
    pub id: Option<String>,
    pub viewable: Vec<String>,
    pub not_viewable: Vec<String>,
    pub view_undetermined: Vec<String>,
}
