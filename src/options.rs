//! Options for resolving and playing ads.
//!
//! Plain data lives in serde structs so it can come from a settings file;
//! collaborators and callbacks are attached separately.

use crate::chain::ResolutionChain;
use crate::error::VastError;
use crate::models::{MediaFile, Wrapper};
use crate::surface::Size;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_WRAPPER_LIMIT: usize = 5;

/// Options of the chain resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestOptions {
    /// Maximum number of wrapper redirects
    pub wrapper_limit: usize,

    /// Whether ad pods are accepted; falls back to the parent wrapper's attribute, then true
    pub allow_multiple_ads: Option<bool>,

    /// Whether a wrapper may lead to another wrapper; same fallback as above
    pub follow_additional_wrappers: Option<bool>,

    /// Whether other ads of a document may replace a failed one; same fallback as above
    pub fallback_on_no_ad: Option<bool>,

    /// Prefer standalone ads over the next pod member when advancing
    pub use_ad_buffet: bool,

    /// Request budget in milliseconds, shared by every hop
    pub timeout: Option<u64>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        RequestOptions {
            wrapper_limit: DEFAULT_WRAPPER_LIMIT,
            allow_multiple_ads: None,
            follow_additional_wrappers: None,
            fallback_on_no_ad: None,
            use_ad_buffet: false,
            timeout: None,
        }
    }
}

/// Request options after merging in the parent wrapper's attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveOptions {
    pub wrapper_limit: usize,
    pub allow_multiple_ads: bool,
    pub follow_additional_wrappers: bool,
    pub fallback_on_no_ad: bool,
    pub use_ad_buffet: bool,
}

impl RequestOptions {
    /// Caller options win; wrapper attributes fill what the caller left unset
    pub fn effective(&self, parent: Option<&Wrapper>) -> EffectiveOptions {
        let inherited = |own: Option<bool>, wrapper: Option<bool>| own.or(wrapper).unwrap_or(true);

        EffectiveOptions {
            wrapper_limit: self.wrapper_limit,
            allow_multiple_ads: inherited(
                self.allow_multiple_ads,
                parent.and_then(|wrapper| wrapper.allow_multiple_ads),
            ),
            follow_additional_wrappers: inherited(
                self.follow_additional_wrappers,
                parent.and_then(|wrapper| wrapper.follow_additional_wrappers),
            ),
            fallback_on_no_ad: inherited(
                self.fallback_on_no_ad,
                parent.and_then(|wrapper| wrapper.fallback_on_no_ad),
            ),
            use_ad_buffet: self.use_ad_buffet,
        }
    }
}

/// Options of an ad unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UnitOptions {
    /// Pause while less than half of the surface is visible
    pub viewability: bool,

    /// Follow surface size changes
    pub responsive: bool,

    pub pause_on_ad_click: bool,

    /// Allow executable (VPAID) creatives
    pub vpaid_enabled: bool,

    /// Budget in milliseconds for the ad to start once resolved
    pub timeout: Option<u64>,
}

impl Default for UnitOptions {
    fn default() -> Self {
        UnitOptions {
            viewability: false,
            responsive: false,
            pause_on_ad_click: true,
            vpaid_enabled: true,
            timeout: None,
        }
    }
}

pub type MediaSelector = Arc<dyn Fn(&[MediaFile], Size) -> Option<MediaFile> + Send + Sync>;
pub type SkipOffsetSelector = Arc<dyn Fn(&ResolutionChain) -> Option<f64> + Send + Sync>;
pub type ChainValidator = Arc<dyn Fn(&ResolutionChain) -> Result<(), VastError> + Send + Sync>;
pub type ChainTransformer = Arc<dyn Fn(ResolutionChain) -> ResolutionChain + Send + Sync>;

/// Overrides for decisions the engine makes by default
#[derive(Clone, Default)]
pub struct Hooks {
    /// Pick the media file to play among the playable ones
    pub get_media_file: Option<MediaSelector>,

    /// Skip offset in seconds
    pub get_skip_offset: Option<SkipOffsetSelector>,

    pub validate_chain: Option<ChainValidator>,

    pub transform_chain: Option<ChainTransformer>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("get_media_file", &self.get_media_file.is_some())
            .field("get_skip_offset", &self.get_skip_offset.is_some())
            .field("validate_chain", &self.validate_chain.is_some())
            .field("transform_chain", &self.transform_chain.is_some())
            .finish()
    }
}
