//! Follows wrapper redirects down to an inline ad.
//!
//! Failures never escape as `Err`: they are recorded on the newest record of
//! the returned chain, with their VAST error code, so callers can decide to
//! try another candidate. The only `Err` is asking for the next ad of a chain
//! that has nothing left to give.

use crate::chain::{ResolutionChain, ResolutionRecord, VastDocument};
use crate::error::{Result, VastError};
use crate::fetch::{HttpFetcher, TagFetcher};
use crate::options::{EffectiveOptions, RequestOptions};
use crate::parser;
use crate::timing::Deadline;
use log::{debug, warn};
use std::sync::Arc;

/// Resolves VAST tags into resolution chains
#[derive(Clone)]
pub struct Resolver {
    fetcher: Arc<dyn TagFetcher>,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn TagFetcher>) -> Self {
        Resolver { fetcher }
    }

    /// A resolver backed by [`HttpFetcher`]
    pub fn http() -> Result<Self> {
        Ok(Self::new(Arc::new(HttpFetcher::new()?)))
    }

    /// Resolve `tag`, bounded by `options.timeout`
    pub async fn request_ad(&self, tag: &str, options: &RequestOptions) -> ResolutionChain {
        self.request_ad_within(tag, options, Deadline::from_millis(options.timeout))
            .await
    }

    /// Resolve `tag` under a deadline shared with the caller
    pub async fn request_ad_within(
        &self,
        tag: &str,
        options: &RequestOptions,
        deadline: Deadline,
    ) -> ResolutionChain {
        self.follow(Some(tag.to_string()), ResolutionChain::new(), options, deadline)
            .await
    }

    /// Resolve the next untried ad of an already resolved chain
    pub async fn request_next_ad(
        &self,
        chain: &ResolutionChain,
        options: &RequestOptions,
    ) -> Result<ResolutionChain> {
        self.request_next_ad_within(chain, options, Deadline::from_millis(options.timeout))
            .await
    }

    /// Walks the chain from the newest record towards the first, taking the
    /// first record whose document still has an ad to offer
    pub async fn request_next_ad_within(
        &self,
        chain: &ResolutionChain,
        options: &RequestOptions,
        deadline: Deadline,
    ) -> Result<ResolutionChain> {
        if chain.is_empty() {
            return Err(VastError::InvalidChain("empty chain".to_string()));
        }

        let mut remaining = chain.clone();
        while let Some(head) = remaining.head() {
            let effective = options.effective(remaining.parent_wrapper(0));

            if let Some(index) = head.next_candidate(&effective) {
                if let Some(document) = head.document() {
                    document.mark_requested(index);
                }
                debug!("Trying ad #{} of '{}'", index, head.request_tag());

                let record = validate(head.clone().with_candidate(index), &effective);
                let tag = record.next_tag().map(str::to_string);
                let chain = remaining.tail().prepend(record);
                return Ok(self.follow(tag, chain, options, deadline).await);
            }

            remaining = remaining.tail();
        }

        Err(VastError::InvalidChain("no next ad to request".to_string()))
    }

    /// Fetch hops until the head is inline or failed
    async fn follow(
        &self,
        mut tag: Option<String>,
        mut chain: ResolutionChain,
        options: &RequestOptions,
        deadline: Deadline,
    ) -> ResolutionChain {
        while let Some(next) = tag.take() {
            let effective = options.effective(chain.head().and_then(ResolutionRecord::wrapper));
            let record = self.hop(&next, chain.len(), &effective, deadline).await;

            if let Some(error) = record.error() {
                warn!("Resolving '{}' failed: {}", next, error);
            }
            tag = record.next_tag().map(str::to_string);
            chain = chain.prepend(record);
        }
        chain
    }

    /// Fetch, parse and validate one tag
    async fn hop(
        &self,
        tag: &str,
        depth: usize,
        options: &EffectiveOptions,
        deadline: Deadline,
    ) -> ResolutionRecord {
        let record = ResolutionRecord::new(tag);

        if depth > options.wrapper_limit {
            return record.failed(VastError::WrapperLimit(options.wrapper_limit));
        }

        let fetched = match deadline.remaining() {
            Some(remaining) if remaining.is_zero() => Err(VastError::ResolveTimeout(tag.to_string())),
            Some(remaining) => tokio::time::timeout(remaining, self.fetcher.fetch(tag))
                .await
                .unwrap_or_else(|_| Err(VastError::ResolveTimeout(tag.to_string()))),
            None => self.fetcher.fetch(tag).await,
        };

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(error) => return record.failed(transport_error(tag, error)),
        };
        debug!("Fetched '{}' ({} bytes)", tag, fetched.body.len());

        let xml: Arc<str> = Arc::from(fetched.body);
        let record = record.with_response(fetched.response, xml.clone());

        let vast = match parser::parse_vast(&xml) {
            Ok(vast) => vast,
            Err(error) => return record.failed(error),
        };

        let document = Arc::new(VastDocument::new(vast));
        let record = record.with_document(document.clone());

        let Some(index) = document.first_ad_index() else {
            return record.failed(VastError::NoAds);
        };
        document.mark_requested(index);

        validate(record.with_candidate(index), options)
    }
}

/// Check the selected ad against the options in force
fn validate(record: ResolutionRecord, options: &EffectiveOptions) -> ResolutionRecord {
    match rejection(&record, options) {
        Some(error) => record.failed(error),
        None => record,
    }
}

fn rejection(record: &ResolutionRecord, options: &EffectiveOptions) -> Option<VastError> {
    let Some(ad) = record.candidate() else {
        return Some(VastError::NoAds);
    };
    let pod = record.document().is_some_and(|document| document.has_ad_pod());

    if pod && !options.allow_multiple_ads {
        Some(VastError::MultipleAdsNotAllowed)
    } else if ad.is_wrapper() && !options.follow_additional_wrappers {
        Some(VastError::WrappersNotAllowed)
    } else if !ad.is_wrapper() && !ad.is_inline() {
        Some(VastError::InvalidAd)
    } else if ad.is_wrapper() && ad.vast_ad_tag_uri().is_none() {
        Some(VastError::MissingField("VASTAdTagURI".to_string()))
    } else {
        None
    }
}

/// Every way a fetch can fail is reported as a resolution timeout/failure
fn transport_error(tag: &str, error: VastError) -> VastError {
    match error {
        VastError::Fetch { .. } | VastError::ResolveTimeout(_) | VastError::UrlError(_) => error,
        other => VastError::Fetch {
            tag: tag.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Resolve `tag` over HTTP with a one-off resolver
pub async fn request_ad(tag: &str, options: &RequestOptions) -> Result<ResolutionChain> {
    Ok(Resolver::http()?.request_ad(tag, options).await)
}

/// Resolve the next candidate of `chain` over HTTP
pub async fn request_next_ad(chain: &ResolutionChain, options: &RequestOptions) -> Result<ResolutionChain> {
    Resolver::http()?.request_next_ad(chain, options).await
}
