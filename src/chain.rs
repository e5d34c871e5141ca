//! Resolution chains: the history of wrapper hops behind one ad.

use crate::error::{ErrorCode, VastError};
use crate::fetch::TagResponse;
use crate::models::{Ad, Vast, Wrapper};
use crate::options::{EffectiveOptions, RequestOptions};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A parsed VAST response shared by every record that points into it
///
/// Remembers which of its ads were already handed out so that asking for
/// the next candidate never returns the same ad twice.
pub struct VastDocument {
    vast: Vast,
    requested: Mutex<HashSet<usize>>,
}

impl VastDocument {
    pub fn new(vast: Vast) -> Self {
        VastDocument {
            vast,
            requested: Mutex::new(HashSet::new()),
        }
    }

    pub fn vast(&self) -> &Vast {
        &self.vast
    }

    pub fn ads(&self) -> &[Ad] {
        &self.vast.ads
    }

    /// More than one ad carries a sequence number
    pub fn has_ad_pod(&self) -> bool {
        self.vast.ads.iter().filter(|ad| ad.is_pod_ad()).count() > 1
    }

    /// The ad to play first: the lowest sequence of a pod, otherwise the first ad
    pub fn first_ad_index(&self) -> Option<usize> {
        if self.has_ad_pod() {
            return self
                .vast
                .ads
                .iter()
                .enumerate()
                .filter_map(|(index, ad)| ad.sequence.map(|sequence| (sequence, index)))
                .min()
                .map(|(_, index)| index);
        }
        if self.vast.ads.is_empty() { None } else { Some(0) }
    }

    pub fn is_requested(&self, index: usize) -> bool {
        self.requested.lock().contains(&index)
    }

    pub(crate) fn mark_requested(&self, index: usize) {
        self.requested.lock().insert(index);
    }

    /// The ad to try after `current` failed
    fn next_ad_index(&self, current: Option<usize>, options: &EffectiveOptions) -> Option<usize> {
        let requested = self.requested.lock();
        let mut available = (0..self.vast.ads.len()).filter(|index| !requested.contains(index));

        if self.has_ad_pod() {
            let ads = &self.vast.ads;
            let available: Vec<usize> = available.collect();

            let buffet = if options.use_ad_buffet {
                available.iter().copied().find(|&index| !ads[index].is_pod_ad())
            } else {
                None
            };

            buffet.or_else(|| {
                let sequence = current.and_then(|index| ads.get(index)).and_then(|ad| ad.sequence)?;
                available
                    .iter()
                    .copied()
                    .find(|&index| ads[index].sequence == Some(sequence + 1))
            })
        } else if options.fallback_on_no_ad {
            available.next()
        } else {
            None
        }
    }
}

impl fmt::Debug for VastDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VastDocument")
            .field("version", &self.vast.version)
            .field("ads", &self.vast.ads.len())
            .field("requested", &*self.requested.lock())
            .finish()
    }
}

/// One response in a resolution chain
///
/// A record either points at a usable ad or carries an error, never both.
#[derive(Debug, Clone)]
pub struct ResolutionRecord {
    request_tag: String,
    document: Option<Arc<VastDocument>>,
    xml: Option<Arc<str>>,
    candidate: Option<usize>,
    error: Option<VastError>,
    response: Option<TagResponse>,
}

impl ResolutionRecord {
    pub(crate) fn new(request_tag: impl Into<String>) -> Self {
        ResolutionRecord {
            request_tag: request_tag.into(),
            document: None,
            xml: None,
            candidate: None,
            error: None,
            response: None,
        }
    }

    /// A record selecting `candidate` in an already parsed document
    pub fn resolved(request_tag: impl Into<String>, document: Arc<VastDocument>, candidate: usize) -> Self {
        ResolutionRecord {
            document: Some(document),
            candidate: Some(candidate),
            ..ResolutionRecord::new(request_tag)
        }
    }

    pub(crate) fn with_response(mut self, response: TagResponse, xml: Arc<str>) -> Self {
        self.response = Some(response);
        self.xml = Some(xml);
        self
    }

    pub(crate) fn with_document(mut self, document: Arc<VastDocument>) -> Self {
        self.document = Some(document);
        self
    }

    pub(crate) fn with_candidate(mut self, candidate: usize) -> Self {
        self.candidate = Some(candidate);
        self.error = None;
        self
    }

    pub(crate) fn failed(mut self, error: VastError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn request_tag(&self) -> &str {
        &self.request_tag
    }

    pub fn document(&self) -> Option<&Arc<VastDocument>> {
        self.document.as_ref()
    }

    pub fn vast(&self) -> Option<&Vast> {
        self.document.as_deref().map(VastDocument::vast)
    }

    /// The raw response text
    pub fn xml(&self) -> Option<&str> {
        self.xml.as_deref()
    }

    pub fn response(&self) -> Option<&TagResponse> {
        self.response.as_ref()
    }

    /// The usable ad of this record; `None` once an error is recorded
    pub fn ad(&self) -> Option<&Ad> {
        if self.error.is_some() {
            return None;
        }
        self.candidate()
    }

    /// The ad selected from the document, even if it was rejected
    pub fn candidate(&self) -> Option<&Ad> {
        let document = self.document.as_ref()?;
        document.ads().get(self.candidate?)
    }

    pub fn error(&self) -> Option<&VastError> {
        self.error.as_ref()
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().and_then(VastError::code)
    }

    /// The wrapper this record follows, if its ad is one
    pub fn wrapper(&self) -> Option<&Wrapper> {
        self.ad().and_then(|ad| ad.wrapper.as_ref())
    }

    /// The tag to fetch after this record
    pub fn next_tag(&self) -> Option<&str> {
        self.ad().and_then(Ad::vast_ad_tag_uri)
    }

    /// Error URIs to notify about a failure of this record
    pub fn error_uris(&self) -> Vec<String> {
        match (self.candidate(), self.vast()) {
            (Some(ad), _) if !ad.errors().is_empty() => ad.errors().to_vec(),
            (_, Some(vast)) => vast.errors.clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn next_candidate(&self, options: &EffectiveOptions) -> Option<usize> {
        self.document.as_ref()?.next_ad_index(self.candidate, options)
    }
}

/// Records of one resolution, newest first
///
/// Never mutated in place: growing a chain produces a new one, so a chain
/// handed to an ad unit stays as it was.
#[derive(Debug, Clone, Default)]
pub struct ResolutionChain {
    records: Arc<Vec<ResolutionRecord>>,
}

impl ResolutionChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The newest record, which decides what happens next
    pub fn head(&self) -> Option<&ResolutionRecord> {
        self.records.first()
    }

    pub fn get(&self, index: usize) -> Option<&ResolutionRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolutionRecord> {
        self.records.iter()
    }

    /// Every usable ad of the chain, inline first, then its wrappers
    pub fn ads(&self) -> impl Iterator<Item = &Ad> {
        self.records.iter().filter_map(ResolutionRecord::ad)
    }

    /// A new chain with `record` in front
    pub fn prepend(&self, record: ResolutionRecord) -> Self {
        let mut records = Vec::with_capacity(self.records.len() + 1);
        records.push(record);
        records.extend(self.records.iter().cloned());
        ResolutionChain {
            records: Arc::new(records),
        }
    }

    /// A new chain without the head
    pub fn tail(&self) -> Self {
        ResolutionChain {
            records: Arc::new(self.records.iter().skip(1).cloned().collect()),
        }
    }

    /// Wrapper attributes inherited by the record at `index`
    pub(crate) fn parent_wrapper(&self, index: usize) -> Option<&Wrapper> {
        self.records.get(index + 1).and_then(ResolutionRecord::wrapper)
    }

    /// Whether asking for the next ad could produce anything
    pub fn has_remaining_candidates(&self, options: &RequestOptions) -> bool {
        self.records.iter().enumerate().any(|(index, record)| {
            let effective = options.effective(self.parent_wrapper(index));
            record.next_candidate(&effective).is_some()
        })
    }
}

impl<'a> IntoIterator for &'a ResolutionChain {
    type Item = &'a ResolutionRecord;
    type IntoIter = std::slice::Iter<'a, ResolutionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
