use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Numeric VAST error codes reported to error-tracking URIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum ErrorCode {
    XmlParse = 100,
    SchemaValidation = 101,
    UnsupportedVersion = 102,
    UnexpectedAdType = 200,
    UnexpectedMediaConstraint = 203,
    WrapperTimeout = 301,
    WrapperLimit = 302,
    NoAdsAfterWrapper = 303,
    NoPlayableMedia = 401,
    MediaLoadTimeout = 402,
    LinearAssetMismatch = 403,
    MediaPlayback = 405,
    Unknown = 900,
    VpaidGeneral = 901,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Errors raised while resolving or playing a VAST ad
///
/// Every variant is cheap to clone so it can be stored on a resolution record
/// and handed to several listeners.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VastError {
    #[error("Failed to parse XML: {0}")]
    XmlParseError(String),

    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Invalid VAST version: {0}")]
    InvalidVersion(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Failed to fetch '{tag}': {reason}")]
    Fetch { tag: String, reason: String },

    #[error("Timed out resolving '{0}'")]
    ResolveTimeout(String),

    #[error("Wrapper limit of {0} reached")]
    WrapperLimit(usize),

    #[error("No ads found in the VAST response")]
    NoAds,

    #[error("Invalid VAST, ad node is neither Wrapper nor InLine")]
    InvalidAd,

    #[error("Multiple ads are not allowed")]
    MultipleAdsNotAllowed,

    #[error("Following additional wrappers is not allowed")]
    WrappersNotAllowed,

    #[error("VPAID ads are not allowed")]
    VpaidNotAllowed,

    #[error("Invalid VAST chain: {0}")]
    InvalidChain(String),

    #[error("Can't find a suitable media to play")]
    NoSuitableMedia,

    #[error("Media playback error: {0}")]
    MediaPlayback(String),

    #[error("Timeout while starting the ad")]
    StartTimeout,

    #[error("Ad unit start rejected due to event '{0}'")]
    StartAborted(String),

    #[error("No executable creative the sandbox can run")]
    NoExecutableCreative,

    #[error("Creative version '{0}' not supported")]
    UnsupportedCreativeVersion(String),

    #[error("Timeout waiting for event '{0}'")]
    CreativeEventTimeout(String),

    #[error("VPAID creative error: {0}")]
    Creative(String),

    #[error("The playback surface has been destroyed")]
    SurfaceDestroyed,

    #[error("Ad unit already started")]
    AlreadyStarted,

    #[error("Ad unit is finished")]
    AlreadyFinished,

    #[error("Ad unit has not started")]
    NotStarted,

    #[error("Ad can not be skipped yet")]
    NotSkippable,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl VastError {
    /// The numeric code tracked for this error, if it has one
    pub fn code(&self) -> Option<ErrorCode> {
        use VastError::*;

        let code = match self {
            XmlParseError(_) => ErrorCode::XmlParse,
            MissingField(_) | InvalidAd => ErrorCode::SchemaValidation,
            InvalidVersion(_) => ErrorCode::UnsupportedVersion,
            WrappersNotAllowed | VpaidNotAllowed => ErrorCode::UnexpectedAdType,
            MultipleAdsNotAllowed => ErrorCode::UnexpectedMediaConstraint,
            Fetch { .. } | ResolveTimeout(_) | UrlError(_) => ErrorCode::WrapperTimeout,
            WrapperLimit(_) => ErrorCode::WrapperLimit,
            NoAds => ErrorCode::NoAdsAfterWrapper,
            StartTimeout => ErrorCode::MediaLoadTimeout,
            NoSuitableMedia | NoExecutableCreative => ErrorCode::LinearAssetMismatch,
            MediaPlayback(_) => ErrorCode::MediaPlayback,
            UnsupportedCreativeVersion(_) | CreativeEventTimeout(_) | Creative(_) => {
                ErrorCode::VpaidGeneral
            }
            IoError(_) | SurfaceDestroyed | Other(_) => ErrorCode::Unknown,
            InvalidChain(_) | StartAborted(_) | AlreadyStarted | AlreadyFinished | NotStarted
            | NotSkippable | Config(_) => return None,
        };

        Some(code)
    }
}

impl From<quick_xml::Error> for VastError {
    fn from(error: quick_xml::Error) -> Self {
        VastError::XmlParseError(error.to_string())
    }
}

impl From<std::io::Error> for VastError {
    fn from(error: std::io::Error) -> Self {
        VastError::IoError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VastError>;
