use std::fmt;

/// Events an ad unit emits, whether it plays natively or through a creative
#[derive(Debug, Clone, PartialEq)]
pub enum AdEvent {
    CreativeView,
    Start,
    Impression,
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
    /// Playback passed a `progress` tracking offset, in seconds
    Progress { offset: f64 },
    Pause,
    Resume,
    Rewind,
    Skip,
    Mute,
    Unmute,
    Fullscreen,
    ExitFullscreen,
    PlayerExpand,
    PlayerCollapse,
    ClickThrough,
    CloseLinear,
    AcceptInvitation,
    OtherAdInteraction,
    /// Icon at the given position of the icon set was shown
    IconView(usize),
    IconClick(usize),
    Viewable,
    NotViewable,
    ViewUndetermined,

    AdProgress,
    AdVolumeChange,
    AdSizeChange,
    AdStopped,
    AdSkippableStateChange,
    AdLinearChange,
    AdDurationChange,
    AdExpandedChange,
    AdRemainingTimeChange,
    /// Raw creative event, forwarded as received
    Creative(String),
}

impl AdEvent {
    /// The `<Tracking event="...">` name that fires for this event
    pub fn tracking_name(&self) -> Option<&'static str> {
        use AdEvent::*;

        let name = match self {
            CreativeView => "creativeView",
            Start => "start",
            FirstQuartile => "firstQuartile",
            Midpoint => "midpoint",
            ThirdQuartile => "thirdQuartile",
            Complete => "complete",
            Progress { .. } => "progress",
            Pause => "pause",
            Resume => "resume",
            Rewind => "rewind",
            Skip => "skip",
            Mute => "mute",
            Unmute => "unmute",
            Fullscreen => "fullscreen",
            ExitFullscreen => "exitFullscreen",
            PlayerExpand => "playerExpand",
            PlayerCollapse => "playerCollapse",
            CloseLinear => "closeLinear",
            AcceptInvitation => "acceptInvitation",
            OtherAdInteraction => "otherAdInteraction",
            _ => return None,
        };

        Some(name)
    }
}

impl fmt::Display for AdEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AdEvent::*;

        if let Some(name) = self.tracking_name() {
            return f.write_str(name);
        }
        match self {
            Impression => f.write_str("impression"),
            ClickThrough => f.write_str("clickThrough"),
            IconView(index) => write!(f, "iconView#{}", index),
            IconClick(index) => write!(f, "iconClick#{}", index),
            Viewable => f.write_str("viewable"),
            NotViewable => f.write_str("notViewable"),
            ViewUndetermined => f.write_str("viewUndetermined"),
            AdProgress => f.write_str("adProgress"),
            AdVolumeChange => f.write_str("adVolumeChange"),
            AdSizeChange => f.write_str("adSizeChange"),
            AdStopped => f.write_str("adStopped"),
            AdSkippableStateChange => f.write_str("adSkippableStateChange"),
            AdLinearChange => f.write_str("adLinearChange"),
            AdDurationChange => f.write_str("adDurationChange"),
            AdExpandedChange => f.write_str("adExpandedChange"),
            AdRemainingTimeChange => f.write_str("adRemainingTimeChange"),
            Creative(name) => f.write_str(name),
            _ => f.write_str("unknown"),
        }
    }
}
