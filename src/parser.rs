use crate::error::{Result, VastError};
use crate::models::*;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::str::{from_utf8, FromStr};

type XmlReader<'a> = Reader<&'a [u8]>;

/// Major VAST versions the reader understands
const SUPPORTED_MAJOR_VERSIONS: [u32; 3] = [2, 3, 4];

/// Parse a VAST XML string into a Vast struct
pub fn parse_vast(xml: &str) -> Result<Vast> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"VAST" => {
                let version = root_version(e)?;
                return parse_vast_body(&mut reader, version);
            }
            Event::Empty(ref e) if e.name().as_ref() == b"VAST" => {
                let version = root_version(e)?;
                return Ok(Vast {
                    version,
                    ..Vast::default()
                });
            }
            Event::Eof => return Err(VastError::MissingField("VAST root element".to_string())),
            _ => (),
        }
        buf.clear();
    }
}

fn root_version(start: &BytesStart) -> Result<String> {
    let version = attribute(start, b"version")
        .ok_or_else(|| VastError::MissingField("VAST version".to_string()))?;

    let major = version
        .split('.')
        .next()
        .and_then(|major| major.trim().parse::<u32>().ok());

    match major {
        Some(major) if SUPPORTED_MAJOR_VERSIONS.contains(&major) => Ok(version),
        _ => Err(VastError::InvalidVersion(version)),
    }
}

fn parse_vast_body(reader: &mut XmlReader, version: String) -> Result<Vast> {
    let mut vast = Vast {
        version,
        ..Vast::default()
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"Ad" => vast.ads.push(parse_ad(reader, e)?),
                b"Error" => push_uri(&mut vast.errors, read_text(reader)?),
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"VAST" => break,
            Event::Eof => return Err(unexpected_eof("VAST")),
            _ => (),
        }
        buf.clear();
    }

    Ok(vast)
}

fn parse_ad(reader: &mut XmlReader, start: &BytesStart) -> Result<Ad> {
    let mut ad = Ad {
        id: attribute(start, b"id"),
        sequence: parsed_attribute(start, b"sequence"),
        conditional_ad: flag_attribute(start, b"conditionalAd"),
        ..Ad::default()
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"InLine" => {
                    let body = parse_ad_body(reader, b"InLine")?;
                    ad.inline = Some(body.into_inline());
                }
                b"Wrapper" => {
                    let flags = WrapperFlags {
                        follow_additional_wrappers: flag_attribute(e, b"followAdditionalWrappers"),
                        allow_multiple_ads: flag_attribute(e, b"allowMultipleAds"),
                        fallback_on_no_ad: flag_attribute(e, b"fallbackOnNoAd"),
                    };
                    let body = parse_ad_body(reader, b"Wrapper")?;
                    ad.wrapper = Some(body.into_wrapper(flags));
                }
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"Ad" => break,
            Event::Eof => return Err(unexpected_eof("Ad")),
            _ => (),
        }
        buf.clear();
    }

    Ok(ad)
}

/// Children shared by InLine and Wrapper
#[derive(Default)]
struct AdBody {
    ad_system: AdSystem,
    ad_title: String,
    vast_ad_tag_uri: String,
    impressions: Vec<Impression>,
    description: Option<String>,
    advertiser: Option<String>,
    errors: Vec<String>,
    pricing: Option<Pricing>,
    extensions: Vec<Extension>,
    creatives: Vec<Creative>,
    viewable_impression: Option<ViewableImpression>,
}

struct WrapperFlags {
    follow_additional_wrappers: Option<bool>,
    allow_multiple_ads: Option<bool>,
    fallback_on_no_ad: Option<bool>,
}

impl AdBody {
    fn into_inline(self) -> InLine {
        InLine {
            ad_system: self.ad_system,
            ad_title: self.ad_title,
            impressions: self.impressions,
            description: self.description,
            advertiser: self.advertiser,
            errors: self.errors,
            pricing: self.pricing,
            extensions: self.extensions,
            creatives: self.creatives,
            viewable_impression: self.viewable_impression,
        }
    }

    fn into_wrapper(self, flags: WrapperFlags) -> Wrapper {
        Wrapper {
            ad_system: self.ad_system,
            vast_ad_tag_uri: self.vast_ad_tag_uri,
            impressions: self.impressions,
            errors: self.errors,
            extensions: self.extensions,
            creatives: self.creatives,
            viewable_impression: self.viewable_impression,
            follow_additional_wrappers: flags.follow_additional_wrappers,
            allow_multiple_ads: flags.allow_multiple_ads,
            fallback_on_no_ad: flags.fallback_on_no_ad,
        }
    }
}

fn parse_ad_body(reader: &mut XmlReader, end: &[u8]) -> Result<AdBody> {
    let mut body = AdBody::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"AdSystem" => {
                    body.ad_system = AdSystem {
                        version: attribute(e, b"version"),
                        name: read_text(reader)?,
                    };
                }
                b"AdTitle" => body.ad_title = read_text(reader)?,
                b"VASTAdTagURI" => body.vast_ad_tag_uri = read_text(reader)?,
                b"Impression" => {
                    let id = attribute(e, b"id");
                    let url = read_text(reader)?;
                    if !url.is_empty() {
                        body.impressions.push(Impression { id, url });
                    }
                }
                b"Description" => body.description = Some(read_text(reader)?),
                b"Advertiser" => body.advertiser = Some(read_text(reader)?),
                b"Error" => push_uri(&mut body.errors, read_text(reader)?),
                b"Pricing" => {
                    body.pricing = Some(Pricing {
                        model: attribute(e, b"model").unwrap_or_default(),
                        currency: attribute(e, b"currency").unwrap_or_default(),
                        value: read_text(reader)?,
                    });
                }
                b"Extensions" => body.extensions = parse_extensions(reader)?,
                b"Creatives" => body.creatives = parse_creatives(reader)?,
                b"ViewableImpression" => {
                    body.viewable_impression = Some(parse_viewable_impression(reader, e)?);
                }
                _ => skip_element(reader, e)?,
            },
            Event::Empty(ref e) if e.name().as_ref() == b"ViewableImpression" => {
                body.viewable_impression = Some(ViewableImpression {
                    id: attribute(e, b"id"),
                    ..ViewableImpression::default()
                });
            }
            Event::End(ref e) if e.name().as_ref() == end => break,
            Event::Eof => return Err(unexpected_eof("ad body")),
            _ => (),
        }
        buf.clear();
    }

    Ok(body)
}

fn parse_extensions(reader: &mut XmlReader) -> Result<Vec<Extension>> {
    let mut extensions = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Extension" => {
                let r#type = attribute(e, b"type");
                // Nested extension markup is not kept, only its text
                let content = read_text(reader)?;
                extensions.push(Extension { r#type, content });
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name().as_ref() == b"Extensions" => break,
            Event::Eof => return Err(unexpected_eof("Extensions")),
            _ => (),
        }
        buf.clear();
    }

    Ok(extensions)
}

fn parse_viewable_impression(
    reader: &mut XmlReader,
    start: &BytesStart,
) -> Result<ViewableImpression> {
    let mut viewable_impression = ViewableImpression {
        id: attribute(start, b"id"),
        ..ViewableImpression::default()
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"Viewable" => push_uri(&mut viewable_impression.viewable, read_text(reader)?),
                b"NotViewable" => {
                    push_uri(&mut viewable_impression.not_viewable, read_text(reader)?)
                }
                b"ViewUndetermined" => {
                    push_uri(&mut viewable_impression.view_undetermined, read_text(reader)?)
                }
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"ViewableImpression" => break,
            Event::Eof => return Err(unexpected_eof("ViewableImpression")),
            _ => (),
        }
        buf.clear();
    }

    Ok(viewable_impression)
}

fn parse_creatives(reader: &mut XmlReader) -> Result<Vec<Creative>> {
    let mut creatives = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Creative" => {
                creatives.push(parse_creative(reader, e)?);
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name().as_ref() == b"Creatives" => break,
            Event::Eof => return Err(unexpected_eof("Creatives")),
            _ => (),
        }
        buf.clear();
    }

    Ok(creatives)
}

fn parse_creative(reader: &mut XmlReader, start: &BytesStart) -> Result<Creative> {
    let mut creative = Creative {
        id: attribute(start, b"id"),
        sequence: parsed_attribute(start, b"sequence"),
        ad_id: attribute(start, b"adId").or_else(|| attribute(start, b"AdID")),
        api_framework: attribute(start, b"apiFramework"),
        linear: None,
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Linear" => {
                creative.linear = Some(parse_linear(reader, e)?);
            }
            // Companion and non-linear creatives are not played by this crate
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name().as_ref() == b"Creative" => break,
            Event::Eof => return Err(unexpected_eof("Creative")),
            _ => (),
        }
        buf.clear();
    }

    Ok(creative)
}

fn parse_linear(reader: &mut XmlReader, start: &BytesStart) -> Result<Linear> {
    let mut linear = Linear {
        skip_offset: attribute(start, b"skipoffset"),
        ..Linear::default()
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"Duration" => linear.duration = Some(read_text(reader)?),
                b"AdParameters" => {
                    let xml_encoded = flag_attribute(e, b"xmlEncoded").unwrap_or(false);
                    linear.ad_parameters = Some(AdParameters {
                        xml_encoded,
                        value: read_text(reader)?,
                    });
                }
                b"MediaFiles" => linear.media_files = parse_media_files(reader)?,
                b"VideoClicks" => linear.video_clicks = Some(parse_video_clicks(reader)?),
                b"TrackingEvents" => linear.tracking_events = parse_tracking_events(reader)?,
                b"Icons" => linear.icons = parse_icons(reader)?,
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"Linear" => break,
            Event::Eof => return Err(unexpected_eof("Linear")),
            _ => (),
        }
        buf.clear();
    }

    Ok(linear)
}

fn parse_media_files(reader: &mut XmlReader) -> Result<Vec<MediaFile>> {
    let mut media_files = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"MediaFile" => {
                let mut media_file = MediaFile {
                    mime_type: attribute(e, b"type").unwrap_or_default(),
                    codec: attribute(e, b"codec"),
                    bitrate: parsed_attribute(e, b"bitrate"),
                    width: parsed_attribute(e, b"width"),
                    height: parsed_attribute(e, b"height"),
                    delivery: attribute(e, b"delivery"),
                    api_framework: attribute(e, b"apiFramework"),
                    ..MediaFile::default()
                };
                media_file.url = read_text(reader)?;
                if !media_file.url.is_empty() {
                    media_files.push(media_file);
                }
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name().as_ref() == b"MediaFiles" => break,
            Event::Eof => return Err(unexpected_eof("MediaFiles")),
            _ => (),
        }
        buf.clear();
    }

    Ok(media_files)
}

fn parse_video_clicks(reader: &mut XmlReader) -> Result<VideoClicks> {
    let mut video_clicks = VideoClicks::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"ClickThrough" => video_clicks.click_through = Some(read_text(reader)?),
                b"ClickTracking" => push_uri(&mut video_clicks.click_tracking, read_text(reader)?),
                b"CustomClick" => push_uri(&mut video_clicks.custom_click, read_text(reader)?),
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"VideoClicks" => break,
            Event::Eof => return Err(unexpected_eof("VideoClicks")),
            _ => (),
        }
        buf.clear();
    }

    Ok(video_clicks)
}

fn parse_tracking_events(reader: &mut XmlReader) -> Result<Vec<TrackingEvent>> {
    let mut tracking_events = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Tracking" => {
                let event = attribute(e, b"event").unwrap_or_default();
                let offset = attribute(e, b"offset");
                let url = read_text(reader)?;
                if !url.is_empty() {
                    tracking_events.push(TrackingEvent { event, url, offset });
                }
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name().as_ref() == b"TrackingEvents" => break,
            Event::Eof => return Err(unexpected_eof("TrackingEvents")),
            _ => (),
        }
        buf.clear();
    }

    Ok(tracking_events)
}

fn parse_icons(reader: &mut XmlReader) -> Result<Vec<Icon>> {
    let mut icons = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.name().as_ref() == b"Icon" => {
                icons.push(parse_icon(reader, e)?);
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(ref e) if e.name().as_ref() == b"Icons" => break,
            Event::Eof => return Err(unexpected_eof("Icons")),
            _ => (),
        }
        buf.clear();
    }

    Ok(icons)
}

fn parse_icon(reader: &mut XmlReader, start: &BytesStart) -> Result<Icon> {
    let mut icon = Icon {
        program: attribute(start, b"program"),
        width: parsed_attribute(start, b"width"),
        height: parsed_attribute(start, b"height"),
        x_position: attribute(start, b"xPosition"),
        y_position: attribute(start, b"yPosition"),
        offset: attribute(start, b"offset"),
        duration: attribute(start, b"duration"),
        api_framework: attribute(start, b"apiFramework"),
        px_ratio: parsed_attribute(start, b"pxratio"),
        ..Icon::default()
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"StaticResource" => {
                    let creative_type = attribute(e, b"creativeType");
                    let uri = read_text(reader)?;
                    icon.resource = Some(IconResource::Static { uri, creative_type });
                }
                b"IFrameResource" => icon.resource = Some(IconResource::IFrame(read_text(reader)?)),
                b"HTMLResource" => icon.resource = Some(IconResource::Html(read_text(reader)?)),
                b"IconClicks" => parse_icon_clicks(reader, &mut icon)?,
                b"IconViewTracking" => push_uri(&mut icon.view_tracking, read_text(reader)?),
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"Icon" => break,
            Event::Eof => return Err(unexpected_eof("Icon")),
            _ => (),
        }
        buf.clear();
    }

    Ok(icon)
}

fn parse_icon_clicks(reader: &mut XmlReader, icon: &mut Icon) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"IconClickThrough" => icon.click_through = Some(read_text(reader)?),
                b"IconClickTracking" => push_uri(&mut icon.click_tracking, read_text(reader)?),
                _ => skip_element(reader, e)?,
            },
            Event::End(ref e) if e.name().as_ref() == b"IconClicks" => break,
            Event::Eof => return Err(unexpected_eof("IconClicks")),
            _ => (),
        }
        buf.clear();
    }

    Ok(())
}

/// Read the text and CDATA content of the current element
fn read_text(reader: &mut XmlReader) -> Result<String> {
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => {
                let value = from_utf8(&e).map_err(|err| VastError::XmlParseError(err.to_string()))?;
                text.push_str(value);
            }
            Event::Start(ref e) => skip_element(reader, e)?,
            Event::End(_) => break,
            Event::Eof => return Err(unexpected_eof("text")),
            _ => (),
        }
        buf.clear();
    }

    Ok(text.trim().to_string())
}

/// Skip an element whose start tag was just read, children included
fn skip_element(reader: &mut XmlReader, start: &BytesStart) -> Result<()> {
    let mut buf = Vec::new();
    reader.read_to_end_into(start.name(), &mut buf)?;
    Ok(())
}

fn attribute(start: &BytesStart, name: &[u8]) -> Option<String> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.trim().to_string()))
}

fn parsed_attribute<T: FromStr>(start: &BytesStart, name: &[u8]) -> Option<T> {
    attribute(start, name).and_then(|value| value.parse().ok())
}

fn flag_attribute(start: &BytesStart, name: &[u8]) -> Option<bool> {
    attribute(start, name).map(|value| value.eq_ignore_ascii_case("true"))
}

fn push_uri(uris: &mut Vec<String>, uri: String) {
    if !uri.is_empty() {
        uris.push(uri);
    }
}

fn unexpected_eof(context: &str) -> VastError {
    VastError::XmlParseError(format!("Unexpected end of file inside {}", context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    const INLINE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VAST version="4.1">
  <Ad id="inline-1">
    <InLine>
      <AdSystem version="2.0">Example</AdSystem>
      <AdTitle>Sample</AdTitle>
      <Impression id="imp"><![CDATA[https://t.example.com/impression]]></Impression>
      <Error><![CDATA[https://t.example.com/error?code=[ERRORCODE]]]></Error>
      <ViewableImpression id="vi">
        <Viewable><![CDATA[https://t.example.com/viewable]]></Viewable>
        <NotViewable><![CDATA[https://t.example.com/not-viewable]]></NotViewable>
      </ViewableImpression>
      <Creatives>
        <Creative id="c1" sequence="1">
          <Linear skipoffset="00:00:05">
            <Duration>00:00:30</Duration>
            <AdParameters xmlEncoded="false"><![CDATA[{"key":"value"}]]></AdParameters>
            <TrackingEvents>
              <Tracking event="start"><![CDATA[https://t.example.com/start]]></Tracking>
              <Tracking event="progress" offset="00:00:10"><![CDATA[https://t.example.com/p10]]></Tracking>
            </TrackingEvents>
            <VideoClicks>
              <ClickThrough><![CDATA[https://advertiser.example.com]]></ClickThrough>
              <ClickTracking><![CDATA[https://t.example.com/click]]></ClickTracking>
            </VideoClicks>
            <MediaFiles>
              <MediaFile delivery="progressive" type="video/mp4" width="640" height="360"><![CDATA[https://cdn.example.com/640.mp4]]></MediaFile>
              <MediaFile delivery="progressive" type="application/javascript" apiFramework="VPAID" width="640" height="360"><![CDATA[https://cdn.example.com/vpaid.js]]></MediaFile>
            </MediaFiles>
            <Icons>
              <Icon program="AdChoices" width="20" height="20" xPosition="right" yPosition="top" offset="00:00:01" pxratio="2">
                <StaticResource creativeType="image/png"><![CDATA[https://cdn.example.com/icon.png]]></StaticResource>
                <IconClicks>
                  <IconClickThrough><![CDATA[https://adchoices.example.com]]></IconClickThrough>
                  <IconClickTracking><![CDATA[https://t.example.com/icon-click]]></IconClickTracking>
                </IconClicks>
                <IconViewTracking><![CDATA[https://t.example.com/icon-view]]></IconViewTracking>
              </Icon>
            </Icons>
          </Linear>
        </Creative>
        <Creative>
          <CompanionAds><Companion width="300" height="250"/></CompanionAds>
        </Creative>
      </Creatives>
    </InLine>
  </Ad>
</VAST>"#;

    #[test]
    fn parses_inline_linear_details() {
        let vast = parse_vast(INLINE).unwrap();
        assert_eq!(vast.version, "4.1");
        assert_eq!(vast.ads.len(), 1);

        let ad = &vast.ads[0];
        assert!(ad.is_inline());
        assert_eq!(ad.impressions()[0].url, "https://t.example.com/impression");
        assert_eq!(ad.errors(), ["https://t.example.com/error?code=[ERRORCODE]"]);
        assert!(ad.has_executable_creative());

        let linear = ad.linear().unwrap();
        assert_eq!(linear.skip_offset.as_deref(), Some("00:00:05"));
        assert_eq!(linear.duration.as_deref(), Some("00:00:30"));
        assert_eq!(linear.ad_parameters.as_ref().unwrap().value, r#"{"key":"value"}"#);
        assert_eq!(linear.media_files.len(), 2);
        assert_eq!(linear.media_files[0].width, Some(640));
        assert!(linear.media_files[1].is_vpaid());
        assert_eq!(linear.tracking_events[1].offset.as_deref(), Some("00:00:10"));
        assert_eq!(
            linear.video_clicks.as_ref().unwrap().click_tracking,
            ["https://t.example.com/click"]
        );

        let icon = &linear.icons[0];
        assert_eq!(icon.program.as_deref(), Some("AdChoices"));
        assert_eq!(icon.px_ratio, Some(2.0));
        assert_eq!(icon.view_tracking, ["https://t.example.com/icon-view"]);
        assert!(matches!(
            icon.resource,
            Some(IconResource::Static { ref uri, .. }) if uri == "https://cdn.example.com/icon.png"
        ));

        let viewable = ad.viewable_impression().unwrap();
        assert_eq!(viewable.viewable, ["https://t.example.com/viewable"]);
        assert!(viewable.view_undetermined.is_empty());
    }

    #[test]
    fn parses_wrapper_flags_and_pods() {
        let xml = r#"<VAST version="3.0">
            <Ad id="a" sequence="2"><Wrapper followAdditionalWrappers="false" allowMultipleAds="true" fallbackOnNoAd="false">
                <AdSystem>W</AdSystem>
                <VASTAdTagURI><![CDATA[ https://ads.example.com/next ]]></VASTAdTagURI>
                <Error>https://t.example.com/wrapper-error</Error>
            </Wrapper></Ad>
            <Ad id="b" sequence="1"><InLine><AdSystem>I</AdSystem><AdTitle>t</AdTitle></InLine></Ad>
        </VAST>"#;

        let vast = parse_vast(xml).unwrap();
        let wrapper = vast.ads[0].wrapper.as_ref().unwrap();
        assert_eq!(vast.ads[0].vast_ad_tag_uri(), Some("https://ads.example.com/next"));
        assert_eq!(wrapper.follow_additional_wrappers, Some(false));
        assert_eq!(wrapper.allow_multiple_ads, Some(true));
        assert_eq!(wrapper.fallback_on_no_ad, Some(false));
        assert_eq!(vast.ads[1].sequence, Some(1));
    }

    #[test]
    fn keeps_root_errors_of_empty_responses() {
        let vast = parse_vast(r#"<VAST version="3.0"><Error>https://t.example.com/no-ad</Error></VAST>"#)
            .unwrap();
        assert!(vast.ads.is_empty());
        assert_eq!(vast.errors, ["https://t.example.com/no-ad"]);
    }

    #[test]
    fn rejects_documents_without_vast_root() {
        let err = parse_vast("<html><body>nope</body></html>").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::SchemaValidation));
    }

    #[test]
    fn rejects_unsupported_versions() {
        let err = parse_vast(r#"<VAST version="1.0"></VAST>"#).unwrap_err();
        assert_eq!(err, VastError::InvalidVersion("1.0".to_string()));
        assert_eq!(err.code(), Some(ErrorCode::UnsupportedVersion));
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_vast(r#"<VAST version="3.0"><Ad><InLine></Ad></VAST>"#).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::XmlParse));
    }
}
