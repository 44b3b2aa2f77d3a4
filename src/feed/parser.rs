use chrono::DateTime;
use html_escape::decode_html_entities;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use std::time::Instant;
use thiserror::Error;

use crate::article::{Article, Enclosure, MediaContent};
use crate::util::{
    html_to_text, strip_div_tags, strip_first_image, strip_image_tags, thumbnail_src,
};

/// Errors raised when a feed body is not a well-formed document.
///
/// Parsing fails closed: any of these discards the whole body, so callers
/// never see a partial article list.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The XML reader rejected the input.
    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },
    /// The body ended with elements still open.
    #[error("Feed truncated with {0} unclosed elements")]
    Truncated(usize),
    /// The body contained no element at all (empty, text only, HTML error page).
    #[error("Feed has no root element")]
    NoRootElement,
}

/// Turns a decoded response body into articles, in document order.
pub trait Parser: Send + Sync {
    fn parse(&self, body: &str) -> Result<Vec<Article>, ParseError>;
}

// ============================================================================
// Event source
// ============================================================================

/// Pull-based event stream shared by the feed dialects.
///
/// Wraps a `quick-xml` reader with a one-event pushback so a recognized start
/// tag can look at the event after it without losing it, and tracks nesting
/// so a document cut off mid-way is reported instead of yielding whatever was
/// read up to that point.
pub(crate) struct EventSource<'a> {
    reader: Reader<&'a [u8]>,
    pending: Option<Event<'a>>,
    depth: usize,
    saw_root: bool,
}

impl<'a> EventSource<'a> {
    pub(crate) fn new(body: &'a str) -> Self {
        // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations, only the
        // five XML builtins and character references. Unknown entities fail to
        // unescape and fall back to HTML entity decoding in `text()`.
        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            pending: None,
            depth: 0,
            saw_root: false,
        }
    }

    fn read(&mut self) -> Result<Event<'a>, ParseError> {
        let event = self.reader.read_event().map_err(|e| ParseError::Xml {
            position: self.reader.buffer_position() as u64,
            message: e.to_string(),
        })?;
        match &event {
            Event::Start(_) => {
                self.depth += 1;
                self.saw_root = true;
            }
            Event::Empty(_) => self.saw_root = true,
            Event::End(_) => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        Ok(event)
    }

    fn pull(&mut self) -> Result<Event<'a>, ParseError> {
        match self.pending.take() {
            Some(event) => Ok(event),
            None => self.read(),
        }
    }

    /// Next event, or `None` at a well-formed end of document.
    pub(crate) fn next_event(&mut self) -> Result<Option<Event<'a>>, ParseError> {
        match self.pull()? {
            Event::Eof if self.depth > 0 => Err(ParseError::Truncated(self.depth)),
            Event::Eof if !self.saw_root => Err(ParseError::NoRootElement),
            Event::Eof => Ok(None),
            event => Ok(Some(event)),
        }
    }

    /// Consumes the text immediately following the current start tag.
    ///
    /// Adjacent text and CDATA runs are joined. Returns `None` (and leaves the
    /// next event in place) when the tag is directly followed by anything else.
    pub(crate) fn text(&mut self) -> Result<Option<String>, ParseError> {
        let mut out: Option<String> = None;
        loop {
            match self.pull()? {
                Event::Text(t) => out.get_or_insert_with(String::new).push_str(&unescape(&t)),
                Event::CData(c) => out
                    .get_or_insert_with(String::new)
                    .push_str(&String::from_utf8_lossy(&c)),
                other => {
                    self.pending = Some(other);
                    return Ok(out);
                }
            }
        }
    }

    /// Attribute value by case-insensitive name, entity-decoded.
    pub(crate) fn attr(&self, start: &BytesStart<'_>, name: &str) -> Option<String> {
        let decoder = self.reader.decoder();
        for attr in start.attributes() {
            let attr = match attr {
                Ok(attr) => attr,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed attribute");
                    continue;
                }
            };
            if !attr.key.as_ref().eq_ignore_ascii_case(name.as_bytes()) {
                continue;
            }
            let value = match attr.decode_and_unescape_value(decoder) {
                Ok(value) => value.into_owned(),
                Err(_) => {
                    decode_html_entities(&String::from_utf8_lossy(&attr.value)).into_owned()
                }
            };
            return Some(value);
        }
        None
    }
}

fn unescape(text: &BytesText<'_>) -> String {
    match text.unescape() {
        Ok(s) => s.into_owned(),
        // HTML entities such as &nbsp; are common in feeds but not valid XML
        Err(_) => decode_html_entities(&String::from_utf8_lossy(text)).into_owned(),
    }
}

pub(crate) fn is_tag(name: &[u8], tag: &str) -> bool {
    name.eq_ignore_ascii_case(tag.as_bytes())
}

// ============================================================================
// Field helpers shared by the dialects
// ============================================================================

/// Parses a feed date into milliseconds since the epoch.
///
/// RFC 2822 (RSS) and RFC 3339 (Atom) are accepted. The value is rendered back
/// to RFC 2822 and re-read, which drops sub-second precision so the same
/// instant always yields the same id. Unparsable dates yield 0.
pub fn parse_date(raw: &str) -> i64 {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc2822(raw).or_else(|_| DateTime::parse_from_rfc3339(raw));
    match parsed {
        Ok(date) => DateTime::parse_from_rfc2822(&date.to_rfc2822())
            .map_or(0, |canonical| canonical.timestamp_millis()),
        Err(e) => {
            tracing::debug!(date = %raw, error = %e, "Unparsable feed date");
            0
        }
    }
}

/// Applies an HTML description: the first image becomes the article image and
/// the rest is rendered as plain text.
pub(crate) fn apply_description(article: &mut Article, html: &str) {
    if let Some(src) = thumbnail_src(html) {
        article.image = src;
    }
    article.description = html_to_text(&strip_image_tags(html));
}

pub(crate) fn apply_content(article: &mut Article, html: &str) {
    article.content = strip_div_tags(html).into_owned();
}

pub(crate) fn enclosure(
    events: &EventSource<'_>,
    start: &BytesStart<'_>,
    url_attr: &str,
) -> Option<Enclosure> {
    let url = events.attr(start, url_attr)?;
    Some(Enclosure {
        url,
        length: events.attr(start, "length").and_then(|v| v.trim().parse().ok()),
        mime_type: events.attr(start, "type"),
    })
}

pub(crate) fn media_content(
    events: &EventSource<'_>,
    start: &BytesStart<'_>,
) -> Option<MediaContent> {
    let number = |name: &str| events.attr(start, name).and_then(|v| v.trim().parse().ok());
    Some(MediaContent {
        url: events.attr(start, "url")?,
        mime_type: events.attr(start, "type"),
        medium: events.attr(start, "medium"),
        file_size: number("fileSize"),
        width: events.attr(start, "width").and_then(|v| v.trim().parse().ok()),
        height: events.attr(start, "height").and_then(|v| v.trim().parse().ok()),
        duration: number("duration"),
        is_default: events
            .attr(start, "isDefault")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
    })
}

/// Media attributes that live on self-closing or start tags alike.
pub(crate) fn apply_media(
    events: &EventSource<'_>,
    start: &BytesStart<'_>,
    article: &mut Article,
) -> bool {
    let name = start.name();
    if is_tag(name.as_ref(), "media:content") {
        match media_content(events, start) {
            Some(media) => article.media.push(media),
            None => tracing::debug!("Skipping media:content without url"),
        }
        true
    } else if is_tag(name.as_ref(), "media:thumbnail") {
        if article.image.is_empty() {
            if let Some(url) = events.attr(start, "url") {
                article.image = url;
            }
        }
        true
    } else {
        false
    }
}

/// Closes an item: drops the lead image from the content once it became the
/// article image, then fixes the id.
pub(crate) fn finish(mut article: Article) -> Article {
    if !article.image.is_empty() && !article.content.is_empty() {
        article.content = strip_first_image(&article.content).into_owned();
    }
    article.id = article.content_id();
    tracing::trace!(article = %article.short(), "Parsed article");
    article
}

// ============================================================================
// RSS 2.0
// ============================================================================

/// Default parser for RSS 2.0 documents.
///
/// A two-state machine over `<item>` boundaries; everything outside an item
/// (channel metadata) is ignored. Tag names match case-insensitively and
/// unknown tags are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rss2Parser;

enum State {
    OutsideItem,
    InsideItem(Box<Article>),
}

#[derive(Clone, Copy)]
enum RssField {
    Link,
    Title,
    Description,
    Content,
    Comments,
    Category,
    Author,
    PubDate,
}

impl RssField {
    fn from_name(name: &[u8]) -> Option<Self> {
        const FIELDS: [(&str, RssField); 9] = [
            ("link", RssField::Link),
            ("title", RssField::Title),
            ("description", RssField::Description),
            ("content:encoded", RssField::Content),
            ("wfw:commentRss", RssField::Comments),
            ("category", RssField::Category),
            ("dc:creator", RssField::Author),
            ("author", RssField::Author),
            ("pubDate", RssField::PubDate),
        ];
        FIELDS
            .iter()
            .find(|(tag, _)| is_tag(name, tag))
            .map(|(_, field)| *field)
    }

    fn apply(self, article: &mut Article, text: String) {
        match self {
            RssField::Link => article.source = text.trim().to_string(),
            RssField::Title => article.title = text.trim().to_string(),
            RssField::Description => apply_description(article, &text),
            RssField::Content => apply_content(article, &text),
            RssField::Comments => article.comments = Some(text.trim().to_string()),
            RssField::Category => article.tags.push(text),
            RssField::Author => article.author = Some(text),
            RssField::PubDate => article.date = parse_date(&text),
        }
    }
}

impl Parser for Rss2Parser {
    fn parse(&self, body: &str) -> Result<Vec<Article>, ParseError> {
        let started = Instant::now();
        let mut events = EventSource::new(body);
        let mut state = State::OutsideItem;
        let mut articles = Vec::new();

        while let Some(event) = events.next_event()? {
            match event {
                Event::Start(e) if is_tag(e.name().as_ref(), "item") => {
                    state = State::InsideItem(Box::default());
                }
                Event::Start(e) => {
                    let State::InsideItem(article) = &mut state else {
                        continue;
                    };
                    let name = e.name();
                    if is_tag(name.as_ref(), "enclosure") {
                        article.enclosure = enclosure(&events, &e, "url");
                    } else if !apply_media(&events, &e, article) {
                        if let Some(field) = RssField::from_name(name.as_ref()) {
                            if let Some(text) = events.text()? {
                                field.apply(article, text);
                            }
                        }
                    }
                }
                Event::Empty(e) => {
                    let State::InsideItem(article) = &mut state else {
                        continue;
                    };
                    if is_tag(e.name().as_ref(), "enclosure") {
                        article.enclosure = enclosure(&events, &e, "url");
                    } else {
                        apply_media(&events, &e, article);
                    }
                }
                Event::End(e) if is_tag(e.name().as_ref(), "item") => {
                    if let State::InsideItem(article) =
                        std::mem::replace(&mut state, State::OutsideItem)
                    {
                        articles.push(finish(*article));
                    }
                }
                _ => {}
            }
        }

        tracing::debug!(
            articles = articles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Parsed RSS feed"
        );
        Ok(articles)
    }
}
