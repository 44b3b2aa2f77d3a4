use quick_xml::events::{BytesStart, Event};
use std::time::Instant;

use crate::article::Article;
use crate::feed::parser::{
    apply_content, apply_description, apply_media, enclosure, finish, is_tag, parse_date,
    EventSource,
};
use crate::feed::{ParseError, Parser};

/// Parser for Atom 1.0 documents.
///
/// Mirrors [`Rss2Parser`](crate::feed::Rss2Parser) over `<entry>` boundaries.
/// `published` wins over `updated` regardless of order; `link` is read from its
/// `href` attribute and routed by `rel`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomParser;

#[derive(Default)]
struct Entry {
    article: Article,
    in_author: bool,
    has_published: bool,
}

impl Entry {
    fn link(&mut self, events: &EventSource<'_>, start: &BytesStart<'_>) {
        let rel = events.attr(start, "rel");
        match rel.as_deref().map(str::trim) {
            None | Some("alternate") => {
                if self.article.source.is_empty() {
                    if let Some(href) = events.attr(start, "href") {
                        self.article.source = href.trim().to_string();
                    }
                }
            }
            Some("replies") => self.article.comments = events.attr(start, "href"),
            Some("enclosure") => self.article.enclosure = enclosure(events, start, "href"),
            Some(_) => {}
        }
    }

    fn category(&mut self, events: &EventSource<'_>, start: &BytesStart<'_>) -> bool {
        match events.attr(start, "term") {
            Some(term) => {
                self.article.tags.push(term);
                true
            }
            None => false,
        }
    }

    /// Start and empty tags that carry their data in attributes.
    fn attributes(&mut self, events: &EventSource<'_>, start: &BytesStart<'_>) -> bool {
        let name = start.name();
        if is_tag(name.as_ref(), "link") {
            self.link(events, start);
            true
        } else if is_tag(name.as_ref(), "category") {
            self.category(events, start)
        } else {
            apply_media(events, start, &mut self.article)
        }
    }

    fn text(&mut self, name: &[u8], text: String) {
        let article = &mut self.article;
        if is_tag(name, "title") {
            article.title = text.trim().to_string();
        } else if is_tag(name, "summary") {
            apply_description(article, &text);
        } else if is_tag(name, "content") {
            apply_content(article, &text);
        } else if is_tag(name, "name") && self.in_author {
            article.author = Some(text);
        } else if is_tag(name, "category") {
            article.tags.push(text);
        } else if is_tag(name, "published") {
            article.date = parse_date(&text);
            self.has_published = true;
        } else if is_tag(name, "updated") && !self.has_published {
            article.date = parse_date(&text);
        }
    }
}

const TEXT_FIELDS: [&str; 7] = [
    "title",
    "summary",
    "content",
    "name",
    "category",
    "published",
    "updated",
];

impl Parser for AtomParser {
    fn parse(&self, body: &str) -> Result<Vec<Article>, ParseError> {
        let started = Instant::now();
        let mut events = EventSource::new(body);
        let mut current: Option<Entry> = None;
        let mut articles = Vec::new();

        while let Some(event) = events.next_event()? {
            match event {
                Event::Start(e) if is_tag(e.name().as_ref(), "entry") => {
                    current = Some(Entry::default());
                }
                Event::Start(e) => {
                    let Some(entry) = current.as_mut() else {
                        continue;
                    };
                    let name = e.name();
                    if is_tag(name.as_ref(), "author") {
                        entry.in_author = true;
                        continue;
                    }
                    if entry.attributes(&events, &e) {
                        continue;
                    }
                    // <category>text</category> without a term attribute lands here too
                    if TEXT_FIELDS.iter().any(|t| is_tag(name.as_ref(), t)) {
                        if let Some(text) = events.text()? {
                            entry.text(name.as_ref(), text);
                        }
                    }
                }
                Event::Empty(e) => {
                    if let Some(entry) = current.as_mut() {
                        entry.attributes(&events, &e);
                    }
                }
                Event::End(e) => {
                    let name = e.name();
                    if is_tag(name.as_ref(), "entry") {
                        if let Some(entry) = current.take() {
                            articles.push(finish(entry.article));
                        }
                    } else if is_tag(name.as_ref(), "author") {
                        if let Some(entry) = current.as_mut() {
                            entry.in_author = false;
                        }
                    }
                }
                _ => {}
            }
        }

        tracing::debug!(
            articles = articles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Parsed Atom feed"
        );
        Ok(articles)
    }
}
