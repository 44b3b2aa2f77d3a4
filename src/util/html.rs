//! Helpers for the HTML fragments carried inside feed fields.
//!
//! Feed descriptions and content are HTML that was escaped into XML text. These
//! functions operate on the unescaped fragment and never fail: a fragment they
//! cannot make sense of passes through unchanged or yields `None`.

use std::borrow::Cow;
use std::sync::LazyLock;

use html_escape::decode_html_entities;
use regex::Regex;

static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("static regex"));

static DIV_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?div\b[^>]*>").expect("static regex"));

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>").expect("static regex"));

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

// WordPress thumbnails: photo-150x150.jpg, optionally followed by a query or fragment
static SIZE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-\d{1,4}x\d{1,4}(\.[A-Za-z0-9]+)([?#]|$)").expect("static regex")
});

/// Returns the `src` of the first `<img>` tag in `fragment`, entity-decoded.
///
/// The scan is lenient: attribute values may be single-, double- or unquoted,
/// tag and attribute names are case-insensitive, and an `<img>` without a
/// non-empty `src` is skipped in favour of the next one.
pub fn first_image_src(fragment: &str) -> Option<String> {
    let lower = fragment.to_ascii_lowercase();
    let mut from = 0;

    while let Some(offset) = lower[from..].find("<img") {
        let start = from + offset + "<img".len();
        from = start;

        // Must be the img element itself, not e.g. <imgx>
        match lower.as_bytes().get(start) {
            Some(b) if b.is_ascii_whitespace() || *b == b'/' || *b == b'>' => {}
            _ => continue,
        }

        let end = tag_end(&lower, start);
        if let Some(src) = attribute_value(&fragment[start..end], "src") {
            let src = decode_html_entities(src.trim());
            if !src.is_empty() {
                return Some(src.into_owned());
            }
        }
        from = end;
    }

    None
}

/// Index of the `>` closing the tag that starts before `from`, skipping any
/// `>` inside quoted attribute values.
fn tag_end(html: &str, from: usize) -> usize {
    let mut quote = None;
    for (i, b) in html.bytes().enumerate().skip(from) {
        match (quote, b) {
            (None, b'"' | b'\'') => quote = Some(b),
            (Some(q), _) if q == b => quote = None,
            (None, b'>') => return i,
            _ => {}
        }
    }
    html.len()
}

/// Extracts a single attribute value from the inside of a start tag.
fn attribute_value<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let bytes = attrs.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let key_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'/'
        {
            i += 1;
        }
        let key = &attrs[key_start..i];

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            // Valueless attribute
            if key.is_empty() {
                i += 1;
            }
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = match bytes.get(i) {
            Some(&quote @ (b'"' | b'\'')) => {
                let value_start = i + 1;
                let value_end = attrs[value_start..]
                    .find(quote as char)
                    .map_or(attrs.len(), |j| value_start + j);
                i = (value_end + 1).min(attrs.len());
                &attrs[value_start..value_end]
            }
            Some(_) => {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                &attrs[value_start..i]
            }
            None => "",
        };

        if key.eq_ignore_ascii_case(name) {
            return Some(value);
        }
    }

    None
}

/// Drops a `-NNNxNNN` size suffix sitting right before the file extension.
/// Any query string or fragment after the extension is kept.
pub fn strip_size_suffix(url: &str) -> Cow<'_, str> {
    SIZE_SUFFIX.replace(url, "$1$2")
}

/// [`first_image_src`] normalized to the full-size image.
pub fn thumbnail_src(fragment: &str) -> Option<String> {
    first_image_src(fragment).map(|src| strip_size_suffix(&src).into_owned())
}

pub fn strip_image_tags(fragment: &str) -> Cow<'_, str> {
    IMG_TAG.replace_all(fragment, "")
}

/// Removes only the first `<img>` tag; used once its `src` became the
/// article image so the content doesn't show it twice.
pub fn strip_first_image(fragment: &str) -> Cow<'_, str> {
    IMG_TAG.replace(fragment, "")
}

/// Removes `<div>` wrappers while keeping their children.
pub fn strip_div_tags(fragment: &str) -> Cow<'_, str> {
    DIV_TAG.replace_all(fragment, "")
}

/// Renders an HTML fragment as plain text.
///
/// Line breaks and paragraph ends become newlines, every other tag is dropped
/// and entities are decoded. The result is trimmed.
pub fn html_to_text(fragment: &str) -> String {
    let text = LINE_BREAK.replace_all(fragment, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    decode_html_entities(&text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_first_image_single_quotes() {
        assert_eq!(
            first_image_src("<img src='http://x/i.jpg'/>hello"),
            Some("http://x/i.jpg".to_string())
        );
    }

    #[test]
    fn test_first_image_double_quotes_and_attrs() {
        let html = r#"<p><IMG class="wp" alt="a > b" SRC="https://e.com/a.png" width=10></p>"#;
        assert_eq!(first_image_src(html), Some("https://e.com/a.png".to_string()));
    }

    #[test]
    fn test_first_image_unquoted_and_entities() {
        assert_eq!(
            first_image_src("<img src=https://e.com/a.png?x=1&amp;y=2>"),
            Some("https://e.com/a.png?x=1&y=2".to_string())
        );
    }

    #[test]
    fn test_first_image_skips_img_without_src() {
        let html = r#"<img alt="spacer"><img src="https://e.com/b.png">"#;
        assert_eq!(first_image_src(html), Some("https://e.com/b.png".to_string()));
    }

    #[test]
    fn test_first_image_ignores_similar_tags() {
        assert_eq!(first_image_src(r#"<imgx src="nope">text"#), None);
        assert_eq!(first_image_src("no images here"), None);
        assert_eq!(first_image_src(""), None);
    }

    #[test]
    fn test_strip_size_suffix() {
        assert_eq!(
            strip_size_suffix("https://e.com/photo-150x150.jpg"),
            "https://e.com/photo.jpg"
        );
        assert_eq!(
            strip_size_suffix("https://e.com/photo-2024.jpg"),
            "https://e.com/photo-2024.jpg"
        );
    }

    #[test]
    fn test_strip_size_suffix_keeps_query() {
        assert_eq!(
            strip_size_suffix("https://e.com/photo-300x200.jpg?w=300"),
            "https://e.com/photo.jpg?w=300"
        );
        assert_eq!(
            strip_size_suffix("https://e.com/photo-300x200.jpg#top"),
            "https://e.com/photo.jpg#top"
        );
        assert_eq!(
            strip_size_suffix("https://e.com/photo-300x200/index.jpg"),
            "https://e.com/photo-300x200/index.jpg"
        );
    }

    #[test]
    fn test_thumbnail_src() {
        assert_eq!(
            thumbnail_src(r#"<img src="https://e.com/up/cat-300x200.png" />"#),
            Some("https://e.com/up/cat.png".to_string())
        );
    }

    #[test]
    fn test_strip_first_image_only() {
        let html = r#"<img src="a"><p>x</p><img src="b">"#;
        assert_eq!(strip_first_image(html), r#"<p>x</p><img src="b">"#);
        assert_eq!(strip_image_tags(html), "<p>x</p>");
    }

    #[test]
    fn test_strip_div_tags() {
        assert_eq!(
            strip_div_tags(r#"<div class="entry"><p>Hi</p></DIV>"#),
            "<p>Hi</p>"
        );
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(
            html_to_text("<p>Tom &amp; Jerry</p><p>Line<br/>two</p>"),
            "Tom & Jerry\nLine\ntwo"
        );
        assert_eq!(html_to_text("  hello  "), "hello");
    }
}
