//! Pure helpers shared by the parsers and the downloader.
//!
//! - **HTML fragments**: image extraction, tag stripping, text rendering
//! - **URL validation**: scheme checks and the optional private-host guard

mod html;
mod url_validator;

pub use html::{
    first_image_src, html_to_text, strip_div_tags, strip_first_image, strip_image_tags,
    strip_size_suffix, thumbnail_src,
};
pub use url_validator::{validate_feed_url, UrlValidationError};
