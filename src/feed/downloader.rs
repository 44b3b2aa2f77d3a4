use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::feed::FetchError;
use crate::request::Request;

/// Everything but letters, digits and `_-!.~'()*` is escaped.
const SEARCH_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'-')
    .remove(b'!')
    .remove(b'.')
    .remove(b'~')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*');

/// Suffix that turns a post permalink into its own comment-free feed.
pub const INDIVIDUAL_SUFFIX: &str = "feed/?withoutcomments=1";

/// Pluggable network layer.
///
/// The URL methods are pure and have default implementations following the
/// standard grammar; `execute` owns all network and cache I/O.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Cache/index key for the request. Never contains pagination.
    fn to_safe_url(&self, request: &Request) -> String {
        safe_url(request.url(), request.search(), request.individual())
    }

    /// Exact URL requested over the network.
    fn to_fetch_url(&self, request: &Request) -> String {
        fetch_url(
            request.url(),
            request.search(),
            request.individual(),
            request.page(),
        )
    }

    /// Fetches the decoded response body.
    async fn execute(&self, request: &Request) -> Result<String, FetchError>;

    /// Best-effort cache wipe.
    async fn clear_cache(&self) -> bool;
}

/// `url + "feed/?withoutcomments=1"` for individual requests, otherwise
/// `url + "?s=<encoded search>"` when a search term is present.
pub fn safe_url(url: &str, search: Option<&str>, individual: bool) -> String {
    if individual {
        return format!("{url}{INDIVIDUAL_SUFFIX}");
    }
    match search {
        Some(term) => format!("{url}?s={}", encode_search(term)),
        None => url.to_string(),
    }
}

/// [`safe_url`] plus `paged=N` for pages past the first. Individual requests
/// are never paginated.
pub fn fetch_url(url: &str, search: Option<&str>, individual: bool, page: u32) -> String {
    let mut out = safe_url(url, search, individual);
    if !individual && page > 1 {
        let sep = if out.contains('?') { '&' } else { '?' };
        out.push(sep);
        out.push_str("paged=");
        out.push_str(&page.to_string());
    }
    out
}

/// Percent-encodes a search term for the `s` query parameter. Spaces become
/// `%20`.
pub fn encode_search(term: &str) -> String {
    utf8_percent_encode(term, SEARCH_ESCAPES).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_safe_url_plain() {
        assert_eq!(
            safe_url("https://blog.example.com/feed/", None, false),
            "https://blog.example.com/feed/"
        );
    }

    #[test]
    fn test_safe_url_individual_ignores_search() {
        assert_eq!(
            safe_url("https://blog.example.com/2024/01/post/", Some("x"), true),
            "https://blog.example.com/2024/01/post/feed/?withoutcomments=1"
        );
    }

    #[test]
    fn test_safe_url_encodes_search() {
        assert_eq!(
            safe_url("https://blog.example.com/feed/", Some("rust & tokio"), false),
            "https://blog.example.com/feed/?s=rust%20%26%20tokio"
        );
    }

    #[test]
    fn test_fetch_url_page_one_equals_safe_url() {
        let safe = safe_url("https://e.com/feed/", Some("a"), false);
        assert_eq!(fetch_url("https://e.com/feed/", Some("a"), false, 1), safe);
    }

    #[test]
    fn test_fetch_url_page_two() {
        assert_eq!(
            fetch_url("https://e.com/feed/", None, false, 2),
            "https://e.com/feed/?paged=2"
        );
        assert_eq!(
            fetch_url("https://e.com/feed/", Some("a"), false, 2),
            "https://e.com/feed/?s=a&paged=2"
        );
    }

    #[test]
    fn test_fetch_url_individual_not_paginated() {
        assert_eq!(
            fetch_url("https://e.com/post/", None, true, 3),
            "https://e.com/post/feed/?withoutcomments=1"
        );
    }

    #[test]
    fn test_encode_search_escapes() {
        assert_eq!(encode_search("rust lang"), "rust%20lang");
        assert_eq!(encode_search("a+b/c?d=e"), "a%2Bb%2Fc%3Fd%3De");
        assert_eq!(encode_search("keep_-!.~'()*"), "keep_-!.~'()*");
        assert_eq!(encode_search("café"), "caf%C3%A9");
    }

    proptest! {
        #[test]
        fn prop_safe_url_never_paginated(
            search in proptest::option::of("[a-z ]{0,12}"),
            individual in any::<bool>(),
        ) {
            let safe = safe_url("https://e.com/feed/", search.as_deref(), individual);
            prop_assert!(!safe.contains("paged="));
        }

        #[test]
        fn prop_fetch_url_appends_page_once(
            search in proptest::option::of("[a-z]{1,8}"),
            page in 2u32..10_000,
        ) {
            let safe = safe_url("https://e.com/feed/", search.as_deref(), false);
            let fetch = fetch_url("https://e.com/feed/", search.as_deref(), false, page);
            prop_assert!(fetch.starts_with(&safe));
            prop_assert_eq!(fetch.matches("paged=").count(), 1);
            let expected_suffix = format!("paged={}", page);
            prop_assert!(fetch.ends_with(&expected_suffix));
        }
    }
}
