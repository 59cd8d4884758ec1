use std::sync::LazyLock;

use regex::Regex;

use crate::util::host_of;

/// First `src="..."` inside an `img` tag. Case-sensitive and tolerant of
/// unclosed tags; the match starts at `img` so `<IMG` is not recognised.
static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"img[^>]*src="([^"]*)"#).expect("img src regex should compile")
});

/// Returns the `src` of the first image tag found in `content`.
pub fn first_image_src(content: &str) -> Option<&str> {
    IMG_SRC_RE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Picks the image shown next to an item.
///
/// Precedence: the item's structured image, then the first `<img src>` in the
/// raw content, then the empty string. The URL is not validated.
pub fn resolve_display_image(item_image: Option<&str>, raw_content: &str) -> String {
    if let Some(image) = item_image.filter(|url| !url.trim().is_empty()) {
        return image.to_string();
    }
    first_image_src(raw_content)
        .map(str::to_string)
        .unwrap_or_default()
}

/// Picks the badge shown for a feed.
///
/// Uses the feed's declared image when present; otherwise builds a favicon
/// URL for the host of `feed_link`. Returns an empty string when neither is
/// available.
pub fn resolve_feed_badge(feed_link: &str, feed_image: Option<&str>, favicon_service: &str) -> String {
    if let Some(image) = feed_image.filter(|url| !url.trim().is_empty()) {
        return image.to_string();
    }
    favicon_url(favicon_service, feed_link).unwrap_or_default()
}

/// Favicon service URL for the host of `link`, or `None` if it has no host.
pub fn favicon_url(favicon_service: &str, link: &str) -> Option<String> {
    host_of(link).map(|host| format!("{favicon_service}{host}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAVICONS: &str = "https://www.google.com/s2/favicons?sz=16&domain=";

    #[test]
    fn test_structured_image_wins() {
        let content = r#"<p><img src="https://example.com/inline.png"></p>"#;
        assert_eq!(
            resolve_display_image(Some("https://example.com/cover.jpg"), content),
            "https://example.com/cover.jpg"
        );
    }

    #[test]
    fn test_falls_back_to_first_inline_image() {
        let content = r#"<p>Intro</p><img alt="a" src="https://example.com/one.png"><img src="https://example.com/two.png">"#;
        assert_eq!(
            resolve_display_image(None, content),
            "https://example.com/one.png"
        );
    }

    #[test]
    fn test_blank_structured_image_is_ignored() {
        let content = r#"<img src="https://example.com/inline.png">"#;
        assert_eq!(
            resolve_display_image(Some("  "), content),
            "https://example.com/inline.png"
        );
    }

    #[test]
    fn test_no_image_yields_empty() {
        assert_eq!(resolve_display_image(None, "<p>No pictures</p>"), "");
        assert_eq!(resolve_display_image(None, ""), "");
    }

    #[test]
    fn test_unclosed_img_tag_still_matches() {
        assert_eq!(
            first_image_src(r#"<img src="https://example.com/x.gif""#),
            Some("https://example.com/x.gif")
        );
    }

    #[test]
    fn test_uppercase_tag_not_matched() {
        assert_eq!(first_image_src(r#"<IMG SRC="https://example.com/x.gif">"#), None);
    }

    #[test]
    fn test_feed_badge_prefers_declared_image() {
        assert_eq!(
            resolve_feed_badge(
                "https://blog.example.com/",
                Some("https://blog.example.com/logo.png"),
                FAVICONS
            ),
            "https://blog.example.com/logo.png"
        );
    }

    #[test]
    fn test_feed_badge_falls_back_to_favicon() {
        assert_eq!(
            resolve_feed_badge("https://blog.example.com/posts", None, FAVICONS),
            "https://www.google.com/s2/favicons?sz=16&domain=blog.example.com"
        );
    }

    #[test]
    fn test_feed_badge_without_host_is_empty() {
        assert_eq!(resolve_feed_badge("not a url", None, FAVICONS), "");
    }
}
