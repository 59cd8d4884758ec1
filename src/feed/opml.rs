use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;
use thiserror::Error;

use crate::storage::FeedSubscription;
use crate::util::validate_feed_url;

/// SEC-003: Maximum nesting depth for OPML outline elements.
const MAX_OPML_DEPTH: usize = 50;

#[derive(Debug, Error)]
pub enum OpmlError {
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// Read an OPML file and extract its subscriptions.
///
/// # Security
///
/// - XXE is not possible: `quick-xml` (pinned 0.37) does not parse `<!ENTITY>`
///   declarations, and `decode_and_unescape_value()` only resolves the five
///   XML builtins
/// - Feed URLs pointing at localhost or private networks are skipped
pub async fn import_opml(path: &Path) -> Result<Vec<FeedSubscription>, OpmlError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_opml(&content)
}

/// Parse OPML text into subscriptions.
///
/// Every `<outline>` carrying an `xmlUrl` is a feed; an outline without one
/// is a folder, and its `title` (or `text`) becomes the category of the
/// feeds nested inside it. Feeds outside any folder get an empty category.
pub fn parse_opml(content: &str) -> Result<Vec<FeedSubscription>, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut feeds = Vec::new();
    // One entry per open <outline>: Some(label) for folders, None for feeds
    let mut folders: Vec<Option<String>> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                if folders.len() >= MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }

                match read_outline(&e, &reader)? {
                    Outline::Feed(url) => {
                        push_feed(&mut feeds, url, &folders);
                        folders.push(None);
                    }
                    Outline::Folder(label) => folders.push(Some(label)),
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                if let Outline::Feed(url) = read_outline(&e, &reader)? {
                    push_feed(&mut feeds, url, &folders);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                folders.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string())),
            _ => {}
        }
    }

    Ok(feeds)
}

enum Outline {
    Feed(String),
    Folder(String),
}

fn read_outline(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Outline, OpmlError> {
    let mut xml_url = None;
    let mut title = None;
    let mut text = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = || {
            attr.decode_and_unescape_value(reader.decoder())
                .map(|v| v.trim().to_string())
                .map_err(|e| OpmlError::XmlParse(e.to_string()))
        };
        match attr.key.as_ref() {
            b"xmlUrl" => xml_url = Some(value()?),
            b"title" => title = Some(value()?),
            b"text" => text = Some(value()?),
            _ => {}
        }
    }

    Ok(match xml_url {
        Some(url) => Outline::Feed(url),
        None => Outline::Folder(title.or(text).unwrap_or_default()),
    })
}

fn push_feed(feeds: &mut Vec<FeedSubscription>, url: String, folders: &[Option<String>]) {
    if let Err(e) = validate_feed_url(&url) {
        tracing::warn!(url = %url, error = %e, "Skipping invalid feed URL");
        return;
    }

    let category = folders
        .iter()
        .rev()
        .find_map(|f| f.as_deref())
        .unwrap_or_default()
        .to_string();

    feeds.push(FeedSubscription {
        link: url,
        category,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sub(link: &str, category: &str) -> FeedSubscription {
        FeedSubscription {
            link: link.to_string(),
            category: category.to_string(),
        }
    }

    #[test]
    fn test_parse_flat() {
        let opml = r#"<?xml version="1.0"?>
<opml version="2.0">
  <body>
    <outline type="rss" text="A" xmlUrl="https://a.example.com/feed"/>
    <outline type="rss" text="B" xmlUrl="https://b.example.com/feed"/>
  </body>
</opml>"#;

        assert_eq!(
            parse_opml(opml).unwrap(),
            vec![
                sub("https://a.example.com/feed", ""),
                sub("https://b.example.com/feed", ""),
            ]
        );
    }

    #[test]
    fn test_folders_become_categories() {
        let opml = r#"<?xml version="1.0"?>
<opml version="2.0">
  <body>
    <outline text="Tech" title="Tech">
      <outline type="rss" text="A" xmlUrl="https://a.example.com/feed"/>
      <outline text="Rust">
        <outline type="rss" text="B" xmlUrl="https://b.example.com/feed"/>
      </outline>
      <outline type="rss" text="C" xmlUrl="https://c.example.com/feed"></outline>
    </outline>
    <outline type="rss" text="D" xmlUrl="https://d.example.com/feed"/>
  </body>
</opml>"#;

        assert_eq!(
            parse_opml(opml).unwrap(),
            vec![
                sub("https://a.example.com/feed", "Tech"),
                sub("https://b.example.com/feed", "Rust"),
                sub("https://c.example.com/feed", "Tech"),
                sub("https://d.example.com/feed", ""),
            ]
        );
    }

    #[test]
    fn test_unsafe_urls_skipped() {
        let opml = r#"<opml version="2.0"><body>
    <outline xmlUrl="http://localhost/feed"/>
    <outline xmlUrl="http://192.168.1.10/feed"/>
    <outline xmlUrl="file:///etc/passwd"/>
    <outline xmlUrl="https://ok.example.com/feed"/>
</body></opml>"#;

        assert_eq!(
            parse_opml(opml).unwrap(),
            vec![sub("https://ok.example.com/feed", "")]
        );
    }

    #[test]
    fn test_escaped_attributes() {
        let opml = r#"<opml version="2.0"><body>
    <outline text="News &amp; Views">
        <outline xmlUrl="https://example.com/feed?a=1&amp;b=2"/>
    </outline>
</body></opml>"#;

        assert_eq!(
            parse_opml(opml).unwrap(),
            vec![sub("https://example.com/feed?a=1&b=2", "News & Views")]
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut opml = String::from("<opml><body>");
        for _ in 0..=MAX_OPML_DEPTH {
            opml.push_str(r#"<outline text="x">"#);
        }
        for _ in 0..=MAX_OPML_DEPTH {
            opml.push_str("</outline>");
        }
        opml.push_str("</body></opml>");

        assert!(matches!(
            parse_opml(&opml),
            Err(OpmlError::MaxDepthExceeded(_))
        ));
    }

    #[test]
    fn test_custom_entity_rejected() {
        let opml = r#"<?xml version="1.0"?>
<!DOCTYPE opml [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<opml><body><outline xmlUrl="https://example.com/&xxe;"/></body></opml>"#;

        assert!(parse_opml(opml).is_err());
    }

    #[test]
    fn test_mismatched_tags() {
        assert!(matches!(
            parse_opml("<opml><body><outline></body></opml>"),
            Err(OpmlError::XmlParse(_))
        ));
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let err = import_opml(Path::new("/nonexistent/subscriptions.opml"))
            .await
            .unwrap_err();
        assert!(matches!(err, OpmlError::Io(_)));
    }
}
