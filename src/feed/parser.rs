use feed_rs::model::{Entry, Feed, Link};
use feed_rs::parser;

use super::source::{FetchError, FetchedFeed, FetchedItem};

const UNTITLED_FEED: &str = "Untitled feed";

/// Output of [`parse_feed`]: the feed plus how many entries were dropped.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub feed: FetchedFeed,
    /// Entries without a link or without any timestamp
    pub skipped: usize,
}

/// Parse an RSS, Atom or JSON Feed document.
///
/// Entries that cannot be placed on the timeline (no published or updated
/// time) or cannot be keyed (no link) are dropped and counted.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, FetchError> {
    let feed = parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    let title = feed
        .title
        .as_ref()
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED_FEED.to_string());
    let link = site_link(&feed.links);
    let image = feed_image(&feed);

    let total = feed.entries.len();
    let items: Vec<FetchedItem> = feed.entries.into_iter().filter_map(convert_entry).collect();
    let skipped = total - items.len();

    Ok(ParsedFeed {
        feed: FetchedFeed {
            title,
            link,
            image,
            items,
        },
        skipped,
    })
}

fn convert_entry(entry: Entry) -> Option<FetchedItem> {
    let published = entry.published.or(entry.updated)?;
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())?;

    let title = entry
        .title
        .map(|t| t.content)
        .unwrap_or_default();
    let content = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content))
        .unwrap_or_default();
    let image = entry.media.iter().find_map(|media| {
        media
            .thumbnails
            .first()
            .map(|t| t.image.uri.clone())
            .or_else(|| {
                media
                    .content
                    .iter()
                    .filter(|c| {
                        c.content_type
                            .as_ref()
                            .is_some_and(|m| m.ty() == "image")
                    })
                    .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
            })
    });

    Some(FetchedItem {
        title,
        link,
        content,
        image,
        published,
    })
}

/// The site link: first link that is not the feed's own URL.
fn site_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref() != Some("self"))
        .map(|l| l.href.clone())
}

fn feed_image(feed: &Feed) -> Option<String> {
    feed.logo
        .as_ref()
        .or(feed.icon.as_ref())
        .map(|img| img.uri.trim().to_string())
        .filter(|uri| !uri.is_empty())
}
