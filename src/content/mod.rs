//! Per-item display transforms applied during aggregation.
//!
//! - [`image`] - display image and feed badge fallback chains
//! - [`relative_time`] - "3 hours ago" style timestamps
//! - [`markup`] - cosmetic repair of `<tag-->` tag soup
//!
//! Everything here is a pure function of its inputs. Nothing fetches over the
//! network and nothing sanitizes HTML.

mod image;
mod markup;
mod relative_time;

pub use image::{favicon_url, first_image_src, resolve_display_image, resolve_feed_badge};
pub use markup::repair_malformed_markup;
pub use relative_time::{format_display_time, format_relative_time, DISPLAY_TIME_FORMAT};
