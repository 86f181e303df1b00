use std::collections::BTreeSet;
use std::fs;
use std::thread::sleep;

use lazy_static::lazy_static;
use log::{debug, info, trace, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::zerochan::io::FetchConfig;
use crate::zerochan::sender::Transport;
use crate::zerochan::tag::Tag;

lazy_static! {
    /// Thumbnail containers, most specific first.
    static ref THUMB_CONTAINERS: Vec<(&'static str, Selector)> =
        ["#thumbs2", "#thumbs3", "#thumbs", "ul[id^=thumbs]"]
            .into_iter()
            .map(|s| (s, Selector::parse(s).unwrap()))
            .collect();
    static ref LIST_ITEM: Selector = Selector::parse("li").unwrap();
    static ref THUMB_LINK: Selector = Selector::parse("div > a.thumb").unwrap();
    static ref FAV_LINK: Selector = Selector::parse("a.fav").unwrap();
    static ref DATA_ID: Selector = Selector::parse("[data-id]").unwrap();
    static ref ANY_LINK: Selector = Selector::parse("a[href]").unwrap();

    /// `/1234567` followed by a path, query or fragment boundary.
    static ref ID_IN_HREF: Regex = Regex::new(r"/(\d+)(?:[/?#]|$)").unwrap();
    static ref NON_WORD: Regex = Regex::new(r"[^\w]+").unwrap();
}

/// Extracts the image identifiers linked from a listing page's thumbnails.
///
/// A page without a thumbnail container yields nothing.
pub(crate) fn extract_ids(html: &str) -> BTreeSet<u64> {
    let document = Html::parse_document(html);

    let container = THUMB_CONTAINERS.iter().find_map(|(name, selector)| {
        document.select(selector).next().map(|ul| {
            debug!("Found thumbs container via '{}' (id={:?})", name, ul.value().id());
            ul
        })
    });
    let Some(container) = container else {
        debug!("No thumbs container found");
        return BTreeSet::new();
    };

    let mut items: Vec<ElementRef> = container
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "li")
        .collect();
    if items.is_empty() {
        items = container.select(&LIST_ITEM).collect();
    }

    let ids: BTreeSet<u64> = items.into_iter().filter_map(id_from_item).collect();
    debug!("Extracted {} IDs from container", ids.len());
    ids
}

/// Tries each place a thumbnail may carry its identifier, in order.
fn id_from_item(item: ElementRef) -> Option<u64> {
    let from_thumb = item
        .select(&THUMB_LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(id_from_href);
    if from_thumb.is_some() {
        return from_thumb;
    }

    let from_fav = item
        .select(&FAV_LINK)
        .next()
        .and_then(|a| a.value().attr("data-id"))
        .and_then(numeric);
    if from_fav.is_some() {
        return from_fav;
    }

    let from_data = item
        .select(&DATA_ID)
        .next()
        .and_then(|e| e.value().attr("data-id"))
        .and_then(numeric);
    if from_data.is_some() {
        return from_data;
    }

    item.select(&ANY_LINK)
        .filter_map(|a| a.value().attr("href"))
        .find_map(id_from_href)
}

fn id_from_href(href: &str) -> Option<u64> {
    ID_IN_HREF
        .captures(href)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn numeric(value: &str) -> Option<u64> {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}

/// Walks a tag's listing pages and collects the identifiers they link to.
pub(crate) struct Grabber<'a, T: Transport> {
    transport: &'a T,
    config: &'a FetchConfig,
}

impl<'a, T: Transport> Grabber<'a, T> {
    pub(crate) fn new(transport: &'a T, config: &'a FetchConfig) -> Self {
        Self { transport, config }
    }

    /// Scans up to `max_pages` listing pages.
    ///
    /// A page that yields no identifiers ends the scan; a page that fails to load is logged
    /// and skipped.
    pub(crate) fn grab_ids(&self, tag: &Tag) -> BTreeSet<u64> {
        let mut found = BTreeSet::new();

        for page in 1..=self.config.max_pages {
            let url = tag.page_url(page);
            let result = self.transport.get_text(&url);
            self.pause();

            let html = match result {
                Ok(html) => html,
                Err(e) => {
                    warn!("Listing page {} for \"{}\" failed: {}", page, tag, e);
                    continue;
                }
            };
            self.dump_page(&url, &html);

            let ids = extract_ids(&html);
            if ids.is_empty() {
                info!("Page {} for \"{}\" has no images, stopping", page, tag);
                break;
            }

            trace!("Page {} for \"{}\": {} IDs", page, tag, ids.len());
            found.extend(ids);
        }

        found
    }

    /// The fixed politeness delay between requests.
    pub(crate) fn pause(&self) {
        if !self.config.request_delay.is_zero() {
            sleep(self.config.request_delay);
        }
    }

    /// Writes the page into the debug directory when enabled. Failures only warn.
    fn dump_page(&self, url: &str, html: &str) {
        if !self.config.save_html_debug {
            return;
        }

        let dir = self.config.debug_directory();
        let path = dir.join(format!("{}.html", NON_WORD.replace_all(url, "_")));
        if let Err(e) = fs::create_dir_all(&dir).and_then(|_| fs::write(&path, html)) {
            warn!("Could not write debug HTML {}: {}", path.display(), e);
        }
    }
}
