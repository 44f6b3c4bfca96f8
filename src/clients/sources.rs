//! Release-discovery source adapters: RSS/Atom feeds plus a fallback
//! paginated JSON torrent-index API.
//!
//! Grounded on the original resolver's `rss_sources` module: feeds are
//! fetched under a shared wall-clock deadline (`fetch_candidates` trims each
//! request's timeout to whatever of the budget remains), magnet links are
//! preferred over bittorrent enclosures which are preferred over the bare
//! entry link, and detail-page links from one known indexer are resolved to
//! a magnet via its JSON API before being handed back.

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FeedCandidate {
    pub title: String,
    pub link: String,
    pub source: &'static str,
}

#[derive(Debug, Default)]
struct FeedItem {
    title: String,
    link: String,
    enclosure_url: Option<String>,
    enclosure_type: Option<String>,
}

fn pick_link(item: &FeedItem) -> Option<String> {
    if item.link.starts_with("magnet:") {
        return Some(item.link.clone());
    }
    if let (Some(url), Some(ty)) = (&item.enclosure_url, &item.enclosure_type)
        && (url.starts_with("magnet:") || ty.contains("bittorrent"))
    {
        return Some(url.clone());
    }
    if !item.link.is_empty() {
        return Some(item.link.clone());
    }
    item.enclosure_url.clone()
}

/// Percent-encodes the path and query of an http(s) link; passes magnet URIs
/// through untouched since they are not hierarchical URLs.
fn normalize_url(link: &str) -> String {
    if link.starts_with("magnet:") {
        return link.to_string();
    }
    url::Url::parse(link).map_or_else(|_| link.to_string(), |u| u.to_string())
}

fn parse_feed_xml(body: &str, cap: usize) -> Vec<FeedItem> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut cur: Option<FeedItem> = None;
    let mut in_field: Option<&'static str> = None;
    let mut buf = Vec::new();

    loop {
        if items.len() >= cap {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = String::from_utf8_lossy(name.as_ref()).to_lowercase();
                match local.as_str() {
                    "item" | "entry" => cur = Some(FeedItem::default()),
                    "title" => in_field = Some("title"),
                    "link" => {
                        if let Some(item) = cur.as_mut() {
                            let href = e
                                .attributes()
                                .filter_map(|a| a.ok())
                                .find(|a| a.key.as_ref() == b"href")
                                .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                            if let Some(h) = href {
                                item.link = h;
                            } else {
                                in_field = Some("link");
                            }
                        }
                    }
                    "enclosure" => {
                        if let Some(item) = cur.as_mut() {
                            for attr in e.attributes().filter_map(|a| a.ok()) {
                                let value = attr.unescape_value().unwrap_or_default().into_owned();
                                match attr.key.as_ref() {
                                    b"url" => item.enclosure_url = Some(value),
                                    b"type" => item.enclosure_type = Some(value),
                                    _ => {}
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(field), Some(item)) = (in_field, cur.as_mut()) {
                    let decoded = t.decode().unwrap_or_default();
                    let text = quick_xml::escape::unescape(&decoded)
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| decoded.into_owned());
                    match field {
                        "title" => item.title = text,
                        "link" => item.link = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let local = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                match local.as_str() {
                    "title" | "link" => in_field = None,
                    "item" | "entry" => {
                        if let Some(item) = cur.take() {
                            items.push(item);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("feed xml parse error: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    items
}

fn bangumi_id_from_link(link: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"bangumi\.moe/(?:torrent/|#!/torrent/)([0-9a-fA-F]{24})")
            .expect("static regex pattern is valid")
    });
    re.captures(link).map(|c| c[1].to_string())
}

#[derive(Deserialize)]
struct BangumiTorrentDetail {
    magnet: Option<String>,
}

async fn resolve_bangumi_magnet(client: &Client, torrent_id: &str) -> Option<String> {
    let url = format!("https://bangumi.moe/api/v2/torrent/{torrent_id}");
    let resp = client.get(&url).send().await.ok()?;
    let detail: BangumiTorrentDetail = resp.json().await.ok()?;
    detail.magnet
}

/// Resolves a feed entry link to a fetchable download link: magnet URIs and
/// unrecognized links pass through unchanged, bangumi.moe detail pages are
/// resolved to their magnet via the site's JSON API.
pub async fn resolve_download_link(client: &Client, link: &str) -> String {
    if link.starts_with("magnet:") {
        return link.to_string();
    }
    if let Some(tid) = bangumi_id_from_link(link)
        && let Some(magnet) = resolve_bangumi_magnet(client, &tid).await
    {
        return magnet;
    }
    link.to_string()
}

/// Fetches feed entries from `feed_urls` (capped at `max_feeds`), each
/// request's timeout trimmed to whatever remains of `max_total_time`.
/// Returns the collected candidates plus whether the budget ran out before
/// every feed could be tried.
pub async fn fetch_candidates(
    client: &Client,
    feed_urls: &[String],
    max_feeds: usize,
    per_feed_cap: usize,
    timeout_sec: u64,
    max_total_time: Duration,
) -> (Vec<FeedCandidate>, bool) {
    let started = Instant::now();
    let mut out = Vec::new();

    for url in feed_urls.iter().take(max_feeds) {
        let elapsed = started.elapsed();
        if elapsed >= max_total_time {
            return (out, true);
        }
        let remaining = max_total_time - elapsed;
        let call_timeout = Duration::from_secs(timeout_sec).min(remaining);

        match fetch_one_feed(client, url, per_feed_cap, call_timeout).await {
            Ok(candidates) => out.extend(candidates),
            Err(e) => warn!("feed fetch failed for {}: {}", url, e),
        }
    }
    (out, false)
}

async fn fetch_one_feed(
    client: &Client,
    url: &str,
    cap: usize,
    timeout: Duration,
) -> Result<Vec<FeedCandidate>> {
    let body = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .context("feed request failed")?
        .text()
        .await
        .context("feed body was not text")?;

    let items = parse_feed_xml(&body, cap);
    Ok(items
        .into_iter()
        .filter_map(|item| {
            let link = pick_link(&item)?;
            Some(FeedCandidate {
                title: item.title,
                link: normalize_url(&link),
                source: "rss",
            })
        })
        .collect())
}

fn norm(s: &str) -> String {
    s.to_lowercase()
}

fn term_tokens(term: &str) -> Vec<String> {
    norm(term)
        .split_whitespace()
        .filter(|t| t.len() >= 2)
        .take(6)
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
struct BangumiApiTorrent {
    title: String,
    magnet: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct BangumiApiPage {
    torrents: Vec<BangumiApiTorrent>,
}

/// Fallback source when RSS feeds come up empty: scans a paginated JSON
/// torrent index and keeps entries whose title shares at least two tokens
/// with one of the search terms (or is a token superset of it).
pub async fn fetch_bangumi_api_candidates(
    client: &Client,
    search_terms: &[String],
    max_pages: u32,
    max_results: usize,
    timeout_sec: u64,
    max_total_time: Duration,
) -> (Vec<FeedCandidate>, bool) {
    let started = Instant::now();
    let term_token_sets: Vec<HashSet<String>> = search_terms
        .iter()
        .map(|t| term_tokens(t).into_iter().collect())
        .collect();

    let mut out = Vec::new();
    let mut seen_links = HashSet::new();

    for page in 1..=max_pages {
        let elapsed = started.elapsed();
        if elapsed >= max_total_time {
            return (out, true);
        }
        let remaining = max_total_time - elapsed;
        let call_timeout = Duration::from_secs(timeout_sec).min(remaining);

        let url = format!("https://bangumi.moe/api/v2/torrent/page/{page}");
        let resp = match client.get(&url).timeout(call_timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("bangumi api page {} failed: {}", page, e);
                continue;
            }
        };
        let parsed: BangumiApiPage = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                debug!("bangumi api page {} parse error: {}", page, e);
                continue;
            }
        };

        for t in parsed.torrents {
            let Some(link) = t.magnet.clone().or(t.url.clone()) else {
                continue;
            };
            if !seen_links.insert(link.clone()) {
                continue;
            }
            let title_tokens: HashSet<String> = term_tokens(&t.title).into_iter().collect();
            let matches = term_token_sets.iter().any(|terms| {
                let overlap = terms.intersection(&title_tokens).count();
                overlap >= 2 || (!terms.is_empty() && terms.is_subset(&title_tokens))
            });
            if matches {
                out.push(FeedCandidate {
                    title: t.title,
                    link: normalize_url(&link),
                    source: "bangumi_api",
                });
                if out.len() >= max_results {
                    return (out, false);
                }
            }
        }
    }
    (out, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_magnet_over_enclosure() {
        let item = FeedItem {
            title: "Show".to_string(),
            link: "magnet:?xt=urn:btih:abc".to_string(),
            enclosure_url: Some("https://example.com/t.torrent".to_string()),
            enclosure_type: Some("application/x-bittorrent".to_string()),
        };
        assert_eq!(pick_link(&item).as_deref(), Some("magnet:?xt=urn:btih:abc"));
    }

    #[test]
    fn picks_bittorrent_enclosure_over_plain_link() {
        let item = FeedItem {
            title: "Show".to_string(),
            link: "https://example.com/item/1".to_string(),
            enclosure_url: Some("https://example.com/t.torrent".to_string()),
            enclosure_type: Some("application/x-bittorrent".to_string()),
        };
        assert_eq!(
            pick_link(&item).as_deref(),
            Some("https://example.com/t.torrent")
        );
    }

    #[test]
    fn parses_rss_items() {
        let rss = r#"<?xml version="1.0"?>
        <rss><channel>
            <item>
                <title>Show - 12 [1080p]</title>
                <link>https://nyaa.si/view/12345</link>
                <enclosure url="magnet:?xt=urn:btih:deadbeef" type="application/x-bittorrent"/>
            </item>
        </channel></rss>"#;
        let items = parse_feed_xml(rss, 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Show - 12 [1080p]");
        assert_eq!(
            pick_link(&items[0]).as_deref(),
            Some("magnet:?xt=urn:btih:deadbeef")
        );
    }

    #[test]
    fn extracts_bangumi_id_from_link() {
        assert_eq!(
            bangumi_id_from_link("https://bangumi.moe/torrent/64c1e2f3a4b5c6d7e8f9a0b1"),
            Some("64c1e2f3a4b5c6d7e8f9a0b1".to_string())
        );
        assert_eq!(bangumi_id_from_link("https://nyaa.si/view/1"), None);
    }

    #[test]
    fn term_tokens_filters_short_and_caps_length() {
        let tokens = term_tokens("a the quick brown fox jumps over the lazy dog");
        assert!(tokens.len() <= 6);
        assert!(tokens.iter().all(|t| t.len() >= 2));
    }
}
