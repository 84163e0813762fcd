//! Trend harvesting from RSS/Atom feeds
//!
//! Feed URLs are normalized (browser-style Google Trends links become their
//! RSS endpoint), pages that are not feeds go through `<link rel="alternate">`
//! autodiscovery, and every URL is checked against private address ranges
//! before it is fetched. A single failing feed never fails the whole fetch.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AutopostError, Result};
use crate::types::TrendItem;

/// Maximum number of trends returned by a fetch
pub const MAX_TRENDS: usize = 15;

/// How long a fetch result is reused for the same inputs
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

const FEED_TIMEOUT: Duration = Duration::from_secs(15);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
const DISCOVERY_USER_AGENT: &str = "Mozilla/5.0 (Autopost feed discovery)";

/// Redirect hops followed for a single feed or page
pub const MAX_REDIRECTS: usize = 5;

/// Google Trends browser category number to RSS `cat` parameter
const TRENDS_CATEGORIES: &[(&str, &str)] = &[
    ("0", ""),
    ("2", "e"),
    ("3", "b"),
    ("5", "s"),
    ("7", "h"),
    ("8", "t"),
];

static LINK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<link\b[^>]*>").expect("valid link tag regex")
});

static TAG_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\b(rel|type|href)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid attribute regex")
});

static FEED_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)application/(rss|atom)\+xml").expect("valid feed type regex")
});

/// A feed entry before ranking
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    /// Unix time of publication (or last update)
    pub published: Option<i64>,
    pub link: String,
    pub feed_title: String,
}

struct CachedTrends {
    key: (Vec<String>, Vec<String>),
    fetched_at: Instant,
    trends: Vec<TrendItem>,
}

/// Fetches and ranks trends, caching results for [`CACHE_TTL`]
///
/// The HTTP client never follows redirects on its own. Each hop is followed
/// by hand and its target goes through the same address check as the
/// configured URL.
pub struct TrendSource {
    client: reqwest::Client,
    cache: Mutex<Option<CachedTrends>>,
    ttl: Duration,
    allowed_hosts: Vec<String>,
}

impl TrendSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AutopostError::InvalidInput(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            cache: Mutex::new(None),
            ttl: CACHE_TTL,
            allowed_hosts: Vec::new(),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Permit one `host:port` even if it is a private or loopback address
    ///
    /// Only meant for feeds served from the local machine, such as test fixtures.
    pub fn allow_host(mut self, authority: impl Into<String>) -> Self {
        self.allowed_hosts.push(authority.into());
        self
    }

    /// Fetch, merge and rank trends from `urls`
    pub async fn fetch(&self, urls: &[String], blacklist: &[String]) -> Vec<TrendItem> {
        let key = (urls.to_vec(), blacklist.to_vec());
        if let Some(trends) = self.cached(&key) {
            debug!("Using cached trends ({} items)", trends.len());
            return trends;
        }

        let mut entries = Vec::new();
        for raw in urls {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let url = self.resolve_feed_url(raw).await;
            match self.fetch_feed(&url).await {
                Ok(mut feed_entries) => {
                    debug!("Fetched {} entries from {}", feed_entries.len(), url);
                    entries.append(&mut feed_entries);
                }
                Err(e) => warn!("Failed to fetch feed {}: {}", url, e),
            }
        }

        let trends = rank_trends(entries, blacklist);
        self.store(key, trends.clone());
        trends
    }

    /// Drop any cached result
    pub fn clear_cache(&self) {
        *self.lock_cache() = None;
    }

    fn cached(&self, key: &(Vec<String>, Vec<String>)) -> Option<Vec<TrendItem>> {
        let cache = self.lock_cache();
        cache
            .as_ref()
            .filter(|c| &c.key == key && c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.trends.clone())
    }

    fn store(&self, key: (Vec<String>, Vec<String>), trends: Vec<TrendItem>) {
        *self.lock_cache() = Some(CachedTrends {
            key,
            fetched_at: Instant::now(),
            trends,
        });
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, Option<CachedTrends>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn is_blocked(&self, url: &str) -> bool {
        let allowed = Url::parse(url)
            .ok()
            .and_then(|parsed| {
                let host = parsed.host_str()?.to_string();
                Some(match parsed.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host,
                })
            })
            .map(|authority| self.allowed_hosts.contains(&authority))
            .unwrap_or(false);
        !allowed && is_blocked_url(url).await
    }

    /// GET `url`, following up to [`MAX_REDIRECTS`] redirects
    ///
    /// Every hop is checked against private address ranges before it is requested.
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
        user_agent: Option<&str>,
    ) -> std::result::Result<reqwest::Response, String> {
        let mut current = url.to_string();
        for _ in 0..=MAX_REDIRECTS {
            if self.is_blocked(&current).await {
                warn!("Refusing to fetch private address: {}", current);
                return Err(format!("refused private address {}", current));
            }

            let mut request = self.client.get(&current).timeout(timeout);
            if let Some(agent) = user_agent {
                request = request.header(reqwest::header::USER_AGENT, agent);
            }
            let response = request
                .send()
                .await
                .map_err(|e| e.without_url().to_string())?;
            let status = response.status();
            if !status.is_redirection() {
                return Ok(response);
            }

            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| format!("HTTP {} without a Location header", status.as_u16()))?;
            let next = Url::parse(&current)
                .and_then(|base| base.join(location))
                .map_err(|e| format!("invalid redirect target: {}", e))?;
            debug!("Following redirect {} -> {}", current, next);
            current = next.to_string();
        }
        Err(format!("too many redirects from {}", url))
    }

    /// Normalize a configured URL and, for plain web pages, discover the feed it advertises
    async fn resolve_feed_url(&self, raw: &str) -> String {
        let normalized = normalize_feed_url(raw);
        if normalized != raw || looks_like_feed(&normalized) {
            return normalized;
        }

        match self.discover(&normalized).await {
            Some(found) => {
                info!("Discovered feed {} -> {}", normalized, found);
                found
            }
            None => normalized,
        }
    }

    async fn discover(&self, page_url: &str) -> Option<String> {
        let response = self
            .get(page_url, DISCOVERY_TIMEOUT, Some(DISCOVERY_USER_AGENT))
            .await
            .ok()?
            .error_for_status()
            .ok()?;
        let base = response.url().clone();
        let html = response.text().await.ok()?;
        discover_feed_link(&html, &base)
    }

    async fn fetch_feed(&self, url: &str) -> std::result::Result<Vec<FeedEntry>, String> {
        let response = self.get(url, FEED_TIMEOUT, None).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| e.without_url().to_string())?;
        parse_feed(&body, url)
    }
}

/// Parse an RSS/Atom document into entries, dropping entries without a title
pub fn parse_feed(body: &[u8], url: &str) -> std::result::Result<Vec<FeedEntry>, String> {
    let feed = feed_rs::parser::parse(body).map_err(|e| e.to_string())?;
    let feed_title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string());

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.map(|t| t.content.trim().to_string())?;
            if title.is_empty() {
                return None;
            }
            Some(FeedEntry {
                title,
                published: entry.published.or(entry.updated).map(|d| d.timestamp()),
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                feed_title: feed_title.clone(),
            })
        })
        .collect())
}

/// Merge entries from all feeds into the ranked trend list
///
/// Newest first (undated entries last), deduplicated by lowercase title,
/// entries containing any blacklist term removed, capped at [`MAX_TRENDS`].
pub fn rank_trends(mut entries: Vec<FeedEntry>, blacklist: &[String]) -> Vec<TrendItem> {
    entries.sort_by_key(|e| std::cmp::Reverse(e.published.unwrap_or(0)));

    let blacklist: Vec<&str> = blacklist
        .iter()
        .map(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .collect();
    let mut seen = HashSet::new();
    let mut trends = Vec::new();

    for entry in entries {
        if blacklist.iter().any(|term| entry.title.contains(term)) {
            continue;
        }
        if !seen.insert(entry.title.to_lowercase()) {
            continue;
        }
        trends.push(TrendItem {
            title: entry.title,
            source_url: entry.link,
            source_name: entry.feed_title,
        });
        if trends.len() == MAX_TRENDS {
            break;
        }
    }
    trends
}

/// Rewrite a browser Google Trends URL into its daily RSS endpoint
///
/// Any other URL is returned unchanged.
pub fn normalize_feed_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let Some(host) = url.host_str() else {
        return raw.to_string();
    };
    let path = url.path().trim_end_matches('/');
    if !host.contains("trends.google") || !matches!(path, "/trending" | "/trends/trending") {
        return raw.to_string();
    }

    let mut geo = "JP".to_string();
    let mut category = "0".to_string();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "geo" => geo = value.into_owned(),
            "category" => category = value.into_owned(),
            _ => {}
        }
    }
    let rss_category = TRENDS_CATEGORIES
        .iter()
        .find(|(number, _)| *number == category)
        .map(|(_, code)| *code)
        .unwrap_or("");

    let mut rss = format!(
        "https://{}/trends/trendingsearches/daily/rss?geo={}",
        host, geo
    );
    if !rss_category.is_empty() {
        rss.push_str("&cat=");
        rss.push_str(rss_category);
    }
    rss
}

/// Cheap check for URLs that are already feeds
pub fn looks_like_feed(url: &str) -> bool {
    let lower = url.to_lowercase();
    ["rss", "feed", "atom", ".xml", ".rdf"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Find the first RSS/Atom `<link rel="alternate">` in an HTML page
pub fn discover_feed_link(html: &str, base: &Url) -> Option<String> {
    for tag in LINK_TAG.find_iter(html) {
        let mut rel = None;
        let mut kind = None;
        let mut href = None;
        for caps in TAG_ATTR.captures_iter(tag.as_str()) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim())
                .unwrap_or("");
            match caps[1].to_lowercase().as_str() {
                "rel" => rel = Some(value),
                "type" => kind = Some(value),
                "href" => href = Some(value),
                _ => {}
            }
        }

        let is_alternate = rel
            .map(|r| r.split_whitespace().any(|r| r.eq_ignore_ascii_case("alternate")))
            .unwrap_or(false);
        let is_feed = kind.map(|k| FEED_TYPE.is_match(k)).unwrap_or(false);
        match href {
            Some(href) if is_alternate && is_feed && !href.is_empty() => {
                return base.join(href).ok().map(|u| u.to_string());
            }
            _ => {}
        }
    }
    None
}

/// Google News search feeds for each non-blank keyword
pub fn keywords_to_feed_urls(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| {
            format!(
                "https://news.google.com/rss/search?q={}&hl=ja&gl=JP&ceid=JP:ja",
                urlencoding::encode(k)
            )
        })
        .collect()
}

/// Whether `url` points at localhost or resolves to a non-public address
///
/// Hosts that fail to resolve are not blocked; the fetch itself will fail.
pub async fn is_blocked_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    match parsed.host() {
        Some(url::Host::Domain(domain)) => {
            let domain = domain.to_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return true;
            }
            let port = parsed.port_or_known_default().unwrap_or(80);
            let blocked = match tokio::net::lookup_host((domain.as_str(), port)).await {
                Ok(mut addrs) => addrs.any(|addr| ip_is_blocked(addr.ip())),
                Err(_) => false,
            };
            blocked
        }
        Some(url::Host::Ipv4(ip)) => ip_is_blocked(IpAddr::V4(ip)),
        Some(url::Host::Ipv6(ip)) => ip_is_blocked(IpAddr::V6(ip)),
        None => false,
    }
}

/// Private, loopback, link-local and reserved ranges
pub fn ip_is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => ipv4_is_blocked(v4),
        IpAddr::V6(v6) => ipv6_is_blocked(v6),
    }
}

fn ipv4_is_blocked(ip: Ipv4Addr) -> bool {
    let first = ip.octets()[0];
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || first == 0
        || first >= 240
}

fn ipv6_is_blocked(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return ipv4_is_blocked(mapped);
    }
    let head = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (head & 0xfe00) == 0xfc00
        || (head & 0xffc0) == 0xfe80
        || (head == 0x2001 && ip.segments()[1] == 0x0db8)
}
