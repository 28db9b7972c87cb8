use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::normalize_text;
use crate::ingest::types::{Article, DocumentSource};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

static RE_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p[^>]*>(.*?)</p>").expect("paragraph regex"));

/// RFC 2822 (RSS) or RFC 3339 (Atom-ish feeds) to unix seconds.
pub fn parse_pub_date(ts: &str) -> Option<i64> {
    let ts = ts.trim();
    if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822).or_else(|_| OffsetDateTime::parse(ts, &Rfc3339)) {
        return Some(dt.unix_timestamp());
    }
    // Named UTC zones some feeds emit instead of a numeric offset.
    let numeric = ["GMT", "UTC", "UT", "Z"].iter().find_map(|z| {
        ts.strip_suffix(z)
            .filter(|head| head.ends_with(' '))
            .map(|head| format!("{head}+0000"))
    })?;
    OffsetDateTime::parse(&numeric, &Rfc2822)
        .ok()
        .map(|dt| dt.unix_timestamp())
}

/// Paragraph text of an HTML article page, normalized, blank-line separated.
pub fn extract_paragraphs(html: &str) -> String {
    RE_PARAGRAPH
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| normalize_text(m.as_str()))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// RSS 2.0 feed source. Takes the first `max_articles` items; in HTTP mode the
/// linked article page can be fetched for the full body.
pub struct RssFeedSource {
    name: String,
    mode: Mode,
    max_articles: usize,
    fetch_body: bool,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeedSource {
    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
            max_articles: 5,
            fetch_body: false,
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("econ-insight-agent/0.1")
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
            max_articles: 5,
            fetch_body: true,
        })
    }

    pub fn with_max_articles(mut self, n: usize) -> Self {
        self.max_articles = n.max(1);
        self
    }

    pub fn with_article_body(mut self, on: bool) -> Self {
        self.fetch_body = on;
        self
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<Item>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)
            .with_context(|| format!("parsing rss xml for {}", self.name))?;
        let mut items = rss.channel.item;
        items.truncate(self.max_articles);

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        Ok(items)
    }

    fn to_article(item: Item, body: Option<String>) -> Option<Article> {
        let title = normalize_text(item.title.as_deref().unwrap_or_default());
        let text = match body {
            Some(b) if !b.trim().is_empty() => b,
            _ => normalize_text(item.description.as_deref().unwrap_or_default()),
        };
        if text.is_empty() {
            return None;
        }
        Some(Article {
            text,
            source_url: item.link,
            title: if title.is_empty() {
                "Unknown".to_string()
            } else {
                title
            },
            published_at: item.pub_date.as_deref().and_then(parse_pub_date),
        })
    }

    async fn fetch_body(&self, client: &reqwest::Client, link: &str) -> Option<String> {
        let resp = match client.get(link).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "ingest", feed = %self.name, link, error = %e, "article download failed");
                return None;
            }
        };
        let html = resp.error_for_status().ok()?.text().await.ok()?;
        let body = extract_paragraphs(&html);
        (!body.is_empty()).then_some(body)
    }
}

#[async_trait]
impl DocumentSource for RssFeedSource {
    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        let out: Vec<Article> = match &self.mode {
            Mode::Fixture(s) => self
                .parse_items_from_str(s)?
                .into_iter()
                .filter_map(|it| Self::to_article(it, None))
                .collect(),

            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.name))?
                    .error_for_status()
                    .with_context(|| format!("{} non-2xx", self.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                let items = self.parse_items_from_str(&body)?;
                tracing::info!(target: "ingest", feed = %self.name, items = items.len(), "feed parsed");

                let mut out = Vec::with_capacity(items.len());
                for it in items {
                    let page = match (&it.link, self.fetch_body) {
                        (Some(link), true) => self.fetch_body(client, link).await,
                        _ => None,
                    };
                    out.extend(Self::to_article(it, page));
                }
                out
            }
        };

        counter!("ingest_articles_total").increment(out.len() as u64);
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// HTML entities that feeds leak into XML but XML does not define.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&pound;", "£")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Biz</title>
<item><title>Rates held</title><link>https://example.test/a</link>
<pubDate>Tue, 10 Jun 2025 08:00:00 GMT</pubDate>
<description>The Bank of England held rates at 4.25%&nbsp;today.</description></item>
<item><title>No body</title><description></description></item>
<item><title>Third</title><description>Third item text.</description></item>
</channel></rss>"#;

    #[tokio::test]
    async fn fixture_items_become_articles() {
        let src = RssFeedSource::from_fixture("Test", FEED);
        let arts = src.fetch_articles().await.unwrap();
        assert_eq!(arts.len(), 2); // the empty one is skipped
        assert_eq!(arts[0].title, "Rates held");
        assert_eq!(arts[0].published_at, Some(1_749_542_400));
        assert!(arts[0].text.contains("4.25% today"));
        assert_eq!(arts[1].published_at, None);
    }

    #[tokio::test]
    async fn max_articles_limits_items() {
        let src = RssFeedSource::from_fixture("Test", FEED).with_max_articles(1);
        assert_eq!(src.fetch_articles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_xml_is_an_error() {
        let src = RssFeedSource::from_fixture("Broken", "<rss><channel>");
        assert!(src.fetch_articles().await.is_err());
    }

    #[test]
    fn paragraphs_are_extracted_and_joined() {
        let html = "<html><p class=\"x\">First &amp; <b>bold</b>.</p><div>nav</div><p>Second</p><p> </p></html>";
        assert_eq!(extract_paragraphs(html), "First & bold.\n\nSecond");
    }

    #[test]
    fn pub_date_formats() {
        assert_eq!(parse_pub_date("Tue, 10 Jun 2025 08:00:00 GMT"), Some(1_749_542_400));
        assert_eq!(parse_pub_date("2025-06-10T08:00:00Z"), Some(1_749_542_400));
        assert_eq!(parse_pub_date("yesterday"), None);
    }
}
