// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A feed to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

impl FeedSpec {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

/// Trusted UK business feeds used when no feed file is configured.
pub fn default_feeds() -> Vec<FeedSpec> {
    vec![
        FeedSpec::new("BBC Business", "https://feeds.bbci.co.uk/news/business/rss.xml"),
        FeedSpec::new("Guardian Business", "https://www.theguardian.com/uk/business/rss"),
        FeedSpec::new("Sky News Business", "https://feeds.skynews.com/feeds/rss/business.xml"),
    ]
}

/// Load feeds from an explicit path. Supports TOML (`[[feeds]]`) or a JSON array.
pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedSpec>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading feeds from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feeds(&content, ext.as_str())
}

/// Configured feed file, or the built-in list when none is set.
pub fn load_feeds(path: Option<&Path>) -> Result<Vec<FeedSpec>> {
    match path {
        Some(p) if p.exists() => load_feeds_from(p),
        Some(p) => Err(anyhow!("feeds file {} does not exist", p.display())),
        None => Ok(default_feeds()),
    }
}

fn parse_feeds(s: &str, hint_ext: &str) -> Result<Vec<FeedSpec>> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("[[feeds]]") || s.contains("feeds =");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported feeds format"))
}

fn parse_toml(s: &str) -> Result<Vec<FeedSpec>> {
    #[derive(Deserialize)]
    struct TomlFeeds {
        feeds: Vec<FeedSpec>,
    }
    let v: TomlFeeds = toml::from_str(s)?;
    Ok(clean_list(v.feeds))
}

fn parse_json(s: &str) -> Result<Vec<FeedSpec>> {
    let v: Vec<FeedSpec> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim, drop blank URLs, and keep the first entry per URL.
fn clean_list(items: Vec<FeedSpec>) -> Vec<FeedSpec> {
    use std::collections::HashSet;
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let url = it.url.trim().to_string();
        if url.is_empty() || !seen.insert(url.clone()) {
            continue;
        }
        let name = match it.name.trim() {
            "" => url.clone(),
            n => n.to_string(),
        };
        out.push(FeedSpec { name, url });
    }
    out
}
