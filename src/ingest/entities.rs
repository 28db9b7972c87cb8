// src/ingest/entities.rs
//! Best-effort named-entity tagging from a regex gazetteer.
//!
//! The gazetteer is a JSON file shaped like
//! `{"organizations": [{"regex": "...", "name": "..."}], "people": [...], "locations": [...]}`.
//! Each matching pattern contributes its canonical `name` to that category.
//! A built-in UK-economy gazetteer is used when no file is configured.
//!
//! Notes:
//! - Only the first 10 000 characters of an article are scanned.
//! - Regexes must be compatible with the `regex` crate (no lookarounds).
//! - Invalid patterns are skipped with a warning, never fatal.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

const SCAN_LIMIT: usize = 10_000;

#[derive(Debug, Deserialize)]
struct Pattern {
    regex: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct GazetteerFile {
    #[serde(default)]
    organizations: Vec<Pattern>,
    #[serde(default)]
    people: Vec<Pattern>,
    #[serde(default)]
    locations: Vec<Pattern>,
}

#[derive(Debug)]
pub struct EntityExtractor {
    organizations: Vec<(Regex, String)>,
    people: Vec<(Regex, String)>,
    locations: Vec<(Regex, String)>,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EntityExtractor {
    pub fn builtin() -> Self {
        let mk = |items: &[(&str, &str)]| {
            items
                .iter()
                .map(|(regex, name)| Pattern {
                    regex: regex.to_string(),
                    name: name.to_string(),
                })
                .collect::<Vec<_>>()
        };
        Self::compile(GazetteerFile {
            organizations: mk(&[
                (r"(?i)\bBank of England\b|\bBoE\b", "Bank of England"),
                (r"\bONS\b|(?i)\bOffice for National Statistics\b", "Office for National Statistics"),
                (r"(?i)\b(HM )?Treasury\b", "HM Treasury"),
                (r"\bFTSE( 100| 250)?\b", "FTSE"),
                (r"(?i)\bMonetary Policy Committee\b|\bMPC\b", "Monetary Policy Committee"),
                (r"(?i)\bOffice for Budget Responsibility\b|\bOBR\b", "Office for Budget Responsibility"),
                (r"\bIMF\b|(?i)\bInternational Monetary Fund\b", "IMF"),
                (r"(?i)\bFederal Reserve\b|\bthe Fed\b", "Federal Reserve"),
                (r"(?i)\bEuropean Central Bank\b|\bECB\b", "European Central Bank"),
            ]),
            people: mk(&[
                (r"\bAndrew Bailey\b", "Andrew Bailey"),
                (r"\b(Rachel )?Reeves\b", "Rachel Reeves"),
                (r"\b(Keir )?Starmer\b", "Keir Starmer"),
            ]),
            locations: mk(&[
                (r"\bUK\b|\bUnited Kingdom\b|\bBritain\b", "UK"),
                (r"\bLondon\b", "London"),
                (r"\bScotland\b", "Scotland"),
                (r"\bWales\b", "Wales"),
                (r"\bEurozone\b|\beurozone\b", "Eurozone"),
                (r"\bUS\b|\bUnited States\b", "US"),
                (r"\bChina\b", "China"),
            ]),
        })
    }

    /// Load a gazetteer file, replacing the built-in one.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading entity gazetteer from {}", path.display()))?;
        let file: GazetteerFile = serde_json::from_str(&content)
            .with_context(|| format!("parsing entity gazetteer {}", path.display()))?;
        Ok(Self::compile(file))
    }

    fn compile(file: GazetteerFile) -> Self {
        fn build(category: &str, pats: Vec<Pattern>) -> Vec<(Regex, String)> {
            pats.into_iter()
                .filter_map(|p| match Regex::new(&p.regex) {
                    Ok(re) => Some((re, p.name)),
                    Err(e) => {
                        tracing::warn!(target: "ingest", category, pattern = %p.regex, error = %e, "skipping entity pattern");
                        None
                    }
                })
                .collect()
        }
        Self {
            organizations: build("organizations", file.organizations),
            people: build("people", file.people),
            locations: build("locations", file.locations),
        }
    }

    /// `{"organizations": [...], "people": [...], "locations": [...]}`, each sorted and deduplicated.
    pub fn extract(&self, text: &str) -> Value {
        let scanned: String = text.chars().take(SCAN_LIMIT).collect();
        let hits = |pats: &[(Regex, String)]| -> Vec<String> {
            pats.iter()
                .filter(|(re, _)| re.is_match(&scanned))
                .map(|(_, name)| name.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        json!({
            "organizations": hits(&self.organizations),
            "people": hits(&self.people),
            "locations": hits(&self.locations),
        })
    }
}
