// src/report.rs
//! Digest report generation, the on-disk report archive, and re-indexing of
//! saved reports as searchable evidence.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use metrics::counter;
use serde::Serialize;

use crate::error::{AgentError, Result};
use crate::llm::DynLlm;
use crate::prompts::{PromptTemplates, PromptVars, TemplateId};
use crate::store::{sort_newest_first, Chunk, ChunkKind, EvidenceGateway, Filter};

pub const NO_RECENT_NEWS: &str = "No recent news found to generate a report.";
pub const REPORT_QUERY: &str = "UK Economy market updates";
pub const REPORT_SUFFIX: &str = "_Market_Report.md";

const CANDIDATE_POOL: usize = 20;
const MOST_RECENT: usize = 10;
const MAX_NAME_ATTEMPTS: usize = 100;

/// Outcome of [`ReportGenerator::save_report`]. The file is authoritative;
/// `reindexed = false` means the evidence store copy is missing.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub path: PathBuf,
    pub reindexed: bool,
}

/// `{local YYYY-MM-DD_HH-MM}_Market_Report.md`
pub fn report_file_name(at: chrono::DateTime<Local>) -> String {
    format!("{}{REPORT_SUFFIX}", at.format("%Y-%m-%d_%H-%M"))
}

pub struct ReportGenerator {
    gateway: EvidenceGateway,
    llm: DynLlm,
    templates: Arc<PromptTemplates>,
    archive: ReportArchive,
}

impl ReportGenerator {
    pub fn new(
        gateway: EvidenceGateway,
        llm: DynLlm,
        templates: Arc<PromptTemplates>,
        archive: ReportArchive,
    ) -> Self {
        Self {
            gateway,
            llm,
            templates,
            archive,
        }
    }

    pub fn archive(&self) -> &ReportArchive {
        &self.archive
    }

    /// Digest over the ten most recent news chunks, or [`NO_RECENT_NEWS`].
    pub async fn generate_report(&self) -> Result<String> {
        let mut docs = self
            .gateway
            .search(
                REPORT_QUERY,
                CANDIDATE_POOL,
                Some(&Filter::kind(ChunkKind::NewsChunk)),
            )
            .await?;
        sort_newest_first(&mut docs);
        docs.truncate(MOST_RECENT);

        if docs.is_empty() {
            return Ok(NO_RECENT_NEWS.to_string());
        }

        let text = docs
            .iter()
            .map(|d| format!("Title: {}\n{}", d.metadata.title, d.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let vars: PromptVars = [("text", text.as_str())].into_iter().collect();
        let prompt = self.templates.render(TemplateId::Summary, &vars)?;
        let report = self.llm.complete(&prompt).await?;
        tracing::info!(target: "report", chunks = docs.len(), "report generated");
        Ok(report)
    }

    /// Write the report file, then append it to the evidence store as a
    /// `Report` chunk. A failed re-index is logged and reported in the outcome.
    pub async fn save_report(&self, text: &str) -> Result<SaveOutcome> {
        let now = Local::now();
        let path = self.archive.write(&report_file_name(now), text)?;
        counter!("reports_saved_total").increment(1);

        let chunk = Chunk::report(text, now.timestamp());
        let reindexed = match self.gateway.add(chunk).await {
            Ok(()) => {
                tracing::info!(target: "report", path = %path.display(), "report indexed to memory");
                true
            }
            Err(e) => {
                let e = AgentError::ReindexFailure(e.to_string());
                counter!("report_reindex_failures_total").increment(1);
                tracing::warn!(target: "report", path = %path.display(), error = %e, "report saved but not indexed");
                false
            }
        };
        Ok(SaveOutcome { path, reindexed })
    }

    /// Generate and save, skipping the save when there was no news.
    pub async fn generate_and_save(&self) -> Result<Option<(String, SaveOutcome)>> {
        let report = self.generate_report().await?;
        if report == NO_RECENT_NEWS {
            return Ok(None);
        }
        let saved = self.save_report(&report).await?;
        Ok(Some((report, saved)))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReportFile {
    pub name: String,
    pub path: PathBuf,
}

/// Directory of saved reports, one Markdown file each.
#[derive(Debug, Clone)]
pub struct ReportArchive {
    dir: PathBuf,
}

impl ReportArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create `name` without touching existing files. A taken name (two saves
    /// in the same minute) gets `_2`, `_3`, ... appended to its stem, which
    /// still lists newest first.
    pub fn write(&self, name: &str, text: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let stem = name.strip_suffix(".md").unwrap_or(name);
        for n in 1..=MAX_NAME_ATTEMPTS {
            let candidate = if n == 1 {
                name.to_string()
            } else {
                format!("{stem}_{n}.md")
            };
            let path = self.dir.join(&candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut f) => {
                    f.write_all(text.as_bytes())?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::warn!(target: "report", name = %candidate, "report file exists, trying next name");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free report name for `{name}`"),
        )
        .into())
    }

    /// `*.md` files, newest first (file names sort chronologically).
    pub fn list(&self) -> Result<Vec<ReportFile>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out: Vec<ReportFile> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("md"))
            .filter_map(|p| {
                let name = p.file_name()?.to_str()?.to_string();
                Some(ReportFile { name, path: p })
            })
            .collect();
        out.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(out)
    }

    /// Read a report by bare file name. Anything that is not a plain `.md`
    /// file name inside the archive is rejected.
    pub fn read(&self, name: &str) -> Result<String> {
        let plain = !name.is_empty()
            && !name.contains(['/', '\\'])
            && !name.starts_with('.')
            && name.ends_with(".md");
        if !plain {
            return Err(AgentError::Config(format!("invalid report name `{name}`")));
        }
        Ok(std::fs::read_to_string(self.dir.join(name))?)
    }
}
