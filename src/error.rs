//! Error taxonomy for the agent core.
//!
//! Everything below the public component boundary resolves to one of these
//! variants; callers either recover locally (router fallback, empty-evidence
//! sentinels) or turn the error into text via [`AgentError::user_message`].

use thiserror::Error;

/// Message shown whenever the LLM credential is absent.
pub const CREDENTIAL_MISSING_MESSAGE: &str =
    "Please configure your Groq API key (GROQ_API_KEY) first.";

#[derive(Error, Debug)]
pub enum AgentError {
    /// No API credential configured for the LLM service.
    #[error("LLM credential missing")]
    CredentialMissing,

    /// Router output did not contain any known intent label.
    #[error("unclassifiable router output: {0:?}")]
    ClassificationAmbiguous(String),

    /// A retrieval returned nothing; the payload names the component.
    #[error("no evidence for {0}")]
    EmptyEvidence(&'static str),

    /// One ingestion source failed.
    #[error("source `{source_name}` failed: {reason}")]
    SourceFetchFailure { source_name: String, reason: String },

    /// A saved report could not be written back into the evidence store.
    #[error("report re-indexing failed: {0}")]
    ReindexFailure(String),

    /// LLM or evidence store unreachable / returned garbage.
    #[error("service unavailable: {0}")]
    TransientServiceFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Human-readable text for the end caller.
    pub fn user_message(&self) -> String {
        match self {
            AgentError::CredentialMissing => CREDENTIAL_MISSING_MESSAGE.to_string(),
            AgentError::TransientServiceFailure(msg) => {
                format!("The analysis service is unavailable right now ({msg}). Please try again.")
            }
            other => format!("Something went wrong: {other}"),
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::TransientServiceFailure(_) | AgentError::Io(_)
        )
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::TransientServiceFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
