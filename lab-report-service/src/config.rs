use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4.1-mini";
pub const DEFAULT_VISION_MAX_PAGES: usize = 10;
pub const DEFAULT_MAX_CONCURRENT_DOCUMENTS: usize = 4;
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// What to do when the classifier answers with something outside the
/// known report types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousReportPolicy {
    #[default]
    DefaultToNutriq,
    Reject,
}

impl FromStr for AmbiguousReportPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default_to_nutriq" | "nutriq" => Ok(Self::DefaultToNutriq),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected default_to_nutriq or reject, got '{}'", other)),
        }
    }
}

/// How the document name is compared with the operator-entered name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatchPolicy {
    #[default]
    Exact,
    Normalized,
}

impl FromStr for NameMatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "normalized" => Ok(Self::Normalized),
            other => Err(format!("expected exact or normalized, got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
}

/// Knobs the pipeline itself reads. Independent of any credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub vision_max_pages: usize,
    pub max_concurrent_documents: usize,
    pub ambiguous_report_policy: AmbiguousReportPolicy,
    pub name_match_policy: NameMatchPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vision_max_pages: DEFAULT_VISION_MAX_PAGES,
            max_concurrent_documents: DEFAULT_MAX_CONCURRENT_DOCUMENTS,
            ambiguous_report_policy: AmbiguousReportPolicy::default(),
            name_match_policy: NameMatchPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub inference: InferenceConfig,
    pub pipeline: PipelineConfig,
    pub blob_root: PathBuf,
    pub port: u16,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENROUTER_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;

        let inference = InferenceConfig {
            api_key,
            base_url: lookup("OPENROUTER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            text_model: lookup("TEXT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            vision_model: lookup("VISION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        let pipeline = PipelineConfig {
            vision_max_pages: parse_positive(&lookup, "VISION_MAX_PAGES", DEFAULT_VISION_MAX_PAGES)?,
            max_concurrent_documents: parse_positive(
                &lookup,
                "MAX_CONCURRENT_DOCUMENTS",
                DEFAULT_MAX_CONCURRENT_DOCUMENTS,
            )?,
            ambiguous_report_policy: parse_or_default(&lookup, "AMBIGUOUS_REPORT_POLICY")?,
            name_match_policy: parse_or_default(&lookup, "NAME_MATCH_POLICY")?,
        };

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            inference,
            pipeline,
            blob_root: lookup("BLOB_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            port,
        })
    }
}

fn parse_positive<F>(lookup: &F, key: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "must be at least 1".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr<Err = String> + Default,
{
    match lookup(key) {
        Some(raw) => raw.parse::<T>().map_err(|reason| ConfigError::Invalid {
            key,
            value: raw,
            reason,
        }),
        None => Ok(T::default()),
    }
}
