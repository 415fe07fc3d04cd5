use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which extraction engine produced a piece of text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Primary,
    Fallback,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Primary => f.write_str("primary"),
            EngineKind::Fallback => f.write_str("fallback"),
        }
    }
}

/// A date as found in the document, with its ISO form when one of the known
/// formats could be parsed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedDate {
    pub raw: String,
    pub iso: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageType {
    GeneralLiability,
    Property,
    Umbrella,
    Flood,
    Earthquake,
    WorkersCompensation,
}

impl CoverageType {
    pub fn slug(self) -> &'static str {
        match self {
            CoverageType::GeneralLiability => "general-liability",
            CoverageType::Property => "property",
            CoverageType::Umbrella => "umbrella",
            CoverageType::Flood => "flood",
            CoverageType::Earthquake => "earthquake",
            CoverageType::WorkersCompensation => "workers-compensation",
        }
    }
}

impl fmt::Display for CoverageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Fields copied verbatim from the PDF Info dictionary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentInfo {
    #[serde(rename = "pdf_title", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "pdf_author", skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(rename = "pdf_subject", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(rename = "pdf_creator", skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(rename = "pdf_creation_date", skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
}

impl DocumentInfo {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.subject.is_none()
            && self.creator.is_none()
            && self.creation_date.is_none()
    }
}

/// Recognized policy fields. A `None` (or empty list) means the field was not
/// found in the document; it never means "false" or "zero". Absent fields are
/// omitted when serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage_type: Option<CoverageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NormalizedDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<NormalizedDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NormalizedDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub limits_found: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deductibles_found: Vec<String>,
    #[serde(flatten)]
    pub document: DocumentInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PolicyMetadata {
    pub fn is_empty(&self) -> bool {
        *self == PolicyMetadata::default()
    }

    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Outcome of one parse call. Owned by the caller and never touched again by
/// the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParseResult {
    pub text: String,
    pub metadata: PolicyMetadata,
    pub confidence: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineKind>,
}

impl ParseResult {
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            text: String::new(),
            metadata: PolicyMetadata::with_error(message.clone()),
            confidence: 0.0,
            message,
            engine: None,
        }
    }

    pub fn needs_review(&self, threshold: f64) -> bool {
        self.confidence < threshold
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildingInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One entry of the full-text index. `document_id` is unique in the index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexDocument {
    pub document_id: u64,
    pub title: String,
    pub content: String,
    pub metadata: String,
    pub carrier: Option<String>,
    pub policy_number: Option<String>,
    pub coverage_type: Option<String>,
}

impl IndexDocument {
    pub fn from_parse(document_id: u64, title: impl Into<String>, parsed: &ParseResult) -> Self {
        Self {
            document_id,
            title: title.into(),
            content: parsed.text.clone(),
            metadata: serde_json::to_string(&parsed.metadata).unwrap_or_default(),
            carrier: parsed.metadata.carrier.clone(),
            policy_number: parsed.metadata.policy_number.clone(),
            coverage_type: parsed
                .metadata
                .coverage_type
                .map(|coverage| coverage.slug().to_string()),
        }
    }
}

/// A ranked hit from the document index. Higher `score` means a better match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub document_id: u64,
    pub title: String,
    pub score: f32,
    pub snippet: String,
    pub carrier: Option<String>,
    pub policy_number: Option<String>,
    pub coverage_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HitTier {
    Document,
    Note,
}

/// A free-text note attached to a policy record. Notes are not part of the
/// indexed corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyNote {
    pub record_id: u64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// A result of the two-tier policy search, deduplicated by `record_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyHit {
    pub record_id: u64,
    pub tier: HitTier,
    pub score: f32,
    pub policy_number: Option<String>,
    pub carrier: Option<String>,
    pub coverage_type: Option<String>,
    pub snippet: Option<String>,
    pub note_preview: Option<String>,
    pub note_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    pub total_documents: u64,
    pub segments: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Documents scoring below this are flagged for manual review.
    pub review_threshold: f64,
    /// Wall-clock budget for a single parse when run through the async wrapper.
    #[serde(with = "duration_secs")]
    pub parse_budget: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            review_threshold: 0.5,
            parse_budget: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexOptions {
    pub writer_memory_bytes: usize,
    pub content_max_chars: usize,
    pub snippet_max_chars: usize,
    pub default_limit: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            writer_memory_bytes: 50_000_000,
            content_max_chars: 50_000,
            snippet_max_chars: 200,
            default_limit: 50,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
