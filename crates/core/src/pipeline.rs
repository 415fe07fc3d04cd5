use crate::carriers::CarrierNormalizer;
use crate::error::ExtractError;
use crate::extractor::{TerminalReason, TextExtractor};
use crate::fields::FieldRecognizer;
use crate::models::{EngineKind, ParseResult, PipelineOptions, PolicyMetadata};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const MSG_PASSWORD_PROTECTED: &str = "password-protected PDF";
pub const MSG_IMAGE_ONLY: &str = "image-only PDF; OCR disabled";
pub const MSG_PARSED: &str = "successfully parsed";
pub const MSG_PARSED_FALLBACK: &str = "successfully parsed with fallback engine";
pub const MSG_LOW_CONFIDENCE: &str = "low-confidence extraction; manual review recommended";

/// Extraction, field recognition, carrier normalization and scoring behind
/// one call. `parse` never fails: every problem becomes a zero-confidence
/// result.
pub struct ParsingPipeline {
    extractor: TextExtractor,
    recognizer: FieldRecognizer,
    carriers: CarrierNormalizer,
    options: PipelineOptions,
}

impl ParsingPipeline {
    pub fn new(
        extractor: TextExtractor,
        recognizer: FieldRecognizer,
        carriers: CarrierNormalizer,
        options: PipelineOptions,
    ) -> Self {
        Self {
            extractor,
            recognizer,
            carriers,
            options,
        }
    }

    /// Default engines and recognizer around the given carrier table.
    pub fn with_carriers(carriers: CarrierNormalizer) -> Result<Self, ExtractError> {
        Ok(Self::new(
            TextExtractor::default(),
            FieldRecognizer::new()?,
            carriers,
            PipelineOptions::default(),
        ))
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn recognizer(&self) -> &FieldRecognizer {
        &self.recognizer
    }

    pub fn parse(&self, path: &Path) -> ParseResult {
        match catch_unwind(AssertUnwindSafe(|| self.run(path))) {
            Ok(result) => result,
            Err(payload) => {
                let cause = panic_message(payload.as_ref());
                error!(path = %path.display(), %cause, "parse aborted");
                ParseResult::failed(TerminalReason::ExtractionFailed(cause).to_string())
            }
        }
    }

    fn run(&self, path: &Path) -> ParseResult {
        let extraction = self.extractor.extract(path);

        if let Some(reason) = extraction.terminal {
            return match reason {
                TerminalReason::PasswordProtected => terminal(MSG_PASSWORD_PROTECTED),
                TerminalReason::ImageOnly => terminal(MSG_IMAGE_ONLY),
                failure @ TerminalReason::ExtractionFailed(_) => {
                    error!(path = %path.display(), %failure, "no engine could read the document");
                    ParseResult::failed(failure.to_string())
                }
            };
        }

        let mut metadata = self.recognizer.recognize(&extraction.text);
        if let Some(raw) = metadata.carrier_raw.as_deref() {
            metadata.carrier = Some(self.carriers.normalize(raw));
        }
        metadata.document = extraction.info;

        let confidence = extraction.confidence_hint;
        let message = match extraction.engine {
            _ if confidence <= 0.0 => MSG_LOW_CONFIDENCE,
            Some(EngineKind::Fallback) => MSG_PARSED_FALLBACK,
            _ => MSG_PARSED,
        };

        let result = ParseResult {
            text: extraction.text,
            metadata,
            confidence,
            message: message.to_string(),
            engine: extraction.engine,
        };

        if result.needs_review(self.options.review_threshold) {
            warn!(
                path = %path.display(),
                confidence,
                chars = extraction.char_count,
                "document flagged for manual review"
            );
        } else {
            info!(path = %path.display(), confidence, "parsed policy document");
        }

        result
    }
}

/// Runs `parse` on the blocking pool and gives up after `budget`. The
/// abandoned parse keeps running on its thread; only its result is dropped.
pub async fn parse_with_budget(
    pipeline: Arc<ParsingPipeline>,
    path: PathBuf,
    budget: Duration,
) -> ParseResult {
    let path_str = path.display().to_string();
    let task = tokio::task::spawn_blocking(move || pipeline.parse(&path));

    match tokio::time::timeout(budget, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            error!(path = %path_str, %join_error, "parse task failed");
            ParseResult::failed(TerminalReason::ExtractionFailed(join_error.to_string()).to_string())
        }
        Err(_) => {
            warn!(path = %path_str, budget_secs = budget.as_secs_f64(), "parse exceeded its budget");
            ParseResult::failed(
                TerminalReason::ExtractionFailed(format!(
                    "parse exceeded {:.1}s budget",
                    budget.as_secs_f64()
                ))
                .to_string(),
            )
        }
    }
}

fn terminal(message: &str) -> ParseResult {
    ParseResult {
        text: String::new(),
        metadata: PolicyMetadata::default(),
        confidence: 0.0,
        message: message.to_string(),
        engine: None,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
