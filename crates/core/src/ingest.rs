use crate::index::PolicyIndex;
use crate::models::{EngineKind, IndexDocument, ParseResult};
use crate::pipeline::{parse_with_budget, ParsingPipeline};
use crate::traits::DocumentIndex;
use crate::IngestError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Stable index key for a file: the leading eight bytes of the SHA-256 of its
/// path.
pub fn document_id_for(path: &Path) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

pub fn index_document_for(
    path: &Path,
    parsed: &ParseResult,
) -> Result<IndexDocument, IngestError> {
    let title = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    Ok(IndexDocument::from_parse(
        document_id_for(path),
        title,
        parsed,
    ))
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestedDocument {
    pub document_id: u64,
    pub path: PathBuf,
    pub checksum: String,
    pub confidence: f64,
    pub message: String,
    pub engine: Option<EngineKind>,
    pub needs_review: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub documents: Vec<IngestedDocument>,
    pub skipped_files: Vec<SkippedPdf>,
}

impl IngestionReport {
    pub fn flagged_for_review(&self) -> impl Iterator<Item = &IngestedDocument> {
        self.documents.iter().filter(|document| document.needs_review)
    }
}

/// Parses every PDF under `folder` and indexes the results. Documents that
/// parse badly are still indexed and flagged for review; files that cannot be
/// read or indexed are reported as skipped.
pub async fn ingest_folder<I: DocumentIndex>(
    folder: &Path,
    pipeline: Arc<ParsingPipeline>,
    index: &I,
) -> Result<IngestionReport, IngestError> {
    let files = discover_pdf_files(folder);
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    let budget = pipeline.options().parse_budget;
    let threshold = pipeline.options().review_threshold;
    let mut report = IngestionReport::default();

    for path in files {
        let checksum = match digest_file(&path) {
            Ok(checksum) => checksum,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable file");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        let parsed = parse_with_budget(pipeline.clone(), path.clone(), budget).await;
        let indexed = index_document_for(&path, &parsed).and_then(|document| {
            index.index(&document)?;
            Ok(document.document_id)
        });

        match indexed {
            Ok(document_id) => report.documents.push(IngestedDocument {
                document_id,
                path,
                checksum,
                confidence: parsed.confidence,
                needs_review: parsed.needs_review(threshold),
                message: parsed.message,
                engine: parsed.engine,
            }),
            Err(error) => {
                warn!(path = %path.display(), %error, "document not indexed");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    info!(
        indexed = report.documents.len(),
        skipped = report.skipped_files.len(),
        flagged = report.flagged_for_review().count(),
        "ingestion finished"
    );
    Ok(report)
}

/// Re-parses every PDF under `folder` and swaps the index contents for the
/// new set in one step.
pub async fn rebuild_from_folder(
    folder: &Path,
    pipeline: Arc<ParsingPipeline>,
    index: &PolicyIndex,
) -> Result<usize, IngestError> {
    let budget = pipeline.options().parse_budget;
    let mut documents = Vec::new();

    for path in discover_pdf_files(folder) {
        let parsed = parse_with_budget(pipeline.clone(), path.clone(), budget).await;
        documents.push(index_document_for(&path, &parsed)?);
    }

    Ok(index.rebuild(&documents)?)
}
