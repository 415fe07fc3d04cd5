use crate::confidence;
use crate::error::ExtractError;
use crate::models::{DocumentInfo, EngineKind};
use lopdf::{Dictionary, Document, Object};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, info, warn};

const ENCRYPT_KEY: &[u8] = b"/Encrypt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Pages with readable text plus the container metadata of one document.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    pub pages: Vec<PageText>,
    pub page_count: usize,
    pub info: DocumentInfo,
}

impl EngineOutput {
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The primary engine counts trimmed characters per page; the fallback
    /// engine counts the trimmed joined text.
    pub fn char_count(&self, engine: EngineKind) -> usize {
        match engine {
            EngineKind::Primary => self
                .pages
                .iter()
                .map(|page| page.text.trim().chars().count())
                .sum(),
            EngineKind::Fallback => self.text().trim().chars().count(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|page| page.text.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub enum EngineOutcome {
    Encrypted,
    Extracted(EngineOutput),
}

pub trait TextEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    fn name(&self) -> &'static str;

    fn extract(&self, path: &Path) -> Result<EngineOutcome, ExtractError>;
}

/// Layout-aware extraction through `pdf-extract`. The whole document either
/// extracts or fails.
#[derive(Debug, Default)]
pub struct PdfExtractEngine;

impl TextEngine for PdfExtractEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Primary
    }

    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract(&self, path: &Path) -> Result<EngineOutcome, ExtractError> {
        let bytes = std::fs::read(path)?;
        let document = match open_unencrypted(&bytes)? {
            Some(document) => document,
            None => return Ok(EngineOutcome::Encrypted),
        };
        let info = read_document_info(&document);

        let page_texts = catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        }))
        .map_err(|_| ExtractError::EnginePanicked {
            engine: self.name(),
        })?
        .map_err(|error| ExtractError::PdfParse(error.to_string()))?;

        let page_count = page_texts.len();
        let pages = page_texts
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(index, text)| PageText {
                number: index as u32 + 1,
                text,
            })
            .collect();

        Ok(EngineOutcome::Extracted(EngineOutput {
            pages,
            page_count,
            info,
        }))
    }
}

/// Page-by-page extraction through `lopdf`. A page that fails to decode is
/// logged and skipped.
#[derive(Debug, Default)]
pub struct LopdfEngine;

impl TextEngine for LopdfEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Fallback
    }

    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract(&self, path: &Path) -> Result<EngineOutcome, ExtractError> {
        let bytes = std::fs::read(path)?;
        let document = match open_unencrypted(&bytes)? {
            Some(document) => document,
            None => return Ok(EngineOutcome::Encrypted),
        };

        let mut pages = Vec::new();
        let page_numbers = document.get_pages();
        for page_no in page_numbers.keys().copied() {
            match document.extract_text(&[page_no]) {
                Ok(text) if !text.trim().is_empty() => pages.push(PageText {
                    number: page_no,
                    text,
                }),
                Ok(_) => {}
                Err(error) => {
                    warn!(path = %path.display(), page = page_no, %error, "skipping unreadable page");
                }
            }
        }

        Ok(EngineOutcome::Extracted(EngineOutput {
            pages,
            page_count: page_numbers.len(),
            info: read_document_info(&document),
        }))
    }
}

/// Returns `None` for password-protected documents.
fn open_unencrypted(bytes: &[u8]) -> Result<Option<Document>, ExtractError> {
    match Document::load_mem(bytes) {
        Ok(document) if document.trailer.has(b"Encrypt") => Ok(None),
        Ok(document) => Ok(Some(document)),
        Err(_) if trailer_declares_encryption(bytes) => Ok(None),
        Err(error) => Err(ExtractError::PdfParse(error.to_string())),
    }
}

/// Looks for an `/Encrypt` entry in the raw trailer dictionaries and
/// cross-reference stream dictionaries. Page content is never inspected.
pub fn trailer_declares_encryption(bytes: &[u8]) -> bool {
    let mut from = 0;
    while let Some(start) = find(bytes, b"trailer", from) {
        let end = find(bytes, b"startxref", start).unwrap_or(bytes.len());
        if find(&bytes[start..end], ENCRYPT_KEY, 0).is_some() {
            return true;
        }
        from = start + 1;
    }

    let mut from = 0;
    while let Some(marker) = find(bytes, b"/XRef", from) {
        let start = rfind(&bytes[..marker], b"obj").unwrap_or(0);
        let end = find(bytes, b"stream", marker).unwrap_or(bytes.len());
        if find(&bytes[start..end], ENCRYPT_KEY, 0).is_some() {
            return true;
        }
        from = marker + 1;
    }

    false
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| position + from)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

pub fn read_document_info(document: &Document) -> DocumentInfo {
    let dictionary = match document.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => document.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(dictionary)) => Some(dictionary),
        _ => None,
    };

    let Some(dictionary) = dictionary else {
        return DocumentInfo::default();
    };

    DocumentInfo {
        title: info_value(document, dictionary, b"Title"),
        author: info_value(document, dictionary, b"Author"),
        subject: info_value(document, dictionary, b"Subject"),
        creator: info_value(document, dictionary, b"Creator"),
        creation_date: info_value(document, dictionary, b"CreationDate"),
    }
}

fn info_value(document: &Document, dictionary: &Dictionary, key: &[u8]) -> Option<String> {
    let mut object = dictionary.get(key).ok()?;
    if let Object::Reference(id) = object {
        object = document.get_object(*id).ok()?;
    }

    let value = match object {
        Object::String(bytes, _) => decode_pdf_string(bytes),
        Object::Name(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        _ => return None,
    };

    let value = value.trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&byte| byte as char).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    PasswordProtected,
    ImageOnly,
    ExtractionFailed(String),
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalReason::PasswordProtected => f.write_str("password-protected"),
            TerminalReason::ImageOnly => f.write_str("image-only"),
            TerminalReason::ExtractionFailed(cause) => write!(f, "extraction failed: {cause}"),
        }
    }
}

/// Result of running the engine chain over one file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub text: String,
    pub info: DocumentInfo,
    pub engine: Option<EngineKind>,
    pub char_count: usize,
    pub confidence_hint: f64,
    pub terminal: Option<TerminalReason>,
}

impl Extraction {
    fn terminal(reason: TerminalReason) -> Self {
        Self {
            terminal: Some(reason),
            ..Self::default()
        }
    }

    fn from_output(output: EngineOutput, engine: EngineKind, confidence_hint: f64) -> Self {
        Self {
            text: output.text(),
            char_count: output.char_count(engine),
            info: output.info,
            engine: Some(engine),
            confidence_hint,
            terminal: None,
        }
    }
}

/// Runs the primary engine and falls back to the secondary one when the
/// primary throws or scores zero.
pub struct TextExtractor {
    primary: Box<dyn TextEngine>,
    fallback: Box<dyn TextEngine>,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(Box::new(PdfExtractEngine), Box::new(LopdfEngine))
    }
}

impl TextExtractor {
    pub fn new(primary: Box<dyn TextEngine>, fallback: Box<dyn TextEngine>) -> Self {
        Self { primary, fallback }
    }

    pub fn extract(&self, path: &Path) -> Extraction {
        let primary_kind = self.primary.kind();
        let mut primary_error = None;

        let primary_output = match self.primary.extract(path) {
            Ok(EngineOutcome::Encrypted) => {
                info!(path = %path.display(), "password-protected pdf");
                return Extraction::terminal(TerminalReason::PasswordProtected);
            }
            Ok(EngineOutcome::Extracted(output)) => {
                let char_count = output.char_count(primary_kind);
                let confidence = confidence::score(char_count, primary_kind);
                if confidence > 0.0 {
                    debug!(path = %path.display(), char_count, confidence, engine = self.primary.name(), "extracted");
                    return Extraction::from_output(output, primary_kind, confidence);
                }
                info!(path = %path.display(), char_count, engine = self.primary.name(), "too little text, trying fallback engine");
                Some(output)
            }
            Err(error) => {
                info!(path = %path.display(), %error, engine = self.primary.name(), "primary engine failed, trying fallback engine");
                primary_error = Some(error.to_string());
                None
            }
        };

        let fallback_kind = self.fallback.kind();
        match self.fallback.extract(path) {
            Ok(EngineOutcome::Encrypted) => {
                Extraction::terminal(TerminalReason::PasswordProtected)
            }
            Ok(EngineOutcome::Extracted(output)) => {
                let char_count = output.char_count(fallback_kind);
                let confidence = confidence::score(char_count, fallback_kind);
                if confidence > 0.0 {
                    return Extraction::from_output(output, fallback_kind, confidence);
                }

                let primary_blank = primary_output.as_ref().map_or(true, EngineOutput::is_blank);
                if output.is_blank() && primary_blank {
                    info!(path = %path.display(), pages = output.page_count, "no text layer on any page");
                    return Extraction::terminal(TerminalReason::ImageOnly);
                }

                match primary_output {
                    Some(primary) if primary.char_count(primary_kind) >= char_count => {
                        Extraction::from_output(primary, primary_kind, 0.0)
                    }
                    _ => Extraction::from_output(output, fallback_kind, 0.0),
                }
            }
            Err(error) => match primary_output {
                Some(primary) if primary.is_blank() => {
                    warn!(path = %path.display(), %error, "fallback engine failed on a blank document");
                    Extraction::terminal(TerminalReason::ImageOnly)
                }
                Some(primary) => {
                    warn!(path = %path.display(), %error, "fallback engine failed, keeping low-confidence primary text");
                    Extraction::from_output(primary, primary_kind, 0.0)
                }
                None => {
                    let cause = match primary_error {
                        Some(primary_error) => format!("{primary_error}; fallback: {error}"),
                        None => error.to_string(),
                    };
                    Extraction::terminal(TerminalReason::ExtractionFailed(cause))
                }
            },
        }
    }
}
