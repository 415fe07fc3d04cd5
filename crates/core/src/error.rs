use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("{engine} engine panicked while reading the document")]
    EnginePanicked { engine: &'static str },

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("invalid query: {0}")]
    Query(#[from] tantivy::query::QueryParserError),

    #[error("invalid search field: {0}")]
    InvalidField(String),

    #[error("index writer lock poisoned")]
    WriterPoisoned,

    #[error("rebuild failed after {indexed} documents, index left at its previous state: {cause}")]
    Rebuild { indexed: usize, cause: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("carrier source unavailable: {0}")]
    Source(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("search index error: {0}")]
    Search(#[from] SearchError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
