pub mod carriers;
pub mod confidence;
pub mod dates;
pub mod directory;
pub mod error;
pub mod extractor;
pub mod fields;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod text;
pub mod traits;

pub use carriers::{CarrierNormalizer, CarrierStore, InMemoryCarrierStore, JsonCarrierFile};
pub use dates::DateNormalizer;
pub use directory::InMemoryDirectory;
pub use error::{ConfigError, ExtractError, IngestError, SearchError};
pub use extractor::{LopdfEngine, PdfExtractEngine, TerminalReason, TextEngine, TextExtractor};
pub use fields::FieldRecognizer;
pub use index::{PolicyIndex, SEARCHABLE_FIELDS};
pub use ingest::{
    discover_pdf_files, document_id_for, index_document_for, ingest_folder, rebuild_from_folder,
    IngestedDocument, IngestionReport, SkippedPdf,
};
pub use models::{
    BuildingInfo, CoverageType, DocumentInfo, EngineKind, HitTier, IndexDocument, IndexOptions,
    IndexStats, NormalizedDate, ParseResult, PipelineOptions, PolicyHit, PolicyMetadata,
    PolicyNote, SearchResult,
};
pub use orchestrator::PolicySearch;
pub use pipeline::{parse_with_budget, ParsingPipeline};
pub use text::{prepare_exact_query, prepare_wildcard_query, ExactQuery, WildcardQuery};
pub use traits::{DocumentIndex, PolicyDirectory};
