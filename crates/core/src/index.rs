use crate::error::SearchError;
use crate::models::{IndexDocument, IndexOptions, IndexStats, SearchResult};
use crate::text::{clean_for_index, prepare_exact_query, prepare_wildcard_query, WildcardQuery};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, FAST, INDEXED, STORED,
};
use tantivy::snippet::SnippetGenerator;
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer, TokenStream,
};
use tantivy::{
    DocId, Index, IndexReader, IndexWriter, ReloadPolicy, Score, Searcher, SegmentReader,
    TantivyDocument, Term,
};
use tracing::{debug, info, warn};

pub const POLICY_TOKENIZER: &str = "policy_text";

/// Fields accepted by [`PolicyIndex::search_by_field`].
pub const SEARCHABLE_FIELDS: [&str; 4] = ["carrier", "policy_number", "coverage_type", "title"];

#[derive(Debug, Clone, Copy)]
struct PolicyFields {
    document_id: Field,
    seq: Field,
    title: Field,
    content: Field,
    metadata: Field,
    carrier: Field,
    policy_number: Field,
    coverage_type: Field,
}

impl PolicyFields {
    fn full_text(&self) -> Vec<Field> {
        vec![
            self.title,
            self.content,
            self.metadata,
            self.carrier,
            self.policy_number,
            self.coverage_type,
        ]
    }
}

fn build_schema() -> (Schema, PolicyFields) {
    let mut builder = Schema::builder();

    let indexing = TextFieldIndexing::default()
        .set_tokenizer(POLICY_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text = TextOptions::default()
        .set_indexing_options(indexing)
        .set_stored();

    let fields = PolicyFields {
        document_id: builder.add_u64_field("document_id", INDEXED | STORED | FAST),
        seq: builder.add_u64_field("seq", STORED | FAST),
        title: builder.add_text_field("title", text.clone()),
        content: builder.add_text_field("content", text.clone()),
        metadata: builder.add_text_field("metadata", text.clone()),
        carrier: builder.add_text_field("carrier", text.clone()),
        policy_number: builder.add_text_field("policy_number", text.clone()),
        coverage_type: builder.add_text_field("coverage_type", text),
    };

    (builder.build(), fields)
}

fn policy_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(Language::English))
        .build()
}

// Same tokens as `policy_analyzer` before stemming; a typed prefix is looked up
// in both forms.
fn unstemmed_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build()
}

pub struct PolicyIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: PolicyFields,
    analyzer: TextAnalyzer,
    prefix_analyzer: TextAnalyzer,
    options: IndexOptions,
    next_seq: AtomicU64,
}

impl PolicyIndex {
    pub fn open(path: &Path, options: IndexOptions) -> Result<Self, SearchError> {
        std::fs::create_dir_all(path)?;
        let (schema, fields) = build_schema();
        let directory = MmapDirectory::open(path).map_err(tantivy::TantivyError::from)?;
        let index = Index::open_or_create(directory, schema)?;
        info!(path = %path.display(), "opened policy index");
        Self::from_index(index, fields, options)
    }

    pub fn in_memory(options: IndexOptions) -> Result<Self, SearchError> {
        let (schema, fields) = build_schema();
        Self::from_index(Index::create_in_ram(schema), fields, options)
    }

    fn from_index(
        index: Index,
        fields: PolicyFields,
        options: IndexOptions,
    ) -> Result<Self, SearchError> {
        let analyzer = policy_analyzer();
        index.tokenizers().register(POLICY_TOKENIZER, analyzer.clone());

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer: IndexWriter = index.writer(options.writer_memory_bytes)?;

        let policy_index = Self {
            index,
            reader,
            writer: Mutex::new(writer),
            fields,
            analyzer,
            prefix_analyzer: unstemmed_analyzer(),
            options,
            next_seq: AtomicU64::new(0),
        };

        let next = policy_index.max_seq()?.map_or(0, |seq| seq + 1);
        policy_index.next_seq.store(next, Ordering::SeqCst);
        Ok(policy_index)
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Insert-or-replace keyed by `document_id`.
    pub fn index(&self, document: &IndexDocument) -> Result<(), SearchError> {
        let mut writer = self.lock_writer()?;
        writer.delete_term(self.id_term(document.document_id));
        let staged = writer
            .add_document(self.to_document(document))
            .map(|_| ());
        self.commit_or_rollback(&mut writer, staged)?;

        debug!(document_id = document.document_id, "indexed policy document");
        Ok(())
    }

    /// Removing an id that is not indexed is a no-op.
    pub fn remove(&self, document_id: u64) -> Result<(), SearchError> {
        let mut writer = self.lock_writer()?;
        writer.delete_term(self.id_term(document_id));
        self.commit_or_rollback(&mut writer, Ok(()))?;

        debug!(document_id, "removed policy document");
        Ok(())
    }

    /// Replaces the whole index with `documents` in a single commit. On
    /// failure the previous contents stay in place.
    pub fn rebuild(&self, documents: &[IndexDocument]) -> Result<usize, SearchError> {
        let mut writer = self.lock_writer()?;
        let (indexed, staged) = self.stage_rebuild(&mut writer, documents);
        self.finish_rebuild(&mut writer, indexed, staged)
    }

    fn stage_rebuild(
        &self,
        writer: &mut IndexWriter,
        documents: &[IndexDocument],
    ) -> (usize, tantivy::Result<()>) {
        if let Err(error) = writer.delete_all_documents() {
            return (0, Err(error));
        }

        let mut indexed = 0;
        for document in documents {
            if let Err(error) = writer.add_document(self.to_document(document)) {
                return (indexed, Err(error));
            }
            indexed += 1;
        }
        (indexed, Ok(()))
    }

    fn finish_rebuild(
        &self,
        writer: &mut IndexWriter,
        indexed: usize,
        staged: tantivy::Result<()>,
    ) -> Result<usize, SearchError> {
        self.commit_or_rollback(writer, staged)
            .map_err(|error| SearchError::Rebuild {
                indexed,
                cause: error.to_string(),
            })?;

        info!(indexed, "rebuilt policy index");
        Ok(indexed)
    }

    /// Prefix terms joined with OR, or a phrase query when the input is quoted.
    pub fn query(
        &self,
        text: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query: Box<dyn Query> = match prepare_wildcard_query(text) {
            WildcardQuery::Empty => return Ok(Vec::new()),
            WildcardQuery::Phrase(raw) => self.parse_lenient(&raw),
            WildcardQuery::Prefix(terms) => match self.prefix_query(&searcher, &terms)? {
                Some(query) => query,
                None => return Ok(Vec::new()),
            },
        };

        self.run(&searcher, query.as_ref(), limit, offset)
    }

    pub fn query_exact(&self, text: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        let prepared = prepare_exact_query(text);
        if prepared.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query = self.parser().parse_query(&prepared.to_string())?;
        self.run(&self.reader.searcher(), query.as_ref(), limit, 0)
    }

    pub fn search_by_field(
        &self,
        field: &str,
        value: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let target = match field {
            "carrier" => self.fields.carrier,
            "policy_number" => self.fields.policy_number,
            "coverage_type" => self.fields.coverage_type,
            "title" => self.fields.title,
            other => return Err(SearchError::InvalidField(other.to_string())),
        };

        let cleaned = value.replace(['"', '\\'], " ");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let parser = QueryParser::for_index(&self.index, vec![target]);
        let query = parser.parse_query(&format!("\"{cleaned}\""))?;
        self.run(&self.reader.searcher(), query.as_ref(), limit, 0)
    }

    pub fn stats(&self) -> IndexStats {
        let searcher = self.reader.searcher();
        IndexStats {
            total_documents: searcher.num_docs(),
            segments: searcher.segment_readers().len(),
        }
    }

    /// Number of live entries for `document_id`; at most one.
    pub fn count_of(&self, document_id: u64) -> Result<usize, SearchError> {
        let query = TermQuery::new(self.id_term(document_id), IndexRecordOption::Basic);
        Ok(self.reader.searcher().search(&query, &Count)?)
    }

    pub fn structured_values(&self) -> Result<Vec<String>, SearchError> {
        let searcher = self.reader.searcher();
        let mut values = BTreeSet::new();

        for address in searcher.search(&AllQuery, &DocSetCollector)? {
            let doc: TantivyDocument = searcher.doc(address)?;
            for field in [self.fields.carrier, self.fields.policy_number] {
                if let Some(value) = text_of(&doc, field).filter(|value| !value.is_empty()) {
                    values.insert(value);
                }
            }
        }

        Ok(values.into_iter().collect())
    }

    fn run(
        &self,
        searcher: &Searcher,
        query: &dyn Query,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let ranked = TopDocs::with_limit(limit)
            .and_offset(offset)
            .tweak_score(move |segment: &SegmentReader| {
                let seqs = segment.fast_fields().u64("seq").ok();
                move |doc: DocId, score: Score| {
                    let seq = seqs
                        .as_ref()
                        .and_then(|column| column.first(doc))
                        .unwrap_or(u64::MAX);
                    (score, Reverse(seq))
                }
            });
        let top_docs = searcher.search(query, &ranked)?;

        let mut snippets = SnippetGenerator::create(searcher, query, self.fields.content)?;
        snippets.set_max_num_chars(self.options.snippet_max_chars);

        let mut hits = Vec::with_capacity(top_docs.len());
        for ((score, _), address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(self.to_result(&doc, score, &snippets));
        }
        Ok(hits)
    }

    fn to_result(
        &self,
        doc: &TantivyDocument,
        score: f32,
        snippets: &SnippetGenerator,
    ) -> SearchResult {
        let snippet = snippets.snippet_from_doc(doc);
        let snippet = if snippet.fragment().is_empty() {
            text_of(doc, self.fields.content)
                .map(|content| leading_chars(&content, self.options.snippet_max_chars))
                .unwrap_or_default()
        } else {
            snippet.to_html()
        };

        SearchResult {
            document_id: doc
                .get_first(self.fields.document_id)
                .and_then(|value| value.as_u64())
                .unwrap_or_default(),
            title: text_of(doc, self.fields.title).unwrap_or_default(),
            score,
            snippet,
            carrier: text_of(doc, self.fields.carrier),
            policy_number: text_of(doc, self.fields.policy_number),
            coverage_type: text_of(doc, self.fields.coverage_type),
        }
    }

    /// `None` when no indexed term starts with any of the prefixes.
    fn prefix_query(
        &self,
        searcher: &Searcher,
        terms: &[String],
    ) -> Result<Option<Box<dyn Query>>, SearchError> {
        let joined = terms.join(" ");
        let mut prefixes = tokenize(&self.analyzer, &joined);
        prefixes.extend(tokenize(&self.prefix_analyzer, &joined));
        prefixes.sort_unstable();
        prefixes.dedup();
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for field in self.fields.full_text() {
            let mut expanded = BTreeSet::new();
            for prefix in &prefixes {
                expanded.extend(expand_prefix(searcher, field, prefix)?);
            }
            for term in expanded {
                clauses.push((
                    Occur::Should,
                    Box::new(TermQuery::new(
                        Term::from_field_text(field, &term),
                        IndexRecordOption::WithFreqs,
                    )),
                ));
            }
        }

        if clauses.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(BooleanQuery::new(clauses))))
    }

    fn parse_lenient(&self, raw: &str) -> Box<dyn Query> {
        let (query, errors) = self.parser().parse_query_lenient(raw);
        if !errors.is_empty() {
            warn!(query = raw, errors = errors.len(), "phrase query partially parsed");
        }
        query
    }

    fn parser(&self) -> QueryParser {
        QueryParser::for_index(&self.index, self.fields.full_text())
    }

    fn to_document(&self, document: &IndexDocument) -> TantivyDocument {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut doc = TantivyDocument::default();
        doc.add_u64(self.fields.document_id, document.document_id);
        doc.add_u64(self.fields.seq, seq);
        doc.add_text(self.fields.title, &document.title);
        doc.add_text(
            self.fields.content,
            clean_for_index(&document.content, self.options.content_max_chars),
        );
        doc.add_text(self.fields.metadata, &document.metadata);

        let structured = [
            (self.fields.carrier, &document.carrier),
            (self.fields.policy_number, &document.policy_number),
            (self.fields.coverage_type, &document.coverage_type),
        ];
        for (field, value) in structured {
            if let Some(value) = value {
                doc.add_text(field, value);
            }
        }
        doc
    }

    fn id_term(&self, document_id: u64) -> Term {
        Term::from_field_u64(self.fields.document_id, document_id)
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, IndexWriter>, SearchError> {
        self.writer.lock().map_err(|_| SearchError::WriterPoisoned)
    }

    fn commit_or_rollback(
        &self,
        writer: &mut IndexWriter,
        staged: tantivy::Result<()>,
    ) -> Result<(), SearchError> {
        match staged.and_then(|()| writer.commit().map(|_| ())) {
            Ok(()) => {
                self.reader.reload()?;
                Ok(())
            }
            Err(error) => {
                if let Err(rollback) = writer.rollback() {
                    warn!(%rollback, "index rollback failed");
                }
                Err(error.into())
            }
        }
    }

    fn max_seq(&self) -> Result<Option<u64>, SearchError> {
        let mut max = None;
        for segment in self.reader.searcher().segment_readers() {
            if segment.max_doc() == 0 {
                continue;
            }
            let seqs = segment.fast_fields().u64("seq")?;
            max = max.max(Some(seqs.max_value()));
        }
        Ok(max)
    }
}

fn tokenize(analyzer: &TextAnalyzer, text: &str) -> Vec<String> {
    let mut analyzer = analyzer.clone();
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}

fn expand_prefix(
    searcher: &Searcher,
    field: Field,
    prefix: &str,
) -> Result<BTreeSet<String>, SearchError> {
    let mut expanded = BTreeSet::new();

    for segment in searcher.segment_readers() {
        let inverted = segment.inverted_index(field)?;
        let mut stream = inverted.terms().range().ge(prefix.as_bytes()).into_stream()?;
        while stream.advance() {
            let key = stream.key();
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            if let Ok(term) = std::str::from_utf8(key) {
                expanded.insert(term.to_string());
            }
        }
    }

    Ok(expanded)
}

fn text_of(doc: &TantivyDocument, field: Field) -> Option<String> {
    doc.get_first(field)
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

fn leading_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn policy(id: u64, content: &str) -> IndexDocument {
        IndexDocument {
            document_id: id,
            title: format!("policy-{id}.pdf"),
            content: content.to_string(),
            metadata: "{}".to_string(),
            ..IndexDocument::default()
        }
    }

    fn index() -> Result<PolicyIndex, SearchError> {
        PolicyIndex::in_memory(IndexOptions::default())
    }

    fn ids(results: &[SearchResult]) -> Vec<u64> {
        results.iter().map(|result| result.document_id).collect()
    }

    #[test]
    fn reindexing_replaces_the_entry() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&policy(42, "umbrella coverage for the tower"))?;
        index.index(&policy(42, "flood coverage for the annex"))?;

        assert_eq!(index.count_of(42)?, 1);
        assert_eq!(index.stats().total_documents, 1);
        assert!(index.query("umbrella", 10, 0)?.is_empty());
        assert_eq!(ids(&index.query("flood", 10, 0)?), vec![42]);
        Ok(())
    }

    #[test]
    fn empty_query_returns_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&policy(1, "general liability"))?;

        assert!(index.query("", 10, 0)?.is_empty());
        assert!(index.query("   ", 10, 0)?.is_empty());
        assert!(index.query_exact("", 10)?.is_empty());
        assert!(index.query("general", 0, 0)?.is_empty());
        Ok(())
    }

    #[test]
    fn removed_documents_stop_matching() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&policy(7, "earthquake sprinkler retrofit"))?;
        index.index(&policy(8, "property schedule"))?;

        index.remove(7)?;
        index.remove(7)?;
        index.remove(999)?;

        assert!(index.query("earthquake sprinkler", 10, 0)?.is_empty());
        assert_eq!(index.count_of(7)?, 0);
        assert_eq!(index.stats().total_documents, 1);
        Ok(())
    }

    #[test]
    fn prefix_terms_match_and_highlight() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&policy(1, "Commercial General Liability declarations"))?;
        index.index(&policy(2, "Property coverage only"))?;

        let results = index.query("liab", 10, 0)?;
        assert_eq!(ids(&results), vec![1]);
        assert!(results[0].snippet.contains("<b>Liability</b>"));
        assert!(results[0].score > 0.0);
        Ok(())
    }

    #[test]
    fn terms_are_ored_for_recall() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&policy(1, "flood zone AE"))?;
        index.index(&policy(2, "earthquake deductible"))?;
        index.index(&policy(3, "umbrella excess"))?;

        let mut found = ids(&index.query("flood earthquake", 10, 0)?);
        found.sort_unstable();
        assert_eq!(found, vec![1, 2]);
        Ok(())
    }

    #[test]
    fn quoted_queries_are_phrase_queries() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&policy(1, "commercial general liability form"))?;
        index.index(&policy(2, "liability is general in scope"))?;

        let results = index.query("\"general liability\"", 10, 0)?;
        assert_eq!(ids(&results), vec![1]);
        Ok(())
    }

    #[test]
    fn equal_scores_keep_insertion_order() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        for id in [30, 10, 20] {
            index.index(&policy(id, "identical wording"))?;
        }

        assert_eq!(ids(&index.query("identical", 10, 0)?), vec![30, 10, 20]);
        assert_eq!(ids(&index.query("identical", 1, 1)?), vec![10]);
        assert_eq!(ids(&index.query("identical", 10, 3)?), Vec::<u64>::new());
        Ok(())
    }

    #[test]
    fn higher_scores_rank_first() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&policy(1, "flood mentioned once among many other unrelated words here"))?;
        index.index(&policy(2, "flood flood flood"))?;

        let results = index.query("flood", 10, 0)?;
        assert_eq!(ids(&results), vec![2, 1]);
        assert!(results[0].score >= results[1].score);
        Ok(())
    }

    #[test]
    fn exact_mode_ignores_short_terms() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&IndexDocument {
            carrier: Some("State Farm".to_string()),
            policy_number: Some("GL-2024-001".to_string()),
            ..policy(5, "commercial package")
        })?;
        index.index(&policy(6, "GL is mentioned here"))?;

        assert!(index.query_exact("GL to", 10)?.is_empty());
        assert_eq!(ids(&index.query_exact("farm", 10)?), vec![5]);
        assert_eq!(ids(&index.query_exact("GL-2024-001", 10)?), vec![5]);
        Ok(())
    }

    #[test]
    fn field_search_is_restricted() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&IndexDocument {
            carrier: Some("Travelers".to_string()),
            coverage_type: Some("property".to_string()),
            ..policy(9, "travelers mentioned in content too")
        })?;
        index.index(&policy(10, "travelers appears only in the text"))?;

        assert_eq!(ids(&index.search_by_field("carrier", "travelers", 10)?), vec![9]);
        assert_eq!(ids(&index.search_by_field("coverage_type", "property", 10)?), vec![9]);
        assert!(matches!(
            index.search_by_field("content", "travelers", 10),
            Err(SearchError::InvalidField(field)) if field == "content"
        ));
        Ok(())
    }

    #[test]
    fn content_is_cleaned_and_truncated() -> Result<(), Box<dyn std::error::Error>> {
        let index = PolicyIndex::in_memory(IndexOptions {
            content_max_chars: 20,
            ..IndexOptions::default()
        })?;
        index.index(&policy(1, "insured: acme corp; endorsement rider"))?;

        assert_eq!(ids(&index.query("acme", 10, 0)?), vec![1]);
        assert!(index.query("endorsement", 10, 0)?.is_empty());

        let results = index.query_exact("acme", 10)?;
        assert!(!results[0].snippet.contains(':'));
        Ok(())
    }

    #[test]
    fn rebuild_replaces_everything() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&policy(1, "stale document"))?;

        let indexed = index.rebuild(&[policy(2, "fresh one"), policy(3, "fresh two")])?;
        assert_eq!(indexed, 2);
        assert!(index.query("stale", 10, 0)?.is_empty());
        assert_eq!(index.stats().total_documents, 2);

        assert_eq!(index.rebuild(&[])?, 0);
        assert_eq!(index.stats().total_documents, 0);
        Ok(())
    }

    #[test]
    fn structured_values_are_distinct_and_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        for (id, carrier, number) in [(1, "Travelers", "P-100"), (2, "Chubb", "P-200"), (3, "Travelers", "P-300")] {
            index.index(&IndexDocument {
                carrier: Some(carrier.to_string()),
                policy_number: Some(number.to_string()),
                ..policy(id, "text")
            })?;
        }

        assert_eq!(
            index.structured_values()?,
            vec!["Chubb", "P-100", "P-200", "P-300", "Travelers"]
        );
        Ok(())
    }

    #[test]
    fn on_disk_index_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let index = PolicyIndex::open(dir.path(), IndexOptions::default())?;
            index.index(&policy(11, "first insert"))?;
        }

        let reopened = PolicyIndex::open(dir.path(), IndexOptions::default())?;
        reopened.index(&policy(12, "first insert"))?;

        assert_eq!(reopened.stats().total_documents, 2);
        assert_eq!(ids(&reopened.query("first", 10, 0)?), vec![11, 12]);
        assert_eq!(reopened.max_seq()?, Some(1));
        Ok(())
    }

    #[test]
    fn prefix_expansion_reaches_every_matching_term() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        let mut documents: Vec<IndexDocument> =
            (0..70).map(|n| policy(n, &format!("alpha{n:03}"))).collect();
        documents.push(policy(999, "alphazulu"));
        index.rebuild(&documents)?;

        let results = index.query("alpha", 200, 0)?;
        assert_eq!(results.len(), 71);
        assert!(ids(&results).contains(&999));
        Ok(())
    }

    #[test]
    fn inflected_forms_match_their_stem() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&IndexDocument {
            title: "declarations.pdf".to_string(),
            ..policy(1, "commercial policy schedule")
        })?;
        index.index(&IndexDocument {
            title: "excess.pdf".to_string(),
            ..policy(2, "umbrella excess layer")
        })?;

        assert_eq!(ids(&index.query("policies", 10, 0)?), vec![1]);
        assert_eq!(ids(&index.query_exact("policies", 10)?), vec![1]);
        Ok(())
    }

    #[test]
    fn staged_rebuild_is_invisible_until_commit() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&policy(1, "stale wording"))?;

        {
            let mut writer = index.lock_writer()?;
            let (staged, result) = index.stage_rebuild(&mut writer, &[policy(2, "fresh wording")]);
            result?;
            assert_eq!(staged, 1);

            assert_eq!(ids(&index.query("stale", 10, 0)?), vec![1]);
            assert!(index.query("fresh", 10, 0)?.is_empty());
            assert_eq!(index.stats().total_documents, 1);

            index.finish_rebuild(&mut writer, staged, Ok(()))?;
        }

        assert!(index.query("stale", 10, 0)?.is_empty());
        assert_eq!(ids(&index.query("fresh", 10, 0)?), vec![2]);
        Ok(())
    }

    #[test]
    fn failed_rebuild_keeps_previous_contents() -> Result<(), Box<dyn std::error::Error>> {
        let index = index()?;
        index.index(&policy(1, "stale wording"))?;

        let result = {
            let mut writer = index.lock_writer()?;
            let (staged, _) =
                index.stage_rebuild(&mut writer, &[policy(2, "fresh one"), policy(3, "fresh two")]);
            index.finish_rebuild(
                &mut writer,
                staged,
                Err(tantivy::TantivyError::InvalidArgument("disk full".to_string())),
            )
        };

        assert!(matches!(
            &result,
            Err(SearchError::Rebuild { indexed: 2, cause }) if cause.contains("disk full")
        ));
        assert_eq!(ids(&index.query("stale", 10, 0)?), vec![1]);
        assert!(index.query("fresh", 10, 0)?.is_empty());
        assert_eq!(index.stats().total_documents, 1);

        assert_eq!(index.rebuild(&[policy(4, "fresh again")])?, 1);
        assert_eq!(ids(&index.query("fresh", 10, 0)?), vec![4]);
        Ok(())
    }
}
