use crate::models::{HitTier, PolicyHit, PolicyNote, SearchResult};
use crate::traits::{DocumentIndex, PolicyDirectory};
use crate::SearchError;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Rank given to every note match. Notes are not in the index, so they carry
/// no relevance score of their own.
pub const NOTE_SCORE: f32 = 0.5;
pub const NOTE_PREVIEW_CHARS: usize = 200;
pub const MIN_SUGGESTION_CHARS: usize = 2;

/// Two-tier policy search: exact-term lookup in the document index, plus a
/// substring scan over policy notes. Results are merged by record.
pub struct PolicySearch<I, D>
where
    I: DocumentIndex,
    D: PolicyDirectory,
{
    index: I,
    directory: D,
}

impl<I, D> PolicySearch<I, D>
where
    I: DocumentIndex,
    D: PolicyDirectory,
{
    pub fn new(index: I, directory: D) -> Self {
        Self { index, directory }
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<PolicyHit>, SearchError> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let documents = self.index.query_exact(query, limit)?;
        let notes = self.matching_notes(query, limit);
        debug!(
            documents = documents.len(),
            notes = notes.len(),
            "policy search tiers"
        );

        let mut hits: Vec<PolicyHit> = documents
            .into_iter()
            .map(document_hit)
            .chain(notes.into_iter().map(note_hit))
            .collect();

        hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| tier_rank(left.tier).cmp(&tier_rank(right.tier)))
        });

        let mut seen = HashSet::new();
        hits.retain(|hit| seen.insert(hit.record_id));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Case-insensitive containment over carriers, policy numbers, building
    /// names and agent names; deduplicated and sorted.
    pub fn suggestions(&self, partial: &str, limit: usize) -> Result<Vec<String>, SearchError> {
        if partial.chars().count() < MIN_SUGGESTION_CHARS {
            return Ok(Vec::new());
        }

        let needle = partial.to_lowercase();
        let mut candidates = self.index.structured_values()?;
        candidates.extend(self.directory.building_names());
        candidates.extend(self.directory.agent_names());

        let matches: BTreeSet<String> = candidates
            .into_iter()
            .filter(|candidate| candidate.to_lowercase().contains(&needle))
            .collect();

        Ok(matches.into_iter().take(limit).collect())
    }

    fn matching_notes(&self, query: &str, limit: usize) -> Vec<PolicyNote> {
        let needle = query.to_lowercase();
        self.directory
            .notes()
            .into_iter()
            .filter(|note| note.note.to_lowercase().contains(&needle))
            .take(limit)
            .collect()
    }
}

fn tier_rank(tier: HitTier) -> u8 {
    match tier {
        HitTier::Document => 0,
        HitTier::Note => 1,
    }
}

fn document_hit(result: SearchResult) -> PolicyHit {
    PolicyHit {
        record_id: result.document_id,
        tier: HitTier::Document,
        score: result.score,
        policy_number: result.policy_number,
        carrier: result.carrier,
        coverage_type: result.coverage_type,
        snippet: Some(result.snippet),
        note_preview: None,
        note_date: None,
    }
}

fn note_hit(note: PolicyNote) -> PolicyHit {
    PolicyHit {
        record_id: note.record_id,
        tier: HitTier::Note,
        score: NOTE_SCORE,
        policy_number: None,
        carrier: None,
        coverage_type: None,
        snippet: None,
        note_preview: Some(note_preview(&note.note)),
        note_date: Some(note.created_at),
    }
}

fn note_preview(note: &str) -> String {
    match note.char_indices().nth(NOTE_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &note[..cut]),
        None => note.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexDocument;
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeIndex {
        hits: Vec<SearchResult>,
        values: Vec<String>,
        queries: RefCell<Vec<String>>,
    }

    impl DocumentIndex for FakeIndex {
        fn index(&self, _document: &IndexDocument) -> Result<(), SearchError> {
            Ok(())
        }

        fn remove(&self, _document_id: u64) -> Result<(), SearchError> {
            Ok(())
        }

        fn query(
            &self,
            _text: &str,
            _limit: usize,
            _offset: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            Ok(Vec::new())
        }

        fn query_exact(&self, text: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
            self.queries.borrow_mut().push(text.to_string());
            Ok(self.hits.iter().take(limit).cloned().collect())
        }

        fn structured_values(&self) -> Result<Vec<String>, SearchError> {
            Ok(self.values.clone())
        }
    }

    struct FailingIndex;

    impl DocumentIndex for FailingIndex {
        fn index(&self, _document: &IndexDocument) -> Result<(), SearchError> {
            Err(SearchError::WriterPoisoned)
        }

        fn remove(&self, _document_id: u64) -> Result<(), SearchError> {
            Err(SearchError::WriterPoisoned)
        }

        fn query(
            &self,
            _text: &str,
            _limit: usize,
            _offset: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            Err(SearchError::WriterPoisoned)
        }

        fn query_exact(&self, _text: &str, _limit: usize) -> Result<Vec<SearchResult>, SearchError> {
            Err(SearchError::WriterPoisoned)
        }

        fn structured_values(&self) -> Result<Vec<String>, SearchError> {
            Err(SearchError::WriterPoisoned)
        }
    }

    #[derive(Default)]
    struct FakeDirectory {
        notes: Vec<PolicyNote>,
        buildings: Vec<String>,
        agents: Vec<String>,
    }

    impl PolicyDirectory for FakeDirectory {
        fn notes(&self) -> Vec<PolicyNote> {
            self.notes.clone()
        }

        fn building_names(&self) -> Vec<String> {
            self.buildings.clone()
        }

        fn agent_names(&self) -> Vec<String> {
            self.agents.clone()
        }
    }

    fn document(id: u64, score: f32) -> SearchResult {
        SearchResult {
            document_id: id,
            title: format!("policy-{id}.pdf"),
            score,
            snippet: "<b>flood</b> zone".to_string(),
            carrier: Some("Chubb".to_string()),
            policy_number: Some(format!("FL-{id}")),
            coverage_type: Some("flood".to_string()),
        }
    }

    fn note(record_id: u64, text: &str) -> PolicyNote {
        PolicyNote {
            record_id,
            note: text.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn merges_tiers_and_dedupes_by_record() -> Result<(), Box<dyn std::error::Error>> {
        let index = FakeIndex {
            hits: vec![document(1, 2.5), document(2, 0.2)],
            ..FakeIndex::default()
        };
        let directory = FakeDirectory {
            notes: vec![
                note(1, "Flood elevation certificate received"),
                note(3, "Asked broker about FLOOD sublimit"),
                note(4, "Unrelated note"),
            ],
            ..FakeDirectory::default()
        };

        let hits = PolicySearch::new(index, directory).search("flood", 10)?;

        let order: Vec<(u64, HitTier)> = hits.iter().map(|hit| (hit.record_id, hit.tier)).collect();
        assert_eq!(
            order,
            vec![(1, HitTier::Document), (3, HitTier::Note), (2, HitTier::Document)]
        );
        assert_eq!(hits[1].score, NOTE_SCORE);
        assert!(hits[1].note_date.is_some());
        Ok(())
    }

    #[test]
    fn documents_win_rank_ties_against_notes() -> Result<(), Box<dyn std::error::Error>> {
        let index = FakeIndex {
            hits: vec![document(5, NOTE_SCORE)],
            ..FakeIndex::default()
        };
        let directory = FakeDirectory {
            notes: vec![note(5, "flood claim history"), note(6, "flood zone change")],
            ..FakeDirectory::default()
        };

        let hits = PolicySearch::new(index, directory).search("flood", 10)?;
        assert_eq!(hits.len(), 2);
        assert_eq!((hits[0].record_id, hits[0].tier), (5, HitTier::Document));
        assert_eq!((hits[1].record_id, hits[1].tier), (6, HitTier::Note));
        Ok(())
    }

    #[test]
    fn long_notes_are_previewed() -> Result<(), Box<dyn std::error::Error>> {
        let directory = FakeDirectory {
            notes: vec![note(9, &format!("flood {}", "x".repeat(300)))],
            ..FakeDirectory::default()
        };

        let hits = PolicySearch::new(FakeIndex::default(), directory).search("flood", 5)?;
        let preview = hits[0].note_preview.as_deref().unwrap_or_default();
        assert_eq!(preview.chars().count(), NOTE_PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
        Ok(())
    }

    #[test]
    fn blank_query_skips_both_tiers() -> Result<(), Box<dyn std::error::Error>> {
        let index = FakeIndex::default();
        let search = PolicySearch::new(&index, FakeDirectory::default());

        assert!(search.search("   ", 10)?.is_empty());
        assert!(index.queries.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn results_are_capped_at_limit() -> Result<(), Box<dyn std::error::Error>> {
        let index = FakeIndex {
            hits: vec![document(1, 3.0), document(2, 2.0), document(3, 1.0)],
            ..FakeIndex::default()
        };
        let directory = FakeDirectory {
            notes: vec![note(4, "flood")],
            ..FakeDirectory::default()
        };

        let hits = PolicySearch::new(index, directory).search("flood", 2)?;
        let ids: Vec<u64> = hits.iter().map(|hit| hit.record_id).collect();
        assert_eq!(ids, vec![1, 2]);
        Ok(())
    }

    #[test]
    fn index_failures_propagate() {
        let search = PolicySearch::new(FailingIndex, FakeDirectory::default());
        assert!(search.search("flood", 10).is_err());
        assert!(search.suggestions("flood", 10).is_err());
    }

    #[test]
    fn suggestions_are_sorted_deduped_and_capped() -> Result<(), Box<dyn std::error::Error>> {
        let index = FakeIndex {
            values: vec!["State Farm".to_string(), "SF-2024-001".to_string(), "Travelers".to_string()],
            ..FakeIndex::default()
        };
        let directory = FakeDirectory {
            buildings: vec!["Stateside Lofts".to_string(), "Harbor Tower".to_string()],
            agents: vec!["State Farm".to_string(), "Dana Reyes".to_string()],
            ..FakeDirectory::default()
        };
        let search = PolicySearch::new(index, directory);

        assert_eq!(
            search.suggestions("state", 10)?,
            vec!["State Farm".to_string(), "Stateside Lofts".to_string()]
        );
        assert_eq!(search.suggestions("s", 10)?, Vec::<String>::new());
        assert_eq!(search.suggestions("ER", 1)?, vec!["Harbor Tower".to_string()]);
        Ok(())
    }
}
