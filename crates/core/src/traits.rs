use crate::index::PolicyIndex;
use crate::models::{IndexDocument, PolicyNote, SearchResult};
use crate::SearchError;

/// Full-text document index seen by ingestion and the policy search.
pub trait DocumentIndex {
    fn index(&self, document: &IndexDocument) -> Result<(), SearchError>;

    fn remove(&self, document_id: u64) -> Result<(), SearchError>;

    fn query(&self, text: &str, limit: usize, offset: usize)
        -> Result<Vec<SearchResult>, SearchError>;

    fn query_exact(&self, text: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError>;

    /// Carrier names and policy numbers present in the index.
    fn structured_values(&self) -> Result<Vec<String>, SearchError>;
}

/// Record data that lives outside the index: notes on policies and the names
/// of buildings and agents.
pub trait PolicyDirectory {
    fn notes(&self) -> Vec<PolicyNote>;

    fn building_names(&self) -> Vec<String>;

    fn agent_names(&self) -> Vec<String>;
}

impl DocumentIndex for PolicyIndex {
    fn index(&self, document: &IndexDocument) -> Result<(), SearchError> {
        PolicyIndex::index(self, document)
    }

    fn remove(&self, document_id: u64) -> Result<(), SearchError> {
        PolicyIndex::remove(self, document_id)
    }

    fn query(
        &self,
        text: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        PolicyIndex::query(self, text, limit, offset)
    }

    fn query_exact(&self, text: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        PolicyIndex::query_exact(self, text, limit)
    }

    fn structured_values(&self) -> Result<Vec<String>, SearchError> {
        PolicyIndex::structured_values(self)
    }
}

impl<T: DocumentIndex + ?Sized> DocumentIndex for &T {
    fn index(&self, document: &IndexDocument) -> Result<(), SearchError> {
        (**self).index(document)
    }

    fn remove(&self, document_id: u64) -> Result<(), SearchError> {
        (**self).remove(document_id)
    }

    fn query(
        &self,
        text: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        (**self).query(text, limit, offset)
    }

    fn query_exact(&self, text: &str, limit: usize) -> Result<Vec<SearchResult>, SearchError> {
        (**self).query_exact(text, limit)
    }

    fn structured_values(&self) -> Result<Vec<String>, SearchError> {
        (**self).structured_values()
    }
}
