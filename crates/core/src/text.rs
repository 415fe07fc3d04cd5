use std::fmt;

/// Characters that carry meaning in the query grammar and are dropped by the
/// exact-term mode.
const QUERY_OPERATORS: [char; 8] = ['(', ')', '"', '*', '^', ':', '~', '\\'];

/// Exact-term mode ignores terms of this many characters or fewer.
pub const MIN_EXACT_TERM_CHARS: usize = 2;

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn is_content_char(ch: char) -> bool {
    is_word_char(ch) || ch.is_whitespace() || matches!(ch, '-' | '.' | ',')
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Prepares document text for the index: whitespace runs collapse to one
/// space, characters outside word/space/hyphen/comma/period become spaces, and
/// the result is cut to `max_chars` characters.
pub fn clean_for_index(text: &str, max_chars: usize) -> String {
    let stripped: String = normalize_whitespace(text)
        .chars()
        .map(|ch| if is_content_char(ch) { ch } else { ' ' })
        .collect();
    let trimmed = stripped.trim();

    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    }
}

/// Broad-recall query over document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardQuery {
    Empty,
    /// The query held a double quote and is handed to the parser verbatim.
    Phrase(String),
    /// Prefix-matched terms joined with OR.
    Prefix(Vec<String>),
}

impl WildcardQuery {
    pub fn is_empty(&self) -> bool {
        matches!(self, WildcardQuery::Empty)
    }
}

impl fmt::Display for WildcardQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WildcardQuery::Empty => f.write_str("\"\""),
            WildcardQuery::Phrase(raw) => f.write_str(raw),
            WildcardQuery::Prefix(terms) => {
                let rendered: Vec<String> = terms.iter().map(|term| format!("{term}*")).collect();
                f.write_str(&rendered.join(" OR "))
            }
        }
    }
}

/// Quoted exact terms joined with OR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExactQuery(Vec<String>);

impl ExactQuery {
    pub fn terms(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ExactQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("\"\"");
        }
        let rendered: Vec<String> = self.0.iter().map(|term| format!("\"{term}\"")).collect();
        f.write_str(&rendered.join(" OR "))
    }
}

/// Broad-recall mode used for document text.
pub fn prepare_wildcard_query(query: &str) -> WildcardQuery {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return WildcardQuery::Empty;
    }
    if trimmed.contains('"') {
        return WildcardQuery::Phrase(trimmed.to_string());
    }

    let terms: Vec<String> = trimmed
        .split_whitespace()
        .map(|term| {
            term.chars()
                .filter(|&ch| is_word_char(ch) || ch == '-')
                .collect::<String>()
        })
        .filter(|term| !term.is_empty())
        .collect();

    if terms.is_empty() {
        WildcardQuery::Empty
    } else {
        WildcardQuery::Prefix(terms)
    }
}

/// Stricter mode used by the policy search: operators are dropped and only
/// terms longer than two characters survive.
pub fn prepare_exact_query(query: &str) -> ExactQuery {
    let cleaned: String = query
        .chars()
        .map(|ch| if QUERY_OPERATORS.contains(&ch) { ' ' } else { ch })
        .collect();

    ExactQuery(
        cleaned
            .split_whitespace()
            .filter(|term| term.chars().count() > MIN_EXACT_TERM_CHARS)
            .map(str::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_normalized() {
        assert_eq!(normalize_whitespace("A  \t  lot\nof   spacing"), "A lot of spacing");
    }

    #[test]
    fn cleaning_strips_symbols_and_keeps_punctuation() {
        let cleaned = clean_for_index("Limit:  $1,000,000.\n\nGL-2024-001 (primary)", 100);
        assert_eq!(cleaned, "Limit   1,000,000. GL-2024-001  primary");
    }

    #[test]
    fn cleaning_truncates_on_char_boundary() {
        assert_eq!(clean_for_index("héllo wörld", 4), "héll");
        assert_eq!(clean_for_index("short", 50), "short");
        assert_eq!(clean_for_index("", 50), "");
    }

    #[test]
    fn wildcard_mode_prefixes_and_ors_terms() {
        let prepared = prepare_wildcard_query("liab* State-Farm!");
        assert_eq!(
            prepared,
            WildcardQuery::Prefix(vec!["liab".to_string(), "State-Farm".to_string()])
        );
        assert_eq!(prepared.to_string(), "liab* OR State-Farm*");
    }

    #[test]
    fn wildcard_mode_passes_quoted_queries_through() {
        let prepared = prepare_wildcard_query("  \"general liability\" ");
        assert_eq!(prepared, WildcardQuery::Phrase("\"general liability\"".to_string()));
        assert_eq!(prepared.to_string(), "\"general liability\"");
    }

    #[test]
    fn blank_queries_prepare_to_empty() {
        assert!(prepare_wildcard_query("   ").is_empty());
        assert!(prepare_wildcard_query("!! ??").is_empty());
        assert!(prepare_exact_query("").is_empty());
    }

    #[test]
    fn exact_mode_drops_short_terms_and_operators() {
        let prepared = prepare_exact_query("GL (policy) of \"State\" ~Farm");
        assert_eq!(prepared.terms(), ["policy", "State", "Farm"]);
        assert_eq!(prepared.to_string(), "\"policy\" OR \"State\" OR \"Farm\"");
    }

    #[test]
    fn exact_mode_with_only_short_terms_is_empty() {
        assert!(prepare_exact_query("GL to a").is_empty());
        assert_eq!(prepare_exact_query("GL to").to_string(), "\"\"");
    }
}
