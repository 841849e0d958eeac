//! Compiles flat `AND` / `OR` label queries into search-engine boolean queries.
//!
//! The grammar has no precedence or grouping. Alternatives separated by ` OR ` that contain
//! ` AND ` contribute their terms to one shared `must` list, so `a AND b OR c AND d` requires
//! all four terms.

use serde_json::{json, Map, Value};
use std::{convert::Infallible, str::FromStr};

const OR: &str = " OR ";
const AND: &str = " AND ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BooleanQuery {
    pub must_terms: Vec<String>,
    pub should_terms: Vec<String>,
}

impl BooleanQuery {
    pub fn parse(query: &str) -> Self {
        let mut compiled = Self::default();
        if query.is_empty() {
            return compiled;
        }

        if query.contains(OR) {
            for alternative in query.split(OR) {
                if alternative.contains(AND) {
                    compiled
                        .must_terms
                        .extend(alternative.split(AND).map(str::to_string));
                } else {
                    compiled.should_terms.push(alternative.to_string());
                }
            }
        } else {
            compiled.must_terms = query.split(AND).map(str::to_string).collect();
        }

        compiled
    }

    pub fn is_empty(&self) -> bool {
        self.must_terms.is_empty() && self.should_terms.is_empty()
    }

    /// Search request body matching `field`; terms are lower-cased here.
    pub fn to_query_dsl(&self, field: &str) -> Value {
        let mut clauses = Map::new();
        if !self.must_terms.is_empty() {
            clauses.insert("must".to_string(), match_clauses(field, &self.must_terms));
        }
        if !self.should_terms.is_empty() {
            clauses.insert(
                "should".to_string(),
                match_clauses(field, &self.should_terms),
            );
        }

        json!({ "query": { "bool": clauses } })
    }

    /// Text that compiles back into this query.
    ///
    /// Must-terms from different alternatives share one list, so some queries have no such
    /// text: a term ending in ` AND` followed by further must-terms, for example.
    pub fn canonical_text(&self) -> Option<String> {
        let must = self.must_terms.join(AND);
        let should = self.should_terms.join(OR);

        let candidates = match (self.must_terms.is_empty(), self.should_terms.is_empty()) {
            (true, true) => vec![String::new()],
            (false, true) => vec![must],
            (true, false) => vec![should],
            (false, false) => vec![format!("{must}{OR}{should}"), format!("{should}{OR}{must}")],
        };

        candidates
            .into_iter()
            .find(|text| Self::parse(text) == *self)
    }
}

fn match_clauses(field: &str, terms: &[String]) -> Value {
    terms
        .iter()
        .map(|term| json!({ "match": { field: term.to_lowercase() } }))
        .collect()
}

impl FromStr for BooleanQuery {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
