use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{SearchError, SearchResult};

/// How the keyword is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Case-sensitive substring containment
    #[default]
    Literal,
    /// Case-insensitive regular expression, matched anywhere in the cell
    Regex,
}

/// Strategy for pattern matching
#[derive(Debug, Clone)]
enum MatchStrategy {
    Literal(Arc<str>),
    Regex(Arc<Regex>),
}

/// Decides whether the string form of a cell matches the keyword.
///
/// The pattern is compiled once when the matcher is built, so a bad regex is a
/// configuration error raised before any workbook is opened. Cloning is cheap and
/// every task gets its own clone.
#[derive(Debug, Clone)]
pub struct Matcher {
    strategy: MatchStrategy,
}

impl Matcher {
    /// Creates a matcher for the given keyword and mode
    pub fn new(keyword: &str, mode: MatchMode) -> SearchResult<Self> {
        if keyword.is_empty() {
            return Err(SearchError::config_error("Keyword must not be empty"));
        }

        let strategy = match mode {
            MatchMode::Literal => MatchStrategy::Literal(Arc::from(keyword)),
            MatchMode::Regex => {
                let regex = RegexBuilder::new(keyword)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| SearchError::invalid_pattern(e.to_string()))?;
                MatchStrategy::Regex(Arc::new(regex))
            }
        };

        Ok(Self { strategy })
    }

    pub fn mode(&self) -> MatchMode {
        match self.strategy {
            MatchStrategy::Literal(_) => MatchMode::Literal,
            MatchStrategy::Regex(_) => MatchMode::Regex,
        }
    }

    /// Returns true if the cell text matches
    pub fn is_match(&self, cell: &str) -> bool {
        match &self.strategy {
            MatchStrategy::Literal(keyword) => cell.contains(&**keyword),
            MatchStrategy::Regex(regex) => regex.is_match(cell),
        }
    }
}
