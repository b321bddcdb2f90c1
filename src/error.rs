use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::market::Market;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Side::Home => "home team",
            Side::Away => "away team",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure of a single match/row. None of these abort a batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("missing input: {field}")]
    MissingInput { field: String },

    #[error("{side} '{query}' not found and no suggestion cleared the cutoff")]
    UnresolvedTeam { side: Side, query: String },

    #[error("{side} '{query}' is ambiguous, did you mean: {}?", suggestions.join(", "))]
    AmbiguousTeam {
        side: Side,
        query: String,
        suggestions: Vec<String>,
    },

    #[error("invalid market odds for {market}: '{raw}' is not a positive decimal")]
    InvalidOdds { market: Market, raw: String },

    #[error("not enough history for {team} to derive an expected-goals rate")]
    InsufficientHistory { team: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RowError {
    pub fn missing(field: impl Into<String>) -> Self {
        RowError::MissingInput {
            field: field.into(),
        }
    }

    /// Candidate names the caller can show next to the error.
    pub fn suggestions(&self) -> &[String] {
        match self {
            RowError::AmbiguousTeam { suggestions, .. } => suggestions,
            _ => &[],
        }
    }
}

/// Collaborator-level failures that stop processing as a whole.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("no matches found in the historical dataset")]
    Empty,
}
