//! Free-text team name resolution against the names present in a dataset
//! snapshot.
//!
//! Similarity is normalized Levenshtein distance over the case-folded names:
//! `1 - edits / max(len_a, len_b)`, counted in Unicode scalar values. It is
//! symmetric and deterministic, and equal scores keep index order.

use std::collections::HashMap;

use serde::Serialize;
use strsim::normalized_levenshtein;

use crate::error::{RowError, Side};

pub const DEFAULT_CUTOFF: f64 = 0.4;
pub const MAX_SUGGESTIONS: usize = 5;

/// Canonical team names, in first-seen order. Immutable once built; rebuild
/// it from the new snapshot when the dataset is reloaded.
#[derive(Debug, Clone, Default)]
pub struct TeamIndex {
    names: Vec<String>,
    folded: Vec<String>,
    by_folded: HashMap<String, usize>,
}

impl TeamIndex {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = TeamIndex::default();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            let key = fold(name);
            if index.by_folded.contains_key(&key) {
                continue;
            }
            index.by_folded.insert(key.clone(), index.names.len());
            index.names.push(name.to_string());
            index.folded.push(key);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn canonical(&self, query: &str) -> Option<&str> {
        self.by_folded
            .get(&fold(query))
            .map(|idx| self.names[*idx].as_str())
    }
}

pub fn fold(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ResolveResult {
    Exact(String),
    /// Exactly one fuzzy candidate; callers take it as the resolution.
    SingleSuggestion(String),
    /// Ambiguous; callers must ask for disambiguation.
    MultipleSuggestions(Vec<String>),
    NoMatch,
}

impl ResolveResult {
    pub fn accepted(&self) -> Option<&str> {
        match self {
            ResolveResult::Exact(name) | ResolveResult::SingleSuggestion(name) => Some(name),
            _ => None,
        }
    }
}

pub fn resolve(query: &str, index: &TeamIndex, cutoff: f64) -> ResolveResult {
    let key = fold(query);
    if key.is_empty() {
        return ResolveResult::NoMatch;
    }
    if let Some(idx) = index.by_folded.get(&key) {
        return ResolveResult::Exact(index.names[*idx].clone());
    }

    let mut scored = index
        .folded
        .iter()
        .enumerate()
        .map(|(idx, name)| (idx, similarity(&key, name)))
        .filter(|(_, score)| *score >= cutoff)
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(MAX_SUGGESTIONS);

    let mut names = scored
        .into_iter()
        .map(|(idx, _)| index.names[idx].clone())
        .collect::<Vec<_>>();
    match names.len() {
        0 => ResolveResult::NoMatch,
        1 => ResolveResult::SingleSuggestion(names.remove(0)),
        _ => ResolveResult::MultipleSuggestions(names),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTeam {
    pub query: String,
    pub name: String,
    /// Taken from a single fuzzy suggestion rather than an exact match.
    pub suggested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPair {
    pub home: ResolvedTeam,
    pub away: ResolvedTeam,
}

pub fn resolve_team(
    query: &str,
    side: Side,
    index: &TeamIndex,
    cutoff: f64,
) -> Result<ResolvedTeam, RowError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(RowError::missing(format!("{side} name")));
    }
    match resolve(trimmed, index, cutoff) {
        ResolveResult::Exact(name) => Ok(ResolvedTeam {
            query: trimmed.to_string(),
            name,
            suggested: false,
        }),
        ResolveResult::SingleSuggestion(name) => Ok(ResolvedTeam {
            query: trimmed.to_string(),
            name,
            suggested: true,
        }),
        ResolveResult::MultipleSuggestions(suggestions) => Err(RowError::AmbiguousTeam {
            side,
            query: trimmed.to_string(),
            suggestions,
        }),
        ResolveResult::NoMatch => Err(RowError::UnresolvedTeam {
            side,
            query: trimmed.to_string(),
        }),
    }
}

/// Both names are checked for presence before either is resolved, so a blank
/// field is reported ahead of any lookup failure.
pub fn resolve_pair(
    home: &str,
    away: &str,
    index: &TeamIndex,
    cutoff: f64,
) -> Result<ResolvedPair, RowError> {
    if home.trim().is_empty() {
        return Err(RowError::missing(format!("{} name", Side::Home)));
    }
    if away.trim().is_empty() {
        return Err(RowError::missing(format!("{} name", Side::Away)));
    }
    Ok(ResolvedPair {
        home: resolve_team(home, Side::Home, index, cutoff)?,
        away: resolve_team(away, Side::Away, index, cutoff)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TeamIndex {
        TeamIndex::new([
            "Arsenal",
            "Manchester United",
            "Manchester City",
            "Liverpool",
            "Real Madrid",
            "Palmeiras",
        ])
    }

    #[test]
    fn exact_match_ignores_case_and_whitespace() {
        let idx = index();
        assert_eq!(
            resolve("  arsenal ", &idx, DEFAULT_CUTOFF),
            ResolveResult::Exact("Arsenal".to_string())
        );
        assert_eq!(
            resolve("LIVERPOOL", &idx, DEFAULT_CUTOFF),
            ResolveResult::Exact("Liverpool".to_string())
        );
    }

    #[test]
    fn exact_match_is_independent_of_cutoff() {
        let idx = index();
        for cutoff in [0.01, 0.4, 0.99, 1.0] {
            for name in idx.names() {
                assert_eq!(resolve(name, &idx, cutoff), ResolveResult::Exact(name.clone()));
            }
        }
    }

    #[test]
    fn misspelling_yields_single_suggestion() {
        let idx = index();
        assert_eq!(
            resolve("Liverpol", &idx, DEFAULT_CUTOFF),
            ResolveResult::SingleSuggestion("Liverpool".to_string())
        );
    }

    #[test]
    fn man_utd_goes_through_fuzzy_path() {
        let idx = TeamIndex::new(["Manchester United"]);
        let result = resolve("Man Utd", &idx, DEFAULT_CUTOFF);
        assert!(!matches!(result, ResolveResult::Exact(_)));
        // 1 - 10/17 ≈ 0.41 clears the default cutoff.
        assert_eq!(
            result,
            ResolveResult::SingleSuggestion("Manchester United".to_string())
        );
        assert_eq!(resolve("Man Utd", &idx, 0.5), ResolveResult::NoMatch);
    }

    #[test]
    fn ambiguous_prefix_lists_best_first() {
        let idx = index();
        assert_eq!(
            resolve("manchester", &idx, DEFAULT_CUTOFF),
            ResolveResult::MultipleSuggestions(vec![
                "Manchester City".to_string(),
                "Manchester United".to_string(),
            ])
        );
    }

    #[test]
    fn ties_keep_index_order() {
        let idx = TeamIndex::new(["Abc", "Abd", "Abe"]);
        assert_eq!(
            resolve("abx", &idx, 0.5),
            ResolveResult::MultipleSuggestions(vec![
                "Abc".to_string(),
                "Abd".to_string(),
                "Abe".to_string(),
            ])
        );
    }

    #[test]
    fn suggestions_capped_at_five() {
        let idx = TeamIndex::new(["Team A", "Team B", "Team C", "Team D", "Team E", "Team F", "Team G"]);
        match resolve("team x", &idx, DEFAULT_CUTOFF) {
            ResolveResult::MultipleSuggestions(names) => {
                assert_eq!(names.len(), MAX_SUGGESTIONS);
                assert_eq!(names[0], "Team A");
            }
            other => panic!("expected suggestions, got {other:?}"),
        }
    }

    #[test]
    fn empty_or_unknown_is_no_match() {
        let idx = index();
        assert_eq!(resolve("", &idx, DEFAULT_CUTOFF), ResolveResult::NoMatch);
        assert_eq!(resolve("   ", &idx, DEFAULT_CUTOFF), ResolveResult::NoMatch);
        assert_eq!(resolve("zzz", &idx, DEFAULT_CUTOFF), ResolveResult::NoMatch);
    }

    #[test]
    fn index_dedups_case_variants() {
        let idx = TeamIndex::new(["Arsenal", "ARSENAL", " ", "Chelsea"]);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.canonical("arsenal"), Some("Arsenal"));
        assert!(!idx.is_empty());
    }

    #[test]
    fn similarity_is_symmetric() {
        assert_eq!(similarity("man utd", "manchester united"), similarity("manchester united", "man utd"));
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn pair_reports_blank_names_first() {
        let idx = index();
        assert_eq!(
            resolve_pair("", "zzz", &idx, DEFAULT_CUTOFF),
            Err(RowError::missing("home team name"))
        );
        assert_eq!(
            resolve_pair("zzz", " ", &idx, DEFAULT_CUTOFF),
            Err(RowError::missing("away team name"))
        );
    }

    #[test]
    fn pair_marks_suggested_sides() {
        let idx = index();
        let pair = resolve_pair("arsenal", "palmeira", &idx, DEFAULT_CUTOFF).unwrap();
        assert_eq!(pair.home.name, "Arsenal");
        assert!(!pair.home.suggested);
        assert_eq!(pair.away.name, "Palmeiras");
        assert!(pair.away.suggested);
    }

    #[test]
    fn pair_surfaces_ambiguity_with_suggestions() {
        let idx = index();
        let err = resolve_pair("Arsenal", "Manchester", &idx, DEFAULT_CUTOFF).unwrap_err();
        assert_eq!(err.suggestions().len(), 2);
        assert!(matches!(err, RowError::AmbiguousTeam { side: Side::Away, .. }));
    }

    #[test]
    fn pair_reports_unresolved_side() {
        let idx = index();
        let err = resolve_pair("qqqqqqqq", "Arsenal", &idx, DEFAULT_CUTOFF).unwrap_err();
        assert!(matches!(err, RowError::UnresolvedTeam { side: Side::Home, .. }));
    }
}
