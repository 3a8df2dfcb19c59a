//! Resolve human input to entity and area ids
//!
//! Matching goes exact, then prefix, then skim fuzzy scoring. Entities are
//! matched on their id, object id, friendly name and registry name; a
//! `room/name` query restricts the search to one room.

use anyhow::{bail, Result};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::store::HubStore;

/// Minimum skim score for a fuzzy match
const MIN_FUZZY_SCORE: i64 = 40;

/// Candidates listed in an ambiguity error
const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKind {
    Exact,
    Prefix,
    Fuzzy,
}

struct Candidate {
    id: String,
    label: String,
    names: Vec<String>,
}

struct Scored<'a> {
    candidate: &'a Candidate,
    kind: MatchKind,
    score: i64,
}

fn best_match<'a>(query: &str, candidates: &'a [Candidate]) -> Vec<Scored<'a>> {
    let query = query.trim().to_lowercase();
    let matcher = SkimMatcherV2::default();

    let mut scored: Vec<Scored<'a>> = candidates
        .iter()
        .filter_map(|candidate| {
            candidate
                .names
                .iter()
                .filter_map(|name| {
                    let name = name.to_lowercase();
                    if name == query {
                        Some((MatchKind::Exact, i64::MAX))
                    } else if name.starts_with(&query) {
                        Some((MatchKind::Prefix, i64::MAX - name.len() as i64))
                    } else {
                        matcher
                            .fuzzy_match(&name, &query)
                            .filter(|&score| score >= MIN_FUZZY_SCORE)
                            .map(|score| (MatchKind::Fuzzy, score))
                    }
                })
                .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
                .map(|(kind, score)| Scored {
                    candidate,
                    kind,
                    score,
                })
        })
        .collect();

    scored.sort_by(|a, b| a.kind.cmp(&b.kind).then(b.score.cmp(&a.score)));

    // keep only the best tier
    if let Some(first) = scored.first() {
        let (kind, score) = (first.kind, first.score);
        scored.retain(|s| s.kind == kind && (kind != MatchKind::Fuzzy || s.score == score));
    }
    scored
}

fn pick(query: &str, what: &str, candidates: &[Candidate]) -> Result<String> {
    let matches = best_match(query, candidates);
    match matches.as_slice() {
        [] => bail!("No {what} matches '{query}'"),
        [only] => {
            log::debug!("Resolved '{query}' to {}", only.candidate.id);
            Ok(only.candidate.id.clone())
        }
        many => {
            let suggestions: Vec<String> = many
                .iter()
                .take(MAX_SUGGESTIONS)
                .map(|s| format!("  {} ({})", s.candidate.id, s.candidate.label))
                .collect();
            bail!(
                "'{query}' matches several {what}s:\n{}",
                suggestions.join("\n")
            )
        }
    }
}

fn area_candidates(store: &HubStore) -> Vec<Candidate> {
    store
        .areas()
        .map(|area| {
            let mut names = vec![area.area_id.clone(), area.name.clone()];
            names.extend(area.aliases.iter().cloned());
            Candidate {
                id: area.area_id.clone(),
                label: area.name.clone(),
                names,
            }
        })
        .collect()
}

/// Area id for a room name, id or alias
pub fn resolve_area(store: &HubStore, query: &str) -> Result<String> {
    pick(query, "room", &area_candidates(store))
}

/// Entity id for an entity id, name, or `room/name`
pub fn resolve_entity(store: &HubStore, query: &str) -> Result<String> {
    if store.entity(query).is_some() {
        return Ok(query.to_string());
    }

    let (room, name) = match query.split_once('/') {
        Some((room, name)) if !room.is_empty() && !name.is_empty() => {
            (Some(resolve_area(store, room)?), name)
        }
        _ => (None, query),
    };

    let candidates: Vec<Candidate> = store
        .entities()
        .filter(|record| room.is_none() || record.area_id == room)
        .map(|record| {
            let state = &record.state;
            let mut names = vec![state.entity_id.clone(), state.display_name().to_string()];
            if let Some((_, object_id)) = state.entity_id.split_once('.') {
                names.push(object_id.to_string());
            }
            if let Some(entry_name) = store
                .entity_entry(&state.entity_id)
                .and_then(|e| e.name.clone())
            {
                names.push(entry_name);
            }
            Candidate {
                id: state.entity_id.clone(),
                label: state.display_name().to_string(),
                names,
            }
        })
        .collect();

    pick(name, "device", &candidates)
}
