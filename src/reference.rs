//! Role reference document
//!
//! Optional plain-text document describing what each role cares about.
//! Paragraphs that share the most words with the question are appended to
//! the SQL prompt together with fixed per-role instructions.

use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

pub const MAX_EXCERPTS: usize = 3;

lazy_static! {
    static ref PARAGRAPH_SPLIT_RE: Regex = Regex::new(r"\n\s*\n").unwrap();
    static ref TOKEN_RE: Regex = Regex::new(r"[a-z0-9_]+").unwrap();
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "of", "in", "on", "for", "to", "and", "or", "is", "are", "me", "all", "by", "with",
    "give", "show", "what", "how", "many",
];

/// Fixed instructions appended for a known role.
pub fn role_instructions(role: &str) -> Option<&'static str> {
    match role.trim().to_lowercase().as_str() {
        "admin" => Some(
            "ROLE: ADMIN\nThe user can see every department and user. Prefer organisation-wide aggregates \
             and include department names when grouping.",
        ),
        "manager" => Some(
            "ROLE: MANAGER\nThe user manages a team. Prefer per-person breakdowns (pending, in progress, \
             completed) and workload comparisons between team members.",
        ),
        "employee" => Some(
            "ROLE: EMPLOYEE\nThe user is asking about their own work. Prefer listings of their tickets, \
             tasks and workflow steps ordered by due date.",
        ),
        "executive" => Some(
            "ROLE: EXECUTIVE\nThe user wants high-level figures. Prefer totals, trends over time and \
             department-level comparisons over row listings.",
        ),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceLibrary {
    paragraphs: Vec<String>,
}

impl ReferenceLibrary {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let library = Self::from_text(&text);
        info!("Loaded reference document {} ({} paragraphs)", path.display(), library.len());
        Ok(library)
    }

    pub fn from_text(text: &str) -> Self {
        let paragraphs = PARAGRAPH_SPLIT_RE
            .split(text)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { paragraphs }
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    /// Up to [`MAX_EXCERPTS`] paragraphs ranked by shared words with `query`.
    /// When the role is mentioned anywhere in the document, only paragraphs
    /// naming it are considered.
    pub fn excerpts(&self, query: &str, role: Option<&str>) -> Vec<String> {
        let query_words = tokens(query);
        if query_words.is_empty() {
            return Vec::new();
        }

        let role = role.map(|r| r.trim().to_lowercase()).filter(|r| !r.is_empty());
        let mentions_role = |p: &str| role.as_ref().map_or(true, |r| p.to_lowercase().contains(r.as_str()));
        let restrict = role.is_some() && self.paragraphs.iter().any(|p| mentions_role(p.as_str()));

        let mut scored: Vec<(usize, usize, &String)> = self
            .paragraphs
            .iter()
            .enumerate()
            .filter(|(_, p)| !restrict || mentions_role(p.as_str()))
            .map(|(i, p)| (tokens(p).intersection(&query_words).count(), i, p))
            .filter(|(score, _, _)| *score > 0)
            .collect();

        // highest overlap first, document order breaks ties
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(MAX_EXCERPTS)
            .map(|(_, _, p)| p.clone())
            .collect()
    }
}

fn tokens(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}
