//! SQL Generator
//!
//! Turns a validated question into a candidate MySQL statement, then
//! cross-checks every referenced table and `alias.column` against the schema
//! registry. One corrective retry at near-zero temperature is allowed; what
//! happens after a second miss depends on [`CrossCheckPolicy`].

use crate::error::{AgenticError, Result};
use crate::llm::{strip_code_fences, CompletionProvider, CompletionRequest};
use crate::prompts::{build_retry_note, build_sql_system_prompt};
use crate::reference::{role_instructions, ReferenceLibrary};
use crate::schema_rag::retriever::ContextRetriever;
use crate::schema_registry::SchemaRegistry;
use crate::worked_examples::{WorkedExample, WORKED_EXAMPLES};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Retries after the first attempt.
pub const MAX_SCHEMA_RETRIES: usize = 1;
pub const RETRY_TEMPERATURE: f32 = 0.0;
const SUGGESTION_THRESHOLD: f64 = 0.8;

lazy_static! {
    static ref STRING_LITERAL_RE: Regex = Regex::new(r"'(?:[^'\\]|\\.)*'").unwrap();
    static ref FROM_IN_FUNCTION_RE: Regex =
        Regex::new(r"(?i)\b(?:EXTRACT|TRIM|SUBSTRING|POSITION)\s*\([^()]*\)").unwrap();
    static ref TABLE_REF_RE: Regex = Regex::new(r"(?i)\b(?:FROM|JOIN)\s+`?(\w+)`?(?:\.`?(\w+)`?)?").unwrap();
    // Read after a table reference without consuming it, so a following JOIN stays visible.
    static ref ALIAS_RE: Regex = Regex::new(r"(?i)^\s+(?:AS\s+)?`?(\w+)`?").unwrap();
    static ref CTE_RE: Regex = Regex::new(r"(?i)(?:\bWITH(?:\s+RECURSIVE)?|,)\s*`?(\w+)`?\s+AS\s*\(").unwrap();
    static ref COLUMN_REF_RE: Regex = Regex::new(r"`?\b([A-Za-z_]\w*)`?\.`?([A-Za-z_]\w*)`?").unwrap();
}

/// Words that can follow a table name and are never aliases.
const NOT_AN_ALIAS: &[&str] = &[
    "left", "right", "inner", "outer", "cross", "full", "natural", "join", "straight_join", "where",
    "on", "using", "group", "order", "limit", "having", "union", "window", "for", "lock", "set",
];

/// What to do when the SQL still fails the cross-check after the retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossCheckPolicy {
    /// Log the mismatch and hand the SQL on; the database is the backstop.
    Permissive,
    /// Fail the request with `AgenticError::SchemaMismatch`.
    Strict,
}

impl FromStr for CrossCheckPolicy {
    type Err = AgenticError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(CrossCheckPolicy::Permissive),
            "strict" => Ok(CrossCheckPolicy::Strict),
            other => Err(AgenticError::Config(format!(
                "Unknown cross-check mode '{}', expected 'permissive' or 'strict'",
                other
            ))),
        }
    }
}

impl fmt::Display for CrossCheckPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossCheckPolicy::Permissive => f.write_str("permissive"),
            CrossCheckPolicy::Strict => f.write_str("strict"),
        }
    }
}

/// Source of the schema text embedded in the prompt.
#[derive(Clone)]
pub enum Grounding {
    StaticSchema,
    Retrieved(Arc<ContextRetriever>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownColumn {
    pub table: String,
    pub column: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownTable {
    pub table: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossCheckReport {
    pub referenced_tables: Vec<String>,
    pub unknown_tables: Vec<UnknownTable>,
    pub unknown_columns: Vec<UnknownColumn>,
}

impl CrossCheckReport {
    pub fn passed(&self) -> bool {
        self.unknown_tables.is_empty() && self.unknown_columns.is_empty()
    }

    /// One human-readable line per problem, used in the retry note and logs.
    pub fn problems(&self) -> Vec<String> {
        let hint = |s: &Option<String>| {
            s.as_ref()
                .map(|name| format!(" (did you mean `{}`?)", name))
                .unwrap_or_default()
        };
        self.unknown_tables
            .iter()
            .map(|t| format!("unknown table `{}`{}", t.table, hint(&t.suggestion)))
            .chain(
                self.unknown_columns
                    .iter()
                    .map(|c| format!("unknown column `{}.{}`{}", c.table, c.column, hint(&c.suggestion))),
            )
            .collect()
    }
}

/// Heuristic reference check. Not a SQL parser: string literals and
/// `EXTRACT(x FROM y)`-style calls are blanked out first, CTE names are
/// treated as known tables, and qualifiers that resolve to nothing known
/// (subquery aliases) are skipped.
pub fn cross_check(sql: &str, registry: &SchemaRegistry) -> CrossCheckReport {
    let cleaned = STRING_LITERAL_RE.replace_all(sql, "''");
    let cleaned = FROM_IN_FUNCTION_RE.replace_all(&cleaned, "NULL");

    let ctes: HashSet<String> = CTE_RE
        .captures_iter(&cleaned)
        .map(|c| c[1].to_lowercase())
        .collect();

    let mut report = CrossCheckReport::default();
    // qualifier (alias or table name) -> registered table name
    let mut qualifiers: HashMap<String, String> = HashMap::new();

    for caps in TABLE_REF_RE.captures_iter(&cleaned) {
        let end = caps.get(0).map_or(0, |m| m.end());
        // `schema.table` keeps the last segment
        let table = caps
            .get(2)
            .or_else(|| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let key = table.to_lowercase();
        if table.is_empty() || ctes.contains(&key) {
            continue;
        }

        if !report.referenced_tables.iter().any(|t| t.eq_ignore_ascii_case(&table)) {
            report.referenced_tables.push(table.clone());
        }

        if registry.has_table(&table) {
            qualifiers.insert(key.clone(), key.clone());
            if let Some(alias) = ALIAS_RE.captures(&cleaned[end..]).map(|a| a[1].to_lowercase()) {
                if !NOT_AN_ALIAS.contains(&alias.as_str()) {
                    qualifiers.insert(alias, key);
                }
            }
        } else if !report.unknown_tables.iter().any(|t| t.table.eq_ignore_ascii_case(&table)) {
            report.unknown_tables.push(UnknownTable {
                suggestion: closest(&key, registry.table_names().into_iter()),
                table,
            });
        }
    }

    for caps in COLUMN_REF_RE.captures_iter(&cleaned) {
        let qualifier = caps[1].to_lowercase();
        let column = caps[2].to_string();
        let Some(table) = qualifiers.get(&qualifier) else {
            continue;
        };
        let Some(columns) = registry.columns(table) else {
            continue;
        };
        let column_key = column.to_lowercase();
        if columns.contains(&column_key) {
            continue;
        }
        let duplicate = report
            .unknown_columns
            .iter()
            .any(|c| c.table == *table && c.column.eq_ignore_ascii_case(&column));
        if !duplicate {
            report.unknown_columns.push(UnknownColumn {
                table: table.clone(),
                suggestion: closest(&column_key, columns.iter().map(String::as_str)),
                column,
            });
        }
    }

    report
}

fn closest<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    candidates
        .map(|c| (strsim::jaro_winkler(name, &c.to_lowercase()), c))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, c)| c.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedSql {
    pub sql: String,
    /// Number of corrective retries that were made (0 or 1).
    pub retries: usize,
    pub cross_check: CrossCheckReport,
    pub used_rag: bool,
}

pub struct SqlGenerator {
    llm: Arc<dyn CompletionProvider>,
    registry: Arc<SchemaRegistry>,
    grounding: Grounding,
    policy: CrossCheckPolicy,
    reference: Option<Arc<ReferenceLibrary>>,
    temperature: f32,
    max_tokens: u32,
    rag_top_k: usize,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn CompletionProvider>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            llm,
            registry,
            grounding: Grounding::StaticSchema,
            policy: CrossCheckPolicy::Permissive,
            reference: None,
            temperature: 0.3,
            max_tokens: 2000,
            rag_top_k: 5,
        }
    }

    pub fn with_grounding(mut self, grounding: Grounding) -> Self {
        self.grounding = grounding;
        self
    }

    pub fn with_policy(mut self, policy: CrossCheckPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_reference(mut self, reference: Arc<ReferenceLibrary>) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_rag_top_k(mut self, top_k: usize) -> Self {
        self.rag_top_k = top_k.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub async fn generate(&self, query: &str, role: Option<&str>) -> Result<GeneratedSql> {
        info!("Generating SQL for query: {}", query);

        let (grounding, examples, used_rag) = self.grounding_text(query, role).await;
        let role_context = self.role_context(query, role);
        let system_prompt = build_sql_system_prompt(&grounding, examples, role_context.as_deref());

        let mut retries = 0;
        let mut user_prompt = query.to_string();
        let mut temperature = self.temperature;
        loop {
            let request = CompletionRequest::new(system_prompt.clone(), user_prompt.clone())
                .with_temperature(temperature)
                .with_max_tokens(self.max_tokens);

            let raw = self
                .llm
                .complete(request)
                .await
                .map_err(|e| AgenticError::Generation(e.to_string()))?;
            // An empty reply passes through; the safety gate rejects it.
            let sql = strip_code_fences(&raw);
            info!("Generated SQL (attempt {}): {}", retries + 1, sql);

            let report = cross_check(&sql, &self.registry);
            if report.passed() {
                return Ok(GeneratedSql {
                    sql,
                    retries,
                    cross_check: report,
                    used_rag,
                });
            }

            let problems = report.problems();
            if retries < MAX_SCHEMA_RETRIES {
                warn!("Schema cross-check failed, retrying: {}", problems.join("; "));
                retries += 1;
                user_prompt = format!("{}\n\n{}", query, build_retry_note(&problems));
                temperature = RETRY_TEMPERATURE;
                continue;
            }

            return match self.policy {
                CrossCheckPolicy::Permissive => {
                    warn!(
                        "Schema cross-check still failing after {} retry, passing SQL on: {}",
                        retries,
                        problems.join("; ")
                    );
                    Ok(GeneratedSql {
                        sql,
                        retries,
                        cross_check: report,
                        used_rag,
                    })
                }
                CrossCheckPolicy::Strict => Err(AgenticError::SchemaMismatch(problems.join("; "))),
            };
        }
    }

    async fn grounding_text(&self, query: &str, role: Option<&str>) -> (String, &'static [WorkedExample], bool) {
        if let Grounding::Retrieved(retriever) = &self.grounding {
            match retriever.retrieve(query, role, self.rag_top_k).await {
                Ok(context) if context.has_tables() => return (context.render(), &[], true),
                Ok(_) => warn!("RAG returned no tables, using static schema"),
                Err(e) => warn!("RAG retrieval failed, using static schema: {}", e),
            }
        }
        (self.registry.prompt_text().to_string(), WORKED_EXAMPLES, false)
    }

    fn role_context(&self, query: &str, role: Option<&str>) -> Option<String> {
        let role = role.map(str::trim).filter(|r| !r.is_empty())?;
        let mut sections = Vec::new();
        if let Some(instructions) = role_instructions(role) {
            sections.push(instructions.to_string());
        }
        if let Some(reference) = &self.reference {
            let excerpts = reference.excerpts(query, Some(role));
            if !excerpts.is_empty() {
                sections.push(format!("REFERENCE DOCUMENT EXCERPTS:\n{}", excerpts.join("\n\n")));
            }
        }
        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n\n"))
        }
    }
}
