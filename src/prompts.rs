//! Prompts - instruction text sent to the LLM
//!
//! Fixed rule blocks live in constants; `build_*` functions splice in the
//! schema grounding, worked examples, role context and result excerpts.

use crate::worked_examples::WorkedExample;

/// Rules every generated statement must follow.
pub const SQL_RULES: &str = r#"IMPORTANT RULES:
1. Generate ONLY a single valid MySQL SELECT statement. Never use DELETE, DROP, TRUNCATE, UPDATE, ALTER, INSERT or CREATE.
2. Use ONLY the tables and columns listed in the schema above. Never invent a table or column name.
3. JOIN direction:
   - "all X" / "every X" / "each X" / "by all X": start FROM X and LEFT JOIN the related table, so X rows with no matches still appear (with a count of 0).
   - "X who have ..." / "X with ...": use an INNER JOIN so only X rows with matches appear.
4. Names: build a person's full name with CONCAT(u.first_name, ' ', u.last_name) AS user_name.
5. Text matching on names or titles: always case-insensitive partial matching, e.g. d.name LIKE '%sales%'. Never compare names with '='.
6. Add LIMIT 100 unless the question asks for a specific number of rows or for a single aggregate.
7. NULL handling: flag columns such as done_status and hold_status are NULL when not set. Test them with IS NULL / IS NOT NULL, and wrap nullable aggregates in COALESCE(..., 0).
8. Help tickets belong to the person helping: join hit_tickets.helping_person_id to users.id. Completed = done_status = 1, in progress = is_inprogress = 1, on hold = hold_status = 1, pending = done_status IS NULL AND is_inprogress = 0.
9. Use short table aliases and give every computed column a descriptive alias (pending_tickets, user_count, ...).
10. Return ONLY the SQL query. No explanations, no Markdown."#;

pub const SQL_SYSTEM_PREAMBLE: &str =
    "You are an expert SQL query generator for a Project Management System (PMS) database running on MySQL.";

/// Instruction for the second-layer safety check.
pub const VALIDATION_PROMPT: &str = r#"Analyze this SQL query and determine if it's safe to execute:

Query: {query}

Check for:
1. No DELETE, DROP, TRUNCATE, UPDATE, or ALTER statements
2. Only SELECT queries allowed
3. No SQL injection attempts
4. Valid MySQL syntax

Respond with ONLY "SAFE" or "UNSAFE" followed by a brief reason."#;

/// Build the system prompt for SQL generation.
///
/// `grounding` is either the full static schema text or the RAG-retrieved
/// context; `role_context` is appended verbatim when present.
pub fn build_sql_system_prompt(
    grounding: &str,
    examples: &[WorkedExample],
    role_context: Option<&str>,
) -> String {
    let mut prompt = format!("{}\n\nDATABASE SCHEMA:\n\n{}\n\n{}", SQL_SYSTEM_PREAMBLE, grounding.trim(), SQL_RULES);

    if !examples.is_empty() {
        prompt.push_str("\n\nEXAMPLE QUERIES:\n\n");
        let rendered: Vec<String> = examples.iter().map(WorkedExample::render).collect();
        prompt.push_str(&rendered.join("\n\n"));
    }

    if let Some(role_context) = role_context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(role_context.trim());
    }

    prompt.push_str("\n\nNow generate a SQL query for the following question:");
    prompt
}

/// Corrective note appended to the question on the retry attempt.
pub fn build_retry_note(problems: &[String]) -> String {
    let mut note = String::from(
        "IMPORTANT: your previous SQL referenced tables or columns that do not exist in the schema.",
    );
    for problem in problems {
        note.push_str("\n- ");
        note.push_str(problem);
    }
    note.push_str(
        "\nRe-check every table and column name against the DATABASE SCHEMA and use only names listed there.",
    );
    note
}

pub fn build_validation_prompt(sql: &str) -> String {
    VALIDATION_PROMPT.replace("{query}", sql)
}

/// Prompt for narrating results. `rows_json` is the already-truncated excerpt.
pub fn build_explanation_prompt(query: &str, rows_json: &str, shown: usize, total: usize, sql: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a helpful AI assistant explaining database query results to users.\n\n\
         User asked: \"{}\"\n\n",
        query
    );
    if let Some(sql) = sql {
        prompt.push_str(&format!("SQL executed: {}\n\n", sql));
    }
    prompt.push_str(&format!("Query results ({} of {} rows): {}\n\n", shown, total, rows_json));
    prompt.push_str(
        "Start with a clear, friendly summary in 1-3 sentences that a non-technical user understands. \
         For simple lookups stop there. For comparisons or breakdowns add short bullet points with notable \
         insights, anomalies or a recommendation. If there are no results, say so clearly.",
    );
    prompt
}
