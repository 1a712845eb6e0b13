//! Schema Registry
//!
//! Parses the CREATE TABLE statements of the PMS schema dump into a
//! table -> columns map, renders it for prompts, and answers the column
//! lookups used by the SQL cross-check. Loaded once per process.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

lazy_static! {
    static ref TABLE_RE: Regex =
        Regex::new(r"(?is)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?`?(\w+)`?\s*\((.*?)\)\s*ENGINE").unwrap();
    static ref COLUMN_RE: Regex = Regex::new(r"^`?(\w+)`?\s+(\w+(?:\([^)]+\))?)").unwrap();
    static ref COMMENT_RE: Regex = Regex::new(r"(?i)COMMENT\s+'([^']+)'").unwrap();
}

/// Tables rendered first in prompts, in this order.
pub const PRIORITY_TABLES: &[&str] = &[
    "hit_tickets",
    "users",
    "departments",
    "designations",
    "fms_masters",
    "fms_steps",
    "fms_entries",
    "fms_entry_progress",
    "recurring_master_tasks",
    "projects",
    "tasks",
    "additional_works",
];

/// Non-priority tables included in the prompt text.
const MAX_EXTRA_TABLES: usize = 20;

pub const RELATIONSHIPS: &[&str] = &[
    "users.id → hit_tickets.user_id (one-to-many)",
    "users.id → hit_tickets.helping_person_id (one-to-many)",
    "users.department_id → departments.id (many-to-one)",
    "users.designation_id → designations.id (many-to-one)",
    "fms_entries.fms_id → fms_masters.id (many-to-one)",
    "fms_entry_progress.fms_entry_id → fms_entries.id (many-to-one)",
    "fms_entry_progress.fms_step_id → fms_steps.id (many-to-one)",
    "recurring_master_tasks.assigned_to → users.id (many-to-one)",
    "projects.created_by → users.id (many-to-one)",
    "tasks.project_id → projects.id (many-to-one)",
    "tasks.assigned_to → users.id (many-to-one)",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// `Table: x` followed by one indented line per column.
    pub fn render(&self) -> String {
        let mut lines = vec![format!("Table: {}", self.name)];
        for col in &self.columns {
            let comment = col
                .comment
                .as_ref()
                .map(|c| format!(" -- {}", c))
                .unwrap_or_default();
            lines.push(format!("  - {} ({}){}", col.name, col.data_type, comment));
        }
        lines.join("\n")
    }

    /// Rough business category, used to tag RAG documents.
    pub fn category(&self) -> &'static str {
        let name = self.name.to_lowercase();
        if name.contains("ticket") {
            "tickets"
        } else if name.starts_with("fms") {
            "workflows"
        } else if name.contains("recurring") {
            "recurring"
        } else if name == "users" || name.contains("department") || name.contains("designation") {
            "users"
        } else if name.contains("project") || name.contains("task") {
            "projects"
        } else {
            "general"
        }
    }
}

/// Where the registry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    File,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    tables: Vec<TableDef>,
    /// lower-cased table name -> lower-cased column names
    index: HashMap<String, Vec<String>>,
    prompt_text: String,
    source: SchemaSource,
}

static GLOBAL_REGISTRY: OnceLock<Arc<SchemaRegistry>> = OnceLock::new();

impl SchemaRegistry {
    /// Process-wide registry. The first caller's path wins; the file is read
    /// at most once per process.
    pub fn global(path: &Path) -> Arc<SchemaRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(SchemaRegistry::load(path)))
            .clone()
    }

    /// Load from a schema dump, degrading to the built-in fallback schema
    /// when the file is missing or contains no parseable tables.
    pub fn load(path: &Path) -> SchemaRegistry {
        info!("Loading schema from: {}", path.display());
        match std::fs::read_to_string(path) {
            Ok(sql) => {
                let tables = parse_sql_schema(&sql);
                if tables.is_empty() {
                    warn!("No CREATE TABLE statements parsed from {}, using fallback schema", path.display());
                    Self::fallback()
                } else {
                    info!("Successfully loaded schema with {} tables", tables.len());
                    Self::from_tables(tables, SchemaSource::File)
                }
            }
            Err(e) => {
                warn!("Schema file not readable ({}): {}, using fallback schema", path.display(), e);
                Self::fallback()
            }
        }
    }

    pub fn from_sql(sql: &str) -> SchemaRegistry {
        Self::from_tables(parse_sql_schema(sql), SchemaSource::File)
    }

    pub fn from_tables(tables: Vec<TableDef>, source: SchemaSource) -> SchemaRegistry {
        let index = tables
            .iter()
            .map(|t| {
                (
                    t.name.to_lowercase(),
                    t.columns.iter().map(|c| c.name.to_lowercase()).collect(),
                )
            })
            .collect();
        let prompt_text = format_schema_for_prompt(&tables);
        Self {
            tables,
            index,
            prompt_text,
            source,
        }
    }

    /// Minimal schema that keeps the service answering ticket/user questions.
    pub fn fallback() -> SchemaRegistry {
        let col = |name: &str, data_type: &str, comment: &str| ColumnDef {
            name: name.to_string(),
            data_type: data_type.to_string(),
            comment: Some(comment.to_string()),
        };
        let tables = vec![
            TableDef {
                name: "hit_tickets".to_string(),
                columns: vec![
                    col("id", "int", "Primary key"),
                    col("hitticket_id", "varchar", "Unique ticket identifier"),
                    col("user_id", "int", "User who created the ticket"),
                    col("helping_person_id", "int", "Person assigned to help"),
                    col("status", "varchar", "Ticket status"),
                    col("taskPriority", "varchar", "Priority level"),
                    col("done_status", "tinyint", "1 when completed, NULL otherwise"),
                    col("is_inprogress", "tinyint", "1 when in progress"),
                    col("hold_status", "tinyint", "1 when on hold"),
                    col("created_at", "timestamp", "Creation timestamp"),
                ],
            },
            TableDef {
                name: "users".to_string(),
                columns: vec![
                    col("id", "bigint", "Primary key"),
                    col("user_name", "varchar", "Username"),
                    col("email", "varchar", "Email address"),
                    col("first_name", "varchar", "First name"),
                    col("last_name", "varchar", "Last name"),
                    col("department_id", "bigint", "Department ID"),
                    col("status", "tinyint", "Active status"),
                ],
            },
            TableDef {
                name: "departments".to_string(),
                columns: vec![
                    col("id", "bigint", "Primary key"),
                    col("name", "text", "Department name"),
                    col("status", "tinyint", "Active status"),
                ],
            },
        ];
        Self::from_tables(tables, SchemaSource::Fallback)
    }

    pub fn source(&self) -> SchemaSource {
        self.source
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// Lower-cased column names of `table`, or `None` for an unknown table.
    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.index.get(&table.to_lowercase()).map(|c| c.as_slice())
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

pub fn parse_sql_schema(sql: &str) -> Vec<TableDef> {
    TABLE_RE
        .captures_iter(sql)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let columns = parse_columns(caps.get(2)?.as_str());
            if columns.is_empty() {
                None
            } else {
                Some(TableDef { name, columns })
            }
        })
        .collect()
}

fn parse_columns(section: &str) -> Vec<ColumnDef> {
    const SKIP_PREFIXES: &[&str] = &["PRIMARY KEY", "KEY", "UNIQUE", "CONSTRAINT", "FOREIGN", "INDEX", "FULLTEXT"];

    section
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let upper = line.to_uppercase();
            !SKIP_PREFIXES.iter().any(|p| upper.starts_with(p))
        })
        .filter_map(|line| {
            let caps = COLUMN_RE.captures(line)?;
            let comment = COMMENT_RE
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            Some(ColumnDef {
                name: caps[1].to_string(),
                data_type: caps[2].to_string(),
                comment,
            })
        })
        .collect()
}

fn format_schema_for_prompt(tables: &[TableDef]) -> String {
    let mut blocks = vec![
        format!("=== COMMON TABLE RELATIONSHIPS ===\n{}", RELATIONSHIPS.join("\n")),
        "=== DATABASE TABLES ===".to_string(),
    ];

    for name in PRIORITY_TABLES {
        if let Some(table) = tables.iter().find(|t| t.name == *name) {
            blocks.push(table.render());
        }
    }

    blocks.extend(
        tables
            .iter()
            .filter(|t| !PRIORITY_TABLES.contains(&t.name.as_str()))
            .take(MAX_EXTRA_TABLES)
            .map(TableDef::render),
    );

    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"
CREATE TABLE `users` (
  `id` bigint(20) unsigned NOT NULL AUTO_INCREMENT,
  `first_name` varchar(255) DEFAULT NULL COMMENT 'Given name',
  `last_name` varchar(255) DEFAULT NULL,
  `department_id` bigint(20) DEFAULT NULL,
  `created_at` timestamp NULL DEFAULT NULL,
  PRIMARY KEY (`id`),
  KEY `users_department_id_index` (`department_id`),
  CONSTRAINT `users_dept_fk` FOREIGN KEY (`department_id`) REFERENCES `departments` (`id`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;

CREATE TABLE `audit_logs` (
  `id` int NOT NULL,
  `event` text,
  UNIQUE KEY `audit_event` (`event`(50))
) ENGINE=InnoDB;
"#;

    #[test]
    fn test_parses_tables_and_skips_keys() {
        let registry = SchemaRegistry::from_sql(DUMP);
        assert_eq!(registry.table_names(), vec!["users", "audit_logs"]);

        let users = registry.table("users").unwrap();
        assert_eq!(
            users.column_names(),
            vec!["id", "first_name", "last_name", "department_id", "created_at"]
        );
        assert_eq!(users.columns[0].data_type, "bigint(20)");
        assert_eq!(users.columns[1].comment.as_deref(), Some("Given name"));
        assert_eq!(registry.columns("AUDIT_LOGS").unwrap(), &["id".to_string(), "event".to_string()]);
        assert!(registry.columns("nope").is_none());
    }

    #[test]
    fn test_prompt_text_puts_priority_tables_first() {
        let registry = SchemaRegistry::from_sql(DUMP);
        let text = registry.prompt_text();
        let users_at = text.find("Table: users").unwrap();
        let audit_at = text.find("Table: audit_logs").unwrap();
        assert!(text.starts_with("=== COMMON TABLE RELATIONSHIPS ==="));
        assert!(users_at < audit_at);
        assert!(text.contains("  - first_name (varchar(255)) -- Given name"));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let registry = SchemaRegistry::load(Path::new("/definitely/not/here/pms.sql"));
        assert_eq!(registry.source(), SchemaSource::Fallback);
        assert!(registry.has_table("hit_tickets"));
        assert!(registry.columns("users").unwrap().contains(&"first_name".to_string()));
    }

    #[test]
    fn test_unparseable_file_falls_back() {
        let path = std::env::temp_dir().join(format!("pms_schema_{}.sql", uuid::Uuid::new_v4()));
        std::fs::write(&path, "this is not sql").unwrap();
        let registry = SchemaRegistry::load(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(registry.source(), SchemaSource::Fallback);
    }
}
