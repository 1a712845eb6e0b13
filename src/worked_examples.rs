//! Curated natural-language -> SQL pairs for the PMS schema.
//!
//! Embedded in the SQL generation prompt and indexed into the `examples`
//! RAG collection. They encode the business conventions the raw schema
//! does not show: tickets are owned by `helping_person_id`, completion is
//! `done_status = 1`, pending is `done_status IS NULL AND is_inprogress = 0`.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkedExample {
    pub category: &'static str,
    pub question: &'static str,
    pub sql: &'static str,
}

impl WorkedExample {
    pub fn id(&self, index: usize) -> String {
        format!("example_{}_{}", index, self.category)
    }

    pub fn render(&self) -> String {
        format!("Q: \"{}\"\nA: {}", self.question, self.sql)
    }
}

pub const WORKED_EXAMPLES: &[WorkedExample] = &[
    WorkedExample {
        category: "tickets",
        question: "How many help tickets are pending by all users, give names",
        sql: "SELECT CONCAT(u.first_name, ' ', u.last_name) AS user_name, \
COUNT(CASE WHEN h.done_status IS NULL AND h.is_inprogress = 0 THEN 1 END) AS pending_tickets \
FROM users u LEFT JOIN hit_tickets h ON u.id = h.helping_person_id \
GROUP BY u.id, u.first_name, u.last_name ORDER BY pending_tickets DESC LIMIT 100",
    },
    WorkedExample {
        category: "tickets",
        question: "Show me high priority tickets",
        sql: "SELECT h.hitticket_id, CONCAT(u.first_name, ' ', u.last_name) AS assigned_to, h.taskPriority, h.created_at \
FROM hit_tickets h LEFT JOIN users u ON h.helping_person_id = u.id \
WHERE h.taskPriority = 'high' ORDER BY h.created_at DESC LIMIT 100",
    },
    WorkedExample {
        category: "tickets",
        question: "Who has the most pending help tickets",
        sql: "SELECT CONCAT(u.first_name, ' ', u.last_name) AS user_name, COUNT(*) AS pending_count \
FROM hit_tickets h JOIN users u ON h.helping_person_id = u.id \
WHERE h.done_status IS NULL AND h.is_inprogress = 0 \
GROUP BY u.id, u.first_name, u.last_name ORDER BY pending_count DESC LIMIT 10",
    },
    WorkedExample {
        category: "tickets",
        question: "Ticket status breakdown for a user",
        sql: "SELECT CONCAT(u.first_name, ' ', u.last_name) AS user_name, \
SUM(CASE WHEN h.is_inprogress = 1 THEN 1 ELSE 0 END) AS in_progress, \
SUM(CASE WHEN h.done_status = 1 THEN 1 ELSE 0 END) AS completed, \
SUM(CASE WHEN h.hold_status = 1 THEN 1 ELSE 0 END) AS on_hold, \
SUM(CASE WHEN h.done_status IS NULL AND h.is_inprogress = 0 AND h.hold_status IS NULL THEN 1 ELSE 0 END) AS pending \
FROM users u LEFT JOIN hit_tickets h ON u.id = h.helping_person_id \
WHERE u.first_name LIKE '%name%' GROUP BY u.id, u.first_name, u.last_name",
    },
    WorkedExample {
        category: "workflows",
        question: "Show me all active FMS workflows",
        sql: "SELECT fm.id, fm.name AS workflow_name, fm.created_at, CONCAT(u.first_name, ' ', u.last_name) AS created_by \
FROM fms_masters fm LEFT JOIN users u ON fm.created_by = u.id \
WHERE fm.status = 1 ORDER BY fm.created_at DESC LIMIT 100",
    },
    WorkedExample {
        category: "workflows",
        question: "Which step is the hiring process on",
        sql: "SELECT fm.name AS workflow_name, fs.name AS current_step, fep.status, fep.progress_percentage \
FROM fms_entries fe JOIN fms_masters fm ON fe.fms_id = fm.id \
JOIN fms_entry_progress fep ON fe.id = fep.fms_entry_id \
JOIN fms_steps fs ON fep.fms_step_id = fs.id \
WHERE fm.name LIKE '%hiring%' ORDER BY fe.created_at DESC LIMIT 10",
    },
    WorkedExample {
        category: "workflows",
        question: "FMS entries created this month",
        sql: "SELECT fe.id, fm.name AS workflow_name, fe.created_at \
FROM fms_entries fe JOIN fms_masters fm ON fe.fms_id = fm.id \
WHERE MONTH(fe.created_at) = MONTH(CURDATE()) AND YEAR(fe.created_at) = YEAR(CURDATE()) \
ORDER BY fe.created_at DESC LIMIT 100",
    },
    WorkedExample {
        category: "recurring",
        question: "Show all active recurring tasks",
        sql: "SELECT rmt.id, rmt.title, rmt.frequency, CONCAT(u.first_name, ' ', u.last_name) AS assigned_to, rmt.created_at \
FROM recurring_master_tasks rmt LEFT JOIN users u ON rmt.assigned_to = u.id \
WHERE rmt.status = 1 AND rmt.deleted_at IS NULL ORDER BY rmt.created_at DESC LIMIT 100",
    },
    WorkedExample {
        category: "recurring",
        question: "List all overdue recurring tasks",
        sql: "SELECT rmt.id, rmt.title, CONCAT(u.first_name, ' ', u.last_name) AS assigned_to, rmt.due_date, \
DATEDIFF(CURDATE(), rmt.due_date) AS days_overdue \
FROM recurring_master_tasks rmt LEFT JOIN users u ON rmt.assigned_to = u.id \
WHERE rmt.due_date < CURDATE() AND rmt.status = 1 AND rmt.deleted_at IS NULL \
ORDER BY rmt.due_date ASC LIMIT 100",
    },
    WorkedExample {
        category: "users",
        question: "List all users in IT department",
        sql: "SELECT u.id, CONCAT(u.first_name, ' ', u.last_name) AS user_name, u.email, d.name AS department \
FROM users u JOIN departments d ON u.department_id = d.id \
WHERE d.name LIKE '%IT%' ORDER BY u.first_name ASC LIMIT 100",
    },
    WorkedExample {
        category: "users",
        question: "Who is the team lead of Sales",
        sql: "SELECT CONCAT(u.first_name, ' ', u.last_name) AS user_name, u.email, des.name AS designation, d.name AS department \
FROM users u JOIN departments d ON u.department_id = d.id \
LEFT JOIN designations des ON u.designation_id = des.id \
WHERE d.name LIKE '%Sales%' AND (des.name LIKE '%lead%' OR des.name LIKE '%manager%') LIMIT 10",
    },
    WorkedExample {
        category: "users",
        question: "How many users are in each department",
        sql: "SELECT d.name AS department, COUNT(u.id) AS user_count \
FROM departments d LEFT JOIN users u ON d.id = u.department_id \
WHERE d.status = 1 GROUP BY d.id, d.name ORDER BY user_count DESC",
    },
    WorkedExample {
        category: "general",
        question: "What are the most common ticket priorities",
        sql: "SELECT taskPriority AS priority, COUNT(*) AS ticket_count \
FROM hit_tickets GROUP BY taskPriority ORDER BY ticket_count DESC",
    },
];

/// Suggested questions shown by the examples endpoint, keyed by category.
pub fn example_queries() -> BTreeMap<&'static str, Vec<&'static str>> {
    let mut groups = BTreeMap::new();
    groups.insert(
        "hit_tickets",
        vec![
            "How many help tickets are pending by all users, give names",
            "Show me high priority tickets",
            "Which tickets are overdue?",
            "List all completed tickets from last week",
            "Who has the most pending help tickets?",
        ],
    );
    groups.insert(
        "fms_workflows",
        vec![
            "Show me all active workflows",
            "What's the current step in the hiring process?",
            "How many purchase orders are pending?",
            "List all workflows created this month",
            "Which workflows have the highest efficiency?",
        ],
    );
    groups.insert(
        "recurring_tasks",
        vec![
            "Show all active recurring tasks",
            "List all overdue recurring tasks",
            "High priority recurring tasks due this week",
        ],
    );
    groups.insert(
        "users",
        vec![
            "List all users in IT department",
            "Who is the team lead of Sales?",
            "Show me inactive users",
            "How many users are in each department?",
            "List all users with their designations",
        ],
    );
    groups.insert(
        "general",
        vec![
            "Show me department-wise user count",
            "What are the most common ticket priorities?",
            "List all active departments",
        ],
    );
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_examples_are_read_only_and_limited_by_shape() {
        for example in WORKED_EXAMPLES {
            assert!(example.sql.trim_start().to_uppercase().starts_with("SELECT"), "{}", example.question);
        }
    }

    #[test]
    fn test_all_users_example_uses_left_join() {
        let example = WORKED_EXAMPLES
            .iter()
            .find(|e| e.question.contains("pending by all users"))
            .unwrap();
        assert!(example.sql.contains("LEFT JOIN hit_tickets"));
    }

    #[test]
    fn test_example_groups() {
        let groups = example_queries();
        assert_eq!(groups.len(), 5);
        assert!(groups["recurring_tasks"].iter().all(|q| q.to_lowercase().contains("recurring")));
    }
}
