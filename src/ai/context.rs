use crate::db::ExecutionResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rows of a result included in any prompt. The rest is summarised by count.
pub const MAX_CONTEXT_ROWS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Result data as a pipe-separated table, capped at `max_rows` rows.
pub fn result_as_text(result: &ExecutionResult, max_rows: usize) -> String {
    if result.columns.is_empty() {
        return "(statement returned no columns)\n".into();
    }

    let mut out = result.column_names().join(" | ");
    out.push('\n');
    for row in result.rows.iter().take(max_rows) {
        let cells: Vec<String> = row.iter().map(cell_text).collect();
        out.push_str(&cells.join(" | "));
        out.push('\n');
    }
    if result.rows.len() > max_rows {
        out.push_str(&format!(
            "... {} more row(s) not shown\n",
            result.rows.len() - max_rows
        ));
    }
    if result.rows.is_empty() {
        out.push_str("(no rows)\n");
    }
    out
}

pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".into(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Prompt asking for insights about a result set.
pub fn analysis_prompt(sql: &str, result: &ExecutionResult) -> String {
    format!(
        "The following SQL query was executed:\n\n```sql\n{sql}\n```\n\n\
         It returned {} row(s) with columns: {}.\n\nData:\n{}\n\
         Summarise the key findings: notable values, trends, outliers and \
         anything that deserves a follow-up query. Be concise.",
        result.row_count,
        result.column_names().join(", "),
        result_as_text(result, MAX_CONTEXT_ROWS),
    )
}

/// Prompt for one follow-up question, carrying the query, the data and the
/// conversation so far.
pub fn chat_prompt(sql: &str, result: &ExecutionResult, history: &[ChatTurn], question: &str) -> String {
    let mut prompt = format!(
        "Query:\n```sql\n{sql}\n```\n\nResult ({} row(s)):\n{}\n",
        result.row_count,
        result_as_text(result, MAX_CONTEXT_ROWS),
    );

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in history {
            let who = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", who, turn.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Question: {question}"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnDef, RawResult};
    use serde_json::json;

    fn result_with_rows(n: usize) -> ExecutionResult {
        ExecutionResult::from_raw(
            RawResult {
                columns: Some(vec![
                    ColumnDef::new("ID", "integer"),
                    ColumnDef::new("CITY", "text"),
                ]),
                rows: (0..n)
                    .map(|i| vec![json!(i), if i == 0 { Value::Null } else { json!("Oslo") }])
                    .collect(),
            },
            3,
        )
    }

    #[test]
    fn table_text_is_capped() {
        let text = result_as_text(&result_with_rows(5), 2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID | CITY");
        assert_eq!(lines[1], "0 | NULL");
        assert_eq!(lines[2], "1 | Oslo");
        assert_eq!(lines[3], "... 3 more row(s) not shown");
    }

    #[test]
    fn empty_results_are_labelled() {
        assert!(result_as_text(&result_with_rows(0), 10).contains("(no rows)"));
        assert!(result_as_text(&ExecutionResult::default(), 10).contains("no columns"));
    }

    #[test]
    fn analysis_prompt_mentions_query_and_columns() {
        let prompt = analysis_prompt("SELECT ID, CITY FROM HR.LOCATIONS;", &result_with_rows(2));
        assert!(prompt.contains("SELECT ID, CITY FROM HR.LOCATIONS;"));
        assert!(prompt.contains("2 row(s) with columns: ID, CITY"));
    }

    #[test]
    fn chat_prompt_replays_history() {
        let history = vec![
            ChatTurn::new(ChatRole::User, "Which city is most common?"),
            ChatTurn::new(ChatRole::Assistant, "Oslo."),
        ];
        let prompt = chat_prompt("SELECT 1;", &result_with_rows(1), &history, "Why?");
        assert!(prompt.contains("User: Which city is most common?"));
        assert!(prompt.contains("Assistant: Oslo."));
        assert!(prompt.ends_with("Question: Why?"));
    }
}
