use crate::ai::cloud_api::{CompletionBackend, CompletionRequest};
use crate::error::{AssistantError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_TEMPERATURE: f32 = 0.2;

const SQL_SYSTEM_PROMPT: &str = "\
You are a PostgreSQL expert that translates requests into SQL.

Rules:
- Output exactly one SELECT statement. Never write INSERT, UPDATE, DELETE, DDL or procedure calls.
- Always qualify tables with their schema (schema_name.table_name).
- Write every SQL keyword in UPPERCASE.
- Use ANSI JOIN syntax (INNER JOIN ... ON ...) instead of comma joins.
- Start each clause (SELECT, FROM, WHERE, GROUP BY, ORDER BY) on a new line.
- End the statement with a semicolon.
- Do not add backslashes before special characters such as underscores.
- Output only SQL: no explanations, no comments, no markdown code fences.
- If the schema or table is not given, make a reasonable assumption and still return valid SQL.

Example:
SELECT E.EMPLOYEE_ID, E.FIRST_NAME, D.DEPARTMENT_NAME
FROM HR.EMPLOYEES E
INNER JOIN HR.DEPARTMENTS D ON E.DEPARTMENT_ID = D.DEPARTMENT_ID
WHERE E.SALARY > 5000;";

const OPTIMIZE_SYSTEM_PROMPT: &str = "\
You are a PostgreSQL performance expert. Suggest query optimizations, \
missing indexes, and better query patterns. Respond with the improved SQL \
first, then a brief explanation.";

const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are a data analyst. You receive a SQL query and the rows it returned. \
Base every statement on the data shown and say so when the data is \
insufficient to answer.";

/// A natural-language request, optionally pointed at one schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub text: String,
    pub schema_hint: Option<String>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            schema_hint: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_hint = Some(schema.into());
        self
    }
}

/// SQL awaiting execution. `origin` is `None` for SQL the user typed directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedQuery {
    pub sql: String,
    pub origin: Option<QueryRequest>,
    pub edited: bool,
}

impl GeneratedQuery {
    pub fn manual(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            origin: None,
            edited: true,
        }
    }

    pub fn edit(&mut self, sql: impl Into<String>) {
        self.sql = sql.into();
        self.edited = true;
    }
}

pub struct QueryGenerator {
    backend: Arc<dyn CompletionBackend>,
    temperature: f32,
}

impl QueryGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Translate `request` into a single `SELECT` statement.
    pub async fn generate(&self, request: &QueryRequest) -> Result<GeneratedQuery> {
        let mut user = format!("Convert to SQL: {}", request.text.trim());
        if let Some(schema) = &request.schema_hint {
            user.push_str(&format!("\nTarget schema: {}", schema));
        }

        let raw = self.ask(SQL_SYSTEM_PROMPT, user).await?;
        let sql = clean_sql(&raw)?;
        debug!("Generated SQL: {}", sql);
        info!("Generated SQL for request ({} chars)", request.text.len());

        Ok(GeneratedQuery {
            sql,
            origin: Some(request.clone()),
            edited: false,
        })
    }

    pub async fn optimize_query(&self, sql: &str) -> Result<String> {
        self.ask(
            OPTIMIZE_SYSTEM_PROMPT,
            format!("Optimize this query:\n\n```sql\n{sql}\n```"),
        )
        .await
    }

    /// Free-text insight for a prompt built by [`analysis_prompt`](crate::ai::analysis_prompt).
    pub async fn analyze_result(&self, prompt: &str) -> Result<String> {
        self.ask(ANALYSIS_SYSTEM_PROMPT, prompt.to_string()).await
    }

    /// Answer for a prompt built by [`chat_prompt`](crate::ai::chat_prompt).
    pub async fn chat(&self, prompt: &str) -> Result<String> {
        self.ask(ANALYSIS_SYSTEM_PROMPT, prompt.to_string()).await
    }

    async fn ask(&self, system: &str, user: String) -> Result<String> {
        let request = CompletionRequest {
            system: system.to_string(),
            user,
            temperature: self.temperature,
        };
        let text = self.backend.complete(&request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AssistantError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

/// Turn a raw completion into one terminated `SELECT` statement.
fn clean_sql(raw: &str) -> Result<String> {
    let without_fences = strip_code_fences(raw);
    // Backslashes are escaping artefacts of the model, not SQL.
    let sql = without_fences.replace('\\', "");
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(AssistantError::EmptyResponse);
    }

    let starts_with_select = sql
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("select"))
        .unwrap_or(false);
    if !starts_with_select {
        let preview: String = sql.chars().take(80).collect();
        return Err(AssistantError::UnusableResponse(preview));
    }

    // Anything after the first statement is commentary from the model.
    let statement = match first_terminator(sql) {
        Some(end) => {
            let rest = sql[end + 1..].trim();
            if !rest.is_empty() {
                debug!("Dropped {} chars after the statement", rest.len());
            }
            &sql[..end]
        }
        None => sql,
    };
    Ok(format!("{};", statement.trim_end()))
}

/// Byte offset of the first `;` outside quotes and `--` comments.
fn first_terminator(sql: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut in_comment = false;
    let mut chars = sql.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if in_comment {
            in_comment = c != '\n';
            continue;
        }
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '-' if matches!(chars.peek(), Some((_, '-'))) => in_comment = true,
                ';' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Strip markdown code fences from AI responses (```sql ... ``` or ``` ... ```)
fn strip_code_fences(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip optional language tag on the first line
        let rest = if let Some(pos) = rest.find('\n') {
            &rest[pos + 1..]
        } else {
            rest
        };
        let rest = rest.trim_end();
        let rest = rest.strip_suffix("```").unwrap_or(rest);
        rest.trim().to_string()
    } else {
        trimmed.to_string()
    }
}
