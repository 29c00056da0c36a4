use crate::ai::QueryRequest;
use crate::db::ExecutionResult;
use crate::pipeline::{Pipeline, SessionContext, SlowQueryAdvice};
use crate::storage::{PromptSuggestion, QueryHistoryEntry};

/// Shared application state handed to every command.
pub struct AppState {
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}

pub async fn connect(state: &AppState, username: &str, password: &str) -> Result<String, String> {
    let gateway = state.pipeline.gateway();
    gateway
        .connect(username, password)
        .await
        .map_err(|e| e.to_string())?;
    Ok(format!("Connected to {} as {}", gateway.dsn(), username))
}

pub async fn disconnect(state: &AppState) {
    state.pipeline.gateway().close().await;
}

pub async fn is_connected(state: &AppState) -> bool {
    state.pipeline.gateway().is_connected().await
}

pub async fn nl_to_sql(
    state: &AppState,
    ctx: &mut SessionContext,
    prompt: &str,
    schema: Option<&str>,
) -> Result<String, String> {
    if prompt.trim().is_empty() {
        return Err("Enter a request first.".into());
    }
    let mut request = QueryRequest::new(prompt);
    if let Some(schema) = schema {
        request = request.with_schema(schema);
    }
    state
        .pipeline
        .generate(ctx, request)
        .await
        .map(|q| q.sql.clone())
        .map_err(|e| e.to_string())
}

pub fn edit_sql(state: &AppState, ctx: &mut SessionContext, sql: &str) -> Result<String, String> {
    if sql.trim().is_empty() {
        return Err("SQL text is empty.".into());
    }
    Ok(state.pipeline.edit_query(ctx, sql).sql.clone())
}

pub async fn execute_query<'a>(
    state: &AppState,
    ctx: &'a mut SessionContext,
) -> Result<&'a ExecutionResult, String> {
    state.pipeline.execute(ctx).await.map_err(|e| e.to_string())
}

pub async fn ai_analyze(state: &AppState, ctx: &mut SessionContext) -> Result<String, String> {
    state
        .pipeline
        .analyze(ctx)
        .await
        .map(str::to_string)
        .map_err(|e| e.to_string())
}

pub async fn ai_chat(
    state: &AppState,
    ctx: &mut SessionContext,
    message: &str,
) -> Result<String, String> {
    if message.trim().is_empty() {
        return Err("Ask a question about the result.".into());
    }
    state
        .pipeline
        .ask(ctx, message)
        .await
        .map_err(|e| e.to_string())
}

pub async fn ai_optimize(state: &AppState, ctx: &SessionContext) -> Result<String, String> {
    let query = ctx
        .query()
        .ok_or_else(|| "No query to optimize. Generate or enter SQL first.".to_string())?;
    state
        .pipeline
        .optimize(&query.sql)
        .await
        .map_err(|e| e.to_string())
}

pub async fn slow_queries(state: &AppState) -> Vec<SlowQueryAdvice> {
    state.pipeline.slow_query_report().await
}

pub async fn get_query_history(
    state: &AppState,
    limit: Option<i64>,
) -> Result<Vec<QueryHistoryEntry>, String> {
    let history = state
        .pipeline
        .history()
        .ok_or_else(|| "Query history is disabled.".to_string())?;
    history
        .get_history(limit.unwrap_or(20))
        .await
        .map_err(|e| e.to_string())
}

pub async fn search_ai_prompts(
    state: &AppState,
    query: &str,
    limit: Option<i64>,
) -> Result<Vec<PromptSuggestion>, String> {
    let history = state
        .pipeline
        .history()
        .ok_or_else(|| "Query history is disabled.".to_string())?;
    history
        .search_ai_prompts(query, limit.unwrap_or(10))
        .await
        .map_err(|e| e.to_string())
}
