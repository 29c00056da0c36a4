//! Natural language → SQL → guard → execution → insight, over an explicit
//! per-session context.

use crate::ai::{
    analysis_prompt, chat_prompt, ChatRole, ChatTurn, GeneratedQuery, QueryGenerator, QueryRequest,
};
use crate::db::{DatabaseGateway, ExecutionResult, SlowQueryRecord};
use crate::error::{AssistantError, Result};
use crate::guard::SqlGuard;
use crate::storage::LocalDb;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Generated,
    Executed,
    Analyzing,
}

/// Everything one user session has produced so far. Each session owns its
/// own context; nothing in it is shared.
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    id: Uuid,
    state: PipelineState,
    request: Option<QueryRequest>,
    query: Option<GeneratedQuery>,
    result: Option<ExecutionResult>,
    insight: Option<String>,
    chat: Vec<ChatTurn>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: PipelineState::Idle,
            request: None,
            query: None,
            result: None,
            insight: None,
            chat: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn request(&self) -> Option<&QueryRequest> {
        self.request.as_ref()
    }

    pub fn query(&self) -> Option<&GeneratedQuery> {
        self.query.as_ref()
    }

    /// `None` means nothing has been executed since the last query change;
    /// a result with zero rows is `Some`.
    pub fn result(&self) -> Option<&ExecutionResult> {
        self.result.as_ref()
    }

    pub fn insight(&self) -> Option<&str> {
        self.insight.as_deref()
    }

    pub fn chat_history(&self) -> &[ChatTurn] {
        &self.chat
    }

    fn clear_downstream(&mut self) {
        self.result = None;
        self.insight = None;
        self.chat.clear();
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A slow statement together with the optimizer's advice, or the reason
/// there is none.
#[derive(Debug, Clone, Serialize)]
pub struct SlowQueryAdvice {
    pub record: SlowQueryRecord,
    pub suggestions: std::result::Result<String, String>,
}

pub struct Pipeline {
    generator: QueryGenerator,
    guard: SqlGuard,
    gateway: Arc<DatabaseGateway>,
    history: Option<LocalDb>,
}

impl Pipeline {
    pub fn new(generator: QueryGenerator, guard: SqlGuard, gateway: Arc<DatabaseGateway>) -> Self {
        Self {
            generator,
            guard,
            gateway,
            history: None,
        }
    }

    pub fn with_history(mut self, history: LocalDb) -> Self {
        self.history = Some(history);
        self
    }

    pub fn gateway(&self) -> &Arc<DatabaseGateway> {
        &self.gateway
    }

    pub fn history(&self) -> Option<&LocalDb> {
        self.history.as_ref()
    }

    /// Generate SQL for `request`. On failure the context is left untouched.
    pub async fn generate<'a>(
        &self,
        ctx: &'a mut SessionContext,
        request: QueryRequest,
    ) -> Result<&'a GeneratedQuery> {
        let query = self.generator.generate(&request).await?;

        if let Some(history) = &self.history {
            if let Err(e) = history.save_ai_prompt(&request.text, &query.sql).await {
                warn!("Failed to record prompt: {}", e);
            }
        }

        ctx.clear_downstream();
        ctx.request = Some(request);
        ctx.state = PipelineState::Generated;
        Ok(ctx.query.insert(query))
    }

    /// Replace the SQL awaiting execution, or start from hand-written SQL.
    pub fn edit_query<'a>(&self, ctx: &'a mut SessionContext, sql: &str) -> &'a GeneratedQuery {
        let query = match ctx.query.take() {
            Some(mut query) => {
                query.edit(sql);
                query
            }
            None => GeneratedQuery::manual(sql),
        };
        ctx.clear_downstream();
        ctx.state = PipelineState::Generated;
        ctx.query.insert(query)
    }

    /// Guard and execute the current query. A rejected or failed query stays
    /// in the context so it can be edited and resubmitted.
    pub async fn execute<'a>(&self, ctx: &'a mut SessionContext) -> Result<&'a ExecutionResult> {
        let sql = ctx
            .query
            .as_ref()
            .map(|q| q.sql.clone())
            .ok_or_else(|| AssistantError::InvalidState("No query to execute. Generate or enter SQL first.".into()))?;

        self.guard.check(&sql)?;

        let outcome = self.gateway.execute(&sql).await;
        self.record_history(ctx.id, &sql, &outcome).await;

        let result = outcome?;
        ctx.insight = None;
        ctx.chat.clear();
        ctx.state = PipelineState::Executed;
        Ok(ctx.result.insert(result))
    }

    /// Ask the backend for insights about the last result.
    pub async fn analyze<'a>(&self, ctx: &'a mut SessionContext) -> Result<&'a str> {
        let prompt = {
            let (sql, result) = Self::executed(ctx)?;
            analysis_prompt(sql, result)
        };

        let previous = ctx.state;
        ctx.state = PipelineState::Analyzing;
        match self.generator.analyze_result(&prompt).await {
            Ok(insight) => {
                info!("Generated insight ({} chars)", insight.len());
                let insight: &'a String = ctx.insight.insert(insight);
                Ok(insight.as_str())
            }
            Err(e) => {
                ctx.state = previous;
                Err(e)
            }
        }
    }

    /// One follow-up question about the last result. Both turns are kept in
    /// the chat history only when the backend answers.
    pub async fn ask(&self, ctx: &mut SessionContext, question: &str) -> Result<String> {
        let prompt = {
            let (sql, result) = Self::executed(ctx)?;
            chat_prompt(sql, result, &ctx.chat, question)
        };

        let answer = self.generator.chat(&prompt).await?;
        ctx.chat.push(ChatTurn::new(ChatRole::User, question));
        ctx.chat.push(ChatTurn::new(ChatRole::Assistant, answer.clone()));
        ctx.state = PipelineState::Analyzing;
        Ok(answer)
    }

    pub async fn optimize(&self, sql: &str) -> Result<String> {
        self.generator.optimize_query(sql).await
    }

    /// Slow statements from the database, each with optimization advice.
    /// Never fails: missing diagnostics produce an empty report.
    pub async fn slow_query_report(&self) -> Vec<SlowQueryAdvice> {
        let records = self.gateway.slow_queries().await;
        let mut report = Vec::with_capacity(records.len());
        for record in records {
            let suggestions = self
                .generator
                .optimize_query(&record.sql_text)
                .await
                .map_err(|e| e.to_string());
            report.push(SlowQueryAdvice { record, suggestions });
        }
        report
    }

    fn executed(ctx: &SessionContext) -> Result<(&str, &ExecutionResult)> {
        match (&ctx.query, &ctx.result) {
            (Some(query), Some(result)) => Ok((query.sql.as_str(), result)),
            _ => Err(AssistantError::InvalidState(
                "No result to analyze. Execute a query first.".into(),
            )),
        }
    }

    async fn record_history(&self, session_id: Uuid, sql: &str, outcome: &Result<ExecutionResult>) {
        let Some(history) = &self.history else {
            return;
        };
        let session_id = session_id.to_string();
        let saved = match outcome {
            Ok(result) => {
                history
                    .add_history(
                        &session_id,
                        sql,
                        result.execution_time_ms as i64,
                        result.row_count as i64,
                        true,
                        None,
                    )
                    .await
            }
            Err(e) => {
                let error_msg = e.to_string();
                history
                    .add_history(&session_id, sql, 0, 0, false, Some(&error_msg))
                    .await
            }
        };
        if let Err(e) = saved {
            warn!("Failed to record query history: {}", e);
        }
    }
}
