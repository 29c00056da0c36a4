//! Line-oriented terminal front end over [`commands`](crate::commands).

use crate::ai::cell_text;
use crate::commands::{self, AppState};
use crate::db::ExecutionResult;
use crate::pipeline::SessionContext;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, Lines};

const MAX_CELL_WIDTH: usize = 40;

const HELP: &str = "\
Type a request in plain language to generate SQL, or use a command:
  \\sql <statement>      replace the current SQL with your own
  \\run                  check and execute the current SQL
  \\analyze              generate insights about the last result
  \\ask <question>       ask a follow-up question about the last result
  \\optimize             suggest optimizations for the current SQL
  \\slow                 list slow statements with optimization advice
  \\schema [name]        set or clear the target schema hint
  \\history              show recently executed queries
  \\prompts <text>       search previous requests
  \\connect <user> <pw>  connect to the database
  \\disconnect           close the database connection
  \\state                show the session state
  \\help                 show this help
  \\quit                 exit";

#[derive(Parser, Debug, Default)]
#[command(
    name = "sqlpilot",
    version,
    about = "Ask a PostgreSQL database questions in plain language"
)]
pub struct Args {
    /// Database descriptor, host:port/database (overrides DATABASE_DSN)
    #[arg(long)]
    pub dsn: Option<String>,

    /// Database user to connect as on startup
    #[arg(long, short)]
    pub user: Option<String>,

    /// Completion provider: groq, openai or anthropic
    #[arg(long)]
    pub provider: Option<String>,

    /// Model identifier for the completion provider
    #[arg(long)]
    pub model: Option<String>,

    /// Schema hint sent with every request
    #[arg(long)]
    pub schema: Option<String>,

    /// Path of the local history database
    #[arg(long)]
    pub history_db: Option<PathBuf>,

    /// Do not record query history
    #[arg(long)]
    pub no_history: bool,
}

impl Args {
    /// Value a flag supplies for an environment key, if any.
    pub fn env_override(&self, key: &str) -> Option<String> {
        match key {
            "DATABASE_DSN" => self.dsn.clone(),
            "SQLPILOT_AI_PROVIDER" => self.provider.clone(),
            "SQLPILOT_AI_MODEL" => self.model.clone(),
            "SQLPILOT_HISTORY_DB" if self.no_history => Some("off".into()),
            "SQLPILOT_HISTORY_DB" => self
                .history_db
                .as_ref()
                .map(|p| p.display().to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Empty,
    Generate(String),
    Edit(String),
    Run,
    Analyze,
    Ask(String),
    Optimize,
    Slow,
    Schema(Option<String>),
    History,
    Prompts(String),
    Connect { user: String, password: String },
    Disconnect,
    State,
    Help,
    Quit,
    Unknown(String),
}

impl ShellCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ShellCommand::Empty;
        }
        let Some(command) = line.strip_prefix('\\') else {
            return ShellCommand::Generate(line.to_string());
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "sql" | "edit" => ShellCommand::Edit(rest.to_string()),
            "run" | "execute" => ShellCommand::Run,
            "analyze" => ShellCommand::Analyze,
            "ask" => ShellCommand::Ask(rest.to_string()),
            "optimize" => ShellCommand::Optimize,
            "slow" => ShellCommand::Slow,
            "schema" => ShellCommand::Schema((!rest.is_empty()).then(|| rest.to_string())),
            "history" => ShellCommand::History,
            "prompts" => ShellCommand::Prompts(rest.to_string()),
            "connect" => match rest.split_once(char::is_whitespace) {
                Some((user, password)) => ShellCommand::Connect {
                    user: user.to_string(),
                    password: password.trim().to_string(),
                },
                None => ShellCommand::Unknown("usage: \\connect <user> <password>".into()),
            },
            "disconnect" => ShellCommand::Disconnect,
            "state" => ShellCommand::State,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" | "q" => ShellCommand::Quit,
            other => ShellCommand::Unknown(format!("unknown command \\{}", other)),
        }
    }
}

/// Aligned text table for a result, or the message shown when there is
/// nothing to tabulate.
pub fn render_table(result: &ExecutionResult) -> String {
    if result.columns.is_empty() {
        return "Statement executed; it returned no columns.".into();
    }
    if result.is_empty() {
        return "Query executed successfully but returned no rows.".into();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(|v| clip(&cell_text(v))).collect())
        .collect();

    let mut widths: Vec<usize> = result
        .columns
        .iter()
        .map(|c| c.name.chars().count())
        .collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let format_line = |values: Vec<&str>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:<width$} ", v, width = *w))
            .collect::<Vec<_>>()
            .join("|")
            .trim_end()
            .to_string()
    };

    let mut out = format_line(result.column_names());
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+"),
    );
    out.push('\n');
    for row in &cells {
        out.push_str(&format_line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out.push_str(&format!(
        "({} row{}, {} ms)",
        result.row_count,
        if result.row_count == 1 { "" } else { "s" },
        result.execution_time_ms
    ));
    out
}

fn clip(s: &str) -> String {
    let single_line = s.replace('\n', " ");
    if single_line.chars().count() <= MAX_CELL_WIDTH {
        single_line
    } else {
        let mut clipped: String = single_line.chars().take(MAX_CELL_WIDTH - 3).collect();
        clipped.push_str("...");
        clipped
    }
}

/// One interactive session: a [`SessionContext`] plus shell-only settings.
pub struct Shell<'a> {
    state: &'a AppState,
    ctx: SessionContext,
    schema: Option<String>,
}

impl<'a> Shell<'a> {
    pub fn new(state: &'a AppState, schema: Option<String>) -> Self {
        Self {
            state,
            ctx: SessionContext::new(),
            schema,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Read commands until end of input or `\quit`.
    pub async fn run<R, W>(&mut self, lines: &mut Lines<R>, out: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        writeln!(out, "Type \\help for commands.")?;
        loop {
            write!(out, "sqlpilot> ")?;
            out.flush()?;
            let Some(line) = lines.next_line().await? else {
                writeln!(out)?;
                return Ok(());
            };
            if !self.handle(ShellCommand::parse(&line), out).await? {
                return Ok(());
            }
        }
    }

    /// Execute one command. Returns `false` when the shell should exit.
    pub async fn handle<W: Write>(&mut self, command: ShellCommand, out: &mut W) -> io::Result<bool> {
        let state = self.state;
        match command {
            ShellCommand::Empty => {}
            ShellCommand::Generate(prompt) => {
                match commands::nl_to_sql(state, &mut self.ctx, &prompt, self.schema.as_deref()).await {
                    Ok(sql) => writeln!(
                        out,
                        "Generated SQL:\n{}\n(\\run to execute, \\sql to edit)",
                        sql
                    )?,
                    Err(e) => writeln!(out, "Error: {}", e)?,
                }
            }
            ShellCommand::Edit(sql) => match commands::edit_sql(state, &mut self.ctx, &sql) {
                Ok(sql) => writeln!(out, "Current SQL:\n{}", sql)?,
                Err(e) => writeln!(out, "Error: {}", e)?,
            },
            ShellCommand::Run => match commands::execute_query(state, &mut self.ctx).await {
                Ok(result) => writeln!(out, "{}", render_table(result))?,
                Err(e) => writeln!(out, "Error: {}", e)?,
            },
            ShellCommand::Analyze => match commands::ai_analyze(state, &mut self.ctx).await {
                Ok(insight) => writeln!(out, "Insights:\n{}", insight)?,
                Err(e) => writeln!(out, "Error: {}", e)?,
            },
            ShellCommand::Ask(question) => {
                match commands::ai_chat(state, &mut self.ctx, &question).await {
                    Ok(answer) => writeln!(out, "{}", answer)?,
                    Err(e) => writeln!(out, "Error: {}", e)?,
                }
            }
            ShellCommand::Optimize => match commands::ai_optimize(state, &self.ctx).await {
                Ok(suggestions) => writeln!(out, "Optimization Suggestions:\n{}", suggestions)?,
                Err(e) => writeln!(out, "Error: {}", e)?,
            },
            ShellCommand::Slow => {
                let report = commands::slow_queries(state).await;
                if report.is_empty() {
                    writeln!(out, "No slow queries found.")?;
                }
                for advice in report {
                    writeln!(
                        out,
                        "Query {} ({:.0} ms total, {} executions)\n{}",
                        advice.record.sql_id,
                        advice.record.elapsed_ms,
                        advice.record.executions,
                        advice.record.sql_text
                    )?;
                    match advice.suggestions {
                        Ok(text) => writeln!(out, "Optimization Suggestions:\n{}\n", text)?,
                        Err(e) => writeln!(out, "No suggestions: {}\n", e)?,
                    }
                }
            }
            ShellCommand::Schema(schema) => {
                match &schema {
                    Some(name) => writeln!(out, "Schema hint set to {}", name)?,
                    None => writeln!(out, "Schema hint cleared")?,
                }
                self.schema = schema;
            }
            ShellCommand::History => match commands::get_query_history(state, None).await {
                Ok(entries) if entries.is_empty() => writeln!(out, "No queries recorded yet.")?,
                Ok(entries) => {
                    for entry in entries {
                        let status = if entry.success {
                            format!("{} rows, {} ms", entry.row_count, entry.execution_time_ms)
                        } else {
                            format!("failed: {}", entry.error_message.unwrap_or_default())
                        };
                        writeln!(out, "[{}] {} ({})", entry.created_at, entry.sql, status)?;
                    }
                }
                Err(e) => writeln!(out, "Error: {}", e)?,
            },
            ShellCommand::Prompts(text) => match commands::search_ai_prompts(state, &text, None).await {
                Ok(found) if found.is_empty() => writeln!(out, "No matching requests.")?,
                Ok(found) => {
                    for suggestion in found {
                        writeln!(out, "{}\n  -> {}", suggestion.prompt, suggestion.generated_sql)?;
                    }
                }
                Err(e) => writeln!(out, "Error: {}", e)?,
            },
            ShellCommand::Connect { user, password } => {
                match commands::connect(state, &user, &password).await {
                    Ok(message) => writeln!(out, "{}", message)?,
                    Err(e) => writeln!(out, "Connection failed: {}", e)?,
                }
            }
            ShellCommand::Disconnect => {
                commands::disconnect(state).await;
                writeln!(out, "Disconnected")?;
            }
            ShellCommand::State => {
                let connected = commands::is_connected(state).await;
                writeln!(
                    out,
                    "session {} | state {:?} | {} | schema {}",
                    self.ctx.id(),
                    self.ctx.state(),
                    if connected { "connected" } else { "disconnected" },
                    self.schema.as_deref().unwrap_or("-")
                )?;
                if let Some(query) = self.ctx.query() {
                    writeln!(out, "SQL{}: {}", if query.edited { " (edited)" } else { "" }, query.sql)?;
                }
            }
            ShellCommand::Help => writeln!(out, "{}", HELP)?,
            ShellCommand::Quit => return Ok(false),
            ShellCommand::Unknown(message) => writeln!(out, "{} (\\help for commands)", message)?,
        }
        Ok(true)
    }
}
