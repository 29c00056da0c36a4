//! Pre-execution policy for generated or hand-edited SQL.
//!
//! The guard works on the literal text with regular expressions. It is not a
//! SQL parser: it can reject legitimate queries (a string literal containing
//! the word `delete`) and it can miss crafted input that hides a statement
//! from the patterns. `SELECT ... INTO` is refused because PostgreSQL treats
//! it as `CREATE TABLE AS`. Connect with a read-only database role as well.

use crate::error::{AssistantError, Result};
use regex::Regex;
use tracing::warn;

struct Rule {
    pattern: Regex,
    reason: &'static str,
}

pub struct SqlGuard {
    leading_select: Regex,
    forbidden: Vec<Rule>,
}

impl SqlGuard {
    pub fn new() -> Self {
        let rule = |pattern: &str, reason: &'static str| Rule {
            pattern: Regex::new(pattern).expect("guard pattern is valid"),
            reason,
        };

        Self {
            leading_select: Regex::new(r"(?i)^SELECT\b").expect("guard pattern is valid"),
            forbidden: vec![
                rule(r";\s*--", "comment after statement separator"),
                rule(r"(?i)\bEXEC(UTE)?\s", "EXEC invocation"),
                rule(r"(?i)\bXP_", "extended procedure call"),
                rule(
                    r"(?i)\b(DROP|DELETE|UPDATE|INSERT)\b",
                    "data modification or DDL keyword",
                ),
                rule(r"(?i)\bINTO\b", "SELECT INTO creates a table"),
            ],
        }
    }

    /// Accept or reject `sql`, naming the violated rule on rejection.
    pub fn check(&self, sql: &str) -> Result<()> {
        let sql = sql.trim();
        if !self.leading_select.is_match(sql) {
            warn!("Blocked statement: only SELECT statements are allowed");
            return Err(AssistantError::PolicyRejected(
                "only SELECT statements are allowed".into(),
            ));
        }

        if let Some(rule) = self.forbidden.iter().find(|r| r.pattern.is_match(sql)) {
            warn!("Blocked statement: {}", rule.reason);
            return Err(AssistantError::PolicyRejected(rule.reason.into()));
        }

        Ok(())
    }

    pub fn is_allowed(&self, sql: &str) -> bool {
        self.check(sql).is_ok()
    }
}

impl Default for SqlGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_plain_select() {
        let guard = SqlGuard::new();
        assert!(guard.is_allowed("SELECT * FROM HR.EMPLOYEES;"));
        assert!(guard.is_allowed("  select e.first_name\nFROM hr.employees e;"));
        assert!(guard.is_allowed(
            "SELECT E.EMPLOYEE_ID, D.DEPARTMENT_NAME FROM HR.EMPLOYEES E \
             INNER JOIN HR.DEPARTMENTS D ON E.DEPARTMENT_ID = D.DEPARTMENT_ID;"
        ));
    }

    #[test]
    fn rejects_non_select_statements() {
        let guard = SqlGuard::new();
        assert!(!guard.is_allowed("DROP TABLE X;"));
        assert!(!guard.is_allowed("UPDATE X SET Y=1;"));
        assert!(!guard.is_allowed("WITH t AS (SELECT 1) SELECT * FROM t;"));
        assert!(!guard.is_allowed(""));
        assert!(!guard.is_allowed("   "));
        assert!(!guard.is_allowed("SELECTED_ROWS"));
    }

    #[test]
    fn rejects_forbidden_patterns_inside_select() {
        let guard = SqlGuard::new();
        assert!(!guard.is_allowed("SELECT 1; -- sneaky"));
        assert!(!guard.is_allowed("SELECT 1; DELETE FROM HR.EMPLOYEES;"));
        assert!(!guard.is_allowed("select * from t; drop table t;"));
        assert!(!guard.is_allowed("SELECT 1; EXEC sp_who"));
        assert!(!guard.is_allowed("SELECT xp_cmdshell('dir')"));
        assert!(!guard.is_allowed("SELECT * FROM t WHERE 1=1; insert into t values (1)"));
    }

    #[test]
    fn keywords_only_match_whole_words() {
        let guard = SqlGuard::new();
        assert!(guard.is_allowed("SELECT LAST_UPDATED, IS_DELETED FROM HR.AUDIT;"));
        assert!(guard.is_allowed("SELECT EXP_DATE FROM HR.CARDS;"));
        assert!(guard.is_allowed("SELECT EXECUTION_COUNT FROM HR.JOBS;"));
    }

    #[test]
    fn rejects_select_into() {
        let guard = SqlGuard::new();
        assert!(!guard.is_allowed("SELECT * INTO HR.EMP_COPY FROM HR.EMPLOYEES;"));
        assert!(!guard.is_allowed("select id\ninto temp t\nfrom hr.jobs"));
        assert!(guard.is_allowed("SELECT INTOLERANCE_FLAG FROM HR.PATIENTS;"));
        assert!(matches!(
            guard.check("SELECT 1 INTO t"),
            Err(AssistantError::PolicyRejected(reason)) if reason == "SELECT INTO creates a table"
        ));
    }

    #[test]
    fn check_names_the_rule() {
        let guard = SqlGuard::new();
        match guard.check("SELECT 1; DROP TABLE x") {
            Err(AssistantError::PolicyRejected(reason)) => {
                assert_eq!(reason, "data modification or DDL keyword")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
