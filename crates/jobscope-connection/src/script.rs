//! SQL script splitting and transactional execution
//!
//! Scripts are split on every `;` with no awareness of quotes, comments or
//! dollar-quoted bodies. A `;` inside a string literal therefore cuts the
//! statement in two; scripts meant for this loader must avoid that.

use jobscope_core::{JobscopeError, Result};
use serde::{Deserialize, Serialize};

use crate::ConnectionHandle;

/// Statement separator
pub const STATEMENT_DELIMITER: char = ';';

const PREVIEW_CHARS: usize = 80;

/// Outcome of a committed script
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptReport {
    /// Statements executed and committed
    pub statements: usize,
    /// Sum of the rows reported by each statement
    pub rows_affected: u64,
}

/// Split script text into statements.
///
/// Each piece between delimiters is trimmed; empty pieces are dropped.
pub fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(STATEMENT_DELIMITER)
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Single-line, length-limited rendering of a statement for errors and logs
pub fn statement_preview(statement: &str) -> String {
    let flat = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut preview: String = flat.chars().take(PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

/// Execute every statement of `script` in one transaction on `handle`.
///
/// The first failing statement rolls the transaction back and is reported
/// with its 1-based index. Nothing is committed unless every statement ran.
pub(crate) async fn run_script(handle: &ConnectionHandle, script: &str) -> Result<ScriptReport> {
    let statements = split_statements(script);
    if statements.is_empty() {
        tracing::info!("script contains no statements");
        return Ok(ScriptReport::default());
    }

    let tx = handle.begin_transaction().await?;
    let mut report = ScriptReport::default();

    for (position, statement) in statements.iter().enumerate() {
        let index = position + 1;
        tracing::debug!(index, statement = %statement_preview(statement), "executing statement");

        match tx.execute(statement, &[]).await {
            Ok(result) => {
                report.statements += 1;
                report.rows_affected += result.affected_rows;
            }
            Err(e) => {
                tracing::error!(index, error = %e, "statement failed, rolling back script");
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::warn!(error = %rollback_error, "rollback failed");
                }
                return Err(JobscopeError::Script {
                    index,
                    statement: statement_preview(statement),
                    message: e.to_string(),
                });
            }
        }
    }

    tx.commit().await?;
    tracing::info!(
        statements = report.statements,
        rows_affected = report.rows_affected,
        "script committed"
    );
    Ok(report)
}
