use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use crate::error::ProbeError;

pub const SUCCESS_LINE: &str = "✅ Handshake Success: Connected to Supabase and queried tables.";
pub const FAILURE_PREFIX: &str = "❌ Handshake Failed: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Result of a read, or of the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Success { records: usize },
    Failure { kind: String, message: String },
}

impl ProbeOutcome {
    pub fn failure(err: &ProbeError) -> Self {
        ProbeOutcome::Failure {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }
}

/// One table's read.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub elapsed_ms: u128,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

/// Snapshot of a probe run, printed as JSON with `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub timestamp: u128,
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub elapsed_ms: u128,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
    pub tables: Vec<TableReport>,
}

impl ProbeReport {
    /// Build a report from per-table results. The run succeeds only if every
    /// table read did.
    pub fn from_tables(
        timestamp: u128,
        host: Option<String>,
        limit: u32,
        elapsed_ms: u128,
        tables: Vec<TableReport>,
    ) -> Self {
        let outcome = summarize(&tables);
        ProbeReport {
            timestamp,
            host,
            limit: Some(limit),
            elapsed_ms,
            outcome,
            tables,
        }
    }

    /// A run that failed before any table was read.
    pub fn failed(
        timestamp: u128,
        host: Option<String>,
        limit: Option<u32>,
        elapsed_ms: u128,
        err: &ProbeError,
    ) -> Self {
        ProbeReport {
            timestamp,
            host,
            limit,
            elapsed_ms,
            outcome: ProbeOutcome::failure(err),
            tables: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Total rows read across all tables, `None` if the run failed.
    pub fn records(&self) -> Option<usize> {
        match self.outcome {
            ProbeOutcome::Success { records } => Some(records),
            ProbeOutcome::Failure { .. } => None,
        }
    }

    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn emit(&self, format: OutputFormat, out: &mut dyn Write) -> io::Result<()> {
        match format {
            OutputFormat::Human => self.write_human(out)?,
            OutputFormat::Json => self.write_json(out)?,
        }
        out.flush()
    }

    pub fn write_human(&self, out: &mut dyn Write) -> io::Result<()> {
        match &self.outcome {
            ProbeOutcome::Success { records } => {
                writeln!(out, "{}", SUCCESS_LINE)?;
                if self.tables.len() <= 1 {
                    return writeln!(
                        out,
                        "Data response status: {} records found (expected 0).",
                        records
                    );
                }
            }
            ProbeOutcome::Failure { message, .. } => {
                writeln!(out, "{}{}", FAILURE_PREFIX, message)?;
                if self.tables.len() <= 1 {
                    return Ok(());
                }
            }
        }

        for t in &self.tables {
            match &t.outcome {
                ProbeOutcome::Success { records } => writeln!(
                    out,
                    "Data response status: {} records found in {}.",
                    records, t.table
                )?,
                ProbeOutcome::Failure { message, .. } => {
                    writeln!(out, "Query failed for {}: {}", t.table, message)?
                }
            }
        }
        Ok(())
    }

    pub fn write_json(&self, out: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }
}

fn summarize(tables: &[TableReport]) -> ProbeOutcome {
    let failed_kinds: Vec<&str> = tables
        .iter()
        .filter_map(|t| match &t.outcome {
            ProbeOutcome::Failure { kind, .. } => Some(kind.as_str()),
            ProbeOutcome::Success { .. } => None,
        })
        .collect();

    match (failed_kinds.first(), tables) {
        (None, _) => ProbeOutcome::Success {
            records: tables
                .iter()
                .map(|t| match t.outcome {
                    ProbeOutcome::Success { records } => records,
                    ProbeOutcome::Failure { .. } => 0,
                })
                .sum(),
        },
        (Some(_), [only]) => only.outcome.clone(),
        (Some(kind), _) => ProbeOutcome::Failure {
            kind: kind.to_string(),
            message: format!("{} of {} tables failed", failed_kinds.len(), tables.len()),
        },
    }
}
