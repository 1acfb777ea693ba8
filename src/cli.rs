use clap::Parser;
use std::path::PathBuf;

use crate::config::Overrides;
use crate::diagnostics::OutputFormat;

/// Check connectivity and credentials against a Supabase project by reading
/// one row from each table.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML file layered over the built-in defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Project URL, e.g. https://<ref>.supabase.co
    #[arg(long, env = "SUPABASE_URL")]
    pub url: Option<String>,

    /// API key (anon or service role). Falls back to SUPABASE_ANON_KEY.
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Table to read from; repeat or comma-separate for several
    #[arg(long = "table", env = "HANDSHAKE_TABLE", value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Maximum rows to request per table
    #[arg(long)]
    pub limit: Option<u32>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Print the result as a JSON report
    #[arg(long)]
    pub json: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            key: resolve_key(self.key.clone(), std::env::var("SUPABASE_ANON_KEY").ok()),
            tables: (!self.tables.is_empty()).then(|| self.tables.clone()),
            limit: self.limit,
            timeout_secs: self.timeout_secs,
            log_level: self.verbose.then(|| "debug".to_string()),
        }
    }

    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// `--key` / `SUPABASE_KEY` first, then the anon key variable.
fn resolve_key(key: Option<String>, anon_key: Option<String>) -> Option<String> {
    key.filter(|k| !k.is_empty())
        .or(anon_key.filter(|k| !k.is_empty()))
}
