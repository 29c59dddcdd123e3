use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use nullsafe_core::{normalize, wire, DynamicRecord, Normalized, Schema};

/// nullsafe — null-safe collections for IDL records
///
/// Normalize records, inspect what gets tracked, and check that the wire
/// output is unchanged.
#[derive(Parser)]
#[command(name = "nullsafe", version, about, long_about = None)]
struct Cli {
    /// Suppress all non-error output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log normalization steps to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the record with absent collections replaced by empty ones
    Normalize {
        #[command(flatten)]
        input: Input,
        /// Output as JSON with tracking details
        #[arg(long)]
        json: bool,
    },

    /// Print the wire bytes of a record as hex
    Encode {
        #[command(flatten)]
        input: Input,
        /// Serialize through the normalized wrapper instead of the raw record
        #[arg(long)]
        normalized: bool,
    },

    /// Check that normalizing does not change the wire output
    Check {
        #[command(flatten)]
        input: Input,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute the SHA-256 fingerprint of a record's wire bytes
    Hash {
        #[command(flatten)]
        input: Input,
    },

    /// Show version information
    Version,
}

#[derive(clap::Args)]
struct Input {
    /// Path to the schema (.json)
    schema: PathBuf,
    /// Path to the record document (.json)
    record: PathBuf,
    /// Record type to load (defaults to the schema root)
    #[arg(long = "type")]
    record_type: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(cli.command, cli.quiet) {
        Ok(code) => code,
        Err(msg) => {
            eprintln!("{} {}", "error:".red().bold(), msg);
            2
        }
    };

    process::exit(exit_code);
}

/// `--verbose` takes priority over `RUST_LOG`; without either, only warnings
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Commands, quiet: bool) -> Result<i32, String> {
    match command {
        Commands::Normalize { input, json } => cmd_normalize(&input, json, quiet),
        Commands::Encode { input, normalized } => cmd_encode(&input, normalized, quiet),
        Commands::Check { input, json } => cmd_check(&input, json, quiet),
        Commands::Hash { input } => cmd_hash(&input, quiet),
        Commands::Version => {
            if !quiet {
                println!("nullsafe {}", env!("CARGO_PKG_VERSION"));
            }
            Ok(0)
        }
    }
}

// ── Commands ──────────────────────────────────────────────

fn cmd_normalize(input: &Input, json: bool, quiet: bool) -> Result<i32, String> {
    let record = load(input)?;
    let normalized = normalize(record).map_err(|e| e.to_string())?;
    if quiet {
        return Ok(0);
    }

    if json {
        let report = serde_json::json!({
            "wrapped": normalized.is_wrapped(),
            "tracked": tracked(&normalized),
            "record": normalized.to_json(),
        });
        println!("{}", pretty(&report)?);
    } else {
        println!("{}", pretty(&normalized.to_json())?);
        let count = normalized.plan().map_or(0, |p| p.len());
        if count == 0 {
            eprintln!("{}", "no absent collections, record unchanged".dimmed());
        } else {
            eprintln!(
                "{} {} collection field(s) tracked for revert",
                "✓".green(),
                count
            );
        }
    }
    Ok(0)
}

fn cmd_encode(input: &Input, normalized: bool, quiet: bool) -> Result<i32, String> {
    let record = load(input)?;
    let bytes = if normalized {
        let mut wrapped = normalize(record).map_err(|e| e.to_string())?;
        wire::to_bytes(&mut wrapped).map_err(|e| e.to_string())?
    } else {
        let mut record = record;
        wire::to_bytes(&mut record).map_err(|e| e.to_string())?
    };

    if !quiet {
        println!("{}", to_hex(&bytes));
    }
    Ok(0)
}

fn cmd_check(input: &Input, json: bool, quiet: bool) -> Result<i32, String> {
    let record = load(input)?;
    let expected = wire::to_bytes(&mut record.clone()).map_err(|e| e.to_string())?;

    let mut normalized = normalize(record).map_err(|e| e.to_string())?;
    let first = wire::to_bytes(&mut normalized).map_err(|e| e.to_string())?;
    let second = wire::to_bytes(&mut normalized).map_err(|e| e.to_string())?;

    let identical = first == expected;
    let repeatable = first == second;
    let passed = identical && repeatable;
    debug!(identical, repeatable, bytes = expected.len(), "fidelity check");

    if !quiet {
        if json {
            let report = serde_json::json!({
                "passed": passed,
                "identical": identical,
                "repeatable": repeatable,
                "bytes": expected.len(),
                "fingerprint": wire::fingerprint(&expected),
                "tracked": tracked(&normalized),
            });
            println!("{}", pretty(&report)?);
        } else if passed {
            println!(
                "{} wire output identical ({} bytes, {} field(s) tracked)",
                "✓".green(),
                expected.len(),
                tracked(&normalized).len()
            );
        } else {
            println!("{} wire output changed by normalization", "✗".red());
            if !identical {
                println!("  expected: {}", to_hex(&expected));
                println!("  actual:   {}", to_hex(&first));
            }
            if !repeatable {
                println!("  second serialize differs from the first");
            }
        }
    }

    Ok(if passed { 0 } else { 1 })
}

fn cmd_hash(input: &Input, quiet: bool) -> Result<i32, String> {
    let mut record = load(input)?;
    let bytes = wire::to_bytes(&mut record).map_err(|e| e.to_string())?;
    if !quiet {
        println!("{}", wire::fingerprint(&bytes));
    }
    Ok(0)
}

// ── Helpers ───────────────────────────────────────────────

fn load(input: &Input) -> Result<DynamicRecord, String> {
    let schema_text = read(&input.schema)?;
    let schema = Schema::from_json(&schema_text)
        .map_err(|e| format!("{}: {}", input.schema.display(), e))?;

    let record_type = match (&input.record_type, schema.root()) {
        (Some(t), _) => t.clone(),
        (None, Some(root)) => root.to_string(),
        (None, None) => {
            return Err(format!(
                "{}: schema has no root record; pass --type",
                input.schema.display()
            ))
        }
    };

    let record_text = read(&input.record)?;
    let doc: serde_json::Value = serde_json::from_str(&record_text)
        .map_err(|e| format!("{}: {}", input.record.display(), e))?;
    schema
        .record_from_json(&record_type, &doc)
        .map_err(|e| format!("{}: {}", input.record.display(), e))
}

fn read(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

fn tracked(normalized: &Normalized<DynamicRecord>) -> Vec<String> {
    normalized
        .plan()
        .map(|p| p.paths().iter().map(|path| path.to_string()).collect())
        .unwrap_or_default()
}

fn pretty(value: &serde_json::Value) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Serialization error: {}", e))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
