//! apiql: schema tooling
//!
//! Compile, fingerprint and explain selection schemas offline.
//!
//! # Usage
//!
//! ```bash
//! # Show the compiled tree
//! apiql compile 'author: user { id name }'
//!
//! # Fingerprint a schema file, as a client would
//! apiql fingerprint -f query.apiql
//!
//! # Show each call with the relations it would eager-load
//! apiql explain 'users(page) { id posts { comments { id } } }'
//! ```

use anyhow::{Context as _, Result, bail};
use apiql::prelude::*;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "apiql")]
#[command(version)]
#[command(about = "Compile, fingerprint and explain APIQL schemas", long_about = None)]
#[command(after_help = "EXAMPLES:
    apiql compile 'author: user { id name }'
    apiql compile -f query.apiql --format json
    apiql fingerprint 'ping'
    apiql explain 'users(page) { id posts { comments { id } } }'")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema and print the selection tree
    Compile {
        #[command(flatten)]
        input: Input,

        /// Output format
        #[arg(long, value_enum, default_value = "pretty")]
        format: OutputFormat,
    },
    /// Print the fingerprint a client would send for a schema
    Fingerprint {
        #[command(flatten)]
        input: Input,
    },
    /// Print the selection tree with the eager-load hints of every call
    Explain {
        #[command(flatten)]
        input: Input,
    },
}

#[derive(Args)]
struct Input {
    /// Schema text
    schema: Option<String>,

    /// Read the schema from a file
    #[arg(short, long, conflicts_with = "schema")]
    file: Option<PathBuf>,
}

impl Input {
    fn read(&self) -> Result<String> {
        match (&self.schema, &self.file) {
            (Some(schema), _) => Ok(schema.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display())),
            (None, None) => bail!("no schema given; pass it as an argument or with --file"),
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("APIQL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Compile { input, format } => {
            let selection = apiql::compile(&input.read()?)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&selection)?),
                OutputFormat::Pretty => print_tree(&selection, 0, false),
            }
        }
        Commands::Fingerprint { input } => {
            println!("{}", fingerprint(&input.read()?));
        }
        Commands::Explain { input } => {
            let schema = input.read()?;
            let selection = apiql::compile(&schema)?;
            println!("{} {}", "Fingerprint:".dimmed(), fingerprint(&schema).cyan());
            println!("{} {}", "Calls:".dimmed(), selection.len());
            println!();
            print_tree(&selection, 0, true);
        }
    }
    Ok(())
}

fn print_tree(selection: &Selection, depth: usize, hints: bool) {
    let indent = "  ".repeat(depth);
    for call in selection {
        let mut line = format!("{}{}", indent, call.name.white().bold());
        if call.key() != call.name {
            line = format!("{}{} {}", indent, format!("{}:", call.key()).yellow(), call.name.white().bold());
        }
        if call.is_parameterized() {
            let params: Vec<String> = call.args().iter().map(|p| p.to_string()).collect();
            line.push_str(&format!("({})", params.join(", ").cyan()));
        }
        if hints {
            if let Some(nested) = call.subselection() {
                let load = nested.eager_loads();
                if !load.is_empty() {
                    line.push_str(&format!("  {} {}", "eager:".dimmed(), load.to_string().green()));
                }
            }
        }
        println!("{}", line);

        if let Some(nested) = call.subselection() {
            print_tree(nested, depth + 1, hints);
        }
    }
}
