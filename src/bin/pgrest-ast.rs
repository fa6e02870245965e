//! pgrest-ast: translate a PostgREST-style request from the command line
//!
//! # Usage
//!
//! ```bash
//! # Translate a read
//! pgrest-ast GET '/products?select=id,categories!inner(name)&price=gte.10'
//!
//! # Translate a write with headers and a body
//! pgrest-ast POST /products -H 'Prefer: return=representation' -d '{"name":"pen"}'
//!
//! # Inspect a select expression
//! pgrest-ast select 'id,total:price.sum(),stores(city)'
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use http::Method;
use pgrest_ast::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgrest-ast")]
#[command(version)]
#[command(about = "Translate PostgREST-style requests into a query AST", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
#[command(after_help = "EXAMPLES:
    pgrest-ast GET '/products?select=id,name&price=gt.10&order=name'
    pgrest-ast POST /rpc/search -d '{\"term\":\"phone\"}'
    pgrest-ast PATCH '/items?id=eq.7' -H 'Prefer: handling=strict' -d '{\"qty\":0}'
    pgrest-ast operators")]
struct Cli {
    /// HTTP method (GET, HEAD, POST, PATCH, PUT, DELETE)
    method: Option<String>,

    /// Request target: path plus query string
    target: Option<String>,

    /// Request header as 'Name: value' (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long, conflicts_with = "data_file")]
    data: Option<String>,

    /// Read the request body from a file
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Translator configuration file (TOML)
    #[arg(long, env = "PGREST_AST_CONFIG")]
    config: Option<PathBuf>,

    /// Print the AST on a single line
    #[arg(long)]
    compact: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the operator catalog
    Operators,
    /// Parse a select expression and show its structure
    Select {
        /// The expression, as it would appear after `select=`
        expr: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match &cli.command {
        Some(Commands::Operators) => {
            show_operators();
            Ok(())
        }
        Some(Commands::Select { expr }) => explain_select(expr),
        None => match (&cli.method, &cli.target) {
            (Some(method), Some(target)) => run(method, target, &cli).await,
            _ => {
                println!("{}", "pgrest-ast".cyan().bold());
                println!();
                println!("Usage: pgrest-ast [OPTIONS] <METHOD> <TARGET>");
                println!();
                println!("Try: pgrest-ast --help");
                Ok(())
            }
        },
    };

    if let Err(e) = outcome {
        report(&e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);
    if let Some(e) = err.downcast_ref::<TranslateError>() {
        let stage = e.stage().map(|s| s.to_string()).unwrap_or_else(|| "-".into());
        eprintln!(
            "  {} {:?}  {} {}  {} {}",
            "kind:".dimmed(),
            e.kind(),
            "stage:".dimmed(),
            stage.yellow(),
            "status:".dimmed(),
            e.http_status()
        );
        if let Some(position) = e.position() {
            eprintln!("  {} {}", "position:".dimmed(), position.to_string().yellow());
        }
    }
}

async fn run(method: &str, target: &str, cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => TranslatorConfig::load(path)?,
        None => TranslatorConfig::load_default()?,
    };

    if cli.verbose {
        eprintln!("{} {} {}", "Input:".dimmed(), method.to_ascii_uppercase().cyan(), target.yellow());
    }

    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method '{}'", method))?;
    let mut builder = Request::builder(method, target);
    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("header '{}' is not 'Name: value'", header))?;
        builder = builder.header(name.trim(), value.trim());
    }
    if let Some(data) = &cli.data {
        builder = builder.body(data.clone());
    } else if let Some(path) = &cli.data_file {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        builder = builder.body(bytes);
    }

    let ast = Translator::new(config).translate(builder.build()?).await?;
    let json = if cli.compact {
        serde_json::to_string(&ast)?
    } else {
        serde_json::to_string_pretty(&ast)?
    };
    println!("{}", json);
    Ok(())
}

fn explain_select(expr: &str) -> Result<()> {
    println!("{} {}", "Select:".dimmed(), expr.yellow());
    println!();

    let tree = parse_select(expr, TranslatorConfig::default().max_embed_depth)?;
    println!("{}", "Entries:".green().bold());
    print_entries(&tree.entries, 1);

    if !tree.joins.is_empty() {
        println!();
        println!("{}", "Joins:".green().bold());
        for (alias, join) in &tree.joins {
            let hint = join
                .hint
                .as_deref()
                .map(|h| format!(" !{}", h))
                .unwrap_or_default();
            println!(
                "  {} → {} {:?}{}",
                alias.white(),
                join.table.cyan(),
                join.join_type,
                hint.dimmed()
            );
        }
    }

    println!();
    println!("{}", "Rendered:".green().bold());
    println!("  {}", render_select(&tree.entries, &tree.joins).white());
    Ok(())
}

fn print_entries(entries: &[SelectEntry], depth: usize) {
    let pad = "  ".repeat(depth);
    for entry in entries {
        match entry {
            SelectEntry::Wildcard => println!("{}• {}", pad, "*".cyan()),
            SelectEntry::Column(name) => println!("{}• {}", pad, name.white()),
            SelectEntry::Field(field) => {
                let source = field.column.as_deref().unwrap_or("count()");
                let mut extras = Vec::new();
                if !field.path.is_empty() {
                    extras.push(format!("path[{}]", field.path.len()));
                }
                if let Some(aggregate) = &field.aggregate {
                    extras.push(aggregate.name().to_string());
                }
                if let Some(cast) = &field.cast {
                    extras.push(format!("::{}", cast));
                }
                println!(
                    "{}• {} ← {} {}",
                    pad,
                    field.alias.white(),
                    source.cyan(),
                    extras.join(" ").dimmed()
                );
            }
            SelectEntry::Embed(embed) => {
                let spread = if embed.spread { "..." } else { "" };
                println!("{}• {}{}", pad, spread.dimmed(), embed.alias.yellow().bold());
                print_entries(&embed.select, depth + 1);
            }
        }
    }
}

fn show_operators() {
    println!("{}", "Operator Catalog".cyan().bold());
    println!();
    println!(
        "{:14} {:14} {}",
        "Key".white().bold(),
        "Wire".white().bold(),
        "Value".white().bold()
    );
    println!("{}", "─".repeat(56).dimmed());

    for op in Operator::ALL {
        let wire = match op.wire() {
            Some((token, None)) => token.to_string(),
            Some((token, Some(Quantifier::Any))) => format!("{}(any)", token),
            Some((token, Some(Quantifier::All))) => format!("{}(all)", token),
            None => "-".to_string(),
        };
        println!(
            "{:14} {:14} {}",
            op.key().cyan().bold(),
            wire.yellow(),
            op.shape().to_string().dimmed()
        );
    }
}
