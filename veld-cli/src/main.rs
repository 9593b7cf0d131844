//! veld — render project schemas as PostgreSQL DDL.
//!
//! ```bash
//! veld gen                      # all schemas of ./veld.json
//! veld gen -p proj.json site    # only the site schema
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use veld_core::Project;
use veld_pg::ddl::write_schema;
use veld_pg::write::{ExpEnv, SqlWriter, HEADER};

#[derive(Parser)]
#[command(name = "veld")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "veld database toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a project's schemas as one atomic SQL script to stdout
    Gen {
        /// Project description file
        #[arg(short, long, default_value = "veld.json")]
        project: PathBuf,

        /// Schemas to include; all schemas when empty
        schemas: Vec<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    match Cli::parse().command {
        Commands::Gen { project, schemas } => gen(&project, &schemas),
    }
}

fn gen(path: &Path, schemas: &[String]) -> Result<()> {
    let raw = std::fs::read(path)
        .with_context(|| format!("reading project file {}", path.display()))?;
    let project: Project = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing project file {}", path.display()))?;

    // render the whole script first so either the full BEGIN/COMMIT
    // block reaches stdout or nothing does
    let mut env = ExpEnv;
    let mut w = SqlWriter::new(&mut env);
    w.push_str(HEADER);
    w.push_str("BEGIN;\n\n");
    for s in &project.schemas {
        if !schemas.is_empty() && !schemas.contains(&s.name) {
            continue;
        }
        write_schema(&mut w, Some(&project), s)
            .map_err(|e| anyhow::anyhow!("render schema {}: {e}", s.name))?;
    }
    w.push_str("COMMIT;\n");

    let mut out = std::io::stdout().lock();
    out.write_all(w.finish().as_bytes())?;
    Ok(())
}
