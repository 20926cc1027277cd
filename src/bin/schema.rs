use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use shoprag::config::{init_tracing, DatabaseArgs, DEFAULT_EMBEDDING_DIM};
use shoprag::store::postgres::schema::{ensure_schema, SchemaOptions};
use shoprag::store::postgres::{connect, PgTables};

#[derive(Parser, Debug)]
#[command(
    name = "shoprag-schema",
    about = "Create the pgvector extension, documents/products tables, and their indexes"
)]
struct SchemaCli {
    #[command(flatten)]
    database: DatabaseArgs,

    /// Embedding dimension D used for both VECTOR columns
    #[arg(long, env = "SHOPRAG_EMBEDDING_DIM", default_value_t = DEFAULT_EMBEDDING_DIM)]
    embedding_dim: usize,

    /// Build HNSW cosine indexes on the embedding columns
    #[arg(long, env = "SHOPRAG_VECTOR_INDEX", default_value_t = true, action = clap::ArgAction::Set)]
    vector_index: bool,

    /// Analyze both tables after ensuring indexes
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    analyze: bool,

    /// Log at debug level
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SchemaCli::parse();
    init_tracing(cli.verbose);
    let tables = PgTables::from_args(&cli.database, cli.embedding_dim)?;
    let client = connect(cli.database.url()?)
        .await
        .context("failed to connect to Postgres")?;

    let options = SchemaOptions {
        vector_index: cli.vector_index,
        analyze: cli.analyze,
    };
    ensure_schema(&client, &tables, options, render_progress)
        .await
        .context("failed to prepare schema")?;
    println!();
    println!(
        "Ensured {} and {} exist with VECTOR({}) embeddings.",
        tables.documents.qualified(),
        tables.products.qualified(),
        tables.dims
    );
    Ok(())
}

fn render_progress(done: usize, total: usize, label: &str) {
    if total == 0 {
        return;
    }
    let pct = (done as f64 / total as f64) * 100.0;
    print!("\r\x1b[2K[{}/{}] {:.1}% {}", done, total, pct, label);
    let _ = io::stdout().flush();
}
