use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use shoprag::config::{init_tracing, ChunkerArgs, DatabaseArgs, EmbedderArgs};
use shoprag::ingest::ingest_documents;
use shoprag::loader::load_source_documents;
use shoprag::store::postgres::schema::{ensure_schema, SchemaOptions};
use shoprag::store::postgres::{connect, PgTables, PgWriter};
use shoprag::Chunker;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "shoprag-ingest-docs",
    about = "Chunk .txt and .pdf files, embed the chunks, and store them in the documents table"
)]
struct IngestDocsCli {
    /// Directory searched recursively for .txt and .pdf files
    #[arg(long, env = "SHOPRAG_FAQS_DIR", default_value = "data/faqs")]
    directory: PathBuf,

    /// Chunks embedded and inserted per transaction
    #[arg(long, env = "SHOPRAG_INGEST_BATCH", default_value_t = 64)]
    batch_size: usize,

    /// Create the extension, tables, and indexes before inserting
    #[arg(long)]
    prepare: bool,

    /// Print chunks as JSON lines instead of embedding and storing them
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    chunker: ChunkerArgs,

    #[command(flatten)]
    embedder: EmbedderArgs,

    #[command(flatten)]
    database: DatabaseArgs,

    /// Log at debug level
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = IngestDocsCli::parse();
    init_tracing(cli.verbose);

    let documents = load_source_documents(&cli.directory)
        .with_context(|| format!("failed to load documents from {:?}", cli.directory))?;
    let chunker = Chunker::new(cli.chunker.to_config()?);
    let chunks = chunker.chunk(&documents);
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "chunked source files"
    );

    if cli.dry_run {
        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        for chunk in &chunks {
            serde_json::to_writer(&mut out, chunk).context("failed to serialize chunk")?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        return Ok(());
    }

    let embedder = cli.embedder.build()?;
    let tables = PgTables::from_args(&cli.database, embedder.dimensions())?;
    let client = connect(cli.database.url()?)
        .await
        .context("failed to connect to Postgres")?;
    if cli.prepare {
        ensure_schema(&client, &tables, SchemaOptions::default(), |_, _, label| {
            info!(step = label, "schema")
        })
        .await
        .context("failed to prepare schema")?;
    }

    let mut writer = PgWriter::new(client, tables);
    let report = ingest_documents(chunks, &*embedder, &mut writer, cli.batch_size)
        .await
        .context("document ingestion failed")?;
    println!(
        "Successfully inserted {} chunk{} into {} ({} skipped).",
        report.inserted,
        if report.inserted == 1 { "" } else { "s" },
        writer.tables().documents.qualified(),
        report.skipped
    );
    Ok(())
}
