use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use shoprag::config::{init_tracing, DatabaseArgs, EmbedderArgs};
use shoprag::ingest::ingest_products;
use shoprag::loader::load_product_catalogue;
use shoprag::store::postgres::schema::{ensure_schema, SchemaOptions};
use shoprag::store::postgres::{connect, PgTables, PgWriter};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "shoprag-ingest-products",
    about = "Embed product descriptions from catalogue JSON and store them in the products table"
)]
struct IngestProductsCli {
    /// Directory of catalogue files shaped as {"items": [...]}
    #[arg(long, env = "SHOPRAG_PRODUCTS_DIR", default_value = "data/products")]
    directory: PathBuf,

    /// Products embedded and inserted per transaction
    #[arg(long, env = "SHOPRAG_INGEST_BATCH", default_value_t = 64)]
    batch_size: usize,

    /// Create the extension, tables, and indexes before inserting
    #[arg(long)]
    prepare: bool,

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
    let cli = IngestProductsCli::parse();
    init_tracing(cli.verbose);

    let listings = load_product_catalogue(&cli.directory)
        .with_context(|| format!("failed to load products from {:?}", cli.directory))?;
    if listings.is_empty() {
        println!("No products found in {:?}; nothing to do.", cli.directory);
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
    let report = ingest_products(listings, &*embedder, &mut writer, cli.batch_size)
        .await
        .context("product ingestion failed")?;
    println!(
        "Successfully inserted {} product{} into {} ({} skipped).",
        report.inserted,
        if report.inserted == 1 { "" } else { "s" },
        writer.tables().products.qualified(),
        report.skipped
    );
    Ok(())
}
