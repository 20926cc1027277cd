use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use shoprag::config::{init_tracing, DatabaseArgs, EmbedderArgs, RetrievalArgs};
use shoprag::store::postgres::{connect, PgDocumentIndex, PgProductIndex, PgTables};
use shoprag::{
    DocumentChunk, HybridRetriever, KnowledgeBase, Product, Record, RetrievalError, Scored,
};

#[derive(Parser, Debug)]
#[command(
    name = "shoprag-search",
    about = "Query the documents or products table with semantic, lexical, or hybrid search"
)]
struct SearchCli {
    /// Question or keywords to search for
    #[arg(long, required_unless_present_any = ["id", "code"], conflicts_with_all = ["id", "code"])]
    query: Option<String>,

    /// Fetch a single record of --entity by id instead of searching
    #[arg(long, conflicts_with = "code")]
    id: Option<i64>,

    /// Fetch the active product with this catalogue code
    #[arg(long)]
    code: Option<String>,

    /// Table to search
    #[arg(long, value_enum, default_value_t = Entity::Documents)]
    entity: Entity,

    /// Retrieval strategy
    #[arg(long, value_enum, default_value_t = Mode::Hybrid)]
    mode: Mode,

    /// Number of results returned
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Print results as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Log at debug level
    #[arg(long, short)]
    verbose: bool,

    #[command(flatten)]
    retrieval: RetrievalArgs,

    #[command(flatten)]
    embedder: EmbedderArgs,

    #[command(flatten)]
    database: DatabaseArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Entity {
    Documents,
    Products,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Hybrid,
    Semantic,
    Lexical,
}

#[derive(Serialize)]
struct SearchOutput<'a, T> {
    query: &'a str,
    entity: Entity,
    mode: Mode,
    latency_ms: f64,
    results: &'a [Scored<T>],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SearchCli::parse();
    init_tracing(cli.verbose);

    let config = cli.retrieval.to_config()?;
    let embedder = cli.embedder.build()?;
    let tables = PgTables::from_args(&cli.database, embedder.dimensions())?;
    let client = Arc::new(
        connect(cli.database.url()?)
            .await
            .context("failed to connect to Postgres")?,
    );
    let knowledge = KnowledgeBase::new(
        embedder,
        Arc::new(PgDocumentIndex::new(client.clone(), &tables)),
        Arc::new(PgProductIndex::new(client, &tables)),
        config,
    );

    if let Some(code) = cli.code.as_deref() {
        let product = knowledge
            .get_product_by_code(code)
            .await
            .with_context(|| format!("failed to look up product {code}"))?;
        return emit_record(&cli, product.as_ref(), describe_product);
    }
    if let Some(id) = cli.id {
        return match cli.entity {
            Entity::Documents => {
                let document = knowledge
                    .get_document_by_id(id)
                    .await
                    .with_context(|| format!("failed to look up document {id}"))?;
                emit_record(&cli, document.as_ref(), describe_document)
            }
            Entity::Products => {
                let product = knowledge
                    .get_product_by_id(id)
                    .await
                    .with_context(|| format!("failed to look up product {id}"))?;
                emit_record(&cli, product.as_ref(), describe_product)
            }
        };
    }

    let query = cli.query.as_deref().unwrap_or_default();
    let started = Instant::now();
    match cli.entity {
        Entity::Documents => {
            let hits = run(knowledge.documents(), cli.mode, query, cli.top_k)
                .await
                .context("document search failed")?;
            emit(&cli, query, started, &hits, render_document)
        }
        Entity::Products => {
            let hits = run(knowledge.products(), cli.mode, query, cli.top_k)
                .await
                .context("product search failed")?;
            emit(&cli, query, started, &hits, render_product)
        }
    }
}

async fn run<T>(
    retriever: &HybridRetriever<T>,
    mode: Mode,
    query: &str,
    top_k: usize,
) -> Result<Vec<Scored<T>>, RetrievalError>
where
    T: Record + Send + Sync + 'static,
{
    match mode {
        Mode::Hybrid => retriever.retrieve_hybrid(query, top_k).await,
        Mode::Semantic => retriever.retrieve_similar(query, top_k).await,
        Mode::Lexical => retriever.retrieve_text_search(query, top_k).await,
    }
}

fn emit_record<T: Serialize>(
    cli: &SearchCli,
    record: Option<&T>,
    describe: fn(&T) -> String,
) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("failed to serialize record")?
        );
        return Ok(());
    }
    match record {
        Some(record) => print!("{}---\n", describe(record)),
        None => println!("Not found."),
    }
    Ok(())
}

fn emit<T: Serialize>(
    cli: &SearchCli,
    query: &str,
    started: Instant,
    hits: &[Scored<T>],
    render: fn(&Scored<T>) -> String,
) -> Result<()> {
    if cli.json {
        let output = SearchOutput {
            query,
            entity: cli.entity,
            mode: cli.mode,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            results: hits,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("failed to serialize results")?
        );
        return Ok(());
    }
    if hits.is_empty() {
        println!("No results for {query:?}.");
        return Ok(());
    }
    for hit in hits {
        print!("{}", render(hit));
    }
    Ok(())
}

fn render_scores<T>(hit: &Scored<T>) -> String {
    format!(
        "RRF: {} | Lexical: {} | Distance: {}",
        fmt_score(hit.rrf_score),
        fmt_score(hit.text_rank),
        fmt_score(hit.semantic_distance)
    )
}

fn fmt_score(score: Option<f64>) -> String {
    score
        .map(|value| format!("{value:.4}"))
        .unwrap_or_else(|| "-".to_string())
}

fn render_document(hit: &Scored<DocumentChunk>) -> String {
    format!("{}{}\n---\n", describe_document(&hit.record), render_scores(hit))
}

fn render_product(hit: &Scored<Product>) -> String {
    format!("{}{}\n---\n", describe_product(&hit.record), render_scores(hit))
}

fn describe_document(document: &DocumentChunk) -> String {
    format!(
        "Source: {}\nID: {}\n{}\n",
        document.provenance().unwrap_or("(unknown)"),
        document.id,
        document.window_content.trim()
    )
}

fn describe_product(product: &Product) -> String {
    format!(
        "Code: {}\nName: {}\nPrice: {:.2} | Stock: {}\n{}\n",
        product.code,
        product.name,
        product.price,
        product.stock_level,
        product.description.trim()
    )
}
