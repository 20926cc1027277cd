//! One-time DDL for the documents and products tables.

use tokio_postgres::Client;
use tracing::info;

use crate::error::StorageError;
use crate::store::postgres::PgTables;
use crate::store::table::{escape_literal, quote_ident, TableName};

/// Optional parts of schema setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Build HNSW cosine indexes on both embedding columns.
    pub vector_index: bool,
    /// Run ANALYZE once the tables and indexes exist.
    pub analyze: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            vector_index: true,
            analyze: true,
        }
    }
}

/// A labelled DDL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaStep {
    /// Short progress label.
    pub label: String,
    /// Statement text.
    pub sql: String,
}

impl SchemaStep {
    fn new(label: impl Into<String>, sql: String) -> Self {
        Self {
            label: label.into(),
            sql,
        }
    }
}

/// Every statement `ensure_schema` runs, in order. All are idempotent.
pub fn schema_steps(tables: &PgTables, options: SchemaOptions) -> Vec<SchemaStep> {
    let language = escape_literal(&tables.language);
    let dims = tables.dims;
    let docs = &tables.documents;
    let products = &tables.products;

    let mut steps = vec![
        SchemaStep::new(
            "ensuring vector extension",
            "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        ),
        SchemaStep::new(
            "ensuring schema",
            format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(docs.schema())),
        ),
    ];
    if products.schema() != docs.schema() {
        steps.push(SchemaStep::new(
            "ensuring product schema",
            format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_ident(products.schema())
            ),
        ));
    }

    steps.push(SchemaStep::new(
        "creating documents table",
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                content TEXT NOT NULL,
                window_content TEXT NOT NULL,
                source TEXT,
                embedding VECTOR({dims}) NOT NULL,
                content_tsv TSVECTOR GENERATED ALWAYS AS (to_tsvector('{language}', content)) STORED
            )",
            docs.qualified()
        ),
    ));
    steps.push(SchemaStep::new(
        "creating products table",
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                code TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                embedding VECTOR({dims}) NOT NULL,
                price NUMERIC(10, 2) NOT NULL,
                image_url TEXT,
                stock_level INTEGER NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                name_tsv TSVECTOR GENERATED ALWAYS AS (to_tsvector('{language}', name)) STORED,
                description_tsv TSVECTOR GENERATED ALWAYS AS (to_tsvector('{language}', description)) STORED,
                search_tsv TSVECTOR GENERATED ALWAYS AS (to_tsvector('{language}', name || ' ' || description)) STORED
            )",
            products.qualified()
        ),
    ));

    steps.push(gin_index(docs, "content_tsv"));
    for column in ["name_tsv", "description_tsv", "search_tsv"] {
        steps.push(gin_index(products, column));
    }
    steps.push(SchemaStep::new(
        format!("indexing {}.code", products.table()),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (code) WHERE is_active",
            quote_ident(&products.index_name("code")),
            products.qualified()
        ),
    ));

    if options.vector_index {
        steps.push(hnsw_index(docs));
        steps.push(hnsw_index(products));
    }
    if options.analyze {
        steps.push(SchemaStep::new(
            "analyzing documents",
            format!("ANALYZE {}", docs.qualified()),
        ));
        steps.push(SchemaStep::new(
            "analyzing products",
            format!("ANALYZE {}", products.qualified()),
        ));
    }
    steps
}

fn gin_index(table: &TableName, column: &str) -> SchemaStep {
    SchemaStep::new(
        format!("indexing {}.{column}", table.table()),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING GIN ({column})",
            quote_ident(&table.index_name(column)),
            table.qualified()
        ),
    )
}

fn hnsw_index(table: &TableName) -> SchemaStep {
    SchemaStep::new(
        format!("building HNSW index on {}", table.table()),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING hnsw (embedding vector_cosine_ops)",
            quote_ident(&table.index_name("embedding_hnsw")),
            table.qualified()
        ),
    )
}

/// Runs every step, reporting `(done, total, label)` before each one and once
/// more on completion.
pub async fn ensure_schema<F>(
    client: &Client,
    tables: &PgTables,
    options: SchemaOptions,
    mut progress: F,
) -> Result<(), StorageError>
where
    F: FnMut(usize, usize, &str),
{
    let steps = schema_steps(tables, options);
    let total = steps.len();
    for (done, step) in steps.iter().enumerate() {
        progress(done, total, &step.label);
        client
            .batch_execute(&step.sql)
            .await
            .map_err(|err| StorageError::query(format!("schema step '{}' failed", step.label), err))?;
    }
    progress(total, total, "complete");
    info!(
        documents = %tables.documents.qualified(),
        products = %tables.products.qualified(),
        dims = tables.dims,
        "schema ready"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProductTextField;

    fn tables() -> PgTables {
        PgTables {
            documents: TableName::new("public", "documents").expect("documents"),
            products: TableName::new("public", "products").expect("products"),
            language: "english".into(),
            product_text_field: ProductTextField::Description,
            dims: 1024,
        }
    }

    #[test]
    fn tables_use_configured_dimension_and_language() {
        let steps = schema_steps(&tables(), SchemaOptions::default());
        let docs = steps
            .iter()
            .find(|step| step.label == "creating documents table")
            .expect("documents ddl");
        assert!(docs.sql.contains("embedding VECTOR(1024) NOT NULL"));
        assert!(docs.sql.contains("to_tsvector('english', content)"));

        let products = steps
            .iter()
            .find(|step| step.label == "creating products table")
            .expect("products ddl");
        assert!(products.sql.contains("price NUMERIC(10, 2) NOT NULL"));
        assert!(products.sql.contains("is_active BOOLEAN NOT NULL DEFAULT TRUE"));
        assert!(products.sql.contains("search_tsv TSVECTOR"));
    }

    #[test]
    fn optional_steps_follow_options() {
        let all = schema_steps(&tables(), SchemaOptions::default());
        let minimal = schema_steps(
            &tables(),
            SchemaOptions {
                vector_index: false,
                analyze: false,
            },
        );
        assert_eq!(all.len(), minimal.len() + 4);
        assert!(all.iter().any(|step| step.sql.contains("vector_cosine_ops")));
        assert!(!minimal.iter().any(|step| step.sql.starts_with("ANALYZE")));
        assert_eq!(
            all.iter().filter(|step| step.sql.contains("USING GIN")).count(),
            4
        );
    }

    #[test]
    fn active_product_codes_are_indexed() {
        let steps = schema_steps(&tables(), SchemaOptions::default());
        let code = steps
            .iter()
            .find(|step| step.label == "indexing products.code")
            .expect("code index step");
        assert!(code.sql.ends_with("ON \"public\".\"products\" (code) WHERE is_active"));
    }

    #[test]
    fn extension_comes_first() {
        let steps = schema_steps(&tables(), SchemaOptions::default());
        assert_eq!(steps[0].sql, "CREATE EXTENSION IF NOT EXISTS vector");
        assert!(steps[2].sql.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"documents\""));
    }
}
