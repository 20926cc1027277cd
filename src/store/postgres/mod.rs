//! pgvector + Postgres full-text backend.
//!
//! Readers share one `Arc<Client>`; the writer owns its own connection so a
//! batch can run inside a transaction.

pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use pgvector::Vector;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error};

use crate::config::DatabaseArgs;
use crate::error::{ConfigurationError, StorageError};
use crate::models::{DocumentChunk, NewDocument, NewProduct, Product, Scored};
use crate::store::table::escape_literal;
use crate::store::{
    check_dimension, sanitize_text, validate_document, validate_product, ProductLookup,
    ProductTextField, RecordLookup, RecordSink, SearchBackend, TableName,
};

/// Opens a connection and drives it on a background task.
pub async fn connect(database_url: &str) -> Result<Client, StorageError> {
    let (client, connection) = tokio_postgres::connect(database_url, NoTls)
        .await
        .map_err(StorageError::Connection)?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(error = %err, "postgres connection error");
        }
    });
    Ok(client)
}

/// Table layout shared by the schema, search, and insert paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgTables {
    /// Document chunk table.
    pub documents: TableName,
    /// Product catalogue table.
    pub products: TableName,
    /// Text search configuration, e.g. `english`.
    pub language: String,
    /// Product column the lexical leg searches.
    pub product_text_field: ProductTextField,
    /// Embedding dimension D.
    pub dims: usize,
}

impl PgTables {
    /// Builds the layout from CLI flags plus the embedder's dimension.
    pub fn from_args(args: &DatabaseArgs, dims: usize) -> Result<Self, ConfigurationError> {
        let language = args.fts_language.trim();
        if language.is_empty() {
            return Err(ConfigurationError::InvalidIdentifier(
                "text search language must not be empty".into(),
            ));
        }
        if dims == 0 {
            return Err(ConfigurationError::ZeroSize {
                field: "embedding_dim",
            });
        }
        Ok(Self {
            documents: TableName::new(args.schema.clone(), args.documents_table.clone())?,
            products: TableName::new(args.schema.clone(), args.products_table.clone())?,
            language: language.to_string(),
            product_text_field: args.product_text_field,
            dims,
        })
    }
}

/// Search side of the documents table.
pub struct PgDocumentIndex {
    client: Arc<Client>,
    dims: usize,
    vector_sql: String,
    text_sql: String,
    by_id_sql: String,
}

impl PgDocumentIndex {
    /// Prepares SQL for the given layout.
    pub fn new(client: Arc<Client>, tables: &PgTables) -> Self {
        Self {
            client,
            dims: tables.dims,
            vector_sql: document_vector_sql(&tables.documents),
            text_sql: document_text_sql(&tables.documents, &tables.language),
            by_id_sql: document_by_id_sql(&tables.documents),
        }
    }
}

#[async_trait]
impl SearchBackend<DocumentChunk> for PgDocumentIndex {
    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<Scored<DocumentChunk>>, StorageError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        check_dimension(self.dims, embedding)?;
        let vector = Vector::from(embedding.to_vec());
        let rows = self
            .client
            .query(self.vector_sql.as_str(), &[&vector, &(top_k as i64)])
            .await
            .map_err(|err| StorageError::query("document vector search failed", err))?;
        debug!(rows = rows.len(), "document vector search");
        rows.iter()
            .map(|row| -> Result<_, StorageError> {
                Ok(Scored::semantic(document_from_row(row)?, get(row, "distance")?))
            })
            .collect()
    }

    async fn text_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Scored<DocumentChunk>>, StorageError> {
        let trimmed = query.trim();
        if top_k == 0 || trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .client
            .query(self.text_sql.as_str(), &[&trimmed, &(top_k as i64)])
            .await
            .map_err(|err| StorageError::query("document text search failed", err))?;
        debug!(rows = rows.len(), "document text search");
        rows.iter()
            .map(|row| -> Result<_, StorageError> {
                Ok(Scored::lexical(document_from_row(row)?, text_rank(row)?))
            })
            .collect()
    }
}

/// Search side of the products table. Inactive rows are never returned.
pub struct PgProductIndex {
    client: Arc<Client>,
    dims: usize,
    vector_sql: String,
    text_sql: String,
    by_id_sql: String,
    by_code_sql: String,
}

impl PgProductIndex {
    /// Prepares SQL for the given layout.
    pub fn new(client: Arc<Client>, tables: &PgTables) -> Self {
        Self {
            client,
            dims: tables.dims,
            vector_sql: product_vector_sql(&tables.products),
            text_sql: product_text_sql(
                &tables.products,
                &tables.language,
                tables.product_text_field,
            ),
            by_id_sql: product_by_id_sql(&tables.products),
            by_code_sql: product_by_code_sql(&tables.products),
        }
    }
}

#[async_trait]
impl SearchBackend<Product> for PgProductIndex {
    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<Scored<Product>>, StorageError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        check_dimension(self.dims, embedding)?;
        let vector = Vector::from(embedding.to_vec());
        let rows = self
            .client
            .query(self.vector_sql.as_str(), &[&vector, &(top_k as i64)])
            .await
            .map_err(|err| StorageError::query("product vector search failed", err))?;
        debug!(rows = rows.len(), "product vector search");
        rows.iter()
            .map(|row| -> Result<_, StorageError> {
                Ok(Scored::semantic(product_from_row(row)?, get(row, "distance")?))
            })
            .collect()
    }

    async fn text_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<Scored<Product>>, StorageError> {
        let trimmed = query.trim();
        if top_k == 0 || trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .client
            .query(self.text_sql.as_str(), &[&trimmed, &(top_k as i64)])
            .await
            .map_err(|err| StorageError::query("product text search failed", err))?;
        debug!(rows = rows.len(), "product text search");
        rows.iter()
            .map(|row| -> Result<_, StorageError> {
                Ok(Scored::lexical(product_from_row(row)?, text_rank(row)?))
            })
            .collect()
    }
}

#[async_trait]
impl RecordLookup<DocumentChunk> for PgDocumentIndex {
    async fn get_by_id(&self, id: i64) -> Result<Option<DocumentChunk>, StorageError> {
        let row = self
            .client
            .query_opt(self.by_id_sql.as_str(), &[&id])
            .await
            .map_err(|err| StorageError::query(format!("failed to fetch document {id}"), err))?;
        debug!(id, found = row.is_some(), "document lookup");
        row.as_ref().map(document_from_row).transpose()
    }
}

#[async_trait]
impl RecordLookup<Product> for PgProductIndex {
    async fn get_by_id(&self, id: i64) -> Result<Option<Product>, StorageError> {
        let row = self
            .client
            .query_opt(self.by_id_sql.as_str(), &[&id])
            .await
            .map_err(|err| StorageError::query(format!("failed to fetch product {id}"), err))?;
        debug!(id, found = row.is_some(), "product lookup");
        row.as_ref().map(product_from_row).transpose()
    }
}

#[async_trait]
impl ProductLookup for PgProductIndex {
    async fn get_by_code(&self, code: &str) -> Result<Option<Product>, StorageError> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        let row = self
            .client
            .query_opt(self.by_code_sql.as_str(), &[&code])
            .await
            .map_err(|err| StorageError::query(format!("failed to fetch product {code}"), err))?;
        debug!(code, found = row.is_some(), "product code lookup");
        row.as_ref().map(product_from_row).transpose()
    }
}

/// Insert side of both tables, on a dedicated connection.
pub struct PgWriter {
    client: Client,
    tables: PgTables,
}

impl PgWriter {
    /// Wraps a connection the writer will own exclusively.
    pub fn new(client: Client, tables: PgTables) -> Self {
        Self { client, tables }
    }

    /// Layout this writer inserts into.
    pub fn tables(&self) -> &PgTables {
        &self.tables
    }
}

#[async_trait]
impl RecordSink<NewDocument> for PgWriter {
    async fn insert(&mut self, record: &NewDocument) -> Result<i64, StorageError> {
        validate_document(record, self.tables.dims)?;
        let sql = document_insert_sql(&self.tables.documents);
        let params = DocumentParams::from_record(record);
        let row = self
            .client
            .query_one(
                sql.as_str(),
                &[
                    &params.content,
                    &params.window_content,
                    &params.source,
                    &params.embedding,
                ],
            )
            .await
            .map_err(|err| StorageError::query("failed to insert document", err))?;
        get(&row, "id")
    }

    async fn insert_batch(&mut self, records: &[NewDocument]) -> Result<Vec<i64>, StorageError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        for record in records {
            validate_document(record, self.tables.dims)?;
        }
        let sql = document_insert_sql(&self.tables.documents);
        let transaction = self
            .client
            .transaction()
            .await
            .map_err(|err| StorageError::query("failed to open transaction", err))?;
        let statement = transaction
            .prepare(&sql)
            .await
            .map_err(|err| StorageError::query("failed to prepare document insert", err))?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let params = DocumentParams::from_record(record);
            let row = transaction
                .query_one(
                    &statement,
                    &[
                        &params.content,
                        &params.window_content,
                        &params.source,
                        &params.embedding,
                    ],
                )
                .await
                .map_err(|err| StorageError::query("failed to insert document", err))?;
            ids.push(get(&row, "id")?);
        }
        transaction
            .commit()
            .await
            .map_err(|err| StorageError::query("failed to commit document batch", err))?;
        Ok(ids)
    }
}

#[async_trait]
impl RecordSink<NewProduct> for PgWriter {
    async fn insert(&mut self, record: &NewProduct) -> Result<i64, StorageError> {
        validate_product(record, self.tables.dims)?;
        let sql = product_insert_sql(&self.tables.products);
        let params = ProductParams::from_record(record);
        let row = self
            .client
            .query_one(
                sql.as_str(),
                &[
                    &params.code,
                    &params.name,
                    &params.description,
                    &params.embedding,
                    &params.price,
                    &params.image_url,
                    &params.stock_level,
                    &params.is_active,
                ],
            )
            .await
            .map_err(|err| StorageError::query("failed to insert product", err))?;
        get(&row, "id")
    }

    async fn insert_batch(&mut self, records: &[NewProduct]) -> Result<Vec<i64>, StorageError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        for record in records {
            validate_product(record, self.tables.dims)?;
        }
        let sql = product_insert_sql(&self.tables.products);
        let transaction = self
            .client
            .transaction()
            .await
            .map_err(|err| StorageError::query("failed to open transaction", err))?;
        let statement = transaction
            .prepare(&sql)
            .await
            .map_err(|err| StorageError::query("failed to prepare product insert", err))?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let params = ProductParams::from_record(record);
            let row = transaction
                .query_one(
                    &statement,
                    &[
                        &params.code,
                        &params.name,
                        &params.description,
                        &params.embedding,
                        &params.price,
                        &params.image_url,
                        &params.stock_level,
                        &params.is_active,
                    ],
                )
                .await
                .map_err(|err| {
                    StorageError::query(format!("failed to insert product {}", params.code), err)
                })?;
            ids.push(get(&row, "id")?);
        }
        transaction
            .commit()
            .await
            .map_err(|err| StorageError::query("failed to commit product batch", err))?;
        Ok(ids)
    }
}

struct DocumentParams {
    content: String,
    window_content: String,
    source: Option<String>,
    embedding: Vector,
}

impl DocumentParams {
    fn from_record(record: &NewDocument) -> Self {
        Self {
            content: sanitize_text(&record.content),
            window_content: sanitize_text(&record.window_content),
            source: record.source.as_deref().map(sanitize_text),
            embedding: Vector::from(record.embedding.clone()),
        }
    }
}

struct ProductParams {
    code: String,
    name: String,
    description: String,
    embedding: Vector,
    price: f64,
    image_url: Option<String>,
    stock_level: i32,
    is_active: bool,
}

impl ProductParams {
    fn from_record(record: &NewProduct) -> Self {
        let listing = &record.listing;
        Self {
            code: sanitize_text(&listing.code),
            name: sanitize_text(&listing.name),
            description: sanitize_text(&listing.description),
            embedding: Vector::from(record.embedding.clone()),
            price: listing.price,
            image_url: listing.image_url.as_deref().map(sanitize_text),
            stock_level: listing.stock_level,
            is_active: listing.is_active,
        }
    }
}

fn get<'a, T>(row: &'a Row, column: &str) -> Result<T, StorageError>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(column)
        .map_err(|err| StorageError::Row(format!("column {column}: {err}")))
}

fn text_rank(row: &Row) -> Result<f64, StorageError> {
    let rank: Option<f32> = get(row, "text_rank")?;
    Ok(f64::from(rank.unwrap_or(0.0)))
}

fn document_from_row(row: &Row) -> Result<DocumentChunk, StorageError> {
    Ok(DocumentChunk {
        id: get(row, "id")?,
        content: get(row, "content")?,
        window_content: get(row, "window_content")?,
        source: get(row, "source")?,
    })
}

fn product_from_row(row: &Row) -> Result<Product, StorageError> {
    Ok(Product {
        id: get(row, "id")?,
        code: get(row, "code")?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        price: get(row, "price")?,
        image_url: get(row, "image_url")?,
        stock_level: get(row, "stock_level")?,
        is_active: get(row, "is_active")?,
    })
}

const DOCUMENT_COLUMNS: &str = "id, content, window_content, source";
const PRODUCT_COLUMNS: &str =
    "id, code, name, description, price::float8 AS price, image_url, stock_level, is_active";

fn document_vector_sql(table: &TableName) -> String {
    format!(
        "SELECT {DOCUMENT_COLUMNS}, embedding <=> $1 AS distance \
        FROM {} \
        ORDER BY embedding <=> $1 ASC, id ASC \
        LIMIT $2",
        table.qualified()
    )
}

fn document_text_sql(table: &TableName, language: &str) -> String {
    format!(
        "WITH query AS (SELECT plainto_tsquery('{language}', $1) AS q)
        SELECT {DOCUMENT_COLUMNS}, ts_rank_cd(content_tsv, query.q) AS text_rank
        FROM {table}
        CROSS JOIN query
        WHERE query.q <> to_tsquery('') AND content_tsv @@ query.q
        ORDER BY text_rank DESC, id ASC
        LIMIT $2",
        language = escape_literal(language),
        table = table.qualified()
    )
}

fn product_vector_sql(table: &TableName) -> String {
    format!(
        "SELECT {PRODUCT_COLUMNS}, embedding <=> $1 AS distance \
        FROM {} \
        WHERE is_active \
        ORDER BY embedding <=> $1 ASC, id ASC \
        LIMIT $2",
        table.qualified()
    )
}

fn product_text_sql(table: &TableName, language: &str, field: ProductTextField) -> String {
    format!(
        "WITH query AS (SELECT plainto_tsquery('{language}', $1) AS q)
        SELECT {PRODUCT_COLUMNS}, ts_rank_cd({column}, query.q) AS text_rank
        FROM {table}
        CROSS JOIN query
        WHERE query.q <> to_tsquery('') AND is_active AND {column} @@ query.q
        ORDER BY text_rank DESC, id ASC
        LIMIT $2",
        language = escape_literal(language),
        column = field.tsv_column(),
        table = table.qualified()
    )
}

fn document_by_id_sql(table: &TableName) -> String {
    format!(
        "SELECT {DOCUMENT_COLUMNS} FROM {} WHERE id = $1",
        table.qualified()
    )
}

fn product_by_id_sql(table: &TableName) -> String {
    format!(
        "SELECT {PRODUCT_COLUMNS} FROM {} WHERE id = $1 AND is_active",
        table.qualified()
    )
}

fn product_by_code_sql(table: &TableName) -> String {
    format!(
        "SELECT {PRODUCT_COLUMNS} FROM {} \
        WHERE code = $1 AND is_active \
        ORDER BY id ASC \
        LIMIT 1",
        table.qualified()
    )
}

fn document_insert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} (content, window_content, source, embedding) \
            VALUES ($1, $2, $3, $4) \
            RETURNING id",
        table.qualified()
    )
}

fn product_insert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} \
            (code, name, description, embedding, price, image_url, stock_level, is_active) \
            VALUES ($1, $2, $3, $4, $5::float8, $6, $7, $8) \
            RETURNING id",
        table.qualified()
    )
}
