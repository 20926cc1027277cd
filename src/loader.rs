//! Reads ingestion inputs from disk: plain-text and PDF FAQ/policy files and
//! product catalogue JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::LoadError;
use crate::models::{ProductListing, SourceDocument};

#[derive(Debug, Deserialize)]
struct CatalogueFile {
    items: Vec<ProductListing>,
}

/// Loads every `.txt` file under `dir` (recursively, sorted by path).
///
/// Invalid UTF-8 is replaced rather than rejected; each document's
/// `source_id` is its path.
pub fn load_text_documents(dir: &Path) -> Result<Vec<SourceDocument>, LoadError> {
    let mut documents = Vec::new();
    for path in files_with_extension(dir, "txt")? {
        let bytes = fs::read(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), "file is not valid UTF-8; replacing invalid bytes");
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };
        documents.push(SourceDocument::new(content, path.display().to_string()));
    }
    info!(dir = %dir.display(), documents = documents.len(), "loaded text documents");
    Ok(documents)
}

/// Loads every `.pdf` file under `dir` (recursively, sorted by path).
///
/// Each file becomes one document holding its extracted text. Files that
/// cannot be parsed, or that carry no text layer, are skipped with a warning.
pub fn load_pdf_documents(dir: &Path) -> Result<Vec<SourceDocument>, LoadError> {
    let mut documents = Vec::new();
    for path in files_with_extension(dir, "pdf")? {
        let bytes = fs::read(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        match pdf_extract::extract_text_from_mem(&bytes) {
            Ok(content) if !content.trim().is_empty() => {
                documents.push(SourceDocument::new(content, path.display().to_string()));
            }
            Ok(_) => warn!(path = %path.display(), "pdf has no extractable text; skipping"),
            Err(err) => warn!(path = %path.display(), error = %err, "unreadable pdf; skipping"),
        }
    }
    info!(dir = %dir.display(), documents = documents.len(), "loaded pdf documents");
    Ok(documents)
}

/// Text files first, then PDFs, each group in path order.
pub fn load_source_documents(dir: &Path) -> Result<Vec<SourceDocument>, LoadError> {
    let mut documents = load_text_documents(dir)?;
    documents.extend(load_pdf_documents(dir)?);
    Ok(documents)
}

/// Loads product listings from every `.json` file under `dir`, each shaped
/// as `{"items": [...]}`.
pub fn load_product_catalogue(dir: &Path) -> Result<Vec<ProductListing>, LoadError> {
    let mut listings = Vec::new();
    for path in files_with_extension(dir, "json")? {
        let raw = fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let file: CatalogueFile =
            serde_json::from_str(&raw).map_err(|source| LoadError::Json {
                path: path.clone(),
                source,
            })?;
        listings.extend(file.items);
    }
    info!(dir = %dir.display(), products = listings.len(), "loaded product catalogue");
    Ok(listings)
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, LoadError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| LoadError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}
