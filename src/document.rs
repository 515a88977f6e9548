use anyhow::{Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Provenance attached to documents and every chunk cut from them
pub type Metadata = BTreeMap<String, String>;

/// A document read from disk, ready for chunking
#[derive(Debug, Clone)]
pub struct Document {
    /// Extracted text
    pub text: String,
    /// The document's file name
    pub file_name: String,
    pub mime_type: String,
    pub metadata: Metadata,
}

impl Document {
    /// Read a document from a file path
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let file_name = path
            .file_name()
            .context("Invalid file name")?
            .to_str()
            .context("Invalid file name encoding")?
            .to_string();

        // Guessed from the extension; unknown ones fall through to octet-stream
        let mime = from_path(path).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        let text = read_document_content(path, &mime_type)?;

        // Provenance shown next to every source excerpt
        let file_size = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();

        let mut metadata = Metadata::new();
        metadata.insert("file_path".to_string(), path.display().to_string());
        metadata.insert("file_name".to_string(), file_name.clone());
        metadata.insert("file_type".to_string(), mime_type.clone());
        metadata.insert("file_size".to_string(), file_size.to_string());

        Ok(Document {
            text,
            file_name,
            mime_type,
            metadata,
        })
    }
}

/// Read every path in order. The first unreadable document aborts the batch.
pub fn read_documents<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Document>> {
    paths
        .iter()
        .map(|p| {
            Document::from_file(p)
                .with_context(|| format!("Failed to load document {}", p.as_ref().display()))
        })
        .collect()
}

/// Formats the reader can extract text from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        if mime_type.starts_with("application/pdf") {
            Some(DocumentKind::Pdf)
        } else if mime_type.starts_with("text/") {
            Some(DocumentKind::Text)
        } else {
            None
        }
    }
}

/// Extract normalised text from a document of the given MIME type
pub fn read_document_content<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<String> {
    let path = file_path.as_ref();
    let kind = DocumentKind::from_mime(mime_type).with_context(|| {
        format!(
            "Unsupported document format: {}. Only text and PDF files are supported.",
            mime_type
        )
    })?;

    let raw = match kind {
        DocumentKind::Pdf => {
            info!("Extracting text from PDF {}", path.display());
            extract_text(path)
                .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?
        }
        DocumentKind::Text => {
            info!("Reading text file {}", path.display());
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read text file: {}", path.display()))?
        }
    };

    // Extractors leave ragged spacing; paragraph breaks drive chunking
    let text = normalize_whitespace(&raw);
    if text.is_empty() {
        // Scanned PDFs have no text layer
        warn!("No text extracted from {}", path.display());
    }

    Ok(text)
}

/// Collapse runs of spaces, cap blank lines at one paragraph break, drop `\r`
fn normalize_whitespace(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut prev_char = ' ';
    let mut newline_count = 0;

    for c in text.chars().filter(|&c| c != '\r') {
        if c == '\n' {
            newline_count += 1;
            continue;
        }

        if newline_count > 0 {
            normalized.push_str(if newline_count >= 2 { "\n\n" } else { "\n" });
            newline_count = 0;
        }

        if !(c == ' ' && prev_char == ' ') {
            normalized.push(c);
        }
        prev_char = c;
    }

    normalized.trim().to_string()
}
