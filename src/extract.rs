//! Text extraction for uploaded documents.
//!
//! The extension picks the parser: `.docx` is read as WordprocessingML, `.pdf` page by page,
//! everything else as UTF-8 text with undecodable bytes dropped. Extraction never fails from
//! the caller's point of view; any parser error yields an empty string.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

/// Maximum decompressed bytes read from `word/document.xml`.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY_XML: &str = "word/document.xml";

#[derive(Debug, Error)]
enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// Document format recognised by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Office Open XML word-processor document.
    Docx,
    /// Page-based PDF document.
    Pdf,
    /// Anything else, decoded as text.
    PlainText,
}

impl FileKind {
    /// Classify `path` by its lower-cased extension.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("docx") => Self::Docx,
            Some("pdf") => Self::Pdf,
            _ => Self::PlainText,
        }
    }
}

/// Extract normalized text from the file at `path`.
///
/// Returns an empty string when the file cannot be read or parsed.
pub fn extract_text(path: &Path) -> String {
    let kind = FileKind::from_path(path);
    match try_extract(path, kind) {
        Ok(text) => text,
        Err(error) => {
            tracing::warn!(path = %path.display(), ?kind, %error, "Text extraction failed");
            String::new()
        }
    }
}

/// Run [`extract_text`] on a blocking worker thread.
///
/// A panic inside a parser is reported as an empty result.
pub async fn extract_text_blocking(path: PathBuf) -> String {
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || extract_text(&path)).await {
        Ok(text) => text,
        Err(error) => {
            tracing::warn!(path = %shown, %error, "Text extraction worker aborted");
            String::new()
        }
    }
}

fn try_extract(path: &Path, kind: FileKind) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    match kind {
        FileKind::Docx => extract_docx(&bytes),
        FileKind::Pdf => extract_pdf(&bytes),
        FileKind::PlainText => Ok(decode_utf8_dropping_invalid(&bytes).trim().to_string()),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|error| ExtractError::Pdf(error.to_string()))?;
    Ok(pages.join("\n").trim().to_string())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| ExtractError::Docx(error.to_string()))?;
    let entry = archive
        .by_name(DOCX_BODY_XML)
        .map_err(|error| ExtractError::Docx(error.to_string()))?;

    let mut xml = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut xml)?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(format!(
            "{DOCX_BODY_XML} exceeds size limit ({MAX_XML_ENTRY_BYTES} bytes)"
        )));
    }

    let paragraphs = body_paragraphs(&xml)?;
    Ok(paragraphs
        .into_iter()
        .filter(|paragraph| !paragraph.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string())
}

/// Collect the text of each direct child `w:p` of `w:body`, in document order.
fn body_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    // Depth at which the current body paragraph was opened.
    let mut paragraph_depth: Option<usize> = None;
    let mut current = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => {
                let name = element.local_name().as_ref().to_vec();
                if paragraph_depth.is_none() && name == b"p" && is_body_child(&path) {
                    paragraph_depth = Some(path.len());
                    current.clear();
                } else if paragraph_depth.is_some() && name == b"t" {
                    in_text = true;
                }
                path.push(name);
            }
            Ok(Event::Empty(element)) if paragraph_depth.is_some() => {
                match element.local_name().as_ref() {
                    b"tab" => current.push('\t'),
                    b"br" | b"cr" => current.push('\n'),
                    _ => {}
                }
            }
            Ok(Event::Text(text)) if in_text => {
                let value = text
                    .unescape()
                    .map_err(|error| ExtractError::Docx(error.to_string()))?;
                current.push_str(&value);
            }
            Ok(Event::CData(data)) if in_text => {
                current.push_str(&decode_utf8_dropping_invalid(&data));
            }
            Ok(Event::End(element)) => {
                path.pop();
                match element.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"p" if paragraph_depth == Some(path.len()) => {
                        paragraph_depth = None;
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(error) => return Err(ExtractError::Docx(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

fn is_body_child(path: &[Vec<u8>]) -> bool {
    path.last().is_some_and(|name| name == b"body")
}

/// Decode `bytes` as UTF-8, skipping invalid sequences instead of replacing them.
fn decode_utf8_dropping_invalid(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}
