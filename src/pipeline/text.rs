//! Text loading: turn a resolved input into one text dump.
//!
//! PDFs go through pdfium's text layer; each page's text is joined with a
//! form feed (`\f`) so the page-keyed parser can split on it, matching what
//! `pdftotext` emits for the plain-text dumps users upload.
//!
//! pdfium wraps a C++ library with thread-local state, so the work runs on
//! `spawn_blocking` rather than a Tokio worker thread.

use crate::error::ForgeError;
use crate::pipeline::input::{InputFormat, ResolvedInput};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Page separator inserted between pdfium pages.
pub const PAGE_BREAK: char = '\u{000C}';

/// Load the full text dump for a resolved input.
pub async fn load_text(
    input: &ResolvedInput,
    password: Option<&str>,
) -> Result<String, ForgeError> {
    let path = input.path().to_path_buf();
    match input.format() {
        InputFormat::Text => tokio::fs::read_to_string(&path).await.map_err(|e| {
            ForgeError::UnsupportedFormat {
                path: path.clone(),
                detail: e.to_string(),
            }
        }),
        InputFormat::Pdf => {
            let pwd = password.map(|s| s.to_string());
            tokio::task::spawn_blocking(move || pdf_text_blocking(&path, pwd.as_deref()))
                .await
                .map_err(|e| ForgeError::Internal(format!("Text extraction task panicked: {}", e)))?
        }
    }
}

/// Blocking implementation of PDF text extraction.
fn pdf_text_blocking(pdf_path: &Path, password: Option<&str>) -> Result<String, ForgeError> {
    let pdfium = Pdfium::new(bind_pdfium()?);

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ForgeError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                ForgeError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            ForgeError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut texts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page.text().map_err(|e| ForgeError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("page {}: {:?}", idx + 1, e),
        })?;
        let content = text.all();
        debug!("page {} → {} chars", idx + 1, content.chars().count());
        texts.push(content);
    }

    Ok(texts.join(&PAGE_BREAK.to_string()))
}

/// `PDFIUM_LIB_PATH` first, then the working directory, then the system.
fn bind_pdfium() -> Result<Box<dyn PdfiumLibraryBindings>, ForgeError> {
    if let Ok(lib) = std::env::var("PDFIUM_LIB_PATH") {
        if !lib.is_empty() {
            return Pdfium::bind_to_library(&lib)
                .map_err(|e| ForgeError::PdfiumBindingFailed(format!("{lib}: {:?}", e)));
        }
    }
    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ForgeError::PdfiumBindingFailed(format!("{:?}", e)))
}
