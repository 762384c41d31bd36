//! Extraction entry points: input path, URL or bytes in, passages out.

use crate::config::{ExtractionConfig, ExtractionLayout};
use crate::error::ForgeError;
use crate::output::ExtractionResult;
use crate::pipeline::cleanup::normalise_dump;
use crate::pipeline::input::{self, InputFormat};
use crate::pipeline::mini::MiniPdfParser;
use crate::pipeline::structured::StructuredPdfParser;
use crate::pipeline::text;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Extract passages from a PDF or text file, or an HTTP(S) URL to one.
///
/// # Errors
/// Input errors (missing file, download failure, unsupported format) and
/// PDF errors (corrupt, password) are fatal. Noise inside the text never is:
/// a document with no recognisable passages yields an empty result.
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ForgeError> {
    let start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Starting extraction: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let dump = text::load_text(&resolved, config.password.as_deref()).await?;
    debug!("{:?} dump: {} chars", resolved.format(), dump.chars().count());

    let result = parse_text(&dump, config.layout);
    info!(
        "Extraction complete: {} passages over {} pages in {}ms",
        result.metadata.total_passages,
        result.metadata.total_pages,
        start.elapsed().as_millis()
    );
    Ok(result)
}

/// Extract from an in-memory upload.
///
/// Text is parsed directly; PDF bytes go through a managed temp file that is
/// deleted on return.
pub async fn extract_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ForgeError> {
    let label = Path::new("<upload>");
    match input::sniff_format(label, bytes)? {
        InputFormat::Text => {
            let dump = std::str::from_utf8(bytes).map_err(|e| ForgeError::UnsupportedFormat {
                path: label.to_path_buf(),
                detail: e.to_string(),
            })?;
            Ok(parse_text(dump, config.layout))
        }
        InputFormat::Pdf => {
            let mut tmp = tempfile::NamedTempFile::new()
                .map_err(|e| ForgeError::Internal(format!("tempfile: {e}")))?;
            tmp.write_all(bytes)
                .map_err(|e| ForgeError::Internal(format!("tempfile write: {e}")))?;
            let path = tmp.path().to_string_lossy().to_string();
            // `tmp` is dropped (and the file deleted) when `extract` returns
            extract(&path, config).await
        }
    }
}

/// Run the layout parser(s) over an already-loaded dump.
///
/// `Auto` tries the structured layout and falls back to the mini layout
/// when it finds no passages.
pub fn parse_text(dump: &str, layout: ExtractionLayout) -> ExtractionResult {
    let dump = normalise_dump(dump);
    match layout {
        ExtractionLayout::Structured => StructuredPdfParser::new().parse(&dump),
        ExtractionLayout::Mini => MiniPdfParser::new().parse(&dump),
        ExtractionLayout::Auto => {
            let structured = StructuredPdfParser::new().parse(&dump);
            if !structured.passages.is_empty() {
                return structured;
            }
            debug!("structured layout found nothing; trying mini layout");
            let mini = MiniPdfParser::new().parse(&dump);
            if mini.passages.is_empty() {
                structured
            } else {
                mini
            }
        }
    }
}

/// Extract and write the result as pretty JSON.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ForgeError> {
    let result = extract(input_str, config).await?;
    write_json(output_path.as_ref(), &result).await?;
    Ok(result)
}

/// Write any serialisable value as pretty JSON, atomically.
pub async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ForgeError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ForgeError::Internal(format!("serialise: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ForgeError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json)
        .await
        .map_err(|e| ForgeError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ForgeError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ForgeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ForgeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ParserKind;

    const STRUCTURED: &str = "2025년 인제고1 2학기 중간고사\n\
        1. p12-no.3 Reading Power\n\
        Most people believe that habits are formed through sheer willpower alone.\n\
        대부분의 사람들은 습관이 의지력만으로 형성된다고 믿는다.\n";

    const MINI: &str = "올림포스2 3강\n\
        1. p30~31\n\
        Scientists have long wondered why some birds migrate thousands of miles.\n\
        ---\n\
        과학자들은 오랫동안 궁금해했다.\n";

    #[test]
    fn auto_prefers_structured() {
        let r = parse_text(STRUCTURED, ExtractionLayout::Auto);
        assert_eq!(r.metadata.parser, ParserKind::Structured);
        assert_eq!(r.passages.len(), 1);
    }

    #[test]
    fn forced_layouts() {
        let r = parse_text(STRUCTURED, ExtractionLayout::Mini);
        assert_eq!(r.metadata.parser, ParserKind::Mini);
        let r = parse_text(MINI, ExtractionLayout::Structured);
        assert_eq!(r.metadata.parser, ParserKind::Structured);
    }

    #[test]
    fn auto_on_noise_is_empty_not_error() {
        let r = parse_text("그냥 한국어 문장입니다.\n12345\n", ExtractionLayout::Auto);
        assert!(r.passages.is_empty());
        assert_eq!(r.metadata.total_passages, 0);
    }

    #[tokio::test]
    async fn bytes_as_text() {
        let r = extract_from_bytes(STRUCTURED.as_bytes(), &ExtractionConfig::default())
            .await
            .unwrap();
        assert_eq!(r.passages[0].problem_number, 1);
    }

    #[tokio::test]
    async fn bytes_rejected_when_binary() {
        let err = extract_from_bytes(&[0xff, 0xfe, 0x00, 0x80], &ExtractionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn writes_json_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dump.txt");
        std::fs::write(&input, STRUCTURED).unwrap();
        let out = dir.path().join("out/result.json");

        let r = extract_to_file(input.to_string_lossy(), &out, &ExtractionConfig::default())
            .await
            .unwrap();
        let written: ExtractionResult =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written, r);
        assert!(!dir.path().join("out/result.json.tmp").exists());
    }
}
