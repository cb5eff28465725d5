//! Poppler-based extractor (`pdfinfo` + `pdftotext`).

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use super::{ExtractionError, PageText, Pages, TextExtractor};
use crate::config::ExtractionConfig;

/// Document facts reported by `pdfinfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PdfInfo {
    pub pages: u32,
    pub encrypted: bool,
}

/// Parse `pdfinfo` output.
pub fn parse_pdfinfo(output: &str) -> PdfInfo {
    let mut info = PdfInfo::default();
    for line in output.lines() {
        if let Some(value) = line.strip_prefix("Pages:") {
            info.pages = value.trim().parse().unwrap_or(0);
        } else if let Some(value) = line.strip_prefix("Encrypted:") {
            info.encrypted = value.trim().starts_with("yes");
        }
    }
    info
}

/// Pages to read for a document `pdfinfo` could open.
///
/// Owner-password restrictions (`Encrypted: yes (print:yes copy:no ...)`)
/// do not stop poppler from reading text, so only a document without pages
/// is rejected here. A required user password makes `pdfinfo` itself fail.
fn readable_pages(info: PdfInfo) -> Result<u32, ExtractionError> {
    if info.pages == 0 {
        return Err(ExtractionError::NoPages);
    }
    Ok(info.pages)
}

/// Map a failed `pdfinfo` run to an extraction error.
fn info_failure(stderr: &str) -> ExtractionError {
    if stderr.to_lowercase().contains("password") {
        ExtractionError::Encrypted
    } else {
        ExtractionError::Unreadable(stderr.trim().to_string())
    }
}

fn tool_error(e: std::io::Error, tool: &str) -> ExtractionError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ExtractionError::ToolNotFound(tool.to_string())
    } else {
        ExtractionError::Io(e)
    }
}

/// Extracts text page by page with poppler's command line tools.
#[derive(Debug, Clone)]
pub struct PdfToTextExtractor {
    pdftotext: String,
    pdfinfo: String,
}

impl PdfToTextExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            pdftotext: config.pdftotext.clone(),
            pdfinfo: config.pdfinfo.clone(),
        }
    }

    fn info(&self, path: &Path) -> Result<PdfInfo, ExtractionError> {
        let output = Command::new(&self.pdfinfo)
            .arg(path)
            .output()
            .map_err(|e| tool_error(e, &self.pdfinfo))?;

        if !output.status.success() {
            return Err(info_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        Ok(parse_pdfinfo(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn extract_page(pdftotext: &str, path: &Path, page: u32) -> Result<PageText, ExtractionError> {
    let page_arg = page.to_string();
    let output = Command::new(pdftotext)
        .args(["-enc", "UTF-8", "-f", &page_arg, "-l", &page_arg])
        .arg(path)
        .arg("-")
        .output()
        .map_err(|e| tool_error(e, pdftotext))?;

    if !output.status.success() {
        return Err(ExtractionError::PageFailed {
            page,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let text = String::from_utf8_lossy(&output.stdout)
        .replace('\0', "")
        .trim_end_matches('\u{000C}')
        .to_string();

    Ok(PageText { number: page, text })
}

impl TextExtractor for PdfToTextExtractor {
    fn name(&self) -> &str {
        "pdftotext"
    }

    fn extract(&self, path: &Path) -> Result<Pages, ExtractionError> {
        if !path.is_file() {
            return Err(ExtractionError::Unreadable(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let info = self.info(path)?;
        let pages = readable_pages(info)?;

        debug!(
            file = %path.display(),
            pages,
            restricted = info.encrypted,
            "Opened document"
        );

        let pdftotext = self.pdftotext.clone();
        let path: PathBuf = path.to_path_buf();
        Ok(Box::new(
            (1..=pages).map(move |page| extract_page(&pdftotext, &path, page)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_pdfinfo() {
        let output = "Title:          Trade Marks Journal\n\
                      Producer:       iText\n\
                      Encrypted:      no\n\
                      Pages:          1342\n\
                      Page size:      595 x 842 pts (A4)\n";
        assert_eq!(
            parse_pdfinfo(output),
            PdfInfo {
                pages: 1342,
                encrypted: false
            }
        );
    }

    #[test]
    fn test_parse_pdfinfo_encrypted() {
        let output = "Encrypted:      yes (print:yes copy:no change:no addNotes:no)\nPages: 3\n";
        let info = parse_pdfinfo(output);
        assert!(info.encrypted);
        assert_eq!(info.pages, 3);

        // Owner restrictions only; the text is still readable
        assert_eq!(readable_pages(info).unwrap(), 3);
    }

    #[test]
    fn test_readable_pages_rejects_empty_document() {
        let info = PdfInfo {
            pages: 0,
            encrypted: false,
        };
        assert!(matches!(readable_pages(info), Err(ExtractionError::NoPages)));
    }

    #[test]
    fn test_info_failure() {
        assert!(matches!(
            info_failure("Command Line Error: Incorrect password\n"),
            ExtractionError::Encrypted
        ));
        match info_failure("Syntax Error: Couldn't find trailer dictionary\n") {
            ExtractionError::Unreadable(message) => {
                assert_eq!(message, "Syntax Error: Couldn't find trailer dictionary")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_pdfinfo_garbage() {
        assert_eq!(parse_pdfinfo("nothing useful"), PdfInfo::default());
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let extractor = PdfToTextExtractor::new(&ExtractionConfig::default());
        let result = extractor.extract(Path::new("/nonexistent/journal.pdf"));
        assert!(matches!(result, Err(ExtractionError::Unreadable(_))));
    }

    #[test]
    fn test_missing_tool_reported() {
        let file = NamedTempFile::new().unwrap();
        let extractor = PdfToTextExtractor::new(&ExtractionConfig {
            pdfinfo: "definitely-not-a-real-pdfinfo".to_string(),
            ..Default::default()
        });
        let result = extractor.extract(file.path());
        assert!(matches!(result, Err(ExtractionError::ToolNotFound(_))));
    }
}
