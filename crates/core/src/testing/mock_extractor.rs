//! Mock text extractor for testing.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::extractor::{ExtractionError, PageText, Pages, TextExtractor};

/// Marker that makes a page fail to extract.
pub const CORRUPT_PAGE_MARKER: &str = "%%CORRUPT-PAGE%%";

/// Mock implementation of the TextExtractor trait.
///
/// Reads the file as UTF-8 text and splits pages on form feeds. A page
/// containing [`CORRUPT_PAGE_MARKER`] yields a page error; files registered
/// with [`MockExtractor::fail_file`] cannot be opened.
#[derive(Debug, Clone, Default)]
pub struct MockExtractor {
    failing: Arc<Mutex<HashSet<String>>>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make files with this name unreadable.
    pub fn fail_file(&self, file_name: &str) {
        self.failing.lock().unwrap().insert(file_name.to_string());
    }

    /// Names of files opened so far.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl TextExtractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    fn extract(&self, path: &Path) -> Result<Pages, ExtractionError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.opened.lock().unwrap().push(file_name.clone());

        if self.failing.lock().unwrap().contains(&file_name) {
            return Err(ExtractionError::Unreadable(format!(
                "mock failure for {}",
                file_name
            )));
        }

        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ExtractionError::Unreadable(format!("{} does not exist", path.display()))
            }
            _ => ExtractionError::Io(e),
        })?;

        let text = String::from_utf8_lossy(&bytes).into_owned();
        let pages: Vec<Result<PageText, ExtractionError>> = text
            .split('\u{000C}')
            .enumerate()
            .map(|(idx, page)| {
                let number = idx as u32 + 1;
                if page.contains(CORRUPT_PAGE_MARKER) {
                    Err(ExtractionError::PageFailed {
                        page: number,
                        message: "mock corrupt page".to_string(),
                    })
                } else {
                    Ok(PageText {
                        number,
                        text: page.to_string(),
                    })
                }
            })
            .collect();

        Ok(Box::new(pages.into_iter()))
    }
}
