//! Where finished books go, and what they're called.

use chrono::{DateTime, Local};

use crate::prelude::*;

/// Base file name used when the operator doesn't choose one.
pub const DEFAULT_BASE_FILENAME: &str = "captured_book";

/// Format for the timestamp appended to output names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// How to name our output files.
#[derive(Clone, Debug, Default)]
pub struct OutputNaming {
    /// Directory for output. Defaults to the desktop.
    pub base_location: Option<PathBuf>,
    /// File name without extension or timestamp.
    pub base_filename: Option<String>,
    /// Leave the timestamp off the file name.
    pub no_timestamp: bool,
}

impl OutputNaming {
    /// The path for a PDF finished at `now`.
    pub fn pdf_path(&self, now: DateTime<Local>) -> PathBuf {
        let dir = self
            .base_location
            .clone()
            .unwrap_or_else(default_base_location);
        let base = self
            .base_filename
            .as_deref()
            .map(|name| name.trim().trim_end_matches(".pdf"))
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_BASE_FILENAME);
        if self.no_timestamp {
            dir.join(format!("{base}.pdf"))
        } else {
            dir.join(format!("{base}_{}.pdf", now.format(TIMESTAMP_FORMAT)))
        }
    }
}

/// The user's desktop if they have one, or else the current directory.
pub fn default_base_location() -> PathBuf {
    dirs::desktop_dir()
        .filter(|dir| dir.is_dir())
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Where to write the OCR text for a PDF: `book.pdf` becomes `book.pdf.txt`.
pub fn text_path_for(pdf: &Path) -> PathBuf {
    let mut name = pdf.file_name().unwrap_or_default().to_owned();
    name.push(".txt");
    pdf.with_file_name(name)
}

/// Where to save page images if we couldn't build a PDF: `book.pdf` becomes
/// `book_pages`.
pub fn pages_dir_for(pdf: &Path) -> PathBuf {
    let mut name = pdf.file_stem().unwrap_or_default().to_owned();
    name.push("_pages");
    pdf.with_file_name(name)
}
