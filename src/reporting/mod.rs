//! Markdown output.
//!
//! Writers flush after every line so a killed run leaves a valid partial
//! report on disk. Write failures are logged and otherwise ignored; the
//! report is secondary to the terminal output.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;

/// Streaming writer for exploit-mode extraction results.
pub struct ReportWriter {
    file: Option<File>,
    path: Option<String>,
}

impl ReportWriter {
    /// A writer that discards everything, for runs without `--output`.
    pub fn disabled() -> Self {
        Self {
            file: None,
            path: None,
        }
    }

    pub fn create(path: &str) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::CacheIo(e.to_string()))?;
        let mut writer = Self {
            file: Some(file),
            path: Some(path.to_string()),
        };
        writer.write_line("# blindsight extraction results\n");
        Ok(writer)
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Start a table section: heading, row count, markdown header row.
    pub fn begin_table(&mut self, table: &str, row_count: &str, columns: &[String]) {
        self.write_line(&format!("## {table}\n"));
        self.write_line(&format!("* **Rows:** {row_count}\n"));
        self.write_line(&format!("| {} |", columns.join(" | ")));
        let separators = vec!["---"; columns.len()];
        self.write_line(&format!("| {} |", separators.join(" | ")));
    }

    pub fn append_row(&mut self, row: &[String]) {
        self.write_line(&format!("| {} |", row.join(" | ")));
    }

    pub fn end_table(&mut self) {
        self.write_line("");
    }

    fn write_line(&mut self, line: &str) {
        if let Some(file) = &mut self.file {
            if let Err(e) = writeln!(file, "{line}").and_then(|_| file.flush()) {
                tracing::debug!("report write failed: {e}");
            }
        }
    }
}

/// Writer for detect-mode results: one shared fenced block for URLs, one
/// `http` fenced block per raw request.
pub struct DetectWriter {
    file: Option<File>,
    path: Option<String>,
    url_mode: bool,
    url_block_open: bool,
    has_items: bool,
}

impl DetectWriter {
    pub fn create(path: Option<&str>, url_mode: bool) -> Result<Self> {
        let (file, path) = match path {
            Some(p) => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(p)
                    .map_err(|e| Error::CacheIo(e.to_string()))?;
                (Some(file), Some(p.to_string()))
            }
            None => (None, None),
        };

        let mut writer = Self {
            file,
            path,
            url_mode,
            url_block_open: false,
            has_items: false,
        };

        if url_mode {
            writer.write_line("## Potential SQLi vulnerable URLs\n");
        } else {
            writer.write_line("## Potential SQLi vulnerable requests\n");
        }
        Ok(writer)
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Record the custom headers the scan ran with, so results can be
    /// replayed faithfully.
    pub fn write_custom_headers(&mut self, headers: &[String]) {
        if headers.is_empty() {
            return;
        }
        self.write_line("### Custom headers used\n");
        self.write_line("```");
        for header in headers {
            self.write_line(header);
        }
        self.write_line("```\n");
    }

    /// A vulnerable URL with the parameter value replaced by `<PAYLOAD>`.
    pub fn write_url(&mut self, marked_url: &str) {
        if !self.url_block_open {
            self.write_line("```");
            self.url_block_open = true;
        }
        self.write_line(marked_url);
        self.has_items = true;
    }

    /// A vulnerable raw request with the parameter value replaced by
    /// `<PAYLOAD>`.
    pub fn write_request(&mut self, raw: &str) {
        self.write_line("```http");
        let trimmed = raw.trim_end_matches('\n');
        self.write_line(trimmed);
        self.write_line("```\n");
        self.has_items = true;
    }

    pub fn has_items(&self) -> bool {
        self.has_items
    }

    pub fn close(mut self) {
        if self.url_block_open {
            self.write_line("```");
        }
    }

    fn write_line(&mut self, line: &str) {
        if let Some(file) = &mut self.file {
            if let Err(e) = writeln!(file, "{line}").and_then(|_| file.flush()) {
                tracing::debug!("report write failed: {e}");
            }
        }
    }
}
