//! Parser for pipe-delimited table exports
//!
//! The format has no quoting: every `|` separates two fields. A line may be
//! wrapped in one leading and one trailing delimiter (`|a|b|`), which is
//! stripped before splitting. Empty fields are kept as empty strings so that
//! column alignment survives blank values.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Field delimiter; reserved and cannot appear inside a value
pub const DELIMITER: char = '|';

/// Output of [`parse_delimited`]: the header tokens and the raw data rows
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInput {
    /// Header tokens, in file order (not yet validated)
    pub headers: Vec<String>,
    /// Data rows, in file order (not yet checked against the header width)
    pub rows: Vec<RawRow>,
}

/// A single tokenized data line
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line number in the source text
    pub line: usize,
    /// Trimmed tokens
    pub values: Vec<String>,
}

impl RawRow {
    /// Number of tokens on this line
    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// Parse delimited text into a header and raw rows
///
/// Blank lines are skipped. Fails with [`Error::EmptyInput`] unless at least
/// a header line and one data line remain.
pub fn parse_delimited(content: &str) -> Result<ParsedInput> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    // Bare '\r' is a line break too, the tokenizer below treats it as one
    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .flat_map(|(idx, line)| line.split('\r').map(move |part| (idx + 1, part.trim())))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    if lines.len() < 2 {
        return Err(Error::EmptyInput { lines: lines.len() });
    }

    let body = lines
        .iter()
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(DELIMITER as u8)
        .quoting(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut tokenized = Vec::with_capacity(lines.len());
    for (&(line_no, line), record) in lines.iter().zip(reader.records()) {
        let record = record?;
        tokenized.push(RawRow {
            line: line_no,
            values: unwrap_fields(line, &record),
        });
    }

    let mut tokenized = tokenized.into_iter();
    let headers = tokenized.next().map(|row| row.values).unwrap_or_default();

    Ok(ParsedInput {
        headers,
        rows: tokenized.collect(),
    })
}

/// Read a UTF-8 text file, reporting the path on failure
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })
}

/// True if `value` cannot be stored without breaking the line format
pub fn contains_reserved(value: &str) -> bool {
    value.contains(DELIMITER) || value.contains('\n') || value.contains('\r')
}

/// Drop the wrapping delimiters of `line` from its tokens and trim the rest
fn unwrap_fields(line: &str, record: &csv::StringRecord) -> Vec<String> {
    let mut fields: Vec<&str> = record.iter().collect();

    // A lone "|" is a leading delimiter only
    let leading = line.starts_with(DELIMITER);
    let trailing = line.len() > usize::from(leading) && line.ends_with(DELIMITER);

    if trailing {
        fields.pop();
    }
    if leading && !fields.is_empty() {
        fields.remove(0);
    }

    fields.into_iter().map(|f| f.trim().to_string()).collect()
}
