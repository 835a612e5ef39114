//! Minimal delimited-text reading and writing
//!
//! The transform processors rewrite header-keyed delimited files and the
//! local directory target serializes tabular records; both go through this
//! module. Quoting follows the usual CSV rules: fields containing the
//! delimiter, a quote or a newline are wrapped in double quotes, embedded
//! quotes are doubled.

use std::path::Path;

use crate::errors::CsvError;

/// A parsed delimited file: a header row plus the data rows that matched the
/// header's width. Rows with a different field count are dropped, matching
/// how short or ragged lines have always been treated upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate rows as (header, value) pairs in column order.
    pub fn row_fields<'a>(&'a self, row: &'a [String]) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(row.iter().map(String::as_str))
    }
}

/// Read a delimited file whose first row is the header.
pub fn read_table(path: &Path, delimiter: char) -> Result<Table, CsvError> {
    let contents = std::fs::read_to_string(path).map_err(|e| CsvError::Unreadable {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut records = parse(&contents, delimiter, path)?;
    if records.is_empty() {
        return Ok(Table {
            headers: Vec::new(),
            rows: Vec::new(),
        });
    }

    let headers = records.remove(0);
    let width = headers.len();
    let rows = records.into_iter().filter(|row| row.len() == width).collect();

    Ok(Table { headers, rows })
}

/// Write a header row plus data rows to a delimited file.
pub fn write_table(path: &Path, table: &Table, delimiter: char) -> Result<(), CsvError> {
    let mut out = String::new();
    push_row(&mut out, &table.headers, delimiter);
    for row in &table.rows {
        push_row(&mut out, row, delimiter);
    }

    std::fs::write(path, out).map_err(|e| CsvError::Unwritable {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn push_row(out: &mut String, row: &[String], delimiter: char) {
    for (i, field) in row.iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        if field.contains(delimiter)
            || field.contains('"')
            || field.contains('\n')
            || field.contains('\r')
        {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

fn parse(contents: &str, delimiter: char, path: &Path) -> Result<Vec<Vec<String>>, CsvError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = contents.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                end_record(&mut records, &mut record, &mut field);
            }
            '\n' => end_record(&mut records, &mut record, &mut field),
            c if c == delimiter => {
                record.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CsvError::UnterminatedQuote {
            path: path.display().to_string(),
        });
    }
    if !field.is_empty() || !record.is_empty() {
        end_record(&mut records, &mut record, &mut field);
    }

    Ok(records)
}

fn end_record(records: &mut Vec<Vec<String>>, record: &mut Vec<String>, field: &mut String) {
    // A blank line between records parses as a single empty field; skip it.
    if record.is_empty() && field.is_empty() {
        return;
    }
    record.push(std::mem::take(field));
    records.push(std::mem::take(record));
}
