//! Minimal CSV reading and writing
//!
//! Covers the comma separated sheets exchanged with spreadsheet tools:
//! quoted fields, doubled quotes, no embedded newlines.

use std::collections::HashMap;
use std::io::{self, Write};

/// Write one record, quoting fields that need it
pub fn write_row<W, I, S>(out: &mut W, fields: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let line = fields
        .into_iter()
        .map(|field| quote(field.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{}", line)
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one line into fields
pub fn parse_line(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields
}

/// Sheet with a header row, rows addressed by column name
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    columns: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    /// Parse text whose first non-empty line is the header
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        let columns = match lines.next() {
            Some(header) => parse_line(header)
                .into_iter()
                .enumerate()
                .map(|(i, name)| (name.trim().to_string(), i))
                .collect(),
            None => return Self::default(),
        };

        Self {
            columns,
            rows: lines.map(parse_line).collect(),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |fields| Row { sheet: self, fields })
    }
}

/// One data row of a [`Sheet`]
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    sheet: &'a Sheet,
    fields: &'a [String],
}

impl<'a> Row<'a> {
    /// Trimmed field, empty when the column or the cell is missing
    pub fn get(&self, column: &str) -> &'a str {
        self.sheet
            .columns
            .get(column)
            .and_then(|&i| self.fields.get(i))
            .map(|s| s.trim())
            .unwrap_or("")
    }

    /// First non-empty value among `columns`
    pub fn first_of(&self, columns: &[&str]) -> &'a str {
        columns
            .iter()
            .map(|c| self.get(c))
            .find(|v| !v.is_empty())
            .unwrap_or("")
    }
}
