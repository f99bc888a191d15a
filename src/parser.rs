use crate::types::RawRecord;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::borrow::Cow;
use tracing::debug;

/// Output of one parse pass: the header and the rows that lined up with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub records: Vec<RawRecord>,
    /// Rows whose field count did not match the header.
    pub dropped_rows: usize,
}

/// Splits delimited text into string-valued records keyed by the header row.
///
/// Never fails: rows that cannot be zipped against the header are counted in
/// `dropped_rows`, blank lines are skipped, and text without any header yields
/// an empty table (which the validator turns into a schema error).
pub fn parse(raw: &str) -> ParsedTable {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let raw = tighten_quoted_fields(raw);

    // The header is read by hand so blank lines before it are skipped too.
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(raw.as_bytes());

    let mut table = ParsedTable::default();

    for (line, result) in rdr.records().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                debug!(line, error = %e, "dropping unreadable row");
                table.dropped_rows += 1;
                continue;
            }
        };

        if is_blank(&row) {
            continue;
        }

        if table.headers.is_empty() {
            table.headers = row.iter().map(str::to_string).collect();
            continue;
        }

        if row.len() != table.headers.len() {
            debug!(
                line,
                expected = table.headers.len(),
                found = row.len(),
                "dropping row with mismatched field count"
            );
            table.dropped_rows += 1;
            continue;
        }

        let fields = table
            .headers
            .iter()
            .cloned()
            .zip(row.iter().map(str::to_string))
            .collect();
        table.records.push(RawRecord::new(fields));
    }

    table
}

/// Drops spaces and tabs between a field start and its opening quote.
///
/// The csv reader only treats `"` as a quote when it is the first byte of a
/// field, so `A, "x"` would keep its quotes and `A, "b, c"` would split on
/// the inner comma. Whitespace after a closing quote is left to `Trim::All`.
fn tighten_quoted_fields(raw: &str) -> Cow<'_, str> {
    if !raw.contains('"') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut pending = String::new();
    let mut at_field_start = true;
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            out.push(c);
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    out.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            continue;
        }

        match c {
            ' ' | '\t' if at_field_start => pending.push(c),
            '"' if at_field_start => {
                pending.clear();
                in_quotes = true;
                at_field_start = false;
                out.push(c);
            }
            _ => {
                out.push_str(&pending);
                pending.clear();
                out.push(c);
                at_field_start = matches!(c, ',' | '\n' | '\r');
            }
        }
    }
    out.push_str(&pending);

    Cow::Owned(out)
}

fn is_blank(row: &StringRecord) -> bool {
    row.len() <= 1 && row.iter().all(str::is_empty)
}
