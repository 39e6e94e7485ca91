//! Azure Functions blob trace reader
//!
//! Reads the CSV layout of the Azure Functions blob access trace. The first
//! line is a header naming the columns; only `AnonBlobETag`, `BlobBytes` and
//! `Timestamp` (milliseconds) are used.
//!
//! Fields may be double-quoted, with `""` standing for a literal quote.
//! Records must fit on one line; quoted newlines are not supported.

use std::collections::HashMap;
use std::io::BufRead;

use super::Record;
use crate::error::{Error, Result};

const FIELD_KEY: &str = "AnonBlobETag";
const FIELD_SIZE: &str = "BlobBytes";
const FIELD_TIMESTAMP: &str = "Timestamp";

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Forward-only reader over an Azure Functions blob trace
pub struct AzureFunctionsReader<R> {
    lines: std::io::Lines<R>,
    fields: HashMap<String, usize>,
    cursor: usize,
}

impl<R: BufRead> AzureFunctionsReader<R> {
    /// Wrap a buffered reader positioned at the header line
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            fields: HashMap::new(),
            cursor: 0,
        }
    }

    /// Number of lines consumed so far, header included
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn read_header(&mut self) -> Option<Result<()>> {
        let header = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(Error::Io(e))),
        };
        self.cursor += 1;

        for (i, field) in split_fields(&header).into_iter().enumerate() {
            self.fields.insert(field.trim().to_string(), i);
        }
        for required in [FIELD_KEY, FIELD_SIZE, FIELD_TIMESTAMP] {
            if !self.fields.contains_key(required) {
                return Some(Err(Error::TraceParse(format!(
                    "missing column {} in header",
                    required
                ))));
            }
        }
        Some(Ok(()))
    }

    fn field<'a>(&self, columns: &'a [String], name: &str) -> Option<&'a str> {
        self.fields
            .get(name)
            .and_then(|&i| columns.get(i))
            .map(|s| s.trim())
    }

    fn parse_line(&self, line: &str) -> Record {
        let columns = split_fields(line);

        let key = self.field(&columns, FIELD_KEY).unwrap_or_default();
        let size = self
            .field(&columns, FIELD_SIZE)
            .ok_or_else(|| "missing size".to_string())
            .and_then(|s| s.parse::<f64>().map_err(|e| e.to_string()));
        let timestamp = self
            .field(&columns, FIELD_TIMESTAMP)
            .ok_or_else(|| "missing timestamp".to_string())
            .and_then(|s| s.parse::<i64>().map_err(|e| e.to_string()))
            .and_then(|ms| {
                ms.checked_mul(NANOS_PER_MILLI)
                    .ok_or_else(|| format!("timestamp {} ms out of range", ms))
            });

        let mut record = Record::new(key, 0, 0);
        if let Ok(sz) = size {
            record.size = sz as u64;
        }
        if let Ok(ts) = timestamp {
            record.timestamp = ts;
        }

        if size.is_err() || timestamp.is_err() {
            record.error = Some(format!(
                "error on parse record, skip line {}: {}({:?}, {:?})",
                self.cursor,
                line,
                size.err(),
                timestamp.err()
            ));
        }
        record
    }
}

/// Split one CSV line into fields, unquoting double-quoted fields
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    quoted = false;
                }
            }
            '"' if field.trim().is_empty() => {
                field.clear();
                quoted = true;
            }
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

impl<R: BufRead> Iterator for AzureFunctionsReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == 0 {
            if let Err(e) = self.read_header()? {
                return Some(Err(e));
            }
        }

        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(Error::Io(e))),
            };
            self.cursor += 1;

            if line.trim().is_empty() {
                continue;
            }
            return Some(Ok(self.parse_line(&line)));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TRACE: &str = "Timestamp,AnonRegion,AnonBlobETag,BlobBytes\n\
                         1000,r1,etag-a,1048576\n\
                         1500,r1,etag-b,2.5e3\n\
                         oops,r2,etag-c,10\n";

    #[test]
    fn test_reads_records_in_order() {
        let reader = AzureFunctionsReader::new(Cursor::new(TRACE));
        let records: Vec<Record> = reader.map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key, "etag-a");
        assert_eq!(records[0].size, 1_048_576);
        assert_eq!(records[0].timestamp, 1000 * NANOS_PER_MILLI);
        assert!(!records[0].is_skippable());

        // Float sizes are truncated
        assert_eq!(records[1].size, 2500);
    }

    #[test]
    fn test_unparsable_line_is_skippable() {
        let reader = AzureFunctionsReader::new(Cursor::new(TRACE));
        let records: Vec<Record> = reader.map(|r| r.unwrap()).collect();

        let bad = &records[2];
        assert!(bad.is_skippable());
        assert_eq!(bad.key, "etag-c");
        assert_eq!(bad.size, 10);
        assert!(bad.error.as_ref().unwrap().contains("skip line 4"));
    }

    #[test]
    fn test_missing_header_column() {
        let mut reader = AzureFunctionsReader::new(Cursor::new("Timestamp,BlobBytes\n1,2\n"));
        let first = reader.next().unwrap();
        assert!(matches!(first, Err(Error::TraceParse(_))));
    }

    #[test]
    fn test_timestamp_overflow_is_skippable() {
        let input = format!("AnonBlobETag,BlobBytes,Timestamp\nk,1,{}\n", i64::MAX / 10);
        let mut reader = AzureFunctionsReader::new(Cursor::new(input));
        let record = reader.next().unwrap().unwrap();

        assert!(record.is_skippable());
        assert!(record.error.as_ref().unwrap().contains("out of range"));
        assert_eq!(record.timestamp, 0);
        assert_eq!(record.size, 1);
    }

    #[test]
    fn test_quoted_fields() {
        let input = "\"AnonBlobETag\",BlobBytes,Timestamp\n\
                     \"etag,with \"\"comma\"\"\",\"42\",7\n";
        let mut reader = AzureFunctionsReader::new(Cursor::new(input));
        let record = reader.next().unwrap().unwrap();

        assert!(!record.is_skippable());
        assert_eq!(record.key, "etag,with \"comma\"");
        assert_eq!(record.size, 42);
        assert_eq!(record.timestamp, 7 * NANOS_PER_MILLI);
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(split_fields("a,b,,c"), vec!["a", "b", "", "c"]);
        assert_eq!(split_fields("\"x,y\",z"), vec!["x,y", "z"]);
        assert_eq!(split_fields(""), vec![""]);
    }

    #[test]
    fn test_empty_input() {
        let mut reader = AzureFunctionsReader::new(Cursor::new(""));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_blank_lines_ignored() {
        let input = "AnonBlobETag,BlobBytes,Timestamp\n\nk,1,2\n\n";
        let reader = AzureFunctionsReader::new(Cursor::new(input));
        let records: Vec<Record> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 2 * NANOS_PER_MILLI);
    }
}
