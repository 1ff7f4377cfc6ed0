//! Subscriber records consulted by the authorization server.
//!
//! The table is an ordered, read-only list.  It either comes from the
//! built-in [`SubscriberTable::reference`] set or is loaded from a text file
//! with one `subscriber_no tech paid` triple per line, e.g.
//!
//! ```text
//! 4085546805 4 1
//! 4086668821 3 0
//! ```
//!
//! `paid` is `1` for a paid-up subscriber; any other number means unpaid.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Records beyond this many lines are ignored.
pub const MAX_RECORDS: usize = 100;

/// Keyword that selects the built-in table instead of a file.
pub const REFERENCE_TABLE_KEYWORD: &str = "test";

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("subscriber file {path} could not be read: {source}")]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line} of subscriber file is not `subscriber_no tech paid`: {content:?}")]
    InvalidRecord { line: usize, content: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberRecord {
    pub subscriber_no: u32,
    pub tech: u8,
    pub paid: bool,
}

impl fmt::Display for SubscriberRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tech {} ({})",
            self.subscriber_no,
            self.tech,
            if self.paid { "paid" } else { "unpaid" }
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberTable {
    records: Vec<SubscriberRecord>,
}

impl SubscriberTable {
    pub fn new(records: Vec<SubscriberRecord>) -> Self {
        Self { records }
    }

    /// The three-subscriber table used for demonstrations and tests.
    pub fn reference() -> Self {
        Self::new(vec![
            SubscriberRecord {
                subscriber_no: 4085546805,
                tech: 4,
                paid: true,
            },
            SubscriberRecord {
                subscriber_no: 4086668821,
                tech: 3,
                paid: false,
            },
            SubscriberRecord {
                subscriber_no: 4086808821,
                tech: 2,
                paid: true,
            },
        ])
    }

    /// Resolve a command-line source: the keyword `test` or a file path.
    pub fn from_source(source: &str) -> Result<Self, SubscriberError> {
        if source == REFERENCE_TABLE_KEYWORD {
            log::info!("[auth] using reference subscriber table");
            return Ok(Self::reference());
        }
        Self::load(source)
    }

    /// Load a table from a whitespace-separated text file.
    ///
    /// A file with no records yields the reference table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SubscriberError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SubscriberError::FileNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&text)?;
        if table.is_empty() {
            log::warn!(
                "[auth] {} holds no records, using reference subscriber table",
                path.display()
            );
            return Ok(Self::reference());
        }
        log::info!(
            "[auth] loaded {} subscriber(s) from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse table text; blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self, SubscriberError> {
        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if records.len() >= MAX_RECORDS {
                log::warn!("[auth] maximum of {MAX_RECORDS} records reached, ignoring rest of file");
                break;
            }
            let record = parse_record(line).ok_or_else(|| SubscriberError::InvalidRecord {
                line: idx + 1,
                content: line.to_string(),
            })?;
            log::debug!("[auth] record {record}");
            records.push(record);
        }
        Ok(Self::new(records))
    }

    pub fn records(&self) -> &[SubscriberRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn parse_record(line: &str) -> Option<SubscriberRecord> {
    let mut fields = line.split_whitespace();
    let subscriber_no = fields.next()?.parse().ok()?;
    let tech = fields.next()?.parse().ok()?;
    let paid: u32 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(SubscriberRecord {
        subscriber_no,
        tech,
        paid: paid == 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_table_contents() {
        let table = SubscriberTable::reference();
        assert_eq!(table.len(), 3);
        assert_eq!(table.records()[1].subscriber_no, 4086668821);
        assert!(!table.records()[1].paid);
    }

    #[test]
    fn parse_reads_records_in_order() {
        let table = SubscriberTable::parse("4085546805 4 1\n\n4086668821\t3 0\n").unwrap();
        assert_eq!(
            table.records(),
            &[
                SubscriberRecord {
                    subscriber_no: 4085546805,
                    tech: 4,
                    paid: true
                },
                SubscriberRecord {
                    subscriber_no: 4086668821,
                    tech: 3,
                    paid: false
                },
            ]
        );
    }

    #[test]
    fn paid_other_than_one_is_unpaid() {
        let table = SubscriberTable::parse("1 2 7\n").unwrap();
        assert!(!table.records()[0].paid);
    }

    #[test]
    fn invalid_line_reports_line_number() {
        let err = SubscriberTable::parse("1 2 1\nnot a record\n").unwrap_err();
        assert!(matches!(err, SubscriberError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn too_many_fields_is_invalid() {
        assert!(SubscriberTable::parse("1 2 1 9\n").is_err());
    }

    #[test]
    fn subscriber_number_must_fit_u32() {
        assert!(SubscriberTable::parse("9999999999 2 1\n").is_err());
    }

    #[test]
    fn records_past_limit_are_ignored() {
        let text: String = (0..MAX_RECORDS + 5).map(|i| format!("{i} 2 1\n")).collect();
        let table = SubscriberTable::parse(&text).unwrap();
        assert_eq!(table.len(), MAX_RECORDS);
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = SubscriberTable::load("/nonexistent/subscribers.txt").unwrap_err();
        assert!(matches!(err, SubscriberError::FileNotFound { .. }));
    }

    #[test]
    fn load_from_disk() {
        let path = std::env::temp_dir().join(format!("subscribers-{}.txt", std::process::id()));
        std::fs::write(&path, "4086808821 2 1\n").unwrap();
        let table = SubscriberTable::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.records()[0].paid);
    }

    #[test]
    fn empty_file_falls_back_to_reference_table() {
        let path = std::env::temp_dir().join(format!("subscribers-empty-{}.txt", std::process::id()));
        std::fs::write(&path, "\n   \n").unwrap();
        let table = SubscriberTable::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(table, SubscriberTable::reference());
    }

    #[test]
    fn keyword_selects_reference_table() {
        assert_eq!(
            SubscriberTable::from_source("test").unwrap(),
            SubscriberTable::reference()
        );
    }
}
