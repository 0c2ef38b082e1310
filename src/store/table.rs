//! Append-only CSV lead table.
//!
//! Rows already on disk are never rewritten. A new file starts with a UTF-8
//! BOM (so spreadsheet apps detect the encoding) and a header row. Later
//! appends only add bytes after the current end of the file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::pipeline::types::LeadRecord;

/// Column names, in order.
pub const HEADER: [&str; 4] = ["capturedAt", "sourceName", "sender", "content"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Summary of a successful append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendReport {
    /// Data rows present before the append. `None` when the existing table
    /// could not be read and rows were appended at the end of the file anyway.
    pub prior_rows: Option<usize>,
    /// Rows written by this call.
    pub appended: usize,
    /// True if this call created the table.
    pub created: bool,
}

/// The persisted lead table at a fixed path.
#[derive(Debug, Clone)]
pub struct LeadTable {
    path: PathBuf,
}

/// What a full pass over the existing table found.
struct Scan {
    /// Data rows, or the parse error that stopped the count.
    rows: Result<usize, csv::Error>,
    /// The file holds an odd number of `"` bytes, so its last field was
    /// never closed.
    open_quote: bool,
}

impl LeadTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count data rows (header excluded) by streaming the file.
    ///
    /// A table cut off inside a quoted field is an error even though a CSV
    /// reader would accept it.
    pub fn row_count(&self) -> Result<usize, StorageError> {
        let scan = self.scan()?;
        if scan.open_quote {
            return Err(StorageError::UnterminatedField {
                path: self.path.clone(),
            });
        }
        Ok(scan.rows?)
    }

    /// Append `rows` after the last existing row, creating the table if needed.
    ///
    /// An empty batch touches nothing. If the write fails partway, the file is
    /// cut back to its previous length.
    pub fn append(&self, rows: &[LeadRecord]) -> Result<AppendReport, StorageError> {
        if rows.is_empty() {
            return Ok(AppendReport::default());
        }

        let started = self.has_started().map_err(|source| StorageError::Append {
            path: self.path.clone(),
            source,
        })?;
        if started {
            self.append_existing(rows)
        } else {
            self.create(rows)
        }
    }

    /// Run [`append`](Self::append) on the blocking pool.
    pub async fn append_async(&self, rows: Vec<LeadRecord>) -> Result<AppendReport, StorageError> {
        let table = self.clone();
        tokio::task::spawn_blocking(move || table.append(&rows))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// True if the file holds more than a partially written BOM and header.
    ///
    /// Anything that is not a regular file counts as not started; `create`
    /// then reports why the path cannot be written.
    fn has_started(&self) -> io::Result<bool> {
        let preamble = preamble();
        let len = match fs::metadata(&self.path) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Ok(false),
        };
        if len >= preamble.len() as u64 {
            return Ok(true);
        }
        let bytes = fs::read(&self.path)?;
        Ok(!preamble.starts_with(&bytes))
    }

    /// Stream every record, counting `"` bytes on the way.
    fn scan(&self) -> Result<Scan, csv::Error> {
        let file = File::open(&self.path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(QuoteCounter::new(file));

        let mut record = csv::ByteRecord::new();
        let mut count = 0;
        let rows = loop {
            match reader.read_byte_record(&mut record) {
                Ok(true) => count += 1,
                Ok(false) => break Ok(count),
                Err(e) => break Err(e),
            }
        };

        let mut counter = reader.into_inner();
        if rows.is_err() {
            io::copy(&mut counter, &mut io::sink())?;
        }
        Ok(Scan {
            rows,
            open_quote: counter.quotes % 2 == 1,
        })
    }

    fn create(&self, rows: &[LeadRecord]) -> Result<AppendReport, StorageError> {
        let create_err = |source| StorageError::Create {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(create_err)?;
        }

        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend(encode_rows(rows, true)?);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(create_err)?;
        write_or_rollback(&mut file, &bytes, 0).map_err(create_err)?;

        info!(path = %self.path.display(), rows = rows.len(), "Created lead table");
        Ok(AppendReport {
            prior_rows: Some(0),
            appended: rows.len(),
            created: true,
        })
    }

    fn append_existing(&self, rows: &[LeadRecord]) -> Result<AppendReport, StorageError> {
        let append_err = |source| StorageError::Append {
            path: self.path.clone(),
            source,
        };

        let (prior_rows, open_quote) = match self.scan() {
            Ok(Scan { open_quote: true, .. }) => {
                warn!(
                    path = %self.path.display(),
                    "Table ends inside a quoted field; closing it before appending"
                );
                (None, true)
            }
            Ok(Scan { rows: Ok(count), .. }) => (Some(count), false),
            Ok(Scan { rows: Err(e), .. }) | Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not count existing rows; appending at end of file"
                );
                (None, false)
            }
        };

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(append_err)?;
        let original_len = file.metadata().map_err(append_err)?.len();

        let mut bytes = Vec::new();
        if open_quote {
            bytes.extend_from_slice(b"\"\n");
        } else if !ends_with_newline(&mut file, original_len).map_err(append_err)? {
            debug!(path = %self.path.display(), "Table lacks trailing newline; terminating last line");
            bytes.push(b'\n');
        }
        bytes.extend(encode_rows(rows, false)?);

        write_or_rollback(&mut file, &bytes, original_len).map_err(append_err)?;

        debug!(
            path = %self.path.display(),
            prior_rows = ?prior_rows,
            appended = rows.len(),
            "Appended rows to lead table"
        );
        Ok(AppendReport {
            prior_rows,
            appended: rows.len(),
            created: false,
        })
    }
}

/// BOM followed by the header line, as `create` writes them.
fn preamble() -> Vec<u8> {
    let mut bytes = UTF8_BOM.to_vec();
    bytes.extend_from_slice(HEADER.join(",").as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Serialize rows to CSV bytes, optionally preceded by the header row.
fn encode_rows(rows: &[LeadRecord], with_header: bool) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(with_header)
            .from_writer(&mut buf);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(csv::Error::from)?;
    }
    Ok(buf)
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Reader that counts `"` bytes passing through it.
struct QuoteCounter<R> {
    inner: R,
    quotes: u64,
}

impl<R> QuoteCounter<R> {
    fn new(inner: R) -> Self {
        Self { inner, quotes: 0 }
    }
}

impl<R: Read> Read for QuoteCounter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.quotes += buf[..n].iter().filter(|&&b| b == b'"').count() as u64;
        Ok(n)
    }
}

/// Write target that can be cut back after a failed write.
trait Rollback: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Rollback for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write `bytes` and sync; on failure truncate back to `original_len`.
fn write_or_rollback<W: Rollback>(out: &mut W, bytes: &[u8], original_len: u64) -> io::Result<()> {
    let result = out.write_all(bytes).and_then(|_| out.sync());
    if let Err(e) = result {
        if let Err(rollback) = out.truncate(original_len) {
            warn!(error = %rollback, "Failed to roll back partial append");
        }
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead(n: usize) -> LeadRecord {
        LeadRecord {
            captured_at: format!("2026-01-01 10:00:{n:02}"),
            source_name: "work1".into(),
            sender: format!("sender-{n}"),
            content: format!("CityA listing number {n}"),
        }
    }

    fn leads(range: std::ops::Range<usize>) -> Vec<LeadRecord> {
        range.map(lead).collect()
    }

    fn read_rows(path: &Path) -> Vec<LeadRecord> {
        let bytes = fs::read(path).unwrap();
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
        csv::Reader::from_reader(body)
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn first_append_creates_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table = LeadTable::new(dir.path().join("leads.csv"));

        let report = table.append(&leads(0..2)).unwrap();
        assert_eq!(
            report,
            AppendReport {
                prior_rows: Some(0),
                appended: 2,
                created: true
            }
        );

        let bytes = fs::read(table.path()).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert_eq!(text.lines().next(), Some(HEADER.join(",").as_str()));
        assert_eq!(read_rows(table.path()), leads(0..2));
    }

    #[test]
    fn appends_preserve_existing_bytes_and_accumulate_rows() {
        let dir = tempfile::tempdir().unwrap();
        let table = LeadTable::new(dir.path().join("leads.csv"));

        table.append(&leads(0..3)).unwrap();
        let first = fs::read(table.path()).unwrap();

        let report = table.append(&leads(3..4)).unwrap();
        assert_eq!(report.prior_rows, Some(3));
        assert!(!report.created);

        table.append(&leads(4..9)).unwrap();
        let after = fs::read(table.path()).unwrap();

        assert!(after.starts_with(&first));
        assert_eq!(table.row_count().unwrap(), 9);
        assert_eq!(read_rows(table.path()), leads(0..9));
    }

    #[test]
    fn empty_batch_performs_no_io() {
        let dir = tempfile::tempdir().unwrap();
        let table = LeadTable::new(dir.path().join("leads.csv"));
        assert_eq!(table.append(&[]).unwrap(), AppendReport::default());
        assert!(!table.path().exists());
    }

    #[test]
    fn zero_length_file_is_treated_as_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        fs::write(&path, b"").unwrap();
        let report = LeadTable::new(&path).append(&leads(0..1)).unwrap();
        assert!(report.created);
        assert_eq!(read_rows(&path), leads(0..1));
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let table = LeadTable::new(dir.path().join("out/2026/leads.csv"));
        table.append(&leads(0..1)).unwrap();
        assert_eq!(table.row_count().unwrap(), 1);
    }

    #[test]
    fn degraded_table_still_receives_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        // ragged row and no trailing newline
        let damaged = b"capturedAt,sourceName,sender,content\nonly,two";
        fs::write(&path, damaged).unwrap();

        let table = LeadTable::new(&path);
        assert!(table.row_count().is_err());

        let report = table.append(&leads(0..2)).unwrap();
        assert_eq!(report.prior_rows, None);
        assert_eq!(report.appended, 2);

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(damaged));
        assert_eq!(bytes[damaged.len()], b'\n');
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("CityA listing number 1"));
    }

    #[test]
    fn content_with_separators_stays_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let table = LeadTable::new(dir.path().join("leads.csv"));
        let tricky = LeadRecord {
            content: "CityA, 2 rooms\n\"quiet\" street".into(),
            ..lead(0)
        };
        table.append(std::slice::from_ref(&tricky)).unwrap();
        table.append(&leads(1..2)).unwrap();
        assert_eq!(table.row_count().unwrap(), 2);
        assert_eq!(read_rows(table.path())[0], tricky);
    }

    #[test]
    fn unwritable_destination_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();
        let table = LeadTable::new(blocker.join("leads.csv"));

        let err = table.append(&leads(0..1)).unwrap_err();
        assert!(matches!(err, StorageError::Create { .. }));
        assert_eq!(fs::read(&blocker).unwrap(), b"file");
    }

    #[test]
    fn directory_destination_is_a_create_error() {
        let dir = tempfile::tempdir().unwrap();
        let table = LeadTable::new(dir.path());
        let err = table.append(&leads(0..1)).unwrap_err();
        assert!(matches!(err, StorageError::Create { .. }));
    }

    #[test]
    fn cut_off_quoted_field_is_closed_before_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        let mut damaged = preamble();
        damaged.extend_from_slice(b"2026-01-01 09:00:00,work1,alice,\"CityA flat, cut off mid");
        fs::write(&path, &damaged).unwrap();

        let table = LeadTable::new(&path);
        assert!(matches!(
            table.row_count(),
            Err(StorageError::UnterminatedField { .. })
        ));

        let report = table.append(&leads(0..2)).unwrap();
        assert_eq!(report.prior_rows, None);
        assert_eq!(report.appended, 2);

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(&damaged));
        assert_eq!(table.row_count().unwrap(), 3);
        let rows = read_rows(&path);
        assert_eq!(rows[0].content, "CityA flat, cut off mid");
        assert_eq!(rows[1..], leads(0..2)[..]);
    }

    #[test]
    fn partial_preamble_is_treated_as_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        for partial in [&b"\xEF\xBB\xBF"[..], &b"\xEF\xBB\xBFcapturedAt,sour"[..]] {
            fs::write(&path, partial).unwrap();
            let report = LeadTable::new(&path).append(&leads(0..1)).unwrap();
            assert!(report.created);

            let bytes = fs::read(&path).unwrap();
            assert!(bytes.starts_with(&preamble()));
            assert_eq!(read_rows(&path), leads(0..1));
        }
    }

    #[test]
    fn header_only_table_is_appended_to() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        fs::write(&path, preamble()).unwrap();

        let report = LeadTable::new(&path).append(&leads(0..2)).unwrap();
        assert!(!report.created);
        assert_eq!(report.prior_rows, Some(0));
        assert_eq!(read_rows(&path), leads(0..2));
    }

    /// Writes up to `budget` bytes to the wrapped file, then fails.
    struct ShortFile {
        file: File,
        budget: usize,
    }

    impl Write for ShortFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("disk full"));
            }
            let n = buf.len().min(self.budget);
            let written = self.file.write(&buf[..n])?;
            self.budget -= written;
            Ok(written)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl Rollback for ShortFile {
        fn sync(&mut self) -> io::Result<()> {
            self.file.sync_data()
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.file.set_len(len)
        }
    }

    #[test]
    fn failed_write_leaves_existing_rows_intact() {
        let dir = tempfile::tempdir().unwrap();
        let table = LeadTable::new(dir.path().join("leads.csv"));
        table.append(&leads(0..3)).unwrap();
        let before = fs::read(table.path()).unwrap();

        let file = OpenOptions::new().append(true).open(table.path()).unwrap();
        let original_len = file.metadata().unwrap().len();
        let mut short = ShortFile { file, budget: 10 };
        let bytes = encode_rows(&leads(3..5), false).unwrap();

        let err = write_or_rollback(&mut short, &bytes, original_len).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(short.budget, 0);

        assert_eq!(fs::read(table.path()).unwrap(), before);
        assert_eq!(table.row_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn append_async_runs_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let table = LeadTable::new(dir.path().join("leads.csv"));
        let report = table.append_async(leads(0..4)).await.unwrap();
        assert_eq!(report.appended, 4);
        assert_eq!(table.row_count().unwrap(), 4);
    }
}
