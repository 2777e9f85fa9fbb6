use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use crate::record::{ColumnIndices, Record, Rejection};

/// Immutable, timestamp-descending view of the feed.
pub type Snapshot = Arc<Vec<Record>>;

/// Change marker of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMarker {
    pub modified: SystemTime,
    pub len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Source absent; the snapshot is now empty.
    Missing,
    /// Marker unchanged; nothing was read.
    Unchanged,
    Reloaded {
        kept: usize,
        dropped_plate: usize,
        dropped_timestamp: usize,
    },
}

struct RefreshState {
    marker: Option<SourceMarker>,
    snapshot: Snapshot,
}

/// Keeps an in-memory copy of the feed that is re-parsed only when the file changes.
pub struct RecordStore {
    source: PathBuf,
    refresh_lock: Mutex<()>,
    state: RwLock<RefreshState>,
}

impl RecordStore {
    pub fn new(source: impl AsRef<Path>) -> Self {
        Self {
            source: source.as_ref().to_path_buf(),
            refresh_lock: Mutex::new(()),
            state: RwLock::new(RefreshState {
                marker: None,
                snapshot: Arc::new(Vec::new()),
            }),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Re-reads the source when its marker moved. Only I/O failures are errors.
    pub fn refresh(&self) -> Result<RefreshOutcome> {
        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let marker = match read_marker(&self.source)? {
            Some(marker) => marker,
            None => {
                self.swap(None, Arc::new(Vec::new()));
                tracing::debug!(source = %self.source.display(), "feed source missing, snapshot cleared");
                return Ok(RefreshOutcome::Missing);
            }
        };

        if self.marker() == Some(marker) {
            return Ok(RefreshOutcome::Unchanged);
        }

        let file = File::open(&self.source)
            .with_context(|| format!("failed to open feed {}", self.source.display()))?;
        let parsed = parse_feed(file)
            .with_context(|| format!("failed to read feed {}", self.source.display()))?;
        let kept = parsed.records.len();
        let outcome = RefreshOutcome::Reloaded {
            kept,
            dropped_plate: parsed.dropped_plate,
            dropped_timestamp: parsed.dropped_timestamp,
        };
        self.swap(Some(marker), Arc::new(parsed.records));
        tracing::info!(
            source = %self.source.display(),
            records = kept,
            dropped_plate = parsed.dropped_plate,
            dropped_timestamp = parsed.dropped_timestamp,
            "feed reloaded"
        );
        Ok(outcome)
    }

    pub fn current_snapshot(&self) -> Snapshot {
        self.read_state(|state| state.snapshot.clone())
    }

    pub fn marker(&self) -> Option<SourceMarker> {
        self.read_state(|state| state.marker)
    }

    /// Sorted distinct non-empty regions of the whole snapshot.
    pub fn regions(&self) -> Vec<String> {
        let snapshot = self.current_snapshot();
        snapshot
            .iter()
            .filter(|r| !r.region.is_empty())
            .map(|r| r.region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn swap(&self, marker: Option<SourceMarker>, snapshot: Snapshot) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = RefreshState { marker, snapshot };
    }

    fn read_state<T>(&self, f: impl FnOnce(&RefreshState) -> T) -> T {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&state)
    }
}

fn read_marker(path: &Path) -> Result<Option<SourceMarker>> {
    match fs::metadata(path) {
        Ok(meta) => {
            let modified = meta
                .modified()
                .with_context(|| format!("failed to read mtime of {}", path.display()))?;
            Ok(Some(SourceMarker {
                modified,
                len: meta.len(),
            }))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to stat feed {}", path.display()))
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub records: Vec<Record>,
    pub dropped_plate: usize,
    pub dropped_timestamp: usize,
}

/// Parses a whole feed into timestamp-descending records.
pub fn parse_feed<R: Read>(input: R) -> Result<ParsedFeed> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(err) if err.is_io_error() => return Err(err).context("failed to read feed header"),
        Err(err) => {
            tracing::warn!(error = %err, "feed header unreadable, treating feed as empty");
            return Ok(ParsedFeed::default());
        }
    };
    let columns = ColumnIndices::from_headers(&headers);
    if !columns.has_plate() {
        tracing::warn!("feed header has no plate column, every row will be dropped");
    }

    let mut parsed = ParsedFeed::default();
    let mut row = StringRecord::new();
    loop {
        match reader.read_record(&mut row) {
            Ok(true) => match columns.to_record(&row) {
                Ok(record) => parsed.records.push(record),
                Err(Rejection::MissingPlate) => parsed.dropped_plate += 1,
                Err(Rejection::InvalidTimestamp) => parsed.dropped_timestamp += 1,
            },
            Ok(false) => break,
            Err(err) if err.is_io_error() => return Err(err).context("failed to read feed row"),
            Err(err) => {
                tracing::warn!(error = %err, "malformed feed row skipped");
            }
        }
    }

    // stable: equal timestamps keep file order
    parsed
        .records
        .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    const HEADER: &str = "Índice,Pista,Hora,Nº placa,Veloc.km/h,Região\n";

    #[test]
    fn sorts_descending_and_keeps_file_order_for_ties() {
        let feed = format!(
            "{HEADER}1,1,2024-01-01 08:00:00,AAA1111,50,Norte\n\
             2,1,2024-01-02 08:00:00,BBB2222,50,Norte\n\
             3,1,2024-01-01 09:00:00,CCC3333,50,Sul\n\
             4,1,2024-01-01 08:00:00,DDD4444,50,Sul\n"
        );
        let parsed = parse_feed(feed.as_bytes()).expect("parse");
        let order: Vec<&str> = parsed.records.iter().map(|r| r.index.as_str()).collect();
        assert_eq!(order, vec!["2", "3", "1", "4"]);
    }

    #[test]
    fn counts_dropped_rows_by_reason() {
        let feed = format!(
            "{HEADER}1,1,2024-01-01 08:00:00,,50,Norte\n\
             2,1,someday,BBB2222,50,Norte\n\
             3,1,2024-01-01 09:00:00,CCC3333,50,Sul\n"
        );
        let parsed = parse_feed(feed.as_bytes()).expect("parse");
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.dropped_plate, 1);
        assert_eq!(parsed.dropped_timestamp, 1);
    }

    #[test]
    fn feed_without_plate_column_yields_nothing() {
        let feed = "Hora,Marca\n2024-01-01 08:00:00,Fiat\n";
        let parsed = parse_feed(feed.as_bytes()).expect("parse");
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.dropped_plate, 1);
    }

    #[test]
    fn missing_source_gives_empty_snapshot() {
        let tmp = tempdir().expect("tmp");
        let store = RecordStore::new(tmp.path().join("absent.csv"));
        assert_eq!(store.refresh().expect("refresh"), RefreshOutcome::Missing);
        assert!(store.current_snapshot().is_empty());
    }

    #[test]
    fn unchanged_marker_keeps_snapshot_identity() {
        let tmp = tempdir().expect("tmp");
        let path = tmp.path().join("placas.csv");
        let mut file = File::create(&path).expect("create");
        write!(file, "{HEADER}1,1,2024-01-01 08:00:00,AAA1111,50,Norte\n").expect("write");
        drop(file);

        let store = RecordStore::new(&path);
        assert!(matches!(
            store.refresh().expect("first"),
            RefreshOutcome::Reloaded { kept: 1, .. }
        ));
        let first = store.current_snapshot();
        assert_eq!(store.refresh().expect("second"), RefreshOutcome::Unchanged);
        assert!(Arc::ptr_eq(&first, &store.current_snapshot()));
    }

    #[test]
    fn changed_source_is_reparsed_and_removal_empties() {
        let tmp = tempdir().expect("tmp");
        let path = tmp.path().join("placas.csv");
        fs::write(&path, format!("{HEADER}1,1,2024-01-01 08:00:00,AAA1111,50,Norte\n"))
            .expect("write");
        let store = RecordStore::new(&path);
        store.refresh().expect("first");
        assert_eq!(store.regions(), vec!["Norte".to_string()]);

        fs::write(
            &path,
            format!(
                "{HEADER}1,1,2024-01-01 08:00:00,AAA1111,50,Norte\n\
                 2,1,2024-01-03 08:00:00,BBB2222,70,Leste\n"
            ),
        )
        .expect("rewrite");
        assert!(matches!(
            store.refresh().expect("second"),
            RefreshOutcome::Reloaded { kept: 2, .. }
        ));
        assert_eq!(store.current_snapshot()[0].plate, "BBB2222");
        assert_eq!(store.regions(), vec!["Leste".to_string(), "Norte".to_string()]);

        fs::remove_file(&path).expect("remove");
        assert_eq!(store.refresh().expect("third"), RefreshOutcome::Missing);
        assert!(store.current_snapshot().is_empty());
        assert!(store.marker().is_none());
    }
}
