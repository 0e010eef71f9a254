use crate::actuators::ActuatorRegistry;
use crate::error::Result;
use crate::mode::ModeStore;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// One append-only journal entry: an ordered list of (field, value) pairs.
///
/// Records in the same file may carry different field sets; the file header
/// is a best-effort hint derived from the first record, not a schema.
#[derive(Debug, Clone)]
pub struct JournalRecord {
    fields: Vec<(String, String)>,
}

impl JournalRecord {
    pub fn new(event_type: &str) -> Self {
        Self {
            fields: vec![("event_type".to_string(), event_type.to_string())],
        }
    }

    pub fn field(mut self, name: &str, value: impl ToString) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    fn prepend(&mut self, name: &str, value: String) {
        self.fields.insert(0, (name.to_string(), value));
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, value)| value.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Append-only CSV journal, one file per calendar day.
///
/// Appends are serialized by an internal lock so concurrent writers (the
/// dispatcher, the router, the scheduler) can never interleave partial
/// lines. A new file gets a header row built from the first record written
/// to it; later records with drifting field sets are written positionally
/// and never rejected.
pub struct EventJournal {
    data_path: PathBuf,
    write_lock: Mutex<()>,
}

impl EventJournal {
    pub fn new(data_path: impl Into<PathBuf>) -> Result<Self> {
        let data_path = data_path.into();
        std::fs::create_dir_all(&data_path)?;
        info!(path = %data_path.display(), "event journal ready");
        Ok(Self {
            data_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Journal file path for a given day.
    pub fn file_for_date(&self, date: NaiveDate) -> PathBuf {
        self.data_path
            .join(format!("{}_home_events.csv", date.format("%Y-%m-%d")))
    }

    /// Append one record to today's file, creating it (header included) on
    /// first write.
    pub fn append(&self, record: &JournalRecord) -> Result<()> {
        let _guard = self.write_lock.lock();

        let path = self.file_for_date(Local::now().date_naive());
        let is_new_file = !path.exists();

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if is_new_file {
            write_row(&mut file, record.field_names())?;
            debug!(path = %path.display(), "started new journal file");
        }
        write_row(&mut file, record.values())?;
        file.flush()?;
        Ok(())
    }
}

fn write_row<'a>(file: &mut std::fs::File, cells: impl Iterator<Item = &'a str>) -> Result<()> {
    let row: Vec<Cow<'a, str>> = cells.map(csv_escape).collect();
    writeln!(file, "{}", row.join(","))?;
    Ok(())
}

/// Quote a cell if it contains the separator, a quote, or a line break.
fn csv_escape(cell: &str) -> Cow<'_, str> {
    if cell.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", cell.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(cell)
    }
}

/// Journal front end that stamps every record with the timestamp, the
/// current mode, and an atomic snapshot of all actuator states before it is
/// appended. Write failures are logged and dropped; they never reach the
/// caller's control flow.
pub struct StatusRecorder {
    journal: Arc<EventJournal>,
    mode: Arc<ModeStore>,
    registry: Arc<ActuatorRegistry>,
}

impl StatusRecorder {
    pub fn new(
        journal: Arc<EventJournal>,
        mode: Arc<ModeStore>,
        registry: Arc<ActuatorRegistry>,
    ) -> Self {
        Self {
            journal,
            mode,
            registry,
        }
    }

    pub fn record(&self, mut record: JournalRecord) {
        // Snapshot is taken under one registry lock guard, so the columns of
        // this record cannot mix states from before and after a concurrent
        // write.
        for (device, on) in self.registry.snapshot().into_iter().rev() {
            record.prepend(&format!("{device}_state"), if on { "1" } else { "0" }.to_string());
        }
        record.prepend("mode", self.mode.get().as_str().to_string());
        record.prepend("timestamp", Local::now().format("%Y-%m-%d %H:%M:%S").to_string());

        if let Err(e) = self.journal.append(&record) {
            error!(
                event_type = record.get("event_type").unwrap_or("unknown"),
                "could not write journal record: {e}"
            );
        }
    }

    pub fn journal(&self) -> &Arc<EventJournal> {
        &self.journal
    }
}

/// Read a journal file back into rows of cells. Test and tooling helper;
/// the runtime never parses its own journal.
pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().map(parse_row).collect())
}

fn parse_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cell.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' if cell.is_empty() => quoted = true,
            ',' if !quoted => {
                cells.push(std::mem::take(&mut cell));
            }
            c => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}
