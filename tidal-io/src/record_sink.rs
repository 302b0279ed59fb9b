// The terminal stage of a sub-plan's output pipeline (§4.6 `SinkDescriptor`):
// once a window/join operator has produced `Record`s, something has to
// consume them. `RecordSink` is that seam; `PrintSink`/`NullOutputSink`/
// `FileSink` cover the non-network `SinkDescriptor` variants (`Network` is
// handled separately by `NetworkSink`, since it speaks the shuffle fabric
// rather than records).

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use tidal_config::{FileFormat, FileWriteMode};
use tidal_types::Record;

use crate::error::IoError;

/// Consumes a batch of records materialized by an operator. Implementations
/// must be safe to call concurrently from whichever worker thread last owns
/// the sub-plan's output task.
pub trait RecordSink: Send + Sync {
    fn write(&self, records: &[Record]);
}

/// Discards every record; used for sub-plans run purely for their
/// side effects on stats (throughput benchmarks, smoke tests).
pub struct NullOutputSink;

impl RecordSink for NullOutputSink {
    fn write(&self, _records: &[Record]) {}
}

/// Writes each record's `Debug` form to stdout, one line per record.
pub struct PrintSink;

impl RecordSink for PrintSink {
    fn write(&self, records: &[Record]) {
        for record in records {
            println!("{record:?}");
        }
    }
}

/// Appends records to a file, either as JSON Lines or a minimal CSV (one
/// header row taken from the first record written, sorted by field name
/// since `Record` stores fields in a `BTreeMap`; full dialect handling
/// — quoting, escaping, reordering — is out of scope, see spec Non-goals
/// on format parsers).
pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
    format: FileFormat,
    header_written: Mutex<bool>,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>, format: FileFormat, mode: FileWriteMode) -> Result<Self, IoError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(matches!(mode, FileWriteMode::Append))
            .truncate(matches!(mode, FileWriteMode::Overwrite))
            .open(&path)
            .map_err(|source| IoError::OpenFile {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            format,
            header_written: Mutex::new(matches!(mode, FileWriteMode::Append)),
        })
    }

    fn write_one(&self, writer: &mut BufWriter<File>, record: &Record) -> std::io::Result<()> {
        match self.format {
            FileFormat::Json => {
                let fields: serde_json::Map<String, serde_json::Value> = record
                    .fields()
                    .map(|(name, value)| (name.to_string(), value_to_json(value)))
                    .collect();
                writeln!(writer, "{}", serde_json::Value::Object(fields))
            }
            FileFormat::Csv => {
                let mut header_written = self.header_written.lock();
                if !*header_written {
                    let header: Vec<&str> = record.fields().map(|(name, _)| name).collect();
                    writeln!(writer, "{}", header.join(","))?;
                    *header_written = true;
                }
                let row: Vec<String> = record
                    .fields()
                    .map(|(_, value)| csv_field(value))
                    .collect();
                writeln!(writer, "{}", row.join(","))
            }
        }
    }
}

impl RecordSink for FileSink {
    fn write(&self, records: &[Record]) {
        let mut writer = self.writer.lock();
        for record in records {
            if let Err(source) = self.write_one(&mut writer, record) {
                tracing::error!(%source, "failed to write record to sink file");
                return;
            }
        }
        let _ = writer.flush();
    }
}

fn value_to_json(value: &tidal_types::Value) -> serde_json::Value {
    use tidal_types::Value;
    match value {
        Value::U64(v) => serde_json::Value::from(*v),
        Value::I64(v) => serde_json::Value::from(*v),
        Value::F64(v) => serde_json::Value::from(*v),
        Value::Bool(v) => serde_json::Value::from(*v),
        Value::Text(v) => serde_json::Value::from(v.clone()),
    }
}

fn csv_field(value: &tidal_types::Value) -> String {
    use tidal_types::Value;
    match value {
        Value::U64(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::F64(v) => v.to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Text(v) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use tidal_types::Value;

    fn sample_record() -> Record {
        Record::new("ts")
            .with_field("ts", Value::U64(1))
            .with_field("v", Value::U64(42))
    }

    #[test]
    fn json_sink_writes_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink = FileSink::open(&path, FileFormat::Json, FileWriteMode::Overwrite).unwrap();

        sink.write(&[sample_record()]);
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["v"], 42);
    }

    #[test]
    fn csv_sink_writes_a_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let sink = FileSink::open(&path, FileFormat::Csv, FileWriteMode::Overwrite).unwrap();

        sink.write(&[sample_record(), sample_record()]);
        drop(sink);

        let file = File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "ts,v");
        assert_eq!(lines[1], "1,42");
    }

    #[test]
    fn null_output_sink_discards_everything() {
        NullOutputSink.write(&[sample_record()]);
    }
}
