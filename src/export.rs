//! JSON-lines export of query frames.
//!
//! Each line is one [`FrameRecord`]. Missing values are written as `null`.

use crate::core::{Aggregation, Frame};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// The name of this producer.
pub const PRODUCER_NAME: &str = "binscope";

/// One exported query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub producer: String,
    pub version: String,
    /// Identifier shared by every record of one watch session
    pub session_id: Uuid,
    pub emitted_at: DateTime<Utc>,
    pub plot: String,
    pub mode: Aggregation,
    pub window: usize,
    pub sources: Vec<String>,
    /// Timestamp of each row, seconds since the Unix epoch
    pub times: Vec<f64>,
    /// Row values; `null` where no source contributed
    pub rows: Vec<Vec<Option<f64>>>,
}

impl FrameRecord {
    pub fn new(session_id: Uuid, plot: &str, mode: Aggregation, window: usize, frame: &Frame) -> Self {
        Self {
            producer: PRODUCER_NAME.to_string(),
            version: crate::VERSION.to_string(),
            session_id,
            emitted_at: Utc::now(),
            plot: plot.to_string(),
            mode,
            window,
            sources: frame.sources.clone(),
            times: frame.times.clone(),
            rows: frame
                .values
                .outer_iter()
                .map(|row| row.iter().map(|v| v.is_finite().then_some(*v)).collect())
                .collect(),
        }
    }
}

/// Appends frame records to a session file.
pub struct FrameExporter {
    session_id: Uuid,
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl FrameExporter {
    /// Create `session_<timestamp>.jsonl` in `dir`.
    pub fn create(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let session_id = Uuid::new_v4();
        let path = dir.join(format!(
            "session_{}_{}.jsonl",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &session_id.simple().to_string()[..8]
        ));
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self {
            session_id,
            path,
            writer,
            written: 0,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append one frame. Empty frames are not written.
    pub fn write(
        &mut self,
        plot: &str,
        mode: Aggregation,
        window: usize,
        frame: &Frame,
    ) -> std::io::Result<bool> {
        if frame.is_empty() {
            return Ok(false);
        }
        let record = FrameRecord::new(self.session_id, plot, mode, window, frame);
        serde_json::to_writer(&mut self.writer, &record).map_err(std::io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(true)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn frame() -> Frame {
        Frame {
            times: vec![10.5],
            sources: vec!["a".to_string()],
            values: array![[1.0, f64::NAN, 3.0]],
        }
    }

    #[test]
    fn test_record_maps_nan_to_null() {
        let record = FrameRecord::new(Uuid::nil(), "signal", Aggregation::Mean, 1, &frame());
        assert_eq!(record.rows, vec![vec![Some(1.0), None, Some(3.0)]]);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"rows\":[[1.0,null,3.0]]"));
        assert!(json.contains("\"mode\":\"mean\""));
    }

    #[test]
    fn test_exporter_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = FrameExporter::create(dir.path()).unwrap();

        assert!(exporter
            .write("signal", Aggregation::Mean, 1, &frame())
            .unwrap());
        assert!(!exporter
            .write("signal", Aggregation::Mean, 1, &Frame::empty())
            .unwrap());
        exporter.flush().unwrap();
        assert_eq!(exporter.written(), 1);

        let content = std::fs::read_to_string(exporter.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        let record: FrameRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record.session_id, exporter.session_id());
        assert_eq!(record.plot, "signal");
        assert_eq!(record.times, vec![10.5]);
    }
}
