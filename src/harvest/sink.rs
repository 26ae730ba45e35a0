//! Streaming delimited output for harvested rows.
//!
//! The sink appends one formatted record per harvested place as it arrives,
//! buffering nothing beyond the underlying `BufWriter`, so memory stays O(1)
//! in the number of rows. The sink owns its file handle exclusively.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;

use crate::error::AppError;
use crate::harvest::place::Place;

/// Header of the full harvest schema.
pub const FULL_HEADER: [&str; 6] = ["name", "country", "url", "x", "y", "WKT"];

/// Header of the compact two-column schema.
pub const COMPACT_HEADER: [&str; 2] = ["name", "WKT"];

/// Which columns the sink writes per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSchema {
    /// `name;country;url;x;y;WKT`
    Full,
    /// `name;WKT`
    Compact,
}

/// Streaming `;`-delimited CSV sink for harvested places.
#[derive(Debug)]
pub struct RecordSink {
    writer: csv::Writer<BufWriter<File>>,
    schema: SinkSchema,
    path: PathBuf,
    rows: u64,
}

impl RecordSink {
    /// Creates the output file and writes the header row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::IoSetup` if the file cannot be created, which is
    /// fatal for the run.
    pub fn create(path: impl AsRef<Path>, schema: SinkSchema) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            AppError::IoSetup(format!("Failed to create {}: {}", path.display(), e))
        })?;

        let mut writer = WriterBuilder::new()
            .delimiter(b';')
            .from_writer(BufWriter::new(file));

        let header: &[&str] = match schema {
            SinkSchema::Full => &FULL_HEADER,
            SinkSchema::Compact => &COMPACT_HEADER,
        };
        writer
            .write_record(header)
            .map_err(|e| AppError::RecordWrite(format!("Failed to write header: {}", e)))?;

        Ok(Self {
            writer,
            schema,
            path,
            rows: 0,
        })
    }

    /// Appends one place as a formatted record line.
    pub fn write_place(&mut self, place: &Place) -> Result<(), AppError> {
        let wkt = place.wkt_point();
        let result = match self.schema {
            SinkSchema::Full => self.writer.write_record([
                place.name.as_str(),
                place.country.as_str(),
                place.url.as_str(),
                place.longitude.as_str(),
                place.latitude.as_str(),
                wkt.as_str(),
            ]),
            SinkSchema::Compact => self
                .writer
                .write_record([place.name.as_str(), wkt.as_str()]),
        };
        result.map_err(|e| AppError::RecordWrite(format!("Failed to write record: {}", e)))?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, excluding the header.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// The output path this sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered output and closes the handle.
    ///
    /// Called on both the success and the interrupt shutdown path, so a
    /// partial harvest is never left silently truncated.
    pub fn finish(mut self) -> Result<PathBuf, AppError> {
        self.writer
            .flush()
            .map_err(|e| AppError::RecordWrite(format!("Failed to flush output: {}", e)))?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn place(name: &str, lat: &str, lon: &str, country: &str) -> Place {
        Place {
            name: name.to_string(),
            latitude: lat.to_string(),
            longitude: lon.to_string(),
            country: country.to_string(),
            url: "http://en.wikipedia.org/wiki/X".to_string(),
            abstract_text: String::new(),
        }
    }

    #[test]
    fn full_schema_writes_header_and_point_wkt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut sink = RecordSink::create(&path, SinkSchema::Full).unwrap();
        sink.write_place(&place("A", "41.98", "2.82", "http://dbpedia.org/resource/Spain"))
            .unwrap();
        assert_eq!(sink.rows_written(), 1);
        sink.finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "name;country;url;x;y;WKT");
        assert_eq!(
            lines.next().unwrap(),
            "A;http://dbpedia.org/resource/Spain;http://en.wikipedia.org/wiki/X;2.82;41.98;POINT(2.82 41.98)"
        );
    }

    #[test]
    fn compact_schema_writes_two_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut sink = RecordSink::create(&path, SinkSchema::Compact).unwrap();
        sink.write_place(&place("A", "1", "2", "Spain")).unwrap();
        sink.finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "name;WKT\nA;POINT(2 1)\n");
    }

    #[test]
    fn embedded_delimiter_is_quoted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut sink = RecordSink::create(&path, SinkSchema::Compact).unwrap();
        sink.write_place(&place("A;B", "1", "2", "")).unwrap();
        sink.finish().unwrap();

        // Read back through a csv reader: the field must round-trip intact.
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .from_path(&path)
            .unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "A;B");
    }

    #[test]
    fn create_in_missing_directory_is_fatal() {
        let err = RecordSink::create("/nonexistent-dir/out.csv", SinkSchema::Full).unwrap_err();
        assert!(matches!(err, AppError::IoSetup(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn coordinates_round_trip_without_rounding() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut sink = RecordSink::create(&path, SinkSchema::Full).unwrap();
        // Precision beyond f64 display defaults must survive untouched.
        sink.write_place(&place("A", "41.983100000000001", "2.824900", "C"))
            .unwrap();
        sink.finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("POINT(2.824900 41.983100000000001)"));
    }
}
