//! Memory-bounded partitioning of a harvested dataset by group key.
//!
//! The source file can hold hundreds of thousands of rows, so grouping is
//! done in two streaming passes instead of an in-memory group-by:
//!
//! 1. `discover_groups` streams the file once, counting occurrences per raw
//!    key and tallying rows whose key does not look like a resource
//!    identifier. Keys must occur strictly more than `min_count` times to
//!    survive, which keeps noise and typo keys from producing near-empty
//!    partition files.
//! 2. `partition` re-streams the file, routing each row to the open output
//!    handle of its group. Peak memory is O(number of open group files),
//!    never O(rows).
//!
//! Within a partition, row order matches source order; each handle is
//! opened exactly once and closed exactly once.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::AppError;
use crate::harvest::sink::FULL_HEADER;
use crate::progress::{ProgressObserver, ProgressUpdate};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Default minimum occurrence count; keys at or below it are dropped.
pub const DEFAULT_MIN_COUNT: u64 = 3;

/// Group keys are expected to be resource identifiers under this prefix.
pub const DEFAULT_RESOURCE_PREFIX: &str = "http://dbpedia.org/resource/";

/// Progress is reported every this many rows.
const PROGRESS_EVERY: u64 = 1_000;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Splitter parameters.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// A key must occur strictly more than this to become a partition.
    pub min_count: u64,
    /// Expected prefix of well-formed group keys.
    pub resource_prefix: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            min_count: DEFAULT_MIN_COUNT,
            resource_prefix: DEFAULT_RESOURCE_PREFIX.to_string(),
        }
    }
}

/// Result of the discovery pass: occurrence counts in first-seen order plus
/// row tallies.
#[derive(Debug, Default)]
pub struct GroupCatalogue {
    counts: IndexMap<String, u64>,
    /// Rows whose key did not match the expected resource shape.
    pub failed_rows: u64,
    /// Total data rows examined.
    pub total_rows: u64,
}

impl GroupCatalogue {
    /// Keys that survive the minimum-occurrence threshold, in first-seen
    /// order.
    pub fn surviving(&self, min_count: u64) -> Vec<String> {
        self.counts
            .iter()
            .filter(|(_, &count)| count > min_count)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Occurrence count for a key.
    pub fn count(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct keys seen, surviving or not.
    pub fn distinct_keys(&self) -> usize {
        self.counts.len()
    }
}

/// Result of the routing pass.
#[derive(Debug, Clone, Default)]
pub struct PartitionResult {
    /// Partition files written, one per surviving group.
    pub files: Vec<PathBuf>,
    /// Rows routed into a partition.
    pub rows_routed: u64,
    /// Rows whose key was filtered out in pass 1 (silently dropped).
    pub rows_dropped: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pass 1: discovery
// ─────────────────────────────────────────────────────────────────────────────

/// Streams the source file once, counting occurrences per group key.
///
/// Rows whose key column does not start with the configured resource prefix
/// are tallied as failed and never grouped. Blocking; see [`split_file`]
/// for the async wrapper.
///
/// # Errors
///
/// Returns `AppError::IoSetup` if the source cannot be opened and
/// `AppError::CsvSplit` if it lacks a `country` column.
pub fn discover_groups(
    source: &Path,
    config: &SplitConfig,
    observer: &dyn ProgressObserver,
) -> Result<GroupCatalogue, AppError> {
    let mut reader = open_source(source)?;
    let key_idx = column_index(&mut reader, "country")?;

    let mut catalogue = GroupCatalogue::default();

    for result in reader.byte_records() {
        let record = match result {
            Ok(record) => record,
            Err(_) => {
                catalogue.failed_rows += 1;
                continue;
            }
        };
        catalogue.total_rows += 1;

        let key = record
            .get(key_idx)
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .unwrap_or_default();

        if !key.starts_with(config.resource_prefix.as_str()) {
            catalogue.failed_rows += 1;
            continue;
        }

        *catalogue.counts.entry(key.to_string()).or_insert(0) += 1;

        if catalogue.total_rows % PROGRESS_EVERY == 0 {
            observer.update(ProgressUpdate {
                count: Some(catalogue.total_rows),
                total: None,
                message: Some(format!(
                    "reading groups (failed: {})",
                    catalogue.failed_rows
                )),
            });
        }
    }

    debug!(
        distinct = catalogue.distinct_keys(),
        failed = catalogue.failed_rows,
        total = catalogue.total_rows,
        "group discovery complete"
    );
    Ok(catalogue)
}

// ─────────────────────────────────────────────────────────────────────────────
// Pass 2: routing
// ─────────────────────────────────────────────────────────────────────────────

/// Wraps one open partition handle.
struct GroupWriter {
    writer: csv::Writer<BufWriter<File>>,
    path: PathBuf,
}

/// Re-streams the source file, routing each row to its group's output file.
///
/// One `{slug}_points.csv` per key in `groups`, written to `out_dir`
/// (created if absent). Rows whose key is not among `groups` are silently
/// dropped. Blocking; see [`split_file`] for the async wrapper.
///
/// # Errors
///
/// Any failure to create the output directory or open a per-group file is
/// fatal (`AppError::IoSetup`); a required source column missing is
/// `AppError::CsvSplit`.
pub fn partition(
    source: &Path,
    groups: &[String],
    out_dir: &Path,
    config: &SplitConfig,
    observer: &dyn ProgressObserver,
) -> Result<PartitionResult, AppError> {
    std::fs::create_dir_all(out_dir).map_err(|e| {
        AppError::IoSetup(format!(
            "Failed to create output directory {}: {}",
            out_dir.display(),
            e
        ))
    })?;

    // Open every partition handle up front; a single failure aborts the run
    // before any routing happens. Distinct keys can collapse to one slug
    // once non-ASCII is dropped, so duplicates get a numeric suffix rather
    // than two handles over the same file.
    let mut writers: HashMap<String, GroupWriter> = HashMap::with_capacity(groups.len());
    let mut used_slugs: HashSet<String> = HashSet::with_capacity(groups.len());
    for key in groups {
        let base = slugify(key, &config.resource_prefix);
        let mut slug = base.clone();
        let mut suffix = 2;
        while !used_slugs.insert(slug.clone()) {
            slug = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        let path = out_dir.join(format!("{}_points.csv", slug));
        let file = File::create(&path).map_err(|e| {
            AppError::IoSetup(format!("Failed to create {}: {}", path.display(), e))
        })?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(BufWriter::new(file));
        writer
            .write_record(FULL_HEADER)
            .map_err(|e| AppError::CsvSplit(format!("Failed to write header: {}", e)))?;
        writers.insert(key.clone(), GroupWriter { writer, path });
    }

    let mut reader = open_source(source)?;
    let selected = selected_columns(&mut reader)?;
    let key_idx = selected[1];

    let mut result = PartitionResult::default();

    for record in reader.byte_records() {
        let record = match record {
            Ok(record) => record,
            Err(_) => {
                result.rows_dropped += 1;
                continue;
            }
        };

        let key = record
            .get(key_idx)
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .unwrap_or_default();

        let Some(group) = writers.get_mut(key) else {
            result.rows_dropped += 1;
            continue;
        };

        let fields = selected
            .iter()
            .map(|&idx| record.get(idx).unwrap_or_default());
        group
            .writer
            .write_record(fields)
            .map_err(|e| AppError::CsvSplit(format!("Failed to route record: {}", e)))?;
        result.rows_routed += 1;

        if (result.rows_routed + result.rows_dropped) % PROGRESS_EVERY == 0 {
            observer.update(ProgressUpdate {
                count: Some(result.rows_routed),
                total: None,
                message: Some("filtering & splitting".to_string()),
            });
        }
    }

    // Flush and close each handle exactly once.
    for (_, group) in writers {
        let mut writer = group.writer;
        writer
            .flush()
            .map_err(|e| AppError::CsvSplit(format!("Failed to flush partition: {}", e)))?;
        result.files.push(group.path);
    }
    result.files.sort();

    info!(
        partitions = result.files.len(),
        routed = result.rows_routed,
        dropped = result.rows_dropped,
        "partitioning complete"
    );
    Ok(result)
}

/// Runs both passes on a blocking worker thread.
///
/// # Errors
///
/// Propagates the pass errors; a panicked worker surfaces as
/// `AppError::Internal`.
pub async fn split_file(
    source: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    config: SplitConfig,
    observer: Arc<dyn ProgressObserver>,
) -> Result<(GroupCatalogue, PartitionResult), AppError> {
    let source = source.as_ref().to_owned();
    let out_dir = out_dir.as_ref().to_owned();

    tokio::task::spawn_blocking(move || {
        let catalogue = discover_groups(&source, &config, &*observer)?;
        let groups = catalogue.surviving(config.min_count);
        let result = partition(&source, &groups, &out_dir, &config, &*observer)?;
        Ok((catalogue, result))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Split task join error: {}", e)))?
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Filesystem-safe partition name: strip the resource prefix, drop
/// non-ASCII bytes, and neutralize path separators.
pub fn slugify(key: &str, prefix: &str) -> String {
    key.strip_prefix(prefix)
        .unwrap_or(key)
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control())
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

fn open_source(source: &Path) -> Result<csv::Reader<BufReader<File>>, AppError> {
    let file = File::open(source).map_err(|e| {
        AppError::IoSetup(format!("Failed to open {}: {}", source.display(), e))
    })?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(BufReader::new(file)))
}

/// Index of a named column, matched case-insensitively.
fn column_index(
    reader: &mut csv::Reader<BufReader<File>>,
    name: &str,
) -> Result<usize, AppError> {
    let headers = reader
        .headers()
        .map_err(|e| AppError::CsvSplit(format!("Failed to read CSV headers: {}", e)))?;
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| AppError::CsvSplit(format!("CSV file has no '{}' column", name)))
}

/// Source indices of the routed columns, in output order.
fn selected_columns(reader: &mut csv::Reader<BufReader<File>>) -> Result<[usize; 6], AppError> {
    Ok([
        column_index(reader, "name")?,
        column_index(reader, "country")?,
        column_index(reader, "url")?,
        column_index(reader, "x")?,
        column_index(reader, "y")?,
        column_index(reader, "WKT")?,
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
