//! Inspect command implementation.

use segwal_core::codec::Decoder;
use segwal_core::segment::list_segments;
use segwal_core::RecordKind;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

/// Summary of one segment file.
#[derive(Debug, Serialize)]
pub struct SegmentInfo {
    /// File name.
    pub file: String,
    /// Whether the segment is sealed or the active tail.
    pub state: &'static str,
    /// Sequence number (sealed segments only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// One past the last entry index (sealed segments only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_index: Option<u64>,
    /// File size in bytes, including pre-allocated space.
    pub size_bytes: u64,
    /// Bytes holding verified frames.
    pub used_bytes: u64,
    /// Number of records.
    pub records: usize,
    /// Number of entry records.
    pub entries: usize,
    /// Decode error, if the segment could not be read to the end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// WAL directory.
    pub path: String,
    /// Segments in log order.
    pub segments: Vec<SegmentInfo>,
    /// Temporary files that are not the tail.
    pub extra_temp_files: Vec<String>,
    /// Total size of all segment files.
    pub total_size: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects segment information for `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let listing = list_segments(path)?;
    if listing.is_empty() {
        return Err(format!("No WAL found at {}", path.display()).into());
    }

    let mut segments = Vec::new();
    for (file, name) in &listing.sealed {
        let mut info = summarize(file)?;
        info.state = "sealed";
        info.seq = Some(name.seq);
        info.next_index = Some(name.next_index);
        segments.push(info);
    }
    if let Some(tail) = &listing.tail {
        segments.push(summarize(tail)?);
    }

    let total_size = segments.iter().map(|s| s.size_bytes).sum();
    Ok(InspectResult {
        path: path.display().to_string(),
        segments,
        extra_temp_files: listing.extra_temps.iter().map(|p| file_name(p)).collect(),
        total_size,
    })
}

/// Decodes one segment on its own.
///
/// Segments start with a checksum anchor, so each can be verified without
/// the segments before it.
fn summarize(path: &Path) -> Result<SegmentInfo, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    let size_bytes = file.metadata()?.len();
    let mut decoder = Decoder::new(vec![file]);

    let mut records = 0;
    let mut entries = 0;
    let mut error = None;
    loop {
        match decoder.decode() {
            Ok(Some(record)) => {
                records += 1;
                if record.kind == RecordKind::Entry {
                    entries += 1;
                }
            }
            Ok(None) => break,
            Err(err) => {
                error = Some(err.to_string());
                break;
            }
        }
    }

    Ok(SegmentInfo {
        file: file_name(path),
        state: "tail",
        seq: None,
        next_index: None,
        size_bytes,
        used_bytes: decoder.last_offset(),
        records,
        entries,
        error,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_text_output(result: &InspectResult) {
    println!("WAL: {}", result.path);
    println!("================");
    println!();

    for segment in &result.segments {
        print!("{:42} {:6}", segment.file, segment.state);
        if let (Some(seq), Some(next)) = (segment.seq, segment.next_index) {
            print!(" seq={seq} next_index={next}");
        }
        print!(
            " records={} entries={} used={}/{} bytes",
            segment.records, segment.entries, segment.used_bytes, segment.size_bytes
        );
        if let Some(err) = &segment.error {
            print!(" ERROR: {err}");
        }
        println!();
    }

    if !result.extra_temp_files.is_empty() {
        println!();
        println!("Unused temporary files:");
        for name in &result.extra_temp_files {
            println!("  {name}");
        }
    }

    println!();
    println!("Total size: {} bytes", result.total_size);
}
