//! Dump command implementation.

use super::hex_encode;
use segwal_core::{Entry, Wal, WalConfig};
use serde::Serialize;
use std::path::Path;

/// Bytes of entry data shown in text output.
const PREVIEW_BYTES: usize = 32;

/// Log entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Entry index.
    pub index: u64,
    /// Data size in bytes.
    pub size: usize,
    /// Hex-encoded data.
    pub data: String,
    /// Data as text, if it is valid UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Dump output.
#[derive(Debug, Serialize)]
pub struct DumpResult {
    /// Hex-encoded metadata.
    pub metadata: String,
    /// Whether replay stopped at a torn final write.
    pub torn_tail: bool,
    /// Selected entries.
    pub entries: Vec<EntryInfo>,
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    from: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let wal = Wal::open_for_read(path, &WalConfig::default())?;
    let (metadata, entries) = wal.read_all()?;
    let torn_tail = wal.recovered_torn_tail();
    wal.close()?;

    let result = DumpResult {
        metadata: hex_encode(&metadata),
        torn_tail,
        entries: select(&entries, from, limit),
    };

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

/// Picks up to `limit` entries with index `from` or later.
fn select(entries: &[Entry], from: u64, limit: Option<usize>) -> Vec<EntryInfo> {
    entries
        .iter()
        .filter(|e| e.index >= from)
        .take(limit.unwrap_or(usize::MAX))
        .map(|e| EntryInfo {
            index: e.index,
            size: e.data.len(),
            data: hex_encode(&e.data),
            text: std::str::from_utf8(&e.data).ok().map(str::to_owned),
        })
        .collect()
}

fn print_text_output(result: &DumpResult) {
    println!("Metadata: {}", result.metadata);
    if result.torn_tail {
        println!("(torn final write discarded)");
    }
    println!();

    if result.entries.is_empty() {
        println!("No entries found");
        return;
    }

    for entry in &result.entries {
        let preview = match &entry.text {
            Some(text) if text.len() <= PREVIEW_BYTES => format!("{:?}", text),
            _ => {
                let shown = entry.data.len().min(PREVIEW_BYTES * 2);
                let ellipsis = if shown < entry.data.len() { "..." } else { "" };
                format!("{}{}", &entry.data[..shown], ellipsis)
            }
        };
        println!("[{:>8}] {:>6} bytes  {}", entry.index, entry.size, preview);
    }

    println!();
    println!("Total: {} entries", result.entries.len());
}
