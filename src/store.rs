use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use crate::error::WatchError;
use crate::metrics::METRICS;
use crate::schema::{StandingsRow, StandingsSnapshot};
use crate::util;

// ------------------------------------------------------------
// Snapshot persistence
// ------------------------------------------------------------
//
// One CSV file per poll cycle, named after the snapshot's
// TimeIndex. Columns: Rank, Team Name, PMR, FPTS. Absent values
// render as empty fields, numerics as plain decimals. Team names
// are user-controlled text and get RFC-style quoting.
//
// The write happens only after the collector reports
// stabilization; readers of the directory never see mid-scroll
// state.

const HEADER: [&str; 4] = ["Rank", "Team Name", "PMR", "FPTS"];

/// Writes one snapshot into `dir`, creating the directory if
/// needed. Returns the path of the written file.
pub fn write_snapshot(dir: &Path, snap: &StandingsSnapshot) -> Result<PathBuf, WatchError> {
    fs::create_dir_all(dir)?;

    let path = dir.join(util::snapshot_filename(snap.time_index));
    let mut buf: Vec<u8> = Vec::new();

    write_row(&mut buf, &HEADER.map(str::to_string))?;
    for row in &snap.entries {
        write_row(&mut buf, &to_cells(row))?;
    }

    fs::write(&path, buf)?;
    METRICS.snapshots_written.fetch_add(1, Ordering::Relaxed);
    log::info!("persisted {} entries to {}", snap.len(), path.display());
    Ok(path)
}

/// Reads one snapshot file back. `time_index` comes from the
/// filename, not the file body.
pub fn read_snapshot(path: &Path, time_index: i64) -> Result<StandingsSnapshot, WatchError> {
    let text = fs::read_to_string(path)?;
    let mut rows = parse_rows(&text);

    // Header line is recognized by its first cell.
    if rows.first().is_some_and(|r| r.first().map(String::as_str) == Some("Rank")) {
        rows.remove(0);
    }

    let entries = rows.iter().map(|cells| from_cells(cells)).collect();
    Ok(StandingsSnapshot::new(time_index, entries))
}

/// Aggregates every snapshot file in `dir` into one historical
/// series ordered by TimeIndex. Files outside the naming scheme
/// are skipped silently; unreadable snapshot files are logged
/// and skipped so one bad file cannot sink the series.
pub fn load_series(dir: &Path) -> Result<Vec<StandingsSnapshot>, WatchError> {
    let mut series = Vec::new();
    if !dir.exists() {
        return Ok(series);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(time_index) = util::parse_snapshot_filename(name) else { continue };

        match read_snapshot(&entry.path(), time_index) {
            Ok(snap) => series.push(snap),
            Err(e) => log::warn!("skipping unreadable snapshot {name}: {e}"),
        }
    }

    series.sort_by_key(|s| s.time_index);
    Ok(series)
}

/// The pull-based presentation read: highest-TimeIndex snapshot
/// in the directory, or `None` when nothing has been persisted
/// yet.
pub fn latest_snapshot(dir: &Path) -> Result<Option<StandingsSnapshot>, WatchError> {
    Ok(load_series(dir)?.pop())
}

fn to_cells(row: &StandingsRow) -> [String; 4] {
    [
        row.rank.map(|v| v.to_string()).unwrap_or_default(),
        row.team_name.clone().unwrap_or_default(),
        row.pmr.map(|v| v.to_string()).unwrap_or_default(),
        row.fpts.map(|v| v.to_string()).unwrap_or_default(),
    ]
}

fn from_cells(cells: &[String]) -> StandingsRow {
    let cell = |i: usize| cells.get(i).map(String::as_str).filter(|s| !s.is_empty());
    StandingsRow {
        rank: cell(0).and_then(|s| s.parse().ok()),
        team_name: cell(1).map(str::to_string),
        pmr: cell(2).and_then(|s| s.parse().ok()),
        fpts: cell(3).and_then(|s| s.parse().ok()),
    }
}

// ------------------------------------------------------------
// Minimal CSV (quotes + CRLF tolerant, std-only)
// ------------------------------------------------------------

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Writes a single CSV row to any writer.
fn write_row<W: Write>(mut w: W, cells: &[String]) -> std::io::Result<()> {
    let mut first = true;
    for cell in cells {
        if !first {
            write!(w, ",")?;
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{cell}")?;
        }
    }
    writeln!(w)
}

/// Parses CSV text into rows of cells.
fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next(); // double-quote escape
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => row.push(std::mem::take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    // Flush a trailing field/row even without a final newline.
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}
