//! Persisted observation history.
//!
//! ## Format
//!
//! A delimited text table, one trial per row:
//!
//! ```text
//! amp_0,freq_hz_0,pulse_width_s_0,phase_rad_0,severity
//! 1.5,130,6e-05,0,-0.42
//! ```
//!
//! - Parameter columns are named `<base>_<channel>` and may appear in any
//!   order; unrelated columns are ignored.
//! - `severity` is optional. Tables without it are still readable but the
//!   optimizer can only echo the last row back.
//! - Headerless tables are accepted: columns are taken positionally in
//!   canonical order and a trailing severity column is assumed when the
//!   column count is `1 (mod 4)`.
//! - Rows may be comma or semicolon delimited. Empty or `nan` cells are
//!   missing values.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::types::{
    canonical_columns, parse_param_column, HistoryTable, ObservationRecord, ParamBase, PARAMS_PER_CHANNEL,
};

const SEVERITY_COLUMN: &str = "severity";

// ============================================================================
// Column Layout
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Index into the flattened canonical parameter vector
    Param(usize),
    Severity,
    Ignored,
}

#[derive(Debug, Clone)]
struct Layout {
    slots: Vec<Slot>,
    width: usize,
    has_severity: bool,
}

impl Layout {
    fn from_header(cells: &[&str]) -> Self {
        let slots: Vec<Slot> = cells
            .iter()
            .map(|cell| {
                let name = cell.trim().trim_matches('"');
                if name.eq_ignore_ascii_case(SEVERITY_COLUMN) {
                    return Slot::Severity;
                }
                match parse_param_column(name) {
                    Some((base, channel)) => Slot::Param(flat_index(base, channel)),
                    None => {
                        debug!(column = name, "Ignoring unknown history column");
                        Slot::Ignored
                    }
                }
            })
            .collect();
        Self::from_slots(slots)
    }

    fn positional(n_cols: usize) -> Self {
        let has_severity = n_cols % PARAMS_PER_CHANNEL == 1;
        let n_params = if has_severity { n_cols - 1 } else { n_cols };
        let mut slots: Vec<Slot> = (0..n_params).map(Slot::Param).collect();
        if has_severity {
            slots.push(Slot::Severity);
        }
        Self::from_slots(slots)
    }

    fn from_slots(slots: Vec<Slot>) -> Self {
        let width = slots
            .iter()
            .filter_map(|s| match s {
                Slot::Param(i) => Some(i + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let has_severity = slots.contains(&Slot::Severity);
        Self {
            slots,
            width,
            has_severity,
        }
    }
}

fn flat_index(base: ParamBase, channel: usize) -> usize {
    let offset = ParamBase::ALL.iter().position(|b| *b == base).unwrap_or(0);
    channel * PARAMS_PER_CHANNEL + offset
}

fn detect_delimiter(line: &str) -> char {
    if line.contains(';') && !line.contains(',') {
        ';'
    } else {
        ','
    }
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("null")
}

fn parse_cell(cell: &str, line: usize, column: usize) -> CoreResult<Option<f64>> {
    let cell = cell.trim().trim_matches('"');
    if is_missing(cell) {
        return Ok(None);
    }
    cell.parse::<f64>().map(Some).map_err(|_| CoreError::History {
        line,
        message: format!("column {} is not a number: '{cell}'", column + 1),
    })
}

// ============================================================================
// Reading
// ============================================================================

/// Parse a history table from text.
pub fn parse_history(text: &str) -> CoreResult<HistoryTable> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((first_no, first)) = lines.next() else {
        return Ok(HistoryTable {
            records: Vec::new(),
            has_severity_column: false,
        });
    };

    let delimiter = detect_delimiter(first);
    let first_cells: Vec<&str> = first.split(delimiter).collect();
    let headerless = first_cells
        .iter()
        .all(|c| parse_cell(c, first_no, 0).is_ok());

    let layout = if headerless {
        Layout::positional(first_cells.len())
    } else {
        Layout::from_header(&first_cells)
    };
    debug!(
        headerless,
        delimiter = %delimiter,
        width = layout.width,
        has_severity = layout.has_severity,
        "History layout"
    );

    let mut records = Vec::new();
    let body = headerless.then_some((first_no, first)).into_iter().chain(lines);
    for (line_no, line) in body {
        let cells: Vec<&str> = line.split(delimiter).collect();
        if cells.len() > layout.slots.len() {
            return Err(CoreError::History {
                line: line_no,
                message: format!("expected at most {} columns, got {}", layout.slots.len(), cells.len()),
            });
        }

        let mut params = vec![f64::NAN; layout.width];
        let mut severity = None;
        for (col, (cell, slot)) in cells.iter().zip(&layout.slots).enumerate() {
            match slot {
                Slot::Param(i) => {
                    if let Some(v) = parse_cell(cell, line_no, col)? {
                        params[*i] = v;
                    }
                }
                Slot::Severity => severity = parse_cell(cell, line_no, col)?.filter(|v| !v.is_nan()),
                Slot::Ignored => {}
            }
        }
        records.push(ObservationRecord { params, severity });
    }

    Ok(HistoryTable {
        records,
        has_severity_column: layout.has_severity,
    })
}

/// Read a history table from disk.
pub fn read_history(path: impl AsRef<Path>) -> CoreResult<HistoryTable> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let table = parse_history(&text)?;
    info!(
        path = %path.display(),
        rows = table.len(),
        channels = table.n_channels(),
        has_severity = table.has_severity_column,
        "Loaded history"
    );
    Ok(table)
}

// ============================================================================
// Writing
// ============================================================================

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

/// Serialise with a canonical header. The severity column is written when
/// the table had one or any row is scored.
pub fn format_history(table: &HistoryTable) -> String {
    let columns = canonical_columns(table.n_channels());
    let with_severity = table.has_severity_column || table.records.iter().any(|r| r.severity.is_some());

    let mut out = columns.join(",");
    if with_severity {
        if !columns.is_empty() {
            out.push(',');
        }
        out.push_str(SEVERITY_COLUMN);
    }
    out.push('\n');

    for record in &table.records {
        let mut cells: Vec<String> = (0..columns.len())
            .map(|j| record.params.get(j).copied().map_or_else(String::new, format_value))
            .collect();
        if with_severity {
            cells.push(record.severity.map_or_else(String::new, format_value));
        }
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

/// Write a history table to disk, replacing any existing file.
pub fn write_history(table: &HistoryTable, path: impl AsRef<Path>) -> CoreResult<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(format_history(table).as_bytes())?;
    writer.flush()?;
    debug!(path = %path.display(), rows = table.len(), "Wrote history");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_any_column_order() {
        let text = "severity,freq_hz_0,amp_0,phase_rad_0,pulse_width_s_0\n0.5,130,1.5,0,6e-05\n";
        let table = parse_history(text).unwrap();
        assert!(table.has_severity_column);
        assert_eq!(table.records[0].params, vec![1.5, 130.0, 6e-5, 0.0]);
        assert_eq!(table.records[0].severity, Some(0.5));
    }

    #[test]
    fn test_headerless_with_severity() {
        let text = "1,100,6e-5,0,0.3\n2,110,6e-5,0,-0.1\n";
        let table = parse_history(text).unwrap();
        assert!(table.has_severity_column);
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[1].severity, Some(-0.1));
    }

    #[test]
    fn test_headerless_without_severity() {
        let table = parse_history("1,100,6e-5,0,2,120,6e-5,0\n").unwrap();
        assert!(!table.has_severity_column);
        assert_eq!(table.records[0].params.len(), 8);
        assert_eq!(table.records[0].severity, None);
    }

    #[test]
    fn test_semicolon_delimited() {
        let table = parse_history("1;100;6e-5;0;0.3\n").unwrap();
        assert_eq!(table.records[0].params, vec![1.0, 100.0, 6e-5, 0.0]);
        assert_eq!(table.records[0].severity, Some(0.3));
    }

    #[test]
    fn test_missing_cells() {
        let text = "amp_0,freq_hz_0,pulse_width_s_0,phase_rad_0,severity\n1,,6e-5,0,\n";
        let table = parse_history(text).unwrap();
        assert!(table.records[0].params[1].is_nan());
        assert_eq!(table.records[0].severity, None);
    }

    #[test]
    fn test_bad_cell_reports_line() {
        let text = "amp_0,freq_hz_0,pulse_width_s_0,phase_rad_0,severity\n1,100,6e-5,0,0.1\n1,abc,6e-5,0,0.1\n";
        match parse_history(text) {
            Err(CoreError::History { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected history error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_text() {
        let table = parse_history("\n\n").unwrap();
        assert!(table.is_empty());
        assert!(!table.has_severity_column);
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let table = HistoryTable::new(vec![
            ObservationRecord::new(vec![1.25, 130.0, 6e-5, 0.1], -0.25),
            ObservationRecord::unscored(vec![0.5, 90.0, 1e-4, 3.0]),
        ]);
        write_history(&table, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("amp_0,freq_hz_0,pulse_width_s_0,phase_rad_0,severity\n"));
        assert_eq!(read_history(&path).unwrap(), table);
    }
}
