//! Session result output
//!
//! A finished session is written as a results CSV plus a JSON backup
//! with the same base name.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use swimtag_types::{ArrivalRecord, SessionResult};

use crate::error::{Error, Result};
use crate::table;

/// First cell of the optional race start row
pub const POINT_ZERO_KEY: &str = "inicio_punto_cero";

/// Results CSV header
pub const RESULTS_HEADER: [&str; 6] = ["posicion", "epc", "hora_llegada", "tiempo_carrera_s", "antena", "rssi"];

/// Default output base name
pub const DEFAULT_RESULTS_BASE: &str = "resultados_nadadores";

/// Race start as written in result files
pub fn format_point_zero(instant: &DateTime<Local>) -> String {
    instant.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Arrival time as written in result files
pub fn format_arrival(instant: &DateTime<Local>) -> String {
    instant.format("%H:%M:%S%.3f").to_string()
}

/// Write the results CSV
pub fn write_results_csv<W: Write>(result: &SessionResult, out: &mut W) -> Result<()> {
    if let Some(point_zero) = &result.point_zero {
        table::write_row(out, [POINT_ZERO_KEY.to_string(), format_point_zero(point_zero)])?;
    }

    table::write_row(out, RESULTS_HEADER)?;

    for record in &result.arrivals {
        table::write_row(out, results_row(record))?;
    }

    Ok(())
}

fn results_row(record: &ArrivalRecord) -> [String; 6] {
    [
        record.position.to_string(),
        record.epc.to_string(),
        format_arrival(&record.arrived_at),
        record.race_time_display(),
        record.antenna.to_string(),
        record.rssi.to_string(),
    ]
}

/// Write the whole session as pretty JSON
pub fn write_backup_json<W: Write>(result: &SessionResult, out: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, result)?;
    writeln!(out)?;
    Ok(())
}

/// Read a JSON backup written by [`write_backup_json`]
pub fn read_backup_json(path: impl AsRef<Path>) -> Result<SessionResult> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| Error::open(path, e))?;
    Ok(serde_json::from_str(&data)?)
}

/// Paths of the files written by [`save_results`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedResults {
    pub csv: PathBuf,
    pub json: PathBuf,
}

/// Write `<base>.csv` and `<base>.json`
pub fn save_results(result: &SessionResult, base: impl AsRef<Path>) -> Result<SavedResults> {
    let base = base.as_ref();
    let saved = SavedResults {
        csv: base.with_extension("csv"),
        json: base.with_extension("json"),
    };

    let mut csv = BufWriter::new(File::create(&saved.csv)?);
    write_results_csv(result, &mut csv)?;
    csv.flush()?;

    let mut json = BufWriter::new(File::create(&saved.json)?);
    write_backup_json(result, &mut json)?;
    json.flush()?;

    info!(
        arrivals = result.len(),
        "Results saved to {} and {}",
        saved.csv.display(),
        saved.json.display()
    );

    Ok(saved)
}

/// Status line printed when an arrival is accepted
pub fn summary_line(record: &ArrivalRecord) -> String {
    record.to_string()
}

/// Closing summary for a finished session
pub fn session_summary(result: &SessionResult) -> String {
    match result.point_zero {
        Some(point_zero) => format!(
            "Total swimmers registered: {} (start {})",
            result.len(),
            format_arrival(&point_zero)
        ),
        None => format!("Total swimmers registered: {}", result.len()),
    }
}
