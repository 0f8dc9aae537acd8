//! Roster join
//!
//! Matches a results CSV against the registration sheet produced by tag
//! provisioning, and optionally against a list of swimmer names, by EPC.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use swimtag_types::Epc;

use crate::error::{Error, Result};
use crate::report::{POINT_ZERO_KEY, RESULTS_HEADER};
use crate::table::{self, Sheet};

/// Default registration sheet
pub const DEFAULT_SHEET: &str = "tags_para_registro.csv";

/// Default name list
pub const DEFAULT_NAMES: &str = "nombres_nadadores.csv";

/// Default joined output
pub const DEFAULT_JOINED: &str = "resultados_con_nadadores.csv";

/// Joined CSV header
pub const JOINED_HEADER: [&str; 13] = [
    "posicion",
    "epc",
    "nombre",
    "numero_corredor",
    "categoria_nombre",
    "genero",
    "distancia",
    "hora_llegada",
    "tiempo_carrera_s",
    "antena",
    "rssi",
    "edad_min",
    "edad_max",
];

/// Registration data for one tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub runner_number: String,
    pub category: String,
    pub gender: String,
    pub distance: String,
    pub age_min: String,
    pub age_max: String,
}

/// Registration sheet plus optional names, keyed by normalized EPC
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: HashMap<String, RosterEntry>,
    names: HashMap<String, String>,
}

impl Roster {
    /// Load the sheet and, when given, the name list
    ///
    /// A missing name list is not an error.
    ///
    /// # Errors
    ///
    /// [`Error::FileNotFound`] when the sheet is missing and
    /// [`Error::Roster`] when it holds no EPCs.
    pub fn load(sheet: impl AsRef<Path>, names: Option<&Path>) -> Result<Self> {
        let sheet = sheet.as_ref();
        let sheet_text = std::fs::read_to_string(sheet).map_err(|e| Error::open(sheet, e))?;

        let names_text = match names {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(text) => Some(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("No name list at {}", path.display());
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let roster = Self::parse(&sheet_text, names_text.as_deref())?;
        info!(
            tags = roster.len(),
            names = roster.names.len(),
            "Loaded roster from {}",
            sheet.display()
        );
        Ok(roster)
    }

    /// Build from sheet and name list contents
    pub fn parse(sheet: &str, names: Option<&str>) -> Result<Self> {
        let sheet = Sheet::parse(sheet);
        if sheet.is_empty() {
            return Err(Error::Roster("registration sheet is empty".into()));
        }

        let entries: HashMap<String, RosterEntry> = sheet
            .rows()
            .filter_map(|row| {
                let key = Epc::normalize(row.get("epc_formateado"));
                if key.is_empty() {
                    return None;
                }
                let entry = RosterEntry {
                    name: row.first_of(&["nombre", "nombre_nadador"]).to_string(),
                    runner_number: row.get("numero_corredor").to_string(),
                    category: row.get("categoria_nombre").to_string(),
                    gender: row.get("genero").to_string(),
                    distance: row.get("distancia").to_string(),
                    age_min: row.get("edad_min").to_string(),
                    age_max: row.get("edad_max").to_string(),
                };
                Some((key, entry))
            })
            .collect();

        if entries.is_empty() {
            return Err(Error::Roster("registration sheet has no EPCs".into()));
        }

        let names = names.map(parse_names).unwrap_or_default();

        Ok(Self { entries, names })
    }

    /// Number of registered tags
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registration data for an EPC in any spacing or case
    pub fn lookup(&self, epc: &str) -> Option<&RosterEntry> {
        self.entries.get(&Epc::normalize(epc))
    }

    /// Swimmer name; the name list overrides the sheet
    pub fn name_for(&self, epc: &str) -> &str {
        let key = Epc::normalize(epc);
        self.names
            .get(&key)
            .map(String::as_str)
            .or_else(|| self.entries.get(&key).map(|e| e.name.as_str()))
            .unwrap_or("")
    }
}

fn parse_names(text: &str) -> HashMap<String, String> {
    Sheet::parse(text)
        .rows()
        .filter_map(|row| {
            let key = Epc::normalize(row.first_of(&["epc", "epc_formateado"]));
            let name = row.first_of(&["nombre", "nombre_nadador"]);
            (!key.is_empty() && !name.is_empty()).then(|| (key, name.to_string()))
        })
        .collect()
}

/// Joined results ready to be written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinedResults {
    /// Race start cell carried over from the results file
    pub point_zero: Option<String>,
    pub rows: Vec<[String; 13]>,
}

impl JoinedResults {
    /// Rows whose EPC was not in the roster
    pub fn unmatched(&self) -> usize {
        self.rows.iter().filter(|row| row[3].is_empty() && row[2].is_empty()).count()
    }
}

/// Join the text of a results CSV against the roster
///
/// Header rows are skipped and the race start row is preserved. Results
/// with no roster entry keep empty registration columns.
pub fn join(roster: &Roster, results: &str) -> JoinedResults {
    let mut joined = JoinedResults::default();

    for line in results.lines().filter(|l| !l.trim().is_empty()) {
        let fields = table::parse_line(line);
        let first = fields[0].trim();

        if first == POINT_ZERO_KEY {
            joined.point_zero = fields.get(1).cloned();
            continue;
        }
        if first == RESULTS_HEADER[0] || fields.len() < 2 {
            continue;
        }

        let cell = |i: usize| fields.get(i).cloned().unwrap_or_default();
        let epc = cell(1);
        let entry = roster.lookup(&epc).cloned().unwrap_or_default();

        joined.rows.push([
            cell(0),
            epc.clone(),
            roster.name_for(&epc).to_string(),
            entry.runner_number,
            entry.category,
            entry.gender,
            entry.distance,
            cell(2),
            cell(3),
            cell(4),
            cell(5),
            entry.age_min,
            entry.age_max,
        ]);
    }

    joined
}

/// Write joined results as CSV
pub fn write_joined<W: Write>(joined: &JoinedResults, out: &mut W) -> Result<()> {
    if let Some(point_zero) = &joined.point_zero {
        table::write_row(out, [POINT_ZERO_KEY, point_zero.as_str()])?;
    }

    table::write_row(out, JOINED_HEADER)?;
    for row in &joined.rows {
        table::write_row(out, row)?;
    }

    Ok(())
}

/// Join a results file on disk and write the output file
///
/// Returns the number of joined rows.
pub fn join_files(
    sheet: impl AsRef<Path>,
    names: Option<&Path>,
    results: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<usize> {
    let roster = Roster::load(sheet, names)?;

    let results = results.as_ref();
    let text = std::fs::read_to_string(results).map_err(|e| Error::open(results, e))?;
    let joined = join(&roster, &text);

    let unmatched = joined.unmatched();
    if unmatched > 0 {
        warn!(unmatched, "Some arrivals have no roster entry");
    }

    let output = output.as_ref();
    let mut out = BufWriter::new(File::create(output)?);
    write_joined(&joined, &mut out)?;
    out.flush()?;

    info!(rows = joined.rows.len(), "Joined results written to {}", output.display());

    Ok(joined.rows.len())
}
