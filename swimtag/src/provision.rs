//! Tag provisioning
//!
//! Generates structured EPCs for an event, one per swimmer:
//!
//! ```text
//! E2 80 YYYY DD CC GG NNNNNN 00 XX
//! │  │  │    │  │  │  │      │  └ XOR of the first 11 bytes
//! │  │  │    │  │  │  │      └ reserved
//! │  │  │    │  │  │  └ runner number (1..=999)
//! │  │  │    │  │  └ gender (F=01, M=02)
//! │  │  │    │  └ category index (1..=12)
//! │  │  │    └ distance code (1K=01, 2K=02, 3K=03, 5K=05)
//! │  │  └ event year
//! │  └ event id
//! └ EPC header
//! ```
//!
//! The decode path accepts any EPC; this layout only matters to the
//! registration sheet and to [`EpcFields::parse`].

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

use swimtag_types::Epc;

use crate::error::{Error, Result};
use crate::table;

const EPC_HEADER: u8 = 0xE2;
const EVENT_ID: u8 = 0x80;
const RESERVED: u8 = 0x00;
const DEFAULT_YEAR: u16 = 2026;

/// Highest runner number per group
pub const MAX_RUNNER_NUMBER: u32 = 999;

/// Default registration sheet
pub const DEFAULT_CSV: &str = "tags_para_registro.csv";

/// Default JSON export
pub const DEFAULT_JSON: &str = "tags_rfid.json";

/// Default tag writer list
pub const DEFAULT_WRITER_LIST: &str = "epcs_para_writer.txt";

/// Registration sheet header
pub const SHEET_HEADER: [&str; 7] = [
    "epc_formateado",
    "numero_corredor",
    "categoria_nombre",
    "genero",
    "distancia",
    "edad_min",
    "edad_max",
];

/// Race distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Distance {
    K1,
    K2,
    K3,
    K5,
}

impl Distance {
    pub const ALL: [Distance; 4] = [Self::K1, Self::K2, Self::K3, Self::K5];

    /// Byte stored in the EPC
    pub fn code(self) -> u8 {
        match self {
            Self::K1 => 0x01,
            Self::K2 => 0x02,
            Self::K3 => 0x03,
            Self::K5 => 0x05,
        }
    }

    pub fn meters(self) -> u32 {
        u32::from(self.code()) * 1_000
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::K1 => "1K",
            Self::K2 => "2K",
            Self::K3 => "3K",
            Self::K5 => "5K",
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.code() == code)
    }
}

impl FromStr for Distance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Provision(format!("invalid distance {:?} (1K, 2K, 3K, 5K)", s)))
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Swimmer gender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    pub fn code(self) -> u8 {
        match self {
            Self::Female => 0x01,
            Self::Male => 0x02,
        }
    }

    /// Single letter used on the command line
    pub fn letter(self) -> &'static str {
        match self {
            Self::Female => "F",
            Self::Male => "M",
        }
    }

    /// Name written to the registration sheet
    pub fn label(self) -> &'static str {
        match self {
            Self::Female => "Femenino",
            Self::Male => "Masculino",
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Female),
            0x02 => Some(Self::Male),
            _ => None,
        }
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "F" | "f" => Ok(Self::Female),
            "M" | "m" => Ok(Self::Male),
            other => Err(Error::Provision(format!("invalid gender {:?} (F or M)", other))),
        }
    }
}

/// Age category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub code: &'static str,
    pub name: &'static str,
    pub age_min: u8,
    pub age_max: u8,
}

/// Age categories in EPC index order (index = position + 1)
pub static CATEGORIES: [Category; 12] = [
    Category { code: "INF_A", name: "Infantil A", age_min: 8, age_max: 9 },
    Category { code: "INF_B", name: "Infantil B", age_min: 10, age_max: 11 },
    Category { code: "JUV_A", name: "Juvenil A", age_min: 12, age_max: 13 },
    Category { code: "JUV_B", name: "Juvenil B", age_min: 14, age_max: 15 },
    Category { code: "JUN_A", name: "Junior A", age_min: 16, age_max: 17 },
    Category { code: "JUN_B", name: "Junior B", age_min: 18, age_max: 19 },
    Category { code: "MAY_A", name: "Mayores A", age_min: 20, age_max: 24 },
    Category { code: "MAY_B", name: "Mayores B", age_min: 25, age_max: 29 },
    Category { code: "MAS_A", name: "Masters A", age_min: 30, age_max: 39 },
    Category { code: "MAS_B", name: "Masters B", age_min: 40, age_max: 49 },
    Category { code: "MAS_C", name: "Masters C", age_min: 50, age_max: 59 },
    Category { code: "MAS_D", name: "Masters D", age_min: 60, age_max: 99 },
];

/// Look up a category and its 1-based index by code
pub fn category(code: &str) -> Result<(u8, &'static Category)> {
    CATEGORIES
        .iter()
        .enumerate()
        .find(|(_, c)| c.code.eq_ignore_ascii_case(code.trim()))
        .map(|(i, c)| (i as u8 + 1, c))
        .ok_or_else(|| Error::Provision(format!("invalid category {:?}", code)))
}

/// XOR of the EPC bytes before the check byte
pub fn epc_checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, b| acc ^ b)
}

/// One generated tag with its registration data
///
/// Field names follow the registration sheet columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedTag {
    pub epc: Epc,
    #[serde(rename = "epc_formateado")]
    pub epc_formatted: String,
    #[serde(rename = "numero_corredor")]
    pub runner_number: u32,
    #[serde(rename = "categoria_codigo")]
    pub category_code: &'static str,
    #[serde(rename = "categoria_nombre")]
    pub category_name: &'static str,
    #[serde(rename = "edad_min")]
    pub age_min: u8,
    #[serde(rename = "edad_max")]
    pub age_max: u8,
    #[serde(rename = "genero")]
    pub gender: &'static str,
    #[serde(rename = "genero_codigo")]
    pub gender_code: &'static str,
    #[serde(rename = "distancia")]
    pub distance_m: u32,
    #[serde(rename = "distancia_codigo")]
    pub distance_code: &'static str,
    #[serde(rename = "prefijo_evento")]
    pub event_prefix: String,
    pub checksum: String,
}

/// Fields recovered from a provisioned EPC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpcFields {
    pub year: u16,
    pub distance: Distance,
    pub category: &'static Category,
    pub gender: Gender,
    pub runner_number: u32,
}

impl EpcFields {
    /// Parse an EPC written by [`EpcGenerator`]
    ///
    /// Returns `None` for foreign EPCs or a failed check byte.
    pub fn parse(epc: &Epc) -> Option<Self> {
        let bytes = epc.to_bytes();
        if bytes.len() != 12 || bytes[0] != EPC_HEADER || bytes[1] != EVENT_ID {
            return None;
        }
        if epc_checksum(&bytes[..11]) != bytes[11] {
            return None;
        }

        let category_index = usize::from(bytes[5]);
        Some(Self {
            year: u16::from_be_bytes([bytes[2], bytes[3]]),
            distance: Distance::from_code(bytes[4])?,
            category: CATEGORIES.get(category_index.checked_sub(1)?)?,
            gender: Gender::from_code(bytes[6])?,
            runner_number: u32::from_be_bytes([0, bytes[7], bytes[8], bytes[9]]),
        })
    }
}

impl fmt::Display for EpcFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} {}",
            self.runner_number,
            self.category.name,
            self.gender.label(),
            self.distance
        )
    }
}

/// Tags requested for one distance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceConfig {
    pub distance: Distance,
    /// (category code, gender, count)
    pub groups: Vec<(String, Gender, u32)>,
}

/// Share of an automatic distribution assigned to one distance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceQuota {
    pub distance: Distance,
    pub total: u32,
    pub female: Option<u32>,
    pub male: Option<u32>,
    /// Categories to spread over; all when `None`
    pub categories: Option<Vec<String>>,
}

impl DistanceQuota {
    pub fn new(distance: Distance, total: u32) -> Self {
        Self {
            distance,
            total,
            female: None,
            male: None,
            categories: None,
        }
    }

    /// Female/male counts, half and half unless set
    fn split(&self) -> Result<(u32, u32)> {
        let total = self.total;
        let over = |what: &str, n: u32| {
            Error::Provision(format!(
                "{}: {} count {} exceeds {}",
                self.distance, what, n, total
            ))
        };

        match (self.female, self.male) {
            (Some(f), Some(m)) if f + m != total => Err(Error::Provision(format!(
                "{}: female ({}) + male ({}) must equal {}",
                self.distance, f, m, total
            ))),
            (Some(f), Some(m)) => Ok((f, m)),
            (Some(f), None) => total.checked_sub(f).map(|m| (f, m)).ok_or_else(|| over("female", f)),
            (None, Some(m)) => total.checked_sub(m).map(|f| (f, m)).ok_or_else(|| over("male", m)),
            (None, None) => Ok((total / 2, total - total / 2)),
        }
    }
}

/// Spread `total` evenly over `slots`, remainder to the first ones
pub fn distribute(total: u32, slots: usize) -> Vec<u32> {
    if slots == 0 {
        return Vec::new();
    }
    let base = total / slots as u32;
    let rest = total as usize % slots;
    (0..slots).map(|i| base + u32::from(i < rest)).collect()
}

/// Build race configurations spreading `total` swimmers over categories
///
/// # Errors
///
/// [`Error::Provision`] when the quotas do not add up to `total`, a gender
/// split is inconsistent or a category code is unknown.
pub fn auto_distribution(total: u32, quotas: &[DistanceQuota]) -> Result<Vec<RaceConfig>> {
    if quotas.is_empty() {
        return Err(Error::Provision("at least one distance is required".into()));
    }

    let sum: u32 = quotas.iter().map(|q| q.total).sum();
    if sum != total {
        return Err(Error::Provision(format!(
            "distance counts must add up to {}, they add up to {}",
            total, sum
        )));
    }

    quotas
        .iter()
        .map(|quota| {
            let codes: Vec<String> = match &quota.categories {
                Some(codes) => {
                    for code in codes {
                        category(code)?;
                    }
                    codes.clone()
                }
                None => CATEGORIES.iter().map(|c| c.code.to_string()).collect(),
            };

            let (female, male) = quota.split()?;

            let mut groups = Vec::new();
            for (gender, count) in [(Gender::Female, female), (Gender::Male, male)] {
                for (code, n) in codes.iter().zip(distribute(count, codes.len())) {
                    if n > 0 {
                        groups.push((code.clone(), gender, n));
                    }
                }
            }

            debug!(distance = %quota.distance, female, male, groups = groups.len(), "Distributed quota");

            Ok(RaceConfig {
                distance: quota.distance,
                groups,
            })
        })
        .collect()
}

#[derive(Serialize)]
struct JsonExport<'a> {
    evento: &'a str,
    fecha_generacion: NaiveDateTime,
    total_tags: usize,
    tags: &'a [ProvisionedTag],
}

/// EPC generator for one event
#[derive(Debug, Clone)]
pub struct EpcGenerator {
    event_prefix: String,
    year: u16,
    tags: Vec<ProvisionedTag>,
}

impl EpcGenerator {
    /// Create a generator
    ///
    /// A prefix starting with four digits sets the year field; anything
    /// else uses 2026.
    pub fn new(event_prefix: impl Into<String>) -> Self {
        let event_prefix = event_prefix.into();
        let year = event_prefix
            .get(..4)
            .filter(|_| event_prefix.chars().all(|c| c.is_ascii_digit()))
            .and_then(|y| y.parse().ok())
            .unwrap_or(DEFAULT_YEAR);

        Self {
            event_prefix,
            year,
            tags: Vec::new(),
        }
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    /// Tags generated so far
    pub fn tags(&self) -> &[ProvisionedTag] {
        &self.tags
    }

    /// Generate one tag
    pub fn generate(
        &mut self,
        category_code: &str,
        gender: Gender,
        distance: Distance,
        runner_number: u32,
    ) -> Result<&ProvisionedTag> {
        let (index, category) = category(category_code)?;

        if !(1..=MAX_RUNNER_NUMBER).contains(&runner_number) {
            return Err(Error::Provision(format!(
                "runner number {} out of range 1..={}",
                runner_number, MAX_RUNNER_NUMBER
            )));
        }

        let [year_hi, year_lo] = self.year.to_be_bytes();
        let [_, n0, n1, n2] = runner_number.to_be_bytes();

        let mut bytes = vec![
            EPC_HEADER,
            EVENT_ID,
            year_hi,
            year_lo,
            distance.code(),
            index,
            gender.code(),
            n0,
            n1,
            n2,
            RESERVED,
        ];
        let checksum = epc_checksum(&bytes);
        bytes.push(checksum);

        let epc = Epc::from_bytes(&bytes)?;

        self.tags.push(ProvisionedTag {
            epc_formatted: epc.spaced(),
            epc,
            runner_number,
            category_code: category.code,
            category_name: category.name,
            age_min: category.age_min,
            age_max: category.age_max,
            gender: gender.label(),
            gender_code: gender.letter(),
            distance_m: distance.meters(),
            distance_code: distance.label(),
            event_prefix: self.event_prefix.clone(),
            checksum: format!("{:02X}", checksum),
        });

        Ok(&self.tags[self.tags.len() - 1])
    }

    /// Generate every group of every race
    ///
    /// Runner numbers restart at 1 for each group. Returns the number of
    /// tags added.
    pub fn generate_batch(&mut self, races: &[RaceConfig]) -> Result<usize> {
        let before = self.tags.len();

        for race in races {
            for (code, gender, count) in &race.groups {
                for number in 1..=*count {
                    self.generate(code, *gender, race.distance, number)?;
                }
            }
        }

        let added = self.tags.len() - before;
        info!(added, total = self.tags.len(), "Generated tags");
        Ok(added)
    }

    /// Registration sheet CSV
    pub fn write_csv<W: Write>(&self, out: &mut W) -> Result<()> {
        table::write_row(out, SHEET_HEADER)?;
        for tag in &self.tags {
            table::write_row(
                out,
                [
                    tag.epc_formatted.clone(),
                    tag.runner_number.to_string(),
                    tag.category_name.to_string(),
                    tag.gender.to_string(),
                    tag.distance_m.to_string(),
                    tag.age_min.to_string(),
                    tag.age_max.to_string(),
                ],
            )?;
        }
        Ok(())
    }

    /// JSON with event metadata and every tag
    pub fn write_json<W: Write>(&self, out: &mut W) -> Result<()> {
        let export = JsonExport {
            evento: &self.event_prefix,
            fecha_generacion: Local::now().naive_local(),
            total_tags: self.tags.len(),
            tags: &self.tags,
        };
        serde_json::to_writer_pretty(&mut *out, &export)?;
        writeln!(out)?;
        Ok(())
    }

    /// One EPC per line, no spaces, for the tag writer
    pub fn write_writer_list<W: Write>(&self, out: &mut W) -> Result<()> {
        for tag in &self.tags {
            writeln!(out, "{}", tag.epc)?;
        }
        Ok(())
    }

    /// Write the three exports to the given paths
    pub fn save(&self, csv: &Path, json: &Path, writer_list: &Path) -> Result<()> {
        save_with(csv, |out| self.write_csv(out))?;
        save_with(json, |out| self.write_json(out))?;
        save_with(writer_list, |out| self.write_writer_list(out))?;

        info!(
            tags = self.tags.len(),
            "Exported {}, {} and {}",
            csv.display(),
            json.display(),
            writer_list.display()
        );
        Ok(())
    }

    /// Tag counts per distance, category and gender
    pub fn summary(&self) -> String {
        let mut groups: Vec<(u32, usize, &'static str, usize)> = Vec::new();

        for tag in &self.tags {
            let index = CATEGORIES.iter().position(|c| c.code == tag.category_code).unwrap_or(0);
            match groups
                .iter_mut()
                .find(|g| g.0 == tag.distance_m && g.1 == index && g.2 == tag.gender)
            {
                Some(group) => group.3 += 1,
                None => groups.push((tag.distance_m, index, tag.gender, 1)),
            }
        }
        groups.sort();

        let mut text = format!("Total tags: {}\n", self.tags.len());
        let mut current = None;
        for (meters, index, gender, count) in groups {
            if current != Some(meters) {
                text.push_str(&format!("Distance {}m\n", meters));
                current = Some(meters);
            }
            text.push_str(&format!("  {} {}: {} tags\n", CATEGORIES[index].name, gender, count));
        }
        text
    }
}

fn save_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let mut out = BufWriter::new(File::create(path)?);
    write(&mut out)?;
    out.flush()?;
    Ok(())
}
