use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDateTime, Timelike};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

const FOLDER_TIME_FORMAT: &str = "%Y-%m-%d_%H.%M.%S";
const CANONICAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const FOLDER_TIME_WIDTH: usize = 19;
const LABEL_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcquisitionTime(String);

impl AcquisitionTime {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_catalog(value: String) -> Self {
        Self(value)
    }

    fn from_datetime(time: NaiveDateTime) -> Self {
        Self(time.format(CANONICAL_TIME_FORMAT).to_string())
    }
}

impl fmt::Display for AcquisitionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AcquisitionTime {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let time = NaiveDateTime::parse_from_str(trimmed, CANONICAL_TIME_FORMAT)
            .map_err(|_| CatalogError::InvalidTime(value.to_string()))?;
        if is_leap_second(&time) {
            return Err(CatalogError::InvalidTime(value.to_string()));
        }
        let canonical = Self::from_datetime(time);
        // chrono accepts single-digit fields; the identifier is fixed width
        if canonical.as_str() != trimmed {
            return Err(CatalogError::InvalidTime(value.to_string()));
        }
        Ok(canonical)
    }
}

// chrono reads a seconds field of 60 as a leap second at any minute.
fn is_leap_second(time: &NaiveDateTime) -> bool {
    time.nanosecond() >= 1_000_000_000
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionName {
    pub directory_name: String,
    pub label: String,
    pub time: AcquisitionTime,
}

impl AcquisitionName {
    pub fn parse(basename: &str) -> Result<Self, CatalogError> {
        let malformed = |reason: &str| CatalogError::MalformedDirectoryName {
            name: basename.to_string(),
            reason: reason.to_string(),
        };

        let stamp = basename
            .get(..FOLDER_TIME_WIDTH)
            .ok_or_else(|| malformed("shorter than the YYYY-MM-DD_hh.mm.ss prefix"))?;
        let time = NaiveDateTime::parse_from_str(stamp, FOLDER_TIME_FORMAT)
            .map_err(|err| malformed(&format!("bad timestamp {stamp:?}: {err}")))?;
        if is_leap_second(&time) {
            return Err(malformed(&format!("bad timestamp {stamp:?}: second out of range")));
        }

        let rest = &basename[FOLDER_TIME_WIDTH..];
        let label = rest
            .strip_prefix(LABEL_SEPARATOR)
            .ok_or_else(|| malformed("missing \"__\" after the timestamp"))?;

        Ok(Self {
            directory_name: basename.to_string(),
            label: label.to_string(),
            time: AcquisitionTime::from_datetime(time),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Raw,
    Science,
}

impl DataKind {
    pub const ALL: [DataKind; 2] = [DataKind::Raw, DataKind::Science];

    pub fn folder(self) -> &'static str {
        match self {
            DataKind::Raw => "Raws",
            DataKind::Science => "Sums",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Raw => write!(f, "raw"),
            DataKind::Science => write!(f, "science"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HkCategory {
    AsicHk,
    InternHk,
    ExternHk,
    MmrHk,
    MgcHk,
    CalData,
    CalConf,
}

impl HkCategory {
    pub const ALL: [HkCategory; 7] = [
        HkCategory::AsicHk,
        HkCategory::InternHk,
        HkCategory::ExternHk,
        HkCategory::MmrHk,
        HkCategory::MgcHk,
        HkCategory::CalData,
        HkCategory::CalConf,
    ];

    pub fn description(self) -> &'static str {
        match self {
            HkCategory::AsicHk => "ASIC configuration",
            HkCategory::InternHk => "internal housekeeping",
            HkCategory::ExternHk => "external housekeeping",
            HkCategory::MmrHk => "MMR housekeeping",
            HkCategory::MgcHk => "MGC housekeeping",
            HkCategory::CalData => "calibration data",
            HkCategory::CalConf => "calibration configuration",
        }
    }
}

impl fmt::Display for HkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HkFiles {
    pub asic_hk_file: Option<Utf8PathBuf>,
    pub intern_hk_file: Option<Utf8PathBuf>,
    pub extern_hk_file: Option<Utf8PathBuf>,
    pub mmr_hk_file: Option<Utf8PathBuf>,
    pub mgc_hk_file: Option<Utf8PathBuf>,
    pub cal_data_file: Option<Utf8PathBuf>,
    pub cal_conf_file: Option<Utf8PathBuf>,
}

impl HkFiles {
    pub fn get(&self, category: HkCategory) -> Option<&Utf8Path> {
        self.slot(category).as_deref()
    }

    pub fn set(&mut self, category: HkCategory, path: Option<Utf8PathBuf>) {
        *self.slot_mut(category) = path;
    }

    pub fn present(&self) -> impl Iterator<Item = (HkCategory, &Utf8Path)> + '_ {
        HkCategory::ALL
            .into_iter()
            .filter_map(|category| self.get(category).map(|path| (category, path)))
    }

    fn slot(&self, category: HkCategory) -> &Option<Utf8PathBuf> {
        match category {
            HkCategory::AsicHk => &self.asic_hk_file,
            HkCategory::InternHk => &self.intern_hk_file,
            HkCategory::ExternHk => &self.extern_hk_file,
            HkCategory::MmrHk => &self.mmr_hk_file,
            HkCategory::MgcHk => &self.mgc_hk_file,
            HkCategory::CalData => &self.cal_data_file,
            HkCategory::CalConf => &self.cal_conf_file,
        }
    }

    fn slot_mut(&mut self, category: HkCategory) -> &mut Option<Utf8PathBuf> {
        match category {
            HkCategory::AsicHk => &mut self.asic_hk_file,
            HkCategory::InternHk => &mut self.intern_hk_file,
            HkCategory::ExternHk => &mut self.extern_hk_file,
            HkCategory::MmrHk => &mut self.mmr_hk_file,
            HkCategory::MgcHk => &mut self.mgc_hk_file,
            HkCategory::CalData => &mut self.cal_data_file,
            HkCategory::CalConf => &mut self.cal_conf_file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    pub path: Utf8PathBuf,
    pub unit_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAcquisition {
    pub name: AcquisitionName,
    pub hk_files: HkFiles,
    pub raw_files: Vec<MatchedFile>,
    pub sum_files: Vec<MatchedFile>,
}

impl NewAcquisition {
    pub fn files(&self, kind: DataKind) -> &[MatchedFile] {
        match kind {
            DataKind::Raw => &self.raw_files,
            DataKind::Science => &self.sum_files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acquisition {
    pub id: i64,
    pub created_at: String,
    pub name: String,
    pub directory_name: String,
    pub acquisition_time: AcquisitionTime,
    #[serde(flatten)]
    pub hk_files: HkFiles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    pub id: i64,
    pub path: Utf8PathBuf,
    pub unit_index: u32,
    pub acquisition_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionDetail {
    #[serde(flatten)]
    pub acquisition: Acquisition,
    pub raw_files: Vec<DataFile>,
    pub sum_files: Vec<DataFile>,
}

impl AcquisitionDetail {
    pub fn files(&self, kind: DataKind) -> &[DataFile] {
        match kind {
            DataKind::Raw => &self.raw_files,
            DataKind::Science => &self.sum_files,
        }
    }
}
