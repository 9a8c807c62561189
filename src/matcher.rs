use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use tracing::debug;

use crate::domain::{DataKind, HkCategory, HkFiles, MatchedFile};
use crate::error::CatalogError;

const HK_FOLDER: &str = "Hks";

struct Template {
    folder: &'static str,
    matcher: GlobMatcher,
}

impl Template {
    fn new(folder: &'static str, glob: &str) -> Self {
        let matcher = GlobBuilder::new(glob)
            .literal_separator(true)
            .build()
            .expect("filename templates are valid")
            .compile_matcher();
        Self { folder, matcher }
    }
}

static HK_TEMPLATES: LazyLock<Vec<(HkCategory, Template)>> = LazyLock::new(|| {
    HkCategory::ALL
        .into_iter()
        .map(|category| (category, Template::new(HK_FOLDER, hk_glob(category))))
        .collect()
});

static DATA_TEMPLATES: LazyLock<Vec<(DataKind, Template)>> = LazyLock::new(|| {
    DataKind::ALL
        .into_iter()
        .map(|kind| (kind, Template::new(kind.folder(), data_glob(kind))))
        .collect()
});

static RAW_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^raw-asic([0-9]+)-").expect("unit pattern is valid"));
static SCIENCE_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^science-asic([0-9]+)-").expect("unit pattern is valid"));

pub fn hk_glob(category: HkCategory) -> &'static str {
    match category {
        HkCategory::AsicHk => "conf-asics-*.fits",
        HkCategory::InternHk => "hk-intern-*.fits",
        HkCategory::ExternHk => "hk-extern-*.fits",
        HkCategory::MmrHk => "hk-mmr-*.fits",
        HkCategory::MgcHk => "hk-mgc-*.fits",
        HkCategory::CalData => "caldata-*.fits",
        HkCategory::CalConf => "calconf-*.fits",
    }
}

pub fn data_glob(kind: DataKind) -> &'static str {
    match kind {
        DataKind::Raw => "raw-asic*-*.fits",
        DataKind::Science => "science-asic*-*.fits",
    }
}

pub fn unit_pattern(kind: DataKind) -> &'static Regex {
    match kind {
        DataKind::Raw => &RAW_UNIT,
        DataKind::Science => &SCIENCE_UNIT,
    }
}

pub fn parse_unit_index(pattern: &Regex, file_name: &str) -> Option<u32> {
    pattern
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|index| index.as_str().parse().ok())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderContents {
    pub hk_files: HkFiles,
    pub raw_files: Vec<MatchedFile>,
    pub sum_files: Vec<MatchedFile>,
}

pub fn scan_folder(folder: &Utf8Path) -> Result<FolderContents, CatalogError> {
    let mut contents = FolderContents::default();
    for category in HkCategory::ALL {
        contents.hk_files.set(category, match_single(folder, category)?);
    }
    contents.raw_files = match_multi(folder, DataKind::Raw)?;
    contents.sum_files = match_multi(folder, DataKind::Science)?;
    Ok(contents)
}

pub fn match_single(
    folder: &Utf8Path,
    category: HkCategory,
) -> Result<Option<Utf8PathBuf>, CatalogError> {
    let template = HK_TEMPLATES
        .iter()
        .find(|(candidate, _)| *candidate == category)
        .map(|(_, template)| template)
        .ok_or_else(|| CatalogError::Filesystem(format!("no template for {category}")))?;

    let mut matches = list_candidates(&folder.join(template.folder), &template.matcher)?;
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => Err(CatalogError::AmbiguousFileMatch {
            directory: folder.to_path_buf(),
            category: category.to_string(),
            matches,
        }),
    }
}

pub fn match_multi(folder: &Utf8Path, kind: DataKind) -> Result<Vec<MatchedFile>, CatalogError> {
    let template = DATA_TEMPLATES
        .iter()
        .find(|(candidate, _)| *candidate == kind)
        .map(|(_, template)| template)
        .ok_or_else(|| CatalogError::Filesystem(format!("no template for {kind} files")))?;

    list_candidates(&folder.join(template.folder), &template.matcher)?
        .into_iter()
        .map(|path| {
            let unit_index = path
                .file_name()
                .and_then(|name| parse_unit_index(unit_pattern(kind), name))
                .ok_or_else(|| CatalogError::MalformedUnitIndex { path: path.clone() })?;
            Ok(MatchedFile { path, unit_index })
        })
        .collect()
}

// Symlinks are not regular files and are never followed.
fn list_candidates(
    dir: &Utf8Path,
    matcher: &GlobMatcher,
) -> Result<Vec<Utf8PathBuf>, CatalogError> {
    if !dir.as_std_path().is_dir() {
        return Ok(Vec::new());
    }
    let entries = dir
        .read_dir_utf8()
        .map_err(|err| CatalogError::Filesystem(format!("read {dir}: {err}")))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| CatalogError::Filesystem(format!("read {dir}: {err}")))?;
        if !matcher.is_match(entry.file_name()) {
            continue;
        }
        let file_type = entry
            .file_type()
            .map_err(|err| CatalogError::Filesystem(format!("stat {}: {err}", entry.path())))?;
        if file_type.is_file() {
            found.push(entry.path().to_path_buf());
        }
    }
    found.sort();
    debug!(dir = %dir, glob = %matcher.glob(), count = found.len(), "matched files");
    Ok(found)
}
