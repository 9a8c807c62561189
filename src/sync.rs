use std::fs;
use std::sync::LazyLock;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{Acquisition, AcquisitionName, NewAcquisition};
use crate::error::CatalogError;
use crate::matcher::scan_folder;
use crate::store::CatalogStore;

static ACQUISITION_FOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}_[0-9]{2}\.[0-9]{2}\.[0-9]{2}")
        .expect("folder pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkDecision {
    Descend,
    Leaf { directory_name: String },
}

pub fn classify(dir: &Utf8Path) -> WalkDecision {
    match dir.file_name() {
        Some(name) if ACQUISITION_FOLDER.is_match(name) => WalkDecision::Leaf {
            directory_name: name.to_string(),
        },
        _ => WalkDecision::Descend,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPolicy {
    #[default]
    AbortOnError,
    SkipFailedFolders,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderOutcome {
    Added {
        acquisition: Acquisition,
        raw_files: usize,
        sum_files: usize,
    },
    AlreadyPresent,
    LostRace,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub added: Vec<SyncedAcquisition>,
    pub already_present: Vec<String>,
    pub lost_races: Vec<String>,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn visited(&self) -> usize {
        self.added.len() + self.already_present.len() + self.lost_races.len() + self.failures.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncedAcquisition {
    pub directory_name: String,
    pub acquisition_time: String,
    pub raw_files: usize,
    pub sum_files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub directory: String,
    pub error: String,
}

pub struct Synchronizer<S: CatalogStore> {
    store: S,
    policy: SyncPolicy,
}

impl<S: CatalogStore> Synchronizer<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: SyncPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn run(&self, root: &Utf8Path, sink: &dyn ProgressSink) -> Result<SyncReport, CatalogError> {
        if !root.as_std_path().is_dir() {
            return Err(CatalogError::Filesystem(format!(
                "repository {root} is not a directory"
            )));
        }

        let started = Instant::now();
        info!(repository = %root, policy = ?self.policy, "synchronizing catalog");
        sink.event(ProgressEvent {
            message: format!("phase=Walk; scanning {root}"),
            elapsed: None,
        });

        let mut report = SyncReport::default();
        self.visit(root, &mut report, sink)?;

        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; {} added, {} already cataloged, {} failed",
                report.added.len(),
                report.already_present.len(),
                report.failures.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        info!(
            added = report.added.len(),
            already_present = report.already_present.len(),
            lost_races = report.lost_races.len(),
            failures = report.failures.len(),
            "synchronization finished"
        );
        Ok(report)
    }

    fn visit(
        &self,
        dir: &Utf8Path,
        report: &mut SyncReport,
        sink: &dyn ProgressSink,
    ) -> Result<(), CatalogError> {
        match classify(dir) {
            WalkDecision::Leaf { directory_name } => {
                self.visit_leaf(dir, &directory_name, report, sink)
            }
            WalkDecision::Descend => {
                let children = child_directories(dir)?;
                for (path, err) in children.unreadable {
                    self.record_failure(&path, err, report, sink)?;
                }
                for child in children.dirs {
                    self.visit(&child, report, sink)?;
                }
                Ok(())
            }
        }
    }

    fn visit_leaf(
        &self,
        dir: &Utf8Path,
        directory_name: &str,
        report: &mut SyncReport,
        sink: &dyn ProgressSink,
    ) -> Result<(), CatalogError> {
        let started = Instant::now();
        match self.sync_folder(dir, directory_name) {
            Ok(FolderOutcome::Added {
                acquisition,
                raw_files,
                sum_files,
            }) => {
                sink.event(ProgressEvent {
                    message: format!("phase=Store; added {directory_name}"),
                    elapsed: Some(started.elapsed()),
                });
                report.added.push(SyncedAcquisition {
                    directory_name: directory_name.to_string(),
                    acquisition_time: acquisition.acquisition_time.to_string(),
                    raw_files,
                    sum_files,
                });
            }
            Ok(FolderOutcome::AlreadyPresent) => {
                report.already_present.push(directory_name.to_string());
            }
            Ok(FolderOutcome::LostRace) => {
                report.lost_races.push(directory_name.to_string());
            }
            Err(err) => self.record_failure(dir.as_str(), err, report, sink)?,
        }
        Ok(())
    }

    fn record_failure(
        &self,
        directory: &str,
        err: CatalogError,
        report: &mut SyncReport,
        sink: &dyn ProgressSink,
    ) -> Result<(), CatalogError> {
        if !is_folder_error(&err) || self.policy != SyncPolicy::SkipFailedFolders {
            return Err(err);
        }
        warn!(directory, error = %err, "skipping folder");
        sink.event(ProgressEvent {
            message: format!("phase=Skip; {directory}: {err}"),
            elapsed: None,
        });
        report.failures.push(SyncFailure {
            directory: directory.to_string(),
            error: err.to_string(),
        });
        Ok(())
    }

    pub fn sync_folder(
        &self,
        dir: &Utf8Path,
        directory_name: &str,
    ) -> Result<FolderOutcome, CatalogError> {
        if self.store.contains(directory_name)? {
            debug!(directory = %dir, "already cataloged");
            return Ok(FolderOutcome::AlreadyPresent);
        }

        let name = AcquisitionName::parse(directory_name)?;
        let contents = scan_folder(dir)?;
        let acquisition = NewAcquisition {
            name,
            hk_files: contents.hk_files,
            raw_files: contents.raw_files,
            sum_files: contents.sum_files,
        };

        match self.store.insert(&acquisition) {
            Ok(inserted) => {
                info!(
                    directory = %dir,
                    acquisition_time = %inserted.acquisition_time,
                    raw_files = acquisition.raw_files.len(),
                    sum_files = acquisition.sum_files.len(),
                    "cataloged acquisition"
                );
                Ok(FolderOutcome::Added {
                    acquisition: inserted,
                    raw_files: acquisition.raw_files.len(),
                    sum_files: acquisition.sum_files.len(),
                })
            }
            Err(CatalogError::AlreadyCataloged(_)) => {
                warn!(directory = %dir, "acquisition cataloged concurrently; keeping existing record");
                Ok(FolderOutcome::LostRace)
            }
            Err(err) => Err(err),
        }
    }
}

fn is_folder_error(err: &CatalogError) -> bool {
    matches!(
        err,
        CatalogError::MalformedDirectoryName { .. }
            | CatalogError::AmbiguousFileMatch { .. }
            | CatalogError::MalformedUnitIndex { .. }
    )
}

#[derive(Debug, Default)]
struct Children {
    dirs: Vec<Utf8PathBuf>,
    unreadable: Vec<(String, CatalogError)>,
}

fn child_directories(dir: &Utf8Path) -> Result<Children, CatalogError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("read {dir}: {err}")))?;

    let mut children = Children::default();
    for entry in entries {
        let entry = entry.map_err(|err| CatalogError::Filesystem(format!("read {dir}: {err}")))?;
        let file_type = entry
            .file_type()
            .map_err(|err| CatalogError::Filesystem(format!("stat {dir}: {err}")))?;
        if !file_type.is_dir() {
            continue;
        }
        match Utf8PathBuf::from_path_buf(entry.path()) {
            Ok(path) => children.dirs.push(path),
            Err(path) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                if ACQUISITION_FOLDER.is_match(&name) {
                    children.unreadable.push((
                        path.display().to_string(),
                        CatalogError::MalformedDirectoryName {
                            name,
                            reason: "not valid UTF-8".to_string(),
                        },
                    ));
                } else {
                    warn!(path = %path.display(), "skipping non UTF-8 directory");
                }
            }
        }
    }
    children.dirs.sort();
    children.unreadable.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(children)
}
