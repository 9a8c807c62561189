#![allow(dead_code)]

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use acq_catalog::app::NoProgress;
use acq_catalog::error::CatalogError;
use acq_catalog::store::SqliteCatalog;
use acq_catalog::sync::{SyncPolicy, SyncReport, Synchronizer};

/// A throw-away repository tree.
pub struct Repo {
    _dir: TempDir,
    pub root: Utf8PathBuf,
}

impl Repo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        Self { _dir: dir, root }
    }

    /// Create `relative` (and its parents) under the root.
    pub fn folder(&self, relative: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn file(&self, relative: &str, contents: &[u8]) -> Utf8PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    /// The folder used throughout the documentation: one raw file, one
    /// science file and the ASIC configuration.
    pub fn testbackups(&self) -> Utf8PathBuf {
        let folder = "2018-04-06_14.20.35__testbackups";
        self.file(
            &format!("{folder}/Raws/raw-asic1-2018.04.06.142047.fits"),
            b"raw unit 1",
        );
        self.file(
            &format!("{folder}/Sums/science-asic1-2018.04.06.142047.fits"),
            b"science unit 1",
        );
        self.file(
            &format!("{folder}/Hks/conf-asics-2018.04.06.142047.fits"),
            b"asic configuration",
        );
        self.root.join(folder)
    }

    /// A well-formed acquisition with a single raw file.
    pub fn minimal(&self, folder: &str) -> Utf8PathBuf {
        self.file(
            &format!("{folder}/Raws/raw-asic0-2018.01.01.000000.fits"),
            folder.as_bytes(),
        );
        self.root.join(folder)
    }

    /// Two external housekeeping files: the folder cannot be cataloged.
    pub fn duplicate_hk(&self, folder: &str) -> Utf8PathBuf {
        self.file(&format!("{folder}/Hks/hk-extern-2018.06.08.132800.fits"), b"a");
        self.file(&format!("{folder}/Hks/hk-extern-2018.06.08.132900.fits"), b"b");
        self.root.join(folder)
    }
}

pub fn memory_store() -> Arc<SqliteCatalog> {
    Arc::new(SqliteCatalog::open_in_memory().unwrap())
}

pub fn sync(
    store: &Arc<SqliteCatalog>,
    root: &Utf8Path,
    policy: SyncPolicy,
) -> Result<SyncReport, CatalogError> {
    Synchronizer::new(store.clone())
        .with_policy(policy)
        .run(root, &NoProgress)
}
