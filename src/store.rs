use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{
    Acquisition, AcquisitionTime, DataFile, DataKind, HkCategory, HkFiles, NewAcquisition,
};
use crate::error::CatalogError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS acquisitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    name TEXT NOT NULL,
    directory_name TEXT NOT NULL UNIQUE,
    acquisition_time TEXT NOT NULL,
    asic_hk_file TEXT,
    intern_hk_file TEXT,
    extern_hk_file TEXT,
    mmr_hk_file TEXT,
    mgc_hk_file TEXT,
    cal_data_file TEXT,
    cal_conf_file TEXT
);
CREATE INDEX IF NOT EXISTS acquisitions_time ON acquisitions (acquisition_time);

CREATE TABLE IF NOT EXISTS raw_data_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    unit_index INTEGER NOT NULL,
    acquisition_id INTEGER NOT NULL REFERENCES acquisitions (id)
);
CREATE INDEX IF NOT EXISTS raw_data_files_acquisition ON raw_data_files (acquisition_id);

CREATE TABLE IF NOT EXISTS sum_data_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    unit_index INTEGER NOT NULL,
    acquisition_id INTEGER NOT NULL REFERENCES acquisitions (id)
);
CREATE INDEX IF NOT EXISTS sum_data_files_acquisition ON sum_data_files (acquisition_id);
";

const ACQUISITION_COLUMNS: &str = "id, created_at, name, directory_name, acquisition_time, \
    asic_hk_file, intern_hk_file, extern_hk_file, mmr_hk_file, mgc_hk_file, \
    cal_data_file, cal_conf_file";

pub trait CatalogStore: Send + Sync {
    fn contains(&self, directory_name: &str) -> Result<bool, CatalogError>;

    /// Persist the whole aggregate atomically. A second insert of the same
    /// `directory_name` fails with [`CatalogError::AlreadyCataloged`].
    fn insert(&self, acquisition: &NewAcquisition) -> Result<Acquisition, CatalogError>;

    fn list(&self) -> Result<Vec<Acquisition>, CatalogError>;

    fn find_by_time(&self, time: &AcquisitionTime) -> Result<Option<Acquisition>, CatalogError>;

    fn data_files(
        &self,
        acquisition_id: i64,
        kind: DataKind,
        unit_index: Option<u32>,
    ) -> Result<Vec<DataFile>, CatalogError>;

    fn stats(&self) -> Result<CatalogStats, CatalogError>;
}

impl<T: CatalogStore + ?Sized> CatalogStore for Arc<T> {
    fn contains(&self, directory_name: &str) -> Result<bool, CatalogError> {
        (**self).contains(directory_name)
    }

    fn insert(&self, acquisition: &NewAcquisition) -> Result<Acquisition, CatalogError> {
        (**self).insert(acquisition)
    }

    fn list(&self) -> Result<Vec<Acquisition>, CatalogError> {
        (**self).list()
    }

    fn find_by_time(&self, time: &AcquisitionTime) -> Result<Option<Acquisition>, CatalogError> {
        (**self).find_by_time(time)
    }

    fn data_files(
        &self,
        acquisition_id: i64,
        kind: DataKind,
        unit_index: Option<u32>,
    ) -> Result<Vec<DataFile>, CatalogError> {
        (**self).data_files(acquisition_id, kind, unit_index)
    }

    fn stats(&self) -> Result<CatalogStats, CatalogError> {
        (**self).stats()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub acquisitions: u64,
    pub raw_files: u64,
    pub sum_files: u64,
}

pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    pub fn open(path: &Utf8Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| CatalogError::Filesystem(format!("create {parent}: {err}")))?;
        }
        info!(database_file = %path, "opening catalog database");
        let conn = Connection::open(path.as_std_path())?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CatalogError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn
            .lock()
            .map_err(|_| CatalogError::Storage("catalog connection poisoned".to_string()))
    }
}

impl CatalogStore for SqliteCatalog {
    fn contains(&self, directory_name: &str) -> Result<bool, CatalogError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM acquisitions WHERE directory_name = ?1",
                params![directory_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert(&self, acquisition: &NewAcquisition) -> Result<Acquisition, CatalogError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let created_at = chrono::Utc::now().to_rfc3339();
        let name = &acquisition.name;
        let hk = &acquisition.hk_files;
        let hk_column = |category| hk.get(category).map(Utf8Path::as_str);

        let inserted = tx.execute(
            &format!(
                "INSERT INTO acquisitions ({ACQUISITION_COLUMNS}) \
                 VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                created_at,
                name.label,
                name.directory_name,
                name.time.as_str(),
                hk_column(HkCategory::AsicHk),
                hk_column(HkCategory::InternHk),
                hk_column(HkCategory::ExternHk),
                hk_column(HkCategory::MmrHk),
                hk_column(HkCategory::MgcHk),
                hk_column(HkCategory::CalData),
                hk_column(HkCategory::CalConf),
            ],
        );
        if let Err(err) = inserted {
            return Err(if is_unique_violation(&err) {
                CatalogError::AlreadyCataloged(name.directory_name.clone())
            } else {
                err.into()
            });
        }
        let id = tx.last_insert_rowid();

        for kind in DataKind::ALL {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (path, unit_index, acquisition_id) VALUES (?1, ?2, ?3)",
                data_table(kind)
            ))?;
            for file in acquisition.files(kind) {
                stmt.execute(params![file.path.as_str(), file.unit_index, id])?;
            }
        }
        tx.commit()?;

        debug!(id, directory_name = %name.directory_name, "inserted acquisition");
        Ok(Acquisition {
            id,
            created_at,
            name: name.label.clone(),
            directory_name: name.directory_name.clone(),
            acquisition_time: name.time.clone(),
            hk_files: hk.clone(),
        })
    }

    fn list(&self) -> Result<Vec<Acquisition>, CatalogError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACQUISITION_COLUMNS} FROM acquisitions ORDER BY acquisition_time DESC, id DESC"
        ))?;
        let rows = stmt.query_map([], acquisition_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn find_by_time(&self, time: &AcquisitionTime) -> Result<Option<Acquisition>, CatalogError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                &format!(
                    "SELECT {ACQUISITION_COLUMNS} FROM acquisitions \
                     WHERE acquisition_time = ?1 ORDER BY id LIMIT 1"
                ),
                params![time.as_str()],
                acquisition_from_row,
            )
            .optional()?;
        Ok(found)
    }

    fn data_files(
        &self,
        acquisition_id: i64,
        kind: DataKind,
        unit_index: Option<u32>,
    ) -> Result<Vec<DataFile>, CatalogError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, path, unit_index, acquisition_id FROM {} \
             WHERE acquisition_id = ?1 AND (?2 IS NULL OR unit_index = ?2) \
             ORDER BY unit_index, path",
            data_table(kind)
        ))?;
        let rows = stmt.query_map(params![acquisition_id, unit_index], |row| {
            Ok(DataFile {
                id: row.get(0)?,
                path: Utf8PathBuf::from(row.get::<_, String>(1)?),
                unit_index: row.get(2)?,
                acquisition_id: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<u64, CatalogError> {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(count as u64)
        };
        Ok(CatalogStats {
            acquisitions: count("acquisitions")?,
            raw_files: count(data_table(DataKind::Raw))?,
            sum_files: count(data_table(DataKind::Science))?,
        })
    }
}

fn data_table(kind: DataKind) -> &'static str {
    match kind {
        DataKind::Raw => "raw_data_files",
        DataKind::Science => "sum_data_files",
    }
}

fn acquisition_from_row(row: &Row<'_>) -> rusqlite::Result<Acquisition> {
    let mut hk_files = HkFiles::default();
    for (offset, category) in HkCategory::ALL.into_iter().enumerate() {
        let path: Option<String> = row.get(5 + offset)?;
        hk_files.set(category, path.map(Utf8PathBuf::from));
    }
    Ok(Acquisition {
        id: row.get(0)?,
        created_at: row.get(1)?,
        name: row.get(2)?,
        directory_name: row.get(3)?,
        acquisition_time: AcquisitionTime::from_catalog(row.get(4)?),
        hk_files,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
