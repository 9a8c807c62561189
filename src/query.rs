use std::fs::File;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::domain::{
    Acquisition, AcquisitionDetail, AcquisitionTime, DataFile, DataKind, HkCategory,
};
use crate::error::CatalogError;
use crate::store::CatalogStore;

#[derive(Clone)]
pub struct QueryService<S: CatalogStore> {
    store: S,
}

impl<S: CatalogStore> QueryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<Acquisition>, CatalogError> {
        self.store.list()
    }

    pub fn get(&self, time: &AcquisitionTime) -> Result<Option<AcquisitionDetail>, CatalogError> {
        let Some(acquisition) = self.store.find_by_time(time)? else {
            return Ok(None);
        };
        let raw_files = self.store.data_files(acquisition.id, DataKind::Raw, None)?;
        let sum_files = self.store.data_files(acquisition.id, DataKind::Science, None)?;
        Ok(Some(AcquisitionDetail {
            acquisition,
            raw_files,
            sum_files,
        }))
    }

    pub fn data_files(
        &self,
        time: &AcquisitionTime,
        kind: DataKind,
    ) -> Result<Option<Vec<DataFile>>, CatalogError> {
        let Some(acquisition) = self.store.find_by_time(time)? else {
            return Ok(None);
        };
        Ok(Some(self.store.data_files(acquisition.id, kind, None)?))
    }

    pub fn data_file(
        &self,
        time: &AcquisitionTime,
        kind: DataKind,
        unit_index: u32,
    ) -> Result<Option<DataFile>, CatalogError> {
        let Some(acquisition) = self.store.find_by_time(time)? else {
            return Ok(None);
        };
        let files = self.store.data_files(acquisition.id, kind, Some(unit_index))?;
        Ok(files.into_iter().next())
    }

    pub fn hk_file(
        &self,
        time: &AcquisitionTime,
        category: HkCategory,
    ) -> Result<Option<Utf8PathBuf>, CatalogError> {
        let acquisition = self.store.find_by_time(time)?;
        Ok(acquisition.and_then(|acq| acq.hk_files.get(category).map(Utf8Path::to_path_buf)))
    }
}

pub fn stream_file(path: &Utf8Path, out: &mut dyn Write) -> Result<u64, CatalogError> {
    let mut file = open_referenced(path)?;
    let copied = io::copy(&mut file, out).map_err(|err| CatalogError::MissingReferencedFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    debug!(path = %path, bytes = copied, "streamed file");
    Ok(copied)
}

pub(crate) fn open_referenced(path: &Utf8Path) -> Result<File, CatalogError> {
    File::open(path.as_std_path()).map_err(|err| CatalogError::MissingReferencedFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}
