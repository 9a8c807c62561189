use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use tar::{Builder, EntryType, Header};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::domain::{AcquisitionDetail, DataKind};
use crate::error::CatalogError;
use crate::query::open_referenced;

pub const HK_GROUP: &str = "Hks";

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub file_name: String,
    pub file_entries: usize,
    pub bytes: u64,
}

/// A finished bundle in a temporary file, removed when this is dropped.
pub struct BuiltArchive {
    file: NamedTempFile,
    summary: ArchiveSummary,
}

impl BuiltArchive {
    pub fn summary(&self) -> &ArchiveSummary {
        &self.summary
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn stream_to(self, out: &mut dyn Write) -> Result<ArchiveSummary, CatalogError> {
        let mut reader = self
            .file
            .reopen()
            .map_err(|err| CatalogError::Archive(format!("reopen bundle: {err}")))?;
        let bytes = io::copy(&mut reader, out)
            .map_err(|err| CatalogError::Archive(format!("send bundle: {err}")))?;
        out.flush()
            .map_err(|err| CatalogError::Archive(format!("send bundle: {err}")))?;
        debug!(bytes, file_name = %self.summary.file_name, "streamed bundle");
        Ok(ArchiveSummary {
            bytes,
            ..self.summary
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveAssembler {
    temp_dir: Option<Utf8PathBuf>,
}

impl ArchiveAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temp_dir(dir: Utf8PathBuf) -> Self {
        Self {
            temp_dir: Some(dir),
        }
    }

    pub fn file_name(detail: &AcquisitionDetail) -> String {
        format!("{}.tar.gz", detail.acquisition.acquisition_time)
    }

    pub fn assemble(
        &self,
        detail: &AcquisitionDetail,
        out: &mut dyn Write,
    ) -> Result<ArchiveSummary, CatalogError> {
        self.build(detail)?.stream_to(out)
    }

    pub fn build(&self, detail: &AcquisitionDetail) -> Result<BuiltArchive, CatalogError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("acqcat-bundle").suffix(".tar.gz");
        let mut temp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir.as_std_path()),
            None => builder.tempfile(),
        }
        .map_err(|err| CatalogError::Archive(format!("create temporary bundle: {err}")))?;

        let file_entries = write_bundle(detail, temp.as_file_mut())?;
        let bytes = temp
            .as_file()
            .metadata()
            .map(|meta| meta.len())
            .map_err(|err| CatalogError::Archive(err.to_string()))?;

        let summary = ArchiveSummary {
            file_name: Self::file_name(detail),
            file_entries,
            bytes,
        };
        info!(
            acquisition_time = %detail.acquisition.acquisition_time,
            file_entries,
            bytes,
            "assembled bundle"
        );
        Ok(BuiltArchive {
            file: temp,
            summary,
        })
    }
}

fn write_bundle(detail: &AcquisitionDetail, file: &mut File) -> Result<usize, CatalogError> {
    let encoder = GzEncoder::new(file, Compression::fast());
    let mut tar = Builder::new(encoder);
    let archive_err = |err: io::Error| CatalogError::Archive(err.to_string());

    for group in [DataKind::Raw.folder(), DataKind::Science.folder(), HK_GROUP] {
        append_group(&mut tar, group).map_err(archive_err)?;
    }

    let mut file_entries = 0;
    for kind in DataKind::ALL {
        for data_file in detail.files(kind) {
            append_member(&mut tar, kind.folder(), &data_file.path, None)?;
            file_entries += 1;
        }
    }
    for (category, path) in detail.acquisition.hk_files.present() {
        append_member(&mut tar, HK_GROUP, path, Some(category.description()))?;
        file_entries += 1;
    }

    let encoder = tar.into_inner().map_err(archive_err)?;
    encoder.finish().map_err(archive_err)?;
    Ok(file_entries)
}

fn append_group<W: Write>(tar: &mut Builder<W>, group: &str) -> io::Result<()> {
    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::Directory);
    header.set_mode(0o755);
    header.set_size(0);
    header.set_mtime(now());
    tar.append_data(&mut header, format!("{group}/"), io::empty())
}

fn append_member<W: Write>(
    tar: &mut Builder<W>,
    group: &str,
    path: &Utf8Path,
    comment: Option<&str>,
) -> Result<(), CatalogError> {
    let file_name = path.file_name().ok_or_else(|| CatalogError::MissingReferencedFile {
        path: path.to_path_buf(),
        reason: "no file name".to_string(),
    })?;
    let name = format!("{group}/{file_name}");
    let mut file = open_referenced(path)?;

    let add_err = |err: io::Error| CatalogError::MissingReferencedFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };
    if let Some(comment) = comment {
        tar.append_pax_extensions([("comment", comment.as_bytes())])
            .map_err(add_err)?;
    }
    tar.append_file(&name, &mut file).map_err(add_err)?;
    debug!(entry = %name, "added bundle member");
    Ok(())
}

fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
