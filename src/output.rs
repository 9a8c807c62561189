use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::archive::ArchiveSummary;
use crate::domain::{Acquisition, AcquisitionDetail, DataFile, DataKind};
use crate::error::CatalogError;
use crate::sync::SyncReport;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }

    pub fn print_error(error: &CatalogError) -> io::Result<()> {
        Self::print_json(&ErrorBody::from(error))
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
}

impl From<&CatalogError> for ErrorBody {
    fn from(error: &CatalogError) -> Self {
        Self {
            status: error.status(),
            message: error.public_message(),
        }
    }
}

pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        let line = match event.elapsed {
            Some(elapsed) => format!("{} ({:.2?})", event.message, elapsed),
            None => event.message,
        };
        eprintln!("{line}");
    }
}

pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_report(report: &SyncReport) {
        println!(
            "visited {} acquisition folders: {} added, {} already cataloged, {} lost races, {} failed",
            report.visited(),
            report.added.len(),
            report.already_present.len(),
            report.lost_races.len(),
            report.failures.len()
        );
        for added in &report.added {
            println!(
                "  + {} ({}; {} raw, {} science)",
                added.directory_name, added.acquisition_time, added.raw_files, added.sum_files
            );
        }
        for failure in &report.failures {
            println!("  ! {}: {}", failure.directory, failure.error);
        }
    }

    pub fn print_list(acquisitions: &[Acquisition]) {
        if acquisitions.is_empty() {
            println!("catalog is empty");
            return;
        }
        for acquisition in acquisitions {
            println!("{}  {}", acquisition.acquisition_time, acquisition.name);
        }
    }

    pub fn print_detail(detail: &AcquisitionDetail) {
        let acquisition = &detail.acquisition;
        println!("time:       {}", acquisition.acquisition_time);
        println!("name:       {}", acquisition.name);
        println!("directory:  {}", acquisition.directory_name);
        println!("cataloged:  {}", acquisition.created_at);
        for (category, path) in acquisition.hk_files.present() {
            println!("hk:         {path} ({category})");
        }
        for kind in DataKind::ALL {
            Self::print_files(kind, detail.files(kind));
        }
    }

    pub fn print_files(kind: DataKind, files: &[DataFile]) {
        println!("{kind} files: {}", files.len());
        for file in files {
            println!("  [{}] {}", file.unit_index, file.path);
        }
    }

    pub fn print_archive(summary: &ArchiveSummary, destination: &str) {
        println!(
            "wrote {} ({} files, {} bytes) to {destination}",
            summary.file_name, summary.file_entries, summary.bytes
        );
    }
}
