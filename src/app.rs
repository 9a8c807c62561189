use std::io::Write;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use tracing::warn;

use crate::archive::{ArchiveAssembler, ArchiveSummary};
use crate::config::ResolvedConfig;
use crate::domain::{
    Acquisition, AcquisitionDetail, AcquisitionTime, DataFile, DataKind, HkCategory,
};
use crate::error::CatalogError;
use crate::query::{QueryService, stream_file};
use crate::store::{CatalogStats, CatalogStore};
use crate::sync::{SyncPolicy, SyncReport, Synchronizer};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub request_timeout: Duration,
    pub assembler: ArchiveAssembler,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            assembler: ArchiveAssembler::new(),
        }
    }
}

impl From<&ResolvedConfig> for AppOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            assembler: ArchiveAssembler::new(),
        }
    }
}

#[derive(Clone)]
pub struct App<S: CatalogStore + Clone + 'static> {
    store: S,
    query: QueryService<S>,
    options: AppOptions,
}

impl<S: CatalogStore + Clone + 'static> App<S> {
    pub fn new(store: S, options: AppOptions) -> Self {
        Self {
            query: QueryService::new(store.clone()),
            store,
            options,
        }
    }

    pub fn query(&self) -> &QueryService<S> {
        &self.query
    }

    pub fn sync(
        &self,
        repository: &Utf8Path,
        policy: SyncPolicy,
        sink: &dyn ProgressSink,
    ) -> Result<SyncReport, CatalogError> {
        Synchronizer::new(self.store.clone())
            .with_policy(policy)
            .run(repository, sink)
    }

    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        self.store.stats()
    }

    pub fn list(&self) -> Result<Vec<Acquisition>, CatalogError> {
        self.query.list()
    }

    pub fn show(&self, time: &AcquisitionTime) -> Result<AcquisitionDetail, CatalogError> {
        self.query
            .get(time)?
            .ok_or_else(|| not_found(format!("acquisition {time}")))
    }

    pub fn data_files(
        &self,
        time: &AcquisitionTime,
        kind: DataKind,
    ) -> Result<Vec<DataFile>, CatalogError> {
        self.query
            .data_files(time, kind)?
            .ok_or_else(|| not_found(format!("acquisition {time}")))
    }

    pub fn fetch_data_file(
        &self,
        time: &AcquisitionTime,
        kind: DataKind,
        unit_index: u32,
        out: &mut dyn Write,
    ) -> Result<u64, CatalogError> {
        let file = self
            .query
            .data_file(time, kind, unit_index)?
            .ok_or_else(|| not_found(format!("{kind} file for unit {unit_index} of {time}")))?;
        stream_file(&file.path, out)
    }

    pub fn fetch_hk_file(
        &self,
        time: &AcquisitionTime,
        category: HkCategory,
        out: &mut dyn Write,
    ) -> Result<u64, CatalogError> {
        let path = self
            .query
            .hk_file(time, category)?
            .ok_or_else(|| not_found(format!("{category} file of {time}")))?;
        stream_file(&path, out)
    }

    pub fn bundle(
        &self,
        time: &AcquisitionTime,
        out: &mut dyn Write,
    ) -> Result<ArchiveSummary, CatalogError> {
        let detail = self.show(time)?;
        let assembler = self.options.assembler.clone();
        let built = with_deadline(self.options.request_timeout, move || {
            assembler.build(&detail)
        })?;
        built.stream_to(out)
    }
}

/// Run `job` on a worker thread and give up waiting after `timeout`.
///
/// The worker is not cancelled; whatever it returns after the deadline is
/// dropped, which releases any temporary resources it holds.
pub fn with_deadline<T, F>(timeout: Duration, job: F) -> Result<T, CatalogError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CatalogError> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let _ = sender.send(job());
    });
    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(timeout_secs = timeout.as_secs(), "request deadline exceeded");
            Err(CatalogError::DeadlineExceeded {
                seconds: timeout.as_secs(),
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(CatalogError::Archive(
            "worker stopped before producing a result".to_string(),
        )),
    }
}

fn not_found(what: String) -> CatalogError {
    CatalogError::NotFound(what)
}
