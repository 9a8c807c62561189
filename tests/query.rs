mod common;

use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use acq_catalog::app::{App, AppOptions};
use acq_catalog::archive::ArchiveAssembler;
use acq_catalog::domain::{AcquisitionTime, DataKind, HkCategory};
use acq_catalog::error::CatalogError;
use acq_catalog::store::SqliteCatalog;
use acq_catalog::sync::SyncPolicy;

use common::{Repo, memory_store, sync};

fn time(value: &str) -> AcquisitionTime {
    value.parse().unwrap()
}

fn synced_app(repo: &Repo) -> App<std::sync::Arc<SqliteCatalog>> {
    let store = memory_store();
    sync(&store, &repo.root, SyncPolicy::AbortOnError).unwrap();
    App::new(
        store,
        AppOptions {
            request_timeout: Duration::from_secs(30),
            assembler: ArchiveAssembler::new(),
        },
    )
}

#[test]
fn list_is_newest_first() {
    let repo = Repo::new();
    repo.minimal("2018-04-06_14.20.35__middle");
    repo.minimal("2017-01-01_00.00.00__oldest");
    repo.minimal("2019-02-03_04.05.06__newest");
    let app = synced_app(&repo);

    let names: Vec<String> = app.list().unwrap().into_iter().map(|a| a.name).collect();
    assert_eq!(names, ["newest", "middle", "oldest"]);
}

#[test]
fn empty_catalog_lists_nothing() {
    let repo = Repo::new();
    let app = synced_app(&repo);
    assert!(app.list().unwrap().is_empty());
}

#[test]
fn unknown_time_is_not_found() {
    let repo = Repo::new();
    repo.testbackups();
    let app = synced_app(&repo);

    assert!(app.query().get(&time("2000-01-01T00:00:00")).unwrap().is_none());
    let err = app.show(&time("2000-01-01T00:00:00")).unwrap_err();
    assert_matches!(err, CatalogError::NotFound(_));
    assert_eq!(err.status(), 404);

    let err = app.data_files(&time("2000-01-01T00:00:00"), DataKind::Raw).unwrap_err();
    assert_matches!(err, CatalogError::NotFound(_));
}

#[test]
fn malformed_time_is_rejected() {
    for value in ["2018-04-06_14.20.35", "2018-4-6T14:20:35", "yesterday", ""] {
        assert_matches!(
            value.parse::<AcquisitionTime>(),
            Err(CatalogError::InvalidTime(_)),
            "{value:?}"
        );
    }
}

#[test]
fn show_joins_data_files() {
    let repo = Repo::new();
    repo.testbackups();
    let app = synced_app(&repo);

    let detail = app.show(&time("2018-04-06T14:20:35")).unwrap();
    assert_eq!(detail.acquisition.name, "testbackups");
    assert_eq!(detail.raw_files.len(), 1);
    assert_eq!(detail.sum_files.len(), 1);
    assert_eq!(detail.raw_files[0].acquisition_id, detail.acquisition.id);
}

#[test]
fn data_files_are_filtered_by_unit() {
    let repo = Repo::new();
    let folder = "2018-04-06_14.20.35__units";
    repo.file(&format!("{folder}/Raws/raw-asic2-2018.04.06.142047.fits"), b"two");
    repo.file(&format!("{folder}/Raws/raw-asic10-2018.04.06.142047.fits"), b"ten");
    repo.file(&format!("{folder}/Raws/raw-asic1-2018.04.06.142047.fits"), b"one");
    let app = synced_app(&repo);
    let at = time("2018-04-06T14:20:35");

    let units: Vec<u32> = app
        .data_files(&at, DataKind::Raw)
        .unwrap()
        .iter()
        .map(|file| file.unit_index)
        .collect();
    assert_eq!(units, [1, 2, 10]);

    let mut out = Vec::new();
    let bytes = app.fetch_data_file(&at, DataKind::Raw, 10, &mut out).unwrap();
    assert_eq!(bytes, 3);
    assert_eq!(out, b"ten");

    assert!(app.data_files(&at, DataKind::Science).unwrap().is_empty());
    let err = app
        .fetch_data_file(&at, DataKind::Raw, 7, &mut Vec::new())
        .unwrap_err();
    assert_matches!(err, CatalogError::NotFound(_));
}

#[test]
fn housekeeping_file_by_category() {
    let repo = Repo::new();
    repo.testbackups();
    let app = synced_app(&repo);
    let at = time("2018-04-06T14:20:35");

    let mut out = Vec::new();
    app.fetch_hk_file(&at, HkCategory::AsicHk, &mut out).unwrap();
    assert_eq!(out, b"asic configuration");

    let err = app
        .fetch_hk_file(&at, HkCategory::MgcHk, &mut Vec::new())
        .unwrap_err();
    assert_matches!(err, CatalogError::NotFound(_));
}

#[test]
fn vanished_file_is_a_fault() {
    let repo = Repo::new();
    let folder = repo.testbackups();
    let app = synced_app(&repo);
    fs::remove_file(folder.join("Raws/raw-asic1-2018.04.06.142047.fits")).unwrap();

    let mut out = Vec::new();
    let err = app
        .fetch_data_file(&time("2018-04-06T14:20:35"), DataKind::Raw, 1, &mut out)
        .unwrap_err();
    assert_matches!(err, CatalogError::MissingReferencedFile { .. });
    assert_eq!(err.status(), 500);
    assert!(out.is_empty());
}

#[test]
fn absent_categories_serialise_as_null() {
    let repo = Repo::new();
    repo.testbackups();
    let app = synced_app(&repo);

    let detail = app.show(&time("2018-04-06T14:20:35")).unwrap();
    let json = serde_json::to_value(&detail).unwrap();
    assert_eq!(json["acquisition_time"], "2018-04-06T14:20:35");
    assert_eq!(json["name"], "testbackups");
    assert!(json["asic_hk_file"].is_string());
    assert!(json["extern_hk_file"].is_null());
    assert_eq!(json["raw_files"][0]["unit_index"], 1);
}
