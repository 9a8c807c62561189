mod common;

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::read::GzDecoder;

use acq_catalog::app::{App, AppOptions};
use acq_catalog::archive::ArchiveAssembler;
use acq_catalog::domain::{AcquisitionDetail, AcquisitionTime};
use acq_catalog::error::CatalogError;
use acq_catalog::query::QueryService;
use acq_catalog::sync::SyncPolicy;

use common::{Repo, memory_store, sync};

const TIME: &str = "2018-04-06T14:20:35";

struct Bundle {
    directories: Vec<String>,
    /// name -> (contents, PAX comment)
    files: BTreeMap<String, (Vec<u8>, Option<String>)>,
}

fn read_bundle(bytes: &[u8]) -> Bundle {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let mut directories = Vec::new();
    let mut files = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        if entry.header().entry_type().is_dir() {
            directories.push(name.trim_end_matches('/').to_string());
            continue;
        }
        let mut comment = None;
        if let Some(extensions) = entry.pax_extensions().unwrap() {
            for extension in extensions {
                let extension = extension.unwrap();
                if extension.key().unwrap() == "comment" {
                    comment = Some(extension.value().unwrap().to_string());
                }
            }
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        files.insert(name, (contents, comment));
    }
    Bundle { directories, files }
}

fn detail(repo: &Repo) -> AcquisitionDetail {
    let store = memory_store();
    sync(&store, &repo.root, SyncPolicy::AbortOnError).unwrap();
    QueryService::new(store)
        .get(&TIME.parse().unwrap())
        .unwrap()
        .unwrap()
}

fn full_repo() -> Repo {
    let repo = Repo::new();
    repo.testbackups();
    let folder = "2018-04-06_14.20.35__testbackups";
    repo.file(&format!("{folder}/Raws/raw-asic2-2018.04.06.142047.fits"), b"raw unit 2");
    repo.file(&format!("{folder}/Hks/hk-extern-2018.04.06.142047.fits"), b"extern");
    repo.file(&format!("{folder}/Hks/calconf-2018.04.06.142047.fits"), b"calconf");
    repo
}

#[test]
fn bundle_holds_every_present_file() {
    let repo = full_repo();
    let detail = detail(&repo);

    let mut out = Vec::new();
    let summary = ArchiveAssembler::new().assemble(&detail, &mut out).unwrap();
    assert_eq!(summary.file_name, "2018-04-06T14:20:35.tar.gz");
    assert_eq!(summary.file_entries, 6);
    assert_eq!(summary.bytes, out.len() as u64);

    let bundle = read_bundle(&out);
    assert_eq!(bundle.directories, ["Raws", "Sums", "Hks"]);
    let names: Vec<&str> = bundle.files.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        [
            "Hks/calconf-2018.04.06.142047.fits",
            "Hks/conf-asics-2018.04.06.142047.fits",
            "Hks/hk-extern-2018.04.06.142047.fits",
            "Raws/raw-asic1-2018.04.06.142047.fits",
            "Raws/raw-asic2-2018.04.06.142047.fits",
            "Sums/science-asic1-2018.04.06.142047.fits",
        ]
    );
    assert_eq!(
        bundle.files["Raws/raw-asic2-2018.04.06.142047.fits"].0,
        b"raw unit 2"
    );
}

#[test]
fn housekeeping_entries_carry_their_role() {
    let repo = full_repo();
    let mut out = Vec::new();
    ArchiveAssembler::new()
        .assemble(&detail(&repo), &mut out)
        .unwrap();
    let bundle = read_bundle(&out);

    let comment = |name: &str| bundle.files[name].1.clone();
    assert_eq!(
        comment("Hks/conf-asics-2018.04.06.142047.fits").as_deref(),
        Some("ASIC configuration")
    );
    assert_eq!(
        comment("Hks/hk-extern-2018.04.06.142047.fits").as_deref(),
        Some("external housekeeping")
    );
    assert_eq!(
        comment("Hks/calconf-2018.04.06.142047.fits").as_deref(),
        Some("calibration configuration")
    );
    assert_eq!(comment("Raws/raw-asic1-2018.04.06.142047.fits"), None);
}

#[test]
fn group_markers_exist_without_files() {
    let repo = Repo::new();
    repo.folder("2018-04-06_14.20.35__empty");
    let mut out = Vec::new();
    let summary = ArchiveAssembler::new()
        .assemble(&detail(&repo), &mut out)
        .unwrap();

    assert_eq!(summary.file_entries, 0);
    let bundle = read_bundle(&out);
    assert_eq!(bundle.directories.len(), 3);
    assert!(bundle.files.is_empty());
}

#[test]
fn temporary_bundle_is_removed() {
    let repo = full_repo();
    let detail = detail(&repo);
    let scratch = tempfile::tempdir().unwrap();
    let assembler =
        ArchiveAssembler::with_temp_dir(Utf8PathBuf::from_path_buf(scratch.path().into()).unwrap());

    let built = assembler.build(&detail).unwrap();
    assert!(built.path().starts_with(scratch.path()));
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 1);
    built.stream_to(&mut Vec::new()).unwrap();
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn missing_member_fails_without_output() {
    let repo = full_repo();
    let detail = detail(&repo);
    fs::remove_file(repo.root.join(
        "2018-04-06_14.20.35__testbackups/Hks/hk-extern-2018.04.06.142047.fits",
    ))
    .unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let assembler =
        ArchiveAssembler::with_temp_dir(Utf8PathBuf::from_path_buf(scratch.path().into()).unwrap());

    let mut out = Vec::new();
    let err = assembler.assemble(&detail, &mut out).unwrap_err();
    assert_matches!(err, CatalogError::MissingReferencedFile { .. });
    assert!(out.is_empty());
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn app_bundle_by_time() {
    let repo = full_repo();
    let store = memory_store();
    sync(&store, &repo.root, SyncPolicy::AbortOnError).unwrap();
    let app = App::new(
        store,
        AppOptions {
            request_timeout: Duration::from_secs(30),
            assembler: ArchiveAssembler::new(),
        },
    );

    let mut out = Vec::new();
    let summary = app.bundle(&TIME.parse().unwrap(), &mut out).unwrap();
    assert_eq!(summary.file_entries, 6);
    assert_eq!(read_bundle(&out).files.len(), 6);

    let unknown: AcquisitionTime = "2018-04-06T14:20:36".parse().unwrap();
    let err = app.bundle(&unknown, &mut Vec::new()).unwrap_err();
    assert_matches!(err, CatalogError::NotFound(_));
}
