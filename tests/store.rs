use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use strainload::bcp::BulkLoader;
use strainload::config::Constants;
use strainload::domain::Flag;
use strainload::emit::UpdateStatement;
use strainload::error::LoadError;
use strainload::keys::{Counter, KeyAllocator};
use strainload::rows::Table;
use strainload::store::{AccessionEntry, RegistryStore, Snapshot, SnapshotStore, StrainEntry};

fn temp_path(dir: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
}

fn registry() -> Snapshot {
    let mut snapshot = Snapshot::default();
    snapshot.strains.push(StrainEntry {
        key: 10,
        name: "DBA/2J".to_string(),
        standard: Flag::YES,
        private: Flag::NO,
        modified_by: None,
    });
    snapshot.accessions.push(AccessionEntry {
        acc_id: "MGI:2684695".to_string(),
        logical_db_key: 1,
        object_key: 10,
        mgi_type_key: 10,
        private: Flag::NO,
    });
    snapshot
}

#[test]
fn snapshot_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "registry.json");
    let mut store = SnapshotStore::new(registry(), Constants::default());
    store.reserve(Counter::Note).unwrap();
    store.save_to(&path).unwrap();

    let mut reopened = SnapshotStore::open(&path, Constants::default()).unwrap();
    assert_eq!(reopened.path(), Some(path.as_path()));
    assert_eq!(reopened.snapshot().counters[&Counter::Note], 1);
    let strain = reopened
        .find_strain_by_accession("MGI:2684695")
        .unwrap()
        .unwrap();
    assert_eq!(strain.key, 10);
    assert_eq!(strain.name, "DBA/2J");
}

#[test]
fn open_reports_missing_and_broken_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let missing = temp_path(&dir, "absent.json");
    assert_matches!(
        SnapshotStore::open(&missing, Constants::default()),
        Err(LoadError::SnapshotRead(_))
    );

    let broken = temp_path(&dir, "broken.json");
    fs::write(&broken, "[1, 2").unwrap();
    assert_matches!(
        SnapshotStore::open(&broken, Constants::default()),
        Err(LoadError::SnapshotParse(_))
    );
}

#[test]
fn commit_persists_reservations() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "registry.json");
    SnapshotStore::new(registry(), Constants::default())
        .save_to(&path)
        .unwrap();

    let mut store = SnapshotStore::open(&path, Constants::default()).unwrap();
    let mut keys = KeyAllocator::reserve(&mut store, &[Counter::Strain]).unwrap();
    let first = keys.next(Counter::Strain).unwrap();
    let second = keys.next(Counter::Strain).unwrap();
    assert_eq!(second, first + 1);
    store
        .resync(Counter::Strain, keys.last_used(Counter::Strain).unwrap())
        .unwrap();
    store.commit().unwrap();

    let reopened = SnapshotStore::open(&path, Constants::default()).unwrap();
    assert_eq!(reopened.snapshot().counters[&Counter::Strain], second);
}

#[test]
fn bulk_load_folds_rows_into_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let file = temp_path(&dir, "PRB_Strain_Marker.bcp");
    fs::write(
        &file,
        "201|10|500|50|615427|1001|1001|01/15/2026|01/15/2026\n\
         202|10||51|615427|1001|1001|01/15/2026|01/15/2026\n",
    )
    .unwrap();

    let mut store = SnapshotStore::new(registry(), Constants::default());
    let rows = store.load(Table::StrainMarker, &file).unwrap();

    assert_eq!(rows, 2);
    assert!(store.strain_marker_exists(10, 51).unwrap());
    assert_eq!(store.snapshot().loaded_rows["PRB_Strain_Marker"], 2);
}

#[test]
fn bad_key_in_bcp_file_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let file = temp_path(&dir, "PRB_Strain.bcp");
    fs::write(&file, "x|1|2|B6|1|0|0|1001|1001|d|d\n").unwrap();

    let mut store = SnapshotStore::new(Snapshot::default(), Constants::default());
    assert_matches!(
        store.load(Table::Strain, &file),
        Err(LoadError::BulkLoad { .. })
    );
}

#[test]
fn privacy_update_skips_primary_accession() {
    let mut snapshot = registry();
    snapshot.accessions.push(AccessionEntry {
        acc_id: "JAX:000671".to_string(),
        logical_db_key: 22,
        object_key: 10,
        mgi_type_key: 10,
        private: Flag::NO,
    });
    let mut store = SnapshotStore::new(snapshot, Constants::default());

    store
        .execute_updates(&[UpdateStatement::AccessionPrivacy {
            strain_key: 10,
            private: Flag::YES,
            modified_by: 1001,
            mgi_type_key: 10,
            mgi_logical_db_key: 1,
        }])
        .unwrap();

    let private: Vec<(&str, Flag)> = store
        .snapshot()
        .accessions
        .iter()
        .map(|acc| (acc.acc_id.as_str(), acc.private))
        .collect();
    assert_eq!(
        private,
        vec![("MGI:2684695", Flag::NO), ("JAX:000671", Flag::YES)]
    );
}

#[test]
fn update_of_unknown_strain_is_a_store_error() {
    let mut store = SnapshotStore::new(Snapshot::default(), Constants::default());
    let err = store
        .execute_updates(&[UpdateStatement::Strain {
            strain_key: 99,
            name: "X".to_string(),
            standard: None,
            private: None,
            modified_by: 1,
        }])
        .unwrap_err();
    assert_matches!(err, LoadError::Store(_));
}
