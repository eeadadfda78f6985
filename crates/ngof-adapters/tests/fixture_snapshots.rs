// Every captured listing ships with a snapshot whose ids are content-addressed.

use ngof_core::Source;
use ngof_storage::content_id;

const FIXTURE_SOURCES: [&str; 3] = ["finantare_ro", "fdsc", "fonduri_structurale"];

#[derive(Debug, serde::Deserialize)]
struct SnapshotEntry {
    id: String,
    source: Source,
    url: String,
}

#[test]
fn fixture_bundles_are_complete() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    for source in FIXTURE_SOURCES {
        let sample = root.join("fixtures").join(source).join("sample");
        assert!(sample.join("listing.html").exists(), "{source}: listing.html");
        assert!(sample.join("snapshot.json").exists(), "{source}: snapshot.json");
    }
}

#[test]
fn snapshot_ids_derive_from_source_and_url() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    for source in FIXTURE_SOURCES {
        let path = root.join("fixtures").join(source).join("sample/snapshot.json");
        let text = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<SnapshotEntry> = serde_json::from_str(&text).unwrap();
        assert!(!entries.is_empty(), "{source}: empty snapshot");
        for entry in entries {
            assert_eq!(entry.source.as_str(), source);
            assert_eq!(entry.id, content_id(entry.source, &entry.url));
        }
    }
}
