//! Integration tests for parsing block storage response data.

use std::fs;
use std::path::PathBuf;
use stratus_blockstorage::models::{Volume, VOLUMES_KEY};
use stratus_core::envelope;
use stratus_core::ResourceStatus;

fn load_volumes_fixture() -> Vec<u8> {
    let fixture_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("volumes_detail.json");
    fs::read(&fixture_path).unwrap_or_else(|e| {
        panic!(
            "Failed to read volume fixture at {}: {}",
            fixture_path.display(),
            e
        )
    })
}

#[test]
fn test_deserialize_volume_list() {
    let volumes: Vec<Volume> = envelope::decode(&load_volumes_fixture(), VOLUMES_KEY).unwrap();
    assert_eq!(volumes.len(), 2, "Expected 2 volumes in test data");

    let attached = &volumes[0];
    assert_eq!(attached.status, ResourceStatus::InUse);
    assert_eq!(attached.volume_type.as_deref(), Some("ssd"));
    assert!(attached.encrypted);
    assert!(!attached.is_bootable());
    assert_eq!(attached.attachments.len(), 1);
    assert_eq!(attached.attachments[0].device.as_deref(), Some("/dev/vdb"));
    assert!(attached.created_at.is_some());

    let restored = &volumes[1];
    assert!(restored.name.is_none());
    assert!(restored.is_bootable());
    assert!(restored.snapshot_id.is_some());
    assert!(restored.updated_at.is_none());
}

#[test]
fn test_volume_list_has_next_link() {
    let document = envelope::parse_document(&load_volumes_fixture())
        .unwrap()
        .unwrap();
    let next = envelope::next_link(&document, &envelope::links_key_for(VOLUMES_KEY)).unwrap();
    assert!(next.ends_with("marker=f3b1e4a2-9c7d-4e51-8a36-0d2c5b7e9f14"));
}
