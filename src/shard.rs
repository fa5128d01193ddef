//! Shard key function and the shard file codec.
//!
//! Records are partitioned into up to 256 buckets by the first two characters
//! of their id. Each bucket is persisted as one `{bucket}.json` file holding a
//! flat id → record map, pretty-printed so external sync tooling can diff and
//! merge shard files by hand.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::ScheduleRecord;

/// Compute the bucket key for a record id: its first two characters,
/// lower-cased.
///
/// Must stay stable across releases — changing it strands every previously
/// written shard file under a key no id maps to anymore.
pub fn shard_key(id: &str) -> String {
    id.chars()
        .take(2)
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Path of the shard file for a bucket key
pub fn shard_path(dir: &Path, bucket: &str) -> PathBuf {
    dir.join(format!("{}.json", bucket))
}

/// Serialize one bucket's records as a flat id → record map.
///
/// Keys are emitted in sorted order so writing unchanged content produces
/// byte-identical files.
pub fn encode_shard(records: &BTreeMap<String, ScheduleRecord>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}

/// Parse a shard file's contents back into an id → record map
pub fn decode_shard(text: &str) -> serde_json::Result<BTreeMap<String, ScheduleRecord>> {
    serde_json::from_str(text)
}
