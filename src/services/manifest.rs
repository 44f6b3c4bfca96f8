//! Per-show hash manifest: tracks an MD5 per organized episode file so the
//! reconciler can detect an episode being silently overwritten by a
//! mis-numbered release.
//!
//! Grounded on the original resolver's `hash_manifest` module: one JSON
//! document per show under `data/hash-manifests/<safe-title>.json`, with a
//! forward map (episode key -> hash/path) and a reverse index (hash ->
//! episode key) used to flag hash collisions across episodes.

use std::collections::HashMap;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MANIFEST_ROOT: &str = "data/hash-manifests";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeHashEntry {
    pub md5: String,
    pub path: String,
    pub size: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub series: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub episodes: HashMap<String, EpisodeHashEntry>,
    #[serde(default)]
    pub hash_index: HashMap<String, String>,
}

impl Manifest {
    fn new(series: &str) -> Self {
        Self {
            series: series.to_string(),
            updated_at: None,
            episodes: HashMap::new(),
            hash_index: HashMap::new(),
        }
    }
}

#[must_use]
pub fn episode_key(season: i32, ep_no: i32) -> String {
    format!("S{season:02}E{ep_no:02}")
}

fn manifest_path(safe_title: &str) -> PathBuf {
    Path::new(MANIFEST_ROOT).join(format!("{safe_title}.json"))
}

pub async fn load_manifest(safe_title: &str) -> Result<Manifest> {
    let path = manifest_path(safe_title);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            serde_json::from_str(&contents).with_context(|| format!("parsing manifest at {path:?}"))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::new(safe_title)),
        Err(e) => Err(e).with_context(|| format!("reading manifest at {path:?}")),
    }
}

/// Writes the manifest atomically: write to a sibling temp file then rename
/// over the target, so a crash mid-write never leaves a truncated manifest.
pub async fn save_manifest(safe_title: &str, manifest: &mut Manifest) -> Result<()> {
    manifest.updated_at = Some(Utc::now());
    let path = manifest_path(safe_title);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(manifest)?;
    tokio::fs::write(&tmp_path, body).await?;
    tokio::fs::rename(&tmp_path, &path).await?;
    Ok(())
}

/// Streams the file in 1MiB chunks so hashing a multi-gigabyte episode
/// doesn't require loading it into memory.
pub fn compute_md5(path: &Path) -> Result<String> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("opening {path:?} for hashing"))?;
    let mut ctx = md5::Context::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        ctx.consume(&buf[..n]);
    }
    Ok(format!("{:x}", ctx.compute()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyFailure {
    /// This MD5 is already recorded under a different episode key.
    HashConflictsWith(String),
    /// This episode key already has a different recorded MD5.
    EpisodeMd5Mismatch,
}

/// Checks whether recording `(key, md5)` would collide with an existing
/// entry, without mutating the manifest.
#[must_use]
pub fn check_mapping_consistency(
    manifest: &Manifest,
    key: &str,
    md5: &str,
) -> Option<ConsistencyFailure> {
    if let Some(existing_key) = manifest.hash_index.get(md5)
        && existing_key != key
    {
        return Some(ConsistencyFailure::HashConflictsWith(existing_key.clone()));
    }
    if let Some(existing) = manifest.episodes.get(key)
        && existing.md5 != md5
    {
        return Some(ConsistencyFailure::EpisodeMd5Mismatch);
    }
    None
}

pub fn record_episode_hash(
    manifest: &mut Manifest,
    key: &str,
    md5: &str,
    path: &str,
    size: u64,
) {
    manifest.episodes.insert(
        key.to_string(),
        EpisodeHashEntry {
            md5: md5.to_string(),
            path: path.to_string(),
            size,
            updated_at: Utc::now(),
        },
    );
    manifest.hash_index.insert(md5.to_string(), key.to_string());
}

#[derive(Debug, Clone)]
pub struct RangeMismatch {
    pub key: String,
    pub reason: &'static str,
}

/// Diagnostic sweep over a season's episode keys: flags any entry missing
/// from the manifest, whose file no longer exists, or whose on-disk hash no
/// longer matches what's recorded.
#[must_use]
pub fn verify_range_against_manifest(
    manifest: &Manifest,
    season: i32,
    lo: i32,
    hi: i32,
) -> Vec<RangeMismatch> {
    let mut mismatches = Vec::new();
    for ep_no in lo..=hi {
        let key = episode_key(season, ep_no);
        let Some(entry) = manifest.episodes.get(&key) else {
            mismatches.push(RangeMismatch {
                key,
                reason: "missing_from_manifest",
            });
            continue;
        };
        let path = Path::new(&entry.path);
        if !path.exists() {
            mismatches.push(RangeMismatch {
                key,
                reason: "file_missing",
            });
            continue;
        }
        match compute_md5(path) {
            Ok(md5) if md5 == entry.md5 => {}
            Ok(_) => mismatches.push(RangeMismatch {
                key,
                reason: "md5_mismatch",
            }),
            Err(_) => mismatches.push(RangeMismatch {
                key,
                reason: "hash_failed",
            }),
        }
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_key_format() {
        assert_eq!(episode_key(1, 7), "S01E07");
        assert_eq!(episode_key(2, 13), "S02E13");
    }

    #[test]
    fn detects_hash_conflict_across_episodes() {
        let mut manifest = Manifest::new("Show");
        record_episode_hash(&mut manifest, "S01E01", "abc123", "/lib/ep1.mkv", 100);
        let failure = check_mapping_consistency(&manifest, "S01E02", "abc123");
        assert_eq!(
            failure,
            Some(ConsistencyFailure::HashConflictsWith("S01E01".to_string()))
        );
    }

    #[test]
    fn detects_episode_md5_mismatch() {
        let mut manifest = Manifest::new("Show");
        record_episode_hash(&mut manifest, "S01E01", "abc123", "/lib/ep1.mkv", 100);
        let failure = check_mapping_consistency(&manifest, "S01E01", "def456");
        assert_eq!(failure, Some(ConsistencyFailure::EpisodeMd5Mismatch));
    }

    #[test]
    fn no_conflict_for_matching_reinsert() {
        let mut manifest = Manifest::new("Show");
        record_episode_hash(&mut manifest, "S01E01", "abc123", "/lib/ep1.mkv", 100);
        let failure = check_mapping_consistency(&manifest, "S01E01", "abc123");
        assert_eq!(failure, None);
    }
}
