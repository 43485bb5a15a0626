use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// One shareable entry in a peer's listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Share-root-relative path
    pub name: String,

    /// Size in bytes
    pub size: u64,

    /// Last modification time
    pub mod_time: DateTime<Utc>,

    /// Whether the entry is a directory
    pub is_dir: bool,

    /// Address of the peer that owns the entry
    pub owner_id: String,
}

/// Snapshot of one peer's shareable files.
///
/// Produced fresh on each scan and replaced wholesale, never mutated in
/// place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Address of the owning peer
    pub peer_id: String,

    /// Entries in scan order
    pub files: Vec<FileEntry>,
}

/// Scan `root` recursively and capture a fresh listing owned by `owner_id`.
///
/// The root itself is excluded; entries keep root-relative names and
/// directories are listed alongside files.
pub fn scan(root: &Path, owner_id: &str) -> Result<Listing> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("couldn't scan {}", root.display()))?;
        if entry.path() == root {
            continue;
        }

        let meta = entry
            .metadata()
            .with_context(|| format!("couldn't stat {}", entry.path().display()))?;
        let modified = meta
            .modified()
            .with_context(|| format!("couldn't read mtime of {}", entry.path().display()))?;

        let name = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();

        files.push(FileEntry {
            name,
            size: meta.len(),
            mod_time: DateTime::<Utc>::from(modified),
            is_dir: meta.is_dir(),
            owner_id: owner_id.to_string(),
        });
    }

    Ok(Listing {
        peer_id: owner_id.to_string(),
        files,
    })
}

impl Listing {
    /// Serialize to the single-line JSON wire encoding.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("couldn't encode file list")
    }

    /// Decode the JSON wire encoding back into a listing.
    pub fn from_json(data: &str) -> Result<Listing> {
        serde_json::from_str(data).context("couldn't decode file list")
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Files from {}:", self.peer_id)?;
        writeln!(f, "------------------------------------")?;
        for entry in &self.files {
            let tag = if entry.is_dir { "Dir " } else { "File" };
            writeln!(
                f,
                "[{}] {:<30} {:>8} bytes  {}",
                tag,
                entry.name,
                entry.size,
                entry.mod_time.format("%Y-%m-%d %H:%M:%S"),
            )?;
        }
        writeln!(f, "------------------------------------")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_captures_relative_names_and_sizes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"twelve bytes").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join("a.txt"), b"abc").unwrap();

        let listing = scan(dir.path(), "127.0.0.1:9000").unwrap();
        assert_eq!(listing.peer_id, "127.0.0.1:9000");
        assert_eq!(listing.files.len(), 3);

        let notes = listing.files.iter().find(|e| e.name == "notes.txt").unwrap();
        assert_eq!(notes.size, 12);
        assert!(!notes.is_dir);
        assert_eq!(notes.owner_id, "127.0.0.1:9000");

        let docs = listing.files.iter().find(|e| e.name == "docs").unwrap();
        assert!(docs.is_dir);

        let nested = Path::new("docs").join("a.txt").to_string_lossy().into_owned();
        assert!(listing.files.iter().any(|e| e.name == nested));
    }

    #[test]
    fn test_scan_of_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert!(scan(&gone, "p").is_err());
    }

    #[test]
    fn test_json_round_trip_preserves_every_field() {
        let listing = Listing {
            peer_id: "10.0.0.1:9000".to_string(),
            files: vec![
                FileEntry {
                    name: "a.txt".to_string(),
                    size: 42,
                    mod_time: Utc::now(),
                    is_dir: false,
                    owner_id: "10.0.0.1:9000".to_string(),
                },
                FileEntry {
                    name: "sub".to_string(),
                    size: 0,
                    mod_time: Utc::now(),
                    is_dir: true,
                    owner_id: "10.0.0.1:9000".to_string(),
                },
            ],
        };

        let json = listing.to_json().unwrap();
        assert!(!json.contains('\n'));
        assert_eq!(Listing::from_json(&json).unwrap(), listing);
    }

    #[test]
    fn test_sentinel_is_not_a_valid_listing() {
        assert!(Listing::from_json(crate::protocol::NO_FILES_SENTINEL).is_err());
    }
}
