use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::NamingRules;
use crate::dedup;
use crate::identity::IdentityNormalizer;
use crate::media::{is_media_extension, DuplicateRecord, EntryKind, MediaEntry, SidecarEntry};
use crate::year_bucket::year_bucket;

/// (year bucket, canonical key)
pub type SlotKey = (Option<String>, String);

/// Immutable lookup of sidecars by (year, key), built once by the scanner.
#[derive(Debug, Default)]
pub struct SidecarIndex {
    slots: HashMap<SlotKey, SidecarEntry>,
}

impl SidecarIndex {
    pub fn get(&self, year: &Option<String>, key: &str) -> Option<&SidecarEntry> {
        self.slots.get(&(year.clone(), key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotKey, &SidecarEntry)> {
        self.slots.iter()
    }

    /// Insert unless the slot is taken; gives the newcomer back on conflict.
    fn try_insert(&mut self, entry: SidecarEntry) -> Result<(), (SidecarEntry, PathBuf)> {
        match self.slots.entry((entry.year.clone(), entry.key.clone())) {
            Entry::Occupied(slot) => Err((entry, slot.get().path.clone())),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
impl FromIterator<SidecarEntry> for SidecarIndex {
    /// Builds an index keeping the first entry per slot.
    fn from_iter<I: IntoIterator<Item = SidecarEntry>>(iter: I) -> Self {
        let mut index = SidecarIndex::default();
        for entry in iter {
            let _ = index.try_insert(entry);
        }
        index
    }
}

/// Result of scanning the input tree
pub struct ScanResult {
    /// Media files, one per (year, key), in traversal order
    pub media: Vec<MediaEntry>,
    pub sidecars: SidecarIndex,
    /// Files that lost their slot to an earlier file of the same class
    pub duplicates: Vec<DuplicateRecord>,
    /// Files that are neither media nor sidecars
    pub ignored: u64,
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Walk `root` once and classify every file. Nothing is read or modified.
///
/// `exclude` is skipped entirely (the output directory when it lives inside
/// the input). Traversal is sorted by file name so the file that keeps a
/// contested slot is the same on every run.
pub fn scan(
    root: &Path,
    exclude: Option<&Path>,
    normalizer: &IdentityNormalizer,
    rules: &NamingRules,
) -> anyhow::Result<ScanResult> {
    if !root.is_dir() {
        anyhow::bail!("input is not a directory: {}", root.display());
    }

    let mut media: Vec<MediaEntry> = Vec::new();
    let mut media_slots: HashMap<SlotKey, usize> = HashMap::new();
    let mut sidecars = SidecarIndex::default();
    let mut duplicates = Vec::new();
    let mut ignored = 0u64;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let hidden = e.file_name().to_str().map_or(false, is_hidden);
            let excluded = exclude.map_or(false, |x| e.path() == x);
            !hidden && !excluded
        });

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable path: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("Skipping file with non UTF-8 name: {}", path.display());
            ignored += 1;
            continue;
        };
        let year = year_bucket(root, path);
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        if is_media_extension(ext) {
            let Some(m) = MediaEntry::new(path.to_path_buf(), year, normalizer) else {
                continue;
            };
            match media_slots.entry((m.year.clone(), m.key.clone())) {
                Entry::Occupied(slot) => {
                    let kept = &media[*slot.get()];
                    duplicates.push(record(EntryKind::Media, &m.year, &m.key, &kept.path, &m.path));
                }
                Entry::Vacant(slot) => {
                    slot.insert(media.len());
                    media.push(m);
                }
            }
        } else if ext.eq_ignore_ascii_case("json") && !rules.is_ignored_json(file_name) {
            let Some(key) = normalizer.sidecar_key(file_name) else {
                ignored += 1;
                continue;
            };
            let sidecar = SidecarEntry {
                path: path.to_path_buf(),
                key,
                year,
            };
            if let Err((lost, kept)) = sidecars.try_insert(sidecar) {
                duplicates.push(record(EntryKind::Sidecar, &lost.year, &lost.key, &kept, &lost.path));
            }
        } else {
            debug!("Ignoring {}", path.display());
            ignored += 1;
        }
    }

    for d in &duplicates {
        warn!(
            "Duplicate {:?} key {:?} in {}: keeping {}, quarantining {}",
            d.kind,
            d.key,
            d.year.as_deref().unwrap_or("no year"),
            d.kept.display(),
            d.duplicate.display()
        );
    }

    Ok(ScanResult {
        media,
        sidecars,
        duplicates,
        ignored,
    })
}

fn record(kind: EntryKind, year: &Option<String>, key: &str, kept: &Path, duplicate: &Path) -> DuplicateRecord {
    DuplicateRecord {
        kind,
        year: year.clone(),
        key: key.to_string(),
        kept: kept.to_path_buf(),
        duplicate: duplicate.to_path_buf(),
        identical: dedup::same_content(kept, duplicate),
    }
}

/// Canonicalize the input root for scanning.
pub fn canonical_root(root: &Path) -> anyhow::Result<PathBuf> {
    root.canonicalize()
        .with_context(|| format!("cannot open input directory {}", root.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn run(root: &Path) -> ScanResult {
        let rules = NamingRules::default();
        let normalizer = IdentityNormalizer::new(&rules).unwrap();
        scan(root, None, &normalizer, &rules).unwrap()
    }

    #[test]
    fn test_classification() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Photos from 2020/IMG_0001.jpg"), b"a");
        touch(&root.join("Photos from 2020/IMG_0001.jpg.supplemental-metadata.json"), b"{}");
        touch(&root.join("Photos from 2020/VID_0002.MP4"), b"b");
        touch(&root.join("Photos from 2020/metadata.json"), b"{}");
        touch(&root.join("Photos from 2020/notes.txt"), b"c");
        touch(&root.join(".hidden/IMG_9.jpg"), b"d");

        let scan = run(root);
        assert_eq!(scan.media.len(), 2);
        assert_eq!(scan.sidecars.len(), 1);
        assert_eq!(scan.ignored, 2);
        assert!(scan.duplicates.is_empty());

        let m = &scan.media[0];
        assert_eq!(m.key, "IMG_0001.jpg");
        assert_eq!(m.year.as_deref(), Some("2020"));
        assert!(scan.sidecars.get(&Some("2020".into()), "IMG_0001.jpg").is_some());
    }

    #[test]
    fn test_same_key_in_same_year_is_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Photos from 2020/a/IMG_0002.jpg"), b"same");
        touch(&root.join("Photos from 2020/b/IMG_0002.jpg"), b"same");
        touch(&root.join("Photos from 2020/a/IMG_0002.jpg.json"), b"{}");
        touch(&root.join("Photos from 2020/b/IMG_0002.jpg.suppl.json"), b"{}");

        let scan = run(root);
        assert_eq!(scan.media.len(), 1);
        assert_eq!(scan.sidecars.len(), 1);
        assert_eq!(scan.duplicates.len(), 2);

        let media_dup = scan.duplicates.iter().find(|d| d.kind == EntryKind::Media).unwrap();
        assert!(media_dup.kept.ends_with("a/IMG_0002.jpg"));
        assert!(media_dup.duplicate.ends_with("b/IMG_0002.jpg"));
        assert!(media_dup.identical);
    }

    #[test]
    fn test_year_buckets_keep_same_names_apart() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Photos 2020/IMG_0002.jpg"), b"x");
        touch(&root.join("Photos 2021/IMG_0002.jpg"), b"y");
        touch(&root.join("Photos 2020/IMG_0002.jpg.supplemental-metadata.json"), b"{}");
        touch(&root.join("Photos 2021/IMG_0002.jpg.supplemental-metadata.json"), b"{}");

        let scan = run(root);
        assert!(scan.duplicates.is_empty());
        assert_eq!(scan.media.len(), 2);
        assert_eq!(scan.sidecars.len(), 2);
    }

    #[test]
    fn test_excluded_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("in/IMG_1.jpg"), b"x");
        touch(&root.join("out/IMG_1.jpg"), b"x");

        let rules = NamingRules::default();
        let normalizer = IdentityNormalizer::new(&rules).unwrap();
        let out = root.join("out");
        let scan = scan(root, Some(&out), &normalizer, &rules).unwrap();
        assert_eq!(scan.media.len(), 1);
        assert!(scan.duplicates.is_empty());
    }

    #[test]
    fn test_missing_root() {
        let rules = NamingRules::default();
        let normalizer = IdentityNormalizer::new(&rules).unwrap();
        assert!(scan(Path::new("/no/such/dir"), None, &normalizer, &rules).is_err());
    }
}
