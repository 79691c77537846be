use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{NamingRules, OnCollision};
use crate::dedup;
use crate::error::EntryError;
use crate::identity::IdentityNormalizer;
use crate::media::{DuplicateRecord, EntryKind, MediaEntry};

pub const METADATA_DIR: &str = "metadata";
pub const DUPLICATES_DIR: &str = "duplicates";
pub const UNMATCHED_DIR: &str = "unmatched";

/// Highest `(n)` counter tried before giving up on a name.
const MAX_COUNTER: u32 = 9999;

/// Where a pair will go, decided before anything is copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Both files are already in place from an earlier run.
    AlreadyPresent { media: PathBuf },
    Copy { media: PathBuf, sidecar: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Free,
    /// Holds a byte-identical copy of the source
    SameFile,
    Taken,
}

/// Recursively scan directory for existing files with sizes (for fast exists/size checks).
fn scan_existing_files(dir: &Path) -> HashMap<PathBuf, u64> {
    WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok().map(|m| (e.into_path(), m.len())))
        .collect()
}

/// A file about to be copied.
#[derive(Debug, Clone, Copy)]
struct Source<'a> {
    path: &'a Path,
    size: u64,
}

impl<'a> Source<'a> {
    fn open(path: &'a Path) -> Result<Self, EntryError> {
        let size = fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| EntryError::io(path, e))?;
        Ok(Self { path, size })
    }
}

/// Name the sidecar gets in the output: its own when it already matches the
/// media key, otherwise the default spelling for the media name (shared and
/// truncated sidecars).
fn sidecar_dest_name(media: &MediaEntry, sidecar: &Path, normalizer: &IdentityNormalizer) -> String {
    let name = sidecar.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if normalizer.sidecar_key(name).as_deref() == Some(media.key.as_str()) {
        name.to_string()
    } else {
        normalizer.default_sidecar_name(media.file_name())
    }
}

fn split_name(file_name: &str) -> (&str, Option<&str>) {
    let path = Path::new(file_name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
    (stem, path.extension().and_then(|s| s.to_str()))
}

fn with_counter(file_name: &str, counter: u32) -> String {
    match split_name(file_name) {
        (stem, Some(ext)) => format!("{}({}).{}", stem, counter, ext),
        (stem, None) => format!("{}({})", stem, counter),
    }
}

/// Copies pairs into the destination tree and quarantines what cannot go there.
///
/// Existing destination files are scanned once up front; files written during
/// the run are tracked in memory, so no path is ever assigned twice.
pub struct Materializer {
    dest_root: PathBuf,
    policy: OnCollision,
    no_year_label: String,
    existing: HashMap<PathBuf, u64>,
    used: HashSet<PathBuf>,
    created_dirs: HashSet<PathBuf>,
}

impl Materializer {
    pub fn new(dest_root: &Path, policy: OnCollision, rules: &NamingRules) -> anyhow::Result<Self> {
        fs::create_dir_all(dest_root.join(METADATA_DIR))
            .with_context(|| format!("cannot create output directory {}", dest_root.display()))?;
        let existing = scan_existing_files(dest_root);
        debug!("{} files already in {}", existing.len(), dest_root.display());
        Ok(Self {
            dest_root: dest_root.to_path_buf(),
            policy,
            no_year_label: rules.no_year_label.clone(),
            existing,
            used: HashSet::new(),
            created_dirs: HashSet::new(),
        })
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// A pre-existing file only counts as the same file when its bytes match.
    fn slot(&self, dest: &Path, source: Source) -> Slot {
        if self.used.contains(dest) {
            return Slot::Taken;
        }
        match self.existing.get(dest) {
            None => Slot::Free,
            Some(&size) if size == source.size && dedup::identical(source.path, dest) => Slot::SameFile,
            Some(_) => Slot::Taken,
        }
    }

    /// `Some(plan)` when both slots are usable, `None` when either is taken.
    fn try_slots(&self, media: PathBuf, media_src: Source, sidecar: PathBuf, sidecar_src: Source) -> Option<Plan> {
        match (self.slot(&media, media_src), self.slot(&sidecar, sidecar_src)) {
            (Slot::SameFile, Slot::SameFile) => Some(Plan::AlreadyPresent { media }),
            (Slot::Taken, _) | (_, Slot::Taken) => None,
            _ => Some(Plan::Copy { media, sidecar }),
        }
    }

    fn year_prefixed(&self, year: &Option<String>, file_name: &str) -> String {
        format!("{}_{}", year.as_deref().unwrap_or(&self.no_year_label), file_name)
    }

    /// Decide where a matched pair goes under the collision policy.
    pub fn plan(&self, media: &MediaEntry, sidecar: &Path, normalizer: &IdentityNormalizer) -> Result<Plan, EntryError> {
        let media_src = Source::open(&media.path)?;
        let sidecar_src = Source::open(sidecar)?;
        let media_name = media.file_name();
        let sidecar_name = sidecar_dest_name(media, sidecar, normalizer);
        let sidecar_name = sidecar_name.as_str();

        let media_dest = self.dest_root.join(media_name);
        let sidecar_dest = self.dest_root.join(METADATA_DIR).join(sidecar_name);
        if let Some(plan) = self.try_slots(media_dest.clone(), media_src, sidecar_dest.clone(), sidecar_src) {
            return Ok(plan);
        }

        match self.policy {
            OnCollision::Fail => {
                let taken = if self.slot(&media_dest, media_src) == Slot::Taken {
                    media_dest
                } else {
                    sidecar_dest
                };
                Err(EntryError::DestinationCollision(taken))
            }
            OnCollision::Disambiguate => {
                for counter in 1..=MAX_COUNTER {
                    let name = with_counter(media_name, counter);
                    let media_dest = self.dest_root.join(&name);
                    let sidecar_dest = self
                        .dest_root
                        .join(METADATA_DIR)
                        .join(normalizer.default_sidecar_name(&name));
                    if let Some(plan) = self.try_slots(media_dest, media_src, sidecar_dest, sidecar_src) {
                        return Ok(plan);
                    }
                }
                Err(EntryError::DestinationCollision(media_dest))
            }
            OnCollision::Quarantine => {
                let dup_dir = self.dest_root.join(DUPLICATES_DIR);
                let media_dest = dup_dir.join(self.year_prefixed(&media.year, media_name));
                let sidecar_dest = dup_dir
                    .join(METADATA_DIR)
                    .join(self.year_prefixed(&media.year, sidecar_name));
                self.try_slots(media_dest.clone(), media_src, sidecar_dest, sidecar_src)
                    .ok_or(EntryError::DestinationCollision(media_dest))
            }
        }
    }

    /// Carry out a `Plan::Copy`. If the sidecar copy fails the media copy is
    /// removed again so the output never holds half a pair.
    pub fn copy_pair(
        &mut self,
        plan: &Plan,
        media: &Path,
        sidecar: &Path,
        taken: Option<NaiveDateTime>,
    ) -> Result<(), EntryError> {
        let Plan::Copy {
            media: media_dest,
            sidecar: sidecar_dest,
        } = plan
        else {
            return Ok(());
        };

        self.copy_file(media, media_dest)?;
        if let Err(err) = self.copy_file(sidecar, sidecar_dest) {
            if fs::remove_file(media_dest).is_ok() {
                self.used.remove(media_dest);
                self.existing.remove(media_dest);
            }
            return Err(err);
        }

        if let Some(dt) = taken {
            if let Some(local) = dt.and_local_timezone(chrono::Local).single() {
                let ft = filetime::FileTime::from_unix_time(local.timestamp(), 0);
                filetime::set_file_mtime(media_dest, ft).ok();
            }
        }
        Ok(())
    }

    /// Copy the losing file of a duplicate into `duplicates[/metadata]/<year>_<name>`.
    pub fn quarantine_duplicate(&mut self, record: &DuplicateRecord) -> Result<PathBuf, EntryError> {
        let mut dir = self.dest_root.join(DUPLICATES_DIR);
        if record.kind == EntryKind::Sidecar {
            dir = dir.join(METADATA_DIR);
        }
        self.quarantine(&record.duplicate, &record.year, &dir)
    }

    /// Copy a media file that has no metadata into `unmatched/<year>_<name>`.
    pub fn quarantine_unmatched(&mut self, entry: &MediaEntry) -> Result<PathBuf, EntryError> {
        let dir = self.dest_root.join(UNMATCHED_DIR);
        self.quarantine(&entry.path, &entry.year, &dir)
    }

    /// Quarantine never refuses a file: taken names get a counter.
    fn quarantine(&mut self, source: &Path, year: &Option<String>, dir: &Path) -> Result<PathBuf, EntryError> {
        let src = Source::open(source)?;
        let file_name = source.file_name().and_then(|n| n.to_str()).unwrap_or("file");
        let base = self.year_prefixed(year, file_name);

        let mut dest = dir.join(&base);
        let mut counter = 0;
        loop {
            match self.slot(&dest, src) {
                Slot::Free => break,
                Slot::SameFile => {
                    debug!("{} already quarantined as {}", source.display(), dest.display());
                    self.used.insert(dest.clone());
                    return Ok(dest);
                }
                Slot::Taken if counter < MAX_COUNTER => {
                    counter += 1;
                    dest = dir.join(with_counter(&base, counter));
                }
                Slot::Taken => return Err(EntryError::DestinationCollision(dest)),
            }
        }

        self.copy_file(source, &dest)?;
        info!("Quarantined {} -> {}", source.display(), dest.display());
        Ok(dest)
    }

    fn copy_file(&mut self, source: &Path, dest: &Path) -> Result<(), EntryError> {
        if let Some(dir) = dest.parent() {
            if !self.created_dirs.contains(dir) {
                fs::create_dir_all(dir).map_err(|e| EntryError::io(dir, e))?;
                self.created_dirs.insert(dir.to_path_buf());
            }
        }
        let size = fs::copy(source, dest).map_err(|e| EntryError::io(dest, e))?;

        // Keep the source modification time, like `cp -p`.
        match fs::metadata(source) {
            Ok(meta) => {
                let mtime = filetime::FileTime::from_last_modification_time(&meta);
                if let Err(e) = filetime::set_file_mtime(dest, mtime) {
                    warn!("Could not set mtime on {}: {}", dest.display(), e);
                }
            }
            Err(e) => warn!("Could not read mtime of {}: {}", source.display(), e),
        }

        self.used.insert(dest.to_path_buf());
        self.existing.insert(dest.to_path_buf(), size);
        Ok(())
    }
}
