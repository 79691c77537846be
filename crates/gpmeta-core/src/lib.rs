pub mod cancel;
pub mod config;
pub mod dedup;
pub mod error;
pub mod exiftool;
pub mod extras;
pub mod identity;
pub mod materialize;
pub mod media;
pub mod rename;
pub mod report;
pub mod resolve;
pub mod scan;
pub mod sniff;
pub mod takeout_json;
pub mod year_bucket;

use std::cell::Cell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use config::{NamingRules, OnCollision};
use error::{EntryError, EntryFailure};
use exiftool::{ExifTool, MetadataWriter};
use identity::IdentityNormalizer;
use materialize::{Materializer, Plan};
use media::{DuplicateRecord, EntryKind, MediaEntry};
use resolve::MatchKind;

pub use cancel::{CancellationToken, CancelledError};

fn default_tool_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub on_collision: OnCollision,
    /// Copy media without usable metadata into `unmatched/`.
    #[serde(default)]
    pub quarantine_unmatched: bool,
    #[serde(default)]
    pub naming: NamingRules,
    /// exiftool executable; `GPMETA_EXIFTOOL` or PATH when unset.
    #[serde(default)]
    pub exiftool: Option<PathBuf>,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
}

impl ProcessOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            on_collision: OnCollision::default(),
            quarantine_unmatched: false,
            naming: NamingRules::default(),
            exiftool: None,
            tool_timeout_secs: default_tool_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessResult {
    pub total_media: u64,
    /// Media paired with a sidecar
    pub matched: u64,
    pub files_written: u64,
    /// Pairs already present in the output from an earlier run
    pub files_skipped: u64,
    pub quarantined: u64,
    pub duplicates: Vec<DuplicateRecord>,
    pub orphaned_sidecars: Vec<PathBuf>,
    pub failures: Vec<EntryFailure>,
}

/// Control options for process execution (cancellation).
#[derive(Debug, Clone, Default)]
pub struct ProcessControl {
    pub cancel_token: Option<CancellationToken>,
}

impl ProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn check(&self) -> Result<(), CancelledError> {
        match &self.cancel_token {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter: emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: Cell<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: Cell::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            if self.last_emit.get().elapsed().as_millis() < 200 {
                return;
            }
            self.last_emit.set(Instant::now());
        }
        (self.inner)(stage, current, total, message);
    }
}

enum EntryOutcome {
    Succeeded,
    /// Already in the output
    Skipped,
}

/// Run the full pipeline with exiftool as the metadata writer.
pub fn process(options: &ProcessOptions, progress_callback: &ProgressCallback) -> anyhow::Result<ProcessResult> {
    process_with_control(options, &ProcessControl::default(), progress_callback)
}

/// Run the full pipeline with exiftool and control options.
pub fn process_with_control(
    options: &ProcessOptions,
    control: &ProcessControl,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    let tool = ExifTool::new(
        exiftool::exiftool_path(options.exiftool.as_deref()),
        Duration::from_secs(options.tool_timeout_secs),
    );
    process_with_writer(options, &tool, control, progress_callback)
}

/// Run the full pipeline: scan, resolve, quarantine duplicates, then fix,
/// annotate and copy every matched entry.
///
/// Batch-level problems (unreadable input, unusable output, bad naming rules)
/// abort before any entry is touched. Per-entry problems are collected in
/// `ProcessResult::failures` and the batch carries on.
pub fn process_with_writer(
    options: &ProcessOptions,
    writer: &dyn MetadataWriter,
    control: &ProcessControl,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<ProcessResult> {
    let tp = ThrottledProgress::new(progress_callback);
    control.check()?;

    options.naming.validate()?;
    let normalizer = IdentityNormalizer::new(&options.naming)?;

    let input = scan::canonical_root(&options.input)?;
    std::fs::create_dir_all(&options.output)
        .with_context(|| format!("cannot create output directory {}", options.output.display()))?;
    let output = options
        .output
        .canonicalize()
        .with_context(|| format!("cannot open output directory {}", options.output.display()))?;
    if input.starts_with(&output) {
        anyhow::bail!(
            "input {} must not be the output directory or inside it",
            input.display()
        );
    }
    let exclude = output.starts_with(&input).then_some(output.as_path());

    let mut materializer = Materializer::new(&output, options.on_collision, &options.naming)?;

    // Stage 1: Scan
    tp.report("scan", 0, 1, "Scanning input");
    let scanned = scan::scan(&input, exclude, &normalizer, &options.naming)?;
    let media_duplicates = scanned
        .duplicates
        .iter()
        .filter(|d| d.kind == EntryKind::Media)
        .count();
    let total_media = (scanned.media.len() + media_duplicates) as u64;
    info!(
        "Found {} media files, {} sidecars, {} duplicates, {} other files",
        total_media,
        scanned.sidecars.len(),
        scanned.duplicates.len(),
        scanned.ignored
    );
    control.check()?;

    // Stage 2: Resolve
    tp.report("resolve", 0, 1, "Matching sidecars");
    let resolution = resolve::resolve(scanned.media, &scanned.sidecars, &normalizer);
    info!(
        "{} matched, {} without metadata, {} orphaned sidecars",
        resolution.matched.len(),
        resolution.unmatched.len(),
        resolution.orphaned.len()
    );

    let mut result = ProcessResult {
        total_media,
        matched: resolution.matched.len() as u64,
        ..Default::default()
    };

    // Stage 3: Quarantine duplicates
    let dup_total = scanned.duplicates.len() as u64;
    for (i, record) in scanned.duplicates.iter().enumerate() {
        tp.report("quarantine", i as u64, dup_total, &record.key);
        match materializer.quarantine_duplicate(record) {
            Ok(_) => result.quarantined += 1,
            Err(e) => {
                warn!("{}", e);
                result.failures.push(EntryFailure::new(&record.duplicate, &e));
            }
        }
    }
    result.duplicates = scanned.duplicates;
    control.check()?;

    // Stage 4: Entries
    let total = resolution.matched.len() as u64;
    let mut moved_sidecars: HashMap<PathBuf, PathBuf> = HashMap::new();
    for (i, (mut entry, kind)) in resolution.matched.into_iter().enumerate() {
        control.check()?;
        tp.report("entries", i as u64, total, entry.file_name());
        if let Some(moved) = entry.sidecar.as_ref().and_then(|s| moved_sidecars.get(s)) {
            entry.sidecar = Some(moved.clone());
        }
        match process_entry(&mut materializer, &mut entry, kind, writer, &normalizer, &mut moved_sidecars) {
            Ok(EntryOutcome::Succeeded) => result.files_written += 1,
            Ok(EntryOutcome::Skipped) => result.files_skipped += 1,
            Err(e) => {
                warn!("{}", e);
                result.failures.push(EntryFailure::new(&entry.path, &e));
            }
        }
    }

    for (entry, err) in resolution.unmatched {
        if options.quarantine_unmatched {
            match materializer.quarantine_unmatched(&entry) {
                Ok(_) => result.quarantined += 1,
                Err(e) => {
                    warn!("{}", e);
                    result.failures.push(EntryFailure::new(&entry.path, &e));
                }
            }
        }
        result.failures.push(EntryFailure::new(&entry.path, &err));
    }

    for sidecar in resolution.orphaned {
        warn!("Orphaned metadata: {}", sidecar.path.display());
        result.orphaned_sidecars.push(sidecar.path);
    }

    tp.report("done", 1, 1, "Done");
    info!(
        "{} written, {} skipped, {} quarantined, {} failed",
        result.files_written,
        result.files_skipped,
        result.quarantined,
        result.failures.len()
    );
    Ok(result)
}

/// Already-copied check, extension fix, metadata application, copy.
///
/// Sidecars renamed by the extension fix are recorded in `moved_sidecars` so
/// edited variants sharing them can follow.
fn process_entry(
    materializer: &mut Materializer,
    entry: &mut MediaEntry,
    kind: MatchKind,
    writer: &dyn MetadataWriter,
    normalizer: &IdentityNormalizer,
    moved_sidecars: &mut HashMap<PathBuf, PathBuf>,
) -> Result<EntryOutcome, EntryError> {
    let sidecar = entry
        .sidecar
        .clone()
        .ok_or_else(|| EntryError::NoMetadataFound(entry.path.clone()))?;
    // Only a skip is decided here; collisions are judged on the fixed name.
    if let Ok(Plan::AlreadyPresent { media }) = materializer.plan(entry, &sidecar, normalizer) {
        debug!("{} already copied to {}", entry.path.display(), media.display());
        return Ok(EntryOutcome::Skipped);
    }

    if let Some(renamed) = rename::fix_extension(entry, kind != MatchKind::Shared, normalizer)? {
        if let Some((from, to)) = renamed.sidecar {
            moved_sidecars.insert(from, to);
        }
    }
    let sidecar = entry.sidecar.clone().unwrap_or(sidecar);

    writer.apply(&entry.path, &sidecar)?;

    let plan = materializer.plan(entry, &sidecar, normalizer)?;
    if let Plan::AlreadyPresent { media } = &plan {
        debug!("{} already copied to {}", entry.path.display(), media.display());
        return Ok(EntryOutcome::Skipped);
    }
    let taken = takeout_json::read_taken_time(&sidecar);
    materializer.copy_pair(&plan, &entry.path, &sidecar, taken)?;
    debug!("Copied {} ({:?} match)", entry.path.display(), kind);
    Ok(EntryOutcome::Succeeded)
}
