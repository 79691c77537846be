use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::error::EntryError;
use crate::identity::IdentityNormalizer;
use crate::media::MediaEntry;
use crate::sniff::sniff;

/// Paths touched by an extension fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub media_from: PathBuf,
    pub media_to: PathBuf,
    pub sidecar: Option<(PathBuf, PathBuf)>,
}

fn inconsistency(media: &Path, reason: String) -> EntryError {
    EntryError::RenameInconsistency {
        media: media.to_path_buf(),
        reason,
    }
}

/// Rename a media file whose content contradicts its extension, together
/// with its sidecar.
///
/// The sidecar is renamed to the default spelling for the new media name so
/// the pair still matches on a later run. Either both renames happen or
/// neither does: a failed sidecar rename puts the media file back. Files the
/// sniffer cannot classify and files with a correct extension are left alone.
///
/// `owns_sidecar` is false when the sidecar belongs to another file (an edited
/// variant sharing its original's metadata); it is then left untouched.
pub fn fix_extension(
    entry: &mut MediaEntry,
    owns_sidecar: bool,
    normalizer: &IdentityNormalizer,
) -> Result<Option<Renamed>, EntryError> {
    let Some(kind) = sniff(&entry.path) else {
        return Ok(None);
    };
    if kind.accepts_extension(&entry.extension) {
        return Ok(None);
    }

    let new_name = format!("{}.{}", entry.stem, kind.canonical_extension());
    let media_from = entry.path.clone();
    let media_to = entry.path.with_file_name(&new_name);
    if media_to.exists() {
        return Err(inconsistency(&media_from, format!("{} already exists", media_to.display())));
    }

    let sidecar_move = match (&entry.sidecar, owns_sidecar) {
        (Some(current), true) => {
            let target = current.with_file_name(normalizer.default_sidecar_name(&new_name));
            if target != *current && target.exists() {
                return Err(inconsistency(&media_from, format!("{} already exists", target.display())));
            }
            (target != *current).then(|| (current.clone(), target))
        }
        _ => None,
    };

    fs::rename(&media_from, &media_to)
        .map_err(|e| inconsistency(&media_from, format!("renaming media failed: {}", e)))?;

    if let Some((from, to)) = &sidecar_move {
        if let Err(e) = fs::rename(from, to) {
            return Err(match fs::rename(&media_to, &media_from) {
                Ok(()) => inconsistency(&media_from, format!("renaming sidecar failed, media restored: {}", e)),
                Err(undo) => {
                    error!(
                        "Could not restore {} after failed sidecar rename: {}",
                        media_from.display(),
                        undo
                    );
                    inconsistency(
                        &media_to,
                        format!("renaming sidecar failed ({}) and restoring media failed ({})", e, undo),
                    )
                }
            });
        }
    }

    entry.relocate(media_to.clone(), normalizer);
    if let Some((_, to)) = &sidecar_move {
        entry.sidecar = Some(to.clone());
    }
    info!(
        "Renamed {} -> {} (content is {:?})",
        media_from.display(),
        new_name,
        kind
    );

    Ok(Some(Renamed {
        media_from,
        media_to,
        sidecar: sidecar_move,
    }))
}
