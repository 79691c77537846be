use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::identity::IdentityNormalizer;

/// Extensions mime_guess does not reliably map to image/video.
const EXTRA_MEDIA_EXTENSIONS: &[&str] = &["mts", "m2ts", "heic", "heif"];

/// Whether an extension (without the dot) belongs to the image/video family.
pub fn is_media_extension(ext: &str) -> bool {
    let lower = ext.to_ascii_lowercase();
    if EXTRA_MEDIA_EXTENSIONS.contains(&lower.as_str()) {
        return true;
    }
    mime_guess::from_ext(&lower)
        .first()
        .map_or(false, |mime| {
            mime.type_() == mime_guess::mime::IMAGE || mime.type_() == mime_guess::mime::VIDEO
        })
}

/// One physical media file.
#[derive(Debug, Clone, Serialize)]
pub struct MediaEntry {
    pub path: PathBuf,
    /// File name without the extension
    pub stem: String,
    /// Declared extension, as found on disk (may be empty)
    pub extension: String,
    /// Year taken from the nearest year folder
    pub year: Option<String>,
    /// Canonical identity key, always derived from the file name
    pub key: String,
    /// Paired sidecar, set by the resolver
    pub sidecar: Option<PathBuf>,
}

impl MediaEntry {
    pub fn new(path: PathBuf, year: Option<String>, normalizer: &IdentityNormalizer) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_string();
        let mut entry = Self {
            path,
            stem: String::new(),
            extension: String::new(),
            year,
            key: String::new(),
            sidecar: None,
        };
        entry.refresh_identity(&file_name, normalizer);
        Some(entry)
    }

    pub fn file_name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }

    /// Move the entry to `new_path` and recompute stem, extension and key.
    pub fn relocate(&mut self, new_path: PathBuf, normalizer: &IdentityNormalizer) {
        self.path = new_path;
        let file_name = self.file_name().to_string();
        self.refresh_identity(&file_name, normalizer);
    }

    fn refresh_identity(&mut self, file_name: &str, normalizer: &IdentityNormalizer) {
        let path = Path::new(file_name);
        self.stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name)
            .to_string();
        self.extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        self.key = normalizer.media_identity(file_name);
    }
}

/// One JSON metadata file.
#[derive(Debug, Clone, Serialize)]
pub struct SidecarEntry {
    pub path: PathBuf,
    pub key: String,
    pub year: Option<String>,
}

impl SidecarEntry {
    pub fn file_name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Media,
    Sidecar,
}

/// Two files of the same class that resolved to the same (year, key) slot.
/// The first one found keeps the slot; the other is quarantined.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateRecord {
    pub kind: EntryKind,
    pub year: Option<String>,
    pub key: String,
    pub kept: PathBuf,
    pub duplicate: PathBuf,
    /// Byte-identical to the kept file (only hashed when sizes match)
    pub identical: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NamingRules;

    #[test]
    fn test_media_extensions() {
        for ext in ["jpg", "JPEG", "png", "heic", "mov", "mp4", "MTS", "gif"] {
            assert!(is_media_extension(ext), "{ext}");
        }
        for ext in ["json", "txt", "html", ""] {
            assert!(!is_media_extension(ext), "{ext}");
        }
    }

    #[test]
    fn test_relocate_recomputes_key() {
        let normalizer = IdentityNormalizer::new(&NamingRules::default()).unwrap();
        let mut entry =
            MediaEntry::new(PathBuf::from("/in/2020/IMG_0001.jpg"), Some("2020".into()), &normalizer).unwrap();
        assert_eq!(entry.key, "IMG_0001.jpg");
        assert_eq!(entry.extension, "jpg");

        entry.relocate(PathBuf::from("/in/2020/IMG_0001.png"), &normalizer);
        assert_eq!(entry.key, "IMG_0001.png");
        assert_eq!(entry.stem, "IMG_0001");
        assert_eq!(entry.extension, "png");
    }
}
