//! Canonical identity keys for media files and their JSON sidecars.
//!
//! The exporter names a sidecar `<media name>.<suffix>.json`, but cuts the
//! suffix one character at a time to fit a length budget and moves a
//! duplicate marker `(n)` from the media stem to just before `.json`:
//!
//! ```text
//! IMG_0001(2).jpg  <->  IMG_0001.jpg.supplemental-metadata(2).json
//! A_very_long_name_..._2019.jpg  <->  A_very_long_name_..._2019.jpg.supple.json
//! ```
//!
//! Both sides are reduced to the media file name as the canonical key.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::config::NamingRules;
use crate::media::is_media_extension;

static DUPLICATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<base>.+?)(?P<dup>\(\d+\))$").unwrap());

/// A media stem split into its base and trailing duplicate marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaKey {
    pub base: String,
    /// Marker including the parentheses, e.g. `(2)`
    pub duplicate: Option<String>,
}

/// Parts of a sidecar file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarName {
    /// Media name as the exporter wrote it, possibly truncated
    pub base: String,
    /// Matched suffix spelling without `.json`, e.g. `.suppl` (empty if none)
    pub suffix: String,
    pub duplicate: Option<String>,
}

/// Derives canonical keys. Built once per run from the naming rules.
#[derive(Debug, Clone)]
pub struct IdentityNormalizer {
    sidecar_re: Regex,
    default_suffix: String,
    truncation_len: usize,
}

/// Nested optional chain `s(?:u(?:p(?:...)?)?)?` matching every prefix of `stem`.
/// Greedy optionals make the longest spelling win.
fn suffix_chain(stem: &str) -> String {
    let mut chain = String::new();
    for c in stem.chars().rev() {
        let lit = regex::escape(&c.to_string());
        chain = if chain.is_empty() {
            lit
        } else {
            format!("{}(?:{})?", lit, chain)
        };
    }
    chain
}

fn nfc(s: &str) -> String {
    s.nfc().collect()
}

fn split_name(file_name: &str) -> (&str, Option<&str>) {
    let path = Path::new(file_name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
    let ext = path.extension().and_then(|s| s.to_str());
    (stem, ext)
}

impl IdentityNormalizer {
    pub fn new(rules: &NamingRules) -> anyhow::Result<Self> {
        rules.validate()?;
        // Lazy base + greedy suffix: the shortest base leaves the longest suffix.
        let pattern = format!(
            r"^(?P<base>.+?)(?P<suffix>\.(?:{})?)?(?P<dup>\(\d+\))?\.(?i:json)$",
            suffix_chain(&rules.suffix_stem)
        );
        Ok(Self {
            sidecar_re: Regex::new(&pattern)?,
            default_suffix: rules.default_suffix.clone(),
            truncation_len: rules.truncation_len,
        })
    }

    /// Split a trailing duplicate marker off a media stem.
    pub fn media_key(&self, stem: &str) -> MediaKey {
        match DUPLICATE_RE.captures(stem) {
            Some(caps) => MediaKey {
                base: caps["base"].to_string(),
                duplicate: Some(caps["dup"].to_string()),
            },
            None => MediaKey {
                base: stem.to_string(),
                duplicate: None,
            },
        }
    }

    /// Canonical key of a media file: its file name, NFC-normalized.
    pub fn media_identity(&self, file_name: &str) -> String {
        nfc(file_name)
    }

    pub fn parse_sidecar(&self, file_name: &str) -> Option<SidecarName> {
        let caps = self.sidecar_re.captures(file_name)?;
        Some(SidecarName {
            base: caps["base"].to_string(),
            suffix: caps.name("suffix").map_or("", |m| m.as_str()).to_string(),
            duplicate: caps.name("dup").map(|m| m.as_str().to_string()),
        })
    }

    /// Canonical key of a sidecar. The duplicate marker moves back in front of
    /// the media extension; a base without a media extension (cut by the
    /// exporter) gets it appended. `None` for anything that is not `.json`.
    pub fn sidecar_key(&self, file_name: &str) -> Option<String> {
        let name = self.parse_sidecar(file_name)?;
        let key = match name.duplicate {
            None => name.base,
            Some(dup) => match split_name(&name.base) {
                (stem, Some(ext)) if is_media_extension(ext) => format!("{}{}.{}", stem, dup, ext),
                _ => format!("{}{}", name.base, dup),
            },
        };
        Some(nfc(&key))
    }

    /// Sidecar file name for a media file, using the short default spelling:
    /// `IMG_0001(2).png` -> `IMG_0001.png.suppl(2).json`.
    pub fn default_sidecar_name(&self, media_file_name: &str) -> String {
        let (stem, ext) = split_name(media_file_name);
        let key = self.media_key(stem);
        let mut name = key.base;
        if let Some(ext) = ext {
            name.push('.');
            name.push_str(ext);
        }
        name.push('.');
        name.push_str(&self.default_suffix);
        if let Some(dup) = key.duplicate {
            name.push_str(&dup);
        }
        name.push_str(".json");
        name
    }

    /// Key a sidecar gets when the exporter had to cut the media name itself.
    /// `None` when the name is short enough to survive intact.
    pub fn truncated_key(&self, media_file_name: &str) -> Option<String> {
        let (stem, ext) = split_name(media_file_name);
        let key = self.media_key(stem);
        let full = match ext {
            Some(ext) => format!("{}.{}", key.base, ext),
            None => key.base,
        };
        let full = nfc(&full);
        if full.chars().count() <= self.truncation_len {
            return None;
        }
        let mut cut: String = full.chars().take(self.truncation_len).collect();
        if let Some(dup) = key.duplicate {
            cut.push_str(&dup);
        }
        Some(cut)
    }

    /// Key of a sidecar that dropped the media extension: `IMG_0001.json`.
    pub fn stem_key(&self, media_file_name: &str) -> String {
        nfc(split_name(media_file_name).0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> IdentityNormalizer {
        IdentityNormalizer::new(&NamingRules::default()).unwrap()
    }

    #[test]
    fn test_every_family_member_strips_to_base() {
        let n = normalizer();
        for suffix in NamingRules::default().suffix_family() {
            for base in ["IMG_0001.jpg", "PXL_20210101_120000.mp4", "a.b.c.heic", "ü.jpg"] {
                let name = format!("{}{}", base, suffix);
                assert_eq!(n.sidecar_key(&name).as_deref(), Some(base), "{name}");
            }
        }
    }

    #[test]
    fn test_longest_suffix_wins() {
        let n = normalizer();
        let parsed = n.parse_sidecar("IMG_0001.jpg.supplemental-metadata.json").unwrap();
        assert_eq!(parsed.base, "IMG_0001.jpg");
        assert_eq!(parsed.suffix, ".supplemental-metadata");

        let parsed = n.parse_sidecar("IMG_0001.jpg.supplemental-me.json").unwrap();
        assert_eq!(parsed.base, "IMG_0001.jpg");
        assert_eq!(parsed.suffix, ".supplemental-me");
    }

    #[test]
    fn test_bare_sidecar_key() {
        let n = normalizer();
        assert_eq!(n.sidecar_key("IMG_0001.jpg.json").as_deref(), Some("IMG_0001.jpg"));
        assert_eq!(n.sidecar_key("IMG_0001.json").as_deref(), Some("IMG_0001"));
        assert_eq!(n.sidecar_key("IMG_0001.JSON").as_deref(), Some("IMG_0001"));
        assert_eq!(n.sidecar_key("IMG_0001.jpg"), None);
        assert_eq!(n.sidecar_key(".json"), None);
    }

    #[test]
    fn test_duplicate_marker_relocation() {
        let n = normalizer();
        assert_eq!(
            n.sidecar_key("IMG_0001.jpg.supplemental-metadata(2).json").as_deref(),
            Some("IMG_0001(2).jpg")
        );
        assert_eq!(n.sidecar_key("IMG_0001.jpg.suppl(2).json").as_deref(), Some("IMG_0001(2).jpg"));
        assert_eq!(n.sidecar_key("IMG_0001.jpg(2).json").as_deref(), Some("IMG_0001(2).jpg"));
        assert_eq!(n.sidecar_key("IMG_0001(2).jpg.json").as_deref(), Some("IMG_0001(2).jpg"));
        // no media extension left to move in front of
        assert_eq!(n.sidecar_key("Screenshot 2020.01(2).json").as_deref(), Some("Screenshot 2020.01(2)"));
    }

    #[test]
    fn test_media_key() {
        let n = normalizer();
        for stem in ["IMG_0001", "holiday (final)", "(3)", "x(2)y"] {
            let key = n.media_key(stem);
            assert_eq!(key.base, stem);
            assert_eq!(key.duplicate, None);
        }
        let key = n.media_key("IMG_0001(12)");
        assert_eq!(key.base, "IMG_0001");
        assert_eq!(key.duplicate.as_deref(), Some("(12)"));
    }

    #[test]
    fn test_default_sidecar_name_roundtrip() {
        let n = normalizer();
        assert_eq!(n.default_sidecar_name("IMG_0001.png"), "IMG_0001.png.suppl.json");
        assert_eq!(n.default_sidecar_name("IMG_0001(2).png"), "IMG_0001.png.suppl(2).json");
        for media in ["IMG_0001.png", "IMG_0001(2).png", "clip(10).mp4"] {
            let sidecar = n.default_sidecar_name(media);
            assert_eq!(n.sidecar_key(&sidecar), Some(n.media_identity(media)));
        }
    }

    #[test]
    fn test_truncated_key() {
        let n = normalizer();
        assert_eq!(n.truncated_key("IMG_0001.jpg"), None);

        let long = "Screenshot_20190101-123456_Some_Long_App_Name_Here.jpg";
        let expected: String = long.chars().take(46).collect();
        assert_eq!(n.truncated_key(long), Some(expected.clone()));
        assert_eq!(n.sidecar_key(&format!("{}.json", expected)), Some(expected.clone()));

        let dup = "Screenshot_20190101-123456_Some_Long_App_Name_Here(1).jpg";
        assert_eq!(n.truncated_key(dup), Some(format!("{}(1)", expected)));
        assert_eq!(n.sidecar_key(&format!("{}(1).json", expected)), Some(format!("{}(1)", expected)));
    }

    #[test]
    fn test_nfc_keys() {
        let n = normalizer();
        let decomposed = "Cafe\u{301}.jpg";
        assert_eq!(n.media_identity(decomposed), "Caf\u{e9}.jpg");
        assert_eq!(n.sidecar_key("Cafe\u{301}.jpg.suppl.json").as_deref(), Some("Caf\u{e9}.jpg"));
    }
}
