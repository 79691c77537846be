use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Localized prefixes: "<prefix>YYYY"
const YEAR_FOLDER_PREFIXES: &[&str] = &[
    "Photos from ",      // EN
    "Fotos von ",        // DE
    "Fotos aus ",        // DE (alternate)
    "Photos de ",        // FR
    "Fotos de ",         // ES, PT, CA
    "Foto's uit ",       // NL
    "Foto dal ",         // IT
    "Foto del ",         // IT (alternate)
    "Zdjęcia z ",        // PL
    "Фото за ",          // RU
    "Фотографии за ",    // RU (alternate)
    "Fotky z ",          // CS
    "Fotografii din ",   // RO
    "Foton från ",       // SV
    "Bilder fra ",       // NO
    "Billeder fra ",     // DA
    "Valokuvat ",        // FI
    "Fényképek - ",      // HU
    "Fotoğraflar ",      // TR
];

/// Localized suffixes: "YYYY<suffix>"
const YEAR_FOLDER_SUFFIXES: &[&str] = &[
    " 年の写真",   // JA
    "年のフォト",   // JA (alternate)
    "년의 사진",    // KO
    "年的照片",     // ZH-CN
    "年的相片",     // ZH-TW
];

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(20|19|18)\d{2}$").unwrap());
static TRAILING_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(?P<year>(?:18|19|20)\d{2})$").unwrap());

/// Year of a single folder name, if it is a year folder.
///
/// Localized Takeout names ("Photos from 2019", "2019 年の写真") are tried first,
/// then any name ending in a standalone four-digit year.
pub fn folder_year(name: &str) -> Option<String> {
    for prefix in YEAR_FOLDER_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            if YEAR_RE.is_match(rest) {
                return Some(rest.to_string());
            }
        }
    }
    for suffix in YEAR_FOLDER_SUFFIXES {
        if let Some(rest) = name.strip_suffix(suffix) {
            if YEAR_RE.is_match(rest) {
                return Some(rest.to_string());
            }
        }
    }
    TRAILING_YEAR_RE
        .captures(name)
        .and_then(|caps| caps.name("year"))
        .map(|m| m.as_str().to_string())
}

/// Year bucket of a file: the nearest ancestor directory (up to and including
/// `root`) whose name carries a year. `None` is the "no year" bucket.
pub fn year_bucket(root: &Path, file: &Path) -> Option<String> {
    let parent = file.parent()?;
    for dir in parent.ancestors() {
        if !dir.starts_with(root) {
            break;
        }
        if let Some(year) = dir.file_name().and_then(|n| n.to_str()).and_then(folder_year) {
            return Some(year);
        }
    }
    None
}
