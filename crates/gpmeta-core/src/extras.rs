use std::path::Path;

use unicode_normalization::UnicodeNormalization;

/// Localized "edited" suffixes (lowercase)
const EXTRA_FORMATS: &[&str] = &[
    "-edited",      // EN
    "-effects",     // EN
    "-smile",       // EN
    "-mix",         // EN
    "-edytowane",   // PL
    "-bearbeitet",  // DE
    "-bewerkt",     // NL
    "-編集済み",     // JA
    "-modificato",  // IT
    "-modifié",     // FR
    "-ha editado",  // ES
    "-editat",      // CA
];

/// File name of the original an edited variant was derived from, e.g.
/// `IMG_0001-edited.jpg` -> `IMG_0001.jpg`. `None` if the name carries no
/// known extra suffix. The exporter only writes a sidecar for the original.
pub fn original_name(file_name: &str) -> Option<String> {
    let path = Path::new(file_name);
    let stem: String = path.file_stem()?.to_str()?.nfc().collect();
    let lower = stem.to_lowercase();
    let extra = EXTRA_FORMATS.iter().find(|extra| lower.ends_with(*extra))?;

    let keep = stem.chars().count().checked_sub(extra.chars().count())?;
    if keep == 0 {
        return None;
    }
    let base: String = stem.chars().take(keep).collect();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => Some(format!("{}.{}", base, ext)),
        None => Some(base),
    }
}
