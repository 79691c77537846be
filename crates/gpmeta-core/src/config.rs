use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// What to do when a destination file name is already taken by a different file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OnCollision {
    /// Fail the entry with a destination collision.
    Fail,
    /// Append a `(n)` counter to the media name.
    #[default]
    Disambiguate,
    /// Copy the pair into the duplicates area instead.
    Quarantine,
}

fn default_suffix_stem() -> String {
    "supplemental-metadata".to_string()
}

fn default_short_suffix() -> String {
    "suppl".to_string()
}

fn default_truncation_len() -> usize {
    46
}

fn default_no_year_label() -> String {
    "undated".to_string()
}

fn default_ignored_json() -> Vec<String> {
    [
        "metadata.json",
        "print-subscriptions.json",
        "shared_album_comments.json",
        "user-generated-memory-titles.json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Naming conventions of the export tool. These were reverse-engineered from one
/// Takeout generation, so they are data rather than constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingRules {
    /// Full sidecar suffix stem, truncated character by character by the exporter.
    #[serde(default = "default_suffix_stem")]
    pub suffix_stem: String,
    /// Spelling used when a sidecar name has to be rebuilt.
    #[serde(default = "default_short_suffix")]
    pub default_suffix: String,
    /// Characters of the media name that survive when the sidecar name is cut.
    #[serde(default = "default_truncation_len")]
    pub truncation_len: usize,
    /// Year label used for quarantine names when no year folder applies.
    #[serde(default = "default_no_year_label")]
    pub no_year_label: String,
    /// JSON files that are never sidecars (album metadata and friends).
    #[serde(default = "default_ignored_json")]
    pub ignored_json: Vec<String>,
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            suffix_stem: default_suffix_stem(),
            default_suffix: default_short_suffix(),
            truncation_len: default_truncation_len(),
            no_year_label: default_no_year_label(),
            ignored_json: default_ignored_json(),
        }
    }
}

impl NamingRules {
    /// Load rules from a TOML file. Missing keys fall back to the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading naming rules from {}", path.display()))?;
        let rules: NamingRules = toml::from_str(&text)
            .with_context(|| format!("parsing naming rules in {}", path.display()))?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.suffix_stem.is_empty() {
            anyhow::bail!("suffix_stem must not be empty");
        }
        if !self.suffix_stem.starts_with(&self.default_suffix) {
            anyhow::bail!(
                "default_suffix {:?} is not a truncation of {:?}",
                self.default_suffix,
                self.suffix_stem
            );
        }
        if self.truncation_len == 0 {
            anyhow::bail!("truncation_len must be positive");
        }
        Ok(())
    }

    /// Every suffix spelling the exporter can produce, longest first:
    /// `.supplemental-metadata.json`, `.supplemental-metadat.json`, ..., `.s.json`, `..json`, `.json`.
    pub fn suffix_family(&self) -> Vec<String> {
        let chars: Vec<char> = self.suffix_stem.chars().collect();
        let mut family: Vec<String> = (0..=chars.len())
            .rev()
            .map(|n| format!(".{}.json", chars[..n].iter().collect::<String>()))
            .collect();
        family.push(".json".to_string());
        family
    }

    pub fn is_ignored_json(&self, file_name: &str) -> bool {
        self.ignored_json.iter().any(|n| n.eq_ignore_ascii_case(file_name))
    }
}
