use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::EntryError;
use crate::extras;
use crate::identity::IdentityNormalizer;
use crate::media::{MediaEntry, SidecarEntry};
use crate::scan::{SidecarIndex, SlotKey};

/// How a media file found its sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Same canonical key
    Exact,
    /// The exporter cut the media name inside the sidecar name
    Truncated,
    /// Sidecar named after the stem only
    Stem,
    /// Edited variant borrowing its original's sidecar
    Shared,
}

pub struct Resolution {
    /// Media with `sidecar` set, in scan order
    pub matched: Vec<(MediaEntry, MatchKind)>,
    pub unmatched: Vec<(MediaEntry, EntryError)>,
    /// Sidecars no media claimed, sorted by path
    pub orphaned: Vec<SidecarEntry>,
}

enum Outcome {
    Matched(PathBuf, MatchKind),
    Failed(EntryError),
}

/// Pair every media entry with a sidecar from the same year bucket.
///
/// The index is never modified: claimed slots are tracked locally and the
/// unclaimed remainder is returned as `orphaned`. Strategies run as separate
/// passes over all media so an exact match always beats a fallback claim on
/// the same sidecar. A fallback key wanted by more than one media file is
/// ambiguous for all of them.
pub fn resolve(media: Vec<MediaEntry>, index: &SidecarIndex, normalizer: &IdentityNormalizer) -> Resolution {
    let mut outcomes: Vec<Option<Outcome>> = media.iter().map(|_| None).collect();
    let mut consumed: HashSet<SlotKey> = HashSet::new();

    // Pass 1: exact key
    for (i, m) in media.iter().enumerate() {
        if let Some(sidecar) = index.get(&m.year, &m.key) {
            consumed.insert((m.year.clone(), m.key.clone()));
            outcomes[i] = Some(Outcome::Matched(sidecar.path.clone(), MatchKind::Exact));
        }
    }

    // Pass 2: truncated and stem-only keys, first available candidate per media
    let mut claims: HashMap<SlotKey, Vec<(usize, MatchKind)>> = HashMap::new();
    for (i, m) in media.iter().enumerate() {
        if outcomes[i].is_some() {
            continue;
        }
        let name = m.file_name();
        let candidates = [
            normalizer.truncated_key(name).map(|k| (k, MatchKind::Truncated)),
            Some((normalizer.stem_key(name), MatchKind::Stem)),
        ];
        let claim = candidates.into_iter().flatten().find(|(key, _)| {
            *key != m.key
                && index.get(&m.year, key).is_some()
                && !consumed.contains(&(m.year.clone(), key.clone()))
        });
        if let Some((key, kind)) = claim {
            claims.entry((m.year.clone(), key)).or_default().push((i, kind));
        }
    }
    let mut claims: Vec<_> = claims.into_iter().collect();
    claims.sort_by_key(|(_, claimants)| claimants[0].0);
    for (slot, claimants) in claims {
        if claimants.len() == 1 {
            let (i, kind) = claimants[0];
            if let Some(sidecar) = index.get(&slot.0, &slot.1) {
                outcomes[i] = Some(Outcome::Matched(sidecar.path.clone(), kind));
                consumed.insert(slot);
            }
            continue;
        }
        for &(i, _) in &claimants {
            outcomes[i] = Some(Outcome::Failed(EntryError::ClassificationAmbiguous {
                media: media[i].path.clone(),
                key: slot.1.clone(),
                candidates: claimants.len(),
            }));
        }
    }

    // Pass 3: edited variants share the original's sidecar
    for (i, m) in media.iter().enumerate() {
        if outcomes[i].is_some() {
            continue;
        }
        let Some(original) = extras::original_name(m.file_name()) else {
            continue;
        };
        let key = normalizer.media_identity(&original);
        if let Some(sidecar) = index.get(&m.year, &key) {
            consumed.insert((m.year.clone(), key));
            outcomes[i] = Some(Outcome::Matched(sidecar.path.clone(), MatchKind::Shared));
        }
    }

    let mut matched = Vec::new();
    let mut unmatched = Vec::new();
    for (mut m, outcome) in media.into_iter().zip(outcomes) {
        match outcome {
            Some(Outcome::Matched(sidecar, kind)) => {
                if kind != MatchKind::Exact {
                    debug!("{:?} match: {} -> {}", kind, m.path.display(), sidecar.display());
                }
                m.sidecar = Some(sidecar);
                matched.push((m, kind));
            }
            Some(Outcome::Failed(err)) => {
                warn!("{}", err);
                unmatched.push((m, err));
            }
            None => {
                let err = EntryError::NoMetadataFound(m.path.clone());
                warn!("{}", err);
                unmatched.push((m, err));
            }
        }
    }

    let mut orphaned: Vec<SidecarEntry> = index
        .iter()
        .filter(|(slot, _)| !consumed.contains(*slot))
        .map(|(_, s)| s.clone())
        .collect();
    orphaned.sort_by(|a, b| a.path.cmp(&b.path));

    Resolution {
        matched,
        unmatched,
        orphaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NamingRules;
    use crate::error::FailureKind;

    fn normalizer() -> IdentityNormalizer {
        IdentityNormalizer::new(&NamingRules::default()).unwrap()
    }

    fn media(n: &IdentityNormalizer, year: Option<&str>, name: &str) -> MediaEntry {
        let dir = year.map_or("/in/album".to_string(), |y| format!("/in/Photos from {}", y));
        MediaEntry::new(PathBuf::from(format!("{}/{}", dir, name)), year.map(String::from), n).unwrap()
    }

    fn sidecar(n: &IdentityNormalizer, year: Option<&str>, name: &str) -> SidecarEntry {
        let dir = year.map_or("/in/album".to_string(), |y| format!("/in/Photos from {}", y));
        SidecarEntry {
            path: PathBuf::from(format!("{}/{}", dir, name)),
            key: n.sidecar_key(name).unwrap(),
            year: year.map(String::from),
        }
    }

    #[test]
    fn test_exact_and_orphaned() {
        let n = normalizer();
        let index: SidecarIndex = [
            sidecar(&n, Some("2020"), "IMG_0001.jpg.supplemental-metadata.json"),
            sidecar(&n, Some("2020"), "IMG_0009.jpg.supplemental-metadata.json"),
        ]
        .into_iter()
        .collect();
        let res = resolve(vec![media(&n, Some("2020"), "IMG_0001.jpg")], &index, &n);

        assert_eq!(res.matched.len(), 1);
        assert_eq!(res.matched[0].1, MatchKind::Exact);
        assert!(res.matched[0].0.sidecar.as_ref().unwrap().ends_with("IMG_0001.jpg.supplemental-metadata.json"));
        assert_eq!(res.orphaned.len(), 1);
        assert!(res.orphaned[0].path.ends_with("IMG_0009.jpg.supplemental-metadata.json"));
        // the index itself is untouched
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_year_scoping() {
        let n = normalizer();
        let index: SidecarIndex = [
            sidecar(&n, Some("2020"), "IMG_0002.jpg.json"),
            sidecar(&n, Some("2021"), "IMG_0002.jpg.json"),
        ]
        .into_iter()
        .collect();
        let res = resolve(
            vec![media(&n, Some("2020"), "IMG_0002.jpg"), media(&n, Some("2021"), "IMG_0002.jpg")],
            &index,
            &n,
        );
        assert_eq!(res.matched.len(), 2);
        assert!(res.matched[0].0.sidecar.as_ref().unwrap().starts_with("/in/Photos from 2020"));
        assert!(res.matched[1].0.sidecar.as_ref().unwrap().starts_with("/in/Photos from 2021"));
        assert!(res.orphaned.is_empty());
    }

    #[test]
    fn test_no_cross_year_match() {
        let n = normalizer();
        let index: SidecarIndex = [sidecar(&n, Some("2021"), "VID_001.mp4.json")].into_iter().collect();
        let res = resolve(vec![media(&n, Some("2020"), "VID_001.mp4")], &index, &n);
        assert!(res.matched.is_empty());
        assert_eq!(res.unmatched[0].1.kind(), FailureKind::NoMetadataFound);
        assert_eq!(res.orphaned.len(), 1);
    }

    #[test]
    fn test_truncated_match() {
        let n = normalizer();
        let long = "Screenshot_20190101-123456_Some_Long_App_Name_Here.jpg";
        let cut: String = long.chars().take(46).collect();
        let index: SidecarIndex = [sidecar(&n, None, &format!("{}.json", cut))].into_iter().collect();
        let res = resolve(vec![media(&n, None, long)], &index, &n);
        assert_eq!(res.matched.len(), 1);
        assert_eq!(res.matched[0].1, MatchKind::Truncated);
    }

    #[test]
    fn test_ambiguous_truncation() {
        let n = normalizer();
        let a = "Screenshot_20190101-123456_Some_Long_App_Name_Here_A.jpg";
        let b = "Screenshot_20190101-123456_Some_Long_App_Name_Here_B.jpg";
        let cut: String = a.chars().take(46).collect();
        let index: SidecarIndex = [sidecar(&n, None, &format!("{}.json", cut))].into_iter().collect();
        let res = resolve(vec![media(&n, None, a), media(&n, None, b)], &index, &n);
        assert!(res.matched.is_empty());
        assert_eq!(res.unmatched.len(), 2);
        for (_, err) in &res.unmatched {
            assert_eq!(err.kind(), FailureKind::ClassificationAmbiguous);
        }
        assert_eq!(res.orphaned.len(), 1);
    }

    #[test]
    fn test_exact_beats_fallback() {
        let n = normalizer();
        let index: SidecarIndex = [sidecar(&n, None, "IMG_0001.json")].into_iter().collect();
        let res = resolve(vec![media(&n, None, "IMG_0001.mp4"), media(&n, None, "IMG_0001")], &index, &n);
        assert_eq!(res.matched.len(), 1);
        assert_eq!(res.matched[0].0.file_name(), "IMG_0001");
        assert_eq!(res.matched[0].1, MatchKind::Exact);
        assert_eq!(res.unmatched.len(), 1);
    }

    #[test]
    fn test_stem_match() {
        let n = normalizer();
        let index: SidecarIndex = [sidecar(&n, None, "IMG_0001.json")].into_iter().collect();
        let res = resolve(vec![media(&n, None, "IMG_0001.jpg")], &index, &n);
        assert_eq!(res.matched[0].1, MatchKind::Stem);
    }

    #[test]
    fn test_edited_shares_original_sidecar() {
        let n = normalizer();
        let index: SidecarIndex = [sidecar(&n, Some("2020"), "IMG_0001.jpg.supplemental-metadata.json")]
            .into_iter()
            .collect();
        let res = resolve(
            vec![media(&n, Some("2020"), "IMG_0001-edited.jpg"), media(&n, Some("2020"), "IMG_0001.jpg")],
            &index,
            &n,
        );
        assert_eq!(res.matched.len(), 2);
        assert_eq!(res.matched[0].1, MatchKind::Shared);
        assert_eq!(res.matched[1].1, MatchKind::Exact);
        assert_eq!(res.matched[0].0.sidecar, res.matched[1].0.sidecar);
        assert!(res.orphaned.is_empty());
    }

    #[test]
    fn test_duplicate_marker_pairs() {
        let n = normalizer();
        let index: SidecarIndex = [
            sidecar(&n, None, "IMG_0001.jpg.supplemental-metadata.json"),
            sidecar(&n, None, "IMG_0001.jpg.supplemental-metadata(1).json"),
        ]
        .into_iter()
        .collect();
        let res = resolve(vec![media(&n, None, "IMG_0001(1).jpg"), media(&n, None, "IMG_0001.jpg")], &index, &n);
        assert_eq!(res.matched.len(), 2);
        assert!(res.matched[0].0.sidecar.as_ref().unwrap().ends_with("IMG_0001.jpg.supplemental-metadata(1).json"));
        assert!(res.matched[1].0.sidecar.as_ref().unwrap().ends_with("IMG_0001.jpg.supplemental-metadata.json"));
    }
}
