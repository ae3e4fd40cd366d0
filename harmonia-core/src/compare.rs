//! String and entity compare primitives used by dedup and cross-provider
//! matching.
//!
//! Matching is deliberately forgiving: provider catalogs disagree on
//! punctuation, casing, featured-artist suffixes and versions, so the loose
//! comparators reduce both sides to a normalized form before comparing.

use crate::models::{ItemMapping, Track};

/// Leading articles stripped when building a sort name.
const SORT_ARTICLES: &[&str] = &["the ", "a ", "an ", "los ", "las ", "le ", "la "];

/// Maximum duration drift (seconds) for two tracks to still count as equal.
const TRACK_DURATION_TOLERANCE: u32 = 2;

/// Create a sort name: lowercased, leading article stripped.
#[must_use]
pub fn create_sort_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    for article in SORT_ARTICLES {
        if let Some(stripped) = lower.strip_prefix(article) {
            if !stripped.is_empty() {
                return stripped.to_string();
            }
        }
    }
    lower
}

/// Reduce a string for loose comparison: casefold, strip diacritics and
/// everything non-alphanumeric.
#[must_use]
pub fn normalize_for_compare(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(strip_diacritic)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

fn strip_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        'ñ' => 'n',
        'ç' => 'c',
        _ => c,
    }
}

/// Loose string compare: normalized substring match in either direction.
#[must_use]
pub fn loose_compare_strings(a: &str, b: &str) -> bool {
    let norm_a = normalize_for_compare(a);
    let norm_b = normalize_for_compare(b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return norm_a == norm_b;
    }
    norm_a.contains(&norm_b) || norm_b.contains(&norm_a)
}

/// Strict-ish string compare: normalized exact match.
#[must_use]
pub fn compare_strings(a: &str, b: &str) -> bool {
    normalize_for_compare(a) == normalize_for_compare(b)
}

/// Compare two artist lists.
///
/// With `any_match` a single pairwise hit is enough, otherwise every artist
/// of `a` must have a counterpart in `b`.
#[must_use]
pub fn compare_artists(a: &[ItemMapping], b: &[ItemMapping], any_match: bool) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let mut matches = 0;
    for artist_a in a {
        let found = b
            .iter()
            .any(|artist_b| loose_compare_strings(&artist_a.name, &artist_b.name));
        if found {
            if any_match {
                return true;
            }
            matches += 1;
        }
    }
    !any_match && matches == a.len()
}

/// Compare two tracks: name must loose-match AND the album loose-matches or
/// the duration is within tolerance AND the artist sets intersect.
#[must_use]
pub fn compare_track(a: &Track, b: &Track) -> bool {
    if !loose_compare_strings(&a.name, &b.name) {
        return false;
    }
    // a version mismatch (e.g. "live" vs studio) disqualifies the pair
    if !a.version.is_empty() && !b.version.is_empty() && !loose_compare_strings(&a.version, &b.version)
    {
        return false;
    }
    let album_match = match (&a.album, &b.album) {
        (Some(album_a), Some(album_b)) => loose_compare_strings(&album_a.name, &album_b.name),
        _ => false,
    };
    let duration_match = a.duration.abs_diff(b.duration) <= TRACK_DURATION_TOLERANCE;
    if !album_match && !duration_match {
        return false;
    }
    compare_artists(&a.artists, &b.artists, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaType, ProviderMapping};

    fn mapping(name: &str) -> ItemMapping {
        ItemMapping {
            media_type: MediaType::Artist,
            item_id: name.to_lowercase(),
            provider: "test".to_string(),
            name: name.to_string(),
            sort_name: create_sort_name(name),
            uri: format!("artist://test/{}", name.to_lowercase()),
            version: String::new(),
        }
    }

    fn track(name: &str, artist: &str, album: Option<&str>, duration: u32) -> Track {
        let mut t = Track::new("id1", "test", name);
        t.artists = vec![mapping(artist)];
        t.album = album.map(|a| ItemMapping {
            media_type: MediaType::Album,
            ..mapping(a)
        });
        t.duration = duration;
        t.provider_mappings.insert(ProviderMapping::new("test", "test", "id1"));
        t
    }

    #[test]
    fn test_create_sort_name_strips_articles() {
        assert_eq!(create_sort_name("The Beatles"), "beatles");
        assert_eq!(create_sort_name("A Perfect Circle"), "perfect circle");
        assert_eq!(create_sort_name("An Awesome Wave"), "awesome wave");
        assert_eq!(create_sort_name("Therapy?"), "therapy?");
    }

    #[test]
    fn test_create_sort_name_idempotent() {
        for name in ["The Beatles", "ZZ Top", "the the"] {
            let once = create_sort_name(name);
            assert_eq!(create_sort_name(&once), once);
        }
    }

    #[test]
    fn test_create_sort_name_case_insensitive() {
        assert_eq!(create_sort_name("THE BEATLES"), create_sort_name("the beatles"));
    }

    #[test]
    fn test_loose_compare() {
        assert!(loose_compare_strings("Come Together", "come together"));
        assert!(loose_compare_strings("Come Together - Remastered", "Come Together"));
        assert!(loose_compare_strings("Motörhead", "Motorhead"));
        assert!(!loose_compare_strings("Come Together", "Something"));
    }

    #[test]
    fn test_compare_artists_any() {
        let a = vec![mapping("The Beatles"), mapping("Billy Preston")];
        let b = vec![mapping("Beatles")];
        assert!(compare_artists(&a, &b, true));
        assert!(!compare_artists(&a, &b, false));
        assert!(!compare_artists(&a, &[], true));
    }

    #[test]
    fn test_compare_track_reflexive_symmetric() {
        let a = track("Come Together", "The Beatles", Some("Abbey Road"), 259);
        let b = track("Come Together", "Beatles", None, 260);
        assert!(compare_track(&a, &a));
        assert_eq!(compare_track(&a, &b), compare_track(&b, &a));
        assert!(compare_track(&a, &b));
    }

    #[test]
    fn test_compare_track_duration_gate() {
        let a = track("Come Together", "The Beatles", None, 259);
        let b = track("Come Together", "The Beatles", None, 290);
        // no album info and duration too far apart
        assert!(!compare_track(&a, &b));
    }
}
