//! Media item metadata and its merge rules.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::media::MediaItemImage;

/// Metadata attached to any media item.
///
/// All fields are optional; providers fill in what they know and the merge
/// rules in [`MediaItemMetadata::update`] decide what survives when multiple
/// providers describe the same canonical item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaItemMetadata {
    pub description: Option<String>,
    pub explicit: Option<bool>,
    pub images: Vec<MediaItemImage>,
    pub genres: BTreeSet<String>,
    pub mood: Option<String>,
    pub label: Option<String>,
    pub copyright: Option<String>,
    pub lyrics: Option<String>,
    /// Short preview/sample url provided by the provider, if any.
    pub preview: Option<String>,
    pub replaygain: Option<f64>,
    pub popularity: Option<u32>,
    /// Timestamp (epoch seconds) the full metadata was last collected.
    pub last_refresh: Option<i64>,
    /// Change detection value (playlists).
    pub checksum: Option<String>,
}

impl MediaItemMetadata {
    /// Merge `new_values` into self.
    ///
    /// List fields union (order preserving), set fields union, scalar fields
    /// keep the current value unless it is unset or `allow_overwrite` is
    /// given. `checksum`, `popularity` and `last_refresh` are always
    /// overwritten when the incoming value is present.
    pub fn update(&mut self, new_values: &Self, allow_overwrite: bool) {
        for image in &new_values.images {
            if !self.images.contains(image) {
                self.images.push(image.clone());
            }
        }
        self.genres.extend(new_values.genres.iter().cloned());

        merge_scalar(&mut self.description, &new_values.description, allow_overwrite);
        merge_scalar(&mut self.explicit, &new_values.explicit, allow_overwrite);
        merge_scalar(&mut self.mood, &new_values.mood, allow_overwrite);
        merge_scalar(&mut self.label, &new_values.label, allow_overwrite);
        merge_scalar(&mut self.copyright, &new_values.copyright, allow_overwrite);
        merge_scalar(&mut self.lyrics, &new_values.lyrics, allow_overwrite);
        merge_scalar(&mut self.preview, &new_values.preview, allow_overwrite);
        merge_scalar(&mut self.replaygain, &new_values.replaygain, allow_overwrite);

        // always overwritable when a new non-null value arrives
        merge_scalar(&mut self.popularity, &new_values.popularity, true);
        merge_scalar(&mut self.last_refresh, &new_values.last_refresh, true);
        merge_scalar(&mut self.checksum, &new_values.checksum, true);
    }
}

fn merge_scalar<T: Clone>(current: &mut Option<T>, new: &Option<T>, allow_overwrite: bool) {
    if new.is_none() {
        return;
    }
    if current.is_none() || allow_overwrite {
        current.clone_from(new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::ImageType;

    fn image(path: &str) -> MediaItemImage {
        MediaItemImage {
            image_type: ImageType::Thumb,
            path: path.to_string(),
            is_file: false,
        }
    }

    #[test]
    fn test_update_unions_lists_and_sets() {
        let mut base = MediaItemMetadata {
            images: vec![image("a.jpg")],
            genres: BTreeSet::from(["rock".to_string()]),
            ..Default::default()
        };
        let new = MediaItemMetadata {
            images: vec![image("a.jpg"), image("b.jpg")],
            genres: BTreeSet::from(["pop".to_string()]),
            ..Default::default()
        };
        base.update(&new, false);
        assert_eq!(base.images.len(), 2);
        assert_eq!(base.genres.len(), 2);
    }

    #[test]
    fn test_update_keeps_scalars_unless_overwrite() {
        let mut base = MediaItemMetadata {
            description: Some("original".to_string()),
            ..Default::default()
        };
        let new = MediaItemMetadata {
            description: Some("replacement".to_string()),
            mood: Some("calm".to_string()),
            ..Default::default()
        };
        base.update(&new, false);
        assert_eq!(base.description.as_deref(), Some("original"));
        assert_eq!(base.mood.as_deref(), Some("calm"));

        base.update(&new, true);
        assert_eq!(base.description.as_deref(), Some("replacement"));
    }

    #[test]
    fn test_checksum_always_overwritten() {
        let mut base = MediaItemMetadata {
            checksum: Some("c0".to_string()),
            last_refresh: Some(100),
            ..Default::default()
        };
        let new = MediaItemMetadata {
            checksum: Some("c1".to_string()),
            last_refresh: Some(200),
            ..Default::default()
        };
        base.update(&new, false);
        assert_eq!(base.checksum.as_deref(), Some("c1"));
        assert_eq!(base.last_refresh, Some(200));
        // a missing incoming value leaves the current one alone
        base.update(&MediaItemMetadata::default(), false);
        assert_eq!(base.checksum.as_deref(), Some("c1"));
    }
}
