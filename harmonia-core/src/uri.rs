//! Media item URI scheme: `{media_type}://{provider}/{item_id}`.

use crate::models::MediaType;
use crate::{Error, Result};

/// Build the canonical uri for a media item.
#[must_use]
pub fn create_uri(media_type: MediaType, provider: &str, item_id: &str) -> String {
    format!("{}://{}/{}", media_type.as_str(), provider, item_id)
}

/// Split a media item uri into `(media_type, provider, item_id)`.
///
/// The item id may itself contain slashes (filesystem providers use
/// relative paths as item ids), so only the first separator after the
/// authority counts.
pub fn parse_uri(uri: &str) -> Result<(MediaType, String, String)> {
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| Error::InvalidInput(format!("Invalid uri: {uri}")))?;
    let media_type = MediaType::from_str(scheme)
        .ok_or_else(|| Error::InvalidInput(format!("Unknown media type in uri: {uri}")))?;
    let (provider, item_id) = rest
        .split_once('/')
        .ok_or_else(|| Error::InvalidInput(format!("Invalid uri: {uri}")))?;
    if provider.is_empty() || item_id.is_empty() {
        return Err(Error::InvalidInput(format!("Invalid uri: {uri}")));
    }
    Ok((media_type, provider.to_string(), item_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let uri = create_uri(MediaType::Track, "spotify", "abc123");
        assert_eq!(uri, "track://spotify/abc123");
        let (media_type, provider, item_id) = parse_uri(&uri).unwrap();
        assert_eq!(media_type, MediaType::Track);
        assert_eq!(provider, "spotify");
        assert_eq!(item_id, "abc123");
    }

    #[test]
    fn test_item_id_with_slashes() {
        let (_, provider, item_id) =
            parse_uri("track://filesystem/Artist/Album/01 - Song.flac").unwrap();
        assert_eq!(provider, "filesystem");
        assert_eq!(item_id, "Artist/Album/01 - Song.flac");
    }

    #[test]
    fn test_invalid() {
        assert!(parse_uri("not a uri").is_err());
        assert!(parse_uri("bogus://spotify/abc").is_err());
        assert!(parse_uri("track://spotify").is_err());
    }
}
