//! Built-in provider for direct-url items: internet radio stations and
//! plain http(s) tracks the user adds by url. The url itself is the item
//! id, so nothing needs to be stored on the provider side.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use url::Url;

use harmonia_core::models::{
    ContentType, MediaItem, MediaType, ProviderMapping, Radio, StreamDetails, StreamType, Track,
};
use harmonia_core::provider::{MusicProvider, ProviderCapability};
use harmonia_core::{Error, Result};

pub const DOMAIN: &str = "builtin";

pub struct BuiltinProvider {
    instance_id: String,
    /// Radio station urls from configuration, listed as the library.
    radio_urls: Vec<String>,
}

impl BuiltinProvider {
    #[must_use]
    pub fn new(instance_id: impl Into<String>, radio_urls: Vec<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            radio_urls,
        }
    }

    fn name_from_url(url: &Url) -> String {
        url.path_segments()
            .and_then(|segments| segments.filter(|segment| !segment.is_empty()).next_back())
            .filter(|segment| !segment.is_empty())
            .map_or_else(
                || url.host_str().unwrap_or("stream").to_string(),
                |segment| segment.to_string(),
            )
    }

    fn parse_url(prov_item_id: &str) -> Result<Url> {
        let url = Url::parse(prov_item_id)
            .map_err(|err| Error::InvalidInput(format!("Not a valid url: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "Unsupported url scheme: {}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    fn content_type_for(url: &Url) -> ContentType {
        url.path()
            .rsplit('.')
            .next()
            .map(ContentType::from_extension)
            .unwrap_or_default()
    }
}

#[async_trait]
impl MusicProvider for BuiltinProvider {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn domain(&self) -> &str {
        DOMAIN
    }

    fn capabilities(&self) -> HashSet<ProviderCapability> {
        HashSet::from([ProviderCapability::LibraryRadios])
    }

    async fn get_track(&self, prov_track_id: &str) -> Result<Track> {
        let url = Self::parse_url(prov_track_id)?;
        let mut track = Track::new(prov_track_id, &self.instance_id, Self::name_from_url(&url));
        let mut mapping = ProviderMapping::new(&self.instance_id, DOMAIN, prov_track_id);
        mapping.content_type = Self::content_type_for(&url);
        track.add_provider_mapping(mapping);
        Ok(track)
    }

    async fn get_radio(&self, prov_radio_id: &str) -> Result<Radio> {
        let url = Self::parse_url(prov_radio_id)?;
        let mut radio = Radio::new(prov_radio_id, &self.instance_id, Self::name_from_url(&url));
        let mut mapping = ProviderMapping::new(&self.instance_id, DOMAIN, prov_radio_id);
        mapping.content_type = Self::content_type_for(&url);
        radio.add_provider_mapping(mapping);
        Ok(radio)
    }

    fn library_radios(&self) -> BoxStream<'_, Result<Radio>> {
        let urls = self.radio_urls.clone();
        Box::pin(stream::unfold(
            (self, urls.into_iter()),
            |(this, mut urls)| async move {
                let url = urls.next()?;
                Some((this.get_radio(&url).await, (this, urls)))
            },
        ))
    }

    async fn get_stream_details(
        &self,
        prov_item_id: &str,
        media_type: MediaType,
    ) -> Result<StreamDetails> {
        let url = Self::parse_url(prov_item_id)?;
        let mut details = StreamDetails::new(
            &self.instance_id,
            prov_item_id,
            Self::content_type_for(&url),
            StreamType::Http,
            prov_item_id,
        );
        details.media_type = media_type;
        details.direct = true;
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_track_from_url() {
        let provider = BuiltinProvider::new("builtin--1", Vec::new());
        let track = provider
            .get_track("https://example.com/music/song.mp3")
            .await
            .unwrap();
        assert_eq!(track.name, "song.mp3");
        assert_eq!(
            track.provider_mappings.iter().next().unwrap().content_type,
            ContentType::Mp3
        );
    }

    #[tokio::test]
    async fn test_rejects_non_http() {
        let provider = BuiltinProvider::new("builtin--1", Vec::new());
        assert!(provider.get_track("ftp://example.com/x.mp3").await.is_err());
        assert!(provider.get_track("not a url").await.is_err());
    }

    #[tokio::test]
    async fn test_library_radios_from_config() {
        let provider = BuiltinProvider::new(
            "builtin--1",
            vec!["https://radio.example.com/live".to_string()],
        );
        let radios: Vec<_> = provider
            .library_radios()
            .filter_map(|radio| async { radio.ok() })
            .collect()
            .await;
        assert_eq!(radios.len(), 1);
        assert_eq!(radios[0].name, "live");
    }

    #[tokio::test]
    async fn test_stream_details_direct_http() {
        let provider = BuiltinProvider::new("builtin--1", Vec::new());
        let details = provider
            .get_stream_details("https://example.com/live.aac", MediaType::Radio)
            .await
            .unwrap();
        assert_eq!(details.stream_type, StreamType::Http);
        assert!(details.direct);
        assert_eq!(details.content_type, ContentType::Aac);
    }
}
