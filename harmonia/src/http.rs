//! Thin HTTP control surface. All logic lives in harmonia-core; handlers
//! translate between HTTP and the controllers.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use harmonia_core::controllers::ItemController;
use harmonia_core::models::{LibraryQuery, MediaType, QueueOption, StreamType};
use harmonia_core::Error;

use crate::server::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/music/{entity}", get(list_items))
        .route("/music/{entity}/{id}", get(get_item))
        .route(
            "/music/{entity}/{id}/library",
            post(library_add).delete(library_remove),
        )
        .route("/search", get(search))
        .route("/players", get(list_players))
        .route("/players/{player_id}/queue", get(get_queue))
        .route("/players/{player_id}/play_media", post(play_media))
        .route("/players/{player_id}/volume", post(volume_set))
        .route("/players/{player_id}/{command}", post(player_command))
        .route("/stream/{player_id}/{queue_item_id}", get(stream_audio))
        .route("/preview/{provider}/{item_id}", get(preview_audio))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Error envelope: core errors mapped onto HTTP statuses.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::MediaNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) | Error::InvalidData(_) => StatusCode::BAD_REQUEST,
            Error::Unsupported(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::LoginFailed(_) => StatusCode::BAD_GATEWAY,
            Error::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn entity_media_type(entity: &str) -> Result<MediaType, Error> {
    match entity {
        "artists" => Ok(MediaType::Artist),
        "albums" => Ok(MediaType::Album),
        "tracks" => Ok(MediaType::Track),
        "playlists" => Ok(MediaType::Playlist),
        "radios" => Ok(MediaType::Radio),
        "audiobooks" => Ok(MediaType::Audiobook),
        "podcasts" => Ok(MediaType::Podcast),
        _ => Err(Error::InvalidInput(format!("Unknown entity: {entity}"))),
    }
}

async fn list_items(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<LibraryQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let music = &state.music;
    let page = match entity_media_type(&entity)? {
        MediaType::Artist => serde_json::to_value(music.artists.base().library_items(&query).await?),
        MediaType::Album => serde_json::to_value(music.albums.base().library_items(&query).await?),
        MediaType::Track => serde_json::to_value(music.tracks.base().library_items(&query).await?),
        MediaType::Playlist => {
            serde_json::to_value(music.playlists.base().library_items(&query).await?)
        }
        MediaType::Radio => serde_json::to_value(music.radios.base().library_items(&query).await?),
        MediaType::Audiobook => {
            serde_json::to_value(music.audiobooks.base().library_items(&query).await?)
        }
        MediaType::Podcast => {
            serde_json::to_value(music.podcasts.base().library_items(&query).await?)
        }
        _ => return Err(Error::InvalidInput(format!("Unknown entity: {entity}")).into()),
    }
    .map_err(Error::from)?;
    Ok(Json(page))
}

#[derive(Deserialize)]
struct ItemQuery {
    #[serde(default = "default_provider")]
    provider: String,
}

fn default_provider() -> String {
    harmonia_core::DB_PROVIDER.to_string()
}

async fn get_item(
    State(state): State<AppState>,
    Path((entity, item_id)): Path<(String, String)>,
    Query(query): Query<ItemQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let media_type = entity_media_type(&entity)?;
    let item = state
        .music
        .get_item(&item_id, media_type, &query.provider, true)
        .await?;
    Ok(Json(serde_json::to_value(item).map_err(Error::from)?))
}

async fn library_add(
    State(state): State<AppState>,
    Path((entity, item_id)): Path<(String, String)>,
    Query(query): Query<ItemQuery>,
) -> ApiResult<StatusCode> {
    let media_type = entity_media_type(&entity)?;
    state
        .music
        .add_to_library(&item_id, media_type, &query.provider)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn library_remove(
    State(state): State<AppState>,
    Path((entity, item_id)): Path<(String, String)>,
    Query(query): Query<ItemQuery>,
) -> ApiResult<StatusCode> {
    let media_type = entity_media_type(&entity)?;
    state
        .music
        .remove_from_library(&item_id, media_type, &query.provider)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SearchQuery {
    query: String,
    /// Comma-separated media types; all searchable types when omitted.
    media_types: Option<String>,
    #[serde(default = "default_search_limit")]
    limit: usize,
    #[serde(default)]
    online: bool,
}

const fn default_search_limit() -> usize {
    25
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let media_types: Vec<MediaType> = match &query.media_types {
        Some(list) => list
            .split(',')
            .filter_map(MediaType::from_str)
            .collect(),
        None => vec![
            MediaType::Artist,
            MediaType::Album,
            MediaType::Track,
            MediaType::Playlist,
            MediaType::Radio,
        ],
    };
    let results = state
        .music
        .search(&query.query, &media_types, query.limit, query.online)
        .await?;
    Ok(Json(serde_json::to_value(results).map_err(Error::from)?))
}

async fn list_players(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.players.players()))
}

async fn get_queue(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let queue = state
        .players
        .get_queue(&player_id)
        .ok_or_else(|| Error::MediaNotFound(format!("No queue for player: {player_id}")))?;
    Ok(Json(
        serde_json::to_value(queue.snapshot().await).map_err(Error::from)?,
    ))
}

#[derive(Deserialize)]
struct PlayMediaBody {
    uris: Vec<String>,
    #[serde(default = "default_queue_option")]
    option: QueueOption,
}

const fn default_queue_option() -> QueueOption {
    QueueOption::Play
}

async fn play_media(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Json(body): Json<PlayMediaBody>,
) -> ApiResult<StatusCode> {
    state
        .players
        .play_media(&player_id, &body.uris, body.option)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct VolumeBody {
    level: u32,
}

async fn volume_set(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
    Json(body): Json<VolumeBody>,
) -> ApiResult<StatusCode> {
    state.players.cmd_volume_set(&player_id, body.level).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn player_command(
    State(state): State<AppState>,
    Path((player_id, command)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let players = &state.players;
    match command.as_str() {
        "play" => players.cmd_play(&player_id).await?,
        "pause" => players.cmd_pause(&player_id).await?,
        "play_pause" => players.cmd_play_pause(&player_id).await?,
        "stop" => players.cmd_stop(&player_id).await?,
        "next" => players.cmd_next(&player_id).await?,
        "previous" => players.cmd_previous(&player_id).await?,
        "power_on" => players.cmd_power_on(&player_id).await?,
        "power_off" => players.cmd_power_off(&player_id).await?,
        "power_toggle" => players.cmd_power_toggle(&player_id).await?,
        "volume_up" => players.cmd_volume_up(&player_id).await?,
        "volume_down" => players.cmd_volume_down(&player_id).await?,
        other => {
            return Err(Error::InvalidInput(format!("Unknown command: {other}")).into());
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Stream proxy endpoint: resolves the stored stream details for a queue
/// item and serves (or redirects to) the audio.
async fn stream_audio(
    State(state): State<AppState>,
    Path((_player_id, queue_item_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let queue_item_id = queue_item_id
        .parse::<Uuid>()
        .map_err(|_| Error::InvalidInput("Invalid queue item id".to_string()))?;
    let details = state
        .streams
        .get_active(queue_item_id)
        .ok_or_else(|| Error::MediaNotFound("No active stream for queue item".to_string()))?;
    serve_stream(details).await
}

/// Short-preview endpoint: resolves stream details directly from the
/// provider and serves the audio (clients stop after the sample window).
async fn preview_audio(
    State(state): State<AppState>,
    Path((provider, item_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let registry = &state.music.deps.registry;
    let provider = registry
        .get(&provider)
        .ok_or_else(|| Error::ProviderUnavailable(provider))?;
    let details = provider
        .get_stream_details(&item_id, MediaType::Track)
        .await?;
    serve_stream(details).await
}

async fn serve_stream(details: harmonia_core::models::StreamDetails) -> ApiResult<Response> {
    match details.stream_type {
        StreamType::File => {
            let file = tokio::fs::File::open(&details.path)
                .await
                .map_err(Error::from)?;
            let stream = ReaderStream::new(file);
            let response = Response::builder()
                .header(header::CONTENT_TYPE, details.content_type.mime_type())
                .body(Body::from_stream(stream))
                .map_err(|err| Error::Internal(err.to_string()))?;
            Ok(response)
        }
        StreamType::Http | StreamType::Hls if details.direct => {
            Ok(Redirect::temporary(&details.path).into_response())
        }
        StreamType::Http | StreamType::Hls => {
            let upstream = reqwest::get(&details.path)
                .await
                .map_err(|err| Error::Stream(err.to_string()))?;
            let content_type = upstream
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or(details.content_type.mime_type())
                .to_string();
            let response = Response::builder()
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from_stream(upstream.bytes_stream()))
                .map_err(|err| Error::Internal(err.to_string()))?;
            Ok(response)
        }
        StreamType::Pipe => Err(Error::Unsupported(
            "Pipe streams are handled by the media toolchain".to_string(),
        )
        .into()),
    }
}
