//! Server bootstrap: wires the database, cache, registry, controllers,
//! players and sync engine together and runs the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use harmonia_core::cache::Cache;
use harmonia_core::controllers::{ControllerDeps, Music};
use harmonia_core::events::EventBus;
use harmonia_core::player::PlayerManager;
use harmonia_core::provider::ProviderRegistry;
use harmonia_core::repository::Database;
use harmonia_core::streams::StreamController;
use harmonia_core::sync::SyncEngine;
use harmonia_core::Config;
use harmonia_providers::{BuiltinProvider, FilesystemProvider};

/// Shared application state handed to the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub music: Arc<Music>,
    pub players: Arc<PlayerManager>,
    pub streams: Arc<StreamController>,
    pub sync: Arc<SyncEngine>,
    pub events: EventBus,
}

pub struct Server {
    state: AppState,
    sync_task: tokio::task::JoinHandle<()>,
    poll_task: tokio::task::JoinHandle<()>,
}

impl Server {
    pub async fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let db = Database::connect(&config.database)
            .await
            .context("opening database")?;
        let cache = Cache::new();
        let registry = Arc::new(ProviderRegistry::new());
        let events = EventBus::new();
        let deps = ControllerDeps::new(
            db,
            cache,
            registry.clone(),
            events.clone(),
            config.server.stream_base_url(),
        );

        register_configured_providers(&config, &registry).await;

        let music = Music::new(deps.clone());
        let streams = StreamController::new(deps.clone());
        let players = PlayerManager::new(deps.clone(), music.clone(), streams.clone(), config.clone());
        let sync = SyncEngine::new(
            music.clone(),
            Duration::from_secs(config.sync.interval_seconds),
        );

        let sync_task = sync.start();
        let poll_task = players.start();

        Ok(Self {
            state: AppState {
                config,
                music,
                players,
                streams,
                sync,
                events,
            },
            sync_task,
            poll_task,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!(
            "{}:{}",
            self.state.config.server.host, self.state.config.server.http_port
        );
        let router = crate::http::router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        tracing::info!(%addr, "harmonia listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown requested");
            })
            .await?;

        self.sync_task.abort();
        self.poll_task.abort();
        Ok(())
    }
}

/// Create and register provider instances from configuration.
async fn register_configured_providers(config: &Config, registry: &Arc<ProviderRegistry>) {
    for instance in &config.providers {
        if !instance.enabled {
            continue;
        }
        let result = match instance.domain.as_str() {
            "filesystem" => FilesystemProvider::new(
                &instance.instance_id,
                instance.get_str("music_dir").unwrap_or_default(),
                instance.get_str("playlists_dir").map(Into::into),
            )
            .map(|provider| Arc::new(provider) as Arc<dyn harmonia_core::provider::MusicProvider>),
            "builtin" => {
                let radio_urls = instance
                    .values
                    .get("radios")
                    .and_then(|value| value.as_array())
                    .map(|urls| {
                        urls.iter()
                            .filter_map(|url| url.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Arc::new(BuiltinProvider::new(&instance.instance_id, radio_urls))
                    as Arc<dyn harmonia_core::provider::MusicProvider>)
            }
            other => {
                tracing::warn!(domain = other, "unknown provider domain in config");
                continue;
            }
        };
        match result {
            Ok(provider) => {
                if let Err(err) = registry.register(provider).await {
                    tracing::error!(
                        instance = %instance.instance_id,
                        %err,
                        "provider failed to start"
                    );
                }
            }
            Err(err) => {
                tracing::error!(instance = %instance.instance_id, %err, "provider setup failed");
            }
        }
    }
}
