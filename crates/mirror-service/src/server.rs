use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{handlers::*, MirrorService};

pub struct MirrorServer {
    service: Arc<MirrorService>,
    listen: String,
}

impl MirrorServer {
    pub fn new(service: MirrorService, listen: impl Into<String>) -> Self {
        Self {
            service: Arc::new(service),
            listen: listen.into(),
        }
    }

    pub fn service(&self) -> &Arc<MirrorService> {
        &self.service
    }

    /// Routes of the replica wire contract, mounted under the configured paths.
    pub fn router(&self) -> Router {
        let mirror = self.service.mirror_config();
        let root = mirror.mirror_route();

        Router::new()
            .route("/health", get(health_check))
            .route(&root, get(get_all))
            .route(&format!("{root}/keys"), get(get_values))
            .route(&format!("{root}/range/:key"), get(get_range))
            .route(&format!("{root}/:key"), get(get_value))
            .route(
                &format!("{}/partitions", mirror.streams_route()),
                get(get_partitions),
            )
            .with_state(Arc::clone(&self.service))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
    }

    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen)
            .await
            .with_context(|| format!("cannot listen on {}", self.listen))?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until the task is dropped.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        info!(
            %addr,
            topic = %self.service.topic(),
            advertised = %self.service.local_host(),
            partitions = self.service.table().partition_count(),
            range_field = self.service.range_field().unwrap_or("-"),
            "mirror replica listening"
        );

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
