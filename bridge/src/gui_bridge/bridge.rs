use crate::gui_bridge::model::VisualizationModel;
use anyhow::Context;
use log::{error, info};
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    thread,
};
use tokio::runtime::Builder;
use twincore::prelude::VisualStateSink;
use twincore::processing::{Inbound, QueueProducer, RawPayload, TargetFrame};
use warp::{http::StatusCode, hyper::body::Bytes, Filter, Rejection, Reply};

const INGEST_TOPIC: &str = "http/ingest";
const MAX_INGEST_BYTES: u64 = 64 * 1024;

type SharedModel = Arc<RwLock<VisualizationModel>>;

// A panic while holding the lock leaves a usable model; keep serving it.
fn read_model(state: &SharedModel) -> RwLockReadGuard<'_, VisualizationModel> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_model(state: &SharedModel) -> RwLockWriteGuard<'_, VisualizationModel> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Hosts the renderer-facing HTTP endpoint: the latest targets on
/// `GET /targets`, and `POST /ingest` as an extra producer for the queue.
pub struct GuiBridge {
    state: SharedModel,
    producer: QueueProducer,
}

impl GuiBridge {
    pub fn new(producer: QueueProducer, smoothing_rate: f32) -> Self {
        Self {
            state: Arc::new(RwLock::new(VisualizationModel::new(smoothing_rate))),
            producer,
        }
    }

    pub fn routes(&self) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        let state = self.state.clone();
        let state_filter = warp::any().map(move || state.clone());
        let producer = self.producer.clone();
        let producer_filter = warp::any().map(move || producer.clone());

        let get_route = warp::path("targets")
            .and(warp::path::end())
            .and(warp::get())
            .and(state_filter)
            .map(|state: SharedModel| warp::reply::json(&*read_model(&state)));

        let post_route = warp::path("ingest")
            .and(warp::path::end())
            .and(warp::post())
            .and(warp::body::content_length_limit(MAX_INGEST_BYTES))
            .and(warp::body::bytes())
            .and(producer_filter)
            .map(|body: Bytes, producer: QueueProducer| {
                let item = Inbound::Raw(RawPayload::new(Some(INGEST_TOPIC.to_string()), body.to_vec()));
                if producer.push(item) {
                    warp::reply::with_status(
                        warp::reply::json(&json!({"status": "queued"})),
                        StatusCode::ACCEPTED,
                    )
                } else {
                    warp::reply::with_status(
                        warp::reply::json(&json!({"status": "consumer stopped"})),
                        StatusCode::SERVICE_UNAVAILABLE,
                    )
                }
            });

        get_route.or(post_route)
    }

    /// Serves the routes on a dedicated thread with its own runtime.
    pub fn serve(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let routes = self.routes();
        thread::Builder::new()
            .name("http-bridge".into())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!("HTTP bridge runtime failed to start: {}", err);
                        return;
                    }
                };
                runtime.block_on(async move {
                    match warp::serve(routes).try_bind_ephemeral(addr) {
                        Ok((bound, server)) => {
                            info!("HTTP bridge listening on {}", bound);
                            server.await;
                        }
                        Err(err) => error!("HTTP bridge could not bind {}: {}", addr, err),
                    }
                });
            })
            .context("spawning HTTP bridge thread")?;
        Ok(())
    }

    pub fn sink(&self) -> GuiSink {
        GuiSink {
            state: self.state.clone(),
        }
    }

    pub fn publish_status(&self, message: &str) {
        write_model(&self.state).status = Some(message.to_string());
        info!("[GUI] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> VisualizationModel {
        read_model(&self.state).clone()
    }
}

/// Sink side of the bridge, owned by the tick consumer.
pub struct GuiSink {
    state: SharedModel,
}

impl VisualStateSink for GuiSink {
    fn apply(&mut self, frame: &TargetFrame) {
        write_model(&self.state).apply_frame(frame);
    }
}
