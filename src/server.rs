//! HTTP surface: routers, handlers, and listener lifecycle.
//!
//! Two listeners run side by side: the control listener carries `/`,
//! `/status`, `/control`, and `/capture`; the stream listener, always one
//! port above, carries only `/stream`, so a busy video connection never
//! starves a drive command.

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::Json;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::StreamExt;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actuator::{Actuator, PwmBackend, Variable, lock_sensor};
use crate::capture::{CAPTURE_DISPOSITION, CaptureBody, capture_jpeg};
use crate::config::ServerConfig;
use crate::frame::FrameSource;
use crate::sensor::SensorControl;
use crate::sink::ChannelSink;
use crate::stream::{STREAM_CONTENT_TYPE, run_mjpeg_stream};
use crate::{Result, RoverError};

/// The control page, served verbatim.
const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    source: Arc<dyn FrameSource>,
    sensor: Arc<Mutex<dyn SensorControl>>,
    actuator: Arc<tokio::sync::Mutex<Actuator>>,
    quality: u8,
}

impl AppState {
    /// Wire the collaborators together under one state object.
    pub fn new(
        config: &ServerConfig,
        source: Arc<dyn FrameSource>,
        sensor: Arc<Mutex<dyn SensorControl>>,
        pwm: Box<dyn PwmBackend>,
    ) -> Self {
        let actuator = Actuator::new(pwm).with_settle_delays(config.settle_delays());
        Self {
            source,
            sensor,
            actuator: Arc::new(tokio::sync::Mutex::new(actuator)),
            quality: config.stream_quality,
        }
    }
}

/// Router for the control listener.
pub fn control_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/status", get(status_handler))
        .route("/control", get(control_handler))
        .route("/capture", get(capture_handler))
        .with_state(state)
}

/// Router for the stream listener.
pub fn stream_router(state: AppState) -> Router {
    Router::new().route("/stream", get(stream_handler)).with_state(state)
}

async fn index_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], INDEX_HTML)
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = lock_sensor(&state.sensor).status();
    ([(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(status))
}

async fn control_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    // both keys must be present and the value must parse; anything else is
    // a 404
    let Some(var) = params.get("var") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(val) = params.get("val") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Ok(value) = val.parse::<i64>() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let variable = match var.parse::<Variable>() {
        Ok(variable) => variable,
        Err(e) => {
            warn!("control rejected: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut actuator = state.actuator.lock().await;
    match actuator.apply(variable, value, &state.sensor).await {
        Ok(()) => {
            debug!("control applied: {variable:?} = {value}");
            ([(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")], StatusCode::OK).into_response()
        }
        Err(e) => {
            warn!("control failed for {variable:?} = {value}: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn capture_handler(State(state): State<AppState>) -> Response {
    let image = match capture_jpeg(state.source.as_ref(), state.quality).await {
        Ok(image) => image,
        Err(e) => {
            warn!("still capture failed: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let headers = [
        (header::CONTENT_TYPE, "image/jpeg"),
        (header::CONTENT_DISPOSITION, CAPTURE_DISPOSITION),
    ];
    match image.body {
        CaptureBody::Whole(bytes) => (headers, bytes).into_response(),
        CaptureBody::Chunked(chunks) => {
            let stream = futures::stream::iter(chunks.map(Ok::<_, Infallible>));
            (headers, Body::from_stream(stream)).into_response()
        }
    }
}

async fn stream_handler(State(state): State<AppState>) -> Response {
    let (mut sink, rx) = ChannelSink::channel();
    let source = Arc::clone(&state.source);
    let quality = state.quality;

    // the loop lives in its own task and ends when a chunk write fails,
    // which happens as soon as the client drops the response body
    tokio::spawn(async move {
        let stats = run_mjpeg_stream(source.as_ref(), &mut sink, quality).await;
        debug!("mjpeg stream done: {} frames ({:?})", stats.frames_sent, stats.reason);
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)], body).into_response()
}

/// The assembled service: two routers, two listeners, one state.
pub struct CameraServer {
    config: ServerConfig,
    state: AppState,
    cancel: CancellationToken,
}

impl CameraServer {
    /// Build a server from configuration and hardware seams.
    pub fn new(
        config: ServerConfig,
        source: Arc<dyn FrameSource>,
        sensor: Arc<Mutex<dyn SensorControl>>,
        pwm: Box<dyn PwmBackend>,
    ) -> Self {
        let state = AppState::new(&config, source, sensor, pwm);
        Self { config, state, cancel: CancellationToken::new() }
    }

    /// Token that stops both listeners when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bind both listeners and serve until cancelled.
    pub async fn serve(self) -> Result<()> {
        self.config.validate()?;
        let control_addr = SocketAddr::new(self.config.bind_addr, self.config.control_port);
        let stream_addr = SocketAddr::new(self.config.bind_addr, self.config.stream_port());

        let control = TcpListener::bind(control_addr)
            .await
            .map_err(|e| RoverError::io(format!("bind control listener {control_addr}"), e))?;
        let stream = TcpListener::bind(stream_addr)
            .await
            .map_err(|e| RoverError::io(format!("bind stream listener {stream_addr}"), e))?;

        info!("control surface on http://{control_addr}, stream on http://{stream_addr}/stream");

        let control_srv = axum::serve(control, control_router(self.state.clone()))
            .with_graceful_shutdown(self.cancel.clone().cancelled_owned());
        let stream_srv = axum::serve(stream, stream_router(self.state))
            .with_graceful_shutdown(self.cancel.clone().cancelled_owned());

        tokio::try_join!(control_srv.into_future(), stream_srv.into_future())
            .map_err(|e| RoverError::io("serve HTTP listeners", e))?;

        info!("listeners shut down");
        Ok(())
    }
}
