//! Service binary: the HTTP surface over the built-in synthetic camera and
//! logging PWM backend. Deployments with real hardware wire their own
//! [`FrameSource`](rovercam::FrameSource) and
//! [`PwmBackend`](rovercam::PwmBackend) implementations instead.

use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rovercam::{
    CameraServer, SensorControl, ServerConfig, StaticSensor, TestPatternSource, TracePwm,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var_os("ROVERCAM_CONFIG") {
        Some(path) => ServerConfig::from_yaml_file(path)?,
        None => ServerConfig::default(),
    };
    info!(
        "starting rovercam (control port {}, stream port {})",
        config.control_port,
        config.stream_port()
    );

    let sensor: Arc<Mutex<dyn SensorControl>> = Arc::new(Mutex::new(StaticSensor::default()));
    let source = Arc::new(TestPatternSource::new(Arc::clone(&sensor)));
    let server = CameraServer::new(config, source, sensor, Box::new(TracePwm));

    let cancel = server.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            cancel.cancel();
        }
    });

    server.serve().await?;
    Ok(())
}
