use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use gesture_stream::actuators::LoggingActuator;
use gesture_stream::capture::{CaptureBackend, TestPatternBackend, V4lBackend};
use gesture_stream::classifiers::finger_count::{FingerCountClassifier, FingerCountConfig};
use gesture_stream::classifiers::virtual_mouse::{VirtualMouseClassifier, VirtualMouseConfig};
use gesture_stream::classifiers::volume::{VolumeClassifier, VolumeConfig};
use gesture_stream::config::Config;
use gesture_stream::control::{self, AppState};
use gesture_stream::dispatch::OutputDispatcher;
use gesture_stream::engine::InferenceEngine;
use gesture_stream::extract::{ExtractionEngine, ExtractorConfig, NullExtractor};
use gesture_stream::hub::{self, websocket_handler, ConnectionHub};
use gesture_stream::orchestrator::{Orchestrator, OrchestratorController};

/// Real-time gesture-recognition streaming daemon.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Path to the TOML configuration file. Falls back to defaults for
    /// any table or key the file omits.
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Bind address for the combined WebSocket + control HTTP server.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Use the synthetic test-pattern capture backend instead of a real
    /// v4l2 device. Useful off-hardware.
    #[arg(long, default_value_t = false)]
    test_pattern: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn build_engine() -> Arc<InferenceEngine> {
    let engine = Arc::new(InferenceEngine::new());
    engine
        .register(Box::new(FingerCountClassifier::new(
            FingerCountConfig::default(),
        )))
        .expect("finger_count registration");
    engine
        .register(Box::new(VolumeClassifier::new(VolumeConfig::default())))
        .expect("volume_control registration");
    engine
        .register(Box::new(VirtualMouseClassifier::new(
            VirtualMouseConfig::default(),
        )))
        .expect("virtual_mouse registration");
    engine
}

fn select_backend(test_pattern: bool) -> Box<dyn CaptureBackend> {
    if test_pattern {
        Box::new(TestPatternBackend::new())
    } else {
        Box::new(V4lBackend::new())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    info!(?args, "starting gesture streaming daemon");

    let config = Config::load(&args.config).unwrap_or_else(|err| {
        info!(error = %err, "falling back to default configuration");
        Config::default()
    });

    let default_project = config.projects.default_project.clone();
    let extractor_config = ExtractorConfig {
        max_hands: config.extractor.max_hands,
        min_detection_confidence: config.extractor.min_detection_confidence,
    };
    let extractor = ExtractionEngine::new(Box::new(NullExtractor), extractor_config);

    let engine = build_engine();
    let dispatcher = Arc::new(OutputDispatcher::new());
    dispatcher.register_actuator(Arc::new(LoggingActuator::new("default")));

    let gesture_update_interval =
        std::time::Duration::from_secs_f64(config.hub.gesture_update_interval);

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        extractor,
        engine.clone(),
        dispatcher.clone(),
    ));

    let controller: Arc<dyn hub::ProjectController> = Arc::new(OrchestratorController {
        orchestrator: orchestrator.clone(),
    });
    let hub = Arc::new(ConnectionHub::new(
        controller,
        gesture_update_interval,
        config.hub.max_websocket_connections,
    ));
    hub.attach(&dispatcher);

    let backend = select_backend(args.test_pattern);
    if let Err(err) = orchestrator.start(backend, &default_project) {
        error!(error = %err, "failed to start orchestrator at boot; control surface will still come up");
    }

    let app_state = AppState {
        orchestrator: orchestrator.clone(),
        engine: engine.clone(),
        config: Arc::new(config),
    };

    let ws_router = axum::Router::new()
        .route("/ws", axum::routing::get(websocket_handler))
        .with_state(hub.clone());

    let app = control::router(app_state)
        .merge(ws_router)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(addr = %args.bind, "listening");

    let shutdown_hub = hub.clone();
    let shutdown_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown_hub.broadcast_shutdown();
            let _ = shutdown_orchestrator.stop();
            std::process::exit(0);
        }
    });

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
