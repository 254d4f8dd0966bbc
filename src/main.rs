use std::net::SocketAddr;
use std::sync::Arc;

use apisentinel::persistence::PersistenceGateway;
use apisentinel::{api, metrics, DetectorConfig, Orchestrator};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = DetectorConfig::from_env();
    let bind_addr: SocketAddr = config.bind_addr.parse()?;

    let persistence = Arc::new(PersistenceGateway::open(&config.database_path, 1024)?);
    let orchestrator = Orchestrator::new(config, persistence);

    if let Some(metrics_addr) = metrics_bind_addr(bind_addr) {
        metrics::install_recorder(metrics_addr);
    }

    let app = api::build_router(orchestrator);

    info!(%bind_addr, "apisentinel listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Prometheus exporter one port above the control API, mirroring the
/// teacher's adjacent-port convention for `performance`'s metrics
/// listener. `None` if the control port can't be bumped (port 65535).
fn metrics_bind_addr(control_addr: SocketAddr) -> Option<SocketAddr> {
    control_addr.port().checked_add(1).map(|port| {
        let mut addr = control_addr;
        addr.set_port(port);
        addr
    })
}
