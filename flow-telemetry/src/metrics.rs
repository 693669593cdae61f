use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing::info;

/// Installs the global metrics recorder and serves it on `[::]:{port}/metrics`.
///
/// The exporter runs on the current Tokio runtime when one is available, otherwise on a
/// background thread. Must be called at most once per process because the recorder is global.
pub fn init_metrics(port: u16, app_name: &str) -> Result<(), BuildError> {
    let address = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);

    PrometheusBuilder::new()
        .with_http_listener(address)
        .add_global_label("app", app_name)
        .install()?;

    info!(%address, "metrics exporter listening");

    Ok(())
}
