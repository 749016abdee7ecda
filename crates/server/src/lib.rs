use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use eyre::{bail, Result as EyreResult};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::admin::AddressSource;
use crate::config::ServerConfig;

pub mod admin;
pub mod config;

/// Serves the debug API on every configured address until `shutdown` fires.
///
/// Addresses that fail to bind are skipped, as long as at least one binds.
pub async fn start(
    config: ServerConfig,
    source: Arc<dyn AddressSource>,
    shutdown: CancellationToken,
) -> EyreResult<()> {
    let mut listeners = Vec::with_capacity(config.listen.len());
    let mut want_listeners = config.listen.into_iter().peekable();

    while let Some(addr) = want_listeners.next() {
        let mut components = addr.iter();

        let host: IpAddr = match components.next() {
            Some(multiaddr::Protocol::Ip4(host)) => host.into(),
            Some(multiaddr::Protocol::Ip6(host)) => host.into(),
            _ => bail!("Invalid multiaddr {addr}, expected IP component"),
        };

        let Some(multiaddr::Protocol::Tcp(port)) = components.next() else {
            bail!("Invalid multiaddr {addr}, expected TCP component");
        };

        match TcpListener::bind(SocketAddr::from((host, port))).await {
            Ok(listener) => listeners.push(listener),
            Err(err) => {
                if listeners.is_empty() && want_listeners.peek().is_none() {
                    bail!(err);
                }
            }
        }
    }

    let app = admin::service::setup(source);

    let mut set = JoinSet::new();

    for listener in listeners {
        info!(addr = %listener.local_addr()?, "debug API listening");

        let shutdown = shutdown.clone();
        let app = app.clone();

        drop(set.spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        }));
    }

    while let Some(result) = set.join_next().await {
        result??;
    }

    Ok(())
}
