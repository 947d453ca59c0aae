use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::serve::{Listener, ListenerExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{server::TlsStream, TlsAcceptor};
use tracing::{debug, error, info};

use super::routes::build_router;
use super::state::WfeState;
use crate::config::{ListenerTlsConfig, ServerConfig};
use crate::errors::Error;
use crate::utils::certificates::{load_certificate_bundle, CertificateInfo};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Bind the configured listener and serve the web front end until ctrl-c.
pub async fn start_wfe_server(config: ServerConfig, wfe: WfeState) -> crate::Result<()> {
    let addr = listen_address(&config)?;
    let router = build_router(wfe)?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind {addr}: {e}")))?;

    match config.tls.as_ref() {
        Some(tls) => {
            let (acceptor, certificate) = configure_tls_acceptor(tls)?;
            info!(
                address = %addr,
                subject = %certificate.subject,
                expires_at = %certificate.not_after,
                "Serving ACME over HTTPS"
            );
            let listener = HttpsListener { tcp: listener, acceptor }.tap_io(|_| {});
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(|e| Error::transport(format!("HTTPS listener failed: {e}")))?;
        }
        None => {
            info!(address = %addr, "Serving ACME over plain HTTP");
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(|e| Error::transport(format!("HTTP listener failed: {e}")))?;
        }
    }

    info!("Web front end stopped");
    Ok(())
}

fn listen_address(config: &ServerConfig) -> crate::Result<SocketAddr> {
    config
        .bind_address()
        .parse()
        .map_err(|e| {
            Error::config(format!("Invalid listen address '{}': {e}", config.bind_address()))
        })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => error!(error = %e, "Cannot listen for shutdown signal"),
    }
}

fn configure_tls_acceptor(
    tls: &ListenerTlsConfig,
) -> crate::Result<(TlsAcceptor, CertificateInfo)> {
    let bundle = load_certificate_bundle(&tls.cert_path, &tls.key_path, tls.chain_path())?;

    let chain: Vec<_> =
        std::iter::once(bundle.leaf.clone()).chain(bundle.intermediates.iter().cloned()).collect();

    let server_config =
        rustls::ServerConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::config(format!("Unsupported TLS protocol versions: {e}")))?
            .with_no_client_auth()
            .with_single_cert(chain, bundle.private_key.clone_key())
            .map_err(|e| Error::config(format!("Rejected listener certificate: {e}")))?;

    Ok((TlsAcceptor::from(Arc::new(server_config)), bundle.info))
}

/// TCP listener that completes a TLS handshake before handing the stream to
/// axum. Slow or failed handshakes are dropped without stopping the loop.
struct HttpsListener {
    tcp: TcpListener,
    acceptor: TlsAcceptor,
}

impl Listener for HttpsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let (stream, peer) = match self.tcp.accept().await {
                Ok(accepted) => accepted,
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            match tokio::time::timeout(HANDSHAKE_TIMEOUT, self.acceptor.accept(stream)).await {
                Ok(Ok(tls)) => return (tls, peer),
                Ok(Err(e)) => debug!(error = %e, %peer, "TLS handshake failed"),
                Err(_) => debug!(%peer, "TLS handshake timed out"),
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.tcp.local_addr()
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}
