use std::path::Path;
use std::sync::Arc;

use acme_wfe::{
    api::{start_wfe_server, WebFrontEnd},
    cli::Cli,
    observability::{init_observability, log_config_info},
    services::MemoryAuthority,
    utils::certificates::load_issuer_certificate,
    Error, Result, APP_NAME, VERSION,
};
use clap::Parser;
use tracing::{info, warn};

fn install_rustls_provider() {
    use rustls::crypto::{ring, CryptoProvider};

    if CryptoProvider::get_default().is_none() {
        ring::default_provider().install_default().expect("install ring crypto provider");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    install_rustls_provider();

    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_observability(&config.observability).await?;

    info!(app_name = APP_NAME, version = VERSION, "Starting ACME web front end");
    log_config_info(&config);

    let authority = Arc::new(
        MemoryAuthority::new()
            .map_err(|e| Error::internal(format!("Failed to create in-memory authority: {}", e)))?,
    );

    let issuer_der = match config.wfe.issuer_cert_path.as_deref() {
        Some(path) => {
            let (der, info) = load_issuer_certificate(Path::new(path))?;
            warn!(
                subject = %info.subject,
                "Serving configured issuer certificate, in-memory authority signs with its own key"
            );
            der
        }
        None => authority.issuer_der(),
    };

    let wfe = WebFrontEnd::new(&config, authority.clone(), authority, issuer_der);
    start_wfe_server(config.server.clone(), Arc::new(wfe)).await
}
