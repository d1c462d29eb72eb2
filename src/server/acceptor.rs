use crate::capture::orchestrator::CaptureOrchestrator;
use crate::capture::source::PcapSourceFactory;
use crate::configuration::config::Config;
use crate::error_handling::types::ServerError;
use crate::server::connection::{ConnectionHandler, ServerContext};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Binds one listener per configured address, upgrades accepted connections
/// via the SSH handshake and hands each to its own connection handler.
///
/// Failing to load the host key or to bind a listener is fatal; everything
/// after that is scoped to a single connection.
pub struct CaptureServer {
    config: Config,
    context: Arc<ServerContext>,
}

impl CaptureServer {
    pub fn new(config: Config) -> Self {
        let orchestrator =
            CaptureOrchestrator::new(&config.capture, Arc::new(PcapSourceFactory));
        let context = Arc::new(ServerContext {
            orchestrator,
            snaplen: config.capture.snaplen,
        });
        Self { config, context }
    }

    pub async fn run(&self) -> Result<(), ServerError> {
        let key = russh_keys::load_secret_key(&self.config.host_key_path, None)
            .map_err(ServerError::HostKey)?;
        info!(
            "host key fingerprint: {}",
            key.clone_public_key()
                .map_err(ServerError::HostKey)?
                .fingerprint()
        );

        let ssh_config = Arc::new(russh::server::Config {
            keys: vec![key],
            ..Default::default()
        });

        for addr in &self.config.listen_addresses {
            let hostport = SocketAddr::new(*addr, self.config.port);
            let listener = TcpListener::bind(hostport)
                .await
                .map_err(ServerError::Bind)?;
            info!("listening on {}", hostport);
            tokio::spawn(accept_loop(
                listener,
                ssh_config.clone(),
                self.context.clone(),
            ));
        }

        // Serve until the process is killed.
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Accept loop for one listener. Accept failures are logged and the loop
/// continues; a failed handshake abandons only that connection.
async fn accept_loop(
    listener: TcpListener,
    config: Arc<russh::server::Config>,
    context: Arc<ServerContext>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                error!("accept: {}", err);
                continue;
            }
        };

        let handler = ConnectionHandler::new(context.clone(), peer);
        let config = config.clone();
        tokio::spawn(async move {
            let connection = match russh::server::run_stream(config, stream, handler).await {
                Ok(connection) => connection,
                Err(err) => {
                    error!("handshake from {}: {}", peer, err);
                    return;
                }
            };
            if let Err(err) = connection.await {
                debug!("connection from {} ended: {}", peer, err);
            }
        });
    }
}
