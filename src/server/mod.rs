//! WebSocket broadcast server.

pub mod command;
pub mod connection;

use crate::aggregator::RateAggregator;
use crate::command_log::CommandLog;
use crate::core::config::AppConfig;
use crate::providers::PrivatBankProvider;
use crate::registry::ClientRegistry;
use anyhow::{Context, Result};
use command::CommandDispatcher;
use futures::StreamExt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{Instrument, debug, info, info_span, warn};

pub struct BroadcastServer {
    listener: TcpListener,
    dispatcher: Arc<CommandDispatcher>,
}

impl BroadcastServer {
    pub async fn bind(addr: &str, dispatcher: CommandDispatcher) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        Ok(Self {
            listener,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// Wires the PrivatBank provider, the file log and an empty registry from
    /// the config and binds the listener.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let provider_config = &config.providers.privatbank;
        let provider =
            PrivatBankProvider::new(&provider_config.base_url, provider_config.timeout())?;
        let aggregator = RateAggregator::new(Arc::new(provider), provider_config.timeout())
            .with_retries(provider_config.retries);
        let log = CommandLog::open(&config.log_path).await?;

        let dispatcher = CommandDispatcher::new(
            aggregator,
            Arc::new(log),
            Arc::new(ClientRegistry::new()),
            config.exchange.default_query()?,
            config.exchange.max_days,
        );
        Self::bind(&config.server.bind_addr(), dispatcher).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.dispatcher.registry()
    }

    /// Accepts connections forever. Per-connection failures never end the loop.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(addr = %self.local_addr()?, "Broadcast server listening");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down broadcast server");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        tokio::spawn(
                            handle_socket(stream, dispatcher)
                                .instrument(info_span!("connection", %peer)),
                        );
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
            }
        }
    }
}

async fn handle_socket(stream: TcpStream, dispatcher: Arc<CommandDispatcher>) {
    match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => {
            let (sink, stream) = ws.split();
            connection::serve_connection(sink, stream, dispatcher).await;
        }
        Err(e) => debug!(error = %e, "WebSocket handshake failed"),
    }
}
