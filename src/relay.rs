mod calls;
mod inbound;
mod learning;
mod outbound;

use crate::error::{RelayError, TransportError};
use crate::frame::Frame;
use crate::settings::SessionSettings;
use crate::tools::{Tool, ToolRegistry};
use crate::upstream::{self, UpstreamConfig};
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use inbound::Inbound;
use outbound::Outbound;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

const CHANNEL_CAPACITY: usize = 1024;

/// Write half of one socket, shared by everything that produces frames for it.
///
/// Frames are queued and written by a single task, so concurrent producers never
/// interleave inside a frame.
#[derive(Clone)]
pub(crate) struct Outlet {
    peer: &'static str,
    tx: mpsc::Sender<Frame>,
}

impl Outlet {
    pub(crate) fn new(peer: &'static str, tx: mpsc::Sender<Frame>) -> Self {
        Self { peer, tx }
    }

    pub(crate) async fn send_text(&self, text: String) -> Result<(), RelayError> {
        self.tx
            .send(Frame::Text(text))
            .await
            .map_err(|_| RelayError::PeerClosed(self.peer))
    }

    pub(crate) async fn send_json<T: Serialize>(&self, event: &T) -> Result<(), RelayError> {
        self.send_text(serde_json::to_string(event)?).await
    }
}

/// Sits between browser clients and the upstream realtime service.
///
/// One instance serves every connection. Each call to [`MiddleTier::serve`] owns one
/// client socket and opens one upstream socket for it; nothing else is shared.
#[derive(Clone)]
pub struct MiddleTier {
    upstream: Arc<UpstreamConfig>,
    settings: Arc<SessionSettings>,
    tools: Arc<ToolRegistry>,
}

pub struct MiddleTierBuilder {
    upstream: UpstreamConfig,
    settings: SessionSettings,
    tools: ToolRegistry,
}

impl MiddleTierBuilder {
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self {
            upstream,
            settings: SessionSettings::default(),
            tools: ToolRegistry::new(),
        }
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn build(self) -> MiddleTier {
        tracing::info!("middle tier ready with tools {:?}", self.tools.names());
        MiddleTier {
            upstream: Arc::new(self.upstream),
            settings: Arc::new(self.settings),
            tools: Arc::new(self.tools),
        }
    }
}

impl MiddleTier {
    pub fn builder(upstream: UpstreamConfig) -> MiddleTierBuilder {
        MiddleTierBuilder::new(upstream)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Relays one client connection until either side goes away.
    ///
    /// The upstream socket is opened first; if that fails the client socket is left
    /// untouched and the error is returned.
    pub async fn serve<CR, CW>(
        &self,
        client_rx: CR,
        client_tx: CW,
        request_id: Option<&str>,
    ) -> Result<(), RelayError>
    where
        CR: Stream<Item = Result<Frame, TransportError>> + Unpin,
        CW: Sink<Frame, Error = TransportError> + Unpin,
    {
        let socket = upstream::connect(&self.upstream, request_id).await?;
        let (write, read) = socket.split();
        let upstream_rx = read.map(|message| message.map(Frame::from).map_err(TransportError::new));
        let upstream_tx = write
            .with(|frame: Frame| future::ready(Ok::<_, tungstenite::Error>(Message::from(frame))))
            .sink_map_err(TransportError::new);

        self.run(client_rx, client_tx, upstream_rx, upstream_tx)
            .await
    }

    /// Runs the two relay directions over already-open sockets.
    pub async fn run<CR, CW, UR, UW>(
        &self,
        client_rx: CR,
        client_tx: CW,
        upstream_rx: UR,
        upstream_tx: UW,
    ) -> Result<(), RelayError>
    where
        CR: Stream<Item = Result<Frame, TransportError>> + Unpin,
        CW: Sink<Frame, Error = TransportError> + Unpin,
        UR: Stream<Item = Result<Frame, TransportError>> + Unpin,
        UW: Sink<Frame, Error = TransportError> + Unpin,
    {
        let (upstream_out, upstream_queue) = mpsc::channel(CHANNEL_CAPACITY);
        let (client_out, client_queue) = mpsc::channel(CHANNEL_CAPACITY);

        let outbound = Outbound::new(self.settings.clone(), self.tools.clone());
        let inbound = Inbound::new(
            self.settings.clone(),
            self.tools.clone(),
            Outlet::new("client", client_out),
            Outlet::new("upstream", upstream_out.clone()),
        );
        let upstream_outlet = Outlet::new("upstream", upstream_out);

        // Whichever direction stops first ends both. Dropping the pumps drops every
        // sender, which lets the writers flush what is queued and close their sockets.
        let pumps = async move {
            tokio::select! {
                result = outbound.pump(client_rx, upstream_outlet) => {
                    tracing::debug!("client to upstream direction finished");
                    result
                }
                result = inbound.pump(upstream_rx) => {
                    tracing::debug!("upstream to client direction finished");
                    result
                }
            }
        };

        let (pumped, upstream_written, client_written) = tokio::join!(
            pumps,
            write_all(upstream_queue, upstream_tx, "upstream"),
            write_all(client_queue, client_tx, "client"),
        );

        settle([pumped, upstream_written, client_written])
    }
}

async fn write_all<W>(
    mut queue: mpsc::Receiver<Frame>,
    mut sink: W,
    peer: &'static str,
) -> Result<(), RelayError>
where
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    while let Some(frame) = queue.recv().await {
        sink.send(frame).await?;
    }
    tracing::debug!("closing {} socket", peer);
    sink.close().await?;
    Ok(())
}

/// Reports the first real failure. A peer resetting or closing the connection is a
/// normal end of session and only logged.
fn settle<const N: usize>(results: [Result<(), RelayError>; N]) -> Result<(), RelayError> {
    let mut outcome = Ok(());
    for result in results {
        match result {
            Ok(()) => {}
            Err(e) if e.is_quiet() => tracing::debug!("connection ended: {}", e),
            Err(e) if outcome.is_ok() => outcome = Err(e),
            Err(e) => tracing::error!("additional relay failure: {}", e),
        }
    }
    outcome
}
