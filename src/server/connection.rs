use crate::capture::orchestrator::CaptureOrchestrator;
use crate::encoder::pcap::PcapEncoder;
use crate::error_handling::types::{ProtocolError, SessionError};
use crate::session_management::session::CaptureSession;
use crate::session_management::types::{ChannelSink, Request};
use async_trait::async_trait;
use log::{debug, info, warn};
use russh::server::{Auth, Handle, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Pty};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// State shared by every connection: the capture configuration compiled into
/// an orchestrator, handed to each session on open.
pub struct ServerContext {
    pub orchestrator: CaptureOrchestrator,
    pub snaplen: u32,
}

/// Per-connection handler. Authorizes every client, services only channels
/// of type "session", and routes their out-of-band requests to the owning
/// session state machine. All other connection-level control traffic is
/// discarded by the transport layer.
///
/// Channel rejections name the offending type in the server log only; the
/// transport answers the client with its own fixed rejection description,
/// and turns away channel types it does not model before the handler sees
/// them.
pub struct ConnectionHandler {
    context: Arc<ServerContext>,
    peer: SocketAddr,
    sessions: HashMap<ChannelId, mpsc::Sender<Request>>,
}

impl ConnectionHandler {
    pub fn new(context: Arc<ServerContext>, peer: SocketAddr) -> Self {
        Self {
            context,
            peer,
            sessions: HashMap::new(),
        }
    }

    fn dispatch(&mut self, channel: ChannelId, request: Request) {
        match self.sessions.get(&channel) {
            Some(tx) => {
                // A full queue would stall the whole connection; drop instead.
                if tx.try_send(request).is_err() {
                    warn!("dropping request on busy channel {:?}", channel);
                }
            }
            None => warn!("request for unknown channel {:?}", channel),
        }
    }

    fn reject_channel(&self, kind: &str) {
        warn!(
            "{}: {}",
            self.peer,
            ProtocolError::UnknownChannelType(kind.to_string())
        );
    }
}

#[async_trait]
impl Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &russh_keys::key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        // All presented keys are authorized.
        info!(
            "publickey auth for {:?} from {} ({})",
            user,
            self.peer,
            public_key.fingerprint()
        );
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!("session channel {:?} opened by {}", channel.id(), self.peer);
        let sink = RusshSink {
            handle: session.handle(),
            id: channel.id(),
        };
        let encoder = PcapEncoder::new(self.context.snaplen);
        let state_machine =
            CaptureSession::new(self.context.orchestrator.clone(), encoder, sink);
        let (tx, rx) = mpsc::channel(8);
        self.sessions.insert(channel.id(), tx);
        tokio::spawn(state_machine.run(rx));
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.reject_channel("direct-tcpip");
        Ok(false)
    }

    async fn channel_open_forwarded_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.reject_channel("forwarded-tcpip");
        Ok(false)
    }

    async fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.reject_channel("x11");
        Ok(false)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        // The transport strips the length prefix from the wire payload; the
        // state machine validates the framed form.
        let mut payload = Vec::with_capacity(4 + data.len());
        payload.extend_from_slice(&(data.len() as u32).to_be_bytes());
        payload.extend_from_slice(data);
        self.dispatch(
            channel,
            Request {
                kind: "exec".to_string(),
                payload,
            },
        );
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.dispatch(
            channel,
            Request {
                kind: "shell".to_string(),
                payload: Vec::new(),
            },
        );
        Ok(())
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.dispatch(
            channel,
            Request {
                kind: "pty-req".to_string(),
                payload: Vec::new(),
            },
        );
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        _variable_value: &str,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.dispatch(
            channel,
            Request {
                kind: "env".to_string(),
                payload: variable_name.as_bytes().to_vec(),
            },
        );
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.dispatch(
            channel,
            Request {
                kind: "subsystem".to_string(),
                payload: name.as_bytes().to_vec(),
            },
        );
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!("channel {:?} closed by {}", channel, self.peer);
        // Dropping the sender ends the session's request stream, which
        // cancels its capture.
        self.sessions.remove(&channel);
        Ok(())
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        debug!("connection from {} torn down", self.peer);
    }
}

/// Channel sink backed by the connection's cloneable async handle. Writes
/// participate in the transport's flow control, so a client that stops
/// reading eventually blocks the merge-and-encode loop.
#[derive(Clone)]
pub struct RusshSink {
    handle: Handle,
    id: ChannelId,
}

impl ChannelSink for RusshSink {
    fn send_data(
        &mut self,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<(), SessionError>> + Send {
        async move {
            self.handle
                .data(self.id, CryptoVec::from_slice(&bytes))
                .await
                .map_err(|_| SessionError::ChannelClosed)
        }
    }

    fn reply(&mut self, success: bool, _message: Vec<u8>) -> impl Future<Output = ()> + Send {
        // Channel request replies carry no payload on the wire; the message
        // reaches the client through the data stream.
        async move {
            let result = if success {
                self.handle.channel_success(self.id).await
            } else {
                self.handle.channel_failure(self.id).await
            };
            if result.is_err() {
                debug!("reply on closed channel {:?}", self.id);
            }
        }
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            let _ = self.handle.close(self.id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error_handling::types::ProtocolError;

    #[test]
    fn rejection_reason_names_the_channel_type() {
        let reason = ProtocolError::UnknownChannelType("direct-tcpip".to_string()).to_string();
        assert!(reason.contains("direct-tcpip"));
        assert!(reason.contains("unknown channel type"));
    }
}
