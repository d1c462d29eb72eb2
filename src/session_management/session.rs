use crate::capture::orchestrator::{CaptureOrchestrator, PacketStream};
use crate::encoder::pcap::PcapEncoder;
use crate::error_handling::types::SessionError;
use crate::session_management::types::{error_message, ChannelSink, Request, SessionState};
use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Per-channel protocol state machine: Idle -> Running -> Terminated.
///
/// Accepts exactly one "exec" request, drives the capture orchestrator and
/// the pcap encoder against the channel's data stream, and reports every
/// error to the client. The command text of the exec request is logged but
/// never interpreted; interfaces and filter are fixed by configuration.
pub struct CaptureSession<S: ChannelSink> {
    state: SessionState,
    sink: S,
    orchestrator: CaptureOrchestrator,
    encoder: PcapEncoder,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl<S: ChannelSink> CaptureSession<S> {
    pub fn new(orchestrator: CaptureOrchestrator, encoder: PcapEncoder, sink: S) -> Self {
        Self {
            state: SessionState::Idle,
            sink,
            orchestrator,
            encoder,
            cancel: CancellationToken::new(),
            pump: None,
        }
    }

    /// Consumes the channel's request stream until it ends or the session
    /// terminates, then stops the capture and waits for the streaming task
    /// to release its resources.
    ///
    /// The streaming task's completion, normal or failed, is observed here
    /// and moves the session to Terminated; the task has already closed the
    /// channel by then.
    pub async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        loop {
            if let Some(mut pump) = self.pump.take() {
                tokio::select! {
                    biased;
                    _ = &mut pump => {
                        self.state = SessionState::Terminated;
                    }
                    request = requests.recv() => {
                        self.pump = Some(pump);
                        match request {
                            Some(request) => self.handle_request(request).await,
                            None => break,
                        }
                    }
                }
            } else {
                match requests.recv().await {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                }
            }
            if self.state == SessionState::Terminated {
                break;
            }
        }
        self.cancel.cancel();
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
    }

    pub async fn handle_request(&mut self, request: Request) {
        match self.state {
            SessionState::Terminated => {
                debug!("ignoring {:?} request on terminated session", request.kind);
            }
            SessionState::Running => {
                // The data stream stays untouched and the channel stays
                // open; only the failure reply goes out.
                let err = if request.kind == "exec" {
                    SessionError::AlreadyActive
                } else {
                    SessionError::UnknownRequestType(request.kind)
                };
                self.sink.reply(false, error_message(&err)).await;
            }
            SessionState::Idle => match self.begin(&request).await {
                Ok(()) => self.state = SessionState::Running,
                Err(err) => {
                    self.state = SessionState::Terminated;
                    deliver_failure(&mut self.sink, &err).await;
                }
            },
        }
    }

    /// Validates the exec request and starts the capture. The orchestrator
    /// is fully initialized before the request is acknowledged; on any error
    /// no acknowledgment is sent.
    async fn begin(&mut self, request: &Request) -> Result<(), SessionError> {
        if request.kind != "exec" {
            return Err(SessionError::UnknownRequestType(request.kind.clone()));
        }
        if request.payload.len() < 4 {
            return Err(SessionError::PayloadTooShort {
                got: request.payload.len(),
                want: 4,
            });
        }
        info!(
            "exec requested, command {:?} (ignored)",
            String::from_utf8_lossy(&request.payload[4..])
        );

        self.sink.send_data(self.encoder.file_header()).await?;
        let stream = self.orchestrator.start(self.cancel.clone())?;
        self.sink.reply(true, Vec::new()).await;

        let encoder = self.encoder.clone();
        let mut sink = self.sink.clone();
        self.pump = Some(tokio::spawn(async move {
            match pump(stream, &encoder, &mut sink).await {
                // The merge stream only ends on cancellation; the channel
                // still has to be closed exactly once.
                Ok(()) => sink.close().await,
                Err(err) => deliver_failure(&mut sink, &err).await,
            }
        }));
        Ok(())
    }
}

impl<S: ChannelSink> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Merge-and-encode loop: pulls one merged packet at a time and fully writes
/// its record before pulling the next. A write failure aborts the session.
async fn pump<S: ChannelSink>(
    mut stream: PacketStream,
    encoder: &PcapEncoder,
    sink: &mut S,
) -> Result<(), SessionError> {
    while let Some(item) = stream.next().await {
        let packet = item?;
        sink.send_data(encoder.packet_record(&packet)).await?;
    }
    Ok(())
}

/// Error delivery for client tooling: the failure reply and the data stream
/// both carry the message, then the channel is closed.
async fn deliver_failure<S: ChannelSink>(sink: &mut S, err: &SessionError) {
    let message = error_message(err);
    sink.reply(false, message.clone()).await;
    let _ = sink.send_data(message).await;
    sink.close().await;
}
