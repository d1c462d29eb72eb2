use crate::error_handling::types::SessionError;
use std::future::Future;

/// An out-of-band request received on a session channel.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request type tag, e.g. "exec" or "shell".
    pub kind: String,
    /// Raw wire payload. For "exec" this is a 4-byte big-endian length
    /// prefix followed by the command text.
    pub payload: Vec<u8>,
}

/// Protocol states of one session channel. `Terminated` is absorbing; the
/// channel is closed on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Terminated,
}

/// Write side of one session channel, as seen by the state machine.
///
/// Cloned into the streaming task; both sides address the same underlying
/// channel.
pub trait ChannelSink: Clone + Send + Sync + 'static {
    /// Writes bytes to the channel's data stream.
    fn send_data(
        &mut self,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Answers the request currently being served. The message accompanies
    /// negative replies; transports that cannot carry it may drop it.
    fn reply(&mut self, success: bool, message: Vec<u8>) -> impl Future<Output = ()> + Send;

    /// Closes the channel. Closing an already-closed channel is a no-op.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Renders a session error for the client: UTF-8 text with exactly one
/// trailing newline, regardless of what the underlying text ended with.
pub fn error_message(err: &SessionError) -> Vec<u8> {
    let mut message = err.to_string();
    while message.ends_with('\n') {
        message.pop();
    }
    message.push('\n');
    message.into_bytes()
}
