use crate::capture::source::{CaptureSource, SourceFactory};
use crate::capture::types::Packet;
use crate::configuration::types::CaptureConfig;
use crate::error_handling::types::CaptureError;
use log::debug;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Fans in frames from every configured interface into one merged stream.
///
/// One producer task per interface forwards frames to a shared bounded
/// channel in arrival order; per-interface capture order is preserved,
/// cross-interface order is whatever reaches the merge point first. A read
/// failure on any producer cancels every sibling and surfaces on the stream.
#[derive(Clone)]
pub struct CaptureOrchestrator {
    interfaces: Vec<String>,
    filter: String,
    snaplen: u32,
    factory: Arc<dyn SourceFactory>,
}

impl CaptureOrchestrator {
    pub fn new(config: &CaptureConfig, factory: Arc<dyn SourceFactory>) -> Self {
        Self {
            interfaces: config.interfaces.clone(),
            filter: config.filter.clone(),
            snaplen: config.snaplen,
            factory,
        }
    }

    /// Opens every interface and starts one producer per handle.
    ///
    /// Opening is sequential and fail-fast: the first open or filter failure
    /// aborts the whole attempt, and handles opened so far are released
    /// before the error is returned. There is no partial-success mode.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, cancel: CancellationToken) -> Result<PacketStream, CaptureError> {
        let mut sources: Vec<(String, Box<dyn CaptureSource>)> =
            Vec::with_capacity(self.interfaces.len());
        for interface in &self.interfaces {
            let source = self.factory.open(interface, self.snaplen, &self.filter)?;
            sources.push((interface.clone(), source));
        }

        // Capacity of one: a stalled consumer stops draining the merge point
        // and producers throttle at the rate the client consumes.
        let (tx, rx) = mpsc::channel(1);
        let mut producers = JoinSet::new();
        for (interface, source) in sources {
            let tx = tx.clone();
            let cancel = cancel.clone();
            producers.spawn_blocking(move || run_producer(interface, source, tx, cancel));
        }

        Ok(PacketStream {
            rx,
            cancel,
            producers,
        })
    }
}

/// Consumer end of the merge point. Dropping it cancels every producer.
pub struct PacketStream {
    rx: mpsc::Receiver<Result<Packet, CaptureError>>,
    cancel: CancellationToken,
    producers: JoinSet<()>,
}

impl PacketStream {
    /// Next merged item, in arrival order. `None` once every producer has
    /// stopped and the buffer is drained.
    pub async fn next(&mut self) -> Option<Result<Packet, CaptureError>> {
        self.rx.recv().await
    }

    /// Cancels every producer and waits until each has released its handle.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.rx.close();
        while self.producers.join_next().await.is_some() {}
    }
}

impl Drop for PacketStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn run_producer(
    interface: String,
    mut source: Box<dyn CaptureSource>,
    tx: mpsc::Sender<Result<Packet, CaptureError>>,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        match source.next_packet() {
            Ok(Some(packet)) => {
                if tx.blocking_send(Ok(packet)).is_err() {
                    break;
                }
            }
            Ok(None) => continue,
            Err(err) => {
                // Fail-fast: stop the siblings, then surface the error.
                cancel.cancel();
                let _ = tx.blocking_send(Err(err));
                break;
            }
        }
    }
    debug!("capture producer for {} stopped", interface);
    // `source` is dropped here, releasing the handle on every exit path.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::source::fake::{packet, FakeBehavior, FakeFactory};
    use tokio_test::assert_ok;

    fn capture_config(interfaces: &[&str]) -> CaptureConfig {
        CaptureConfig {
            interfaces: interfaces.iter().map(|i| i.to_string()).collect(),
            filter: "icmp6".to_string(),
            snaplen: 1600,
        }
    }

    async fn collect_payloads(stream: &mut PacketStream, count: usize) -> Vec<Vec<u8>> {
        let mut payloads = Vec::with_capacity(count);
        while payloads.len() < count {
            match stream.next().await {
                Some(Ok(packet)) => payloads.push(packet.data),
                Some(Err(err)) => panic!("unexpected capture error: {}", err),
                None => panic!("stream ended early"),
            }
        }
        payloads
    }

    #[tokio::test]
    async fn open_failure_releases_earlier_handles() {
        let factory = Arc::new(
            FakeFactory::default()
                .with("lan0", FakeBehavior::Packets(Vec::new()))
                .with("uplink0", FakeBehavior::FailOpen),
        );
        let orchestrator =
            CaptureOrchestrator::new(&capture_config(&["lan0", "uplink0"]), factory.clone());

        let err = orchestrator.start(CancellationToken::new()).err().unwrap();

        assert!(err.to_string().contains("uplink0"));
        assert_eq!(factory.open_handles(), 0);
    }

    #[tokio::test]
    async fn filter_failure_releases_earlier_handles() {
        let factory = Arc::new(
            FakeFactory::default()
                .with("lan0", FakeBehavior::Packets(Vec::new()))
                .with("uplink0", FakeBehavior::FailFilter),
        );
        let orchestrator =
            CaptureOrchestrator::new(&capture_config(&["lan0", "uplink0"]), factory.clone());

        let err = orchestrator.start(CancellationToken::new()).err().unwrap();

        assert!(err.to_string().contains("filter"));
        assert!(err.to_string().contains("uplink0"));
        assert_eq!(factory.open_handles(), 0);
    }

    #[tokio::test]
    async fn merge_preserves_per_interface_order() {
        let factory = Arc::new(
            FakeFactory::default()
                .with(
                    "lan0",
                    FakeBehavior::Packets(vec![packet(b"l1"), packet(b"l2")]),
                )
                .with(
                    "uplink0",
                    FakeBehavior::Packets(vec![packet(b"u1"), packet(b"u2")]),
                ),
        );
        let orchestrator =
            CaptureOrchestrator::new(&capture_config(&["lan0", "uplink0"]), factory.clone());

        let mut stream = assert_ok!(orchestrator.start(CancellationToken::new()));
        let payloads = collect_payloads(&mut stream, 4).await;
        stream.shutdown().await;

        let position = |needle: &[u8]| payloads.iter().position(|p| p == needle).unwrap();
        assert!(position(b"l1") < position(b"l2"));
        assert!(position(b"u1") < position(b"u2"));
        assert_eq!(factory.open_handles(), 0);
    }

    #[tokio::test]
    async fn read_failure_cancels_sibling_producers() {
        let factory = Arc::new(
            FakeFactory::default()
                .with(
                    "lan0",
                    FakeBehavior::PacketsThenError(vec![packet(b"l1")]),
                )
                .with("uplink0", FakeBehavior::Packets(Vec::new())),
        );
        let orchestrator =
            CaptureOrchestrator::new(&capture_config(&["lan0", "uplink0"]), factory.clone());

        let mut stream = assert_ok!(orchestrator.start(CancellationToken::new()));
        let mut saw_error = false;
        while let Some(item) = stream.next().await {
            if let Err(err) = item {
                assert!(err.to_string().contains("lan0"));
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);
        stream.shutdown().await;

        assert_eq!(factory.open_handles(), 0);
    }

    #[tokio::test]
    async fn cancellation_stops_idle_producers() {
        let factory = Arc::new(
            FakeFactory::default()
                .with("lan0", FakeBehavior::Packets(Vec::new()))
                .with("uplink0", FakeBehavior::Packets(Vec::new())),
        );
        let orchestrator =
            CaptureOrchestrator::new(&capture_config(&["lan0", "uplink0"]), factory.clone());

        let cancel = CancellationToken::new();
        let stream = assert_ok!(orchestrator.start(cancel.clone()));
        assert_eq!(factory.open_handles(), 2);

        cancel.cancel();
        stream.shutdown().await;

        assert_eq!(factory.open_handles(), 0);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let factory_a = Arc::new(
            FakeFactory::default().with("lan0", FakeBehavior::Packets(Vec::new())),
        );
        let factory_b = Arc::new(FakeFactory::default().with(
            "lan0",
            FakeBehavior::Packets(vec![packet(b"b1"), packet(b"b2")]),
        ));
        let orchestrator_a =
            CaptureOrchestrator::new(&capture_config(&["lan0"]), factory_a.clone());
        let orchestrator_b =
            CaptureOrchestrator::new(&capture_config(&["lan0"]), factory_b.clone());

        let stream_a = assert_ok!(orchestrator_a.start(CancellationToken::new()));
        let mut stream_b = assert_ok!(orchestrator_b.start(CancellationToken::new()));

        // Tearing down one session must not interrupt delivery on the other.
        stream_a.shutdown().await;
        assert_eq!(factory_a.open_handles(), 0);

        let payloads = collect_payloads(&mut stream_b, 2).await;
        assert_eq!(payloads, vec![b"b1".to_vec(), b"b2".to_vec()]);
        stream_b.shutdown().await;
    }
}
