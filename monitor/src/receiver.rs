/// Telemetry datagram receive loop.
///
/// One UDP socket, bound before the target is ever launched, feeds a single
/// consumer task that decodes, filters and dispatches each packet, then
/// re-arms itself — indefinitely. The port is shared with whatever else the
/// machine sends there, so every per-packet failure is swallowed: only the
/// owner's stop signal ends the loop.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dispatch::Dispatcher;
use crate::event::MonitorEvent;
use crate::protocol::{self, Telemetry};
use crate::telemetry::SharedSnapshot;

/// Largest datagram the loop will read. The engine's packets are far smaller;
/// anything bigger is foreign traffic and truncation just makes it undecodable.
const MAX_DATAGRAM: usize = 4096;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("telemetry port {0} is already in use")]
    PortInUse(u16),
    #[error("failed to bind telemetry port {port}: {source}")]
    Io {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Binds the telemetry socket on all interfaces. Pass port 0 to let the OS
/// pick one (tests do); the real port is in `socket.local_addr()`.
pub async fn bind(port: u16) -> Result<UdpSocket, BindError> {
    match UdpSocket::bind(("0.0.0.0", port)).await {
        Ok(socket) => Ok(socket),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => Err(BindError::PortInUse(port)),
        Err(e) => Err(BindError::Io { port, source: e }),
    }
}

/// A running receive loop. Dropping the handle without calling [`stop`]
/// leaves the task running until the runtime shuts down.
///
/// [`stop`]: ReceiverHandle::stop
pub struct ReceiverHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReceiverHandle {
    /// Signals the loop to stop and waits for it to finish. A receive pending
    /// at that moment is abandoned silently; no event is emitted.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

/// Spawns the receive loop on `socket`.
///
/// `tracked_pid` is the pid of the currently monitored process (0 = none);
/// the lifecycle controller updates it at start and exit. Performance samples
/// go into `snapshot`, resource events out through `dispatcher`.
pub fn spawn(
    socket: UdpSocket,
    tracked_pid: Arc<AtomicU32>,
    snapshot: SharedSnapshot,
    dispatcher: Arc<dyn Dispatcher>,
) -> ReceiverHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run(socket, stop_rx, tracked_pid, snapshot, dispatcher));
    ReceiverHandle { stop_tx, task }
}

async fn run(
    socket: UdpSocket,
    mut stop_rx: watch::Receiver<bool>,
    tracked_pid: Arc<AtomicU32>,
    snapshot: SharedSnapshot,
    dispatcher: Arc<dyn Dispatcher>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    // Mismatched-sender packets are counted so a dead session leaves a trace
    // of port collisions; see the drop policy note in DESIGN.md.
    let mut mismatched: u64 = 0;

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, _peer)) => {
                    handle_datagram(&buf[..len], &tracked_pid, &snapshot, &dispatcher, &mut mismatched);
                }
                Err(e) => {
                    // Transient on Windows UDP (e.g. ICMP port-unreachable
                    // surfacing as a recv error); never fatal to the loop.
                    eprintln!("[receiver] recv error (ignored): {e}");
                }
            },
        }
    }

    if mismatched > 0 {
        eprintln!("[receiver] Dropped {mismatched} datagram(s) from non-tracked senders");
    }
}

fn handle_datagram(
    data: &[u8],
    tracked_pid: &AtomicU32,
    snapshot: &SharedSnapshot,
    dispatcher: &Arc<dyn Dispatcher>,
    mismatched: &mut u64,
) {
    // Malformed, foreign or unrecognized packets all land here and vanish.
    let Some(datagram) = protocol::parse_datagram(data) else {
        return;
    };

    // Snapshot the tracked pid once per packet; a concurrent Start/exit
    // changes it for the *next* packet, not mid-dispatch.
    let pid = tracked_pid.load(Ordering::Relaxed);
    if pid == 0 || datagram.process_id != pid {
        *mismatched += 1;
        return;
    }

    match datagram.message {
        Telemetry::Performance(sample) => snapshot.store(sample),
        Telemetry::Resource(event) => dispatcher.post(MonitorEvent::Resource(event)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{encode, Value};
    use crate::dispatch::ChannelDispatcher;
    use crate::protocol::ResourceEvent;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    fn dict(entries: Vec<(&str, Value)>) -> Value {
        Value::Dict(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn perf_packet(pid: i64, fps: i64) -> Vec<u8> {
        encode(&dict(vec![
            ("processId", Value::Int(pid)),
            ("msgType", Value::Int(1)),
            (
                "args",
                dict(vec![
                    ("fps", Value::Int(fps)),
                    ("objects", Value::Int(1_500_000)),
                    ("frametime", Value::Int(16_000)),
                    ("rendertime", Value::Int(8_000)),
                ]),
            ),
        ]))
    }

    fn cleared_packet(pid: i64) -> Vec<u8> {
        encode(&dict(vec![
            ("processId", Value::Int(pid)),
            ("msgType", Value::Int(4)),
            ("args", dict(vec![("pool", Value::Int(1))])),
        ]))
    }

    struct Fixture {
        port: u16,
        tracked: Arc<AtomicU32>,
        snapshot: SharedSnapshot,
        rx: mpsc::UnboundedReceiver<MonitorEvent>,
        handle: ReceiverHandle,
        sender: UdpSocket,
    }

    async fn start_receiver(tracked_pid: u32) -> Fixture {
        let socket = bind(0).await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let tracked = Arc::new(AtomicU32::new(tracked_pid));
        let snapshot = SharedSnapshot::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn(
            socket,
            Arc::clone(&tracked),
            snapshot.clone(),
            Arc::new(ChannelDispatcher::new(tx)),
        );
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Fixture { port, tracked, snapshot, rx, handle, sender }
    }

    impl Fixture {
        async fn send(&self, data: &[u8]) {
            self.sender
                .send_to(data, ("127.0.0.1", self.port))
                .await
                .unwrap();
        }

        /// Polls the shared snapshot until `fps` matches or two seconds pass.
        async fn wait_for_fps(&self, fps: f32) {
            timeout(Duration::from_secs(2), async {
                while self.snapshot.load().fps != fps {
                    sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("snapshot never reached the expected fps");
        }
    }

    // ── happy path ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn performance_datagram_updates_snapshot() {
        let fx = start_receiver(1234).await;
        fx.send(&perf_packet(1234, 60_000)).await;
        fx.wait_for_fps(60.0).await;

        let s = fx.snapshot.load();
        assert_eq!(s.objects, 1500.0);
        assert!((s.frame_time - 0.016).abs() < 1e-6);
        assert!((s.render_time - 0.008).abs() < 1e-6);
        fx.handle.stop().await;
    }

    #[tokio::test]
    async fn resource_datagram_raises_event() {
        let mut fx = start_receiver(1234).await;
        fx.send(&cleared_packet(1234)).await;

        let event = timeout(Duration::from_secs(2), fx.rx.recv())
            .await
            .expect("no event within timeout")
            .expect("event channel closed");
        assert!(matches!(
            event,
            MonitorEvent::Resource(ResourceEvent::Cleared { .. })
        ));
        fx.handle.stop().await;
    }

    // ── pid filtering ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn mismatched_pid_is_dropped_matching_pid_is_not() {
        let mut fx = start_receiver(1234).await;
        // Foreign pid first, then the tracked one.
        fx.send(&cleared_packet(9999)).await;
        fx.send(&perf_packet(9999, 30_000)).await;
        fx.send(&perf_packet(1234, 60_000)).await;
        fx.wait_for_fps(60.0).await;

        // The foreign performance packet must not have landed first.
        assert_eq!(fx.snapshot.load().fps, 60.0);
        // And the foreign resource packet must not have produced an event.
        sleep(Duration::from_millis(50)).await;
        assert!(fx.rx.try_recv().is_err());
        fx.handle.stop().await;
    }

    #[tokio::test]
    async fn no_tracked_process_drops_everything() {
        let mut fx = start_receiver(0).await;
        fx.send(&perf_packet(1234, 60_000)).await;
        fx.send(&cleared_packet(1234)).await;
        sleep(Duration::from_millis(100)).await;

        assert_eq!(fx.snapshot.load().fps, 0.0);
        assert!(fx.rx.try_recv().is_err());
        fx.handle.stop().await;
    }

    #[tokio::test]
    async fn tracked_pid_change_applies_to_subsequent_packets() {
        let fx = start_receiver(1111).await;
        fx.send(&perf_packet(2222, 30_000)).await;
        sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.snapshot.load().fps, 0.0);

        fx.tracked.store(2222, Ordering::Relaxed);
        fx.send(&perf_packet(2222, 30_000)).await;
        fx.wait_for_fps(30.0).await;
        fx.handle.stop().await;
    }

    // ── resilience ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn malformed_packets_do_not_stop_the_loop() {
        let fx = start_receiver(1234).await;
        fx.send(b"complete garbage").await;
        fx.send(b"").await;
        fx.send(b"d3:fps").await; // truncated bencode
        fx.send(&perf_packet(1234, 59_000)).await;
        fx.wait_for_fps(59.0).await;
        fx.handle.stop().await;
    }

    #[tokio::test]
    async fn stop_terminates_without_spurious_events() {
        let mut fx = start_receiver(1234).await;
        timeout(Duration::from_secs(2), fx.handle.stop())
            .await
            .expect("stop() did not complete");
        assert!(fx.rx.try_recv().is_err());
    }

    // ── bind errors ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn binding_an_occupied_port_reports_port_in_use() {
        let first = bind(0).await.unwrap();
        let port = first.local_addr().unwrap().port();
        match bind(port).await {
            Err(BindError::PortInUse(p)) => assert_eq!(p, port),
            other => panic!("expected PortInUse, got {other:?}"),
        }
    }
}
