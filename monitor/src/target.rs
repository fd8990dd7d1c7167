/// Lifecycle controller for the monitored target process.
///
/// One controller owns at most one live process at a time and moves through
/// Idle → Starting → Running → Exited. The telemetry socket is bound at
/// construction, before any process exists, so a port conflict surfaces
/// before a launch can half-succeed. The transition to Exited happens only
/// when the OS reports termination — `kill()` merely requests it.
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Notify;

use crate::debug_tap::{DebugTap, TapCallback};
use crate::dispatch::Dispatcher;
use crate::event::MonitorEvent;
use crate::receiver::{self, BindError, ReceiverHandle};
use crate::telemetry::{SharedSnapshot, TelemetrySnapshot};
use crate::trace::LogRecord;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("target process is already running")]
    AlreadyRunning,
    #[error("failed to launch {path}: {source}")]
    Launch {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

enum State {
    Idle,
    Starting,
    Running {
        pid: u32,
        started: Instant,
        kill: Arc<Notify>,
    },
    Exited {
        code: i32,
        lifetime: Duration,
    },
}

pub struct TargetProcess {
    /// Actual bound telemetry port, passed to the target via `/debugger:`.
    port: u16,
    tap: Arc<dyn DebugTap>,
    dispatcher: Arc<dyn Dispatcher>,
    snapshot: SharedSnapshot,
    /// Pid the receive loop and the tap callback filter on; 0 = none tracked.
    tracked_pid: Arc<AtomicU32>,
    receiver: ReceiverHandle,
    state: Arc<Mutex<State>>,
}

impl TargetProcess {
    /// Binds the telemetry socket and spawns the receive loop. Fails (and
    /// constructs nothing) when the port cannot be bound.
    pub async fn new(
        port: u16,
        tap: Arc<dyn DebugTap>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, BindError> {
        let socket = receiver::bind(port).await?;
        // Port 0 asks the OS to pick; the target must be told the real one.
        let port = socket.local_addr().map(|a| a.port()).unwrap_or(port);

        let tracked_pid = Arc::new(AtomicU32::new(0));
        let snapshot = SharedSnapshot::default();
        let receiver = receiver::spawn(
            socket,
            Arc::clone(&tracked_pid),
            snapshot.clone(),
            Arc::clone(&dispatcher),
        );

        Ok(Self {
            port,
            tap,
            dispatcher,
            snapshot,
            tracked_pid,
            receiver,
            state: Arc::new(Mutex::new(State::Idle)),
        })
    }

    /// Launches the target executable with the telemetry-port flag appended.
    ///
    /// The working directory is `workdir` when given, otherwise the
    /// executable's containing directory. Errors are reported synchronously:
    /// `AlreadyRunning` leaves the existing process untouched, a spawn
    /// failure leaves the controller in its previous state.
    pub fn start(&self, path: &Path, workdir: Option<&Path>) -> Result<(), StartError> {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, State::Starting | State::Running { .. }) {
            return Err(StartError::AlreadyRunning);
        }
        let previous = std::mem::replace(&mut *state, State::Starting);

        let mut command = Command::new(path);
        command.arg(format!("/debugger:{}", self.port));
        let dir: Option<PathBuf> = workdir.map(Path::to_path_buf).or_else(|| {
            path.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
        });
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        // The target writes to its own console; none of its stdio belongs in
        // the monitor's output.
        command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                *state = previous;
                return Err(StartError::Launch {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        let pid = child.id().unwrap_or(0);
        let kill = Arc::new(Notify::new());
        *state = State::Running {
            pid,
            started: Instant::now(),
            kill: Arc::clone(&kill),
        };
        drop(state);

        self.tracked_pid.store(pid, Ordering::Relaxed);
        self.tap.subscribe(self.trace_callback());
        self.tap.start();
        eprintln!("[target] Launched {} (pid {pid}, telemetry port {})", path.display(), self.port);

        // Waiter task: sole owner of the child handle. It performs the only
        // Running → Exited transition and emits the only ProcessExited event.
        let state = Arc::clone(&self.state);
        let tracked_pid = Arc::clone(&self.tracked_pid);
        let tap = Arc::clone(&self.tap);
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    _ = kill.notified() => {
                        if let Err(e) = child.start_kill() {
                            eprintln!("[target] Kill request failed: {e}");
                        }
                        // Loop back and keep waiting; exit is still the OS's call.
                    }
                }
            };
            let code = match status {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    eprintln!("[target] Wait on child failed: {e}");
                    -1
                }
            };

            let lifetime = match *state.lock().unwrap() {
                State::Running { started, .. } => started.elapsed(),
                _ => Duration::ZERO,
            };

            // Tear down before Exited becomes visible: the pid must stop
            // attracting packets and debug strings, and a caller that restarts
            // the instant it observes the exit must not have its new session
            // clobbered by this trailing cleanup.
            tracked_pid.store(0, Ordering::Relaxed);
            tap.stop();
            tap.unsubscribe();
            {
                let mut state = state.lock().unwrap();
                if matches!(*state, State::Running { .. }) {
                    *state = State::Exited { code, lifetime };
                }
            }
            dispatcher.post(MonitorEvent::ProcessExited(code));
        });

        Ok(())
    }

    /// Callback handed to the debug tap: filter to the tracked pid, classify,
    /// forward. Runs on the tap's pump thread.
    fn trace_callback(&self) -> TapCallback {
        let tracked_pid = Arc::clone(&self.tracked_pid);
        let dispatcher = Arc::clone(&self.dispatcher);
        Arc::new(move |source_pid, line| {
            let pid = tracked_pid.load(Ordering::Relaxed);
            if pid != 0 && source_pid == pid {
                dispatcher.post(MonitorEvent::Trace(LogRecord::classify(line)));
            }
        })
    }

    /// Requests OS termination of the running target. No-op in any other
    /// state, and idempotent: however many times it is called, the single
    /// exit notification still comes from the waiter task.
    pub fn kill(&self) {
        let state = self.state.lock().unwrap();
        if let State::Running { kill, .. } = &*state {
            kill.notify_one();
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock().unwrap(), State::Running { .. })
    }

    /// Pid of the live target, if any.
    pub fn pid(&self) -> Option<u32> {
        match *self.state.lock().unwrap() {
            State::Running { pid, .. } => Some(pid),
            _ => None,
        }
    }

    /// Exit code of the target once it has exited.
    pub fn exit_code(&self) -> Option<i32> {
        match *self.state.lock().unwrap() {
            State::Exited { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Wall-clock lifetime: zero before the first launch, elapsed-so-far
    /// while running, frozen at the exit instant afterwards.
    pub fn lifetime(&self) -> Duration {
        match *self.state.lock().unwrap() {
            State::Idle | State::Starting => Duration::ZERO,
            State::Running { started, .. } => started.elapsed(),
            State::Exited { lifetime, .. } => lifetime,
        }
    }

    /// Latest performance sample received over telemetry.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.load()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state_label(&self) -> &'static str {
        match *self.state.lock().unwrap() {
            State::Idle => "idle",
            State::Starting => "starting",
            State::Running { .. } => "running",
            State::Exited { .. } => "exited",
        }
    }

    /// Ends the monitoring session: terminates the receive loop. The target
    /// process, if still alive, is deliberately left running — monitoring it
    /// was the job, owning it is not.
    pub async fn shutdown(self) {
        self.receiver.stop().await;
        self.tap.stop();
        self.tap.unsubscribe();
    }
}
