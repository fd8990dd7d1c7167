use crate::protocol::ResourceEvent;
use crate::trace::LogRecord;

/// Everything the monitoring core reports to its consumer (a GUI, or the
/// headless session driver in `main.rs`).
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// The target process exited; carries the OS exit code (-1 when the
    /// process died without one, e.g. killed by signal).
    ProcessExited(i32),
    /// A debug-output line attributed to the target process.
    Trace(LogRecord),
    /// A resource lifecycle notification from a telemetry datagram.
    Resource(ResourceEvent),
}
