/// System-wide debug-output tap.
///
/// The monitor attributes `OutputDebugString` traffic to the target process
/// through this interface. On Windows the real implementation listens on the
/// `DBWIN_BUFFER` shared section (the same channel DebugView uses) from a
/// dedicated pump thread; everywhere else — and in tests — a substitute
/// implementation is injected instead.
use std::sync::Arc;

/// Callback invoked for every captured line, with the emitting process id.
/// Runs on the tap's own thread; implementations must not block.
pub type TapCallback = Arc<dyn Fn(u32, &str) + Send + Sync>;

pub trait DebugTap: Send + Sync {
    /// Installs the single subscriber, replacing any previous one.
    fn subscribe(&self, callback: TapCallback);
    /// Removes the subscriber so a finished session leaks no callback into
    /// the next one.
    fn unsubscribe(&self);
    /// Begins capturing. Safe to call when already started.
    fn start(&self);
    /// Stops capturing and joins any capture thread. Safe to call when
    /// already stopped.
    fn stop(&self);
}

/// Returns the platform's debug tap: the DBWIN listener on Windows, a no-op
/// everywhere else.
pub fn system_tap() -> Arc<dyn DebugTap> {
    #[cfg(windows)]
    {
        Arc::new(DbwinTap::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(NullTap)
    }
}

/// Tap that captures nothing. Used on non-Windows hosts, where the target
/// has no OutputDebugString channel to intercept.
pub struct NullTap;

impl DebugTap for NullTap {
    fn subscribe(&self, _callback: TapCallback) {}
    fn unsubscribe(&self) {}
    fn start(&self) {}
    fn stop(&self) {}
}

// ── Windows implementation ────────────────────────────────────────────────────

/// Listener on the system-wide `DBWIN_BUFFER` debug-output channel.
///
/// `OutputDebugString` hands each string to whichever debugger holds the
/// DBWIN section: a 4096-byte mapping starting with the sender's pid (DWORD)
/// followed by a NUL-terminated ANSI string, synchronized by the
/// `DBWIN_BUFFER_READY` / `DBWIN_DATA_READY` event pair. The pump thread
/// re-arms `BUFFER_READY` after every string and polls with a short timeout
/// so `stop()` can interrupt it promptly.
#[cfg(windows)]
pub struct DbwinTap {
    callback: Arc<std::sync::Mutex<Option<TapCallback>>>,
    pump: std::sync::Mutex<Option<Pump>>,
}

#[cfg(windows)]
struct Pump {
    stop: Arc<std::sync::atomic::AtomicBool>,
    thread: std::thread::JoinHandle<()>,
}

#[cfg(windows)]
impl DbwinTap {
    pub fn new() -> Self {
        Self {
            callback: Arc::new(std::sync::Mutex::new(None)),
            pump: std::sync::Mutex::new(None),
        }
    }
}

#[cfg(windows)]
impl DebugTap for DbwinTap {
    fn subscribe(&self, callback: TapCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }

    fn unsubscribe(&self) {
        *self.callback.lock().unwrap() = None;
    }

    fn start(&self) {
        use std::sync::atomic::AtomicBool;

        let mut pump = self.pump.lock().unwrap();
        if pump.is_some() {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let callback = Arc::clone(&self.callback);
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("dbwin-pump".into())
                .spawn(move || imp::run_pump(callback, stop))
                .expect("Failed to spawn DBWIN pump thread")
        };
        *pump = Some(Pump { stop, thread });
    }

    fn stop(&self) {
        let pump = self.pump.lock().unwrap().take();
        if let Some(pump) = pump {
            pump.stop.store(true, std::sync::atomic::Ordering::Relaxed);
            let _ = pump.thread.join();
        }
    }
}

#[cfg(windows)]
mod imp {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{
        CloseHandle, HANDLE, INVALID_HANDLE_VALUE, WAIT_OBJECT_0, WAIT_TIMEOUT,
    };
    use windows::Win32::System::Memory::{
        CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, FILE_MAP_READ, PAGE_READWRITE,
    };
    use windows::Win32::System::Threading::{CreateEventW, SetEvent, WaitForSingleObject};

    use super::TapCallback;

    /// Size of the DBWIN shared section: 4-byte pid + up to 4092 string bytes.
    const DBWIN_BUFFER_SIZE: usize = 4096;

    /// How long one wait for `DBWIN_DATA_READY` may block before the stop
    /// flag is rechecked.
    const POLL_TIMEOUT_MS: u32 = 100;

    /// Converts a Rust `&str` to a null-terminated UTF-16 `Vec<u16>`.
    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Opens the DBWIN objects and pumps strings to the subscriber until
    /// `stop` is set.
    ///
    /// Creation opens the existing objects when another debugger already set
    /// them up; in that case both listeners race for each string, which is
    /// inherent to the DBWIN protocol.
    pub fn run_pump(callback: Arc<Mutex<Option<TapCallback>>>, stop: Arc<AtomicBool>) {
        unsafe {
            let ready_w = to_wide("DBWIN_BUFFER_READY");
            let data_w = to_wide("DBWIN_DATA_READY");
            let section_w = to_wide("DBWIN_BUFFER");

            let buffer_ready = match CreateEventW(None, false, false, PCWSTR(ready_w.as_ptr())) {
                Ok(h) => h,
                Err(e) => {
                    eprintln!("[tap] CreateEventW(DBWIN_BUFFER_READY) failed: {e}");
                    return;
                }
            };
            let data_ready = match CreateEventW(None, false, false, PCWSTR(data_w.as_ptr())) {
                Ok(h) => h,
                Err(e) => {
                    eprintln!("[tap] CreateEventW(DBWIN_DATA_READY) failed: {e}");
                    let _ = CloseHandle(buffer_ready);
                    return;
                }
            };
            let section = match CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                0,
                DBWIN_BUFFER_SIZE as u32,
                PCWSTR(section_w.as_ptr()),
            ) {
                Ok(h) => h,
                Err(e) => {
                    eprintln!("[tap] CreateFileMappingW(DBWIN_BUFFER) failed: {e}");
                    let _ = CloseHandle(data_ready);
                    let _ = CloseHandle(buffer_ready);
                    return;
                }
            };
            let view = MapViewOfFile(section, FILE_MAP_READ, 0, 0, 0);
            if view.Value.is_null() {
                eprintln!("[tap] MapViewOfFile(DBWIN_BUFFER) failed");
                close_all(section, data_ready, buffer_ready);
                return;
            }

            let base = view.Value as *const u8;
            while !stop.load(Ordering::Relaxed) {
                // Tell writers the buffer is free, then wait for the next string.
                let _ = SetEvent(buffer_ready);
                let wait = WaitForSingleObject(data_ready, POLL_TIMEOUT_MS);
                if wait == WAIT_TIMEOUT {
                    continue;
                }
                if wait != WAIT_OBJECT_0 {
                    eprintln!("[tap] Wait on DBWIN_DATA_READY failed; pump exiting");
                    break;
                }

                let pid = std::ptr::read_unaligned(base as *const u32);
                let text_ptr = base.add(4);
                let max = DBWIN_BUFFER_SIZE - 4;
                let mut len = 0usize;
                while len < max && *text_ptr.add(len) != 0 {
                    len += 1;
                }
                let raw = std::slice::from_raw_parts(text_ptr, len);
                // DBWIN strings are ANSI; lossy UTF-8 is the closest portable read.
                let text = String::from_utf8_lossy(raw);

                let subscriber = callback.lock().unwrap().clone();
                if let Some(cb) = subscriber {
                    cb(pid, &text);
                }
            }

            let _ = UnmapViewOfFile(view);
            close_all(section, data_ready, buffer_ready);
        }
    }

    unsafe fn close_all(section: HANDLE, data_ready: HANDLE, buffer_ready: HANDLE) {
        let _ = CloseHandle(section);
        let _ = CloseHandle(data_ready);
        let _ = CloseHandle(buffer_ready);
    }
}
