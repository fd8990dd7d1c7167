use std::sync::{Arc, Mutex};

/// Latest frame-performance sample reported by the target process.
///
/// Written wholesale by the receive loop on every `PerformanceUpdate`
/// datagram and read wholesale by the polling side; the single mutex in
/// [`SharedSnapshot`] guarantees no reader ever sees a half-written sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub fps: f32,
    /// Live game-object count. The engine reports it as a float.
    pub objects: f32,
    /// Logic frame time in seconds.
    pub frame_time: f32,
    /// Render time in seconds.
    pub render_time: f32,
}

/// Cloneable handle to the snapshot shared between the receive loop (writer)
/// and the sampling/GUI side (readers).
#[derive(Clone, Default)]
pub struct SharedSnapshot {
    inner: Arc<Mutex<TelemetrySnapshot>>,
}

impl SharedSnapshot {
    /// Replaces the whole snapshot in one locked write.
    pub fn store(&self, snapshot: TelemetrySnapshot) {
        *self.inner.lock().unwrap() = snapshot;
    }

    /// Returns a copy of the latest fully-written snapshot.
    pub fn load(&self) -> TelemetrySnapshot {
        *self.inner.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_all_zero() {
        let shared = SharedSnapshot::default();
        assert_eq!(shared.load(), TelemetrySnapshot::default());
    }

    #[test]
    fn store_replaces_every_field() {
        let shared = SharedSnapshot::default();
        shared.store(TelemetrySnapshot {
            fps: 60.0,
            objects: 1500.0,
            frame_time: 0.016,
            render_time: 0.008,
        });
        let s = shared.load();
        assert_eq!(s.fps, 60.0);
        assert_eq!(s.objects, 1500.0);
        assert_eq!(s.frame_time, 0.016);
        assert_eq!(s.render_time, 0.008);
    }

    #[test]
    fn clones_observe_the_same_snapshot() {
        let a = SharedSnapshot::default();
        let b = a.clone();
        a.store(TelemetrySnapshot { fps: 30.0, ..Default::default() });
        assert_eq!(b.load().fps, 30.0);
    }
}
