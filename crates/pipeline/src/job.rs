use std::sync::{Condvar, Mutex};

/// Handoff state between the capture loop and the detection worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// No pass pending; the loop may submit a frame.
    Idle,
    /// A snapshot is pending or a pass is running; new frames skip detection.
    Busy,
    /// Terminal. The worker exits when it observes this between passes.
    ShuttingDown,
}

struct JobInner {
    state: JobState,
    snapshot: Vec<u8>,
    filled: usize,
    width: u32,
    height: u32,
}

/// Single-slot job mailbox between the capture thread and the worker:
/// capacity one, latest wins, no queue.
///
/// The capture loop offers each frame with [`try_submit`]; while a pass is in
/// flight the offer is declined and that frame simply goes uninspected. The
/// worker blocks in [`wait_for_job`], copies the pending snapshot out under
/// the lock, then runs the pass unlocked on its own scratch buffer.
///
/// [`try_submit`]: JobSlot::try_submit
/// [`wait_for_job`]: JobSlot::wait_for_job
pub struct JobSlot {
    inner: Mutex<JobInner>,
    wakeup: Condvar,
}

impl JobSlot {
    /// `capacity` is the largest NV12 frame the slot will carry.
    pub fn new(capacity: usize) -> JobSlot {
        JobSlot {
            inner: Mutex::new(JobInner {
                state: JobState::Idle,
                snapshot: vec![0u8; capacity],
                filled: 0,
                width: 0,
                height: 0,
            }),
            wakeup: Condvar::new(),
        }
    }

    /// Offer one frame to the worker. The frame is copied into the slot and
    /// the worker woken only when the slot is Idle; returns whether the frame
    /// was taken.
    pub fn try_submit(&self, nv12: &[u8], width: u32, height: u32) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != JobState::Idle {
            return false;
        }
        let n = nv12.len().min(inner.snapshot.len());
        inner.snapshot[..n].copy_from_slice(&nv12[..n]);
        inner.filled = n;
        inner.width = width;
        inner.height = height;
        inner.state = JobState::Busy;
        self.wakeup.notify_one();
        true
    }

    /// Worker side: block until a job arrives or shutdown begins. On a job
    /// the snapshot is copied into `scratch` under the lock and the slot
    /// stays Busy until [`finish`] is called, so the loop keeps skipping.
    ///
    /// Returns the frame geometry, or `None` on shutdown.
    ///
    /// [`finish`]: JobSlot::finish
    pub fn wait_for_job(&self, scratch: &mut Vec<u8>) -> Option<(u32, u32)> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            match inner.state {
                JobState::ShuttingDown => return None,
                JobState::Busy => break,
                JobState::Idle => inner = self.wakeup.wait(inner).unwrap(),
            }
        }
        scratch.clear();
        scratch.extend_from_slice(&inner.snapshot[..inner.filled]);
        Some((inner.width, inner.height))
    }

    /// Worker side: the pass is done. Reopens the slot unless shutdown
    /// arrived while the pass was running.
    pub fn finish(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == JobState::Busy {
            inner.state = JobState::Idle;
        }
    }

    /// Capture-loop side, at teardown. Terminal; wakes the worker so it can
    /// observe the state and exit.
    pub fn begin_shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = JobState::ShuttingDown;
        self.wakeup.notify_all();
    }

    pub fn state(&self) -> JobState {
        self.inner.lock().unwrap().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn busy_slot_declines_new_frames() {
        let slot = JobSlot::new(16);
        assert!(slot.try_submit(&[1, 2, 3], 2, 1));
        assert_eq!(slot.state(), JobState::Busy);
        assert!(!slot.try_submit(&[4, 5, 6], 2, 1));
        slot.finish();
        assert_eq!(slot.state(), JobState::Idle);
        assert!(slot.try_submit(&[4, 5, 6], 2, 1));
    }

    #[test]
    fn wait_copies_the_pending_snapshot() {
        let slot = JobSlot::new(16);
        assert!(slot.try_submit(&[9, 8, 7, 6], 4, 2));
        let mut scratch = Vec::new();
        assert_eq!(slot.wait_for_job(&mut scratch), Some((4, 2)));
        assert_eq!(scratch, vec![9, 8, 7, 6]);
        // The slot stays Busy until the pass reports back.
        assert_eq!(slot.state(), JobState::Busy);
        slot.finish();
        assert_eq!(slot.state(), JobState::Idle);
    }

    #[test]
    fn shutdown_is_terminal() {
        let slot = JobSlot::new(16);
        slot.begin_shutdown();
        assert!(!slot.try_submit(&[1], 1, 1));
        slot.finish();
        assert_eq!(slot.state(), JobState::ShuttingDown);
        let mut scratch = Vec::new();
        assert_eq!(slot.wait_for_job(&mut scratch), None);
    }

    #[test]
    fn shutdown_during_a_pass_wins_over_finish() {
        let slot = JobSlot::new(16);
        assert!(slot.try_submit(&[1, 2], 2, 1));
        let mut scratch = Vec::new();
        slot.wait_for_job(&mut scratch);
        slot.begin_shutdown();
        slot.finish();
        assert_eq!(slot.state(), JobState::ShuttingDown);
    }

    #[test]
    fn blocked_worker_wakes_on_shutdown() {
        let slot = Arc::new(JobSlot::new(8));
        let waiter = {
            let slot = slot.clone();
            thread::spawn(move || {
                let mut scratch = Vec::new();
                slot.wait_for_job(&mut scratch)
            })
        };
        thread::sleep(Duration::from_millis(20));
        slot.begin_shutdown();
        assert_eq!(waiter.join().unwrap(), None);
    }
}
