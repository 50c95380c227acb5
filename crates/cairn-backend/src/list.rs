use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Capacity of the channel between a list worker and its consumer.
const CHANNEL_CAPACITY: usize = 128;

/// How often a blocked producer re-checks for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Producer half of a [`ListStream`], handed to the worker closure.
pub struct ListSink {
    tx: Sender<String>,
    cancel: CancellationToken,
}

impl ListSink {
    /// Offer one name to the consumer.
    ///
    /// Blocks while the channel is full, re-checking for cancellation at a
    /// fixed interval so a producer never waits forever on a consumer that
    /// stopped draining. Returns `false` once the stream is finished, either
    /// because cancellation fired or because the consumer went away; workers
    /// must stop producing when they see `false`.
    pub fn push(&self, name: String) -> bool {
        let mut pending = name;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            match self.tx.send_timeout(pending, CANCEL_POLL_INTERVAL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) => pending = back,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Whether the stream has been cancelled or abandoned.
    ///
    /// Workers doing expensive per-item work can poll this between pushes.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Lazily produced stream of blob names.
///
/// Names arrive from a worker thread through a bounded channel, so
/// production and consumption proceed concurrently with no snapshot
/// isolation and in unspecified order. Dropping the stream cancels the
/// worker and joins it; an abandoned enumeration never leaks a thread or
/// blocks one forever.
pub struct ListStream {
    rx: Receiver<String>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl ListStream {
    /// Run `produce` on a worker thread and return the consumer half.
    ///
    /// The worker observes a child of `cancel`: cancelling the caller's
    /// token ends the stream, while dropping the stream cancels only the
    /// child and leaves the caller's token untouched.
    pub fn spawn<F>(cancel: &CancellationToken, produce: F) -> Self
    where
        F: FnOnce(ListSink) + Send + 'static,
    {
        let child = cancel.child_token();
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let sink = ListSink {
            tx,
            cancel: child.clone(),
        };
        let worker = thread::spawn(move || produce(sink));
        Self {
            rx,
            cancel: child,
            worker: Some(worker),
        }
    }
}

impl Iterator for ListStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        // Disconnection means the worker dropped its sink and exited.
        self.rx.recv().ok()
    }
}

impl Drop for ListStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        // Drain buffered names so a producer blocked on a full channel can
        // complete its in-flight send and observe the cancellation.
        while self.rx.try_recv().is_ok() {}
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("list worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for ListStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListStream")
            .field("buffered", &self.rx.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn names_flow_through_in_order_of_production() {
        let cancel = CancellationToken::new();
        let stream = ListStream::spawn(&cancel, |sink| {
            for i in 0..5 {
                assert!(sink.push(format!("name-{i}")));
            }
        });

        let names: Vec<String> = stream.collect();
        assert_eq!(names.len(), 5);
        assert_eq!(names[0], "name-0");
        assert_eq!(names[4], "name-4");
    }

    #[test]
    fn empty_producer_yields_nothing() {
        let cancel = CancellationToken::new();
        let mut stream = ListStream::spawn(&cancel, |_sink| {});
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn cancellation_stops_an_unbounded_producer() {
        let cancel = CancellationToken::new();
        let mut stream = ListStream::spawn(&cancel, |sink| {
            let mut i = 0u64;
            loop {
                if !sink.push(format!("{i}")) {
                    return;
                }
                i += 1;
            }
        });

        for _ in 0..10 {
            assert!(stream.next().is_some());
        }
        cancel.cancel();

        // Without cancellation this loop would never end; the buffered tail
        // drains and then the disconnected channel yields None.
        let drained = stream.by_ref().count();
        assert!(drained <= CHANNEL_CAPACITY + 1);
    }

    #[test]
    fn dropping_the_stream_stops_the_producer() {
        let stopped = Arc::new(AtomicBool::new(false));
        let observed = Arc::clone(&stopped);

        let cancel = CancellationToken::new();
        let mut stream = ListStream::spawn(&cancel, move |sink| {
            let mut i = 0u64;
            loop {
                if !sink.push(format!("{i}")) {
                    observed.store(true, Ordering::SeqCst);
                    return;
                }
                i += 1;
            }
        });

        assert!(stream.next().is_some());
        // Drop joins the worker, so the flag is visible afterwards.
        drop(stream);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn cancelling_unblocks_a_producer_stalled_on_a_full_channel() {
        let cancel = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let pushed = Arc::new(AtomicUsize::new(0));
        let stopped_flag = Arc::clone(&stopped);
        let push_count = Arc::clone(&pushed);

        let stream = ListStream::spawn(&cancel, move |sink| {
            let mut i = 0u64;
            while sink.push(format!("{i}")) {
                push_count.fetch_add(1, Ordering::SeqCst);
                i += 1;
            }
            stopped_flag.store(true, Ordering::SeqCst);
        });

        // Let the producer fill the channel and stall mid-push.
        while pushed.load(Ordering::SeqCst) < CHANNEL_CAPACITY {
            thread::yield_now();
        }
        cancel.cancel();

        // Nothing is consumed; the stalled push alone must observe the
        // cancellation within its poll interval.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !stopped.load(Ordering::SeqCst) {
            assert!(
                std::time::Instant::now() < deadline,
                "producer kept running after cancellation"
            );
            thread::sleep(Duration::from_millis(5));
        }
        drop(stream);
    }

    #[test]
    fn dropping_the_stream_with_a_stalled_producer_joins_it() {
        let stopped = Arc::new(AtomicBool::new(false));
        let pushed = Arc::new(AtomicUsize::new(0));
        let stopped_flag = Arc::clone(&stopped);
        let push_count = Arc::clone(&pushed);

        let cancel = CancellationToken::new();
        let stream = ListStream::spawn(&cancel, move |sink| {
            let mut i = 0u64;
            while sink.push(format!("{i}")) {
                push_count.fetch_add(1, Ordering::SeqCst);
                i += 1;
            }
            stopped_flag.store(true, Ordering::SeqCst);
        });

        while pushed.load(Ordering::SeqCst) < CHANNEL_CAPACITY {
            thread::yield_now();
        }
        // The worker is blocked mid-push; drop must still join it.
        // Returning at all proves the join completed.
        drop(stream);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn dropping_the_stream_leaves_the_callers_token_alone() {
        let cancel = CancellationToken::new();
        let stream = ListStream::spawn(&cancel, |sink| {
            sink.push("only".to_string());
        });
        drop(stream);
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn cancelling_before_iteration_ends_the_stream_quickly() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = ListStream::spawn(&cancel, |sink| {
            let mut i = 0u64;
            while sink.push(format!("{i}")) {
                i += 1;
            }
        });

        // The child token is born cancelled, so the producer stops at or
        // shortly after its first push.
        assert!(stream.count() <= CHANNEL_CAPACITY + 1);
    }

    #[test]
    fn sink_reports_cancellation() {
        let cancel = CancellationToken::new();
        let seen = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&seen);
        let stream = ListStream::spawn(&cancel, move |sink| {
            while !sink.is_cancelled() {
                std::thread::yield_now();
            }
            flag.store(true, Ordering::SeqCst);
        });

        cancel.cancel();
        drop(stream);
        assert!(seen.load(Ordering::SeqCst));
    }
}
