//! Generic, window-coalescing debouncer.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

struct InProgress<P> {
    accumulated: P,
    generation: u64,
}

/// Coalesces rapid `schedule(p)` calls within a fixed window `D` into a
/// single `emit` call, folding parameters with `combine`.
///
/// `combine(older, newer)` is called left-to-right across a run of
/// coalesced calls within one window; it need only be correct as a left
/// fold, not commutative or associative in general.
pub struct Debouncer<P>
where
    P: Send + 'static,
{
    window: Duration,
    combine: Arc<dyn Fn(P, P) -> P + Send + Sync>,
    emit: Arc<dyn Fn(P) -> futures_emit::BoxFuture + Send + Sync>,
    in_progress: Arc<Mutex<Option<InProgress<P>>>>,
    generation: Arc<std::sync::atomic::AtomicU64>,
}

// A tiny local boxed-future alias so this module does not need the
// `futures` crate just for `BoxFuture`.
mod futures_emit {
    use std::future::Future;
    use std::pin::Pin;
    pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<P> Debouncer<P>
where
    P: Send + 'static,
{
    /// Build a debouncer with window `window`, combinator `combine`, and
    /// async callback `emit`.
    pub fn new<C, E, Fut>(window: Duration, combine: C, emit: E) -> Self
    where
        C: Fn(P, P) -> P + Send + Sync + 'static,
        E: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            window,
            combine: Arc::new(combine),
            emit: Arc::new(move |p| Box::pin(emit(p))),
            in_progress: Arc::new(Mutex::new(None)),
            generation: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    /// Schedule `p`. If no emission is pending, starts a fresh window. If
    /// one is already pending, cancels its timer and folds `p` into the
    /// accumulated parameter under a new timer.
    pub async fn schedule(&self, p: P) {
        let mut guard = self.in_progress.lock().await;
        let accumulated = match guard.take() {
            Some(prev) => (self.combine)(prev.accumulated, p),
            None => p,
        };
        let generation = self.generation.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        *guard = Some(InProgress {
            accumulated,
            generation,
        });
        drop(guard);

        let window = self.window;
        let in_progress = Arc::clone(&self.in_progress);
        let emit = Arc::clone(&self.emit);
        tokio::spawn(async move {
            tokio::time::sleep_until(Instant::now() + window).await;
            let fired = {
                let mut guard = in_progress.lock().await;
                match guard.take() {
                    Some(state) if state.generation == generation => Some(state.accumulated),
                    Some(state) => {
                        // A newer schedule superseded us while we slept;
                        // put it back and let that timer fire instead.
                        *guard = Some(state);
                        None
                    }
                    None => None,
                }
            };
            if let Some(p) = fired {
                (emit)(p).await;
            }
        });
    }

    /// Whether an emission is currently pending.
    pub async fn has_pending(&self) -> bool {
        self.in_progress.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn test_single_schedule_emits_once() {
        let emitted: Arc<Mutex<Vec<Vec<u32>>>> = Arc::new(Mutex::new(Vec::new()));
        let emitted2 = Arc::clone(&emitted);
        let debouncer = Debouncer::new(
            StdDuration::from_millis(20),
            |mut a: Vec<u32>, b: Vec<u32>| {
                a.extend(b);
                a
            },
            move |p| {
                let emitted = Arc::clone(&emitted2);
                async move {
                    emitted.lock().await.push(p);
                }
            },
        );
        debouncer.schedule(vec![1]).await;
        tokio::time::sleep(StdDuration::from_millis(60)).await;
        let got = emitted.lock().await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0], vec![1]);
    }

    #[tokio::test]
    async fn test_coalesces_calls_within_window() {
        let emit_count = Arc::new(AtomicUsize::new(0));
        let last: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let count2 = Arc::clone(&emit_count);
        let last2 = Arc::clone(&last);
        let debouncer = Debouncer::new(
            StdDuration::from_millis(50),
            |mut a: Vec<u32>, b: Vec<u32>| {
                a.extend(b);
                a
            },
            move |p: Vec<u32>| {
                let count = Arc::clone(&count2);
                let last = Arc::clone(&last2);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    *last.lock().await = p;
                }
            },
        );

        debouncer.schedule(vec![1]).await;
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        debouncer.schedule(vec![2]).await;
        tokio::time::sleep(StdDuration::from_millis(100)).await;

        assert_eq!(emit_count.load(Ordering::SeqCst), 1);
        assert_eq!(*last.lock().await, vec![1, 2]);
    }
}
