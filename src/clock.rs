use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Injected time source (design note §9: "inject a ... clock interface into
/// the reconciler to allow deterministic tests of delayed requeues and
/// verification polls").
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
    /// Suspend the caller for `d`. The real clock sleeps; the frozen test
    /// clock returns immediately and advances its own notion of time, so
    /// tests of delayed requeues never actually wait.
    fn sleep(&self, d: Duration) -> futures_util::future::BoxFuture<'static, ()>;
}

#[derive(Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    fn sleep(&self, d: Duration) -> futures_util::future::BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(d))
    }
}

/// Test double: advances only when explicitly told to, and never sleeps.
pub struct FrozenClock {
    now: AtomicI64,
}

impl FrozenClock {
    pub fn new(start_millis: i64) -> Self {
        FrozenClock {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.now.fetch_add(d.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for FrozenClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep(&self, d: Duration) -> futures_util::future::BoxFuture<'static, ()> {
        self.advance(d);
        Box::pin(async {})
    }
}
