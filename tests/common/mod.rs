//! Scriptable runner shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stormwall::{CommandError, ResultSender, Runner};
use tokio::sync::{Notify, Semaphore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestError(pub String);

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TestError {}

#[derive(Clone, Debug)]
pub enum Work {
    Succeed(u32),
    Fail(&'static str),
    /// Sleep, then deliver the value.
    Sleep(Duration, u32),
    /// Wait for a permit on the gate, then deliver the value.
    Gated(Arc<Semaphore>, u32),
    /// Return without writing anything.
    DropSender,
}

/// Counters observed from outside the runner.
#[derive(Debug, Default)]
pub struct Tally {
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub causes: Mutex<Vec<String>>,
    pub started_signal: Notify,
}

impl Tally {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn causes(&self) -> Vec<String> {
        self.causes.lock().unwrap().clone()
    }

    /// Wait until at least `n` runs have started.
    pub async fn wait_started(&self, n: usize) {
        loop {
            let notified = self.started_signal.notified();
            if self.started() >= n {
                return;
            }
            notified.await;
        }
    }
}

pub struct ScriptedRunner {
    pub pool: &'static str,
    pub timeout: Duration,
    pub work: Work,
    /// Value the fallback writes.
    pub fallback_value: u32,
    /// How long the fallback sleeps before writing.
    pub fallback_delay: Option<Duration>,
    pub tally: Arc<Tally>,
}

impl ScriptedRunner {
    pub fn new(pool: &'static str, work: Work) -> Self {
        Self {
            pool,
            timeout: Duration::from_secs(5),
            work,
            fallback_value: 0,
            fallback_delay: None,
            tally: Arc::new(Tally::default()),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn fallback_value(mut self, value: u32) -> Self {
        self.fallback_value = value;
        self
    }

    pub fn fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = Some(delay);
        self
    }

    pub fn tally(mut self, tally: Arc<Tally>) -> Self {
        self.tally = tally;
        self
    }
}

struct RunningGuard<'a>(&'a Tally);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
        self.0.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Runner for ScriptedRunner {
    type Output = u32;
    type Error = TestError;

    async fn run(&self, result: ResultSender<u32, TestError>) {
        let tally = &self.tally;
        let now = tally.running.fetch_add(1, Ordering::SeqCst) + 1;
        tally.max_running.fetch_max(now, Ordering::SeqCst);
        tally.started.fetch_add(1, Ordering::SeqCst);
        tally.started_signal.notify_waiters();
        let guard = RunningGuard(tally);

        let outcome = match &self.work {
            Work::Succeed(v) => Ok(*v),
            Work::Fail(msg) => Err(TestError(msg.to_string())),
            Work::Sleep(d, v) => {
                tokio::time::sleep(*d).await;
                Ok(*v)
            }
            Work::Gated(gate, v) => match gate.acquire().await {
                Ok(_permit) => Ok(*v),
                Err(_) => Err(TestError("gate closed".into())),
            },
            Work::DropSender => return,
        };
        // Leave the running set before the write so the next admitted call
        // never overlaps this one in the counters.
        drop(guard);
        let _ = result.send(outcome);
    }

    async fn fallback(&self, cause: CommandError<TestError>, result: ResultSender<u32, TestError>) {
        self.tally.causes.lock().unwrap().push(cause.reason().to_string());
        if let Some(delay) = self.fallback_delay {
            tokio::time::sleep(delay).await;
        }
        let _ = result.ok(self.fallback_value);
    }

    fn pool_name(&self) -> &str {
        self.pool
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
