//! Compile-time prelude coverage test.
use std::time::Duration;
use stormwall::prelude::*;

struct Ping;

#[async_trait]
impl Runner for Ping {
    type Output = &'static str;
    type Error = std::io::Error;

    async fn run(&self, result: ResultSender<&'static str, std::io::Error>) {
        let _ = result.ok("pong");
    }

    async fn fallback(
        &self,
        _cause: CommandError<std::io::Error>,
        result: ResultSender<&'static str, std::io::Error>,
    ) {
        let _ = result.ok("degraded");
    }

    fn pool_name(&self) -> &str {
        "ping"
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(100)
    }
}

#[tokio::test]
async fn prelude_reexports_core_types() {
    let breaker = CircuitBreakerConfig::new(50, 20, Duration::from_secs(5)).expect("valid breaker");
    let config = PoolConfig::new(2).and_then(|c| c.with_breaker(breaker)).expect("valid pool");
    let registry = PoolRegistry::builder().pool("ping", config).build().expect("registry");

    let sink = MemorySink::new();
    let rx: ResultReceiver<_, _> = Command::new(Ping, &registry).with_sink(sink.clone()).queue();
    assert_eq!(rx.await.expect("command failed"), "pong");
    assert!(matches!(sink.events()[0], CommandEvent::Succeeded { .. }));

    let _ = Command::new(Ping, &registry).with_sink(LogSink).execute().await;
    let _ = Command::new(Ping, &registry).with_sink(NullSink).execute().await;
    let state = registry.get("ping").map(|p| p.breaker().current_state());
    assert_eq!(state, Some(Some(CircuitState::Closed)));
    let _: Option<FallbackTimeout> = None;
}
