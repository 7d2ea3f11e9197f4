use crate::actuator::ActuatorClient;
use crate::events::{CoreEvent, EventBus};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Periodic liveness probe of the actuator service.
///
/// Other tasks read the current up/down flag synchronously through a watch
/// channel; its staleness window equals the poll interval. Events fire only
/// on up/down transitions, so notification volume is bounded by transitions
/// rather than polls.
pub struct HealthMonitor {
    rx: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl HealthMonitor {
    pub fn spawn(actuator: ActuatorClient, events: EventBus, poll_interval: Duration) -> Self {
        // Optimistic until the first probe lands, matching a fresh start
        // where the device is assumed reachable.
        let (tx, rx) = watch::channel(true);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut up = true;
            loop {
                let now_up = actuator.ping().await.is_ok();
                if now_up != up {
                    up = now_up;
                    let _ = tx.send(up);
                    if up {
                        info!("actuator service is back up");
                        events.publish(CoreEvent::ServiceUp);
                    } else {
                        warn!("actuator service appears to be down");
                        events.publish(CoreEvent::ServiceDown);
                    }
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        });

        Self { rx, cancel }
    }

    pub fn is_up(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn client_for(url: &str) -> ActuatorClient {
        let config = Config {
            api_base_url: url.to_string(),
            request_timeout_secs: 1,
            ping_timeout_secs: 1,
            ..Config::default()
        };
        ActuatorClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn reachable_service_reports_up_without_events() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/marco")
            .with_status(200)
            .with_body("pong")
            .create_async()
            .await;

        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let monitor = HealthMonitor::spawn(
            client_for(&server.url()),
            bus.clone(),
            Duration::from_millis(30),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(monitor.is_up());
        // Steady state: no transition, no events.
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
        monitor.shutdown();
    }

    #[tokio::test]
    async fn down_transition_fires_exactly_one_event() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/marco")
            .with_status(200)
            .with_body("pong")
            .create_async()
            .await;

        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let monitor = HealthMonitor::spawn(
            client_for(&server.url()),
            bus.clone(),
            Duration::from_millis(30),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(monitor.is_up());

        // Unregister the mock: subsequent probes hit a 501 and fail.
        server.reset_async().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!monitor.is_up());

        let mut down_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, CoreEvent::ServiceDown) {
                down_events += 1;
            }
        }
        assert_eq!(down_events, 1);
        monitor.shutdown();
    }

    #[tokio::test]
    async fn recovery_fires_a_service_up_event() {
        let mut server = mockito::Server::new_async().await;

        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let monitor = HealthMonitor::spawn(
            client_for(&server.url()),
            bus.clone(),
            Duration::from_millis(30),
        );

        // No /marco mock yet: probes fail, monitor goes down.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!monitor.is_up());

        server
            .mock("GET", "/marco")
            .with_status(200)
            .with_body("pong")
            .create_async()
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(monitor.is_up());

        let events: Vec<CoreEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.iter().any(|e| matches!(e, CoreEvent::ServiceDown)));
        assert!(events.iter().any(|e| matches!(e, CoreEvent::ServiceUp)));
        monitor.shutdown();
    }
}
