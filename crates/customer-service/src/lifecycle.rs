//! Service lifecycle: `Stopped → Starting → Running → Stopping → Stopped`.

use std::fmt;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, warn};

use storefront_infra::{
    CustomerProjectionError, EventStore, EventStoreError, InMemoryEventStore, MessageQueue,
    ProjectionWorker, QueueError, Receivers, WorkerHandle,
};

use crate::config::{ConfigError, ServiceConfig};
use crate::service::CustomerService;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: LifecycleState,
    },

    #[error("event subscription failed: {0}")]
    Subscribe(#[source] EventStoreError),

    #[error("failed to spawn projection worker: {0}")]
    Worker(#[source] std::io::Error),

    #[error("initial projection build failed: {0}")]
    Projection(#[source] CustomerProjectionError),

    #[error("failed to start request receivers: {0}")]
    Receivers(#[source] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("event store unavailable: {0}")]
    EventStore(String),

    #[error("lifecycle lock poisoned")]
    Poisoned,
}

/// Wires the event subscription, projection worker and request receivers of
/// one customer service instance, and starts/stops them symmetrically.
pub struct CustomerServiceController<Q>
where
    Q: MessageQueue,
{
    service: Arc<CustomerService>,
    receivers: Receivers<Q>,
    state: Mutex<LifecycleState>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl<Q> CustomerServiceController<Q>
where
    Q: MessageQueue,
{
    pub fn new(service_name: impl Into<String>, service: Arc<CustomerService>, queue: Q) -> Self {
        let receivers = Receivers::new(service_name, queue, service.handlers());
        Self {
            service,
            receivers,
            state: Mutex::new(LifecycleState::Stopped),
            worker: Mutex::new(None),
        }
    }

    /// Build the event store named by `config` and a service on top of it.
    pub fn from_config(config: &ServiceConfig, queue: Q) -> Result<Self, ServiceError> {
        let events = event_store(config)?;
        let service = Arc::new(CustomerService::with_topic(events, config.topic.clone()));
        Ok(Self::new(config.service_name.clone(), service, queue))
    }

    pub fn service(&self) -> &Arc<CustomerService> {
        &self.service
    }

    pub fn state(&self) -> LifecycleState {
        self.state.lock().map(|s| *s).unwrap_or(LifecycleState::Stopped)
    }

    /// Subscribe, build the projection and start accepting requests.
    ///
    /// Any failure is fatal: whatever was already started is torn down and the
    /// controller returns to `Stopped`.
    pub fn start(&self) -> Result<(), ServiceError> {
        let mut state = self.state.lock().map_err(|_| ServiceError::Poisoned)?;
        if *state != LifecycleState::Stopped {
            return Err(ServiceError::InvalidState {
                action: "start",
                state: *state,
            });
        }
        *state = LifecycleState::Starting;
        info!(service = %self.receivers.service(), topic = %self.service.topic(), "customer service starting");

        match self.start_components() {
            Ok(()) => {
                *state = LifecycleState::Running;
                info!(
                    service = %self.receivers.service(),
                    customers = self.service.projection().len(),
                    "customer service running"
                );
                Ok(())
            }
            Err(e) => {
                self.stop_components();
                *state = LifecycleState::Stopped;
                Err(e)
            }
        }
    }

    /// Block until the request loop terminates.
    pub fn wait(&self) {
        self.receivers.wait();
    }

    /// `start()` then block until stopped.
    pub fn run(&self) -> Result<(), ServiceError> {
        self.start()?;
        self.wait();
        Ok(())
    }

    /// Unsubscribe and stop accepting requests. Safe to call repeatedly.
    pub fn stop(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if *state != LifecycleState::Running {
            return;
        }
        *state = LifecycleState::Stopping;
        info!(service = %self.receivers.service(), "customer service stopping");

        self.stop_components();

        *state = LifecycleState::Stopped;
        info!(service = %self.receivers.service(), "customer service stopped");
    }

    fn start_components(&self) -> Result<(), ServiceError> {
        let events = self.service.events();
        let subscription = events
            .subscribe(self.service.topic())
            .map_err(ServiceError::Subscribe)?;
        let subscription_id = subscription.id();

        let service = self.service.clone();
        let worker = ProjectionWorker::spawn("customer-projection", subscription, move |env| {
            service.apply_event(&env)
        });
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                events.unsubscribe(self.service.topic(), subscription_id);
                return Err(ServiceError::Worker(e));
            }
        };
        *self.worker.lock().map_err(|_| ServiceError::Poisoned)? = Some(worker);

        // Subscribed first: anything published from here on is either in the
        // history loaded below or delivered live (duplicates are skipped).
        self.service
            .projection()
            .catch_up(&**events)
            .map_err(ServiceError::Projection)?;

        self.receivers.start().map_err(ServiceError::Receivers)
    }

    fn stop_components(&self) {
        let worker = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        if let Some(worker) = worker {
            if !self
                .service
                .events()
                .unsubscribe(self.service.topic(), worker.subscription_id())
            {
                warn!(subscription = %worker.subscription_id(), "subscription was already gone");
            }
            worker.shutdown();
        }

        self.receivers.stop();
    }
}

impl<Q> Drop for CustomerServiceController<Q>
where
    Q: MessageQueue,
{
    fn drop(&mut self) {
        self.stop();
    }
}

/// In-memory store by default; Redis Streams when persistent stores are requested.
pub fn event_store(config: &ServiceConfig) -> Result<Arc<dyn EventStore>, ServiceError> {
    if !config.use_persistent_stores {
        return Ok(Arc::new(InMemoryEventStore::new()));
    }

    persistent_event_store(config)
}

#[cfg(feature = "redis")]
fn persistent_event_store(config: &ServiceConfig) -> Result<Arc<dyn EventStore>, ServiceError> {
    let store = storefront_infra::event_store::RedisEventStore::new(&config.redis_url, None)
        .map_err(|e| ServiceError::EventStore(e.to_string()))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
fn persistent_event_store(_config: &ServiceConfig) -> Result<Arc<dyn EventStore>, ServiceError> {
    Err(ConfigError::FeatureDisabled("USE_PERSISTENT_STORES", "redis").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storefront_customers::{Customer, CustomerEvent};
    use storefront_infra::{InMemoryMessageQueue, UncommittedEvent, send_message};

    fn controller() -> (
        CustomerServiceController<Arc<InMemoryMessageQueue>>,
        Arc<InMemoryMessageQueue>,
    ) {
        let queue = Arc::new(InMemoryMessageQueue::new());
        let controller =
            CustomerServiceController::from_config(&ServiceConfig::default(), queue.clone()).unwrap();
        (controller, queue)
    }

    #[test]
    fn start_and_stop_walk_the_states() {
        let (controller, queue) = controller();
        assert_eq!(controller.state(), LifecycleState::Stopped);

        controller.start().unwrap();
        assert_eq!(controller.state(), LifecycleState::Running);
        assert!(queue.is_bound("customer-service"));

        controller.stop();
        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert!(!queue.is_bound("customer-service"));

        // Idempotent.
        controller.stop();
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }

    #[test]
    fn start_twice_is_an_invalid_transition() {
        let (controller, _) = controller();
        controller.start().unwrap();
        assert!(matches!(
            controller.start(),
            Err(ServiceError::InvalidState { action: "start", state: LifecycleState::Running })
        ));
        controller.stop();
    }

    #[test]
    fn receiver_failure_aborts_startup() {
        let (controller, queue) = controller();
        // Someone else already holds the service name.
        let _squatter = queue.bind("customer-service").unwrap();

        assert!(matches!(controller.start(), Err(ServiceError::Receivers(_))));
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }

    #[test]
    fn undecodable_history_does_not_block_startup() {
        let (controller, queue) = controller();
        let events = controller.service().events().clone();
        let shell = CustomerEvent::created(Customer::create("Bob", "b@x.com"));
        events
            .publish(UncommittedEvent::from_event("customer", &shell, json!({"name": "no id"})))
            .unwrap();
        let alice = CustomerEvent::created(Customer::create("Alice", "a@x.com"));
        events
            .publish(UncommittedEvent::from_event("customer", &alice, alice.payload().unwrap()))
            .unwrap();

        controller.start().unwrap();
        assert_eq!(controller.state(), LifecycleState::Running);
        assert_eq!(controller.service().projection().len(), 1);

        let reply = send_message(&*queue, "customer-service", "get_customers", json!({})).unwrap();
        assert_eq!(reply["result"][0]["name"], "Alice");
        controller.stop();
    }

    #[test]
    fn can_restart_after_stop() {
        let (controller, queue) = controller();
        controller.start().unwrap();
        controller.stop();
        controller.start().unwrap();

        let reply = send_message(&*queue, "customer-service", "get_customers", json!({})).unwrap();
        assert_eq!(reply, json!({"result": []}));
        controller.stop();
    }

    #[test]
    fn persistent_stores_need_the_redis_feature() {
        let config = ServiceConfig {
            use_persistent_stores: true,
            ..ServiceConfig::default()
        };
        let result = event_store(&config);
        if cfg!(feature = "redis") {
            assert!(result.is_ok());
        } else {
            assert!(matches!(result, Err(ServiceError::Config(ConfigError::FeatureDisabled(..)))));
        }
    }
}
