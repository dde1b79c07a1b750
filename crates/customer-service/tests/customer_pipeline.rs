//! End-to-end: queue client → receivers → handlers → event store → worker → projection.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value as JsonValue, json};

use storefront_customer_service::{CustomerServiceController, LifecycleState, ServiceConfig};
use storefront_infra::{InMemoryMessageQueue, send_message};

const SERVICE: &str = "customer-service";

struct Harness {
    queue: Arc<InMemoryMessageQueue>,
    controller: Arc<CustomerServiceController<Arc<InMemoryMessageQueue>>>,
}

impl Harness {
    fn start() -> Self {
        let queue = Arc::new(InMemoryMessageQueue::with_timeout(Duration::from_secs(2)));
        let controller = Arc::new(
            CustomerServiceController::from_config(&ServiceConfig::default(), queue.clone()).unwrap(),
        );
        controller.start().unwrap();
        Self { queue, controller }
    }

    fn call(&self, method: &str, payload: JsonValue) -> JsonValue {
        send_message(&*self.queue, SERVICE, method, payload).unwrap()
    }

    /// The projection is updated asynchronously; poll the listing.
    fn list_eventually(&self, check: impl Fn(&[JsonValue]) -> bool) -> Vec<JsonValue> {
        for _ in 0..100 {
            let reply = self.call("get_customers", json!({}));
            let items = reply["result"].as_array().cloned().unwrap_or_default();
            if check(&items) {
                return items;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("projection did not converge within timeout");
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.controller.stop();
    }
}

#[test]
fn create_list_delete_get_scenario() {
    let h = Harness::start();

    let created = h.call("post_customers", json!({"name": "Alice", "email": "alice@example.com"}));
    let id = created["result"][0].as_str().unwrap().to_string();

    let items = h.list_eventually(|items| items.iter().any(|c| c["entity_id"] == id));
    assert_eq!(items[0]["name"], "Alice");
    assert_eq!(items[0]["email"], "alice@example.com");

    assert_eq!(h.call("delete_customer", json!({"entity_id": id})), json!({"result": true}));
    assert_eq!(
        h.call("get_customers", json!({"entity_id": id})),
        json!({"error": "could not find customer"})
    );

    h.list_eventually(|items| items.is_empty());
}

#[test]
fn returned_ids_appear_in_the_listing() {
    let h = Harness::start();

    let created = h.call(
        "post_customers",
        json!([
            {"name": "Bob", "email": "bob@example.com"},
            {"name": "Carol", "email": "carol@example.com"},
        ]),
    );
    let ids: Vec<JsonValue> = created["result"].as_array().unwrap().clone();
    assert_eq!(ids.len(), 2);

    let items = h.list_eventually(|items| items.len() == 2);
    for id in &ids {
        assert!(items.iter().any(|c| &c["entity_id"] == id));
    }
}

#[test]
fn update_is_visible_after_delivery() {
    let h = Harness::start();

    let created = h.call("post_customers", json!({"name": "Dave", "email": "dave@old.com"}));
    let id = created["result"][0].clone();
    h.list_eventually(|items| items.len() == 1);

    let reply = h.call(
        "put_customer",
        json!({"entity_id": id, "name": "Dave", "email": "dave@new.com"}),
    );
    assert_eq!(reply, json!({"result": true}));

    h.list_eventually(|items| items.len() == 1 && items[0]["email"] == "dave@new.com");
}

#[test]
fn validation_errors_are_replies() {
    let h = Harness::start();

    assert_eq!(
        h.call("post_customers", json!({"name": "NoEmail"})),
        json!({"error": "missing mandatory parameter 'name' and/or 'email'"})
    );
    assert_eq!(
        h.call("delete_customer", json!({"entity_id": "00000000-0000-0000-0000-000000000000"})),
        json!({"error": "could not find customer"})
    );
    assert_eq!(
        h.call("rename_customer", json!({})),
        json!({"error": "unknown method 'rename_customer'"})
    );
    assert!(h.call("get_customers", json!({}))["result"].as_array().unwrap().is_empty());
}

#[test]
fn restart_rebuilds_from_history() {
    let h = Harness::start();
    h.call("post_customers", json!({"name": "Erin", "email": "erin@example.com"}));
    h.list_eventually(|items| items.len() == 1);

    h.controller.stop();
    assert_eq!(h.controller.state(), LifecycleState::Stopped);
    assert!(send_message(&*h.queue, SERVICE, "get_customers", json!({})).is_err());

    h.controller.start().unwrap();
    let items = h.list_eventually(|items| items.len() == 1);
    assert_eq!(items[0]["name"], "Erin");
}

#[test]
fn run_blocks_until_stopped() {
    let queue = Arc::new(InMemoryMessageQueue::new());
    let controller = Arc::new(
        CustomerServiceController::from_config(&ServiceConfig::default(), queue.clone()).unwrap(),
    );

    let runner = {
        let controller = controller.clone();
        std::thread::spawn(move || controller.run())
    };

    for _ in 0..100 {
        if controller.state() == LifecycleState::Running {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(controller.state(), LifecycleState::Running);

    controller.stop();
    runner.join().unwrap().unwrap();
}
