use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use super::{Inbox, MessageQueue, QueueError, Request, Response};

/// Handler function type: request payload in, `{"result"|"error"}` mapping out.
pub type Handler = Arc<dyn Fn(JsonValue) -> JsonValue + Send + Sync>;

/// A handler registered under a method name.
#[derive(Clone)]
pub struct NamedHandler {
    name: String,
    handler: Handler,
}

impl NamedHandler {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(JsonValue) -> JsonValue + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for NamedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedHandler").field("name", &self.name).finish()
    }
}

#[derive(Debug)]
struct Running {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

/// Request receiver for one service.
///
/// `start()` binds the service inbox and spawns a dispatch thread that routes
/// each call to the handler registered for its method. `wait()` blocks until
/// that loop ends; `stop()` ends it and releases the service name.
pub struct Receivers<Q> {
    service: String,
    queue: Q,
    handlers: Arc<HashMap<String, Handler>>,
    running: Mutex<Option<Running>>,
}

impl<Q> Receivers<Q>
where
    Q: MessageQueue,
{
    pub fn new(service: impl Into<String>, queue: Q, handlers: Vec<NamedHandler>) -> Self {
        let handlers = handlers
            .into_iter()
            .map(|h| (h.name, h.handler))
            .collect::<HashMap<_, _>>();

        Self {
            service: service.into(),
            queue,
            handlers: Arc::new(handlers),
            running: Mutex::new(None),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| r.is_some()).unwrap_or(false)
    }

    /// Bind the inbox and start dispatching.
    pub fn start(&self) -> Result<(), QueueError> {
        let mut running = self.running.lock().map_err(|_| QueueError::Poisoned)?;
        if running.is_some() {
            return Err(QueueError::AlreadyBound(self.service.clone()));
        }

        let inbox = self.queue.bind(&self.service)?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let handlers = self.handlers.clone();

        let join = thread::Builder::new()
            .name(format!("{}-receivers", self.service))
            .spawn(move || dispatch_loop(inbox, shutdown_rx, &handlers));

        let join = match join {
            Ok(join) => join,
            Err(e) => {
                self.queue.unbind(&self.service);
                return Err(QueueError::Disconnected(format!(
                    "{}: failed to spawn dispatch thread: {e}",
                    self.service
                )));
            }
        };

        info!(service = %self.service, methods = ?self.methods(), "receivers started");
        *running = Some(Running {
            shutdown: shutdown_tx,
            join: Some(join),
        });
        Ok(())
    }

    /// Block until the dispatch loop ends (after `stop()` or when the inbox closes).
    ///
    /// Returns immediately if the receivers are not running.
    pub fn wait(&self) {
        let join = match self.running.lock() {
            Ok(mut running) => running.as_mut().and_then(|r| r.join.take()),
            Err(_) => None,
        };
        if let Some(join) = join {
            let _ = join.join();
        }
    }

    /// Stop dispatching and release the service name. Idempotent.
    pub fn stop(&self) {
        let running = match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(_) => None,
        };
        let Some(mut running) = running else {
            return;
        };

        let _ = running.shutdown.send(());
        self.queue.unbind(&self.service);
        if let Some(join) = running.join.take() {
            let _ = join.join();
        }
        info!(service = %self.service, "receivers stopped");
    }
}

impl<Q> Drop for Receivers<Q> {
    fn drop(&mut self) {
        if let Ok(running) = self.running.get_mut() {
            if let Some(running) = running.take() {
                let _ = running.shutdown.send(());
            }
        }
    }
}

fn dispatch_loop(inbox: Inbox, shutdown_rx: mpsc::Receiver<()>, handlers: &HashMap<String, Handler>) {
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match inbox.recv_timeout(tick) {
            Ok(request) => dispatch(inbox.service(), handlers, request),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn dispatch(service: &str, handlers: &HashMap<String, Handler>, request: Request) {
    let (method, payload, reply) = request.into_parts();

    let response = match handlers.get(&method) {
        Some(handler) => {
            debug!(service, %method, "dispatching request");
            handler(payload)
        }
        None => {
            warn!(service, %method, "unknown method");
            Response::error(format!("unknown method '{method}'"))
        }
    };

    if reply.send(response).is_err() {
        debug!(service, %method, "caller gave up before the reply");
    }
}
