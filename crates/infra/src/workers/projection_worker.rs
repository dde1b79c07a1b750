use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use storefront_events::{Subscription, SubscriptionId};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    subscription_id: SubscriptionId,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Id of the subscription the worker drains.
    pub fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Generic projection worker loop.
///
/// - Drains an event subscription on its own thread
/// - Applies an idempotent handler for each message
/// - Stops on shutdown request or when the subscription disconnects
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawn a worker thread that processes messages from `subscription`.
    ///
    /// `handler` must be idempotent (at-least-once delivery safe). Its errors are
    /// logged and the loop carries on.
    pub fn spawn<M, H, E>(
        name: &str,
        subscription: Subscription<M>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: Send + 'static,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let subscription_id = subscription.id();
        let worker = name.to_string();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(&worker, subscription, shutdown_rx, &mut handler))?;

        Ok(WorkerHandle {
            subscription_id,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    handler: &mut H,
) where
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = %err, "projection worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker = name, subscription = %sub.id(), "projection worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use storefront_events::{EventBus, InMemoryEventBus};

    #[test]
    fn applies_messages_until_shutdown() {
        let bus = InMemoryEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let handle = ProjectionWorker::spawn("test-worker", bus.subscribe(), move |n: u32| {
            sink.lock().unwrap().push(n);
            Ok::<_, String>(())
        })
        .unwrap();

        for n in 1..=3 {
            bus.publish(n).unwrap();
        }

        for _ in 0..100 {
            if seen.lock().unwrap().len() == 3 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn handler_errors_do_not_stop_the_loop() {
        let bus = InMemoryEventBus::new();
        let count = Arc::new(Mutex::new(0));

        let c = count.clone();
        let handle = ProjectionWorker::spawn("failing-worker", bus.subscribe(), move |_: u8| {
            *c.lock().unwrap() += 1;
            Err("boom")
        })
        .unwrap();

        bus.publish(1).unwrap();
        bus.publish(2).unwrap();

        for _ in 0..100 {
            if *count.lock().unwrap() == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn exits_when_the_subscription_disconnects() {
        let bus = InMemoryEventBus::<u8>::new();
        let sub = bus.subscribe();
        let id = sub.id();
        let handle = ProjectionWorker::spawn("short-lived", sub, |_| Ok::<_, String>(())).unwrap();

        assert!(bus.unsubscribe(id));
        for _ in 0..100 {
            if handle.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished());
        handle.shutdown();
    }
}
