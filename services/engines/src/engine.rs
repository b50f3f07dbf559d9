//! The message engine core
//!
//! A bounded `tokio::sync::mpsc` queue with a single consumer task. Both
//! live engines (execution, risk) are instances of this machine with
//! different handlers plugged in.
//!
//! Shutdown semantics:
//! - `stop` clears the running flag and, only on a true→false transition,
//!   enqueues the typed `Stop` sentinel; the consumer drains everything
//!   ahead of the sentinel, observes the cleared flag, and exits.
//! - `kill` clears the flag *before* delegating to `stop`, which suppresses
//!   the sentinel (the consumer is aborted; a sentinel would sit unread),
//!   aborts the consumer task, and logs the residual queue depth. Residual
//!   messages are discarded, never processed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use types::commands::TradingCommand;
use types::events::ExecutionEvent;

/// A queued message: a command, an event, or the shutdown sentinel
#[derive(Debug, Clone)]
pub enum EngineMessage {
    Command(TradingCommand),
    Event(ExecutionEvent),
    /// Typed close signal; wakes the consumer to re-check the running flag.
    Stop,
}

/// Consumer-side dispatch target
#[async_trait]
pub trait MessageHandler: Send {
    async fn handle_command(&mut self, command: TradingCommand);
    async fn handle_event(&mut self, event: ExecutionEvent);
}

/// Message engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub name: String,
    /// Queue capacity; producers block cooperatively beyond it.
    pub qsize: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "MessageEngine".to_string(),
            qsize: 10_000,
        }
    }
}

/// Bounded FIFO queue plus one consumer task
pub struct MessageEngine {
    name: String,
    tx: mpsc::Sender<EngineMessage>,
    rx: Option<mpsc::Receiver<EngineMessage>>,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    command_count: Arc<AtomicU64>,
    event_count: Arc<AtomicU64>,
}

impl MessageEngine {
    pub fn new(config: EngineConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.qsize);
        Self {
            name: config.name,
            tx,
            rx: Some(rx),
            running: Arc::new(AtomicBool::new(false)),
            task: None,
            command_count: Arc::new(AtomicU64::new(0)),
            event_count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current queue depth
    pub fn qsize(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Messages dispatched as commands so far
    pub fn command_count(&self) -> u64 {
        self.command_count.load(Ordering::SeqCst)
    }

    /// Messages dispatched as events so far
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    /// Enqueue a command
    pub async fn execute(&self, command: TradingCommand) {
        self.send(EngineMessage::Command(command)).await;
    }

    /// Enqueue an event
    pub async fn process(&self, event: ExecutionEvent) {
        self.send(EngineMessage::Event(event)).await;
    }

    /// Enqueue, blocking cooperatively when the queue is full; never drops
    async fn send(&self, message: EngineMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(
                    engine = %self.name,
                    qsize = self.qsize(),
                    "Queue full: blocking until space appears"
                );
                if self.tx.send(message).await.is_err() {
                    error!(engine = %self.name, "Queue closed; message dropped");
                }
            }
            Err(TrySendError::Closed(_)) => {
                error!(engine = %self.name, "Queue closed; message dropped");
            }
        }
    }

    /// Mark running and spawn the consumer task
    pub fn start<H: MessageHandler + 'static>(&mut self, mut handler: H) {
        let Some(mut rx) = self.rx.take() else {
            warn!(engine = %self.name, "Already started");
            return;
        };
        self.running.store(true, Ordering::SeqCst);

        let name = self.name.clone();
        let running = Arc::clone(&self.running);
        let command_count = Arc::clone(&self.command_count);
        let event_count = Arc::clone(&self.event_count);

        self.task = Some(tokio::spawn(async move {
            debug!(engine = %name, "Consumer started");
            while let Some(message) = rx.recv().await {
                match message {
                    EngineMessage::Stop => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        // Sentinel while still running: keep consuming.
                    }
                    EngineMessage::Command(command) => {
                        command_count.fetch_add(1, Ordering::SeqCst);
                        handler.handle_command(command).await;
                    }
                    EngineMessage::Event(event) => {
                        event_count.fetch_add(1, Ordering::SeqCst);
                        handler.handle_event(event).await;
                    }
                }
            }
            debug!(engine = %name, "Consumer stopped");
        }));
    }

    /// Graceful shutdown: clear the flag and wake the consumer with the
    /// sentinel (only on a true→false transition)
    pub async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.tx.send(EngineMessage::Stop).await;
        }
    }

    /// Abrupt shutdown: abort the consumer; residual messages are discarded
    pub async fn kill(&mut self) {
        warn!(engine = %self.name, "Killing engine");
        // Clearing the flag first suppresses stop's sentinel enqueue: the
        // consumer is being aborted, nothing would ever read it.
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        let residual = self.qsize();
        if residual > 0 {
            warn!(engine = %self.name, residual, "Discarding residual messages");
        }
        self.stop().await;
    }

    /// Await consumer termination (after `stop`)
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use types::commands::SubmitOrder;
    use types::events::OrderEvent;
    use types::ids::{ClientOrderId, InstrumentId};
    use types::numeric::{Price, Quantity};
    use types::order::{Order, OrderSide, TimeInForce};

    fn command(id: &str) -> TradingCommand {
        TradingCommand::Submit(SubmitOrder::new(
            Order::limit(
                ClientOrderId::new(id),
                InstrumentId::new("BTC/USDT"),
                OrderSide::BUY,
                Quantity::from_str("1.0").unwrap(),
                Price::from_u64(100),
                TimeInForce::GTC,
                1,
            ),
            1,
        ))
    }

    fn event(id: &str) -> ExecutionEvent {
        ExecutionEvent::Order(OrderEvent::Submitted {
            client_order_id: ClientOrderId::new(id),
            ts_event_ns: 1,
        })
    }

    /// Records dispatch order for FIFO assertions.
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle_command(&mut self, command: TradingCommand) {
            if let TradingCommand::Submit(submit) = command {
                self.log
                    .lock()
                    .unwrap()
                    .push(format!("cmd:{}", submit.order.client_order_id));
            }
        }

        async fn handle_event(&mut self, event: ExecutionEvent) {
            if let ExecutionEvent::Order(order_event) = event {
                self.log
                    .lock()
                    .unwrap()
                    .push(format!("evt:{}", order_event.client_order_id()));
            }
        }
    }

    #[tokio::test]
    async fn full_queue_blocks_producer_until_consumer_drains() {
        let mut engine = MessageEngine::new(EngineConfig {
            name: "test".to_string(),
            qsize: 1,
        });

        engine.execute(command("O-1")).await;
        assert_eq!(engine.qsize(), 1);
        assert_eq!(engine.command_count(), 0);

        // The second producer blocks; it must not drop the message.
        let tx = engine.tx.clone();
        let blocked = tokio::spawn(async move {
            tx.send(EngineMessage::Command(command("O-2"))).await.unwrap();
        });
        tokio::task::yield_now().await;
        assert!(!blocked.is_finished());
        assert_eq!(engine.qsize(), 1);

        let log = Arc::new(Mutex::new(Vec::new()));
        engine.start(Recorder { log: Arc::clone(&log) });
        blocked.await.unwrap();

        engine.stop().await;
        engine.join().await;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["cmd:O-1".to_string(), "cmd:O-2".to_string()]
        );
    }

    #[tokio::test]
    async fn fifo_order_within_one_engine() {
        let mut engine = MessageEngine::new(EngineConfig::default());
        engine.execute(command("O-1")).await;
        engine.process(event("O-2")).await;
        engine.execute(command("O-3")).await;

        let log = Arc::new(Mutex::new(Vec::new()));
        engine.start(Recorder { log: Arc::clone(&log) });
        engine.stop().await;
        engine.join().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "cmd:O-1".to_string(),
                "evt:O-2".to_string(),
                "cmd:O-3".to_string()
            ]
        );
        assert_eq!(engine.command_count(), 2);
        assert_eq!(engine.event_count(), 1);
    }

    #[tokio::test]
    async fn stop_drains_to_sentinel_then_exits() {
        let mut engine = MessageEngine::new(EngineConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        engine.start(Recorder { log: Arc::clone(&log) });
        assert!(engine.is_running());

        engine.execute(command("O-1")).await;
        engine.stop().await;
        engine.join().await;

        assert!(!engine.is_running());
        // Everything ahead of the sentinel was processed.
        assert_eq!(*log.lock().unwrap(), vec!["cmd:O-1".to_string()]);
        assert_eq!(engine.qsize(), 0);
    }

    #[tokio::test]
    async fn kill_discards_residual_messages() {
        let mut engine = MessageEngine::new(EngineConfig::default());

        engine.execute(command("O-1")).await;
        engine.execute(command("O-2")).await;
        engine.kill().await;

        assert!(!engine.is_running());
        // Never started, so nothing was consumed; residuals stay unread.
        assert_eq!(engine.command_count(), 0);
        assert_eq!(engine.qsize(), 2);
    }

    #[tokio::test]
    async fn kill_while_running_aborts_consumer() {
        let mut engine = MessageEngine::new(EngineConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        engine.start(Recorder { log: Arc::clone(&log) });
        tokio::task::yield_now().await;

        engine.kill().await;
        assert!(!engine.is_running());

        // The consumer is gone; a further send is dropped with an error log.
        engine.execute(command("O-3")).await;
        assert_eq!(engine.command_count(), 0);
    }

    #[tokio::test]
    async fn start_twice_is_harmless() {
        let mut engine = MessageEngine::new(EngineConfig::default());
        let log = Arc::new(Mutex::new(Vec::new()));
        engine.start(Recorder { log: Arc::clone(&log) });
        engine.start(Recorder { log: Arc::clone(&log) }); // no second consumer

        engine.execute(command("O-1")).await;
        engine.stop().await;
        engine.join().await;
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
