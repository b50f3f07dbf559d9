//! Live execution engine
//!
//! Consumes execution events and trading commands through the bounded
//! queue. Events are persisted through the object cache and forwarded
//! downstream (typically the risk engine or a portfolio feed); commands are
//! forwarded to the execution client driving the venue.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::warn;

use object_cache::ObjectCache;
use types::commands::TradingCommand;
use types::events::{ExecutionEvent, OrderEvent};
use types::ids::PositionId;

use crate::engine::{EngineConfig, MessageEngine, MessageHandler};

/// Cache-and-forward handler for the execution engine
pub struct ExecutionHandler {
    cache: ObjectCache,
    /// Commands travel on to the execution client (the venue).
    commands_out: mpsc::Sender<TradingCommand>,
    /// Events travel on after persistence; `None` for the end of the chain.
    events_out: Option<mpsc::Sender<ExecutionEvent>>,
    seen_positions: HashSet<PositionId>,
    account_initialized: bool,
}

impl ExecutionHandler {
    pub fn new(
        cache: ObjectCache,
        commands_out: mpsc::Sender<TradingCommand>,
        events_out: Option<mpsc::Sender<ExecutionEvent>>,
    ) -> Self {
        Self {
            cache,
            commands_out,
            events_out,
            seen_positions: HashSet::new(),
            account_initialized: false,
        }
    }

    fn persist(&mut self, event: &ExecutionEvent) {
        let result = match event {
            ExecutionEvent::Order(order_event) => {
                let order_result = match order_event {
                    OrderEvent::Initialized(_) => self.cache.add_order(order_event),
                    _ => self.cache.update_order(order_event),
                };
                if let OrderEvent::Filled(fill) = order_event {
                    let position_result = if self.seen_positions.insert(fill.position_id.clone())
                    {
                        self.cache.add_position(fill)
                    } else {
                        self.cache.update_position(fill)
                    };
                    order_result.and(position_result)
                } else {
                    order_result
                }
            }
            ExecutionEvent::Account(state) => {
                if self.account_initialized {
                    self.cache.update_account(state)
                } else {
                    self.account_initialized = true;
                    self.cache.add_account(state)
                }
            }
        };
        if let Err(err) = result {
            // An unreachable store is fatal at engine scope: the node stops
            // this engine after the log line.
            warn!(%err, "Failed to persist execution event");
        }
    }
}

#[async_trait]
impl MessageHandler for ExecutionHandler {
    async fn handle_command(&mut self, command: TradingCommand) {
        if self.commands_out.send(command).await.is_err() {
            warn!("Execution client channel closed; command dropped");
        }
    }

    async fn handle_event(&mut self, event: ExecutionEvent) {
        self.persist(&event);
        if let Some(out) = &self.events_out {
            if out.send(event).await.is_err() {
                warn!("Downstream event channel closed");
            }
        }
    }
}

/// The execution engine: a message engine wired to an `ExecutionHandler`
pub struct ExecutionEngine {
    engine: MessageEngine,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: MessageEngine::new(config),
        }
    }

    pub fn start(&mut self, handler: ExecutionHandler) {
        self.engine.start(handler);
    }

    pub async fn execute(&self, command: TradingCommand) {
        self.engine.execute(command).await;
    }

    pub async fn process(&self, event: ExecutionEvent) {
        self.engine.process(event).await;
    }

    pub async fn stop(&self) {
        self.engine.stop().await;
    }

    pub async fn kill(&mut self) {
        self.engine.kill().await;
    }

    pub async fn join(&mut self) {
        self.engine.join().await;
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn qsize(&self) -> usize {
        self.engine.qsize()
    }

    pub fn command_count(&self) -> u64 {
        self.engine.command_count()
    }

    pub fn event_count(&self) -> u64 {
        self.engine.event_count()
    }
}
