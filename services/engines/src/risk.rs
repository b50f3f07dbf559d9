//! Live risk engine
//!
//! Polices the command flow between strategies and the execution path.
//! Approved commands forward toward the execution engine; denials surface
//! as reject events so strategies observe them like any other order update.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::warn;

use types::commands::TradingCommand;
use types::events::{ExecutionEvent, OrderEvent};
use types::numeric::Quantity;
use types::order::Order;

use crate::engine::{EngineConfig, MessageEngine, MessageHandler};

/// Pre-trade limits
#[derive(Debug, Clone, Default)]
pub struct RiskConfig {
    /// Largest single-order quantity allowed, if bounded.
    pub max_order_qty: Option<Quantity>,
    /// Largest single-order notional (price × qty), if bounded.
    pub max_notional: Option<Decimal>,
}

/// Validate-and-forward handler for the risk engine
pub struct RiskHandler {
    config: RiskConfig,
    /// Approved commands continue toward execution.
    commands_out: mpsc::Sender<TradingCommand>,
    /// Denials surface here as reject events.
    denials_out: mpsc::Sender<ExecutionEvent>,
}

impl RiskHandler {
    pub fn new(
        config: RiskConfig,
        commands_out: mpsc::Sender<TradingCommand>,
        denials_out: mpsc::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            config,
            commands_out,
            denials_out,
        }
    }

    fn check_order(&self, order: &Order) -> Result<(), String> {
        if let Some(max_qty) = self.config.max_order_qty {
            if order.quantity > max_qty {
                return Err(format!(
                    "order quantity {} exceeds limit {}",
                    order.quantity, max_qty
                ));
            }
        }
        if let (Some(max_notional), Some(price)) =
            (self.config.max_notional, order.price.or(order.trigger))
        {
            let notional = order.quantity.as_decimal() * price.as_decimal();
            if notional > max_notional {
                return Err(format!(
                    "order notional {} exceeds limit {}",
                    notional, max_notional
                ));
            }
        }
        Ok(())
    }

    fn check(&self, command: &TradingCommand) -> Result<(), (String, OrderEvent)> {
        let deny = |order: &Order, reason: String| {
            let event = OrderEvent::Rejected {
                client_order_id: order.client_order_id.clone(),
                reason: format!("risk: {reason}"),
                ts_event_ns: now_ns(),
            };
            (reason, event)
        };

        match command {
            TradingCommand::Submit(submit) => self
                .check_order(&submit.order)
                .map_err(|reason| deny(&submit.order, reason)),
            TradingCommand::SubmitBracket(bracket) => {
                for order in [&bracket.entry, &bracket.stop_loss, &bracket.take_profit] {
                    self.check_order(order)
                        .map_err(|reason| deny(order, reason))?;
                }
                Ok(())
            }
            // Amendments and cancels reduce or remove exposure.
            TradingCommand::Update(_) | TradingCommand::Cancel(_) => Ok(()),
        }
    }
}

// Wall-clock denial timestamps; backtests route denials through the venue
// instead, so precision here only affects live logs.
fn now_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl MessageHandler for RiskHandler {
    async fn handle_command(&mut self, command: TradingCommand) {
        match self.check(&command) {
            Ok(()) => {
                if self.commands_out.send(command).await.is_err() {
                    warn!("Execution channel closed; command dropped");
                }
            }
            Err((reason, event)) => {
                warn!(%reason, "Risk denied command");
                if self.denials_out.send(ExecutionEvent::Order(event)).await.is_err() {
                    warn!("Denial channel closed");
                }
            }
        }
    }

    async fn handle_event(&mut self, _event: ExecutionEvent) {
        // Execution events inform future stateful checks; the stateless
        // limits here do not consume them.
    }
}

/// The risk engine: a message engine wired to a `RiskHandler`
pub struct RiskEngine {
    engine: MessageEngine,
}

impl RiskEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: MessageEngine::new(config),
        }
    }

    pub fn start(&mut self, handler: RiskHandler) {
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
}
