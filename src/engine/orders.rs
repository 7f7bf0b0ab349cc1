// 8.4 engine/orders.rs: order entry. validate, check margin, persist as open, then
// market orders fill on the spot and limit orders rest for the tick scan.

use super::core::Engine;
use super::results::EngineError;
use crate::order::{Order, OrderError, OrderRequest, OrderStatus, OrderType, TimeInForce};
use crate::risk::initial_margin;
use crate::types::{AgentId, OrderId, Symbol};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

impl Engine {
    /// Places an order for `agent_id` and returns it with its resulting status:
    /// `Filled` or `Rejected` for market orders, `Open` for resting limits,
    /// `Filled` or `Canceled` for IOC/FOK limits.
    pub async fn place_order(&self, agent_id: &AgentId, mut request: OrderRequest) -> Result<Order, EngineError> {
        self.ensure_hydrated().await?;

        let leverage = request.validate(self.config.max_leverage)?;
        let quote = self
            .quotes
            .get(&request.symbol)
            .ok_or_else(|| EngineError::UnknownSymbol(request.symbol.clone()))?;

        let reference_price = match (request.order_type, request.price) {
            (OrderType::Market, _) => {
                if !quote.has_last() {
                    return Err(EngineError::NoPrice(request.symbol.clone()));
                }
                quote.last
            }
            (OrderType::Limit, Some(price)) => price,
            (OrderType::Limit, None) => return Err(OrderError::MissingLimitPrice.into()),
        };

        let _guard = self.lock_agent(agent_id).await;
        let wallet = self.load_wallet(agent_id).await?;

        if !request.reduce_only {
            let required = initial_margin(request.qty, reference_price, leverage);
            if !wallet.can_afford(required) {
                return Err(EngineError::InsufficientMargin {
                    required,
                    available: wallet.free_margin(),
                });
            }
        }

        let id = self.store.next_order_id().await?;
        let order = Order::open(id, agent_id.clone(), request, leverage, self.now());
        self.store.insert_order(order.clone()).await?;

        info!(
            agent = %agent_id,
            order_id = %order.id,
            symbol = %order.symbol,
            side = %order.side,
            qty = %order.qty,
            leverage = %order.leverage,
            order_type = ?order.order_type,
            "order accepted"
        );

        match (order.order_type, order.time_in_force) {
            (OrderType::Market, _) => self.execute_fill(order, quote.last).await,
            (OrderType::Limit, TimeInForce::GTC) => Ok(order),
            (OrderType::Limit, TimeInForce::IOC | TimeInForce::FOK) => {
                if order.crosses(quote.last) {
                    self.execute_fill(order, quote.last).await
                } else {
                    self.expire_unfilled(order).await
                }
            }
        }
    }

    pub async fn cancel_order(&self, agent_id: &AgentId, id: OrderId) -> Result<Order, EngineError> {
        let _guard = self.lock_agent(agent_id).await;
        let now = self.now();

        if let Some(order) = self
            .store
            .transition_order(id, agent_id, OrderStatus::Open, OrderStatus::Canceled, now)
            .await?
        {
            info!(agent = %agent_id, order_id = %id, "order canceled");
            return Ok(order);
        }

        // filled orders are deleted, so only a canceled or rejected row can remain
        match self.store.order(id).await? {
            Some(order) if &order.agent_id == agent_id => Err(EngineError::OrderNotOpen { id, status: order.status }),
            _ => Err(EngineError::OrderNotFound(id)),
        }
    }

    /// Fills `order` at `price` under the caller's agent lock. A failed fill leaves
    /// no partial state and moves the order to rejected.
    pub(super) async fn execute_fill(&self, order: Order, price: Decimal) -> Result<Order, EngineError> {
        match self.fill(&order, price).await {
            Ok(outcome) => {
                info!(
                    agent = %order.agent_id,
                    order_id = %order.id,
                    symbol = %order.symbol,
                    price = %outcome.price,
                    action = ?outcome.action,
                    realized_pnl = %outcome.realized_pnl,
                    "order filled"
                );
                Ok(order.with_status(OrderStatus::Filled, self.now()))
            }
            Err(err) => {
                warn!(order_id = %order.id, agent = %order.agent_id, error = %err, "fill failed, rejecting order");
                self.reject_order(&order).await?;
                Ok(order.with_status(OrderStatus::Rejected, self.now()))
            }
        }
    }

    pub(super) async fn reject_order(&self, order: &Order) -> Result<(), EngineError> {
        let rejected = self
            .store
            .transition_order(order.id, &order.agent_id, OrderStatus::Open, OrderStatus::Rejected, self.now())
            .await?;
        if rejected.is_none() {
            warn!(order_id = %order.id, "order no longer open, nothing to reject");
        }
        Ok(())
    }

    async fn expire_unfilled(&self, order: Order) -> Result<Order, EngineError> {
        let canceled = self
            .store
            .transition_order(order.id, &order.agent_id, OrderStatus::Open, OrderStatus::Canceled, self.now())
            .await?;
        debug!(order_id = %order.id, tif = ?order.time_in_force, "immediate order did not cross, canceled");
        Ok(canceled.unwrap_or(order))
    }

    /// 8.5: fills every open limit order on `symbol` that `last` crosses. Errors for
    /// one order are logged and the scan moves on.
    pub(super) async fn fill_crossing_orders(&self, symbol: &Symbol, last: Decimal) -> usize {
        let orders = match self.store.open_limit_orders(symbol).await {
            Ok(orders) => orders,
            Err(err) => {
                warn!(symbol = %symbol, error = %err, "limit order scan failed");
                return 0;
            }
        };

        let mut filled = 0;
        for order in orders.into_iter().filter(|o| o.crosses(last)) {
            let _guard = self.lock_agent(&order.agent_id).await;

            // canceled while we waited for the lock
            match self.store.order(order.id).await {
                Ok(Some(current)) if current.is_open() => {}
                Ok(_) => continue,
                Err(err) => {
                    warn!(order_id = %order.id, error = %err, "limit order reload failed");
                    continue;
                }
            }

            match self.execute_fill(order, last).await {
                Ok(result) if result.status == OrderStatus::Filled => filled += 1,
                Ok(_) => {}
                Err(err) => warn!(symbol = %symbol, error = %err, "limit fill failed"),
            }
        }
        filled
    }
}
