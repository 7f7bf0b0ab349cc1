//! End to end engine scenarios against the in memory store.
//!
//! Each test drives prices by hand through the quote cache and ticks explicitly,
//! so every fill and trigger happens at a known price and time.

use perps_venue::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

struct Harness {
    engine: Arc<Engine>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000)));
    let engine = Arc::new(Engine::with_clock(EngineConfig::default(), store.clone(), clock.clone()));
    Harness { engine, store, clock }
}

async fn funded(h: &Harness, agent: &str) -> AgentId {
    let agent = AgentId::from(agent);
    h.engine.open_wallet(&agent).await.unwrap();
    agent
}

/// Sets last and mark to `price` and ticks the symbol.
async fn tick(h: &Harness, symbol: &str, price: Decimal) -> TickSummary {
    tick_split(h, symbol, price, price).await
}

async fn tick_split(h: &Harness, symbol: &str, last: Decimal, mark: Decimal) -> TickSummary {
    let symbol = Symbol::from(symbol);
    h.engine.update_quote(&symbol, QuoteUpdate::last(last).with_mark(mark));
    h.engine.on_tick(&symbol).await.unwrap()
}

async fn market(h: &Harness, agent: &AgentId, side: OrderSide, qty: Decimal, leverage: Decimal) -> Order {
    h.engine
        .place_order(agent, OrderRequest::market("BTCUSD", side, qty, leverage))
        .await
        .unwrap()
}

async fn active(h: &Harness, agent: &AgentId) -> Option<Position> {
    h.store.active_position(agent, &Symbol::from("BTCUSD")).await.unwrap()
}

async fn wallet(h: &Harness, agent: &AgentId) -> Wallet {
    h.store.wallet(agent).await.unwrap().unwrap()
}

#[tokio::test]
async fn open_then_close_credits_pnl_and_releases_margin() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(50000)).await;

    let order = market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;
    assert_eq!(order.status, OrderStatus::Filled);

    let pos = active(&h, &alice).await.unwrap();
    assert_eq!(pos.entry_price, dec!(50000));
    assert_eq!(pos.liq_price, dec!(46000));
    assert_eq!(wallet(&h, &alice).await.used_margin, dec!(5000));

    tick(&h, "BTCUSD", dec!(51000)).await;
    let cached = h.engine.cached_positions(&Symbol::from("BTCUSD"));
    assert_eq!(cached[0].unrealized_pnl, dec!(1000));

    let closed = h.engine.close_position(&alice, &Symbol::from("BTCUSD")).await.unwrap();
    assert_eq!(closed.close_price, dec!(51000));

    let w = wallet(&h, &alice).await;
    assert_eq!(w.balance, dec!(11000));
    assert_eq!(w.used_margin, Decimal::ZERO);
    assert_eq!(w.realized_pnl, dec!(1000));
    assert!(active(&h, &alice).await.is_none());

    let trades = h.store.trades_for_agent(&alice, None).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].realized_pnl, dec!(1000));

    let ledger = h.store.ledger_for_agent(&alice).await.unwrap();
    let actions: Vec<LedgerAction> = ledger.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![LedgerAction::Fill, LedgerAction::Close]);
}

#[tokio::test]
async fn partial_close_through_netting() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(100)).await;
    market(&h, &alice, OrderSide::Buy, dec!(2), dec!(10)).await;

    tick(&h, "BTCUSD", dec!(110)).await;
    market(&h, &alice, OrderSide::Sell, dec!(0.5), dec!(10)).await;

    let pos = active(&h, &alice).await.unwrap();
    assert_eq!(pos.side, Side::Long);
    assert_eq!(pos.qty, dec!(1.5));
    assert_eq!(pos.entry_price, dec!(100));

    let w = wallet(&h, &alice).await;
    assert_eq!(w.balance, dec!(10005));
    assert_eq!(w.used_margin, dec!(15));

    let trades = h.store.trades_for_agent(&alice, None).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].qty, dec!(0.5));
    assert_eq!(trades[0].realized_pnl, dec!(5));
}

#[tokio::test]
async fn close_and_flip_opens_remainder_on_the_other_side() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(100)).await;
    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(5)).await;
    let first = active(&h, &alice).await.unwrap();

    tick(&h, "BTCUSD", dec!(90)).await;
    market(&h, &alice, OrderSide::Sell, dec!(1.5), dec!(5)).await;

    let flipped = active(&h, &alice).await.unwrap();
    assert_ne!(flipped.id, first.id);
    assert_eq!(flipped.side, Side::Short);
    assert_eq!(flipped.qty, dec!(0.5));
    assert_eq!(flipped.entry_price, dec!(90));
    assert_eq!(flipped.leverage.value(), dec!(5));

    let w = wallet(&h, &alice).await;
    assert_eq!(w.balance, dec!(9990));
    assert_eq!(w.used_margin, dec!(9));

    let old = h.store.position(first.id).await.unwrap().unwrap();
    assert_eq!(old.status, PositionStatus::Closed);
    assert_eq!(old.realized_pnl, Some(dec!(-10)));
}

#[tokio::test]
async fn quantities_net_at_eight_digits() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(100)).await;

    // rounds to zero: refused before anything is written
    let dust = h
        .engine
        .place_order(&alice, OrderRequest::market("BTCUSD", OrderSide::Buy, dec!(0.000000004), dec!(10)))
        .await;
    assert!(matches!(dust, Err(EngineError::Order(OrderError::InvalidQty(_)))));
    assert!(active(&h, &alice).await.is_none());

    // a hair over the position is a full close, not a flip into nothing
    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;
    let over = market(&h, &alice, OrderSide::Sell, dec!(1.000000004), dec!(10)).await;
    assert_eq!(over.status, OrderStatus::Filled);
    assert!(active(&h, &alice).await.is_none());
    assert_eq!(wallet(&h, &alice).await.used_margin, Decimal::ZERO);

    // a hair under rounds up to the full size as well
    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;
    market(&h, &alice, OrderSide::Sell, dec!(0.999999996), dec!(10)).await;
    assert!(active(&h, &alice).await.is_none());
    assert!(h.engine.cached_positions(&Symbol::from("BTCUSD")).is_empty());

    for pos in h.store.all_positions() {
        assert!(pos.qty > Decimal::ZERO);
        assert!(!pos.is_active());
    }
    let w = wallet(&h, &alice).await;
    assert_eq!(w.balance, dec!(10000));
    assert_eq!(w.used_margin, Decimal::ZERO);
}

#[tokio::test]
async fn fill_keeps_fresher_cached_marks() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    let btc = Symbol::from("BTCUSD");
    tick(&h, "BTCUSD", dec!(100)).await;
    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;

    tick(&h, "BTCUSD", dec!(110)).await;
    h.clock.advance(1_000);
    tick(&h, "BTCUSD", dec!(120)).await;
    let id = active(&h, &alice).await.unwrap().id;
    assert_eq!(h.store.position(id).await.unwrap().unwrap().mark_price, dec!(110));

    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;

    let cached = h.engine.cached_positions(&btc);
    assert_eq!(cached[0].qty, dec!(2));
    assert_eq!(cached[0].entry_price, dec!(110));
    assert_eq!(cached[0].mark_price, dec!(120));
    assert_eq!(cached[0].unrealized_pnl, dec!(20));
}

#[tokio::test]
async fn pyramiding_averages_entry() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(50000)).await;
    market(&h, &alice, OrderSide::Buy, dec!(0.1), dec!(10)).await;
    tick(&h, "BTCUSD", dec!(52000)).await;
    market(&h, &alice, OrderSide::Buy, dec!(0.1), dec!(10)).await;

    let pos = active(&h, &alice).await.unwrap();
    assert_eq!(pos.qty, dec!(0.2));
    assert_eq!(pos.entry_price, dec!(51000));
    assert_eq!(pos.liq_price, dec!(46920));
    assert_eq!(wallet(&h, &alice).await.used_margin, dec!(1020));
}

#[tokio::test]
async fn liquidation_wins_over_stop_loss_and_closes_at_mark() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(100)).await;
    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;
    h.engine
        .set_risk(&alice, &Symbol::from("BTCUSD"), None, Some(dec!(95)))
        .await
        .unwrap();

    let summary = tick_split(&h, "BTCUSD", dec!(94), dec!(91)).await;
    assert_eq!(summary.closes, 1);

    let trades = h.store.trades_for_agent(&alice, None).await.unwrap();
    assert_eq!(trades[0].close_price, dec!(91));
    assert_eq!(trades[0].realized_pnl, dec!(-9));

    let w = wallet(&h, &alice).await;
    assert_eq!(w.balance, dec!(9991));
    assert_eq!(w.used_margin, Decimal::ZERO);

    let ledger = h.store.ledger_for_agent(&alice).await.unwrap();
    let close = ledger.iter().find(|e| e.action == LedgerAction::Close).unwrap();
    assert!(matches!(close.metadata, LedgerMetadata::Close { reason: CloseReason::Liquidation, .. }));
    assert!(h.engine.cached_positions(&Symbol::from("BTCUSD")).is_empty());
}

#[tokio::test]
async fn take_profit_closes_at_last() {
    let h = harness();
    let bob = funded(&h, "bob").await;
    tick(&h, "BTCUSD", dec!(100)).await;
    market(&h, &bob, OrderSide::Sell, dec!(2), dec!(4)).await;
    h.engine
        .set_risk(&bob, &Symbol::from("BTCUSD"), Some(dec!(90)), Some(dec!(110)))
        .await
        .unwrap();

    assert_eq!(tick(&h, "BTCUSD", dec!(95)).await.closes, 0);
    assert_eq!(tick_split(&h, "BTCUSD", dec!(89.5), dec!(92)).await.closes, 1);

    let trades = h.store.trades_for_agent(&bob, None).await.unwrap();
    assert_eq!(trades[0].close_price, dec!(89.5));
    assert_eq!(trades[0].realized_pnl, dec!(21));
    assert_eq!(wallet(&h, &bob).await.balance, dec!(10021));
}

#[tokio::test]
async fn resting_limit_fills_when_crossed() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(100)).await;

    let order = h
        .engine
        .place_order(&alice, OrderRequest::limit("BTCUSD", OrderSide::Buy, dec!(1), dec!(99), dec!(10)))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Open);

    assert_eq!(tick(&h, "BTCUSD", dec!(99.5)).await.fills, 0);
    assert_eq!(tick(&h, "BTCUSD", dec!(98)).await.fills, 1);

    // fills at last, not at the limit
    let pos = active(&h, &alice).await.unwrap();
    assert_eq!(pos.entry_price, dec!(98));
    assert!(matches!(h.engine.order(&alice, order.id).await, Err(EngineError::OrderNotFound(_))));
}

#[tokio::test]
async fn zero_last_never_fills_limits() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    let eth = Symbol::from("ETHUSD");
    h.engine.update_quote(&eth, QuoteUpdate { mark_price: Some(dec!(3000)), ..QuoteUpdate::default() });

    let order = h
        .engine
        .place_order(&alice, OrderRequest::limit("ETHUSD", OrderSide::Buy, dec!(1), dec!(3100), dec!(5)))
        .await
        .unwrap();
    let summary = h.engine.on_tick(&eth).await.unwrap();

    assert_eq!(summary.fills, 0);
    assert!(h.engine.order(&alice, order.id).await.unwrap().is_open());
}

#[tokio::test]
async fn cancel_is_guarded_and_owner_scoped() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    let bob = funded(&h, "bob").await;
    tick(&h, "BTCUSD", dec!(100)).await;

    let order = h
        .engine
        .place_order(&alice, OrderRequest::limit("BTCUSD", OrderSide::Sell, dec!(1), dec!(120), dec!(2)))
        .await
        .unwrap();

    assert!(matches!(h.engine.cancel_order(&bob, order.id).await, Err(EngineError::OrderNotFound(_))));

    let canceled = h.engine.cancel_order(&alice, order.id).await.unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);

    let again = h.engine.cancel_order(&alice, order.id).await;
    assert!(matches!(again, Err(EngineError::OrderNotOpen { status: OrderStatus::Canceled, .. })));

    // canceled orders never fill
    assert_eq!(tick(&h, "BTCUSD", dec!(130)).await.fills, 0);
    assert!(active(&h, &alice).await.is_none());
}

#[tokio::test]
async fn validation_fails_before_any_write() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(50000)).await;

    let unknown = h
        .engine
        .place_order(&alice, OrderRequest::market("DOGEUSD", OrderSide::Buy, dec!(1), dec!(2)))
        .await;
    assert!(matches!(unknown, Err(EngineError::UnknownSymbol(_))));

    let zero_qty = h
        .engine
        .place_order(&alice, OrderRequest::market("BTCUSD", OrderSide::Buy, Decimal::ZERO, dec!(2)))
        .await;
    assert!(matches!(zero_qty, Err(EngineError::Order(OrderError::InvalidQty(_)))));

    let too_levered = h
        .engine
        .place_order(&alice, OrderRequest::market("BTCUSD", OrderSide::Buy, dec!(0.1), dec!(25)))
        .await;
    assert!(matches!(too_levered, Err(EngineError::Order(OrderError::InvalidLeverage { .. }))));

    let too_big = h
        .engine
        .place_order(&alice, OrderRequest::market("BTCUSD", OrderSide::Buy, dec!(3), dec!(10)))
        .await;
    assert_eq!(
        too_big.unwrap_err(),
        EngineError::InsufficientMargin { required: dec!(15000), available: dec!(10000) }
    );

    let nobody = h
        .engine
        .place_order(&AgentId::from("ghost"), OrderRequest::market("BTCUSD", OrderSide::Buy, dec!(0.1), dec!(2)))
        .await;
    assert!(matches!(nobody, Err(EngineError::WalletNotFound(_))));

    assert!(h.store.open_orders_for_agent(&alice).await.unwrap().is_empty());
    assert_eq!(h.store.commit_count(), 0);
}

#[tokio::test]
async fn market_order_without_last_is_refused() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    let sol = Symbol::from("SOLUSD");
    h.engine.update_quote(&sol, QuoteUpdate { bid: Some(dec!(150)), ..QuoteUpdate::default() });

    let result = h
        .engine
        .place_order(&alice, OrderRequest::market("SOLUSD", OrderSide::Buy, dec!(1), dec!(2)))
        .await;
    assert!(matches!(result, Err(EngineError::NoPrice(_))));
    assert_eq!(result.unwrap_err().to_string(), "Market price data unavailable for SOLUSD");
}

#[tokio::test]
async fn reduce_only_never_opens_or_flips() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(100)).await;

    let nothing = h
        .engine
        .place_order(&alice, OrderRequest::market("BTCUSD", OrderSide::Sell, dec!(1), dec!(2)).reduce_only())
        .await
        .unwrap();
    assert_eq!(nothing.status, OrderStatus::Filled);
    assert!(active(&h, &alice).await.is_none());

    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(2)).await;
    h.engine
        .place_order(&alice, OrderRequest::market("BTCUSD", OrderSide::Sell, dec!(3), dec!(2)).reduce_only())
        .await
        .unwrap();

    assert!(active(&h, &alice).await.is_none());
    assert_eq!(wallet(&h, &alice).await.used_margin, Decimal::ZERO);
}

#[tokio::test]
async fn failed_fill_commits_nothing_and_rejects_the_order() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(100)).await;

    h.store.fail_next_commit();
    let order = market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;
    assert_eq!(order.status, OrderStatus::Rejected);

    let stored = h.engine.order(&alice, order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Rejected);
    assert!(active(&h, &alice).await.is_none());
    assert!(h.engine.cached_positions(&Symbol::from("BTCUSD")).is_empty());

    let w = wallet(&h, &alice).await;
    assert_eq!(w.balance, dec!(10000));
    assert_eq!(w.used_margin, Decimal::ZERO);
    assert!(h.store.ledger_for_agent(&alice).await.unwrap().is_empty());
}

#[tokio::test]
async fn immediate_limits_fill_or_cancel() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(100)).await;

    let missed = h
        .engine
        .place_order(
            &alice,
            OrderRequest::limit("BTCUSD", OrderSide::Buy, dec!(1), dec!(95), dec!(5)).with_time_in_force(TimeInForce::IOC),
        )
        .await
        .unwrap();
    assert_eq!(missed.status, OrderStatus::Canceled);
    assert!(active(&h, &alice).await.is_none());

    let hit = h
        .engine
        .place_order(
            &alice,
            OrderRequest::limit("BTCUSD", OrderSide::Buy, dec!(1), dec!(105), dec!(5)).with_time_in_force(TimeInForce::FOK),
        )
        .await
        .unwrap();
    assert_eq!(hit.status, OrderStatus::Filled);
    assert_eq!(active(&h, &alice).await.unwrap().entry_price, dec!(100));
}

#[tokio::test]
async fn set_risk_validates_and_clears() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    let btc = Symbol::from("BTCUSD");
    tick(&h, "BTCUSD", dec!(100)).await;

    let missing = h.engine.set_risk(&alice, &btc, Some(dec!(120)), None).await;
    assert!(matches!(missing, Err(EngineError::PositionNotFound(_))));

    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;
    let set = h.engine.set_risk(&alice, &btc, Some(dec!(120)), Some(dec!(95))).await.unwrap();
    assert_eq!(set.take_profit_price, Some(dec!(120)));
    assert_eq!(set.stop_loss_price, Some(dec!(95)));

    let negative = h.engine.set_risk(&alice, &btc, Some(dec!(-1)), None).await;
    assert_eq!(negative.unwrap_err(), EngineError::InvalidRiskPrice(dec!(-1)));

    let cleared = h.engine.set_risk(&alice, &btc, Some(Decimal::ZERO), None).await.unwrap();
    assert_eq!(cleared.take_profit_price, None);
    assert_eq!(cleared.stop_loss_price, None);
    assert_eq!(h.engine.cached_positions(&btc)[0].take_profit_price, None);
}

#[tokio::test]
async fn hydration_picks_up_positions_from_an_earlier_engine() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(100)).await;
    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;

    let restarted = Engine::with_clock(EngineConfig::default(), h.store.clone(), h.clock.clone());
    let btc = Symbol::from("BTCUSD");
    restarted.update_quote(&btc, QuoteUpdate::last(dec!(91)).with_mark(dec!(91)));

    let summary = restarted.on_tick(&btc).await.unwrap();
    assert_eq!(summary.closes, 1);
    assert!(active(&h, &alice).await.is_none());
    assert_eq!(wallet(&h, &alice).await.balance, dec!(9991));
}

#[tokio::test]
async fn pnl_writes_are_throttled_per_position() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    tick(&h, "BTCUSD", dec!(50000)).await;
    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;
    let id = active(&h, &alice).await.unwrap().id;

    tick(&h, "BTCUSD", dec!(51000)).await;
    assert_eq!(h.store.position(id).await.unwrap().unwrap().mark_price, dec!(51000));

    h.clock.advance(1_000);
    tick(&h, "BTCUSD", dec!(52000)).await;
    assert_eq!(h.store.position(id).await.unwrap().unwrap().mark_price, dec!(51000));
    assert_eq!(h.engine.cached_positions(&Symbol::from("BTCUSD"))[0].mark_price, dec!(52000));

    h.clock.advance(5_000);
    tick(&h, "BTCUSD", dec!(53000)).await;
    let stored = h.store.position(id).await.unwrap().unwrap();
    assert_eq!(stored.mark_price, dec!(53000));
    assert_eq!(stored.unrealized_pnl, dec!(3000));
}

#[tokio::test]
async fn overview_and_stats_reflect_history() {
    let h = harness();
    let alice = funded(&h, "alice").await;
    assert!(matches!(h.engine.open_wallet(&alice).await, Err(EngineError::WalletExists(_))));

    // win 1000 on BTC
    tick(&h, "BTCUSD", dec!(50000)).await;
    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;
    tick(&h, "BTCUSD", dec!(51000)).await;
    h.engine.close_position(&alice, &Symbol::from("BTCUSD")).await.unwrap();

    // lose 9 on BTC
    tick(&h, "BTCUSD", dec!(100)).await;
    market(&h, &alice, OrderSide::Buy, dec!(1), dec!(10)).await;
    tick(&h, "BTCUSD", dec!(91)).await;

    // open ETH long and a resting order
    tick(&h, "ETHUSD", dec!(3000)).await;
    h.engine
        .place_order(&alice, OrderRequest::market("ETHUSD", OrderSide::Buy, dec!(1), dec!(5)))
        .await
        .unwrap();
    h.engine
        .place_order(&alice, OrderRequest::limit("ETHUSD", OrderSide::Buy, dec!(1), dec!(2500), dec!(5)))
        .await
        .unwrap();
    h.engine.update_quote(&Symbol::from("ETHUSD"), QuoteUpdate::last(dec!(3060)));

    let overview = h.engine.overview(&alice).await.unwrap();
    assert_eq!(overview.wallet.balance, dec!(10991));
    assert_eq!(overview.wallet.unrealized_pnl, dec!(60));
    assert_eq!(overview.wallet.equity, dec!(11051));
    assert_eq!(overview.positions.len(), 1);
    assert_eq!(overview.positions[0].margin_invested, dec!(600));
    assert_eq!(overview.positions[0].roi_percent, dec!(10));
    assert_eq!(overview.open_orders.len(), 1);
    assert_eq!(overview.open_orders[0].current_price, Some(dec!(3060)));
    assert_eq!(overview.recent_trades.len(), 2);
    assert_eq!(overview.recent_trades[0].realized_pnl, dec!(-9));

    let stats = h.engine.agent_stats(&alice).await.unwrap();
    assert_eq!(stats.total_trades, 2);
    assert_eq!(stats.win_rate, dec!(50));
    assert_eq!(stats.realized_pnl, dec!(991));
    assert_eq!(stats.volume, dec!(50100));
    assert_eq!(stats.equity, dec!(11051));

    let view = h.engine.wallet(&alice).await.unwrap();
    assert_eq!(view.free_margin, dec!(10391));
}

#[tokio::test]
async fn read_paths_expose_quotes_and_candles() {
    let h = harness();
    let btc = Symbol::from("BTCUSD");
    h.engine.update_quote(
        &btc,
        QuoteUpdate {
            open_1h: Some(dec!(100)),
            high_1h: Some(dec!(110)),
            low_1h: Some(dec!(95)),
            close_1h: Some(dec!(105)),
            volume_1h: Some(dec!(12.5)),
            ..QuoteUpdate::last(dec!(105))
        },
    );

    let candle = h.engine.candle(&btc).unwrap();
    assert_eq!(candle.high, dec!(110));
    assert_eq!(candle.volume, dec!(12.5));
    assert_eq!(h.engine.quotes().len(), 1);
    assert!(h.engine.quote(&Symbol::from("ETHUSD")).is_none());
}
