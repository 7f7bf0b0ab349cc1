//! Venue simulation.
//!
//! Drives the engine with a synthetic reference feed through the same channel a
//! live transport would use, places a few agent orders and prints the resulting
//! account overviews.

use perps_venue::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

type SimResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> SimResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = VenueConfig::from_env_or(Environment::Simulation.config())?;
    info!(symbols = config.symbols.len(), max_leverage = %config.engine.max_leverage, "starting venue simulation");

    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(Engine::new(config.engine.clone(), store.clone()));
    let feed = Arc::new(MarketFeed::new(Arc::clone(&engine), &config.feed));

    let (tx, rx) = mpsc::channel(config.feed.channel_capacity);
    let runner = tokio::spawn(Arc::clone(&feed).run(rx));

    println!("Perpetual Venue Simulation");
    println!("External prices, netting fills, trigger closes\n");

    // seed quotes so orders have a price to work with
    send_prices(&tx, "BTCUSDT", dec!(50000)).await?;
    send_prices(&tx, "ETHUSDT", dec!(3000)).await?;
    settle().await;

    let alice = AgentId::from("alice");
    let bob = AgentId::from("bob");
    engine.open_wallet(&alice).await?;
    engine.open_wallet(&bob).await?;

    scenario_1_open_and_take_profit(&engine, &tx, &alice).await?;
    scenario_2_resting_limit_and_flip(&engine, &tx, &bob).await?;
    scenario_3_liquidation(&engine, &tx, &bob).await?;

    drop(tx);
    runner.await?;

    for agent in [&alice, &bob] {
        let stats = engine.agent_stats(agent).await?;
        println!(
            "  {}: equity ${}, realized ${}, {} trades, win rate {}%",
            agent, stats.equity, stats.realized_pnl, stats.total_trades, stats.win_rate
        );
    }
    println!("\nSimulation complete. {} store commits.", store.commit_count());
    Ok(())
}

/// Market long with a take profit, then a rally through it.
async fn scenario_1_open_and_take_profit(engine: &Engine, tx: &mpsc::Sender<FeedEvent>, alice: &AgentId) -> SimResult {
    println!("Scenario 1: Market Long + Take Profit\n");

    let order = engine
        .place_order(alice, OrderRequest::market("BTCUSD", OrderSide::Buy, dec!(1), dec!(10)))
        .await?;
    println!("  Alice buys 1 BTC at 10x, order {} {}", order.id, order.status);

    let position = engine.set_risk(alice, &Symbol::from("BTCUSD"), Some(dec!(52000)), Some(dec!(48000))).await?;
    println!("  Entry ${}, liquidation ${}, tp/sl {:?}/{:?}", position.entry_price, position.liq_price, position.take_profit_price, position.stop_loss_price);

    for price in [dec!(50500), dec!(51200), dec!(52100)] {
        send_prices(tx, "BTCUSDT", price).await?;
        settle().await;
        print_overview(engine, alice).await?;
    }
    println!();
    Ok(())
}

/// Resting short limit fills on a rally, then a larger buy flips it long.
async fn scenario_2_resting_limit_and_flip(engine: &Engine, tx: &mpsc::Sender<FeedEvent>, bob: &AgentId) -> SimResult {
    println!("Scenario 2: Resting Limit + Close and Flip\n");

    let limit = engine
        .place_order(bob, OrderRequest::limit("ETHUSD", OrderSide::Sell, dec!(2), dec!(3050), dec!(5)))
        .await?;
    println!("  Bob rests SELL 2 ETH @ $3050, order {} {}", limit.id, limit.status);

    send_prices(tx, "ETHUSDT", dec!(3060)).await?;
    settle().await;
    print_overview(engine, bob).await?;

    let flip = engine
        .place_order(bob, OrderRequest::market("ETHUSD", OrderSide::Buy, dec!(3), dec!(5)))
        .await?;
    println!("  Bob buys 3 ETH market, order {} {}", flip.id, flip.status);
    print_overview(engine, bob).await?;
    println!();
    Ok(())
}

/// Mark price gaps through the liquidation price.
async fn scenario_3_liquidation(engine: &Engine, tx: &mpsc::Sender<FeedEvent>, bob: &AgentId) -> SimResult {
    println!("Scenario 3: Liquidation\n");

    let positions = engine.positions(bob).await?;
    let Some(eth) = positions.iter().find(|p| p.symbol == Symbol::from("ETHUSD")) else {
        println!("  Bob has no ETH position, skipping");
        return Ok(());
    };
    println!("  Bob long {} ETH @ ${}, liquidation ${}", eth.qty, eth.entry_price, eth.liq_price);

    let crash = eth.liq_price - dec!(1);
    send_prices(tx, "ETHUSDT", crash).await?;
    settle().await;

    let closed = engine.cached_positions(&Symbol::from("ETHUSD")).is_empty();
    println!("  Mark ${} -> position closed: {}", crash, closed);
    print_overview(engine, bob).await?;
    println!();
    Ok(())
}

async fn send_prices(tx: &mpsc::Sender<FeedEvent>, symbol: &str, price: Decimal) -> SimResult {
    let now = Timestamp::now();
    tx.send(FeedEvent::Ticker {
        symbol: symbol.to_string(),
        last: price,
        high_24h: price,
        low_24h: price,
        volume_24h: dec!(1000),
        price_change_24h: Decimal::ZERO,
        price_change_percent_24h: Decimal::ZERO,
        event_time: now,
    })
    .await?;
    tx.send(FeedEvent::MarkPrice {
        symbol: symbol.to_string(),
        mark_price: price,
        index_price: price,
        funding_rate: dec!(0.0001),
        event_time: now,
    })
    .await?;
    Ok(())
}

// ticks run on spawned tasks, give them a moment
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn print_overview(engine: &Engine, agent: &AgentId) -> SimResult {
    let overview = engine.overview(agent).await?;
    let wallet = &overview.wallet;
    println!(
        "    {} balance ${}, used ${}, equity ${}, upnl ${}",
        agent, wallet.balance, wallet.used_margin, wallet.equity, wallet.unrealized_pnl
    );
    for view in &overview.positions {
        println!(
            "      {} {} {} @ ${} now ${} roi {}%",
            view.position.symbol, view.position.side, view.position.qty, view.position.entry_price, view.current_price, view.roi_percent
        );
    }
    Ok(())
}
