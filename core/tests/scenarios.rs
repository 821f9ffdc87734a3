//! End-to-end lifecycle scenarios against the in-process mock venue.
//!
//! Each test drives the real workflows (open, sync, WAP-recalc, drift
//! correction, close) through the engine's step queue, scripting venue-side
//! events on the mock exchange and asserting the reconciliation invariants.

use escada_core::{
    config::EngineConfig,
    domain::{account::Account, position::PositionStatus, AccountId, PositionId},
    engine::Engine,
    notify::{DeliveryGroup, RecordingNotifier},
    step::StepQueue,
    store::observer::{classify, DriftVerdict},
};
use escada_exchange::{
    mock::{test_symbol, MockExchange},
    model::{CanonicalOrderStatus, OrderKind},
    ApiCredentials, ExchangeAdapter,
};
use escada_markets::{Direction, ExchangeId, MarginMode, SymbolKey};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use smol_str::SmolStr;
use std::sync::Arc;

struct Harness {
    engine: Arc<Engine>,
    venue: Arc<MockExchange>,
    notifier: Arc<RecordingNotifier>,
    account: AccountId,
    symbol: SymbolKey,
}

fn harness() -> Harness {
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Arc::new(Engine::new(
        EngineConfig::default(),
        notifier.clone() as Arc<dyn escada_core::notify::Notifier>,
    ));
    let venue = Arc::new(MockExchange::new(ExchangeId::BinanceFutures));
    let symbol = test_symbol(ExchangeId::BinanceFutures);
    let key = symbol.key();
    engine.store.upsert_symbol(symbol);

    let account = Account {
        id: AccountId(1),
        exchange: ExchangeId::BinanceFutures,
        credentials: ApiCredentials::new("key", "secret"),
        trading_quote: SmolStr::new("USDT"),
        max_position_percentage: dec!(5),
        position_leverage_long: 10,
        position_leverage_short: 10,
        margin_mode: MarginMode::Isolated,
        stop_market_initial_percentage: dec!(8),
        profit_percentage: dec!(0.36),
        total_limit_orders_filled_to_notify: 1,
        can_trade: true,
    };
    engine.register_account(account, venue.clone() as Arc<dyn ExchangeAdapter>);

    Harness {
        engine,
        venue,
        notifier,
        account: AccountId(1),
        symbol: key,
    }
}

impl Harness {
    async fn open_long(&self) -> PositionId {
        let id = self
            .engine
            .open_position(self.account, self.symbol.clone(), Direction::Long)
            .unwrap();
        self.engine.drain().await;
        id
    }

    async fn sync(&self, position: PositionId) {
        self.engine.enqueue_sync(position);
        self.engine.drain().await;
    }

    fn order_by_kind(
        &self,
        position: PositionId,
        kind: OrderKind,
    ) -> escada_core::domain::order::Order {
        self.engine
            .store
            .orders_for_position(position)
            .into_iter()
            .find(|order| order.kind == kind)
            .unwrap()
    }

    fn rung(&self, position: PositionId, index: u32) -> escada_core::domain::order::Order {
        self.engine
            .store
            .orders_for_position(position)
            .into_iter()
            .find(|order| order.rung_index == Some(index))
            .unwrap()
    }
}

#[tokio::test]
async fn scenario_1_open_long_on_fresh_symbol() {
    let harness = harness();
    let id = harness.open_long().await;

    let position = harness.engine.store.position(id).unwrap();
    assert_eq!(position.status, PositionStatus::Active);
    assert_eq!(position.margin.normalize(), dec!(50));
    assert_eq!(position.leverage, 10);
    assert_eq!(position.quantity, dec!(0.156));
    assert_eq!(position.opening_price, Some(dec!(100)));
    assert!(position.opened_at.is_some());

    // exactly 1 MARKET + 4 LIMIT + 1 PROFIT-LIMIT + 1 STOP-MARKET
    let orders = harness.engine.store.orders_for_position(id);
    assert_eq!(orders.len(), 7);

    let expected_rungs = [
        (1, dec!(98), dec!(0.312)),
        (2, dec!(96), dec!(0.624)),
        (3, dec!(94), dec!(1.248)),
        (4, dec!(92), dec!(2.496)),
    ];
    for (index, price, quantity) in expected_rungs {
        let rung = harness.rung(id, index);
        assert_eq!(rung.price, price, "rung {index} price");
        assert_eq!(rung.quantity, quantity, "rung {index} quantity");
        assert_eq!(rung.status, CanonicalOrderStatus::New);
        assert_eq!(rung.reference_price, Some(price));
        assert_eq!(rung.reference_quantity, Some(quantity));
    }

    let tp = harness.order_by_kind(id, OrderKind::ProfitLimit);
    assert_eq!(tp.price, dec!(100.36));
    assert_eq!(tp.quantity, dec!(0.156));
    assert!(!tp.is_algo);
    assert_eq!(position.first_profit_price, Some(dec!(100.36)));

    let sl = harness.order_by_kind(id, OrderKind::StopMarket);
    assert_eq!(sl.price, dec!(84.64));
    assert!(sl.is_algo);

    let market = harness.order_by_kind(id, OrderKind::Market);
    assert_eq!(market.status, CanonicalOrderStatus::Filled);
    assert_eq!(market.reference_status, Some(CanonicalOrderStatus::Filled));

    // invariant: local working orders match the venue
    assert_eq!(harness.venue.working_order_count(), 6);
    assert_eq!(harness.venue.position_amount("BTCUSDT:LONG"), dec!(0.156));
}

#[tokio::test]
async fn scenario_2_limit_fill_triggers_wap_recalc() {
    let harness = harness();
    let id = harness.open_long().await;

    let rung_one = harness.rung(id, 1);
    harness
        .venue
        .fill_order(rung_one.exchange_order_id.as_deref().unwrap(), None);
    harness.sync(id).await;

    let position = harness.engine.store.position(id).unwrap();
    assert_eq!(position.status, PositionStatus::Active);
    assert!(position.was_waped);
    assert!(position.waped_at.is_some());
    assert_eq!(position.quantity, dec!(0.468));

    // wap = (100*0.156 + 98*0.312)/0.468 = 98.666..., tp = wap * 1.0036
    let tp = harness.order_by_kind(id, OrderKind::ProfitLimit);
    assert_eq!(tp.price, dec!(99.02));
    assert_eq!(tp.quantity, dec!(0.468));
    // reference columns moved in the same commit: no correction fires
    assert_eq!(tp.reference_price, Some(dec!(99.02)));
    assert_eq!(tp.reference_quantity, Some(dec!(0.468)));
    assert_eq!(classify(&tp), DriftVerdict::None);

    // venue agrees
    let venue_tp = harness
        .venue
        .order_snapshot(tp.exchange_order_id.as_deref().unwrap())
        .unwrap();
    assert_eq!(venue_tp.price, dec!(99.02));
    assert_eq!(venue_tp.quantity, dec!(0.468));

    // a second sync pass changes nothing
    harness.sync(id).await;
    let tp_after = harness.order_by_kind(id, OrderKind::ProfitLimit);
    assert_eq!(tp_after.price, dec!(99.02));
    assert_eq!(
        harness.engine.store.position(id).unwrap().status,
        PositionStatus::Active
    );

    // invariant: filled MARKET + LIMIT quantities sum to the position
    let filled: Decimal = harness
        .engine
        .store
        .orders_for_position(id)
        .into_iter()
        .filter(|order| matches!(order.kind, OrderKind::Market | OrderKind::Limit))
        .map(|order| order.filled_quantity)
        .sum();
    assert_eq!(filled, dec!(0.468));
}

#[tokio::test]
async fn scenario_3_price_drift_on_limit_is_corrected_in_place() {
    let harness = harness();
    let id = harness.open_long().await;

    let rung_two = harness.rung(id, 2);
    let venue_id = rung_two.exchange_order_id.clone().unwrap();
    // an external actor moves L2 from 96.00 to 95.50
    harness.venue.externally_modify(&venue_id, Some(dec!(95.5)), None);

    harness.sync(id).await;

    let corrected = harness.rung(id, 2);
    assert_eq!(corrected.price, dec!(96));
    assert_eq!(corrected.reference_price, Some(dec!(96)));
    assert_eq!(corrected.status, CanonicalOrderStatus::New);
    // same venue order, restored in place
    assert_eq!(corrected.exchange_order_id.as_deref(), Some(venue_id.as_str()));
    let venue_order = harness.venue.order_snapshot(&venue_id).unwrap();
    assert_eq!(venue_order.price, dec!(96));
}

#[tokio::test]
async fn scenario_4_modified_algo_stop_is_cancelled_and_recreated() {
    let harness = harness();
    let id = harness.open_long().await;

    let stop = harness.order_by_kind(id, OrderKind::StopMarket);
    assert!(stop.is_algo);
    let old_venue_id = stop.exchange_order_id.clone().unwrap();
    harness
        .venue
        .externally_modify(&old_venue_id, Some(dec!(80)), None);

    harness.sync(id).await;

    let recreated = harness.order_by_kind(id, OrderKind::StopMarket);
    // a fresh venue order at the original reference price
    assert_ne!(recreated.exchange_order_id.as_deref(), Some(old_venue_id.as_str()));
    assert_eq!(recreated.price, dec!(84.64));
    assert_eq!(recreated.status, CanonicalOrderStatus::New);
    assert_eq!(recreated.reference_status, Some(CanonicalOrderStatus::New));
    assert_eq!(recreated.reference_price, Some(dec!(84.64)));

    // the old venue order is cancelled
    let old = harness.venue.order_snapshot(&old_venue_id).unwrap();
    assert_eq!(old.status, CanonicalOrderStatus::Cancelled);
}

#[tokio::test]
async fn scenario_5_tp_fill_closes_the_position() {
    let harness = harness();
    let id = harness.open_long().await;

    // one rung fills first so the close counts a recovered ladder
    let rung_one = harness.rung(id, 1);
    harness
        .venue
        .fill_order(rung_one.exchange_order_id.as_deref().unwrap(), None);
    harness.sync(id).await;

    let tp = harness.order_by_kind(id, OrderKind::ProfitLimit);
    harness
        .venue
        .fill_order(tp.exchange_order_id.as_deref().unwrap(), None);
    harness.sync(id).await;

    let position = harness.engine.store.position(id).unwrap();
    assert_eq!(position.status, PositionStatus::Closed);
    assert_eq!(position.closing_price, Some(dec!(99.02)));
    assert_eq!(harness.venue.position_amount("BTCUSDT:LONG"), dec!(0));
    assert_eq!(harness.venue.working_order_count(), 0);

    // every order's reference is aligned with its settled status
    for order in harness.engine.store.orders_for_position(id) {
        assert_eq!(order.reference_status, Some(order.status), "{}", order.client_order_id);
    }

    // one rung filled >= notify threshold of one
    assert_eq!(harness.notifier.count_for(DeliveryGroup::HighProfit), 1);
}

#[tokio::test]
async fn scenario_6_pump_cooldown_gates_reentry() {
    let harness = harness();
    let id = harness.open_long().await;

    harness.venue.set_daily_close(dec!(100));
    harness.venue.set_mark_price(dec!(115));

    harness.engine.request_close(id).unwrap();
    harness.engine.drain().await;

    // the position still closes normally
    let position = harness.engine.store.position(id).unwrap();
    assert_eq!(position.status, PositionStatus::Closed);

    // 15% change over a 10% threshold: the symbol cools down
    let symbol = harness.engine.store.symbol(&harness.symbol).unwrap();
    assert!(symbol.tradeable_at.is_some());
    assert!(symbol.tradeable_at.unwrap() > chrono::Utc::now());
    assert!(harness.notifier.count_for(DeliveryGroup::Admin) >= 1);

    // re-entry is refused while the cooldown holds
    let refused = harness
        .engine
        .open_position(harness.account, harness.symbol.clone(), Direction::Long);
    assert!(refused.is_err());
}

#[tokio::test]
async fn residual_amount_is_an_alert_not_a_failure() {
    let harness = harness();
    let id = harness.open_long().await;

    harness.venue.set_residual(dec!(0.001));
    harness.engine.request_close(id).unwrap();
    harness.engine.drain().await;

    let position = harness.engine.store.position(id).unwrap();
    assert_eq!(position.status, PositionStatus::Closed);
    let admin_messages: Vec<_> = harness
        .notifier
        .messages()
        .into_iter()
        .filter(|(group, subject, _)| {
            *group == DeliveryGroup::Admin && subject.contains("residual")
        })
        .collect();
    assert_eq!(admin_messages.len(), 1);
}

#[tokio::test]
async fn notional_exactly_at_the_venue_minimum_is_accepted() {
    let harness = harness();
    // market notional at the cap is margin * cap / divider = 50 * 10 / 32
    let mut symbol = test_symbol(ExchangeId::BinanceFutures);
    symbol.min_notional = dec!(15.625);
    harness.engine.store.upsert_symbol(symbol);

    let id = harness.open_long().await;
    assert_eq!(
        harness.engine.store.position(id).unwrap().status,
        PositionStatus::Active
    );
}

#[tokio::test]
async fn notional_below_the_venue_minimum_fails_the_position() {
    let harness = harness();
    let mut symbol = test_symbol(ExchangeId::BinanceFutures);
    symbol.min_notional = dec!(20);
    harness.engine.store.upsert_symbol(symbol);

    let id = harness
        .engine
        .open_position(harness.account, harness.symbol.clone(), Direction::Long)
        .unwrap();
    harness.engine.drain().await;

    let position = harness.engine.store.position(id).unwrap();
    assert_eq!(position.status, PositionStatus::Failed);
    assert!(position.error_message.is_some());
}

#[tokio::test]
async fn kill_switch_blocks_new_positions() {
    let harness = harness();
    harness.engine.store.set_allow_opening_positions(false);
    let refused =
        harness
            .engine
            .open_position(harness.account, harness.symbol.clone(), Direction::Long);
    assert!(refused.is_err());

    harness.engine.store.set_allow_opening_positions(true);
    assert!(harness
        .engine
        .open_position(harness.account, harness.symbol.clone(), Direction::Long)
        .is_ok());
}

#[tokio::test]
async fn duplicate_position_slots_are_refused_until_terminal() {
    let harness = harness();
    let id = harness.open_long().await;

    // same (account, symbol, direction) slot is taken
    assert!(harness
        .engine
        .open_position(harness.account, harness.symbol.clone(), Direction::Long)
        .is_err());
    // hedge mode: the short slot is free
    assert!(harness
        .engine
        .open_position(harness.account, harness.symbol.clone(), Direction::Short)
        .is_ok());

    let _ = id;
}

#[tokio::test]
async fn replay_of_the_open_workflow_places_nothing_twice() {
    let harness = harness();
    let id = harness.open_long().await;
    let before = harness.engine.store.orders_for_position(id).len();
    let venue_before = harness.venue.working_order_count();

    // at-least-once delivery: the whole open workflow is delivered again
    harness
        .engine
        .queue
        .enqueue(escada_core::workflow::open_position_steps(id));
    harness.engine.drain().await;

    assert_eq!(harness.engine.store.orders_for_position(id).len(), before);
    assert_eq!(harness.venue.working_order_count(), venue_before);
    assert_eq!(
        harness.engine.store.position(id).unwrap().status,
        PositionStatus::Active
    );
}
