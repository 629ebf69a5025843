//! End-to-end scenarios: exchange CSV in, compressed segments on disk,
//! replay through the bus with bid/ask reconstruction.

use std::cell::RefCell;
use std::rc::Rc;

use datafeed_hub::core::{EventType, MarketDataListener, MarketSnapshot};
use datafeed_hub::data::ticks::TickUpdateFlags;
use datafeed_hub::ingest::parse_bybit_trades;
use datafeed_hub::{
    BidAskModel, BidAskRestoreConfig, MarketDataBus, MarketTick, StorageEnv, StoreDataSource,
    TickCodecConfig, TickStore,
};

const HOUR_MS: u64 = 3_600_000;
const T0: u64 = 1_704_067_200_000; // 2024-01-01T00:00:00Z

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn trade_config() -> TickCodecConfig {
    TickCodecConfig {
        price_digits: 2,
        volume_digits: 3,
        trade_based: true,
        enable_tick_flags: true,
        enable_volume: true,
        ..Default::default()
    }
}

/// 1000 ticks uniformly spaced at 3600 ms over one hour, prices cycling
/// over four levels, alternating buy/sell.
fn spec_hour(base_ms: u64) -> Vec<MarketTick> {
    let prices = [10000.00, 10000.01, 10000.02, 10000.03];
    (0..1000)
        .map(|i| {
            let mut tick = MarketTick::trade(prices[i % 4], 0.5, base_ms + (i as u64) * 3600, 0);
            tick.set_flag(if i % 2 == 0 {
                TickUpdateFlags::TickFromBuy
            } else {
                TickUpdateFlags::TickFromSell
            });
            if i > 0 {
                tick.set_flag(TickUpdateFlags::LastUpdated);
            }
            tick
        })
        .collect()
}

fn started_store(dir: &tempfile::TempDir) -> TickStore {
    let env = StorageEnv::open_with(dir.path(), 256 * 1024 * 1024, 16).unwrap();
    let mut store = TickStore::new(env);
    store.start().unwrap();
    store
}

#[test]
fn test_single_hour_roundtrip_through_storage() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let store = started_store(&dir);
    let ticks = spec_hour(T0);
    store.upsert(0, 0, &ticks, &trade_config()).unwrap();

    let mut out = Vec::new();
    let mut config = TickCodecConfig::default();
    assert!(store.fetch(0, 0, T0, T0 + HOUR_MS, &mut out, &mut config).unwrap());
    assert_eq!(out.len(), 1000);
    assert_eq!(config.price_digits, 2);
    for (orig, dec) in ticks.iter().zip(out.iter()) {
        assert_eq!(orig.time_ms, dec.time_ms);
        assert!((orig.last - dec.last).abs() < 0.005);
        assert!((orig.volume - dec.volume).abs() < 0.0005);
        assert_eq!(
            orig.has_flag(TickUpdateFlags::TickFromBuy),
            dec.has_flag(TickUpdateFlags::TickFromBuy)
        );
    }
}

#[test]
fn test_two_hour_fetch_with_crop() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = started_store(&dir);
    let mut ticks = spec_hour(T0);
    ticks.extend(spec_hour(T0 + HOUR_MS));
    store.upsert(0, 0, &ticks, &trade_config()).unwrap();

    // [00:30:00, 01:30:00): half of each stored hour.
    let start = T0 + 30 * 60_000;
    let end = T0 + 90 * 60_000;
    let mut out = Vec::new();
    let mut config = TickCodecConfig::default();
    store.fetch(0, 0, start, end, &mut out, &mut config).unwrap();

    assert_eq!(out.len(), 1000);
    assert!(out.first().unwrap().time_ms >= start);
    assert!(out.last().unwrap().time_ms < end);
}

/// Listener checking every dispatched span against the invariants the
/// bus and spread reconstruction promise.
struct SpanChecker {
    last_seen_ms: u64,
    updates: usize,
    ticks_seen: usize,
}

impl MarketDataListener for SpanChecker {
    fn on_update(&mut self, snapshot: &MarketSnapshot<'_>) -> anyhow::Result<()> {
        if snapshot.has_flag(EventType::Start) {
            return Ok(());
        }
        assert!(snapshot.time_ms() >= self.last_seen_ms, "time went backwards");
        assert!(snapshot.has_flag(EventType::TimerEvent));
        assert!(snapshot.has_flag(EventType::TickUpdate));

        let span = snapshot.tick_span(0, 0);
        for tick in span {
            assert!(tick.time_ms >= self.last_seen_ms);
            assert!(tick.time_ms < snapshot.time_ms());
            // Fixed spread of 2 points at 2 digits = 0.02.
            assert!(tick.ask >= tick.bid);
            assert!((tick.ask - tick.bid - 0.02).abs() < 1e-9);
        }
        self.ticks_seen += span.len();
        self.last_seen_ms = snapshot.time_ms();
        self.updates += 1;
        Ok(())
    }
}

#[test]
fn test_replay_session_with_fixed_spread() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = started_store(&dir);
    store.upsert(0, 0, &spec_hour(T0), &trade_config()).unwrap();

    let mut source = StoreDataSource::new(store, vec!["BTCUSDT".into()], vec!["bybit".into()]);
    source.set_bidask_config(
        0,
        0,
        BidAskRestoreConfig {
            mode: BidAskModel::FixedSpread,
            fixed_spread: 2,
            price_digits: 2,
        },
    );

    let mut bus = MarketDataBus::new(Box::new(source));
    let checker = Rc::new(RefCell::new(SpanChecker {
        last_seen_ms: T0,
        updates: 0,
        ticks_seen: 0,
    }));
    let sub = bus.register_listener(checker.clone()).unwrap();
    assert!(bus.subscribe_timer(sub, 60_000));
    assert!(bus.subscribe_ticks(sub, 0, 0));

    bus.start(T0).unwrap();
    for minute in 1..=60u64 {
        bus.update(T0 + minute * 60_000).unwrap();
    }

    let checker = checker.borrow();
    assert_eq!(checker.updates, 60);
    // Every stored tick was delivered exactly once across the session.
    assert_eq!(checker.ticks_seen, 1000);
}

#[test]
fn test_replay_catch_up_covers_missed_minutes() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = started_store(&dir);
    store.upsert(0, 0, &spec_hour(T0), &trade_config()).unwrap();

    let mut source = StoreDataSource::new(store, vec!["BTCUSDT".into()], vec!["bybit".into()]);
    source.set_bidask_config(
        0,
        0,
        BidAskRestoreConfig {
            mode: BidAskModel::FixedSpread,
            fixed_spread: 2,
            price_digits: 2,
        },
    );

    let mut bus = MarketDataBus::new(Box::new(source));
    let checker = Rc::new(RefCell::new(SpanChecker {
        last_seen_ms: T0,
        updates: 0,
        ticks_seen: 0,
    }));
    let sub = bus.register_listener(checker.clone()).unwrap();
    bus.subscribe_timer(sub, 60_000);
    bus.subscribe_ticks(sub, 0, 0);

    bus.start(T0).unwrap();
    // One call an hour later replays all sixty minutes in order.
    bus.update(T0 + HOUR_MS).unwrap();

    let checker = checker.borrow();
    assert_eq!(checker.updates, 60);
    assert_eq!(checker.ticks_seen, 1000);
}

#[test]
fn test_bar_store_gap_fill_resample_pipeline() {
    use datafeed_hub::data::bars::{BarCodecConfig, BarStorageFlags, MarketBar};
    use datafeed_hub::transform::{fill_bar_gaps, resample_market_bars};
    use datafeed_hub::{BarStore, TimeFrame};

    let dir = tempfile::TempDir::new().unwrap();
    let env = StorageEnv::open_with(dir.path(), 256 * 1024 * 1024, 16).unwrap();
    let mut store = BarStore::new(env, TimeFrame::M1).unwrap();
    store.start().unwrap();

    let mut config = BarCodecConfig {
        time_frame: TimeFrame::M1,
        price_digits: 2,
        volume_digits: 3,
        ..Default::default()
    };
    config.set_flag(BarStorageFlags::LastBased);
    config.set_flag(BarStorageFlags::EnableVolume);
    config.set_flag(BarStorageFlags::StoreRawBinary);

    // Ten minutes of bars with minutes 4 and 5 missing.
    let bars: Vec<MarketBar> = (0..10u64)
        .filter(|i| *i != 4 && *i != 5)
        .map(|i| MarketBar {
            time_ms: T0 + i * 60_000,
            open: 100.0 + i as f64,
            high: 101.0 + i as f64,
            low: 99.0 + i as f64,
            close: 100.5 + i as f64,
            volume: 1.0,
            tick_volume: 10,
            ..Default::default()
        })
        .collect();
    store.upsert(0, 0, &bars, &config).unwrap();

    let mut fetched = Vec::new();
    let mut fetched_config = BarCodecConfig::default();
    store
        .fetch(0, 0, T0, T0 + 10 * 60_000, &mut fetched, &mut fetched_config)
        .unwrap();
    assert_eq!(fetched.len(), 8);

    let filled = fill_bar_gaps(&fetched, TimeFrame::M1).unwrap();
    assert_eq!(filled.len(), 10);
    assert_eq!(filled[4].close, filled[3].close);
    assert_eq!(filled[4].volume, 0.0);

    let resampled =
        resample_market_bars(&filled, TimeFrame::M1, TimeFrame::M5, fetched_config.flags).unwrap();
    assert_eq!(resampled.len(), 2);
    assert_eq!(resampled[0].open, 100.0);
    assert_eq!(resampled[0].close, filled[4].close);
    assert_eq!(resampled[1].close, 100.5 + 9.0);
    assert_eq!(resampled[0].volume, 4.0); // two gap minutes carry none
}

#[test]
fn test_csv_ingest_to_storage_pipeline() {
    let mut csv = String::from(
        "timestamp,symbol,side,size,price,tickDirection,trdMatchID,grossValue,homeNotional,foreignNotional\n",
    );
    for i in 0..100u64 {
        let side = if i % 2 == 0 { "Buy" } else { "Sell" };
        let price = 42000.0 + (i % 5) as f64 * 0.5;
        let direction = if i % 5 == 0 { "ZeroPlusTick" } else { "PlusTick" };
        csv.push_str(&format!(
            "{}.{:03},BTCUSDT,{},0.100,{:.1},{},m{},1,1,1\n",
            1_704_067_200 + i * 30,
            i % 1000,
            side,
            price,
            direction,
            i
        ));
    }

    let sequence = parse_bybit_trades(csv.as_bytes(), 1000).unwrap();
    assert_eq!(sequence.ticks.len(), 100);
    assert_eq!(sequence.price_digits, 1);
    assert_eq!(sequence.volume_digits, 1);

    let config = TickCodecConfig {
        price_digits: sequence.price_digits,
        volume_digits: sequence.volume_digits,
        trade_based: true,
        enable_tick_flags: true,
        enable_volume: true,
        ..Default::default()
    };

    let dir = tempfile::TempDir::new().unwrap();
    let store = started_store(&dir);
    store.upsert(0, 0, &sequence.ticks, &config).unwrap();

    let mut out = Vec::new();
    let mut out_config = TickCodecConfig::default();
    store
        .fetch(0, 0, T0, T0 + HOUR_MS, &mut out, &mut out_config)
        .unwrap();
    assert_eq!(out.len(), 100);
    for (orig, dec) in sequence.ticks.iter().zip(out.iter()) {
        assert_eq!(orig.time_ms, dec.time_ms);
        assert!((orig.last - dec.last).abs() < 0.05);
        assert_eq!(
            orig.has_flag(TickUpdateFlags::TickFromBuy),
            dec.has_flag(TickUpdateFlags::TickFromBuy)
        );
    }
}
