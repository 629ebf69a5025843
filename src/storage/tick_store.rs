//! Hourly segmented tick storage.
//!
//! One compressed blob per (symbol, provider, hour) in the `ticks`
//! sub-database, one fixed 64-byte record per (symbol, provider) in
//! `tick_metadata`. Upserts replace whole hour segments; partial-hour
//! merges are unsupported by design. A metadata cache fronts the
//! metadata sub-database and is updated only after the owning write
//! transaction commits.

use std::collections::HashMap;

use heed::byteorder::LE;
use heed::types::{Bytes, U32, U64};
use heed::Database;
use parking_lot::Mutex;
use tracing::debug;

use crate::codec::{EntropyCodec, TickCompressor};
use crate::data::ticks::{MarketTick, TickCodecConfig, TickMetadata};
use crate::error::{DataFeedError, Result};
use crate::storage::env::StorageEnv;
use crate::storage::keys::{metadata_key, segment_key};
use crate::transform::crop::crop_ticks_by_time;
use crate::transform::split::split_ticks_by_hour;
use crate::utils::math::precision_tolerance;
use crate::utils::time::{hour_of_ms, start_of_hour_ms};

const TICKS_DB: &str = "ticks";
const METADATA_DB: &str = "tick_metadata";

type SegmentDb = Database<U64<LE>, Bytes>;
type MetadataDb = Database<U32<LE>, Bytes>;

/// Tick segment store over the shared environment.
pub struct TickStore {
    env: StorageEnv,
    dbs: Option<(SegmentDb, MetadataDb)>,
    metadata: Mutex<HashMap<u32, TickMetadata>>,
    compressor: Mutex<TickCompressor>,
}

impl TickStore {
    /// Creates an unstarted store.
    pub fn new(env: StorageEnv) -> Self {
        Self {
            env,
            dbs: None,
            metadata: Mutex::new(HashMap::new()),
            compressor: Mutex::new(TickCompressor::new()),
        }
    }

    /// Creates an unstarted store with an explicit entropy codec.
    pub fn with_entropy(env: StorageEnv, entropy: EntropyCodec) -> Self {
        Self {
            env,
            dbs: None,
            metadata: Mutex::new(HashMap::new()),
            compressor: Mutex::new(TickCompressor::with_entropy(entropy)),
        }
    }

    /// Opens the sub-databases and primes the metadata cache.
    pub fn start(&mut self) -> Result<()> {
        let mut wtxn = self.env.raw().write_txn()?;
        let ticks_db: SegmentDb = self.env.raw().create_database(&mut wtxn, Some(TICKS_DB))?;
        let meta_db: MetadataDb = self
            .env
            .raw()
            .create_database(&mut wtxn, Some(METADATA_DB))?;

        let mut cache = HashMap::new();
        for entry in meta_db.iter(&wtxn)? {
            let (key, bytes) = entry?;
            if let Some(meta) = TickMetadata::from_bytes(bytes) {
                cache.insert(key, meta);
            }
        }
        wtxn.commit()?;

        debug!(metadata_records = cache.len(), "tick store started");
        *self.metadata.lock() = cache;
        self.dbs = Some((ticks_db, meta_db));
        Ok(())
    }

    fn dbs(&self) -> Result<(SegmentDb, MetadataDb)> {
        self.dbs.ok_or(DataFeedError::StorageNotInitialized)
    }

    /// Metadata for one (symbol, provider) pair, from the cache.
    pub fn metadata(&self, symbol_id: u16, provider_id: u16) -> Option<TickMetadata> {
        self.metadata
            .lock()
            .get(&metadata_key(symbol_id, provider_id))
            .copied()
    }

    /// All cached metadata records.
    pub fn cached_metadata(&self) -> Vec<TickMetadata> {
        self.metadata.lock().values().copied().collect()
    }

    /// Inserts or updates a metadata record on its own.
    pub fn upsert_metadata(&self, meta: &TickMetadata) -> Result<()> {
        let (_, meta_db) = self.dbs()?;
        let key = metadata_key(meta.symbol_id, meta.provider_id);
        if self.metadata.lock().get(&key) == Some(meta) {
            return Ok(());
        }

        let mut wtxn = self.env.raw().write_txn()?;
        meta_db.put(&mut wtxn, &key, &meta.to_bytes())?;
        wtxn.commit()?;
        self.metadata.lock().insert(key, *meta);
        Ok(())
    }

    /// Inserts or replaces tick data in hourly segments.
    ///
    /// All segments touched by the batch plus the metadata update commit
    /// in a single write transaction; a failure rolls everything back and
    /// leaves the cache untouched.
    pub fn upsert(
        &self,
        symbol_id: u16,
        provider_id: u16,
        ticks: &[MarketTick],
        config: &TickCodecConfig,
    ) -> Result<()> {
        config.validate()?;
        let (ticks_db, meta_db) = self.dbs()?;
        if ticks.is_empty() {
            return Ok(());
        }

        let segments = split_ticks_by_hour(ticks)?;
        let batch_start = ticks[0].time_ms;
        let batch_end = ticks[ticks.len() - 1].time_ms;

        let key = metadata_key(symbol_id, provider_id);
        let updated_meta = {
            let cache = self.metadata.lock();
            match cache.get(&key) {
                None => TickMetadata::from_config(symbol_id, provider_id, config, batch_start, batch_end),
                Some(existing) => {
                    let mut meta = *existing;
                    // Precision changes only apply once the batch reaches
                    // the stored end hour; older backfills keep the
                    // precision the newest data was written with.
                    if start_of_hour_ms(batch_end) >= start_of_hour_ms(meta.end_ts) {
                        meta.price_digits = config.price_digits;
                        meta.volume_digits = config.volume_digits;
                        meta.price_tick_size = precision_tolerance(config.price_digits);
                        meta.volume_step_size = precision_tolerance(config.volume_digits);
                    }
                    meta.start_ts = meta.start_ts.min(batch_start);
                    meta.end_ts = meta.end_ts.max(batch_end);
                    meta
                }
            }
        };

        let mut wtxn = self.env.raw().write_txn()?;
        meta_db.put(&mut wtxn, &key, &updated_meta.to_bytes())?;

        let mut compressor = self.compressor.lock();
        for range in segments {
            let segment = &ticks[range];
            let unix_hour = hour_of_ms(segment[0].time_ms) as u32;
            let blob = compressor.compress(segment, config)?;
            ticks_db.put(
                &mut wtxn,
                &segment_key(symbol_id, provider_id, unix_hour),
                &blob,
            )?;
        }
        wtxn.commit()?;

        self.metadata.lock().insert(key, updated_meta);
        Ok(())
    }

    /// Fetches ticks in `[start_ts, end_ts)`, appending nothing on error.
    ///
    /// Missing hour segments are legal gaps, not errors. The out-config
    /// carries the precision of the last decoded segment. Returns whether
    /// any ticks were found.
    pub fn fetch(
        &self,
        symbol_id: u16,
        provider_id: u16,
        start_ts: u64,
        end_ts: u64,
        ticks: &mut Vec<MarketTick>,
        config: &mut TickCodecConfig,
    ) -> Result<bool> {
        let (ticks_db, _) = self.dbs()?;
        ticks.clear();
        if end_ts <= start_ts {
            return Ok(false);
        }

        let start_hour = hour_of_ms(start_ts);
        let end_hour = hour_of_ms(end_ts - 1);

        let result = (|| -> Result<()> {
            let rtxn = self.env.raw().read_txn()?;
            let mut compressor = self.compressor.lock();
            for unix_hour in start_hour..=end_hour {
                let key = segment_key(symbol_id, provider_id, unix_hour as u32);
                if let Some(blob) = ticks_db.get(&rtxn, &key)? {
                    compressor.decompress(blob, ticks, config)?;
                }
            }
            Ok(())
        })();
        if let Err(err) = result {
            ticks.clear();
            return Err(err);
        }

        crop_ticks_by_time(ticks, start_ts, end_ts);
        Ok(!ticks.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ticks::TickUpdateFlags;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, TickStore) {
        let dir = TempDir::new().unwrap();
        let env = StorageEnv::open_with(dir.path(), 64 * 1024 * 1024, 8).unwrap();
        let mut store = TickStore::new(env);
        store.start().unwrap();
        (dir, store)
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

    fn make_hour(base_ms: u64, count: usize) -> Vec<MarketTick> {
        let prices = [10000.00, 10000.01, 10000.02, 10000.03];
        (0..count)
            .map(|i| {
                let mut tick =
                    MarketTick::trade(prices[i % 4], 0.5, base_ms + (i as u64) * 3600, 0);
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

    #[test]
    fn test_upsert_fetch_roundtrip() {
        let (_dir, store) = open_store();
        let base = 1_704_067_200_000u64;
        let ticks = make_hour(base, 1000);
        store.upsert(1, 2, &ticks, &trade_config()).unwrap();

        let mut out = Vec::new();
        let mut config = TickCodecConfig::default();
        let found = store
            .fetch(1, 2, base, base + 3_600_000, &mut out, &mut config)
            .unwrap();
        assert!(found);
        assert_eq!(out.len(), 1000);
        assert_eq!(config.price_digits, 2);
        for (orig, dec) in ticks.iter().zip(out.iter()) {
            assert_eq!(orig.time_ms, dec.time_ms);
            assert!((orig.last - dec.last).abs() < 0.005);
        }
    }

    #[test]
    fn test_fetch_crops_to_range() {
        let (_dir, store) = open_store();
        let base = 1_704_067_200_000u64;
        let mut ticks = make_hour(base, 1000);
        ticks.extend(make_hour(base + 3_600_000, 1000));
        store.upsert(1, 2, &ticks, &trade_config()).unwrap();

        let start = base + 1_800_000;
        let end = base + 5_400_000;
        let mut out = Vec::new();
        let mut config = TickCodecConfig::default();
        store.fetch(1, 2, start, end, &mut out, &mut config).unwrap();
        assert_eq!(out.len(), 1000);
        assert!(out.first().unwrap().time_ms >= start);
        assert!(out.last().unwrap().time_ms < end);
    }

    #[test]
    fn test_missing_hours_are_gaps() {
        let (_dir, store) = open_store();
        let base = 1_704_067_200_000u64;
        store.upsert(1, 2, &make_hour(base, 10), &trade_config()).unwrap();

        let mut out = Vec::new();
        let mut config = TickCodecConfig::default();
        let found = store
            .fetch(
                1,
                2,
                base + 7_200_000,
                base + 10_800_000,
                &mut out,
                &mut config,
            )
            .unwrap();
        assert!(!found);
        assert!(out.is_empty());
    }

    #[test]
    fn test_out_of_order_batch_rejected_without_side_effects() {
        let (_dir, store) = open_store();
        let base = 1_704_067_200_000u64;
        let ticks = vec![
            MarketTick::trade(1.0, 1.0, base + 1000, TickUpdateFlags::TickFromBuy as u64),
            MarketTick::trade(1.0, 1.0, base + 2000, TickUpdateFlags::TickFromBuy as u64),
            MarketTick::trade(1.0, 1.0, base + 1500, TickUpdateFlags::TickFromBuy as u64),
        ];
        let err = store.upsert(1, 2, &ticks, &trade_config());
        assert!(matches!(err, Err(DataFeedError::OutOfOrder(2))));
        assert!(store.metadata(1, 2).is_none());

        let mut out = Vec::new();
        let mut config = TickCodecConfig::default();
        let found = store
            .fetch(1, 2, base, base + 3_600_000, &mut out, &mut config)
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn test_metadata_extends_monotonically() {
        let (_dir, store) = open_store();
        let base = 1_704_067_200_000u64;
        store
            .upsert(1, 2, &make_hour(base + 3_600_000, 10), &trade_config())
            .unwrap();
        let meta = store.metadata(1, 2).unwrap();
        let (s0, e0) = (meta.start_ts, meta.end_ts);

        // Backfill an earlier hour: start shrinks, end stays.
        store.upsert(1, 2, &make_hour(base, 10), &trade_config()).unwrap();
        let meta = store.metadata(1, 2).unwrap();
        assert!(meta.start_ts < s0);
        assert_eq!(meta.end_ts, e0);

        // Append a later hour: end grows, start stays.
        store
            .upsert(1, 2, &make_hour(base + 7_200_000, 10), &trade_config())
            .unwrap();
        let meta = store.metadata(1, 2).unwrap();
        assert!(meta.end_ts > e0);
    }

    #[test]
    fn test_segment_replacement_is_whole_hour() {
        let (_dir, store) = open_store();
        let base = 1_704_067_200_000u64;
        store.upsert(1, 2, &make_hour(base, 1000), &trade_config()).unwrap();
        // Re-upsert the same hour with fewer ticks: the old segment is
        // replaced in full, not merged.
        store.upsert(1, 2, &make_hour(base, 10), &trade_config()).unwrap();

        let mut out = Vec::new();
        let mut config = TickCodecConfig::default();
        store
            .fetch(1, 2, base, base + 3_600_000, &mut out, &mut config)
            .unwrap();
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_not_started_rejected() {
        let dir = TempDir::new().unwrap();
        let env = StorageEnv::open_with(dir.path(), 64 * 1024 * 1024, 8).unwrap();
        let store = TickStore::new(env);
        let mut out = Vec::new();
        let mut config = TickCodecConfig::default();
        assert!(matches!(
            store.fetch(1, 2, 0, 1000, &mut out, &mut config),
            Err(DataFeedError::StorageNotInitialized)
        ));
    }

    #[test]
    fn test_metadata_survives_restart() {
        let dir = TempDir::new().unwrap();
        let base = 1_704_067_200_000u64;
        {
            let env = StorageEnv::open_with(dir.path(), 64 * 1024 * 1024, 8).unwrap();
            let mut store = TickStore::new(env);
            store.start().unwrap();
            store.upsert(5, 9, &make_hour(base, 10), &trade_config()).unwrap();
        }
        let env = StorageEnv::open_with(dir.path(), 64 * 1024 * 1024, 8).unwrap();
        let mut store = TickStore::new(env);
        store.start().unwrap();
        let meta = store.metadata(5, 9).unwrap();
        assert_eq!(meta.symbol_id, 5);
        assert_eq!(meta.provider_id, 9);
        assert_eq!(meta.price_digits, 2);
    }
}
