//! Segmented bar storage.
//!
//! One store instance manages one timeframe family: the sub-database
//! names carry the timeframe (`bars_60`, `bar_metadata_60`), keeping
//! metadata keys unambiguous across timeframes. Segment windows follow
//! the timeframe table: hour segments for second bars, day segments for
//! minute/hour bars, week segments for H4/D1.

use std::collections::HashMap;

use heed::byteorder::LE;
use heed::types::{Bytes, U32, U64};
use heed::Database;
use parking_lot::Mutex;
use tracing::debug;

use crate::codec::bar_codec::{deserialize_bars, serialize_bars};
use crate::codec::EntropyCodec;
use crate::data::bars::{BarCodecConfig, BarMetadata, MarketBar, TimeFrame};
use crate::error::{DataFeedError, Result};
use crate::storage::env::StorageEnv;
use crate::storage::keys::{metadata_key, segment_key};
use crate::transform::crop::crop_bars_by_time;
use crate::transform::split::split_bars_by_segment;

type SegmentDb = Database<U64<LE>, Bytes>;
type MetadataDb = Database<U32<LE>, Bytes>;

/// Bar segment store for a single timeframe.
pub struct BarStore {
    env: StorageEnv,
    time_frame: TimeFrame,
    segment_ms: u64,
    dbs: Option<(SegmentDb, MetadataDb)>,
    metadata: Mutex<HashMap<u32, BarMetadata>>,
    entropy: EntropyCodec,
}

impl BarStore {
    /// Creates an unstarted store for one timeframe.
    pub fn new(env: StorageEnv, time_frame: TimeFrame) -> Result<Self> {
        let segment_ms = time_frame.segment_duration_ms()?;
        Ok(Self {
            env,
            time_frame,
            segment_ms,
            dbs: None,
            metadata: Mutex::new(HashMap::new()),
            entropy: EntropyCodec::default(),
        })
    }

    /// The timeframe this store manages.
    pub fn time_frame(&self) -> TimeFrame {
        self.time_frame
    }

    /// Opens the sub-databases and primes the metadata cache.
    pub fn start(&mut self) -> Result<()> {
        let bars_name = format!("bars_{}", self.time_frame as u32);
        let meta_name = format!("bar_metadata_{}", self.time_frame as u32);

        let mut wtxn = self.env.raw().write_txn()?;
        let bars_db: SegmentDb = self
            .env
            .raw()
            .create_database(&mut wtxn, Some(&bars_name))?;
        let meta_db: MetadataDb = self
            .env
            .raw()
            .create_database(&mut wtxn, Some(&meta_name))?;

        let mut cache = HashMap::new();
        for entry in meta_db.iter(&wtxn)? {
            let (key, bytes) = entry?;
            if let Some(meta) = BarMetadata::from_bytes(bytes) {
                cache.insert(key, meta);
            }
        }
        wtxn.commit()?;

        debug!(
            time_frame = ?self.time_frame,
            metadata_records = cache.len(),
            "bar store started"
        );
        *self.metadata.lock() = cache;
        self.dbs = Some((bars_db, meta_db));
        Ok(())
    }

    fn dbs(&self) -> Result<(SegmentDb, MetadataDb)> {
        self.dbs.ok_or(DataFeedError::StorageNotInitialized)
    }

    /// Metadata for one (symbol, provider) pair, from the cache.
    pub fn metadata(&self, symbol_id: u16, provider_id: u16) -> Option<BarMetadata> {
        self.metadata
            .lock()
            .get(&metadata_key(symbol_id, provider_id))
            .copied()
    }

    /// Inserts or replaces bar data in timeframe segments.
    pub fn upsert(
        &self,
        symbol_id: u16,
        provider_id: u16,
        bars: &[MarketBar],
        config: &BarCodecConfig,
    ) -> Result<()> {
        config.validate()?;
        if config.time_frame != self.time_frame {
            return Err(DataFeedError::InvalidConfig(format!(
                "store manages {:?}, config says {:?}",
                self.time_frame, config.time_frame
            )));
        }
        let (bars_db, meta_db) = self.dbs()?;
        if bars.is_empty() {
            return Ok(());
        }

        let segments = split_bars_by_segment(bars, self.time_frame)?;
        let batch_start = bars[0].time_ms;
        let batch_end = bars[bars.len() - 1].time_ms;

        let key = metadata_key(symbol_id, provider_id);
        let updated_meta = {
            let cache = self.metadata.lock();
            match cache.get(&key) {
                None => BarMetadata {
                    start_ts: batch_start,
                    end_ts: batch_end,
                    expiration_time_ms: config.expiration_time_ms,
                    next_expiration_time_ms: config.next_expiration_time_ms,
                    tick_size: config.tick_size,
                    time_frame: self.time_frame,
                    flags: config.flags,
                    count: bars.len() as u32,
                    symbol_id,
                    provider_id,
                    price_digits: config.price_digits,
                    volume_digits: config.volume_digits,
                    quote_volume_digits: config.quote_volume_digits,
                },
                Some(existing) => {
                    let mut meta = *existing;
                    meta.start_ts = meta.start_ts.min(batch_start);
                    meta.end_ts = meta.end_ts.max(batch_end);
                    meta.expiration_time_ms = config.expiration_time_ms;
                    meta.next_expiration_time_ms = config.next_expiration_time_ms;
                    meta.count = meta.count.saturating_add(bars.len() as u32);
                    meta
                }
            }
        };

        let mut wtxn = self.env.raw().write_txn()?;
        meta_db.put(&mut wtxn, &key, &updated_meta.to_bytes())?;

        let mut columnar = Vec::new();
        for range in segments {
            let segment = &bars[range];
            let window = (segment[0].time_ms / self.segment_ms) as u32;
            serialize_bars(segment, config, &mut columnar)?;
            let blob = self.entropy.compress(&columnar)?;
            bars_db.put(&mut wtxn, &segment_key(symbol_id, provider_id, window), &blob)?;
        }
        wtxn.commit()?;

        self.metadata.lock().insert(key, updated_meta);
        Ok(())
    }

    /// Fetches bars in `[start_ts, end_ts)`. Missing segments are gaps.
    pub fn fetch(
        &self,
        symbol_id: u16,
        provider_id: u16,
        start_ts: u64,
        end_ts: u64,
        bars: &mut Vec<MarketBar>,
        config: &mut BarCodecConfig,
    ) -> Result<bool> {
        let (bars_db, _) = self.dbs()?;
        bars.clear();
        if end_ts <= start_ts {
            return Ok(false);
        }

        let start_window = start_ts / self.segment_ms;
        let end_window = (end_ts - 1) / self.segment_ms;

        let result = (|| -> Result<()> {
            let rtxn = self.env.raw().read_txn()?;
            for window in start_window..=end_window {
                let key = segment_key(symbol_id, provider_id, window as u32);
                if let Some(blob) = bars_db.get(&rtxn, &key)? {
                    let columnar = self.entropy.decompress(blob)?;
                    deserialize_bars(&columnar, bars, config)?;
                }
            }
            Ok(())
        })();
        if let Err(err) = result {
            bars.clear();
            return Err(err);
        }

        crop_bars_by_time(bars, start_ts, end_ts);
        Ok(!bars.is_empty())
    }
}
