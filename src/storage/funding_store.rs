//! Funding rate storage in day segments.
//!
//! Funding observations are tiny fixed records (32 bytes), so segments
//! are stored as raw record concatenations without the entropy stage.

use std::collections::HashMap;

use heed::byteorder::LE;
use heed::types::{Bytes, U32, U64};
use heed::Database;
use parking_lot::Mutex;

use crate::data::funding::{FundingMetadata, FundingRate, FUNDING_RATE_SIZE};
use crate::error::{DataFeedError, Result};
use crate::storage::env::StorageEnv;
use crate::storage::keys::{metadata_key, segment_key};
use crate::transform::split::split_rates_by_day;
use crate::utils::time::day_of_ms;

const FUNDING_DB: &str = "funding";
const METADATA_DB: &str = "funding_metadata";

type SegmentDb = Database<U64<LE>, Bytes>;
type MetadataDb = Database<U32<LE>, Bytes>;

/// Funding rate store over the shared environment.
pub struct FundingStore {
    env: StorageEnv,
    dbs: Option<(SegmentDb, MetadataDb)>,
    metadata: Mutex<HashMap<u32, FundingMetadata>>,
}

impl FundingStore {
    /// Creates an unstarted store.
    pub fn new(env: StorageEnv) -> Self {
        Self {
            env,
            dbs: None,
            metadata: Mutex::new(HashMap::new()),
        }
    }

    /// Opens the sub-databases and primes the metadata cache.
    pub fn start(&mut self) -> Result<()> {
        let mut wtxn = self.env.raw().write_txn()?;
        let funding_db: SegmentDb = self.env.raw().create_database(&mut wtxn, Some(FUNDING_DB))?;
        let meta_db: MetadataDb = self
            .env
            .raw()
            .create_database(&mut wtxn, Some(METADATA_DB))?;

        let mut cache = HashMap::new();
        for entry in meta_db.iter(&wtxn)? {
            let (key, bytes) = entry?;
            if let Some(meta) = FundingMetadata::from_bytes(bytes) {
                cache.insert(key, meta);
            }
        }
        wtxn.commit()?;

        *self.metadata.lock() = cache;
        self.dbs = Some((funding_db, meta_db));
        Ok(())
    }

    fn dbs(&self) -> Result<(SegmentDb, MetadataDb)> {
        self.dbs.ok_or(DataFeedError::StorageNotInitialized)
    }

    /// Metadata for one (symbol, provider) pair, from the cache.
    pub fn metadata(&self, symbol_id: u16, provider_id: u16) -> Option<FundingMetadata> {
        self.metadata
            .lock()
            .get(&metadata_key(symbol_id, provider_id))
            .copied()
    }

    /// Inserts or replaces funding data in day segments.
    pub fn upsert(
        &self,
        symbol_id: u16,
        provider_id: u16,
        rates: &[FundingRate],
        period_ms: u64,
    ) -> Result<()> {
        let (funding_db, meta_db) = self.dbs()?;
        if rates.is_empty() {
            return Ok(());
        }

        let segments = split_rates_by_day(rates)?;
        let batch_start = rates[0].time_ms;
        let batch_end = rates[rates.len() - 1].time_ms;

        let key = metadata_key(symbol_id, provider_id);
        let updated_meta = {
            let cache = self.metadata.lock();
            match cache.get(&key) {
                None => FundingMetadata {
                    start_ts: batch_start,
                    end_ts: batch_end,
                    period_ms,
                    flags: 0,
                    symbol_id,
                    provider_id,
                },
                Some(existing) => {
                    let mut meta = *existing;
                    meta.start_ts = meta.start_ts.min(batch_start);
                    meta.end_ts = meta.end_ts.max(batch_end);
                    meta.period_ms = period_ms;
                    meta
                }
            }
        };

        let mut wtxn = self.env.raw().write_txn()?;
        meta_db.put(&mut wtxn, &key, &updated_meta.to_bytes())?;

        for range in segments {
            let segment = &rates[range];
            let day = day_of_ms(segment[0].time_ms) as u32;
            let mut blob = Vec::with_capacity(segment.len() * FUNDING_RATE_SIZE);
            for rate in segment {
                blob.extend_from_slice(&rate.to_bytes());
            }
            funding_db.put(&mut wtxn, &segment_key(symbol_id, provider_id, day), &blob)?;
        }
        wtxn.commit()?;

        self.metadata.lock().insert(key, updated_meta);
        Ok(())
    }

    /// Fetches funding rates in `[start_ts, end_ts)`.
    pub fn fetch(
        &self,
        symbol_id: u16,
        provider_id: u16,
        start_ts: u64,
        end_ts: u64,
        rates: &mut Vec<FundingRate>,
    ) -> Result<bool> {
        let (funding_db, _) = self.dbs()?;
        rates.clear();
        if end_ts <= start_ts {
            return Ok(false);
        }

        let rtxn = self.env.raw().read_txn()?;
        for day in day_of_ms(start_ts)..=day_of_ms(end_ts - 1) {
            let key = segment_key(symbol_id, provider_id, day as u32);
            let Some(blob) = funding_db.get(&rtxn, &key)? else {
                continue;
            };
            if blob.len() % FUNDING_RATE_SIZE != 0 {
                rates.clear();
                return Err(DataFeedError::Overflow(
                    "funding segment length is not a whole record count".into(),
                ));
            }
            for chunk in blob.chunks_exact(FUNDING_RATE_SIZE) {
                // from_bytes only fails on short input, excluded above.
                rates.push(FundingRate::from_bytes(chunk).expect("fixed-size chunk"));
            }
        }
        drop(rtxn);

        let tail = rates.partition_point(|r| r.time_ms < end_ts);
        rates.truncate(tail);
        let head = rates.partition_point(|r| r.time_ms < start_ts);
        if head > 0 {
            rates.drain(..head);
        }
        Ok(!rates.is_empty())
    }
}
