//! Market data entities: ticks, bars, funding, fixed-size metadata records.

pub mod bars;
pub mod funding;
pub mod ticks;

pub use bars::{
    BarCodecConfig, BarMetadata, BarSequence, BarStorageFlags, MarketBar, TimeFrame,
};
pub use funding::{
    binance_funding_payment, bybit_funding_payment, FundingCalcType, FundingDetails,
    FundingMetadata, FundingRate, FundingRateSequence,
};
pub use ticks::{
    BidAskModel, BidAskRestoreConfig, MarketTick, MarketTickSpan, TickCodecConfig, TickMetadata,
    TickSequence, TickStatusFlags, TickUpdateFlags,
};
