//! Pure transforms over tick and bar series: time cropping, segment
//! splitting, gap filling, and resampling.

pub mod crop;
pub mod gap_fill;
pub mod resample;
pub mod split;

pub use crop::{crop_bars_by_time, crop_ticks_by_time};
pub use gap_fill::fill_bar_gaps;
pub use resample::{resample_market_bars, resample_market_bars_in_place};
pub use split::{split_bars_by_segment, split_rates_by_day, split_ticks_by_hour};
