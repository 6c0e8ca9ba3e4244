pub mod holding;
pub mod market;

pub use holding::{Holding, HoldingInput};
pub use market::{Interval, Period, PriceBar, PriceSeries, TickerSnapshot};
