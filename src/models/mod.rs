pub mod calibration;
pub mod market;
pub mod signal;
pub mod snapshot;

pub use calibration::{CalibrationBin, CalibrationReport, CategoryScore, Forecast};
pub use market::{Market, MarketStatus, Resolution};
pub use signal::{Direction, Evidence, Signal, SignalDetails, SignalStatus, SignalType};
pub use snapshot::Snapshot;
