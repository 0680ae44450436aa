//! Small port adapters with no external service behind them.

mod system_clock;

pub use system_clock::SystemClock;
