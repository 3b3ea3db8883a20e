pub mod clock;
pub mod metrics;
pub mod telemetry;

pub use clock::*;
pub use metrics::*;
pub use telemetry::*;
