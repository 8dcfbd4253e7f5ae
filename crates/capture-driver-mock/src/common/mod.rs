//! Common infrastructure for the mock frame source.
//!
//! - **mode**: Producer modes (manual, free-running)
//! - **timing**: Frame period and device-clock stamping
//! - **errors**: Fault injection
//! - **rng**: Seeded random number generator

pub mod errors;
pub mod mode;
pub mod rng;
pub mod timing;

pub use errors::{FaultConfig, FaultScenario};
pub use mode::ProducerMode;
pub use rng::MockRng;
pub use timing::FrameTiming;
