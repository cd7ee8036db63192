//! `sensor_models` — Raw onboard-sensor and radar records, unit conversions,
//! radar mounting conventions.

pub mod ego;
pub mod radar;
pub mod units;

pub use ego::EgoSample;
pub use radar::{RadarParams, RadarReturn, SensorDirection};
