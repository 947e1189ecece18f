pub mod domain;
pub mod normalize;

pub use domain::{SensorName, SensorReading};
pub use normalize::{normalize, NormalizeError, SchemaError, ValidationError};
