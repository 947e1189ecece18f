pub mod decimal;
mod sensor_reading;

pub use sensor_reading::{SensorName, SensorReading};
