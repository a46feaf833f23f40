//! Unit calibration for raw sensor values.
//!
//! Devices report milliunits. The reporting database expects engineering units
//! rounded exactly the way the legacy reporting system rounds them: divide by
//! 1000, scale, round half away from zero in `f64`, unscale. The expression is
//! evaluated in that order so results stay bit-identical, including the cases
//! where binary floating point lands just below a half (raw 1005 gives 1.0).

use common::domain::SensorValues;

const MILLIUNITS_PER_UNIT: f64 = 1000.0;

/// Two decimal places (sensor1, sensor2)
const TWO_DECIMALS: f64 = 100.0;

/// Four decimal places (sensor3, sensor4)
const FOUR_DECIMALS: f64 = 10000.0;

fn calibrate(raw: f64, scale: f64) -> f64 {
    (raw / MILLIUNITS_PER_UNIT * scale).round() / scale
}

pub fn calibrate_two_decimals(raw: f64) -> f64 {
    calibrate(raw, TWO_DECIMALS)
}

pub fn calibrate_four_decimals(raw: f64) -> f64 {
    calibrate(raw, FOUR_DECIMALS)
}

/// Calibrate the four raw channel values of a full reading
pub fn calibrate_sensors(raw: [f64; 4]) -> SensorValues {
    SensorValues {
        sensor1: calibrate_two_decimals(raw[0]),
        sensor2: calibrate_two_decimals(raw[1]),
        sensor3: calibrate_four_decimals(raw[2]),
        sensor4: calibrate_four_decimals(raw[3]),
    }
}
