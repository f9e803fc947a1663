use std::ops::RangeInclusive;

use chrono::{Local, NaiveDateTime, SubsecRound};
use rand::Rng;

use incubator_types::models::NewReading;

/// Incubator temperature band in °C.
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 36.0..=37.5;

/// Relative humidity band in percent.
pub const HUMIDITY_RANGE: RangeInclusive<f64> = 45.0..=55.0;

/// Local wall-clock time truncated to the second.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// One synthetic reading for `serial_number`, uniformly sampled in both bands.
pub fn synthesize<R: Rng + ?Sized>(
    serial_number: &str,
    timestamp: NaiveDateTime,
    rng: &mut R,
) -> NewReading {
    NewReading {
        serial_number: serial_number.to_string(),
        timestamp,
        temperature: round2(rng.random_range(TEMPERATURE_RANGE)),
        humidity: round2(rng.random_range(HUMIDITY_RANGE)),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn samples_stay_in_band_with_two_decimals() {
        let mut rng = rand::rng();
        let ts = now();
        for _ in 0..2000 {
            let r = synthesize("DEV-1", ts, &mut rng);
            assert!(TEMPERATURE_RANGE.contains(&r.temperature), "{}", r.temperature);
            assert!(HUMIDITY_RANGE.contains(&r.humidity), "{}", r.humidity);
            for v in [r.temperature, r.humidity] {
                assert!(((v * 100.0).round() - v * 100.0).abs() < 1e-6, "{v}");
            }
        }
    }

    #[test]
    fn timestamps_have_second_resolution() {
        assert_eq!(now().nanosecond(), 0);
    }

    #[test]
    fn reading_carries_serial_and_timestamp() {
        let ts = now();
        let r = synthesize("DEV-42", ts, &mut rand::rng());
        assert_eq!(r.serial_number, "DEV-42");
        assert_eq!(r.timestamp, ts);
    }
}
