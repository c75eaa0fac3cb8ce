//! Mock ultrasonic range finder

use crate::core::driver::RangeSensor;
use crate::error::{Error, Result};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Normal};

/// Farthest echo the simulated transducer reports (cm)
const MAX_RANGE_CM: f32 = 400.0;

/// Simulated range finder
pub struct MockRangeFinder {
    source: Source,
}

enum Source {
    Noisy {
        distribution: Normal<f32>,
        rng: SmallRng,
    },
    Scripted {
        readings: Vec<i64>,
        next: usize,
    },
}

impl MockRangeFinder {
    /// Readings scattered around `base_cm` and clamped to the sensor range.
    ///
    /// A seed of 0 draws from entropy; any other seed repeats the sequence.
    pub fn new(base_cm: i64, stddev_cm: f32, seed: u64) -> Result<Self> {
        let distribution = Normal::new(base_cm as f32, stddev_cm)
            .map_err(|e| Error::Config(format!("ranger noise: {}", e)))?;
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };

        Ok(Self {
            source: Source::Noisy { distribution, rng },
        })
    }

    /// Replay `readings` in order, wrapping around at the end
    pub fn scripted(readings: Vec<i64>) -> Self {
        Self {
            source: Source::Scripted { readings, next: 0 },
        }
    }
}

impl RangeSensor for MockRangeFinder {
    fn read_distance(&mut self) -> Result<i64> {
        match &mut self.source {
            Source::Noisy { distribution, rng } => {
                let echo = distribution.sample(rng).clamp(0.0, MAX_RANGE_CM);
                Ok(echo.round() as i64)
            }
            Source::Scripted { readings, next } => {
                if readings.is_empty() {
                    return Ok(0);
                }
                let reading = readings[*next % readings.len()];
                *next += 1;
                Ok(reading)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_wraps() {
        let mut ranger = MockRangeFinder::scripted(vec![10, 20]);
        let readings: Vec<i64> = (0..5).map(|_| ranger.read_distance().unwrap()).collect();
        assert_eq!(readings, vec![10, 20, 10, 20, 10]);
    }

    #[test]
    fn test_noisy_stays_near_base() {
        let mut ranger = MockRangeFinder::new(120, 2.0, 3).unwrap();
        for _ in 0..200 {
            let d = ranger.read_distance().unwrap();
            assert!((100..=140).contains(&d), "reading {} too far from base", d);
        }
    }

    #[test]
    fn test_noiseless_is_exact() {
        let mut ranger = MockRangeFinder::new(57, 0.0, 1).unwrap();
        assert_eq!(ranger.read_distance().unwrap(), 57);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = MockRangeFinder::new(80, 5.0, 42).unwrap();
        let mut b = MockRangeFinder::new(80, 5.0, 42).unwrap();
        for _ in 0..20 {
            assert_eq!(a.read_distance().unwrap(), b.read_distance().unwrap());
        }
    }

    #[test]
    fn test_clamped_to_sensor_range() {
        let mut near = MockRangeFinder::new(-50, 0.0, 1).unwrap();
        assert_eq!(near.read_distance().unwrap(), 0);
        let mut far = MockRangeFinder::new(1000, 0.0, 1).unwrap();
        assert_eq!(far.read_distance().unwrap(), 400);
    }

    #[test]
    fn test_negative_stddev_rejected() {
        assert!(matches!(
            MockRangeFinder::new(100, -1.0, 1),
            Err(Error::Config(_))
        ));
    }
}
