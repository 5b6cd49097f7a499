//! Human-likeness simulation
//!
//! Generates the randomized delays, mouse trajectories and typing cadence
//! used to pace browser input. Pure generation with no browser dependency,
//! so every property here is unit-testable.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Floor applied to every configured delay range. Anything faster reads as
/// scripted input rather than a person.
pub const MIN_DELAY_FLOOR_MS: u64 = 300;

/// Per-keystroke delay for ordinary characters, milliseconds.
pub const KEY_DELAY_MS: (u64, u64) = (50, 150);

/// Per-keystroke delay for uppercase, digits and symbols (shifted keys take
/// longer to reach).
pub const SLOW_KEY_DELAY_MS: (u64, u64) = (100, 200);

/// Occasional hesitation pause inserted mid-word, milliseconds.
pub const HESITATION_MS: (u64, u64) = (200, 500);

/// Probability of a hesitation pause before any given keystroke.
pub const HESITATION_CHANCE: f64 = 0.06;

/// An inclusive delay range in milliseconds.
///
/// Construction clamps the range into shape: `min` is raised to at least
/// [`MIN_DELAY_FLOOR_MS`], and an inverted range collapses to `min == max`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayRange {
    min_ms: u64,
    max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        let min_ms = min_ms.max(MIN_DELAY_FLOOR_MS);
        let max_ms = max_ms.max(min_ms);
        Self { min_ms, max_ms }
    }

    pub fn min_ms(&self) -> u64 {
        self.min_ms
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms
    }

    /// Draw a delay from the range, inclusive on both ends.
    pub fn sample(&self, rng: &mut impl Rng) -> u64 {
        rng.gen_range(self.min_ms..=self.max_ms)
    }

    /// Sleep for a freshly sampled delay.
    pub async fn wait(&self) {
        let ms = self.sample(&mut StdRng::from_entropy());
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// A point in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// Generate a cursor trajectory from `start` to `end` in `steps` increments.
///
/// Returns exactly `steps + 1` points. Every point carries jitter of at most
/// `jitter` in each axis, including the endpoints, so the first point lands
/// near `start` and the last near `end` without being pixel-perfect.
pub fn mouse_path(
    start: Point,
    end: Point,
    steps: usize,
    jitter: f64,
    rng: &mut impl Rng,
) -> Vec<Point> {
    let steps = steps.max(1);
    let mut points = Vec::with_capacity(steps + 1);
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        let jx = if jitter > 0.0 { rng.gen_range(-jitter..=jitter) } else { 0.0 };
        let jy = if jitter > 0.0 { rng.gen_range(-jitter..=jitter) } else { 0.0 };
        points.push(Point {
            x: start.x + (end.x - start.x) * t + jx,
            y: start.y + (end.y - start.y) * t + jy,
        });
    }
    points
}

/// Pick a step count for a move of the given distance. Longer moves get more
/// intermediate points, capped so short hops stay snappy.
pub fn steps_for_distance(distance: f64) -> usize {
    ((8.0 + distance / 30.0).min(40.0)) as usize
}

/// Per-step pacing for a trajectory: slow at the ends, fast through the
/// middle, with a little noise on top.
pub fn step_delay(t: f64, rng: &mut impl Rng) -> Duration {
    let speed = 1.0 - (2.0 * t - 1.0).abs();
    let ms = 8.0 + 12.0 * (1.0 - speed) + rng.gen_range(0.0..5.0);
    Duration::from_millis(ms as u64)
}

/// One keystroke with the pause that precedes it.
#[derive(Debug, Clone)]
pub struct Keystroke {
    pub ch: char,
    pub delay: Duration,
}

fn is_slow_char(ch: char) -> bool {
    ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch.is_ascii_punctuation()
}

/// Produce a typing plan for `text`: one entry per character, each with a
/// randomized delay. Shifted characters type slower, and an occasional
/// hesitation pause is inserted to break up the rhythm.
pub fn typing_plan(text: &str, rng: &mut impl Rng) -> Vec<Keystroke> {
    text.chars()
        .map(|ch| {
            let (lo, hi) = if is_slow_char(ch) { SLOW_KEY_DELAY_MS } else { KEY_DELAY_MS };
            let mut ms = rng.gen_range(lo..=hi);
            if rng.gen_bool(HESITATION_CHANCE) {
                ms += rng.gen_range(HESITATION_MS.0..=HESITATION_MS.1);
            }
            Keystroke { ch, delay: Duration::from_millis(ms) }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn delay_samples_stay_in_range() {
        let range = DelayRange::new(500, 1200);
        let mut rng = rng();
        for _ in 0..1000 {
            let ms = range.sample(&mut rng);
            assert!((500..=1200).contains(&ms));
        }
    }

    #[test]
    fn delay_min_is_floored() {
        let range = DelayRange::new(50, 1000);
        assert_eq!(range.min_ms(), MIN_DELAY_FLOOR_MS);
        assert_eq!(range.max_ms(), 1000);
    }

    #[test]
    fn inverted_delay_range_collapses() {
        let range = DelayRange::new(2000, 100);
        assert_eq!(range.min_ms(), 2000);
        assert_eq!(range.max_ms(), 2000);
        let mut rng = rng();
        assert_eq!(range.sample(&mut rng), 2000);
    }

    #[test]
    fn mouse_path_has_steps_plus_one_points() {
        let mut rng = rng();
        for steps in [1usize, 3, 7, 25] {
            let path = mouse_path(Point::new(10.0, 10.0), Point::new(600.0, 400.0), steps, 5.0, &mut rng);
            assert_eq!(path.len(), steps + 1);
        }
    }

    #[test]
    fn mouse_path_endpoints_within_jitter() {
        let start = Point::new(50.0, 80.0);
        let end = Point::new(700.0, 300.0);
        let jitter = 5.0;
        let mut rng = rng();
        for _ in 0..100 {
            let path = mouse_path(start, end, 6, jitter, &mut rng);
            let first = path.first().unwrap();
            let last = path.last().unwrap();
            assert!((first.x - start.x).abs() <= jitter);
            assert!((first.y - start.y).abs() <= jitter);
            assert!((last.x - end.x).abs() <= jitter);
            assert!((last.y - end.y).abs() <= jitter);
        }
    }

    #[test]
    fn mouse_path_jitter_is_bounded_everywhere() {
        let start = Point::new(0.0, 0.0);
        let end = Point::new(100.0, 0.0);
        let jitter = 4.0;
        let mut rng = rng();
        let steps = 10;
        let path = mouse_path(start, end, steps, jitter, &mut rng);
        for (i, p) in path.iter().enumerate() {
            let t = i as f64 / steps as f64;
            let expected_x = 100.0 * t;
            assert!((p.x - expected_x).abs() <= jitter);
            assert!(p.y.abs() <= jitter);
        }
    }

    #[test]
    fn mouse_path_zero_steps_clamped() {
        let mut rng = rng();
        let path = mouse_path(Point::new(0.0, 0.0), Point::new(10.0, 10.0), 0, 0.0, &mut rng);
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn typing_plan_covers_every_char() {
        let mut rng = rng();
        let plan = typing_plan("user@example.com", &mut rng);
        assert_eq!(plan.len(), "user@example.com".chars().count());
        let typed: String = plan.iter().map(|k| k.ch).collect();
        assert_eq!(typed, "user@example.com");
    }

    #[test]
    fn typing_plan_delays_within_bounds() {
        let mut rng = rng();
        let plan = typing_plan("Abc123!xyz", &mut rng);
        let max_ms = SLOW_KEY_DELAY_MS.1 + HESITATION_MS.1;
        for key in plan {
            let ms = key.delay.as_millis() as u64;
            assert!(ms >= KEY_DELAY_MS.0);
            assert!(ms <= max_ms);
        }
    }

    #[test]
    fn steps_scale_with_distance() {
        assert!(steps_for_distance(30.0) < steps_for_distance(600.0));
        assert_eq!(steps_for_distance(100_000.0), 40);
    }
}
