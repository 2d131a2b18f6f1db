//! Randomized delay generation for human-like interaction
//!
//! Every decision here is a pure function of an injected `Rng` so the
//! typing cadence and scroll behavior are reproducible under test with a
//! seeded `StdRng`. Async sleep wrappers live alongside.

use std::time::Duration;
use rand::Rng;
use tokio::time::sleep;

/// Per-character typing delay bounds in milliseconds (80-200ms)
const TYPING_DELAY_MIN_MS: u64 = 80;
const TYPING_DELAY_MAX_MS: u64 = 200;

/// Probability of a longer "thinking" pause mid-typing
const THINKING_PAUSE_CHANCE: f64 = 0.05;

/// Thinking pause bounds in milliseconds (200-500ms)
const THINKING_PAUSE_MIN_MS: u64 = 200;
const THINKING_PAUSE_MAX_MS: u64 = 500;

/// An inclusive delay window in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    /// Sample a delay within the window
    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

impl Default for DelayRange {
    /// Inter-search wait (5-10s between queries)
    fn default() -> Self {
        Self {
            min_ms: 5_000,
            max_ms: 10_000,
        }
    }
}

/// Per-character typing delay
pub fn typing_delay(rng: &mut impl Rng) -> Duration {
    Duration::from_millis(rng.gen_range(TYPING_DELAY_MIN_MS..=TYPING_DELAY_MAX_MS))
}

/// Occasional mid-typing pause, `None` most of the time
pub fn thinking_pause(rng: &mut impl Rng) -> Option<Duration> {
    if rng.gen_bool(THINKING_PAUSE_CHANCE) {
        Some(Duration::from_millis(
            rng.gen_range(THINKING_PAUSE_MIN_MS..=THINKING_PAUSE_MAX_MS),
        ))
    } else {
        None
    }
}

/// Interval between scroll ticks (1-3s)
pub fn scroll_tick(rng: &mut impl Rng) -> Duration {
    Duration::from_millis(rng.gen_range(1_000..=3_000))
}

/// One scroll perturbation, decided per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollStep {
    /// Scroll up by the given pixel amount
    Up(u32),
    /// Scroll down by the given pixel amount
    Down(u32),
    /// Don't scroll this tick
    Pause,
    /// Jump to an absolute vertical position
    JumpTo(f64),
}

/// Margin (px) near the document edges that forces a reversal
const EDGE_MARGIN: f64 = 50.0;

/// Decide the next scroll step from the current position.
///
/// Distribution: 10% random jump, 15% upward (up to 300px), 8% pause,
/// otherwise downward 300-800px with a 5% chance of a fast 800px flick.
/// Near the top/bottom of the content the direction is forced inward.
pub fn next_scroll_step(rng: &mut impl Rng, position: f64, max_scroll: f64) -> ScrollStep {
    if max_scroll <= 0.0 {
        return ScrollStep::Pause;
    }

    if position <= EDGE_MARGIN {
        return ScrollStep::Down(rng.gen_range(300..800));
    }
    if position >= max_scroll - EDGE_MARGIN {
        return ScrollStep::Up(rng.gen_range(100..400));
    }

    if rng.gen_bool(0.10) {
        return ScrollStep::JumpTo(rng.gen_range(0.0..max_scroll));
    }

    let roll: f64 = rng.gen();
    if roll < 0.15 {
        ScrollStep::Up(rng.gen_range(1..300))
    } else if roll < 0.23 {
        ScrollStep::Pause
    } else if rng.gen_bool(0.05) {
        ScrollStep::Down(800)
    } else {
        ScrollStep::Down(rng.gen_range(300..800))
    }
}

/// Sleep a random duration between `min_ms` and `max_ms`
pub async fn random_delay(min_ms: u64, max_ms: u64) {
    let delay = rand::thread_rng().gen_range(min_ms..=max_ms);
    sleep(Duration::from_millis(delay)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_delay_range_sample_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let range = DelayRange::new(5_000, 10_000);

        for _ in 0..200 {
            let d = range.sample(&mut rng);
            assert!(d.as_millis() >= 5_000);
            assert!(d.as_millis() <= 10_000);
        }
    }

    #[test]
    fn test_delay_range_normalizes_inverted_bounds() {
        let range = DelayRange::new(10_000, 5_000);
        assert_eq!(range.min_ms, 5_000);
        assert_eq!(range.max_ms, 10_000);
    }

    #[test]
    fn test_typing_delay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let d = typing_delay(&mut rng);
            assert!(d.as_millis() >= 80 && d.as_millis() <= 200);
        }
    }

    #[test]
    fn test_thinking_pause_is_rare_and_bounded() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut hits = 0;
        for _ in 0..1_000 {
            if let Some(d) = thinking_pause(&mut rng) {
                hits += 1;
                assert!(d.as_millis() >= 200 && d.as_millis() <= 500);
            }
        }
        // ~5% of 1000, generous tolerance
        assert!(hits > 10 && hits < 150, "unexpected pause rate: {}", hits);
    }

    #[test]
    fn test_scroll_step_forced_down_near_top() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            match next_scroll_step(&mut rng, 0.0, 5_000.0) {
                ScrollStep::Down(px) => assert!((300..800).contains(&px)),
                other => panic!("expected Down near top, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_scroll_step_forced_up_near_bottom() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            match next_scroll_step(&mut rng, 4_980.0, 5_000.0) {
                ScrollStep::Up(px) => assert!((100..400).contains(&px)),
                other => panic!("expected Up near bottom, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_scroll_step_unscrollable_page_pauses() {
        let mut rng = StdRng::seed_from_u64(13);
        assert_eq!(next_scroll_step(&mut rng, 0.0, 0.0), ScrollStep::Pause);
    }

    #[test]
    fn test_scroll_step_jump_stays_in_document() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..2_000 {
            if let ScrollStep::JumpTo(y) = next_scroll_step(&mut rng, 2_500.0, 5_000.0) {
                assert!(y >= 0.0 && y < 5_000.0);
            }
        }
    }

    #[test]
    fn test_scroll_step_biases_forward() {
        let mut rng = StdRng::seed_from_u64(23);
        let (mut down, mut up) = (0, 0);
        for _ in 0..1_000 {
            match next_scroll_step(&mut rng, 2_500.0, 5_000.0) {
                ScrollStep::Down(_) => down += 1,
                ScrollStep::Up(_) => up += 1,
                _ => {}
            }
        }
        assert!(down > up * 2, "down={} up={}", down, up);
    }
}
