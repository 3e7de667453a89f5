//! Scaling decision engine
//!
//! Pure function of the observed backlog, current replicas, rule thresholds
//! and the last time the workload was scaled. Moves at most one replica per
//! decision and never leaves `[min, max]` when starting inside it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Backlog thresholds. Comparisons are strict: a backlog equal to a
/// threshold never triggers a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub scale_up: u64,
    pub scale_down: u64,
}

/// Replica bounds, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAction {
    None,
    ScaleUp,
    ScaleDown,
}

impl ScaleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleAction::None => "none",
            ScaleAction::ScaleUp => "scale_up",
            ScaleAction::ScaleDown => "scale_down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaleDecision {
    pub current: i32,
    pub desired: i32,
    /// The previous scale action is still inside the cooldown window
    pub cooldown_active: bool,
}

impl ScaleDecision {
    pub fn applied(&self) -> bool {
        self.desired != self.current
    }

    pub fn action(&self) -> ScaleAction {
        match self.desired.cmp(&self.current) {
            std::cmp::Ordering::Greater => ScaleAction::ScaleUp,
            std::cmp::Ordering::Less => ScaleAction::ScaleDown,
            std::cmp::Ordering::Equal => ScaleAction::None,
        }
    }
}

/// Whether `now` is still inside the cooldown window opened at `last_scale`.
/// A timestamp in the future counts as inside the window.
pub fn in_cooldown(
    last_scale: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> bool {
    match last_scale {
        Some(last) => match now.signed_duration_since(last).to_std() {
            Ok(elapsed) => elapsed < cooldown,
            Err(_) => true,
        },
        None => false,
    }
}

/// Compute the desired replica count for one pass.
///
/// Scale-up is checked before scale-down, so with inverted thresholds a
/// backlog above both wins the scale-up branch.
pub fn decide(
    current: i32,
    pending: u64,
    thresholds: &Thresholds,
    bounds: &Bounds,
    last_scale: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> ScaleDecision {
    if in_cooldown(last_scale, now, cooldown) {
        return ScaleDecision {
            current,
            desired: current,
            cooldown_active: true,
        };
    }

    let desired = if pending > thresholds.scale_up && current < bounds.max {
        current.saturating_add(1).min(bounds.max)
    } else if pending < thresholds.scale_down && current > bounds.min {
        current.saturating_sub(1).max(bounds.min)
    } else {
        current
    };

    ScaleDecision {
        current,
        desired,
        cooldown_active: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const COOLDOWN: Duration = Duration::from_secs(15);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 10, 30, 0).unwrap()
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            scale_up: 10,
            scale_down: 3,
        }
    }

    fn bounds() -> Bounds {
        Bounds { min: 1, max: 5 }
    }

    #[test]
    fn test_scale_up_one_step() {
        let d = decide(1, 20, &thresholds(), &bounds(), None, now(), COOLDOWN);
        assert_eq!(d.desired, 2);
        assert!(d.applied());
        assert_eq!(d.action(), ScaleAction::ScaleUp);
    }

    #[test]
    fn test_scale_down_one_step() {
        let d = decide(2, 2, &thresholds(), &bounds(), None, now(), COOLDOWN);
        assert_eq!(d.desired, 1);
        assert!(d.applied());
        assert_eq!(d.action(), ScaleAction::ScaleDown);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let up = decide(2, 10, &thresholds(), &bounds(), None, now(), COOLDOWN);
        assert!(!up.applied());
        let down = decide(2, 3, &thresholds(), &bounds(), None, now(), COOLDOWN);
        assert!(!down.applied());
    }

    #[test]
    fn test_bounds_stop_scaling() {
        let at_max = decide(5, 1_000, &thresholds(), &bounds(), None, now(), COOLDOWN);
        assert_eq!(at_max.desired, 5);
        assert!(!at_max.applied());

        let at_min = decide(1, 0, &thresholds(), &bounds(), None, now(), COOLDOWN);
        assert_eq!(at_min.desired, 1);
        assert!(!at_min.applied());
    }

    #[test]
    fn test_cooldown_suppresses_action() {
        let last = now() - chrono::Duration::seconds(14);
        let d = decide(1, 1_000, &thresholds(), &bounds(), Some(last), now(), COOLDOWN);
        assert!(d.cooldown_active);
        assert!(!d.applied());
        assert_eq!(d.desired, 1);

        let last = now() - chrono::Duration::seconds(15);
        let d = decide(1, 1_000, &thresholds(), &bounds(), Some(last), now(), COOLDOWN);
        assert!(!d.cooldown_active);
        assert_eq!(d.desired, 2);
    }

    #[test]
    fn test_future_last_scale_counts_as_cooldown() {
        let last = now() + chrono::Duration::seconds(60);
        assert!(in_cooldown(Some(last), now(), COOLDOWN));
        assert!(!in_cooldown(None, now(), COOLDOWN));
    }

    #[test]
    fn test_inverted_thresholds_prefer_scale_up() {
        let inverted = Thresholds {
            scale_up: 3,
            scale_down: 10,
        };
        let d = decide(2, 5, &inverted, &bounds(), None, now(), COOLDOWN);
        assert_eq!(d.action(), ScaleAction::ScaleUp);
    }

    #[test]
    fn test_invariants_hold_across_inputs() {
        let bounds = Bounds { min: 0, max: 6 };
        let thresholds = thresholds();
        for current in bounds.min..=bounds.max {
            for pending in [0, 2, 3, 4, 9, 10, 11, 500] {
                let d = decide(current, pending, &thresholds, &bounds, None, now(), COOLDOWN);
                assert!(d.desired >= bounds.min && d.desired <= bounds.max);
                assert!((d.desired - d.current).abs() <= 1);
                assert_eq!(
                    d,
                    decide(current, pending, &thresholds, &bounds, None, now(), COOLDOWN)
                );
                if pending == thresholds.scale_up || pending == thresholds.scale_down {
                    assert!(!d.applied());
                }
            }
        }
    }
}
