use crate::measurement::State;
use tokio::time::Instant;

const SECS_PER_HOUR: f64 = 3600.0;

/// Turns a sequence of classified polls into runtime increments (hours).
///
/// `last_transition` marks the start of the interval that has not been
/// attributed to any state yet. It is a monotonic instant, so wall clock
/// corrections never show up as runtime. Owned by the poller only.
#[derive(Debug, Clone)]
pub struct RuntimeAccumulator {
    last_state: State,
    last_transition: Instant,
}

impl RuntimeAccumulator {
    pub fn new(last_state: State, last_transition: Instant) -> Self {
        Self {
            last_state,
            last_transition,
        }
    }

    /// Records the state observed at `now` and returns the runtime to add.
    ///
    /// While on, every poll adds the time since the previous poll. An off poll
    /// adds nothing but closes the pending interval, so the first on poll
    /// after a pause only counts the time since the last off poll. A gap
    /// caused by failed polls goes to whichever state is seen next.
    pub fn accrue(&mut self, state: State, now: Instant) -> f64 {
        let delta = match state {
            State::On => {
                now.saturating_duration_since(self.last_transition)
                    .as_secs_f64()
                    / SECS_PER_HOUR
            }
            State::Off => 0.0,
        };
        self.last_transition = now;
        self.last_state = state;
        delta
    }

    pub fn last_state(&self) -> State {
        self.last_state
    }

    pub fn last_transition(&self) -> Instant {
        self.last_transition
    }
}

impl Default for RuntimeAccumulator {
    /// Off, starting now: the persisted state carries no on/off information.
    fn default() -> Self {
        Self::new(State::Off, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn minutes(t0: Instant, n: u64) -> Instant {
        t0 + Duration::from_secs(60 * n)
    }

    #[test]
    fn test_off_to_on_accrues_one_interval() {
        let t0 = Instant::now();
        let mut acc = RuntimeAccumulator::new(State::Off, t0);
        let delta = acc.accrue(State::On, t0 + Duration::from_secs(60));

        assert!((delta - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(acc.last_state(), State::On);
        assert_eq!(acc.last_transition(), minutes(t0, 1));
    }

    #[test]
    fn test_off_accrues_nothing() {
        let t0 = Instant::now();
        let mut acc = RuntimeAccumulator::new(State::Off, t0);
        assert_eq!(acc.accrue(State::Off, minutes(t0, 1)), 0.0);
        assert_eq!(acc.accrue(State::Off, minutes(t0, 2)), 0.0);

        let mut acc = RuntimeAccumulator::new(State::On, t0);
        assert_eq!(acc.accrue(State::Off, minutes(t0, 1)), 0.0);
        assert_eq!(acc.last_state(), State::Off);
    }

    #[test]
    fn test_consecutive_on_polls_accrue_interval_each() {
        let t0 = Instant::now();
        let mut acc = RuntimeAccumulator::new(State::Off, t0);
        let total: f64 = (1..=60).map(|m| acc.accrue(State::On, minutes(t0, m))).sum();

        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_double_counting_across_off_gap() {
        let t0 = Instant::now();
        let mut acc = RuntimeAccumulator::new(State::Off, t0);
        acc.accrue(State::On, minutes(t0, 1));
        acc.accrue(State::On, minutes(t0, 2));

        // Off for two hours
        for m in 3..=122 {
            assert_eq!(acc.accrue(State::Off, minutes(t0, m)), 0.0);
        }

        let first = acc.accrue(State::On, minutes(t0, 123));
        let second = acc.accrue(State::On, minutes(t0, 124));
        assert!((first - 1.0 / 60.0).abs() < 1e-12);
        assert!((second - 1.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_missed_polls_fold_into_next_state() {
        let t0 = Instant::now();
        let mut acc = RuntimeAccumulator::new(State::Off, t0);
        acc.accrue(State::On, minutes(t0, 1));

        // Polls at minutes 2..=4 failed, next success still reports on
        let delta = acc.accrue(State::On, minutes(t0, 5));
        assert!((delta - 4.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_runtime_monotonic_and_only_grows_when_on() {
        let pattern = [
            State::Off,
            State::On,
            State::On,
            State::Off,
            State::On,
            State::Off,
            State::Off,
            State::On,
            State::On,
            State::On,
        ];
        let t0 = Instant::now();
        let mut acc = RuntimeAccumulator::new(State::Off, t0);
        let mut runtime = 0.0;

        for (i, state) in pattern.iter().enumerate() {
            let before = runtime;
            runtime += acc.accrue(*state, minutes(t0, i as u64 + 1));
            assert!(runtime >= before);
            if *state == State::Off {
                assert_eq!(runtime, before);
            } else {
                assert!(runtime > before);
            }
        }
        assert!((runtime - 6.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_earlier_instant_never_subtracts() {
        let t0 = Instant::now();
        let mut acc = RuntimeAccumulator::new(State::On, minutes(t0, 10));
        assert_eq!(acc.accrue(State::On, minutes(t0, 5)), 0.0);
        assert!((acc.accrue(State::On, minutes(t0, 6)) - 1.0 / 60.0).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accrues_elapsed_monotonic_time() {
        let mut acc = RuntimeAccumulator::default();
        assert_eq!(acc.last_state(), State::Off);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(acc.accrue(State::Off, Instant::now()), 0.0);

        tokio::time::advance(Duration::from_secs(60)).await;
        let delta = acc.accrue(State::On, Instant::now());
        assert!((delta - 1.0 / 60.0).abs() < 1e-9);
    }
}
