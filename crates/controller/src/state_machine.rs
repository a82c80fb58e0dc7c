use std::time::{Duration, Instant};

/// The staged detection pipeline. Cycles indefinitely:
/// MONITORING -> CONFIRMING -> COOLDOWN -> MONITORING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Monitoring,
    Confirming,
    Cooldown,
}

/// Which classifier stage runs in the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Monitor,
    Confirm,
}

/// State transition surfaced to the caller, which owns the side effects
/// (publishing, logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// MONITORING streak reached the trigger; second stage takes over.
    ConfirmationStarted,
    /// CONFIRMING streak reached the trigger; publish "detected".
    Confirmed,
    /// Cooldown elapsed; publish "clear" and resume monitoring.
    CooldownComplete,
}

/// Tuning constants for the pipeline, fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct PipelineTuning {
    /// Streak value at which a stage fires.
    pub trigger_threshold: u32,
    /// MONITORING streak zeroes after this long without an increment.
    pub reset_window: Duration,
    /// Hold time in COOLDOWN before publishing clear.
    pub cooldown: Duration,
}

/// A running count of recent positive detections within one stage.
#[derive(Debug, Clone, Copy)]
struct Streak {
    count: u32,
    last_increment: Option<Instant>,
}

impl Streak {
    fn zero() -> Self {
        Self {
            count: 0,
            last_increment: None,
        }
    }

    fn bump(&mut self, by: u32, now: Instant) {
        self.count += by;
        self.last_increment = Some(now);
    }

    fn idle_longer_than(&self, window: Duration, now: Instant) -> bool {
        match self.last_increment {
            Some(t) => now.duration_since(t) > window,
            None => false,
        }
    }
}

/// The pipeline's mutable state: current stage, both streaks, and the
/// cooldown start. Time is injected so transitions are deterministic under
/// test.
pub struct PipelineContext {
    state: PipelineState,
    monitor_streak: Streak,
    confirm_streak: Streak,
    cooldown_started: Option<Instant>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Monitoring,
            monitor_streak: Streak::zero(),
            confirm_streak: Streak::zero(),
            cooldown_started: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Which classifier should score this cycle's frame, if any.
    /// COOLDOWN runs no classification at all.
    pub fn active_stage(&self) -> Option<Stage> {
        match self.state {
            PipelineState::Monitoring => Some(Stage::Monitor),
            PipelineState::Confirming => Some(Stage::Confirm),
            PipelineState::Cooldown => None,
        }
    }

    /// Streak progress of the active stage, for the status line.
    pub fn streak_count(&self) -> u32 {
        match self.state {
            PipelineState::Monitoring => self.monitor_streak.count,
            PipelineState::Confirming => self.confirm_streak.count,
            PipelineState::Cooldown => 0,
        }
    }

    pub fn cooldown_remaining(&self, now: Instant, tuning: &PipelineTuning) -> Duration {
        match self.cooldown_started {
            Some(start) => tuning.cooldown.saturating_sub(now.duration_since(start)),
            None => Duration::ZERO,
        }
    }

    /// Advance the pipeline by one cycle's aggregated detection count.
    ///
    /// Streaks never carry across a transition: CONFIRMING starts at zero,
    /// and cooldown completion zeroes both.
    pub fn advance(
        &mut self,
        detections: u32,
        now: Instant,
        tuning: &PipelineTuning,
    ) -> Option<PipelineEvent> {
        match self.state {
            PipelineState::Monitoring => {
                // Idle reset applies before this cycle's count lands: a
                // cycle arriving after the window starts a fresh streak,
                // detections or not.
                if self
                    .monitor_streak
                    .idle_longer_than(tuning.reset_window, now)
                {
                    self.monitor_streak = Streak::zero();
                }
                if detections > 0 {
                    self.monitor_streak.bump(detections, now);
                }

                if self.monitor_streak.count >= tuning.trigger_threshold {
                    self.monitor_streak = Streak::zero();
                    self.confirm_streak = Streak::zero();
                    self.state = PipelineState::Confirming;
                    return Some(PipelineEvent::ConfirmationStarted);
                }
            }
            PipelineState::Confirming => {
                // No idle reset here: within the stage the streak is
                // monotonic.
                if detections > 0 {
                    self.confirm_streak.bump(detections, now);
                }

                if self.confirm_streak.count >= tuning.trigger_threshold {
                    self.confirm_streak = Streak::zero();
                    self.cooldown_started = Some(now);
                    self.state = PipelineState::Cooldown;
                    return Some(PipelineEvent::Confirmed);
                }
            }
            PipelineState::Cooldown => {
                let started = self
                    .cooldown_started
                    .expect("cooldown state always has a start time");
                if now.duration_since(started) >= tuning.cooldown {
                    self.monitor_streak = Streak::zero();
                    self.confirm_streak = Streak::zero();
                    self.cooldown_started = None;
                    self.state = PipelineState::Monitoring;
                    return Some(PipelineEvent::CooldownComplete);
                }
            }
        }

        None
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning(trigger: u32) -> PipelineTuning {
        PipelineTuning {
            trigger_threshold: trigger,
            reset_window: Duration::from_secs(3),
            cooldown: Duration::from_secs(40),
        }
    }

    // ========== MONITORING ==========

    #[test]
    fn starts_in_monitoring_with_first_stage_active() {
        let ctx = PipelineContext::new();
        assert_eq!(ctx.state(), PipelineState::Monitoring);
        assert_eq!(ctx.active_stage(), Some(Stage::Monitor));
        assert_eq!(ctx.streak_count(), 0);
    }

    #[test]
    fn monitoring_accumulates_counts_not_cycles() {
        let mut ctx = PipelineContext::new();
        let now = Instant::now();

        // A single frame with 10 detections reaches a trigger of 10.
        let event = ctx.advance(10, now, &tuning(10));
        assert_eq!(event, Some(PipelineEvent::ConfirmationStarted));
        assert_eq!(ctx.state(), PipelineState::Confirming);
    }

    #[test]
    fn transition_happens_exactly_when_sum_first_reaches_trigger() {
        let mut ctx = PipelineContext::new();
        let now = Instant::now();
        let t = tuning(3);

        assert_eq!(ctx.advance(1, now, &t), None);
        assert_eq!(ctx.advance(1, now + Duration::from_secs(1), &t), None);
        assert_eq!(
            ctx.advance(1, now + Duration::from_secs(2), &t),
            Some(PipelineEvent::ConfirmationStarted),
            "must fire exactly at step 3, never earlier"
        );
    }

    #[test]
    fn zero_count_cycles_within_window_keep_the_streak() {
        let mut ctx = PipelineContext::new();
        let now = Instant::now();
        let t = tuning(3);

        ctx.advance(2, now, &t);
        // 2 seconds of nothing - inside the 3 second reset window.
        ctx.advance(0, now + Duration::from_secs(2), &t);
        assert_eq!(ctx.streak_count(), 2);

        let event = ctx.advance(1, now + Duration::from_millis(2500), &t);
        assert_eq!(event, Some(PipelineEvent::ConfirmationStarted));
    }

    #[test]
    fn idle_gap_beyond_window_resets_streak_before_counting() {
        let mut ctx = PipelineContext::new();
        let now = Instant::now();
        let t = tuning(3);

        ctx.advance(1, now, &t);
        ctx.advance(1, now + Duration::from_secs(1), &t);
        assert_eq!(ctx.streak_count(), 2);

        // 4 second gap with no detections: streak resets...
        assert_eq!(ctx.advance(0, now + Duration::from_secs(5), &t), None);
        assert_eq!(ctx.streak_count(), 0);

        // ...so the next hit starts a fresh streak instead of triggering.
        assert_eq!(ctx.advance(1, now + Duration::from_secs(6), &t), None);
        assert_eq!(ctx.state(), PipelineState::Monitoring);
        assert_eq!(ctx.streak_count(), 1);
    }

    #[test]
    fn three_cycles_within_a_second_each_trigger_with_threshold_three() {
        // End-to-end timing: trigger 3, reset window 3s, cycles 1s apart
        // transition after the third cycle.
        let mut ctx = PipelineContext::new();
        let now = Instant::now();
        let t = tuning(3);

        assert_eq!(ctx.advance(1, now, &t), None);
        assert_eq!(ctx.advance(1, now + Duration::from_secs(1), &t), None);
        assert_eq!(
            ctx.advance(1, now + Duration::from_secs(2), &t),
            Some(PipelineEvent::ConfirmationStarted)
        );
    }

    #[test]
    fn four_second_gap_between_cycles_resets_instead_of_triggering() {
        let mut ctx = PipelineContext::new();
        let now = Instant::now();
        let t = tuning(3);

        ctx.advance(1, now, &t);
        ctx.advance(1, now + Duration::from_secs(1), &t);

        // Cycle 3 arrives 4 seconds later: the idle gap exceeds the reset
        // window, so its count lands on a zeroed streak.
        let event = ctx.advance(1, now + Duration::from_secs(5), &t);
        assert_eq!(event, None);
        assert_eq!(ctx.streak_count(), 1);
        assert_eq!(ctx.state(), PipelineState::Monitoring);
    }

    #[test]
    fn stale_cycle_with_detections_never_rides_the_old_streak() {
        // The reset must be evaluated before the arriving count, even when
        // the carried sum plus that count would reach the trigger.
        let mut ctx = PipelineContext::new();
        let now = Instant::now();
        let t = tuning(3);

        ctx.advance(2, now, &t);
        assert_eq!(ctx.streak_count(), 2);

        // One detection, 5 seconds later: 2 + 1 would trigger, but the
        // stale streak is gone before the 1 is counted.
        assert_eq!(ctx.advance(1, now + Duration::from_secs(5), &t), None);
        assert_eq!(ctx.state(), PipelineState::Monitoring);
        assert_eq!(ctx.streak_count(), 1);

        // A fresh burst reaching the trigger on its own still fires.
        assert_eq!(
            ctx.advance(3, now + Duration::from_secs(10), &t),
            Some(PipelineEvent::ConfirmationStarted)
        );
    }

    // ========== CONFIRMING ==========

    fn confirming_ctx(now: Instant, t: &PipelineTuning) -> PipelineContext {
        let mut ctx = PipelineContext::new();
        ctx.advance(t.trigger_threshold, now, t);
        assert_eq!(ctx.state(), PipelineState::Confirming);
        ctx
    }

    #[test]
    fn confirming_starts_with_a_zero_streak() {
        let now = Instant::now();
        let t = tuning(5);
        let ctx = confirming_ctx(now, &t);
        assert_eq!(
            ctx.streak_count(),
            0,
            "no value carries over from monitoring"
        );
        assert_eq!(ctx.active_stage(), Some(Stage::Confirm));
    }

    #[test]
    fn confirming_streak_is_monotonic_no_idle_reset() {
        let now = Instant::now();
        let t = tuning(3);
        let mut ctx = confirming_ctx(now, &t);

        ctx.advance(2, now + Duration::from_secs(1), &t);
        // Way past the reset window - must not reset in this stage.
        ctx.advance(0, now + Duration::from_secs(60), &t);
        assert_eq!(ctx.streak_count(), 2);

        let event = ctx.advance(1, now + Duration::from_secs(61), &t);
        assert_eq!(event, Some(PipelineEvent::Confirmed));
        assert_eq!(ctx.state(), PipelineState::Cooldown);
    }

    // ========== COOLDOWN ==========

    fn cooldown_ctx(now: Instant, t: &PipelineTuning) -> PipelineContext {
        let mut ctx = confirming_ctx(now, t);
        ctx.advance(t.trigger_threshold, now, t);
        assert_eq!(ctx.state(), PipelineState::Cooldown);
        ctx
    }

    #[test]
    fn cooldown_runs_no_classification() {
        let now = Instant::now();
        let t = tuning(2);
        let ctx = cooldown_ctx(now, &t);
        assert_eq!(ctx.active_stage(), None);
    }

    #[test]
    fn cooldown_holds_until_duration_elapses() {
        let now = Instant::now();
        let t = tuning(2);
        let mut ctx = cooldown_ctx(now, &t);

        assert_eq!(ctx.advance(0, now + Duration::from_secs(39), &t), None);
        assert_eq!(ctx.state(), PipelineState::Cooldown);

        let event = ctx.advance(0, now + Duration::from_secs(40), &t);
        assert_eq!(event, Some(PipelineEvent::CooldownComplete));
        assert_eq!(ctx.state(), PipelineState::Monitoring);
        assert_eq!(ctx.streak_count(), 0);
    }

    #[test]
    fn cooldown_remaining_counts_down() {
        let now = Instant::now();
        let t = tuning(2);
        let ctx = cooldown_ctx(now, &t);

        let remaining = ctx.cooldown_remaining(now + Duration::from_secs(10), &t);
        assert_eq!(remaining, Duration::from_secs(30));
    }

    #[test]
    fn full_cycle_returns_to_a_clean_monitoring_state() {
        let now = Instant::now();
        let t = tuning(2);
        let mut ctx = cooldown_ctx(now, &t);

        ctx.advance(0, now + t.cooldown, &t);
        assert_eq!(ctx.state(), PipelineState::Monitoring);

        // Next event sequence behaves exactly like a fresh context.
        assert_eq!(ctx.advance(1, now + Duration::from_secs(41), &t), None);
        assert_eq!(
            ctx.advance(1, now + Duration::from_secs(42), &t),
            Some(PipelineEvent::ConfirmationStarted)
        );
    }
}
