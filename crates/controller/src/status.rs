use crate::state_machine::{PipelineContext, PipelineState, PipelineTuning};
use std::io::Write;
use std::time::{Duration, Instant};

/// Per-cycle status line, overwritten in place on stdout.
///
/// Discrete events (transitions, errors) go through tracing on stderr;
/// this is the continuous view: state, streak progress, frame rate,
/// inference latency, and transport connectivity.
pub struct StatusLine {
    prev_frame: Option<Instant>,
}

impl StatusLine {
    pub fn new() -> Self {
        Self { prev_frame: None }
    }

    /// Frames per second measured between consecutive calls.
    pub fn measure_fps(&mut self, now: Instant) -> f64 {
        let fps = match self.prev_frame {
            Some(prev) => {
                let dt = now.duration_since(prev).as_secs_f64();
                if dt > 0.0 { 1.0 / dt } else { 0.0 }
            }
            None => 0.0,
        };
        self.prev_frame = Some(now);
        fps
    }

    fn compose(
        &self,
        pipeline: &PipelineContext,
        tuning: &PipelineTuning,
        now: Instant,
        fps: f64,
        inference: Duration,
        mqtt_up: bool,
    ) -> String {
        let mqtt = if mqtt_up { "up" } else { "down" };
        match pipeline.state() {
            PipelineState::Monitoring => format!(
                "State: MONITORING | FPS: {:.1} | Streak M1: [{}/{}] | Infer: {:.1}ms | MQTT: {}",
                fps,
                pipeline.streak_count(),
                tuning.trigger_threshold,
                inference.as_secs_f64() * 1000.0,
                mqtt
            ),
            PipelineState::Confirming => format!(
                "State: CONFIRMING | FPS: {:.1} | Streak M2: [{}/{}] | Infer: {:.1}ms | MQTT: {}",
                fps,
                pipeline.streak_count(),
                tuning.trigger_threshold,
                inference.as_secs_f64() * 1000.0,
                mqtt
            ),
            PipelineState::Cooldown => format!(
                "State: COOLDOWN | Clear in {:.0}s | MQTT: {}",
                pipeline.cooldown_remaining(now, tuning).as_secs_f64(),
                mqtt
            ),
        }
    }

    pub fn render(
        &mut self,
        pipeline: &PipelineContext,
        tuning: &PipelineTuning,
        now: Instant,
        fps: f64,
        inference: Duration,
        mqtt_up: bool,
    ) {
        let line = self.compose(pipeline, tuning, now, fps, inference, mqtt_up);
        // Pad so a shorter line fully overwrites a longer previous one.
        print!("\r{:<78}", line);
        let _ = std::io::stdout().flush();
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}
