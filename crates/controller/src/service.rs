use crate::config::ControllerConfig;
use crate::keepalive::KeepaliveClock;
use crate::publisher::{ConnectivityEvent, DetectionStatus, MqttPublisher};
use crate::state_machine::{PipelineContext, PipelineEvent, PipelineTuning, Stage};
use crate::status::StatusLine;
use anyhow::{Context, Result};
use capture::{CameraSource, Frame};
use inference::backend::ort::OrtBackend;
use inference::{ClassifierAdapter, EdgeMargin, PreProcessor};
use link::{ModuleRegistry, SerialEvent, SerialLink, parse_line};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

// Idle sleep when the serial port produced no line during the handshake,
// so the wait does not spin.
const HANDSHAKE_POLL: Duration = Duration::from_millis(50);

/// Owns every long-lived resource of the controller and runs its two
/// phases: the blocking module handshake, then the detection loop.
///
/// Single-threaded by construction (the MQTT connection thread excepted):
/// serial polling, capture, classification, and publishing all run
/// cooperatively inside one cycle, so a stall in one starves the others
/// and shows up immediately in the frame rate.
pub struct ControllerService {
    config: ControllerConfig,
    tuning: PipelineTuning,

    link: Option<SerialLink>,
    last_serial_attempt: Option<Instant>,
    registry: ModuleRegistry,

    stage_monitor: ClassifierAdapter<OrtBackend>,
    stage_confirm: ClassifierAdapter<OrtBackend>,
    preprocessor: PreProcessor,

    publisher: MqttPublisher,
    pipeline: PipelineContext,
    keepalive: KeepaliveClock,
    status: StatusLine,
}

impl ControllerService {
    /// Load both classifier stages and connect the publish transport.
    ///
    /// Model load failures are fatal: the controller must never run with
    /// only one stage.
    pub fn new(config: ControllerConfig) -> Result<Self> {
        let margin = EdgeMargin {
            horizontal: config.margin_horizontal,
            vertical: config.margin_vertical,
        };

        let stage_monitor = ClassifierAdapter::<OrtBackend>::load(
            &config.model_path_1,
            config.labels_1.clone(),
            config.threshold_1,
            Some(margin),
        )
        .with_context(|| format!("Failed to load first-stage model {}", config.model_path_1))?;

        let stage_confirm = ClassifierAdapter::<OrtBackend>::load(
            &config.model_path_2,
            config.labels_2.clone(),
            config.threshold_2,
            None,
        )
        .with_context(|| format!("Failed to load second-stage model {}", config.model_path_2))?;

        // Both stages share one preprocessor, sized from the first-stage
        // model when it declares a static input shape.
        let input_size = stage_monitor.input_size().unwrap_or(config.input_size);
        let preprocessor = PreProcessor::new(input_size);

        let publisher = MqttPublisher::new(
            &config.mqtt_broker_host,
            config.mqtt_broker_port,
            config.mqtt_topic.clone(),
        )?;

        let registry = ModuleRegistry::new(config.required_modules.clone());
        let tuning = PipelineTuning {
            trigger_threshold: config.trigger_threshold,
            reset_window: Duration::from_secs_f64(config.reset_window_secs),
            cooldown: Duration::from_secs_f64(config.cooldown_secs),
        };

        let now = Instant::now();
        Ok(Self {
            config,
            tuning,
            link: None,
            last_serial_attempt: None,
            registry,
            stage_monitor,
            stage_confirm,
            preprocessor,
            publisher,
            pipeline: PipelineContext::new(),
            keepalive: KeepaliveClock::new(now),
            status: StatusLine::new(),
        })
    }

    /// Handshake, then cycle the detection loop until a shutdown signal.
    pub fn run(mut self, shutdown: &AtomicBool) -> Result<()> {
        self.handshake(shutdown);
        if shutdown.load(Ordering::Relaxed) {
            self.cleanup(None);
            return Ok(());
        }

        let open_result = common::retry_with_backoff(
            || CameraSource::open(&self.config.camera_uri),
            3,
            self.config.camera_backoff_secs * 1000,
            "Video source open",
        );
        let mut camera = match open_result {
            Ok(camera) => camera,
            Err(e) => {
                self.cleanup(None);
                return Err(e).with_context(|| {
                    format!("Failed to open video source {}", self.config.camera_uri)
                });
            }
        };

        let backoff = Duration::from_secs(self.config.camera_backoff_secs);
        let keepalive_interval = Duration::from_secs(self.config.keepalive_secs);

        // The keepalive epoch starts with the loop, not at construction:
        // however long the handshake and camera open took, the first
        // "clear" is due one full silent interval from here.
        self.keepalive = KeepaliveClock::new(Instant::now());

        tracing::info!("Detection loop started");
        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            let fps = self.status.measure_fps(now);

            self.poll_serial(now);
            self.drain_connectivity();

            let frame = match camera.read() {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::warn!("Frame read failed: {}; reconnecting camera", e);
                    if let Err(e) = camera.reopen(backoff) {
                        tracing::warn!("Camera reopen failed: {}", e);
                    }
                    None
                }
            };

            let mut detections = 0;
            let mut inference_time = Duration::ZERO;
            if let (Some(frame), Some(stage)) = (frame.as_ref(), self.pipeline.active_stage()) {
                let started = Instant::now();
                match self.classify(frame, stage) {
                    Ok(count) => {
                        detections = count;
                        inference_time = started.elapsed();
                    }
                    Err(e) => tracing::error!("Classification failed: {:#}", e),
                }
            }

            if detections > 0 {
                self.keepalive.mark_activity(now);
            }

            if let Some(event) = self.pipeline.advance(detections, now, &self.tuning) {
                self.handle_event(event, now);
            }

            if self.keepalive.due(now, keepalive_interval) {
                tracing::info!("Keepalive interval elapsed, publishing clear");
                self.publish(DetectionStatus::Clear, now);
            }

            self.status.render(
                &self.pipeline,
                &self.tuning,
                now,
                fps,
                inference_time,
                self.publisher.is_connected(),
            );
        }

        // Move off the in-place status line before shutdown logging.
        println!();
        tracing::info!("Shutdown signal received");
        self.cleanup(Some(&mut camera));
        Ok(())
    }

    /// Block until every required module has reported a position.
    ///
    /// Deliberately unbounded: the pipeline must not arm without every
    /// module's position and there is no degraded mode to fall back to.
    /// Only a shutdown signal interrupts the wait.
    fn handshake(&mut self, shutdown: &AtomicBool) {
        tracing::info!(
            modules = ?self.registry.required_ids(),
            "Waiting for position reports from all required modules"
        );

        while !self.registry.is_armed() && !shutdown.load(Ordering::Relaxed) {
            let saw_line = self.poll_serial(Instant::now());
            if !saw_line {
                std::thread::sleep(HANDSHAKE_POLL);
            }
        }

        if self.registry.is_armed() {
            tracing::info!("All required modules reported, pipeline armed");
        }
    }

    /// Open the serial port if needed and drain any buffered lines.
    ///
    /// Port loss downgrades to a warning and a periodic reopen attempt;
    /// the rest of the cycle keeps running without serial input. Returns
    /// whether any line was consumed.
    fn poll_serial(&mut self, now: Instant) -> bool {
        if self.link.is_none() {
            let retry = Duration::from_secs(self.config.serial_retry_secs);
            let due = self
                .last_serial_attempt
                .is_none_or(|t| now.duration_since(t) >= retry);
            if due {
                self.last_serial_attempt = Some(now);
                match SerialLink::open(&self.config.serial_port, self.config.baud_rate) {
                    Ok(link) => self.link = Some(link),
                    Err(e) => tracing::warn!(
                        "Serial port {} unavailable: {}",
                        self.config.serial_port,
                        e
                    ),
                }
            }
        }

        let mut saw_line = false;
        let mut lost = false;
        if let Some(link) = self.link.as_mut() {
            loop {
                match link.poll_line() {
                    Ok(Some(line)) => {
                        saw_line = true;
                        match parse_line(&line, self.registry.required_ids()) {
                            SerialEvent::Heartbeat => {
                                tracing::debug!("Heartbeat received, acknowledging");
                                if let Err(e) = link.send_ack() {
                                    tracing::warn!("Heartbeat ack failed: {}", e);
                                }
                            }
                            SerialEvent::PositionReport(report) => {
                                let module_id = report.module_id.clone();
                                if self.registry.update(report) {
                                    tracing::info!(
                                        module = %module_id,
                                        missing = self.registry.missing().len(),
                                        "Module position registered"
                                    );
                                }
                            }
                            SerialEvent::Unrecognized(raw) => {
                                tracing::debug!(line = %raw, "Unrecognized serial data");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Serial link lost: {}", e);
                        lost = true;
                        break;
                    }
                }
            }
        }
        if lost {
            self.link = None;
        }
        saw_line
    }

    fn drain_connectivity(&mut self) {
        while let Some(event) = self.publisher.poll_connectivity() {
            match event {
                ConnectivityEvent::Connected => tracing::info!("Publish transport connected"),
                ConnectivityEvent::Failed(code) => {
                    tracing::warn!(code, "Publish transport connection failed");
                }
            }
        }
    }

    fn classify(&mut self, frame: &Frame, stage: Stage) -> Result<u32> {
        let input = self
            .preprocessor
            .preprocess(&frame.data, frame.width, frame.height)?;
        match stage {
            Stage::Monitor => self.stage_monitor.detect(&input),
            Stage::Confirm => self.stage_confirm.detect(&input),
        }
    }

    fn handle_event(&mut self, event: PipelineEvent, now: Instant) {
        match event {
            PipelineEvent::ConfirmationStarted => {
                tracing::info!("Detection trigger reached, switching to confirmation stage");
            }
            PipelineEvent::Confirmed => {
                tracing::info!("Detection confirmed, publishing detected status");
                self.publish(DetectionStatus::Detected, now);
            }
            PipelineEvent::CooldownComplete => {
                tracing::info!("Cooldown complete, publishing clear and resuming monitoring");
                self.publish(DetectionStatus::Clear, now);
            }
        }
    }

    /// Publish the given status for every known module position.
    ///
    /// Publish failures are logged, never propagated: a broker outage must
    /// not stop detection.
    fn publish(&mut self, status: DetectionStatus, now: Instant) {
        let positions = self.registry.snapshot();
        match self.publisher.publish_status(status, &positions) {
            Ok(sent) if sent > 0 => self.keepalive.mark_publish(now),
            Ok(_) => {}
            Err(e) => tracing::error!("Status publish failed: {:#}", e),
        }
    }

    /// Release resources in a fixed order; each step is independent so one
    /// failure never skips the rest.
    fn cleanup(&mut self, camera: Option<&mut CameraSource>) {
        if self.link.take().is_some() {
            tracing::info!("Serial port closed");
        }
        self.publisher.disconnect();
        if let Some(camera) = camera {
            camera.release();
        }
        tracing::info!("Cleanup complete");
    }
}
