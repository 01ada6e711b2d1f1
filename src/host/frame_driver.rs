use chrono::Local;
use statum::{machine, state};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{HostError, HostInput, HostSettings};
use crate::system::{FrameReport, InteractionSystem};

/// Inputs drained from the channel for one frame
#[derive(Debug, Clone, Default)]
pub struct InputBatch {
    pub inputs: Vec<HostInput>,
}

#[state]
#[derive(Debug, Clone)]
pub enum FrameState {
    Collecting,
    Processing(InputBatch),
    Publishing(FrameReport),
}

#[machine]
pub struct FrameDriver<S: FrameState> {
    input_receiver: mpsc::Receiver<HostInput>,
    report_sender: mpsc::Sender<FrameReport>,
    system: InteractionSystem,
    settings: HostSettings,
}

impl<S: FrameState> FrameDriver<S> {
    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn system(&self) -> &InteractionSystem {
        &self.system
    }

    /// Direct access for setup work such as subscriptions
    pub fn system_mut(&mut self) -> &mut InteractionSystem {
        &mut self.system
    }
}

impl FrameDriver<Collecting> {
    pub fn create(
        system: InteractionSystem,
        input_receiver: mpsc::Receiver<HostInput>,
        report_sender: mpsc::Sender<FrameReport>,
        settings: HostSettings,
    ) -> Self {
        info!("Creating frame driver with settings: {:?}", settings);
        Self::new(input_receiver, report_sender, system, settings)
    }

    /// Drains every queued input without waiting
    pub fn collect(mut self) -> Result<FrameDriver<Processing>, HostError> {
        let mut inputs = Vec::new();
        loop {
            match self.input_receiver.try_recv() {
                Ok(input) => {
                    debug!("Received host input: {:?}", input);
                    inputs.push(input);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    error!("Host input channel disconnected");
                    return Err(HostError::InputDisconnected);
                }
            }
        }

        if inputs.is_empty() {
            debug!("No host inputs this frame");
        } else {
            debug!("Collected {} host inputs", inputs.len());
        }
        Ok(self.transition_with(InputBatch { inputs }))
    }

    /// One full collect, process and publish cycle
    pub async fn step(self, dt: f32) -> Result<FrameDriver<Collecting>, HostError> {
        self.collect()?.process(dt).publish().await
    }
}

impl FrameDriver<Processing> {
    pub fn input_count(&self) -> usize {
        self.get_state_data()
            .map(|batch| batch.inputs.len())
            .unwrap_or(0)
    }

    /// Applies the batch and ticks the system by `dt` seconds
    pub fn process(mut self, dt: f32) -> FrameDriver<Publishing> {
        let inputs = match self.get_state_data() {
            Some(batch) => batch.inputs.clone(),
            None => {
                warn!("Processing state without an input batch");
                Vec::new()
            }
        };
        for input in inputs {
            input.apply(&mut self.system);
        }

        let report = self.system.tick(dt);
        if !report.events.is_empty() {
            debug!(
                "Frame {} produced {} events",
                report.frame,
                report.events.len()
            );
        }
        self.transition_with(report)
    }
}

impl FrameDriver<Publishing> {
    pub fn report(&self) -> Option<&FrameReport> {
        self.get_state_data()
    }

    pub async fn publish(self) -> Result<FrameDriver<Collecting>, HostError> {
        if let Some(report) = self.get_state_data().cloned() {
            let frame = report.frame;
            if self.report_sender.send(report).await.is_err() {
                error!("Failed to publish frame {}", frame);
                return Err(HostError::ReportChannelClosed);
            }
        }
        Ok(self.transition())
    }
}

/// Running frame driver task and its channels
pub struct FrameDriverHandle {
    input_sender: mpsc::Sender<HostInput>,
    report_receiver: mpsc::Receiver<FrameReport>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), HostError>>,
}

impl FrameDriverHandle {
    /// Moves the system into a tokio task ticking every `frame_interval_ms`
    pub fn spawn(system: InteractionSystem, settings: HostSettings) -> Self {
        let (input_sender, input_receiver) = mpsc::channel(settings.input_buffer.max(1));
        let (report_sender, report_receiver) = mpsc::channel(settings.report_buffer.max(1));
        let driver = FrameDriver::create(system, input_receiver, report_sender, settings);
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            info!("Frame driver task started");
            let result = run_driver_loop(driver, token).await;
            match &result {
                Ok(()) => info!("Frame driver task finished"),
                Err(e) => error!("Frame driver task terminated with error: {}", e),
            }
            result
        });

        Self {
            input_sender,
            report_receiver,
            shutdown,
            task,
        }
    }

    pub fn sender(&self) -> mpsc::Sender<HostInput> {
        self.input_sender.clone()
    }

    pub async fn send(&self, input: HostInput) -> Result<(), HostError> {
        self.input_sender
            .send(input)
            .await
            .map_err(|_| HostError::InputDisconnected)
    }

    /// Next published frame, `None` once the task has stopped
    pub async fn next_report(&mut self) -> Option<FrameReport> {
        self.report_receiver.recv().await
    }

    /// Stops the loop after the current frame and waits for the task
    pub async fn shutdown(self) -> Result<(), HostError> {
        self.shutdown.cancel();
        drop(self.report_receiver);
        self.task.await?
    }
}

async fn run_driver_loop(
    mut driver: FrameDriver<Collecting>,
    shutdown: CancellationToken,
) -> Result<(), HostError> {
    let settings = driver.settings().clone();
    let dt = settings.frame_delta();
    info!(
        "Starting frame loop with {}ms interval",
        settings.frame_interval_ms
    );

    let mut interval_timer = tokio::time::interval(tokio::time::Duration::from_millis(
        settings.frame_interval_ms.max(1),
    ));

    let mut frames = 0u64;
    let mut total_inputs = 0usize;
    let mut total_events = 0usize;
    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(settings.stats_interval_secs.max(1));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Frame driver shutting down after {} frames", driver.system().frame());
                return Ok(());
            }
            _ = interval_timer.tick() => {}
        }

        let frame_start = Local::now();
        let processing = driver.collect()?;
        total_inputs += processing.input_count();

        let publishing = processing.process(dt);
        total_events += publishing.report().map(|r| r.events.len()).unwrap_or(0);
        driver = match publishing.publish().await {
            Ok(driver) => driver,
            Err(HostError::ReportChannelClosed) if shutdown.is_cancelled() => return Ok(()),
            Err(e) => return Err(e),
        };
        frames += 1;

        let frame_time = Local::now() - frame_start;
        debug!(
            "Frame finished at {} in {} us",
            frame_start.format("%H:%M:%S.%3f"),
            frame_time.num_microseconds().unwrap_or(0)
        );

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            let elapsed_seconds = (now - last_stats_time).num_seconds().max(1);
            info!(
                "Frame stats: {} frames, {} inputs, {} events in {} seconds",
                frames, total_inputs, total_events, elapsed_seconds
            );
            info!(
                "Average: {:.2} inputs/frame, {:.2} frames/sec, {:.2} events/sec",
                total_inputs as f64 / frames as f64,
                frames as f64 / elapsed_seconds as f64,
                total_events as f64 / elapsed_seconds as f64
            );
            frames = 0;
            total_inputs = 0;
            total_events = 0;
            last_stats_time = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::TracingHapticSink;
    use crate::config::InteractionConfig;
    use crate::controller::{ControllerHandle, LogicalButton, RawSample};
    use crate::interaction::{CandidateConfig, CandidateId, InteractionEvent, OverlapSource};

    const RIGHT: ControllerHandle = ControllerHandle::right(1);
    const CUBE: CandidateId = CandidateId(1);

    fn system() -> InteractionSystem {
        let config = InteractionConfig {
            candidates: vec![CandidateConfig::grabbable(CUBE)],
            ..Default::default()
        };
        InteractionSystem::new(config, Box::new(TracingHapticSink)).unwrap()
    }

    fn grab_inputs() -> Vec<HostInput> {
        vec![
            HostInput::Connect { controller: RIGHT },
            HostInput::OverlapEnter {
                source: OverlapSource::Contact(RIGHT),
                candidate: CUBE,
            },
            HostInput::sample(RIGHT, LogicalButton::Grip, RawSample::pressed()),
        ]
    }

    fn grabbed(report: &FrameReport) -> bool {
        report.interactions().any(|event| {
            matches!(event, InteractionEvent::Grabbed { controller, candidate, .. }
                if *controller == RIGHT && *candidate == CUBE)
        })
    }

    #[tokio::test]
    async fn step_applies_inputs_and_publishes_report() {
        let (input_sender, input_receiver) = mpsc::channel(16);
        let (report_sender, mut report_receiver) = mpsc::channel(16);
        let driver = FrameDriver::create(
            system(),
            input_receiver,
            report_sender,
            HostSettings::default(),
        );

        for input in grab_inputs() {
            input_sender.send(input).await.unwrap();
        }
        let driver = driver.step(0.011).await.unwrap();

        let report = report_receiver.recv().await.unwrap();
        assert_eq!(report.frame, 1);
        assert!(grabbed(&report));
        assert_eq!(
            driver.system().arbiter().grabbed_object(RIGHT),
            Some(CUBE)
        );
    }

    #[tokio::test]
    async fn collect_fails_once_inputs_disconnect() {
        let (input_sender, input_receiver) = mpsc::channel(4);
        let (report_sender, _report_receiver) = mpsc::channel(4);
        let driver = FrameDriver::create(
            system(),
            input_receiver,
            report_sender,
            HostSettings::default(),
        );
        drop(input_sender);

        assert!(matches!(driver.collect(), Err(HostError::InputDisconnected)));
    }

    #[tokio::test]
    async fn publish_fails_without_report_receiver() {
        let (_input_sender, input_receiver) = mpsc::channel(4);
        let (report_sender, report_receiver) = mpsc::channel(4);
        let driver = FrameDriver::create(
            system(),
            input_receiver,
            report_sender,
            HostSettings::default(),
        );
        drop(report_receiver);

        let result = driver.step(0.011).await;
        assert!(matches!(result, Err(HostError::ReportChannelClosed)));
    }

    #[tokio::test]
    async fn spawned_driver_ticks_until_shutdown() {
        let settings = HostSettings {
            frame_interval_ms: 2,
            ..Default::default()
        };
        let mut handle = FrameDriverHandle::spawn(system(), settings);
        for input in grab_inputs() {
            handle.send(input).await.unwrap();
        }

        let mut seen = false;
        for _ in 0..200 {
            let report = handle.next_report().await.unwrap();
            if grabbed(&report) {
                seen = true;
                break;
            }
        }
        assert!(seen);
        handle.shutdown().await.unwrap();
    }
}
