mod stats;
#[cfg(test)]
mod tests;

pub use stats::SchedulerStats;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::camera::{CameraSourceManager, PollOutcome};
use crate::config::RovercamConfig;
use crate::detector::{ObstacleDetector, ObstacleSignal};
use crate::filter::DepthFilterChain;
use crate::frame::{CameraId, DepthImage, FrameSet};
use crate::output::{ImagePublishError, ImagePublisher, OutputSink, SignalPublisher};

/// What one scheduling pass produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Signals published this tick, in source order
    pub signals: Vec<(CameraId, ObstacleSignal)>,
    pub color_published: Vec<CameraId>,
    pub no_frame: Vec<CameraId>,
}

/// Fixed-rate loop driving acquisition, filtering, detection and publication.
///
/// Each tick visits the active sources in the order DepthA, DepthB, WebcamA,
/// WebcamB. A tick always completes before the next one starts; late ticks are
/// delayed, never overlapped.
pub struct FrameScheduler {
    manager: CameraSourceManager,
    filters: DepthFilterChain,
    detector: ObstacleDetector,
    images: ImagePublisher,
    signals: SignalPublisher,
    tick_period: Duration,
    stats: SchedulerStats,
    calibration_warned: HashSet<CameraId>,
}

impl FrameScheduler {
    pub fn new(
        manager: CameraSourceManager,
        config: &RovercamConfig,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            manager,
            filters: DepthFilterChain::new(&config.filter),
            detector: ObstacleDetector::new(config.detector.clone()),
            images: ImagePublisher::new(&config.output, sink.clone()),
            signals: SignalPublisher::new(
                &config.output.topics,
                &config.detector.debounce,
                sink,
            ),
            tick_period: config.scheduler.tick_period(),
            stats: SchedulerStats::default(),
            calibration_warned: HashSet::new(),
        }
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn manager(&self) -> &CameraSourceManager {
        &self.manager
    }

    pub fn filters(&self) -> &DepthFilterChain {
        &self.filters
    }

    /// Log the channels each active source publishes on
    pub fn announce_channels(&self) {
        for id in self.manager.active_sources() {
            info!("Advertising {} on {}", id, self.images.color_channel(id));
            if let Some(depth) = self.images.depth_channel(id) {
                debug!("Depth image channel {} reserved for {}", depth, id);
            }
        }

        if !self.manager.active_depth_sources().is_empty() {
            let [left, right, proximity] = self.signals.channels();
            info!(
                "Obstacle signals on {}, {} and {} (debounce {})",
                left,
                right,
                proximity,
                if self.signals.debouncing() { "on" } else { "off" }
            );
        }
    }

    /// Run one scheduling pass over every active source
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        self.stats.record_tick();

        for id in CameraId::ALL {
            if !self.manager.is_active(id) {
                continue;
            }

            match self.manager.poll(id) {
                PollOutcome::NoFrameAvailable => {
                    self.stats.record_miss(id);
                    report.no_frame.push(id);
                }
                PollOutcome::Frame(frame) => {
                    self.stats.record_frame(id);
                    self.process_frame(frame, &mut report).await;
                }
            }
        }

        report
    }

    async fn process_frame(&mut self, frame: FrameSet, report: &mut TickReport) {
        let id = frame.source_id;

        if let Some(color) = frame.color_frame.as_ref() {
            match self.images.publish_color(id, color).await {
                Ok(()) => {
                    self.stats.record_image();
                    report.color_published.push(id);
                }
                Err(ImagePublishError::Encode(e)) => {
                    error!("Failed to encode {} color frame: {}", id, e);
                    self.stats.record_encode_failure();
                }
                Err(ImagePublishError::Output(e)) => {
                    error!("Failed to publish {} color frame: {}", id, e);
                    self.stats.record_publish_failure();
                }
            }
        }

        let Some(raw) = frame.depth_frame.as_ref() else {
            return;
        };

        let filtered = self.filters.filter(raw, id);
        self.check_calibration(id, &filtered);
        let signal = self.detector.detect(&filtered);

        match self.signals.publish(id, signal).await {
            Ok(published) => {
                self.stats.record_signal();
                report.signals.push((id, published));
            }
            Err(_) => self.stats.record_publish_failure(),
        }
    }

    fn check_calibration(&mut self, id: CameraId, frame: &DepthImage) {
        if self.detector.matches_calibration(frame) || self.calibration_warned.contains(&id) {
            return;
        }

        let (width, height) = self.detector.config().calibration_resolution;
        warn!(
            "{} delivers {}x{} depth frames; sampling windows are calibrated for {}x{}",
            id,
            frame.width(),
            frame.height(),
            width,
            height
        );
        self.calibration_warned.insert(id);
    }

    /// Tick until `token` is cancelled, then release every camera.
    pub async fn run(&mut self, token: CancellationToken) -> SchedulerStats {
        let mut ticker = interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Frame scheduler started: {} active sources, tick {:?}",
            self.manager.active_count(),
            self.tick_period
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Frame scheduler cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            let report = self.tick().await;
            let elapsed = started.elapsed();

            if elapsed > self.tick_period {
                self.stats.record_overrun();
                debug!(
                    "Tick took {:?}, longer than the {:?} period",
                    elapsed, self.tick_period
                );
            }

            if !report.no_frame.is_empty() {
                debug!("No frame this tick from {:?}", report.no_frame);
            }
        }

        // Capture threads may take a while to notice cancellation
        let detached = self.manager.detach_handles();
        if !detached.is_empty() {
            if let Err(e) = tokio::task::spawn_blocking(move || detached.release()).await {
                error!("Camera release task failed: {}", e);
            }
        }

        info!(
            "Frame scheduler stopped after {} ticks ({} signals, {} images, {} overruns)",
            self.stats.ticks,
            self.stats.signals_published,
            self.stats.images_published,
            self.stats.overruns
        );
        self.stats.clone()
    }
}
