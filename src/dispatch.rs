use crate::actuators::{ActuatorId, ActuatorRegistry};
use crate::channel::MessageChannel;
use crate::config::FeedConfig;
use crate::hal::CameraDevice;
use crate::journal::{JournalRecord, StatusRecorder};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Fans an accepted alert out into its side effects: sounder on, outbound
/// publish, detached photo capture, journal record.
///
/// Nothing here blocks the triggering context beyond the fast actuator write
/// and task spawns; in particular the capture task is never awaited.
pub struct AlertDispatcher {
    registry: Arc<ActuatorRegistry>,
    recorder: Arc<StatusRecorder>,
    channel: Arc<dyn MessageChannel>,
    camera: Option<Arc<dyn CameraDevice>>,
    feeds: FeedConfig,
    image_path: PathBuf,
}

impl AlertDispatcher {
    pub fn new(
        registry: Arc<ActuatorRegistry>,
        recorder: Arc<StatusRecorder>,
        channel: Arc<dyn MessageChannel>,
        camera: Option<Arc<dyn CameraDevice>>,
        feeds: FeedConfig,
        image_path: impl Into<PathBuf>,
    ) -> Self {
        if camera.is_none() {
            warn!("no camera available; alert photo capture disabled");
        }
        Self {
            registry,
            recorder,
            channel,
            camera,
            feeds,
            image_path: image_path.into(),
        }
    }

    /// Run the side effects of a newly opened alert session.
    pub fn dispatch_alert(&self) {
        // Synchronous and fast: the sounder comes on before anything else.
        self.registry.set_state(ActuatorId::Buzzer, true);

        self.publish_detached(self.feeds.motion_state.clone(), "1".to_string());

        if let Some(camera) = &self.camera {
            self.spawn_capture(Arc::clone(camera));
        }

        self.recorder.record(
            JournalRecord::new("motion_detected").field("details", "system was in Away mode"),
        );
    }

    /// Close out a session once the cooldown has elapsed: sounder off,
    /// all-clear published.
    pub fn clear_alert(&self) {
        self.registry.set_state(ActuatorId::Buzzer, false);
        self.publish_detached(self.feeds.motion_state.clone(), "0".to_string());
        info!("motion alert cleared");
    }

    fn publish_detached(&self, topic: String, payload: String) {
        let channel = Arc::clone(&self.channel);
        tokio::spawn(async move {
            if let Err(e) = channel.publish(&topic, &payload).await {
                warn!(topic = %topic, "alert publish dropped: {e}");
            }
        });
    }

    fn spawn_capture(&self, camera: Arc<dyn CameraDevice>) {
        let channel = Arc::clone(&self.channel);
        let feed = self.feeds.camera_timestamp.clone();
        let stamp = Local::now();
        let path = self
            .image_path
            .join(format!("motion_{}.jpg", stamp.format("%Y%m%d_%H%M%S")));

        tokio::spawn(async move {
            let capture_path = path.clone();
            let result =
                tokio::task::spawn_blocking(move || camera.capture_to(&capture_path)).await;

            match result {
                Ok(Ok(())) => {
                    info!(path = %path.display(), "alert image captured");
                    if let Err(e) = channel.publish(&feed, &stamp.to_rfc3339()).await {
                        warn!("capture timestamp publish dropped: {e}");
                    }
                }
                Ok(Err(e)) => error!(path = %path.display(), "image capture failed: {e}"),
                Err(e) => error!("capture task panicked: {e}"),
            }
        });
    }
}
