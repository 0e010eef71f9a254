use crate::actuators::{ActuatorDriver, ActuatorRegistry};
use crate::alert::{AlertHandle, AlertMachine};
use crate::channel::MessageChannel;
use crate::config::SentryConfig;
use crate::dispatch::AlertDispatcher;
use crate::error::Result;
use crate::hal::{CameraDevice, ClimateSensor, LogShipper};
use crate::journal::{EventJournal, JournalRecord, StatusRecorder};
use crate::mode::{Mode, ModeStore};
use crate::router::CommandRouter;
use crate::scheduler::Scheduler;
use chrono::{Days, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// External hardware and cloud collaborators handed in at startup. Optional
/// entries are capabilities the node degrades without.
pub struct Collaborators {
    pub led_light: Box<dyn ActuatorDriver>,
    pub fan_relay: Box<dyn ActuatorDriver>,
    pub buzzer: Box<dyn ActuatorDriver>,
    pub camera: Option<Arc<dyn CameraDevice>>,
    pub climate: Option<Arc<dyn ClimateSensor>>,
    pub shipper: Option<Arc<dyn LogShipper>>,
}

/// The assembled monitoring node.
///
/// Exposes exactly four things for collaborator wiring: the motion trigger
/// entry point, the inbound command handler, and the two scheduled job
/// bodies (sensor poll, nightly maintenance).
pub struct SentryNode {
    config: SentryConfig,
    mode: Arc<ModeStore>,
    registry: Arc<ActuatorRegistry>,
    recorder: Arc<StatusRecorder>,
    router: Arc<CommandRouter>,
    alert: AlertHandle,
    channel: Arc<dyn MessageChannel>,
    climate: Option<Arc<dyn ClimateSensor>>,
    shipper: Option<Arc<dyn LogShipper>>,
    climate_warned: AtomicBool,
    token: CancellationToken,
}

impl SentryNode {
    /// Wire every component together. Fails only on unusable configuration
    /// or an unwritable data directory; optional collaborators degrade.
    pub fn build(
        config: SentryConfig,
        collaborators: Collaborators,
        channel: Arc<dyn MessageChannel>,
        token: CancellationToken,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        std::fs::create_dir_all(&config.logging.image_path)?;

        let journal = Arc::new(EventJournal::new(&config.logging.data_path)?);
        let registry = Arc::new(ActuatorRegistry::new(
            collaborators.led_light,
            collaborators.fan_relay,
            collaborators.buzzer,
        ));
        let mode = Arc::new(ModeStore::new(Mode::Home));
        let recorder = Arc::new(StatusRecorder::new(
            journal,
            Arc::clone(&mode),
            Arc::clone(&registry),
        ));

        let dispatcher = Arc::new(AlertDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&recorder),
            Arc::clone(&channel),
            collaborators.camera,
            config.mqtt.feeds.clone(),
            &config.logging.image_path,
        ));

        let machine = AlertMachine::new(
            Arc::clone(&mode),
            dispatcher,
            Arc::clone(&recorder),
            config.alert.debounce_window(),
            config.alert.cooldown(),
        );
        let (alert, _machine_task) = machine.spawn();

        let router = Arc::new(CommandRouter::new(
            Arc::clone(&registry),
            Arc::clone(&mode),
            Arc::clone(&recorder),
            config.mqtt.feeds.clone(),
        ));

        if collaborators.climate.is_none() {
            warn!("no climate sensor available; sensor poll disabled");
        }

        info!("homesentry node assembled");
        Ok(Arc::new(Self {
            config,
            mode,
            registry,
            recorder,
            router,
            alert,
            channel,
            climate: collaborators.climate,
            shipper: collaborators.shipper,
            climate_warned: AtomicBool::new(false),
            token,
        }))
    }

    /// Entry point for the motion sensor collaborator.
    pub fn motion_trigger(&self) -> AlertHandle {
        self.alert.clone()
    }

    /// Entry point for the message channel collaborator.
    pub fn command_router(&self) -> Arc<CommandRouter> {
        Arc::clone(&self.router)
    }

    pub fn mode(&self) -> &Arc<ModeStore> {
        &self.mode
    }

    pub fn registry(&self) -> &Arc<ActuatorRegistry> {
        &self.registry
    }

    pub fn recorder(&self) -> &Arc<StatusRecorder> {
        &self.recorder
    }

    /// Job body: read the climate sensor, publish the readings, journal them.
    pub async fn poll_sensors(&self) -> Result<()> {
        let Some(sensor) = self.climate.clone() else {
            if !self.climate_warned.swap(true, Ordering::SeqCst) {
                warn!("sensor poll skipped: climate sensor absent");
            }
            return Ok(());
        };

        let reading = tokio::task::spawn_blocking(move || sensor.read())
            .await
            .map_err(|e| {
                crate::error::SentryError::component("sensor_poll".to_string(), e.to_string())
            })??;

        let temperature = format!("{:.2}", reading.temperature_c);
        let humidity = format!("{:.2}", reading.humidity_pct);
        info!(%temperature, %humidity, "climate reading");

        let feeds = &self.config.mqtt.feeds;
        if let Err(e) = self.channel.publish(&feeds.temperature, &temperature).await {
            warn!("temperature publish dropped: {e}");
        }
        if let Err(e) = self.channel.publish(&feeds.humidity, &humidity).await {
            warn!("humidity publish dropped: {e}");
        }

        self.recorder.record(
            JournalRecord::new("sensor_reading")
                .field("temperature", &temperature)
                .field("humidity", &humidity),
        );
        Ok(())
    }

    /// Job body: hand yesterday's journal file to the log shipper.
    pub async fn run_maintenance(&self) -> Result<()> {
        let Some(yesterday) = Local::now().date_naive().checked_sub_days(Days::new(1)) else {
            return Ok(());
        };
        let path = self.recorder.journal().file_for_date(yesterday);

        if !path.exists() {
            warn!(date = %yesterday, "no journal file from yesterday; nothing to ship");
            return Ok(());
        }

        let Some(shipper) = &self.shipper else {
            info!(path = %path.display(), "no log shipper configured; keeping file local");
            return Ok(());
        };

        info!(path = %path.display(), "shipping yesterday's journal");
        if let Err(e) = shipper.ship(&path).await {
            error!(path = %path.display(), "journal upload failed; file remains local: {e}");
        }
        Ok(())
    }

    /// Register the two periodic job bodies with the scheduler.
    pub fn start_jobs(self: &Arc<Self>, scheduler: &mut Scheduler) -> Result<()> {
        let maintenance_time = self.config.schedule.maintenance_time()?;

        let node = Arc::clone(self);
        scheduler.every(
            "sensor_poll",
            self.config.schedule.poll_interval(),
            move || {
                let node = Arc::clone(&node);
                async move { node.poll_sensors().await }
            },
        );

        let node = Arc::clone(self);
        scheduler.daily("nightly_maintenance", maintenance_time, move || {
            let node = Arc::clone(&node);
            async move { node.run_maintenance().await }
        });

        Ok(())
    }

    /// Block until SIGINT/SIGTERM, then wind the node down: cancel the
    /// background loops and force every actuator off. An in-flight capture
    /// task may be abandoned; that is acceptable.
    pub async fn run_until_shutdown(&self) -> Result<()> {
        let signal = wait_for_shutdown_signal().await;
        info!(signal, "shutting down");

        self.token.cancel();
        self.registry.all_off();
        if let Err(e) = self
            .channel
            .publish(&self.config.mqtt.feeds.motion_state, "0")
            .await
        {
            warn!("final all-clear publish dropped: {e}");
        }
        info!("shutdown complete");
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = &mut ctrl_c => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!("could not install SIGTERM handler: {e}");
            let _ = ctrl_c.await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuators::testing::NullDriver;
    use crate::actuators::ActuatorId;
    use crate::channel::testing::{FailingChannel, RecordingChannel};
    use crate::config::FeedConfig;
    use crate::hal::testing::{RecordingShipper, StaticClimate};
    use crate::hal::ClimateReading;
    use crate::journal::read_rows;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> SentryConfig {
        let mut config = SentryConfig::default();
        config.logging.data_path = dir.path().join("data").to_string_lossy().into_owned();
        config.logging.image_path = dir.path().join("images").to_string_lossy().into_owned();
        // Short windows so scenarios run in test time.
        config.alert.debounce_seconds = 1;
        config.alert.cooldown_seconds = 1;
        config
    }

    fn build_node(
        config: SentryConfig,
        channel: Arc<dyn MessageChannel>,
        climate: Option<Arc<dyn ClimateSensor>>,
        shipper: Option<Arc<dyn LogShipper>>,
    ) -> Arc<SentryNode> {
        SentryNode::build(
            config,
            Collaborators {
                led_light: Box::new(NullDriver),
                fan_relay: Box::new(NullDriver),
                buzzer: Box::new(NullDriver),
                camera: None,
                climate,
                shipper,
            },
            channel,
            CancellationToken::new(),
        )
        .unwrap()
    }

    fn journal_rows(node: &SentryNode) -> Vec<Vec<String>> {
        let path = node
            .recorder()
            .journal()
            .file_for_date(Local::now().date_naive());
        read_rows(&path).unwrap_or_default()
    }

    #[tokio::test]
    async fn away_mode_trigger_flows_through_to_side_effects() {
        let dir = TempDir::new().unwrap();
        let (channel, published) = RecordingChannel::new();
        let node = build_node(test_config(&dir), channel, None, None);

        let feeds = FeedConfig::default();
        node.command_router().handle(&feeds.system_mode, "Away");
        node.motion_trigger().trigger();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(node.registry().get_state(ActuatorId::Buzzer));
        assert!(published
            .lock()
            .contains(&(feeds.motion_state.clone(), "1".to_string())));
        let rows = journal_rows(&node);
        assert!(rows
            .iter()
            .any(|row| row.contains(&"motion_detected".to_string())));
    }

    #[tokio::test]
    async fn home_mode_trigger_is_suppressed_end_to_end() {
        let dir = TempDir::new().unwrap();
        let (channel, published) = RecordingChannel::new();
        let node = build_node(test_config(&dir), channel, None, None);

        node.motion_trigger().trigger();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!node.registry().get_state(ActuatorId::Buzzer));
        assert!(published.lock().is_empty());
        let rows = journal_rows(&node);
        assert!(rows
            .iter()
            .any(|row| row.contains(&"motion_ignored".to_string())));
    }

    #[tokio::test]
    async fn poll_publishes_and_journals_reading() {
        let dir = TempDir::new().unwrap();
        let (channel, published) = RecordingChannel::new();
        let climate = Arc::new(StaticClimate(ClimateReading {
            temperature_c: 21.5,
            humidity_pct: 40.0,
        }));
        let node = build_node(test_config(&dir), channel, Some(climate), None);

        node.poll_sensors().await.unwrap();

        let feeds = FeedConfig::default();
        let published = published.lock();
        assert!(published.contains(&(feeds.temperature.clone(), "21.50".to_string())));
        assert!(published.contains(&(feeds.humidity.clone(), "40.00".to_string())));

        let rows = journal_rows(&node);
        assert!(rows
            .iter()
            .any(|row| row.contains(&"sensor_reading".to_string())));
    }

    #[tokio::test]
    async fn poll_without_sensor_degrades_silently() {
        let dir = TempDir::new().unwrap();
        let (channel, published) = RecordingChannel::new();
        let node = build_node(test_config(&dir), channel, None, None);

        node.poll_sensors().await.unwrap();
        node.poll_sensors().await.unwrap();

        assert!(published.lock().is_empty());
        assert!(journal_rows(&node).is_empty());
    }

    #[tokio::test]
    async fn poll_survives_publish_failure() {
        let dir = TempDir::new().unwrap();
        let climate = Arc::new(StaticClimate(ClimateReading {
            temperature_c: 20.0,
            humidity_pct: 50.0,
        }));
        let node = build_node(
            test_config(&dir),
            Arc::new(FailingChannel),
            Some(climate),
            None,
        );

        node.poll_sensors().await.unwrap();

        // Reading still journaled even though both publishes failed.
        let rows = journal_rows(&node);
        assert!(rows
            .iter()
            .any(|row| row.contains(&"sensor_reading".to_string())));
    }

    #[tokio::test]
    async fn maintenance_ships_yesterdays_file() {
        let dir = TempDir::new().unwrap();
        let (channel, _published) = RecordingChannel::new();
        let (shipper, shipped) = RecordingShipper::new();
        let node = build_node(test_config(&dir), channel, None, Some(shipper));

        let yesterday = Local::now()
            .date_naive()
            .checked_sub_days(Days::new(1))
            .unwrap();
        let path = node.recorder().journal().file_for_date(yesterday);
        std::fs::write(&path, "timestamp,event_type\n").unwrap();

        node.run_maintenance().await.unwrap();

        assert_eq!(shipped.lock().as_slice(), &[path]);
    }

    #[tokio::test]
    async fn maintenance_with_no_file_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let (channel, _published) = RecordingChannel::new();
        let (shipper, shipped) = RecordingShipper::new();
        let node = build_node(test_config(&dir), channel, None, Some(shipper));

        node.run_maintenance().await.unwrap();

        assert!(shipped.lock().is_empty());
    }

    #[tokio::test]
    async fn duplicate_inbound_commands_leave_identical_state() {
        let dir = TempDir::new().unwrap();
        let (channel, _published) = RecordingChannel::new();
        let node = build_node(test_config(&dir), channel, None, None);

        let feeds = FeedConfig::default();
        node.command_router().handle(&feeds.light_control, "1");
        node.command_router().handle(&feeds.system_mode, "Night");
        let once = (node.registry().snapshot(), node.mode().get());

        node.command_router().handle(&feeds.light_control, "1");
        node.command_router().handle(&feeds.system_mode, "Night");
        let twice = (node.registry().snapshot(), node.mode().get());

        assert_eq!(once, twice);
    }
}
