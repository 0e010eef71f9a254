use crate::dispatch::AlertDispatcher;
use crate::journal::{JournalRecord, StatusRecorder};
use crate::mode::{Mode, ModeStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Messages into the alert state machine. Triggers come from the motion
/// sensor entry point, expiries from the cooldown timer task.
#[derive(Debug)]
enum AlertMsg {
    Trigger,
    CooldownExpired,
}

/// Nonblocking entry point handed to the motion sensor collaborator.
/// Cheap to clone; safe to invoke from any context.
#[derive(Clone)]
pub struct AlertHandle {
    tx: mpsc::UnboundedSender<AlertMsg>,
}

impl AlertHandle {
    /// Deliver one motion trigger. Returns immediately; the decision runs on
    /// the state machine task.
    pub fn trigger(&self) {
        let _ = self.tx.send(AlertMsg::Trigger);
    }
}

/// The motion debounce/alert state machine.
///
/// A single task owns all transition state (`last_trigger`, open session),
/// so the debounce comparison and session creation are one atomic step: two
/// racing triggers can never open two sessions. A trigger during an open
/// session is suppressed outright; the first trigger's cooldown timer is
/// authoritative and is never extended.
pub struct AlertMachine {
    mode: Arc<ModeStore>,
    dispatcher: Arc<AlertDispatcher>,
    recorder: Arc<StatusRecorder>,
    debounce_window: Duration,
    cooldown: Duration,
}

impl AlertMachine {
    pub fn new(
        mode: Arc<ModeStore>,
        dispatcher: Arc<AlertDispatcher>,
        recorder: Arc<StatusRecorder>,
        debounce_window: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            mode,
            dispatcher,
            recorder,
            debounce_window,
            cooldown,
        }
    }

    /// Start the state machine task and return its trigger handle.
    pub fn spawn(self) -> (AlertHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = AlertHandle { tx: tx.clone() };
        let task = tokio::spawn(self.run(tx, rx));
        (handle, task)
    }

    async fn run(
        self,
        tx: mpsc::UnboundedSender<AlertMsg>,
        mut rx: mpsc::UnboundedReceiver<AlertMsg>,
    ) {
        let mut last_trigger: Option<Instant> = None;
        let mut session_open = false;

        while let Some(msg) = rx.recv().await {
            match msg {
                AlertMsg::Trigger => {
                    let mode = self.mode.get();
                    if mode != Mode::Away {
                        info!(%mode, "motion detected but mode is not Away; ignoring");
                        self.recorder
                            .record(JournalRecord::new("motion_ignored").field("mode", mode));
                        continue;
                    }

                    if session_open {
                        warn!("motion detected during open alert session; suppressed");
                        continue;
                    }

                    if let Some(last) = last_trigger {
                        if last.elapsed() < self.debounce_window {
                            warn!("motion detected within debounce window; suppressed");
                            continue;
                        }
                    }

                    last_trigger = Some(Instant::now());
                    session_open = true;
                    info!("SECURITY ALERT: motion detected while in Away mode");
                    self.dispatcher.dispatch_alert();

                    let expiry_tx = tx.clone();
                    let cooldown = self.cooldown;
                    tokio::spawn(async move {
                        tokio::time::sleep(cooldown).await;
                        let _ = expiry_tx.send(AlertMsg::CooldownExpired);
                    });
                }
                AlertMsg::CooldownExpired => {
                    session_open = false;
                    self.dispatcher.clear_alert();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuators::testing::{CountingDriver, NullDriver};
    use crate::actuators::{ActuatorId, ActuatorRegistry};
    use crate::channel::testing::RecordingChannel;
    use crate::config::FeedConfig;
    use crate::journal::{read_rows, EventJournal};
    use chrono::Local;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        handle: AlertHandle,
        mode: Arc<ModeStore>,
        registry: Arc<ActuatorRegistry>,
        journal: Arc<EventJournal>,
        published: Arc<Mutex<Vec<(String, String)>>>,
        buzzer_on: Arc<AtomicUsize>,
        buzzer_off: Arc<AtomicUsize>,
        _dir: TempDir,
    }

    /// Machine with a 100 ms debounce window and 200 ms cooldown.
    fn fixture(initial_mode: Mode) -> Fixture {
        let dir = TempDir::new().unwrap();
        let journal = Arc::new(EventJournal::new(dir.path().join("data")).unwrap());
        let (buzzer, buzzer_on, buzzer_off) = CountingDriver::new();
        let registry = Arc::new(ActuatorRegistry::new(
            Box::new(NullDriver),
            Box::new(NullDriver),
            buzzer,
        ));
        let mode = Arc::new(ModeStore::new(initial_mode));
        let recorder = Arc::new(StatusRecorder::new(
            Arc::clone(&journal),
            Arc::clone(&mode),
            Arc::clone(&registry),
        ));
        let (channel, published) = RecordingChannel::new();
        let dispatcher = Arc::new(AlertDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&recorder),
            channel,
            None,
            FeedConfig::default(),
            dir.path().join("images"),
        ));

        let machine = AlertMachine::new(
            mode.clone(),
            dispatcher,
            recorder,
            Duration::from_millis(100),
            Duration::from_millis(200),
        );
        let (handle, _task) = machine.spawn();

        Fixture {
            handle,
            mode,
            registry,
            journal,
            published,
            buzzer_on,
            buzzer_off,
            _dir: dir,
        }
    }

    fn journal_events(journal: &EventJournal) -> Vec<String> {
        let path = journal.file_for_date(Local::now().date_naive());
        let rows = read_rows(&path).unwrap_or_default();
        if rows.is_empty() {
            return Vec::new();
        }
        let event_col = rows[0]
            .iter()
            .position(|name| name == "event_type")
            .unwrap();
        rows[1..].iter().map(|row| row[event_col].clone()).collect()
    }

    #[tokio::test]
    async fn rapid_triggers_open_exactly_one_session() {
        let fx = fixture(Mode::Away);

        for _ in 0..5 {
            fx.handle.trigger();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(fx.registry.get_state(ActuatorId::Buzzer));
        assert_eq!(fx.buzzer_on.load(Ordering::SeqCst), 1);
        let events = journal_events(&fx.journal);
        assert_eq!(
            events.iter().filter(|e| *e == "motion_detected").count(),
            1
        );

        // Cooldown fires once: sounder off exactly once, all-clear published.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!fx.registry.get_state(ActuatorId::Buzzer));
        assert_eq!(fx.buzzer_off.load(Ordering::SeqCst), 1);
        let feeds = FeedConfig::default();
        let published = fx.published.lock();
        assert!(published.contains(&(feeds.motion_state.clone(), "1".to_string())));
        assert!(published.contains(&(feeds.motion_state.clone(), "0".to_string())));
    }

    #[tokio::test]
    async fn non_away_mode_suppresses_everything() {
        let fx = fixture(Mode::Home);

        fx.handle.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!fx.registry.get_state(ActuatorId::Buzzer));
        assert_eq!(fx.buzzer_on.load(Ordering::SeqCst), 0);
        assert!(fx.published.lock().is_empty());

        let events = journal_events(&fx.journal);
        assert_eq!(events, vec!["motion_ignored".to_string()]);

        let path = fx.journal.file_for_date(Local::now().date_naive());
        let rows = read_rows(&path).unwrap();
        assert!(rows[1].contains(&"Home".to_string()));
    }

    #[tokio::test]
    async fn trigger_after_debounce_window_opens_new_session() {
        let fx = fixture(Mode::Away);

        fx.handle.trigger();
        // Past both cooldown (200 ms) and debounce (100 ms).
        tokio::time::sleep(Duration::from_millis(300)).await;
        fx.handle.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(fx.buzzer_on.load(Ordering::SeqCst), 2);
        let events = journal_events(&fx.journal);
        assert_eq!(
            events.iter().filter(|e| *e == "motion_detected").count(),
            2
        );
    }

    #[tokio::test]
    async fn trigger_mid_cooldown_does_not_extend_timer() {
        let fx = fixture(Mode::Away);

        fx.handle.trigger();
        tokio::time::sleep(Duration::from_millis(120)).await;
        // Session still open (cooldown is 200 ms); this trigger must neither
        // open a session nor push the clear time back.
        fx.handle.trigger();
        tokio::time::sleep(Duration::from_millis(120)).await;

        // First trigger's timer has fired by now.
        assert!(!fx.registry.get_state(ActuatorId::Buzzer));
        assert_eq!(fx.buzzer_on.load(Ordering::SeqCst), 1);
        assert_eq!(fx.buzzer_off.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mode_change_between_triggers_is_respected() {
        let fx = fixture(Mode::Away);

        fx.handle.trigger();
        tokio::time::sleep(Duration::from_millis(300)).await;

        fx.mode.set(Mode::Night);
        fx.handle.trigger();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events = journal_events(&fx.journal);
        assert_eq!(
            events.iter().filter(|e| *e == "motion_detected").count(),
            1
        );
        assert_eq!(events.iter().filter(|e| *e == "motion_ignored").count(), 1);
    }
}
