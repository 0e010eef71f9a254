pub mod actuators;
pub mod alert;
pub mod app;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hal;
pub mod journal;
pub mod mode;
pub mod router;
pub mod scheduler;

pub use actuators::{ActuatorDriver, ActuatorId, ActuatorRegistry};
pub use alert::{AlertHandle, AlertMachine};
pub use app::{Collaborators, SentryNode};
pub use channel::{MessageChannel, MqttChannel, MqttLink};
pub use config::SentryConfig;
pub use dispatch::AlertDispatcher;
pub use error::{Result, SentryError};
pub use hal::{CameraDevice, ClimateReading, ClimateSensor, LogShipper};
pub use journal::{EventJournal, JournalRecord, StatusRecorder};
pub use mode::{Mode, ModeStore};
pub use router::CommandRouter;
pub use scheduler::Scheduler;
