use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentryError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Hardware unavailable: {device}: {message}")]
    Hardware { device: String, message: String },

    #[error("Message channel error: {message}")]
    Channel { message: String },

    #[error("Invalid mode: {value:?}")]
    InvalidMode { value: String },

    #[error("Invalid command on {topic}: {message}")]
    InvalidCommand { topic: String, message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl SentryError {
    pub fn hardware<S: Into<String>>(device: S, message: S) -> Self {
        Self::Hardware {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn channel<S: Into<String>>(message: S) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    pub fn invalid_command<S: Into<String>>(topic: S, message: S) -> Self {
        Self::InvalidCommand {
            topic: topic.into(),
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SentryError>;
