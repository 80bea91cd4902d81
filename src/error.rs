use thiserror::Error;

/// Errors that can occur while parsing routes, simulating rides or driving a device
#[derive(Error, Debug)]
pub enum RideError {
    /// Caller supplied input that violates a precondition
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Free-form coordinate input could not be parsed
    #[error("Failed to parse coordinates: {0}")]
    Parse(String),

    /// JSON or GeoJSON decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No connected device was found
    #[error("No connected device found")]
    DeviceNotFound,

    /// The device runs an OS version that cannot simulate location
    #[error("Device {serial} is not supported (iOS {version}, need {required}+)")]
    UnsupportedDevice {
        /// Device serial number
        serial: String,
        /// Reported product version
        version: String,
        /// Minimum supported major version
        required: u32,
    },

    /// The location simulation service rejected a request
    #[error("Location service error: {0}")]
    Service(String),

    /// The ride was cancelled before it finished
    #[error("Ride cancelled")]
    Cancelled,

    /// The consumer side of a ride channel went away
    #[error("Ride update channel closed")]
    ChannelClosed,

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for ride operations
pub type Result<T> = std::result::Result<T, RideError>;

/// Copies keep the variant, so a reported error classifies like the original.
/// Wrapped IO and JSON errors are rebuilt from their kind and message.
impl Clone for RideError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidArgument(msg) => Self::InvalidArgument(msg.clone()),
            Self::Parse(msg) => Self::Parse(msg.clone()),
            Self::Json(e) => Self::Json(serde::de::Error::custom(e)),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::DeviceNotFound => Self::DeviceNotFound,
            Self::UnsupportedDevice {
                serial,
                version,
                required,
            } => Self::UnsupportedDevice {
                serial: serial.clone(),
                version: version.clone(),
                required: *required,
            },
            Self::Service(msg) => Self::Service(msg.clone()),
            Self::Cancelled => Self::Cancelled,
            Self::ChannelClosed => Self::ChannelClosed,
            Self::Other(msg) => Self::Other(msg.clone()),
        }
    }
}

impl RideError {
    /// Check if this error was caused by bad user input
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::Parse(_) | Self::Json(_)
        )
    }

    /// Check if this error comes from the device or its location service
    #[must_use]
    pub const fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound | Self::UnsupportedDevice { .. } | Self::Service(_)
        )
    }

    /// Check if the ride stopped because somebody asked it to
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::ChannelClosed)
    }
}
