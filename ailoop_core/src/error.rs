use thiserror::Error;

/// Why a stored calibration record was rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityFault {
    #[error("checksum missing")]
    Missing,
    #[error("checksum mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    Mismatch { stored: u32, computed: u32 },
}

/// Fault classes of the module. None of them is fatal: each one degrades to
/// defaults or to a visible indicator pattern.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FaultError {
    #[error("storage medium unavailable after {attempts} attempts")]
    HardwareUnavailable { attempts: u32 },
    #[error("calibration record integrity fault: {0}")]
    DataIntegrity(IntegrityFault),
    #[error("invalid operator input: {0}")]
    InvalidOperatorInput(String),
    #[error("calibration fit is degenerate")]
    ComputationDegenerate,
    #[error("bus channel {channel} timed out")]
    CommunicationTimeout { channel: u8 },
    #[error("hardware error: {0}")]
    Hardware(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing adc transport")]
    MissingAdc,
    #[error("missing flash transport")]
    MissingFlash,
    #[error("missing bus transport")]
    MissingBus,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
