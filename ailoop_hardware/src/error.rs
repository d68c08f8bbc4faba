use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("spi error: {0}")]
    Spi(String),
    #[error("adc chip select not asserted")]
    ChipSelect,
    #[error("unknown adc configuration word {0:#04x}{1:02x}")]
    AdcConfig(u8, u8),
    #[error("flash not ready")]
    FlashNotReady,
    #[error("flash write protected")]
    WriteProtected,
    #[error("flash access out of range: {address:#x}+{len}")]
    OutOfRange { address: u32, len: usize },
    #[error("bus transceiver busy")]
    BusBusy,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
