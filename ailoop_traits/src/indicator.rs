//! Indicator request vocabulary shared by the core and the renderer.

/// Blink pattern requested for one channel indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndicatorMode {
    #[default]
    Off = 0,
    /// 200 ms on, 1000 ms off.
    Single = 1,
    /// Two 200 ms pulses, 1000 ms off.
    Double = 2,
    /// Three 200 ms pulses, 1000 ms off.
    Triple = 3,
    /// 200 ms on, 200 ms off.
    Blink = 4,
    /// 50 ms on, 50 ms off.
    Flick = 5,
    On = 6,
}

impl IndicatorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorMode::Off => "off",
            IndicatorMode::Single => "single",
            IndicatorMode::Double => "double",
            IndicatorMode::Triple => "triple",
            IndicatorMode::Blink => "blink",
            IndicatorMode::Flick => "flick",
            IndicatorMode::On => "on",
        }
    }
}

/// Bicolour LED colour; the discriminant is the expander bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    Green = 0b01,
    Red = 0b10,
    #[default]
    Yellow = 0b00,
    None = 0b11,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Green => "green",
            Color::Red => "red",
            Color::Yellow => "yellow",
            Color::None => "none",
        }
    }
}
