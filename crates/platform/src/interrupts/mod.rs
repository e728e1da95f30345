use std::fmt;

/// Electrical level of a legacy interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrqLevel {
    Low,
    High,
}

impl IrqLevel {
    pub fn from_bool(asserted: bool) -> Self {
        if asserted {
            Self::High
        } else {
            Self::Low
        }
    }

    pub fn is_asserted(self) -> bool {
        self == Self::High
    }

    /// Level encoding used by in-kernel interrupt controllers (`0` / `1`).
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Low => 0,
            Self::High => 1,
        }
    }
}

impl fmt::Display for IrqLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Output side of a device interrupt pin.
///
/// Devices own exactly one `IrqLine` and drive it from their own activity; the
/// implementation forwards level changes to whatever interrupt controller sits
/// behind the pin.
pub trait IrqLine: Send {
    fn set_level(&mut self, level: IrqLevel);
}

impl<F> IrqLine for F
where
    F: FnMut(IrqLevel) + Send,
{
    fn set_level(&mut self, level: IrqLevel) {
        self(level)
    }
}
