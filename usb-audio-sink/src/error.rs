//! Hardware error wrapper.
//!
//! None of the stream conditions (overrun, starvation, band exhaustion) are
//! errors. The only failures are the ones the peripherals report, tagged here
//! with the collaborator that raised them.

use core::fmt;

/// Error raised by one of the sink's hardware collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<L, C, T, V> {
    /// USB OUT endpoint.
    Link(L),
    /// Sample-clock divider.
    Clock(C),
    /// Playback transfer engine.
    Transfer(T),
    /// VCXO control-voltage output.
    ControlVoltage(V),
}

impl<L, C, T, V> fmt::Display for Error<L, C, T, V>
where
    L: fmt::Debug,
    C: fmt::Debug,
    T: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Link(e) => write!(f, "audio link: {e:?}"),
            Error::Clock(e) => write!(f, "sample clock: {e:?}"),
            Error::Transfer(e) => write!(f, "transfer engine: {e:?}"),
            Error::ControlVoltage(e) => write!(f, "control voltage: {e:?}"),
        }
    }
}
