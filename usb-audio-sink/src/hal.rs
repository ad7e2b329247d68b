//! Hardware collaborators the sink drives.
//!
//! Each trait carries its own `Error` type, so a board crate can plug in
//! whatever its peripheral drivers return. The VCXO control voltage is any
//! [`embedded_hal::pwm::SetDutyCycle`] output; the RC-filtered PWM duty cycle
//! is the control voltage.
//!
//! The completion interrupt is not a trait: bind the DMA-done vector to
//! [`RingIndices::on_chunk_complete`](crate::ring::RingIndices::on_chunk_complete)
//! on a `'static` [`RingIndices`](crate::ring::RingIndices).

/// Isochronous OUT endpoint carrying the host's audio stream.
pub trait AudioLink {
    /// Error type for endpoint operations.
    type Error;

    /// Whether a complete packet is waiting in the endpoint buffer.
    fn packet_available(&mut self) -> bool;

    /// Start copying the waiting packet into `buf`; returns its size in bytes.
    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Whether the copy started by [`read_packet`](Self::read_packet) is still
    /// in progress.
    fn receive_busy(&mut self) -> bool;

    /// Hand the endpoint back to the host for the next packet.
    fn rearm(&mut self) -> Result<(), Self::Error>;
}

/// Sample-clock divider fed from the VCXO.
pub trait SampleClock {
    /// Error type for clock operations.
    type Error;

    /// Load `divider` and start clocking the transfer engine.
    fn start(&mut self, divider: u16) -> Result<(), Self::Error>;

    /// Gate the clock; the transfer engine stalls mid-chunk.
    fn stop(&mut self) -> Result<(), Self::Error>;

    /// Change the divider while running.
    fn set_divider(&mut self, divider: u16) -> Result<(), Self::Error>;
}

/// DMA engine moving one chunk per sample-clock-paced burst to the DACs and
/// the I2S transmitter, following a cyclic descriptor chain (see
/// [`TransferChain`](crate::transfer::TransferChain)).
pub trait TransferEngine {
    /// Error type for engine operations.
    type Error;

    /// Arm all channels at their current descriptor. Transfers begin as soon
    /// as the sample clock runs.
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Drop pending requests and terminate the in-flight descriptor.
    fn cancel(&mut self) -> Result<(), Self::Error>;

    /// Chunk index of the descriptor the engine is currently on.
    fn active_chunk(&mut self) -> Result<usize, Self::Error>;

    /// Drive both analog outputs to `level`.
    fn park_outputs(&mut self, level: u8) -> Result<(), Self::Error>;
}
