/// Number of audio channels carried in each USB packet.
pub const AUDIO_CHANNELS: usize = 2;

/// Bytes per sample in the USB stream (16-bit little-endian PCM).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes per interleaved stereo frame in the USB stream.
pub const PACKET_FRAME_BYTES: usize = AUDIO_CHANNELS * BYTES_PER_SAMPLE;

/// Largest isochronous OUT packet the endpoint accepts.
pub const MAX_PACKET_BYTES: usize = 384;

/// Frames moved by one playback transfer (one full packet).
pub const CHUNK_FRAMES: usize = MAX_PACKET_BYTES / PACKET_FRAME_BYTES;

/// Number of chunks in the ring; the descriptor chain has one link per chunk.
pub const NUM_CHUNKS: usize = 10;

/// Ring capacity in frames.
pub const BUFFER_FRAMES: usize = CHUNK_FRAMES * NUM_CHUNKS;

/// Fill level the controller steers towards.
pub const TARGET_FILL: usize = BUFFER_FRAMES / 2;

/// Bytes per frame in the digital (I2S) buffer: two 16-bit big-endian words.
pub const DIGITAL_FRAME_BYTES: usize = 4;

/// Fill above which the next packet is discarded.
pub const HIGH_WATER_FRAMES: usize = CHUNK_FRAMES * 8;

/// Fill below which a completed chunk counts as starvation.
pub const LOW_WATER_FRAMES: usize = CHUNK_FRAMES * 2;

/// Analog DAC code for silence (mid-scale of an 8-bit unsigned DAC).
pub const ANALOG_MIDSCALE: u8 = 128;

/// Lowest control voltage code the VCXO tolerates.
pub const CONTROL_VOLTAGE_FLOOR: u16 = 4_000;

/// Highest control voltage code the VCXO tolerates.
pub const CONTROL_VOLTAGE_CEILING: u16 = 30_000;

/// Saturation bound of the imbalance counter.
pub const IMBALANCE_LIMIT: i8 = 8;
