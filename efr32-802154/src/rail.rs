//! Call contract for the RAIL radio abstraction.
//!
//! The driver core is written against the [`Rail`] trait rather than the
//! vendor radio library itself. The embedding firmware supplies the
//! implementation that forwards each method to the corresponding RAIL call;
//! only the subset of the API the 802.15.4 driver consumes is modeled here.
//!
//! Radio events do not arrive through this trait. The firmware's RAIL event
//! callback runs in interrupt context and posts its event bitmask into the
//! driver's [`RadioIrq`](crate::RadioIrq) mailbox instead.

use bitflags::bitflags;

bitflags! {
    /// Radio events delivered by the RAIL event callback.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Events: u32 {
        /// An RSSI averaging measurement finished.
        const RSSI_AVERAGE_DONE = 1 << 0;
        /// No ACK arrived within the configured ACK timeout.
        const RX_ACK_TIMEOUT = 1 << 1;
        /// A frame was received and a descriptor for it is held.
        const RX_PACKET_RECEIVED = 1 << 2;
        /// An 802.15.4 data-request command is being received. Delivered
        /// before the frame completes so the node can decide whether to set
        /// frame-pending in the outgoing ACK.
        const DATA_REQUEST_COMMAND = 1 << 3;
        /// The outgoing frame left the radio.
        const TX_PACKET_SENT = 1 << 4;
        /// The radio asks for recalibration.
        const CAL_NEEDED = 1 << 5;
    }
}

bitflags! {
    /// Per-transmit options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TxOptions: u32 {
        /// Stay in receive after the transmit and wait for the ACK.
        const WAIT_FOR_ACK = 1 << 0;
    }
}

bitflags! {
    /// Calibration types the radio may perform.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Calibrations: u32 {
        /// Calibrations that track temperature drift.
        const TEMP = 1 << 0;
        /// Calibrations performed once at startup.
        const ONETIME = 1 << 1;
        /// Every calibration the radio supports.
        const ALL = Self::TEMP.bits() | Self::ONETIME.bits();
    }
}

bitflags! {
    /// Which 802.15.4 frame types the filter accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FramesMask: u8 {
        /// Beacon frames.
        const BEACON = 1 << 0;
        /// Data frames.
        const DATA = 1 << 1;
        /// ACK frames.
        const ACK = 1 << 2;
        /// MAC command frames.
        const COMMAND = 1 << 3;
        /// The standard set: everything except bare ACKs.
        const STANDARD = Self::BEACON.bits() | Self::DATA.bits() | Self::COMMAND.bits();
    }
}

/// How far `idle` tears the radio down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdleMode {
    /// Finish active operations first.
    Idle,
    /// Abort active operations.
    Abort,
    /// Shut down immediately.
    ForceShutdown,
    /// Shut down immediately and clear pending events and flags.
    ForceShutdownClearFlags,
}

/// Whether a data path runs in whole-packet or FIFO chunk mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataMethod {
    /// The radio hands over complete packets.
    PacketMode,
    /// The radio streams bytes through the FIFO.
    FifoMode,
}

/// Transmit and receive data path configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataConfig {
    /// Transmit path mode.
    pub tx_method: DataMethod,
    /// Receive path mode.
    pub rx_method: DataMethod,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            tx_method: DataMethod::PacketMode,
            rx_method: DataMethod::PacketMode,
        }
    }
}

/// Automatic acknowledgment configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckConfig {
    /// Enable hardware auto-ACK of accepted frames.
    pub enable: bool,
    /// How long to wait for an ACK to an outgoing frame, in microseconds.
    pub timeout_us: u16,
}

/// State-transition turnaround timings, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Idle to receive.
    pub idle_to_rx: u16,
    /// Idle to transmit.
    pub idle_to_tx: u16,
    /// Receive to transmit (ACK turnaround).
    pub rx_to_tx: u16,
    /// Transmit to receive (ACK turnaround).
    pub tx_to_rx: u16,
}

/// Static 802.15.4 configuration applied once at init time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ieee802154Config {
    /// Accept frames regardless of destination filtering.
    pub promiscuous_mode: bool,
    /// Act as the PAN coordinator.
    pub is_pan_coordinator: bool,
    /// Which frame types the filter accepts.
    pub frames_mask: FramesMask,
    /// Auto-ACK behavior.
    pub ack: AckConfig,
    /// Turnaround timings.
    pub timings: Timings,
}

impl Default for Ieee802154Config {
    fn default() -> Self {
        Ieee802154Config {
            promiscuous_mode: false,
            is_pan_coordinator: false,
            frames_mask: FramesMask::STANDARD,
            ack: AckConfig {
                enable: true,
                timeout_us: 54 * 16, // 54 symbols * 16 us/symbol
            },
            timings: Timings {
                idle_to_rx: 100,
                idle_to_tx: 100,
                rx_to_tx: 192,      // 12 symbols * 16 us/symbol
                tx_to_rx: 192 - 10, // slightly lower to make sure we get to RX in time
            },
        }
    }
}

/// Power amplifier selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxPowerMode {
    /// 2.4 GHz high-power amplifier.
    HighPower2p4,
    /// 2.4 GHz low-power amplifier.
    LowPower2p4,
}

/// Power amplifier configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxPowerConfig {
    /// Amplifier to use.
    pub mode: TxPowerMode,
    /// PA supply voltage in millivolts.
    pub voltage_mv: u16,
    /// Ramp time in microseconds.
    pub ramp_time_us: u16,
}

impl Default for TxPowerConfig {
    fn default() -> Self {
        TxPowerConfig {
            mode: TxPowerMode::HighPower2p4,
            voltage_mv: 1800,
            ramp_time_us: 10,
        }
    }
}

/// CSMA/CA parameters handed to the hardware's CSMA engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsmaConfig {
    /// Minimum backoff exponent (macMinBE).
    pub min_backoff_exponent: u8,
    /// Maximum backoff exponent (macMaxBE).
    pub max_backoff_exponent: u8,
    /// CCA attempts before the transmit is abandoned (macMaxCSMABackoffs).
    pub backoff_tries: u8,
    /// Energy level above which the channel counts as busy, in dBm.
    pub cca_threshold_dbm: i8,
    /// One backoff unit, in microseconds.
    pub cca_backoff_us: u16,
    /// How long each CCA listens, in microseconds.
    pub cca_duration_us: u16,
    /// Overall timeout for the whole CSMA exchange; 0 disables it.
    pub csma_timeout_us: u32,
}

impl CsmaConfig {
    /// The 802.15.4-2003 2.4 GHz O-QPSK CSMA profile.
    pub const IEEE802154_2003_2P4GHZ_OQPSK: CsmaConfig = CsmaConfig {
        min_backoff_exponent: 3,
        max_backoff_exponent: 5,
        backoff_tries: 4,
        cca_threshold_dbm: -75,
        cca_backoff_us: 320,  // 20 symbols
        cca_duration_us: 128, // 8 symbols
        csma_timeout_us: 0,
    };
}

/// Opaque token for a received-packet descriptor held by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxPacketHandle(pub u32);

/// Completion status of a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum RxPacketStatus {
    /// Received intact.
    ReadySuccess,
    /// Received completely but the CRC check failed.
    ReadyCrcError,
    /// Reception stopped partway through.
    Aborted,
    /// Rejected by address filtering.
    Filtered,
    /// The receive FIFO overflowed.
    Overflow,
}

/// Descriptor of a held received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxPacketInfo {
    /// Token to pass to the peek/copy/release calls.
    pub handle: RxPacketHandle,
    /// Completion status.
    pub status: RxPacketStatus,
    /// Total bytes in the packet buffer, length byte included.
    pub packet_bytes: u8,
}

/// The factory-programmed 64-bit unique device identifier, as two 32-bit
/// halves the way the device information page exposes them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UniqueId {
    /// High word.
    pub high: u32,
    /// Low word.
    pub low: u32,
}

/// Status codes returned by RAIL calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum RailError {
    /// A parameter was out of range for the call.
    InvalidParameter,
    /// The radio is in a state that does not permit the call.
    InvalidState,
    /// The call is not allowed in the current configuration.
    InvalidCall,
    /// The operation was suspended by a higher-priority one.
    Suspended,
}

/// The RAIL operations the 802.15.4 driver consumes.
pub trait Rail {
    /// Bring the radio library up. Returns once the hardware reports ready.
    fn init(&mut self) -> Result<(), RailError>;

    /// Select the transmit and receive data path modes.
    fn config_data(&mut self, config: &DataConfig) -> Result<(), RailError>;

    /// Enable the given calibrations.
    fn config_cal(&mut self, calibrations: Calibrations) -> Result<(), RailError>;

    /// Load the 2.4 GHz 802.15.4 PHY.
    fn config_2p4ghz_phy(&mut self) -> Result<(), RailError>;

    /// Apply the 802.15.4 filtering/ACK/timing configuration.
    fn ieee802154_init(&mut self, config: &Ieee802154Config) -> Result<(), RailError>;

    /// Choose which events the callback will deliver.
    fn config_events(&mut self, events: Events) -> Result<(), RailError>;

    /// Configure the power amplifier.
    fn config_tx_power(&mut self, config: &TxPowerConfig) -> Result<(), RailError>;

    /// Set the raw amplifier level; 255 is maximum.
    fn set_tx_power(&mut self, raw_level: u8) -> Result<(), RailError>;

    /// Set the 64-bit address used for frame filtering.
    fn set_long_address(&mut self, address: &[u8; 8]) -> Result<(), RailError>;

    /// Set the 16-bit address used for frame filtering.
    fn set_short_address(&mut self, address: u16) -> Result<(), RailError>;

    /// Set the PAN identifier used for frame filtering.
    fn set_pan_id(&mut self, pan_id: u16) -> Result<(), RailError>;

    /// Bypass destination filtering entirely.
    fn set_promiscuous_mode(&mut self, enabled: bool) -> Result<(), RailError>;

    /// Read the factory-programmed unique device identifier.
    fn unique_id(&self) -> UniqueId;

    /// Take the radio to idle.
    fn idle(&mut self, mode: IdleMode);

    /// Enter receive on the given channel.
    fn start_rx(&mut self, channel: u8) -> Result<(), RailError>;

    /// Load the transmit FIFO with a length-byte-prefixed frame.
    fn set_tx_fifo(&mut self, frame: &[u8]) -> Result<(), RailError>;

    /// Start a CSMA/CCA-gated transmit of the loaded FIFO.
    fn start_csma_tx(
        &mut self,
        channel: u8,
        options: TxOptions,
        csma: &CsmaConfig,
    ) -> Result<(), RailError>;

    /// Descriptor of the newest received packet, or `None` if the radio
    /// holds nothing.
    fn rx_packet_info(&mut self) -> Option<RxPacketInfo>;

    /// Copy `buf.len()` bytes of a held packet into `buf`, starting at
    /// `offset`. Returns the number of bytes actually available.
    fn peek_rx_packet(&mut self, handle: RxPacketHandle, buf: &mut [u8], offset: u8) -> usize;

    /// Copy the whole held packet into `buf`; byte 0 receives the length
    /// byte, the appended FCS is not copied.
    fn copy_rx_packet(&mut self, handle: RxPacketHandle, buf: &mut [u8]);

    /// Hand a held descriptor back to the radio.
    fn release_rx_packet(&mut self, handle: RxPacketHandle);

    /// Suppress the pending automatic ACK for the frame being handled.
    fn cancel_auto_ack(&mut self);

    /// Latest averaged RSSI, in quarter-dBm.
    fn average_rssi(&self) -> i16;
}
