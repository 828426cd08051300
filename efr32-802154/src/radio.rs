//! The 802.15.4 driver core: lifecycle state machine, event dispatch, and
//! the packet transmit/receive paths.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::error::Error;
use crate::packet::Packet;
use crate::rail::{
    Calibrations, CsmaConfig, DataConfig, Events, IdleMode, Ieee802154Config, Rail, RxPacketStatus,
    TxOptions, TxPowerConfig,
};

/// First channel of the 2.4 GHz band, used until told otherwise.
const DEFAULT_CHANNEL: u8 = 11;

/// Radio lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// [`Radio::init`] has not run yet.
    Uninit,
    /// Hardware bring-up is in progress.
    Initing,
    /// Configured but not listening.
    Idle,
    /// Listening on the configured channel.
    Rx,
    /// A transmit owns the radio until `TX_PACKET_SENT` arrives.
    Tx,
    /// The radio asked for recalibration.
    Calibration,
}

impl State {
    /// The allowed-transition table. Anything not listed is a bug in the
    /// caller, not a condition to recover from.
    fn can_enter(self, next: State) -> bool {
        matches!(
            (self, next),
            (State::Uninit, State::Initing)
                | (State::Initing, State::Idle)
                | (State::Idle, State::Rx)
                | (State::Rx, State::Tx)
                | (State::Tx, State::Rx)
                | (State::Rx, State::Calibration)
                | (State::Calibration, State::Idle)
        )
    }
}

/// Mailbox between the RAIL event callback and the driver.
///
/// The event callback runs in interrupt context and must not take locks:
/// [`post`](Self::post) only ORs the bits into an atomic latch and raises
/// the signal. [`Radio::process`] consumes the latch with an atomic swap,
/// so the critical-section use of the driver stays on the consuming side.
///
/// Event kinds coalesce while unprocessed; the single-slot receive buffer
/// makes last-write-wins the contract anyway.
pub struct RadioIrq {
    events: AtomicU32,
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl RadioIrq {
    /// Create an empty mailbox; `const` so it can live in a `static`.
    pub const fn new() -> Self {
        RadioIrq {
            events: AtomicU32::new(0),
            signal: Signal::new(),
        }
    }

    /// Post events from the RAIL callback. Interrupt-safe, lock-free.
    pub fn post(&self, events: Events) {
        self.events.fetch_or(events.bits(), Ordering::AcqRel);
        self.signal.signal(());
    }

    fn take(&self) -> Events {
        Events::from_bits_truncate(self.events.swap(0, Ordering::AcqRel))
    }

    async fn next(&self) {
        self.signal.wait().await
    }
}

impl Default for RadioIrq {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-slot received-frame buffer. Written only by the dispatcher; a
/// newer arrival overwrites an unread older one.
struct RxSlot {
    valid: bool,
    frame: Packet,
}

/// Single-slot outgoing-frame buffer. `pending` is raised before the
/// hardware transmit starts and cleared by the `TX_PACKET_SENT` event.
struct TxSlot {
    pending: bool,
    frame: Packet,
}

struct Shared<R> {
    rail: R,
    state: State,
    channel: u8,
    mac: [u8; 8],
    rx: RxSlot,
    tx: TxSlot,
}

fn set_state<R>(s: &mut Shared<R>, next: State) {
    if s.state.can_enter(next) {
        trace!("radio: {:?} -> {:?}", s.state, next);
        s.state = next;
    } else {
        warn!("radio: rejected transition {:?} -> {:?}", s.state, next);
    }
}

/// IEEE 802.15.4 radio driver.
///
/// One instance owns the radio for the life of the system; there is no
/// teardown path. Every operation is non-blocking: [`transmit`](Self::transmit)
/// starts an asynchronous exchange whose completion is only observable
/// through the `TX_PACKET_SENT` event clearing the pending flag.
///
/// All shared state lives behind one critical-section mutex, so operations
/// may be called from a different executor or priority level than the one
/// driving [`process`](Self::process).
pub struct Radio<'d, R: Rail> {
    irq: &'d RadioIrq,
    shared: Mutex<CriticalSectionRawMutex, RefCell<Shared<R>>>,
}

impl<'d, R: Rail> Radio<'d, R> {
    /// Create the driver around a RAIL handle and its event mailbox.
    ///
    /// The hardware stays untouched until [`init`](Self::init) runs, either
    /// explicitly or lazily from the first operation.
    pub fn new(rail: R, irq: &'d RadioIrq) -> Self {
        Radio {
            irq,
            shared: Mutex::new(RefCell::new(Shared {
                rail,
                state: State::Uninit,
                channel: DEFAULT_CHANNEL,
                mac: [0; 8],
                rx: RxSlot {
                    valid: false,
                    frame: Packet::new(),
                },
                tx: TxSlot {
                    pending: false,
                    frame: Packet::new(),
                },
            })),
        }
    }

    /// Bring the radio up and start receiving. No-op when already done.
    pub fn init(&self) -> Result<(), Error> {
        self.shared.lock(|s| Self::ensure_init(&mut s.borrow_mut()))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.shared.lock(|s| s.borrow().state)
    }

    /// The EUI-64 derived once from the factory unique identifier.
    pub fn mac_address(&self) -> Result<[u8; 8], Error> {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            Self::ensure_init(s)?;
            Ok(s.mac)
        })
    }

    /// Accept frames regardless of destination filtering.
    pub fn set_promiscuous(&self, enabled: bool) -> Result<(), Error> {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            Self::ensure_init(s)?;
            info!(
                "radio: {} promiscuous mode",
                if enabled { "enabling" } else { "disabling" }
            );
            s.rail.set_promiscuous_mode(enabled)?;
            Ok(())
        })
    }

    /// Set the short address and PAN id used for frame filtering.
    ///
    /// Values are forwarded verbatim; nothing stops a caller from picking
    /// the broadcast PAN id.
    pub fn set_address(&self, short_address: u16, pan_id: u16) -> Result<(), Error> {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            Self::ensure_init(s)?;
            info!("radio: addr {:04x}/{:04x}", pan_id, short_address);
            s.rail.set_pan_id(pan_id)?;
            s.rail.set_short_address(short_address)?;
            Ok(())
        })
    }

    /// Change the 802.15.4 channel (11..=26).
    ///
    /// An active receive is re-tuned immediately; a pending transmit keeps
    /// the channel it started on.
    pub fn set_channel(&self, channel: u8) -> Result<(), Error> {
        if !(11..=26).contains(&channel) {
            return Err(Error::InvalidArgument);
        }
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            Self::ensure_init(s)?;
            s.channel = channel;
            if s.state == State::Rx && !s.tx.pending {
                s.rail.idle(IdleMode::Abort);
                s.rail.start_rx(channel)?;
            }
            Ok(())
        })
    }

    /// Take the newest received frame out of the driver, or `None` when
    /// nothing arrived since the last call.
    ///
    /// The copy-and-clear runs inside one critical section spanning the
    /// whole copy, so the dispatcher can never be observed mid-write.
    pub fn receive(&self) -> Result<Option<Packet>, Error> {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            Self::ensure_init(s)?;
            if !s.rx.valid {
                return Ok(None);
            }
            let packet = s.rx.frame.clone();
            s.rx.valid = false;
            Ok(Some(packet))
        })
    }

    /// Queue one frame for a CSMA/CCA-gated transmit.
    ///
    /// `payload` is the MAC frame without PHR and FCS; the wait-for-ack
    /// transmit option is derived from its frame-control ack-request bit.
    /// Completion is signaled by the `TX_PACKET_SENT` event; until then
    /// further transmits fail with [`Error::Busy`].
    pub fn transmit(&self, payload: &[u8]) -> Result<(), Error> {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            Self::ensure_init(s)?;
            if s.tx.pending {
                return Err(Error::Busy);
            }
            if payload.len() > Packet::CAPACITY as usize {
                return Err(Error::InvalidArgument);
            }

            s.tx.frame.copy_from_slice(payload);
            let mut options = TxOptions::empty();
            if s.tx.frame.ack_requested() {
                options |= TxOptions::WAIT_FOR_ACK;
            }

            s.tx.pending = true;
            set_state(s, State::Tx);
            // Aborts an in-progress receive; the transmit owns the radio now.
            s.rail.idle(IdleMode::Abort);
            let started = match s.rail.set_tx_fifo(s.tx.frame.phy_bytes()) {
                Ok(()) => s
                    .rail
                    .start_csma_tx(s.channel, options, &CsmaConfig::IEEE802154_2003_2P4GHZ_OQPSK),
                Err(err) => Err(err),
            };
            if let Err(err) = started {
                // Roll back so one failed start does not wedge the tx path.
                s.tx.pending = false;
                set_state(s, State::Rx);
                warn!("radio: tx failed");
                return Err(Error::Hardware(err));
            }
            Ok(())
        })
    }

    /// Run one dispatcher step: drain the mailbox and handle every latched
    /// event, in fixed priority order.
    ///
    /// Call it whenever the mailbox was posted to, or let [`run`](Self::run)
    /// drive it.
    pub fn process(&self) {
        let events = self.irq.take();
        if events.is_empty() {
            return;
        }
        self.shared
            .lock(|s| Self::dispatch(&mut s.borrow_mut(), events));
    }

    /// Consume radio events forever.
    pub async fn run(&self) -> ! {
        loop {
            self.irq.next().await;
            self.process();
        }
    }

    fn dispatch(s: &mut Shared<R>, events: Events) {
        if events.contains(Events::RSSI_AVERAGE_DONE) {
            info!("radio: average rssi {} dBm", s.rail.average_rssi() / 4);
        }
        if events.contains(Events::RX_ACK_TIMEOUT) {
            // No retransmission policy lives in this driver; the upper
            // layer observes the missing reply and reissues.
            trace!("radio: ack timeout");
        }
        if events.contains(Events::RX_PACKET_RECEIVED) {
            Self::handle_received_packet(s);
        }
        if events.contains(Events::DATA_REQUEST_COMMAND) {
            // Hook point for setting frame-pending in the outgoing ACK.
            // Nothing decides pending-ness yet, so the hardware's default
            // ACK stands.
            trace!("radio: data request");
        }
        if events.contains(Events::TX_PACKET_SENT) {
            s.tx.pending = false;
            set_state(s, State::Rx);
        }
        if events.contains(Events::CAL_NEEDED) {
            warn!("radio: calibration requested");
        }
    }

    fn handle_received_packet(s: &mut Shared<R>) {
        let Some(info) = s.rail.rx_packet_info() else {
            return;
        };
        if info.status != RxPacketStatus::ReadySuccess {
            // Corrupt or aborted frame: drop it without telling anyone.
            s.rail.release_rx_packet(info.handle);
            return;
        }

        // Enough of the header to read the frame-control field.
        let mut header = [0u8; 4];
        s.rail.peek_rx_packet(info.handle, &mut header, 0);
        if header[0] as usize > Packet::MAX_FRAME_LEN {
            // Corrupt length byte.
            s.rail.release_rx_packet(info.handle);
            return;
        }

        s.rail.copy_rx_packet(info.handle, s.rx.frame.raw_mut()); // PHR lands in byte 0
        s.rx.valid = true;

        // The radio ACKs every accepted frame by default. Suppress the ACK
        // when the sender did not ask for one: byte 1 is the low
        // frame-control octet, bit 5 the ack-request flag.
        if header[1] & (1 << 5) == 0 {
            s.rail.cancel_auto_ack();
        }

        s.rail.release_rx_packet(info.handle);
    }

    fn ensure_init(s: &mut Shared<R>) -> Result<(), Error> {
        if s.state != State::Uninit {
            return Ok(());
        }
        set_state(s, State::Initing);
        match Self::init_radio(s) {
            Ok(()) => Ok(()),
            Err(err) => {
                // A failed bring-up may be retried from scratch.
                s.state = State::Uninit;
                Err(err)
            }
        }
    }

    fn init_radio(s: &mut Shared<R>) -> Result<(), Error> {
        let id = s.rail.unique_id();
        info!("radio: mac {:08x}:{:08x}", id.high, id.low);

        s.rail.init()?;
        // The hardware reported ready before `init` returned.
        set_state(s, State::Idle);

        s.rail.config_data(&DataConfig::default())?;
        s.rail.config_cal(Calibrations::ALL)?;
        s.rail.config_2p4ghz_phy()?;
        s.rail.ieee802154_init(&Ieee802154Config::default())?;
        s.rail.config_events(
            Events::RSSI_AVERAGE_DONE
                | Events::RX_ACK_TIMEOUT
                | Events::RX_PACKET_RECEIVED
                | Events::DATA_REQUEST_COMMAND
                | Events::TX_PACKET_SENT
                | Events::CAL_NEEDED,
        )?;
        s.rail.config_tx_power(&TxPowerConfig::default())?;
        s.rail.set_tx_power(255)?; // max

        // The factory unique id doubles as the EUI-64, high half first,
        // each in the byte order the device information page exposes.
        s.mac[..4].copy_from_slice(&id.high.to_le_bytes());
        s.mac[4..].copy_from_slice(&id.low.to_le_bytes());
        let mac = s.mac;
        s.rail.set_long_address(&mac)?;

        s.rail.idle(IdleMode::ForceShutdownClearFlags);
        set_state(s, State::Rx);
        s.rail.start_rx(s.channel)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::rail::{RailError, RxPacketHandle, RxPacketInfo, UniqueId};

    #[derive(Default)]
    struct RailLog {
        init_calls: usize,
        config_events: Option<Events>,
        tx_power_raw: Option<u8>,
        long_address: Option<[u8; 8]>,
        short_address: Option<u16>,
        pan_id: Option<u16>,
        promiscuous: Option<bool>,
        idle_calls: Vec<IdleMode>,
        rx_starts: Vec<u8>,
        tx_starts: Vec<(u8, TxOptions, CsmaConfig)>,
        tx_fifo: Vec<u8>,
        cancel_auto_ack_calls: usize,
        release_calls: usize,
        rssi_reads: usize,
        // Scripted inputs
        unique_id: UniqueId,
        rx_packet: Option<(RxPacketStatus, Vec<u8>)>,
        fail_tx_start: bool,
    }

    /// Records every call and plays back scripted rx descriptors.
    #[derive(Clone)]
    struct FakeRail(Rc<std::cell::RefCell<RailLog>>);

    impl FakeRail {
        fn new() -> Self {
            FakeRail(Rc::new(std::cell::RefCell::new(RailLog {
                unique_id: UniqueId {
                    high: 0x0102_0304,
                    low: 0x0506_0708,
                },
                ..RailLog::default()
            })))
        }

        fn log(&self) -> std::cell::RefMut<'_, RailLog> {
            self.0.borrow_mut()
        }

        /// Script the frame the next `RX_PACKET_RECEIVED` event will find,
        /// length byte included.
        fn script_rx(&self, status: RxPacketStatus, frame: &[u8]) {
            self.log().rx_packet = Some((status, frame.to_vec()));
        }
    }

    impl Rail for FakeRail {
        fn init(&mut self) -> Result<(), RailError> {
            self.log().init_calls += 1;
            Ok(())
        }

        fn config_data(&mut self, _config: &DataConfig) -> Result<(), RailError> {
            Ok(())
        }

        fn config_cal(&mut self, _calibrations: Calibrations) -> Result<(), RailError> {
            Ok(())
        }

        fn config_2p4ghz_phy(&mut self) -> Result<(), RailError> {
            Ok(())
        }

        fn ieee802154_init(&mut self, _config: &Ieee802154Config) -> Result<(), RailError> {
            Ok(())
        }

        fn config_events(&mut self, events: Events) -> Result<(), RailError> {
            self.log().config_events = Some(events);
            Ok(())
        }

        fn config_tx_power(&mut self, _config: &TxPowerConfig) -> Result<(), RailError> {
            Ok(())
        }

        fn set_tx_power(&mut self, raw_level: u8) -> Result<(), RailError> {
            self.log().tx_power_raw = Some(raw_level);
            Ok(())
        }

        fn set_long_address(&mut self, address: &[u8; 8]) -> Result<(), RailError> {
            self.log().long_address = Some(*address);
            Ok(())
        }

        fn set_short_address(&mut self, address: u16) -> Result<(), RailError> {
            self.log().short_address = Some(address);
            Ok(())
        }

        fn set_pan_id(&mut self, pan_id: u16) -> Result<(), RailError> {
            self.log().pan_id = Some(pan_id);
            Ok(())
        }

        fn set_promiscuous_mode(&mut self, enabled: bool) -> Result<(), RailError> {
            self.log().promiscuous = Some(enabled);
            Ok(())
        }

        fn unique_id(&self) -> UniqueId {
            self.0.borrow().unique_id
        }

        fn idle(&mut self, mode: IdleMode) {
            self.log().idle_calls.push(mode);
        }

        fn start_rx(&mut self, channel: u8) -> Result<(), RailError> {
            self.log().rx_starts.push(channel);
            Ok(())
        }

        fn set_tx_fifo(&mut self, frame: &[u8]) -> Result<(), RailError> {
            self.log().tx_fifo = frame.to_vec();
            Ok(())
        }

        fn start_csma_tx(
            &mut self,
            channel: u8,
            options: TxOptions,
            csma: &CsmaConfig,
        ) -> Result<(), RailError> {
            let mut log = self.log();
            if log.fail_tx_start {
                return Err(RailError::InvalidState);
            }
            log.tx_starts.push((channel, options, *csma));
            Ok(())
        }

        fn rx_packet_info(&mut self) -> Option<RxPacketInfo> {
            let log = self.0.borrow();
            let (status, frame) = log.rx_packet.as_ref()?;
            Some(RxPacketInfo {
                handle: RxPacketHandle(1),
                status: *status,
                packet_bytes: frame.len() as u8,
            })
        }

        fn peek_rx_packet(&mut self, _handle: RxPacketHandle, buf: &mut [u8], offset: u8) -> usize {
            let log = self.0.borrow();
            let Some((_, frame)) = log.rx_packet.as_ref() else {
                return 0;
            };
            let avail = frame.len().saturating_sub(offset as usize);
            let n = avail.min(buf.len());
            buf[..n].copy_from_slice(&frame[offset as usize..offset as usize + n]);
            n
        }

        fn copy_rx_packet(&mut self, _handle: RxPacketHandle, buf: &mut [u8]) {
            let log = self.0.borrow();
            if let Some((_, frame)) = log.rx_packet.as_ref() {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
            }
        }

        fn release_rx_packet(&mut self, _handle: RxPacketHandle) {
            let mut log = self.log();
            log.release_calls += 1;
            log.rx_packet = None;
        }

        fn cancel_auto_ack(&mut self) {
            self.log().cancel_auto_ack_calls += 1;
        }

        fn average_rssi(&self) -> i16 {
            self.0.borrow_mut().rssi_reads += 1;
            -70 * 4
        }
    }

    fn make_radio(irq: &RadioIrq) -> (Radio<'_, FakeRail>, FakeRail) {
        let rail = FakeRail::new();
        (Radio::new(rail.clone(), irq), rail)
    }

    #[test]
    fn init_runs_once() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);

        radio.init().unwrap();
        assert_eq!(radio.state(), State::Rx);
        radio.init().unwrap();

        let log = rail.log();
        assert_eq!(log.init_calls, 1);
        assert_eq!(log.rx_starts, vec![11]);
        assert_eq!(log.tx_power_raw, Some(255));
        assert_eq!(log.idle_calls, vec![IdleMode::ForceShutdownClearFlags]);
        assert_eq!(
            log.config_events,
            Some(
                Events::RSSI_AVERAGE_DONE
                    | Events::RX_ACK_TIMEOUT
                    | Events::RX_PACKET_RECEIVED
                    | Events::DATA_REQUEST_COMMAND
                    | Events::TX_PACKET_SENT
                    | Events::CAL_NEEDED
            )
        );
    }

    #[test]
    fn mac_address_derives_from_unique_id() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);

        // Lazily initializes.
        let mac = radio.mac_address().unwrap();
        assert_eq!(mac, [0x04, 0x03, 0x02, 0x01, 0x08, 0x07, 0x06, 0x05]);
        assert_eq!(rail.log().long_address, Some(mac));
        assert_eq!(rail.log().init_calls, 1);
    }

    #[test]
    fn receive_without_event_returns_none() {
        let irq = RadioIrq::new();
        let (radio, _rail) = make_radio(&irq);
        assert!(radio.receive().unwrap().is_none());
    }

    #[test]
    fn rx_without_ack_request_cancels_auto_ack() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);
        radio.init().unwrap();

        // 5-byte payload, FCF low byte 0x00: ack-request bit clear.
        rail.script_rx(
            RxPacketStatus::ReadySuccess,
            &[7, 0x00, 0x08, 0xAA, 0xBB, 0xCC],
        );
        irq.post(Events::RX_PACKET_RECEIVED);
        radio.process();

        {
            let log = rail.log();
            assert_eq!(log.cancel_auto_ack_calls, 1);
            assert_eq!(log.release_calls, 1);
        }

        let packet = radio.receive().unwrap().expect("frame");
        assert_eq!(&*packet, &[0x00, 0x08, 0xAA, 0xBB, 0xCC]);
        // The slot was cleared by the copy-out.
        assert!(radio.receive().unwrap().is_none());
    }

    #[test]
    fn rx_with_ack_request_keeps_auto_ack() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);
        radio.init().unwrap();

        rail.script_rx(
            RxPacketStatus::ReadySuccess,
            &[5, 0x61, 0x88, 0x42],
        );
        irq.post(Events::RX_PACKET_RECEIVED);
        radio.process();

        assert_eq!(rail.log().cancel_auto_ack_calls, 0);
        assert_eq!(rail.log().release_calls, 1);
        assert!(radio.receive().unwrap().is_some());
    }

    #[test]
    fn rx_crc_error_is_discarded_silently() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);
        radio.init().unwrap();

        rail.script_rx(RxPacketStatus::ReadyCrcError, &[5, 0x61, 0x88, 0x42]);
        irq.post(Events::RX_PACKET_RECEIVED);
        radio.process();

        assert!(radio.receive().unwrap().is_none());
        let log = rail.log();
        assert_eq!(log.cancel_auto_ack_calls, 0);
        // The descriptor still goes back to the radio.
        assert_eq!(log.release_calls, 1);
    }

    #[test]
    fn rx_corrupt_length_byte_is_discarded() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);
        radio.init().unwrap();

        rail.script_rx(RxPacketStatus::ReadySuccess, &[200, 0x00, 0x08, 0xAA]);
        irq.post(Events::RX_PACKET_RECEIVED);
        radio.process();

        assert!(radio.receive().unwrap().is_none());
        assert_eq!(rail.log().release_calls, 1);
    }

    #[test]
    fn newer_frame_overwrites_unread_one() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);
        radio.init().unwrap();

        rail.script_rx(RxPacketStatus::ReadySuccess, &[4, 0x00, 0x01]);
        irq.post(Events::RX_PACKET_RECEIVED);
        radio.process();

        rail.script_rx(RxPacketStatus::ReadySuccess, &[4, 0x00, 0x02]);
        irq.post(Events::RX_PACKET_RECEIVED);
        radio.process();

        let packet = radio.receive().unwrap().expect("frame");
        assert_eq!(&*packet, &[0x00, 0x02]);
        assert!(radio.receive().unwrap().is_none());
    }

    #[test]
    fn transmit_builds_phr_and_requests_ack_wait() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);

        // FCF 0x8861: data frame, ack request set.
        let payload = [0x61, 0x88, 0x00, 0x34, 0x12, 0xFF];
        radio.transmit(&payload).unwrap();

        let log = rail.log();
        assert_eq!(log.tx_fifo, vec![8, 0x61, 0x88, 0x00, 0x34, 0x12, 0xFF]);
        let (channel, options, csma) = log.tx_starts.last().copied().unwrap();
        assert_eq!(channel, 11);
        assert_eq!(options, TxOptions::WAIT_FOR_ACK);
        assert_eq!(csma, CsmaConfig::IEEE802154_2003_2P4GHZ_OQPSK);
        // The receive in progress was aborted first.
        assert_eq!(log.idle_calls.last(), Some(&IdleMode::Abort));
    }

    #[test]
    fn transmit_without_ack_bit_uses_default_options() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);

        radio.transmit(&[0x41, 0x88, 0x00]).unwrap();
        let (_, options, _) = rail.log().tx_starts.last().copied().unwrap();
        assert_eq!(options, TxOptions::empty());
    }

    #[test]
    fn transmit_rejects_oversize_payload() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);

        let payload = [0u8; Packet::CAPACITY as usize + 1];
        assert_eq!(radio.transmit(&payload), Err(Error::InvalidArgument));
        assert!(rail.log().tx_starts.is_empty());
        assert_eq!(radio.state(), State::Rx);
    }

    #[test]
    fn transmit_is_busy_until_tx_sent_event() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);

        radio.transmit(&[0x61, 0x88, 0x01]).unwrap();
        assert_eq!(radio.state(), State::Tx);

        // A second transmit is rejected and the loaded frame stays intact.
        assert_eq!(radio.transmit(&[0x41, 0x88, 0x02]), Err(Error::Busy));
        assert_eq!(rail.log().tx_fifo, vec![5, 0x61, 0x88, 0x01]);
        assert_eq!(rail.log().tx_starts.len(), 1);

        irq.post(Events::TX_PACKET_SENT);
        radio.process();
        assert_eq!(radio.state(), State::Rx);

        radio.transmit(&[0x41, 0x88, 0x02]).unwrap();
        assert_eq!(rail.log().tx_starts.len(), 2);
    }

    #[test]
    fn failed_tx_start_rolls_back() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);
        radio.init().unwrap();

        rail.log().fail_tx_start = true;
        assert_eq!(
            radio.transmit(&[0x41, 0x88, 0x00]),
            Err(Error::Hardware(RailError::InvalidState))
        );
        assert_eq!(radio.state(), State::Rx);

        // The path is not wedged: the next attempt goes out.
        rail.log().fail_tx_start = false;
        radio.transmit(&[0x41, 0x88, 0x00]).unwrap();
    }

    #[test]
    fn address_and_promiscuous_forward_to_hardware() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);

        radio.set_address(0x2323, 0x4242).unwrap();
        radio.set_promiscuous(true).unwrap();

        let log = rail.log();
        assert_eq!(log.short_address, Some(0x2323));
        assert_eq!(log.pan_id, Some(0x4242));
        assert_eq!(log.promiscuous, Some(true));
    }

    #[test]
    fn set_channel_validates_and_retunes() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);

        assert_eq!(radio.set_channel(10), Err(Error::InvalidArgument));
        assert_eq!(radio.set_channel(27), Err(Error::InvalidArgument));

        radio.set_channel(15).unwrap();
        assert_eq!(rail.log().rx_starts.last(), Some(&15));

        radio.transmit(&[0x41, 0x88, 0x00]).unwrap();
        let (channel, _, _) = rail.log().tx_starts.last().copied().unwrap();
        assert_eq!(channel, 15);
    }

    #[test]
    fn informational_events_do_not_disturb_state() {
        let irq = RadioIrq::new();
        let (radio, rail) = make_radio(&irq);
        radio.init().unwrap();

        irq.post(Events::RSSI_AVERAGE_DONE | Events::RX_ACK_TIMEOUT | Events::CAL_NEEDED);
        radio.process();

        assert_eq!(radio.state(), State::Rx);
        assert_eq!(rail.log().rssi_reads, 1);
        assert!(radio.receive().unwrap().is_none());
    }

    #[test]
    fn irq_latch_coalesces_until_taken() {
        let irq = RadioIrq::new();
        irq.post(Events::RSSI_AVERAGE_DONE);
        irq.post(Events::TX_PACKET_SENT);
        assert_eq!(
            irq.take(),
            Events::RSSI_AVERAGE_DONE | Events::TX_PACKET_SENT
        );
        assert_eq!(irq.take(), Events::empty());
    }

    #[test]
    fn transition_table() {
        assert!(State::Uninit.can_enter(State::Initing));
        assert!(State::Initing.can_enter(State::Idle));
        assert!(State::Idle.can_enter(State::Rx));
        assert!(State::Rx.can_enter(State::Tx));
        assert!(State::Tx.can_enter(State::Rx));

        assert!(!State::Uninit.can_enter(State::Rx));
        assert!(!State::Idle.can_enter(State::Tx));
        assert!(!State::Tx.can_enter(State::Idle));
        assert!(!State::Rx.can_enter(State::Uninit));
    }
}
