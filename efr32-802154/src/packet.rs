//! The frame buffer convention shared with the radio.

/// An IEEE 802.15.4 frame buffer.
///
/// This is a PHY layer packet: byte 0 is the PHR (the frame length), the
/// rest is the MAC frame without its trailing FCS. The 2-byte FCS is
/// counted in the PHR but never present in RAM -- the hardware appends it
/// on transmission and strips it on reception after verifying it.
///
/// The usable part of the frame is reached through `deref` and
/// [`copy_from_slice`](Self::copy_from_slice); both keep the PHR in sync.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    buffer: [u8; Self::SIZE],
}

impl Packet {
    // For indexing purposes
    const PHY_HDR: usize = 0;
    const DATA: core::ops::RangeFrom<usize> = 1..;

    /// Maximum amount of usable payload (FCS excluded) a single packet can
    /// contain, in bytes.
    pub const CAPACITY: u8 = 126;

    const FCS: u8 = 2; // counted in the PHR, never copied to / from RAM
    const MAX_PSDU_LEN: u8 = Self::CAPACITY + Self::FCS;
    const SIZE: usize = 1 /* PHR */ + Self::MAX_PSDU_LEN as usize;

    /// Largest value a valid PHR can hold.
    pub(crate) const MAX_FRAME_LEN: usize = Self::MAX_PSDU_LEN as usize;

    /// Create an empty packet (length = 0).
    pub const fn new() -> Self {
        let mut packet = Self {
            buffer: [0; Self::SIZE],
        };
        packet.buffer[Self::PHY_HDR] = Self::FCS;
        packet
    }

    /// Fill the packet payload with the given `src` data.
    ///
    /// # Panics
    ///
    /// This function panics if `src` is larger than `Self::CAPACITY`
    pub fn copy_from_slice(&mut self, src: &[u8]) {
        assert!(src.len() <= Self::CAPACITY as usize);
        let len = src.len() as u8;
        self.buffer[Self::DATA][..len as usize].copy_from_slice(&src[..len.into()]);
        self.set_len(len);
    }

    /// Return the size of this packet's payload.
    pub const fn len(&self) -> u8 {
        self.buffer[Self::PHY_HDR].saturating_sub(Self::FCS)
    }

    /// Return `true` if this packet's payload is empty.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change the size of the packet's payload.
    ///
    /// # Panics
    ///
    /// This function panics if `len` is larger than `Self::CAPACITY`
    pub fn set_len(&mut self, len: u8) {
        assert!(len <= Self::CAPACITY);
        self.buffer[Self::PHY_HDR] = len + Self::FCS;
    }

    /// Whether the frame asks its receiver for an acknowledgment.
    ///
    /// Byte 1 of the buffer is the low frame-control octet: frame type in
    /// bits 0..=2, security bit 3, frame-pending bit 4, ack-request bit 5,
    /// intra-PAN bit 6.
    pub const fn ack_requested(&self) -> bool {
        self.buffer[1] & (1 << 5) != 0
    }

    /// The bytes to hand to the transmit FIFO: PHR plus payload, without
    /// the hardware-appended FCS.
    pub fn phy_bytes(&self) -> &[u8] {
        &self.buffer[..1 + self.len() as usize]
    }

    /// The whole backing store, for the radio's copy-out call. Byte 0 is
    /// overwritten with the received frame's PHR.
    pub(crate) fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl core::ops::Deref for Packet {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buffer[Self::DATA][..self.len() as usize]
    }
}

impl core::ops::DerefMut for Packet {
    fn deref_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.buffer[Self::DATA][..len as usize]
    }
}
