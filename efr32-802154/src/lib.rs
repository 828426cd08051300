//! An IEEE 802.15.4 driver for EFR32 radios built on the RAIL API.
//!
//! The driver owns the radio for the life of the system: it brings the
//! hardware up, derives the EUI-64 from the factory unique id, and runs the
//! packet paths -- a single-slot receive buffer with automatic-ACK
//! suppression for frames that did not ask for one, and a CSMA/CCA-gated
//! transmit path with a busy flag cleared by the transmit-completion event.
//!
//! The vendor radio library is only modeled by its call contract, the
//! [`Rail`] trait; the embedding firmware implements it and forwards the
//! RAIL event callback's bitmask into the driver's [`RadioIrq`] mailbox.
//! The mailbox is the only thing the interrupt context touches. Everything
//! else happens in [`Radio::process`] (or the [`Radio::run`] loop) and in
//! the application-facing calls, all guarded by one critical-section mutex.
//!
//! Deliberately out of scope: MAC-layer policy (beaconing, GTS, security),
//! retransmission and backoff beyond what the hardware CSMA engine does,
//! and the radio register sequences themselves.
#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod error;
mod packet;
mod radio;
pub mod rail;

pub use error::Error;
pub use packet::Packet;
pub use radio::{Radio, RadioIrq, State};
pub use rail::Rail;
