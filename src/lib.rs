//! Password-authenticated key establishment for IEEE 802.11 (SAE).
//!
//! Implements the dragonfly handshake that derives a pairwise master key
//! from a shared password: group negotiation, side-channel-resistant
//! password-element derivation, the commit/confirm exchange with
//! anti-clogging and reflection defenses, and the PMK/PMKID hierarchy.
//!
//! The crate is transport-agnostic. [`engine::SaeEngine`] consumes received
//! frame bodies and timer expiries and emits encoded frames to send; the
//! caller owns sockets, timers and key installation.

pub mod config;
pub mod engine;
pub mod error;
pub mod field;
pub mod frame;
pub mod group;
pub mod kdf;
pub mod keys;
pub mod mac;
mod pwe;
pub mod token;

pub use self::{
    config::SaeConfig,
    engine::{SaeEngine, SaeEvent, SaeState},
    error::{Result, SaeError},
    mac::MacAddr,
};
use rand::{CryptoRng, RngCore};

/// Random number generator suitable for key material.
pub trait CryptoCoreRng: CryptoRng + RngCore {}

impl<T> CryptoCoreRng for T where T: CryptoRng + RngCore {}
