//! Handshake state machine and per-peer contexts.

mod context;
#[allow(clippy::module_inception)]
mod engine;

pub use self::{
    context::SaeState,
    engine::{
        Credential, CredentialStore, MemoryPmkCache, PmkCache, SaeEngine, SaeEvent,
        StaticCredentials,
    },
};
