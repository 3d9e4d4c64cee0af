//! Stateless anti-clogging tokens.
//!
//! A token binds the requester's address to a rotating local secret, so
//! the responder can demand proof of address reachability without keeping
//! per-peer state before the first valid commit.

use {
    crate::{error::SaeError, kdf, mac::MacAddr, CryptoCoreRng},
    std::sync::{PoisonError, RwLock},
    subtle::ConstantTimeEq,
    zeroize::{Zeroize, ZeroizeOnDrop},
};

pub const TOKEN_LEN: usize = kdf::HASH_LEN;

#[derive(Zeroize, ZeroizeOnDrop)]
struct TokenSecret([u8; TOKEN_LEN]);

impl TokenSecret {
    fn generate(rng: &mut dyn CryptoCoreRng) -> Result<Self, SaeError> {
        let mut secret = [0; TOKEN_LEN];
        rng.try_fill_bytes(&mut secret)
            .map_err(|_| SaeError::Resource("random source unavailable"))?;
        Ok(Self(secret))
    }

    fn token_for(&self, peer: MacAddr) -> [u8; TOKEN_LEN] {
        kdf::hash(&self.0, &[peer.as_bytes()])
    }
}

struct Secrets {
    current:  TokenSecret,
    previous: Option<TokenSecret>,
}

/// Issues and verifies anti-clogging tokens.
///
/// Rotation keeps the previous secret valid for one more period, so a
/// peer that received a token just before rotation is not penalized.
pub struct TokenManager {
    secrets: RwLock<Secrets>,
}

impl TokenManager {
    pub fn new(rng: &mut dyn CryptoCoreRng) -> Result<Self, SaeError> {
        Ok(Self {
            secrets: RwLock::new(Secrets {
                current:  TokenSecret::generate(rng)?,
                previous: None,
            }),
        })
    }

    pub fn issue(&self, peer: MacAddr) -> [u8; TOKEN_LEN] {
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        secrets.current.token_for(peer)
    }

    /// Accepts tokens minted under the current or the previous secret.
    pub fn verify(&self, peer: MacAddr, token: &[u8]) -> bool {
        if token.len() != TOKEN_LEN {
            return false;
        }
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        let mut valid = secrets.current.token_for(peer).ct_eq(token);
        if let Some(previous) = &secrets.previous {
            valid |= previous.token_for(peer).ct_eq(token);
        }
        valid.into()
    }

    /// Retires the previous secret and mints a fresh current one.
    pub fn rotate(&self, rng: &mut dyn CryptoCoreRng) -> Result<(), SaeError> {
        let fresh = TokenSecret::generate(rng)?;
        let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        secrets.previous = Some(std::mem::replace(&mut secrets.current, fresh));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: MacAddr = MacAddr([2, 0, 0, 0, 0, 7]);
    const OTHER: MacAddr = MacAddr([2, 0, 0, 0, 0, 8]);

    #[test]
    fn test_issue_verify() {
        let rng = &mut rand::thread_rng();
        let manager = TokenManager::new(rng).unwrap();
        let token = manager.issue(PEER);
        assert!(manager.verify(PEER, &token));
        assert!(!manager.verify(OTHER, &token), "token is address-bound");
        assert!(!manager.verify(PEER, &token[..TOKEN_LEN - 1]));
        assert!(!manager.verify(PEER, &[0; TOKEN_LEN]));
    }

    #[test]
    fn test_rotation_grace() {
        let rng = &mut rand::thread_rng();
        let manager = TokenManager::new(rng).unwrap();
        let old = manager.issue(PEER);

        manager.rotate(rng).unwrap();
        assert!(manager.verify(PEER, &old), "one rotation of grace");
        let fresh = manager.issue(PEER);
        assert_ne!(fresh, old);
        assert!(manager.verify(PEER, &fresh));

        manager.rotate(rng).unwrap();
        assert!(!manager.verify(PEER, &old), "grace expires");
        assert!(manager.verify(PEER, &fresh));
    }
}
