//! Per-peer handshake context.
//!
//! A context is owned by the engine and only ever mutated through the
//! state-machine transitions; secrets it holds are wiped on drop.

use {
    crate::{
        error::SaeError,
        field::{random_below, uint_to_be_bytes, SaeUint},
        frame::{Commit, Confirm},
        group::{Elem, Group, GroupId},
        kdf, keys,
        keys::KeyMaterial,
        mac::MacAddr,
        pwe::derive_pwe,
        token::TOKEN_LEN,
        CryptoCoreRng,
    },
    std::time::Instant,
    subtle::ConstantTimeEq,
    zeroize::{Zeroize, Zeroizing},
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum SaeState {
    /// No exchange in progress.
    Nothing,
    /// Own commit sent, waiting for the peer's.
    Committed,
    /// Both commits processed and own confirm sent.
    Confirmed,
    /// Peer's confirm verified; keys are final.
    Accepted,
}

pub(crate) struct SaeContext {
    pub local:             MacAddr,
    pub peer:              MacAddr,
    pub state:             SaeState,
    pub group:             &'static Group,
    pub rejected_groups:   Vec<GroupId>,
    pub password:          Zeroizing<Vec<u8>>,
    pub password_id:       Option<String>,
    pub initiator:         bool,
    pub token:             Option<[u8; TOKEN_LEN]>,
    pub sync:              u32,
    pub deadline:          Option<Instant>,
    pub send_confirm:      u16,
    pub peer_send_confirm: Option<u16>,

    pwe:          Option<Elem>,
    rand:         SaeUint,
    own_scalar:   SaeUint,
    own_element:  Option<Elem>,
    peer_scalar:  SaeUint,
    peer_element: Option<Elem>,
    keys:         Option<KeyMaterial>,
}

impl SaeContext {
    pub fn new(
        local: MacAddr,
        peer: MacAddr,
        group: &'static Group,
        password: &[u8],
        password_id: Option<String>,
        initiator: bool,
    ) -> Self {
        Self {
            local,
            peer,
            state: SaeState::Nothing,
            group,
            rejected_groups: Vec::new(),
            password: Zeroizing::new(password.to_vec()),
            password_id,
            initiator,
            token: None,
            sync: 0,
            deadline: None,
            send_confirm: 0,
            peer_send_confirm: None,
            pwe: None,
            rand: SaeUint::ZERO,
            own_scalar: SaeUint::ZERO,
            own_element: None,
            peer_scalar: SaeUint::ZERO,
            peer_element: None,
            keys: None,
        }
    }

    /// Restarts the exchange on a different group, keeping the credential
    /// and the rejected-groups history.
    pub fn reset_for_group(&mut self, group: &'static Group) {
        self.wipe_secrets();
        self.group = group;
        self.state = SaeState::Nothing;
        self.token = None;
        self.send_confirm = 0;
        self.peer_send_confirm = None;
        self.pwe = None;
        self.own_element = None;
        self.peer_element = None;
        self.keys = None;
    }

    /// Derives fresh commit values and returns the encoded commit body.
    ///
    /// `rand` and `scalar` persist in the context; the mask only lives for
    /// the element computation.
    pub fn build_commit(&mut self, rng: &mut dyn CryptoCoreRng) -> Result<Vec<u8>, SaeError> {
        if self.pwe.is_none() {
            self.pwe = Some(derive_pwe(
                self.group,
                &self.password,
                self.password_id.as_deref(),
                self.local,
                self.peer,
                rng,
            )?);
        }
        let pwe = self.pwe.as_ref().ok_or(SaeError::Protocol("missing PWE"))?;

        let order = self.group.scalar_field().modulus();
        let two = SaeUint::from(2_u64);
        let (rand, scalar, element) = loop {
            // rand and mask are both drawn from [2, r - 1].
            let rand = random_below(rng, order - two)? + two;
            let mut mask = random_below(rng, order - two)? + two;
            let scalar = rand.add_mod(mask, order);
            // The peer will reject anything outside [2, r - 2].
            if scalar <= SaeUint::from(1_u64) || scalar >= order - SaeUint::from(1_u64) {
                continue;
            }
            let element = self.group.inverse(&self.group.scalar_op(mask, pwe));
            mask.zeroize();
            break (rand, scalar, element);
        };
        self.rand = rand;
        self.own_scalar = scalar;
        self.own_element = Some(element);

        Ok(Commit {
            group: self.group,
            token: self.token,
            scalar,
            element,
            password_id: self.password_id.clone(),
        }
        .encode())
    }

    /// Re-encodes the current commit values, e.g. for retransmission or
    /// after a token demand. Values must already be derived.
    pub fn encode_commit(&self) -> Result<Vec<u8>, SaeError> {
        let element = self
            .own_element
            .ok_or(SaeError::Protocol("no commit values derived"))?;
        Ok(Commit {
            group: self.group,
            token: self.token,
            scalar: self.own_scalar,
            element,
            password_id: self.password_id.clone(),
        }
        .encode())
    }

    /// Is the peer echoing our own commit values back at us?
    pub fn is_reflection(&self, commit: &Commit<'static>) -> bool {
        self.own_element == Some(commit.element) && self.own_scalar == commit.scalar
    }

    /// Folds the peer's commit in and derives the key hierarchy.
    ///
    /// A degenerate shared element means the peer's values were crafted;
    /// the exchange is aborted without a reply.
    pub fn process_peer_commit(&mut self, commit: &Commit<'static>) -> Result<(), SaeError> {
        let pwe = self.pwe.as_ref().ok_or(SaeError::Protocol("missing PWE"))?;
        let combined = self
            .group
            .combine(&commit.element, &self.group.scalar_op(commit.scalar, pwe));
        let shared = self.group.scalar_op(self.rand, &combined);
        if self.group.is_identity(&shared) {
            return Err(SaeError::Protocol("degenerate shared secret"));
        }
        self.peer_scalar = commit.scalar;
        self.peer_element = Some(commit.element);
        self.keys = Some(keys::derive_keys(
            self.group,
            &shared,
            self.own_scalar,
            commit.scalar,
        ));
        Ok(())
    }

    /// Builds the next confirm body, advancing the send-confirm counter.
    pub fn build_confirm(&mut self) -> Result<Vec<u8>, SaeError> {
        let digest = self.confirm_digest(self.send_confirm.wrapping_add(1), true)?;
        self.send_confirm = self.send_confirm.wrapping_add(1);
        Ok(Confirm {
            send_confirm: self.send_confirm,
            digest,
        }
        .encode())
    }

    /// Checks the peer's confirm against the transcript, enforcing a
    /// strictly increasing peer counter.
    pub fn verify_confirm(&mut self, confirm: &Confirm) -> Result<(), SaeError> {
        if let Some(last) = self.peer_send_confirm {
            if confirm.send_confirm <= last {
                return Err(SaeError::Protocol("replayed confirm counter"));
            }
        }
        let expected = self.confirm_digest(confirm.send_confirm, false)?;
        if !bool::from(expected.ct_eq(&confirm.digest)) {
            return Err(SaeError::Protocol("confirm digest mismatch"));
        }
        self.peer_send_confirm = Some(confirm.send_confirm);
        Ok(())
    }

    pub fn keys(&self) -> Option<&KeyMaterial> {
        self.keys.as_ref()
    }

    fn confirm_digest(&self, send_confirm: u16, own_first: bool) -> Result<[u8; 32], SaeError> {
        let keys = self
            .keys
            .as_ref()
            .ok_or(SaeError::Protocol("keys not derived"))?;
        let own_element = self
            .own_element
            .ok_or(SaeError::Protocol("no commit values derived"))?;
        let peer_element = self
            .peer_element
            .ok_or(SaeError::Protocol("peer commit not processed"))?;
        let width = self.group.scalar_len();
        let own_scalar = uint_to_be_bytes(&self.own_scalar, width);
        let peer_scalar = uint_to_be_bytes(&self.peer_scalar, width);
        let own_encoded = self.group.encode_element(&own_element);
        let peer_encoded = self.group.encode_element(&peer_element);
        Ok(if own_first {
            kdf::confirm_digest(
                &keys.kck,
                send_confirm,
                &own_scalar,
                &own_encoded,
                &peer_scalar,
                &peer_encoded,
            )
        } else {
            kdf::confirm_digest(
                &keys.kck,
                send_confirm,
                &peer_scalar,
                &peer_encoded,
                &own_scalar,
                &own_encoded,
            )
        })
    }

    fn wipe_secrets(&mut self) {
        self.rand.zeroize();
        self.own_scalar.zeroize();
        self.peer_scalar.zeroize();
    }
}

impl Drop for SaeContext {
    fn drop(&mut self) {
        self.wipe_secrets();
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::group::{find, GroupId},
    };

    #[test]
    fn test_group_reset_wipes_commit_secrets() {
        let rng = &mut rand::thread_rng();
        let group = find(GroupId(19)).unwrap();
        let mut ctx = SaeContext::new(
            MacAddr([2, 0, 0, 0, 0, 1]),
            MacAddr([2, 0, 0, 0, 0, 2]),
            group,
            b"secret",
            None,
            true,
        );
        ctx.build_commit(rng).unwrap();
        assert_ne!(ctx.rand, SaeUint::ZERO);
        assert_ne!(ctx.own_scalar, SaeUint::ZERO);

        ctx.reset_for_group(group);
        assert_eq!(ctx.rand, SaeUint::ZERO);
        assert_eq!(ctx.own_scalar, SaeUint::ZERO);
        assert!(ctx.own_element.is_none());
    }
}
