//! The handshake engine: per-peer state machines behind one dispatcher.
//!
//! The engine owns no I/O. Inbound frames and timer expiries are delivered
//! by the caller; outbound frames and results come back as events. Frames
//! that fail validation are dropped without a reply and only show up in
//! the local traces.

use {
    super::context::{SaeContext, SaeState},
    crate::{
        config::SaeConfig,
        error::SaeError,
        frame::{
            self, AuthFrame, Commit, Confirm, StatusCode, SEQ_COMMIT,
            SEQ_CONFIRM,
        },
        group::{GroupId, LookupError, Registry},
        keys::{PMKID_LEN, PMK_LEN},
        mac::MacAddr,
        token::TokenManager,
        CryptoCoreRng,
    },
    std::{collections::HashMap, time::Instant},
    tracing::{debug, trace, warn},
};

/// A password credential, optionally restricted to one peer or selected by
/// an explicit identifier.
#[derive(Clone, Debug)]
pub struct Credential {
    pub password:    Vec<u8>,
    pub peer:        Option<MacAddr>,
    pub password_id: Option<String>,
}

/// Password lookup by peer address and optional explicit identifier.
pub trait CredentialStore {
    fn lookup(&self, peer: MacAddr, password_id: Option<&str>) -> Option<&Credential>;
}

/// Ordered credential list: an identifier must match exactly; otherwise
/// the first entry whose address restriction matches (or is absent) wins.
#[derive(Clone, Debug, Default)]
pub struct StaticCredentials {
    entries: Vec<Credential>,
}

impl StaticCredentials {
    pub fn new(entries: Vec<Credential>) -> Self {
        Self { entries }
    }
}

impl CredentialStore for StaticCredentials {
    fn lookup(&self, peer: MacAddr, password_id: Option<&str>) -> Option<&Credential> {
        if let Some(id) = password_id {
            return self
                .entries
                .iter()
                .find(|entry| entry.password_id.as_deref() == Some(id));
        }
        self.entries
            .iter()
            .filter(|entry| entry.password_id.is_none())
            .find(|entry| entry.peer.is_none() || entry.peer == Some(peer))
    }
}

/// Master-key cache consumed on establishment; persistence is the
/// caller's concern.
pub trait PmkCache {
    fn store(&mut self, peer: MacAddr, pmkid: [u8; PMKID_LEN], pmk: [u8; PMK_LEN]);
    fn lookup(&self, peer: MacAddr, pmkid: &[u8; PMKID_LEN]) -> Option<[u8; PMK_LEN]>;
}

/// In-memory cache keyed by peer and PMKID.
#[derive(Default)]
pub struct MemoryPmkCache {
    entries: HashMap<(MacAddr, [u8; PMKID_LEN]), [u8; PMK_LEN]>,
}

impl PmkCache for MemoryPmkCache {
    fn store(&mut self, peer: MacAddr, pmkid: [u8; PMKID_LEN], pmk: [u8; PMK_LEN]) {
        self.entries.insert((peer, pmkid), pmk);
    }

    fn lookup(&self, peer: MacAddr, pmkid: &[u8; PMKID_LEN]) -> Option<[u8; PMK_LEN]> {
        self.entries.get(&(peer, *pmkid)).copied()
    }
}

/// Outcomes handed back to the caller. `SendFrame` payloads are complete
/// encoded authentication frames.
#[derive(Debug)]
pub enum SaeEvent {
    SendFrame {
        dst:   MacAddr,
        frame: Vec<u8>,
    },
    Established {
        peer:  MacAddr,
        pmk:   [u8; PMK_LEN],
        pmkid: [u8; PMKID_LEN],
    },
    Failed {
        peer:  MacAddr,
        error: SaeError,
    },
}

pub struct SaeEngine<C, P> {
    local:       MacAddr,
    config:      SaeConfig,
    registry:    Registry,
    credentials: C,
    cache:       P,
    tokens:      TokenManager,
    contexts:    HashMap<MacAddr, SaeContext>,
}

impl<C: CredentialStore, P: PmkCache> SaeEngine<C, P> {
    pub fn new(
        local: MacAddr,
        config: SaeConfig,
        credentials: C,
        cache: P,
        rng: &mut dyn CryptoCoreRng,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let registry = config.registry();
        Ok(Self {
            local,
            config,
            registry,
            credentials,
            cache,
            tokens: TokenManager::new(rng)?,
            contexts: HashMap::new(),
        })
    }

    pub fn cache(&self) -> &P {
        &self.cache
    }

    /// Rotates the anti-clogging secret; tokens from the previous period
    /// stay valid until the next rotation.
    pub fn rotate_token_secret(&mut self, rng: &mut dyn CryptoCoreRng) -> Result<(), SaeError> {
        self.tokens.rotate(rng)
    }

    /// Starts a handshake towards `peer` with the most preferred group.
    pub fn initiate(
        &mut self,
        peer: MacAddr,
        password_id: Option<&str>,
        now: Instant,
        rng: &mut dyn CryptoCoreRng,
    ) -> Result<Vec<SaeEvent>, SaeError> {
        let credential = match self.credentials.lookup(peer, password_id) {
            Some(credential) => credential,
            None if password_id.is_some() => return Err(SaeError::UnknownPasswordIdentifier),
            None => return Err(SaeError::Resource("no credential configured for peer")),
        };
        let group = self
            .next_group(&[])
            .ok_or(SaeError::NoAcceptableGroup)?;
        let mut ctx = SaeContext::new(
            self.local,
            peer,
            group,
            &credential.password,
            password_id.map(str::to_owned),
            true,
        );
        let body = ctx.build_commit(rng)?;
        ctx.state = SaeState::Committed;
        ctx.deadline = Some(now + self.config.retry_timeout);
        self.contexts.insert(peer, ctx);
        Ok(vec![send(
            peer,
            SEQ_COMMIT,
            StatusCode::SUCCESS,
            body,
        )])
    }

    /// Delivers a received authentication frame.
    ///
    /// Undecodable frames are dropped here; anything that decodes is routed
    /// by sequence number and status.
    pub fn handle_frame(
        &mut self,
        src: MacAddr,
        bytes: &[u8],
        now: Instant,
        rng: &mut dyn CryptoCoreRng,
    ) -> Vec<SaeEvent> {
        let frame = match AuthFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(peer = %src, %error, "dropping undecodable frame");
                return Vec::new();
            }
        };
        match frame.seq {
            SEQ_COMMIT => self.handle_commit(src, &frame, now, rng),
            SEQ_CONFIRM => self.handle_confirm(src, &frame),
            _ => unreachable!("decode admits only known sequence numbers"),
        }
    }

    /// Delivers an expired deadline for `peer`.
    ///
    /// Retransmits the pending commit or confirm until the retry budget is
    /// spent, then fails the handshake.
    pub fn handle_timeout(
        &mut self,
        peer: MacAddr,
        now: Instant,
        _rng: &mut dyn CryptoCoreRng,
    ) -> Vec<SaeEvent> {
        let Some(ctx) = self.contexts.get_mut(&peer) else {
            return Vec::new();
        };
        match ctx.deadline {
            Some(deadline) if deadline <= now => {}
            _ => return Vec::new(),
        }
        if ctx.sync >= self.config.max_retries {
            warn!(%peer, "retry budget exhausted");
            return self.fail(peer, SaeError::Timeout);
        }
        ctx.sync += 1;
        ctx.deadline = Some(now + self.config.retry_timeout);
        let result = match ctx.state {
            SaeState::Committed => ctx
                .encode_commit()
                .map(|body| send(peer, SEQ_COMMIT, StatusCode::SUCCESS, body)),
            SaeState::Confirmed => ctx
                .build_confirm()
                .map(|body| send(peer, SEQ_CONFIRM, StatusCode::SUCCESS, body)),
            SaeState::Nothing | SaeState::Accepted => {
                ctx.deadline = None;
                return Vec::new();
            }
        };
        match result {
            Ok(event) => {
                trace!(%peer, sync = ctx.sync, "retransmitting");
                vec![event]
            }
            Err(error) => self.fail(peer, error),
        }
    }

    /// Earliest pending deadline across all contexts, for the caller's
    /// timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.contexts.values().filter_map(|ctx| ctx.deadline).min()
    }

    /// Drops the context for `peer`, wiping its secrets.
    pub fn teardown(&mut self, peer: MacAddr) {
        self.contexts.remove(&peer);
    }

    fn handle_commit(
        &mut self,
        src: MacAddr,
        frame: &AuthFrame,
        now: Instant,
        rng: &mut dyn CryptoCoreRng,
    ) -> Vec<SaeEvent> {
        match frame.status {
            StatusCode::SUCCESS => self.handle_peer_commit(src, &frame.body, now, rng),
            StatusCode::ANTI_CLOGGING_TOKEN_REQUIRED => self.handle_token_demand(src, &frame.body, now),
            StatusCode::UNSUPPORTED_GROUP => self.handle_group_rejection(src, &frame.body, now, rng),
            StatusCode::UNKNOWN_PASSWORD_IDENTIFIER => {
                if self.contexts.contains_key(&src) {
                    self.fail(src, SaeError::UnknownPasswordIdentifier)
                } else {
                    Vec::new()
                }
            }
            status => {
                debug!(peer = %src, %status, "dropping commit with unhandled status");
                Vec::new()
            }
        }
    }

    fn handle_peer_commit(
        &mut self,
        src: MacAddr,
        body: &[u8],
        now: Instant,
        rng: &mut dyn CryptoCoreRng,
    ) -> Vec<SaeEvent> {
        let group_id = match frame::peek_group_id(body) {
            Ok(id) => id,
            Err(error) => {
                debug!(peer = %src, %error, "dropping commit");
                return Vec::new();
            }
        };
        let group = match self.registry.lookup(group_id) {
            Ok(group) => group,
            Err(LookupError::Disabled | LookupError::NotSupported) => {
                debug!(peer = %src, %group_id, "rejecting unsupported group");
                return vec![send(
                    src,
                    SEQ_COMMIT,
                    StatusCode::UNSUPPORTED_GROUP,
                    frame::encode_group_echo(group_id),
                )];
            }
        };

        // Fresh peers pay the token round-trip while the engine is loaded.
        let demand_token =
            !self.contexts.contains_key(&src) && self.pending() >= self.config.anti_clogging_threshold;
        let commit = match Commit::parse(group, body, demand_token) {
            Ok(commit) => commit,
            Err(error) if demand_token => {
                trace!(peer = %src, %error, "commit without valid token under load");
                return self.demand_token(src, group_id);
            }
            Err(error) => {
                debug!(peer = %src, %error, "dropping malformed commit");
                return Vec::new();
            }
        };
        if let Some(token) = &commit.token {
            if !self.tokens.verify(src, token) {
                trace!(peer = %src, "invalid anti-clogging token");
                return self.demand_token(src, group_id);
            }
        }

        match self.contexts.get(&src).map(|ctx| ctx.state) {
            None => self.respond_to_commit(src, &commit, now, rng),
            Some(SaeState::Nothing) => self.advance_restarted(src, &commit, now, rng),
            Some(SaeState::Committed) => self.complete_commit(src, &commit, now, rng),
            Some(SaeState::Confirmed) => self.reconfirm(src, &commit, now),
            Some(SaeState::Accepted) => {
                trace!(peer = %src, "dropping commit after acceptance");
                Vec::new()
            }
        }
    }

    /// Responder path: no context yet. Answers with our commit followed by
    /// our confirm.
    fn respond_to_commit(
        &mut self,
        src: MacAddr,
        commit: &Commit<'static>,
        now: Instant,
        rng: &mut dyn CryptoCoreRng,
    ) -> Vec<SaeEvent> {
        let Some(credential) = self
            .credentials
            .lookup(src, commit.password_id.as_deref())
        else {
            if commit.password_id.is_some() {
                debug!(peer = %src, "unknown password identifier");
                return vec![send(
                    src,
                    SEQ_COMMIT,
                    StatusCode::UNKNOWN_PASSWORD_IDENTIFIER,
                    frame::encode_group_echo(commit.group.id()),
                )];
            }
            debug!(peer = %src, "no credential for peer");
            return Vec::new();
        };
        let mut ctx = SaeContext::new(
            self.local,
            src,
            commit.group,
            &credential.password,
            commit.password_id.clone(),
            false,
        );
        let events = Self::exchange_as_responder(&mut ctx, src, commit, now, self.config.retry_timeout, rng);
        match events {
            Ok(events) => {
                self.contexts.insert(src, ctx);
                events
            }
            Err(error) => {
                debug!(peer = %src, %error, "responder exchange failed");
                Vec::new()
            }
        }
    }

    /// A context parked in `Nothing` after a group renegotiation accepts
    /// the peer's commit on the agreed group.
    fn advance_restarted(
        &mut self,
        src: MacAddr,
        commit: &Commit<'static>,
        now: Instant,
        rng: &mut dyn CryptoCoreRng,
    ) -> Vec<SaeEvent> {
        let Some(ctx) = self.contexts.get_mut(&src) else {
            return Vec::new();
        };
        if commit.group.id() != ctx.group.id() {
            return self.renegotiate(src, commit, now, rng);
        }
        let timeout = self.config.retry_timeout;
        let result = Self::exchange_as_responder(ctx, src, commit, now, timeout, rng);
        match result {
            Ok(events) => events,
            Err(error) => {
                debug!(peer = %src, %error, "dropping commit");
                Vec::new()
            }
        }
    }

    fn exchange_as_responder(
        ctx: &mut SaeContext,
        src: MacAddr,
        commit: &Commit<'static>,
        now: Instant,
        retry_timeout: std::time::Duration,
        rng: &mut dyn CryptoCoreRng,
    ) -> Result<Vec<SaeEvent>, SaeError> {
        let commit_body = ctx.build_commit(rng)?;
        if ctx.is_reflection(commit) {
            return Err(SaeError::Protocol("reflected commit"));
        }
        ctx.process_peer_commit(commit)?;
        let confirm_body = ctx.build_confirm()?;
        ctx.state = SaeState::Confirmed;
        ctx.deadline = Some(now + retry_timeout);
        Ok(vec![
            send(src, SEQ_COMMIT, StatusCode::SUCCESS, commit_body),
            send(src, SEQ_CONFIRM, StatusCode::SUCCESS, confirm_body),
        ])
    }

    /// Initiator path: our commit is out and the peer's just arrived.
    fn complete_commit(
        &mut self,
        src: MacAddr,
        commit: &Commit<'static>,
        now: Instant,
        rng: &mut dyn CryptoCoreRng,
    ) -> Vec<SaeEvent> {
        let Some(ctx) = self.contexts.get_mut(&src) else {
            return Vec::new();
        };
        if commit.group.id() != ctx.group.id() {
            return self.renegotiate(src, commit, now, rng);
        }
        if ctx.is_reflection(commit) {
            warn!(peer = %src, "reflected commit, not answering");
            return Vec::new();
        }
        match ctx.process_peer_commit(commit) {
            Ok(()) => {}
            Err(error) => {
                debug!(peer = %src, %error, "peer commit rejected");
                return Vec::new();
            }
        }
        match ctx.build_confirm() {
            Ok(body) => {
                ctx.state = SaeState::Confirmed;
                ctx.deadline = Some(now + self.config.retry_timeout);
                vec![send(src, SEQ_CONFIRM, StatusCode::SUCCESS, body)]
            }
            Err(error) => self.fail(src, error),
        }
    }

    /// The peer retransmitted its commit after we confirmed: answer with a
    /// fresh confirm instead of resetting the exchange.
    fn reconfirm(&mut self, src: MacAddr, commit: &Commit<'static>, now: Instant) -> Vec<SaeEvent> {
        let Some(ctx) = self.contexts.get_mut(&src) else {
            return Vec::new();
        };
        if commit.group.id() != ctx.group.id() || ctx.is_reflection(commit) {
            trace!(peer = %src, "dropping commit while confirmed");
            return Vec::new();
        }
        if ctx.sync >= self.config.max_retries {
            return self.fail(src, SaeError::Timeout);
        }
        ctx.sync += 1;
        ctx.deadline = Some(now + self.config.retry_timeout);
        match ctx.build_confirm() {
            Ok(body) => vec![send(src, SEQ_CONFIRM, StatusCode::SUCCESS, body)],
            Err(error) => self.fail(src, error),
        }
    }

    /// The peer answered our commit with a token demand: echo the token in
    /// a re-sent commit.
    fn handle_token_demand(&mut self, src: MacAddr, body: &[u8], now: Instant) -> Vec<SaeEvent> {
        let Some(ctx) = self.contexts.get_mut(&src) else {
            trace!(peer = %src, "token demand without context");
            return Vec::new();
        };
        if ctx.state != SaeState::Committed || !ctx.initiator {
            trace!(peer = %src, "unexpected token demand");
            return Vec::new();
        }
        let (group, token) = match frame::parse_token_request(body) {
            Ok(parsed) => parsed,
            Err(error) => {
                debug!(peer = %src, %error, "malformed token demand");
                return Vec::new();
            }
        };
        if group != ctx.group.id() {
            debug!(peer = %src, "token demand names a different group");
            return Vec::new();
        }
        if ctx.sync >= self.config.max_retries {
            return self.fail(src, SaeError::Timeout);
        }
        ctx.sync += 1;
        ctx.token = Some(token);
        ctx.deadline = Some(now + self.config.retry_timeout);
        match ctx.encode_commit() {
            Ok(body) => vec![send(src, SEQ_COMMIT, StatusCode::SUCCESS, body)],
            Err(error) => self.fail(src, error),
        }
    }

    /// The peer refused our group: move to the next preference not yet
    /// rejected, or give up.
    fn handle_group_rejection(
        &mut self,
        src: MacAddr,
        body: &[u8],
        now: Instant,
        rng: &mut dyn CryptoCoreRng,
    ) -> Vec<SaeEvent> {
        let Some(ctx) = self.contexts.get_mut(&src) else {
            return Vec::new();
        };
        if ctx.state != SaeState::Committed || !ctx.initiator {
            trace!(peer = %src, "unexpected group rejection");
            return Vec::new();
        }
        let rejected = match frame::peek_group_id(body) {
            Ok(id) if id == ctx.group.id() => id,
            Ok(_) | Err(_) => {
                debug!(peer = %src, "group rejection does not match offer");
                return Vec::new();
            }
        };
        ctx.rejected_groups.push(rejected);
        if ctx.sync >= self.config.max_retries {
            return self.fail(src, SaeError::Timeout);
        }
        ctx.sync += 1;
        let rejected_groups = ctx.rejected_groups.clone();
        let Some(next) = self.next_group(&rejected_groups) else {
            return self.fail(src, SaeError::NoAcceptableGroup);
        };
        debug!(peer = %src, from = %rejected, to = %next.id(), "renegotiating group");
        let Some(ctx) = self.contexts.get_mut(&src) else {
            return Vec::new();
        };
        ctx.reset_for_group(next);
        match ctx.build_commit(rng) {
            Ok(body) => {
                ctx.state = SaeState::Committed;
                ctx.deadline = Some(now + self.config.retry_timeout);
                vec![send(src, SEQ_COMMIT, StatusCode::SUCCESS, body)]
            }
            Err(error) => self.fail(src, error),
        }
    }

    /// The peer's commit names a different group than the running context:
    /// treat it as the peer restarting negotiation on that group.
    fn renegotiate(
        &mut self,
        src: MacAddr,
        commit: &Commit<'static>,
        now: Instant,
        rng: &mut dyn CryptoCoreRng,
    ) -> Vec<SaeEvent> {
        let Some(ctx) = self.contexts.get_mut(&src) else {
            return Vec::new();
        };
        if ctx.rejected_groups.contains(&commit.group.id()) {
            return self.fail(src, SaeError::NoAcceptableGroup);
        }
        if ctx.sync >= self.config.max_retries {
            return self.fail(src, SaeError::Timeout);
        }
        ctx.sync += 1;
        ctx.reset_for_group(commit.group);
        let timeout = self.config.retry_timeout;
        let result = Self::exchange_as_responder(ctx, src, commit, now, timeout, rng);
        match result {
            Ok(events) => events,
            Err(error) => {
                debug!(peer = %src, %error, "renegotiated exchange failed");
                Vec::new()
            }
        }
    }

    fn handle_confirm(&mut self, src: MacAddr, frame: &AuthFrame) -> Vec<SaeEvent> {
        if !frame.status.is_success() {
            trace!(peer = %src, status = %frame.status, "dropping confirm");
            return Vec::new();
        }
        let confirm = match Confirm::parse(&frame.body) {
            Ok(confirm) => confirm,
            Err(error) => {
                debug!(peer = %src, %error, "dropping malformed confirm");
                return Vec::new();
            }
        };
        let Some(ctx) = self.contexts.get_mut(&src) else {
            trace!(peer = %src, "confirm without context");
            return Vec::new();
        };
        match ctx.state {
            SaeState::Nothing | SaeState::Committed => {
                trace!(peer = %src, "confirm before both commits, dropping");
                Vec::new()
            }
            SaeState::Confirmed => match ctx.verify_confirm(&confirm) {
                Ok(()) => {
                    ctx.state = SaeState::Accepted;
                    ctx.deadline = None;
                    let keys = match ctx.keys() {
                        Some(keys) => keys.clone(),
                        None => return self.fail(src, SaeError::Protocol("keys not derived")),
                    };
                    self.cache.store(src, keys.pmkid, keys.pmk);
                    debug!(peer = %src, "handshake accepted");
                    vec![SaeEvent::Established {
                        peer:  src,
                        pmk:   keys.pmk,
                        pmkid: keys.pmkid,
                    }]
                }
                Err(error) => self.fail(src, error),
            },
            SaeState::Accepted => {
                // Replays are silent; a genuinely newer counter re-verifies.
                if let Err(error) = ctx.verify_confirm(&confirm) {
                    trace!(peer = %src, %error, "dropping confirm after acceptance");
                }
                Vec::new()
            }
        }
    }

    fn demand_token(&self, src: MacAddr, group: GroupId) -> Vec<SaeEvent> {
        let token = self.tokens.issue(src);
        vec![send(
            src,
            SEQ_COMMIT,
            StatusCode::ANTI_CLOGGING_TOKEN_REQUIRED,
            frame::encode_token_request(group, &token),
        )]
    }

    /// Most preferred enabled group not yet rejected by the peer.
    ///
    /// Enabled-but-unimplemented ids are skipped, not offered.
    fn next_group(&self, rejected: &[GroupId]) -> Option<&'static crate::group::Group> {
        self.registry
            .enabled()
            .iter()
            .filter(|id| !rejected.contains(id))
            .find_map(|id| self.registry.lookup(*id).ok())
    }

    /// Handshakes still short of acceptance, for the anti-clogging
    /// threshold.
    fn pending(&self) -> usize {
        self.contexts
            .values()
            .filter(|ctx| ctx.state < SaeState::Accepted)
            .count()
    }

    fn fail(&mut self, peer: MacAddr, error: SaeError) -> Vec<SaeEvent> {
        warn!(%peer, %error, "handshake failed");
        self.contexts.remove(&peer);
        vec![SaeEvent::Failed { peer, error }]
    }
}

fn send(dst: MacAddr, seq: u16, status: StatusCode, body: Vec<u8>) -> SaeEvent {
    SaeEvent::SendFrame {
        dst,
        frame: AuthFrame::new(seq, status, body).encode(),
    }
}
