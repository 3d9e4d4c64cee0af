//! Authentication frame codec.
//!
//! All multi-byte header fields are little-endian per IEEE Std 802.11;
//! scalars and field elements are fixed-width big-endian integers sized by
//! the negotiated group. Parsing is strict: short bodies, trailing bytes
//! and out-of-range values are all rejected, and a rejected frame is never
//! answered.

use {
    crate::{
        field::{uint_to_be_bytes, SaeUint},
        group::{Element, Group, GroupId},
        kdf::HASH_LEN,
        token::TOKEN_LEN,
    },
    bytes::{Buf, BufMut},
    std::fmt::{self, Display, Formatter},
    thiserror::Error,
};

/// Authentication transaction sequence number of a commit frame.
pub const SEQ_COMMIT: u16 = 1;
/// Authentication transaction sequence number of a confirm frame.
pub const SEQ_CONFIRM: u16 = 2;

const PASSWORD_ID_TAG: u8 = 0x21;

/// IEEE 802.11 status code carried in an authentication frame.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const SUCCESS: Self = Self(0);
    pub const UNSPECIFIED_FAILURE: Self = Self(1);
    pub const ANTI_CLOGGING_TOKEN_REQUIRED: Self = Self(76);
    pub const UNSUPPORTED_GROUP: Self = Self(77);
    pub const UNKNOWN_PASSWORD_IDENTIFIER: Self = Self(123);

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let name = match *self {
            Self::SUCCESS => "success",
            Self::UNSPECIFIED_FAILURE => "unspecified failure",
            Self::ANTI_CLOGGING_TOKEN_REQUIRED => "anti-clogging token required",
            Self::UNSUPPORTED_GROUP => "finite cyclic group not supported",
            Self::UNKNOWN_PASSWORD_IDENTIFIER => "unknown password identifier",
            Self(code) => return write!(f, "status {code}"),
        };
        write!(f, "{name} ({})", self.0)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum FrameError {
    #[error("frame truncated")]
    Truncated,
    #[error("trailing bytes after frame body")]
    Trailing,
    #[error("unknown authentication sequence number {0}")]
    UnknownSequence(u16),
    #[error("scalar outside [2, r - 2]")]
    InvalidScalar,
    #[error("element is not a valid group member")]
    InvalidElement,
    #[error("malformed password identifier")]
    InvalidPasswordId,
}

/// An authentication frame: sequence number, status code and opaque body.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AuthFrame {
    pub seq:    u16,
    pub status: StatusCode,
    pub body:   Vec<u8>,
}

impl AuthFrame {
    pub fn new(seq: u16, status: StatusCode, body: Vec<u8>) -> Self {
        Self { seq, status, body }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.body.len());
        out.put_u16_le(self.seq);
        out.put_u16_le(self.status.0);
        out.put_slice(&self.body);
        out
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.remaining() < 4 {
            return Err(FrameError::Truncated);
        }
        let seq = bytes.get_u16_le();
        let status = StatusCode(bytes.get_u16_le());
        if seq != SEQ_COMMIT && seq != SEQ_CONFIRM {
            return Err(FrameError::UnknownSequence(seq));
        }
        Ok(Self {
            seq,
            status,
            body: bytes.to_vec(),
        })
    }
}

/// Reads the leading group field of a commit body without parsing the rest.
///
/// The group determines every later field width, so negotiation decisions
/// happen on this value alone.
pub fn peek_group_id(mut body: &[u8]) -> Result<GroupId, FrameError> {
    if body.remaining() < 2 {
        return Err(FrameError::Truncated);
    }
    Ok(GroupId(body.get_u16_le()))
}

/// Parsed fields of a successful commit body.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Commit<'g> {
    pub group:       &'g Group,
    pub token:       Option<[u8; TOKEN_LEN]>,
    pub scalar:      SaeUint,
    pub element:     Element<'g>,
    pub password_id: Option<String>,
}

impl<'g> Commit<'g> {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u16_le(self.group.id().0);
        if let Some(token) = &self.token {
            out.put_slice(token);
        }
        out.put_slice(&uint_to_be_bytes(&self.scalar, self.group.scalar_len()));
        out.put_slice(&self.group.encode_element(&self.element));
        if let Some(id) = &self.password_id {
            out.put_u8(PASSWORD_ID_TAG);
            out.put_u8(id.len() as u8);
            out.put_slice(id.as_bytes());
        }
        out
    }

    /// Parses a commit body against an already-resolved group.
    ///
    /// Whether a token precedes the scalar is not recoverable from the
    /// body itself; the caller states its expectation based on whether it
    /// demanded one.
    pub fn parse(group: &'g Group, body: &[u8], expect_token: bool) -> Result<Self, FrameError> {
        let mut body = body;
        if body.remaining() < 2 {
            return Err(FrameError::Truncated);
        }
        let id = GroupId(body.get_u16_le());
        debug_assert_eq!(id, group.id());

        let token = if expect_token {
            if body.remaining() < TOKEN_LEN {
                return Err(FrameError::Truncated);
            }
            let mut token = [0; TOKEN_LEN];
            body.copy_to_slice(&mut token);
            Some(token)
        } else {
            None
        };

        if body.remaining() < group.scalar_len() {
            return Err(FrameError::Truncated);
        }
        let scalar = SaeUint::try_from_be_slice(&body[..group.scalar_len()])
            .ok_or(FrameError::InvalidScalar)?;
        body.advance(group.scalar_len());
        // The order's trivial residues 0, 1 and r - 1 would leak or fix the
        // peer's mask; they are rejected before any group operation.
        let order = group.scalar_field().modulus();
        if scalar <= SaeUint::from(1_u64) || scalar >= order - SaeUint::from(1_u64) {
            return Err(FrameError::InvalidScalar);
        }

        if body.remaining() < group.element_len() {
            return Err(FrameError::Truncated);
        }
        let element = group
            .decode_element(&body[..group.element_len()])
            .ok_or(FrameError::InvalidElement)?;
        body.advance(group.element_len());

        let password_id = parse_password_id(body)?;
        Ok(Self {
            group,
            token,
            scalar,
            element,
            password_id,
        })
    }
}

/// Parses the optional trailing password identifier element.
fn parse_password_id(mut body: &[u8]) -> Result<Option<String>, FrameError> {
    if !body.has_remaining() {
        return Ok(None);
    }
    if body.remaining() < 2 || body.get_u8() != PASSWORD_ID_TAG {
        return Err(FrameError::Trailing);
    }
    let len = usize::from(body.get_u8());
    if body.remaining() < len {
        return Err(FrameError::Truncated);
    }
    if body.remaining() > len {
        return Err(FrameError::Trailing);
    }
    let id = std::str::from_utf8(body).map_err(|_| FrameError::InvalidPasswordId)?;
    if id.is_empty() {
        return Err(FrameError::InvalidPasswordId);
    }
    Ok(Some(id.to_owned()))
}

/// Parsed fields of a confirm body.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Confirm {
    pub send_confirm: u16,
    pub digest:       [u8; HASH_LEN],
}

impl Confirm {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + HASH_LEN);
        out.put_u16_le(self.send_confirm);
        out.put_slice(&self.digest);
        out
    }

    /// Length is checked before anything else; an undersized confirm never
    /// reaches the digest comparison.
    pub fn parse(mut body: &[u8]) -> Result<Self, FrameError> {
        if body.remaining() < 2 + HASH_LEN {
            return Err(FrameError::Truncated);
        }
        let send_confirm = body.get_u16_le();
        let mut digest = [0; HASH_LEN];
        body.copy_to_slice(&mut digest);
        if body.has_remaining() {
            return Err(FrameError::Trailing);
        }
        Ok(Self {
            send_confirm,
            digest,
        })
    }
}

/// Body of an anti-clogging token demand: the group under negotiation
/// followed by the token the peer must echo.
pub fn encode_token_request(group: GroupId, token: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + token.len());
    out.put_u16_le(group.0);
    out.put_slice(token);
    out
}

pub fn parse_token_request(mut body: &[u8]) -> Result<(GroupId, [u8; TOKEN_LEN]), FrameError> {
    if body.remaining() < 2 + TOKEN_LEN {
        return Err(FrameError::Truncated);
    }
    let group = GroupId(body.get_u16_le());
    let mut token = [0; TOKEN_LEN];
    body.copy_to_slice(&mut token);
    if body.has_remaining() {
        return Err(FrameError::Trailing);
    }
    Ok((group, token))
}

/// Body of a group rejection: the refused group, echoed back.
pub fn encode_group_echo(group: GroupId) -> Vec<u8> {
    group.0.to_le_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::group::{find, GroupFamily},
    };

    fn sample_commit(token: Option<[u8; TOKEN_LEN]>, password_id: Option<&str>) -> Commit<'static> {
        let group = find(GroupId(19)).unwrap();
        let element = match group.family() {
            GroupFamily::Ec => Element::Ec(group.as_ec().unwrap().generator()),
            GroupFamily::Ffc => Element::Ffc(group.as_ffc().unwrap().generator()),
        };
        Commit {
            group,
            token,
            scalar: SaeUint::from(0x1234_u64),
            element,
            password_id: password_id.map(str::to_owned),
        }
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = AuthFrame::new(SEQ_COMMIT, StatusCode::SUCCESS, vec![1, 2, 3]);
        assert_eq!(AuthFrame::decode(&frame.encode()).unwrap(), frame);
        assert_eq!(AuthFrame::decode(&[1, 0, 0]), Err(FrameError::Truncated));
        assert_eq!(
            AuthFrame::decode(&[9, 0, 0, 0]),
            Err(FrameError::UnknownSequence(9))
        );
    }

    #[test]
    fn test_commit_roundtrip() {
        for (token, id) in [
            (None, None),
            (Some([0xaa; TOKEN_LEN]), None),
            (None, Some("pw id")),
            (Some([0xbb; TOKEN_LEN]), Some("pw id")),
        ] {
            let commit = sample_commit(token, id);
            let body = commit.encode();
            let parsed = Commit::parse(commit.group, &body, token.is_some()).unwrap();
            assert_eq!(parsed.token, token);
            assert_eq!(parsed.scalar, commit.scalar);
            assert_eq!(parsed.element, commit.element);
            assert_eq!(parsed.password_id.as_deref(), id);
        }
    }

    #[test]
    fn test_commit_rejects_trivial_scalars() {
        let group = find(GroupId(19)).unwrap();
        let order = group.scalar_field().modulus();
        for scalar in [
            SaeUint::ZERO,
            SaeUint::from(1_u64),
            order - SaeUint::from(1_u64),
        ] {
            let mut commit = sample_commit(None, None);
            commit.scalar = scalar;
            assert_eq!(
                Commit::parse(group, &commit.encode(), false),
                Err(FrameError::InvalidScalar),
                "scalar {scalar} must be rejected"
            );
        }
        // 2 and r - 2 are the extremes of the accepted range.
        for scalar in [SaeUint::from(2_u64), order - SaeUint::from(2_u64)] {
            let mut commit = sample_commit(None, None);
            commit.scalar = scalar;
            assert!(Commit::parse(group, &commit.encode(), false).is_ok());
        }
    }

    #[test]
    fn test_commit_rejects_bad_element() {
        let commit = sample_commit(None, None);
        let mut body = commit.encode();
        // Corrupt the element's y-coordinate.
        let last = body.len() - 1;
        body[last] ^= 1;
        assert_eq!(
            Commit::parse(commit.group, &body, false),
            Err(FrameError::InvalidElement)
        );
    }

    #[test]
    fn test_commit_rejects_truncation_and_trailing() {
        let commit = sample_commit(None, None);
        let body = commit.encode();
        assert_eq!(
            Commit::parse(commit.group, &body[..body.len() - 1], false),
            Err(FrameError::Truncated)
        );
        let mut long = body.clone();
        long.push(0);
        assert_eq!(
            Commit::parse(commit.group, &long, false),
            Err(FrameError::Trailing)
        );
        // A token-less body parsed with a token expectation misaligns.
        assert!(Commit::parse(commit.group, &body, true).is_err());
    }

    #[test]
    fn test_confirm_roundtrip() {
        let confirm = Confirm {
            send_confirm: 3,
            digest:       [0x5a; HASH_LEN],
        };
        let body = confirm.encode();
        assert_eq!(Confirm::parse(&body).unwrap(), confirm);
        assert_eq!(
            Confirm::parse(&body[..body.len() - 1]),
            Err(FrameError::Truncated)
        );
    }

    #[test]
    fn test_token_request_roundtrip() {
        let body = encode_token_request(GroupId(19), &[0x42; TOKEN_LEN]);
        let (group, token) = parse_token_request(&body).unwrap();
        assert_eq!(group, GroupId(19));
        assert_eq!(token, [0x42; TOKEN_LEN]);
        assert_eq!(peek_group_id(&body).unwrap(), GroupId(19));
    }
}
