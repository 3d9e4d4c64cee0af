//! IEEE 802 MAC addresses.

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// A 48-bit MAC address identifying a peer station.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Orders the pair with the numerically larger address first.
    ///
    /// Both ends of a handshake must key H() with the same ordering,
    /// independent of which side they are on.
    pub fn ordered(a: Self, b: Self) -> (Self, Self) {
        if a.0 >= b.0 {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 6];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or("expected six octets")?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| "invalid octet")?;
        }
        if parts.next().is_some() {
            return Err("expected six octets");
        }
        Ok(Self(bytes))
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(value: [u8; 6]) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let addr: MacAddr = "02:00:00:00:01:00".parse().unwrap();
        assert_eq!(addr.0, [0x02, 0, 0, 0, 1, 0]);
        assert_eq!(addr.to_string(), "02:00:00:00:01:00");
        assert!("02:00:00:00:01".parse::<MacAddr>().is_err());
        assert!("02:00:00:00:01:00:00".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_ordering_is_symmetric() {
        let a: MacAddr = "02:00:00:00:00:01".parse().unwrap();
        let b: MacAddr = "02:00:00:00:00:02".parse().unwrap();
        assert_eq!(MacAddr::ordered(a, b), MacAddr::ordered(b, a));
        assert_eq!(MacAddr::ordered(a, b).0, b);
    }
}
