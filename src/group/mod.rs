//! Finite cyclic groups for the handshake.
//!
//! Groups are identified by their IANA "Group Description" number and come
//! in two closed families: elliptic-curve and finite-field (MODP). All
//! family dispatch is by `match`; there is no trait object in the hot path.

mod curve;
mod ffc;
pub mod named;

pub use self::{
    curve::{EcCurve, EcPoint},
    ffc::FfcGroup,
};
use {
    crate::field::{FieldElement, PrimeField, SaeUint},
    num_traits::Inv,
    std::{
        fmt::{self, Display, Formatter},
        sync::LazyLock,
    },
};

/// IANA group description number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct GroupId(pub u16);

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GroupFamily {
    Ec,
    Ffc,
}

/// A supported group: parameters plus family-specific operations.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Group {
    id:   GroupId,
    kind: GroupKind,
}

#[derive(Clone, PartialEq, Eq, Debug)]
enum GroupKind {
    Ec(EcCurve),
    Ffc(FfcGroup),
}

/// A group element, tagged by family.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Element<'g> {
    Ec(EcPoint<'g>),
    Ffc(FieldElement<'g>),
}

/// Element of a registry group; the registry is process-lived.
pub type Elem = Element<'static>;

impl Group {
    pub const fn id(&self) -> GroupId {
        self.id
    }

    pub const fn family(&self) -> GroupFamily {
        match self.kind {
            GroupKind::Ec(_) => GroupFamily::Ec,
            GroupKind::Ffc(_) => GroupFamily::Ffc,
        }
    }

    /// Field the element coordinates live in.
    pub const fn base_field(&self) -> &PrimeField {
        match &self.kind {
            GroupKind::Ec(curve) => curve.base_field(),
            GroupKind::Ffc(group) => group.base_field(),
        }
    }

    /// Field of scalars, modulo the (sub)group order.
    pub const fn scalar_field(&self) -> &PrimeField {
        match &self.kind {
            GroupKind::Ec(curve) => curve.scalar_field(),
            GroupKind::Ffc(group) => group.scalar_field(),
        }
    }

    pub const fn as_ec(&self) -> Option<&EcCurve> {
        match &self.kind {
            GroupKind::Ec(curve) => Some(curve),
            GroupKind::Ffc(_) => None,
        }
    }

    pub const fn as_ffc(&self) -> Option<&FfcGroup> {
        match &self.kind {
            GroupKind::Ec(_) => None,
            GroupKind::Ffc(group) => Some(group),
        }
    }

    /// Width of an encoded field element / coordinate.
    pub const fn prime_len(&self) -> usize {
        self.base_field().byte_len()
    }

    /// Width of an encoded commit scalar.
    pub const fn scalar_len(&self) -> usize {
        self.scalar_field().byte_len()
    }

    /// Width of an encoded group element: `x || y` for curves, the bare
    /// value for MODP groups.
    pub const fn element_len(&self) -> usize {
        match self.kind {
            GroupKind::Ec(_) => 2 * self.prime_len(),
            GroupKind::Ffc(_) => self.prime_len(),
        }
    }

    /// Group operation: point addition / modular multiplication.
    pub fn combine<'g>(&'g self, a: &Element<'g>, b: &Element<'g>) -> Element<'g> {
        match (a, b) {
            (Element::Ec(a), Element::Ec(b)) => Element::Ec(*a + *b),
            (Element::Ffc(a), Element::Ffc(b)) => Element::Ffc(*a * *b),
            _ => panic!("mismatched element families"),
        }
    }

    /// Scalar operation: scalar multiplication / exponentiation.
    pub fn scalar_op<'g>(&'g self, scalar: SaeUint, element: &Element<'g>) -> Element<'g> {
        match (&self.kind, element) {
            (GroupKind::Ec(_), Element::Ec(point)) => Element::Ec(point.mul_uint(scalar)),
            (GroupKind::Ffc(group), Element::Ffc(value)) => Element::Ffc(group.exp(*value, scalar)),
            _ => panic!("mismatched element families"),
        }
    }

    /// Group inverse: point negation / modular inversion.
    pub fn inverse<'g>(&'g self, element: &Element<'g>) -> Element<'g> {
        match element {
            Element::Ec(point) => Element::Ec(-*point),
            Element::Ffc(value) => Element::Ffc(
                value
                    .inv()
                    .expect("subgroup elements are invertible"),
            ),
        }
    }

    /// Is this the identity element (point at infinity / 1)?
    pub fn is_identity(&self, element: &Element<'_>) -> bool {
        match element {
            Element::Ec(point) => point.is_infinity(),
            Element::Ffc(value) => *value == value.field().one(),
        }
    }

    /// Canonical wire encoding of an element.
    ///
    /// # Panics
    ///
    /// Panics on the point at infinity, which is never sent.
    pub fn encode_element(&self, element: &Element<'_>) -> Vec<u8> {
        match element {
            Element::Ec(point) => {
                let mut out = point.x().expect("infinity is not encodable").to_be_bytes();
                out.extend_from_slice(&point.y().expect("infinity is not encodable").to_be_bytes());
                out
            }
            Element::Ffc(value) => value.to_be_bytes(),
        }
    }

    /// Decodes and fully validates an element.
    ///
    /// `None` for coordinates outside `[0, p)`, points not on the curve,
    /// and MODP values outside the prime-order subgroup. Each rejected
    /// shape corresponds to a known algebraic attack, so no partial
    /// acceptance exists.
    pub fn decode_element<'g>(&'g self, bytes: &[u8]) -> Option<Element<'g>> {
        if bytes.len() != self.element_len() {
            return None;
        }
        match &self.kind {
            GroupKind::Ec(curve) => {
                let (x, y) = bytes.split_at(self.prime_len());
                let x = curve.base_field().element_from_be_bytes(x)?;
                let y = curve.base_field().element_from_be_bytes(y)?;
                let point = curve.from_affine(x, y).ok()?;
                (!point.is_infinity()).then_some(Element::Ec(point))
            }
            GroupKind::Ffc(group) => {
                let value = group.base_field().element_from_be_bytes(bytes)?;
                group
                    .is_subgroup_element(value)
                    .then_some(Element::Ffc(value))
            }
        }
    }

    /// Canonical secret bytes of a shared element: the x-coordinate for
    /// curves, the value itself for MODP groups.
    pub fn secret_bytes(&self, element: &Element<'_>) -> Vec<u8> {
        match element {
            Element::Ec(point) => point.x().expect("identity has no secret").to_be_bytes(),
            Element::Ffc(value) => value.to_be_bytes(),
        }
    }
}

static GROUPS: LazyLock<Vec<Group>> = LazyLock::new(|| {
    vec![
        Group {
            id:   GroupId(19),
            kind: GroupKind::Ec(named::nist_p256()),
        },
        Group {
            id:   GroupId(20),
            kind: GroupKind::Ec(named::nist_p384()),
        },
        Group {
            id:   GroupId(21),
            kind: GroupKind::Ec(named::nist_p521()),
        },
        Group {
            id:   GroupId(22),
            kind: GroupKind::Ffc(named::modp_1024_160()),
        },
        Group {
            id:   GroupId(23),
            kind: GroupKind::Ffc(named::modp_2048_224()),
        },
        Group {
            id:   GroupId(24),
            kind: GroupKind::Ffc(named::modp_2048_256()),
        },
    ]
});

/// Group ids assigned for this protocol family that this build does not
/// implement. Offering one is a negotiation matter, not a parse error.
const KNOWN_UNIMPLEMENTED: &[u16] = &[1, 2, 5, 14, 15, 16, 25, 26, 27, 28, 29, 30];

/// Finds an implemented group.
pub fn find(id: GroupId) -> Option<&'static Group> {
    GROUPS.iter().find(|group| group.id == id)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LookupError {
    /// Known group number, but administratively excluded or not built in;
    /// drives the negotiation-retry path.
    Disabled,
    /// Unknown or reserved group number; rejected at the protocol level.
    NotSupported,
}

/// Config-scoped view of the registry.
#[derive(Clone, Debug)]
pub struct Registry {
    enabled: Vec<GroupId>,
}

impl Registry {
    /// `enabled` keeps its order; it is the negotiation preference list.
    pub fn new(enabled: Vec<GroupId>) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> &[GroupId] {
        &self.enabled
    }

    pub fn lookup(&self, id: GroupId) -> Result<&'static Group, LookupError> {
        if self.enabled.contains(&id) {
            // Enabled but unimplemented ids act as administratively excluded.
            find(id).ok_or(LookupError::Disabled)
        } else if find(id).is_some() || KNOWN_UNIMPLEMENTED.contains(&id.0) {
            Err(LookupError::Disabled)
        } else {
            Err(LookupError::NotSupported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let registry = Registry::new(vec![GroupId(19), GroupId(22)]);
        assert_eq!(registry.lookup(GroupId(19)).unwrap().id(), GroupId(19));
        assert_eq!(registry.lookup(GroupId(20)), Err(LookupError::Disabled));
        assert_eq!(registry.lookup(GroupId(14)), Err(LookupError::Disabled));
        assert_eq!(
            registry.lookup(GroupId(0)),
            Err(LookupError::NotSupported)
        );
        assert_eq!(
            registry.lookup(GroupId(999)),
            Err(LookupError::NotSupported)
        );
    }

    #[test]
    fn test_element_codec_roundtrip() {
        for id in [19, 22] {
            let group = find(GroupId(id)).unwrap();
            let element = match group.family() {
                GroupFamily::Ec => Element::Ec(group.as_ec().unwrap().generator()),
                GroupFamily::Ffc => Element::Ffc(group.as_ffc().unwrap().generator()),
            };
            let bytes = group.encode_element(&element);
            assert_eq!(bytes.len(), group.element_len());
            let decoded = group.decode_element(&bytes).unwrap();
            assert_eq!(decoded, element);
        }
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        let group = find(GroupId(19)).unwrap();
        // All-ones coordinates are >= p.
        let bytes = vec![0xff; group.element_len()];
        assert!(group.decode_element(&bytes).is_none());
        // All-zero coordinates are in range but not on the curve.
        let bytes = vec![0; group.element_len()];
        assert!(group.decode_element(&bytes).is_none());
        // Undersized.
        assert!(group.decode_element(&bytes[1..]).is_none());
    }

    #[test]
    fn test_ffc_decode_rejects_non_subgroup() {
        let group = find(GroupId(22)).unwrap();
        // 2 is not in the 160-bit prime-order subgroup.
        let mut bytes = vec![0; group.element_len()];
        *bytes.last_mut().unwrap() = 2;
        assert!(group.decode_element(&bytes).is_none());
        // 1 is the identity and always rejected.
        *bytes.last_mut().unwrap() = 1;
        assert!(group.decode_element(&bytes).is_none());
    }
}
