//! Password element derivation (hunting and pecking).
//!
//! Derives a group element from the shared password and both peer
//! addresses. The loop always runs a fixed number of passes and keeps
//! working on a random stand-in password once the element is found, so the
//! pass count does not depend on the password. Quadratic-residue tests are
//! blinded with a fresh random value per probe.

use {
    crate::{
        error::SaeError,
        field::{FieldElement, PrimeField, SaeUint},
        group::{EcCurve, Element, FfcGroup, Group, GroupFamily},
        kdf,
        mac::MacAddr,
        CryptoCoreRng,
    },
    subtle::{Choice, ConditionallySelectable, ConstantTimeEq},
    zeroize::Zeroizing,
};

/// Fixed number of hunting passes. A suitable element is missed with
/// probability around 2^-40.
const HUNTING_PASSES: u8 = 40;

const HUNT_LABEL: &str = "SAE Hunting and Pecking";

/// Derives the password element for `group`.
pub(crate) fn derive_pwe<'g>(
    group: &'g Group,
    password: &[u8],
    password_id: Option<&str>,
    local: MacAddr,
    peer: MacAddr,
    rng: &mut dyn CryptoCoreRng,
) -> Result<Element<'g>, SaeError> {
    let key = seed_key(local, peer);
    let mut base = Zeroizing::new(password.to_vec());
    if let Some(id) = password_id {
        base.extend_from_slice(id.as_bytes());
    }
    match group.family() {
        GroupFamily::Ec => {
            let curve = group.as_ec().expect("family matched");
            derive_pwe_ec(curve, &key, &base, rng).map(Element::Ec)
        }
        GroupFamily::Ffc => {
            let ffc = group.as_ffc().expect("family matched");
            derive_pwe_ffc(ffc, &key, &base, rng).map(Element::Ffc)
        }
    }
}

/// The hash key is the two addresses, larger first, so both peers derive
/// the identical element.
fn seed_key(local: MacAddr, peer: MacAddr) -> [u8; 12] {
    let (max, min) = MacAddr::ordered(local, peer);
    let mut key = [0; 12];
    key[..6].copy_from_slice(max.as_bytes());
    key[6..].copy_from_slice(min.as_bytes());
    key
}

/// Stretches a pwd-seed to the width of the field prime.
///
/// The output is the leftmost `bit_len` bits of the KDF stream, so the
/// value is below `2^bit_len` but may still exceed the prime.
fn pwd_value(field: &PrimeField, seed: &[u8]) -> SaeUint {
    let bits = field.bit_len();
    let stream = kdf::kdf_hash_length(
        seed,
        HUNT_LABEL,
        &crate::field::uint_to_be_bytes(&field.modulus(), field.byte_len()),
        bits,
    );
    let mut value = SaeUint::try_from_be_slice(&stream).expect("KDF output fits the backing uint");
    if bits % 8 != 0 {
        value >>= 8 - bits % 8;
    }
    value
}

/// Conditionally subtracts the modulus once.
///
/// Every registered prime has its top bit set, so any `bit_len`-bit value
/// is below `2p` and a single subtraction fully reduces it. Returns the
/// reduced value and whether the input was already in range.
fn reduce_once(field: &PrimeField, value: SaeUint) -> (SaeUint, Choice) {
    let (sub, borrow) = value.overflowing_sub(field.modulus());
    let in_range = Choice::from(u8::from(borrow));
    (SaeUint::conditional_select(&sub, &value, in_range), in_range)
}

/// Replaces the hunting password with the stand-in once `found` is set.
fn select_standin(hunt: &mut [u8], standin: &[u8], found: Choice) {
    for (byte, other) in hunt.iter_mut().zip(standin) {
        *byte = u8::conditional_select(byte, other, found);
    }
}

fn random_standin(len: usize, rng: &mut dyn CryptoCoreRng) -> Result<Zeroizing<Vec<u8>>, SaeError> {
    let mut standin = Zeroizing::new(vec![0; len]);
    rng.try_fill_bytes(&mut standin)
        .map_err(|_| SaeError::Resource("random source unavailable"))?;
    Ok(standin)
}

/// Finds a random quadratic residue and non-residue.
///
/// Both values are unrelated to any secret; they only disguise which
/// branch the blinded residue test takes.
fn residue_pair<'f>(
    field: &'f PrimeField,
    rng: &mut dyn CryptoCoreRng,
) -> Result<(FieldElement<'f>, FieldElement<'f>), SaeError> {
    let mut qr = None;
    let mut qnr = None;
    loop {
        if let (Some(qr), Some(qnr)) = (qr, qnr) {
            return Ok((qr, qnr));
        }
        let value = field.random(rng)?;
        match value.legendre() {
            1 if qr.is_none() => qr = Some(value),
            -1 if qnr.is_none() => qnr = Some(value),
            _ => {}
        }
    }
}

/// Blinded quadratic-residue test.
///
/// Multiplies the candidate by a random square before the Legendre
/// computation, and folds in the reference residue or non-residue based on
/// the blind's parity. The exponentiation therefore never runs on a value
/// correlated with the password. Zero tests as a non-residue.
fn is_quadratic_residue_blind(
    field: &PrimeField,
    qr: FieldElement<'_>,
    qnr: FieldElement<'_>,
    value: FieldElement<'_>,
    rng: &mut dyn CryptoCoreRng,
) -> Result<bool, SaeError> {
    let blind = loop {
        let blind = field.random(rng)?;
        if !blind.is_zero() {
            break blind;
        }
    };
    let disguised = value * blind.square();
    if blind.to_uint().bit(0) {
        Ok((disguised * qr).legendre() == 1)
    } else {
        Ok((disguised * qnr).legendre() == -1)
    }
}

fn derive_pwe_ec<'g>(
    curve: &'g EcCurve,
    key: &[u8],
    base: &[u8],
    rng: &mut dyn CryptoCoreRng,
) -> Result<crate::group::EcPoint<'g>, SaeError> {
    let field = curve.base_field();
    let (qr, qnr) = residue_pair(field, rng)?;
    let mut hunt = Zeroizing::new(base.to_vec());
    let standin = random_standin(base.len(), rng)?;

    let mut found = Choice::from(0);
    let mut found_x = SaeUint::ZERO;
    let mut found_parity = 0_u8;
    for counter in 1..=HUNTING_PASSES {
        let seed = kdf::hash(key, &[hunt.as_slice(), &[counter]]);
        let (candidate, in_range) = reduce_once(field, pwd_value(field, &seed));
        let x = field.from_uint(candidate);
        let is_qr = is_quadratic_residue_blind(field, qr, qnr, curve.equation_rhs(x), rng)?;
        let hit = in_range & Choice::from(u8::from(is_qr)) & !found;
        found_x.conditional_assign(&candidate, hit);
        found_parity.conditional_assign(&(seed[kdf::HASH_LEN - 1] & 1), hit);
        found |= hit;
        select_standin(&mut hunt, &standin, found);
    }
    if !bool::from(found) {
        return Err(SaeError::Resource("password element derivation failed"));
    }

    let x = field.from_uint(found_x);
    let mut y = curve
        .equation_rhs(x)
        .sqrt()
        .ok_or(SaeError::Resource("password element derivation failed"))?;
    // Pick the root whose parity matches the seed bit.
    if u8::from(y.to_uint().bit(0)) != found_parity {
        y = -y;
    }
    curve
        .from_affine(x, y)
        .map_err(|_| SaeError::Resource("password element derivation failed"))
}

fn derive_pwe_ffc<'g>(
    group: &'g FfcGroup,
    key: &[u8],
    base: &[u8],
    rng: &mut dyn CryptoCoreRng,
) -> Result<FieldElement<'g>, SaeError> {
    let field = group.base_field();
    let mut hunt = Zeroizing::new(base.to_vec());
    let standin = random_standin(base.len(), rng)?;

    let mut found = Choice::from(0);
    let mut found_pwe = field.one();
    for counter in 1..=HUNTING_PASSES {
        let seed = kdf::hash(key, &[hunt.as_slice(), &[counter]]);
        let (candidate, in_range) = reduce_once(field, pwd_value(field, &seed));
        let pwe = group.to_subgroup(field.from_uint(candidate));
        // The identity and zero carry no subgroup component.
        let usable = !pwe.ct_eq(&field.one()) & !pwe.ct_eq(&field.zero());
        let hit = in_range & usable & !found;
        found_pwe.conditional_assign(&pwe, hit);
        found |= hit;
        select_standin(&mut hunt, &standin, found);
    }
    if bool::from(found) {
        Ok(found_pwe)
    } else {
        Err(SaeError::Resource("password element derivation failed"))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::group::{find, GroupId},
    };

    const LOCAL: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 1]);
    const PEER: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 2]);

    #[test]
    fn test_derivation_is_deterministic() {
        let rng = &mut rand::thread_rng();
        for id in [19, 22] {
            let group = find(GroupId(id)).unwrap();
            let a = derive_pwe(group, b"mekmitasdigoat", None, LOCAL, PEER, rng).unwrap();
            let b = derive_pwe(group, b"mekmitasdigoat", None, PEER, LOCAL, rng).unwrap();
            assert_eq!(a, b, "group {id}: address order must not matter");
        }
    }

    #[test]
    fn test_password_separates_elements() {
        let rng = &mut rand::thread_rng();
        let group = find(GroupId(19)).unwrap();
        let a = derive_pwe(group, b"password-one", None, LOCAL, PEER, rng).unwrap();
        let b = derive_pwe(group, b"password-two", None, LOCAL, PEER, rng).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_password_identifier_separates_elements() {
        let rng = &mut rand::thread_rng();
        let group = find(GroupId(19)).unwrap();
        let plain = derive_pwe(group, b"secret", None, LOCAL, PEER, rng).unwrap();
        let with_id = derive_pwe(group, b"secret", Some("pw id"), LOCAL, PEER, rng).unwrap();
        assert_ne!(plain, with_id);
    }

    #[test]
    fn test_element_is_valid_group_member() {
        let rng = &mut rand::thread_rng();
        for id in [19, 22] {
            let group = find(GroupId(id)).unwrap();
            let pwe = derive_pwe(group, b"mekmitasdigoat", None, LOCAL, PEER, rng).unwrap();
            assert!(!group.is_identity(&pwe));
            // The canonical encoding decodes back, which re-runs the full
            // membership validation.
            let bytes = group.encode_element(&pwe);
            assert_eq!(group.decode_element(&bytes).unwrap(), pwe);
        }
    }

    struct UnavailableRng;

    impl rand::RngCore for UnavailableRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new("entropy source down"))
        }
    }

    impl rand::CryptoRng for UnavailableRng {}

    #[test]
    fn test_derivation_failure_is_resource_error() {
        for id in [19, 22] {
            let group = find(GroupId(id)).unwrap();
            let err = derive_pwe(group, b"secret", None, LOCAL, PEER, &mut UnavailableRng)
                .expect_err("derivation needs randomness");
            assert!(matches!(err, SaeError::Resource(_)), "group {id}: {err}");
        }
    }

    #[test]
    fn test_residue_pair_disagrees() {
        let rng = &mut rand::thread_rng();
        let group = find(GroupId(19)).unwrap();
        let (qr, qnr) = residue_pair(group.base_field(), rng).unwrap();
        assert_eq!(qr.legendre(), 1);
        assert_eq!(qnr.legendre(), -1);
        // Blinded and direct tests agree.
        assert!(is_quadratic_residue_blind(group.base_field(), qr, qnr, qr, rng).unwrap());
        assert!(!is_quadratic_residue_blind(group.base_field(), qr, qnr, qnr, rng).unwrap());
    }
}
