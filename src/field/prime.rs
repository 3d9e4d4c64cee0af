use {
    super::FieldElement,
    crate::{error::SaeError, CryptoCoreRng},
    ruint::{aliases::U64, Uint},
};

/// Backing integer wide enough for every supported group modulus.
pub type SaeUint = Uint<2048, 32>;

/// Field of integers modulo an odd prime known at runtime.
///
/// Precomputes the Montgomery constants for the fixed-width backing integer.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PrimeField {
    modulus:       SaeUint,
    montgomery_r:  SaeUint, // R = 2^2048 mod modulus
    montgomery_r2: SaeUint, // R^2, or R in Montgomery form
    montgomery_r3: SaeUint, // R^3, or R^2 in Montgomery form
    mod_inv:       u64,     // -1 / modulus mod 2^64
    bits:          usize,
    bytes:         usize,
}

impl PrimeField {
    /// # Panics
    ///
    /// Panics if the modulus is not an odd integer greater than one.
    pub fn from_modulus(modulus: SaeUint) -> Self {
        let mod_inv = U64::wrapping_from(modulus)
            .inv_ring()
            .expect("modulus must be an odd positive integer")
            .wrapping_neg()
            .to();

        // montgomery_r2 = 2^4096 mod modulus, computed from 2^1024.
        let mut montgomery_r2 = SaeUint::ZERO;
        montgomery_r2.set_bit(1024, true);
        montgomery_r2 = montgomery_r2.mul_mod(montgomery_r2, modulus);
        montgomery_r2 = montgomery_r2.mul_mod(montgomery_r2, modulus);

        let montgomery_r = montgomery_r2.mul_redc(SaeUint::from(1_u64), modulus, mod_inv);
        let montgomery_r3 = montgomery_r2.square_redc(modulus, mod_inv);
        Self {
            modulus,
            montgomery_r,
            montgomery_r2,
            montgomery_r3,
            mod_inv,
            bits: modulus.bit_len(),
            bytes: modulus.byte_len(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn modulus(&self) -> SaeUint {
        self.modulus
    }

    /// Bit length of the modulus.
    #[inline]
    #[must_use]
    pub const fn bit_len(&self) -> usize {
        self.bits
    }

    /// Width of a canonically encoded element in bytes.
    #[inline]
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.bytes
    }

    #[inline]
    #[must_use]
    pub fn zero(&self) -> FieldElement<'_> {
        self.from_montgomery(SaeUint::ZERO)
    }

    #[inline]
    #[must_use]
    pub fn one(&self) -> FieldElement<'_> {
        self.from_montgomery(self.montgomery_r)
    }

    #[inline]
    #[must_use]
    pub fn from_u64(&self, value: u64) -> FieldElement<'_> {
        self.from_uint(SaeUint::from(value))
    }

    /// # Panics
    ///
    /// Panics if `value` is not reduced.
    #[must_use]
    pub fn from_uint(&self, value: SaeUint) -> FieldElement<'_> {
        assert!(value < self.modulus, "value not in field");
        self.from_montgomery(self.mont_mul(value, self.montgomery_r2))
    }

    /// Reduced conversion, `None` if `value >= modulus`.
    #[must_use]
    pub fn try_from_uint(&self, value: SaeUint) -> Option<FieldElement<'_>> {
        (value < self.modulus).then(|| self.from_montgomery(self.mont_mul(value, self.montgomery_r2)))
    }

    #[inline]
    #[must_use]
    pub fn from_montgomery(&self, value: SaeUint) -> FieldElement<'_> {
        debug_assert!(value < self.modulus);
        FieldElement::from_montgomery(self, value)
    }

    /// Decodes exactly `byte_len()` big-endian bytes, rejecting values
    /// outside `[0, modulus)`.
    #[must_use]
    pub fn element_from_be_bytes(&self, bytes: &[u8]) -> Option<FieldElement<'_>> {
        if bytes.len() != self.bytes {
            return None;
        }
        let value = SaeUint::try_from_be_slice(bytes)?;
        self.try_from_uint(value)
    }

    /// Uniform random field element.
    pub fn random(&self, rng: &mut dyn CryptoCoreRng) -> Result<FieldElement<'_>, SaeError> {
        Ok(self.from_uint(super::random_below(rng, self.modulus)?))
    }

    pub(super) const fn montgomery_r3(&self) -> SaeUint {
        self.montgomery_r3
    }

    #[inline]
    pub(super) fn mont_mul(&self, a: SaeUint, b: SaeUint) -> SaeUint {
        a.mul_redc(b, self.modulus, self.mod_inv)
    }

    #[inline]
    pub(super) fn mont_square(&self, a: SaeUint) -> SaeUint {
        a.square_redc(self.modulus, self.mod_inv)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, ruint::uint};

    #[test]
    fn test_montgomery_roundtrip() {
        let field = PrimeField::from_modulus(uint!(2147483647_U2048));
        let a = field.from_u64(12345);
        assert_eq!(a.to_uint(), SaeUint::from(12345_u64));
        assert_eq!(field.one().to_uint(), SaeUint::from(1_u64));
        assert_eq!(field.zero().to_uint(), SaeUint::ZERO);
    }

    #[test]
    fn test_element_from_be_bytes_rejects() {
        // modulus = 257, so byte_len = 2
        let field = PrimeField::from_modulus(uint!(257_U2048));
        assert_eq!(field.byte_len(), 2);
        assert!(field.element_from_be_bytes(&[0, 255]).is_some());
        assert!(field.element_from_be_bytes(&[1, 1]).is_none(), "not reduced");
        assert!(field.element_from_be_bytes(&[255]).is_none(), "wrong width");
    }
}
