use {
    super::{bit_choice, PrimeField, SaeUint},
    num_traits::Inv,
    std::{
        fmt::{self, Formatter},
        ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign},
    },
    subtle::{Choice, ConditionallySelectable, ConstantTimeEq},
};

/// Element of a [`PrimeField`], stored in Montgomery form.
#[derive(Clone, Copy)]
pub struct FieldElement<'f> {
    field: &'f PrimeField,
    value: SaeUint,
}

impl<'f> FieldElement<'f> {
    #[inline]
    #[must_use]
    pub(super) const fn from_montgomery(field: &'f PrimeField, value: SaeUint) -> Self {
        Self { field, value }
    }

    #[inline]
    #[must_use]
    pub const fn field(&self) -> &'f PrimeField {
        self.field
    }

    #[inline]
    #[must_use]
    pub const fn as_montgomery(self) -> SaeUint {
        self.value
    }

    #[must_use]
    pub fn to_uint(self) -> SaeUint {
        self.field.mont_mul(self.value, SaeUint::from(1_u64))
    }

    /// Canonical fixed-width big-endian encoding, `field.byte_len()` bytes.
    #[must_use]
    pub fn to_be_bytes(self) -> Vec<u8> {
        super::uint_to_be_bytes(&self.to_uint(), self.field.byte_len())
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.value.ct_eq(&SaeUint::ZERO).into()
    }

    #[inline]
    #[must_use]
    pub fn square(mut self) -> Self {
        self.value = self.field.mont_square(self.value);
        self
    }

    /// Small exponentiation.
    ///
    /// Run time may depend on the exponent; use [`Self::pow_ct`] for secret
    /// or large exponents.
    #[must_use]
    pub fn pow(self, exponent: usize) -> Self {
        match exponent {
            0 => self.field.one(),
            1 => self,
            n if n % 2 == 0 => self.pow(n / 2).square(),
            n => self * self.pow(n / 2).square(),
        }
    }

    /// Constant-time exponentiation.
    ///
    /// Runs exactly `bits` ladder steps; `bits` must be a public bound on
    /// the exponent (e.g. the bit length of the field or group order).
    #[must_use]
    pub fn pow_ct(self, exponent: SaeUint, bits: usize) -> Self {
        debug_assert!(exponent.bit_len() <= bits);
        let mut result = self.field.one();
        let mut power = self;
        for i in 0..bits {
            let product = result * power;
            result.conditional_assign(&product, bit_choice(&exponent, i));
            power = power.square();
        }
        result
    }

    /// Legendre symbol: 1 for a quadratic residue, -1 for a non-residue,
    /// 0 for zero.
    #[must_use]
    pub fn legendre(self) -> i32 {
        // (p - 1) / 2 for odd p
        let exponent = self.field.modulus() >> 1;
        let result = self.pow_ct(exponent, self.field.bit_len());
        if bool::from(result.ct_eq(&self.field.one())) {
            1
        } else if result.is_zero() {
            0
        } else {
            -1
        }
    }

    /// Square root for fields with `p = 3 mod 4`, `None` if no root exists.
    #[must_use]
    pub fn sqrt(self) -> Option<Self> {
        debug_assert_eq!(self.field.modulus() & SaeUint::from(3_u64), SaeUint::from(3_u64));
        // (p + 1) / 4 = (p >> 2) + 1 for p = 3 mod 4
        let exponent = (self.field.modulus() >> 2) + SaeUint::from(1_u64);
        let root = self.pow_ct(exponent, self.field.bit_len());
        (root.square() == self).then_some(root)
    }
}

macro_rules! forward_fmt {
    ($($trait:path),+) => {
        $(
            impl $trait for FieldElement<'_> {
                fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                    let uint = self.to_uint();
                    <SaeUint as $trait>::fmt(&uint, f)
                }
            }
        )+
    };
}

forward_fmt!(fmt::Debug, fmt::Display, fmt::LowerHex, fmt::UpperHex);

impl PartialEq for FieldElement<'_> {
    fn eq(&self, other: &Self) -> bool {
        assert_eq!(self.field, other.field);
        self.value.ct_eq(&other.value).into()
    }
}

impl Eq for FieldElement<'_> {}

impl Add for FieldElement<'_> {
    type Output = Self;

    #[inline(always)]
    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl AddAssign for FieldElement<'_> {
    #[inline(always)]
    fn add_assign(&mut self, other: Self) {
        assert_eq!(self.field, other.field);
        let modulus = self.field.modulus();
        let (sum, carry) = self.value.overflowing_add(other.value);
        let (reduced, borrow) = sum.overflowing_sub(modulus);
        self.value = if carry | !borrow { reduced } else { sum };
    }
}

impl Sub for FieldElement<'_> {
    type Output = Self;

    #[inline(always)]
    fn sub(mut self, other: Self) -> Self {
        self -= other;
        self
    }
}

impl SubAssign for FieldElement<'_> {
    #[inline(always)]
    fn sub_assign(&mut self, other: Self) {
        assert_eq!(self.field, other.field);
        let (result, borrow) = self.value.overflowing_sub(other.value);
        self.value = if borrow {
            result.wrapping_add(self.field.modulus())
        } else {
            result
        };
    }
}

impl Mul for FieldElement<'_> {
    type Output = Self;

    #[inline(always)]
    fn mul(mut self, other: Self) -> Self {
        self *= other;
        self
    }
}

impl MulAssign for FieldElement<'_> {
    #[inline(always)]
    fn mul_assign(&mut self, other: Self) {
        assert_eq!(self.field, other.field);
        self.value = self.field.mont_mul(self.value, other.value);
    }
}

impl Neg for FieldElement<'_> {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self {
        self.field.zero() - self
    }
}

impl Inv for FieldElement<'_> {
    type Output = Option<Self>;

    fn inv(self) -> Self::Output {
        let value = self.value.inv_mod(self.field.modulus())?;
        let value = self.field.mont_mul(value, self.field.montgomery_r3());
        Some(self.field.from_montgomery(value))
    }
}

impl Div for FieldElement<'_> {
    type Output = Option<Self>;

    /// Run time may depend on the value of the divisor.
    #[inline(always)]
    fn div(self, other: Self) -> Option<Self> {
        assert_eq!(self.field, other.field);
        other.inv().map(|inv| self * inv)
    }
}

impl ConditionallySelectable for FieldElement<'_> {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        assert_eq!(a.field, b.field);
        let value = SaeUint::conditional_select(&a.value, &b.value, choice);
        a.field.from_montgomery(value)
    }
}

impl ConstantTimeEq for FieldElement<'_> {
    fn ct_eq(&self, other: &Self) -> Choice {
        assert_eq!(self.field, other.field);
        self.value.ct_eq(&other.value)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, ruint::uint};

    fn m31() -> PrimeField {
        PrimeField::from_modulus(uint!(2147483647_U2048))
    }

    #[test]
    fn test_ring_ops() {
        let field = m31();
        let a = field.from_u64(3);
        let b = field.from_u64(2147483646); // -1
        assert_eq!(a + b, field.from_u64(2));
        assert_eq!(a * b, -a);
        assert_eq!(a - a, field.zero());
        assert_eq!((a / a).unwrap(), field.one());
    }

    #[test]
    fn test_pow_ct_matches_pow() {
        let field = m31();
        let a = field.from_u64(12345);
        assert_eq!(a.pow_ct(SaeUint::from(17_u64), field.bit_len()), a.pow(17));
    }

    #[test]
    fn test_inv() {
        let field = m31();
        let a = field.from_u64(40);
        let inv = a.inv().unwrap();
        assert_eq!(a * inv, field.one());
        assert!(field.zero().inv().is_none());
    }

    #[test]
    fn test_legendre_and_sqrt() {
        // 2147483647 = 3 mod 4
        let field = m31();
        let square = field.from_u64(1234).square();
        assert_eq!(square.legendre(), 1);
        let root = square.sqrt().unwrap();
        assert_eq!(root.square(), square);
        assert_eq!(field.zero().legendre(), 0);

        // Count non-residues among small values; 3 is a non-residue mod M31.
        let three = field.from_u64(3);
        assert_eq!(three.legendre(), -1);
        assert!(three.sqrt().is_none());
    }
}
