//! Finite-field (MODP) groups with a prime-order subgroup.

use {
    crate::field::{FieldElement, PrimeField, SaeUint},
    anyhow::{ensure, Result},
};

/// Multiplicative subgroup of prime order `r` inside `GF(p)*`, written
/// multiplicatively (the wire semantics of FFC groups).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FfcGroup {
    base_field:      PrimeField,
    scalar_field:    PrimeField,
    generator_monty: SaeUint,
}

impl FfcGroup {
    pub fn new(modulus: SaeUint, generator: SaeUint, order: SaeUint) -> Result<Self> {
        ensure!(generator > SaeUint::from(1_u64), "generator out of range");
        ensure!(generator < modulus, "generator out of range");
        let base_field = PrimeField::from_modulus(modulus);
        let scalar_field = PrimeField::from_modulus(order);
        let generator = base_field.from_uint(generator);
        ensure!(
            generator.pow_ct(order, scalar_field.bit_len()) == base_field.one(),
            "Generator has incorrect order"
        );
        // `generator` borrows `base_field`; take its raw value before the
        // field moves into the struct.
        let generator_monty = generator.as_montgomery();
        Ok(Self {
            base_field,
            scalar_field,
            generator_monty,
        })
    }

    #[inline]
    #[must_use]
    pub const fn base_field(&self) -> &PrimeField {
        &self.base_field
    }

    #[inline]
    #[must_use]
    pub const fn scalar_field(&self) -> &PrimeField {
        &self.scalar_field
    }

    #[inline]
    #[must_use]
    pub fn generator(&self) -> FieldElement<'_> {
        self.base_field.from_montgomery(self.generator_monty)
    }

    /// `base^scalar` with the ladder capped at the subgroup order width.
    #[must_use]
    pub fn exp<'a>(&'a self, base: FieldElement<'a>, scalar: SaeUint) -> FieldElement<'a> {
        base.pow_ct(scalar, self.scalar_field.bit_len())
    }

    /// Is `element` a member of the prime-order subgroup (excluding 1)?
    #[must_use]
    pub fn is_subgroup_element(&self, element: FieldElement<'_>) -> bool {
        let one = self.base_field.one();
        if element == one || element.is_zero() {
            return false;
        }
        self.exp(element, self.scalar_field.modulus()) == one
    }

    /// Maps an arbitrary nonzero value into the subgroup by raising it to
    /// `(p - 1) / r`. The result is 1 when the input has no component in
    /// the subgroup.
    #[must_use]
    pub fn to_subgroup<'a>(&'a self, value: FieldElement<'a>) -> FieldElement<'a> {
        let exponent =
            (self.base_field.modulus() - SaeUint::from(1_u64)) / self.scalar_field.modulus();
        value.pow_ct(exponent, self.base_field.bit_len())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::super::named::{modp_1024_160, modp_2048_224, modp_2048_256},
        crate::field::random_below,
    };

    #[test]
    fn test_diffie_hellman() {
        let rng = &mut rand::thread_rng();
        for group in [modp_1024_160(), modp_2048_224(), modp_2048_256()] {
            let order = group.scalar_field().modulus();
            let alice = random_below(rng, order).unwrap();
            let bob = random_below(rng, order).unwrap();

            let alice_public = group.exp(group.generator(), alice);
            let bob_public = group.exp(group.generator(), bob);
            assert_eq!(group.exp(bob_public, alice), group.exp(alice_public, bob));
        }
    }

    #[test]
    fn test_subgroup_membership() {
        let group = modp_1024_160();
        assert!(group.is_subgroup_element(group.generator()));
        assert!(!group.is_subgroup_element(group.base_field().one()));
        assert!(!group.is_subgroup_element(group.base_field().zero()));
        // A random power of the generator stays in the subgroup.
        let rng = &mut rand::thread_rng();
        let exp = crate::field::random_below(rng, group.scalar_field().modulus()).unwrap();
        assert!(group.is_subgroup_element(group.exp(group.generator(), exp)));
    }

    #[test]
    fn test_to_subgroup() {
        let group = modp_1024_160();
        let value = group.base_field().from_u64(0x1234_5678);
        let mapped = group.to_subgroup(value);
        // Either the trivial element or a subgroup member.
        if mapped != group.base_field().one() {
            assert!(group.is_subgroup_element(mapped));
        }
    }
}
