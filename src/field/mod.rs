//! Prime fields with a runtime modulus.
//!
//! All supported groups share a single fixed-width backing integer; the
//! modulus itself is a runtime value. Element arithmetic is performed in
//! Montgomery form.

mod element;
mod prime;

pub use self::{
    element::FieldElement,
    prime::{PrimeField, SaeUint},
};
use {
    crate::{error::SaeError, CryptoCoreRng},
    subtle::Choice,
};

/// Is the `index`th bit set in the binary expansion of `value`.
///
/// The access pattern depends only on `index`, which is public.
pub(crate) fn bit_choice(value: &SaeUint, index: usize) -> Choice {
    Choice::from(u8::from(value.bit(index)))
}

/// Uniform random integer in `[0, max)`.
///
/// Failure of the random source is reported, never papered over.
pub(crate) fn random_below(rng: &mut dyn CryptoCoreRng, max: SaeUint) -> Result<SaeUint, SaeError> {
    debug_assert!(max != SaeUint::ZERO);
    let leading_zeros = max.leading_zeros();
    loop {
        let mut bytes = [0; 256];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|_| SaeError::Resource("random source unavailable"))?;
        let mut value =
            SaeUint::try_from_be_slice(&bytes).expect("256 bytes always fit the backing uint");
        value >>= leading_zeros;
        if value < max {
            return Ok(value);
        }
    }
}

/// Encodes `value` as exactly `width` big-endian bytes.
///
/// # Panics
///
/// Panics if `value` does not fit in `width` bytes.
pub(crate) fn uint_to_be_bytes(value: &SaeUint, width: usize) -> Vec<u8> {
    let bytes = value.to_be_bytes_vec();
    assert!(value.byte_len() <= width, "value too large for field width");
    if width >= bytes.len() {
        let mut out = vec![0; width - bytes.len()];
        out.extend_from_slice(&bytes);
        out
    } else {
        bytes[bytes.len() - width..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, ruint::uint};

    #[test]
    fn test_uint_to_be_bytes_width() {
        let value = uint!(0x01ff_U2048);
        assert_eq!(uint_to_be_bytes(&value, 4), vec![0, 0, 1, 0xff]);
        assert_eq!(uint_to_be_bytes(&value, 2), vec![1, 0xff]);
    }

    #[test]
    fn test_random_below_in_range() {
        let rng = &mut rand::thread_rng();
        let max = uint!(0x10000_U2048);
        for _ in 0..100 {
            assert!(random_below(rng, max).unwrap() < max);
        }
    }
}
