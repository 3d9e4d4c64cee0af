use {
    crate::field::{bit_choice, FieldElement, PrimeField, SaeUint},
    anyhow::{ensure, Result},
    std::{
        fmt::{self, Debug, Formatter},
        ops::{Add, AddAssign, Neg, Sub, SubAssign},
    },
    subtle::{Choice, ConditionallySelectable, ConstantTimeEq},
};

/// Short Weierstrass curve `y^2 = x^3 + ax + b` over a prime field, with a
/// prime-order generator. Cofactor 1 is required (it is 1 for every
/// registered curve).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EcCurve {
    base_field:      PrimeField,
    scalar_field:    PrimeField,
    a_monty:         SaeUint,
    b_monty:         SaeUint,
    generator_monty: (SaeUint, SaeUint),
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EcPoint<'c> {
    curve:       &'c EcCurve,
    coordinates: Coordinates<'c>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Coordinates<'c> {
    Infinity,
    Affine(FieldElement<'c>, FieldElement<'c>),
}

impl EcCurve {
    pub fn new(
        modulus: SaeUint,
        a: SaeUint,
        b: SaeUint,
        x: SaeUint,
        y: SaeUint,
        order: SaeUint,
    ) -> Result<Self> {
        ensure!(a < modulus, "a not in field");
        ensure!(b < modulus, "b not in field");
        ensure!(x < modulus, "x not in field");
        ensure!(y < modulus, "y not in field");
        let base_field = PrimeField::from_modulus(modulus);
        let scalar_field = PrimeField::from_modulus(order);
        let a = base_field.from_uint(a);
        let b = base_field.from_uint(b);
        let x = base_field.from_uint(x);
        let y = base_field.from_uint(y);

        // Ensure non-singular
        let c4 = base_field.from_u64(4);
        let c27 = base_field.from_u64(27);
        ensure!(
            c4 * a.pow(3) + c27 * b.pow(2) != base_field.zero(),
            "Singular curve"
        );

        // Ensure not anomalous
        ensure!(modulus != order, "Anomalous curve");

        // Ensure generator is on curve
        ensure!(y.pow(2) == x.pow(3) + a * x + b, "Generator not on curve");

        // The elements borrow `base_field`; take their raw values before it
        // moves into the struct.
        let a_monty = a.as_montgomery();
        let b_monty = b.as_montgomery();
        let generator_monty = (x.as_montgomery(), y.as_montgomery());
        let curve = Self {
            base_field,
            scalar_field,
            a_monty,
            b_monty,
            generator_monty,
        };

        // Ensure generator has order `order`
        let generator = curve.generator();
        ensure!(
            generator.mul_uint(order) == curve.infinity(),
            "Generator order mismatch"
        );

        Ok(curve)
    }

    pub const fn base_field(&self) -> &PrimeField {
        &self.base_field
    }

    pub const fn scalar_field(&self) -> &PrimeField {
        &self.scalar_field
    }

    pub fn a(&self) -> FieldElement<'_> {
        self.base_field.from_montgomery(self.a_monty)
    }

    pub fn b(&self) -> FieldElement<'_> {
        self.base_field.from_montgomery(self.b_monty)
    }

    pub fn generator(&self) -> EcPoint<'_> {
        EcPoint {
            curve:       self,
            coordinates: Coordinates::Affine(
                self.base_field.from_montgomery(self.generator_monty.0),
                self.base_field.from_montgomery(self.generator_monty.1),
            ),
        }
    }

    /// Point at infinity
    pub const fn infinity(&self) -> EcPoint<'_> {
        EcPoint {
            curve:       self,
            coordinates: Coordinates::Infinity,
        }
    }

    /// Right-hand side of the curve equation, `x^3 + ax + b`.
    pub fn equation_rhs<'a>(&'a self, x: FieldElement<'a>) -> FieldElement<'a> {
        x.pow(3) + self.a() * x + self.b()
    }

    pub fn from_affine<'a>(
        &'a self,
        x: FieldElement<'a>,
        y: FieldElement<'a>,
    ) -> Result<EcPoint<'a>> {
        ensure!(x.field() == &self.base_field);
        ensure!(y.field() == &self.base_field);
        ensure!(y.pow(2) == self.equation_rhs(x), "Point not on curve");
        Ok(EcPoint {
            curve:       self,
            coordinates: Coordinates::Affine(x, y),
        })
    }

    /// Returns a point with x-coordinate `x` if one exists.
    /// If a solution `p` exists, the other solution is `-p`.
    pub fn from_x<'a>(&'a self, x: FieldElement<'a>) -> Option<EcPoint<'a>> {
        assert_eq!(x.field(), &self.base_field);
        let y = self.equation_rhs(x).sqrt()?;
        Some(EcPoint {
            curve:       self,
            coordinates: Coordinates::Affine(x, y),
        })
    }
}

impl<'c> EcPoint<'c> {
    pub const fn curve(&self) -> &'c EcCurve {
        self.curve
    }

    pub const fn is_infinity(&self) -> bool {
        matches!(self.coordinates, Coordinates::Infinity)
    }

    pub const fn x(&self) -> Option<FieldElement<'c>> {
        match self.coordinates {
            Coordinates::Infinity => None,
            Coordinates::Affine(x, _) => Some(x),
        }
    }

    pub const fn y(&self) -> Option<FieldElement<'c>> {
        match self.coordinates {
            Coordinates::Infinity => None,
            Coordinates::Affine(_, y) => Some(y),
        }
    }

    /// Scalar multiplication by a reduced scalar.
    ///
    /// The ladder always runs the full (public) bit length of the group
    /// order, independent of the scalar's value.
    #[must_use]
    pub fn mul_uint(mut self, scalar: SaeUint) -> Self {
        let mut result = self.curve.infinity();
        for i in 0..self.curve.scalar_field.bit_len() {
            result.conditional_assign(&(result + self), bit_choice(&scalar, i));
            self += self;
        }
        result
    }
}

macro_rules! forward_fmt {
    ($($trait:path),+) => {
        $(
            impl $trait for EcPoint<'_> {
                fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                    match self.coordinates {
                        Coordinates::Infinity => write!(f, "Infinity"),
                        Coordinates::Affine(x, y) => {
                            write!(f, "(")?;
                            <FieldElement<'_> as $trait>::fmt(&x, f)?;
                            write!(f, ", ")?;
                            <FieldElement<'_> as $trait>::fmt(&y, f)?;
                            write!(f, ")")
                        }
                    }
                }
            }
        )+
    };
}

forward_fmt!(fmt::Debug, fmt::Display, fmt::LowerHex, fmt::UpperHex);

impl Add for EcPoint<'_> {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        assert_eq!(self.curve, other.curve);
        match (self.coordinates, other.coordinates) {
            (Coordinates::Infinity, _) => other,
            (_, Coordinates::Infinity) => self,
            (Coordinates::Affine(x1, y1), Coordinates::Affine(x2, y2)) => {
                // https://hyperelliptic.org/EFD/g1p/auto-shortw.html
                if x1 == x2 {
                    if y1 == y2 {
                        // Point doubling
                        let two = self.curve.base_field.from_u64(2);
                        let three = self.curve.base_field.from_u64(3);
                        let lambda = (three * x1.pow(2) + self.curve.a()) / (two * y1);
                        let lambda = lambda.unwrap();
                        let x3 = lambda.pow(2) - two * x1;
                        let y3 = lambda * (x1 - x3) - y1;
                        EcPoint {
                            curve:       self.curve,
                            coordinates: Coordinates::Affine(x3, y3),
                        }
                    } else {
                        // Inverse points
                        self.curve.infinity()
                    }
                } else {
                    let lambda = ((y2 - y1) / (x2 - x1)).unwrap();
                    let x3 = lambda.pow(2) - x1 - x2;
                    let y3 = lambda * (x1 - x3) - y1;
                    EcPoint {
                        curve:       self.curve,
                        coordinates: Coordinates::Affine(x3, y3),
                    }
                }
            }
        }
    }
}

impl AddAssign for EcPoint<'_> {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Neg for EcPoint<'_> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        match self.coordinates {
            Coordinates::Infinity => self,
            Coordinates::Affine(x, y) => EcPoint {
                curve:       self.curve,
                coordinates: Coordinates::Affine(x, -y),
            },
        }
    }
}

impl Sub for EcPoint<'_> {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    fn sub(self, other: Self) -> Self::Output {
        self + other.neg()
    }
}

impl SubAssign for EcPoint<'_> {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

/// Conditionally select a point.
///
/// Note: points must have identical representation (Infinity / Affine) for
/// constant time.
///
/// # Panics
///
/// Panics if the points are not on the same curve
impl ConditionallySelectable for EcPoint<'_> {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        assert_eq!(a.curve, b.curve);
        use Coordinates::*;
        let coordinates = match (&a.coordinates, &b.coordinates) {
            (Infinity, Infinity) => Infinity,
            (Affine(ax, ay), Affine(bx, by)) => Affine(
                FieldElement::conditional_select(ax, bx, choice),
                FieldElement::conditional_select(ay, by, choice),
            ),
            (a, b) => {
                if bool::from(choice) {
                    *b
                } else {
                    *a
                }
            }
        };
        Self {
            curve: a.curve,
            coordinates,
        }
    }
}

/// Constant time coordinate equality check.
///
/// Warning: only constant time in the coordinates, not in the
/// Infinity / Affine case distinction.
impl ConstantTimeEq for EcPoint<'_> {
    fn ct_eq(&self, other: &Self) -> Choice {
        use Coordinates::*;
        assert_eq!(self.curve, other.curve);
        match (&self.coordinates, &other.coordinates) {
            (Infinity, Infinity) => Choice::from(1),
            (Affine(ax, ay), Affine(bx, by)) => ax.ct_eq(bx) & ay.ct_eq(by),
            _ => Choice::from(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::super::named::{nist_p256, nist_p384, nist_p521},
        crate::field::random_below,
    };

    #[test]
    fn test_diffie_hellman() {
        let rng = &mut rand::thread_rng();
        for curve in [nist_p256(), nist_p384(), nist_p521()] {
            let order = curve.scalar_field().modulus();
            let alice = random_below(rng, order).unwrap();
            let bob = random_below(rng, order).unwrap();

            let alice_public = curve.generator().mul_uint(alice);
            let bob_public = curve.generator().mul_uint(bob);
            assert_eq!(bob_public.mul_uint(alice), alice_public.mul_uint(bob));
        }
    }

    #[test]
    fn test_from_x_finds_generator() {
        let curve = nist_p256();
        let generator = curve.generator();
        let point = curve.from_x(generator.x().unwrap()).unwrap();
        assert!(point == generator || point == -generator);
    }
}
