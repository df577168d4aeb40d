//! Additive N-of-N secret sharing over a prime field.

use std::ops::{Add, Mul, Neg, Sub};

use bincode::Options;
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::fields::MpcField;

/// Share slot that absorbs public constants, so that they are counted
/// exactly once when all shares are summed.
pub const CANONICAL_INDEX: usize = 0;

/// Error while encoding or decoding a wire payload.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("unable to encode payload: {0}")]
    Encode(#[source] bincode::Error),
    #[error("malformed payload: {0}")]
    Malformed(#[source] bincode::Error),
}

/// Encode value with the compact wire encoding used for every payload.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ShareError> {
    bincode::options().serialize(value).map_err(ShareError::Encode)
}

/// Decode value produced by [`encode`]. Trailing bytes are rejected.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ShareError> {
    bincode::options()
        .deserialize(bytes)
        .map_err(ShareError::Malformed)
}

/// One of N additive pieces of a shared value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "F: MpcField")]
pub struct Share<F> {
    index: usize,
    value: F,
    correlation_id: Vec<u8>,
}

impl<F: MpcField> Share<F> {
    pub fn new(index: usize, value: F, correlation_id: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            value,
            correlation_id: correlation_id.into(),
        }
    }

    /// Which of the N additive pieces this is.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self) -> F {
        self.value
    }

    /// Logical value (secret or expression node) this share belongs to.
    pub fn correlation_id(&self) -> &[u8] {
        &self.correlation_id
    }

    pub fn is_canonical(&self) -> bool {
        self.index == CANONICAL_INDEX
    }

    /// Relabel share as a piece of another logical value.
    pub fn with_correlation_id(self, correlation_id: impl Into<Vec<u8>>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..self
        }
    }

    /// Serialize to wire representation of `(index, value, correlation_id)`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ShareError> {
        encode(self)
    }

    /// Inverse of [`Share::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShareError> {
        decode(bytes)
    }
}

/// Split secret into `n` random shares indexed `0..n`, which sum up to the secret.
/// Panics if `n` is zero.
pub fn split<F: MpcField>(secret: F, n: usize, correlation_id: &[u8]) -> Vec<Share<F>> {
    split_with_rng(secret, n, correlation_id, &mut rand::thread_rng())
}

/// Same as [`split`] with explicit source of randomness.
pub fn split_with_rng<F: MpcField>(
    secret: F,
    n: usize,
    correlation_id: &[u8],
    rng: &mut impl Rng,
) -> Vec<Share<F>> {
    assert!(n > 0, "Cannot split secret into zero shares");
    let mut values: Vec<F> = (1..n).map(|_| F::random(&mut *rng)).collect();
    let sum = values.iter().fold(F::zero(), |acc, &x| acc + x);
    values.push(secret - sum);
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| Share::new(index, value, correlation_id))
        .collect()
}

/// Sum of all share values. Expects exactly one share per slot of the same value.
pub fn reconstruct<F: MpcField>(shares: &[Share<F>]) -> F {
    shares.iter().fold(F::zero(), |acc, share| acc + share.value)
}

impl<F: MpcField> Add for Share<F> {
    type Output = Share<F>;
    fn add(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.index, rhs.index, "Adding shares of different slots");
        Share {
            value: self.value + rhs.value,
            ..self
        }
    }
}

impl<F: MpcField> Sub for Share<F> {
    type Output = Share<F>;
    fn sub(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.index, rhs.index, "Subtracting shares of different slots");
        Share {
            value: self.value - rhs.value,
            ..self
        }
    }
}

impl<F: MpcField> Neg for Share<F> {
    type Output = Share<F>;
    fn neg(self) -> Self::Output {
        Share {
            value: -self.value,
            ..self
        }
    }
}

impl<F: MpcField> Add<F> for Share<F> {
    type Output = Share<F>;
    fn add(self, rhs: F) -> Self::Output {
        if self.is_canonical() {
            Share {
                value: self.value + rhs,
                ..self
            }
        } else {
            self
        }
    }
}

impl<F: MpcField> Sub<F> for Share<F> {
    type Output = Share<F>;
    fn sub(self, rhs: F) -> Self::Output {
        self + (-rhs)
    }
}

impl<F: MpcField> Mul<F> for Share<F> {
    type Output = Share<F>;
    fn mul(self, rhs: F) -> Self::Output {
        Share {
            value: self.value * rhs,
            ..self
        }
    }
}

/// Intermediate result of local evaluation: either a public constant or a share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value<F> {
    Public(F),
    Shared(Share<F>),
}

impl<F: MpcField> Add for Value<F> {
    type Output = Value<F>;
    fn add(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Value::Public(x), Value::Public(y)) => Value::Public(x + y),
            (Value::Shared(x), Value::Public(k)) | (Value::Public(k), Value::Shared(x)) => {
                Value::Shared(x + k)
            }
            (Value::Shared(x), Value::Shared(y)) => Value::Shared(x + y),
        }
    }
}

impl<F: MpcField> Sub for Value<F> {
    type Output = Value<F>;
    fn sub(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Value::Public(x), Value::Public(y)) => Value::Public(x - y),
            (Value::Shared(x), Value::Public(k)) => Value::Shared(x - k),
            (Value::Public(k), Value::Shared(x)) => Value::Shared(-x + k),
            (Value::Shared(x), Value::Shared(y)) => Value::Shared(x - y),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::fields::{Mersenne127, Mersenne61};

    type Fp = Mersenne61;

    fn pointwise<F: MpcField>(
        xs: &[Share<F>],
        ys: &[Share<F>],
        op: impl Fn(Share<F>, Share<F>) -> Share<F>,
    ) -> Vec<Share<F>> {
        xs.iter()
            .zip(ys)
            .map(|(x, y)| op(x.clone(), y.clone()))
            .collect()
    }

    #[test]
    fn test_split_reconstruct() {
        let mut rng = StdRng::seed_from_u64(42);
        for n in 1..8 {
            for secret in [0, 1, 19, 1 << 40] {
                let shares = split_with_rng(Fp::from(secret), n, b"x", &mut rng);
                assert_eq!(shares.len(), n);
                assert!(shares.iter().enumerate().all(|(i, s)| s.index() == i));
                assert_eq!(reconstruct(&shares), Fp::from(secret));
            }
        }
    }

    #[test]
    fn test_proper_subset_is_random() {
        let mut rng = StdRng::seed_from_u64(7);
        let first = split_with_rng(Fp::from(5), 3, b"x", &mut rng);
        let second = split_with_rng(Fp::from(5), 3, b"x", &mut rng);
        assert_ne!(reconstruct(&first[..2]), reconstruct(&second[..2]));
    }

    #[test]
    fn test_additive_homomorphism() {
        let mut rng = StdRng::seed_from_u64(1);
        let xs = split_with_rng(Fp::from(14), 4, b"x", &mut rng);
        let ys = split_with_rng(Fp::from(3), 4, b"y", &mut rng);

        assert_eq!(reconstruct(&pointwise(&xs, &ys, |x, y| x + y)), Fp::from(17));
        assert_eq!(reconstruct(&pointwise(&xs, &ys, |x, y| x - y)), Fp::from(11));
        assert_eq!(reconstruct(&pointwise(&ys, &xs, |x, y| x - y)), Fp::from_i64(-11));
    }

    #[test]
    fn test_scalar_added_exactly_once() {
        let mut rng = StdRng::seed_from_u64(2);
        let xs = split_with_rng(Fp::from(10), 5, b"x", &mut rng);
        let k = Fp::from(7);

        let added: Vec<_> = xs.iter().map(|x| x.clone() + k).collect();
        assert_eq!(reconstruct(&added), Fp::from(17));

        let subtracted: Vec<_> = xs.iter().map(|x| x.clone() - k).collect();
        assert_eq!(reconstruct(&subtracted), Fp::from(3));

        let scaled: Vec<_> = xs.iter().map(|x| x.clone() * k).collect();
        assert_eq!(reconstruct(&scaled), Fp::from(70));
    }

    #[test]
    fn test_value_combinations() {
        let mut rng = StdRng::seed_from_u64(3);
        let xs = split_with_rng(Fp::from(4), 3, b"x", &mut rng);
        let k = Value::Public(Fp::from(10));

        let diffs: Vec<_> = xs
            .iter()
            .map(|x| match k.clone() - Value::Shared(x.clone()) {
                Value::Shared(share) => share,
                Value::Public(_) => panic!("Expected share"),
            })
            .collect();
        assert_eq!(reconstruct(&diffs), Fp::from(6));

        assert_eq!(
            Value::Public(Fp::from(2)) + Value::Public(Fp::from(3)),
            Value::Public(Fp::from(5))
        );
    }

    #[test]
    fn test_serialization() {
        let share = Share::new(2, Mersenne127::from_i64(-3), b"share/abc".to_vec());
        let bytes = share.to_bytes().unwrap();
        assert_eq!(Share::from_bytes(&bytes).unwrap(), share);

        assert!(matches!(
            Share::<Mersenne127>::from_bytes(&bytes[..bytes.len() - 1]),
            Err(ShareError::Malformed(_))
        ));
        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(Share::<Mersenne127>::from_bytes(&trailing).is_err());
    }

    fn field() -> impl Strategy<Value = Fp> {
        any::<u64>().prop_map(Fp::from)
    }

    /// Elements spread over the whole 127-bit range.
    fn wide_field() -> impl Strategy<Value = Mersenne127> {
        (any::<u64>(), any::<u64>()).prop_map(|(high, low)| {
            Mersenne127::from(high) * Mersenne127::from(u64::MAX) + Mersenne127::from(low)
        })
    }

    proptest! {
        #[test]
        fn test_any_split_reconstructs(
            secret in wide_field(),
            n in 1..30usize,
            seed in any::<u64>(),
        ) {
            let shares = split_with_rng(secret, n, b"x", &mut StdRng::seed_from_u64(seed));
            prop_assert_eq!(shares.len(), n);
            prop_assert!(shares.iter().enumerate().all(|(i, s)| s.index() == i));
            prop_assert_eq!(reconstruct(&shares), secret);
        }

        #[test]
        fn test_any_pointwise_arithmetic(
            x in field(),
            y in field(),
            k in field(),
            n in 1..30usize,
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let xs = split_with_rng(x, n, b"x", &mut rng);
            let ys = split_with_rng(y, n, b"y", &mut rng);

            prop_assert_eq!(reconstruct(&pointwise(&xs, &ys, |x, y| x + y)), x + y);
            prop_assert_eq!(reconstruct(&pointwise(&xs, &ys, |x, y| x - y)), x - y);
            let shifted: Vec<_> = xs.iter().map(|x| x.clone() + k).collect();
            prop_assert_eq!(reconstruct(&shifted), x + k);
            let negated: Vec<_> = xs.iter().map(|x| -x.clone()).collect();
            prop_assert_eq!(reconstruct(&negated), -x);
        }

        #[test]
        fn test_any_share_survives_encoding(
            index in 0..1000usize,
            value in wide_field(),
            correlation_id in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let share = Share::new(index, value, correlation_id);
            let bytes = share.to_bytes().unwrap();
            prop_assert_eq!(Share::from_bytes(&bytes).unwrap(), share);
        }
    }
}
