use ff::PrimeField;
use serde::{de::DeserializeOwned, Serialize};

/// Prime field used as the value domain of secret sharing.
///
/// The modulus is a deployment parameter: it must be large enough that no
/// intermediate value of the evaluated expression wraps around.
pub trait MpcField: PrimeField + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Canonical representative in `[0, q)`. Only the low 128 bits are read.
    fn to_u128(&self) -> u128 {
        self.to_repr()
            .as_ref()
            .iter()
            .take(16)
            .rev()
            .fold(0u128, |acc, &byte| (acc << 8) | byte as u128)
    }

    /// Signed view of the element: representatives above `q/2` are negative.
    fn to_i128(&self) -> i128 {
        let positive = self.to_u128();
        let negative = (-*self).to_u128();
        if negative < positive {
            -(negative as i128)
        } else {
            positive as i128
        }
    }

    /// Embed a signed integer.
    fn from_i64(value: i64) -> Self {
        if value < 0 {
            -Self::from(value.unsigned_abs())
        } else {
            Self::from(value as u64)
        }
    }
}

mod mersenne_61 {
    use ff::PrimeField;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Finite field mod 2^61-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "2305843009213693951"]
    #[PrimeFieldGenerator = "37"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne61([u64; 1]);

    impl Serialize for Mersenne61 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.to_repr().0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Mersenne61 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = Mersenne61Repr(Deserialize::deserialize(deserializer)?);
            Self::from_repr_vartime(repr)
                .ok_or_else(|| serde::de::Error::custom("Invalid field element"))
        }
    }

    impl super::MpcField for Mersenne61 {}
}

mod mersenne_127 {
    use ff::PrimeField;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Finite field mod 2^127-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "170141183460469231731687303715884105727"]
    #[PrimeFieldGenerator = "43"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne127([u64; 2]);

    impl Serialize for Mersenne127 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.to_repr().0.serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Mersenne127 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = Mersenne127Repr(Deserialize::deserialize(deserializer)?);
            Self::from_repr_vartime(repr)
                .ok_or_else(|| serde::de::Error::custom("Invalid field element"))
        }
    }

    impl super::MpcField for Mersenne127 {}
}

pub use mersenne_127::{Mersenne127, Mersenne127Repr};
pub use mersenne_61::{Mersenne61, Mersenne61Repr};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_views() {
        let x = Mersenne127::from(98);
        assert_eq!(x.to_u128(), 98);
        assert_eq!(x.to_i128(), 98);

        let y = Mersenne61::from_i64(-11);
        assert_eq!(y.to_i128(), -11);
        assert_eq!(y.to_u128(), (1u128 << 61) - 1 - 11);
    }

    #[test]
    fn test_reject_non_canonical_encoding() {
        let modulus = ((1u64 << 61) - 1).to_le_bytes();
        assert!(bincode::deserialize::<Mersenne61>(&modulus).is_err());

        let encoded = bincode::serialize(&Mersenne61::from(7)).unwrap();
        assert_eq!(bincode::deserialize::<Mersenne61>(&encoded).unwrap(), 7.into());
    }
}
