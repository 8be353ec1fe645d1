use crate::error::EncodeError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

macro_rules! bytes32 {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub const fn zero() -> Self {
                Self([0; 32])
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0; 32]
            }

            pub fn from_slice(slice: &[u8]) -> Result<Self, EncodeError> {
                if slice.len() != 32 {
                    return Err(EncodeError::InvalidLength(slice.len()));
                }
                let mut bytes = [0; 32];
                bytes.copy_from_slice(slice);
                Ok(Self(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = EncodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_slice(&hex::decode(s)?)
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

bytes32!(
    /// 32 byte Keccak digest identifying blocks and transactions
    Hash
);
bytes32!(
    /// Compressed curve point an output is paid to
    PublicKey
);
bytes32!(
    /// Unique per spent output, used to detect double spends
    KeyImage
);

/// Payment ids are carried in the transaction extra and look up like hashes
pub type PaymentId = Hash;

/// One element of a ring signature
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub c: [u8; 32],
    pub r: [u8; 32],
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}{})", hex::encode(self.c), hex::encode(self.r))
    }
}
