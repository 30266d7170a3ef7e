#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::stable::{StableMarshal, StableWriter};

/// Token lifetime in epochs. The token is usable while
/// `nbf <= epoch < exp`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lifetime {
    pub exp: u64,
    pub nbf: u64,
    pub iat: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    NotYetValid,
    Expired,
}

impl Lifetime {
    #[must_use]
    pub fn new(exp: u64, nbf: u64, iat: u64) -> Self {
        Self { exp, nbf, iat }
    }

    /// Lifetime for a token issued at `current_epoch`, usable immediately.
    #[must_use]
    pub fn starting_at(current_epoch: u64, exp: u64) -> Self {
        Self::new(exp, current_epoch, current_epoch)
    }

    #[must_use]
    pub fn validity_at(&self, epoch: u64) -> Validity {
        if self.exp <= epoch {
            Validity::Expired
        } else if self.nbf > epoch {
            Validity::NotYetValid
        } else {
            Validity::Valid
        }
    }

    #[must_use]
    pub fn is_expired(&self, epoch: u64) -> bool {
        self.exp <= epoch
    }
}

impl StableMarshal for Lifetime {
    fn write_fields(&self, writer: &mut StableWriter) {
        writer.uint64(1, self.exp).uint64(2, self.nbf).uint64(3, self.iat);
    }
}
