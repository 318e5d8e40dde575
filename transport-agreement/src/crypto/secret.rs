// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

/// Container for sensitive bytes.
///
/// Memory is zeroised on drop, comparison runs in constant time and debug output never reveals
/// the value.
#[derive(Clone, Eq, ZeroizeOnDrop)]
pub(crate) struct Secret<const N: usize>([u8; N]);

impl<const N: usize> Secret<N> {
    pub(crate) fn from_bytes(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> PartialEq for Secret<N> {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl<const N: usize> fmt::Debug for Secret<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret").field("value", &"***").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Secret;

    #[test]
    fn hidden_debug_output() {
        let secret = Secret::from_bytes([7u8; 32]);
        assert_eq!(format!("{secret:?}"), "Secret { value: \"***\" }");
        assert_eq!(secret, Secret::from_bytes([7u8; 32]));
        assert_ne!(secret, Secret::from_bytes([8u8; 32]));
    }
}
