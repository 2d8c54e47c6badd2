//! Constant-time comparison for roots and checksums.

use subtle::ConstantTimeEq;

/// Constant-time equality for 32-byte arrays (roots, checksums).
#[inline(always)]
pub fn eq_32(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.ct_eq(b).into()
}
