//! Runtime CPU-feature dispatch for the vectorized kernels.
//!
//! A process-wide feature mask is probed exactly once; table construction
//! latches a [`Kernel`] from it so the transforms stay branch-free. The
//! vector modules only exist on x86_64 with the `avx512` cargo feature; on
//! every other build the mask is all-false and dispatch selects the scalar
//! engines.

#[cfg(all(feature = "avx512", target_arch = "x86_64"))]
pub(crate) mod avx512;
#[cfg(all(feature = "avx512", target_arch = "x86_64"))]
pub(crate) mod ifma;

use std::sync::OnceLock;

use crate::{IFMA_BIT_SHIFT, MIN_SIMD_DEGREE};

/// The feature bits consulted by kernel selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    /// AVX512F + AVX512DQ: the 64-bit 8-lane kernels.
    pub avx512dq: bool,
    /// AVX512IFMA (with DQ): the 52-bit kernels.
    pub avx512ifma: bool,
}

static CPU_FEATURES: OnceLock<CpuFeatures> = OnceLock::new();

/// The process-wide feature mask, probed on first use.
#[must_use]
pub fn features() -> CpuFeatures {
    *CPU_FEATURES.get_or_init(|| {
        #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
        {
            let dq = is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512dq");
            CpuFeatures {
                avx512dq: dq,
                avx512ifma: dq && is_x86_feature_detected!("avx512ifma"),
            }
        }
        #[cfg(not(all(feature = "avx512", target_arch = "x86_64")))]
        {
            CpuFeatures::default()
        }
    })
}

/// Vector engine for one transform direction, latched at table construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kernel {
    Scalar,
    Avx512,
    Ifma,
}

/// Selects the widest engine the degree, the latched bit shift, and the CPU
/// allow. Degrees below [`MIN_SIMD_DEGREE`] always run scalar.
pub(crate) fn select_kernel(degree: u64, bit_shift: u32) -> Kernel {
    let feats = features();
    if degree < MIN_SIMD_DEGREE as u64 {
        return Kernel::Scalar;
    }
    if bit_shift == IFMA_BIT_SHIFT && feats.avx512ifma {
        return Kernel::Ifma;
    }
    if feats.avx512dq {
        return Kernel::Avx512;
    }
    Kernel::Scalar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_degrees_stay_scalar() {
        assert_eq!(select_kernel(8, 64), Kernel::Scalar);
        assert_eq!(select_kernel(8, 52), Kernel::Scalar);
    }

    #[test]
    fn feature_mask_is_stable() {
        assert_eq!(features(), features());
    }
}
