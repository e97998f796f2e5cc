//! Element-wise modular vector kernels: subtract, fused multiply-add with a
//! broadcast scalar, and vector-vector multiply.
//!
//! Every kernel has an in-place core (first operand doubles as the result)
//! and an out-of-place wrapper that copies then runs in place. Dispatch
//! routes to the widest available engine; when the length is not a multiple
//! of eight, the vector engines push the leading `n mod 8` elements through
//! [`native`] first, so every engine is byte-identical to the scalar
//! reference for every length.
//!
//! Inputs must be reduced (`< modulus`); this is checked in debug builds
//! only.

use crate::arith::{BarrettFactor, MultiplyFactor};
use crate::MAX_IFMA_MODULUS;

/// Scalar reference implementations.
///
/// Public so callers (and the match tests) can pin the scalar engine
/// regardless of what the CPU supports.
pub mod native {
    use crate::arith::{mul_mod, mul_mod_lazy, MultiplyFactor};

    /// `values[i] = (values[i] + modulus - other[i]) mod modulus`.
    pub fn sub_mod_in_place(values: &mut [u64], other: &[u64], modulus: u64) {
        for (value, &sub) in values.iter_mut().zip(other) {
            let diff = *value + modulus - sub;
            *value = if diff >= modulus { diff - modulus } else { diff };
        }
    }

    /// `values[i] = (values[i] + modulus - scalar) mod modulus`.
    pub fn sub_mod_scalar_in_place(values: &mut [u64], scalar: u64, modulus: u64) {
        for value in values.iter_mut() {
            let diff = *value + modulus - scalar;
            *value = if diff >= modulus { diff - modulus } else { diff };
        }
    }

    /// `values[i] = (values[i] * scalar + addend[i]) mod modulus`, the add
    /// skipped when `addend` is `None`.
    ///
    /// `scalar` carries its `BIT_SHIFT`-bit Barrett factor; the products run
    /// through the lazy multiply and two conditional subtractions.
    pub fn fma_mod_in_place<const BIT_SHIFT: u32>(
        values: &mut [u64],
        scalar: &MultiplyFactor,
        addend: Option<&[u64]>,
        modulus: u64,
    ) {
        match addend {
            Some(addend) => {
                for (value, &add) in values.iter_mut().zip(addend) {
                    let mut t = mul_mod_lazy::<BIT_SHIFT>(
                        *value,
                        scalar.operand(),
                        scalar.barrett_factor(),
                        modulus,
                    );
                    if t >= modulus {
                        t -= modulus;
                    }
                    t += add;
                    *value = if t >= modulus { t - modulus } else { t };
                }
            }
            None => {
                for value in values.iter_mut() {
                    let t = mul_mod_lazy::<BIT_SHIFT>(
                        *value,
                        scalar.operand(),
                        scalar.barrett_factor(),
                        modulus,
                    );
                    *value = if t >= modulus { t - modulus } else { t };
                }
            }
        }
    }

    /// `values[i] = values[i] * other[i] mod modulus`.
    pub fn multiply_mod_in_place(values: &mut [u64], other: &[u64], modulus: u64) {
        for (value, &mul) in values.iter_mut().zip(other) {
            *value = mul_mod(*value, mul, modulus);
        }
    }
}

#[cfg(debug_assertions)]
fn assert_reduced(values: &[u64], modulus: u64) {
    assert!(
        values.iter().all(|&v| v < modulus),
        "input element exceeds modulus {modulus}"
    );
}

/// `values[i] = (values[i] - other[i]) mod modulus`, in place.
pub fn sub_mod_in_place(values: &mut [u64], other: &[u64], modulus: u64) {
    assert_eq!(values.len(), other.len(), "operand length mismatch");
    assert!(modulus > 1, "modulus must exceed 1");
    #[cfg(debug_assertions)]
    {
        assert_reduced(values, modulus);
        assert_reduced(other, modulus);
    }

    #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
    if values.len() >= 8 && crate::simd::features().avx512dq {
        // SAFETY: AVX512-DQ presence was just checked.
        unsafe { crate::simd::avx512::sub_mod_in_place(values, other, modulus) };
        return;
    }
    native::sub_mod_in_place(values, other, modulus);
}

/// `results[i] = (operand1[i] - operand2[i]) mod modulus`.
pub fn sub_mod(results: &mut [u64], operand1: &[u64], operand2: &[u64], modulus: u64) {
    assert_eq!(results.len(), operand1.len(), "operand length mismatch");
    results.copy_from_slice(operand1);
    sub_mod_in_place(results, operand2, modulus);
}

/// `values[i] = (values[i] - scalar) mod modulus`, in place.
pub fn sub_mod_scalar_in_place(values: &mut [u64], scalar: u64, modulus: u64) {
    assert!(modulus > 1, "modulus must exceed 1");
    assert!(scalar < modulus, "scalar exceeds modulus");
    #[cfg(debug_assertions)]
    assert_reduced(values, modulus);

    #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
    if values.len() >= 8 && crate::simd::features().avx512dq {
        // SAFETY: AVX512-DQ presence was just checked.
        unsafe { crate::simd::avx512::sub_mod_scalar_in_place(values, scalar, modulus) };
        return;
    }
    native::sub_mod_scalar_in_place(values, scalar, modulus);
}

/// `results[i] = (operand1[i] - scalar) mod modulus`.
pub fn sub_mod_scalar(results: &mut [u64], operand1: &[u64], scalar: u64, modulus: u64) {
    assert_eq!(results.len(), operand1.len(), "operand length mismatch");
    results.copy_from_slice(operand1);
    sub_mod_scalar_in_place(results, scalar, modulus);
}

/// `values[i] = (values[i] * scalar + addend[i]) mod modulus`, in place; the
/// add is skipped when `addend` is `None`.
pub fn fma_mod_in_place(values: &mut [u64], scalar: u64, addend: Option<&[u64]>, modulus: u64) {
    assert!(modulus > 1, "modulus must exceed 1");
    assert!(scalar < modulus, "scalar exceeds modulus");
    if let Some(addend) = addend {
        assert_eq!(values.len(), addend.len(), "operand length mismatch");
        #[cfg(debug_assertions)]
        assert_reduced(addend, modulus);
    }
    #[cfg(debug_assertions)]
    assert_reduced(values, modulus);

    #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
    if values.len() >= 8 {
        let feats = crate::simd::features();
        if modulus < MAX_IFMA_MODULUS && feats.avx512ifma {
            let factor = MultiplyFactor::new(scalar, 52, modulus);
            // SAFETY: AVX512-IFMA presence was just checked.
            unsafe { crate::simd::ifma::fma_mod_in_place(values, &factor, addend, modulus) };
            return;
        }
        if feats.avx512dq {
            let factor = MultiplyFactor::new(scalar, 64, modulus);
            // SAFETY: AVX512-DQ presence was just checked.
            unsafe { crate::simd::avx512::fma_mod_in_place(values, &factor, addend, modulus) };
            return;
        }
    }
    let factor = MultiplyFactor::new(scalar, 64, modulus);
    native::fma_mod_in_place::<64>(values, &factor, addend, modulus);
}

/// `results[i] = (operand1[i] * scalar + addend[i]) mod modulus`.
pub fn fma_mod(
    results: &mut [u64],
    operand1: &[u64],
    scalar: u64,
    addend: Option<&[u64]>,
    modulus: u64,
) {
    assert_eq!(results.len(), operand1.len(), "operand length mismatch");
    results.copy_from_slice(operand1);
    fma_mod_in_place(results, scalar, addend, modulus);
}

/// `values[i] = values[i] * other[i] mod modulus`, in place.
///
/// Moduli below 2^50 take the 52-bit IFMA path when available; otherwise the
/// 64-bit Barrett path.
pub fn multiply_mod_in_place(values: &mut [u64], other: &[u64], modulus: u64) {
    assert_eq!(values.len(), other.len(), "operand length mismatch");
    assert!(modulus > 1, "modulus must exceed 1");
    #[cfg(debug_assertions)]
    {
        assert_reduced(values, modulus);
        assert_reduced(other, modulus);
    }

    #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
    if values.len() >= 8 {
        let feats = crate::simd::features();
        if modulus < MAX_IFMA_MODULUS && feats.avx512ifma {
            let factor = BarrettFactor::<52>::new(modulus);
            // SAFETY: AVX512-IFMA presence was just checked.
            unsafe { crate::simd::ifma::multiply_mod_in_place(values, other, &factor, modulus) };
            return;
        }
        if feats.avx512dq {
            let factor = BarrettFactor::<64>::new(modulus);
            // SAFETY: AVX512-DQ presence was just checked.
            unsafe { crate::simd::avx512::multiply_mod_in_place(values, other, &factor, modulus) };
            return;
        }
    }
    native::multiply_mod_in_place(values, other, modulus);
}

/// `results[i] = operand1[i] * operand2[i] mod modulus`.
pub fn multiply_mod(results: &mut [u64], operand1: &[u64], operand2: &[u64], modulus: u64) {
    assert_eq!(results.len(), operand1.len(), "operand length mismatch");
    results.copy_from_slice(operand1);
    multiply_mod_in_place(results, operand2, modulus);
}

/// [`multiply_mod_in_place`] with a caller-supplied 64-bit Barrett factor.
pub fn multiply_mod_barrett64(
    values: &mut [u64],
    other: &[u64],
    factor: &BarrettFactor<64>,
    modulus: u64,
) {
    assert_eq!(values.len(), other.len(), "operand length mismatch");
    assert!(modulus > 1, "modulus must exceed 1");

    #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
    if values.len() >= 8 && crate::simd::features().avx512dq {
        // SAFETY: AVX512-DQ presence was just checked.
        unsafe { crate::simd::avx512::multiply_mod_in_place(values, other, factor, modulus) };
        return;
    }
    let _ = factor;
    native::multiply_mod_in_place(values, other, modulus);
}

/// [`multiply_mod_in_place`] with a caller-supplied 52-bit Barrett factor.
/// Requires `modulus < 2^50`.
pub fn multiply_mod_barrett52(
    values: &mut [u64],
    other: &[u64],
    factor: &BarrettFactor<52>,
    modulus: u64,
) {
    assert_eq!(values.len(), other.len(), "operand length mismatch");
    assert!(
        modulus < MAX_IFMA_MODULUS,
        "modulus exceeds the 52-bit kernel bound"
    );

    #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
    if values.len() >= 8 && crate::simd::features().avx512ifma {
        // SAFETY: AVX512-IFMA presence was just checked.
        unsafe { crate::simd::ifma::multiply_mod_in_place(values, other, factor, modulus) };
        return;
    }
    let _ = factor;
    native::multiply_mod_in_place(values, other, modulus);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_mod_vector_vector_small() {
        let mut op1 = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
        let op2 = vec![1u64, 3, 5, 7, 9, 4, 4, 6];
        sub_mod_in_place(&mut op1, &op2, 10);
        assert_eq!(op1, vec![0, 9, 8, 7, 6, 2, 3, 2]);
    }

    #[test]
    fn sub_mod_vector_scalar_small() {
        let mut op1 = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
        sub_mod_scalar_in_place(&mut op1, 3, 10);
        assert_eq!(op1, vec![8, 9, 0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn sub_mod_vector_vector_big() {
        let modulus = crate::arith::generate_primes(1, 60, 1024).unwrap()[0];
        let mut op1 = vec![
            0,
            1,
            2,
            3,
            modulus - 1,
            modulus - 2,
            modulus - 3,
            modulus - 4,
        ];
        let op2 = vec![
            modulus - 1,
            modulus - 2,
            3,
            2,
            modulus - 3,
            modulus - 4,
            1,
            0,
        ];
        sub_mod_in_place(&mut op1, &op2, modulus);
        assert_eq!(
            op1,
            vec![1, 3, modulus - 1, 1, 2, 2, modulus - 4, modulus - 4]
        );
    }

    #[test]
    fn fma_mod_with_and_without_addend() {
        let modulus = 101;
        let op1: Vec<u64> = (1..=16).collect();
        let addend: Vec<u64> = (2..=17).collect();

        let mut with_add = vec![0u64; 16];
        fma_mod(&mut with_add, &op1, 3, Some(&addend), modulus);
        for i in 0..16 {
            assert_eq!(with_add[i], (3 * op1[i] + addend[i]) % modulus);
        }

        let mut without_add = op1.clone();
        fma_mod_in_place(&mut without_add, 3, None, modulus);
        for i in 0..16 {
            assert_eq!(without_add[i], 3 * op1[i] % modulus);
        }
    }

    #[test]
    fn multiply_mod_small() {
        let mut op1 = vec![2u64, 4, 3, 2];
        let op2 = vec![2u64, 1, 2, 0];
        multiply_mod_in_place(&mut op1, &op2, 769);
        assert_eq!(op1, vec![4, 4, 6, 0]);
    }

    #[test]
    fn multiply_mod_wraps_big_modulus() {
        let modulus = crate::arith::generate_primes(1, 48, 1024).unwrap()[0];
        let mut op1 = vec![modulus - 1, 1, 1, 1, 1, 1, 1, 1];
        let op2 = vec![modulus - 1, 1, 1, 1, 1, 1, 1, 1];
        multiply_mod_in_place(&mut op1, &op2, modulus);
        assert_eq!(op1, vec![1, 1, 1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn multiply_mod_with_cached_factors() {
        let modulus: u64 = 769;
        let factor64 = BarrettFactor::<64>::new(modulus);
        let mut op1 = vec![1u64, 2, 3, 1, 1, 1, 0, 1];
        let op2 = vec![1u64, 1, 1, 1, 2, 3, 1, 0];
        multiply_mod_barrett64(&mut op1, &op2, &factor64, modulus);
        assert_eq!(op1, vec![1, 2, 3, 1, 2, 3, 0, 0]);

        let factor52 = BarrettFactor::<52>::new(modulus);
        let mut op1 = vec![1u64, 2, 3, 1, 1, 1, 0, 1];
        multiply_mod_barrett52(&mut op1, &op2, &factor52, modulus);
        assert_eq!(op1, vec![1, 2, 3, 1, 2, 3, 0, 0]);
    }
}
