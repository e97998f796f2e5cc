//! 8-lane 52-bit kernels (AVX512-IFMA).
//!
//! `vpmadd52{lo,hi}uq` multiplies 52-bit operands into a 104-bit product and
//! returns either half, which keeps the Barrett quotient estimate to two
//! instructions instead of the 32-bit limb decomposition the 64-bit path
//! needs. The price is a tighter modulus bound: the transforms engage this
//! path only below [`crate::MAX_FWD_IFMA_MODULUS`] /
//! [`crate::MAX_INV_IFMA_MODULUS`] (so every intermediate stays under 2^52),
//! and the element-wise multiply below [`crate::MAX_IFMA_MODULUS`].
//!
//! As with the 64-bit path, output is byte-identical to the scalar
//! reference.

use core::arch::x86_64::{
    __m512i, _mm512_add_epi64, _mm512_loadu_epi64, _mm512_madd52hi_epu64, _mm512_madd52lo_epu64,
    _mm512_min_epu64, _mm512_mullo_epi64, _mm512_set1_epi64, _mm512_setzero_si512,
    _mm512_slli_epi64, _mm512_srli_epi64, _mm512_storeu_epi64, _mm512_sub_epi64,
};

use crate::arith::{BarrettFactor, MultiplyFactor};
use crate::{eltwise, ntt};

#[inline]
#[target_feature(enable = "avx512f,avx512dq,avx512ifma")]
fn splat(value: u64) -> __m512i {
    unsafe { _mm512_set1_epi64(value as i64) }
}

#[inline]
#[target_feature(enable = "avx512f,avx512dq,avx512ifma")]
fn small_mod(x: __m512i, modulus: __m512i) -> __m512i {
    unsafe { _mm512_min_epu64(x, _mm512_sub_epi64(x, modulus)) }
}

/// High 52 bits of the 104-bit `x * y` product; operands must be `< 2^52`.
#[inline]
#[target_feature(enable = "avx512f,avx512dq,avx512ifma")]
fn mul_hi_52(x: __m512i, y: __m512i) -> __m512i {
    unsafe { _mm512_madd52hi_epu64(_mm512_setzero_si512(), x, y) }
}

/// Low 52 bits of the 104-bit `x * y` product; operands must be `< 2^52`.
#[inline]
#[target_feature(enable = "avx512f,avx512dq,avx512ifma")]
fn mul_lo_52(x: __m512i, y: __m512i) -> __m512i {
    unsafe { _mm512_madd52lo_epu64(_mm512_setzero_si512(), x, y) }
}

/// 8-lane Harvey lazy multiply with the 52-bit Barrett factor: result in
/// `[0, 2*modulus)`. Requires `y < 2^52`.
#[inline]
#[target_feature(enable = "avx512f,avx512dq,avx512ifma")]
fn mul_mod_lazy_52(y: __m512i, w: __m512i, w_precon: __m512i, modulus: __m512i) -> __m512i {
    unsafe {
        let q_est = mul_hi_52(y, w_precon);
        _mm512_sub_epi64(
            _mm512_mullo_epi64(y, w),
            _mm512_mullo_epi64(q_est, modulus),
        )
    }
}

#[target_feature(enable = "avx512f,avx512dq,avx512ifma")]
pub(crate) fn fma_mod_in_place(
    values: &mut [u64],
    scalar: &MultiplyFactor,
    addend: Option<&[u64]>,
    modulus: u64,
) {
    let tail = values.len() % 8;
    let (head, body) = values.split_at_mut(tail);

    unsafe {
        let vq = splat(modulus);
        let vop = splat(scalar.operand());
        let vprecon = splat(scalar.barrett_factor());
        let mut value_ptr = body.as_mut_ptr();

        match addend {
            Some(addend) => {
                let (add_head, add_body) = addend.split_at(tail);
                eltwise::native::fma_mod_in_place::<52>(head, scalar, Some(add_head), modulus);
                let mut add_ptr = add_body.as_ptr();
                for _ in 0..body.len() / 8 {
                    let va = _mm512_loadu_epi64(value_ptr as *const i64);
                    let vc = _mm512_loadu_epi64(add_ptr as *const i64);
                    let q_est = mul_hi_52(va, vprecon);
                    let prod = _mm512_sub_epi64(
                        _mm512_mullo_epi64(va, vop),
                        _mm512_mullo_epi64(q_est, vq),
                    );
                    let reduced = small_mod(prod, vq);
                    let sum = small_mod(_mm512_add_epi64(reduced, vc), vq);
                    _mm512_storeu_epi64(value_ptr as *mut i64, sum);
                    value_ptr = value_ptr.add(8);
                    add_ptr = add_ptr.add(8);
                }
            }
            None => {
                eltwise::native::fma_mod_in_place::<52>(head, scalar, None, modulus);
                for _ in 0..body.len() / 8 {
                    let va = _mm512_loadu_epi64(value_ptr as *const i64);
                    let q_est = mul_hi_52(va, vprecon);
                    let prod = _mm512_sub_epi64(
                        _mm512_mullo_epi64(va, vop),
                        _mm512_mullo_epi64(q_est, vq),
                    );
                    _mm512_storeu_epi64(value_ptr as *mut i64, small_mod(prod, vq));
                    value_ptr = value_ptr.add(8);
                }
            }
        }
    }
}

/// Vector-vector multiply via the 104-bit product and a two-word Barrett
/// reduction with `floor(2^104 / modulus)`. Requires `modulus < 2^50`.
#[target_feature(enable = "avx512f,avx512dq,avx512ifma")]
pub(crate) fn multiply_mod_in_place(
    values: &mut [u64],
    other: &[u64],
    factor: &BarrettFactor<52>,
    modulus: u64,
) {
    let tail = values.len() % 8;
    let (head, body) = values.split_at_mut(tail);
    let (other_head, other_body) = other.split_at(tail);
    eltwise::native::multiply_mod_in_place(head, other_head, modulus);

    unsafe {
        let vq = splat(modulus);
        let vc_hi = splat(factor.hi());
        let vc_lo = splat(factor.lo());
        let mut value_ptr = body.as_mut_ptr();
        let mut other_ptr = other_body.as_ptr();
        for _ in 0..body.len() / 8 {
            let vx = _mm512_loadu_epi64(value_ptr as *const i64);
            let vy = _mm512_loadu_epi64(other_ptr as *const i64);

            let z_hi = mul_hi_52(vx, vy);
            let z_lo = mul_lo_52(vx, vy);

            // q_est = floor(z * c / 2^104)
            //       = z_hi*c_hi + floor((z_hi*c_lo + z_lo*c_hi + floor(z_lo*c_lo/2^52)) / 2^52).
            // With 52-bit limbs in 64-bit lanes the three-way sum cannot
            // wrap, so no carry handling is needed.
            let t1 = mul_hi_52(z_lo, vc_lo);
            let h1 = mul_hi_52(z_lo, vc_hi);
            let l1 = mul_lo_52(z_lo, vc_hi);
            let h2 = mul_hi_52(z_hi, vc_lo);
            let l2 = mul_lo_52(z_hi, vc_lo);

            let s = _mm512_add_epi64(_mm512_add_epi64(l1, l2), t1);
            let s_hi = _mm512_add_epi64(_mm512_add_epi64(h1, h2), _mm512_srli_epi64::<52>(s));
            let q_est = _mm512_add_epi64(mul_lo_52(z_hi, vc_hi), s_hi);

            // r = z - q_est * q in [0, 2q), valid mod 2^64.
            let z_lo64 = _mm512_add_epi64(z_lo, _mm512_slli_epi64::<52>(z_hi));
            let r = _mm512_sub_epi64(z_lo64, _mm512_mullo_epi64(q_est, vq));
            _mm512_storeu_epi64(value_ptr as *mut i64, small_mod(r, vq));

            value_ptr = value_ptr.add(8);
            other_ptr = other_ptr.add(8);
        }
    }
}

/// Forward transform with 52-bit lazy butterflies. Requires
/// `modulus < 2^50` so the `[0, 4q)` representatives stay below 2^52.
#[target_feature(enable = "avx512f,avx512dq,avx512ifma")]
pub(crate) fn forward_transform(
    elements: &mut [u64],
    modulus: u64,
    roots: &[u64],
    precon52_roots: &[u64],
    output_mod_factor: u64,
) {
    let n = elements.len();
    let twice_modulus = modulus << 1;
    let mut t = n >> 1;
    let mut m = 1;
    while m < n {
        if t >= 8 {
            unsafe {
                let vq = splat(modulus);
                let vq2 = splat(twice_modulus);
                let mut j1 = 0;
                for i in 0..m {
                    let vw = splat(roots[m + i]);
                    let vw_precon = splat(precon52_roots[m + i]);
                    let x_base = elements.as_mut_ptr().add(j1);
                    let y_base = x_base.add(t);
                    for k in 0..t / 8 {
                        let x_ptr = x_base.add(8 * k);
                        let y_ptr = y_base.add(8 * k);
                        let vx = _mm512_loadu_epi64(x_ptr as *const i64);
                        let vy = _mm512_loadu_epi64(y_ptr as *const i64);
                        let vtx = small_mod(vx, vq2);
                        let vt = mul_mod_lazy_52(vy, vw, vw_precon, vq);
                        _mm512_storeu_epi64(x_ptr as *mut i64, _mm512_add_epi64(vtx, vt));
                        _mm512_storeu_epi64(
                            y_ptr as *mut i64,
                            _mm512_add_epi64(vtx, _mm512_sub_epi64(vq2, vt)),
                        );
                    }
                    j1 += 2 * t;
                }
            }
        } else {
            ntt::forward_layer::<52>(elements, roots, precon52_roots, m, t, modulus);
        }
        t >>= 1;
        m <<= 1;
    }
    if output_mod_factor == 1 {
        unsafe {
            let vq = splat(modulus);
            let vq2 = splat(twice_modulus);
            let mut ptr = elements.as_mut_ptr();
            for _ in 0..n / 8 {
                let v = _mm512_loadu_epi64(ptr as *const i64);
                _mm512_storeu_epi64(ptr as *mut i64, small_mod(small_mod(v, vq2), vq));
                ptr = ptr.add(8);
            }
        }
    }
}

/// Inverse transform with 52-bit lazy butterflies. Requires
/// `modulus < 2^49`.
#[target_feature(enable = "avx512f,avx512dq,avx512ifma")]
pub(crate) fn inverse_transform(
    elements: &mut [u64],
    modulus: u64,
    inv_roots: &[u64],
    precon52_inv_roots: &[u64],
    inv_degree: &MultiplyFactor,
    inv_degree_w: &MultiplyFactor,
    output_mod_factor: u64,
) {
    let n = elements.len();
    let twice_modulus = modulus << 1;
    let mut t = 1;
    let mut m = n >> 1;
    let mut root_index = 1;
    while m > 1 {
        if t >= 8 {
            unsafe {
                let vq = splat(modulus);
                let vq2 = splat(twice_modulus);
                let mut j1 = 0;
                for _ in 0..m {
                    let vw = splat(inv_roots[root_index]);
                    let vw_precon = splat(precon52_inv_roots[root_index]);
                    root_index += 1;
                    let x_base = elements.as_mut_ptr().add(j1);
                    let y_base = x_base.add(t);
                    for k in 0..t / 8 {
                        let x_ptr = x_base.add(8 * k);
                        let y_ptr = y_base.add(8 * k);
                        let vx = _mm512_loadu_epi64(x_ptr as *const i64);
                        let vy = _mm512_loadu_epi64(y_ptr as *const i64);
                        let vtx = small_mod(_mm512_add_epi64(vx, vy), vq2);
                        let vty = _mm512_sub_epi64(_mm512_add_epi64(vx, vq2), vy);
                        _mm512_storeu_epi64(x_ptr as *mut i64, vtx);
                        _mm512_storeu_epi64(
                            y_ptr as *mut i64,
                            mul_mod_lazy_52(vty, vw, vw_precon, vq),
                        );
                    }
                    j1 += 2 * t;
                }
            }
        } else {
            root_index = ntt::inverse_layer::<52>(
                elements,
                inv_roots,
                precon52_inv_roots,
                m,
                t,
                root_index,
                modulus,
            );
        }
        t <<= 1;
        m >>= 1;
    }

    unsafe {
        let vq = splat(modulus);
        let vq2 = splat(twice_modulus);
        let v_inv_n = splat(inv_degree.operand());
        let v_inv_n_precon = splat(inv_degree.barrett_factor());
        let v_inv_nw = splat(inv_degree_w.operand());
        let v_inv_nw_precon = splat(inv_degree_w.barrett_factor());
        let half = n >> 1;
        let x_base = elements.as_mut_ptr();
        let y_base = x_base.add(half);
        for k in 0..half / 8 {
            let x_ptr = x_base.add(8 * k);
            let y_ptr = y_base.add(8 * k);
            let vx = _mm512_loadu_epi64(x_ptr as *const i64);
            let vy = _mm512_loadu_epi64(y_ptr as *const i64);
            let vtx = small_mod(_mm512_add_epi64(vx, vy), vq2);
            let vty = _mm512_sub_epi64(_mm512_add_epi64(vx, vq2), vy);
            _mm512_storeu_epi64(
                x_ptr as *mut i64,
                mul_mod_lazy_52(vtx, v_inv_n, v_inv_n_precon, vq),
            );
            _mm512_storeu_epi64(
                y_ptr as *mut i64,
                mul_mod_lazy_52(vty, v_inv_nw, v_inv_nw_precon, vq),
            );
        }
    }

    if output_mod_factor == 1 {
        unsafe {
            let vq = splat(modulus);
            let mut ptr = elements.as_mut_ptr();
            for _ in 0..n / 8 {
                let v = _mm512_loadu_epi64(ptr as *const i64);
                _mm512_storeu_epi64(ptr as *mut i64, small_mod(v, vq));
                ptr = ptr.add(8);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::generate_primes;
    use crate::simd;

    fn xorshift(state: &mut u64) -> u64 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        *state
    }

    #[test]
    fn kernels_match_native_across_lengths() {
        if !simd::features().avx512ifma {
            return;
        }
        let modulus = generate_primes(1, 48, 1024).unwrap()[0];
        let mut state = 0x2545_f491_4f6c_dd1du64;

        for len in [1usize, 7, 8, 9, 16, 173] {
            let a: Vec<u64> = (0..len).map(|_| xorshift(&mut state) % modulus).collect();
            let b: Vec<u64> = (0..len).map(|_| xorshift(&mut state) % modulus).collect();

            let mut expected = a.clone();
            eltwise::native::multiply_mod_in_place(&mut expected, &b, modulus);
            let mut got = a.clone();
            let factor = BarrettFactor::<52>::new(modulus);
            unsafe { multiply_mod_in_place(&mut got, &b, &factor, modulus) };
            assert_eq!(got, expected, "multiply_mod len {len}");

            let scalar = MultiplyFactor::new(b[0], 52, modulus);
            let mut expected = a.clone();
            eltwise::native::fma_mod_in_place::<52>(&mut expected, &scalar, Some(&b), modulus);
            let mut got = a.clone();
            unsafe { fma_mod_in_place(&mut got, &scalar, Some(&b), modulus) };
            assert_eq!(got, expected, "fma_mod len {len}");
        }
    }

    #[test]
    fn transforms_round_trip() {
        if !simd::features().avx512ifma {
            return;
        }
        let modulus = generate_primes(1, 48, 64).unwrap()[0];
        let tables = crate::NttTables::new(64, modulus).unwrap();
        let mut state = 7u64;
        let original: Vec<u64> = (0..64).map(|_| xorshift(&mut state) % modulus).collect();

        let mut vector = original.clone();
        unsafe {
            forward_transform(
                &mut vector,
                modulus,
                tables.root_of_unity_powers(),
                tables.precon52_root_of_unity_powers(),
                1,
            );
        }
        let mut scalar = original.clone();
        tables.forward_scalar(&mut scalar, 2, 1);
        assert_eq!(vector, scalar);

        let (inv_degree, inv_degree_w) = tables.inv_degree_factors(52);
        unsafe {
            inverse_transform(
                &mut vector,
                modulus,
                tables.inv_root_of_unity_powers(),
                tables.precon52_inv_root_of_unity_powers(),
                inv_degree,
                inv_degree_w,
                1,
            );
        }
        assert_eq!(vector, original);
    }
}
