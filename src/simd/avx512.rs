//! 8-lane 64-bit kernels (AVX512-F + AVX512-DQ).
//!
//! The 64x64 high multiply is decomposed into 32-bit limb products, since
//! AVX512 has no widening 64-bit multiply. Every kernel produces output
//! byte-identical to the scalar reference: the element-wise kernels push the
//! leading `n mod 8` elements through [`crate::eltwise::native`], and the
//! transforms reuse the scalar butterfly for layers narrower than a vector.
//!
//! Callers must check AVX512-DQ support before invoking anything here; the
//! dispatchers in [`crate::eltwise`] and [`crate::ntt`] do so.

use core::arch::x86_64::{
    __m512i, _mm512_add_epi64, _mm512_and_si512, _mm512_cmplt_epu64_mask, _mm512_loadu_epi64,
    _mm512_maskz_set1_epi64, _mm512_min_epu64, _mm512_mul_epu32, _mm512_mullo_epi64,
    _mm512_set1_epi64, _mm512_srli_epi64, _mm512_storeu_epi64, _mm512_sub_epi64,
};

use crate::arith::{BarrettFactor, MultiplyFactor};
use crate::{eltwise, ntt};

#[inline]
#[target_feature(enable = "avx512f,avx512dq")]
fn splat(value: u64) -> __m512i {
    unsafe { _mm512_set1_epi64(value as i64) }
}

/// `x mod m` for `x < 2m`: `min(x, x - m)` on the unsigned wrap.
#[inline]
#[target_feature(enable = "avx512f,avx512dq")]
fn small_mod(x: __m512i, modulus: __m512i) -> __m512i {
    unsafe { _mm512_min_epu64(x, _mm512_sub_epi64(x, modulus)) }
}

/// High 64 bits of the per-lane `x * y` product.
#[inline]
#[target_feature(enable = "avx512f,avx512dq")]
fn mul_hi_64(x: __m512i, y: __m512i) -> __m512i {
    unsafe {
        let lo_mask = _mm512_set1_epi64(0xffff_ffff);
        let xh = _mm512_srli_epi64::<32>(x);
        let yh = _mm512_srli_epi64::<32>(y);
        let w0 = _mm512_mul_epu32(x, y);
        let w1 = _mm512_mul_epu32(x, yh);
        let w2 = _mm512_mul_epu32(xh, y);
        let w3 = _mm512_mul_epu32(xh, yh);
        let w0h = _mm512_srli_epi64::<32>(w0);
        let s1 = _mm512_add_epi64(w1, w0h);
        let s1l = _mm512_and_si512(s1, lo_mask);
        let s1h = _mm512_srli_epi64::<32>(s1);
        let s2 = _mm512_add_epi64(w2, s1l);
        let s2h = _mm512_srli_epi64::<32>(s2);
        _mm512_add_epi64(_mm512_add_epi64(w3, s1h), s2h)
    }
}

/// `s = x + y` (wrapping); carry lanes hold 1.
#[inline]
#[target_feature(enable = "avx512f,avx512dq")]
fn add_carry(x: __m512i, y: __m512i) -> (__m512i, __m512i) {
    unsafe {
        let s = _mm512_add_epi64(x, y);
        let mask = _mm512_cmplt_epu64_mask(s, x);
        (s, _mm512_maskz_set1_epi64(mask, 1))
    }
}

/// 8-lane Harvey lazy multiply: `y * w mod modulus`, result in
/// `[0, 2*modulus)`; `w_precon` is the 64-bit Barrett factor of `w`.
#[inline]
#[target_feature(enable = "avx512f,avx512dq")]
fn mul_mod_lazy_64(y: __m512i, w: __m512i, w_precon: __m512i, modulus: __m512i) -> __m512i {
    unsafe {
        let q_est = mul_hi_64(y, w_precon);
        _mm512_sub_epi64(
            _mm512_mullo_epi64(y, w),
            _mm512_mullo_epi64(q_est, modulus),
        )
    }
}

#[target_feature(enable = "avx512f,avx512dq")]
pub(crate) fn sub_mod_in_place(values: &mut [u64], other: &[u64], modulus: u64) {
    let tail = values.len() % 8;
    let (head, body) = values.split_at_mut(tail);
    let (other_head, other_body) = other.split_at(tail);
    eltwise::native::sub_mod_in_place(head, other_head, modulus);

    unsafe {
        let vq = splat(modulus);
        let mut value_ptr = body.as_mut_ptr();
        let mut other_ptr = other_body.as_ptr();
        for _ in 0..body.len() / 8 {
            let va = _mm512_loadu_epi64(value_ptr as *const i64);
            let vb = _mm512_loadu_epi64(other_ptr as *const i64);
            // a - b + q lies in [1, 2q).
            let diff = _mm512_add_epi64(_mm512_sub_epi64(va, vb), vq);
            _mm512_storeu_epi64(value_ptr as *mut i64, small_mod(diff, vq));
            value_ptr = value_ptr.add(8);
            other_ptr = other_ptr.add(8);
        }
    }
}

#[target_feature(enable = "avx512f,avx512dq")]
pub(crate) fn sub_mod_scalar_in_place(values: &mut [u64], scalar: u64, modulus: u64) {
    let tail = values.len() % 8;
    let (head, body) = values.split_at_mut(tail);
    eltwise::native::sub_mod_scalar_in_place(head, scalar, modulus);

    unsafe {
        let vq = splat(modulus);
        let vb = splat(scalar);
        let mut value_ptr = body.as_mut_ptr();
        for _ in 0..body.len() / 8 {
            let va = _mm512_loadu_epi64(value_ptr as *const i64);
            let diff = _mm512_add_epi64(_mm512_sub_epi64(va, vb), vq);
            _mm512_storeu_epi64(value_ptr as *mut i64, small_mod(diff, vq));
            value_ptr = value_ptr.add(8);
        }
    }
}

#[target_feature(enable = "avx512f,avx512dq")]
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
                eltwise::native::fma_mod_in_place::<64>(head, scalar, Some(add_head), modulus);
                let mut add_ptr = add_body.as_ptr();
                for _ in 0..body.len() / 8 {
                    let va = _mm512_loadu_epi64(value_ptr as *const i64);
                    let vc = _mm512_loadu_epi64(add_ptr as *const i64);
                    let q_est = mul_hi_64(va, vprecon);
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
                eltwise::native::fma_mod_in_place::<64>(head, scalar, None, modulus);
                for _ in 0..body.len() / 8 {
                    let va = _mm512_loadu_epi64(value_ptr as *const i64);
                    let q_est = mul_hi_64(va, vprecon);
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

/// Vector-vector multiply via the full 128-bit product and a two-word
/// Barrett reduction with `floor(2^128 / modulus)`.
#[target_feature(enable = "avx512f,avx512dq")]
pub(crate) fn multiply_mod_in_place(
    values: &mut [u64],
    other: &[u64],
    factor: &BarrettFactor<64>,
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

            let z_hi = mul_hi_64(vx, vy);
            let z_lo = _mm512_mullo_epi64(vx, vy);

            // q_est = floor(z * c / 2^128)
            //       = z_hi*c_hi + floor((z_hi*c_lo + z_lo*c_hi + floor(z_lo*c_lo/2^64)) / 2^64),
            // computed exactly with 64-bit words and carries.
            let t1 = mul_hi_64(z_lo, vc_lo);
            let h1 = mul_hi_64(z_lo, vc_hi);
            let l1 = _mm512_mullo_epi64(z_lo, vc_hi);
            let h2 = mul_hi_64(z_hi, vc_lo);
            let l2 = _mm512_mullo_epi64(z_hi, vc_lo);

            let (s, carry1) = add_carry(l1, l2);
            let (_, carry2) = add_carry(s, t1);
            let s_hi = _mm512_add_epi64(
                _mm512_add_epi64(h1, h2),
                _mm512_add_epi64(carry1, carry2),
            );
            let q_est = _mm512_add_epi64(_mm512_mullo_epi64(z_hi, vc_hi), s_hi);

            // r = z - q_est * q in [0, 2q), valid mod 2^64.
            let r = _mm512_sub_epi64(z_lo, _mm512_mullo_epi64(q_est, vq));
            _mm512_storeu_epi64(value_ptr as *mut i64, small_mod(r, vq));

            value_ptr = value_ptr.add(8);
            other_ptr = other_ptr.add(8);
        }
    }
}

/// Forward transform with 64-bit lazy butterflies, eight per iteration.
/// Layers narrower than a vector fall back to the scalar butterfly.
#[target_feature(enable = "avx512f,avx512dq")]
pub(crate) fn forward_transform(
    elements: &mut [u64],
    modulus: u64,
    roots: &[u64],
    precon_roots: &[u64],
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
                    let vw_precon = splat(precon_roots[m + i]);
                    let x_base = elements.as_mut_ptr().add(j1);
                    let y_base = x_base.add(t);
                    for k in 0..t / 8 {
                        let x_ptr = x_base.add(8 * k);
                        let y_ptr = y_base.add(8 * k);
                        let vx = _mm512_loadu_epi64(x_ptr as *const i64);
                        let vy = _mm512_loadu_epi64(y_ptr as *const i64);
                        let vtx = small_mod(vx, vq2);
                        let vt = mul_mod_lazy_64(vy, vw, vw_precon, vq);
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
            ntt::forward_layer::<64>(elements, roots, precon_roots, m, t, modulus);
        }
        t >>= 1;
        m <<= 1;
    }
    if output_mod_factor == 1 {
        reduce_four_to_canonical(elements, modulus);
    }
}

/// Inverse transform with 64-bit lazy butterflies; the final layer is fused
/// with the `1/n` scaling.
#[target_feature(enable = "avx512f,avx512dq")]
pub(crate) fn inverse_transform(
    elements: &mut [u64],
    modulus: u64,
    inv_roots: &[u64],
    precon_inv_roots: &[u64],
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
                    let vw_precon = splat(precon_inv_roots[root_index]);
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
                            mul_mod_lazy_64(vty, vw, vw_precon, vq),
                        );
                    }
                    j1 += 2 * t;
                }
            }
        } else {
            root_index = ntt::inverse_layer::<64>(
                elements,
                inv_roots,
                precon_inv_roots,
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
                mul_mod_lazy_64(vtx, v_inv_n, v_inv_n_precon, vq),
            );
            _mm512_storeu_epi64(
                y_ptr as *mut i64,
                mul_mod_lazy_64(vty, v_inv_nw, v_inv_nw_precon, vq),
            );
        }
    }

    if output_mod_factor == 1 {
        reduce_two_to_canonical(elements, modulus);
    }
}

/// Maps `[0, 4q)` to `[0, q)`; the length must be a multiple of 8.
#[target_feature(enable = "avx512f,avx512dq")]
fn reduce_four_to_canonical(elements: &mut [u64], modulus: u64) {
    unsafe {
        let vq = splat(modulus);
        let vq2 = splat(modulus << 1);
        let mut ptr = elements.as_mut_ptr();
        for _ in 0..elements.len() / 8 {
            let v = _mm512_loadu_epi64(ptr as *const i64);
            _mm512_storeu_epi64(ptr as *mut i64, small_mod(small_mod(v, vq2), vq));
            ptr = ptr.add(8);
        }
    }
}

/// Maps `[0, 2q)` to `[0, q)`; the length must be a multiple of 8.
#[target_feature(enable = "avx512f,avx512dq")]
fn reduce_two_to_canonical(elements: &mut [u64], modulus: u64) {
    unsafe {
        let vq = splat(modulus);
        let mut ptr = elements.as_mut_ptr();
        for _ in 0..elements.len() / 8 {
            let v = _mm512_loadu_epi64(ptr as *const i64);
            _mm512_storeu_epi64(ptr as *mut i64, small_mod(v, vq));
            ptr = ptr.add(8);
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
        if !simd::features().avx512dq {
            return;
        }
        let modulus = generate_primes(1, 60, 1024).unwrap()[0];
        let mut state = 0x9e37_79b9_7f4a_7c15u64;

        for len in [1usize, 7, 8, 9, 16, 173] {
            let a: Vec<u64> = (0..len).map(|_| xorshift(&mut state) % modulus).collect();
            let b: Vec<u64> = (0..len).map(|_| xorshift(&mut state) % modulus).collect();

            let mut expected = a.clone();
            eltwise::native::sub_mod_in_place(&mut expected, &b, modulus);
            let mut got = a.clone();
            unsafe { sub_mod_in_place(&mut got, &b, modulus) };
            assert_eq!(got, expected, "sub_mod len {len}");

            let mut expected = a.clone();
            eltwise::native::multiply_mod_in_place(&mut expected, &b, modulus);
            let mut got = a.clone();
            let factor = BarrettFactor::<64>::new(modulus);
            unsafe { multiply_mod_in_place(&mut got, &b, &factor, modulus) };
            assert_eq!(got, expected, "multiply_mod len {len}");

            let scalar = MultiplyFactor::new(b[0], 64, modulus);
            let mut expected = a.clone();
            eltwise::native::fma_mod_in_place::<64>(&mut expected, &scalar, Some(&b), modulus);
            let mut got = a.clone();
            unsafe { fma_mod_in_place(&mut got, &scalar, Some(&b), modulus) };
            assert_eq!(got, expected, "fma_mod len {len}");
        }
    }

    #[test]
    fn transforms_match_scalar_engine() {
        if !simd::features().avx512dq {
            return;
        }
        let modulus = generate_primes(1, 60, 64).unwrap()[0];
        let tables = crate::NttTables::new(64, modulus).unwrap();
        let mut state = 42u64;
        let original: Vec<u64> = (0..64).map(|_| xorshift(&mut state) % modulus).collect();

        let mut scalar = original.clone();
        tables.forward_scalar(&mut scalar, 2, 1);
        let mut vector = original.clone();
        unsafe {
            forward_transform(
                &mut vector,
                modulus,
                tables.root_of_unity_powers(),
                tables.precon64_root_of_unity_powers(),
                1,
            );
        }
        assert_eq!(vector, scalar);

        let mut scalar_inv = scalar.clone();
        tables.inverse_scalar(&mut scalar_inv, 1, 1);
        assert_eq!(scalar_inv, original);

        let (inv_degree, inv_degree_w) = tables.inv_degree_factors(64);
        let mut vector_inv = vector.clone();
        unsafe {
            inverse_transform(
                &mut vector_inv,
                modulus,
                tables.inv_root_of_unity_powers(),
                tables.precon64_inv_root_of_unity_powers(),
                inv_degree,
                inv_degree_w,
                1,
            );
        }
        assert_eq!(vector_inv, original);
    }
}
