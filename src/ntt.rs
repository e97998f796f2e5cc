//! Negacyclic number-theoretic transform over `Z_q`.
//!
//! [`NttTables`] precomputes, for a `(degree, modulus)` pair, the powers of a
//! primitive `2n`-th root of unity in bit-reversed order together with their
//! Barrett-preconditioned shadows (both 52- and 64-bit), and drives the
//! forward (decimation-in-time, bit-reversed output) and inverse
//! (Gentleman-Sande, bit-reversed input) transforms.
//!
//! The transforms use Harvey's lazy butterfly: forward values live in
//! `[0, 4q)` between layers, inverse values in `[0, 2q)`. The
//! `input_mod_factor` / `output_mod_factor` arguments declare which multiple
//! of `q` bounds the caller's representatives; see the table on
//! [`NttTables::forward`].

use crate::aligned::AlignedTable;
use crate::arith::{
    self, inv_mod, is_primitive_root, minimal_primitive_root, mul_mod, mul_mod_lazy, reverse_bits,
    MultiplyFactor,
};
use crate::error::Error;
use crate::simd::{self, Kernel};
use crate::{
    DEFAULT_BIT_SHIFT, IFMA_BIT_SHIFT, MAX_DEGREE_BITS, MAX_FWD_IFMA_MODULUS,
    MAX_INV_IFMA_MODULUS, MAX_MODULUS_BITS,
};

/// Precomputed twiddle tables for one `(degree, modulus)` pair.
///
/// Construction is the expensive step; the tables are immutable afterwards
/// and safe to share between threads, each caller supplying its own element
/// buffer.
#[derive(Debug, Clone)]
pub struct NttTables {
    degree: u64,
    degree_bits: u64,
    modulus: u64,
    root_of_unity: u64,
    inv_root_of_unity: u64,
    fwd_bit_shift: u32,
    inv_bit_shift: u32,
    fwd_kernel: Kernel,
    inv_kernel: Kernel,
    root_of_unity_powers: AlignedTable,
    precon52_root_of_unity_powers: AlignedTable,
    precon64_root_of_unity_powers: AlignedTable,
    inv_root_of_unity_powers: AlignedTable,
    precon52_inv_root_of_unity_powers: AlignedTable,
    precon64_inv_root_of_unity_powers: AlignedTable,
    inv_degree: MultiplyFactor,
    inv_degree_ifma: MultiplyFactor,
    inv_degree_w: MultiplyFactor,
    inv_degree_w_ifma: MultiplyFactor,
}

fn check_arguments(degree: u64, modulus: u64) -> Result<(), Error> {
    if !arith::is_power_of_two(degree) {
        return Err(Error::DegreeNotPowerOfTwo(degree));
    }
    if degree < 2 || degree > 1 << MAX_DEGREE_BITS {
        return Err(Error::DegreeOutOfRange(degree));
    }
    if modulus >= 1 << MAX_MODULUS_BITS {
        return Err(Error::ModulusOutOfRange(modulus));
    }
    if modulus % (2 * degree) != 1 {
        return Err(Error::CongruenceViolated { modulus, degree });
    }
    if !arith::is_prime(modulus) {
        return Err(Error::ModulusNotPrime(modulus));
    }
    Ok(())
}

impl NttTables {
    /// Builds tables for `degree` and `modulus`, choosing the minimal
    /// primitive `2*degree`-th root of unity.
    pub fn new(degree: u64, modulus: u64) -> Result<Self, Error> {
        check_arguments(degree, modulus)?;
        let root = minimal_primitive_root(2 * degree, modulus)?;
        Self::build(degree, modulus, root)
    }

    /// Builds tables around a caller-supplied primitive `2*degree`-th root
    /// of unity. Use this when the table contents must be reproducible.
    pub fn with_root(degree: u64, modulus: u64, root_of_unity: u64) -> Result<Self, Error> {
        check_arguments(degree, modulus)?;
        if !is_primitive_root(root_of_unity, 2 * degree, modulus) {
            return Err(Error::NotPrimitiveRoot {
                root: root_of_unity,
                degree: 2 * degree,
                modulus,
            });
        }
        Self::build(degree, modulus, root_of_unity)
    }

    fn build(degree: u64, modulus: u64, root_of_unity: u64) -> Result<Self, Error> {
        let degree_bits = arith::log2(degree);
        let n = degree as usize;

        // R[bitrev(k)] = w^k, built as a chain of multiplies through the
        // bit-reversed index order.
        let mut root_of_unity_powers = AlignedTable::zeroed(n);
        let mut inv_powers_raw = vec![0u64; n];
        root_of_unity_powers[0] = 1;
        inv_powers_raw[0] = 1;
        let mut prev_idx = 0usize;
        for i in 1..n {
            let idx = reverse_bits(i as u64, degree_bits) as usize;
            root_of_unity_powers[idx] =
                mul_mod(root_of_unity_powers[prev_idx], root_of_unity, modulus);
            inv_powers_raw[idx] = inv_mod(root_of_unity_powers[idx], modulus)?;
            prev_idx = idx;
        }

        // The inverse transform consumes its table at a monotonically
        // increasing index, so reorder: identity first, then for
        // m = n/2, n/4, ..., 1 the block [m, 2m).
        let mut inv_root_of_unity_powers = AlignedTable::zeroed(n);
        inv_root_of_unity_powers[0] = inv_powers_raw[0];
        let mut idx = 1usize;
        let mut m = n >> 1;
        while m > 0 {
            for i in 0..m {
                inv_root_of_unity_powers[idx] = inv_powers_raw[m + i];
                idx += 1;
            }
            m >>= 1;
        }

        let precon = |table: &AlignedTable, bit_shift: u32| {
            AlignedTable::from_iter(
                n,
                table
                    .iter()
                    .map(|&r| MultiplyFactor::new(r, bit_shift, modulus).barrett_factor()),
            )
        };
        let precon64_root_of_unity_powers = precon(&root_of_unity_powers, 64);
        let precon52_root_of_unity_powers = precon(&root_of_unity_powers, 52);
        let precon64_inv_root_of_unity_powers = precon(&inv_root_of_unity_powers, 64);
        let precon52_inv_root_of_unity_powers = precon(&inv_root_of_unity_powers, 52);

        // Final inverse layer is fused with the 1/n scaling: it multiplies
        // by n^{-1} and n^{-1} * W, where W is the last root consumed.
        let inv_degree_value = inv_mod(degree, modulus)?;
        let last_root = inv_root_of_unity_powers[n - 1];
        let inv_degree_w_value = mul_mod(inv_degree_value, last_root, modulus);

        let fwd_bit_shift = if modulus < MAX_FWD_IFMA_MODULUS {
            IFMA_BIT_SHIFT
        } else {
            DEFAULT_BIT_SHIFT
        };
        let inv_bit_shift = if modulus < MAX_INV_IFMA_MODULUS {
            IFMA_BIT_SHIFT
        } else {
            DEFAULT_BIT_SHIFT
        };

        Ok(Self {
            degree,
            degree_bits,
            modulus,
            root_of_unity,
            inv_root_of_unity: inv_mod(root_of_unity, modulus)?,
            fwd_bit_shift,
            inv_bit_shift,
            fwd_kernel: simd::select_kernel(degree, fwd_bit_shift),
            inv_kernel: simd::select_kernel(degree, inv_bit_shift),
            root_of_unity_powers,
            precon52_root_of_unity_powers,
            precon64_root_of_unity_powers,
            inv_root_of_unity_powers,
            precon52_inv_root_of_unity_powers,
            precon64_inv_root_of_unity_powers,
            inv_degree: MultiplyFactor::new(inv_degree_value, 64, modulus),
            inv_degree_ifma: MultiplyFactor::new(inv_degree_value, 52, modulus),
            inv_degree_w: MultiplyFactor::new(inv_degree_w_value, 64, modulus),
            inv_degree_w_ifma: MultiplyFactor::new(inv_degree_w_value, 52, modulus),
        })
    }

    #[inline]
    #[must_use]
    pub const fn degree(&self) -> u64 {
        self.degree
    }

    #[inline]
    #[must_use]
    pub const fn degree_bits(&self) -> u64 {
        self.degree_bits
    }

    #[inline]
    #[must_use]
    pub const fn modulus(&self) -> u64 {
        self.modulus
    }

    #[inline]
    #[must_use]
    pub const fn root_of_unity(&self) -> u64 {
        self.root_of_unity
    }

    #[inline]
    #[must_use]
    pub const fn inv_root_of_unity(&self) -> u64 {
        self.inv_root_of_unity
    }

    /// Barrett width latched for the forward transform: 52 when the modulus
    /// is below the IFMA bound, else 64.
    #[inline]
    #[must_use]
    pub const fn fwd_bit_shift(&self) -> u32 {
        self.fwd_bit_shift
    }

    /// Barrett width latched for the inverse transform.
    #[inline]
    #[must_use]
    pub const fn inv_bit_shift(&self) -> u32 {
        self.inv_bit_shift
    }

    /// Powers of the root of unity in bit-reversed order; entry 0 is 1.
    #[inline]
    #[must_use]
    pub fn root_of_unity_powers(&self) -> &[u64] {
        &self.root_of_unity_powers
    }

    /// Inverse root powers in the interleaved order the inverse transform
    /// consumes.
    #[inline]
    #[must_use]
    pub fn inv_root_of_unity_powers(&self) -> &[u64] {
        &self.inv_root_of_unity_powers
    }

    #[inline]
    pub(crate) fn precon64_root_of_unity_powers(&self) -> &[u64] {
        &self.precon64_root_of_unity_powers
    }

    #[inline]
    pub(crate) fn precon52_root_of_unity_powers(&self) -> &[u64] {
        &self.precon52_root_of_unity_powers
    }

    #[inline]
    pub(crate) fn precon64_inv_root_of_unity_powers(&self) -> &[u64] {
        &self.precon64_inv_root_of_unity_powers
    }

    #[inline]
    pub(crate) fn precon52_inv_root_of_unity_powers(&self) -> &[u64] {
        &self.precon52_inv_root_of_unity_powers
    }

    /// Fused final-layer scaling factors (n^{-1}, n^{-1} * W) for the given
    /// bit shift.
    pub(crate) fn inv_degree_factors(&self, bit_shift: u32) -> (&MultiplyFactor, &MultiplyFactor) {
        if bit_shift == IFMA_BIT_SHIFT {
            (&self.inv_degree_ifma, &self.inv_degree_w_ifma)
        } else {
            (&self.inv_degree, &self.inv_degree_w)
        }
    }

    fn validate_forward(&self, elements: &[u64], input_mod_factor: u64, output_mod_factor: u64) {
        assert!(
            input_mod_factor == 2 || input_mod_factor == 4,
            "input_mod_factor must be 2 or 4; got {input_mod_factor}"
        );
        assert!(
            output_mod_factor == 1 || output_mod_factor == 4,
            "output_mod_factor must be 1 or 4; got {output_mod_factor}"
        );
        assert_eq!(
            elements.len(),
            self.degree as usize,
            "element count does not match transform degree"
        );
        debug_assert!(
            elements
                .iter()
                .all(|&x| x < self.modulus * input_mod_factor),
            "input element exceeds input_mod_factor * modulus"
        );
    }

    fn validate_inverse(&self, elements: &[u64], input_mod_factor: u64, output_mod_factor: u64) {
        assert!(
            input_mod_factor == 1 || input_mod_factor == 2,
            "input_mod_factor must be 1 or 2; got {input_mod_factor}"
        );
        assert!(
            output_mod_factor == 1 || output_mod_factor == 2,
            "output_mod_factor must be 1 or 2; got {output_mod_factor}"
        );
        assert_eq!(
            elements.len(),
            self.degree as usize,
            "element count does not match transform degree"
        );
        debug_assert!(
            elements
                .iter()
                .all(|&x| x < self.modulus * input_mod_factor),
            "input element exceeds input_mod_factor * modulus"
        );
    }

    /// In-place forward transform; output is in bit-reversed order.
    ///
    /// | direction | `input_mod_factor` | `output_mod_factor` |
    /// |---|---|---|
    /// | forward | 2, 4 | 1, 4 |
    /// | inverse | 1, 2 | 1, 2 |
    ///
    /// Inputs must lie in `[0, input_mod_factor * q)`; outputs lie in
    /// `[0, output_mod_factor * q)`.
    pub fn forward(&self, elements: &mut [u64], input_mod_factor: u64, output_mod_factor: u64) {
        self.validate_forward(elements, input_mod_factor, output_mod_factor);
        match self.fwd_kernel {
            #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
            Kernel::Ifma => {
                // SAFETY: the kernel was latched only after feature detection.
                unsafe {
                    simd::ifma::forward_transform(
                        elements,
                        self.modulus,
                        &self.root_of_unity_powers,
                        &self.precon52_root_of_unity_powers,
                        output_mod_factor,
                    );
                }
            }
            #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
            Kernel::Avx512 => {
                // SAFETY: as above.
                unsafe {
                    simd::avx512::forward_transform(
                        elements,
                        self.modulus,
                        &self.root_of_unity_powers,
                        &self.precon64_root_of_unity_powers,
                        output_mod_factor,
                    );
                }
            }
            _ => forward_transform_scalar(
                elements,
                self.modulus,
                &self.root_of_unity_powers,
                &self.precon64_root_of_unity_powers,
                output_mod_factor,
            ),
        }
    }

    /// Out-of-place [`NttTables::forward`].
    pub fn forward_into(
        &self,
        elements: &[u64],
        result: &mut [u64],
        input_mod_factor: u64,
        output_mod_factor: u64,
    ) {
        assert_eq!(elements.len(), result.len(), "operand length mismatch");
        result.copy_from_slice(elements);
        self.forward(result, input_mod_factor, output_mod_factor);
    }

    /// [`NttTables::forward`] pinned to the scalar engine, whatever the CPU
    /// supports. The dispatched engines produce identical outputs.
    pub fn forward_scalar(
        &self,
        elements: &mut [u64],
        input_mod_factor: u64,
        output_mod_factor: u64,
    ) {
        self.validate_forward(elements, input_mod_factor, output_mod_factor);
        forward_transform_scalar(
            elements,
            self.modulus,
            &self.root_of_unity_powers,
            &self.precon64_root_of_unity_powers,
            output_mod_factor,
        );
    }

    /// In-place inverse transform; input is in bit-reversed order. Includes
    /// the `1/n` scaling. See [`NttTables::forward`] for the mod-factor
    /// table.
    pub fn inverse(&self, elements: &mut [u64], input_mod_factor: u64, output_mod_factor: u64) {
        self.validate_inverse(elements, input_mod_factor, output_mod_factor);
        match self.inv_kernel {
            #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
            Kernel::Ifma => {
                // SAFETY: the kernel was latched only after feature detection.
                unsafe {
                    simd::ifma::inverse_transform(
                        elements,
                        self.modulus,
                        &self.inv_root_of_unity_powers,
                        &self.precon52_inv_root_of_unity_powers,
                        &self.inv_degree_ifma,
                        &self.inv_degree_w_ifma,
                        output_mod_factor,
                    );
                }
            }
            #[cfg(all(feature = "avx512", target_arch = "x86_64"))]
            Kernel::Avx512 => {
                // SAFETY: as above.
                unsafe {
                    simd::avx512::inverse_transform(
                        elements,
                        self.modulus,
                        &self.inv_root_of_unity_powers,
                        &self.precon64_inv_root_of_unity_powers,
                        &self.inv_degree,
                        &self.inv_degree_w,
                        output_mod_factor,
                    );
                }
            }
            _ => inverse_transform_scalar(
                elements,
                self.modulus,
                &self.inv_root_of_unity_powers,
                &self.precon64_inv_root_of_unity_powers,
                &self.inv_degree,
                &self.inv_degree_w,
                output_mod_factor,
            ),
        }
    }

    /// Out-of-place [`NttTables::inverse`].
    pub fn inverse_into(
        &self,
        elements: &[u64],
        result: &mut [u64],
        input_mod_factor: u64,
        output_mod_factor: u64,
    ) {
        assert_eq!(elements.len(), result.len(), "operand length mismatch");
        result.copy_from_slice(elements);
        self.inverse(result, input_mod_factor, output_mod_factor);
    }

    /// [`NttTables::inverse`] pinned to the scalar engine.
    pub fn inverse_scalar(
        &self,
        elements: &mut [u64],
        input_mod_factor: u64,
        output_mod_factor: u64,
    ) {
        self.validate_inverse(elements, input_mod_factor, output_mod_factor);
        inverse_transform_scalar(
            elements,
            self.modulus,
            &self.inv_root_of_unity_powers,
            &self.precon64_inv_root_of_unity_powers,
            &self.inv_degree,
            &self.inv_degree_w,
            output_mod_factor,
        );
    }
}

/// One forward butterfly layer: `m` groups of `t` butterflies.
///
/// X, Y in `[0, 4q)` map to `X + WY, X - WY` in `[0, 4q)` (Harvey).
pub(crate) fn forward_layer<const BIT_SHIFT: u32>(
    elements: &mut [u64],
    roots: &[u64],
    precon_roots: &[u64],
    m: usize,
    t: usize,
    modulus: u64,
) {
    let twice_modulus = modulus << 1;
    let mut j1 = 0;
    for i in 0..m {
        let w = roots[m + i];
        let w_precon = precon_roots[m + i];
        let (first, second) = elements[j1..j1 + 2 * t].split_at_mut(t);
        for (x, y) in first.iter_mut().zip(second.iter_mut()) {
            let tx = if *x >= twice_modulus {
                *x - twice_modulus
            } else {
                *x
            };
            let ty = mul_mod_lazy::<BIT_SHIFT>(*y, w, w_precon, modulus);
            *x = tx + ty;
            *y = tx + twice_modulus - ty;
        }
        j1 += 2 * t;
    }
}

/// One inverse butterfly layer; returns the advanced root index.
///
/// X, Y in `[0, 2q)` map to `X + Y, W(X - Y)` in `[0, 2q)`.
pub(crate) fn inverse_layer<const BIT_SHIFT: u32>(
    elements: &mut [u64],
    inv_roots: &[u64],
    precon_inv_roots: &[u64],
    m: usize,
    t: usize,
    mut root_index: usize,
    modulus: u64,
) -> usize {
    let twice_modulus = modulus << 1;
    let mut j1 = 0;
    for _ in 0..m {
        let w = inv_roots[root_index];
        let w_precon = precon_inv_roots[root_index];
        root_index += 1;
        let (first, second) = elements[j1..j1 + 2 * t].split_at_mut(t);
        for (x, y) in first.iter_mut().zip(second.iter_mut()) {
            let mut tx = *x + *y;
            let ty = *x + twice_modulus - *y;
            if tx >= twice_modulus {
                tx -= twice_modulus;
            }
            *x = tx;
            *y = mul_mod_lazy::<BIT_SHIFT>(ty, w, w_precon, modulus);
        }
        j1 += 2 * t;
    }
    root_index
}

/// Final inverse layer, fused with the `1/n` scaling.
pub(crate) fn inverse_final_layer<const BIT_SHIFT: u32>(
    elements: &mut [u64],
    inv_degree: &MultiplyFactor,
    inv_degree_w: &MultiplyFactor,
    modulus: u64,
) {
    let twice_modulus = modulus << 1;
    let half = elements.len() >> 1;
    let (first, second) = elements.split_at_mut(half);
    for (x, y) in first.iter_mut().zip(second.iter_mut()) {
        let mut tx = *x + *y;
        if tx >= twice_modulus {
            tx -= twice_modulus;
        }
        let ty = *x + twice_modulus - *y;
        *x = mul_mod_lazy::<BIT_SHIFT>(
            tx,
            inv_degree.operand(),
            inv_degree.barrett_factor(),
            modulus,
        );
        *y = mul_mod_lazy::<BIT_SHIFT>(
            ty,
            inv_degree_w.operand(),
            inv_degree_w.barrett_factor(),
            modulus,
        );
    }
}

pub(crate) fn forward_transform_scalar(
    elements: &mut [u64],
    modulus: u64,
    roots: &[u64],
    precon_roots: &[u64],
    output_mod_factor: u64,
) {
    let n = elements.len();
    let mut t = n >> 1;
    let mut m = 1;
    while m < n {
        forward_layer::<64>(elements, roots, precon_roots, m, t, modulus);
        t >>= 1;
        m <<= 1;
    }
    if output_mod_factor == 1 {
        let twice_modulus = modulus << 1;
        for el in elements.iter_mut() {
            if *el >= twice_modulus {
                *el -= twice_modulus;
            }
            if *el >= modulus {
                *el -= modulus;
            }
        }
    }
}

pub(crate) fn inverse_transform_scalar(
    elements: &mut [u64],
    modulus: u64,
    inv_roots: &[u64],
    precon_inv_roots: &[u64],
    inv_degree: &MultiplyFactor,
    inv_degree_w: &MultiplyFactor,
    output_mod_factor: u64,
) {
    let n = elements.len();
    let mut t = 1;
    let mut m = n >> 1;
    let mut root_index = 1;
    while m > 1 {
        root_index =
            inverse_layer::<64>(elements, inv_roots, precon_inv_roots, m, t, root_index, modulus);
        t <<= 1;
        m >>= 1;
    }
    inverse_final_layer::<64>(elements, inv_degree, inv_degree_w, modulus);
    if output_mod_factor == 1 {
        for el in elements.iter_mut() {
            if *el >= modulus {
                *el -= modulus;
            }
        }
    }
}

/// Forward transform written for clarity rather than performance: no lazy
/// reduction, canonical `[0, q)` inputs and outputs.
///
/// `roots` are the bit-reversed powers of the `2n`-th root of unity (see
/// [`NttTables::root_of_unity_powers`]). Agrees with the lazy forward
/// transform modulo `q` on every element.
pub fn reference_forward(elements: &mut [u64], modulus: u64, roots: &[u64]) {
    let n = elements.len();
    debug_assert!(arith::is_power_of_two(n as u64));
    debug_assert_eq!(n, roots.len());
    debug_assert!(elements.iter().all(|&x| x < modulus));

    let mut t = n >> 1;
    let mut m = 1;
    while m < n {
        let mut j1 = 0;
        for i in 0..m {
            let w = roots[m + i];
            let (first, second) = elements[j1..j1 + 2 * t].split_at_mut(t);
            for (x, y) in first.iter_mut().zip(second.iter_mut()) {
                let w_times_y = mul_mod(*y, w, modulus);
                let tx = *x;
                *x = arith::add_mod(tx, w_times_y, modulus);
                *y = arith::sub_mod(tx, w_times_y, modulus);
            }
            j1 += 2 * t;
        }
        t >>= 1;
        m <<= 1;
    }
}
