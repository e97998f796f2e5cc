//! `ntt-rs` — negacyclic number-theoretic transforms and element-wise
//! modular arithmetic over word-sized prime fields.
//!
//! The workhorse is [`NttTables`]: for a degree `n` (a power of two) and a
//! prime `q` with `q == 1 mod 2n`, it precomputes bit-reversed root-of-unity
//! power tables with Barrett-preconditioned shadows and runs the forward and
//! inverse transforms with Harvey's lazy butterfly. [`eltwise`] carries the
//! element-wise kernels (subtract, fused multiply-add, multiply) used
//! between transforms, and [`arith`] the scalar substrate underneath both.
//!
//! # Design notes
//!
//! - **Runtime dispatch**: every kernel exists as a scalar reference, an
//!   AVX512-DQ 8-lane variant, and (for moduli small enough) an AVX512-IFMA
//!   52-bit variant. The engine is picked once per table from a
//!   process-wide CPU feature mask ([`simd::features`]); element buffers
//!   are caller-owned and the hot paths allocate nothing.
//! - **Lazy reduction is part of the API**: the `input_mod_factor` /
//!   `output_mod_factor` arguments declare which multiple of `q` bounds a
//!   buffer's representatives, letting transform outputs feed back in
//!   without an intervening canonical reduction.
//! - **Not constant-time**: reductions branch on the data. Do not use this
//!   crate where timing side channels matter.
//!
//! # Example
//!
//! ```
//! use ntt_rs::NttTables;
//!
//! let tables = NttTables::new(8, 769)?;
//! let mut data: Vec<u64> = (0..8).collect();
//! tables.forward(&mut data, 2, 1);
//! tables.inverse(&mut data, 1, 1);
//! assert_eq!(data, (0..8).collect::<Vec<u64>>());
//! # Ok::<(), ntt_rs::Error>(())
//! ```

mod aligned;
pub mod arith;
pub mod eltwise;
mod error;
pub mod ntt;
pub mod simd;

pub use error::Error;
pub use ntt::{reference_forward, NttTables};

/// Largest supported transform degree is `2^MAX_DEGREE_BITS`.
pub const MAX_DEGREE_BITS: u32 = 17;

/// Moduli must stay below `2^MAX_MODULUS_BITS` so `[0, 4q)` fits in a word.
pub const MAX_MODULUS_BITS: u32 = 62;

/// Barrett precondition width of the default (64-bit) path.
pub const DEFAULT_BIT_SHIFT: u32 = 64;

/// Barrett precondition width of the AVX512-IFMA path.
pub const IFMA_BIT_SHIFT: u32 = 52;

/// Largest modulus the 52-bit forward transform accepts: `[0, 4q)`
/// representatives must stay below 2^52.
pub const MAX_FWD_IFMA_MODULUS: u64 = 1 << (IFMA_BIT_SHIFT - 2);

/// Largest modulus the 52-bit inverse transform accepts; one bit tighter
/// than the forward bound for the fused final-layer scaling.
pub const MAX_INV_IFMA_MODULUS: u64 = 1 << (IFMA_BIT_SHIFT - 3);

/// Largest modulus the 52-bit element-wise multiply accepts.
pub const MAX_IFMA_MODULUS: u64 = 1 << (IFMA_BIT_SHIFT - 2);

/// Transforms below this degree always run scalar; vector setup would
/// dominate.
pub(crate) const MIN_SIMD_DEGREE: usize = 16;
