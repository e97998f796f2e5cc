//! Errors surfaced by table construction and number-theoretic searches.

/// Errors that can occur while building NTT tables or searching for primes
/// and primitive roots.
///
/// The first group of variants are precondition violations (caller passed
/// arguments outside the documented domain); the last two are resource
/// failures (a bounded search ran out of candidates). Transform entry points
/// do not return errors: their preconditions are validated with assertions,
/// and element bounds are only checked in debug builds.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("degree {0} is not a power of two")]
    DegreeNotPowerOfTwo(u64),

    #[error("degree {0} is outside the supported range [2, 2^17]")]
    DegreeOutOfRange(u64),

    #[error("modulus {0} is not prime")]
    ModulusNotPrime(u64),

    #[error("modulus {0} is outside the supported range [2, 2^62)")]
    ModulusOutOfRange(u64),

    #[error("modulus {modulus} is not congruent to 1 mod 2*{degree}")]
    CongruenceViolated { modulus: u64, degree: u64 },

    #[error("{root} is not a primitive {degree}th root of unity mod {modulus}")]
    NotPrimitiveRoot {
        root: u64,
        degree: u64,
        modulus: u64,
    },

    #[error("{0} has no inverse mod {1}")]
    NotInvertible(u64, u64),

    #[error("no primitive {degree}th root of unity found mod {modulus}")]
    PrimitiveRootNotFound { degree: u64, modulus: u64 },

    #[error("found only {found} of {requested} primes with {bit_size} bits")]
    NotEnoughPrimes {
        requested: usize,
        found: usize,
        bit_size: u64,
    },
}
