//! Element-wise kernel semantics, plus dispatched-vs-native byte equality
//! over the full modulus bit range with a tail-exposing length.

use ntt_rs::arith::{generate_primes, BarrettFactor};
use ntt_rs::eltwise::{self, native};
use rand::Rng;

/// 173 = 8 * 21 + 5, so the vector engines must take their scalar-tail path.
const MATCH_LENGTH: usize = 173;

fn random_vec(len: usize, modulus: u64) -> Vec<u64> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random_range(0..modulus)).collect()
}

#[test]
fn sub_mod_vector_vector() {
    let mut op1 = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
    let op2 = vec![1u64, 3, 5, 7, 9, 4, 4, 6];
    eltwise::sub_mod_in_place(&mut op1, &op2, 10);
    assert_eq!(op1, vec![0, 9, 8, 7, 6, 2, 3, 2]);
}

#[test]
fn sub_mod_vector_scalar() {
    let op1 = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
    let mut out = vec![0u64; 8];
    eltwise::sub_mod_scalar(&mut out, &op1, 3, 10);
    assert_eq!(out, vec![8, 9, 0, 1, 2, 3, 4, 5]);
}

#[test]
fn fma_mod_scalar_with_addend() {
    let modulus = 101u64;
    let op1: Vec<u64> = (1..=16).collect();
    let addend: Vec<u64> = (2..=17).collect();
    let mut out = vec![0u64; 16];
    eltwise::fma_mod(&mut out, &op1, 3, Some(&addend), modulus);
    for i in 0..16 {
        assert_eq!(out[i], (3 * op1[i] + addend[i]) % modulus);
    }
}

#[test]
fn multiply_mod_wraps_at_48_bit_prime() {
    let modulus = generate_primes(1, 48, 1024).unwrap()[0];
    let mut op1 = vec![modulus - 3, 1, 1, 1, 1, 1, 1, 1];
    let op2 = vec![modulus - 4, 1, 1, 1, 1, 1, 1, 1];
    eltwise::multiply_mod_in_place(&mut op1, &op2, modulus);
    assert_eq!(op1, vec![12, 1, 1, 1, 1, 1, 1, 1]);
}

#[test]
fn multiply_mod_known_products() {
    let modulus = 281474976749569u64; // first 48-bit prime = 1 mod 2048
    let mut op1 = vec![(modulus - 1) / 2, 1, 1, 1, 1, 1, 1, 1];
    let op2 = vec![(modulus + 1) / 2, 1, 1, 1, 1, 1, 1, 1];
    eltwise::multiply_mod_in_place(&mut op1, &op2, modulus);
    assert_eq!(op1, vec![70368744187392, 1, 1, 1, 1, 1, 1, 1]);
}

#[test]
fn dispatched_sub_mod_matches_native_full_bit_range() {
    for bits in 2..=62u32 {
        // Odd modulus just above 2^(bits-1); covers every operand width.
        let modulus = (1u64 << (bits - 1)) | 1;
        let mut a = random_vec(MATCH_LENGTH, modulus);
        a[0] = modulus - 1;
        let mut b = random_vec(MATCH_LENGTH, modulus);
        b[0] = modulus - 1;

        let mut expected = a.clone();
        native::sub_mod_in_place(&mut expected, &b, modulus);
        let mut got = a.clone();
        eltwise::sub_mod_in_place(&mut got, &b, modulus);
        assert_eq!(got, expected, "sub_mod mismatch at {bits} bits");
        assert_eq!(got[0], 0);

        let scalar = b[1];
        let mut expected = a.clone();
        native::sub_mod_scalar_in_place(&mut expected, scalar, modulus);
        let mut got = a.clone();
        eltwise::sub_mod_scalar_in_place(&mut got, scalar, modulus);
        assert_eq!(got, expected, "sub_mod_scalar mismatch at {bits} bits");
    }
}

#[test]
fn dispatched_multiply_and_fma_match_native_full_bit_range() {
    for bits in 2..=62u32 {
        let modulus = (1u64 << (bits - 1)) | 1;
        let a = random_vec(MATCH_LENGTH, modulus);
        let b = random_vec(MATCH_LENGTH, modulus);

        let mut expected = a.clone();
        native::multiply_mod_in_place(&mut expected, &b, modulus);
        let mut got = a.clone();
        eltwise::multiply_mod_in_place(&mut got, &b, modulus);
        assert_eq!(got, expected, "multiply_mod mismatch at {bits} bits");

        let scalar = b[0];
        let mut expected_fma = a.clone();
        eltwise::fma_mod_in_place(&mut expected_fma, scalar, Some(&b), modulus);
        for (i, &e) in expected_fma.iter().enumerate() {
            let wide = (a[i] as u128 * scalar as u128 + b[i] as u128) % modulus as u128;
            assert_eq!(e as u128, wide, "fma_mod wrong at {bits} bits index {i}");
        }
    }
}

#[test]
fn cached_barrett_factor_overloads_match_plain_calls() {
    let modulus = generate_primes(1, 48, 1024).unwrap()[0];
    let a = random_vec(MATCH_LENGTH, modulus);
    let b = random_vec(MATCH_LENGTH, modulus);

    let mut expected = a.clone();
    eltwise::multiply_mod_in_place(&mut expected, &b, modulus);

    let factor64 = BarrettFactor::<64>::new(modulus);
    let mut got = a.clone();
    eltwise::multiply_mod_barrett64(&mut got, &b, &factor64, modulus);
    assert_eq!(got, expected);

    let factor52 = BarrettFactor::<52>::new(modulus);
    let mut got = a.clone();
    eltwise::multiply_mod_barrett52(&mut got, &b, &factor52, modulus);
    assert_eq!(got, expected);
}

#[test]
fn out_of_place_kernels_match_in_place() {
    let modulus = generate_primes(1, 50, 1024).unwrap()[0];
    let a = random_vec(MATCH_LENGTH, modulus);
    let b = random_vec(MATCH_LENGTH, modulus);

    let mut in_place = a.clone();
    eltwise::sub_mod_in_place(&mut in_place, &b, modulus);
    let mut out = vec![0u64; MATCH_LENGTH];
    eltwise::sub_mod(&mut out, &a, &b, modulus);
    assert_eq!(out, in_place);

    let mut in_place = a.clone();
    eltwise::multiply_mod_in_place(&mut in_place, &b, modulus);
    let mut out = vec![0u64; MATCH_LENGTH];
    eltwise::multiply_mod(&mut out, &a, &b, modulus);
    assert_eq!(out, in_place);

    let scalar = b[7];
    let mut in_place = a.clone();
    eltwise::fma_mod_in_place(&mut in_place, scalar, Some(&b), modulus);
    let mut out = vec![0u64; MATCH_LENGTH];
    eltwise::fma_mod(&mut out, &a, scalar, Some(&b), modulus);
    assert_eq!(out, in_place);
}
