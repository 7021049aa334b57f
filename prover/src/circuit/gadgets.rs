//! R1CS gadgets mirroring the native commitment primitives.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_ff::{BigInteger, One, PrimeField};
use ark_r1cs_std::boolean::Boolean;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::FieldVar;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

/// Window exponent for signed magnitude recovery. Balances are folded
/// into `[0, 2^68)` by adding `2^66`; bit 66 of the shifted value is the
/// sign of the original.
const SIGN_BIAS_EXP: u32 = 66;
const SIGN_WINDOW_BITS: usize = 68;

/// Poseidon over an ordered list of variables. Must stay input-for-input
/// identical to `commitment::hash_fields`.
pub fn hash_vars(
    cs: ConstraintSystemRef<Fr>,
    config: &PoseidonConfig<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, config);
    for input in inputs {
        sponge.absorb(input)?;
    }
    Ok(sponge.squeeze_field_elements(1)?.remove(0))
}

/// Decompose `value` into `n` little-endian bits and constrain the
/// recomposition, proving `value < 2^n`. The constraint-system analogue
/// of a fixed-width binary decomposition.
pub fn to_bits_bounded(
    value: &FpVar<Fr>,
    n: usize,
) -> Result<Vec<Boolean<Fr>>, SynthesisError> {
    let cs = value.cs();
    let assigned = value.value().ok();
    let mut bits = Vec::with_capacity(n);
    for i in 0..n {
        bits.push(Boolean::new_witness(cs.clone(), || {
            assigned
                .map(|v| v.into_bigint().get_bit(i))
                .ok_or(SynthesisError::AssignmentMissing)
        })?);
    }
    let mut recomposed = FpVar::<Fr>::zero();
    let mut coeff = Fr::one();
    for bit in &bits {
        recomposed += FpVar::from(bit.clone()) * FpVar::constant(coeff);
        coeff = coeff + coeff;
    }
    recomposed.enforce_equal(value)?;
    Ok(bits)
}

/// Range-check a value to a fixed bit width.
pub fn enforce_bit_width(value: &FpVar<Fr>, n: usize) -> Result<(), SynthesisError> {
    to_bits_bounded(value, n).map(|_| ())
}

/// Magnitude of a signed field encoding: shift by the bias, decompose,
/// read the sign bit, conditionally negate. The decomposition also bounds
/// the encoded value to the `(-2^66, 2^66)` window.
pub fn absolute_value(value: &FpVar<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    let bias = FpVar::constant(Fr::from(2u128.pow(SIGN_BIAS_EXP)));
    let shifted = value + &bias;
    let bits = to_bits_bounded(&shifted, SIGN_WINDOW_BITS)?;
    let non_negative = bits[SIGN_BIAS_EXP as usize].clone();
    let negated = value.negate()?;
    FpVar::conditionally_select(&non_negative, value, &negated)
}

/// Fold a leaf up a sibling path. Index bit i decides whether the running
/// node is the right (bit set) or left child at level i.
pub fn fold_merkle_path(
    cs: ConstraintSystemRef<Fr>,
    config: &PoseidonConfig<Fr>,
    leaf: &FpVar<Fr>,
    path: &[FpVar<Fr>],
    index_bits: &[Boolean<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    debug_assert_eq!(path.len(), index_bits.len());
    let mut node = leaf.clone();
    for (sibling, bit) in path.iter().zip(index_bits) {
        let left = FpVar::conditionally_select(bit, sibling, &node)?;
        let right = FpVar::conditionally_select(bit, &node, sibling)?;
        node = hash_vars(cs.clone(), config, &[left, right])?;
    }
    Ok(node)
}
