//! The batch-insertion circuit.
//!
//! Proves, for one public group commitment, that a private batch
//! transition is internally consistent: every account was inserted into
//! a previously empty leaf, the roots chain, the ledger commitments
//! re-derive from the folded balances, and the running totals stay
//! solvent after every single instruction.
//!
//! Public input (1 field element):
//! 1. group_commitment
//!
//! Private witness: before/after tree roots, before/after ledger
//! commitments, the dense pre-batch ledger, the aggregate totals, and
//! one instruction per batch slot.

use core::cmp::Ordering;

use ark_bn254::Fr;
use ark_r1cs_std::eq::EqGadget;
use ark_r1cs_std::fields::FieldVar;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use reserva_types::{BatchTransition, Error, Result, TREE_DEPTH};

use crate::circuit::gadgets::{
    absolute_value, enforce_bit_width, fold_merkle_path, hash_vars, to_bits_bounded,
};
use crate::commitment::{empty_leaf, fr_from_bytes, signed_fr};
use crate::poseidon::poseidon_config;

/// Assigned values for one instruction slot.
#[derive(Clone, Debug)]
pub struct InstructionAssignment {
    pub before_root: Fr,
    pub after_root: Fr,
    pub account_index: Fr,
    pub id_hash: Fr,
    pub equity: Fr,
    pub debt: Fr,
    /// Dense signed-encoded asset deltas, schema width.
    pub assets: Vec<Fr>,
    pub path: Vec<Fr>,
}

/// Assigned values for one proof.
#[derive(Clone, Debug)]
pub struct BatchAssignment {
    pub before_root: Fr,
    pub after_root: Fr,
    pub before_commitment: Fr,
    pub after_commitment: Fr,
    pub before_ledger: Vec<Fr>,
    pub before_equity: Fr,
    pub before_debt: Fr,
    pub after_equity: Fr,
    pub after_debt: Fr,
    pub instructions: Vec<InstructionAssignment>,
}

impl BatchAssignment {
    pub fn from_transition(batch: &BatchTransition) -> Result<Self> {
        let width = batch.before_ledger.len();
        let mut instructions = Vec::with_capacity(batch.instructions.len());
        for instr in &batch.instructions {
            if instr.assets.len() != width {
                return Err(Error::Constraint(format!(
                    "instruction {} asset width {} does not match ledger width {width}",
                    instr.account_index,
                    instr.assets.len()
                )));
            }
            if instr.path.len() != TREE_DEPTH {
                return Err(Error::Constraint(format!(
                    "instruction {} path depth {} (expected {TREE_DEPTH})",
                    instr.account_index,
                    instr.path.len()
                )));
            }
            instructions.push(InstructionAssignment {
                before_root: fr_from_bytes(&instr.before_root),
                after_root: fr_from_bytes(&instr.after_root),
                account_index: Fr::from(instr.account_index as u64),
                id_hash: fr_from_bytes(&instr.id_hash),
                equity: Fr::from(instr.equity),
                debt: Fr::from(instr.debt),
                assets: instr.assets.iter().map(|b| signed_fr(*b)).collect(),
                path: instr.path.iter().map(fr_from_bytes).collect(),
            });
        }
        Ok(BatchAssignment {
            before_root: fr_from_bytes(&batch.before_root),
            after_root: fr_from_bytes(&batch.after_root),
            before_commitment: fr_from_bytes(&batch.before_commitment),
            after_commitment: fr_from_bytes(&batch.after_commitment),
            before_ledger: batch.before_ledger.iter().map(|b| signed_fr(*b)).collect(),
            before_equity: Fr::from(batch.before_totals.equity),
            before_debt: Fr::from(batch.before_totals.debt),
            after_equity: Fr::from(batch.after_totals.equity),
            after_debt: Fr::from(batch.after_totals.debt),
            instructions,
        })
    }
}

/// The circuit. Instantiated blank (shape only) for key generation and
/// with an assignment for proving. Pure constraint declaration: no I/O,
/// no state.
#[derive(Clone)]
pub struct BatchCircuit {
    pub asset_count: usize,
    pub batch_size: usize,
    pub group_commitment: Option<Fr>,
    pub assignment: Option<BatchAssignment>,
}

impl BatchCircuit {
    /// Shape-only instance for circuit-specific setup.
    pub fn blank(asset_count: usize, batch_size: usize) -> Self {
        BatchCircuit {
            asset_count,
            batch_size,
            group_commitment: None,
            assignment: None,
        }
    }

    /// Full instance for proving one decoded batch transition.
    pub fn new(batch: &BatchTransition) -> Result<Self> {
        Ok(BatchCircuit {
            asset_count: batch.before_ledger.len(),
            batch_size: batch.instructions.len(),
            group_commitment: Some(fr_from_bytes(&batch.group_commitment)),
            assignment: Some(BatchAssignment::from_transition(batch)?),
        })
    }
}

struct InstructionVars {
    before_root: FpVar<Fr>,
    after_root: FpVar<Fr>,
    account_index: FpVar<Fr>,
    id_hash: FpVar<Fr>,
    equity: FpVar<Fr>,
    debt: FpVar<Fr>,
    assets: Vec<FpVar<Fr>>,
    path: Vec<FpVar<Fr>>,
}

impl ConstraintSynthesizer<Fr> for BatchCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> core::result::Result<(), SynthesisError> {
        if self.batch_size == 0 || self.asset_count == 0 {
            return Err(SynthesisError::Unsatisfiable);
        }
        let config = poseidon_config();
        let asg = self.assignment;

        let witness = |cs: ConstraintSystemRef<Fr>, value: Option<Fr>| {
            FpVar::new_witness(cs, || value.ok_or(SynthesisError::AssignmentMissing))
        };

        // Public input.
        let group = FpVar::new_input(cs.clone(), || {
            self.group_commitment.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let before_root = witness(cs.clone(), asg.as_ref().map(|a| a.before_root))?;
        let after_root = witness(cs.clone(), asg.as_ref().map(|a| a.after_root))?;
        let before_commitment = witness(cs.clone(), asg.as_ref().map(|a| a.before_commitment))?;
        let after_commitment = witness(cs.clone(), asg.as_ref().map(|a| a.after_commitment))?;

        // 1. The public commitment binds the roots and ledger commitments.
        let computed_group = hash_vars(
            cs.clone(),
            &config,
            &[
                before_root.clone(),
                after_root.clone(),
                before_commitment.clone(),
                after_commitment.clone(),
            ],
        )?;
        computed_group.enforce_equal(&group)?;

        // 2. The before-commitment opens to the dense pre-batch ledger.
        let mut ledger = Vec::with_capacity(self.asset_count);
        for j in 0..self.asset_count {
            ledger.push(witness(
                cs.clone(),
                asg.as_ref().map(|a| a.before_ledger[j]),
            )?);
        }
        let ledger_magnitudes = ledger
            .iter()
            .map(absolute_value)
            .collect::<core::result::Result<Vec<_>, _>>()?;
        let computed_before = hash_vars(cs.clone(), &config, &ledger_magnitudes)?;
        computed_before.enforce_equal(&before_commitment)?;

        // Running copies folded instruction by instruction.
        let mut after_ledger = ledger;

        let before_equity = witness(cs.clone(), asg.as_ref().map(|a| a.before_equity))?;
        let before_debt = witness(cs.clone(), asg.as_ref().map(|a| a.before_debt))?;
        let after_equity = witness(cs.clone(), asg.as_ref().map(|a| a.after_equity))?;
        let after_debt = witness(cs.clone(), asg.as_ref().map(|a| a.after_debt))?;
        enforce_bit_width(&before_equity, 64)?;
        enforce_bit_width(&before_debt, 64)?;
        let mut running_equity = before_equity;
        let mut running_debt = before_debt;

        let mut instructions = Vec::with_capacity(self.batch_size);
        for i in 0..self.batch_size {
            let instr = |f: fn(&InstructionAssignment) -> Fr| {
                asg.as_ref().map(|a| f(&a.instructions[i]))
            };
            let mut assets = Vec::with_capacity(self.asset_count);
            for j in 0..self.asset_count {
                assets.push(witness(
                    cs.clone(),
                    asg.as_ref().map(|a| a.instructions[i].assets[j]),
                )?);
            }
            let mut path = Vec::with_capacity(TREE_DEPTH);
            for level in 0..TREE_DEPTH {
                path.push(witness(
                    cs.clone(),
                    asg.as_ref().map(|a| a.instructions[i].path[level]),
                )?);
            }
            instructions.push(InstructionVars {
                before_root: witness(cs.clone(), instr(|x| x.before_root))?,
                after_root: witness(cs.clone(), instr(|x| x.after_root))?,
                account_index: witness(cs.clone(), instr(|x| x.account_index))?,
                id_hash: witness(cs.clone(), instr(|x| x.id_hash))?,
                equity: witness(cs.clone(), instr(|x| x.equity))?,
                debt: witness(cs.clone(), instr(|x| x.debt))?,
                assets,
                path,
            });
        }

        // 3. The batch roots anchor the instruction chain.
        before_root.enforce_equal(&instructions[0].before_root)?;
        after_root.enforce_equal(&instructions[self.batch_size - 1].after_root)?;

        let empty = FpVar::constant(empty_leaf(self.asset_count));
        for instr in &instructions {
            let index_bits = to_bits_bounded(&instr.account_index, TREE_DEPTH)?;

            // 4. The leaf was empty under this instruction's before-root,
            // and substituting the account leaf yields its after-root.
            let from_empty =
                fold_merkle_path(cs.clone(), &config, &empty, &instr.path, &index_bits)?;
            from_empty.enforce_equal(&instr.before_root)?;

            for (slot, delta) in after_ledger.iter_mut().zip(&instr.assets) {
                *slot = &*slot + delta;
            }

            // 5. Solvency after every single instruction.
            running_equity = &running_equity + &instr.equity;
            running_debt = &running_debt + &instr.debt;
            running_debt.enforce_cmp(&running_equity, Ordering::Less, true)?;

            // 6. Field-wraparound protection.
            enforce_bit_width(&instr.equity, 64)?;
            enforce_bit_width(&instr.debt, 64)?;

            let asset_magnitudes = instr
                .assets
                .iter()
                .map(absolute_value)
                .collect::<core::result::Result<Vec<_>, _>>()?;
            let asset_commitment = hash_vars(cs.clone(), &config, &asset_magnitudes)?;
            let leaf = hash_vars(
                cs.clone(),
                &config,
                &[
                    instr.id_hash.clone(),
                    instr.equity.clone(),
                    instr.debt.clone(),
                    asset_commitment,
                ],
            )?;
            let from_leaf = fold_merkle_path(cs.clone(), &config, &leaf, &instr.path, &index_bits)?;
            from_leaf.enforce_equal(&instr.after_root)?;
        }
        enforce_bit_width(&running_debt, 64)?;

        // 9. Declared aggregate totals equal the running totals.
        running_equity.enforce_equal(&after_equity)?;
        running_debt.enforce_equal(&after_debt)?;

        // 8. The after-commitment opens to the folded ledger.
        let after_magnitudes = after_ledger
            .iter()
            .map(absolute_value)
            .collect::<core::result::Result<Vec<_>, _>>()?;
        let computed_after = hash_vars(cs.clone(), &config, &after_magnitudes)?;
        computed_after.enforce_equal(&after_commitment)?;

        // 7. Adjacent instructions chain.
        for pair in instructions.windows(2) {
            pair[0].after_root.enforce_equal(&pair[1].before_root)?;
        }

        Ok(())
    }
}
