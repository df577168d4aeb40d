//! Canonical flattening of an [`Expression`] into a gate list.
//!
//! Compilation visits the tree in post-order, left child before right child,
//! and numbers multiplication nodes in visiting order. Since every party
//! compiles the same expression, the resulting [`MultId`]s agree across
//! parties without any coordination messages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    expression::{Expression, SecretId},
    fields::MpcField,
};

/// Index of a gate output in [`Circuit::gates`].
pub type WireId = usize;

/// Identifier of a multiplication node, assigned by [`Circuit::compile`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MultId(pub usize);

impl fmt::Display for MultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mult/{}", self.0)
    }
}

/// Single step of evaluation. Operands always refer to earlier gates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Gate<F> {
    Constant(F),
    Input(SecretId),
    Add(WireId, WireId),
    Sub(WireId, WireId),
    Mul(WireId, WireId, MultId),
}

/// Expression flattened in canonical evaluation order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Circuit<F> {
    gates: Vec<Gate<F>>,
    num_mults: usize,
}

impl<F: MpcField> Circuit<F> {
    pub fn compile(expr: &Expression<F>) -> Self {
        let mut gates = Vec::new();
        let mut num_mults = 0;
        // Wires of visited subtrees whose parent was not reached yet.
        let mut pending: Vec<WireId> = Vec::new();

        expr.visit(&mut |node| {
            let gate = match node {
                Expression::Scalar(value) => Gate::Constant(*value),
                Expression::Secret(id) => Gate::Input(id.clone()),
                Expression::Add(..) => {
                    let (left, right) = operands(&mut pending);
                    Gate::Add(left, right)
                }
                Expression::Sub(..) => {
                    let (left, right) = operands(&mut pending);
                    Gate::Sub(left, right)
                }
                Expression::Mult(..) => {
                    let (left, right) = operands(&mut pending);
                    num_mults += 1;
                    Gate::Mul(left, right, MultId(num_mults - 1))
                }
            };
            gates.push(gate);
            pending.push(gates.len() - 1);
        });

        Circuit { gates, num_mults }
    }

    pub fn gates(&self) -> &[Gate<F>] {
        &self.gates
    }

    /// Wire holding the value of the whole expression.
    pub fn output(&self) -> WireId {
        self.gates.len() - 1
    }

    pub fn num_mults(&self) -> usize {
        self.num_mults
    }

    /// Multiplication node identifiers in evaluation order.
    pub fn mult_ids(&self) -> Vec<MultId> {
        self.gates
            .iter()
            .filter_map(|gate| match gate {
                Gate::Mul(_, _, id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

/// Take the wires of both children of a binary node. Post-order visiting
/// guarantees that they are the two most recent pending wires.
fn operands(pending: &mut Vec<WireId>) -> (WireId, WireId) {
    let children = pending.split_off(pending.len() - 2);
    (children[0], children[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Mersenne61;

    type Expr = Expression<Mersenne61>;

    #[test]
    fn test_post_order_layout() {
        let a = Expr::secret("a");
        let b = Expr::secret("b");
        let expr = (&a * &b) + Expr::scalar(3u64) * &a;
        let circuit = Circuit::compile(&expr);

        assert_eq!(
            circuit.gates(),
            &[
                Gate::Input("a".into()),
                Gate::Input("b".into()),
                Gate::Mul(0, 1, MultId(0)),
                Gate::Constant(3.into()),
                Gate::Input("a".into()),
                Gate::Mul(3, 4, MultId(1)),
                Gate::Add(2, 5),
            ]
        );
        assert_eq!(circuit.output(), 6);
        assert_eq!(circuit.num_mults(), expr.num_mults());
    }

    #[test]
    fn test_mult_ids_are_deterministic() {
        let build = || {
            let a = Expr::secret("a");
            let b = Expr::secret("b");
            let c = Expr::secret("c");
            (&a * &b) * (&b - &c) + (&c * &a) * Expr::scalar(2u64)
        };
        let first = Circuit::compile(&build());
        let second = Circuit::compile(&build());
        assert_eq!(first.mult_ids(), second.mult_ids());
        assert_eq!(
            first.mult_ids(),
            [MultId(0), MultId(1), MultId(2), MultId(3)]
        );
        assert_eq!(MultId(3).to_string(), "mult/3");
    }

    #[test]
    fn test_deep_product_chain() {
        let a = Expr::secret("a");
        let mut expr = a.clone();
        for _ in 0..20_000 {
            expr = expr * &a;
        }
        let circuit = Circuit::compile(&expr);

        assert_eq!(circuit.gates().len(), 40_001);
        assert_eq!(circuit.num_mults(), 20_000);
        assert_eq!(circuit.gates()[2], Gate::Mul(0, 1, MultId(0)));
        assert_eq!(
            circuit.gates()[circuit.output()],
            Gate::Mul(39_998, 39_999, MultId(19_999))
        );
    }
}
