//! Arithmetic expressions evaluated jointly by all parties.
//!
//! An [`Expression`] is an immutable tree. Every party of a run holds a
//! structurally identical copy, received as part of the
//! [`ProtocolSpec`](crate::protocol::ProtocolSpec).

use std::{
    fmt, mem,
    ops::{Add, Mul, Sub},
    sync::Arc,
};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::fields::MpcField;

/// Number of random bytes in a generated secret identifier.
const SECRET_ID_BYTES: usize = 8;

/// Stable, globally unique identifier of a secret input.
/// Used as the wire key when distributing shares of the input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretId(Vec<u8>);

impl SecretId {
    /// Generate a fresh printable identifier.
    pub fn random() -> Self {
        let mut bytes = [0u8; SECRET_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        SecretId(hex::encode(bytes).into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for SecretId {
    fn from(id: &str) -> Self {
        SecretId(id.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for SecretId {
    fn from(id: Vec<u8>) -> Self {
        SecretId(id)
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Node of an arithmetic expression tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "F: MpcField")]
pub enum Expression<F> {
    /// Public constant known to every party.
    Scalar(F),
    /// Private input owned by exactly one party.
    Secret(SecretId),
    Add(Arc<Expression<F>>, Arc<Expression<F>>),
    Sub(Arc<Expression<F>>, Arc<Expression<F>>),
    Mult(Arc<Expression<F>>, Arc<Expression<F>>),
}

impl<F: MpcField> Expression<F> {
    /// Public constant.
    pub fn scalar(value: impl Into<F>) -> Self {
        Expression::Scalar(value.into())
    }

    /// Placeholder for the secret input with given identifier.
    pub fn secret(id: impl Into<SecretId>) -> Self {
        Expression::Secret(id.into())
    }

    /// Placeholder for a fresh secret input with a random identifier.
    pub fn new_secret() -> Self {
        Expression::Secret(SecretId::random())
    }

    /// Identifier of this node if it is a secret input.
    pub fn secret_id(&self) -> Option<&SecretId> {
        match self {
            Expression::Secret(id) => Some(id),
            _ => None,
        }
    }

    /// Identifiers of all secret inputs in traversal order (left before right).
    pub fn secret_ids(&self) -> Vec<&SecretId> {
        let mut ids = Vec::new();
        self.visit(&mut |node| {
            if let Expression::Secret(id) = node {
                ids.push(id);
            }
        });
        ids
    }

    /// Number of multiplication nodes in the tree.
    pub fn num_mults(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |node| {
            if matches!(node, Expression::Mult(..)) {
                count += 1;
            }
        });
        count
    }

    /// Length of the longest path from this node to a leaf, counted in nodes.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Some((left, right)) = node.children() {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        deepest
    }

    fn children(&self) -> Option<(&Expression<F>, &Expression<F>)> {
        match self {
            Expression::Scalar(_) | Expression::Secret(_) => None,
            Expression::Add(left, right)
            | Expression::Sub(left, right)
            | Expression::Mult(left, right) => Some((left.as_ref(), right.as_ref())),
        }
    }

    /// Post-order traversal, left child before right child.
    pub(crate) fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expression<F>)) {
        // Second field is set once the children of the node were scheduled.
        let mut stack = vec![(self, false)];
        while let Some((node, expanded)) = stack.pop() {
            match node.children() {
                Some((left, right)) if !expanded => {
                    stack.push((node, true));
                    stack.push((right, false));
                    stack.push((left, false));
                }
                _ => f(node),
            }
        }
    }

    /// Binding strength used for printing.
    fn precedence(&self) -> u8 {
        match self {
            Expression::Add(..) | Expression::Sub(..) => 1,
            Expression::Mult(..) => 2,
            Expression::Scalar(_) | Expression::Secret(_) => 3,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parenthesize: bool) -> fmt::Result {
        if parenthesize {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl<F: MpcField> fmt::Display for Expression<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (left, op, right) = match self {
            Expression::Scalar(value) => return write!(f, "Scalar({})", value.to_i128()),
            Expression::Secret(id) => return write!(f, "Secret({})", id),
            Expression::Add(left, right) => (left, "+", right),
            Expression::Sub(left, right) => (left, "-", right),
            Expression::Mult(left, right) => (left, "*", right),
        };
        // Operators are left-associative, so an equally binding right operand
        // needs parentheses to keep the tree shape.
        let precedence = self.precedence();
        left.fmt_operand(f, left.precedence() < precedence)?;
        write!(f, " {} ", op)?;
        right.fmt_operand(f, right.precedence() <= precedence)
    }
}

impl<F: MpcField> From<F> for Expression<F> {
    fn from(value: F) -> Self {
        Expression::Scalar(value)
    }
}

impl<F: MpcField> From<SecretId> for Expression<F> {
    fn from(id: SecretId) -> Self {
        Expression::Secret(id)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<F: MpcField, R: Into<Expression<F>>> $trait<R> for Expression<F> {
            type Output = Expression<F>;
            fn $method(self, rhs: R) -> Self::Output {
                Expression::$variant(Arc::new(self), Arc::new(rhs.into()))
            }
        }

        impl<F: MpcField, R: Into<Expression<F>>> $trait<R> for &Expression<F> {
            type Output = Expression<F>;
            fn $method(self, rhs: R) -> Self::Output {
                Expression::$variant(Arc::new(self.clone()), Arc::new(rhs.into()))
            }
        }
    };
}

impl_binary_op!(Add, add, Add);
impl_binary_op!(Sub, sub, Sub);
impl_binary_op!(Mul, mul, Mult);

impl<F: MpcField> From<&Expression<F>> for Expression<F> {
    fn from(expr: &Expression<F>) -> Self {
        expr.clone()
    }
}

impl<F> Expression<F> {
    /// Move subtrees owned only by `node` into `detached`, leaving empty leaves behind.
    fn detach_children(node: &mut Expression<F>, detached: &mut Vec<Expression<F>>) {
        if let Expression::Add(left, right)
        | Expression::Sub(left, right)
        | Expression::Mult(left, right) = node
        {
            for child in [left, right] {
                if let Some(child) = Arc::get_mut(child) {
                    if !matches!(child, Expression::Scalar(_) | Expression::Secret(_)) {
                        let leaf = Expression::Secret(SecretId(Vec::new()));
                        detached.push(mem::replace(child, leaf));
                    }
                }
            }
        }
    }
}

/// Tears the tree down level by level, so that dropping a deep expression
/// does not recurse once per level.
impl<F> Drop for Expression<F> {
    fn drop(&mut self) {
        let mut detached = Vec::new();
        Self::detach_children(self, &mut detached);
        while let Some(mut node) = detached.pop() {
            Self::detach_children(&mut node, &mut detached);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Mersenne61;

    type Expr = Expression<Mersenne61>;

    fn secret(id: &str) -> Expr {
        Expr::secret(id)
    }

    fn scalar(value: u64) -> Expr {
        Expr::scalar(value)
    }

    #[test]
    fn test_display() {
        let cases = [
            (secret("1") + secret("2"), "Secret(1) + Secret(2)"),
            (secret("2") * secret("1"), "Secret(2) * Secret(1)"),
            (
                secret("1") * secret("2") * secret("3"),
                "Secret(1) * Secret(2) * Secret(3)",
            ),
            (
                secret("1") * (secret("2") + secret("3") * scalar(4)),
                "Secret(1) * (Secret(2) + Secret(3) * Scalar(4))",
            ),
            (
                (secret("1") + secret("2")) * secret("3") * scalar(4) + scalar(3),
                "(Secret(1) + Secret(2)) * Secret(3) * Scalar(4) + Scalar(3)",
            ),
            (
                secret("1") - (secret("2") - secret("3")),
                "Secret(1) - (Secret(2) - Secret(3))",
            ),
        ];
        for (expr, expected) in cases {
            assert_eq!(expr.to_string(), expected);
        }
    }

    #[test]
    fn test_traversal_queries() {
        let a = secret("a");
        let b = secret("b");
        let c = secret("c");
        let expr = &a * &b + &b * &c + &c * &a;

        let ids: Vec<_> = expr.secret_ids().into_iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, ["a", "b", "b", "c", "c", "a"]);
        assert_eq!(expr.num_mults(), 3);
        assert_eq!((a + scalar(2)).num_mults(), 0);
    }

    fn left_deep_sum(terms: usize) -> Expr {
        let mut expr = secret("a");
        for _ in 0..terms {
            expr = expr + scalar(1);
        }
        expr
    }

    #[test]
    fn test_deep_expression() {
        let expr = left_deep_sum(100_000);
        assert_eq!(expr.depth(), 100_001);
        assert_eq!(expr.num_mults(), 0);
        assert_eq!(expr.secret_ids().len(), 1);

        let shared = expr.clone();
        drop(expr);
        assert_eq!(shared.depth(), 100_001);
    }

    #[test]
    fn test_depth() {
        let a = secret("a");
        assert_eq!(a.depth(), 1);
        assert_eq!((&a * (&a + scalar(1)) - &a).depth(), 4);
    }

    #[test]
    fn test_random_ids_are_distinct() {
        let x = SecretId::random();
        let y = SecretId::random();
        assert_ne!(x, y);
        assert_eq!(x.as_bytes().len(), 2 * SECRET_ID_BYTES);
    }
}
