use std::{collections::HashMap, str::FromStr};

use smc::{executor::PartyInputs, Expression, MpcField, ProtocolSpec, SecretId};

/// Demo computation over secrets owned by parties `a`, `b` and `c`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    /// `a + b + c` with inputs 3, 14, 2.
    Sum,
    /// `a - b` with inputs 14, 3.
    Difference,
    /// `a*b + b*c + c*a` with inputs 3, 14, 2.
    Pairwise,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Sum, Scenario::Difference, Scenario::Pairwise];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Sum => "sum",
            Scenario::Difference => "difference",
            Scenario::Pairwise => "pairwise",
        }
    }

    /// Value every party is expected to reconstruct.
    pub fn expected(self) -> i128 {
        match self {
            Scenario::Sum => 19,
            Scenario::Difference => 11,
            Scenario::Pairwise => 76,
        }
    }

    fn owners(self) -> &'static [(&'static str, i64)] {
        match self {
            Scenario::Sum | Scenario::Pairwise => &[("a", 3), ("b", 14), ("c", 2)],
            Scenario::Difference => &[("a", 14), ("b", 3)],
        }
    }

    pub fn spec<F: MpcField>(self) -> ProtocolSpec<F> {
        let participants = self.owners().iter().map(|(id, _)| id.to_string()).collect();
        let a = Expression::secret("a");
        let b = Expression::secret("b");
        let expr = match self {
            Scenario::Sum => &a + &b + Expression::secret("c"),
            Scenario::Difference => &a - &b,
            Scenario::Pairwise => {
                let c = Expression::secret("c");
                &a * &b + &b * &c + &c * &a
            }
        };
        ProtocolSpec::new(participants, expr)
    }

    pub fn inputs<F: MpcField>(self) -> PartyInputs<F> {
        self.owners()
            .iter()
            .map(|&(id, value)| {
                let secrets = HashMap::from([(SecretId::from(id), F::from_i64(value))]);
                (id.to_string(), secrets)
            })
            .collect()
    }
}

/// Scenarios selected on the command line.
#[derive(Clone, Debug)]
pub struct Selection(pub Vec<Scenario>);

impl FromStr for Selection {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(Selection(Scenario::ALL.to_vec()));
        }
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .map(|scenario| Selection(vec![scenario]))
            .ok_or("Unknown scenario. Available options: sum, difference, pairwise, all")
    }
}
