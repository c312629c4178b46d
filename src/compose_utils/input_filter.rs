use crate::utxo::Utxo;
use anyhow::{anyhow, Context};
use regex::Regex;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn holds(&self, lhs: u64, rhs: u64) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Gte => lhs >= rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Lte => lhs <= rhs,
        }
    }
}

impl FromStr for Comparison {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Comparison::Eq),
            "ne" => Ok(Comparison::Ne),
            "gt" => Ok(Comparison::Gt),
            "gte" => Ok(Comparison::Gte),
            "lt" => Ok(Comparison::Lt),
            "lte" => Ok(Comparison::Lte),
            other => Err(anyhow!(
                "input filter method must be one of \"re\", \"eq\", \"ne\", \"gt\", \"gte\", \"lt\", \"lte\": {other}"
            )),
        }
    }
}

/// Removes matching utxos from the runtime set before any transaction is built.
#[derive(Clone, Debug)]
pub enum InputFilter {
    Id(Regex),
    Address(Regex),
    Lovelace(Comparison, u64),
}

impl InputFilter {
    /// Parses the `TARGET METHOD EXPR` triple given on the command line.
    pub fn parse(target: &str, method: &str, expression: &str) -> anyhow::Result<Self> {
        match (target, method) {
            ("utxo", "re") => Ok(InputFilter::Id(compile(expression)?)),
            ("address", "re") => Ok(InputFilter::Address(compile(expression)?)),
            ("utxo" | "address", other) => Err(anyhow!(
                "input filter target \"{target}\" must use the \"re\" method: {other}"
            )),
            ("lovelace", "re") => Err(anyhow!(
                "input filter target \"lovelace\" needs an integer comparison method"
            )),
            ("lovelace", method) => {
                let comparison = Comparison::from_str(method)?;
                let lovelace = u64::from_str(expression).with_context(|| {
                    format!("input filter expression is not a positive integer: {expression}")
                })?;
                if lovelace < 1 {
                    return Err(anyhow!(
                        "input filter lovelace expression must be 1 or greater: {expression}"
                    ));
                }
                Ok(InputFilter::Lovelace(comparison, lovelace))
            }
            (other, _) => Err(anyhow!(
                "input filter target must be one of \"utxo\", \"address\", \"lovelace\": {other}"
            )),
        }
    }

    pub fn matches(&self, utxo: &Utxo) -> bool {
        match self {
            InputFilter::Id(re) => re.is_match(&utxo.id),
            InputFilter::Address(re) => re.is_match(&utxo.address),
            InputFilter::Lovelace(comparison, lovelace) => comparison.holds(utxo.value, *lovelace),
        }
    }
}

fn compile(expression: &str) -> anyhow::Result<Regex> {
    Regex::new(expression)
        .with_context(|| format!("input filter expression is not a valid regular expression: {expression}"))
}
