use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::MaskError;

/// Boolean fold rule used to merge several masks into one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineOp {
    And,
    Or,
}

impl CombineOp {
    pub const VALID: [&'static str; 2] = ["and", "or"];

    pub fn as_str(&self) -> &'static str {
        match self {
            CombineOp::And => "and",
            CombineOp::Or => "or",
        }
    }

    /// Value the running mask starts from: all-true for "and", all-false for "or".
    pub fn identity(&self) -> bool {
        matches!(self, CombineOp::And)
    }

    #[inline]
    pub fn apply(&self, acc: bool, other: bool) -> bool {
        match self {
            CombineOp::And => acc && other,
            CombineOp::Or => acc || other,
        }
    }
}

impl FromStr for CombineOp {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" => Ok(CombineOp::And),
            "or" => Ok(CombineOp::Or),
            other => Err(MaskError::InvalidOperator {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CombineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived scalar maps a mask can be computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    DtiFa,
    DtiMd,
    DkiFa,
    DkiMd,
}

impl Scalar {
    pub const ALL: [Scalar; 4] = [Scalar::DtiFa, Scalar::DtiMd, Scalar::DkiFa, Scalar::DkiMd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scalar::DtiFa => "dti_fa",
            Scalar::DtiMd => "dti_md",
            Scalar::DkiFa => "dki_fa",
            Scalar::DkiMd => "dki_md",
        }
    }

    pub(crate) fn join(scalars: &[Scalar]) -> String {
        scalars
            .iter()
            .map(Scalar::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for Scalar {
    type Err = MaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scalar::ALL
            .into_iter()
            .find(|scalar| scalar.as_str() == s)
            .ok_or_else(|| MaskError::UnsupportedScalar {
                value: s.to_string(),
                valid: Scalar::join(&Scalar::ALL),
            })
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element type of a [`MaskArray`](crate::volume::MaskArray).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    Bool,
    Label,
    Float,
}
