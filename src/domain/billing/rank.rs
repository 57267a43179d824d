//! Member ranks and the dues eligibility allow-list.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Rank of a member in the community hierarchy, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Recruta,
    Soldado,
    Cabo,
    Sargento,
    Subtenente,
    Tenente,
    Capitao,
    Major,
    TenenteCoronel,
    Coronel,
}

impl Rank {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Recruta => "recruta",
            Rank::Soldado => "soldado",
            Rank::Cabo => "cabo",
            Rank::Sargento => "sargento",
            Rank::Subtenente => "subtenente",
            Rank::Tenente => "tenente",
            Rank::Capitao => "capitao",
            Rank::Major => "major",
            Rank::TenenteCoronel => "tenente_coronel",
            Rank::Coronel => "coronel",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = ValidationError;

    /// Accepts the directory spelling, case-insensitive, with or without
    /// the accent on "capitão" and with spaces or dashes in compound ranks.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_").replace('ã', "a");
        match normalized.as_str() {
            "recruta" => Ok(Rank::Recruta),
            "soldado" => Ok(Rank::Soldado),
            "cabo" => Ok(Rank::Cabo),
            "sargento" => Ok(Rank::Sargento),
            "subtenente" => Ok(Rank::Subtenente),
            "tenente" => Ok(Rank::Tenente),
            "capitao" => Ok(Rank::Capitao),
            "major" => Ok(Rank::Major),
            "tenente_coronel" => Ok(Rank::TenenteCoronel),
            "coronel" => Ok(Rank::Coronel),
            _ => Err(ValidationError::invalid_format(
                "rank",
                format!("unknown rank '{}'", s),
            )),
        }
    }
}

/// Fixed allow-list of ranks that may subscribe to dues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityPolicy {
    ranks: HashSet<Rank>,
}

impl EligibilityPolicy {
    pub fn new(ranks: impl IntoIterator<Item = Rank>) -> Self {
        Self {
            ranks: ranks.into_iter().collect(),
        }
    }

    pub fn is_eligible(&self, rank: Rank) -> bool {
        self.ranks.contains(&rank)
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

impl Default for EligibilityPolicy {
    /// Every rank from soldado upwards.
    fn default() -> Self {
        Self::new([
            Rank::Soldado,
            Rank::Cabo,
            Rank::Sargento,
            Rank::Subtenente,
            Rank::Tenente,
            Rank::Capitao,
            Rank::Major,
            Rank::TenenteCoronel,
            Rank::Coronel,
        ])
    }
}
