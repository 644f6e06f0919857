//! Tracked funds and their extraction table
//!
//! The four funds are a closed set. Everything else about them (display
//! names, recently observed quotes, last-good fallback, regex patterns) is
//! configuration, loaded and validated once at startup.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FundId {
    PortugalSpain,
    Usa,
    Europe,
    GlobalLeaders,
}

impl FundId {
    /// Declaration order, which is also the ledger column order.
    pub const ALL: [FundId; 4] = [
        FundId::PortugalSpain,
        FundId::Usa,
        FundId::Europe,
        FundId::GlobalLeaders,
    ];

    /// Key used for this fund in the config file.
    pub fn key(self) -> &'static str {
        match self {
            FundId::PortugalSpain => "portugal_spain",
            FundId::Usa => "usa",
            FundId::Europe => "europe",
            FundId::GlobalLeaders => "global_leaders",
        }
    }

    pub fn from_key(key: &str) -> Option<FundId> {
        FundId::ALL.into_iter().find(|id| id.key() == key)
    }
}

impl fmt::Display for FundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A fund entry as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFund {
    pub display_name: String,
    #[serde(default)]
    pub known_values: Vec<String>,
    pub fallback: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// A validated fund entry with compiled patterns.
#[derive(Debug, Clone)]
pub struct FundSpec {
    pub id: FundId,
    pub display_name: String,
    /// Most recent first.
    pub known_values: Vec<String>,
    pub fallback: String,
    /// Tried in order; capture group 1 is the quote.
    pub patterns: Vec<Regex>,
}

/// Validated table holding exactly one spec per `FundId`, in `FundId::ALL` order.
#[derive(Debug, Clone)]
pub struct FundTable {
    specs: Vec<FundSpec>,
}

impl FundTable {
    /// Validate the `[funds.*]` tables of the config, keyed by `FundId::key`.
    pub fn from_raw(mut raw: BTreeMap<String, RawFund>) -> Result<Self, ConfigError> {
        if let Some(unknown) = raw.keys().find(|k| FundId::from_key(k).is_none()) {
            return Err(ConfigError::UnknownFund(unknown.clone()));
        }

        let mut specs = Vec::with_capacity(FundId::ALL.len());

        for id in FundId::ALL {
            let fund = raw.remove(id.key()).ok_or(ConfigError::MissingFund(id))?;

            if fund.display_name.trim().is_empty()
                || fund.display_name.eq_ignore_ascii_case(crate::ledger::DATE_COLUMN)
            {
                return Err(ConfigError::InvalidDisplayName {
                    fund: id,
                    name: fund.display_name,
                });
            }
            if specs
                .iter()
                .any(|s: &FundSpec| s.display_name == fund.display_name)
            {
                return Err(ConfigError::DuplicateDisplayName(fund.display_name));
            }

            for value in fund.known_values.iter().chain(Some(&fund.fallback)) {
                if !is_quote_shaped(value) {
                    return Err(ConfigError::InvalidQuote {
                        fund: id,
                        value: value.clone(),
                    });
                }
            }

            let patterns = fund
                .patterns
                .iter()
                .map(|source| compile_pattern(id, source))
                .collect::<Result<Vec<_>, _>>()?;

            specs.push(FundSpec {
                id,
                display_name: fund.display_name,
                known_values: fund.known_values,
                fallback: fund.fallback,
                patterns,
            });
        }

        Ok(FundTable { specs })
    }

    pub fn get(&self, id: FundId) -> &FundSpec {
        // from_raw pushes one spec per FundId::ALL entry, in order
        &self.specs[id as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FundSpec> {
        self.specs.iter()
    }

    /// Ledger column headers, one per fund.
    pub fn columns(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.display_name.clone()).collect()
    }
}

fn compile_pattern(fund: FundId, source: &str) -> Result<Regex, ConfigError> {
    let regex = RegexBuilder::new(source)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|err| ConfigError::InvalidPattern {
            fund,
            pattern: source.to_string(),
            source: err,
        })?;

    // captures_len counts the implicit whole-match group
    if regex.captures_len() < 2 {
        return Err(ConfigError::PatternWithoutCapture {
            fund,
            pattern: source.to_string(),
        });
    }

    Ok(regex)
}

/// True for strings like `21,4981`: digits, a comma, exactly four digits.
pub fn is_quote_shaped(value: &str) -> bool {
    match value.split_once(',') {
        Some((int, frac)) => {
            !int.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.len() == 4
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
