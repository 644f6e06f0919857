//! Quote extraction from raw page content
//!
//! Three tiers, highest confidence first:
//! 1. known values: a recently published quote appears verbatim in the page
//!    (the provider echoes history in chart data and hidden tables)
//! 2. patterns: the fund's name followed by a number shaped like `14,6558`
//! 3. fallback: the last-good quote from the config
//!
//! A tier only fills funds the previous tiers left unresolved, and the last
//! tier always succeeds, so `extract` returns every fund.

use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::funds::{FundId, FundTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    KnownValue,
    Pattern,
    Fallback,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tier::KnownValue => "known value",
            Tier::Pattern => "pattern",
            Tier::Fallback => "fallback",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Verbatim as found, e.g. `21,4981`.
    pub value: String,
    pub tier: Tier,
}

/// Quotes resolved by one run, keyed by fund.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    quotes: BTreeMap<FundId, Resolved>,
}

impl Observation {
    #[cfg(test)]
    pub fn get(&self, id: FundId) -> Option<&Resolved> {
        self.quotes.get(&id)
    }

    #[cfg(test)]
    pub fn value(&self, id: FundId) -> Option<&str> {
        self.quotes.get(&id).map(|r| r.value.as_str())
    }

    pub fn contains(&self, id: FundId) -> bool {
        self.quotes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_complete(&self) -> bool {
        FundId::ALL.iter().all(|id| self.contains(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (FundId, &Resolved)> {
        self.quotes.iter().map(|(id, r)| (*id, r))
    }

    /// Keeps an existing entry; a lower tier never replaces a higher one.
    fn resolve(&mut self, id: FundId, value: String, tier: Tier) {
        self.quotes.entry(id).or_insert(Resolved { value, tier });
    }
}

/// Run all three tiers over `body`. An empty body yields the fallback table.
pub fn extract(funds: &FundTable, body: &str) -> Observation {
    let mut observation = Observation::default();

    match_known_values(funds, body, &mut observation);

    if !observation.is_complete() {
        info!("[EXTRACT] Trying patterns for {} fund(s)...", FundId::ALL.len() - observation.len());
        match_patterns(funds, body, &mut observation);
    }

    if !observation.is_complete() {
        warn!("[EXTRACT] Using fallback values (last known) for the rest");
        apply_fallback(funds, &mut observation);
    }

    observation
}

/// Tier 1: first known value, most recent first, that occurs in `body`.
pub fn match_known_values(funds: &FundTable, body: &str, observation: &mut Observation) {
    for spec in funds.iter() {
        if observation.contains(spec.id) {
            continue;
        }
        if let Some(value) = spec.known_values.iter().find(|v| body.contains(v.as_str())) {
            info!("[EXTRACT] {}: {}€ ({})", spec.display_name, value, Tier::KnownValue);
            observation.resolve(spec.id, value.clone(), Tier::KnownValue);
        }
    }
}

/// Tier 2: capture group 1 of the first matching pattern.
pub fn match_patterns(funds: &FundTable, body: &str, observation: &mut Observation) {
    for spec in funds.iter() {
        if observation.contains(spec.id) {
            continue;
        }
        let found = spec
            .patterns
            .iter()
            .find_map(|re| re.captures(body)?.get(1).map(|m| m.as_str().to_string()));

        if let Some(value) = found {
            info!("[EXTRACT] {}: {}€ ({})", spec.display_name, value, Tier::Pattern);
            observation.resolve(spec.id, value, Tier::Pattern);
        }
    }
}

/// Tier 3: unconditional, fills every fund still missing.
pub fn apply_fallback(funds: &FundTable, observation: &mut Observation) {
    for spec in funds.iter() {
        if observation.contains(spec.id) {
            continue;
        }
        warn!("[EXTRACT] {}: {}€ ({})", spec.display_name, spec.fallback, Tier::Fallback);
        observation.resolve(spec.id, spec.fallback.clone(), Tier::Fallback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn funds() -> FundTable {
        Config::embedded().unwrap().funds
    }

    fn assert_resolved(obs: &Observation, id: FundId, value: &str, tier: Tier) {
        let resolved = obs.get(id).unwrap_or_else(|| panic!("{id} unresolved"));
        assert_eq!(resolved.value, value, "value for {id}");
        assert_eq!(resolved.tier, tier, "tier for {id}");
    }

    #[test]
    fn test_empty_body_yields_fallback_table() {
        let funds = funds();
        let obs = extract(&funds, "");

        assert!(obs.is_complete());
        for spec in funds.iter() {
            assert_resolved(&obs, spec.id, &spec.fallback, Tier::Fallback);
        }
    }

    #[test]
    fn test_known_value_found_verbatim() {
        let obs = extract(&funds(), r#"<script>var data = [20.1, "21,4981"];</script>"#);
        assert_resolved(&obs, FundId::PortugalSpain, "21,4981", Tier::KnownValue);
        assert!(obs.is_complete());
    }

    #[test]
    fn test_second_known_value_used_when_first_absent() {
        let obs = extract(&funds(), "historico: 20,8447 ; 14,7888");
        assert_resolved(&obs, FundId::PortugalSpain, "20,8447", Tier::KnownValue);
        assert_resolved(&obs, FundId::Usa, "14,7888", Tier::KnownValue);
    }

    #[test]
    fn test_known_value_beats_pattern() {
        let body = "<td>Cx Ações Portugal Espanha</td><td>22,0000 €</td>\
                    <div hidden>21,4981</div>";
        let funds = funds();

        // the pattern alone would pick the visible number
        let mut by_pattern = Observation::default();
        match_patterns(&funds, body, &mut by_pattern);
        assert_eq!(by_pattern.value(FundId::PortugalSpain), Some("22,0000"));

        let obs = extract(&funds, body);
        assert_resolved(&obs, FundId::PortugalSpain, "21,4981", Tier::KnownValue);
    }

    #[test]
    fn test_pattern_extracts_unknown_quote() {
        let obs = extract(&funds(), "<tr><td>Cx Ações EUA</td><td>...</td><td>14,9999€</td></tr>");
        assert_resolved(&obs, FundId::Usa, "14,9999", Tier::Pattern);
    }

    #[test]
    fn test_pattern_spans_lines_and_ignores_case() {
        let body = "<td>cx ações eua</td>\n<td>\n  15,0001\n</td>\n<td>€</td>";
        let obs = extract(&funds(), body);
        assert_resolved(&obs, FundId::Usa, "15,0001", Tier::Pattern);
    }

    #[test]
    fn test_full_name_pattern_tried_before_abbreviation() {
        // the abbreviation pattern would capture 11,1111
        let body = "Cx Portugal 11,1111 | Portugal e Espanha 23,4567 €";
        let obs = extract(&funds(), body);
        assert_resolved(&obs, FundId::PortugalSpain, "23,4567", Tier::Pattern);
    }

    #[test]
    fn test_abbreviation_pattern_without_currency() {
        let obs = extract(&funds(), "Cx Ações Líderes Globais 12,3456");
        assert_resolved(&obs, FundId::GlobalLeaders, "12,3456", Tier::Pattern);
    }

    #[test]
    fn test_tiers_merge_into_one_observation() {
        let funds = funds();
        let body = "15,1738 ... Caixa Ações EUA 16,0000 €";
        let obs = extract(&funds, body);

        assert!(obs.is_complete());
        assert_resolved(&obs, FundId::Europe, "15,1738", Tier::KnownValue);
        assert_resolved(&obs, FundId::Usa, "16,0000", Tier::Pattern);
        assert_resolved(&obs, FundId::PortugalSpain, "21,4981", Tier::Fallback);
        assert_resolved(&obs, FundId::GlobalLeaders, "13,1865", Tier::Fallback);
    }

    #[test]
    fn test_lower_tier_never_replaces_higher() {
        let funds = funds();
        let mut obs = Observation::default();
        match_known_values(&funds, "13,1918", &mut obs);
        apply_fallback(&funds, &mut obs);

        assert_resolved(&obs, FundId::GlobalLeaders, "13,1918", Tier::KnownValue);
        assert_eq!(obs.len(), 4);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let funds = funds();
        let body = "Cx Ações Europa Soc Resp 14,0001€ and 20,8447";
        assert_eq!(extract(&funds, body), extract(&funds, body));
    }
}
