//! Tiered pairing of declared agents with discovered identities.
//!
//! Three tiers run in order over shrinking pools: exact source, identity
//! name, then role. A tier only pairs keys that occur exactly once among the
//! remaining agents and exactly once among the remaining identities; every
//! other group stays unmatched. Inputs are processed by index and grouped in
//! ordered maps, so the result depends only on the inputs.

use crate::identity::DiscoveredIdentity;
use crate::manifest::AgentDefinition;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    /// Agent's identity source (and pin) equals the discovered path
    Source,
    /// Discovered manifest name equals the agent's short name
    Name,
    /// Role is shared by exactly one remaining agent and identity
    Role,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchTier::Source => f.write_str("source"),
            MatchTier::Name => f.write_str("name"),
            MatchTier::Role => f.write_str("role"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedPair<'a> {
    pub agent: &'a AgentDefinition,
    pub identity: &'a DiscoveredIdentity,
    pub tier: MatchTier,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult<'a> {
    /// Pairs in agent input order
    pub matched: Vec<MatchedPair<'a>>,
    pub unmatched_agents: Vec<&'a AgentDefinition>,
    pub unmatched_discovered: Vec<&'a DiscoveredIdentity>,
}

impl<'a> MatchResult<'a> {
    pub fn unmatched_discovered_paths(&self) -> Vec<&'a str> {
        self.unmatched_discovered
            .iter()
            .map(|d| d.rel_path.as_str())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.unmatched_agents.is_empty() && self.unmatched_discovered.is_empty()
    }
}

/// Pair `agents` with `discovered`.
pub fn reconcile<'a>(
    agents: &'a [AgentDefinition],
    discovered: &'a [DiscoveredIdentity],
) -> MatchResult<'a> {
    let mut open_agents: Vec<usize> = (0..agents.len()).collect();
    let mut open_found: Vec<usize> = (0..discovered.len()).collect();
    let mut pairs: Vec<(usize, usize, MatchTier)> = Vec::new();

    let tiers: [(MatchTier, fn(&AgentDefinition) -> String, fn(&DiscoveredIdentity) -> String); 3] = [
        (
            MatchTier::Source,
            |a| a.source_label(),
            |d| d.label(),
        ),
        (
            MatchTier::Name,
            |a| a.short_name().to_string(),
            |d| d.manifest.name.clone(),
        ),
        (
            MatchTier::Role,
            |a| a.role.clone(),
            |d| d.manifest.role.clone(),
        ),
    ];

    for (tier, agent_key, found_key) in tiers {
        let tier_pairs = match_unique(
            &open_agents,
            &open_found,
            |i| agent_key(&agents[i]),
            |j| found_key(&discovered[j]),
            tier,
        );
        for &(i, j) in &tier_pairs {
            debug!(
                agent = %agents[i].name,
                identity = %discovered[j].rel_path,
                %tier,
                "matched agent"
            );
            pairs.push((i, j, tier));
        }
        open_agents.retain(|i| !tier_pairs.iter().any(|(a, _)| a == i));
        open_found.retain(|j| !tier_pairs.iter().any(|(_, d)| d == j));
    }

    pairs.sort_by_key(|&(i, _, _)| i);

    MatchResult {
        matched: pairs
            .into_iter()
            .map(|(i, j, tier)| MatchedPair {
                agent: &agents[i],
                identity: &discovered[j],
                tier,
            })
            .collect(),
        unmatched_agents: open_agents.into_iter().map(|i| &agents[i]).collect(),
        unmatched_discovered: open_found.into_iter().map(|j| &discovered[j]).collect(),
    }
}

/// Pair open items whose key occurs exactly once on each side
fn match_unique(
    open_agents: &[usize],
    open_found: &[usize],
    agent_key: impl Fn(usize) -> String,
    found_key: impl Fn(usize) -> String,
    tier: MatchTier,
) -> Vec<(usize, usize)> {
    let mut groups: BTreeMap<String, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for &i in open_agents {
        groups.entry(agent_key(i)).or_default().0.push(i);
    }
    for &j in open_found {
        groups.entry(found_key(j)).or_default().1.push(j);
    }

    let mut pairs = Vec::new();
    for (key, (agent_ids, found_ids)) in groups {
        match (agent_ids.as_slice(), found_ids.as_slice()) {
            ([i], [j]) => pairs.push((*i, *j)),
            ([], _) | (_, []) => {}
            (a, f) => warn!(
                %tier,
                key = %key,
                agents = a.len(),
                identities = f.len(),
                "ambiguous match left unresolved"
            ),
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityManifest;
    use std::path::PathBuf;

    fn agent(name: &str, role: &str, source: &str) -> AgentDefinition {
        AgentDefinition::new(name, role, source)
    }

    fn found(rel_path: &str, name: &str, role: &str) -> DiscoveredIdentity {
        let manifest = IdentityManifest::parse(
            &format!(
                "name = \"{}\"\ndisplay_name = \"{}\"\nrole = \"{}\"",
                name, name, role
            ),
            "identity.toml",
        )
        .unwrap();
        DiscoveredIdentity {
            rel_path: rel_path.to_string(),
            version_ref: None,
            manifest,
            dir: PathBuf::from(rel_path),
        }
    }

    #[test]
    fn test_empty_inputs() {
        let result = reconcile(&[], &[]);
        assert!(result.matched.is_empty());
        assert!(result.unmatched_agents.is_empty());
        assert!(result.unmatched_discovered.is_empty());
    }

    #[test]
    fn test_exact_source_match() {
        let agents = vec![agent("agent-pm", "pm", "./pm")];
        let discovered = vec![found("./pm", "pm", "pm")];
        let result = reconcile(&agents, &discovered);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].tier, MatchTier::Source);
        assert!(result.is_complete());
    }

    #[test]
    fn test_name_match_after_move() {
        let agents = vec![agent("agent-juno", "eng", "./old-eng")];
        let discovered = vec![found("./new-eng", "juno", "eng")];
        let result = reconcile(&agents, &discovered);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].tier, MatchTier::Name);
        assert_eq!(result.matched[0].identity.rel_path, "./new-eng");
    }

    #[test]
    fn test_shared_role_stays_unmatched() {
        let agents = vec![
            agent("agent-t1", "tester", "./t1"),
            agent("agent-t2", "tester", "./t2"),
        ];
        let discovered = vec![
            found("./qa-a", "alpha", "tester"),
            found("./qa-b", "beta", "tester"),
        ];
        let result = reconcile(&agents, &discovered);
        assert!(result.matched.is_empty());
        assert_eq!(result.unmatched_agents.len(), 2);
        assert_eq!(result.unmatched_discovered_paths(), vec!["./qa-a", "./qa-b"]);
    }

    #[test]
    fn test_source_match_takes_priority() {
        // agent-a's source points at ./x; agent-x could also claim ./x by name
        let agents = vec![
            agent("agent-x", "eng", "./elsewhere"),
            agent("agent-a", "eng", "./x"),
        ];
        let discovered = vec![found("./x", "x", "eng")];
        let result = reconcile(&agents, &discovered);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].agent.name, "agent-a");
        assert_eq!(result.matched[0].tier, MatchTier::Source);
        assert_eq!(result.unmatched_agents[0].name, "agent-x");
    }

    #[test]
    fn test_role_uniqueness_recomputed_after_earlier_tiers() {
        // Three "ops" identities overall, but only one left once ./ops-1 and
        // "beta" are claimed by earlier tiers
        let agents = vec![
            agent("agent-one", "ops", "./ops-1"),
            agent("agent-beta", "ops", "./gone"),
            agent("agent-third", "ops", "./moved"),
        ];
        let discovered = vec![
            found("./ops-1", "one", "ops"),
            found("./ops-2", "beta", "ops"),
            found("./ops-3", "gamma", "ops"),
        ];
        let result = reconcile(&agents, &discovered);
        let tiers: Vec<(&str, MatchTier)> = result
            .matched
            .iter()
            .map(|p| (p.agent.name.as_str(), p.tier))
            .collect();
        assert_eq!(
            tiers,
            vec![
                ("agent-one", MatchTier::Source),
                ("agent-beta", MatchTier::Name),
                ("agent-third", MatchTier::Role),
            ]
        );
        assert!(result.is_complete());
    }

    #[test]
    fn test_deterministic_regardless_of_input_order() {
        let agents = vec![
            agent("agent-a", "pm", "./pm"),
            agent("agent-b", "eng", "./old"),
        ];
        let mut discovered = vec![found("./pm", "a", "pm"), found("./new", "b", "eng")];
        let first: Vec<(String, String)> = reconcile(&agents, &discovered)
            .matched
            .iter()
            .map(|p| (p.agent.name.clone(), p.identity.rel_path.clone()))
            .collect();

        discovered.reverse();
        let second: Vec<(String, String)> = reconcile(&agents, &discovered)
            .matched
            .iter()
            .map(|p| (p.agent.name.clone(), p.identity.rel_path.clone()))
            .collect();
        assert_eq!(first, second);
    }
}
