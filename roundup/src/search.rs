//! Query planning and snippet aggregation for the search stage.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::core::Topic;
use crate::providers::Snippet;
use crate::text::truncate_chars;

/// One query to send to the search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedQuery {
    /// Site the query is restricted to.
    pub site: Option<String>,
    /// Full query text.
    pub query: String,
}

/// Picks reproducible queries for a topic.
///
/// One base query is chosen per topic, then up to `sites_per_topic`
/// distinct sites, each with its own modifier:
/// `"{base} {modifier} site:{site}"`. Choices come from an RNG seeded with
/// the run seed and the topic number, so a rerun plans the same queries.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    sites: Vec<String>,
    modifiers: Vec<String>,
    sites_per_topic: usize,
    seed: u64,
}

impl QueryPlanner {
    /// Creates a planner.
    #[must_use]
    pub fn new(sites: Vec<String>, modifiers: Vec<String>, sites_per_topic: usize, seed: u64) -> Self {
        Self {
            sites,
            modifiers,
            sites_per_topic,
            seed,
        }
    }

    /// Creates a planner from the run configuration.
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.sites.clone(),
            config.search_modifiers.clone(),
            config.sites_per_topic,
            config.seed,
        )
    }

    fn rng_for(&self, topic: &Topic) -> StdRng {
        let salt = (topic.number as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        StdRng::seed_from_u64(self.seed ^ salt)
    }

    /// Plans the queries for `topic`. Empty only if the topic has no queries.
    #[must_use]
    pub fn plan(&self, topic: &Topic) -> Vec<PlannedQuery> {
        let mut rng = self.rng_for(topic);
        let Some(base) = topic.queries.choose(&mut rng) else {
            return Vec::new();
        };

        let with_modifier = |rng: &mut StdRng| match self.modifiers.choose(rng) {
            Some(modifier) => format!("{base} {modifier}"),
            None => base.clone(),
        };

        if self.sites.is_empty() || self.sites_per_topic == 0 {
            return vec![PlannedQuery {
                site: None,
                query: with_modifier(&mut rng),
            }];
        }

        let sites: Vec<&String> = self
            .sites
            .choose_multiple(&mut rng, self.sites_per_topic.min(self.sites.len()))
            .collect();
        sites
            .into_iter()
            .map(|site| PlannedQuery {
                site: Some(site.clone()),
                query: format!("{} site:{site}", with_modifier(&mut rng)),
            })
            .collect()
    }
}

/// Condenses one query's hits: the first `max_snippets` non-empty snippets
/// joined by spaces, cut to `max_chars` and prefixed with `"{site}: "`.
///
/// Returns `None` when the query produced nothing.
#[must_use]
pub fn aggregate_snippets(
    site: Option<&str>,
    snippets: &[Snippet],
    max_snippets: usize,
    max_chars: usize,
) -> Option<String> {
    let combined = snippets
        .iter()
        .filter(|s| !s.is_empty())
        .take(max_snippets)
        .map(Snippet::text)
        .collect::<Vec<_>>()
        .join(" ");
    if combined.is_empty() {
        return None;
    }
    let combined = truncate_chars(&combined, max_chars);
    Some(match site {
        Some(site) => format!("{site}: {combined}"),
        None => combined.to_string(),
    })
}

/// Output of the search stage, stored as `search/topic_NN.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDigest {
    /// Queries that were run, in plan order.
    pub queries: Vec<String>,
    /// One condensed summary per query that returned hits.
    pub site_summaries: Vec<String>,
}

impl SearchDigest {
    /// The raw summary handed to text generation.
    #[must_use]
    pub fn summary(&self) -> String {
        self.site_summaries.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(number: usize) -> Topic {
        Topic::new(
            number,
            "OpenAI",
            vec!["OpenAI news".to_string(), "ChatGPT news".to_string()],
        )
    }

    fn planner(seed: u64) -> QueryPlanner {
        QueryPlanner::new(
            vec!["a.com".into(), "b.com".into(), "c.com".into()],
            vec!["latest".into(), "update".into()],
            2,
            seed,
        )
    }

    #[test]
    fn test_plan_is_reproducible() {
        assert_eq!(planner(7).plan(&topic(1)), planner(7).plan(&topic(1)));
    }

    #[test]
    fn test_plan_shape() {
        let plan = planner(42).plan(&topic(3));
        assert_eq!(plan.len(), 2);
        assert_ne!(plan[0].site, plan[1].site);
        for q in &plan {
            let site = q.site.as_deref().unwrap();
            assert!(q.query.ends_with(&format!(" site:{site}")));
            assert!(q.query.starts_with("OpenAI news") || q.query.starts_with("ChatGPT news"));
        }
    }

    #[test]
    fn test_plan_without_sites() {
        let planner = QueryPlanner::new(Vec::new(), Vec::new(), 2, 1);
        let plan = planner.plan(&Topic::new(1, "Nvidia", vec!["Nvidia AI".into()]));
        assert_eq!(
            plan,
            vec![PlannedQuery {
                site: None,
                query: "Nvidia AI".to_string()
            }]
        );
    }

    #[test]
    fn test_aggregate_truncates_and_prefixes() {
        let snippets = vec![
            Snippet::new("One", "first"),
            Snippet::new("", ""),
            Snippet::new("Two", "second"),
            Snippet::new("Three", "third"),
        ];
        assert_eq!(
            aggregate_snippets(Some("a.com"), &snippets, 2, 100).unwrap(),
            "a.com: One: first Two: second"
        );
        assert_eq!(
            aggregate_snippets(None, &snippets, 5, 8).unwrap(),
            "One: fir"
        );
    }

    #[test]
    fn test_aggregate_empty_is_none() {
        assert!(aggregate_snippets(Some("a.com"), &[], 5, 400).is_none());
        assert!(aggregate_snippets(None, &[Snippet::default()], 5, 400).is_none());
    }
}
