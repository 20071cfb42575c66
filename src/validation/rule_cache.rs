//! Per-event rule set cache.
//!
//! Rules are fetched once per event and reused for the session. The cache
//! tracks when each set was loaded so a stale set can be flagged (and
//! refreshed by the host) instead of silently governing offline entry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::validation::rules::EventRule;

#[derive(Debug, Clone)]
struct CachedRuleSet {
    rules: Vec<EventRule>,
    loaded_at: Instant,
}

/// In-memory cache of rule sets keyed by event id.
#[derive(Debug)]
pub struct RuleSetCache {
    sets: HashMap<String, CachedRuleSet>,
    ttl: Duration,
}

impl RuleSetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sets: HashMap::new(),
            ttl,
        }
    }

    /// Replace the rule set for `event_id`. Rules for other events are dropped.
    pub fn load(&mut self, event_id: &str, rules: Vec<EventRule>) -> usize {
        let total = rules.len();
        let rules: Vec<EventRule> = rules
            .into_iter()
            .filter(|rule| rule.event_id == event_id)
            .collect();

        if rules.len() != total {
            log::warn!(
                "RULE_SET_FOREIGN_RULES_DROPPED event_id={} dropped={}",
                event_id,
                total - rules.len()
            );
        }

        let count = rules.len();
        self.sets.insert(
            event_id.to_string(),
            CachedRuleSet {
                rules,
                loaded_at: Instant::now(),
            },
        );

        log::info!("RULE_SET_LOADED event_id={} rules={}", event_id, count);
        count
    }

    pub fn get(&self, event_id: &str) -> Option<&[EventRule]> {
        self.sets.get(event_id).map(|set| set.rules.as_slice())
    }

    pub fn is_loaded(&self, event_id: &str) -> bool {
        self.sets.contains_key(event_id)
    }

    /// Check if a set needs refresh (never loaded or TTL expired).
    pub fn needs_refresh(&self, event_id: &str) -> bool {
        match self.sets.get(event_id) {
            Some(set) => set.loaded_at.elapsed() > self.ttl,
            None => true,
        }
    }

    /// Get cache age in seconds (for logging).
    pub fn cache_age_secs(&self, event_id: &str) -> Option<u64> {
        self.sets
            .get(event_id)
            .map(|set| set.loaded_at.elapsed().as_secs())
    }

    pub fn event_ids(&self) -> Vec<String> {
        self.sets.keys().cloned().collect()
    }

    /// Clear the cache.
    pub fn clear(&mut self) {
        self.sets.clear();
        log::info!("RULE_SET_CACHE_CLEARED");
    }
}
