// src/selection/pool.rs

//! Filters the item universe down to what is eligible for one recipient.
//! Pure: no storage access, no side effects. Inputs (recently-used set,
//! stats map) are loaded by the caller.

use crate::stats::ItemStats;
use crate::types::{Item, RestrictionSet};
use std::collections::{HashMap, HashSet};

/// An eligible item, plus whether a soft-exclude pattern matched it.
/// Soft matches stay in the pool; the scorer dampens them.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub item: Item,
    pub soft_flagged: bool,
}

/// Build the eligible pool for a recipient.
///
/// Filters, in order:
/// 1. hard-exclude patterns from every applicable restriction scope
/// 2. excluded categories and tiers
/// 3. cooldown: items used for this recipient within the window
/// 4. zero-signal items, but only while the pool stays at or above the floor
pub fn build_pool(
    recipient_id: &str,
    items: &[Item],
    restrictions: &[RestrictionSet],
    recently_used: &HashSet<i64>,
    stats: &HashMap<i64, ItemStats>,
    default_floor: usize,
) -> Vec<Candidate> {
    let mut pool: Vec<Candidate> = Vec::new();

    'items: for item in items {
        if recently_used.contains(&item.id) {
            continue;
        }

        let mut soft_flagged = false;
        let text_lower = item.text.to_lowercase();

        for set in restrictions.iter().filter(|s| s.applies_to(recipient_id, item)) {
            if set
                .hard_patterns
                .iter()
                .any(|p| text_lower.contains(&p.to_lowercase()))
            {
                continue 'items;
            }
            if set
                .excluded_categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&item.category))
            {
                continue 'items;
            }
            if set.excluded_tiers.contains(&item.tier) {
                continue 'items;
            }
            if set
                .soft_patterns
                .iter()
                .any(|p| text_lower.contains(&p.to_lowercase()))
            {
                soft_flagged = true;
            }
        }

        pool.push(Candidate {
            item: item.clone(),
            soft_flagged,
        });
    }

    // Zero-signal filter: prefer items with history, but never starve the
    // pool below the floor. When too few proven items exist, keep everything
    // and let the exploration sample sort it out.
    let floor = restrictions
        .iter()
        .filter_map(|s| s.min_pool_floor)
        .max()
        .unwrap_or(default_floor);

    let with_signal = pool
        .iter()
        .filter(|c| stats.get(&c.item.id).is_some_and(|s| s.has_signal()))
        .count();

    if with_signal >= floor.max(1) {
        pool.retain(|c| stats.get(&c.item.id).is_some_and(|s| s.has_signal()));
    }

    pool
}
