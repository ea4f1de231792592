//! Keyed merges over the feed list.
//!
//! Both merges are overwrite-by-key (the later item wins) followed by a stable
//! descending sort on `created_at`. They differ in what happens to existing
//! items the incoming batch also contains:
//! - `append_merge`: strictly additive (next page).
//! - `refresh_merge`: the fresh first page fully replaces those items while
//!   older, already-loaded pages survive untouched.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::FeedItem;

/// Stable sort, newest first.
pub fn sort_newest_first(items: &mut [FeedItem]) {
    items.sort_by_key(|item| std::cmp::Reverse(item.created_at_millis()));
}

/// Union by key; later occurrences overwrite earlier ones in place.
fn union_by_key(current: Vec<FeedItem>, incoming: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(current.len() + incoming.len());
    let mut out: Vec<FeedItem> = Vec::with_capacity(current.len() + incoming.len());
    for item in current.into_iter().chain(incoming) {
        let key = item.key();
        match index.get(&key) {
            Some(&pos) => out[pos] = item,
            None => {
                index.insert(key, out.len());
                out.push(item);
            }
        }
    }
    sort_newest_first(&mut out);
    out
}

pub fn append_merge(current: Vec<FeedItem>, incoming: Vec<FeedItem>) -> Vec<FeedItem> {
    union_by_key(current, incoming)
}

pub fn refresh_merge(current: Vec<FeedItem>, first_page: Vec<FeedItem>) -> Vec<FeedItem> {
    let fresh: HashSet<String> = first_page.iter().map(FeedItem::key).collect();
    let kept = current
        .into_iter()
        .filter(|item| !fresh.contains(&item.key()))
        .collect();
    union_by_key(kept, first_page)
}

/// Keys present in `merged` that `before` did not have.
pub fn new_keys(before: &[FeedItem], merged: &[FeedItem]) -> BTreeSet<String> {
    let seen: HashSet<String> = before.iter().map(FeedItem::key).collect();
    merged
        .iter()
        .map(FeedItem::key)
        .filter(|k| !seen.contains(k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::tests::{obs, summary};

    fn keys(items: &[FeedItem]) -> Vec<String> {
        items.iter().map(FeedItem::key).collect()
    }

    #[test]
    fn append_keeps_one_copy_and_prefers_latest() {
        let current = vec![obs(1, "2025-01-01T10:00:00Z", "first version")];
        let incoming = vec![obs(1, "2025-01-01T10:00:00Z", "second version")];
        let merged = append_merge(current, incoming);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].core().title, "second version");
    }

    #[test]
    fn append_is_superset_and_sorted() {
        let current = vec![
            obs(1, "2025-01-03T00:00:00Z", "a"),
            summary(2, "2025-01-01T00:00:00Z"),
        ];
        let incoming = vec![obs(3, "2025-01-02T00:00:00Z", "c"), obs(4, "not a date", "d")];
        let merged = append_merge(current.clone(), incoming);
        for k in keys(&current) {
            assert!(keys(&merged).contains(&k));
        }
        assert_eq!(
            keys(&merged),
            vec!["discovery:1", "discovery:3", "session_summary:2", "discovery:4"]
        );
    }

    #[test]
    fn refresh_preserves_older_pages() {
        let a = obs(1, "2025-01-01T00:00:00Z", "older page item");
        let b = obs(2, "2025-01-02T00:00:00Z", "B original");
        let b2 = obs(2, "2025-01-02T00:00:00Z", "B refreshed");
        let c = obs(3, "2025-01-03T00:00:00Z", "brand new");
        let merged = refresh_merge(vec![a.clone(), b], vec![b2, c]);
        assert_eq!(keys(&merged), vec!["discovery:3", "discovery:2", "discovery:1"]);
        assert_eq!(merged[1].core().title, "B refreshed");
        assert_eq!(merged[2], a);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let x = obs(1, "2025-01-01T00:00:00Z", "x");
        let y = obs(2, "2025-01-01T00:00:00Z", "y");
        let merged = append_merge(vec![x], vec![y]);
        assert_eq!(keys(&merged), vec!["discovery:1", "discovery:2"]);
    }

    #[test]
    fn date_only_items_sort_by_their_day() {
        let merged = append_merge(
            vec![obs(1, "2025-01-01", "day one")],
            vec![obs(2, "2025-01-02", "day two"), obs(3, "2025-01-01T12:00:00Z", "noon")],
        );
        assert_eq!(keys(&merged), vec!["discovery:2", "discovery:3", "discovery:1"]);
    }

    #[test]
    fn new_keys_reports_only_additions() {
        let before = vec![obs(1, "2025-01-01T00:00:00Z", "a")];
        let merged = append_merge(before.clone(), vec![obs(2, "2025-01-02T00:00:00Z", "b")]);
        let fresh = new_keys(&before, &merged);
        assert_eq!(fresh.into_iter().collect::<Vec<_>>(), vec!["discovery:2".to_string()]);
    }
}
