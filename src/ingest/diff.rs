use std::collections::HashSet;

use crate::feed::FeedItem;
use crate::storage::{IdentifierStore, StoreError};

/// Outcome of comparing a live feed with its dedup records.
///
/// `new_items` keeps feed order; `old_ids` keeps the order the store
/// returned them in. The two never share an identifier.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Diff<'a> {
    pub new_items: Vec<&'a FeedItem>,
    pub old_ids: Vec<String>,
}

/// Splits the live feed against the persisted identifiers of its source.
///
/// Matching is exact string equality on [`FeedItem::identifier`]. Items
/// without an identifier are always new and never keep a record alive.
pub fn diff_items<'a>(items: &'a [FeedItem], persisted: &[String]) -> Diff<'a> {
    let persisted_set: HashSet<&str> = persisted.iter().map(String::as_str).collect();
    let current: HashSet<&str> = items.iter().filter_map(FeedItem::identifier).collect();

    let new_items = items
        .iter()
        .filter(|item| match item.identifier() {
            Some(id) => !persisted_set.contains(id),
            None => true,
        })
        .collect();

    let old_ids = persisted
        .iter()
        .filter(|id| !current.contains(id.as_str()))
        .cloned()
        .collect();

    Diff { new_items, old_ids }
}

/// Reads every identifier recorded for `source`, following pagination to
/// the end. Duplicates across pages are dropped.
pub async fn load_persisted_ids<S: IdentifierStore>(
    store: &S,
    source: &str,
) -> Result<Vec<String>, StoreError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = store.query_ids(source, cursor.as_deref()).await?;
        for id in page.ids {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(ids)
}
