//! Exhaustive traversal of cursor-paged list endpoints.
//!
//! Pages are fetched strictly one after another, since the cursor of page N+1 is only known
//! once page N has returned. Items are kept in the order the server returned them and are
//! not deduplicated.

use crate::metrics_defs::PAGINATION_PAGES;
use shared::histogram;
use std::future::Future;

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` (or an empty cursor) marks the last page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Page { items, next_cursor }
    }

    pub fn last(items: Vec<T>) -> Self {
        Page {
            items,
            next_cursor: None,
        }
    }
}

/// Fetches every page, starting from an empty cursor, and returns all items in order.
///
/// When `predicate` is given, traversal stops at the first item that satisfies it and only
/// that item is returned; later pages are never requested. If nothing matches, the result
/// is empty.
///
/// The first error returned by `fetch_page` aborts the traversal and is returned unchanged.
/// Items accumulated up to that point are dropped.
pub async fn list_all<T, E, F, Fut>(
    mut fetch_page: F,
    predicate: Option<&(dyn Fn(&T) -> bool + Sync)>,
) -> Result<Vec<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages: u64 = 0;

    loop {
        let page = fetch_page(cursor.take()).await?;
        pages += 1;

        match predicate {
            Some(matches) => {
                if let Some(found) = page.items.into_iter().find(|item| matches(item)) {
                    tracing::debug!(pages, "Found matching item, stopping traversal");
                    histogram!(PAGINATION_PAGES).record(pages as f64);
                    return Ok(vec![found]);
                }
            }
            None => items.extend(page.items),
        }

        match page.next_cursor {
            Some(next) if !next.is_empty() => {
                tracing::debug!(cursor = %next, "Fetching next page");
                cursor = Some(next);
            }
            _ => break,
        }
    }

    tracing::debug!(pages, items = items.len(), "Traversal complete");
    histogram!(PAGINATION_PAGES).record(pages as f64);
    Ok(items)
}

/// Returns the first item, in server order, that satisfies `predicate`.
pub async fn find_first<T, E, F, Fut>(
    fetch_page: F,
    predicate: impl Fn(&T) -> bool + Sync,
) -> Result<Option<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    let predicate: &(dyn Fn(&T) -> bool + Sync) = &predicate;
    let found = list_all(fetch_page, Some(predicate)).await?;
    Ok(found.into_iter().next())
}
