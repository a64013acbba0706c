#![warn(clippy::all, rust_2018_idioms)]

//! Token-following pagination and fixed-size describe batching.
//!
//! Both helpers stop at the first failed call and hand back everything
//! gathered so far together with the error. Callers choose whether a partial
//! list is worth keeping.

use anyhow::Result;
use std::future::Future;

/// Page size for target, template and run listings.
pub const LIST_PAGE_SIZE: i32 = 10;
/// Page size for finding listings.
pub const FINDINGS_PAGE_SIZE: i32 = 100;
/// Describe batch size for runs, templates and rules packages.
pub const DESCRIBE_BATCH_SIZE: usize = 10;
/// Describe batch size for findings.
pub const FINDINGS_BATCH_SIZE: usize = 100;

/// One page of a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    /// Continuation token, treating an empty string as the end.
    pub fn continuation(&self) -> Option<&str> {
        self.next_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Items gathered by a multi-call sequence, plus the error that cut it short.
#[derive(Debug)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub error: Option<anyhow::Error>,
}

impl<T> Collected<T> {
    pub fn complete(items: Vec<T>) -> Self {
        Self { items, error: None }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Discards partial items when the sequence failed.
    pub fn into_result(self) -> Result<Vec<T>> {
        match self.error {
            None => Ok(self.items),
            Some(e) => Err(e),
        }
    }
}

/// Calls `fetch` with the previous page's token until no token is returned.
///
/// The first call gets `None`. `page_size` is passed through unchanged.
pub async fn paginate<T, F, Fut>(page_size: Option<i32>, mut fetch: F) -> Collected<T>
where
    F: FnMut(Option<String>, Option<i32>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut next_token: Option<String> = None;
    let mut calls = 0usize;

    loop {
        calls += 1;
        let page = match fetch(next_token.take(), page_size).await {
            Ok(page) => page,
            Err(e) => {
                log_debug!("Pagination stopped after {} calls with {} items: {:#}", calls, items.len(), e);
                return Collected {
                    items,
                    error: Some(e),
                };
            }
        };

        next_token = page.continuation().map(str::to_string);
        items.extend(page.items);

        if next_token.is_none() {
            break;
        }
    }

    trace_debug!("Pagination finished: {} calls, {} items", calls, items.len());
    Collected::complete(items)
}

/// Calls `describe` once per contiguous chunk of at most `batch_size` ids and
/// concatenates the results in chunk order. An empty id list makes no calls.
pub async fn describe_in_batches<T, F, Fut>(
    ids: &[String],
    batch_size: usize,
    mut describe: F,
) -> Collected<T>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut items = Vec::with_capacity(ids.len());

    for (index, chunk) in ids.chunks(batch_size.max(1)).enumerate() {
        match describe(chunk.to_vec()).await {
            Ok(described) => items.extend(described),
            Err(e) => {
                log_debug!("Describe batch {} of {} ids failed: {:#}", index, chunk.len(), e);
                return Collected {
                    items,
                    error: Some(e),
                };
            }
        }
    }

    Collected::complete(items)
}
