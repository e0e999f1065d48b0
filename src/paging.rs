//! Cursor-following retrieval of Graph collections.
//!
//! Graph wraps collections in `{ "value": [...], "@odata.nextLink": "..." }`.
//! The link is an opaque absolute URL; its absence marks the last page.
//! [`fetch_all`] follows it until it disappears and returns every item in
//! server order.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::client::GraphClient;

/// One page of an OData collection.
#[derive(Debug, Deserialize)]
pub struct ODataPage<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,

    /// Absolute URL of the next page, absent on the final page.
    #[serde(rename = "@odata.nextLink", alias = "nextLink", default)]
    pub next_link: Option<String>,
}

/// Retrieves every page of the collection at `path` (relative to the
/// client's base URL) and returns the concatenated items.
///
/// Pages are fetched strictly one after another. The result is
/// all-or-nothing: a failure on any page discards the pages already
/// collected and is returned to the caller unchanged.
///
/// # Errors
///
/// - `GraphError::Api` — a page request returned a non-success status.
/// - `GraphError::Parse` — a page did not match the `ODataPage` shape.
/// - `GraphError::Auth` / `GraphError::Network` — token or transport failure.
pub async fn fetch_all<T: DeserializeOwned>(
    client: &GraphClient,
    path: &str,
) -> crate::error::Result<Vec<T>> {
    let mut items = Vec::new();
    let mut page: ODataPage<T> = client.get(path).await?;
    let mut page_number = 1usize;

    loop {
        debug!(page = page_number, count = page.value.len(), "fetched page");
        items.extend(page.value);

        match page.next_link {
            Some(next) => {
                page = client.get_url(&next).await?;
                page_number += 1;
            }
            None => break,
        }
    }

    info!(pages = page_number, total = items.len(), "collection fetched");
    Ok(items)
}
