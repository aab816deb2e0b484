//! Streaming helpers for walking paginated library listings without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::TryStreamExt;
use reqwest::Method;
use serde::de::DeserializeOwned;

use super::client::ZoteroClient;
use super::types::LibraryError;

/// Largest page the library API serves.
pub(crate) const PAGE_SIZE: usize = 100;

const TOTAL_RESULTS_HEADER: &str = "Total-Results";

/// Stream every record under `path`, requesting pages of [`PAGE_SIZE`] until exhausted.
pub(crate) fn stream_records<'a, T>(
    client: &'a ZoteroClient,
    path: String,
) -> impl Stream<Item = Result<T, LibraryError>> + 'a
where
    T: DeserializeOwned + 'a,
{
    try_stream! {
        let mut start = 0usize;

        loop {
            let response = client
                .request(Method::GET, &path)
                .query(&[("start", start), ("limit", PAGE_SIZE)])
                .send()
                .await?;
            let response = client.check_status(response, &path).await?;

            let total = response
                .headers()
                .get(TOTAL_RESULTS_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<usize>().ok());

            let page: Vec<T> = response.json().await?;
            let fetched = page.len();
            for record in page {
                yield record;
            }

            start += fetched;
            let exhausted = match total {
                Some(total) => start >= total,
                None => fetched < PAGE_SIZE,
            };
            if exhausted || fetched == 0 {
                break;
            }
        }
    }
}

/// Collect every record under `path` into a vector.
pub(crate) async fn collect_records<T>(
    client: &ZoteroClient,
    path: String,
) -> Result<Vec<T>, LibraryError>
where
    T: DeserializeOwned,
{
    stream_records(client, path).try_collect().await
}
