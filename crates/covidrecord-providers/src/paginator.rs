//! Cursor pagination over bundle `next` links.

use std::collections::HashSet;

use serde::de::DeserializeOwned;

use crate::bundle::Bundle;
use crate::error::{ProviderError, ProviderResult};
use crate::fetcher::FhirFetcher;
use crate::vaccination::{Vaccination, VaccinationSource, extract_vaccinations};

/// Follows `next` links and accumulates vaccinations page by page.
///
/// A traversal is bounded twice: a URL seen earlier in the same traversal
/// fails with [`ProviderError::PaginationLoop`], and reading more than
/// `max_pages` pages fails with [`ProviderError::PageLimitExceeded`].
pub struct BundlePaginator<'a> {
    fetcher: &'a FhirFetcher,
    access_token: &'a str,
    max_pages: usize,
}

impl<'a> BundlePaginator<'a> {
    #[must_use]
    pub fn new(fetcher: &'a FhirFetcher, access_token: &'a str, max_pages: usize) -> Self {
        Self {
            fetcher,
            access_token,
            max_pages,
        }
    }

    /// Extracts from `first`, then from every page it links to.
    ///
    /// `first_url` is the URL `first` was read from; it counts as visited.
    /// Results are appended in traversal order without deduplication.
    ///
    /// # Errors
    ///
    /// The first fetch, decode, extraction or bound violation ends the
    /// traversal and is returned.
    pub async fn collect<R>(
        &self,
        first_url: &str,
        first: Bundle<R>,
    ) -> ProviderResult<Vec<Vaccination>>
    where
        R: VaccinationSource + DeserializeOwned,
    {
        let mut visited = HashSet::from([first_url.to_string()]);
        let mut pages = 1usize;
        let mut vaccinations = extract_vaccinations(&first)?;
        let mut next = first.next_link().map(str::to_string);

        while let Some(url) = next {
            if !visited.insert(url.clone()) {
                tracing::warn!(url = %url, "bundle links back to a visited page");
                return Err(ProviderError::PaginationLoop { url });
            }
            if pages >= self.max_pages {
                tracing::warn!(limit = self.max_pages, "bundle page limit reached");
                return Err(ProviderError::PageLimitExceeded {
                    limit: self.max_pages,
                });
            }

            let page: Bundle<R> = self.fetcher.get_json(&url, self.access_token).await?;
            pages += 1;
            vaccinations.extend(extract_vaccinations(&page)?);
            next = page.next_link().map(str::to_string);
        }

        tracing::debug!(pages, count = vaccinations.len(), "collected vaccinations");
        Ok(vaccinations)
    }
}
