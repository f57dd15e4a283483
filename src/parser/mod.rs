pub mod rows;

use crate::error::Result;
use crate::fetcher::RawPage;
use crate::records::RepositoryRecord;

/// Listing page → repository records, in document order.
pub fn process_page(page: &RawPage, site_origin: &str) -> Result<Vec<RepositoryRecord>> {
    rows::parse(&page.body, &page.source_url, site_origin)
}
