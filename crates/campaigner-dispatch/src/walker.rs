use campaigner_types::models::Subscriber;
use tracing::debug;

use crate::error::WalkError;
use crate::ports::{CampaignStore, Cursor, PageRequest};

pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Streams a campaign's recipients one keyset page at a time.
///
/// Only active, non-blacklisted subscribers are requested. The walk ends on
/// an empty page, or right after a page shorter than the page size.
pub struct BatchWalker<'a> {
    store: &'a dyn CampaignStore,
    user_id: i64,
    segment_ids: &'a [i64],
    page_size: u32,
    cursor: Cursor,
    exhausted: bool,
    pages_fetched: usize,
}

impl<'a> BatchWalker<'a> {
    pub fn new(store: &'a dyn CampaignStore, user_id: i64, segment_ids: &'a [i64], page_size: u32) -> Self {
        Self {
            store,
            user_id,
            segment_ids,
            page_size: page_size.max(1),
            cursor: Cursor::default(),
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Next non-empty page, or `None` once the walk is complete.
    pub fn next_page(&mut self) -> Result<Option<Vec<Subscriber>>, WalkError> {
        if self.exhausted {
            return Ok(None);
        }

        let request = PageRequest {
            user_id: self.user_id,
            segment_ids: self.segment_ids,
            exclude_blacklisted: true,
            active_only: true,
            after: self.cursor,
            limit: self.page_size,
        };
        let page = self.store.get_recipients_page(&request).map_err(WalkError::Fetch)?;
        self.pages_fetched += 1;

        let Some(last) = page.last() else {
            self.exhausted = true;
            return Ok(None);
        };
        self.cursor = Cursor::after(last);

        if page.len() < self.page_size as usize {
            self.exhausted = true;
        }

        debug!(
            user_id = self.user_id,
            page = self.pages_fetched,
            size = page.len(),
            cursor_id = self.cursor.id,
            "Fetched recipients page"
        );
        Ok(Some(page))
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use campaigner_types::models::{Campaign, SendLog};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    /// Serves pages from a fixed, pre-sorted subscriber list.
    struct PagedStore {
        subscribers: Vec<Subscriber>,
        requests: Mutex<Vec<(Cursor, u32)>>,
    }

    impl PagedStore {
        fn with(count: i64) -> Self {
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let subscribers = (1..=count)
                .map(|id| Subscriber {
                    id,
                    user_id: 1,
                    email: format!("s{}@x.io", id),
                    name: format!("Sub {}", id),
                    metadata: None,
                    active: true,
                    blacklisted: false,
                    // pairs share a timestamp so the id tiebreak matters
                    created_at: base + chrono::Duration::seconds(id / 2),
                })
                .collect();
            Self {
                subscribers,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl CampaignStore for PagedStore {
        fn get_campaign(&self, _: i64, _: i64) -> Result<Option<Campaign>> {
            Ok(None)
        }
        fn update_campaign(&self, _: &Campaign) -> Result<()> {
            Ok(())
        }
        fn begin_sending(&self, _: i64, _: i64, _: DateTime<Utc>) -> Result<bool> {
            Ok(false)
        }
        fn get_recipients_page(&self, request: &PageRequest<'_>) -> Result<Vec<Subscriber>> {
            self.requests.lock().unwrap().push((request.after, request.limit));
            Ok(self
                .subscribers
                .iter()
                .filter(|s| Cursor::after(s) > request.after)
                .take(request.limit as usize)
                .cloned()
                .collect())
        }
        fn create_send_log(&self, _: &SendLog) -> Result<()> {
            Ok(())
        }
    }

    fn walk_all(store: &PagedStore, page_size: u32) -> Vec<i64> {
        let mut walker = BatchWalker::new(store, 1, &[1], page_size);
        let mut seen = Vec::new();
        while let Some(page) = walker.next_page().unwrap() {
            seen.extend(page.iter().map(|s| s.id));
        }
        seen
    }

    #[test]
    fn visits_every_recipient_once_in_order() {
        for (count, page_size) in [(0, 10), (1, 10), (9, 10), (10, 10), (11, 10), (35, 7)] {
            let store = PagedStore::with(count);
            let seen = walk_all(&store, page_size);
            assert_eq!(seen, (1..=count).collect::<Vec<_>>(), "count={} page={}", count, page_size);
        }
    }

    #[test]
    fn short_page_ends_walk_without_extra_fetch() {
        let store = PagedStore::with(1500);
        let mut walker = BatchWalker::new(&store, 1, &[1], 1000);
        assert_eq!(walker.next_page().unwrap().unwrap().len(), 1000);
        assert_eq!(walker.next_page().unwrap().unwrap().len(), 500);
        assert!(walker.next_page().unwrap().is_none());
        assert_eq!(walker.pages_fetched(), 2);
        assert_eq!(walker.cursor().id, 1500);
    }

    #[test]
    fn full_last_page_needs_one_empty_fetch() {
        let store = PagedStore::with(20);
        walk_all(&store, 10);
        let requests = store.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].0, Cursor::default());
        assert_eq!(requests[1].0.id, 10);
        assert_eq!(requests[2].0.id, 20);
    }
}
