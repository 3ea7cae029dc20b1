//! Page-number pagination shared by every feed.
//!
//! A [`Paginator`] is pure: the same inputs always produce the same slice and
//! metadata, so it is safe to share between requests.

use std::num::NonZeroUsize;

use serde::Serialize;

/// Default number of posts shown on one feed page.
pub const POSTS_PER_PAGE: usize = 10;

/// A 1-indexed page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PageNumber(NonZeroUsize);

impl PageNumber {
    pub const FIRST: PageNumber = PageNumber(NonZeroUsize::MIN);

    pub fn new(value: usize) -> Option<Self> {
        NonZeroUsize::new(value).map(Self)
    }

    /// Parse the `page` query value. Missing, non-numeric and non-positive
    /// values all resolve to the first page.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|value| value.trim().parse::<usize>().ok())
            .and_then(Self::new)
            .unwrap_or(Self::FIRST)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

/// Navigation metadata for one page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub number: usize,
    pub total_pages: usize,
    pub total_items: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PageMeta {
    pub fn previous_page_number(&self) -> Option<usize> {
        self.has_previous
            .then(|| (self.number - 1).min(self.total_pages))
    }

    pub fn next_page_number(&self) -> Option<usize> {
        self.has_next.then_some(self.number + 1)
    }

    /// Requested page lies past the last page (or the sequence is empty).
    pub fn is_beyond_last(&self) -> bool {
        self.number > self.total_pages
    }
}

/// Offset/limit pair for a storage query, together with the page metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u64,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    page_size: NonZeroUsize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(POSTS_PER_PAGE).unwrap_or(NonZeroUsize::MIN))
    }
}

impl Paginator {
    pub fn new(page_size: NonZeroUsize) -> Self {
        Self { page_size }
    }

    /// Compute the slice bounds for `page` over `total_items` entries.
    pub fn window(&self, total_items: u64, page: PageNumber) -> PageWindow {
        let size = self.page_size.get() as u64;
        let total_pages = usize::try_from(total_items.div_ceil(size)).unwrap_or(usize::MAX);
        let number = page.get();

        let meta = PageMeta {
            number,
            total_pages,
            total_items,
            has_previous: number > 1 && total_pages > 0,
            has_next: number < total_pages,
        };

        let offset = (number as u64 - 1).saturating_mul(size);
        let limit = if meta.is_beyond_last() {
            0
        } else {
            size.min(total_items - offset)
        };

        PageWindow {
            offset,
            limit,
            meta,
        }
    }

    /// Slice an already ordered sequence.
    pub fn paginate<T>(&self, items: Vec<T>, page: PageNumber) -> Page<T> {
        let window = self.window(items.len() as u64, page);
        let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(window.limit).unwrap_or(0);

        let items = items.into_iter().skip(offset).take(limit).collect();
        Page {
            items,
            meta: window.meta,
        }
    }
}
