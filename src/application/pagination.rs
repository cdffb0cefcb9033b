//! Page-number pagination shared by every post listing.

use serde::Serialize;

/// Posts shown per listing page.
pub const POSTS_ON_PAGE: u32 = 10;

/// Resolved position of a requested page within a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub number: u32,
    pub num_pages: u32,
    pub per_page: u32,
    pub total: u64,
}

impl PageWindow {
    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u32 {
        self.per_page
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

/// One page of an ordered result set plus the metadata needed for navigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub num_pages: u32,
    pub total: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn from_window(items: Vec<T>, window: PageWindow) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total: window.total,
            has_next: window.has_next(),
            has_previous: window.has_previous(),
        }
    }

    pub fn next_number(&self) -> Option<u32> {
        self.has_next.then_some(self.number + 1)
    }

    pub fn previous_number(&self) -> Option<u32> {
        self.has_previous.then_some(self.number - 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total: self.total,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    per_page: u32,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(POSTS_ON_PAGE)
    }
}

impl Paginator {
    pub fn new(per_page: u32) -> Self {
        Self {
            per_page: per_page.max(1),
        }
    }

    /// Resolve the raw `page` query value against `total` items.
    ///
    /// Missing or non-numeric values select the first page; numbers outside
    /// `1..=num_pages` are clamped to the nearest end. A result set without
    /// items still has a single empty page.
    pub fn window(&self, total: u64, requested: Option<&str>) -> PageWindow {
        let per_page = u64::from(self.per_page);
        let num_pages = total.div_ceil(per_page).clamp(1, u64::from(u32::MAX)) as u32;

        let number = match requested.map(str::trim) {
            None => 1,
            Some(raw) => match raw.parse::<i64>() {
                Ok(value) if value < 1 => 1,
                Ok(value) => value.min(i64::from(num_pages)) as u32,
                // digits only but too large for i64
                Err(_) if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => num_pages,
                Err(_) => 1,
            },
        };

        PageWindow {
            number,
            num_pages,
            per_page: self.per_page,
            total,
        }
    }

    /// Slice an in-memory ordered sequence into the requested page.
    pub fn page<T>(&self, items: Vec<T>, requested: Option<&str>) -> Page<T> {
        let window = self.window(items.len() as u64, requested);
        let start = window.offset() as usize;
        let items = items
            .into_iter()
            .skip(start)
            .take(self.per_page as usize)
            .collect();
        Page::from_window(items, window)
    }
}
