//! Page-number pagination shared by every post listing.
//!
//! Listings are addressed as `?page=N` (1-indexed). Unparsable or
//! non-positive numbers resolve to the first page; numbers past the last page,
//! including ones too large to represent, produce an empty page rather than an
//! error.

use std::num::IntErrorKind;

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// A requested page of an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    number: u32,
    size: u32,
}

impl PageRequest {
    /// Both values are clamped to at least one.
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    pub fn first(size: u32) -> Self {
        Self::new(1, size)
    }

    /// Resolve the raw `page` query value the way list views expect.
    /// Numbers too large for `u32` saturate, landing past the last page.
    pub fn from_query(raw: Option<&str>, size: u32) -> Self {
        let number = raw
            .and_then(|value| match value.trim().parse::<u32>() {
                Ok(number) => Some(number),
                Err(err) if *err.kind() == IntErrorKind::PosOverflow => Some(u32::MAX),
                Err(_) => None,
            })
            .filter(|value| *value >= 1)
            .unwrap_or(1);
        Self::new(number, size)
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }
}

/// A bounded slice of an ordered listing plus navigation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total: u64,
    pub num_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<u32>,
    pub previous_page_number: Option<u32>,
}

impl<T> Page<T> {
    /// Assemble a page from an already-sliced item list and the listing total.
    pub fn from_parts(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let num_pages = count_pages(total, request.size);
        let number = request.number;
        let has_next = number < num_pages;
        let has_previous = number > 1;

        Self {
            items,
            number,
            size: request.size,
            total,
            num_pages,
            has_next,
            has_previous,
            next_page_number: has_next.then(|| number + 1),
            previous_page_number: has_previous.then(|| number.min(num_pages.saturating_add(1)) - 1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Convert every item, stopping at the first failure.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            number: self.number,
            size: self.size,
            total: self.total,
            num_pages: self.num_pages,
            has_next: self.has_next,
            has_previous: self.has_previous,
            next_page_number: self.next_page_number,
            previous_page_number: self.previous_page_number,
        })
    }
}

/// Slice an already-ordered sequence into the requested page.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
    let size = request.size as usize;
    let slice = items.into_iter().skip(offset).take(size).collect();
    Page::from_parts(slice, total, request)
}

/// An empty listing still has one (empty) page.
fn count_pages(total: u64, size: u32) -> u32 {
    let size = u64::from(size.max(1));
    let pages = total.div_ceil(size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}
