//! List query model: sorting, paging and the per-message filter.
//!
//! On the wire a query is a flat set of URL parameters (`key`, `order`,
//! `page`, `page_size`, `message_id`). [`ListQuery`] is the validated form;
//! [`ListParams`] is the raw form the backend extracts from the URL.

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{RecordId, Resource, ValidationError};

/// Upper bound on rows per page.
pub const MAX_PAGE_SIZE: u32 = 500;
/// Page size used when a page index arrives without a size.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

// =============================================================================
// SORTING
// =============================================================================

/// Sort direction token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ValidationError::UnknownOrder(other.to_owned())),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sort criterion for a list query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sorting {
    pub key: String,
    pub order: SortOrder,
}

impl Sorting {
    #[must_use]
    pub fn asc(key: impl Into<String>) -> Self {
        Self { key: key.into(), order: SortOrder::Asc }
    }

    #[must_use]
    pub fn desc(key: impl Into<String>) -> Self {
        Self { key: key.into(), order: SortOrder::Desc }
    }

    /// Build a sorting from raw key/order tokens.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownOrder`] for an order outside `asc`/`desc`.
    pub fn parse(key: &str, order: &str) -> Result<Self, ValidationError> {
        Ok(Self { key: key.to_owned(), order: order.parse()? })
    }

    /// Check that the key names a field of `R`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownSortKey`] otherwise.
    pub fn validate_for<R: Resource>(&self) -> Result<(), ValidationError> {
        self.column::<R>().map(|_| ())
    }

    /// The static field name matching the key, safe to splice into SQL.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownSortKey`] if `R` has no such field.
    pub fn column<R: Resource>(&self) -> Result<&'static str, ValidationError> {
        R::FIELDS
            .iter()
            .copied()
            .find(|field| *field == self.key)
            .ok_or_else(|| ValidationError::UnknownSortKey { kind: R::KIND, key: self.key.clone() })
    }

    fn compare<R: Resource>(&self, a: &R, b: &R) -> Ordering {
        let by_key = self.order.apply(a.field(&self.key).cmp(&b.field(&self.key)));
        by_key.then_with(|| a.id().cmp(&b.id()))
    }
}

/// Order rows by `sorting`, or by ascending id when there is none.
/// Ties on the sort key fall back to ascending id.
pub fn sort_records<R: Resource>(rows: &mut [R], sorting: Option<&Sorting>) {
    match sorting {
        Some(sorting) => rows.sort_by(|a, b| sorting.compare(a, b)),
        None => rows.sort_by_key(R::id),
    }
}

/// Whether `rows` are monotonically ordered by the sort key.
#[must_use]
pub fn is_ordered<R: Resource>(rows: &[R], sorting: &Sorting) -> bool {
    rows.windows(2).all(|pair| {
        let ordering = sorting.order.apply(pair[0].field(&sorting.key).cmp(&pair[1].field(&sorting.key)));
        ordering != Ordering::Greater
    })
}

// =============================================================================
// PAGING
// =============================================================================

/// Zero-based page window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Page {
    pub index: u32,
    pub size: u32,
}

impl Page {
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPageSize`] unless `1 <= size <= MAX_PAGE_SIZE`.
    pub fn new(index: u32, size: u32) -> Result<Self, ValidationError> {
        let page = Self { index, size };
        page.validate()?;
        Ok(page)
    }

    /// # Errors
    ///
    /// See [`Page::new`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.size == 0 || self.size > MAX_PAGE_SIZE {
            return Err(ValidationError::InvalidPageSize { size: self.size, max: MAX_PAGE_SIZE });
        }
        Ok(())
    }

    /// Number of rows skipped before this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.index) * u64::from(self.size)
    }
}

/// Keep only the rows inside `page`.
#[must_use]
pub fn paginate<R>(rows: Vec<R>, page: Option<Page>) -> Vec<R> {
    let Some(page) = page else {
        return rows;
    };
    let skip = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    rows.into_iter().skip(skip).take(page.size as usize).collect()
}

// =============================================================================
// LIST QUERY
// =============================================================================

/// Validated list request parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ListQuery {
    pub sorting: Option<Sorting>,
    pub page: Option<Page>,
    pub message_id: Option<RecordId>,
}

impl ListQuery {
    #[must_use]
    pub fn sorted_by(mut self, sorting: Sorting) -> Self {
        self.sorting = Some(sorting);
        self
    }

    #[must_use]
    pub fn paged(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn for_message(mut self, message_id: RecordId) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// Check every part of the query against record kind `R`.
    ///
    /// # Errors
    ///
    /// Returns the first invalid part: sort key, page size, or a message
    /// filter on a kind that has no `message_id`.
    pub fn validate_for<R: Resource>(&self) -> Result<(), ValidationError> {
        if let Some(sorting) = &self.sorting {
            sorting.validate_for::<R>()?;
        }
        if let Some(page) = &self.page {
            page.validate()?;
        }
        if let Some(message_id) = self.message_id {
            if !R::filterable_by_message() {
                return Err(ValidationError::UnsupportedFilter { kind: R::KIND });
            }
            crate::check_id(crate::RecordKind::Message, message_id)?;
        }
        Ok(())
    }

    /// URL query parameters, in a stable order.
    #[must_use]
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(sorting) = &self.sorting {
            params.push(("key", sorting.key.clone()));
            params.push(("order", sorting.order.as_str().to_owned()));
        }
        if let Some(page) = &self.page {
            params.push(("page", page.index.to_string()));
            params.push(("page_size", page.size.to_string()));
        }
        if let Some(message_id) = self.message_id {
            params.push(("message_id", message_id.to_string()));
        }
        params
    }
}

/// Raw URL parameters of a list request, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    pub key: Option<String>,
    pub order: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub message_id: Option<RecordId>,
}

impl ListParams {
    /// Validate the raw parameters for record kind `R`.
    ///
    /// A missing `order` defaults to ascending; a page index without a size
    /// uses [`DEFAULT_PAGE_SIZE`], and a size without an index starts at page 0.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an unknown key or order, an order
    /// without a key, a bad page size, or an unsupported filter.
    pub fn into_query<R: Resource>(self) -> Result<ListQuery, ValidationError> {
        let sorting = match (self.key, self.order) {
            (Some(key), order) => {
                let order = order.as_deref().map_or(Ok(SortOrder::Asc), |raw| raw.parse::<SortOrder>())?;
                Some(Sorting { key, order })
            }
            (None, Some(_)) => return Err(ValidationError::MissingSortKey),
            (None, None) => None,
        };
        let page = match (self.page, self.page_size) {
            (None, None) => None,
            (index, size) => Some(Page::new(index.unwrap_or(0), size.unwrap_or(DEFAULT_PAGE_SIZE))?),
        };
        let query = ListQuery { sorting, page, message_id: self.message_id };
        query.validate_for::<R>()?;
        Ok(query)
    }
}
