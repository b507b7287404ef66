//! Cursor pagination - Keyset pagination over integer primary keys.
//!
//! Every list operation goes through [`paginate`]. Arguments follow the
//! `{after, before, first, last}` shape: `first` (optionally with `after`)
//! pages forward, `last` (optionally with `before`) pages backward, and no
//! arguments at all yields the first [`DEFAULT_PAGE_SIZE`] rows. One extra row
//! is fetched to find out whether another page exists in the paging direction.
//!
//! Cursors are the decimal id of a row. A cursor that does not parse is
//! treated as absent.

use crate::{
    entities::{
        adjustment_reason, author, book, inventory_adjustment, invoice, invoice_item, order,
        order_item, publisher, transaction, vendor,
    },
    errors::{Error, Result},
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Select,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Page size used when neither `first` nor `last` is given.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Rows that can be paged by their integer key.
pub trait Keyed {
    /// Monotonically increasing key used as the cursor.
    fn key(&self) -> i64;
}

macro_rules! impl_keyed {
    ($($model:path),+ $(,)?) => {
        $(
            impl Keyed for $model {
                fn key(&self) -> i64 {
                    self.id
                }
            }
        )+
    };
}

impl_keyed!(
    adjustment_reason::Model,
    author::Model,
    book::Model,
    inventory_adjustment::Model,
    invoice::Model,
    invoice_item::Model,
    order::Model,
    order_item::Model,
    publisher::Model,
    transaction::Model,
    vendor::Model,
);

/// Caller-supplied paging arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageArgs {
    /// Return rows strictly after this cursor
    #[serde(default)]
    pub after: Option<String>,
    /// Return rows strictly before this cursor
    #[serde(default)]
    pub before: Option<String>,
    /// Page forward by this many rows
    #[serde(default)]
    pub first: Option<u64>,
    /// Page backward by this many rows
    #[serde(default)]
    pub last: Option<u64>,
}

impl PageArgs {
    /// Forward page of `count` rows from the start.
    #[must_use]
    pub const fn first(count: u64) -> Self {
        Self {
            after: None,
            before: None,
            first: Some(count),
            last: None,
        }
    }

    /// Backward page of `count` rows from the end.
    #[must_use]
    pub const fn last(count: u64) -> Self {
        Self {
            after: None,
            before: None,
            first: None,
            last: Some(count),
        }
    }

    /// Starts after `cursor`.
    #[must_use]
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }

    /// Ends before `cursor`.
    #[must_use]
    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.before = Some(cursor.into());
        self
    }

    /// Validates the arguments and resolves them into a fetch plan.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] when both directions are mixed or a page
    /// size exceeds [`MAX_PAGE_SIZE`].
    pub fn plan(&self) -> Result<PagePlan> {
        if self.after.is_some() && self.before.is_some() {
            return Err(Error::validation(
                "Cannot paginate with both 'after' and 'before'",
            ));
        }
        if self.first.is_some() && self.last.is_some() {
            return Err(Error::validation(
                "Cannot paginate with both 'first' and 'last'",
            ));
        }
        if self.first.is_some() && self.before.is_some() {
            return Err(Error::validation("'first' cannot be combined with 'before'"));
        }
        if self.last.is_some() && self.after.is_some() {
            return Err(Error::validation("'last' cannot be combined with 'after'"));
        }
        if let Some(size) = self
            .first
            .or(self.last)
            .filter(|size| *size > MAX_PAGE_SIZE)
        {
            return Err(Error::validation(format!(
                "Page size {size} exceeds the maximum of {MAX_PAGE_SIZE}"
            )));
        }

        let plan = if self.last.is_some() || self.before.is_some() {
            PagePlan {
                direction: Direction::Backward,
                limit: self.last.unwrap_or(DEFAULT_PAGE_SIZE),
                cursor: parse_cursor(self.before.as_deref()),
            }
        } else {
            PagePlan {
                direction: Direction::Forward,
                limit: self.first.unwrap_or(DEFAULT_PAGE_SIZE),
                cursor: parse_cursor(self.after.as_deref()),
            }
        };
        Ok(plan)
    }
}

fn parse_cursor(raw: Option<&str>) -> Option<i64> {
    let raw = raw?;
    match raw.trim().parse::<i64>() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(cursor = raw, "Ignoring unparsable pagination cursor");
            None
        }
    }
}

/// Paging direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending ids after the cursor
    Forward,
    /// Descending ids before the cursor
    Backward,
}

/// Validated fetch plan derived from [`PageArgs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    /// Scan direction
    pub direction: Direction,
    /// Rows to return; one more is fetched as a probe
    pub limit: u64,
    /// Exclusive boundary id
    pub cursor: Option<i64>,
}

impl PagePlan {
    /// Number of rows to fetch, including the probe row.
    #[must_use]
    pub const fn fetch_size(&self) -> u64 {
        self.limit.saturating_add(1)
    }

    /// Builds the page from fetched rows.
    ///
    /// `rows` must be in fetch order: ascending for forward plans, descending
    /// for backward plans. The returned items are always ascending.
    #[must_use]
    pub fn assemble<T: Keyed>(&self, mut rows: Vec<T>) -> Page<T> {
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let (has_next_page, has_previous_page) = match self.direction {
            Direction::Forward => (has_more, self.cursor.is_some()),
            Direction::Backward => {
                rows.reverse();
                (self.cursor.is_some(), has_more)
            }
        };

        Page {
            page_info: PageInfo {
                start_cursor: rows.first().map(|row| row.key().to_string()),
                end_cursor: rows.last().map(|row| row.key().to_string()),
                has_next_page,
                has_previous_page,
            },
            items: rows,
        }
    }
}

/// Position of a page within the full list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Id of the first row, if any
    pub start_cursor: Option<String>,
    /// Id of the last row, if any
    pub end_cursor: Option<String>,
    /// More rows follow the end cursor
    pub has_next_page: bool,
    /// More rows precede the start cursor
    pub has_previous_page: bool,
}

/// One page of rows plus its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Rows in ascending id order
    pub items: Vec<T>,
    /// Cursors and neighbour flags
    pub page_info: PageInfo,
}

/// Runs `query` as a keyset page over `key`.
///
/// Any filters already on `query` are kept; ordering and limit are set here.
pub async fn paginate<E, C>(
    db: &C,
    query: Select<E>,
    key: E::Column,
    args: &PageArgs,
) -> Result<Page<E::Model>>
where
    E: EntityTrait,
    E::Model: Keyed,
    C: ConnectionTrait,
{
    let plan = args.plan()?;

    let query = match (plan.direction, plan.cursor) {
        (Direction::Forward, Some(cursor)) => query.filter(key.gt(cursor)).order_by_asc(key),
        (Direction::Forward, None) => query.order_by_asc(key),
        (Direction::Backward, Some(cursor)) => query.filter(key.lt(cursor)).order_by_desc(key),
        (Direction::Backward, None) => query.order_by_desc(key),
    };

    let rows = query.limit(plan.fetch_size()).all(db).await?;
    Ok(plan.assemble(rows))
}
