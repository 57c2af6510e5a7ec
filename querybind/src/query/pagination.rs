//! Paging and ordering input

use serde::{Deserialize, Serialize};

use crate::naming::to_column_name;

pub const DEFAULT_PAGE_SIZE: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn to_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One `field[:ASC|DESC]` term of an order-by string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    /// Field name, normalized to snake case.
    pub field: String,
    pub direction: Direction,
}

/// Page request from a transport payload.
///
/// `order_by` is `field[:ASC|DESC][,field[:ASC|DESC]]...`. `total_count` is
/// filled in by the service once the count query has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    /// 1-based page number
    pub page_index: u64,
    pub page_size: u64,
    pub order_by: Option<String>,
    pub total_count: Option<i64>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_index: 1,
            page_size: DEFAULT_PAGE_SIZE,
            order_by: None,
            total_count: None,
        }
    }
}

impl Pagination {
    pub fn new(page_index: u64, page_size: u64) -> Self {
        Self {
            page_index,
            page_size,
            ..Default::default()
        }
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn order_items(&self) -> Vec<OrderItem> {
        let Some(order_by) = &self.order_by else {
            return Vec::new();
        };

        order_by
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .filter_map(|term| {
                let (field, dir) = match term.split_once(':') {
                    Some((f, d)) => (f.trim(), d.trim()),
                    None => (term, ""),
                };
                if field.is_empty() {
                    return None;
                }
                let direction = if dir.eq_ignore_ascii_case("desc") {
                    Direction::Desc
                } else {
                    Direction::Asc
                };
                Some(OrderItem {
                    field: to_column_name(field),
                    direction,
                })
            })
            .collect()
    }

    /// Field names referenced by the order-by string.
    pub fn order_field_names(&self) -> Vec<String> {
        self.order_items().into_iter().map(|i| i.field).collect()
    }

    pub fn offset(&self) -> u64 {
        self.page_index.saturating_sub(1) * self.page_size
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }

    /// Clamp the page size into `1..=max` and the page index to at least 1.
    pub fn clamped(mut self, max: u64) -> Self {
        self.page_size = self.page_size.clamp(1, max.max(1));
        self.page_index = self.page_index.max(1);
        self
    }

    /// Number of pages once `total_count` is known.
    pub fn total_pages(&self) -> Option<u64> {
        let total = u64::try_from(self.total_count?).ok()?;
        Some(total.div_ceil(self.page_size.max(1)))
    }
}
