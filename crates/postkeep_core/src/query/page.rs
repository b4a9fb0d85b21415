//! Ordering and pagination.

use crate::model::entity::{Entity, ValidationError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

/// Ordering over mapped properties. Empty means store order (by id).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn by(direction: Direction, properties: &[&str]) -> Self {
        Self {
            orders: properties
                .iter()
                .map(|property| Order {
                    property: (*property).to_string(),
                    direction,
                })
                .collect(),
        }
    }

    pub fn asc(property: &str) -> Self {
        Self::by(Direction::Asc, &[property])
    }

    pub fn desc(property: &str) -> Self {
        Self::by(Direction::Desc, &[property])
    }

    pub fn and(mut self, other: Sort) -> Self {
        self.orders.extend(other.orders);
        self
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Renders ` ORDER BY ...` for `T`, always ending with an id tiebreak.
    pub(crate) fn to_order_by<T: Entity>(&self) -> Result<String, ValidationError> {
        let mut terms = Vec::with_capacity(self.orders.len() + 1);
        for order in &self.orders {
            if !T::is_mapped_property(&order.property) {
                return Err(ValidationError::UnknownProperty {
                    entity: T::TABLE,
                    property: order.property.clone(),
                });
            }
            terms.push(format!("{} {}", order.property, order.direction.as_sql()));
        }
        if !self.orders.iter().any(|order| order.property == "id") {
            terms.push("id ASC".to_string());
        }
        Ok(format!(" ORDER BY {}", terms.join(", ")))
    }
}

/// Zero-based page index plus page size and ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    size: u32,
    sort: Sort,
}

impl PageRequest {
    pub fn of(page: u32, size: u32) -> Self {
        Self::of_sorted(page, size, Sort::unsorted())
    }

    pub fn of_sorted(page: u32, size: u32, sort: Sort) -> Self {
        Self { page, size, sort }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// `(limit, offset)` for this request.
    pub(crate) fn window(&self) -> Result<(u32, u64), ValidationError> {
        if self.size == 0 {
            return Err(ValidationError::InvalidPageSize(self.size));
        }
        Ok((self.size, u64::from(self.page) * u64::from(self.size)))
    }
}

/// One slice of a larger result plus the total it was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    content: Vec<T>,
    number: u32,
    size: u32,
    total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            number: request.page,
            size: request.size,
            total_elements,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total_elements.div_ceil(u64::from(self.size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.number) + 1 < self.total_pages()
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, Page, PageRequest, Sort};
    use crate::model::comment::Comment;
    use crate::model::entity::ValidationError;

    #[test]
    fn order_by_validates_properties_and_adds_tiebreak() {
        let sort = Sort::desc("up").and(Sort::asc("comment"));
        assert_eq!(
            sort.to_order_by::<Comment>().unwrap(),
            " ORDER BY up DESC, comment ASC, id ASC"
        );
        assert_eq!(
            Sort::by(Direction::Desc, &["id"])
                .to_order_by::<Comment>()
                .unwrap(),
            " ORDER BY id DESC"
        );
        assert!(matches!(
            Sort::asc("LENGTH(title)").to_order_by::<Comment>(),
            Err(ValidationError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn window_rejects_empty_pages() {
        assert_eq!(PageRequest::of(2, 10).window().unwrap(), (10, 20));
        assert_eq!(
            PageRequest::of(0, 0).window(),
            Err(ValidationError::InvalidPageSize(0))
        );
    }

    #[test]
    fn page_metadata() {
        let page = Page::new(vec![1, 2], &PageRequest::of(0, 2), 5);
        assert_eq!(page.total_pages(), 3);
        assert_eq!(page.number_of_elements(), 2);
        assert!(page.has_next());

        let json = serde_json::to_value(page.map(|n| n * 10)).unwrap();
        assert_eq!(json["content"], serde_json::json!([10, 20]));
        assert_eq!(json["total_elements"], 5);
    }
}
