//! Product aggregate with embedded reviews and a derived rating aggregate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Review {
    pub user_id: Uuid,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Rating {
    pub average: f64,
    pub count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub sku: Option<String>,
    pub brand: Option<String>,
    pub images: Vec<String>,
    pub category_id: Option<Uuid>,
    pub stock: i32,
    /// Gates both catalog visibility and orderability.
    pub is_active: bool,
    pub is_featured: bool,
    pub rating: Rating,
    pub reviews: Vec<Review>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(name: String, description: String, price: Decimal, stock: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            price,
            original_price: None,
            sku: None,
            brand: None,
            images: vec![],
            category_id: None,
            stock,
            is_active: true,
            is_featured: false,
            rating: Rating::default(),
            reviews: vec![],
            tags: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Append a review and recompute the aggregate.
    pub fn add_review(&mut self, user_id: Uuid, rating: u8, comment: Option<String>) {
        self.reviews.push(Review {
            user_id,
            rating,
            comment,
            created_at: Utc::now(),
        });
        let count = self.reviews.len() as u32;
        let sum: u32 = self.reviews.iter().map(|r| r.rating as u32).sum();
        self.rating = Rating {
            average: f64::from(sum) / f64::from(count),
            count,
        };
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rating_aggregate_recomputed() {
        let mut p = Product::new("Widget".into(), "desc".into(), dec!(9.99), 3);
        p.add_review(Uuid::new_v4(), 5, None);
        p.add_review(Uuid::new_v4(), 4, Some("fine".into()));
        assert_eq!(p.rating.count, 2);
        assert!((p.rating.average - 4.5).abs() < f64::EPSILON);
    }
}
