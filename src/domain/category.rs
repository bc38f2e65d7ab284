//! Hierarchical categories: parent reference plus a materialized path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    /// Ancestor ids from root to parent.
    pub path: Vec<Uuid>,
    pub level: u32,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Build a category under an optional parent, deriving slug, path and
    /// level from it.
    pub fn new(name: String, description: Option<String>, parent: Option<&Category>) -> Self {
        let now = Utc::now();
        let (path, level) = match parent {
            Some(p) => {
                let mut path = p.path.clone();
                path.push(p.id);
                (path, p.level + 1)
            }
            None => (vec![], 0),
        };
        Self {
            id: Uuid::new_v4(),
            slug: slugify(&name),
            name,
            description,
            parent_id: parent.map(|p| p.id),
            path,
            level,
            is_active: true,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
