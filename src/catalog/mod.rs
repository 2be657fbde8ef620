/// Course catalog: course records, admin edits and the paginated list cache

mod cache;

pub use cache::{CatalogCache, CatalogError, CoursePage, CourseQuery};

use crate::{error::FieldError, ledger::Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const UNCATEGORIZED: &str = "Uncategorized";

/// Course difficulty. `Corporate` only appears on package placeholder rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
    Corporate,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
            Level::Corporate => "Corporate",
        }
    }

    /// Levels an admin may assign through the edit form
    pub fn from_editable(s: &str) -> Option<Self> {
        match s {
            "Beginner" => Some(Level::Beginner),
            "Intermediate" => Some(Level::Intermediate),
            "Advanced" => Some(Level::Advanced),
            _ => None,
        }
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Beginner
    }
}

/// Catalog course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub instructor: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: Money,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: Level,
    #[serde(default, deserialize_with = "null_as_default")]
    pub students: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rating: f64,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    /// Joined category name
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Nullable columns read as their default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Course {
    pub fn category_name(&self) -> &str {
        self.category.as_deref().unwrap_or(UNCATEGORIZED)
    }

    /// Stored image, or a deterministic placeholder seeded from the id
    pub fn image_or_fallback(&self) -> String {
        match self.image_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                let seed: String = self
                    .id
                    .to_string()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect();
                format!("https://picsum.photos/seed/{}/900/600", seed)
            }
        }
    }

    /// Coarse hours estimate from the free-text duration ("12 hours" -> 12)
    pub fn duration_hours(&self) -> u32 {
        duration_hours(&self.duration)
    }
}

pub fn duration_hours(duration: &str) -> u32 {
    let digits: String = duration
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Course category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

/// Row for inserting a course
#[derive(Debug, Clone, Serialize)]
pub struct NewCourse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub instructor: String,
    pub price: Money,
    pub image_url: Option<String>,
    pub duration: String,
    pub level: Level,
    pub students: i64,
    pub rating: f64,
    pub category_id: Option<Uuid>,
}

/// Column-level partial update
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoursePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl CoursePatch {
    pub fn is_empty(&self) -> bool {
        *self == CoursePatch::default()
    }

    pub fn apply_to(&self, course: &mut Course) {
        if let Some(title) = &self.title {
            course.title = title.clone();
        }
        if let Some(description) = &self.description {
            course.description = description.clone();
        }
        if let Some(instructor) = &self.instructor {
            course.instructor = instructor.clone();
        }
        if let Some(price) = self.price {
            course.price = price;
        }
        if let Some(duration) = &self.duration {
            course.duration = duration.clone();
        }
        if let Some(level) = self.level {
            course.level = level;
        }
        if let Some(students) = self.students {
            course.students = students;
        }
        if let Some(rating) = self.rating {
            course.rating = rating;
        }
        if let Some(image_url) = &self.image_url {
            course.image_url = Some(image_url.clone());
        }
    }
}

/// Admin edit form payload
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CourseUpdate {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "Instructor cannot be empty"))]
    pub instructor: Option<String>,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: Option<f64>,
    pub duration: Option<String>,
    pub level: Option<String>,
    #[validate(range(min = 0, message = "Students cannot be negative"))]
    pub students: Option<i64>,
    #[validate(range(min = 0.0, max = 5.0, message = "Rating must be between 0 and 5"))]
    pub rating: Option<f64>,
    /// Maps to `image_url`; an empty string clears the image
    pub image: Option<String>,
}

impl CourseUpdate {
    /// Validate every field and produce the column patch
    pub fn into_patch(self) -> Result<CoursePatch, Vec<FieldError>> {
        let mut errors = Vec::new();

        if let Err(validation) = self.validate() {
            for (field, failures) in validation.field_errors() {
                for failure in failures.iter() {
                    let message = failure
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid {}", field));
                    errors.push(FieldError::new(field.to_string(), message));
                }
            }
        }

        let level = match self.level.as_deref() {
            None => None,
            Some(raw) => match Level::from_editable(raw) {
                Some(level) => Some(level),
                None => {
                    errors.push(FieldError::new(
                        "level",
                        "Invalid level. Must be Beginner, Intermediate, or Advanced",
                    ));
                    None
                }
            },
        };

        if matches!(self.rating, Some(r) if r.is_nan()) {
            errors.push(FieldError::new("rating", "Rating must be between 0 and 5"));
        }

        let price = match self.price {
            None => None,
            Some(p) => match Money::from_decimal(p) {
                Some(money) => Some(money),
                None => {
                    errors.push(FieldError::new("price", "Price must be a number"));
                    None
                }
            },
        };

        if !errors.is_empty() {
            errors.sort_by(|a, b| a.field.cmp(&b.field));
            return Err(errors);
        }

        Ok(CoursePatch {
            title: self.title,
            description: self.description,
            instructor: self.instructor,
            price,
            duration: self.duration,
            level,
            students: self.students,
            rating: self.rating,
            image_url: self.image,
        })
    }
}
