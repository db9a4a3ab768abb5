use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type ProductId = i64;
pub type CategoryId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignUpInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignInInput {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(rename = "_id")]
    pub id: CategoryId,
    pub title: String,
    pub slug: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub image: String,
}

impl NewCategory {
    /// The explicit slug if one was given, otherwise one derived from the title.
    pub fn resolved_slug(&self) -> String {
        match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => slugify(&self.title),
        }
    }

    pub fn into_category(self, id: CategoryId) -> Category {
        let slug = self.resolved_slug();
        Category {
            id,
            title: self.title,
            slug,
            image: self.image,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image: String,
    pub category_id: Option<CategoryId>,
    pub amount: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image: String,
    pub category_id: Option<CategoryId>,
    pub amount: u32,
}

impl NewProduct {
    pub fn into_product(self, id: ProductId) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price.round_dp(2),
            image: self.image,
            category_id: self.category_id,
            amount: self.amount,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductImage {
    #[serde(rename = "_id")]
    pub id: i64,
    pub product_id: ProductId,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: i64,
    pub product_id: ProductId,
    pub name: String,
    pub email: String,
    pub content: String,
    pub rating: i32,
    pub created_at: DateTime<Utc>,
}

/// A comment that already passed validation.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub product_id: ProductId,
    pub name: String,
    pub email: String,
    pub content: String,
    pub rating: i32,
}

impl NewComment {
    pub fn into_comment(self, id: i64) -> Comment {
        Comment {
            id,
            product_id: self.product_id,
            name: self.name,
            email: self.email,
            content: self.content,
            rating: self.rating,
            created_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CartItem {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Like {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub created_at: DateTime<Utc>,
}

/// Lowercases, drops anything that is not alphanumeric, space or hyphen,
/// and collapses runs of whitespace and hyphens into a single hyphen.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Wild Flower Honey"), "wild-flower-honey");
        assert_eq!(slugify("  Comb -- Honey! "), "comb-honey");
        assert_eq!(slugify("Jams & Preserves"), "jams-preserves");
    }

    #[test]
    fn explicit_slug_wins_over_title() {
        let category = NewCategory {
            title: "Honey Sticks".into(),
            slug: Some("sticks".into()),
            image: String::new(),
        };
        assert_eq!(category.resolved_slug(), "sticks");

        let blank = NewCategory {
            title: "Honey Sticks".into(),
            slug: Some("  ".into()),
            image: String::new(),
        };
        assert_eq!(blank.into_category(7).slug, "honey-sticks");
    }
}
