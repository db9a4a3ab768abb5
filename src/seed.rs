//! Loads a JSON catalog into an empty store at startup.
//!
//! ```json
//! {
//!   "categories": [{ "title": "Raw Honey", "image": "/media/category_images/raw.jpg" }],
//!   "products": [{
//!     "name": "Acacia Honey", "price": "12.50", "image": "/media/product_images/acacia.jpg",
//!     "category": "Raw Honey", "amount": 40, "images": ["/media/product_images/acacia-2.jpg"]
//!   }]
//! }
//! ```

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{Result, ShopError};
use crate::models::{NewCategory, NewProduct};
use crate::store::{ProductFilter, Store};

#[derive(Debug, Deserialize)]
pub struct SeedCatalog {
    #[serde(default)]
    pub categories: Vec<NewCategory>,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub image: String,
    /// Category title.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub amount: u32,
    #[serde(default)]
    pub images: Vec<String>,
}

pub fn read(path: &Path) -> Result<SeedCatalog> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ShopError::Config(format!("Cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| ShopError::Config(format!("Invalid seed file {}: {e}", path.display())))
}

/// Skipped when the store already holds products.
pub async fn apply(store: &dyn Store, catalog: SeedCatalog) -> Result<usize> {
    if store.count_products(&ProductFilter::All).await? > 0 {
        log::info!("Store already has products, skipping seed");
        return Ok(0);
    }

    for category in catalog.categories {
        if store.find_category_by_title(&category.title).await?.is_none() {
            store.create_category(category).await?;
        }
    }

    let mut created = 0;
    for seed in catalog.products {
        let category_id = match seed.category.as_deref() {
            Some(title) => Some(
                store
                    .find_category_by_title(title)
                    .await?
                    .ok_or(ShopError::NotFound("Category"))?
                    .id,
            ),
            None => None,
        };
        let product = store
            .create_product(NewProduct {
                name: seed.name,
                description: seed.description,
                price: seed.price,
                image: seed.image,
                category_id,
                amount: seed.amount,
            })
            .await?;
        for image in seed.images {
            store.add_product_image(product.id, image).await?;
        }
        created += 1;
    }

    log::info!("Seeded {created} products");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const CATALOG: &str = r#"{
        "categories": [{ "title": "Raw Honey" }, { "title": "Gifts", "slug": "gift-boxes" }],
        "products": [
            { "name": "Acacia Honey", "price": "12.50", "category": "Raw Honey",
              "amount": 40, "images": ["/media/a1.jpg", "/media/a2.jpg"] },
            { "name": "Tasting Set", "price": "30", "category": "Gifts" },
            { "name": "Honey Spoon", "price": "3.20" }
        ]
    }"#;

    #[actix_web::test]
    async fn seed_creates_catalog_once() {
        let store = MemoryStore::new();
        let catalog: SeedCatalog = serde_json::from_str(CATALOG).unwrap();
        assert_eq!(apply(&store, catalog).await.unwrap(), 3);

        let raw = store.find_category_by_slug("raw-honey").await.unwrap().unwrap();
        assert!(store.find_category_by_slug("gift-boxes").await.unwrap().is_some());
        assert_eq!(
            store
                .count_products(&ProductFilter::Category(raw.id))
                .await
                .unwrap(),
            1
        );
        let acacia = &store
            .list_products(&ProductFilter::NameContains("acacia".into()), 0, None)
            .await
            .unwrap()[0];
        assert_eq!(acacia.price, Decimal::new(1250, 2));
        assert_eq!(store.product_images(acacia.id).await.unwrap().len(), 2);

        let again: SeedCatalog = serde_json::from_str(CATALOG).unwrap();
        assert_eq!(apply(&store, again).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn unknown_category_title_fails() {
        let store = MemoryStore::new();
        let catalog: SeedCatalog = serde_json::from_str(
            r#"{ "products": [{ "name": "Orphan", "price": "1", "category": "Missing" }] }"#,
        )
        .unwrap();
        assert!(matches!(
            apply(&store, catalog).await,
            Err(ShopError::NotFound("Category"))
        ));
    }
}
