use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::catalog;
use crate::error::{Result, ShopError};
use crate::middleware::Identity;
use crate::models::{Product, ProductId};
use crate::store::Store;

/// Product fields used to hydrate a client-side cart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image: String,
}

impl From<&Product> for CartProduct {
    fn from(product: &Product) -> Self {
        CartProduct {
            id: product.id,
            name: product.name.clone(),
            price: product.price,
            image: product.image.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLine {
    pub id: ProductId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedToCart {
    pub message: String,
    pub cart_count: u64,
}

pub async fn add_to_cart(
    store: &dyn Store,
    user: &Identity,
    product_id: ProductId,
    quantity: i64,
) -> Result<AddedToCart> {
    let quantity = u32::try_from(quantity)
        .ok()
        .filter(|q| *q >= 1)
        .ok_or_else(|| ShopError::validation("Quantity must be a positive integer"))?;
    let product = catalog::get_product(store, product_id).await?;

    let item = store
        .increment_cart_item(&user.user_id, product.id, quantity)
        .await?;
    log::info!(
        "User {} now has {} x product {} in cart",
        user.user_id,
        item.quantity,
        product.id
    );

    Ok(AddedToCart {
        message: format!("{} added to cart!", product.name),
        cart_count: store.count_cart_items(&user.user_id).await?,
    })
}

/// Removing a product that is not in the cart is not an error.
pub async fn remove_from_cart(
    store: &dyn Store,
    user: &Identity,
    product_id: ProductId,
) -> Result<Product> {
    let product = catalog::get_product(store, product_id).await?;
    if !store.delete_cart_item(&user.user_id, product.id).await? {
        log::debug!(
            "Product {} was not in the cart of user {}",
            product.id,
            user.user_id
        );
    }
    Ok(product)
}

pub async fn clear_cart(store: &dyn Store, user: &Identity) -> Result<u64> {
    let removed = store.clear_cart(&user.user_id).await?;
    log::info!("Cleared {removed} cart items for user {}", user.user_id);
    Ok(removed)
}

pub async fn list_cart(store: &dyn Store, user: &Identity) -> Result<Vec<CartLine>> {
    let items = store.cart_items(&user.user_id).await?;
    let ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
    let products: BTreeMap<ProductId, Product> = store
        .find_products_by_ids(&ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    Ok(items
        .into_iter()
        .filter_map(|item| {
            let product = products.get(&item.product_id)?;
            Some(CartLine {
                id: product.id,
                name: product.name.clone(),
                price: product.price,
                image: product.image.clone(),
                quantity: item.quantity,
                total_price: product.price * Decimal::from(item.quantity),
            })
        })
        .collect())
}

/// Unknown ids are left out of the mapping. Keys are the ids as strings.
pub async fn lookup_products(
    store: &dyn Store,
    ids: &[ProductId],
) -> Result<BTreeMap<String, CartProduct>> {
    Ok(store
        .find_products_by_ids(ids)
        .await?
        .iter()
        .map(|p| (p.id.to_string(), CartProduct::from(p)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::product;
    use crate::store::MemoryStore;

    async fn setup(price: Decimal) -> (MemoryStore, Product) {
        let store = MemoryStore::new();
        let p = store
            .create_product(product("Linden Honey", price, None))
            .await
            .unwrap();
        (store, p)
    }

    #[actix_web::test]
    async fn repeated_adds_accumulate_quantity() {
        let (store, p) = setup(Decimal::ONE).await;
        let user = Identity::new("u1");

        add_to_cart(&store, &user, p.id, 2).await.unwrap();
        let added = add_to_cart(&store, &user, p.id, 3).await.unwrap();

        assert_eq!(added.cart_count, 1);
        assert_eq!(added.message, "Linden Honey added to cart!");
        let items = store.cart_items("u1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 5);
    }

    #[actix_web::test]
    async fn concurrent_adds_lose_no_updates() {
        let (store, p) = setup(Decimal::ONE).await;
        let user = Identity::new("u1");

        let adds = (0..32).map(|_| add_to_cart(&store, &user, p.id, 1));
        for added in futures::future::join_all(adds).await {
            added.unwrap();
        }

        let items = store.cart_items("u1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 32);
    }

    #[actix_web::test]
    async fn concurrent_adds_across_tasks() {
        let (store, p) = setup(Decimal::ONE).await;
        let store = std::sync::Arc::new(store);

        let tasks = (0..16).map(|_| {
            let store = store.clone();
            actix_web::rt::spawn(async move {
                add_to_cart(store.as_ref(), &Identity::new("u1"), p.id, 2).await
            })
        });
        for joined in futures::future::join_all(tasks).await {
            joined.unwrap().unwrap();
        }

        let items = store.cart_items("u1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 32);
    }

    #[actix_web::test]
    async fn non_positive_quantity_is_rejected() {
        let (store, p) = setup(Decimal::ONE).await;
        let user = Identity::new("u1");

        for quantity in [0, -2] {
            let err = add_to_cart(&store, &user, p.id, quantity).await.unwrap_err();
            assert!(matches!(err, ShopError::Validation(_)));
        }
        assert_eq!(store.count_cart_items("u1").await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn adding_unknown_product_fails() {
        let store = MemoryStore::new();
        let err = add_to_cart(&store, &Identity::new("u1"), 77, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::NotFound("Product")));
    }

    #[actix_web::test]
    async fn removing_absent_item_is_a_no_op() {
        let (store, p) = setup(Decimal::ONE).await;
        let user = Identity::new("u1");

        let removed = remove_from_cart(&store, &user, p.id).await.unwrap();
        assert_eq!(removed.id, p.id);

        add_to_cart(&store, &user, p.id, 1).await.unwrap();
        remove_from_cart(&store, &user, p.id).await.unwrap();
        assert_eq!(store.count_cart_items("u1").await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn list_cart_computes_totals() {
        let (store, p) = setup(Decimal::new(1250, 2)).await;
        let user = Identity::new("u1");
        add_to_cart(&store, &user, p.id, 3).await.unwrap();

        let lines = list_cart(&store, &user).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].total_price, Decimal::new(3750, 2));

        let json = serde_json::to_value(&lines[0]).unwrap();
        assert_eq!(json["total_price"], 37.5);
        assert_eq!(json["price"], 12.5);
    }

    #[actix_web::test]
    async fn carts_are_per_user() {
        let (store, p) = setup(Decimal::ONE).await;
        let alice = Identity::new("alice");
        let bob = Identity::new("bob");
        add_to_cart(&store, &alice, p.id, 1).await.unwrap();
        add_to_cart(&store, &bob, p.id, 4).await.unwrap();

        assert_eq!(clear_cart(&store, &alice).await.unwrap(), 1);
        assert!(list_cart(&store, &alice).await.unwrap().is_empty());
        assert_eq!(list_cart(&store, &bob).await.unwrap()[0].quantity, 4);
    }

    #[actix_web::test]
    async fn lookup_skips_unknown_ids() {
        let (store, p) = setup(Decimal::new(500, 2)).await;
        let found = lookup_products(&store, &[p.id, 9999]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&p.id.to_string()].name, "Linden Honey");
    }
}
