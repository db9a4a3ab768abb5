//! Persistence seam shared by every service.
//!
//! Each mutating operation touches a single row or (user, product) pair and is
//! atomic on its own. Cascades on product and category deletion are carried
//! out here so callers never orphan rows.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Result, ShopError};
use crate::models::{
    CartItem, Category, CategoryId, Comment, Like, NewCategory, NewComment, NewProduct, Product,
    ProductId, ProductImage, User,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductFilter {
    All,
    Category(CategoryId),
    /// Case-insensitive substring match on the product name.
    NameContains(String),
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        match self {
            ProductFilter::All => true,
            ProductFilter::Category(id) => product.category_id == Some(*id),
            ProductFilter::NameContains(needle) => product
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // users
    async fn insert_user(&self, user: User) -> Result<()>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    // catalog
    async fn create_category(&self, category: NewCategory) -> Result<Category>;
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>>;
    async fn find_category_by_title(&self, title: &str) -> Result<Option<Category>>;
    /// Deletes the category and clears `category_id` on its products.
    async fn delete_category(&self, id: CategoryId) -> Result<bool>;

    async fn create_product(&self, product: NewProduct) -> Result<Product>;
    async fn add_product_image(&self, product_id: ProductId, image: String)
        -> Result<ProductImage>;
    async fn product_images(&self, product_id: ProductId) -> Result<Vec<ProductImage>>;
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>>;
    async fn find_products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>>;
    async fn count_products(&self, filter: &ProductFilter) -> Result<u64>;
    /// Newest first. `limit` of `None` returns everything after `skip`.
    async fn list_products(
        &self,
        filter: &ProductFilter,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Product>>;
    /// Deletes the product together with its images, comments, cart items and likes.
    async fn delete_product(&self, id: ProductId) -> Result<bool>;

    // comments
    async fn insert_comment(&self, comment: NewComment) -> Result<Comment>;
    async fn comments_for(&self, product_id: ProductId) -> Result<Vec<Comment>>;
    /// Mean rating, `0.0` when the product has no comments.
    async fn average_rating(&self, product_id: ProductId) -> Result<f64>;

    // cart
    /// Creates the (user, product) item with `quantity` or atomically adds
    /// `quantity` to the existing one.
    async fn increment_cart_item(
        &self,
        user_id: &str,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem>;
    async fn delete_cart_item(&self, user_id: &str, product_id: ProductId) -> Result<bool>;
    async fn clear_cart(&self, user_id: &str) -> Result<u64>;
    /// Newest first.
    async fn cart_items(&self, user_id: &str) -> Result<Vec<CartItem>>;
    async fn count_cart_items(&self, user_id: &str) -> Result<u64>;

    // likes
    /// Removes the like if present, inserts it otherwise. Returns whether the
    /// product is liked afterwards.
    async fn toggle_like(&self, user_id: &str, product_id: ProductId) -> Result<bool>;
    async fn count_likes(&self, product_id: ProductId) -> Result<u64>;
    /// Newest first.
    async fn liked_product_ids(&self, user_id: &str) -> Result<Vec<ProductId>>;
}

#[derive(Default)]
struct MemoryData {
    sequence: i64,
    users: Vec<User>,
    categories: BTreeMap<CategoryId, Category>,
    products: BTreeMap<ProductId, Product>,
    images: Vec<ProductImage>,
    comments: Vec<Comment>,
    cart: Vec<CartItem>,
    likes: Vec<Like>,
}

impl MemoryData {
    fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }
}

/// In-process store used by tests and when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<()> {
        let mut data = self.data.lock();
        if data.users.iter().any(|u| u.email == user.email) {
            return Err(ShopError::validation("Email already registered"));
        }
        data.users.push(user);
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let data = self.data.lock();
        Ok(data.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category> {
        let mut data = self.data.lock();
        if data.categories.values().any(|c| c.title == category.title) {
            return Err(ShopError::validation("Category title already exists"));
        }
        let id = data.next_id();
        let category = category.into_category(id);
        data.categories.insert(id, category.clone());
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.data.lock().categories.values().cloned().collect())
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let data = self.data.lock();
        Ok(data.categories.values().find(|c| c.slug == slug).cloned())
    }

    async fn find_category_by_title(&self, title: &str) -> Result<Option<Category>> {
        let data = self.data.lock();
        Ok(data.categories.values().find(|c| c.title == title).cloned())
    }

    async fn delete_category(&self, id: CategoryId) -> Result<bool> {
        let mut data = self.data.lock();
        if data.categories.remove(&id).is_none() {
            return Ok(false);
        }
        for product in data.products.values_mut() {
            if product.category_id == Some(id) {
                product.category_id = None;
            }
        }
        Ok(true)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        let mut data = self.data.lock();
        if let Some(category_id) = product.category_id {
            if !data.categories.contains_key(&category_id) {
                return Err(ShopError::NotFound("Category"));
            }
        }
        let id = data.next_id();
        let product = product.into_product(id);
        data.products.insert(id, product.clone());
        Ok(product)
    }

    async fn add_product_image(
        &self,
        product_id: ProductId,
        image: String,
    ) -> Result<ProductImage> {
        let mut data = self.data.lock();
        if !data.products.contains_key(&product_id) {
            return Err(ShopError::NotFound("Product"));
        }
        let image = ProductImage {
            id: data.next_id(),
            product_id,
            image,
            created_at: chrono::Utc::now(),
        };
        data.images.push(image.clone());
        Ok(image)
    }

    async fn product_images(&self, product_id: ProductId) -> Result<Vec<ProductImage>> {
        let data = self.data.lock();
        Ok(data
            .images
            .iter()
            .filter(|i| i.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.data.lock().products.get(&id).cloned())
    }

    async fn find_products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let data = self.data.lock();
        Ok(data
            .products
            .values()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn count_products(&self, filter: &ProductFilter) -> Result<u64> {
        let data = self.data.lock();
        Ok(data.products.values().filter(|p| filter.matches(p)).count() as u64)
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Product>> {
        let data = self.data.lock();
        let matching = data
            .products
            .values()
            .rev()
            .filter(|p| filter.matches(p))
            .skip(skip as usize)
            .cloned();
        Ok(match limit {
            Some(limit) => matching.take(limit as usize).collect(),
            None => matching.collect(),
        })
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let mut data = self.data.lock();
        if data.products.remove(&id).is_none() {
            return Ok(false);
        }
        data.images.retain(|i| i.product_id != id);
        data.comments.retain(|c| c.product_id != id);
        data.cart.retain(|c| c.product_id != id);
        data.likes.retain(|l| l.product_id != id);
        Ok(true)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment> {
        let mut data = self.data.lock();
        if !data.products.contains_key(&comment.product_id) {
            return Err(ShopError::NotFound("Product"));
        }
        let id = data.next_id();
        let comment = comment.into_comment(id);
        data.comments.push(comment.clone());
        Ok(comment)
    }

    async fn comments_for(&self, product_id: ProductId) -> Result<Vec<Comment>> {
        let data = self.data.lock();
        Ok(data
            .comments
            .iter()
            .rev()
            .filter(|c| c.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn average_rating(&self, product_id: ProductId) -> Result<f64> {
        let data = self.data.lock();
        let ratings: Vec<i32> = data
            .comments
            .iter()
            .filter(|c| c.product_id == product_id)
            .map(|c| c.rating)
            .collect();
        if ratings.is_empty() {
            return Ok(0.0);
        }
        Ok(ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64)
    }

    async fn increment_cart_item(
        &self,
        user_id: &str,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let mut data = self.data.lock();
        if !data.products.contains_key(&product_id) {
            return Err(ShopError::NotFound("Product"));
        }
        if let Some(item) = data
            .cart
            .iter_mut()
            .find(|c| c.user_id == user_id && c.product_id == product_id)
        {
            item.quantity = item.quantity.saturating_add(quantity);
            return Ok(item.clone());
        }
        let item = CartItem {
            user_id: user_id.to_string(),
            product_id,
            quantity,
            created_at: chrono::Utc::now(),
        };
        data.cart.push(item.clone());
        Ok(item)
    }

    async fn delete_cart_item(&self, user_id: &str, product_id: ProductId) -> Result<bool> {
        let mut data = self.data.lock();
        let before = data.cart.len();
        data.cart
            .retain(|c| !(c.user_id == user_id && c.product_id == product_id));
        Ok(data.cart.len() != before)
    }

    async fn clear_cart(&self, user_id: &str) -> Result<u64> {
        let mut data = self.data.lock();
        let before = data.cart.len();
        data.cart.retain(|c| c.user_id != user_id);
        Ok((before - data.cart.len()) as u64)
    }

    async fn cart_items(&self, user_id: &str) -> Result<Vec<CartItem>> {
        let data = self.data.lock();
        Ok(data
            .cart
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_cart_items(&self, user_id: &str) -> Result<u64> {
        let data = self.data.lock();
        Ok(data.cart.iter().filter(|c| c.user_id == user_id).count() as u64)
    }

    async fn toggle_like(&self, user_id: &str, product_id: ProductId) -> Result<bool> {
        let mut data = self.data.lock();
        if !data.products.contains_key(&product_id) {
            return Err(ShopError::NotFound("Product"));
        }
        let before = data.likes.len();
        data.likes
            .retain(|l| !(l.user_id == user_id && l.product_id == product_id));
        if data.likes.len() != before {
            return Ok(false);
        }
        data.likes.push(Like {
            user_id: user_id.to_string(),
            product_id,
            created_at: chrono::Utc::now(),
        });
        Ok(true)
    }

    async fn count_likes(&self, product_id: ProductId) -> Result<u64> {
        let data = self.data.lock();
        Ok(data.likes.iter().filter(|l| l.product_id == product_id).count() as u64)
    }

    async fn liked_product_ids(&self, user_id: &str) -> Result<Vec<ProductId>> {
        let data = self.data.lock();
        Ok(data
            .likes
            .iter()
            .rev()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.product_id)
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use rust_decimal::Decimal;

    use super::*;

    pub fn product(name: &str, price: Decimal, category_id: Option<CategoryId>) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: None,
            price,
            image: format!("/media/product_images/{}.jpg", name.to_lowercase()),
            category_id,
            amount: 10,
        }
    }

    pub fn category(title: &str) -> NewCategory {
        NewCategory {
            title: title.to_string(),
            slug: None,
            image: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::fixtures::{category, product};
    use super::*;

    #[actix_web::test]
    async fn deleting_a_product_cascades() {
        let store = MemoryStore::new();
        let p = store
            .create_product(product("Comb", Decimal::new(900, 2), None))
            .await
            .unwrap();
        store.add_product_image(p.id, "/media/a.jpg".into()).await.unwrap();
        store.increment_cart_item("u1", p.id, 2).await.unwrap();
        store.toggle_like("u1", p.id).await.unwrap();
        store
            .insert_comment(NewComment {
                product_id: p.id,
                name: "Ann".into(),
                email: "ann@example.com".into(),
                content: "Sweet".into(),
                rating: 5,
            })
            .await
            .unwrap();

        assert!(store.delete_product(p.id).await.unwrap());

        assert!(store.find_product(p.id).await.unwrap().is_none());
        assert!(store.product_images(p.id).await.unwrap().is_empty());
        assert!(store.comments_for(p.id).await.unwrap().is_empty());
        assert_eq!(store.count_cart_items("u1").await.unwrap(), 0);
        assert_eq!(store.count_likes(p.id).await.unwrap(), 0);
        assert!(!store.delete_product(p.id).await.unwrap());
    }

    #[actix_web::test]
    async fn deleting_a_category_clears_product_reference() {
        let store = MemoryStore::new();
        let c = store.create_category(category("Raw Honey")).await.unwrap();
        assert_eq!(c.slug, "raw-honey");
        let p = store
            .create_product(product("Acacia", Decimal::new(1250, 2), Some(c.id)))
            .await
            .unwrap();

        assert!(store.delete_category(c.id).await.unwrap());

        let p = store.find_product(p.id).await.unwrap().unwrap();
        assert_eq!(p.category_id, None);
        assert!(store.find_category_by_slug("raw-honey").await.unwrap().is_none());
    }

    #[actix_web::test]
    async fn category_titles_are_unique() {
        let store = MemoryStore::new();
        store.create_category(category("Jams")).await.unwrap();
        let err = store.create_category(category("Jams")).await.unwrap_err();
        assert!(matches!(err, ShopError::Validation(_)));
    }

    #[actix_web::test]
    async fn name_filter_ignores_case() {
        let store = MemoryStore::new();
        store
            .create_product(product("Buckwheat Honey", Decimal::ONE, None))
            .await
            .unwrap();
        store
            .create_product(product("Beeswax Candle", Decimal::ONE, None))
            .await
            .unwrap();

        let filter = ProductFilter::NameContains("HONEY".into());
        assert_eq!(store.count_products(&filter).await.unwrap(), 1);
        let found = store.list_products(&filter, 0, None).await.unwrap();
        assert_eq!(found[0].name, "Buckwheat Honey");
    }
}
