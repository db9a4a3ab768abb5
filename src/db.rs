use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, Collection, Database, IndexModel};

use crate::error::{Result, ShopError};
use crate::models::{
    CartItem, Category, CategoryId, Comment, Counter, Like, NewCategory, NewComment, NewProduct,
    Product, ProductId, ProductImage, User,
};
use crate::store::{ProductFilter, Store};

const DUPLICATE_KEY: i32 = 11000;

/// Store backed by MongoDB. Uniqueness of (user, product) pairs is enforced
/// with compound unique indexes created by [`MongoStore::connect`].
#[derive(Clone)]
pub struct MongoStore {
    users: Collection<User>,
    categories: Collection<Category>,
    products: Collection<Product>,
    product_images: Collection<ProductImage>,
    comments: Collection<Comment>,
    cart_items: Collection<CartItem>,
    likes: Collection<Like>,
    counters: Collection<Counter>,
}

impl MongoStore {
    pub async fn connect(database_url: &str, database_name: &str) -> Result<Self> {
        let client_options = ClientOptions::parse(database_url).await?;
        let client = Client::with_options(client_options)?;
        let store = Self::new(client.database(database_name));
        store.ensure_indexes().await?;
        log::info!("Connected to MongoDB database {database_name}");
        Ok(store)
    }

    fn new(db: Database) -> Self {
        Self {
            users: db.collection("users"),
            categories: db.collection("categories"),
            products: db.collection("products"),
            product_images: db.collection("product_images"),
            comments: db.collection("comments"),
            cart_items: db.collection("cart_items"),
            likes: db.collection("likes"),
            counters: db.collection("counters"),
        }
    }

    async fn ensure_indexes(&self) -> Result<()> {
        self.users
            .create_index(unique(doc! { "email": 1 }), None)
            .await?;
        self.categories
            .create_index(unique(doc! { "title": 1 }), None)
            .await?;
        self.categories
            .create_index(plain(doc! { "slug": 1 }), None)
            .await?;
        self.products
            .create_index(plain(doc! { "category_id": 1 }), None)
            .await?;
        self.cart_items
            .create_index(unique(doc! { "user_id": 1, "product_id": 1 }), None)
            .await?;
        self.likes
            .create_index(unique(doc! { "user_id": 1, "product_id": 1 }), None)
            .await?;
        self.likes
            .create_index(plain(doc! { "product_id": 1 }), None)
            .await?;
        self.comments
            .create_index(plain(doc! { "product_id": 1 }), None)
            .await?;
        Ok(())
    }

    /// Next value of the named sequence, created on first use.
    async fn next_id(&self, seq_name: &str) -> Result<i64> {
        let filter = doc! { "_id": seq_name };
        let update = doc! { "$inc": { "seq": 1_i64 } };

        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        match self.counters.find_one_and_update(filter, update, options).await? {
            Some(counter) => Ok(counter.seq),
            None => Err(ShopError::Persistence(format!(
                "Failed to generate {seq_name} sequence value"
            ))),
        }
    }
}

fn unique(keys: Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn plain(keys: Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    server_error_code(err) == Some(DUPLICATE_KEY)
}

fn server_error_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => Some(e.code),
        ErrorKind::Command(e) => Some(e.code),
        _ => None,
    }
}

/// Two concurrent upserts of a new pair can both miss and race on the unique
/// index. The loser retries once and lands on the increment path.
fn retry_cart_upsert(attempt: u32, code: Option<i32>) -> bool {
    attempt == 1 && code == Some(DUPLICATE_KEY)
}

fn product_filter(filter: &ProductFilter) -> Document {
    match filter {
        ProductFilter::All => doc! {},
        ProductFilter::Category(id) => doc! { "category_id": id },
        ProductFilter::NameContains(needle) => doc! {
            "name": { "$regex": escape_regex(needle), "$options": "i" }
        },
    }
}

fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if "\\^$.|?*+()[]{}".contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn pair(user_id: &str, product_id: ProductId) -> Document {
    doc! { "user_id": user_id, "product_id": product_id }
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_user(&self, user: User) -> Result<()> {
        match self.users.insert_one(&user, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                Err(ShopError::validation("Email already registered"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.find_one(doc! { "email": email }, None).await?)
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category> {
        let id = self.next_id("Category").await?;
        let category = category.into_category(id);
        match self.categories.insert_one(&category, None).await {
            Ok(_) => Ok(category),
            Err(e) if is_duplicate_key(&e) => {
                Err(ShopError::validation("Category title already exists"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.categories.find(None, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        Ok(self.categories.find_one(doc! { "slug": slug }, None).await?)
    }

    async fn find_category_by_title(&self, title: &str) -> Result<Option<Category>> {
        Ok(self.categories.find_one(doc! { "title": title }, None).await?)
    }

    async fn delete_category(&self, id: CategoryId) -> Result<bool> {
        self.products
            .update_many(
                doc! { "category_id": id },
                doc! { "$set": { "category_id": null } },
                None,
            )
            .await?;
        let result = self.categories.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count == 1)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        if let Some(category_id) = product.category_id {
            let exists = self
                .categories
                .count_documents(doc! { "_id": category_id }, None)
                .await?;
            if exists == 0 {
                return Err(ShopError::NotFound("Category"));
            }
        }
        let id = self.next_id("Product").await?;
        let product = product.into_product(id);
        self.products.insert_one(&product, None).await?;
        Ok(product)
    }

    async fn add_product_image(
        &self,
        product_id: ProductId,
        image: String,
    ) -> Result<ProductImage> {
        if self.find_product(product_id).await?.is_none() {
            return Err(ShopError::NotFound("Product"));
        }
        let image = ProductImage {
            id: self.next_id("ProductImage").await?,
            product_id,
            image,
            created_at: chrono::Utc::now(),
        };
        self.product_images.insert_one(&image, None).await?;
        Ok(image)
    }

    async fn product_images(&self, product_id: ProductId) -> Result<Vec<ProductImage>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self
            .product_images
            .find(doc! { "product_id": product_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .products
            .find(doc! { "_id": { "$in": ids.to_vec() } }, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_products(&self, filter: &ProductFilter) -> Result<u64> {
        Ok(self
            .products
            .count_documents(product_filter(filter), None)
            .await?)
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        skip: u64,
        limit: Option<u64>,
    ) -> Result<Vec<Product>> {
        let options = FindOptions::builder()
            .sort(doc! { "_id": -1 })
            .skip(skip)
            .limit(limit.map(|l| l as i64))
            .build();
        let cursor = self.products.find(product_filter(filter), options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let children = doc! { "product_id": id };
        self.cart_items.delete_many(children.clone(), None).await?;
        self.likes.delete_many(children.clone(), None).await?;
        self.comments.delete_many(children.clone(), None).await?;
        self.product_images.delete_many(children, None).await?;
        let result = self.products.delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count == 1)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment> {
        if self.find_product(comment.product_id).await?.is_none() {
            return Err(ShopError::NotFound("Product"));
        }
        let id = self.next_id("Comment").await?;
        let comment = comment.into_comment(id);
        self.comments.insert_one(&comment, None).await?;
        Ok(comment)
    }

    async fn comments_for(&self, product_id: ProductId) -> Result<Vec<Comment>> {
        let options = FindOptions::builder().sort(doc! { "_id": -1 }).build();
        let cursor = self
            .comments
            .find(doc! { "product_id": product_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn average_rating(&self, product_id: ProductId) -> Result<f64> {
        let pipeline = vec![
            doc! { "$match": { "product_id": product_id } },
            doc! { "$group": { "_id": null, "avg": { "$avg": "$rating" } } },
        ];
        let mut cursor = self.comments.aggregate(pipeline, None).await?;
        match cursor.try_next().await? {
            Some(group) => Ok(group.get_f64("avg").unwrap_or(0.0)),
            None => Ok(0.0),
        }
    }

    async fn increment_cart_item(
        &self,
        user_id: &str,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let update = doc! {
            "$inc": { "quantity": i64::from(quantity) },
            "$setOnInsert": { "created_at": chrono::Utc::now().to_rfc3339() },
        };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .cart_items
                .find_one_and_update(pair(user_id, product_id), update.clone(), options.clone())
                .await;
            match result {
                Ok(Some(item)) => return Ok(item),
                Ok(None) => {
                    return Err(ShopError::Persistence(
                        "Cart upsert returned no document".to_string(),
                    ))
                }
                Err(e) if retry_cart_upsert(attempt, server_error_code(&e)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn delete_cart_item(&self, user_id: &str, product_id: ProductId) -> Result<bool> {
        let result = self
            .cart_items
            .delete_one(pair(user_id, product_id), None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn clear_cart(&self, user_id: &str) -> Result<u64> {
        let result = self
            .cart_items
            .delete_many(doc! { "user_id": user_id }, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn cart_items(&self, user_id: &str) -> Result<Vec<CartItem>> {
        let options = FindOptions::builder().sort(doc! { "_id": -1 }).build();
        let cursor = self
            .cart_items
            .find(doc! { "user_id": user_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_cart_items(&self, user_id: &str) -> Result<u64> {
        Ok(self
            .cart_items
            .count_documents(doc! { "user_id": user_id }, None)
            .await?)
    }

    async fn toggle_like(&self, user_id: &str, product_id: ProductId) -> Result<bool> {
        let removed = self.likes.delete_one(pair(user_id, product_id), None).await?;
        if removed.deleted_count == 1 {
            return Ok(false);
        }

        let like = Like {
            user_id: user_id.to_string(),
            product_id,
            created_at: chrono::Utc::now(),
        };
        match self.likes.insert_one(&like, None).await {
            Ok(_) => Ok(true),
            // A concurrent request inserted the same pair first.
            Err(e) if is_duplicate_key(&e) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    async fn count_likes(&self, product_id: ProductId) -> Result<u64> {
        Ok(self
            .likes
            .count_documents(doc! { "product_id": product_id }, None)
            .await?)
    }

    async fn liked_product_ids(&self, user_id: &str) -> Result<Vec<ProductId>> {
        let options = FindOptions::builder().sort(doc! { "_id": -1 }).build();
        let likes: Vec<Like> = self
            .likes
            .find(doc! { "user_id": user_id }, options)
            .await?
            .try_collect()
            .await?;
        Ok(likes.into_iter().map(|l| l.product_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(escape_regex("a.b*(c)"), r"a\.b\*\(c\)");
        assert_eq!(escape_regex("honey"), "honey");
    }

    #[test]
    fn name_filter_is_case_insensitive_regex() {
        let filter = product_filter(&ProductFilter::NameContains("Comb+".into()));
        let name = filter.get_document("name").unwrap();
        assert_eq!(name.get_str("$regex").unwrap(), r"Comb\+");
        assert_eq!(name.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn only_the_first_duplicate_key_upsert_is_retried() {
        assert!(retry_cart_upsert(1, Some(DUPLICATE_KEY)));
        assert!(!retry_cart_upsert(2, Some(DUPLICATE_KEY)));
        assert!(!retry_cart_upsert(1, Some(112)));
        assert!(!retry_cart_upsert(1, None));
    }
}
