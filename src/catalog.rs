//! Product listing, pagination and detail lookups.

use crate::error::{Result, ShopError};
use crate::models::{Category, Comment, Product, ProductId, ProductImage};
use crate::store::{ProductFilter, Store};

pub const PAGE_SIZE: u64 = 10;

/// Splits `count` ordered rows into pages of `per_page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub count: u64,
    pub per_page: u64,
}

impl Paginator {
    pub fn new(count: u64, per_page: u64) -> Self {
        Paginator {
            count,
            per_page: per_page.max(1),
        }
    }

    /// Always at least one page, even for an empty result.
    pub fn num_pages(&self) -> u64 {
        self.count.div_ceil(self.per_page).max(1)
    }

    /// Resolves a raw `page` query value: missing or non-numeric values
    /// land on page 1, out-of-range numbers on the last page.
    pub fn resolve(&self, raw: Option<&str>) -> u64 {
        let Some(number) = raw.and_then(parse_page_number) else {
            return 1;
        };
        if number < 1 || number > self.num_pages() as i64 {
            self.num_pages()
        } else {
            number as u64
        }
    }

    pub fn offset(&self, page: u64) -> u64 {
        (page.saturating_sub(1)) * self.per_page
    }
}

fn parse_page_number(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }
}

#[derive(Debug, Clone)]
pub struct Listing {
    pub page: Page<Product>,
    /// Set when the listing was filtered by category.
    pub category: Option<Category>,
}

/// Category filter takes precedence over search; an empty search string
/// means no filter.
pub async fn list_products(
    store: &dyn Store,
    category_slug: Option<&str>,
    search: Option<&str>,
    page: Option<&str>,
) -> Result<Listing> {
    let (filter, category) = match (category_slug, search) {
        (Some(slug), _) => {
            let category = store
                .find_category_by_slug(slug)
                .await?
                .ok_or(ShopError::NotFound("Category"))?;
            (ProductFilter::Category(category.id), Some(category))
        }
        (None, Some(q)) if !q.is_empty() => (ProductFilter::NameContains(q.to_string()), None),
        _ => (ProductFilter::All, None),
    };

    let paginator = Paginator::new(store.count_products(&filter).await?, PAGE_SIZE);
    let number = paginator.resolve(page);
    let items = store
        .list_products(&filter, paginator.offset(number), Some(paginator.per_page))
        .await?;

    Ok(Listing {
        page: Page {
            items,
            number,
            num_pages: paginator.num_pages(),
            count: paginator.count,
        },
        category,
    })
}

pub async fn all_products(store: &dyn Store) -> Result<Vec<Product>> {
    store.list_products(&ProductFilter::All, 0, None).await
}

pub async fn get_product(store: &dyn Store, id: ProductId) -> Result<Product> {
    store
        .find_product(id)
        .await?
        .ok_or(ShopError::NotFound("Product"))
}

pub async fn average_rating(store: &dyn Store, id: ProductId) -> Result<f64> {
    store.average_rating(id).await
}

#[derive(Debug, Clone)]
pub struct ProductDetail {
    pub product: Product,
    pub images: Vec<ProductImage>,
    pub comments: Vec<Comment>,
    pub average_rating: f64,
    pub like_count: u64,
}

pub async fn product_detail(store: &dyn Store, id: ProductId) -> Result<ProductDetail> {
    let product = get_product(store, id).await?;
    Ok(ProductDetail {
        images: store.product_images(id).await?,
        comments: store.comments_for(id).await?,
        average_rating: store.average_rating(id).await?,
        like_count: store.count_likes(id).await?,
        product,
    })
}

pub async fn list_categories(store: &dyn Store) -> Result<Vec<Category>> {
    store.list_categories().await
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::NewComment;
    use crate::store::fixtures::{category, product};
    use crate::store::MemoryStore;

    async fn store_with_products(n: usize) -> MemoryStore {
        let store = MemoryStore::new();
        for i in 0..n {
            store
                .create_product(product(&format!("Jar {i}"), Decimal::ONE, None))
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn paginator_clamps_out_of_range_pages() {
        let paginator = Paginator::new(25, 10);
        assert_eq!(paginator.num_pages(), 3);
        assert_eq!(paginator.resolve(None), 1);
        assert_eq!(paginator.resolve(Some("abc")), 1);
        assert_eq!(paginator.resolve(Some("2")), 2);
        assert_eq!(paginator.resolve(Some("2.0")), 1);
        assert_eq!(paginator.resolve(Some(" 3 ")), 3);
        assert_eq!(paginator.resolve(Some("99")), 3);
        assert_eq!(paginator.resolve(Some("0")), 3);
        assert_eq!(paginator.resolve(Some("-4")), 3);
    }

    #[test]
    fn empty_result_has_one_page() {
        let paginator = Paginator::new(0, 10);
        assert_eq!(paginator.num_pages(), 1);
        assert_eq!(paginator.resolve(Some("5")), 1);
    }

    #[actix_web::test]
    async fn pages_of_twenty_five_products() {
        let store = store_with_products(25).await;

        let first = list_products(&store, None, None, Some("1")).await.unwrap();
        assert_eq!(first.page.items.len(), 10);
        assert_eq!(first.page.num_pages, 3);
        assert_eq!(first.page.items[0].name, "Jar 24");
        assert!(first.page.has_next());
        assert!(!first.page.has_previous());

        let third = list_products(&store, None, None, Some("3")).await.unwrap();
        assert_eq!(third.page.items.len(), 5);
        assert!(!third.page.has_next());

        let garbage = list_products(&store, None, None, Some("abc")).await.unwrap();
        assert_eq!(garbage.page.number, 1);

        let beyond = list_products(&store, None, None, Some("99")).await.unwrap();
        assert_eq!(beyond.page.number, 3);
        assert_eq!(beyond.page.items.len(), 5);
    }

    #[actix_web::test]
    async fn category_filter_wins_over_search() {
        let store = MemoryStore::new();
        let jams = store.create_category(category("Jams")).await.unwrap();
        store
            .create_product(product("Fig Jam", Decimal::ONE, Some(jams.id)))
            .await
            .unwrap();
        store
            .create_product(product("Clover Honey", Decimal::ONE, None))
            .await
            .unwrap();

        let listing = list_products(&store, Some("jams"), Some("honey"), None)
            .await
            .unwrap();
        assert_eq!(listing.category.unwrap().title, "Jams");
        assert_eq!(listing.page.items.len(), 1);
        assert_eq!(listing.page.items[0].name, "Fig Jam");

        let searched = list_products(&store, None, Some("hon"), None).await.unwrap();
        assert_eq!(searched.page.items.len(), 1);
        assert_eq!(searched.page.items[0].name, "Clover Honey");

        let everything = list_products(&store, None, Some(""), None).await.unwrap();
        assert_eq!(everything.page.count, 2);
    }

    #[actix_web::test]
    async fn unknown_category_is_not_found() {
        let store = MemoryStore::new();
        let err = list_products(&store, Some("nope"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::NotFound("Category")));
    }

    #[actix_web::test]
    async fn average_rating_defaults_to_zero() {
        let store = store_with_products(1).await;
        let id = all_products(&store).await.unwrap()[0].id;
        assert_eq!(average_rating(&store, id).await.unwrap(), 0.0);

        for rating in [5, 3, 4] {
            store
                .insert_comment(NewComment {
                    product_id: id,
                    name: "Bee".into(),
                    email: "bee@example.com".into(),
                    content: "Lovely".into(),
                    rating,
                })
                .await
                .unwrap();
        }
        assert_eq!(average_rating(&store, id).await.unwrap(), 4.0);

        let detail = product_detail(&store, id).await.unwrap();
        assert_eq!(detail.comments.len(), 3);
        assert_eq!(detail.average_rating, 4.0);
        assert_eq!(detail.like_count, 0);
    }

    #[actix_web::test]
    async fn missing_product_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            get_product(&store, 404).await,
            Err(ShopError::NotFound("Product"))
        ));
    }
}
