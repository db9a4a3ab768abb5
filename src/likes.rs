use crate::catalog;
use crate::error::Result;
use crate::middleware::Identity;
use crate::models::ProductId;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeToggled {
    pub liked: bool,
    pub like_count: u64,
    pub message: String,
}

pub async fn toggle_like(
    store: &dyn Store,
    user: &Identity,
    product_id: ProductId,
) -> Result<LikeToggled> {
    let product = catalog::get_product(store, product_id).await?;
    let liked = store.toggle_like(&user.user_id, product.id).await?;

    let message = if liked {
        format!("You liked {}", product.name)
    } else {
        format!("You unliked {}", product.name)
    };

    Ok(LikeToggled {
        liked,
        like_count: store.count_likes(product.id).await?,
        message,
    })
}

pub async fn list_user_likes(store: &dyn Store, user: &Identity) -> Result<Vec<ProductId>> {
    store.liked_product_ids(&user.user_id).await
}
