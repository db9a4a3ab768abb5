use serde::Deserialize;

use crate::catalog;
use crate::error::{Result, ShopError};
use crate::middleware::Identity;
use crate::models::{Comment, NewComment, ProductId};
use crate::store::Store;

/// Raw comment form. Every field may be missing from the submission.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CommentForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub content: Option<String>,
    pub rating: Option<String>,
}

impl CommentForm {
    pub fn validate(self, product_id: ProductId) -> Result<NewComment> {
        let name = required(self.name, "name")?;
        let email = required(self.email, "email")?;
        let content = required(self.content, "content")?;
        let rating = required(self.rating, "rating")?;

        let rating = rating
            .parse::<i32>()
            .ok()
            .filter(|r| (1..=5).contains(r))
            .ok_or_else(|| ShopError::validation("Rating must be a whole number from 1 to 5"))?;

        Ok(NewComment {
            product_id,
            name,
            email,
            content,
            rating,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ShopError::validation(format!("Invalid input: {field} is required")))
}

pub async fn add_comment(
    store: &dyn Store,
    user: &Identity,
    product_id: ProductId,
    form: CommentForm,
) -> Result<Comment> {
    let product = catalog::get_product(store, product_id).await?;
    let comment = store.insert_comment(form.validate(product.id)?).await?;
    log::info!(
        "User {} rated product {} with {}",
        user.user_id,
        product.id,
        comment.rating
    );
    Ok(comment)
}
