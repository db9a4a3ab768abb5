use actix_web::http::header::ContentType;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::cart;
use crate::catalog;
use crate::comments::{self, CommentForm};
use crate::error::{Result, ShopError};
use crate::flash::{self, Flash};
use crate::likes;
use crate::middleware::Identity;
use crate::models::ProductId;
use crate::render::{self, Chrome};
use crate::routes::{SHOP_PREFIX, USERS_PREFIX};
use crate::state::AppState;

/// Renders an HTML page with the category navigation and any pending flash.
pub(crate) async fn html_page<F>(
    state: &AppState,
    req: &HttpRequest,
    user: &Option<Identity>,
    body: F,
) -> Result<HttpResponse>
where
    F: FnOnce(&Chrome<'_>) -> String,
{
    let categories = catalog::list_categories(state.store()).await?;
    let flash = Flash::take(req);
    let chrome = Chrome {
        categories: &categories,
        flash: flash.as_ref(),
        signed_in: user.is_some(),
    };
    let html = body(&chrome);

    let mut builder = HttpResponse::Ok();
    builder.content_type(ContentType::html());
    if flash.is_some() {
        flash::clear(&mut builder);
    }
    Ok(builder.body(html))
}

pub(crate) fn login_redirect(next: &str, message: Option<&str>) -> HttpResponse {
    let location = format!("{USERS_PREFIX}/login/?next={}", urlencoding::encode(next));
    match message {
        Some(message) => flash::redirect_with(&location, Flash::error(message)),
        None => flash::redirect(&location),
    }
}

fn detail_path(product_id: ProductId) -> String {
    format!("{SHOP_PREFIX}/detail/{product_id}/")
}

fn plain_not_found(err: ShopError) -> Result<HttpResponse> {
    match err {
        ShopError::NotFound(what) => Ok(HttpResponse::NotFound()
            .content_type(ContentType::plaintext())
            .body(format!("{what} not found"))),
        other => Err(other),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub page: Option<String>,
}

pub async fn index(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<ListQuery>,
    user: Option<Identity>,
) -> Result<HttpResponse> {
    let listing = catalog::list_products(
        state.store(),
        None,
        query.q.as_deref(),
        query.page.as_deref(),
    )
    .await?;
    let base = format!("{SHOP_PREFIX}/");
    html_page(&state, &req, &user, |chrome| {
        render::listing("Honey Kitchen", chrome, &listing.page, &base, query.q.as_deref())
    })
    .await
}

pub async fn category_products(
    state: web::Data<AppState>,
    req: HttpRequest,
    slug: web::Path<String>,
    query: web::Query<ListQuery>,
    user: Option<Identity>,
) -> Result<HttpResponse> {
    let listing = match catalog::list_products(
        state.store(),
        Some(slug.as_str()),
        None,
        query.page.as_deref(),
    )
    .await
    {
        Ok(listing) => listing,
        Err(e) => return plain_not_found(e),
    };
    let title = listing
        .category
        .as_ref()
        .map(|c| c.title.clone())
        .unwrap_or_default();
    let base = format!("{SHOP_PREFIX}/category/{}/", slug.as_str());
    html_page(&state, &req, &user, |chrome| {
        render::listing(&title, chrome, &listing.page, &base, None)
    })
    .await
}

pub async fn all_products(
    state: web::Data<AppState>,
    req: HttpRequest,
    user: Option<Identity>,
) -> Result<HttpResponse> {
    let products = catalog::all_products(state.store()).await?;
    html_page(&state, &req, &user, |chrome| {
        render::all_products(chrome, &products)
    })
    .await
}

pub async fn product_detail(
    state: web::Data<AppState>,
    req: HttpRequest,
    product_id: web::Path<ProductId>,
    user: Option<Identity>,
) -> Result<HttpResponse> {
    let detail = match catalog::product_detail(state.store(), *product_id).await {
        Ok(detail) => detail,
        // The detail page answers a missing product with a plain message.
        Err(ShopError::NotFound(_)) => {
            return Ok(HttpResponse::Ok()
                .content_type(ContentType::plaintext())
                .body("Product not found"))
        }
        Err(e) => return Err(e),
    };
    html_page(&state, &req, &user, |chrome| render::detail(chrome, &detail)).await
}

pub async fn comment_add(
    state: web::Data<AppState>,
    product_id: web::Path<ProductId>,
    user: Option<Identity>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let product_id = product_id.into_inner();
    if let Err(e) = catalog::get_product(state.store(), product_id).await {
        return plain_not_found(e);
    }
    let Some(user) = user else {
        return Ok(login_redirect(
            &detail_path(product_id),
            Some("Please log in to write a comment."),
        ));
    };

    let form = parse_comment_form(&body);
    let flash = match comments::add_comment(state.store(), &user, product_id, form).await {
        Ok(_) => Flash::success("Comment successfully added"),
        Err(ShopError::Validation(message)) => Flash::error(message),
        Err(e) => return Err(e),
    };
    Ok(flash::redirect_with(&detail_path(product_id), flash))
}

/// A missing or unreadable body yields an empty form, which fails validation.
fn parse_comment_form(body: &[u8]) -> CommentForm {
    std::str::from_utf8(body)
        .ok()
        .and_then(|raw| web::Query::<CommentForm>::from_query(raw).ok())
        .map(web::Query::into_inner)
        .unwrap_or_default()
}

/// Non-POST requests to the comment endpoint go back to the product page.
pub async fn comment_add_fallback(product_id: web::Path<ProductId>) -> HttpResponse {
    flash::redirect(&detail_path(*product_id))
}

#[derive(Debug, Deserialize)]
pub struct CartProductsRequest {
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
}

pub async fn cart_products(
    state: web::Data<AppState>,
    body: web::Json<CartProductsRequest>,
) -> Result<HttpResponse> {
    let products = cart::lookup_products(state.store(), &body.product_ids).await?;
    Ok(HttpResponse::Ok().json(json!({ "products": products })))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Number(i64),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
struct QuantityInput {
    #[serde(default)]
    quantity: Option<RawQuantity>,
}

/// Reads `quantity` from a JSON or form-encoded body; defaults to 1.
fn parse_quantity(req: &HttpRequest, body: &[u8]) -> Result<i64> {
    let invalid = || ShopError::validation("Quantity must be a positive integer");

    let input: QuantityInput = if body.iter().all(u8::is_ascii_whitespace) {
        QuantityInput::default()
    } else if req.content_type() == "application/json" {
        serde_json::from_slice(body).map_err(|_| invalid())?
    } else {
        let raw = std::str::from_utf8(body).map_err(|_| invalid())?;
        web::Query::<QuantityInput>::from_query(raw)
            .map_err(|_| invalid())?
            .into_inner()
    };

    match input.quantity {
        None => Ok(1),
        Some(RawQuantity::Number(n)) => Ok(n),
        Some(RawQuantity::Text(text)) => text.trim().parse().map_err(|_| invalid()),
    }
}

pub async fn add_to_cart(
    state: web::Data<AppState>,
    req: HttpRequest,
    product_id: web::Path<ProductId>,
    user: Option<Identity>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let user = user.ok_or(ShopError::AuthenticationRequired)?;
    let quantity = parse_quantity(&req, &body)?;
    let added = cart::add_to_cart(state.store(), &user, *product_id, quantity).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": added.message,
        "cart_count": added.cart_count,
    })))
}

/// Authentication is checked before the method.
pub async fn json_method_not_allowed(user: Option<Identity>) -> Result<HttpResponse> {
    user.ok_or(ShopError::AuthenticationRequired)?;
    Err(ShopError::MethodNotAllowed)
}

pub async fn form_method_not_allowed(
    req: HttpRequest,
    user: Option<Identity>,
) -> Result<HttpResponse> {
    if user.is_none() {
        return Ok(login_redirect(req.path(), None));
    }
    Err(ShopError::MethodNotAllowed)
}

pub async fn remove_from_cart(
    state: web::Data<AppState>,
    req: HttpRequest,
    product_id: web::Path<ProductId>,
    user: Option<Identity>,
) -> Result<HttpResponse> {
    let Some(user) = user else {
        return Ok(login_redirect(req.path(), None));
    };
    match cart::remove_from_cart(state.store(), &user, *product_id).await {
        Ok(product) => Ok(flash::redirect_with(
            &format!("{SHOP_PREFIX}/"),
            Flash::success(format!("{} removed from cart!", product.name)),
        )),
        Err(e) => plain_not_found(e),
    }
}

pub async fn user_cart(state: web::Data<AppState>, user: Identity) -> Result<HttpResponse> {
    let cart_items = cart::list_cart(state.store(), &user).await?;
    Ok(HttpResponse::Ok().json(json!({ "cart_items": cart_items })))
}

pub async fn clear_cart(
    state: web::Data<AppState>,
    req: HttpRequest,
    user: Option<Identity>,
) -> Result<HttpResponse> {
    let Some(user) = user else {
        return Ok(login_redirect(req.path(), None));
    };
    cart::clear_cart(state.store(), &user).await?;
    Ok(flash::redirect_with(
        &format!("{SHOP_PREFIX}/"),
        Flash::success("Cart cleared!"),
    ))
}

pub async fn toggle_like(
    state: web::Data<AppState>,
    product_id: web::Path<ProductId>,
    user: Identity,
) -> Result<HttpResponse> {
    let toggled = likes::toggle_like(state.store(), &user, *product_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "is_liked": toggled.liked,
        "message": toggled.message,
        "like_count": toggled.like_count,
    })))
}

pub async fn user_likes(state: web::Data<AppState>, user: Identity) -> Result<HttpResponse> {
    let liked_products = likes::list_user_likes(state.store(), &user).await?;
    Ok(HttpResponse::Ok().json(json!({ "liked_products": liked_products })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn quantity_defaults_to_one() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(parse_quantity(&req, b"").unwrap(), 1);
    }

    #[test]
    fn quantity_from_json_number_or_string() {
        let req = TestRequest::default()
            .insert_header(ContentType::json())
            .to_http_request();
        assert_eq!(parse_quantity(&req, br#"{"quantity": 4}"#).unwrap(), 4);
        assert_eq!(parse_quantity(&req, br#"{"quantity": "2"}"#).unwrap(), 2);
        assert_eq!(parse_quantity(&req, br#"{}"#).unwrap(), 1);
        assert!(parse_quantity(&req, br#"{"quantity": "lots"}"#).is_err());
    }

    #[test]
    fn quantity_from_form_body() {
        let req = TestRequest::default()
            .insert_header(ContentType::form_url_encoded())
            .to_http_request();
        assert_eq!(parse_quantity(&req, b"quantity=3").unwrap(), 3);
        assert!(parse_quantity(&req, b"quantity=x").is_err());
    }

    #[test]
    fn comment_form_tolerates_missing_body() {
        let empty = parse_comment_form(b"");
        assert!(empty.name.is_none() && empty.rating.is_none());

        let form = parse_comment_form(b"name=Ivy&email=ivy%40example.com&rating=4");
        assert_eq!(form.name.as_deref(), Some("Ivy"));
        assert_eq!(form.email.as_deref(), Some("ivy@example.com"));
        assert!(form.content.is_none());
    }

    #[test]
    fn login_redirect_encodes_next() {
        let resp = login_redirect("/honeykitchen/detail/3/?tab=reviews&x=1", None);
        assert_eq!(
            resp.headers().get(actix_web::http::header::LOCATION).unwrap(),
            "/users/login/?next=%2Fhoneykitchen%2Fdetail%2F3%2F%3Ftab%3Dreviews%26x%3D1"
        );
    }
}
