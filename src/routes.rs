use actix_web::{web, HttpResponse};

use crate::auth;
use crate::error::ShopError;
use crate::handlers;

pub const SHOP_PREFIX: &str = "/honeykitchen";
pub const USERS_PREFIX: &str = "/users";

async fn redirect_to_shop() -> HttpResponse {
    HttpResponse::Found()
        .insert_header(("Location", format!("{SHOP_PREFIX}/")))
        .finish()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ShopError::validation(format!("Malformed JSON body: {err}")).into()
    }))
    .app_data(web::FormConfig::default().error_handler(|err, _req| {
        ShopError::validation(format!("Malformed form body: {err}")).into()
    }))
    .route("/", web::get().to(redirect_to_shop))
    .service(
        web::scope(SHOP_PREFIX)
            .route("/", web::get().to(handlers::index))
            .route("/category/{slug}/", web::get().to(handlers::category_products))
            .route("/products/", web::get().to(handlers::all_products))
            .route("/detail/{product_id}/", web::get().to(handlers::product_detail))
            .service(
                web::resource("/comment_add/{product_id}/")
                    .route(web::post().to(handlers::comment_add))
                    .default_service(web::to(handlers::comment_add_fallback)),
            )
            .service(
                web::resource("/api/cart-products/")
                    .route(web::post().to(handlers::cart_products))
                    .default_service(web::to(|| async {
                        Err::<HttpResponse, _>(ShopError::MethodNotAllowed)
                    })),
            )
            .service(
                web::resource("/add-to-cart/{product_id}/")
                    .route(web::post().to(handlers::add_to_cart))
                    .default_service(web::to(handlers::json_method_not_allowed)),
            )
            .service(
                web::resource("/remove-from-cart/{product_id}/")
                    .route(web::post().to(handlers::remove_from_cart))
                    .default_service(web::to(handlers::form_method_not_allowed)),
            )
            .route("/api/user-cart/", web::get().to(handlers::user_cart))
            .service(
                web::resource("/clear-cart/")
                    .route(web::post().to(handlers::clear_cart))
                    .default_service(web::to(handlers::form_method_not_allowed)),
            )
            .service(
                web::resource("/toggle-like/{product_id}/")
                    .route(web::post().to(handlers::toggle_like))
                    .default_service(web::to(handlers::json_method_not_allowed)),
            )
            .route("/api/user-likes/", web::get().to(handlers::user_likes)),
    )
    .service(
        web::scope(USERS_PREFIX)
            .service(
                web::resource("/register/")
                    .route(web::get().to(auth::register_page))
                    .route(web::post().to(auth::sign_up)),
            )
            .service(
                web::resource("/login/")
                    .route(web::get().to(auth::login_page))
                    .route(web::post().to(auth::sign_in)),
            )
            .service(
                web::resource("/logout/")
                    .route(web::get().to(auth::logout))
                    .route(web::post().to(auth::logout)),
            ),
    );
}
