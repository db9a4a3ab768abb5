use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::{web, HttpRequest, HttpResponse};
use argon2::{self, Config as ArgonConfig};
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{Result, ShopError};
use crate::flash::{self, Flash};
use crate::handlers::html_page;
use crate::middleware::{Identity, AUTH_COOKIE};
use crate::models::{AuthResponse, Claims, SignInInput, SignUpInput, User};
use crate::render;
use crate::routes::{SHOP_PREFIX, USERS_PREFIX};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

pub fn issue_token(secret: &str, ttl_hours: i64, user_id: &str) -> Result<String> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(ttl_hours))
        .ok_or_else(|| ShopError::Internal("Token expiry out of range".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| ShopError::Internal(format!("Failed to encode token: {e}")))
}

fn hash_password(password: &str) -> Result<String> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let config = ArgonConfig::default();
    argon2::hash_encoded(password.as_bytes(), &salt, &config)
        .map_err(|e| ShopError::Internal(format!("Password hashing failed: {e}")))
}

fn validate_sign_up(input: &SignUpInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(ShopError::validation("Name is required"));
    }
    if !input.email.contains('@') {
        return Err(ShopError::validation("Enter a valid email address"));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ShopError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub async fn create_user(state: &AppState, input: &SignUpInput) -> Result<User> {
    validate_sign_up(input)?;
    let user = User {
        id: Uuid::new_v4().to_string(),
        name: input.name.trim().to_string(),
        email: input.email.trim().to_lowercase(),
        password: hash_password(&input.password)?,
    };
    state.store().insert_user(user.clone()).await?;
    log::info!("Registered user {}", user.id);
    Ok(user)
}

pub async fn authenticate(state: &AppState, input: &SignInInput) -> Result<(User, String)> {
    let email = input.email.trim().to_lowercase();
    let user = state
        .store()
        .find_user_by_email(&email)
        .await?
        .ok_or(ShopError::InvalidCredentials)?;

    if !argon2::verify_encoded(&user.password, input.password.as_bytes()).unwrap_or(false) {
        return Err(ShopError::InvalidCredentials);
    }

    let token = issue_token(
        &state.config.jwt_secret,
        state.config.token_ttl_hours,
        &user.id,
    )?;
    Ok((user, token))
}

/// Only same-site paths are honored as a post-login destination.
fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => format!("{SHOP_PREFIX}/"),
    }
}

pub async fn register_page(
    state: web::Data<AppState>,
    req: HttpRequest,
    user: Option<Identity>,
) -> Result<HttpResponse> {
    html_page(&state, &req, &user, render::register_form).await
}

pub async fn sign_up(
    state: web::Data<AppState>,
    body: web::Either<web::Json<SignUpInput>, web::Form<SignUpInput>>,
) -> Result<HttpResponse> {
    match body {
        web::Either::Left(json) => {
            let user = create_user(&state, &json).await?;
            Ok(HttpResponse::Created().json(json!({
                "id": user.id,
                "name": user.name,
                "email": user.email,
            })))
        }
        web::Either::Right(form) => match create_user(&state, &form).await {
            Ok(_) => Ok(flash::redirect_with(
                &format!("{USERS_PREFIX}/login/"),
                Flash::success("Account created successfully! Please log in with your credentials."),
            )),
            Err(ShopError::Validation(message)) => Ok(flash::redirect_with(
                &format!("{USERS_PREFIX}/register/"),
                Flash::error(message),
            )),
            Err(e) => Err(e),
        },
    }
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

pub async fn login_page(
    state: web::Data<AppState>,
    req: HttpRequest,
    user: Option<Identity>,
    query: web::Query<NextQuery>,
) -> Result<HttpResponse> {
    html_page(&state, &req, &user, |chrome| {
        render::login_form(chrome, query.next.as_deref())
    })
    .await
}

fn auth_cookie(token: String, ttl_hours: i64) -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE, token)
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::hours(ttl_hours))
        .finish()
}

pub async fn sign_in(
    state: web::Data<AppState>,
    body: web::Either<web::Json<SignInInput>, web::Form<SignInInput>>,
) -> Result<HttpResponse> {
    match body {
        web::Either::Left(json) => {
            let (_, token) = authenticate(&state, &json).await?;
            Ok(HttpResponse::Ok().json(AuthResponse { token }))
        }
        web::Either::Right(form) => match authenticate(&state, &form).await {
            Ok((user, token)) => Ok(HttpResponse::Found()
                .insert_header(("Location", safe_next(form.next.as_deref())))
                .cookie(auth_cookie(token, state.config.token_ttl_hours))
                .cookie(Flash::success(format!("Welcome back, {}!", user.name)).cookie())
                .finish()),
            Err(ShopError::InvalidCredentials) => Ok(flash::redirect_with(
                &format!("{USERS_PREFIX}/login/"),
                Flash::error("Invalid email or password"),
            )),
            Err(e) => Err(e),
        },
    }
}

pub async fn logout() -> HttpResponse {
    let mut removal = Cookie::build(AUTH_COOKIE, "").path("/").finish();
    removal.make_removal();

    HttpResponse::Found()
        .insert_header(("Location", format!("{SHOP_PREFIX}/")))
        .cookie(removal)
        .cookie(Flash::success("You have been successfully logged out.").cookie())
        .finish()
}
