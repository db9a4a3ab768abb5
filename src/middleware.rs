use actix_service::{forward_ready, Service};
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ok, ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::rc::Rc;

use crate::error::ShopError;
use crate::models::{Claims, UserId};

pub const AUTH_COOKIE: &str = "auth_token";

/// The signed-in user, resolved by [`AuthMiddleware`].
///
/// Handlers that require a user take `Identity` directly and fail with 401;
/// handlers that redirect to the login page take `Option<Identity>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
}

impl Identity {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Identity {
            user_id: user_id.into(),
        }
    }
}

impl FromRequest for Identity {
    type Error = ShopError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Identity>()
                .cloned()
                .ok_or(ShopError::AuthenticationRequired),
        )
    }
}

// Middleware factory
pub struct AuthMiddleware {
    secret: String,
}

impl AuthMiddleware {
    pub fn new(secret: String) -> Self {
        AuthMiddleware { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareMiddleware<S>;
    type InitError = ();

    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddlewareMiddleware<S> {
    service: Rc<S>,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        // Requests without a usable token continue anonymously.
        if let Some(token) = bearer_token(&req).or_else(|| cookie_token(&req)) {
            match decode_identity(&token, &self.secret) {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                }
                Err(e) => log::debug!("Ignoring invalid token: {e}"),
            }
        }

        Box::pin(async move { service.call(req).await })
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    match header.strip_prefix("Bearer ") {
        Some(token) => Some(token.trim().to_string()),
        None => {
            log::debug!("Authorization header does not use the Bearer scheme");
            None
        }
    }
}

fn cookie_token(req: &ServiceRequest) -> Option<String> {
    req.cookie(AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

pub fn decode_identity(
    token: &str,
    secret: &str,
) -> Result<Identity, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(Identity::new(data.claims.sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::issue_token;

    #[test]
    fn issued_tokens_decode_to_the_same_user() {
        let token = issue_token("secret", 1, "user-1").unwrap();
        assert_eq!(
            decode_identity(&token, "secret").unwrap(),
            Identity::new("user-1")
        );
        assert!(decode_identity(&token, "other-secret").is_err());
    }
}
