//! One-shot messages carried across a redirect in a cookie.

use actix_web::cookie::Cookie;
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: Level,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Flash {
            level: Level::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Flash {
            level: Level::Error,
            message: message.into(),
        }
    }

    fn encode(&self) -> String {
        // Serializing a two-field struct of plain strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    fn decode(raw: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn cookie(&self) -> Cookie<'static> {
        Cookie::build(FLASH_COOKIE, self.encode())
            .path("/")
            .http_only(true)
            .finish()
    }

    /// Reads the pending message, if any. Pair with [`clear`] on the response.
    pub fn take(req: &HttpRequest) -> Option<Self> {
        req.cookie(FLASH_COOKIE)
            .and_then(|c| Flash::decode(c.value()))
    }
}

/// Expires the flash cookie once its message has been shown.
pub fn clear(builder: &mut HttpResponseBuilder) {
    let mut removal = Cookie::build(FLASH_COOKIE, "").path("/").finish();
    removal.make_removal();
    builder.cookie(removal);
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

pub fn redirect_with(location: &str, flash: Flash) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .cookie(flash.cookie())
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn flash_survives_the_cookie_round_trip() {
        let flash = Flash::error("Invalid input; try again");
        let req = TestRequest::default().cookie(flash.cookie()).to_http_request();
        assert_eq!(Flash::take(&req), Some(flash));
    }

    #[test]
    fn garbage_cookie_is_ignored() {
        let req = TestRequest::default()
            .cookie(Cookie::new(FLASH_COOKIE, "%%%"))
            .to_http_request();
        assert_eq!(Flash::take(&req), None);
    }

    #[test]
    fn redirect_sets_location_and_cookie() {
        let resp = redirect_with("/honeykitchen/", Flash::success("Cart cleared!"));
        assert_eq!(resp.status(), actix_web::http::StatusCode::FOUND);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/honeykitchen/"
        );
        assert!(resp.cookies().any(|c| c.name() == FLASH_COOKIE));
    }
}
