use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use futures::future::{ready, Ready};

use crate::error::Error;

pub const ADMIN_ID_HEADER: &str = "X-Admin-Id";

/// The admin performing a request, as asserted by the upstream authorization
/// layer through the `X-Admin-Id` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminIdentity(pub String);

impl FromRequest for AdminIdentity {
    type Error = Error;
    type Future = Ready<Result<AdminIdentity, Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let admin_id = req
            .headers()
            .get(ADMIN_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| AdminIdentity(value.to_string()))
            .ok_or(Error::MissingAdminIdentity);

        ready(admin_id)
    }
}
