//! Identity of the caller.
//!
//! Authentication happens upstream. The gateway forwards the account id and
//! role in trusted headers and this module turns them into an [`Actor`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::quiz::engine::{Actor, Role};
use crate::response::AppError;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const ACCOUNT_ROLE_HEADER: &str = "x-account-role";

const MAX_ACCOUNT_ID_LEN: usize = 128;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, AppError> {
    let account_id = header_str(headers, ACCOUNT_ID_HEADER)
        .ok_or_else(|| AppError::unauthorized("Missing account id"))?;
    if account_id.len() > MAX_ACCOUNT_ID_LEN {
        return Err(AppError::unauthorized("Account id too long"));
    }

    let role = match header_str(headers, ACCOUNT_ROLE_HEADER).map(str::to_ascii_lowercase) {
        None => Role::Student,
        Some(role) if role == "student" => Role::Student,
        Some(role) if role == "instructor" => Role::Instructor,
        Some(_) => return Err(AppError::unauthorized("Unknown account role")),
    };

    Ok(Actor {
        account_id: account_id.to_string(),
        role,
    })
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
    }
}

/// An actor with the instructor role.
#[derive(Debug, Clone)]
pub struct Instructor(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Instructor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = actor_from_headers(&parts.headers)?;
        if !actor.is_instructor() {
            return Err(AppError::forbidden("Instructor role required"));
        }
        Ok(Instructor(actor))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, StatusCode};

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn missing_account_is_unauthorized() {
        let err = actor_from_headers(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        let err = actor_from_headers(&headers(&[(ACCOUNT_ID_HEADER, "   ")])).unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn role_defaults_to_student() {
        let actor = actor_from_headers(&headers(&[(ACCOUNT_ID_HEADER, "alice")])).unwrap();
        assert_eq!(actor, Actor::student("alice"));
    }

    #[test]
    fn role_is_case_insensitive() {
        let actor = actor_from_headers(&headers(&[
            (ACCOUNT_ID_HEADER, "bob"),
            (ACCOUNT_ROLE_HEADER, "Instructor"),
        ]))
        .unwrap();
        assert!(actor.is_instructor());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = actor_from_headers(&headers(&[
            (ACCOUNT_ID_HEADER, "eve"),
            (ACCOUNT_ROLE_HEADER, "root"),
        ]))
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
