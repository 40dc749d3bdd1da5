//! Per-request context: the logged-in user, the CSRF token and pending flash
//! messages, all carried in cookies.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{Database, User};
use crate::routes::{AppError, AppState};

pub const SESSION_COOKIE: &str = "session";
pub const CSRF_COOKIE: &str = "csrf_token";
pub const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: String,
    pub message: String,
}

impl Flash {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new("success", message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::new("danger", message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new("info", message)
    }
}

fn encode_flashes(flashes: &[Flash]) -> String {
    let joined = flashes
        .iter()
        .map(|f| format!("{}:{}", f.kind, f.message.replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n");
    urlencoding::encode(&joined).into_owned()
}

fn decode_flashes(value: &str) -> Vec<Flash> {
    let Ok(decoded) = urlencoding::decode(value) else {
        return Vec::new();
    };
    decoded
        .split('\n')
        .filter_map(|line| line.split_once(':'))
        .map(|(kind, message)| Flash::new(kind, message))
        .collect()
}

/// Value of the named cookie across all `Cookie` headers
pub fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// `max_age` of `None` makes a browser-session cookie
pub fn set_cookie(name: &str, value: &str, max_age: Option<i64>, secure: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", name, value);
    if let Some(age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", age));
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

pub fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!("Dropping malformed cookie: {}", e),
    }
}

/// Redirect that leaves a flash message for the next rendered page
pub fn flash_redirect(to: &str, flash: Flash) -> Response {
    let mut response = Redirect::to(to).into_response();
    let cookie = set_cookie(FLASH_COOKIE, &encode_flashes(&[flash]), None, false);
    append_cookie(&mut response, &cookie);
    response
}

fn sets_cookie(response: &Response, name: &str) -> bool {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&prefix))
}

/// Everything a page needs besides its own data
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub site_name: String,
    pub user: Option<User>,
    pub session_token: Option<String>,
    pub csrf_token: String,
    pub flashes: Vec<Flash>,
}

impl PageContext {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_admin)
    }

    pub fn username(&self) -> &str {
        self.user.as_ref().map(|u| u.username.as_str()).unwrap_or("")
    }

    /// Double-submit check of a posted form token against the cookie
    pub fn verify_csrf(&self, submitted: &str) -> Result<(), AppError> {
        if self.csrf_token.is_empty() || submitted != self.csrf_token {
            warn!("Rejected form post with a bad CSRF token");
            return Err(AppError::Csrf);
        }
        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<PageContext>()
            .cloned()
            .unwrap_or_default())
    }
}

fn login_redirect(parts: &Parts) -> Response {
    // nested routers see a stripped uri
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or(&parts.uri);
    let next = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Redirect::to(&format!("/login?next={}", urlencoding::encode(next))).into_response()
}

/// Rejects anonymous requests with a redirect to the login page
pub struct RequireUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts
            .extensions
            .get::<PageContext>()
            .and_then(|ctx| ctx.user.clone())
        {
            Some(user) => Ok(RequireUser(user)),
            None => Err(login_redirect(parts)),
        }
    }
}

/// Like [`RequireUser`], and answers 403 to non-admins
pub struct RequireAdmin(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequireUser(user) = RequireUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            warn!("User '{}' denied admin access to {}", user.username, parts.uri);
            return Err(AppError::Forbidden.into_response());
        }
        Ok(RequireAdmin(user))
    }
}

/// Resolves cookies into a [`PageContext`] and maintains the CSRF and flash cookies
pub async fn request_context(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let session_token = cookie(headers, SESSION_COOKIE).map(str::to_string);
    let existing_csrf = cookie(headers, CSRF_COOKIE).map(str::to_string);
    let flashes = cookie(headers, FLASH_COOKIE)
        .map(decode_flashes)
        .unwrap_or_default();
    let had_flashes = !flashes.is_empty();

    let user = match &session_token {
        Some(token) => match state.db.get_session_user(token).await {
            Ok(user) => user,
            Err(e) => {
                error!("Session lookup failed: {}", e);
                None
            }
        },
        None => None,
    };

    let issue_csrf = existing_csrf.is_none();
    let csrf_token = existing_csrf.unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    request.extensions_mut().insert(PageContext {
        site_name: state.config.site_name.clone(),
        user,
        session_token,
        csrf_token: csrf_token.clone(),
        flashes,
    });

    let mut response = next.run(request).await;

    if issue_csrf {
        let cookie = set_cookie(
            CSRF_COOKIE,
            &csrf_token,
            None,
            state.config.session.secure_cookies,
        );
        append_cookie(&mut response, &cookie);
    }

    // Flashes are consumed once a page has actually been shown
    if had_flashes && response.status().is_success() && !sets_cookie(&response, FLASH_COOKIE) {
        append_cookie(&mut response, &clear_cookie(FLASH_COOKIE));
    }

    response
}

pub async fn start_session_sweeper(db: Arc<Database>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes.max(1) * 60);

    loop {
        tokio::time::sleep(interval).await;
        match db.delete_expired_sessions().await {
            Ok(0) => {}
            Ok(purged) => info!("Purged {} expired sessions", purged),
            Err(e) => error!("Expired session purge failed: {}", e),
        }
    }
}
