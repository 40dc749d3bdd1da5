use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::admin;
use crate::auth::{self, PasswordChangeError, RegisterError};
use crate::config::Config;
use crate::db::{category_url, Database, News, User};
use crate::forms::{ContactForm, LoginForm, NewsForm, PasswordForm, RegisterForm};
use crate::session::{
    self, append_cookie, clear_cookie, flash_redirect, set_cookie, Flash, PageContext,
    RequireUser, SESSION_COOKIE,
};

const RELATED_LIMIT: i64 = 5;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/home", get(home))
        .route("/login", get(login_page).post(login_submit))
        .route("/register", get(register_page).post(register_submit))
        .route("/logout", get(logout))
        .route("/category/:category", get(category_news))
        .route("/news/new", get(new_news_page).post(create_news))
        .route("/news/:id", get(news_detail))
        .route("/news/:id/edit", get(edit_news_page).post(update_news))
        .route("/contact", get(contact_page).post(contact_submit))
        .route("/profile", get(profile))
        .route("/profile/password", post(change_password))
        .route("/health", get(health))
        .nest("/admin", admin::router())
        .nest_service("/static", ServeDir::new("static"))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::request_context,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Template structs
pub struct CategoryLink {
    pub name: String,
    pub url: String,
    pub active: bool,
}

fn category_links(categories: Vec<String>, current: Option<&str>) -> Vec<CategoryLink> {
    categories
        .into_iter()
        .map(|name| CategoryLink {
            url: category_url(&name),
            active: current == Some(name.as_str()),
            name,
        })
        .collect()
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub ctx: PageContext,
    pub news: Vec<News>,
    pub categories: Vec<CategoryLink>,
}

#[derive(Template)]
#[template(path = "category.html")]
pub struct CategoryTemplate {
    pub ctx: PageContext,
    pub news: Vec<News>,
    pub categories: Vec<CategoryLink>,
    pub current_category: String,
}

#[derive(Template)]
#[template(path = "news_detail.html")]
pub struct NewsDetailTemplate {
    pub ctx: PageContext,
    pub news: News,
    pub paragraphs: Vec<String>,
    pub related: Vec<News>,
    pub can_edit: bool,
}

#[derive(Template)]
#[template(path = "news_form.html")]
pub struct NewsFormTemplate {
    pub ctx: PageContext,
    pub heading: String,
    pub action: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub is_draft: bool,
}

impl NewsFormTemplate {
    pub fn empty(ctx: PageContext, heading: &str, action: &str) -> Self {
        Self {
            ctx,
            heading: heading.to_string(),
            action: action.to_string(),
            title: String::new(),
            body: String::new(),
            category: String::new(),
            is_draft: false,
        }
    }

    pub fn for_news(ctx: PageContext, heading: &str, action: &str, news: &News) -> Self {
        Self {
            ctx,
            heading: heading.to_string(),
            action: action.to_string(),
            title: news.title.clone(),
            body: news.body.clone(),
            category: news.category.clone(),
            is_draft: news.is_draft,
        }
    }

    /// Redisplays a rejected submission with its error
    pub fn rejected(
        mut ctx: PageContext,
        heading: &str,
        action: &str,
        form: &NewsForm,
        message: String,
    ) -> Self {
        ctx.flashes.push(Flash::danger(message));
        Self {
            ctx,
            heading: heading.to_string(),
            action: action.to_string(),
            title: form.title.clone(),
            body: form.body.clone(),
            category: form.category.clone(),
            is_draft: form.is_draft(),
        }
    }
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub ctx: PageContext,
    pub action: String,
}

#[derive(Template)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub ctx: PageContext,
}

#[derive(Template)]
#[template(path = "contact.html")]
pub struct ContactTemplate {
    pub ctx: PageContext,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub ctx: PageContext,
    pub user: User,
    pub news: Vec<News>,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub status: u16,
    pub message: String,
}

// Wrapper for HTML responses
pub struct HtmlTemplate<T>(pub T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => {
                error!("Failed to render template: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to render template",
                )
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Page not found")]
    NotFound,
    #[error("You do not have permission to access this page")]
    Forbidden,
    #[error("The form has expired, please go back and try again")]
    Csrf,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Csrf => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                error!("Request failed: {:#}", e);
                "An error occurred while loading the page. Please try again later.".to_string()
            }
            other => other.to_string(),
        };

        let page = ErrorTemplate {
            status: status.as_u16(),
            message,
        };
        (status, HtmlTemplate(page)).into_response()
    }
}

/// Only same-site paths are honored as post-login targets
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path
        }
        _ => "/",
    }
}

fn can_edit(user: Option<&User>, news: &News) -> bool {
    user.is_some_and(|u| u.is_admin() || u.username == news.author)
}

// Route handlers
pub async fn home(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
) -> Result<impl IntoResponse, AppError> {
    let news = state.db.list_published().await?;
    let categories = category_links(state.db.published_categories().await?, None);

    Ok(HtmlTemplate(IndexTemplate {
        ctx,
        news,
        categories,
    }))
}

#[derive(Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

impl LoginQuery {
    fn form_action(&self) -> String {
        match self.next.as_deref() {
            Some(next) if !next.is_empty() => {
                format!("/login?next={}", urlencoding::encode(next))
            }
            _ => "/login".to_string(),
        }
    }
}

pub async fn login_page(ctx: PageContext, Query(query): Query<LoginQuery>) -> Response {
    if ctx.is_authenticated() {
        return Redirect::to("/").into_response();
    }

    HtmlTemplate(LoginTemplate {
        ctx,
        action: query.form_action(),
    })
    .into_response()
}

pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    Query(query): Query<LoginQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if ctx.is_authenticated() {
        return Ok(Redirect::to("/").into_response());
    }
    ctx.verify_csrf(&form.csrf_token)?;

    let Some(user) = auth::authenticate(&state.db, &form.username, &form.password).await? else {
        info!("Failed login for '{}'", form.username.trim());
        return Ok(flash_redirect(
            &query.form_action(),
            Flash::danger("Invalid username or password"),
        ));
    };

    let remember = form.remember();
    let lifetime = state.config.session_lifetime(remember);
    let session = state.db.create_session(user.id, lifetime).await?;
    info!("User '{}' logged in", user.username);

    let max_age = remember.then(|| lifetime.num_seconds());
    let mut response = Redirect::to(safe_next(query.next.as_deref())).into_response();
    append_cookie(
        &mut response,
        &set_cookie(
            SESSION_COOKIE,
            &session.id,
            max_age,
            state.config.session.secure_cookies,
        ),
    );
    Ok(response)
}

pub async fn register_page(ctx: PageContext) -> Response {
    if ctx.is_authenticated() {
        return Redirect::to("/").into_response();
    }
    HtmlTemplate(RegisterTemplate { ctx }).into_response()
}

pub async fn register_submit(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if ctx.is_authenticated() {
        return Ok(Redirect::to("/").into_response());
    }
    ctx.verify_csrf(&form.csrf_token)?;

    match auth::register(&state.db, &form).await {
        Ok(_) => Ok(flash_redirect(
            "/login",
            Flash::success("Registration successful! Please login."),
        )),
        Err(RegisterError::Internal(e)) => Err(AppError::Internal(e)),
        Err(e) => Ok(flash_redirect("/register", Flash::danger(e.to_string()))),
    }
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: PageContext,
) -> Result<Response, AppError> {
    if let Some(token) = &ctx.session_token {
        state.db.delete_session(token).await?;
    }
    info!("User '{}' logged out", user.username);

    let mut response = flash_redirect("/", Flash::info("You have been logged out."));
    append_cookie(&mut response, &clear_cookie(SESSION_COOKIE));
    Ok(response)
}

pub async fn category_news(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    Path(category): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let news = state.db.list_published_by_category(&category).await?;
    let categories = category_links(
        state.db.published_categories().await?,
        Some(category.as_str()),
    );

    Ok(HtmlTemplate(CategoryTemplate {
        ctx,
        news,
        categories,
        current_category: category,
    }))
}

pub async fn news_detail(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    Path(news_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut news = state.db.get_news(news_id).await?.ok_or(AppError::NotFound)?;

    let can_edit = can_edit(ctx.user.as_ref(), &news);
    if news.is_draft && !can_edit {
        return Err(AppError::NotFound);
    }

    if state.db.increment_views(news.id).await? {
        news.views += 1;
    }
    let related = state.db.related_news(&news, RELATED_LIMIT).await?;
    let paragraphs = news.paragraphs().into_iter().map(str::to_string).collect();

    Ok(HtmlTemplate(NewsDetailTemplate {
        ctx,
        news,
        paragraphs,
        related,
        can_edit,
    }))
}

pub async fn new_news_page(RequireUser(_user): RequireUser, ctx: PageContext) -> impl IntoResponse {
    HtmlTemplate(NewsFormTemplate::empty(ctx, "Write an article", "/news/new"))
}

pub async fn create_news(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: PageContext,
    Form(form): Form<NewsForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;

    let draft = match form.to_draft(&user.username) {
        Ok(draft) => draft,
        Err(e) => {
            let page = NewsFormTemplate::rejected(
                ctx,
                "Write an article",
                "/news/new",
                &form,
                e.to_string(),
            );
            return Ok(HtmlTemplate(page).into_response());
        }
    };

    let news_id = state.db.create_news(&draft).await?;
    info!("User '{}' created article {}", user.username, news_id);

    let message = if draft.is_draft {
        "Draft saved."
    } else {
        "Article published."
    };
    Ok(flash_redirect(
        &format!("/news/{}", news_id),
        Flash::success(message),
    ))
}

async fn editable_news(state: &AppState, user: &User, news_id: i64) -> Result<News, AppError> {
    let news = state.db.get_news(news_id).await?.ok_or(AppError::NotFound)?;
    if !can_edit(Some(user), &news) {
        return Err(AppError::Forbidden);
    }
    Ok(news)
}

pub async fn edit_news_page(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: PageContext,
    Path(news_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let news = editable_news(&state, &user, news_id).await?;
    let action = format!("/news/{}/edit", news.id);

    Ok(HtmlTemplate(NewsFormTemplate::for_news(
        ctx,
        "Edit article",
        &action,
        &news,
    )))
}

pub async fn update_news(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: PageContext,
    Path(news_id): Path<i64>,
    Form(form): Form<NewsForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;
    let news = editable_news(&state, &user, news_id).await?;
    let action = format!("/news/{}/edit", news.id);

    let draft = match form.to_draft(&news.author) {
        Ok(draft) => draft,
        Err(e) => {
            let page =
                NewsFormTemplate::rejected(ctx, "Edit article", &action, &form, e.to_string());
            return Ok(HtmlTemplate(page).into_response());
        }
    };

    state.db.update_news(news.id, &draft).await?;
    info!("User '{}' updated article {}", user.username, news.id);

    Ok(flash_redirect(
        &format!("/news/{}", news.id),
        Flash::success("Article updated."),
    ))
}

pub async fn contact_page(ctx: PageContext) -> impl IntoResponse {
    HtmlTemplate(ContactTemplate { ctx })
}

pub async fn contact_submit(
    State(state): State<Arc<AppState>>,
    ctx: PageContext,
    Form(form): Form<ContactForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;

    if let Err(e) = form.validate() {
        return Ok(flash_redirect("/contact", Flash::danger(e.to_string())));
    }

    state
        .db
        .create_message(form.name.trim(), form.email.trim(), form.message.trim())
        .await?;
    info!("Contact message received from {}", form.email.trim());

    Ok(flash_redirect(
        "/contact",
        Flash::success("Thank you for your message! We will get back to you soon."),
    ))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: PageContext,
) -> Result<impl IntoResponse, AppError> {
    let news = state.db.list_news_by_author(&user.username).await?;

    Ok(HtmlTemplate(ProfileTemplate { ctx, user, news }))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    ctx: PageContext,
    Form(form): Form<PasswordForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;

    let flash = match auth::change_password(&state.db, &user, &form).await {
        Ok(()) => Flash::success("Password updated."),
        Err(PasswordChangeError::Internal(e)) => return Err(AppError::Internal(e)),
        Err(e) => Flash::danger(e.to_string()),
    };
    Ok(flash_redirect("/profile", flash))
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
