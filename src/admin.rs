//! Moderation area mounted under `/admin`. Every handler takes [`RequireAdmin`].

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use tracing::info;

use crate::db::{ContactMessage, News, NewsStats, Role, User};
use crate::forms::{ActionForm, NewsForm, RoleForm};
use crate::routes::{AppError, AppState, HtmlTemplate, NewsFormTemplate};
use crate::session::{flash_redirect, Flash, PageContext, RequireAdmin};

const DASHBOARD_ITEMS: i64 = 5;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(dashboard))
        .route("/news", get(news_list))
        .route("/news/new", get(new_news_page).post(create_news))
        .route("/news/:id/edit", get(edit_news_page).post(update_news))
        .route("/news/:id/toggle-draft", post(toggle_draft))
        .route("/news/:id/delete", post(delete_news))
        .route("/users", get(users_list))
        .route("/users/:id/role", post(set_role))
        .route("/users/:id/delete", post(delete_user))
        .route("/messages", get(messages_list))
        .route("/messages/:id/delete", post(delete_message))
}

#[derive(Template)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub ctx: PageContext,
    pub user_count: i64,
    pub stats: NewsStats,
    pub latest_news: Vec<News>,
    pub latest_messages: Vec<ContactMessage>,
}

#[derive(Template)]
#[template(path = "admin/news.html")]
pub struct NewsListTemplate {
    pub ctx: PageContext,
    pub news: Vec<News>,
}

#[derive(Template)]
#[template(path = "admin/users.html")]
pub struct UsersTemplate {
    pub ctx: PageContext,
    pub users: Vec<User>,
    pub current_user_id: i64,
}

#[derive(Template)]
#[template(path = "admin/messages.html")]
pub struct MessagesTemplate {
    pub ctx: PageContext,
    pub messages: Vec<ContactMessage>,
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    ctx: PageContext,
) -> Result<impl IntoResponse, AppError> {
    let user_count = state.db.count_users().await?;
    let stats = state.db.news_stats().await?;
    let latest_news = state.db.list_all_news(Some(DASHBOARD_ITEMS)).await?;
    let latest_messages = state.db.list_messages(Some(DASHBOARD_ITEMS)).await?;

    Ok(HtmlTemplate(DashboardTemplate {
        ctx,
        user_count,
        stats,
        latest_news,
        latest_messages,
    }))
}

pub async fn news_list(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    ctx: PageContext,
) -> Result<impl IntoResponse, AppError> {
    let news = state.db.list_all_news(None).await?;
    Ok(HtmlTemplate(NewsListTemplate { ctx, news }))
}

pub async fn new_news_page(RequireAdmin(_admin): RequireAdmin, ctx: PageContext) -> impl IntoResponse {
    HtmlTemplate(NewsFormTemplate::empty(ctx, "New article", "/admin/news/new"))
}

pub async fn create_news(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    ctx: PageContext,
    Form(form): Form<NewsForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;

    let draft = match form.to_draft(&admin.username) {
        Ok(draft) => draft,
        Err(e) => {
            let page = NewsFormTemplate::rejected(
                ctx,
                "New article",
                "/admin/news/new",
                &form,
                e.to_string(),
            );
            return Ok(HtmlTemplate(page).into_response());
        }
    };

    let news_id = state.db.create_news(&draft).await?;
    info!("Admin '{}' created article {}", admin.username, news_id);

    Ok(flash_redirect(
        "/admin/news",
        Flash::success(format!("Created \"{}\".", draft.title)),
    ))
}

pub async fn edit_news_page(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    ctx: PageContext,
    Path(news_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let news = state.db.get_news(news_id).await?.ok_or(AppError::NotFound)?;
    let action = format!("/admin/news/{}/edit", news.id);

    Ok(HtmlTemplate(NewsFormTemplate::for_news(
        ctx,
        "Edit article",
        &action,
        &news,
    )))
}

pub async fn update_news(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    ctx: PageContext,
    Path(news_id): Path<i64>,
    Form(form): Form<NewsForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;
    let news = state.db.get_news(news_id).await?.ok_or(AppError::NotFound)?;
    let action = format!("/admin/news/{}/edit", news.id);

    let draft = match form.to_draft(&news.author) {
        Ok(draft) => draft,
        Err(e) => {
            let page =
                NewsFormTemplate::rejected(ctx, "Edit article", &action, &form, e.to_string());
            return Ok(HtmlTemplate(page).into_response());
        }
    };

    state.db.update_news(news.id, &draft).await?;
    info!("Admin '{}' edited article {}", admin.username, news.id);

    Ok(flash_redirect(
        "/admin/news",
        Flash::success(format!("Updated \"{}\".", draft.title)),
    ))
}

pub async fn toggle_draft(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    ctx: PageContext,
    Path(news_id): Path<i64>,
    Form(form): Form<ActionForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;
    let news = state.db.get_news(news_id).await?.ok_or(AppError::NotFound)?;

    let is_draft = !news.is_draft;
    state.db.set_draft(news.id, is_draft).await?;
    info!(
        "Admin '{}' set article {} draft={}",
        admin.username, news.id, is_draft
    );

    let message = if is_draft {
        format!("\"{}\" moved back to drafts.", news.title)
    } else {
        format!("\"{}\" published.", news.title)
    };
    Ok(flash_redirect("/admin/news", Flash::success(message)))
}

pub async fn delete_news(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    ctx: PageContext,
    Path(news_id): Path<i64>,
    Form(form): Form<ActionForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;

    if !state.db.delete_news(news_id).await? {
        return Err(AppError::NotFound);
    }
    info!("Admin '{}' deleted article {}", admin.username, news_id);

    Ok(flash_redirect("/admin/news", Flash::success("Article deleted.")))
}

pub async fn users_list(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    ctx: PageContext,
) -> Result<impl IntoResponse, AppError> {
    let users = state.db.list_users().await?;
    Ok(HtmlTemplate(UsersTemplate {
        ctx,
        users,
        current_user_id: admin.id,
    }))
}

pub async fn set_role(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    ctx: PageContext,
    Path(user_id): Path<i64>,
    Form(form): Form<RoleForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;

    if user_id == admin.id {
        return Ok(flash_redirect(
            "/admin/users",
            Flash::danger("You cannot change your own role."),
        ));
    }
    let Some(role) = Role::parse(&form.role) else {
        return Ok(flash_redirect(
            "/admin/users",
            Flash::danger(format!("Unknown role '{}'.", form.role)),
        ));
    };

    if !state.db.set_user_role(user_id, role).await? {
        return Err(AppError::NotFound);
    }
    info!(
        "Admin '{}' set user {} role to {}",
        admin.username,
        user_id,
        role.as_str()
    );

    Ok(flash_redirect("/admin/users", Flash::success("Role updated.")))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    ctx: PageContext,
    Path(user_id): Path<i64>,
    Form(form): Form<ActionForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;

    if user_id == admin.id {
        return Ok(flash_redirect(
            "/admin/users",
            Flash::danger("You cannot delete your own account."),
        ));
    }
    if !state.db.delete_user(user_id).await? {
        return Err(AppError::NotFound);
    }
    info!("Admin '{}' deleted user {}", admin.username, user_id);

    Ok(flash_redirect("/admin/users", Flash::success("User deleted.")))
}

pub async fn messages_list(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    ctx: PageContext,
) -> Result<impl IntoResponse, AppError> {
    let messages = state.db.list_messages(None).await?;
    Ok(HtmlTemplate(MessagesTemplate { ctx, messages }))
}

pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    ctx: PageContext,
    Path(message_id): Path<i64>,
    Form(form): Form<ActionForm>,
) -> Result<Response, AppError> {
    ctx.verify_csrf(&form.csrf_token)?;

    if !state.db.delete_message(message_id).await? {
        return Err(AppError::NotFound);
    }
    Ok(flash_redirect(
        "/admin/messages",
        Flash::success("Message deleted."),
    ))
}

#[cfg(test)]
mod tests {
    use crate::db::Role;
    use crate::routes::test_support::*;
    use axum::http::StatusCode;

    mod access_tests {
        use super::*;

        #[tokio::test]
        async fn test_anonymous_is_sent_to_login() {
            let (app, _db) = create_test_app().await;

            let response = send(&app, get("/admin", None)).await;
            assert!(response.status().is_redirection());
            assert_eq!(location(&response), "/login?next=%2Fadmin");
        }

        #[tokio::test]
        async fn test_regular_user_is_forbidden() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "alice", Role::User).await;

            for uri in ["/admin", "/admin/news", "/admin/users", "/admin/messages"] {
                let response = send(&app, get(uri, Some(&token))).await;
                assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
            }
        }

        #[tokio::test]
        async fn test_admin_pages_render() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            login_as(&db, "alice", Role::User).await;
            let front = publish(&db, "Front Page", "World", "alice").await;
            let draft = publish(&db, "Work In Progress", "World", "alice").await;
            db.set_draft(draft, true).await.unwrap();
            for _ in 0..3 {
                db.increment_views(front).await.unwrap();
            }
            db.create_message("Reader", "reader@example.com", "Typo in headline")
                .await
                .unwrap();

            let response = send(&app, get("/admin", Some(&token))).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_string(response).await;
            assert!(body.contains("Front Page"));
            assert!(body.contains("Typo in headline"));
            assert!(body.contains(r#"<span class="value">2</span> users"#));
            assert!(body.contains(r#"<span class="value">2</span> articles"#));
            assert!(body.contains(r#"<span class="value">1</span> drafts"#));
            assert!(body.contains(r#"<span class="value">3</span> total views"#));

            let response = send(&app, get("/admin/users", Some(&token))).await;
            assert!(body_string(response).await.contains("alice"));

            let response = send(&app, get("/admin/messages", Some(&token))).await;
            assert!(body_string(response).await.contains("Typo in headline"));
        }

        #[tokio::test]
        async fn test_dashboard_shows_latest_five_articles() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            for n in 1..=7 {
                publish(&db, &format!("Story {}", n), "World", "chief").await;
            }

            let response = send(&app, get("/admin", Some(&token))).await;
            let body = body_string(response).await;
            assert!(body.contains(r#"<span class="value">7</span> articles"#));
            for n in 3..=7 {
                assert!(body.contains(&format!("Story {}<", n)), "Story {}", n);
            }
            assert!(!body.contains("Story 1<"));
            assert!(!body.contains("Story 2<"));
        }
    }

    mod news_tests {
        use super::*;

        #[tokio::test]
        async fn test_admin_list_includes_drafts() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            let id = publish(&db, "Embargoed Story", "World", "chief").await;
            db.set_draft(id, true).await.unwrap();

            let response = send(&app, get("/admin/news", Some(&token))).await;
            assert!(body_string(response).await.contains("Embargoed Story"));
        }

        #[tokio::test]
        async fn test_admin_creates_news() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;

            let response = send(
                &app,
                post_form(
                    "/admin/news/new",
                    Some(&token),
                    &[
                        ("title", "Editorial"),
                        ("category", "Opinion"),
                        ("body", "We think."),
                        ("is_draft", "on"),
                    ],
                ),
            )
            .await;
            assert_eq!(location(&response), "/admin/news");

            let news = db.list_all_news(None).await.unwrap();
            assert_eq!(news.len(), 1);
            assert_eq!(news[0].author, "chief");
            assert!(news[0].is_draft);
        }

        #[tokio::test]
        async fn test_admin_edits_any_article_keeping_author() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            login_as(&db, "alice", Role::User).await;
            let id = publish(&db, "Speling Error", "World", "alice").await;

            let response = send(
                &app,
                get(&format!("/admin/news/{}/edit", id), Some(&token)),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);

            send(
                &app,
                post_form(
                    &format!("/admin/news/{}/edit", id),
                    Some(&token),
                    &[
                        ("title", "Spelling Error"),
                        ("category", "World"),
                        ("body", "Fixed"),
                    ],
                ),
            )
            .await;

            let news = db.get_news(id).await.unwrap().unwrap();
            assert_eq!(news.title, "Spelling Error");
            assert_eq!(news.author, "alice");
        }

        #[tokio::test]
        async fn test_toggle_draft() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            let id = publish(&db, "Story", "World", "chief").await;
            let uri = format!("/admin/news/{}/toggle-draft", id);

            send(&app, post_form(&uri, Some(&token), &[])).await;
            assert!(db.get_news(id).await.unwrap().unwrap().is_draft);

            send(&app, post_form(&uri, Some(&token), &[])).await;
            assert!(!db.get_news(id).await.unwrap().unwrap().is_draft);
        }

        #[tokio::test]
        async fn test_delete_news() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            let id = publish(&db, "Retracted", "World", "chief").await;
            let uri = format!("/admin/news/{}/delete", id);

            let response = send(&app, post_form(&uri, Some(&token), &[])).await;
            assert_eq!(location(&response), "/admin/news");
            assert!(db.get_news(id).await.unwrap().is_none());

            let response = send(&app, post_form(&uri, Some(&token), &[])).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_delete_by_regular_user_is_forbidden() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "alice", Role::User).await;
            let id = publish(&db, "Mine", "World", "alice").await;

            let response = send(
                &app,
                post_form(&format!("/admin/news/{}/delete", id), Some(&token), &[]),
            )
            .await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert!(db.get_news(id).await.unwrap().is_some());
        }
    }

    mod user_tests {
        use super::*;

        #[tokio::test]
        async fn test_promote_user() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            login_as(&db, "alice", Role::User).await;
            let alice = db.get_user_by_username("alice").await.unwrap().unwrap();

            let response = send(
                &app,
                post_form(
                    &format!("/admin/users/{}/role", alice.id),
                    Some(&token),
                    &[("role", "admin")],
                ),
            )
            .await;
            assert_eq!(location(&response), "/admin/users");
            assert!(db.get_user(alice.id).await.unwrap().unwrap().is_admin());
        }

        #[tokio::test]
        async fn test_unknown_role_is_rejected() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            login_as(&db, "alice", Role::User).await;
            let alice = db.get_user_by_username("alice").await.unwrap().unwrap();

            send(
                &app,
                post_form(
                    &format!("/admin/users/{}/role", alice.id),
                    Some(&token),
                    &[("role", "superuser")],
                ),
            )
            .await;
            assert!(!db.get_user(alice.id).await.unwrap().unwrap().is_admin());
        }

        #[tokio::test]
        async fn test_admin_cannot_demote_or_delete_self() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            let chief = db.get_user_by_username("chief").await.unwrap().unwrap();

            send(
                &app,
                post_form(
                    &format!("/admin/users/{}/role", chief.id),
                    Some(&token),
                    &[("role", "user")],
                ),
            )
            .await;
            send(
                &app,
                post_form(&format!("/admin/users/{}/delete", chief.id), Some(&token), &[]),
            )
            .await;

            let chief = db.get_user(chief.id).await.unwrap().unwrap();
            assert!(chief.is_admin());
        }

        #[tokio::test]
        async fn test_delete_user_removes_their_articles() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            login_as(&db, "spammer", Role::User).await;
            publish(&db, "Buy Now", "Ads", "spammer").await;
            let spammer = db.get_user_by_username("spammer").await.unwrap().unwrap();

            let response = send(
                &app,
                post_form(
                    &format!("/admin/users/{}/delete", spammer.id),
                    Some(&token),
                    &[],
                ),
            )
            .await;
            assert_eq!(location(&response), "/admin/users");
            assert!(db.get_user(spammer.id).await.unwrap().is_none());
            assert!(db.list_all_news(None).await.unwrap().is_empty());
        }
    }

    mod message_tests {
        use super::*;

        #[tokio::test]
        async fn test_delete_message() {
            let (app, db) = create_test_app().await;
            let token = login_as(&db, "chief", Role::Admin).await;
            let id = db
                .create_message("Reader", "reader@example.com", "Hi")
                .await
                .unwrap();

            let response = send(
                &app,
                post_form(&format!("/admin/messages/{}/delete", id), Some(&token), &[]),
            )
            .await;
            assert_eq!(location(&response), "/admin/messages");
            assert!(db.list_messages(None).await.unwrap().is_empty());
        }
    }
}
