use axum::{
    Extension, Form, Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    application::{
        auth::Viewer,
        error::HttpError,
        feed::{AuthorListing, GroupListing, PostDetail},
        pagination::Page,
        posts::{CommentForm, FormErrors, PostError, PostForm},
    },
    cache::index_cache_layer,
    domain::entities::{GroupRecord, PostRecord},
};

use super::{
    CurrentUser, HttpState, RouterState, authenticate, db_health_response,
    middleware::{log_responses, set_request_context},
    require_login,
};

/// The whole HTTP surface. Only `/` goes through the index cache.
pub fn build_router(state: RouterState) -> Router {
    let index_route =
        get(index).layer(middleware::from_fn_with_state(state.cache.clone(), index_cache_layer));

    let public_routes = Router::new()
        .route("/", index_route)
        .route("/group/{slug}/", get(group_posts))
        .route("/profile/{username}/", get(profile))
        .route("/posts/{post_id}/", get(post_detail))
        .route("/_health/db", get(public_health));

    let protected_routes = Router::new()
        .route("/create/", get(post_create_form).post(post_create))
        .route("/posts/{post_id}/edit/", get(post_edit_form).post(post_edit))
        .route("/posts/{post_id}/comment/", post(add_comment))
        .route("/follow/", get(follow_index))
        .route("/profile/{username}/follow/", get(profile_follow))
        .route("/profile/{username}/unfollow/", get(profile_unfollow))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_login,
        ));

    public_routes
        .merge(protected_routes)
        .fallback(fallback)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            authenticate,
        ))
        .layer(middleware::from_fn(set_request_context))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageQuery {
    page: Option<String>,
}

#[derive(Serialize)]
struct ListingView {
    page_obj: Page<PostRecord>,
}

#[derive(Serialize)]
struct ProfileView {
    #[serde(flatten)]
    listing: AuthorListing,
    following: bool,
    follower_count: u64,
    following_count: u64,
}

#[derive(Serialize)]
struct PostDetailView {
    #[serde(flatten)]
    detail: PostDetail,
    can_edit: bool,
    form: CommentForm,
}

#[derive(Serialize)]
struct PostFormView {
    is_edit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    post_id: Option<i64>,
    form: PostForm,
    errors: FormErrors,
    groups: Vec<GroupRecord>,
}

fn profile_path(username: &str) -> String {
    format!("/profile/{username}/")
}

fn post_path(post_id: i64) -> String {
    format!("/posts/{post_id}/")
}

/// Non-numeric ids are unknown posts, not malformed requests.
fn parse_post_id(raw: &str) -> Result<i64, HttpError> {
    raw.parse::<i64>().map_err(|_| {
        HttpError::not_found(
            "infra::http::public::parse_post_id",
            format!("`{raw}` is not a post id"),
        )
    })
}

async fn index(
    State(state): State<HttpState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListingView>, HttpError> {
    let page = state.feed.page_request(query.page.as_deref());
    let page_obj = state.feed.list_index(page).await?;
    Ok(Json(ListingView { page_obj }))
}

async fn group_posts(
    State(state): State<HttpState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<GroupListing>, HttpError> {
    let page = state.feed.page_request(query.page.as_deref());
    let listing = state.feed.list_by_group(&slug, page).await?;
    Ok(Json(listing))
}

async fn profile(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ProfileView>, HttpError> {
    let page = state.feed.page_request(query.page.as_deref());
    let listing = state.feed.list_by_author(&username, page).await?;
    let following = state
        .follow
        .is_following(viewer.user(), &listing.author)
        .await?;
    let (follower_count, following_count) = state.follow.follower_counts(&listing.author).await?;

    Ok(Json(ProfileView {
        listing,
        following,
        follower_count,
        following_count,
    }))
}

async fn post_detail(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(post_id): Path<String>,
) -> Result<Json<PostDetailView>, HttpError> {
    let post_id = parse_post_id(&post_id)?;
    let detail = state.feed.post_detail(post_id).await?;
    let can_edit = viewer
        .user()
        .is_some_and(|user| detail.post.is_authored_by(user));

    Ok(Json(PostDetailView {
        detail,
        can_edit,
        form: CommentForm::default(),
    }))
}

async fn follow_index(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListingView>, HttpError> {
    let page = state.feed.page_request(query.page.as_deref());
    let page_obj = state.feed.list_followed_feed(&user, page).await?;
    Ok(Json(ListingView { page_obj }))
}

async fn profile_follow(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> Result<Redirect, HttpError> {
    state.follow.follow_username(&user, &username).await?;
    Ok(Redirect::to(&profile_path(&username)))
}

async fn profile_unfollow(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(username): Path<String>,
) -> Result<Redirect, HttpError> {
    state.follow.unfollow_username(&user, &username).await?;
    Ok(Redirect::to(&profile_path(&username)))
}

async fn form_view(
    state: &HttpState,
    status: StatusCode,
    post_id: Option<i64>,
    form: PostForm,
    errors: FormErrors,
) -> Result<Response, HttpError> {
    let groups = state.groups.list_groups().await.map_err(|err| {
        HttpError::from_error(
            "infra::http::public::form_view",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        )
    })?;
    let view = PostFormView {
        is_edit: post_id.is_some(),
        post_id,
        form,
        errors,
        groups,
    };
    Ok((status, Json(view)).into_response())
}

async fn post_create_form(
    State(state): State<HttpState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Response, HttpError> {
    form_view(
        &state,
        StatusCode::OK,
        None,
        PostForm::default(),
        FormErrors::default(),
    )
    .await
}

async fn post_create(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<PostForm>,
) -> Result<Response, HttpError> {
    match state.posts.create_post(&user, &form).await {
        Ok(_) => Ok(Redirect::to(&profile_path(&user.username)).into_response()),
        Err(PostError::Invalid(errors)) => {
            form_view(&state, StatusCode::UNPROCESSABLE_ENTITY, None, form, errors).await
        }
        Err(err) => Err(err.into()),
    }
}

async fn post_edit_form(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(&post_id)?;
    match state.posts.editable_post(&user, post_id).await {
        Ok(post) => {
            form_view(
                &state,
                StatusCode::OK,
                Some(post.id),
                PostForm::from_post(&post),
                FormErrors::default(),
            )
            .await
        }
        Err(PostError::Forbidden { .. }) => Ok(Redirect::to(&post_path(post_id)).into_response()),
        Err(err) => Err(err.into()),
    }
}

async fn post_edit(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
    Form(form): Form<PostForm>,
) -> Result<Response, HttpError> {
    let post_id = parse_post_id(&post_id)?;
    match state.posts.edit_post(&user, post_id, &form).await {
        Ok(post) => Ok(Redirect::to(&post_path(post.id)).into_response()),
        Err(PostError::Forbidden { .. }) => Ok(Redirect::to(&post_path(post_id)).into_response()),
        Err(PostError::Invalid(errors)) => {
            form_view(
                &state,
                StatusCode::UNPROCESSABLE_ENTITY,
                Some(post_id),
                form,
                errors,
            )
            .await
        }
        Err(err) => Err(err.into()),
    }
}

/// A blank comment is dropped and the caller lands back on the post.
async fn add_comment(
    State(state): State<HttpState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Result<Redirect, HttpError> {
    let post_id = parse_post_id(&post_id)?;
    match state.posts.add_comment(&user, post_id, &form).await {
        Ok(_) | Err(PostError::Invalid(_)) => Ok(Redirect::to(&post_path(post_id))),
        Err(err) => Err(err.into()),
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.check().await)
}

async fn fallback(request: Request<Body>) -> HttpError {
    HttpError::not_found(
        "infra::http::public::fallback",
        format!("no route for {}", request.uri().path()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::feed::FeedError;

    #[test]
    fn post_ids_must_be_numeric() {
        assert_eq!(parse_post_id("42").expect("id"), 42);
        let err = parse_post_id("abc").expect_err("not an id");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn redirect_targets_end_with_slash() {
        assert_eq!(profile_path("alice"), "/profile/alice/");
        assert_eq!(post_path(7), "/posts/7/");
    }

    #[test]
    fn feed_errors_become_not_found() {
        let err: HttpError = FeedError::UnknownPost(9).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
