use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::{
    application::{
        auth::{AuthError, INVALID_LOGIN_MESSAGE, IssuedSession},
        error::HttpError,
    },
    presentation::views::{
        LayoutContext, LoginContext, LoginTemplate, SignupContext, SignupErrors, SignupTemplate,
        render_template_response,
    },
};

use super::{
    HttpState, found,
    forms::{LoginForm, NextQuery, SignupForm},
    repo_error_to_http,
    session::{CurrentUser, SESSION_COOKIE, removal_cookie, safe_next, session_cookie},
};

pub(super) async fn signup_form(user: CurrentUser) -> Response {
    let content = SignupContext {
        username: String::new(),
        errors: SignupErrors::default(),
    };
    let view = LayoutContext::new("Sign up", user.viewer(), content);
    render_template_response(SignupTemplate { view }, StatusCode::OK)
}

pub(super) async fn signup(
    State(state): State<HttpState>,
    user: CurrentUser,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Response {
    const SOURCE: &str = "infra::http::auth::signup";

    let created = state
        .auth
        .signup(&form.username, &form.password1, &form.password2)
        .await;

    let account = match created {
        Ok(account) => account,
        Err(AuthError::Invalid(errors)) => {
            let content = SignupContext {
                username: form.username.trim().to_string(),
                errors: SignupErrors {
                    username: errors.messages("username"),
                    password1: errors.messages("password1"),
                    password2: errors.messages("password2"),
                },
            };
            let view = LayoutContext::new("Sign up", user.viewer(), content);
            return render_template_response(SignupTemplate { view }, StatusCode::OK);
        }
        Err(err) => return auth_error_response(SOURCE, err),
    };

    match state.auth.start_session(&account).await {
        Ok(session) => with_session(&state, jar, session, "/"),
        Err(err) => auth_error_response(SOURCE, err),
    }
}

pub(super) async fn login_form(user: CurrentUser, Query(query): Query<NextQuery>) -> Response {
    let content = LoginContext {
        username: String::new(),
        next: safe_next(query.next.as_deref()).to_string(),
        errors: Vec::new(),
    };
    let view = LayoutContext::new("Log in", user.viewer(), content);
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

pub(super) async fn login(
    State(state): State<HttpState>,
    user: CurrentUser,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = safe_next(form.next.as_deref()).to_string();

    match state.auth.login(&form.username, &form.password).await {
        Ok(session) => with_session(&state, jar, session, &next),
        Err(AuthError::InvalidCredentials) => {
            warn!(target: "yatube::http::auth", "login rejected");
            let content = LoginContext {
                username: form.username.trim().to_string(),
                next,
                errors: vec![INVALID_LOGIN_MESSAGE.to_string()],
            };
            let view = LayoutContext::new("Log in", user.viewer(), content);
            render_template_response(LoginTemplate { view }, StatusCode::OK)
        }
        Err(err) => auth_error_response("infra::http::auth::login", err),
    }
}

pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && let Err(err) = state.auth.logout(cookie.value()).await
    {
        return auth_error_response("infra::http::auth::logout", err);
    }

    (jar.remove(removal_cookie()), found("/")).into_response()
}

fn with_session(state: &HttpState, jar: CookieJar, session: IssuedSession, next: &str) -> Response {
    let cookie = session_cookie(session.token, session.expires_at, state.secure_cookies);
    (jar.add(cookie), found(next)).into_response()
}

fn auth_error_response(source: &'static str, err: AuthError) -> Response {
    match err {
        AuthError::Repo(err) => repo_error_to_http(source, err).into_response(),
        other => HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication failed",
            &other,
        )
        .into_response(),
    }
}
