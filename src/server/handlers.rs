// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-oidc-server project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Endpoint handlers
//!
//! Rocket routes for every endpoint of the provider. Handlers translate
//! HTTP into engine calls and engine outcomes back into responses; the
//! protocol logic lives entirely in [`crate::oidc`].

use std::collections::HashMap;
use std::io::Cursor;
use std::net::IpAddr;
use std::sync::Arc;

use rocket::form::Form;
use rocket::http::{ContentType, Status};
use rocket::response::{content::RawHtml, status, Redirect, Responder, Response};
use rocket::serde::json::Json;
use rocket::{delete, get, post, put, Request, State};

use crate::oidc::authorize::{handle_authorization_request, AuthorizeOutcome};
use crate::oidc::ciba::{handle_backchannel_authentication, CibaResponse};
use crate::oidc::context::AuthorizationContext;
use crate::oidc::device::{
    approve_user_code, deny_user_code, handle_device_authorization, verify_user_code,
    DeviceAuthorizationResponse,
};
use crate::oidc::discovery::{discovery_document, DiscoveryDocument};
use crate::oidc::endsession::handle_end_session;
use crate::oidc::error::{ErrorCode, OidcError};
use crate::oidc::introspect::{handle_introspection, IntrospectionResponse};
use crate::oidc::par::{handle_par_request, ParResponse};
use crate::oidc::registration::{
    handle_registration, handle_registration_delete, handle_registration_read,
    handle_registration_update, ClientMetadata, RegistrationResponse,
};
use crate::oidc::revoke::handle_revocation;
use crate::oidc::session::check_session_page;
use crate::oidc::token::{handle_token_request, TokenResponse};
use crate::oidc::userinfo::{handle_userinfo, UserInfoResponse};
use crate::oidc::OidcState;

use super::guards::{
    AuthenticatedSession, BearerToken, ClientCredentials, PresentedCertificate,
};

type SharedState = State<Arc<OidcState>>;

/// Wire mapping of [`OidcError`]: JSON body, registry status code, and a
/// `WWW-Authenticate` challenge on 401s.
impl<'r> Responder<'r, 'static> for OidcError {
    fn respond_to(self, _request: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = Status::from_code(self.code.http_status()).unwrap_or(Status::BadRequest);
        let body = self.to_json().to_string();

        let mut builder = Response::build();
        builder
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body));

        if self.code == ErrorCode::InvalidClient {
            builder.raw_header("WWW-Authenticate", "Basic realm=\"oidc\"");
        } else if self.code == ErrorCode::InvalidToken
            || self.code == ErrorCode::InsufficientScope
        {
            builder.raw_header(
                "WWW-Authenticate",
                format!(
                    "Bearer error=\"{}\", error_description=\"{}\"",
                    self.code.as_str(),
                    self.description.replace('"', "'"),
                ),
            );
        }
        builder.ok()
    }
}

/// Authorization endpoint responses.
pub enum AuthorizeHttpResponse {
    Redirect(Box<Redirect>),
    Html(RawHtml<String>),
    Error(Status, RawHtml<String>),
}

impl<'r> Responder<'r, 'static> for AuthorizeHttpResponse {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        match self {
            AuthorizeHttpResponse::Redirect(redirect) => redirect.respond_to(request),
            AuthorizeHttpResponse::Html(html) => html.respond_to(request),
            AuthorizeHttpResponse::Error(status, html) => {
                let mut response = html.respond_to(request)?;
                response.set_status(status);
                Ok(response)
            }
        }
    }
}

fn authorize_outcome_response(outcome: AuthorizeOutcome) -> AuthorizeHttpResponse {
    match outcome {
        AuthorizeOutcome::Redirect(url) => {
            AuthorizeHttpResponse::Redirect(Box::new(Redirect::found(url)))
        }
        AuthorizeOutcome::FormPost(html) => AuthorizeHttpResponse::Html(RawHtml(html)),
        AuthorizeOutcome::LoginRequired => AuthorizeHttpResponse::Error(
            Status::Unauthorized,
            RawHtml(error_page(
                "Login required",
                "Sign in and retry the authorization request.",
            )),
        ),
        AuthorizeOutcome::ErrorPage(error) => AuthorizeHttpResponse::Error(
            Status::BadRequest,
            RawHtml(error_page(error.code.as_str(), &error.description)),
        ),
    }
}

/// Pre-redirect error page. Deliberately plain: this renders only when
/// the redirect URI itself could not be trusted.
fn error_page(title: &str, detail: &str) -> String {
    handlebars::Handlebars::new()
        .render_template(
            r#"<!DOCTYPE html>
<html>
<head><title>{{title}}</title></head>
<body><h1>{{title}}</h1><p>{{detail}}</p></body>
</html>
"#,
            &serde_json::json!({ "title": title, "detail": detail }),
        )
        .unwrap_or_else(|_| format!("{title}: {detail}"))
}

// Discovery surface.

/// OpenID Connect discovery document.
#[get("/openid-configuration")]
pub fn openid_configuration(state: &SharedState) -> Json<DiscoveryDocument> {
    Json(discovery_document(state))
}

/// Public JWKS.
#[get("/jwks")]
pub fn jwks(state: &SharedState) -> Json<crate::jwt::JwkKeySet> {
    Json(state.keys.public_jwks())
}

// Authorization endpoint.

#[get("/authorize?<params..>")]
pub async fn authorize(
    params: HashMap<String, String>,
    session: Option<AuthenticatedSession>,
    state: &SharedState,
) -> AuthorizeHttpResponse {
    run_authorize(params, session, state).await
}

#[post("/authorize", data = "<params>")]
pub async fn authorize_post(
    params: Form<HashMap<String, String>>,
    session: Option<AuthenticatedSession>,
    state: &SharedState,
) -> AuthorizeHttpResponse {
    run_authorize(params.into_inner(), session, state).await
}

async fn run_authorize(
    params: HashMap<String, String>,
    session: Option<AuthenticatedSession>,
    state: &SharedState,
) -> AuthorizeHttpResponse {
    let session = session.map(|s| s.0);
    match handle_authorization_request(state, params, session.as_ref()).await {
        Ok(outcome) => authorize_outcome_response(outcome),
        Err(error) => AuthorizeHttpResponse::Error(
            Status::BadRequest,
            RawHtml(error_page(error.code.as_str(), &error.description)),
        ),
    }
}

// Token endpoint.

#[post("/token", data = "<form>")]
pub async fn token(
    form: Form<HashMap<String, String>>,
    credentials: ClientCredentials,
    state: &SharedState,
) -> Result<Json<TokenResponse>, OidcError> {
    let form = form.into_inner();
    let request = credentials.with_form(&form);
    handle_token_request(state, &request, &form).await.map(Json)
}

// UserInfo.

pub enum UserInfoHttpResponse {
    Json(Json<serde_json::Value>),
    Jwt(String),
}

impl<'r> Responder<'r, 'static> for UserInfoHttpResponse {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        match self {
            UserInfoHttpResponse::Json(json) => json.respond_to(request),
            UserInfoHttpResponse::Jwt(token) => Response::build()
                .header(ContentType::new("application", "jwt"))
                .sized_body(token.len(), Cursor::new(token))
                .ok(),
        }
    }
}

#[get("/userinfo")]
pub async fn userinfo(
    bearer: BearerToken,
    certificate: PresentedCertificate,
    state: &SharedState,
) -> Result<UserInfoHttpResponse, OidcError> {
    let response = handle_userinfo(state, &bearer.0, certificate.0.as_deref()).await?;
    Ok(match response {
        UserInfoResponse::Json(value) => UserInfoHttpResponse::Json(Json(value)),
        UserInfoResponse::Jwt(token) => UserInfoHttpResponse::Jwt(token),
    })
}

#[post("/userinfo")]
pub async fn userinfo_post(
    bearer: BearerToken,
    certificate: PresentedCertificate,
    state: &SharedState,
) -> Result<UserInfoHttpResponse, OidcError> {
    userinfo(bearer, certificate, state).await
}

// Introspection and revocation.

#[post("/introspect", data = "<form>")]
pub async fn introspect(
    form: Form<HashMap<String, String>>,
    credentials: ClientCredentials,
    state: &SharedState,
) -> Result<Json<IntrospectionResponse>, OidcError> {
    let form = form.into_inner();
    let request = credentials.with_form(&form);
    handle_introspection(state, &request, &form).await.map(Json)
}

#[post("/revoke", data = "<form>")]
pub async fn revoke(
    form: Form<HashMap<String, String>>,
    credentials: ClientCredentials,
    state: &SharedState,
) -> Result<Status, OidcError> {
    let form = form.into_inner();
    let request = credentials.with_form(&form);
    handle_revocation(state, &request, &form).await?;
    Ok(Status::Ok)
}

// Pushed authorization requests.

#[post("/par", data = "<form>")]
pub async fn par(
    form: Form<HashMap<String, String>>,
    credentials: ClientCredentials,
    state: &SharedState,
) -> Result<status::Created<Json<ParResponse>>, OidcError> {
    let form = form.into_inner();
    let request = credentials.with_form(&form);
    let response = handle_par_request(state, &request, &form).await?;
    Ok(status::Created::new(response.request_uri.clone()).body(Json(response)))
}

// Device authorization.

#[post("/deviceauthorization", data = "<form>")]
pub async fn device_authorization(
    form: Form<HashMap<String, String>>,
    credentials: ClientCredentials,
    state: &SharedState,
) -> Result<Json<DeviceAuthorizationResponse>, OidcError> {
    let form = form.into_inner();
    let request = credentials.with_form(&form);
    handle_device_authorization(state, &request, &form)
        .await
        .map(Json)
}

/// Resolve a user-entered code for the host's consent UI.
#[post("/device/verify", data = "<form>")]
pub async fn device_verify(
    form: Form<HashMap<String, String>>,
    client_ip: Option<IpAddr>,
    _session: AuthenticatedSession,
    state: &SharedState,
) -> Result<Json<serde_json::Value>, OidcError> {
    let form = form.into_inner();
    let user_code = form.get("user_code").map(String::as_str).unwrap_or_default();
    let ip = client_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let request = verify_user_code(state, user_code, &ip).await?;
    Ok(Json(serde_json::json!({
        "client_id": request.client_id,
        "scope": request.scopes.join(" "),
    })))
}

/// Record the signed-in user's approval of a device request.
#[post("/device/approve", data = "<form>")]
pub async fn device_approve(
    form: Form<HashMap<String, String>>,
    session: AuthenticatedSession,
    state: &SharedState,
) -> Result<Status, OidcError> {
    let form = form.into_inner();
    let user_code = form.get("user_code").map(String::as_str).unwrap_or_default();
    let request = state
        .devices
        .find_by_user_code(&user_code.trim().to_uppercase())
        .await
        .ok_or_else(|| {
            OidcError::process(ErrorCode::AccessDenied, "The code is not valid")
        })?;

    let grant = AuthorizationContext {
        subject: Some(session.0.subject.clone()),
        client_id: request.client_id.clone(),
        scopes: request.scopes.clone(),
        resources: request.resources.clone(),
        claims: None,
        nonce: None,
        acr: session.0.acr.clone(),
        amr: session.0.amr.clone(),
        auth_time: Some(session.0.auth_time.timestamp()),
        session_id: Some(session.0.session_id.clone()),
        redirect_uri: None,
        code_challenge: None,
        code_challenge_method: None,
    };
    approve_user_code(state, user_code, grant).await?;
    Ok(Status::NoContent)
}

/// Record the signed-in user's denial of a device request.
#[post("/device/deny", data = "<form>")]
pub async fn device_deny(
    form: Form<HashMap<String, String>>,
    _session: AuthenticatedSession,
    state: &SharedState,
) -> Result<Status, OidcError> {
    let form = form.into_inner();
    let user_code = form.get("user_code").map(String::as_str).unwrap_or_default();
    deny_user_code(state, user_code).await?;
    Ok(Status::NoContent)
}

// CIBA.

#[post("/bc-authorize", data = "<form>")]
pub async fn bc_authorize(
    form: Form<HashMap<String, String>>,
    credentials: ClientCredentials,
    state: &SharedState,
) -> Result<Json<CibaResponse>, OidcError> {
    let form = form.into_inner();
    let request = credentials.with_form(&form);
    handle_backchannel_authentication(state, &request, &form)
        .await
        .map(Json)
}

// End-session and session management.

#[get("/endsession?<params..>")]
pub async fn endsession(
    params: HashMap<String, String>,
    session: Option<AuthenticatedSession>,
    cookies: &rocket::http::CookieJar<'_>,
    state: &SharedState,
) -> Result<AuthorizeHttpResponse, OidcError> {
    run_endsession(params, session, cookies, state).await
}

#[post("/endsession", data = "<params>")]
pub async fn endsession_post(
    params: Form<HashMap<String, String>>,
    session: Option<AuthenticatedSession>,
    cookies: &rocket::http::CookieJar<'_>,
    state: &SharedState,
) -> Result<AuthorizeHttpResponse, OidcError> {
    run_endsession(params.into_inner(), session, cookies, state).await
}

async fn run_endsession(
    params: HashMap<String, String>,
    session: Option<AuthenticatedSession>,
    cookies: &rocket::http::CookieJar<'_>,
    state: &SharedState,
) -> Result<AuthorizeHttpResponse, OidcError> {
    let current = session.as_ref().map(|s| s.0.session_id.as_str());
    let outcome = handle_end_session(state, &params, current).await?;

    if outcome.ended_session_id.is_some() {
        cookies.remove_private(rocket::http::Cookie::from(
            state.config.server.session_cookie_name.clone(),
        ));
    }

    if outcome.frontchannel_logout_uris.is_empty() {
        if let Some(target) = outcome.redirect_uri {
            return Ok(AuthorizeHttpResponse::Redirect(Box::new(Redirect::found(
                target,
            ))));
        }
        return Ok(AuthorizeHttpResponse::Html(RawHtml(error_page(
            "Signed out",
            "You have been signed out.",
        ))));
    }

    // Front-channel notifications render as hidden iframes; the page then
    // forwards to the post-logout destination if there is one.
    let html = handlebars::Handlebars::new()
        .render_template(
            r#"<!DOCTYPE html>
<html>
<head><title>Signing out</title>
{{#if redirect}}<meta http-equiv="refresh" content="2;url={{redirect}}"/>{{/if}}
</head>
<body>
<p>Signing out...</p>
{{#each frames}}<iframe src="{{this}}" style="display:none"></iframe>
{{/each}}</body>
</html>
"#,
            &serde_json::json!({
                "frames": outcome.frontchannel_logout_uris,
                "redirect": outcome.redirect_uri,
            }),
        )
        .map_err(|e| OidcError::bug(&format!("logout page rendering failed: {e}")))?;
    Ok(AuthorizeHttpResponse::Html(RawHtml(html)))
}

/// Session-check iframe. Static per deployment, so cacheable.
pub struct CachedHtml(pub String);

impl<'r> Responder<'r, 'static> for CachedHtml {
    fn respond_to(self, _request: &'r Request<'_>) -> rocket::response::Result<'static> {
        Response::build()
            .header(ContentType::HTML)
            .raw_header("Cache-Control", "public, max-age=3600")
            .sized_body(self.0.len(), Cursor::new(self.0))
            .ok()
    }
}

#[get("/checksession")]
pub fn checksession(state: &SharedState) -> CachedHtml {
    CachedHtml(check_session_page(&state.config.server.session_cookie_name))
}

// Dynamic client registration.

#[post("/register", data = "<metadata>")]
pub async fn register(
    metadata: Json<ClientMetadata>,
    state: &SharedState,
) -> Result<status::Created<Json<RegistrationResponse>>, OidcError> {
    let response = handle_registration(state, metadata.into_inner()).await?;
    Ok(status::Created::new(response.registration_client_uri.clone()).body(Json(response)))
}

#[get("/register/<client_id>")]
pub async fn register_read(
    client_id: &str,
    bearer: BearerToken,
    state: &SharedState,
) -> Result<Json<ClientMetadata>, OidcError> {
    handle_registration_read(state, client_id, &bearer.0)
        .await
        .map(Json)
}

#[put("/register/<client_id>", data = "<metadata>")]
pub async fn register_update(
    client_id: &str,
    bearer: BearerToken,
    metadata: Json<ClientMetadata>,
    state: &SharedState,
) -> Result<Json<RegistrationResponse>, OidcError> {
    handle_registration_update(state, client_id, &bearer.0, metadata.into_inner())
        .await
        .map(Json)
}

#[delete("/register/<client_id>")]
pub async fn register_delete(
    client_id: &str,
    bearer: BearerToken,
    state: &SharedState,
) -> Result<Status, OidcError> {
    handle_registration_delete(state, client_id, &bearer.0).await?;
    Ok(Status::NoContent)
}
