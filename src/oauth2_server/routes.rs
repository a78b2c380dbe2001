// ABOUTME: OAuth 2.0 HTTP route handlers for the axum web framework
// ABOUTME: Maps protocol outcomes onto redirects, JSON bodies, and inline error pages
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Xstar Mail

use super::models::{AuthorizeRequest, OAuth2Error, RevokeRequest, TokenRequest};
use super::rate_limiting::RateLimitStatus;
use crate::auth::extract_session_token;
use crate::constants::oauth::SUPPORTED_SCOPES;
use crate::server::ServerResources;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use uuid::Uuid;

/// OAuth error template embedded at compile time
///
/// `include_str!` keeps the render path free of filesystem IO.
const OAUTH_ERROR_TEMPLATE: &str = include_str!("../../templates/oauth_error.html");

/// OAuth 2.0 route handlers
pub struct OAuth2Routes;

impl OAuth2Routes {
    /// Create all OAuth 2.0 routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/oauth2/authorize", get(Self::handle_authorize))
            .route("/oauth2/authorize/consent", post(Self::handle_consent))
            .route("/oauth2/token", post(Self::handle_token))
            .route("/oauth2/userinfo", get(Self::handle_userinfo))
            .route("/oauth2/revoke", post(Self::handle_revoke))
            .route(
                "/.well-known/oauth-authorization-server",
                get(Self::handle_discovery),
            )
            .with_state(resources)
    }

    /// Handle authorization request (GET /oauth2/authorize)
    async fn handle_authorize(
        State(resources): State<Arc<ServerResources>>,
        connect_info: Option<ConnectInfo<SocketAddr>>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        let rate_status = resources
            .rate_limiter
            .check_authorize_endpoint(client_ip(connect_info.as_ref()));
        if rate_status.is_limited {
            return rate_limit_response(&rate_status);
        }

        // Until client_id and redirect_uri are validated, every failure is
        // rendered inline; the presented redirect target is untrusted.
        let request = match parse_authorize_request(&params) {
            Ok(request) => request,
            Err(error) => return error_page(&error),
        };

        let client = match resources
            .auth_server
            .validate_authorize_request(&request)
            .await
        {
            Ok(client) => client,
            Err(reject) => return authorize_reject_response(&request, reject),
        };

        // Resource-owner authentication is owned by the login service; an
        // absent or stale session defers there with the flow preserved.
        let Some(user_id) = authenticated_user(&resources, &headers).await else {
            return login_redirect(&resources, &request);
        };

        if client.auto_approve {
            return finish_authorization(&resources, &request, user_id).await;
        }

        Html(render_consent_page(&client, &request)).into_response()
    }

    /// Handle consent form submission (POST /oauth2/authorize/consent)
    async fn handle_consent(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        axum::extract::Form(form): axum::extract::Form<HashMap<String, String>>,
    ) -> Response {
        // The form round-trips the authorize parameters; everything is
        // revalidated here, nothing is trusted from the rendered page.
        let request = match parse_authorize_request(&form) {
            Ok(request) => request,
            Err(error) => return error_page(&error),
        };

        if let Err(reject) = resources
            .auth_server
            .validate_authorize_request(&request)
            .await
        {
            return authorize_reject_response(&request, reject);
        }

        let Some(user_id) = authenticated_user(&resources, &headers).await else {
            return login_redirect(&resources, &request);
        };

        if form.get("action").map(String::as_str) == Some("approve") {
            finish_authorization(&resources, &request, user_id).await
        } else {
            tracing::info!(
                client_id = %request.client_id,
                user_id = %user_id,
                "Resource owner denied consent"
            );
            error_redirect(&request, &OAuth2Error::access_denied())
        }
    }

    /// Handle token request (POST /oauth2/token)
    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        connect_info: Option<ConnectInfo<SocketAddr>>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        let params = match body_params(&headers, &body) {
            Ok(params) => params,
            Err(error) => return oauth_error_response(&error),
        };

        let request = match parse_token_request(&params) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!("OAuth token request parsing failed: {:?}", error.error);
                return oauth_error_response(&error);
            }
        };

        // Brute-force guessing of codes and secrets is bounded per client
        // and per source IP before any credential is inspected.
        let rate_status = resources
            .rate_limiter
            .check_token_endpoint(client_ip(connect_info.as_ref()), &request.client_id);
        if rate_status.is_limited {
            return rate_limit_response(&rate_status);
        }

        match resources.auth_server.token(request).await {
            Ok(response) => {
                tracing::info!(
                    client_id = %params.get("client_id").map_or("unknown", |v| v),
                    "OAuth token exchange successful"
                );
                (StatusCode::OK, Json(response)).into_response()
            }
            Err(error) => {
                tracing::warn!(
                    client_id = %params.get("client_id").map_or("unknown", |v| v),
                    error = %error.error,
                    "OAuth token exchange failed"
                );
                oauth_error_response(&error)
            }
        }
    }

    /// Handle userinfo request (GET /oauth2/userinfo)
    async fn handle_userinfo(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Response {
        let Some(bearer_token) = extract_bearer_token(&headers) else {
            return unauthorized_bearer_response(&OAuth2Error::invalid_request(
                "Authorization header must use the Bearer scheme",
            ));
        };

        match resources.auth_server.userinfo(&bearer_token).await {
            Ok(claims) => (StatusCode::OK, Json(claims)).into_response(),
            Err(error) if error.error == "invalid_token" => unauthorized_bearer_response(&error),
            Err(error) => oauth_error_response(&error),
        }
    }

    /// Handle token revocation (POST /oauth2/revoke)
    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        let params = match body_params(&headers, &body) {
            Ok(params) => params,
            Err(error) => return oauth_error_response(&error),
        };

        let request = match parse_revoke_request(&params) {
            Ok(request) => request,
            Err(error) => return oauth_error_response(&error),
        };

        match resources.auth_server.revoke(request).await {
            // RFC 7009: revocation succeeds whether or not the token matched
            Ok(()) => (StatusCode::OK, Json(serde_json::json!({}))).into_response(),
            Err(error) => oauth_error_response(&error),
        }
    }

    /// Handle discovery request (GET /.well-known/oauth-authorization-server)
    async fn handle_discovery(State(resources): State<Arc<ServerResources>>) -> Response {
        let issuer = resources.config.base_url.clone();
        Json(serde_json::json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/oauth2/authorize"),
            "token_endpoint": format!("{issuer}/oauth2/token"),
            "userinfo_endpoint": format!("{issuer}/oauth2/userinfo"),
            "revocation_endpoint": format!("{issuer}/oauth2/revoke"),
            "grant_types_supported": ["authorization_code", "refresh_token"],
            "response_types_supported": ["code"],
            "token_endpoint_auth_methods_supported": ["client_secret_post"],
            "scopes_supported": SUPPORTED_SCOPES,
            "response_modes_supported": ["query"],
        }))
        .into_response()
    }
}

/// Complete an approved authorization: mint the code and redirect
async fn finish_authorization(
    resources: &Arc<ServerResources>,
    request: &AuthorizeRequest,
    user_id: Uuid,
) -> Response {
    match resources.auth_server.issue_code(request, user_id).await {
        Ok(response) => {
            let mut url = match url::Url::parse(&request.redirect_uri) {
                Ok(url) => url,
                // The URI matched the registered set, so this is a
                // registration defect, not caller input
                Err(e) => {
                    tracing::error!(
                        redirect_uri = %request.redirect_uri,
                        "Registered redirect_uri failed to parse: {e}"
                    );
                    return error_page(&OAuth2Error::server_error());
                }
            };

            {
                let mut query = url.query_pairs_mut();
                query.append_pair("code", &response.code);
                if let Some(state) = &response.state {
                    query.append_pair("state", state);
                }
            }

            redirect_response(url.as_str())
        }
        Err(error) => error_redirect(request, &error),
    }
}

/// Resolve the authenticated, active resource owner from the session cookie
async fn authenticated_user(
    resources: &Arc<ServerResources>,
    headers: &HeaderMap,
) -> Option<Uuid> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    let token = extract_session_token(cookie_header)?;

    let identity = match resources.session_manager.validate_session(&token) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("Invalid session cookie on authorize: {e}");
            return None;
        }
    };

    // Suspended accounts cannot authorize new clients
    match resources.database.get_user(identity.user_id).await {
        Ok(Some(user)) if user.is_active => Some(identity.user_id),
        Ok(_) => {
            tracing::warn!(user_id = %identity.user_id, "Session for missing or inactive user");
            None
        }
        Err(e) => {
            tracing::error!(user_id = %identity.user_id, "User lookup failed: {e:#}");
            None
        }
    }
}

/// Redirect an unauthenticated browser to the login service
///
/// The full authorize URL rides along as `next` so the login service can
/// resume the flow with the same parameters after authentication.
fn login_redirect(resources: &Arc<ServerResources>, request: &AuthorizeRequest) -> Response {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("response_type", &request.response_type);
    query.append_pair("client_id", &request.client_id);
    query.append_pair("redirect_uri", &request.redirect_uri);
    if let Some(scope) = &request.scope {
        query.append_pair("scope", scope);
    }
    if let Some(state) = &request.state {
        query.append_pair("state", state);
    }

    let resume_url = format!(
        "{}/oauth2/authorize?{}",
        resources.config.base_url,
        query.finish()
    );
    let login_url = format!(
        "{}?next={}",
        resources.config.login_url,
        urlencoding::encode(&resume_url)
    );

    tracing::info!("No authenticated session for authorize request, deferring to login service");
    redirect_response(&login_url)
}

/// Map an authorize-stage rejection onto its required transport
fn authorize_reject_response(
    request: &AuthorizeRequest,
    reject: super::endpoints::AuthorizeReject,
) -> Response {
    match reject {
        super::endpoints::AuthorizeReject::Inline(error) => error_page(&error),
        super::endpoints::AuthorizeReject::Redirect(error) => error_redirect(request, &error),
    }
}

/// 302 redirect to the validated redirect URI with `error` and `state`
fn error_redirect(request: &AuthorizeRequest, error: &OAuth2Error) -> Response {
    let Ok(mut url) = url::Url::parse(&request.redirect_uri) else {
        return error_page(error);
    };

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("error", &error.error);
        if let Some(description) = &error.error_description {
            query.append_pair("error_description", description);
        }
        if let Some(state) = &request.state {
            query.append_pair("state", state);
        }
    }

    redirect_response(url.as_str())
}

/// Plain 302 with a Location header
fn redirect_response(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}

/// JSON error body with the RFC 6749 status for this error
fn oauth_error_response(error: &OAuth2Error) -> Response {
    let status = StatusCode::from_u16(error.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error_body(error))).into_response()
}

/// 401 with the `WWW-Authenticate` challenge required for bearer failures
fn unauthorized_bearer_response(error: &OAuth2Error) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            format!(r#"Bearer error="{}""#, error.error),
        )],
        Json(error_body(error)),
    )
        .into_response()
}

/// 429 with rate-limit headers
fn rate_limit_response(status: &RateLimitStatus) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("X-RateLimit-Limit", status.limit.to_string()),
            ("X-RateLimit-Remaining", status.remaining.to_string()),
            ("Retry-After", status.retry_after_secs.to_string()),
        ],
        Json(serde_json::json!({
            "error": "rate_limit_exceeded",
            "error_description": "Too many requests, retry later",
        })),
    )
        .into_response()
}

/// Serialize an OAuth error without the documentation URI
fn error_body(error: &OAuth2Error) -> serde_json::Value {
    serde_json::json!({
        "error": error.error,
        "error_description": error.error_description,
    })
}

/// Render the inline HTML error page used before the redirect URI is trusted
fn error_page(error: &OAuth2Error) -> Response {
    let error_title = match error.error.as_str() {
        "invalid_client" => "Invalid Client",
        "invalid_redirect_uri" => "Invalid Redirect URI",
        "unauthorized_client" => "Unauthorized Client",
        "access_denied" => "Access Denied",
        "server_error" => "Server Error",
        _ => "Authorization Error",
    };

    let default_description = "An error occurred during the authorization process.".to_owned();
    let description = error
        .error_description
        .as_ref()
        .unwrap_or(&default_description);

    let html = OAUTH_ERROR_TEMPLATE
        .replace("{{TITLE}}", error_title)
        .replace("{{ERROR}}", &html_escape::encode_text(&error.error))
        .replace("{{DESCRIPTION}}", &html_escape::encode_text(description));

    let status = StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Html(html)).into_response()
}

/// Render the consent page for clients without auto-approval
fn render_consent_page(
    client: &super::models::OAuth2Client,
    request: &AuthorizeRequest,
) -> String {
    let client_name = client
        .client_name
        .as_deref()
        .unwrap_or(client.client_id.as_str());
    let scope = request.scope.as_deref().unwrap_or("(basic sign-in only)");

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Xstar Mail - Authorize Application</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        .consent-form {{ max-width: 420px; margin: 0 auto; padding: 20px; border: 1px solid #ddd; border-radius: 8px; }}
        .app-info {{ background-color: #f8f9fa; padding: 15px; border-radius: 4px; margin-bottom: 20px; }}
        button {{ padding: 10px 20px; border: none; border-radius: 4px; cursor: pointer; }}
        .approve {{ background-color: #007bff; color: white; }}
        .deny {{ background-color: #e9ecef; }}
    </style>
</head>
<body>
    <div class="consent-form">
        <h2>Authorize Application</h2>
        <div class="app-info">
            <strong>{client_name}</strong> wants to sign you in with your Xstar Mail account.<br>
            <strong>Requested access:</strong> {scope}
        </div>
        <form method="post" action="/oauth2/authorize/consent">
            <input type="hidden" name="response_type" value="{response_type}">
            <input type="hidden" name="client_id" value="{client_id}">
            <input type="hidden" name="redirect_uri" value="{redirect_uri}">
            <input type="hidden" name="scope" value="{scope_raw}">
            <input type="hidden" name="state" value="{state}">
            <button class="approve" type="submit" name="action" value="approve">Allow</button>
            <button class="deny" type="submit" name="action" value="deny">Deny</button>
        </form>
    </div>
</body>
</html>
"#,
        client_name = html_escape::encode_text(client_name),
        scope = html_escape::encode_text(scope),
        response_type = html_escape::encode_double_quoted_attribute(&request.response_type),
        client_id = html_escape::encode_double_quoted_attribute(&request.client_id),
        redirect_uri = html_escape::encode_double_quoted_attribute(&request.redirect_uri),
        scope_raw =
            html_escape::encode_double_quoted_attribute(request.scope.as_deref().unwrap_or("")),
        state =
            html_escape::encode_double_quoted_attribute(request.state.as_deref().unwrap_or("")),
    )
}

/// Source IP for rate limiting; loopback when connection info is unavailable
fn client_ip(connect_info: Option<&ConnectInfo<SocketAddr>>) -> IpAddr {
    connect_info.map_or(IpAddr::V4(Ipv4Addr::LOCALHOST), |info| info.0.ip())
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

/// Decode a token/revocation body: form-encoded per RFC 6749, JSON accepted
fn body_params(headers: &HeaderMap, body: &str) -> Result<HashMap<String, String>, OAuth2Error> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/x-www-form-urlencoded");

    if content_type.starts_with("application/json") {
        let values: HashMap<String, serde_json::Value> = serde_json::from_str(body)
            .map_err(|_| OAuth2Error::invalid_request("Request body is not valid JSON"))?;

        return Ok(values
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some((key, s)),
                serde_json::Value::Null => None,
                other => Some((key, other.to_string())),
            })
            .collect());
    }

    Ok(url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect())
}

/// Parse query or form parameters into an [`AuthorizeRequest`]
fn parse_authorize_request(
    params: &HashMap<String, String>,
) -> Result<AuthorizeRequest, OAuth2Error> {
    let response_type = params
        .get("response_type")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing response_type parameter"))?
        .clone();

    let client_id = params
        .get("client_id")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing client_id parameter"))?
        .clone();

    let redirect_uri = params
        .get("redirect_uri")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing redirect_uri parameter"))?
        .clone();

    let scope = params.get("scope").filter(|s| !s.is_empty()).cloned();
    let state = params.get("state").filter(|s| !s.is_empty()).cloned();

    Ok(AuthorizeRequest {
        response_type,
        client_id,
        redirect_uri,
        scope,
        state,
    })
}

/// Parse body parameters into a [`TokenRequest`]
fn parse_token_request(params: &HashMap<String, String>) -> Result<TokenRequest, OAuth2Error> {
    let grant_type = params
        .get("grant_type")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing grant_type parameter"))?
        .clone();

    let client_id = params
        .get("client_id")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing client_id parameter"))?
        .clone();

    let client_secret = params
        .get("client_secret")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing client_secret parameter"))?
        .clone();

    Ok(TokenRequest {
        grant_type,
        code: params.get("code").cloned(),
        redirect_uri: params.get("redirect_uri").cloned(),
        client_id,
        client_secret,
        refresh_token: params.get("refresh_token").cloned(),
    })
}

/// Parse body parameters into a [`RevokeRequest`]
fn parse_revoke_request(params: &HashMap<String, String>) -> Result<RevokeRequest, OAuth2Error> {
    let token = params
        .get("token")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing token parameter"))?
        .clone();

    let client_id = params
        .get("client_id")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing client_id parameter"))?
        .clone();

    let client_secret = params
        .get("client_secret")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing client_secret parameter"))?
        .clone();

    Ok(RevokeRequest {
        token,
        token_type_hint: params.get("token_type_hint").cloned(),
        client_id,
        client_secret,
    })
}
