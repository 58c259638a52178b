use crate::api::{ApiError, AppState};
use crate::auth::{SESSION_COOKIE, TOKEN_COOKIE};
use crate::events::EVENT_TAIL_LIMIT;
use crate::registry::ProxyView;
use axum::extract::State;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;

/// Liveness probe kept deliberately anonymous: it reveals nothing about the
/// panel location or the API.
pub(crate) async fn index() -> &'static str {
    "System Online"
}

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    token: Option<String>,
}

pub(crate) async fn login_form() -> Html<String> {
    Html(render_login(None))
}

pub(crate) async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let token = form.token.unwrap_or_default();
    if !state.auth.token_matches(&token) {
        return Html(render_login(Some("Invalid token"))).into_response();
    }

    let session = state.auth.open_session();
    let jar = jar
        .add(session_cookie(session))
        .add(token_cookie(token));
    (jar, Redirect::to(&state.config.admin_path)).into_response()
}

pub(crate) async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(session) = jar.get(SESSION_COOKIE) {
        state.auth.close_session(session.value());
    }
    let jar = jar
        .remove(removal_cookie(SESSION_COOKIE))
        .remove(removal_cookie(TOKEN_COOKIE));
    (jar, Redirect::to(&state.auth.login_url())).into_response()
}

pub(crate) async fn admin_panel(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let nodes = state.registry.list()?;
    let timezone = state.settings.timezone();

    let mut rows = String::new();
    for node in &nodes {
        rows.push_str(&fleet_row(node));
    }

    Ok(Html(format!(
        "<!doctype html><html><head><title>Fleet Console</title></head><body>\
         <h1>Fleet Console</h1>\
         <p>{count} node(s), timezone UTC{timezone:+}</p>\
         <table border=\"1\"><tr><th>Alias</th><th>ID</th><th>IP</th><th>SOCKS</th>\
         <th>HTTP</th><th>Region</th><th>Tier</th><th>Status</th><th>Last seen</th>\
         <th>Note</th></tr>\n{rows}</table>\
         <p><a href=\"{admin}/logs\">Event log</a> | <a href=\"/logout\">Log out</a></p>\
         </body></html>",
        count = nodes.len(),
        admin = state.config.admin_path,
    )))
}

pub(crate) async fn logs_page(State(state): State<AppState>) -> Html<String> {
    let lines = state.events.tail(EVENT_TAIL_LIMIT);
    let body = lines
        .iter()
        .map(|line| escape_html(line))
        .collect::<Vec<_>>()
        .join("\n");

    Html(format!(
        "<!doctype html><html><head><title>Event Log</title></head><body>\
         <h1>Event Log</h1><pre>{body}</pre>\
         <p><a href=\"{admin}\">Back to console</a></p>\
         </body></html>",
        admin = state.config.admin_path,
    ))
}

fn fleet_row(node: &ProxyView) -> String {
    let note = node.note.as_deref().unwrap_or("");
    format!(
        "<tr><td>{alias}</td><td>{id}</td><td>{ip}</td><td>{socks}</td>\
         <td>{http}</td><td>{region}</td><td>{tier}</td><td>{status}</td>\
         <td>{last_seen}</td><td>{note}</td></tr>\n",
        alias = escape_html(&node.alias),
        id = escape_html(&node.id),
        ip = escape_html(&node.ip),
        socks = port_cell(node.socks_port),
        http = port_cell(node.http_port),
        region = escape_html(node.region.as_deref().unwrap_or("-")),
        tier = escape_html(&node.tier),
        status = escape_html(&node.status),
        last_seen = escape_html(&node.last_seen),
        note = escape_html(note),
    )
}

fn port_cell(port: Option<u16>) -> String {
    match port {
        Some(value) => value.to_string(),
        None => "-".to_string(),
    }
}

fn render_login(error: Option<&str>) -> String {
    let notice = match error {
        Some(message) => format!("<p>{}</p>", escape_html(message)),
        None => String::new(),
    };
    format!(
        "<!doctype html><html><head><title>Login</title></head><body>\
         <h1>Restricted</h1>{notice}\
         <form method=\"post\">\
         <input type=\"password\" name=\"token\" placeholder=\"Access Token\" autofocus>\
         <button type=\"submit\">Enter</button>\
         </form></body></html>"
    )
}

fn session_cookie(session: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, session);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie
}

fn token_cookie(token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(TOKEN_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.make_permanent();
    cookie
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::from(name);
    cookie.set_path("/");
    cookie
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
