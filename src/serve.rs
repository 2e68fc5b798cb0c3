//! HTTP server for the habit API
//!
//! `habitual serve` → JSON endpoints a web front-end calls.
//! Authenticated with `Authorization: Bearer <token>`.

use crate::api::{CreateInput, HabitApi, IdInput, ToggleInput, UpdateInput};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

/// Largest request body the server will buffer
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: String) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Status code and JSON body for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    fn ok<T: Serialize>(data: T) -> Self {
        match serde_json::to_string(&ApiResponse::success(data)) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(&Error::Json(e)),
        }
    }

    fn error(err: &Error) -> Self {
        let status = err.status_code();
        let body = serde_json::to_string(&ApiResponse::failure(err.to_string()))
            .unwrap_or_else(|_| r#"{"ok":false,"data":null,"error":"internal error"}"#.to_string());
        Self { status, body }
    }

    fn not_found() -> Self {
        Self {
            status: 404,
            body: r#"{"ok":false,"data":null,"error":"Not found"}"#.to_string(),
        }
    }
}

/// Start the habit API server and serve requests until the process exits
pub fn start_api_server(addr: &str, api: HabitApi) -> std::io::Result<()> {
    let server = Server::http(addr)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    info!("Habit API listening on http://{}", addr);

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(&api, request) {
            warn!("Failed to answer request: {}", e);
        }
    }

    Ok(())
}

fn bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Authorization"))
        .and_then(|h| {
            let value = h.value.as_str().trim();
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
                .map(|t| t.trim().to_string())
        })
}

fn handle_request(api: &HabitApi, mut request: Request) -> std::io::Result<()> {
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or("/").to_string();
    let method = request.method().clone();
    let token = bearer_token(&request);

    let reply = match read_body(request.as_reader(), MAX_BODY_BYTES) {
        Ok(body) => route(api, &method, &path, token.as_deref(), &body),
        Err(e) => Reply::error(&e),
    };

    if reply.status >= 400 {
        warn!(%method, path = %path, status = reply.status, "request rejected");
    } else {
        debug!(%method, path = %path, "request served");
    }

    let mut response = Response::from_string(reply.body).with_status_code(reply.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response.add_header(header);
    }
    request.respond(response)
}

/// Read at most `limit` bytes of body; anything longer is refused
fn read_body<R: Read>(reader: R, limit: u64) -> Result<String> {
    let mut body = String::new();
    reader
        .take(limit + 1)
        .read_to_string(&mut body)
        .map_err(|e| Error::Validation(format!("Failed to read body: {}", e)))?;

    if body.len() as u64 > limit {
        return Err(Error::Validation(format!("Request body larger than {} bytes", limit)));
    }
    Ok(body)
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}

/// Dispatch one request to the habit API
pub fn route(api: &HabitApi, method: &Method, path: &str, token: Option<&str>, body: &str) -> Reply {
    let result = match (method, path) {
        (Method::Get, "/api/health") => return Reply::ok("ok"),

        (Method::Get, "/api/habits") => api
            .authenticate(token)
            .and_then(|s| api.get_user_habits(&s))
            .map(Reply::ok),

        (Method::Post, "/api/habits/create") => api.authenticate(token).and_then(|s| {
            let input: CreateInput = parse(body)?;
            api.create(&s, &input).map(Reply::ok)
        }),

        (Method::Post, "/api/habits/update") => api.authenticate(token).and_then(|s| {
            let input: UpdateInput = parse(body)?;
            api.update(&s, &input).map(Reply::ok)
        }),

        (Method::Post, "/api/habits/delete") => api.authenticate(token).and_then(|s| {
            let input: IdInput = parse(body)?;
            api.delete(&s, &input).map(|()| Reply::ok(true))
        }),

        (Method::Post, "/api/habits/toggle") => api.authenticate(token).and_then(|s| {
            let input: ToggleInput = parse(body)?;
            api.toggle(&s, &input).map(Reply::ok)
        }),

        (Method::Post, "/api/habits/reset") => api.authenticate(token).and_then(|s| {
            let input: IdInput = parse(body)?;
            api.reset_streak(&s, &input).map(Reply::ok)
        }),

        _ => return Reply::not_found(),
    };

    result.unwrap_or_else(|e| Reply::error(&e))
}
