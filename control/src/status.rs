use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::get,
    Json, Router,
};
use std::fmt::Write;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{ControlPlaneError, Result};
use crate::registry::Registry;
use crate::types::{HealthResponse, Member, NodeRecord};

pub struct StatusState {
    pub registry: Registry,
    pub cluster: String,
    pub hostname: String,
    pub ip: String,
}

pub fn create_router(state: Arc<StatusState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` (`host:port`, host may be a name) and serve until `shutdown` fires.
pub async fn spawn(
    addr: &str,
    state: Arc<StatusState>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(ControlPlaneError::Status)?;
    let local = listener.local_addr().map_err(ControlPlaneError::Status)?;
    info!("Serving status page for {} on http://{}", addr, local);

    let app = create_router(state);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            error!("Status server failed: {}", e);
        }
    }))
}

/// GET / - Node table for the cluster
async fn index(
    State(state): State<Arc<StatusState>>,
) -> std::result::Result<Html<String>, (StatusCode, String)> {
    let nodes = state.registry.list_nodes(&state.cluster).await.map_err(|e| {
        error!("Failed to list nodes: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to query registry".to_string())
    })?;

    let members = match state.registry.store().member_list().await {
        Ok(members) => Some(members),
        Err(e) => {
            warn!("Failed to list members: {}", e);
            None
        }
    };

    Ok(Html(render_page(&state, &nodes, members.as_deref())))
}

/// GET /health - Health check endpoint
async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}

pub fn render_page(state: &StatusState, nodes: &[NodeRecord], members: Option<&[Member]>) -> String {
    let mut html = String::new();
    html.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>Control Plane</title>\n<style>\n\
         body { font-family: sans-serif; padding: 1rem; }\n\
         table { border-collapse: collapse; width: 100%; margin-top: 1rem; }\n\
         th, td { border: 1px solid #ddd; padding: 0.5rem; text-align: left; }\n\
         th { background-color: #f2f2f2; }\n\
         </style>\n</head>\n<body>\n",
    );

    let _ = writeln!(html, "<h2>Control Plane: {}</h2>", escape(&state.cluster));
    let _ = writeln!(
        html,
        "<p><strong>This Node:</strong> {} ({})</p>",
        escape(&state.hostname),
        escape(&state.ip)
    );

    html.push_str("<h3>All Nodes:</h3>\n<table>\n<tr><th>Hostname</th><th>IP</th><th>Provider</th>\
                   <th>Location</th><th>Node ID</th><th>OS</th><th>Labels</th></tr>\n");
    if nodes.is_empty() {
        html.push_str("<tr><td colspan=\"7\">No nodes found</td></tr>\n");
    }
    for node in nodes {
        let labels = node
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{} {}</td><td>{}</td></tr>",
            escape(&node.hostname),
            escape(&node.ip),
            escape(&node.provider),
            escape(&node.location),
            escape(&node.node_id),
            escape(&node.os_name),
            escape(&node.os_version),
            escape(&labels)
        );
    }
    html.push_str("</table>\n");

    html.push_str("<h3>Members:</h3>\n");
    match members {
        Some(members) => {
            html.push_str("<table>\n<tr><th>ID</th><th>Name</th><th>Peer URLs</th></tr>\n");
            for member in members {
                let name = if member.name.is_empty() {
                    "(not started)"
                } else {
                    member.name.as_str()
                };
                let _ = writeln!(
                    html,
                    "<tr><td>{:x}</td><td>{}</td><td>{}</td></tr>",
                    member.id,
                    escape(name),
                    escape(&member.peer_urls.join(", "))
                );
            }
            html.push_str("</table>\n");
        }
        None => html.push_str("<p>Membership unavailable</p>\n"),
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
