//! Read-only HTTP view of the standings.

use crate::registry::{ActiveMatch, SessionRegistry};
use crate::scoreboard::{HistoryEntry, ScoreEntry, Scoreboard};
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Shared state for the web handlers.
#[derive(Clone)]
pub struct WebState {
    scoreboard: Arc<Scoreboard>,
    registry: SessionRegistry,
}

impl WebState {
    /// Creates the state from the live scoreboard and session registry.
    pub fn new(scoreboard: Arc<Scoreboard>, registry: SessionRegistry) -> Self {
        Self {
            scoreboard,
            registry,
        }
    }
}

/// Builds the router serving HTML pages and JSON endpoints.
pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/scoreboard", get(scoreboard_page))
        .route("/history", get(history_page))
        .route("/api/scoreboard", get(scoreboard_json))
        .route("/api/history", get(history_json))
        .route("/api/matches", get(matches_json))
        .with_state(state)
}

async fn index(State(state): State<WebState>) -> Html<String> {
    let body = format!(
        "<p>{} game(s) in progress.</p>\n\
         <ul>\n<li><a href=\"/scoreboard\">Scoreboard</a></li>\n\
         <li><a href=\"/history\">History</a></li>\n</ul>",
        state.registry.len()
    );
    Html(page("Tic-tac-toe arena", &body))
}

#[instrument(skip(state))]
async fn scoreboard_page(State(state): State<WebState>) -> Html<String> {
    let scores = state.scoreboard.scores();
    debug!(entries = scores.len(), "Rendering scoreboard");
    Html(page("Scoreboard", &scores_table(&scores)))
}

#[instrument(skip(state))]
async fn history_page(State(state): State<WebState>) -> Html<String> {
    let history = state.scoreboard.history();
    debug!(entries = history.len(), "Rendering history");
    Html(page("History", &history_table(&history)))
}

async fn scoreboard_json(State(state): State<WebState>) -> Json<Vec<ScoreEntry>> {
    Json(state.scoreboard.scores())
}

async fn history_json(State(state): State<WebState>) -> Json<Vec<HistoryEntry>> {
    Json(state.scoreboard.history())
}

async fn matches_json(State(state): State<WebState>) -> Json<Vec<ActiveMatch>> {
    Json(state.registry.active())
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
        body = body
    )
}

fn scores_table(scores: &[ScoreEntry]) -> String {
    let mut html = String::from("<table>\n<tr><th>Nickname</th><th>Score</th></tr>\n");
    for entry in scores {
        // Writing into a String cannot fail.
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape_html(entry.nickname()),
            entry.score()
        );
    }
    html.push_str("</table>");
    html
}

fn history_table(history: &[HistoryEntry]) -> String {
    let mut html =
        String::from("<table>\n<tr><th>Players</th><th>Winner</th><th>Date</th></tr>\n");
    for entry in history {
        let winner = entry.winner().as_deref().unwrap_or("draw");
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(entry.nicknames()),
            escape_html(winner),
            escape_html(entry.date())
        );
    }
    html.push_str("</table>");
    html
}

/// Escapes text for inclusion in HTML element content or attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
