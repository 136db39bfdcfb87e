//! Style catalog handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StyleSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct StylesResponse {
    pub styles: Vec<StyleSummary>,
}

/// GET /v0/styles
pub async fn list_styles(State(state): State<AppState>) -> Json<StylesResponse> {
    let styles = state
        .styles
        .all()
        .iter()
        .map(|s| StyleSummary {
            id: s.style_id.clone(),
            name: s.display_name.clone(),
        })
        .collect();
    Json(StylesResponse { styles })
}
