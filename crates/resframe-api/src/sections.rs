//! Handlers for `/sections` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/sections` | Optional `text`, `include_deleted`, `limit`, `offset` |
//! | `POST`   | `/sections` | Body: `{"name": ".."}`; returns 201 |
//! | `GET`    | `/sections/:id` | 404 if missing or deleted (unless `include_deleted`) |
//! | `PATCH`  | `/sections/:id` | Body: `{"expected_version": n, "name": ".."}` |
//! | `DELETE` | `/sections/:id` | `?expected_version=n`; 422 while live indicators remain |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use resframe_core::{
  entity::{NewSection, Section, SectionPatch},
  service::Framework,
  store::{FrameworkStore, SectionQuery},
};

use crate::{
  DeleteParams, GetParams, Versioned, actor::CurrentActor, error::ApiError,
};

/// `GET /sections`
pub async fn list<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Query(query): Query<SectionQuery>,
) -> Result<Json<Vec<Section>>, ApiError> {
  Ok(Json(fw.search_sections(&actor, &query).await?))
}

/// `POST /sections`
pub async fn create<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<NewSection>,
) -> Result<impl IntoResponse, ApiError> {
  let section = fw.create_section(&actor, body).await?;
  Ok((StatusCode::CREATED, Json(section)))
}

/// `GET /sections/:id`
pub async fn get_one<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Query(params): Query<GetParams>,
) -> Result<Json<Section>, ApiError> {
  Ok(Json(fw.get_section(&actor, id, params.include_deleted).await?))
}

/// `PATCH /sections/:id`
pub async fn update<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Json(body): Json<Versioned<SectionPatch>>,
) -> Result<Json<Section>, ApiError> {
  let section = fw
    .update_section(&actor, id, body.expected_version, body.patch)
    .await?;
  Ok(Json(section))
}

/// `DELETE /sections/:id?expected_version=n`
pub async fn delete<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Query(params): Query<DeleteParams>,
) -> Result<Json<Section>, ApiError> {
  Ok(Json(fw.delete_section(&actor, id, params.expected_version).await?))
}
