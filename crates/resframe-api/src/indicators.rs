//! Handlers for `/indicators` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/indicators` | Optional `section_id`, `text`, `pbc`, `include_deleted`, `limit`, `offset` |
//! | `POST`   | `/indicators` | Body: `section_id`, `name`, `baseline`, `target`, optional `pbc`/`observation` |
//! | `GET`    | `/indicators/:id` | 404 if missing or deleted (unless `include_deleted`) |
//! | `PATCH`  | `/indicators/:id` | Body: `expected_version` plus changed fields; `null` clears `pbc`/`observation` |
//! | `DELETE` | `/indicators/:id` | `?expected_version=n`; 422 while live achievements remain |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use resframe_core::{
  entity::{Indicator, IndicatorPatch, NewIndicator},
  service::Framework,
  store::{FrameworkStore, IndicatorQuery},
};

use crate::{
  DeleteParams, GetParams, Versioned, actor::CurrentActor, error::ApiError,
};

/// `GET /indicators`
pub async fn list<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Query(query): Query<IndicatorQuery>,
) -> Result<Json<Vec<Indicator>>, ApiError> {
  Ok(Json(fw.search_indicators(&actor, &query).await?))
}

/// `POST /indicators`
pub async fn create<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<NewIndicator>,
) -> Result<impl IntoResponse, ApiError> {
  let indicator = fw.create_indicator(&actor, body).await?;
  Ok((StatusCode::CREATED, Json(indicator)))
}

/// `GET /indicators/:id`
pub async fn get_one<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Query(params): Query<GetParams>,
) -> Result<Json<Indicator>, ApiError> {
  Ok(Json(fw.get_indicator(&actor, id, params.include_deleted).await?))
}

/// `PATCH /indicators/:id`
pub async fn update<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Json(body): Json<Versioned<IndicatorPatch>>,
) -> Result<Json<Indicator>, ApiError> {
  let indicator = fw
    .update_indicator(&actor, id, body.expected_version, body.patch)
    .await?;
  Ok(Json(indicator))
}

/// `DELETE /indicators/:id?expected_version=n`
pub async fn delete<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Query(params): Query<DeleteParams>,
) -> Result<Json<Indicator>, ApiError> {
  Ok(Json(fw.delete_indicator(&actor, id, params.expected_version).await?))
}
