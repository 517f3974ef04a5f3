//! Handlers for `/achievements` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/achievements` | Optional `indicator_id`, `reported_from`, `reported_to`, `include_deleted`, `limit`, `offset` |
//! | `POST`   | `/achievements` | Body: `indicator_id`, `value`, `reported_on`; `reported_by` defaults to the caller |
//! | `GET`    | `/achievements/:id` | 404 if missing or deleted (unless `include_deleted`) |
//! | `PATCH`  | `/achievements/:id` | Body: `expected_version` plus changed fields |
//! | `DELETE` | `/achievements/:id` | `?expected_version=n` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use resframe_core::{
  entity::{Achievement, AchievementPatch, NewAchievement},
  service::Framework,
  store::{AchievementQuery, FrameworkStore},
};

use crate::{
  DeleteParams, GetParams, Versioned, actor::CurrentActor, error::ApiError,
};

/// `GET /achievements`
pub async fn list<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Query(query): Query<AchievementQuery>,
) -> Result<Json<Vec<Achievement>>, ApiError> {
  Ok(Json(fw.search_achievements(&actor, &query).await?))
}

/// `POST /achievements`
pub async fn create<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Json(body): Json<NewAchievement>,
) -> Result<impl IntoResponse, ApiError> {
  let achievement = fw.create_achievement(&actor, body).await?;
  Ok((StatusCode::CREATED, Json(achievement)))
}

/// `GET /achievements/:id`
pub async fn get_one<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Query(params): Query<GetParams>,
) -> Result<Json<Achievement>, ApiError> {
  Ok(Json(fw.get_achievement(&actor, id, params.include_deleted).await?))
}

/// `PATCH /achievements/:id`
pub async fn update<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Json(body): Json<Versioned<AchievementPatch>>,
) -> Result<Json<Achievement>, ApiError> {
  let achievement = fw
    .update_achievement(&actor, id, body.expected_version, body.patch)
    .await?;
  Ok(Json(achievement))
}

/// `DELETE /achievements/:id?expected_version=n`
pub async fn delete<S: FrameworkStore>(
  State(fw): State<Framework<S>>,
  CurrentActor(actor): CurrentActor,
  Path(id): Path<i64>,
  Query(params): Query<DeleteParams>,
) -> Result<Json<Achievement>, ApiError> {
  Ok(Json(fw.delete_achievement(&actor, id, params.expected_version).await?))
}
