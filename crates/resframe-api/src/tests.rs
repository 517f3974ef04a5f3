//! Router tests against an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  Extension, Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use resframe_core::{
  permission::{Actor, GrantTable, PERMISSION_RANGE},
  seed::{Dataset, GrantRecord, LoadOptions, Loader},
  service::Framework,
  store::{FrameworkStore, SectionQuery},
};
use resframe_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::api_router;

/// A store whose `role` holds `codes`, and the framework over it.
async fn framework(role: &str, codes: &[u32]) -> (SqliteStore, Framework<SqliteStore>) {
  let store = SqliteStore::open_in_memory().await.unwrap();
  store.add_role(role).await.unwrap();
  let dataset = Dataset {
    grants: codes
      .iter()
      .map(|&permission_code| GrantRecord {
        role_name: role.to_owned(),
        permission_code,
      })
      .collect(),
    ..Default::default()
  };
  Loader::new(&store).run(&dataset, LoadOptions::default()).await.unwrap();
  let grants = GrantTable::load(&store).await.unwrap();
  let fw = Framework::new(Arc::new(store.clone()), grants);
  (store, fw)
}

async fn app_as(role: &str, codes: &[u32]) -> (SqliteStore, Router) {
  let (store, fw) = framework(role, codes).await;
  let app = api_router(fw).layer(Extension(Actor::new("amina", role)));
  (store, app)
}

fn all_codes() -> Vec<u32> { PERMISSION_RANGE.collect() }

async fn send(
  app: &Router,
  method: &str,
  uri: &str,
  body: Option<Value>,
) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
  (status, json)
}

// ─── Sections ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn section_lifecycle() {
  let (_, app) = app_as("admin", &all_codes()).await;

  let (status, created) =
    send(&app, "POST", "/sections", Some(json!({"name": "Effets"}))).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(created["version"], 1);
  assert_eq!(created["created_by"], "amina");
  let id = created["id"].as_i64().unwrap();

  let (status, updated) = send(
    &app,
    "PATCH",
    &format!("/sections/{id}"),
    Some(json!({"expected_version": 1, "name": "Effets attendus"})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(updated["name"], "Effets attendus");
  assert_eq!(updated["version"], 2);

  let (status, body) = send(
    &app,
    "PATCH",
    &format!("/sections/{id}"),
    Some(json!({"expected_version": 1, "name": "Stale"})),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(body["error"].as_str().unwrap().contains("version 2"));

  let (status, deleted) =
    send(&app, "DELETE", &format!("/sections/{id}?expected_version=2"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(deleted["is_deleted"], true);

  let (status, _) = send(&app, "GET", &format!("/sections/{id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, kept) =
    send(&app, "GET", &format!("/sections/{id}?include_deleted=true"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(kept["version"], 3);
}

#[tokio::test]
async fn list_sections_honours_query_params() {
  let (_, app) = app_as("admin", &all_codes()).await;
  for name in ["Effets", "Produits"] {
    send(&app, "POST", "/sections", Some(json!({"name": name}))).await;
  }

  let (status, all) = send(&app, "GET", "/sections", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(all.as_array().unwrap().len(), 2);

  let (_, hits) = send(&app, "GET", "/sections?text=prod&limit=5", None).await;
  assert_eq!(hits.as_array().unwrap().len(), 1);
  assert_eq!(hits[0]["name"], "Produits");
}

// ─── Permissions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_grant_is_forbidden_and_writes_nothing() {
  let (store, app) = app_as("viewer", &[160_005]).await;

  let (status, body) =
    send(&app, "POST", "/sections", Some(json!({"name": "Nope"}))).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert!(body["error"].as_str().unwrap().contains("160006"));

  let (status, _) = send(&app, "GET", "/sections", None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(store.list_sections(&SectionQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn requests_without_an_actor_are_unauthorized() {
  let (_, fw) = framework("admin", &all_codes()).await;
  let app = api_router(fw);

  let resp = app
    .oneshot(Request::builder().uri("/sections").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn permissions_table_marks_granted_codes() {
  let (_, app) = app_as("officer", &[160_009, 160_013, 160_014]).await;
  let (status, body) = send(&app, "GET", "/permissions", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["role"], "officer");

  let codes = body["codes"].as_array().unwrap();
  assert_eq!(codes.len(), 12);
  let granted: Vec<_> = codes
    .iter()
    .filter(|c| c["granted"] == true)
    .map(|c| c["code"].as_u64().unwrap())
    .collect();
  assert_eq!(granted, vec![160_009, 160_013, 160_014]);
  assert_eq!(codes[11]["description"], "Delete indicator achievements");
  assert_eq!(codes[11]["operation"], "delete");
}

// ─── Integrity over HTTP ─────────────────────────────────────────────────────

#[tokio::test]
async fn integrity_failures_are_unprocessable() {
  let (_, app) = app_as("admin", &all_codes()).await;

  let indicator = json!({
    "section_id": 404,
    "name": "Plaintes traitées",
    "baseline": {"kind": "boolean_label", "value": "Non"},
    "target":   {"kind": "boolean_label", "value": "Oui"},
  });
  let (status, _) = send(&app, "POST", "/indicators", Some(indicator.clone())).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

  let (_, section) =
    send(&app, "POST", "/sections", Some(json!({"name": "Intermédiaires"}))).await;
  let mut indicator = indicator;
  indicator["section_id"] = section["id"].clone();
  let (status, created) = send(&app, "POST", "/indicators", Some(indicator)).await;
  assert_eq!(status, StatusCode::CREATED);
  let indicator_id = created["id"].clone();

  let (status, achievement) = send(
    &app,
    "POST",
    "/achievements",
    Some(json!({
      "indicator_id": indicator_id,
      "reported_on": "2025-04-30",
      "value": {"kind": "boolean_label", "value": "Oui"},
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(achievement["reported_by"], "amina");
  assert_eq!(achievement["value"], json!({"kind": "boolean_label", "value": "Oui"}));

  let (status, body) = send(
    &app,
    "POST",
    "/achievements",
    Some(json!({
      "indicator_id": indicator_id,
      "reported_on": "2025-05-31",
      "value": {"kind": "percentage", "value": 50},
    })),
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert!(body["error"].as_str().unwrap().contains("does not match"));

  let (status, _) = send(
    &app,
    "DELETE",
    &format!("/sections/{}?expected_version=1", section["id"]),
    None,
  )
  .await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn indicator_patch_null_clears_optional_text() {
  let (_, app) = app_as("admin", &all_codes()).await;
  let (_, section) = send(&app, "POST", "/sections", Some(json!({"name": "S"}))).await;
  let (_, created) = send(
    &app,
    "POST",
    "/indicators",
    Some(json!({
      "section_id": section["id"],
      "name": "Taux d'accès",
      "pbc": "PBC-1",
      "baseline": {"kind": "percentage", "value": "12.5"},
      "target":   {"kind": "percentage", "value": 60},
    })),
  )
  .await;
  assert_eq!(created["pbc"], "PBC-1");

  let (status, patched) = send(
    &app,
    "PATCH",
    &format!("/indicators/{}", created["id"]),
    Some(json!({"expected_version": 1, "pbc": null})),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(patched["pbc"], Value::Null);
  assert_eq!(patched["baseline"]["value"], "12.5");
}
