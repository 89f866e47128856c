use crate::campus::{AppliedPlan, CampusPlan, apply_campus_plan};
use crate::config::{PlannerConfig, ServerConfig};
use crate::data::{
    Assignments, Catalog, Day, LeveledSubject, MoveResolutions, Room, RoomHost, RoomId,
    RoutingPolicy, Student, Timeslot, Whitelist,
};
use crate::dataset::DatasetGenerator;
use crate::demand::{SubjectDemand, demand_by_subject};
use crate::error::PlannerError;
use crate::movement::{MovementResult, MovementView};
use crate::placement::{RoomMapPreview, build_room_map};
use crate::resolver::{AutoResolution, auto_resolve};
use crate::unresolved::{UnresolvedMove, unresolved_moves};
use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, info};
use serde::Deserialize;
use std::collections::BTreeMap;

type ApiError = (StatusCode, String);

fn unprocessable(err: PlannerError) -> ApiError {
    debug!("Rejected request: {}", err);
    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandRequest {
    pub students: Vec<Student>,
    #[serde(default)]
    pub policies: BTreeMap<LeveledSubject, RoutingPolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMapRequest {
    pub subject: LeveledSubject,
    pub students: Vec<Student>,
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub policy: RoutingPolicy,
    #[serde(default)]
    pub overrides: BTreeMap<RoomId, RoomHost>,
    #[serde(default)]
    pub config: PlannerConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub catalog: Catalog,
    pub plan: CampusPlan,
    #[serde(default)]
    pub config: PlannerConfig,
}

/// A planning session as the client holds it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRequest {
    pub catalog: Catalog,
    pub assignments: Assignments,
    #[serde(default)]
    pub resolutions: MoveResolutions,
    #[serde(default)]
    pub whitelist: Whitelist,
}

impl GridRequest {
    fn view(&self) -> MovementView<'_> {
        MovementView::new(&self.catalog, &self.assignments, &self.resolutions, &self.whitelist)
    }
}

// not flattened: serde cannot read integer map keys through a flattened struct
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRequest {
    pub session: GridRequest,
    pub room_id: RoomId,
    pub day: Day,
    pub slot: Timeslot,
}

#[derive(Debug, Deserialize)]
pub struct DatasetQuery {
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

async fn demand_handler(
    Json(req): Json<DemandRequest>,
) -> Json<BTreeMap<LeveledSubject, SubjectDemand>> {
    Json(demand_by_subject(&req.students, &req.policies))
}

async fn room_map_handler(
    Json(req): Json<RoomMapRequest>,
) -> Result<Json<RoomMapPreview>, ApiError> {
    build_room_map(
        req.subject,
        &req.students,
        &req.rooms,
        &req.policy,
        &req.overrides,
        &req.config,
    )
    .map(Json)
    .map_err(unprocessable)
}

async fn apply_handler(Json(req): Json<ApplyRequest>) -> Result<Json<AppliedPlan>, ApiError> {
    apply_campus_plan(&req.catalog, &req.plan, &req.config)
        .map(Json)
        .map_err(unprocessable)
}

async fn cell_handler(Json(req): Json<CellRequest>) -> Json<MovementResult> {
    Json(req.session.view().classify(req.room_id, req.day, req.slot))
}

async fn unresolved_handler(Json(req): Json<GridRequest>) -> Json<Vec<UnresolvedMove>> {
    Json(unresolved_moves(&req.view()))
}

async fn auto_resolve_handler(Json(req): Json<GridRequest>) -> Json<AutoResolution> {
    Json(auto_resolve(
        &req.catalog,
        &req.assignments,
        &req.whitelist,
        &req.resolutions,
    ))
}

async fn dataset_handler(Query(query): Query<DatasetQuery>) -> Json<Catalog> {
    Json(DatasetGenerator::new(query.seed).catalog())
}

pub fn router() -> Router {
    Router::new()
        .route("/v1/plan/demand", post(demand_handler))
        .route("/v1/plan/room-map", post(room_map_handler))
        .route("/v1/plan/apply", post(apply_handler))
        .route("/v1/movement/cell", post(cell_handler))
        .route("/v1/movement/unresolved", post(unresolved_handler))
        .route("/v1/movement/auto-resolve", post(auto_resolve_handler))
        .route("/v1/demo/dataset", get(dataset_handler))
}

pub async fn run_server(config: &ServerConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str()).await?;
    info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, router()).await
}
