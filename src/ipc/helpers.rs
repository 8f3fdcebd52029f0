use crate::calc::Moment;
use crate::claims::Claims;
use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::ipc::types::{AppState, Request};
use crate::model::Classroom;
use crate::projector::ClassroomSnapshot;
use crate::roster::profile_lookup_keys;
use rusqlite::Connection;
use serde_json::Value;

pub fn db_conn(state: &AppState) -> EngineResult<&Connection> {
    state.db.as_ref().ok_or(EngineError::NoWorkspace)
}

pub fn required_str(params: &Value, key: &str) -> EngineResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::bad_params(format!("missing params.{}", key)))
}

pub fn parse_moment(params: &Value) -> EngineResult<Moment> {
    let raw = params
        .get("moment")
        .ok_or_else(|| EngineError::bad_params("missing params.moment"))?;
    Moment::parse(raw).ok_or_else(|| {
        EngineError::bad_params(format!(
            "params.moment must be 1..4, \"final\" or \"definitiva\" (got {})",
            raw
        ))
    })
}

pub fn claims(state: &AppState, req: &Request) -> Claims {
    req.claims
        .clone()
        .unwrap_or_else(|| Claims::with_role(state.config.default_role))
}

pub fn require_write(state: &AppState, req: &Request) -> EngineResult<()> {
    if claims(state, req).can_write() {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "{} requires an admin or staff role",
            req.method
        )))
    }
}

pub fn load_classroom(conn: &Connection, id: &str) -> EngineResult<Classroom> {
    db::classroom_get(conn, id)
        .map_err(EngineError::Query)?
        .ok_or_else(|| EngineError::NotFound(format!("classroom not found: {}", id)))
}

pub fn snapshot_of(conn: &Connection, classroom: Classroom) -> EngineResult<ClassroomSnapshot> {
    let (ids, cedulas) = profile_lookup_keys(&classroom);
    let profiles = db::student_profiles_fetch(conn, &ids, &cedulas).map_err(EngineError::Query)?;
    Ok(ClassroomSnapshot::new(classroom, &profiles))
}

/// Classroom named by `params.classroomId`, checked against the caller's claims.
pub fn load_snapshot(state: &AppState, req: &Request) -> EngineResult<ClassroomSnapshot> {
    let conn = db_conn(state)?;
    let id = required_str(&req.params, "classroomId")?;
    let classroom = load_classroom(conn, &id)?;
    if !claims(state, req).can_read_classroom(&classroom) {
        return Err(EngineError::Forbidden(format!(
            "no access to classroom {}",
            id
        )));
    }
    snapshot_of(conn, classroom)
}

/// Every active classroom; cross-classroom reads need an admin or staff role.
pub fn load_active_snapshots(
    state: &AppState,
    req: &Request,
) -> EngineResult<Vec<ClassroomSnapshot>> {
    let conn = db_conn(state)?;
    if !claims(state, req).can_read_all() {
        return Err(EngineError::Forbidden(
            "cross-classroom reports require an admin or staff role".to_string(),
        ));
    }
    db::classrooms_active(conn)
        .map_err(EngineError::Query)?
        .into_iter()
        .map(|c| snapshot_of(conn, c))
        .collect()
}
