use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{claims, db_conn, require_write};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentProfile;
use crate::roster::natural_cmp;
use serde_json::{json, Value};

fn students_upsert(state: &mut AppState, req: &Request) -> EngineResult<Value> {
    db_conn(state)?;
    require_write(state, req)?;
    let list = req
        .params
        .get("students")
        .and_then(|v| v.as_array())
        .ok_or_else(|| EngineError::bad_params("params.students must be an array"))?;
    let profiles = list
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let p: StudentProfile = serde_json::from_value(v.clone())
                .map_err(|e| EngineError::bad_params(format!("students[{}]: {}", i, e)))?;
            if p.id.trim().is_empty() {
                return Err(EngineError::bad_params(format!("students[{}]: missing _id", i)));
            }
            Ok(p)
        })
        .collect::<EngineResult<Vec<_>>>()?;

    let conn = state.db.as_mut().ok_or(EngineError::NoWorkspace)?;
    let n = db::student_profiles_upsert(conn, &profiles).map_err(EngineError::Update)?;
    Ok(json!({ "upserted": n }))
}

/// Profiles span every classroom, so listing them needs cross-classroom reads.
fn students_list(state: &AppState, req: &Request) -> EngineResult<Value> {
    let conn = db_conn(state)?;
    if !claims(state, req).can_read_all() {
        return Err(EngineError::Forbidden(
            "students.list requires an admin or staff role".to_string(),
        ));
    }
    let mut profiles = db::student_profiles_list(conn).map_err(EngineError::Query)?;
    profiles.sort_by(|a, b| {
        natural_cmp(
            a.cedula.as_deref().unwrap_or_default(),
            b.cedula.as_deref().unwrap_or_default(),
        )
        .then_with(|| a.id.cmp(&b.id))
    });
    Ok(json!({ "students": profiles }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.upsert" => Some(respond(&req.id, students_upsert(state, req))),
        "students.list" => Some(respond(&req.id, students_list(state, req))),
        _ => None,
    }
}
