use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{claims, db_conn, load_classroom, require_write, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Classroom;
use serde_json::{json, Value};

fn classrooms_list(state: &AppState, req: &Request) -> EngineResult<Value> {
    let conn = db_conn(state)?;
    let active_only = req
        .params
        .get("activeOnly")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let all = if active_only {
        db::classrooms_active(conn)
    } else {
        db::classrooms_all(conn)
    }
    .map_err(EngineError::Query)?;

    let caller = claims(state, req);
    let rows: Vec<Value> = all
        .iter()
        .filter(|c| caller.can_read_classroom(c))
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.label(),
                "active": c.active,
                "studentCount": c.enrollments.len(),
                "subjectCount": c.assignments.len(),
            })
        })
        .collect();
    Ok(json!({ "classrooms": rows }))
}

fn classrooms_get(state: &AppState, req: &Request) -> EngineResult<Value> {
    let conn = db_conn(state)?;
    let id = required_str(&req.params, "classroomId")?;
    let classroom = load_classroom(conn, &id)?;
    if !claims(state, req).can_read_classroom(&classroom) {
        return Err(EngineError::Forbidden(format!("no access to classroom {}", id)));
    }
    serde_json::to_value(&classroom)
        .map(|doc| json!({ "classroom": doc }))
        .map_err(|e| EngineError::Internal(e.to_string()))
}

fn classrooms_upsert(state: &AppState, req: &Request) -> EngineResult<Value> {
    let conn = db_conn(state)?;
    require_write(state, req)?;
    let doc = req
        .params
        .get("classroom")
        .filter(|v| v.is_object())
        .cloned()
        .ok_or_else(|| EngineError::bad_params("params.classroom must be an object"))?;
    let mut classroom: Classroom = serde_json::from_value(doc)
        .map_err(|e| EngineError::bad_params(format!("invalid classroom: {}", e)))?;
    let created = classroom.id.trim().is_empty();
    if created {
        classroom.id = uuid::Uuid::new_v4().to_string();
    }
    db::classroom_upsert(conn, &classroom).map_err(EngineError::Update)?;
    tracing::info!(classroom_id = %classroom.id, created, "classroom saved");
    Ok(json!({ "id": classroom.id, "created": created }))
}

fn classrooms_set_active(state: &AppState, req: &Request) -> EngineResult<Value> {
    let conn = db_conn(state)?;
    require_write(state, req)?;
    let id = required_str(&req.params, "classroomId")?;
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| EngineError::bad_params("params.active must be boolean"))?;
    if !db::classroom_set_active(conn, &id, active).map_err(EngineError::Update)? {
        return Err(EngineError::NotFound(format!("classroom not found: {}", id)));
    }
    Ok(json!({ "id": id, "active": active }))
}

fn classrooms_delete(state: &AppState, req: &Request) -> EngineResult<Value> {
    let conn = db_conn(state)?;
    require_write(state, req)?;
    let id = required_str(&req.params, "classroomId")?;
    if !db::classroom_delete(conn, &id).map_err(EngineError::Update)? {
        return Err(EngineError::NotFound(format!("classroom not found: {}", id)));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "classrooms.list" => classrooms_list(state, req),
        "classrooms.get" => classrooms_get(state, req),
        "classrooms.upsert" => classrooms_upsert(state, req),
        "classrooms.setActive" => classrooms_set_active(state, req),
        "classrooms.delete" => classrooms_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
