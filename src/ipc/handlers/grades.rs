use crate::error::{EngineError, EngineResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{load_snapshot, parse_moment, required_str};
use crate::ipc::types::{AppState, Request};
use crate::projector;
use serde_json::{json, Value};

fn roster_resolve(state: &AppState, req: &Request) -> EngineResult<Value> {
    let snap = load_snapshot(state, req)?;
    Ok(json!({
        "classroom": { "id": snap.classroom.id, "name": snap.classroom.label() },
        "students": snap.roster,
    }))
}

fn moment_grades(state: &AppState, req: &Request) -> EngineResult<Value> {
    let moment = parse_moment(&req.params)?;
    let snap = load_snapshot(state, req)?;
    Ok(projector::moment_grades_json(&snap, moment))
}

fn student_card(state: &AppState, req: &Request) -> EngineResult<Value> {
    let student_id = required_str(&req.params, "studentId")?;
    let snap = load_snapshot(state, req)?;
    let student = snap.find_student(&student_id).ok_or_else(|| {
        EngineError::NotFound(format!(
            "student {} is not enrolled in classroom {}",
            student_id, snap.classroom.id
        ))
    })?;
    Ok(projector::student_card_json(&snap, student))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "roster.resolve" => roster_resolve(state, req),
        "calc.momentGrades" => moment_grades(state, req),
        "reports.studentCardModel" => student_card(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
