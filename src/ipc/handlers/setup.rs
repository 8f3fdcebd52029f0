use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_conn, require_write};
use crate::ipc::types::{AppState, Request};
use crate::projector::ReportSetup;
use serde_json::{json, Map, Value};

const REPORTS_KEY: &str = "setup.reports";

fn default_reports() -> Value {
    json!({
        "institutionName": "",
        "schoolYear": "",
        "landscape": true,
        "showGeneratedAt": true
    })
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_reports_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match k.as_str() {
            "institutionName" => {
                obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
            }
            "schoolYear" => {
                obj.insert(k.clone(), Value::String(parse_string_max(v, k, 32)?));
            }
            "landscape" | "showGeneratedAt" => {
                obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
            }
            _ => return Err(format!("unknown reports field: {}", k)),
        }
    }
    Ok(())
}

fn load_reports_section(conn: &rusqlite::Connection) -> anyhow::Result<Value> {
    let mut current = default_reports();
    if let Some(saved) = db::settings_get_json(conn, REPORTS_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let single: Map<String, Value> = [(k.clone(), v.clone())].into_iter().collect();
                let _ = merge_reports_patch(&mut current, &single);
            }
        }
    }
    Ok(current)
}

/// Report header settings with defaults applied.
pub fn load_report_setup(conn: &rusqlite::Connection) -> anyhow::Result<ReportSetup> {
    let v = load_reports_section(conn)?;
    let defaults = ReportSetup::default();
    Ok(ReportSetup {
        institution_name: v
            .get("institutionName")
            .and_then(|x| x.as_str())
            .unwrap_or_default()
            .to_string(),
        school_year: v
            .get("schoolYear")
            .and_then(|x| x.as_str())
            .unwrap_or_default()
            .to_string(),
        landscape: v
            .get("landscape")
            .and_then(|x| x.as_bool())
            .unwrap_or(defaults.landscape),
        show_generated_at: v
            .get("showGeneratedAt")
            .and_then(|x| x.as_bool())
            .unwrap_or(defaults.show_generated_at),
    })
}

fn setup_get(state: &AppState) -> EngineResult<Value> {
    let conn = db_conn(state)?;
    let reports = load_reports_section(conn).map_err(EngineError::Query)?;
    Ok(json!({ "reports": reports }))
}

fn setup_update(state: &AppState, req: &Request) -> EngineResult<Value> {
    let conn = db_conn(state)?;
    require_write(state, req)?;
    let section = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::bad_params("missing section"))?;
    if section != "reports" {
        return Err(EngineError::bad_params("unknown section"));
    }
    let patch = req
        .params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| EngineError::bad_params("patch must be an object"))?;

    let mut current = load_reports_section(conn).map_err(EngineError::Query)?;
    merge_reports_patch(&mut current, patch).map_err(EngineError::BadParams)?;
    db::settings_set_json(conn, REPORTS_KEY, &current).map_err(EngineError::Update)?;
    Ok(json!({ "ok": true, "reports": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "setup.get" => Some(respond(&req.id, setup_get(state))),
        "setup.update" => Some(respond(&req.id, setup_update(state, req))),
        _ => None,
    }
}
