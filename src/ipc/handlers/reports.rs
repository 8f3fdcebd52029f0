use crate::calc::Moment;
use crate::error::{EngineError, EngineResult};
use crate::ipc::error::respond;
use crate::ipc::handlers::setup::load_report_setup;
use crate::ipc::helpers::{db_conn, load_active_snapshots, load_snapshot, parse_moment, required_str};
use crate::ipc::types::{AppState, Request};
use crate::projector::{self, ReportContext};
use crate::sheet::{export_file_name, Sheet, SheetWriter, XlsxSheetWriter};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportKind {
    Sabana,
    Averages,
    Approval,
    Distribution,
    Statistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Model,
    Export,
}

impl ReportKind {
    fn from_method(method: &str) -> Option<(ReportKind, Output)> {
        let rest = method.strip_prefix("reports.")?;
        let (name, output) = if let Some(n) = rest.strip_suffix("Model") {
            (n, Output::Model)
        } else if let Some(n) = rest.strip_suffix("Export") {
            (n, Output::Export)
        } else {
            return None;
        };
        let kind = match name {
            "sabana" => ReportKind::Sabana,
            "averages" => ReportKind::Averages,
            "approval" => ReportKind::Approval,
            "distribution" => ReportKind::Distribution,
            "statistics" => ReportKind::Statistics,
            _ => return None,
        };
        Some((kind, output))
    }

    /// Leading segment of export file names.
    fn file_kind(self) -> &'static str {
        match self {
            ReportKind::Sabana => "sabana",
            ReportKind::Averages => "promedios",
            ReportKind::Approval => "aprobados",
            ReportKind::Distribution => "distribucion",
            ReportKind::Statistics => "estadisticas",
        }
    }
}

struct BuiltReport {
    sheet: Sheet,
    scope: String,
    moment: Moment,
    data: Option<Value>,
}

fn build_report(state: &AppState, req: &Request, kind: ReportKind) -> EngineResult<BuiltReport> {
    let conn = db_conn(state)?;
    let moment = parse_moment(&req.params)?;
    let setup = load_report_setup(conn).map_err(EngineError::Query)?;
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let ctx = ReportContext {
        setup: &setup,
        generated_on: &today,
    };

    let built = match kind {
        ReportKind::Sabana | ReportKind::Averages | ReportKind::Approval => {
            let snap = load_snapshot(state, req)?;
            let sheet = match kind {
                ReportKind::Sabana => projector::sabana_sheet(&snap, moment, &ctx),
                ReportKind::Averages => projector::averages_sheet(&snap, moment, &ctx),
                _ => projector::approval_sheet(&snap, moment, &ctx),
            };
            BuiltReport {
                sheet,
                scope: snap.classroom.label(),
                moment,
                data: None,
            }
        }
        ReportKind::Distribution => {
            let snaps = load_active_snapshots(state, req)?;
            BuiltReport {
                sheet: projector::distribution_sheet(&snaps, moment, &ctx),
                scope: "general".to_string(),
                moment,
                data: Some(json!(projector::distribution(&snaps, moment))),
            }
        }
        ReportKind::Statistics => {
            let snaps = load_active_snapshots(state, req)?;
            BuiltReport {
                sheet: projector::statistics_sheet(&snaps, moment, &ctx),
                scope: "general".to_string(),
                moment,
                data: Some(json!(projector::statistics(&snaps, moment))),
            }
        }
    };
    Ok(built)
}

fn report_model(state: &AppState, req: &Request, kind: ReportKind) -> EngineResult<Value> {
    let built = build_report(state, req, kind)?;
    let mut out = json!({
        "kind": kind.file_kind(),
        "moment": built.moment.number(),
        "sheet": built.sheet,
    });
    if let Some(data) = built.data {
        out["data"] = data;
    }
    Ok(out)
}

fn report_export(
    state: &AppState,
    req: &Request,
    kind: ReportKind,
    writer: &dyn SheetWriter,
) -> EngineResult<Value> {
    let out_dir = PathBuf::from(required_str(&req.params, "outDir")?);
    let built = build_report(state, req, kind)?;
    let bytes = writer.render(&built.sheet).map_err(EngineError::Render)?;

    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let file_name = export_file_name(kind.file_kind(), &built.scope, built.moment.label(), &today);
    std::fs::create_dir_all(&out_dir)?;
    let path = out_dir.join(&file_name);
    std::fs::write(&path, &bytes)?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "report exported");

    Ok(json!({
        "path": path.to_string_lossy(),
        "fileName": file_name,
        "bytes": bytes.len(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let (kind, output) = ReportKind::from_method(&req.method)?;
    let result = match output {
        Output::Model => report_model(state, req, kind),
        Output::Export => report_export(state, req, kind, &XlsxSheetWriter),
    };
    Some(respond(&req.id, result))
}
