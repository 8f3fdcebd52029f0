//! Report shapes built on top of the aggregation engine.
//!
//! Every report starts from the same pivot: roster rows times subject
//! assignments, one `Aggregate` per cell. The functions here only decide how
//! that pivot is laid out and which literal token stands for "not concerned".

use crate::calc::{self, Aggregate, Grade, Moment};
use crate::model::{Classroom, StudentProfile, SubjectAssignment};
use crate::roster::{natural_cmp, resolve_roster, RosterEntry};
use crate::sheet::{Cell, Merge, Sheet};
use serde::Serialize;
use serde_json::{json, Value};

pub const SABANA_MAX_SLOTS: usize = 8;
pub const SABANA_RESTRICTED: &str = "AP";
pub const REPORT_RESTRICTED: &str = "NC";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSetup {
    pub institution_name: String,
    pub school_year: String,
    pub landscape: bool,
    pub show_generated_at: bool,
}

impl Default for ReportSetup {
    fn default() -> Self {
        Self {
            institution_name: String::new(),
            school_year: String::new(),
            landscape: true,
            show_generated_at: true,
        }
    }
}

/// Header inputs shared by every sheet of one request.
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
    pub setup: &'a ReportSetup,
    pub generated_on: &'a str,
}

/// A classroom read once per request, with its roster resolved.
#[derive(Debug, Clone)]
pub struct ClassroomSnapshot {
    pub classroom: Classroom,
    pub roster: Vec<RosterEntry>,
}

impl ClassroomSnapshot {
    pub fn new(classroom: Classroom, profiles: &[StudentProfile]) -> Self {
        let roster = resolve_roster(&classroom, profiles);
        Self { classroom, roster }
    }

    pub fn assignments(&self) -> &[SubjectAssignment] {
        &self.classroom.assignments
    }

    /// Aggregates aligned with `roster` (rows) and `assignments()` (columns).
    pub fn grid(&self, moment: Moment) -> Vec<Vec<Aggregate>> {
        self.roster
            .iter()
            .map(|s| {
                self.assignments()
                    .iter()
                    .map(|a| calc::aggregate(a, s, moment))
                    .collect()
            })
            .collect()
    }

    pub fn find_student(&self, key: &str) -> Option<&RosterEntry> {
        self.roster.iter().find(|s| s.is_addressed_by(key))
    }
}

fn grade_cell(g: Grade) -> Cell {
    match g {
        Grade::Numeric(v) => Cell::Number(v),
        Grade::Letter(l) => Cell::text(l.as_str()),
        Grade::Status(s) => Cell::text(s.as_str()),
    }
}

fn aggregate_cell(agg: &Aggregate, restricted_token: &str) -> Cell {
    match *agg {
        Aggregate::Empty => Cell::Empty,
        Aggregate::NotConcerned => Cell::text(restricted_token),
        Aggregate::Numeric(v) => Cell::Number(f64::from(v)),
        Aggregate::Qualitative { letter, .. } => Cell::text(letter.as_str()),
    }
}

fn title_lines(ctx: &ReportContext<'_>, report: &str, scope: &str, moment: Moment) -> Vec<String> {
    let mut out = Vec::new();
    let institution = ctx.setup.institution_name.trim();
    if !institution.is_empty() {
        out.push(institution.to_string());
    }
    out.push(format!("{} - {} - {}", report, scope, moment.title()));
    let year = ctx.setup.school_year.trim();
    if !year.is_empty() {
        out.push(format!("Año escolar: {}", year));
    }
    if ctx.setup.show_generated_at {
        out.push(format!("Generado: {}", ctx.generated_on));
    }
    out
}

fn student_lead(idx: usize, s: &RosterEntry) -> Vec<Cell> {
    vec![
        Cell::Number((idx + 1) as f64),
        Cell::text(s.cedula.clone()),
        Cell::text(s.display_name.clone()),
    ]
}

fn lead_header() -> Vec<Cell> {
    vec![Cell::text("N°"), Cell::text("Cédula"), Cell::text("Estudiante")]
}

const LEAD_WIDTHS: [f64; 3] = [5.0, 14.0, 34.0];

/// Sábana: activity-level detail plus the final value per subject.
pub fn sabana_sheet(snap: &ClassroomSnapshot, moment: Moment, ctx: &ReportContext<'_>) -> Sheet {
    let label = snap.classroom.label();

    // Slot layout per assignment: activity columns then one final column.
    let slots: Vec<Vec<String>> = snap
        .assignments()
        .iter()
        .map(|a| match moment {
            Moment::Final => vec!["M1".to_string(), "M2".to_string(), "M3".to_string()],
            m => (1..=a.activities_in(m.number()).take(SABANA_MAX_SLOTS).count())
                .map(|i| format!("A{}", i))
                .collect(),
        })
        .collect();

    let mut group_row = vec![Cell::Empty, Cell::Empty, Cell::Empty];
    let mut slot_row = lead_header();
    let mut merges = Vec::new();
    let mut widths = LEAD_WIDTHS.to_vec();
    for (a, labels) in snap.assignments().iter().zip(&slots) {
        let first_col = group_row.len();
        group_row.push(Cell::text(a.subject.name.clone()));
        for _ in 0..labels.len() {
            group_row.push(Cell::Empty);
        }
        for l in labels {
            slot_row.push(Cell::text(l.clone()));
            widths.push(5.0);
        }
        slot_row.push(Cell::text("DEF"));
        widths.push(6.0);
        merges.push(Merge {
            header_row: 0,
            first_col,
            last_col: first_col + labels.len(),
        });
    }

    let mut rows = Vec::with_capacity(snap.roster.len());
    for (idx, s) in snap.roster.iter().enumerate() {
        let mut row = student_lead(idx, s);
        for (a, labels) in snap.assignments().iter().zip(&slots) {
            let locked = moment != Moment::Final && a.is_locked(moment.number());
            if locked || !s.applies_to(a) {
                row.extend(std::iter::repeat(Cell::Empty).take(labels.len()));
            } else if moment == Moment::Final {
                for agg in calc::definitiva_breakdown(a, s) {
                    row.push(aggregate_cell(&agg, SABANA_RESTRICTED));
                }
            } else {
                for act in a.activities_in(moment.number()).take(SABANA_MAX_SLOTS) {
                    let cell = calc::student_grade(act, s, a.subject.qualitative)
                        .map(grade_cell)
                        .unwrap_or(Cell::Empty);
                    row.push(cell);
                }
            }
            // A locked moment stays blank even for restricted students.
            row.push(aggregate_cell(&calc::aggregate(a, s, moment), SABANA_RESTRICTED));
        }
        rows.push(row);
    }

    Sheet {
        name: "Sabana".to_string(),
        title: title_lines(ctx, "Sábana de calificaciones", &label, moment),
        header: vec![group_row, slot_row],
        rows,
        column_widths: widths,
        merges,
        landscape: ctx.setup.landscape,
    }
}

fn subject_header(snap: &ClassroomSnapshot) -> (Vec<Cell>, Vec<f64>) {
    let mut header = lead_header();
    let mut widths = LEAD_WIDTHS.to_vec();
    for a in snap.assignments() {
        header.push(Cell::text(a.subject.name.clone()));
        widths.push(12.0);
    }
    (header, widths)
}

/// One aggregate per subject plus the student's quantitative average.
pub fn averages_sheet(snap: &ClassroomSnapshot, moment: Moment, ctx: &ReportContext<'_>) -> Sheet {
    let (mut header, mut widths) = subject_header(snap);
    header.push(Cell::text("Promedio"));
    widths.push(10.0);

    let grid = snap.grid(moment);
    let rows = snap
        .roster
        .iter()
        .zip(&grid)
        .enumerate()
        .map(|(idx, (s, aggs))| {
            let mut row = student_lead(idx, s);
            row.extend(aggs.iter().map(|a| aggregate_cell(a, REPORT_RESTRICTED)));
            row.push(
                calc::numeric_mean(aggs)
                    .map(|m| Cell::Number(calc::round_2_decimals(m)))
                    .unwrap_or(Cell::Empty),
            );
            row
        })
        .collect();

    Sheet {
        name: "Promedios".to_string(),
        title: title_lines(ctx, "Promedios", &snap.classroom.label(), moment),
        header: vec![header],
        rows,
        column_widths: widths,
        merges: Vec::new(),
        landscape: ctx.setup.landscape,
    }
}

/// Boolean approved table plus the number of failed subjects per student.
pub fn approval_sheet(snap: &ClassroomSnapshot, moment: Moment, ctx: &ReportContext<'_>) -> Sheet {
    let (mut header, mut widths) = subject_header(snap);
    header.push(Cell::text("Reprobadas"));
    widths.push(11.0);

    let grid = snap.grid(moment);
    let rows = snap
        .roster
        .iter()
        .zip(&grid)
        .enumerate()
        .map(|(idx, (s, aggs))| {
            let mut row = student_lead(idx, s);
            let mut failed = 0u32;
            for agg in aggs {
                row.push(match (agg, calc::approval(agg)) {
                    (Aggregate::NotConcerned, _) => Cell::text(REPORT_RESTRICTED),
                    (_, Some(ok)) => {
                        if !ok {
                            failed += 1;
                        }
                        Cell::Bool(ok)
                    }
                    (_, None) => Cell::Empty,
                });
            }
            row.push(Cell::Number(f64::from(failed)));
            row
        })
        .collect();

    Sheet {
        name: "Aprobados".to_string(),
        title: title_lines(ctx, "Aprobados y reprobados", &snap.classroom.label(), moment),
        header: vec![header],
        rows,
        column_widths: widths,
        merges: Vec::new(),
        landscape: ctx.setup.landscape,
    }
}

fn sorted_snapshots(snaps: &[ClassroomSnapshot]) -> Vec<&ClassroomSnapshot> {
    let mut out: Vec<&ClassroomSnapshot> = snaps.iter().collect();
    out.sort_by(|a, b| natural_cmp(&a.classroom.label(), &b.classroom.label()));
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRow {
    pub classroom_id: String,
    pub label: String,
    /// Index is the rounded average, 0..=20.
    pub buckets: Vec<u32>,
    pub total: u32,
}

/// Students per rounded overall average, per classroom.
pub fn distribution(snaps: &[ClassroomSnapshot], moment: Moment) -> Vec<DistributionRow> {
    sorted_snapshots(snaps)
        .into_iter()
        .map(|snap| {
            let mut buckets = vec![0u32; 21];
            for aggs in snap.grid(moment) {
                if let Some(mean) = calc::numeric_mean(&aggs) {
                    let bucket = calc::finish_score(mean) as usize;
                    buckets[bucket] += 1;
                }
            }
            let total = buckets.iter().sum();
            DistributionRow {
                classroom_id: snap.classroom.id.clone(),
                label: snap.classroom.label(),
                buckets,
                total,
            }
        })
        .collect()
}

pub fn distribution_sheet(
    snaps: &[ClassroomSnapshot],
    moment: Moment,
    ctx: &ReportContext<'_>,
) -> Sheet {
    let rows_in = distribution(snaps, moment);
    let mut header = vec![Cell::text("Aula")];
    let mut widths = vec![24.0];
    for n in 0..=20 {
        header.push(Cell::text(n.to_string()));
        widths.push(5.0);
    }
    header.push(Cell::text("Total"));
    widths.push(8.0);

    let mut overall = vec![0u32; 21];
    let mut rows = Vec::with_capacity(rows_in.len() + 1);
    for r in &rows_in {
        let mut row = vec![Cell::text(r.label.clone())];
        for (i, n) in r.buckets.iter().enumerate() {
            overall[i] += n;
            row.push(Cell::Number(f64::from(*n)));
        }
        row.push(Cell::Number(f64::from(r.total)));
        rows.push(row);
    }
    let mut total_row = vec![Cell::text("Total general")];
    total_row.extend(overall.iter().map(|n| Cell::Number(f64::from(*n))));
    total_row.push(Cell::Number(f64::from(overall.iter().sum::<u32>())));
    rows.push(total_row);

    Sheet {
        name: "Distribucion".to_string(),
        title: title_lines(ctx, "Distribución de promedios", "General", moment),
        header: vec![header],
        rows,
        column_widths: widths,
        merges: Vec::new(),
        landscape: ctx.setup.landscape,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalCounts {
    pub evaluated: u32,
    pub approved: u32,
    pub failed: u32,
}

impl ApprovalCounts {
    fn record(&mut self, approved: Option<bool>) {
        match approved {
            Some(true) => {
                self.evaluated += 1;
                self.approved += 1;
            }
            Some(false) => {
                self.evaluated += 1;
                self.failed += 1;
            }
            None => {}
        }
    }

    fn add(&mut self, other: &ApprovalCounts) {
        self.evaluated += other.evaluated;
        self.approved += other.approved;
        self.failed += other.failed;
    }

    pub fn approved_percent(&self) -> Option<f64> {
        if self.evaluated == 0 {
            None
        } else {
            Some(calc::round_2_decimals(
                100.0 * f64::from(self.approved) / f64::from(self.evaluated),
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStatistics {
    pub assignment_id: String,
    pub subject_name: String,
    pub counts: ApprovalCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomStatistics {
    pub classroom_id: String,
    pub label: String,
    pub subjects: Vec<SubjectStatistics>,
    pub total: ApprovalCounts,
}

/// Approved/failed counts per subject and per classroom.
pub fn statistics(snaps: &[ClassroomSnapshot], moment: Moment) -> Vec<ClassroomStatistics> {
    sorted_snapshots(snaps)
        .into_iter()
        .map(|snap| {
            let grid = snap.grid(moment);
            let mut total = ApprovalCounts::default();
            let subjects = snap
                .assignments()
                .iter()
                .enumerate()
                .map(|(col, a)| {
                    let mut counts = ApprovalCounts::default();
                    for aggs in &grid {
                        counts.record(calc::approval(&aggs[col]));
                    }
                    total.add(&counts);
                    SubjectStatistics {
                        assignment_id: a.id.clone(),
                        subject_name: a.subject.name.clone(),
                        counts,
                    }
                })
                .collect();
            ClassroomStatistics {
                classroom_id: snap.classroom.id.clone(),
                label: snap.classroom.label(),
                subjects,
                total,
            }
        })
        .collect()
}

fn counts_cells(c: &ApprovalCounts) -> [Cell; 4] {
    [
        Cell::Number(f64::from(c.evaluated)),
        Cell::Number(f64::from(c.approved)),
        Cell::Number(f64::from(c.failed)),
        c.approved_percent().map(Cell::Number).unwrap_or(Cell::Empty),
    ]
}

pub fn statistics_sheet(
    snaps: &[ClassroomSnapshot],
    moment: Moment,
    ctx: &ReportContext<'_>,
) -> Sheet {
    let stats = statistics(snaps, moment);
    let header = vec![
        Cell::text("Aula"),
        Cell::text("Materia"),
        Cell::text("Evaluados"),
        Cell::text("Aprobados"),
        Cell::text("Reprobados"),
        Cell::text("% Aprobados"),
    ];
    let mut overall = ApprovalCounts::default();
    let mut rows = Vec::new();
    for c in &stats {
        for s in &c.subjects {
            let mut row = vec![Cell::text(c.label.clone()), Cell::text(s.subject_name.clone())];
            row.extend(counts_cells(&s.counts));
            rows.push(row);
        }
        let mut total_row = vec![Cell::text(c.label.clone()), Cell::text("Total")];
        total_row.extend(counts_cells(&c.total));
        rows.push(total_row);
        overall.add(&c.total);
    }
    let mut overall_row = vec![Cell::text("Total general"), Cell::Empty];
    overall_row.extend(counts_cells(&overall));
    rows.push(overall_row);

    Sheet {
        name: "Estadisticas".to_string(),
        title: title_lines(ctx, "Estadística de aprobados", "General", moment),
        header: vec![header],
        rows,
        column_widths: vec![24.0, 28.0, 11.0, 11.0, 11.0, 12.0],
        merges: Vec::new(),
        landscape: ctx.setup.landscape,
    }
}

fn subject_json(a: &SubjectAssignment) -> Value {
    json!({
        "assignmentId": a.id,
        "subjectId": a.subject.id,
        "name": a.subject.name,
        "qualitative": a.subject.qualitative,
        "lockedMoments": a.locked_moments,
    })
}

/// Raw aggregates for one classroom and moment, for previews and checks.
pub fn moment_grades_json(snap: &ClassroomSnapshot, moment: Moment) -> Value {
    let grid = snap.grid(moment);
    let students: Vec<Value> = snap
        .roster
        .iter()
        .zip(&grid)
        .map(|(s, aggs)| {
            json!({
                "cedula": s.cedula,
                "displayName": s.display_name,
                "profileId": s.profile_id,
                "hasRestrictions": s.has_restrictions,
                "grades": aggs.iter().map(Aggregate::to_json).collect::<Vec<_>>(),
                "approved": aggs.iter().map(calc::approval).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "classroom": { "id": snap.classroom.id, "name": snap.classroom.label() },
        "moment": moment.number(),
        "subjects": snap.assignments().iter().map(subject_json).collect::<Vec<_>>(),
        "students": students,
    })
}

/// Moment scores, definitiva and approval for one student.
pub fn student_card_json(snap: &ClassroomSnapshot, student: &RosterEntry) -> Value {
    let subjects: Vec<Value> = snap
        .assignments()
        .iter()
        .map(|a| {
            let moments: Vec<Aggregate> = Moment::TERMS
                .iter()
                .map(|m| calc::aggregate(a, student, *m))
                .collect();
            let definitiva = calc::aggregate(a, student, Moment::Final);
            json!({
                "subject": subject_json(a),
                "moments": moments.iter().map(Aggregate::to_json).collect::<Vec<_>>(),
                "definitiva": definitiva.to_json(),
                "approved": calc::approval(&definitiva),
            })
        })
        .collect();
    json!({
        "classroom": { "id": snap.classroom.id, "name": snap.classroom.label() },
        "student": student,
        "subjects": subjects,
    })
}
