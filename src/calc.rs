use crate::model::{Activity, GradeRecord, SubjectAssignment};
use crate::roster::RosterEntry;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{json, Value};

pub const SCALE_MIN: f64 = 0.0;
pub const SCALE_MAX: f64 = 20.0;
pub const PASSING_SCORE: u8 = 10;

/// Half-up rounding used by every report (`redondearPromedio`):
/// `floor(x)` plus one when the fractional part is at least 0.5.
pub fn round_average(x: f64) -> f64 {
    let whole = x.floor();
    if x - whole >= 0.5 {
        whole + 1.0
    } else {
        whole
    }
}

pub fn clamp_scale(x: f64) -> f64 {
    x.clamp(SCALE_MIN, SCALE_MAX)
}

/// Clamp then round. Bonus points are added by the caller before this.
pub fn finish_score(x: f64) -> u8 {
    round_average(clamp_scale(x)) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Letter {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Letter {
    pub fn parse(raw: &str) -> Option<Letter> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Letter::A),
            "B" => Some(Letter::B),
            "C" => Some(Letter::C),
            "D" => Some(Letter::D),
            "E" => Some(Letter::E),
            "F" => Some(Letter::F),
            _ => None,
        }
    }

    pub fn scale_value(self) -> f64 {
        match self {
            Letter::A => 19.0,
            Letter::B => 15.5,
            Letter::C => 12.0,
            Letter::D => 5.5,
            Letter::E => 3.0,
            Letter::F => 1.0,
        }
    }

    /// Numeric back-conversion bands; only used for display and statistics.
    pub fn from_score(v: f64) -> Letter {
        if v >= 18.0 {
            Letter::A
        } else if v >= 14.0 {
            Letter::B
        } else if v >= 10.0 {
            Letter::C
        } else if v >= 7.0 {
            Letter::D
        } else if v >= 4.0 {
            Letter::E
        } else {
            Letter::F
        }
    }

    pub fn is_passing(self) -> bool {
        matches!(self, Letter::A | Letter::B | Letter::C)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Letter::A => "A",
            Letter::B => "B",
            Letter::C => "C",
            Letter::D => "D",
            Letter::E => "E",
            Letter::F => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeStatus {
    NotPresented,
    Incomplete,
}

impl GradeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GradeStatus::NotPresented => "NP",
            GradeStatus::Incomplete => "I",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Grade {
    Numeric(f64),
    Letter(Letter),
    Status(GradeStatus),
}

impl Grade {
    /// Normalizes one stored record. `None` means "no value" for this student.
    pub fn from_record(record: &GradeRecord, qualitative: bool) -> Option<Grade> {
        let text = match &record.raw {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => {
                return n
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .map(Grade::Numeric);
            }
            _ => return None,
        };
        if text.is_empty() {
            return None;
        }
        if text.eq_ignore_ascii_case("NP") {
            return Some(Grade::Status(GradeStatus::NotPresented));
        }
        if text.eq_ignore_ascii_case("I") {
            return Some(Grade::Status(GradeStatus::Incomplete));
        }

        let numeric = text.parse::<f64>().ok().filter(|v| v.is_finite());
        let alphabetic = record
            .kind
            .as_deref()
            .map(|k| k.trim().eq_ignore_ascii_case("alfabetica"))
            .unwrap_or(false);
        if qualitative || alphabetic {
            if let Some(l) = Letter::parse(&text) {
                return Some(Grade::Letter(l));
            }
        }
        numeric.map(Grade::Numeric)
    }

    pub fn scale_value(self) -> f64 {
        match self {
            Grade::Numeric(v) => v,
            Grade::Letter(l) => l.scale_value(),
            Grade::Status(_) => 1.0,
        }
    }

    pub fn letter(self) -> Letter {
        match self {
            Grade::Letter(l) => l,
            other => Letter::from_score(other.scale_value()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Moment {
    First,
    Second,
    Third,
    Final,
}

impl Moment {
    pub const TERMS: [Moment; 3] = [Moment::First, Moment::Second, Moment::Third];

    pub fn from_number(n: i64) -> Option<Moment> {
        match n {
            1 => Some(Moment::First),
            2 => Some(Moment::Second),
            3 => Some(Moment::Third),
            4 => Some(Moment::Final),
            _ => None,
        }
    }

    /// Accepts 1..4, "1".."4", "final" and "definitiva".
    pub fn parse(raw: &Value) -> Option<Moment> {
        match raw {
            Value::Number(n) => n.as_i64().and_then(Moment::from_number),
            Value::String(s) => {
                let t = s.trim().to_ascii_lowercase();
                if t == "final" || t == "definitiva" {
                    return Some(Moment::Final);
                }
                t.parse::<i64>().ok().and_then(Moment::from_number)
            }
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Moment::First => 1,
            Moment::Second => 2,
            Moment::Third => 3,
            Moment::Final => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Moment::First => "momento-1",
            Moment::Second => "momento-2",
            Moment::Third => "momento-3",
            Moment::Final => "definitiva",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Moment::First => "Momento 1",
            Moment::Second => "Momento 2",
            Moment::Third => "Momento 3",
            Moment::Final => "Definitiva",
        }
    }
}

/// Result of aggregating one (student, subject, moment).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    /// Locked moment or nothing graded. Excluded from every count.
    Empty,
    /// Subject does not apply to the student. Excluded from every count.
    NotConcerned,
    Numeric(u8),
    Qualitative { letter: Letter, value: u8 },
}

impl Aggregate {
    pub fn score(&self) -> Option<u8> {
        match *self {
            Aggregate::Numeric(v) => Some(v),
            Aggregate::Qualitative { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match *self {
            Aggregate::Empty => Value::Null,
            Aggregate::NotConcerned => json!("NC"),
            Aggregate::Numeric(v) => json!(v),
            Aggregate::Qualitative { letter, value } => {
                json!({ "letter": letter.as_str(), "value": value })
            }
        }
    }
}

/// Approved / not approved; `None` for empty and not-concerned results.
pub fn approval(agg: &Aggregate) -> Option<bool> {
    match *agg {
        Aggregate::Numeric(v) => Some(v >= PASSING_SCORE),
        Aggregate::Qualitative { letter, .. } => Some(letter.is_passing()),
        Aggregate::Empty | Aggregate::NotConcerned => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeightMode {
    /// `sum(value * weight / 100)`, weights taken as entered.
    Raw,
    /// Divide by the sum of the weights actually graded; plain mean when that
    /// sum is zero.
    Renormalized,
}

/// The student's grade for one activity; the first matching record wins.
pub fn student_grade(
    activity: &Activity,
    student: &RosterEntry,
    qualitative: bool,
) -> Option<Grade> {
    activity
        .grades
        .iter()
        .find(|g| student.is_addressed_by(&g.student_ref))
        .and_then(|g| Grade::from_record(g, qualitative))
}

pub fn bonus_points(assignment: &SubjectAssignment, student: &RosterEntry, moment: u8) -> f64 {
    assignment
        .bonus_points
        .iter()
        .filter(|b| b.moment == moment && student.is_addressed_by(&b.student_ref))
        .map(|b| b.points)
        .sum()
}

fn parse_activity_date(raw: Option<&str>) -> Option<NaiveDateTime> {
    let t = raw?.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(t.get(..10).unwrap_or(t), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Most recent graded activity: stable sort descending by date, undated last.
fn most_recent<'a>(graded: &[(&'a Activity, Grade)]) -> Option<(&'a Activity, Grade)> {
    let mut sorted: Vec<(Option<NaiveDateTime>, &'a Activity, Grade)> = graded
        .iter()
        .map(|(a, g)| (parse_activity_date(a.date.as_deref()), *a, *g))
        .collect();
    sorted.sort_by(|x, y| y.0.cmp(&x.0));
    sorted.first().map(|(_, a, g)| (*a, *g))
}

fn finish_qualitative(grade: Grade, bonus: f64) -> Aggregate {
    let value = finish_score(grade.scale_value() + bonus);
    let letter = if bonus == 0.0 {
        grade.letter()
    } else {
        Letter::from_score(value as f64)
    };
    Aggregate::Qualitative { letter, value }
}

fn aggregate_term(
    assignment: &SubjectAssignment,
    student: &RosterEntry,
    moment: u8,
    mode: WeightMode,
) -> Aggregate {
    if assignment.is_locked(moment) {
        return Aggregate::Empty;
    }
    if !student.applies_to(assignment) {
        return Aggregate::NotConcerned;
    }

    let qualitative = assignment.subject.qualitative;
    let graded: Vec<(&Activity, Grade)> = assignment
        .activities_in(moment)
        .filter_map(|a| student_grade(a, student, qualitative).map(|g| (a, g)))
        .collect();
    if graded.is_empty() {
        return Aggregate::Empty;
    }
    let bonus = bonus_points(assignment, student, moment);

    if qualitative {
        return match most_recent(&graded) {
            Some((_, grade)) => finish_qualitative(grade, bonus),
            None => Aggregate::Empty,
        };
    }

    let raw = match mode {
        WeightMode::Raw => graded
            .iter()
            .map(|(a, g)| g.scale_value() * a.weight / 100.0)
            .sum::<f64>(),
        WeightMode::Renormalized => {
            let weight_sum: f64 = graded.iter().map(|(a, _)| a.weight).sum();
            if weight_sum != 0.0 {
                graded
                    .iter()
                    .map(|(a, g)| g.scale_value() * a.weight)
                    .sum::<f64>()
                    / weight_sum
            } else {
                graded.iter().map(|(_, g)| g.scale_value()).sum::<f64>() / graded.len() as f64
            }
        }
    };
    Aggregate::Numeric(finish_score(raw + bonus))
}

/// Qualitative definitiva: the most recent graded activity across the
/// unlocked moments, plus the bonus of that activity's moment. Undated ties
/// go to the later moment.
fn qualitative_definitiva(assignment: &SubjectAssignment, student: &RosterEntry) -> Aggregate {
    let graded: Vec<(&Activity, Grade)> = Moment::TERMS
        .iter()
        .rev()
        .map(|m| m.number())
        .filter(|&m| !assignment.is_locked(m))
        .flat_map(move |m| assignment.activities_in(m))
        .filter_map(|a| student_grade(a, student, true).map(|g| (a, g)))
        .collect();
    match most_recent(&graded) {
        Some((activity, grade)) => {
            finish_qualitative(grade, bonus_points(assignment, student, activity.moment))
        }
        None => Aggregate::Empty,
    }
}

/// Definitiva: rounded mean of the renormalized moment scores.
fn aggregate_definitiva(assignment: &SubjectAssignment, student: &RosterEntry) -> Aggregate {
    if !student.applies_to(assignment) {
        return Aggregate::NotConcerned;
    }
    if assignment.subject.qualitative {
        return qualitative_definitiva(assignment, student);
    }
    let per_moment: Vec<Aggregate> = Moment::TERMS
        .iter()
        .map(|m| aggregate_term(assignment, student, m.number(), WeightMode::Renormalized))
        .collect();

    let scores: Vec<f64> = per_moment
        .iter()
        .filter_map(|a| a.score())
        .map(f64::from)
        .collect();
    if scores.is_empty() {
        return Aggregate::Empty;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    Aggregate::Numeric(finish_score(mean))
}

/// Aggregated value for one (student, subject, moment).
pub fn aggregate(assignment: &SubjectAssignment, student: &RosterEntry, moment: Moment) -> Aggregate {
    match moment {
        Moment::Final => aggregate_definitiva(assignment, student),
        m => aggregate_term(assignment, student, m.number(), WeightMode::Raw),
    }
}

/// Per-moment scores feeding a definitiva, in moment order.
pub fn definitiva_breakdown(
    assignment: &SubjectAssignment,
    student: &RosterEntry,
) -> [Aggregate; 3] {
    let at = |m: Moment| {
        if !student.applies_to(assignment) {
            Aggregate::NotConcerned
        } else {
            aggregate_term(assignment, student, m.number(), WeightMode::Renormalized)
        }
    };
    [at(Moment::First), at(Moment::Second), at(Moment::Third)]
}

/// Mean of the numeric (quantitative) aggregates of one student, if any.
pub fn numeric_mean<'a, I>(aggregates: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a Aggregate>,
{
    let mut sum = 0.0_f64;
    let mut n = 0usize;
    for a in aggregates {
        if let Aggregate::Numeric(v) = a {
            sum += f64::from(*v);
            n += 1;
        }
    }
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
