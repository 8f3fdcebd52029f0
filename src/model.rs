//! Stored document shapes.
//!
//! Classrooms are stored as single documents with their enrollments and subject
//! assignments embedded. Keys follow the historical document layout, so most
//! fields carry a serde rename. Historical records are loose about scalar types
//! (ids stored as numbers, weights stored as strings), hence the lenient
//! deserializers at the bottom of this file.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classroom {
    #[serde(rename = "_id", default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "nombre", default)]
    pub name: String,
    #[serde(
        rename = "anio",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub year: Option<String>,
    #[serde(
        rename = "seccion",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub section: Option<String>,
    #[serde(
        rename = "turno",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub shift: Option<String>,
    #[serde(rename = "estado", default = "default_true", deserialize_with = "active_flag")]
    pub active: bool,
    #[serde(rename = "alumnos", default)]
    pub enrollments: Vec<Enrollment>,
    #[serde(rename = "asignaciones", default)]
    pub assignments: Vec<SubjectAssignment>,
}

impl Classroom {
    /// Human label used in report titles and export file names.
    pub fn label(&self) -> String {
        let name = self.name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        let parts: Vec<&str> = [&self.year, &self.section, &self.shift]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            self.id.clone()
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(
        rename = "_id",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub doc_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub id: Option<String>,
    #[serde(
        rename = "idU",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub user_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub cedula: Option<String>,
    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "apellido", default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Absent, null and `[]` all mean "every subject applies".
    #[serde(
        rename = "materiasAsignadas",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_subjects: Option<Vec<String>>,
}

impl Enrollment {
    /// Identifier fields in lookup priority order, skipping blanks.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        [&self.doc_id, &self.id, &self.user_id, &self.cedula]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectAssignment {
    #[serde(rename = "_id", default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "materia")]
    pub subject: Subject,
    #[serde(
        rename = "profesor",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub teacher_id: Option<String>,
    #[serde(rename = "actividades", default)]
    pub activities: Vec<Activity>,
    #[serde(rename = "momentosBloqueados", default, deserialize_with = "lenient_moments")]
    pub locked_moments: Vec<u8>,
    #[serde(rename = "puntosExtras", default)]
    pub bonus_points: Vec<BonusPoints>,
}

impl SubjectAssignment {
    pub fn is_locked(&self, moment: u8) -> bool {
        self.locked_moments.contains(&moment)
    }

    pub fn activities_in(&self, moment: u8) -> impl Iterator<Item = &Activity> {
        self.activities.iter().filter(move |a| a.moment == moment)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "_id", default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "nombre", default)]
    pub name: String,
    #[serde(rename = "cualitativa", default)]
    pub qualitative: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "_id", default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "nombre", default)]
    pub name: String,
    #[serde(rename = "fecha", default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "momento", default, deserialize_with = "lenient_u8")]
    pub moment: u8,
    #[serde(rename = "porcentaje", default, deserialize_with = "lenient_f64")]
    pub weight: f64,
    #[serde(rename = "calificaciones", default)]
    pub grades: Vec<GradeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRecord {
    #[serde(rename = "alumnoId", deserialize_with = "lenient_string")]
    pub student_ref: String,
    #[serde(rename = "nota", default)]
    pub raw: Value,
    #[serde(
        rename = "tipoCalificacion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusPoints {
    #[serde(rename = "momento", default, deserialize_with = "lenient_u8")]
    pub moment: u8,
    #[serde(rename = "alumnoId", deserialize_with = "lenient_string")]
    pub student_ref: String,
    #[serde(rename = "puntos", default, deserialize_with = "lenient_f64")]
    pub points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    #[serde(rename = "_id", deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(
        rename = "idU",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub user_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_string"
    )]
    pub cedula: Option<String>,
    #[serde(rename = "nombres", default, skip_serializing_if = "Option::is_none")]
    pub first_names: Option<String>,
    #[serde(rename = "apellidos", default, skip_serializing_if = "Option::is_none")]
    pub last_names: Option<String>,
}

fn default_true() -> bool {
    true
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(scalar_to_string(&v).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(scalar_to_string(&v))
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    })
}

/// `1`, `1.0`, `"1"` and `"1.0"` all name moment 1.
fn moment_number(v: &Value) -> Option<u8> {
    let n = match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<u64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }?;
    u8::try_from(n).ok()
}

fn integral(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0).then_some(f as u64)
}

/// Null means the record belongs to no moment (0).
fn lenient_u8<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    use serde::de::Error;
    let v = Value::deserialize(d)?;
    if v.is_null() {
        return Ok(0);
    }
    moment_number(&v).ok_or_else(|| D::Error::custom(format!("invalid moment number: {}", v)))
}

/// Lock list: unreadable entries are dropped instead of failing the document.
fn lenient_moments<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let v = Value::deserialize(d)?;
    let mut out: Vec<u8> = match &v {
        Value::Array(items) => items.iter().filter_map(moment_number).collect(),
        Value::Null => Vec::new(),
        other => moment_number(other).into_iter().collect(),
    };
    out.retain(|&m| m != 0);
    out.dedup();
    Ok(out)
}

fn active_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match v {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().map(|n| n != 0).unwrap_or(true),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            !(s == "inactivo" || s == "inactive" || s == "false" || s == "0")
        }
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classroom_document_accepts_loose_scalars() {
        let doc = json!({
            "_id": 42,
            "nombre": "",
            "anio": 3,
            "seccion": "B",
            "turno": "Tarde",
            "estado": "inactivo",
            "alumnos": [
                { "_id": "s1", "cedula": 12345678, "materiasAsignadas": null }
            ],
            "asignaciones": [{
                "_id": "as1",
                "materia": { "_id": "m1", "nombre": "Matemática" },
                "actividades": [{
                    "_id": "a1",
                    "momento": "2",
                    "porcentaje": "40",
                    "calificaciones": [{ "alumnoId": 12345678, "nota": "15" }]
                }]
            }]
        });
        let c: Classroom = serde_json::from_value(doc).expect("parse classroom");
        assert_eq!(c.id, "42");
        assert!(!c.active);
        assert_eq!(c.label(), "3 B Tarde");
        assert_eq!(c.enrollments[0].cedula.as_deref(), Some("12345678"));
        assert!(c.enrollments[0].assigned_subjects.is_none());
        let a = &c.assignments[0].activities[0];
        assert_eq!(a.moment, 2);
        assert_eq!(a.weight, 40.0);
        assert_eq!(a.grades[0].student_ref, "12345678");
    }

    #[test]
    fn moment_fields_accept_floats_strings_and_nulls() {
        let a: SubjectAssignment = serde_json::from_value(json!({
            "_id": "as1",
            "materia": { "_id": "m1", "nombre": "Física" },
            "momentosBloqueados": [1.0, "3", null, "x", 2.5],
            "puntosExtras": [{ "momento": "2.0", "alumnoId": "s1", "puntos": 1 }],
            "actividades": [
                { "_id": "a1", "momento": 1.0 },
                { "_id": "a2", "momento": null },
                { "_id": "a3" }
            ]
        }))
        .expect("parse assignment");
        assert_eq!(a.locked_moments, vec![1, 3]);
        assert!(a.is_locked(1) && a.is_locked(3) && !a.is_locked(2));
        assert_eq!(a.bonus_points[0].moment, 2);
        let moments: Vec<u8> = a.activities.iter().map(|x| x.moment).collect();
        assert_eq!(moments, vec![1, 0, 0]);
        assert_eq!(a.activities_in(1).count(), 1);

        let bad = serde_json::from_value::<Activity>(json!({ "_id": "a", "momento": "uno" }));
        assert!(bad.is_err());
    }

    #[test]
    fn missing_estado_defaults_to_active() {
        let c: Classroom =
            serde_json::from_value(json!({ "_id": "c1", "nombre": "1A" })).expect("parse");
        assert!(c.active);
        assert!(c.enrollments.is_empty());
    }

    #[test]
    fn empty_subject_list_is_kept_distinct_from_absent() {
        let e: Enrollment =
            serde_json::from_value(json!({ "_id": "s1", "materiasAsignadas": [] })).expect("parse");
        assert_eq!(e.assigned_subjects, Some(vec![]));
        let ids: Vec<&str> = e.identifiers().collect();
        assert_eq!(ids, vec!["s1"]);
    }
}
