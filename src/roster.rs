use crate::model::{Classroom, Enrollment, StudentProfile, SubjectAssignment};
use serde::Serialize;
use std::cmp::Ordering;

/// Digits of a national-id-like string with leading zeros removed.
///
/// National ids show up as `12345678`, `V-12.345.678` or `0012345678`. A value
/// qualifies when it holds digits and separators only, optionally after one
/// nationality letter (`V`, `E`, `J`, `P`, `G`). The letter must be followed
/// by a separator or by at least [`MIN_PREFIXED_DIGITS`] digits, so short
/// document ids such as `s1` or `a1` and hex ids such as `64f1a2b3c4` only
/// ever compare exactly.
pub fn national_id_digits(raw: &str) -> Option<String> {
    let t = raw.trim();
    let (prefixed, body) = match t.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {
            if !matches!(c.to_ascii_uppercase(), 'V' | 'E' | 'J' | 'P' | 'G') {
                return None;
            }
            (true, &t[1..])
        }
        _ => (false, t),
    };
    let mut digits = String::with_capacity(body.len());
    for ch in body.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if !matches!(ch, '-' | '.' | ' ' | '_') {
            return None;
        }
    }
    if digits.is_empty() {
        return None;
    }
    let separated = body.starts_with(|c: char| !c.is_ascii_digit());
    if prefixed && !separated && digits.len() < MIN_PREFIXED_DIGITS {
        return None;
    }
    let stripped = digits.trim_start_matches('0');
    Some(if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    })
}

/// Digits required right after a nationality letter with no separator.
pub const MIN_PREFIXED_DIGITS: usize = 5;

/// Exact match on trimmed strings, or equal national-id digits.
pub fn ids_equal(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    match (national_id_digits(a), national_id_digits(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Every key a grade or bonus record may use to refer to one student.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StudentIdentity {
    keys: Vec<String>,
}

impl StudentIdentity {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for k in keys {
            let k = k.as_ref().trim();
            if !k.is_empty() && !out.iter().any(|e| e == k) {
                out.push(k.to_string());
            }
        }
        Self { keys: out }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.keys.iter().any(|k| ids_equal(k, candidate))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub identity: StudentIdentity,
    pub profile_id: Option<String>,
    pub cedula: String,
    pub display_name: String,
    pub has_restrictions: bool,
    /// Subject ids that apply. Restricted students get exactly their list;
    /// unrestricted students get every subject of the classroom.
    pub subjects: Vec<String>,
}

impl RosterEntry {
    pub fn applies_to(&self, assignment: &SubjectAssignment) -> bool {
        if !self.has_restrictions {
            return true;
        }
        self.subjects
            .iter()
            .any(|s| s == &assignment.subject.id || s == &assignment.id)
    }

    /// True when `key` names this student under any identifier scheme.
    pub fn is_addressed_by(&self, key: &str) -> bool {
        self.identity.matches(key)
    }
}

fn find_profile<'a>(e: &Enrollment, profiles: &'a [StudentProfile]) -> Option<&'a StudentProfile> {
    let internal: Vec<&str> = [&e.doc_id, &e.id, &e.user_id]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    let by_internal = profiles.iter().find(|p| {
        internal.iter().any(|k| {
            p.id.trim() == *k || p.user_id.as_deref().map(str::trim) == Some(*k)
        })
    });
    if by_internal.is_some() {
        return by_internal;
    }
    let cedula = e.cedula.as_deref()?;
    profiles.iter().find(|p| {
        p.cedula
            .as_deref()
            .map(|c| ids_equal(c, cedula))
            .unwrap_or(false)
    })
}

fn display_name(e: &Enrollment, profile: Option<&StudentProfile>) -> String {
    let join = |last: Option<&str>, first: Option<&str>| -> Option<String> {
        let last = last.map(str::trim).filter(|s| !s.is_empty());
        let first = first.map(str::trim).filter(|s| !s.is_empty());
        match (last, first) {
            (Some(l), Some(f)) => Some(format!("{}, {}", l, f)),
            (Some(l), None) => Some(l.to_string()),
            (None, Some(f)) => Some(f.to_string()),
            (None, None) => None,
        }
    };
    profile
        .and_then(|p| join(p.last_names.as_deref(), p.first_names.as_deref()))
        .or_else(|| join(e.last_name.as_deref(), e.first_name.as_deref()))
        .or_else(|| e.identifiers().next().map(str::to_string))
        .unwrap_or_default()
}

pub fn resolve_enrollment(
    classroom: &Classroom,
    e: &Enrollment,
    profiles: &[StudentProfile],
) -> RosterEntry {
    let profile = find_profile(e, profiles);

    let mut keys: Vec<&str> = e.identifiers().collect();
    if let Some(p) = profile {
        keys.push(p.id.as_str());
        if let Some(u) = p.user_id.as_deref() {
            keys.push(u);
        }
        if let Some(c) = p.cedula.as_deref() {
            keys.push(c);
        }
    }

    let (has_restrictions, subjects) = match e.assigned_subjects.as_deref() {
        Some(list) if !list.is_empty() => (true, list.to_vec()),
        _ => (
            false,
            classroom
                .assignments
                .iter()
                .map(|a| a.subject.id.clone())
                .collect(),
        ),
    };

    let cedula = profile
        .and_then(|p| p.cedula.clone())
        .or_else(|| e.cedula.clone())
        .unwrap_or_default()
        .trim()
        .to_string();

    RosterEntry {
        identity: StudentIdentity::new(keys),
        profile_id: profile.map(|p| p.id.clone()),
        cedula,
        display_name: display_name(e, profile),
        has_restrictions,
        subjects,
    }
}

/// Roster of a classroom sorted by national id.
pub fn resolve_roster(classroom: &Classroom, profiles: &[StudentProfile]) -> Vec<RosterEntry> {
    let mut out: Vec<RosterEntry> = classroom
        .enrollments
        .iter()
        .map(|e| resolve_enrollment(classroom, e, profiles))
        .collect();
    out.sort_by(|a, b| {
        natural_cmp(&a.cedula, &b.cedula).then_with(|| natural_cmp(&a.display_name, &b.display_name))
    });
    out
}

/// Keys to fetch candidate profiles with: internal ids and national ids.
pub fn profile_lookup_keys(classroom: &Classroom) -> (Vec<String>, Vec<String>) {
    let mut ids = Vec::new();
    let mut cedulas = Vec::new();
    for e in &classroom.enrollments {
        for v in [&e.doc_id, &e.id, &e.user_id].into_iter().flatten() {
            let v = v.trim();
            if !v.is_empty() {
                ids.push(v.to_string());
            }
        }
        if let Some(c) = e.cedula.as_deref().and_then(national_id_digits) {
            cedulas.push(c);
        }
    }
    ids.sort();
    ids.dedup();
    cedulas.sort();
    cedulas.dedup();
    (ids, cedulas)
}

/// Locale-style comparison with numeric collation: digit runs compare by value,
/// everything else case-insensitively.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a: Vec<char> = a.trim().chars().collect();
    let b: Vec<char> = b.trim().chars().collect();
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let si = i;
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            let sj = j;
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            let ra: String = a[si..i].iter().collect();
            let rb: String = b[sj..j].iter().collect();
            let na = ra.trim_start_matches('0');
            let nb = rb.trim_start_matches('0');
            let ord = na
                .len()
                .cmp(&nb.len())
                .then_with(|| na.cmp(nb))
                .then_with(|| ra.len().cmp(&rb.len()));
            if ord != Ordering::Equal {
                return ord;
            }
            continue;
        }
        let ca = a[i].to_lowercase().next().unwrap_or(a[i]);
        let cb = b[j].to_lowercase().next().unwrap_or(b[j]);
        let ord = ca.cmp(&cb);
        if ord != Ordering::Equal {
            return ord;
        }
        i += 1;
        j += 1;
    }
    (a.len() - i).cmp(&(b.len() - j))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classroom(alumnos: serde_json::Value) -> Classroom {
        serde_json::from_value(json!({
            "_id": "c1",
            "nombre": "1A",
            "alumnos": alumnos,
            "asignaciones": [
                { "_id": "as-x", "materia": { "_id": "X", "nombre": "Castellano" } },
                { "_id": "as-y", "materia": { "_id": "Y", "nombre": "Inglés" } }
            ]
        }))
        .expect("classroom")
    }

    #[test]
    fn absent_null_and_empty_lists_are_unrestricted() {
        let c = classroom(json!([
            { "_id": "s1", "cedula": "1" },
            { "_id": "s2", "cedula": "2", "materiasAsignadas": null },
            { "_id": "s3", "cedula": "3", "materiasAsignadas": [] }
        ]));
        let roster = resolve_roster(&c, &[]);
        for r in &roster {
            assert!(!r.has_restrictions, "{} should be unrestricted", r.cedula);
            assert_eq!(r.subjects, vec!["X".to_string(), "Y".to_string()]);
            assert!(r.applies_to(&c.assignments[0]));
            assert!(r.applies_to(&c.assignments[1]));
        }
    }

    #[test]
    fn non_empty_list_restricts_to_exactly_those_ids() {
        let c = classroom(json!([{ "_id": "s1", "cedula": "1", "materiasAsignadas": ["X"] }]));
        let roster = resolve_roster(&c, &[]);
        assert!(roster[0].has_restrictions);
        assert_eq!(roster[0].subjects, vec!["X".to_string()]);
        assert!(roster[0].applies_to(&c.assignments[0]));
        assert!(!roster[0].applies_to(&c.assignments[1]));
    }

    #[test]
    fn restriction_list_may_name_the_assignment_id() {
        let c = classroom(json!([{ "_id": "s1", "materiasAsignadas": ["as-y"] }]));
        let roster = resolve_roster(&c, &[]);
        assert!(!roster[0].applies_to(&c.assignments[0]));
        assert!(roster[0].applies_to(&c.assignments[1]));
    }

    #[test]
    fn profile_match_prefers_internal_id_over_cedula() {
        let c = classroom(json!([{ "_id": "p2", "cedula": "V-11.222.333" }]));
        let profiles: Vec<StudentProfile> = serde_json::from_value(json!([
            { "_id": "p1", "cedula": "11222333", "nombres": "Ana", "apellidos": "Pérez" },
            { "_id": "p2", "cedula": "99", "nombres": "Luis", "apellidos": "Díaz" }
        ]))
        .expect("profiles");
        let roster = resolve_roster(&c, &profiles);
        assert_eq!(roster[0].profile_id.as_deref(), Some("p2"));
        assert_eq!(roster[0].display_name, "Díaz, Luis");
    }

    #[test]
    fn profile_falls_back_to_normalized_cedula() {
        let c = classroom(json!([{ "idU": "legacy-7", "cedula": "V-011.222.333" }]));
        let profiles: Vec<StudentProfile> = serde_json::from_value(json!([
            { "_id": "p1", "cedula": "11222333", "nombres": "Ana", "apellidos": "Pérez" }
        ]))
        .expect("profiles");
        let roster = resolve_roster(&c, &profiles);
        assert_eq!(roster[0].profile_id.as_deref(), Some("p1"));
        assert_eq!(roster[0].cedula, "11222333");
        assert!(roster[0].is_addressed_by("legacy-7"));
        assert!(roster[0].is_addressed_by("p1"));
        assert!(roster[0].is_addressed_by("0011222333"));
    }

    #[test]
    fn student_without_profile_keeps_enrollment_name() {
        let c = classroom(json!([{ "id": "9", "nombre": "Eva", "apellido": "Rojas" }]));
        let roster = resolve_roster(&c, &[]);
        assert_eq!(roster[0].profile_id, None);
        assert_eq!(roster[0].display_name, "Rojas, Eva");
    }

    #[test]
    fn document_ids_never_collapse_to_digits() {
        assert!(national_id_digits("64f1a2b3c4").is_none());
        assert!(!ids_equal("64f1a2b3c4", "6412340"));
        assert!(ids_equal("V-12.345.678", "012345678"));
        assert!(ids_equal("E12345", "12345"));
        assert!(!ids_equal("", ""));
    }

    #[test]
    fn short_document_ids_stay_distinct() {
        assert!(national_id_digits("a1").is_none());
        assert!(national_id_digits("s1").is_none());
        assert!(national_id_digits("p1").is_none());
        assert!(!ids_equal("a1", "b1"));
        assert!(!ids_equal("s1", "1"));
        assert!(ids_equal("V-9", "9"));
        assert!(ids_equal("v 0042", "42"));
        assert_eq!(national_id_digits("j-30111222").as_deref(), Some("30111222"));
    }

    #[test]
    fn natural_order_compares_digit_runs_by_value() {
        let mut v = vec!["V-10", "v-9", "100", "20", "V-9a"];
        v.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(v, vec!["20", "100", "v-9", "V-9a", "V-10"]);
    }

    #[test]
    fn lookup_keys_cover_internal_and_national_ids() {
        let c = classroom(json!([
            { "_id": "a", "id": "b", "idU": "c", "cedula": "V-0042" },
            { "_id": "a" }
        ]));
        let (ids, cedulas) = profile_lookup_keys(&c);
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(cedulas, vec!["42"]);
    }
}
