use crate::model::Classroom;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Teacher,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "staff" => Some(Role::Staff),
            "teacher" | "profesor" => Some(Role::Teacher),
            _ => None,
        }
    }
}

/// Caller capabilities carried by a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub role: Role,
    #[serde(default)]
    pub teacher_id: Option<String>,
}

impl Claims {
    pub fn with_role(role: Role) -> Self {
        Self {
            role,
            teacher_id: None,
        }
    }

    fn is_privileged(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Staff)
    }

    /// Cross-classroom reports and every write method.
    pub fn can_read_all(&self) -> bool {
        self.is_privileged()
    }

    pub fn can_write(&self) -> bool {
        self.is_privileged()
    }

    /// Teachers see a classroom when they teach at least one subject in it.
    pub fn can_read_classroom(&self, classroom: &Classroom) -> bool {
        if self.is_privileged() {
            return true;
        }
        let Some(me) = self.teacher_id.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return false;
        };
        classroom
            .assignments
            .iter()
            .any(|a| a.teacher_id.as_deref().map(str::trim) == Some(me))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classroom() -> Classroom {
        serde_json::from_value(json!({
            "_id": "c1",
            "asignaciones": [
                { "_id": "a1", "materia": { "_id": "m1" }, "profesor": "t-7" },
                { "_id": "a2", "materia": { "_id": "m2" } }
            ]
        }))
        .expect("classroom")
    }

    #[test]
    fn claims_parse_from_request_shape() {
        let c: Claims =
            serde_json::from_value(json!({ "role": "teacher", "teacherId": "t-7" })).expect("claims");
        assert_eq!(c.role, Role::Teacher);
        assert_eq!(c.teacher_id.as_deref(), Some("t-7"));
        assert!(serde_json::from_value::<Claims>(json!({ "role": "janitor" })).is_err());
    }

    #[test]
    fn teacher_reads_only_own_classrooms() {
        let c = classroom();
        let mine = Claims {
            role: Role::Teacher,
            teacher_id: Some("t-7".to_string()),
        };
        let other = Claims {
            role: Role::Teacher,
            teacher_id: Some("t-8".to_string()),
        };
        assert!(mine.can_read_classroom(&c));
        assert!(!other.can_read_classroom(&c));
        assert!(!Claims::with_role(Role::Teacher).can_read_classroom(&c));
        assert!(!mine.can_read_all());
        assert!(!mine.can_write());
    }

    #[test]
    fn staff_and_admin_read_and_write_everything() {
        for role in [Role::Admin, Role::Staff] {
            let c = Claims::with_role(role);
            assert!(c.can_read_classroom(&classroom()));
            assert!(c.can_read_all());
            assert!(c.can_write());
        }
        assert_eq!(Role::parse(" ADMIN "), Some(Role::Admin));
        assert_eq!(Role::parse("nobody"), None);
    }
}
