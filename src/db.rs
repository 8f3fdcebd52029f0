use crate::model::{Classroom, StudentProfile};
use crate::roster::national_id_digits;
use anyhow::Context;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

pub const DB_FILE_NAME: &str = "aulad.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            active INTEGER NOT NULL,
            doc TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classrooms_active ON classrooms(active)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_profiles(
            id TEXT PRIMARY KEY,
            id_u TEXT,
            cedula TEXT,
            cedula_digits TEXT,
            doc TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before national-id lookups have no digits column.
    if !table_has_column(conn, "student_profiles", "cedula_digits")? {
        conn.execute(
            "ALTER TABLE student_profiles ADD COLUMN cedula_digits TEXT",
            [],
        )?;
    }
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_profiles_id_u ON student_profiles(id_u)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_profiles_cedula ON student_profiles(cedula_digits)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is not JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        params![key, serde_json::to_string(value)?],
    )?;
    Ok(())
}

fn parse_classroom(id: &str, doc: &str) -> anyhow::Result<Classroom> {
    serde_json::from_str(doc).with_context(|| format!("classroom {} has a malformed document", id))
}

pub fn classroom_get(conn: &Connection, id: &str) -> anyhow::Result<Option<Classroom>> {
    let doc: Option<String> = conn
        .query_row("SELECT doc FROM classrooms WHERE id = ?", [id], |r| r.get(0))
        .optional()?;
    doc.map(|d| parse_classroom(id, &d)).transpose()
}

fn classrooms_where(conn: &Connection, filter: &str) -> anyhow::Result<Vec<Classroom>> {
    let sql = format!("SELECT id, doc FROM classrooms {} ORDER BY name, id", filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    rows.iter().map(|(id, doc)| parse_classroom(id, doc)).collect()
}

pub fn classrooms_all(conn: &Connection) -> anyhow::Result<Vec<Classroom>> {
    classrooms_where(conn, "")
}

pub fn classrooms_active(conn: &Connection) -> anyhow::Result<Vec<Classroom>> {
    classrooms_where(conn, "WHERE active = 1")
}

pub fn classroom_upsert(conn: &Connection, classroom: &Classroom) -> anyhow::Result<()> {
    let doc = serde_json::to_string(classroom)?;
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO classrooms(id, name, active, doc, updated_at) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            active = excluded.active,
            doc = excluded.doc,
            updated_at = excluded.updated_at",
        params![
            classroom.id,
            classroom.label(),
            classroom.active as i64,
            doc,
            now
        ],
    )?;
    Ok(())
}

/// Returns false when the classroom does not exist.
pub fn classroom_set_active(conn: &Connection, id: &str, active: bool) -> anyhow::Result<bool> {
    let Some(mut classroom) = classroom_get(conn, id)? else {
        return Ok(false);
    };
    classroom.active = active;
    classroom_upsert(conn, &classroom)?;
    Ok(true)
}

pub fn classroom_delete(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute("DELETE FROM classrooms WHERE id = ?", [id])?;
    Ok(n > 0)
}

pub fn student_profiles_upsert(
    conn: &mut Connection,
    profiles: &[StudentProfile],
) -> anyhow::Result<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO student_profiles(id, id_u, cedula, cedula_digits, doc) VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                id_u = excluded.id_u,
                cedula = excluded.cedula,
                cedula_digits = excluded.cedula_digits,
                doc = excluded.doc",
        )?;
        for p in profiles {
            let digits = p.cedula.as_deref().and_then(national_id_digits);
            stmt.execute(params![
                p.id,
                p.user_id,
                p.cedula,
                digits,
                serde_json::to_string(p)?
            ])?;
        }
    }
    tx.commit()?;
    Ok(profiles.len())
}

fn collect_profiles(
    conn: &Connection,
    sql: &str,
    args: &[String],
) -> anyhow::Result<Vec<StudentProfile>> {
    let mut stmt = conn.prepare(sql)?;
    let docs = stmt
        .query_map(params_from_iter(args.iter()), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    docs.iter()
        .map(|d| serde_json::from_str(d).context("student profile has a malformed document"))
        .collect()
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

/// Profiles whose `_id`/`idU` is in `ids` or whose national id digits are in
/// `cedula_digits`.
pub fn student_profiles_fetch(
    conn: &Connection,
    ids: &[String],
    cedula_digits: &[String],
) -> anyhow::Result<Vec<StudentProfile>> {
    if ids.is_empty() && cedula_digits.is_empty() {
        return Ok(Vec::new());
    }
    let mut clauses = Vec::new();
    let mut args: Vec<String> = Vec::new();
    if !ids.is_empty() {
        let ph = placeholders(ids.len());
        clauses.push(format!("id IN ({ph}) OR id_u IN ({ph})"));
        args.extend(ids.iter().cloned());
        args.extend(ids.iter().cloned());
    }
    if !cedula_digits.is_empty() {
        clauses.push(format!(
            "cedula_digits IN ({})",
            placeholders(cedula_digits.len())
        ));
        args.extend(cedula_digits.iter().cloned());
    }
    let sql = format!(
        "SELECT doc FROM student_profiles WHERE {} ORDER BY id",
        clauses.join(" OR ")
    );
    collect_profiles(conn, &sql, &args)
}

pub fn student_profiles_list(conn: &Connection) -> anyhow::Result<Vec<StudentProfile>> {
    collect_profiles(conn, "SELECT doc FROM student_profiles ORDER BY id", &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        conn
    }

    fn classroom(id: &str, name: &str, estado: bool) -> Classroom {
        serde_json::from_value(json!({ "_id": id, "nombre": name, "estado": estado }))
            .expect("classroom")
    }

    fn profile(id: &str, id_u: Option<&str>, cedula: &str) -> StudentProfile {
        serde_json::from_value(json!({ "_id": id, "idU": id_u, "cedula": cedula }))
            .expect("profile")
    }

    #[test]
    fn settings_round_trip_and_overwrite() {
        let conn = memory_db();
        assert!(settings_get_json(&conn, "setup.reports").expect("get").is_none());
        settings_set_json(&conn, "setup.reports", &json!({ "landscape": false })).expect("set");
        settings_set_json(&conn, "setup.reports", &json!({ "landscape": true })).expect("set");
        assert_eq!(
            settings_get_json(&conn, "setup.reports").expect("get"),
            Some(json!({ "landscape": true }))
        );
    }

    #[test]
    fn classroom_active_filter_and_delete() {
        let conn = memory_db();
        classroom_upsert(&conn, &classroom("c1", "1A", true)).expect("upsert");
        classroom_upsert(&conn, &classroom("c2", "1B", false)).expect("upsert");
        assert_eq!(classrooms_all(&conn).expect("all").len(), 2);
        let active: Vec<String> = classrooms_active(&conn)
            .expect("active")
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(active, vec!["c1".to_string()]);

        assert!(classroom_set_active(&conn, "c2", true).expect("toggle"));
        assert!(!classroom_set_active(&conn, "missing", true).expect("toggle"));
        assert_eq!(classrooms_active(&conn).expect("active").len(), 2);

        assert!(classroom_delete(&conn, "c1").expect("delete"));
        assert!(!classroom_delete(&conn, "c1").expect("delete"));
        assert!(classroom_get(&conn, "c1").expect("get").is_none());
    }

    #[test]
    fn profiles_are_found_by_id_id_u_or_cedula_digits() {
        let mut conn = memory_db();
        student_profiles_upsert(
            &mut conn,
            &[
                profile("p1", Some("u1"), "V-12.345.678"),
                profile("p2", None, "9999"),
                profile("p3", None, "E-555"),
            ],
        )
        .expect("upsert");

        let by_id_u = student_profiles_fetch(&conn, &["u1".to_string()], &[]).expect("fetch");
        assert_eq!(by_id_u.len(), 1);
        assert_eq!(by_id_u[0].id, "p1");

        let by_cedula =
            student_profiles_fetch(&conn, &["p2".to_string()], &["555".to_string()])
                .expect("fetch");
        let ids: Vec<&str> = by_cedula.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p3"]);

        assert!(student_profiles_fetch(&conn, &[], &[]).expect("fetch").is_empty());
        assert_eq!(student_profiles_list(&conn).expect("list").len(), 3);
    }
}
