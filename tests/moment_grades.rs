use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_aulad");
    let mut child = Command::new(exe)
        .env_remove("AULAD_WORKSPACE")
        .env_remove("AULAD_DEFAULT_ROLE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn aulad");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn seed(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &PathBuf) {
    request_ok(
        stdin,
        reader,
        "seed-1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "seed-2",
        "students.upsert",
        json!({ "students": [
            { "_id": "prof-1", "idU": "usr-1", "cedula": "V-10000001", "nombres": "Ana María", "apellidos": "Pérez" },
            { "_id": "prof-2", "cedula": "V-10000002", "nombres": "Luis", "apellidos": "Gómez" }
        ]}),
    );
    request_ok(
        stdin,
        reader,
        "seed-3",
        "classrooms.upsert",
        json!({ "classroom": {
            "_id": "aula-3b",
            "nombre": "3er Año B",
            "alumnos": [
                { "_id": "alu-1", "idU": "usr-1", "cedula": "V-10.000.001", "materiasAsignadas": null },
                { "_id": "alu-2", "cedula": "10000002", "materiasAsignadas": ["m-art"] },
                { "id": "alu-3", "cedula": "V-009", "nombre": "Carla", "apellido": "Rojas", "materiasAsignadas": [] }
            ],
            "asignaciones": [
                {
                    "_id": "as-math",
                    "materia": { "_id": "m-math", "nombre": "Matemática" },
                    "profesor": "t-1",
                    "momentosBloqueados": [2],
                    "puntosExtras": [ { "momento": 1, "alumnoId": "prof-1", "puntos": 2 } ],
                    "actividades": [
                        { "_id": "a1", "momento": 1, "porcentaje": 30, "calificaciones": [
                            { "alumnoId": "usr-1", "nota": "15" },
                            { "alumnoId": "alu-3", "nota": "np" } ] },
                        { "_id": "a2", "momento": 1, "porcentaje": "70", "calificaciones": [
                            { "alumnoId": "V-10000001", "nota": 17 },
                            { "alumnoId": "9", "nota": "9" } ] },
                        { "_id": "b1", "momento": 2, "porcentaje": 100, "calificaciones": [
                            { "alumnoId": "alu-1", "nota": 20 } ] },
                        { "_id": "d1", "momento": 3, "porcentaje": 40, "calificaciones": [
                            { "alumnoId": "usr-1", "nota": 10 } ] }
                    ]
                },
                {
                    "_id": "as-art",
                    "materia": { "_id": "m-art", "nombre": "Arte", "cualitativa": true },
                    "actividades": [
                        { "_id": "c1", "momento": 1, "fecha": "2026-03-01", "calificaciones": [
                            { "alumnoId": "alu-2", "nota": "A" },
                            { "alumnoId": "alu-1", "nota": "B" } ] },
                        { "_id": "c2", "momento": 1, "fecha": "2026-04-15", "calificaciones": [
                            { "alumnoId": "alu-2", "nota": "c" } ] },
                        { "_id": "c3", "momento": 1, "calificaciones": [
                            { "alumnoId": "alu-2", "nota": "A" } ] }
                    ]
                }
            ]
        }}),
    );
}

#[test]
fn roster_resolve_matches_profiles_and_restrictions() {
    let workspace = temp_dir("aulad-roster");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);

    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "roster.resolve",
        json!({ "classroomId": "aula-3b" }),
    );
    let students = roster["students"].as_array().expect("students");
    let names: Vec<&str> = students
        .iter()
        .map(|s| s["displayName"].as_str().expect("name"))
        .collect();
    assert_eq!(names, vec!["Rojas, Carla", "Pérez, Ana María", "Gómez, Luis"]);

    assert_eq!(students[0]["profileId"], serde_json::Value::Null);
    assert_eq!(students[0]["hasRestrictions"], false);
    assert_eq!(students[0]["subjects"], json!(["m-math", "m-art"]));
    assert_eq!(students[1]["profileId"], "prof-1");
    assert_eq!(students[2]["profileId"], "prof-2");
    assert_eq!(students[2]["hasRestrictions"], true);
    assert_eq!(students[2]["subjects"], json!(["m-art"]));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn moment_grades_follow_weights_locks_bonus_and_recency() {
    let workspace = temp_dir("aulad-moment-grades");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);

    let m1 = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.momentGrades",
        json!({ "classroomId": "aula-3b", "moment": 1 }),
    );
    assert_eq!(m1["moment"], 1);
    assert_eq!(m1["subjects"][0]["name"], "Matemática");
    let grades: Vec<serde_json::Value> = m1["students"]
        .as_array()
        .expect("students")
        .iter()
        .map(|s| s["grades"].clone())
        .collect();
    // NP counts as 1: 1*0.3 + 9*0.7 = 6.6
    assert_eq!(grades[0], json!([7, null]));
    // 15*0.3 + 17*0.7 = 16.4, plus 2 bonus points
    assert_eq!(grades[1], json!([18, { "letter": "B", "value": 16 }]));
    // Latest dated activity wins; undated ones sort last.
    assert_eq!(grades[2], json!(["NC", { "letter": "C", "value": 12 }]));
    assert_eq!(m1["students"][0]["approved"], json!([false, null]));
    assert_eq!(m1["students"][2]["approved"], json!([null, true]));

    // Locked moment is empty even for the restricted student.
    let m2 = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "calc.momentGrades",
        json!({ "classroomId": "aula-3b", "moment": "2" }),
    );
    for s in m2["students"].as_array().expect("students") {
        assert_eq!(s["grades"], json!([null, null]));
    }

    // Moment 3 uses raw weights: 10 * 40 / 100.
    let m3 = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "calc.momentGrades",
        json!({ "classroomId": "aula-3b", "moment": 3 }),
    );
    assert_eq!(m3["students"][1]["grades"], json!([4, null]));

    // Definitiva renormalizes each moment: mean(18, 10) = 14.
    let fin = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "calc.momentGrades",
        json!({ "classroomId": "aula-3b", "moment": "final" }),
    );
    assert_eq!(fin["moment"], 4);
    assert_eq!(fin["students"][1]["grades"], json!([14, { "letter": "B", "value": 16 }]));
    assert_eq!(fin["students"][2]["grades"][0], "NC");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn student_card_reports_each_moment_and_definitiva() {
    let workspace = temp_dir("aulad-student-card");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    seed(&mut stdin, &mut reader, &workspace);

    let card = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.studentCardModel",
        json!({ "classroomId": "aula-3b", "studentId": "V-10000001" }),
    );
    assert_eq!(card["student"]["displayName"], "Pérez, Ana María");
    let math = &card["subjects"][0];
    assert_eq!(math["subject"]["lockedMoments"], json!([2]));
    assert_eq!(math["moments"], json!([18, null, 4]));
    assert_eq!(math["definitiva"], 14);
    assert_eq!(math["approved"], true);

    drop(stdin);
    let _ = child.wait();
}
