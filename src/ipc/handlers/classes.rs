use crate::ipc::auth::require_tutor;
use crate::ipc::error::{err, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub(crate) struct ClassRow {
    pub id: String,
    pub jumlah_pertemuan: i64,
    pub durasi_pertemuan_menit: i64,
}

pub(crate) fn load_class(conn: &Connection, class_id: &str) -> Result<ClassRow, HandlerErr> {
    conn.query_row(
        "SELECT id, jumlah_pertemuan, durasi_pertemuan_menit FROM classes WHERE id = ?",
        [class_id],
        |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                jumlah_pertemuan: r.get(1)?,
                durasi_pertemuan_menit: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("class not found"))
}

pub(crate) fn student_enrolled(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> Result<bool, HandlerErr> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE class_id = ? AND id = ?",
            (class_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

fn insert_placeholder_meetings(
    conn: &Connection,
    class_id: &str,
    from_idx: i64,
    to_idx: i64,
) -> Result<(), HandlerErr> {
    for idx in from_idx..to_idx {
        conn.execute(
            "INSERT INTO meetings(id, class_id, idx, title) VALUES(?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                class_id,
                idx,
                format!("Pertemuan {}", idx + 1),
            ),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    }
    Ok(())
}

fn classes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let jumlah_pertemuan = params
        .get("jumlahPertemuan")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params("missing jumlahPertemuan"))?;
    if jumlah_pertemuan <= 0 {
        return Err(HandlerErr::bad_params("jumlahPertemuan must be positive"));
    }
    let durasi = params
        .get("durasiPertemuanMenit")
        .and_then(|v| v.as_i64())
        .unwrap_or(90);
    if durasi <= 0 {
        return Err(HandlerErr::bad_params(
            "durasiPertemuanMenit must be positive",
        ));
    }

    let class_id = Uuid::new_v4().to_string();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO classes(id, name, jumlah_pertemuan, durasi_pertemuan_menit) VALUES(?, ?, ?, ?)",
        (&class_id, &name, jumlah_pertemuan, durasi),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    insert_placeholder_meetings(&tx, &class_id, 0, jumlah_pertemuan)?;
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({
        "classId": class_id,
        "name": name,
        "jumlahPertemuan": jumlah_pertemuan,
        "durasiPertemuanMenit": durasi
    }))
}

fn classes_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.jumlah_pertemuan,
           c.durasi_pertemuan_menit,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM tests t WHERE t.class_id = c.id) AS test_count
         FROM classes c
         ORDER BY c.name",
    )?;
    let classes = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let jumlah: i64 = row.get(2)?;
            let durasi: i64 = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let test_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "jumlahPertemuan": jumlah,
                "durasiPertemuanMenit": durasi,
                "studentCount": student_count,
                "testCount": test_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "classes": classes }))
}

/// Re-pad the meetings list when the meeting count changes: placeholders are
/// appended on growth; on shrink the trailing slots and their per-slot state
/// go away with them.
fn classes_set_meeting_count(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    let new_count = params
        .get("jumlahPertemuan")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params("missing jumlahPertemuan"))?;
    if new_count <= 0 {
        return Err(HandlerErr::bad_params("jumlahPertemuan must be positive"));
    }
    let class = load_class(conn, &class_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    if new_count > class.jumlah_pertemuan {
        insert_placeholder_meetings(&tx, &class_id, class.jumlah_pertemuan, new_count)?;
    } else if new_count < class.jumlah_pertemuan {
        tx.execute(
            "DELETE FROM attendance WHERE class_id = ? AND meeting_idx >= ?",
            (&class_id, new_count),
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
        tx.execute(
            "DELETE FROM session_assignments WHERE class_id = ? AND meeting_idx >= ?",
            (&class_id, new_count),
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
        tx.execute(
            "DELETE FROM meetings WHERE class_id = ? AND idx >= ?",
            (&class_id, new_count),
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    }
    tx.execute(
        "UPDATE classes SET jumlah_pertemuan = ? WHERE id = ?",
        (new_count, &class_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "classId": class_id, "jumlahPertemuan": new_count }))
}

fn classes_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    load_class(conn, &class_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    // Explicit dependency order (no ON DELETE CASCADE).
    let steps: &[(&str, &str)] = &[
        (
            "speaking_scores",
            "DELETE FROM speaking_scores WHERE result_id IN (
               SELECT tr.id FROM test_results tr
               JOIN tests t ON t.id = tr.test_id
               WHERE t.class_id = ?)",
        ),
        (
            "test_answers",
            "DELETE FROM test_answers WHERE result_id IN (
               SELECT tr.id FROM test_results tr
               JOIN tests t ON t.id = tr.test_id
               WHERE t.class_id = ?)",
        ),
        (
            "test_results",
            "DELETE FROM test_results WHERE test_id IN (
               SELECT id FROM tests WHERE class_id = ?)",
        ),
        (
            "test_questions",
            "DELETE FROM test_questions WHERE section_id IN (
               SELECT ts.id FROM test_sections ts
               JOIN tests t ON t.id = ts.test_id
               WHERE t.class_id = ?)",
        ),
        (
            "test_sections",
            "DELETE FROM test_sections WHERE test_id IN (
               SELECT id FROM tests WHERE class_id = ?)",
        ),
        ("tests", "DELETE FROM tests WHERE class_id = ?"),
        ("attendance", "DELETE FROM attendance WHERE class_id = ?"),
        (
            "session_assignments",
            "DELETE FROM session_assignments WHERE class_id = ?",
        ),
        ("meetings", "DELETE FROM meetings WHERE class_id = ?"),
        ("students", "DELETE FROM students WHERE class_id = ?"),
        ("classes", "DELETE FROM classes WHERE id = ?"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&class_id]) {
            let _ = tx.rollback();
            return Err(HandlerErr::with_details(
                "db_delete_failed",
                e.to_string(),
                json!({ "table": table }),
            ));
        }
    }
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "ok": true }))
}

fn students_enroll(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    load_class(conn, &class_id)?;

    // External user management owns identity; a pre-existing id may be passed
    // through so results stay joinable with the caller's records.
    let student_id = params
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let next_order: i64 = conn.query_row(
        "SELECT COUNT(*) FROM students WHERE class_id = ?",
        [&class_id],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO students(id, class_id, name, sort_order) VALUES(?, ?, ?, ?)",
        (&student_id, &class_id, &name, next_order),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({ "studentId": student_id, "name": name }))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    let mut stmt = conn.prepare(
        "SELECT id, name, sort_order FROM students WHERE class_id = ? ORDER BY sort_order",
    )?;
    let students = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let sort_order: i64 = row.get(2)?;
            Ok(json!({ "id": id, "name": name, "sortOrder": sort_order }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "students": students }))
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(dispatch(state, req, classes_create)),
        "classes.list" => Some(dispatch(state, req, classes_list)),
        "classes.setMeetingCount" => Some(dispatch(state, req, classes_set_meeting_count)),
        "classes.delete" => Some(dispatch(state, req, classes_delete)),
        "students.enroll" => Some(dispatch(state, req, students_enroll)),
        "students.list" => Some(dispatch(state, req, students_list)),
        _ => None,
    }
}
