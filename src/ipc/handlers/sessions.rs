use crate::ipc::auth::{require_student, require_tutor};
use crate::ipc::error::{err, get_required_str, get_required_u64, ok, HandlerErr};
use crate::ipc::handlers::classes::{load_class, student_enrolled};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub(crate) const STATUS_NONAKTIF: &str = "Nonaktif";
pub(crate) const STATUS_AKTIF: &str = "Aktif";
/// Reported when no assignment row exists; never persisted.
pub(crate) const STATUS_BELUM_DITUGASKAN: &str = "BelumDitugaskan";

pub(crate) struct AssignmentRow {
    pub id: String,
    pub status: String,
    pub scheduled_at: Option<String>,
}

pub(crate) fn load_assignment(
    conn: &Connection,
    class_id: &str,
    meeting_idx: i64,
    student_id: &str,
) -> Result<Option<AssignmentRow>, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT id, status, scheduled_at FROM session_assignments
             WHERE class_id = ? AND meeting_idx = ? AND student_id = ?",
            (class_id, meeting_idx, student_id),
            |r| {
                Ok(AssignmentRow {
                    id: r.get(0)?,
                    status: r.get(1)?,
                    scheduled_at: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn require_meeting_idx(
    conn: &Connection,
    params: &serde_json::Value,
    class_id: &str,
) -> Result<i64, HandlerErr> {
    let class = load_class(conn, class_id)?;
    i64::try_from(get_required_u64(params, "meetingIdx")?)
        .ok()
        .filter(|idx| *idx < class.jumlah_pertemuan)
        .ok_or_else(|| HandlerErr::not_found("meeting index out of range"))
}

fn session_assign(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    let student_id = get_required_str(params, "studentId")?;
    let scheduled_at = get_required_str(params, "scheduledAt")?;
    let meeting_idx = require_meeting_idx(conn, params, &class_id)?;
    if !student_enrolled(conn, &class_id, &student_id)? {
        return Err(HandlerErr::not_found("student not enrolled in class"));
    }
    if load_assignment(conn, &class_id, meeting_idx, &student_id)?.is_some() {
        return Err(HandlerErr::conflict(
            "assignment already exists for this meeting and student",
        ));
    }

    let assignment_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO session_assignments(id, class_id, meeting_idx, student_id, scheduled_at, status)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &assignment_id,
            &class_id,
            meeting_idx,
            &student_id,
            &scheduled_at,
            STATUS_NONAKTIF,
        ),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    Ok(json!({
        "assignmentId": assignment_id,
        "status": STATUS_NONAKTIF,
        "scheduledAt": scheduled_at
    }))
}

fn session_toggle(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    let student_id = get_required_str(params, "studentId")?;
    let meeting_idx = require_meeting_idx(conn, params, &class_id)?;

    let Some(assignment) = load_assignment(conn, &class_id, meeting_idx, &student_id)? else {
        return Err(HandlerErr::not_found("no assignment for this meeting and student"));
    };
    let next = if assignment.status == STATUS_AKTIF {
        STATUS_NONAKTIF
    } else {
        STATUS_AKTIF
    };
    conn.execute(
        "UPDATE session_assignments SET status = ? WHERE id = ?",
        (next, &assignment.id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    Ok(json!({ "assignmentId": assignment.id, "status": next }))
}

fn session_unassign(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    let student_id = get_required_str(params, "studentId")?;
    let meeting_idx = require_meeting_idx(conn, params, &class_id)?;

    let changed = conn
        .execute(
            "DELETE FROM session_assignments
             WHERE class_id = ? AND meeting_idx = ? AND student_id = ?",
            (&class_id, meeting_idx, &student_id),
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("no assignment for this meeting and student"));
    }
    Ok(json!({ "ok": true }))
}

/// Status projection for the student-facing meeting view. A missing row is a
/// status in its own right, not an error.
fn session_status(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let caller = require_student(params)?;
    let class_id = get_required_str(params, "classId")?;
    let meeting_idx = require_meeting_idx(conn, params, &class_id)?;

    match load_assignment(conn, &class_id, meeting_idx, &caller.user_id)? {
        Some(a) => Ok(json!({
            "status": a.status,
            "assignmentId": a.id,
            "scheduledAt": a.scheduled_at
        })),
        None => Ok(json!({ "status": STATUS_BELUM_DITUGASKAN })),
    }
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
        "session.assign" => Some(dispatch(state, req, session_assign)),
        "session.toggle" => Some(dispatch(state, req, session_toggle)),
        "session.unassign" => Some(dispatch(state, req, session_unassign)),
        "session.status" => Some(dispatch(state, req, session_status)),
        _ => None,
    }
}
