use crate::clock;
use crate::ipc::auth::require_student;
use crate::ipc::error::{err, get_required_str, get_required_u64, ok, HandlerErr};
use crate::ipc::handlers::classes::load_class;
use crate::ipc::handlers::eligibility::{graduation_gate, pre_test_gate};
use crate::ipc::handlers::sessions::{load_assignment, STATUS_AKTIF};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub(crate) const STATUS_BELUM_ABSEN: &str = "Belum Absen";
pub(crate) const STATUS_BERLANGSUNG: &str = "Berlangsung";
pub(crate) const STATUS_HADIR: &str = "Hadir";

/// A Berlangsung record whose expiry is older than this is treated as an
/// abandoned countdown and reverted to Belum Absen on the next read.
const STALE_GRACE_HOURS: i64 = 24;

struct AttendanceRow {
    status: String,
    expires_at: Option<String>,
}

fn load_row(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    meeting_idx: i64,
) -> Result<Option<AttendanceRow>, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT status, expires_at FROM attendance
             WHERE class_id = ? AND student_id = ? AND meeting_idx = ?",
            (class_id, student_id, meeting_idx),
            |r| {
                Ok(AttendanceRow {
                    status: r.get(0)?,
                    expires_at: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Effective attendance state after the lazy stale-revert: an abandoned
/// countdown reads as Belum Absen and the row is rewritten to match.
fn effective_row(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    meeting_idx: i64,
) -> Result<Option<AttendanceRow>, HandlerErr> {
    let Some(row) = load_row(conn, class_id, student_id, meeting_idx)? else {
        return Ok(None);
    };
    if row.status != STATUS_BERLANGSUNG {
        return Ok(Some(row));
    }
    let stale = row
        .expires_at
        .as_deref()
        .and_then(clock::parse_rfc3339)
        .map(|expiry| {
            clock::now_utc() > expiry + chrono::Duration::hours(STALE_GRACE_HOURS)
        })
        // An unparsable expiry on an in-progress record is unusable; reset it.
        .unwrap_or(true);
    if !stale {
        return Ok(Some(row));
    }
    conn.execute(
        "UPDATE attendance SET status = ?, expires_at = NULL
         WHERE class_id = ? AND student_id = ? AND meeting_idx = ? AND status = ?",
        (
            STATUS_BELUM_ABSEN,
            class_id,
            student_id,
            meeting_idx,
            STATUS_BERLANGSUNG,
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    Ok(Some(AttendanceRow {
        status: STATUS_BELUM_ABSEN.to_string(),
        expires_at: None,
    }))
}

fn require_meeting_idx(
    params: &serde_json::Value,
    jumlah_pertemuan: i64,
) -> Result<i64, HandlerErr> {
    i64::try_from(get_required_u64(params, "meetingIdx")?)
        .ok()
        .filter(|idx| *idx < jumlah_pertemuan)
        .ok_or_else(|| HandlerErr::not_found("meeting index out of range"))
}

fn attendance_status(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let caller = require_student(params)?;
    let class_id = get_required_str(params, "classId")?;
    let class = load_class(conn, &class_id)?;
    let meeting_idx = require_meeting_idx(params, class.jumlah_pertemuan)?;

    match effective_row(conn, &class_id, &caller.user_id, meeting_idx)? {
        Some(row) => Ok(json!({ "status": row.status, "expiresAt": row.expires_at })),
        None => Ok(json!({ "status": STATUS_BELUM_ABSEN })),
    }
}

/// Start the live-session countdown. Every gate the client also checks is
/// re-validated here: activation, pre-test, and meeting sequencing.
fn attendance_start_countdown(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let caller = require_student(params)?;
    let class_id = get_required_str(params, "classId")?;
    let class = load_class(conn, &class_id)?;
    let meeting_idx = require_meeting_idx(params, class.jumlah_pertemuan)?;

    let gate = pre_test_gate(conn, &class_id, &caller.user_id)?;
    if gate.required && !gate.taken {
        return Err(HandlerErr::with_details(
            "invalid_state",
            "pre-test must be taken before attending meetings",
            json!({ "preTestId": gate.test_id }),
        ));
    }

    if meeting_idx > 0 {
        let prev = effective_row(conn, &class_id, &caller.user_id, meeting_idx - 1)?;
        let prev_hadir = prev.map(|r| r.status == STATUS_HADIR).unwrap_or(false);
        if !prev_hadir {
            return Err(HandlerErr::invalid_state(
                "previous meeting attendance not confirmed",
            ));
        }
    }

    let aktif = load_assignment(conn, &class_id, meeting_idx, &caller.user_id)?
        .map(|a| a.status == STATUS_AKTIF)
        .unwrap_or(false);
    if !aktif {
        return Err(HandlerErr::invalid_state("session is not active"));
    }

    match effective_row(conn, &class_id, &caller.user_id, meeting_idx)? {
        Some(row) if row.status == STATUS_HADIR => {
            return Err(HandlerErr::new(
                "already_attended",
                "attendance already confirmed for this meeting",
            ));
        }
        Some(row) if row.status == STATUS_BERLANGSUNG => {
            return Err(HandlerErr::with_details(
                "already_in_progress",
                "a countdown is already running",
                json!({ "expiresAt": row.expires_at }),
            ));
        }
        _ => {}
    }

    let expires_at = clock::to_rfc3339(clock::plus_minutes(
        clock::now_utc(),
        class.durasi_pertemuan_menit,
    ));
    conn.execute(
        "INSERT INTO attendance(class_id, student_id, meeting_idx, status, expires_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(class_id, student_id, meeting_idx) DO UPDATE SET
           status = excluded.status,
           expires_at = excluded.expires_at",
        (
            &class_id,
            &caller.user_id,
            meeting_idx,
            STATUS_BERLANGSUNG,
            &expires_at,
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    Ok(json!({ "status": STATUS_BERLANGSUNG, "expiresAt": expires_at }))
}

/// Confirm attendance once the persisted countdown has elapsed. The stored
/// expiry is authoritative; client timers are advisory. Confirming an
/// already-Hadir record is a no-op success so retries stay harmless.
fn attendance_confirm(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let caller = require_student(params)?;
    let class_id = get_required_str(params, "classId")?;
    let class = load_class(conn, &class_id)?;
    let meeting_idx = require_meeting_idx(params, class.jumlah_pertemuan)?;

    // The stale-revert applies here too: an abandoned countdown must not be
    // confirmable just because confirm was called before any status read.
    let Some(row) = effective_row(conn, &class_id, &caller.user_id, meeting_idx)? else {
        return Err(HandlerErr::invalid_state("no countdown was started"));
    };

    if row.status == STATUS_HADIR {
        let gate = graduation_gate(conn, &class_id, &caller.user_id)?;
        return Ok(json!({
            "status": STATUS_HADIR,
            "alreadyConfirmed": true,
            "attendedCount": gate.attended,
            "layakPostTest": gate.layak_post_test
        }));
    }
    if row.status != STATUS_BERLANGSUNG {
        return Err(HandlerErr::invalid_state("no countdown was started"));
    }

    let expiry = row
        .expires_at
        .as_deref()
        .and_then(clock::parse_rfc3339)
        .ok_or_else(|| HandlerErr::invalid_state("countdown expiry is unreadable"))?;
    let now = clock::now_utc();
    if now < expiry {
        return Err(HandlerErr::with_details(
            "invalid_state",
            "countdown has not elapsed yet",
            json!({ "expiresAt": row.expires_at }),
        ));
    }

    // Guarded transition: under a concurrent double-click the second UPDATE
    // matches zero rows and the record is already Hadir.
    conn.execute(
        "UPDATE attendance SET status = ?, confirmed_at = ?
         WHERE class_id = ? AND student_id = ? AND meeting_idx = ? AND status = ?",
        (
            STATUS_HADIR,
            clock::to_rfc3339(now),
            &class_id,
            &caller.user_id,
            meeting_idx,
            STATUS_BERLANGSUNG,
        ),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    // Confirmation re-evaluates the gates for the next meeting and for
    // graduation; the fresh projection rides along in the response.
    let gate = graduation_gate(conn, &class_id, &caller.user_id)?;
    Ok(json!({
        "status": STATUS_HADIR,
        "alreadyConfirmed": false,
        "attendedCount": gate.attended,
        "layakPostTest": gate.layak_post_test
    }))
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
        "attendance.status" => Some(dispatch(state, req, attendance_status)),
        "attendance.startCountdown" => Some(dispatch(state, req, attendance_start_countdown)),
        "attendance.confirm" => Some(dispatch(state, req, attendance_confirm)),
        _ => None,
    }
}
