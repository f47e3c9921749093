use crate::ipc::auth::require_student;
use crate::ipc::error::{err, get_required_str, ok, HandlerErr};
use crate::ipc::handlers::classes::load_class;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub(crate) const TIPE_PRE_TEST: &str = "Pre-Test";
pub(crate) const TIPE_POST_TEST: &str = "Post-Test";

pub(crate) struct PreTestGate {
    pub required: bool,
    pub taken: bool,
    pub test_id: Option<String>,
}

/// Pre-test gate: when the class has a Pre-Test, meeting content stays locked
/// until a result exists for it. Advisory read; mutating operations re-check.
pub(crate) fn pre_test_gate(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> Result<PreTestGate, HandlerErr> {
    let test_id: Option<String> = conn
        .query_row(
            "SELECT id FROM tests WHERE class_id = ? AND tipe = ?",
            (class_id, TIPE_PRE_TEST),
            |r| r.get(0),
        )
        .optional()?;
    let Some(test_id) = test_id else {
        return Ok(PreTestGate {
            required: false,
            taken: false,
            test_id: None,
        });
    };
    let taken: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM test_results WHERE test_id = ? AND student_id = ?",
            (&test_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(PreTestGate {
        required: true,
        taken: taken.is_some(),
        test_id: Some(test_id),
    })
}

pub(crate) fn attended_count(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> Result<i64, HandlerErr> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance
         WHERE class_id = ? AND student_id = ? AND status = 'Hadir'",
        (class_id, student_id),
        |r| r.get(0),
    )?;
    Ok(n)
}

pub(crate) struct GraduationGate {
    pub layak_post_test: bool,
    pub attended: i64,
    pub total_meetings: i64,
    pub post_test_id: Option<String>,
    pub post_test_taken: bool,
}

pub(crate) fn graduation_gate(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> Result<GraduationGate, HandlerErr> {
    let class = load_class(conn, class_id)?;
    let attended = attended_count(conn, class_id, student_id)?;
    let layak = attended >= class.jumlah_pertemuan;

    let post_test_id: Option<String> = conn
        .query_row(
            "SELECT id FROM tests WHERE class_id = ? AND tipe = ?",
            (class_id, TIPE_POST_TEST),
            |r| r.get(0),
        )
        .optional()?;
    let post_test_taken = match &post_test_id {
        Some(tid) => conn
            .query_row(
                "SELECT 1 FROM test_results WHERE test_id = ? AND student_id = ?",
                (tid, student_id),
                |r| r.get::<_, i64>(0),
            )
            .optional()?
            .is_some(),
        None => false,
    };

    Ok(GraduationGate {
        layak_post_test: layak,
        attended,
        total_meetings: class.jumlah_pertemuan,
        post_test_id,
        post_test_taken,
    })
}

fn eligibility_pre_test(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let caller = require_student(params)?;
    let class_id = get_required_str(params, "classId")?;
    load_class(conn, &class_id)?;
    let gate = pre_test_gate(conn, &class_id, &caller.user_id)?;
    Ok(json!({
        "required": gate.required,
        "taken": gate.taken,
        "testId": gate.test_id
    }))
}

fn eligibility_graduation(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let caller = require_student(params)?;
    let class_id = get_required_str(params, "classId")?;
    let gate = graduation_gate(conn, &class_id, &caller.user_id)?;
    Ok(json!({
        "layakPostTest": gate.layak_post_test,
        "attendedCount": gate.attended,
        "totalMeetings": gate.total_meetings,
        "message": format!("attended {} of {} meetings", gate.attended, gate.total_meetings),
        "postTestId": gate.post_test_id,
        "postTestTaken": gate.post_test_taken,
        "graduated": gate.layak_post_test && gate.post_test_taken
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
        "eligibility.preTest" => Some(dispatch(state, req, eligibility_pre_test)),
        "eligibility.graduation" => Some(dispatch(state, req, eligibility_graduation)),
        _ => None,
    }
}
