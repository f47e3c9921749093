use crate::ipc::auth::{require_student, require_tutor};
use crate::ipc::error::{err, get_optional_str, get_required_str, get_required_u64, ok, HandlerErr};
use crate::ipc::handlers::classes::load_class;
use crate::ipc::handlers::eligibility::pre_test_gate;
use crate::ipc::handlers::sessions::{load_assignment, STATUS_AKTIF, STATUS_BELUM_DITUGASKAN};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn materi_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    load_class(conn, &class_id)?;

    let mut stmt = conn.prepare(
        "SELECT id, idx, title, description, video_url, meet_url, pdf_url
         FROM meetings WHERE class_id = ? ORDER BY idx",
    )?;
    let meetings = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let idx: i64 = row.get(1)?;
            let title: String = row.get(2)?;
            let description: Option<String> = row.get(3)?;
            let video_url: Option<String> = row.get(4)?;
            let meet_url: Option<String> = row.get(5)?;
            let pdf_url: Option<String> = row.get(6)?;
            Ok(json!({
                "id": id,
                "idx": idx,
                "title": title,
                "description": description,
                "videoUrl": video_url,
                "meetUrl": meet_url,
                "pdfUrl": pdf_url
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "meetings": meetings }))
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

fn materi_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    let class = load_class(conn, &class_id)?;
    let idx = require_meeting_idx(params, class.jumlah_pertemuan)?;

    let title = get_required_str(params, "title")?.trim().to_string();
    if title.is_empty() {
        return Err(HandlerErr::bad_params("title must not be empty"));
    }
    let description = get_optional_str(params, "description");
    let video_url = get_optional_str(params, "videoUrl");
    let meet_url = get_optional_str(params, "meetUrl");
    let pdf_url = get_optional_str(params, "pdfUrl");

    let changed = conn
        .execute(
            "UPDATE meetings
             SET title = ?, description = ?, video_url = ?, meet_url = ?, pdf_url = ?
             WHERE class_id = ? AND idx = ?",
            (
                &title,
                &description,
                &video_url,
                &meet_url,
                &pdf_url,
                &class_id,
                idx,
            ),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("meeting not found"));
    }
    Ok(json!({ "ok": true }))
}

/// Student view of one meeting. The pre-test gate decides whether the meeting
/// may be opened at all; the activation status decides whether the material
/// links are live. Links are withheld, not blanked, when the session is not
/// active.
fn materi_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let caller = require_student(params)?;
    let class_id = get_required_str(params, "classId")?;
    let class = load_class(conn, &class_id)?;
    let idx = require_meeting_idx(params, class.jumlah_pertemuan)?;

    let gate = pre_test_gate(conn, &class_id, &caller.user_id)?;
    if gate.required && !gate.taken {
        return Err(HandlerErr::with_details(
            "invalid_state",
            "pre-test must be taken before viewing meeting content",
            json!({ "preTestId": gate.test_id }),
        ));
    }

    let meeting = conn
        .query_row(
            "SELECT id, title, description, video_url, meet_url, pdf_url
             FROM meetings WHERE class_id = ? AND idx = ?",
            (&class_id, idx),
            |row| {
                let id: String = row.get(0)?;
                let title: String = row.get(1)?;
                let description: Option<String> = row.get(2)?;
                let video_url: Option<String> = row.get(3)?;
                let meet_url: Option<String> = row.get(4)?;
                let pdf_url: Option<String> = row.get(5)?;
                Ok((id, title, description, video_url, meet_url, pdf_url))
            },
        )
        .optional()?
        .ok_or_else(|| HandlerErr::not_found("meeting not found"))?;

    let (id, title, description, video_url, meet_url, pdf_url) = meeting;
    let session = load_assignment(conn, &class_id, idx, &caller.user_id)?;
    let session_status = session
        .as_ref()
        .map(|a| a.status.clone())
        .unwrap_or_else(|| STATUS_BELUM_DITUGASKAN.to_string());
    let live = session_status == STATUS_AKTIF;

    let mut out = json!({
        "id": id,
        "idx": idx,
        "title": title,
        "description": description,
        "sessionStatus": session_status,
        "materialsLive": live
    });
    if live {
        out["videoUrl"] = json!(video_url);
        out["meetUrl"] = json!(meet_url);
        out["pdfUrl"] = json!(pdf_url);
    }
    Ok(out)
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
        "materi.list" => Some(dispatch(state, req, materi_list)),
        "materi.update" => Some(dispatch(state, req, materi_update)),
        "materi.open" => Some(dispatch(state, req, materi_open)),
        _ => None,
    }
}
