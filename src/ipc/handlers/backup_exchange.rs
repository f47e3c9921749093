use crate::backup;
use crate::ipc::auth::require_tutor;
use crate::ipc::error::{err, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let checked = (|| -> Result<(PathBuf, PathBuf), HandlerErr> {
        require_tutor(&req.params)?;
        let workspace = state
            .workspace
            .clone()
            .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
        let out_path = PathBuf::from(get_required_str(&req.params, "outPath")?);
        Ok((workspace, out_path))
    })();
    let (workspace, out_path) = match checked {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "outPath": out_path.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "dbSha256": summary.db_sha256
            }),
        ),
        Err(e) => err(&req.id, "conflict", format!("{e:?}"), None),
    }
}

/// Replaces the workspace database with the one inside the bundle, then
/// reopens the connection so the next request sees the imported data.
fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let checked = (|| -> Result<(PathBuf, PathBuf), HandlerErr> {
        require_tutor(&req.params)?;
        let workspace = state
            .workspace
            .clone()
            .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
        let in_path = PathBuf::from(get_required_str(&req.params, "inPath")?);
        Ok((workspace, in_path))
    })();
    let (workspace, in_path) = match checked {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Drop the open connection before swapping the file underneath it.
    state.db = None;
    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(s) => s,
        Err(e) => {
            // Import failed; reopen the untouched database.
            match crate::db::open_db(&workspace) {
                Ok(conn) => state.db = Some(conn),
                Err(reopen) => {
                    return err(&req.id, "db_open_failed", format!("{reopen:?}"), None)
                }
            }
            return err(&req.id, "conflict", format!("{e:?}"), None);
        }
    };
    match crate::db::open_db(&workspace) {
        Ok(conn) => state.db = Some(conn),
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }

    ok(
        &req.id,
        json!({
            "bundleFormatDetected": summary.bundle_format_detected,
            "checksumVerified": summary.checksum_verified
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_export(state, req)),
        "backup.import" => Some(handle_import(state, req)),
        _ => None,
    }
}
