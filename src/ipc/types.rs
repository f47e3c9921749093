use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One line of the wire protocol: `{id, method, params}`. Caller identity,
/// when a method needs it, rides inside `params.caller` rather than the
/// envelope, so the envelope stays the same for every method.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon-wide state: the selected workspace directory and the open handle to
/// its `kelas.sqlite3`. Both are `None` until `workspace.select` succeeds;
/// handlers that need the database answer `no_workspace` before then.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
