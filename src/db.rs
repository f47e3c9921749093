use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "kelas.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            jumlah_pertemuan INTEGER NOT NULL,
            durasi_pertemuan_menit INTEGER NOT NULL DEFAULT 90
        )",
        [],
    )?;
    ensure_classes_durasi(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    // One row per meeting slot; a class always holds exactly jumlah_pertemuan
    // rows, padded with placeholders until a tutor edits them.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meetings(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            video_url TEXT,
            meet_url TEXT,
            pdf_url TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(class_id, idx)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_class ON meetings(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS session_assignments(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            meeting_idx INTEGER NOT NULL,
            student_id TEXT NOT NULL,
            scheduled_at TEXT,
            status TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(class_id, meeting_idx, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_session_assignments_class ON session_assignments(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_session_assignments_student ON session_assignments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            meeting_idx INTEGER NOT NULL,
            status TEXT NOT NULL,
            expires_at TEXT,
            confirmed_at TEXT,
            PRIMARY KEY(class_id, student_id, meeting_idx),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    ensure_attendance_confirmed_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class_student ON attendance(class_id, student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tests(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            tipe TEXT NOT NULL,
            title TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(class_id, tipe)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_sections(
            id TEXT PRIMARY KEY,
            test_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            kind TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            FOREIGN KEY(test_id) REFERENCES tests(id),
            UNIQUE(test_id, idx)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_sections_test ON test_sections(test_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_questions(
            id TEXT PRIMARY KEY,
            section_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            kind TEXT NOT NULL,
            prompt TEXT NOT NULL,
            options_json TEXT,
            jawaban_benar TEXT,
            audio_url TEXT,
            FOREIGN KEY(section_id) REFERENCES test_sections(id),
            UNIQUE(section_id, idx)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_questions_section ON test_questions(section_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_results(
            id TEXT PRIMARY KEY,
            test_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL,
            total_score INTEGER NOT NULL DEFAULT 0,
            submitted_at TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(test_id) REFERENCES tests(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(test_id, student_id)
        )",
        [],
    )?;
    ensure_test_results_version(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_results_test ON test_results(test_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_results_student ON test_results(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_answers(
            id TEXT PRIMARY KEY,
            result_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            student_answer TEXT,
            is_correct INTEGER,
            manual_score INTEGER,
            FOREIGN KEY(result_id) REFERENCES test_results(id),
            FOREIGN KEY(question_id) REFERENCES test_questions(id),
            UNIQUE(result_id, question_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_answers_result ON test_answers(result_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS speaking_scores(
            result_id TEXT PRIMARY KEY,
            fluency INTEGER NOT NULL,
            grammar INTEGER NOT NULL,
            pronunciation INTEGER NOT NULL,
            diction INTEGER NOT NULL,
            FOREIGN KEY(result_id) REFERENCES test_results(id)
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_classes_durasi(conn: &Connection) -> anyhow::Result<()> {
    // Workspaces created before the per-class session duration existed.
    if table_has_column(conn, "classes", "durasi_pertemuan_menit")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE classes ADD COLUMN durasi_pertemuan_menit INTEGER NOT NULL DEFAULT 90",
        [],
    )?;
    Ok(())
}

fn ensure_attendance_confirmed_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "attendance", "confirmed_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE attendance ADD COLUMN confirmed_at TEXT", [])?;
    Ok(())
}

fn ensure_test_results_version(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "test_results", "version")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE test_results ADD COLUMN version INTEGER NOT NULL DEFAULT 0",
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
