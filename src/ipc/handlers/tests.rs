use crate::clock;
use crate::ipc::auth::{require_student, require_tutor};
use crate::ipc::error::{err, get_required_str, ok, HandlerErr};
use crate::ipc::handlers::classes::{load_class, student_enrolled};
use crate::ipc::handlers::eligibility::{attended_count, TIPE_POST_TEST, TIPE_PRE_TEST};
use crate::ipc::types::{AppState, Request};
use crate::ngain;
use crate::scoring::{self, QuestionKind, SectionKind, SpeakingScores};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub(crate) const STATUS_DIKERJAKAN: &str = "Dikerjakan";
pub(crate) const STATUS_DINILAI: &str = "Dinilai";

fn parse_tipe(s: &str) -> Result<&'static str, HandlerErr> {
    match s {
        TIPE_PRE_TEST => Ok(TIPE_PRE_TEST),
        TIPE_POST_TEST => Ok(TIPE_POST_TEST),
        _ => Err(HandlerErr::bad_params(
            "tipe must be 'Pre-Test' or 'Post-Test'",
        )),
    }
}

struct TestRow {
    id: String,
    class_id: String,
    tipe: String,
    title: String,
}

fn load_test(conn: &Connection, test_id: &str) -> Result<TestRow, HandlerErr> {
    conn.query_row(
        "SELECT id, class_id, tipe, title FROM tests WHERE id = ?",
        [test_id],
        |r| {
            Ok(TestRow {
                id: r.get(0)?,
                class_id: r.get(1)?,
                tipe: r.get(2)?,
                title: r.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| HandlerErr::not_found("test not found"))
}

fn find_test_by_tipe(
    conn: &Connection,
    class_id: &str,
    tipe: &str,
) -> Result<Option<TestRow>, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT id, class_id, tipe, title FROM tests WHERE class_id = ? AND tipe = ?",
            (class_id, tipe),
            |r| {
                Ok(TestRow {
                    id: r.get(0)?,
                    class_id: r.get(1)?,
                    tipe: r.get(2)?,
                    title: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Questions flattened across sections in document order, as the scoring
/// engine expects them.
fn load_flat_questions(
    conn: &Connection,
    test_id: &str,
) -> Result<Vec<scoring::Question>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT q.id, q.kind, q.jawaban_benar
         FROM test_questions q
         JOIN test_sections s ON s.id = q.section_id
         WHERE s.test_id = ?
         ORDER BY s.idx, q.idx",
    )?;
    let rows = stmt
        .query_map([test_id], |r| {
            let id: String = r.get(0)?;
            let kind: String = r.get(1)?;
            let jawaban_benar: Option<String> = r.get(2)?;
            Ok((id, kind, jawaban_benar))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut questions = Vec::with_capacity(rows.len());
    for (id, kind, jawaban_benar) in rows {
        let kind = QuestionKind::parse(&kind)
            .ok_or_else(|| HandlerErr::new("db_query_failed", format!("unknown question kind {kind}")))?;
        questions.push(scoring::Question {
            id,
            kind,
            jawaban_benar,
        });
    }
    Ok(questions)
}

/// Stored answers for one result, in document order, rehydrated into the
/// scoring engine's shape so recomputation shares one code path with submit.
fn load_graded_answers(
    conn: &Connection,
    result_id: &str,
) -> Result<Vec<scoring::GradedAnswer>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT a.question_id, q.kind, a.student_answer, a.is_correct, a.manual_score
         FROM test_answers a
         JOIN test_questions q ON q.id = a.question_id
         JOIN test_sections s ON s.id = q.section_id
         WHERE a.result_id = ?
         ORDER BY s.idx, q.idx",
    )?;
    let rows = stmt
        .query_map([result_id], |r| {
            let question_id: String = r.get(0)?;
            let kind: String = r.get(1)?;
            let student_answer: Option<String> = r.get(2)?;
            let is_correct: Option<i64> = r.get(3)?;
            let manual_score: Option<i64> = r.get(4)?;
            Ok((question_id, kind, student_answer, is_correct, manual_score))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut graded = Vec::with_capacity(rows.len());
    for (question_id, kind, student_answer, is_correct, manual_score) in rows {
        let kind = QuestionKind::parse(&kind)
            .ok_or_else(|| HandlerErr::new("db_query_failed", format!("unknown question kind {kind}")))?;
        graded.push(scoring::GradedAnswer {
            question_id,
            kind,
            student_answer,
            is_correct: is_correct.map(|v| v != 0),
            manual_score,
        });
    }
    Ok(graded)
}

fn test_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    let tipe = parse_tipe(&get_required_str(params, "tipe")?)?;
    let title = get_required_str(params, "title")?.trim().to_string();
    if title.is_empty() {
        return Err(HandlerErr::bad_params("title must not be empty"));
    }
    load_class(conn, &class_id)?;
    if find_test_by_tipe(conn, &class_id, tipe)?.is_some() {
        return Err(HandlerErr::conflict(format!(
            "class already has a {} test",
            tipe
        )));
    }

    let Some(sections) = params.get("sections").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing sections"));
    };
    if sections.is_empty() {
        return Err(HandlerErr::bad_params("sections must not be empty"));
    }

    let test_id = Uuid::new_v4().to_string();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO tests(id, class_id, tipe, title) VALUES(?, ?, ?, ?)",
        (&test_id, &class_id, tipe, &title),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    for (s_idx, section) in sections.iter().enumerate() {
        let kind_str = section
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("section missing kind"))?;
        let kind = SectionKind::parse(kind_str)
            .ok_or_else(|| HandlerErr::bad_params(format!("unknown section kind {kind_str}")))?;
        let duration = section
            .get("durationMinutes")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| HandlerErr::bad_params("section missing durationMinutes"))?;
        if duration <= 0 {
            return Err(HandlerErr::bad_params("durationMinutes must be positive"));
        }

        let section_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO test_sections(id, test_id, idx, kind, duration_minutes)
             VALUES(?, ?, ?, ?, ?)",
            (&section_id, &test_id, s_idx as i64, kind.as_str(), duration),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

        let questions = section
            .get("questions")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        if kind == SectionKind::Speaking && !questions.is_empty() {
            return Err(HandlerErr::bad_params(
                "Speaking sections carry no questions; the interview is graded at the result level",
            ));
        }
        if kind != SectionKind::Speaking && questions.is_empty() {
            return Err(HandlerErr::bad_params(format!(
                "{} section must contain questions",
                kind.as_str()
            )));
        }

        for (q_idx, question) in questions.iter().enumerate() {
            let q_kind_str = question
                .get("kind")
                .and_then(|v| v.as_str())
                .ok_or_else(|| HandlerErr::bad_params("question missing kind"))?;
            let q_kind = QuestionKind::parse(q_kind_str).ok_or_else(|| {
                HandlerErr::bad_params(format!("unknown question kind {q_kind_str}"))
            })?;
            let prompt = question
                .get("prompt")
                .and_then(|v| v.as_str())
                .ok_or_else(|| HandlerErr::bad_params("question missing prompt"))?;
            let jawaban_benar = question.get("jawabanBenar").and_then(|v| v.as_str());
            if q_kind.is_objective() && jawaban_benar.is_none() {
                return Err(HandlerErr::bad_params(format!(
                    "{} question needs jawabanBenar",
                    q_kind.as_str()
                )));
            }
            let options_json = question
                .get("options")
                .filter(|v| !v.is_null())
                .map(|v| v.to_string());
            let audio_url = question.get("audioUrl").and_then(|v| v.as_str());

            tx.execute(
                "INSERT INTO test_questions(id, section_id, idx, kind, prompt, options_json, jawaban_benar, audio_url)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &section_id,
                    q_idx as i64,
                    q_kind.as_str(),
                    prompt,
                    &options_json,
                    &jawaban_benar,
                    &audio_url,
                ),
            )
            .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
        }
    }
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "testId": test_id, "tipe": tipe, "title": title }))
}

/// Student-facing test document: sections, durations and prompts, never the
/// answer keys.
fn test_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_student(params)?;
    let test_id = get_required_str(params, "testId")?;
    let test = load_test(conn, &test_id)?;

    let mut stmt = conn.prepare(
        "SELECT id, idx, kind, duration_minutes FROM test_sections
         WHERE test_id = ? ORDER BY idx",
    )?;
    let sections_raw = stmt
        .query_map([&test_id], |r| {
            let id: String = r.get(0)?;
            let idx: i64 = r.get(1)?;
            let kind: String = r.get(2)?;
            let duration: i64 = r.get(3)?;
            Ok((id, idx, kind, duration))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut q_stmt = conn.prepare(
        "SELECT id, idx, kind, prompt, options_json, audio_url FROM test_questions
         WHERE section_id = ? ORDER BY idx",
    )?;
    let mut sections = Vec::with_capacity(sections_raw.len());
    for (section_id, idx, kind, duration) in sections_raw {
        let questions = q_stmt
            .query_map([&section_id], |r| {
                let id: String = r.get(0)?;
                let q_idx: i64 = r.get(1)?;
                let q_kind: String = r.get(2)?;
                let prompt: String = r.get(3)?;
                let options_json: Option<String> = r.get(4)?;
                let audio_url: Option<String> = r.get(5)?;
                Ok(json!({
                    "id": id,
                    "idx": q_idx,
                    "kind": q_kind,
                    "prompt": prompt,
                    "options": options_json
                        .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok()),
                    "audioUrl": audio_url
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        sections.push(json!({
            "id": section_id,
            "idx": idx,
            "kind": kind,
            "durationMinutes": duration,
            "questions": questions
        }));
    }

    Ok(json!({
        "testId": test.id,
        "classId": test.class_id,
        "tipe": test.tipe,
        "title": test.title,
        "sections": sections
    }))
}

fn test_submit(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let caller = require_student(params)?;
    let class_id = get_required_str(params, "classId")?;
    let test_id = get_required_str(params, "testId")?;
    let class = load_class(conn, &class_id)?;
    let test = load_test(conn, &test_id)?;
    if test.class_id != class.id {
        return Err(HandlerErr::bad_params("test does not belong to this class"));
    }
    if !student_enrolled(conn, &class_id, &caller.user_id)? {
        return Err(HandlerErr::not_found("student not enrolled in class"));
    }

    // The graduation gate is re-checked at the mutation, not trusted from a
    // prior advisory read.
    if test.tipe == TIPE_POST_TEST {
        let attended = attended_count(conn, &class_id, &caller.user_id)?;
        if attended < class.jumlah_pertemuan {
            return Err(HandlerErr::with_details(
                "invalid_state",
                "not yet eligible for the post-test",
                json!({ "attendedCount": attended, "totalMeetings": class.jumlah_pertemuan }),
            ));
        }
    }

    // Duplicate check is scoped to the test type within the class, so a
    // second Pre-Test submission is rejected even via a different test id.
    let existing: Option<String> = conn
        .query_row(
            "SELECT tr.id FROM test_results tr
             JOIN tests t ON t.id = tr.test_id
             WHERE t.class_id = ? AND t.tipe = ? AND tr.student_id = ?",
            (&class_id, &test.tipe, &caller.user_id),
            |r| r.get(0),
        )
        .optional()?;
    if let Some(result_id) = existing {
        return Err(HandlerErr::with_details(
            "duplicate_submission",
            format!("a {} result already exists for this class", test.tipe),
            json!({ "resultId": result_id }),
        ));
    }

    let answers: Vec<scoring::SubmittedAnswer> = params
        .get("answers")
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()
        .map_err(|e| HandlerErr::bad_params(format!("malformed answers: {e}")))?
        .unwrap_or_default();

    let questions = load_flat_questions(conn, &test_id)?;
    let outcome = scoring::grade_submission(&questions, &answers);
    let total_score = scoring::percentage_score(outcome.correct_count, outcome.objective_count);
    let status = if outcome.needs_manual_grading {
        STATUS_DIKERJAKAN
    } else {
        STATUS_DINILAI
    };

    let result_id = Uuid::new_v4().to_string();
    let submitted_at = clock::to_rfc3339(clock::now_utc());
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO test_results(id, test_id, student_id, status, total_score, submitted_at, version)
         VALUES(?, ?, ?, ?, ?, ?, 0)",
        (
            &result_id,
            &test_id,
            &caller.user_id,
            status,
            total_score,
            &submitted_at,
        ),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    for graded in &outcome.graded {
        tx.execute(
            "INSERT INTO test_answers(id, result_id, question_id, student_answer, is_correct, manual_score)
             VALUES(?, ?, ?, ?, ?, NULL)",
            (
                Uuid::new_v4().to_string(),
                &result_id,
                &graded.question_id,
                &graded.student_answer,
                graded.is_correct.map(|b| b as i64),
            ),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    }
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({
        "resultId": result_id,
        "totalScore": total_score,
        "status": status,
        "needsManualGrading": outcome.needs_manual_grading,
        "submittedAt": submitted_at
    }))
}

fn result_projection(
    conn: &Connection,
    test_id: &str,
) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT tr.id, tr.student_id, st.name, tr.status, tr.total_score, tr.submitted_at, tr.version
         FROM test_results tr
         JOIN students st ON st.id = tr.student_id
         WHERE tr.test_id = ?
         ORDER BY st.sort_order",
    )?;
    let rows = stmt
        .query_map([test_id], |r| {
            let id: String = r.get(0)?;
            let student_id: String = r.get(1)?;
            let student_name: String = r.get(2)?;
            let status: String = r.get(3)?;
            let total_score: i64 = r.get(4)?;
            let submitted_at: Option<String> = r.get(5)?;
            let version: i64 = r.get(6)?;
            Ok((id, student_id, student_name, status, total_score, submitted_at, version))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, student_id, student_name, status, total_score, submitted_at, version) in rows {
        let graded = load_graded_answers(conn, &id)?;
        let weighted = scoring::weighted_total(&graded);
        let answers: Vec<serde_json::Value> = graded
            .iter()
            .map(|a| {
                json!({
                    "questionId": a.question_id,
                    "kind": a.kind.as_str(),
                    "studentAnswer": a.student_answer,
                    "isCorrect": a.is_correct,
                    "manualScore": a.manual_score
                })
            })
            .collect();
        let speaking: Option<SpeakingScores> = conn
            .query_row(
                "SELECT fluency, grammar, pronunciation, diction FROM speaking_scores WHERE result_id = ?",
                [&id],
                |r| {
                    Ok(SpeakingScores {
                        fluency: r.get(0)?,
                        grammar: r.get(1)?,
                        pronunciation: r.get(2)?,
                        diction: r.get(3)?,
                    })
                },
            )
            .optional()?;
        out.push(json!({
            "resultId": id,
            "studentId": student_id,
            "studentName": student_name,
            "status": status,
            "totalScore": total_score,
            "weightedScore": weighted,
            "submittedAt": submitted_at,
            "version": version,
            "answers": answers,
            "speakingScores": speaking
        }));
    }
    Ok(out)
}

/// Tutor-facing results for one test type. The raport surface: scores here
/// follow the weighted convention, and a Post-Test view carries the matching
/// Pre-Test results plus each student's N-Gain.
fn test_results(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let class_id = get_required_str(params, "classId")?;
    let tipe = parse_tipe(&get_required_str(params, "tipe")?)?;
    load_class(conn, &class_id)?;
    let Some(test) = find_test_by_tipe(conn, &class_id, tipe)? else {
        return Err(HandlerErr::not_found(format!(
            "class has no {} test",
            tipe
        )));
    };

    let questions = load_flat_questions(conn, &test.id)?;
    let max_score = scoring::max_weighted_score(&questions);
    let results = result_projection(conn, &test.id)?;

    let mut out = json!({
        "testDetails": {
            "testId": test.id,
            "tipe": test.tipe,
            "title": test.title,
            "maxScore": max_score,
            "questionCount": questions.len()
        },
        "results": results
    });

    if tipe == TIPE_POST_TEST {
        let mut pre_results = Vec::new();
        let mut gains = Vec::new();
        if let Some(pre_test) = find_test_by_tipe(conn, &class_id, TIPE_PRE_TEST)? {
            pre_results = result_projection(conn, &pre_test.id)?;
            // N-Gain compares weighted totals against the post-test ceiling.
            for post in out["results"].as_array().into_iter().flatten() {
                let student_id = post
                    .get("studentId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                let post_score = post
                    .get("weightedScore")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                let pre = pre_results.iter().find(|p| {
                    p.get("studentId").and_then(|v| v.as_str()) == Some(student_id)
                });
                let Some(pre) = pre else { continue };
                let pre_score = pre
                    .get("weightedScore")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                let gain = ngain::n_gain(pre_score as f64, post_score as f64, max_score as f64);
                gains.push(json!({
                    "studentId": student_id,
                    "preScore": pre_score,
                    "postScore": post_score,
                    "maxScore": max_score,
                    "score": gain.score,
                    "grade": gain.grade,
                    "category": gain.category
                }));
            }
        }
        out["preTestResults"] = json!(pre_results);
        out["nGain"] = json!(gains);
    }

    Ok(out)
}

fn apply_manual_grade(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    require_tutor(params)?;
    let Some(grades) = params.get("grades").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing grades"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    let mut updated = Vec::with_capacity(grades.len());

    for grade in grades {
        let result_id = grade
            .get("testResultId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::bad_params("grade missing testResultId"))?;
        let (test_id, version): (String, i64) = tx
            .query_row(
                "SELECT test_id, version FROM test_results WHERE id = ?",
                [result_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| HandlerErr::not_found("test result not found"))?;

        let per_answer = grade
            .get("perAnswerScores")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for entry in &per_answer {
            let question_id = entry
                .get("questionId")
                .and_then(|v| v.as_str())
                .ok_or_else(|| HandlerErr::bad_params("score entry missing questionId"))?;
            let score = entry
                .get("score")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| HandlerErr::bad_params("score entry missing score"))?;
            if !scoring::manual_score_in_range(score) {
                return Err(HandlerErr::bad_params("manual score must be 1-5"));
            }
            let kind: Option<String> = tx
                .query_row(
                    "SELECT q.kind FROM test_questions q
                     JOIN test_sections s ON s.id = q.section_id
                     WHERE q.id = ? AND s.test_id = ?",
                    (question_id, &test_id),
                    |r| r.get(0),
                )
                .optional()?;
            match kind.as_deref().and_then(QuestionKind::parse) {
                Some(QuestionKind::Writing) => {}
                Some(_) => {
                    return Err(HandlerErr::bad_params(
                        "manual scores apply to Writing answers only",
                    ));
                }
                None => return Err(HandlerErr::not_found("question not part of this test")),
            }
            let changed = tx
                .execute(
                    "UPDATE test_answers SET manual_score = ?
                     WHERE result_id = ? AND question_id = ?",
                    (score, result_id, question_id),
                )
                .map_err(|e| HandlerErr::db("db_update_failed", e))?;
            if changed == 0 {
                return Err(HandlerErr::not_found("answer not found for question"));
            }
        }

        if let Some(speaking_val) = grade.get("speakingScores").filter(|v| !v.is_null()) {
            let speaking: SpeakingScores = serde_json::from_value(speaking_val.clone())
                .map_err(|e| HandlerErr::bad_params(format!("malformed speakingScores: {e}")))?;
            if !speaking.is_valid() {
                return Err(HandlerErr::bad_params(
                    "speaking scores must each be 1-5",
                ));
            }
            tx.execute(
                "INSERT INTO speaking_scores(result_id, fluency, grammar, pronunciation, diction)
                 VALUES(?, ?, ?, ?, ?)
                 ON CONFLICT(result_id) DO UPDATE SET
                   fluency = excluded.fluency,
                   grammar = excluded.grammar,
                   pronunciation = excluded.pronunciation,
                   diction = excluded.diction",
                (
                    result_id,
                    speaking.fluency,
                    speaking.grammar,
                    speaking.pronunciation,
                    speaking.diction,
                ),
            )
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
        }

        // Recompute from the merged answers: objective credit preserved,
        // manual scores summed on top.
        let graded = load_graded_answers(&tx, result_id)?;
        let total = scoring::weighted_total(&graded);
        let status = if scoring::all_subjective_scored(&graded) {
            STATUS_DINILAI
        } else {
            STATUS_DIKERJAKAN
        };
        let changed = tx
            .execute(
                "UPDATE test_results SET total_score = ?, status = ?, version = version + 1
                 WHERE id = ? AND version = ?",
                (total, status, result_id, version),
            )
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
        if changed == 0 {
            // Another grader got there first; the whole batch rolls back.
            return Err(HandlerErr::conflict(
                "test result was modified concurrently; re-read and retry",
            ));
        }
        updated.push(json!({
            "resultId": result_id,
            "totalScore": total,
            "status": status,
            "version": version + 1
        }));
    }

    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;
    Ok(json!({ "updated": updated }))
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
        "test.create" => Some(dispatch(state, req, test_create)),
        "test.get" => Some(dispatch(state, req, test_get)),
        "test.submit" => Some(dispatch(state, req, test_submit)),
        "test.results" => Some(dispatch(state, req, test_results)),
        "test.applyManualGrade" => Some(dispatch(state, req, apply_manual_grade)),
        _ => None,
    }
}
