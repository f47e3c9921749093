use serde::{Deserialize, Serialize};

/// Question kinds the engine grades. Speaking is deliberately absent: the
/// test-taking flow collects no per-question Speaking answer; the live
/// interview is scored at the result level (see `SpeakingScores`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    #[serde(rename = "Pilihan Ganda")]
    PilihanGanda,
    Writing,
    Listening,
}

impl QuestionKind {
    pub fn is_objective(self) -> bool {
        matches!(self, QuestionKind::PilihanGanda | QuestionKind::Listening)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::PilihanGanda => "Pilihan Ganda",
            QuestionKind::Writing => "Writing",
            QuestionKind::Listening => "Listening",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pilihan Ganda" => Some(QuestionKind::PilihanGanda),
            "Writing" => Some(QuestionKind::Writing),
            "Listening" => Some(QuestionKind::Listening),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    Reading,
    Writing,
    Listening,
    Speaking,
}

impl SectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionKind::Reading => "Reading",
            SectionKind::Writing => "Writing",
            SectionKind::Listening => "Listening",
            SectionKind::Speaking => "Speaking",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Reading" => Some(SectionKind::Reading),
            "Writing" => Some(SectionKind::Writing),
            "Listening" => Some(SectionKind::Listening),
            "Speaking" => Some(SectionKind::Speaking),
            _ => None,
        }
    }
}

/// A question as the engine sees it: already flattened across sections in
/// document order (section idx, then question idx).
#[derive(Debug, Clone)]
pub struct Question {
    pub id: String,
    pub kind: QuestionKind,
    pub jawaban_benar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradedAnswer {
    pub question_id: String,
    pub kind: QuestionKind,
    pub student_answer: Option<String>,
    /// Some(_) only for objective kinds.
    pub is_correct: Option<bool>,
    /// 1-5, supplied later by a tutor for Writing answers.
    pub manual_score: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct GradeOutcome {
    pub graded: Vec<GradedAnswer>,
    pub correct_count: usize,
    pub objective_count: usize,
    pub needs_manual_grading: bool,
}

/// Grade a submission against the flattened question list.
///
/// Objective credit is exact string equality with `jawaban_benar` - no
/// trimming, no case folding. A question the student left unanswered is
/// simply wrong, not an error.
pub fn grade_submission(questions: &[Question], answers: &[SubmittedAnswer]) -> GradeOutcome {
    let mut graded = Vec::with_capacity(questions.len());
    let mut correct_count = 0usize;
    let mut objective_count = 0usize;
    let mut needs_manual_grading = false;

    for q in questions {
        let submitted = answers
            .iter()
            .find(|a| a.question_id == q.id)
            .map(|a| a.answer.clone());

        let is_correct = if q.kind.is_objective() {
            objective_count += 1;
            let hit = match (&submitted, &q.jawaban_benar) {
                (Some(s), Some(key)) => s == key,
                _ => false,
            };
            if hit {
                correct_count += 1;
            }
            Some(hit)
        } else {
            needs_manual_grading = true;
            None
        };

        graded.push(GradedAnswer {
            question_id: q.id.clone(),
            kind: q.kind,
            student_answer: submitted,
            is_correct,
            manual_score: None,
        });
    }

    GradeOutcome {
        graded,
        correct_count,
        objective_count,
        needs_manual_grading,
    }
}

/// Instant-feedback convention: percentage over objective questions only,
/// rounded to the nearest integer.
pub fn percentage_score(correct_count: usize, objective_count: usize) -> i64 {
    if objective_count == 0 {
        return 0;
    }
    (100.0 * correct_count as f64 / objective_count as f64).round() as i64
}

/// Raport/certificate convention: 1 point per objective question, 5 points
/// per Writing question. Speaking contributes nothing here.
pub fn max_weighted_score(questions: &[Question]) -> i64 {
    questions
        .iter()
        .map(|q| if q.kind.is_objective() { 1 } else { 5 })
        .sum()
}

/// Weighted total of a (possibly partially graded) answer set: objective
/// credit preserved, manual scores added as supplied.
pub fn weighted_total(graded: &[GradedAnswer]) -> i64 {
    graded
        .iter()
        .map(|a| match a.kind {
            k if k.is_objective() => {
                if a.is_correct == Some(true) {
                    1
                } else {
                    0
                }
            }
            _ => a.manual_score.unwrap_or(0),
        })
        .sum()
}

/// A result is fully graded once every Writing answer carries a manual score.
pub fn all_subjective_scored(graded: &[GradedAnswer]) -> bool {
    graded
        .iter()
        .filter(|a| a.kind == QuestionKind::Writing)
        .all(|a| a.manual_score.is_some())
}

/// Four-dimension manual score for the live Speaking interview, attached at
/// the result level once a tutor grades it. Each dimension is 1-5.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakingScores {
    pub fluency: i64,
    pub grammar: i64,
    pub pronunciation: i64,
    pub diction: i64,
}

impl SpeakingScores {
    pub fn is_valid(&self) -> bool {
        [self.fluency, self.grammar, self.pronunciation, self.diction]
            .iter()
            .all(|v| (1..=5).contains(v))
    }
}

pub fn manual_score_in_range(score: i64) -> bool {
    (1..=5).contains(&score)
}
