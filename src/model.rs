use serde::{Deserialize, Serialize};

/// Category of a gradable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Quiz,
    Final,
    Midterm,
    Assignment,
    Project,
    ContinuousAssessment,
}

impl AssessmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::Final => "final",
            Self::Midterm => "midterm",
            Self::Assignment => "assignment",
            Self::Project => "project",
            Self::ContinuousAssessment => "continuous_assessment",
        }
    }

    /// Accepts the stored form plus the spaced spelling older records use.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiz" => Some(Self::Quiz),
            "final" => Some(Self::Final),
            "midterm" => Some(Self::Midterm),
            "assignment" => Some(Self::Assignment),
            "project" => Some(Self::Project),
            "continuous_assessment" | "continuous assessment" | "ca" => {
                Some(Self::ContinuousAssessment)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub subject_id: String,
    pub academic_year_id: String,
    pub term_id: String,
    pub kind: AssessmentKind,
    /// Percentage points contributed to the subject grade.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScore {
    pub id: String,
    pub student_id: String,
    pub assessment_id: String,
    pub title: String,
    pub score: f64,
    /// Denominator of `score`; unrelated to the assessment weight.
    pub weight: f64,
    pub effort: Option<String>,
    pub comment: Option<String>,
}

/// (student, subject, academic year, term) identifying one FinalAssessment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NaturalKey {
    pub student_id: String,
    pub subject_id: String,
    pub academic_year_id: String,
    pub term_id: String,
}

impl NaturalKey {
    pub fn new(
        student_id: impl Into<String>,
        subject_id: impl Into<String>,
        academic_year_id: impl Into<String>,
        term_id: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            subject_id: subject_id.into(),
            academic_year_id: academic_year_id.into(),
            term_id: term_id.into(),
        }
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.student_id, self.subject_id, self.academic_year_id, self.term_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalAssessment {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub class_id: Option<String>,
    pub academic_year_id: String,
    pub term_id: String,
    pub total_score: f64,
    pub total_effort: f64,
    pub grade: String,
    pub remark: String,
}

impl FinalAssessment {
    pub fn key(&self) -> NaturalKey {
        NaturalKey::new(
            &self.student_id,
            &self.subject_id,
            &self.academic_year_id,
            &self.term_id,
        )
    }
}

/// One item of an intake batch after structural validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawScoreInput {
    pub title: String,
    pub student_id: String,
    pub assessment_id: String,
    pub score: f64,
    pub weight: f64,
    pub effort: Option<String>,
    pub comment: Option<String>,
}

/// Partial update of a stored RawScore.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScorePatch {
    pub title: Option<String>,
    pub score: Option<f64>,
    pub weight: Option<f64>,
    pub effort: Option<Option<String>>,
    pub comment: Option<Option<String>>,
}

impl ScorePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.score.is_none()
            && self.weight.is_none()
            && self.effort.is_none()
            && self.comment.is_none()
    }
}

/// Case-insensitive uniqueness key for a score title.
pub fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}
