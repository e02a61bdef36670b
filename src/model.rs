//! Typed request payloads: the question variants and the student record.
//!
//! Parsing here is pure; handlers turn the `String` errors into
//! validation failures.

use serde_json::Value;

use crate::api::helpers::{field_string, leading_int};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionType {
    Mcq,
    Programming,
    Flowchart,
}

impl QuestionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mcq" => Some(Self::Mcq),
            "programming" => Some(Self::Programming),
            "flowchart" => Some(Self::Flowchart),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mcq => "MCQ",
            Self::Programming => "Programming",
            Self::Flowchart => "Flowchart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerLetter {
    A,
    B,
    C,
    D,
}

impl AnswerLetter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cpp,
    Java,
    Python,
    Other,
}

impl Language {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" => Some(Self::C),
            "c++" | "cpp" => Some(Self::Cpp),
            "java" => Some(Self::Java),
            "python" => Some(Self::Python),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::Cpp => "C++",
            Self::Java => "Java",
            Self::Python => "Python",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionBody {
    Mcq {
        options: [String; 4],
        answer: AnswerLetter,
    },
    Flowchart {
        image_path: String,
        answer_text: String,
    },
    Programming {
        language: Language,
        starter_code: Option<String>,
        expected_output: Option<String>,
    },
}

/// Column values of the wide `questions` row for one variant.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct QuestionColumns<'a> {
    pub options: [Option<&'a str>; 4],
    pub correct_answer: Option<&'a str>,
    pub flowchart_image: Option<&'a str>,
}

impl QuestionBody {
    pub fn question_type(&self) -> QuestionType {
        match self {
            Self::Mcq { .. } => QuestionType::Mcq,
            Self::Flowchart { .. } => QuestionType::Flowchart,
            Self::Programming { .. } => QuestionType::Programming,
        }
    }

    pub fn columns(&self) -> QuestionColumns<'_> {
        match self {
            Self::Mcq { options, answer } => QuestionColumns {
                options: [
                    Some(options[0].as_str()),
                    Some(options[1].as_str()),
                    Some(options[2].as_str()),
                    Some(options[3].as_str()),
                ],
                correct_answer: Some(answer.as_str()),
                flowchart_image: None,
            },
            Self::Flowchart {
                image_path,
                answer_text,
            } => QuestionColumns {
                options: [None; 4],
                correct_answer: Some(answer_text.as_str()),
                flowchart_image: Some(image_path.as_str()),
            },
            Self::Programming { .. } => QuestionColumns::default(),
        }
    }
}

pub const OPTION_KEYS: [&str; 4] = ["option_A", "option_B", "option_C", "option_D"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub topic_id: i64,
    pub text: String,
    pub body: QuestionBody,
}

impl NewQuestion {
    pub fn from_json(params: &Value) -> Result<Self, String> {
        let topic_id = field_string(params, "topic_id").ok_or("topic_id is required")?;
        let topic_id = topic_id
            .parse::<i64>()
            .map_err(|_| format!("invalid topic_id: {topic_id}"))?;
        let raw_type = field_string(params, "question_type").ok_or("question_type is required")?;
        let question_type = QuestionType::parse(&raw_type).ok_or_else(|| {
            format!("question_type must be one of: MCQ, Programming, Flowchart (got {raw_type})")
        })?;
        let text = field_string(params, "question_text").ok_or("question_text is required")?;

        let body = match question_type {
            QuestionType::Mcq => {
                let mut options: [String; 4] = Default::default();
                for (slot, key) in options.iter_mut().zip(OPTION_KEYS) {
                    *slot = field_string(params, key)
                        .ok_or_else(|| format!("{key} is required for MCQ questions"))?;
                }
                let raw = field_string(params, "correct_answer")
                    .ok_or("correct_answer is required for MCQ questions")?;
                let answer = AnswerLetter::parse(&raw)
                    .ok_or_else(|| format!("correct_answer must be one of A, B, C, D (got {raw})"))?;
                QuestionBody::Mcq { options, answer }
            }
            QuestionType::Flowchart => {
                let image_path = field_string(params, "flowchart_image")
                    .ok_or("flowchart_image is required for Flowchart questions")?;
                let answer_text = field_string(params, "correct_answer")
                    .or_else(|| field_string(params, "flowchart_answer"))
                    .ok_or("correct_answer is required for Flowchart questions")?;
                QuestionBody::Flowchart {
                    image_path,
                    answer_text,
                }
            }
            QuestionType::Programming => {
                let raw = field_string(params, "language")
                    .ok_or("language is required for Programming questions")?;
                let language = Language::parse(&raw).ok_or_else(|| {
                    format!("language must be one of: C, C++, Java, Python, Other (got {raw})")
                })?;
                QuestionBody::Programming {
                    language,
                    starter_code: field_string(params, "starter_code"),
                    expected_output: field_string(params, "expected_output"),
                }
            }
        };

        Ok(Self {
            topic_id,
            text,
            body,
        })
    }
}

/// The `answer` projection served with every stored question.
pub fn effective_answer(
    question_type: &str,
    correct_answer: Option<String>,
    expected_output: Option<String>,
) -> Option<String> {
    match QuestionType::parse(question_type)? {
        QuestionType::Mcq | QuestionType::Flowchart => correct_answer,
        QuestionType::Programming => expected_output,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentFields {
    pub name: String,
    pub roll_no: String,
    pub year_of_study: i64,
    pub department: String,
    pub college_name: String,
    pub mobile_no: String,
    pub email: String,
    pub password: Option<String>,
}

impl StudentFields {
    /// Reads the student record, checking fields in form order so the
    /// first missing one is reported. With `require_password = false` a missing or blank
    /// password reads as `None`.
    pub fn from_json(params: &Value, require_password: bool) -> Result<Self, FieldError> {
        let get = |key: &'static str| field_string(params, key).ok_or(FieldError::Missing(key));

        let name = get("name")?;
        let roll_no = get("roll_no")?;
        let raw_year = get("year_of_study")?;
        let department = get("department")?;
        let college_name = get("college_name")?;
        let mobile_no = get("mobile_no")?;
        let email = get("email")?;
        let password = if require_password {
            Some(get("password")?)
        } else {
            field_string(params, "password")
        };

        let year_of_study = leading_int(&raw_year).ok_or_else(|| {
            FieldError::Invalid("year_of_study", format!("year_of_study must be a number (got {raw_year})"))
        })?;

        Ok(Self {
            name,
            roll_no,
            year_of_study,
            department,
            college_name,
            mobile_no,
            email,
            password,
        })
    }
}
