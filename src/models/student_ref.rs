// src/models/student_ref.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::errors::AppError;

/// Composite student identity, encoded canonically as `SCHOOL:CLASS:STUDENT`.
///
/// The platform identifies a student by school, class and student id; the
/// colon-separated form is what gets persisted and what travels in URLs and
/// payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StudentRef {
    pub school_id: String,
    pub class_id: String,
    pub student_id: String,
}

#[derive(Debug, Error)]
#[error("invalid student reference '{0}': expected SCHOOL:CLASS:STUDENT")]
pub struct StudentRefParseError(String);

impl StudentRef {
    pub fn new(
        school_id: impl Into<String>,
        class_id: impl Into<String>,
        student_id: impl Into<String>,
    ) -> Self {
        Self {
            school_id: school_id.into(),
            class_id: class_id.into(),
            student_id: student_id.into(),
        }
    }

    /// Colon-free form used inside invoice numbers.
    pub fn compact(&self) -> String {
        format!("{}-{}-{}", self.school_id, self.class_id, self.student_id)
    }
}

impl fmt::Display for StudentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.school_id, self.class_id, self.student_id)
    }
}

impl FromStr for StudentRef {
    type Err = StudentRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(school), Some(class), Some(student), None)
                if !school.is_empty() && !class.is_empty() && !student.is_empty() =>
            {
                Ok(StudentRef::new(school, class, student))
            }
            _ => Err(StudentRefParseError(s.to_string())),
        }
    }
}

impl From<StudentRef> for String {
    fn from(student_ref: StudentRef) -> Self {
        student_ref.to_string()
    }
}

impl TryFrom<String> for StudentRef {
    type Error = StudentRefParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StudentRefParseError> for AppError {
    fn from(err: StudentRefParseError) -> Self {
        AppError::Validation(err.to_string())
    }
}
