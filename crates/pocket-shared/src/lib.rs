use std::fmt;

use serde::{
  Deserialize,
  Serialize
};

/// Upper bound on task title length,
/// counted in characters.
pub const TITLE_MAX_CHARS: usize = 80;

pub type TaskId = u64;

/// Opaque caller identity as issued
/// by the login provider.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
  pub fn new(
    raw: impl Into<String>
  ) -> Self {
    Self(raw.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Principal {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
  pub id:          TaskId,
  #[serde(default)]
  pub title:       String,
  #[serde(default)]
  pub description: String,
  pub owner:       Principal,
  #[serde(default)]
  pub is_done:     bool
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct UserProfile {
  pub name: String
}

/// Server-scoped task subsets.
#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskView {
  #[default]
  All,
  Active,
  Completed
}

impl TaskView {
  pub fn as_str(self) -> &'static str {
    match self {
      | TaskView::All => "all",
      | TaskView::Active => "active",
      | TaskView::Completed => {
        "completed"
      }
    }
  }

  pub fn parse(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Some(TaskView::All),
      | "active" | "open" => {
        Some(TaskView::Active)
      }
      | "completed" | "done" => {
        Some(TaskView::Completed)
      }
      | _ => None
    }
  }

  /// Membership rule the service
  /// applies when building the view.
  pub fn admits(
    self,
    task: &TaskDto
  ) -> bool {
    match self {
      | TaskView::All => true,
      | TaskView::Active => {
        !task.is_done
      }
      | TaskView::Completed => {
        task.is_done
      }
    }
  }
}

impl fmt::Display for TaskView {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub enum TitleProblem {
  Empty,
  TooLong { chars: usize }
}

impl fmt::Display for TitleProblem {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | TitleProblem::Empty => {
        f.write_str(
          "title cannot be empty"
        )
      }
      | TitleProblem::TooLong {
        chars
      } => {
        write!(
          f,
          "title is {chars} \
           characters; the limit is \
           {TITLE_MAX_CHARS}"
        )
      }
    }
  }
}

/// Checks a title after trimming.
pub fn check_title(
  title: &str
) -> Result<(), TitleProblem> {
  let trimmed = title.trim();
  if trimmed.is_empty() {
    return Err(TitleProblem::Empty);
  }
  let chars = trimmed.chars().count();
  if chars > TITLE_MAX_CHARS {
    return Err(TitleProblem::TooLong {
      chars
    });
  }
  Ok(())
}
