use std::io::{self, IsTerminal, Write};

use pocket_shared::{TaskDto, UserProfile};
use unicode_width::UnicodeWidthStr;

use crate::client::{Notice, NoticeLevel};
use crate::config::Config;
use crate::view::TaskListState;

const DESCRIPTION_PREVIEW_CHARS: usize = 48;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.get_bool("color").unwrap_or(true),
        }
    }

    #[tracing::instrument(skip(self, state))]
    pub fn print_task_list(&mut self, state: &TaskListState) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        match state {
            TaskListState::Disabled => writeln!(out, "Not signed in.")?,
            TaskListState::Loading => writeln!(out, "Loading...")?,
            TaskListState::Failed { message } => {
                writeln!(out, "{}", self.paint("Failed to load tasks", "31"))?;
                writeln!(out, "{message}")?;
            }
            TaskListState::Empty { heading, hint } => {
                writeln!(out, "{heading}")?;
                writeln!(out, "{hint}")?;
            }
            TaskListState::Tasks(tasks) => {
                let rows = tasks.iter().map(|task| self.task_row(task)).collect();
                write_table(
                    &mut out,
                    vec![
                        "ID".to_string(),
                        "Done".to_string(),
                        "Title".to_string(),
                        "Description".to_string(),
                    ],
                    rows,
                )?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &TaskDto) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id           {}", task.id)?;
        writeln!(out, "title        {}", task.title)?;
        writeln!(out, "status       {}", if task.is_done { "completed" } else { "active" })?;
        writeln!(out, "owner        {}", task.owner)?;
        if task.description.is_empty() {
            writeln!(out, "description  -")?;
        } else {
            writeln!(out, "description  {}", task.description)?;
        }

        Ok(())
    }

    pub fn print_profile(&mut self, profile: Option<&UserProfile>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match profile {
            Some(profile) => writeln!(out, "name  {}", profile.name)?,
            None => writeln!(
                out,
                "No profile yet. Set one with `pocket profile set <name>`."
            )?,
        }
        Ok(())
    }

    pub fn print_notices(&mut self, notices: &[Notice]) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        for notice in notices {
            let title = match notice.level {
                NoticeLevel::Success => self.paint(&notice.title, "32"),
                NoticeLevel::Error => self.paint(&notice.title, "31"),
            };
            match &notice.detail {
                Some(detail) => writeln!(err, "{title}: {detail}")?,
                None => writeln!(err, "{title}")?,
            }
        }
        Ok(())
    }

    fn task_row(&self, task: &TaskDto) -> Vec<String> {
        let id = self.paint(&task.id.to_string(), "33");
        let done = if task.is_done { "x" } else { " " }.to_string();
        let title = if task.is_done {
            self.paint(&task.title, "9")
        } else {
            task.title.clone()
        };
        vec![id, done, title, preview(&task.description)]
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn preview(description: &str) -> String {
    let first_line = description.lines().next().unwrap_or_default();
    if first_line.chars().count() <= DESCRIPTION_PREVIEW_CHARS
        && first_line.len() == description.len()
    {
        return first_line.to_string();
    }
    let cut: String = first_line.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
    format!("{cut}...")
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
