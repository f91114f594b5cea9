use std::io::{self, IsTerminal, Write};

use chrono::NaiveDateTime;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_due_label;
use crate::model::{List, ListId, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color() && io::stdout().is_terminal(),
        }
    }

    #[tracing::instrument(skip(self, list, tasks, now), fields(list = %list.id, count = tasks.len()))]
    pub fn print_tasks(
        &self,
        list: &List,
        tasks: &[&Task],
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        self.write_tasks(io::stdout().lock(), list, tasks, now)
    }

    pub fn print_lists(
        &self,
        lists: &[List],
        tasks: &[Task],
        active: Option<&ListId>,
    ) -> anyhow::Result<()> {
        self.write_lists(io::stdout().lock(), lists, tasks, active)
    }

    pub fn write_tasks<W: Write>(
        &self,
        mut out: W,
        list: &List,
        tasks: &[&Task],
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&list.name, "1"))?;
        if tasks.is_empty() {
            writeln!(out, "No tasks yet. Add your first task with `listo add`.")?;
            return Ok(());
        }

        let headers = vec![
            "#".to_string(),
            "Done".to_string(),
            "Due".to_string(),
            "Title".to_string(),
            "ID".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            let done = if task.done { "[x]" } else { "[ ]" }.to_string();

            let due = task
                .due
                .map(|due| {
                    let label = format_due_label(&due, &now);
                    if !task.done && due < now {
                        self.paint(&label, "31")
                    } else {
                        label
                    }
                })
                .unwrap_or_default();

            let title = if task.done {
                self.paint(&task.title, "2")
            } else {
                task.title.clone()
            };

            rows.push(vec![
                self.paint(&(idx + 1).to_string(), "33"),
                done,
                due,
                title,
                task.id.to_string(),
            ]);
        }

        write_table(&mut out, headers, rows)
    }

    pub fn write_lists<W: Write>(
        &self,
        mut out: W,
        lists: &[List],
        tasks: &[Task],
        active: Option<&ListId>,
    ) -> anyhow::Result<()> {
        let headers = vec![
            " ".to_string(),
            "ID".to_string(),
            "Name".to_string(),
            "Open".to_string(),
        ];

        let rows = lists
            .iter()
            .map(|list| {
                let marker = if Some(&list.id) == active {
                    self.paint("*", "32")
                } else {
                    String::new()
                };
                let open = tasks
                    .iter()
                    .filter(|t| t.list_id == list.id && !t.done)
                    .count();
                vec![marker, list.id.to_string(), list.name.clone(), open.to_string()]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
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

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
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
