//! Listing and changing habits, dailies and todos.
//!
//! Tasks are addressed by their 1-based position in the listing, by id
//! expressions such as `1,3-5`, or by their id or alias.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use habit_core::{parse_task_ids, ApiProxy, HttpMethod, TaskIdError};
use serde::Deserialize;
use serde_json::json;

use super::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Habits,
    Dailies,
    Todos,
}

impl Domain {
    /// Value of the `type` filter on `GET /tasks/user`.
    fn query(self) -> &'static str {
        match self {
            Domain::Habits => "habits",
            Domain::Dailies => "dailys",
            Domain::Todos => "todos",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Domain::Habits => "habit",
            Domain::Dailies => "daily",
            Domain::Todos => "todo",
        }
    }
}

#[derive(Args, Debug)]
pub struct Targets {
    /// Task numbers (`1,3-5`), ids or aliases
    #[arg(value_name = "TASK_IDS", required = true)]
    pub ids: Vec<String>,

    /// Show what would change without touching the server
    #[arg(long, alias = "noop")]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum HabitsCommand {
    /// Up (+) habits
    Up(Targets),
    /// Down (-) habits
    Down(Targets),
}

#[derive(Subcommand, Debug)]
pub enum DailiesCommand {
    /// Check dailies
    Done(Targets),
    /// Uncheck dailies
    Undo(Targets),
}

#[derive(Subcommand, Debug)]
pub enum TodosCommand {
    /// Complete todos
    Done(Targets),
    /// Delete todos
    Delete(Targets),
    /// Add a todo
    Add {
        #[arg(value_name = "TEXT", required = true)]
        text: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Up,
    Down,
    Delete,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "yes")]
    pub is_due: bool,
    #[serde(default = "yes")]
    pub up: bool,
    #[serde(default = "yes")]
    pub down: bool,
}

/// Task value shown as one to seven stars.
pub fn score_badge(value: f64) -> String {
    const BREAKPOINTS: [f64; 6] = [-20.0, -10.0, -1.0, 1.0, 5.0, 10.0];
    let stars = 1 + BREAKPOINTS.iter().filter(|&&b| b <= value).count();
    format!("[{:^7}]", "*".repeat(stars))
}

fn render_task(domain: Domain, task: &Task) -> String {
    let badge = score_badge(task.value);
    let check = if task.completed { 'X' } else { ' ' };
    match domain {
        Domain::Habits => format!("{badge} {}", task.text),
        Domain::Dailies if !task.is_due => format!("[{check}] {badge} {} (not due)", task.text),
        Domain::Dailies | Domain::Todos => format!("[{check}] {badge} {}", task.text),
    }
}

/// Numbered listing, numbers right-aligned.
pub fn render_list(domain: Domain, tasks: &[Task]) -> Vec<String> {
    let width = tasks.len().to_string().len();
    tasks
        .iter()
        .enumerate()
        .map(|(i, task)| format!("{:>width$}. {}", i + 1, render_task(domain, task)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRef {
    /// 1-based position in the listing.
    Index(u32),
    /// Task id or alias.
    Key(String),
}

fn looks_numeric(arg: &str) -> bool {
    arg.chars().all(|c| c.is_ascii_digit() || c == '-' || c == ',' || c.is_whitespace())
}

pub fn parse_refs(args: &[String]) -> Result<Vec<TaskRef>, TaskIdError> {
    let mut refs = Vec::new();
    for arg in args {
        match parse_task_ids(arg) {
            Ok(ids) => refs.extend(ids.into_iter().map(TaskRef::Index)),
            Err(TaskIdError::Format(_)) if !looks_numeric(arg) && !arg.contains(',') => {
                refs.push(TaskRef::Key(arg.trim().to_string()))
            }
            Err(e) => return Err(e),
        }
    }
    Ok(refs)
}

#[derive(Debug)]
pub struct Selection<'a> {
    pub tasks: Vec<&'a Task>,
    pub invalid: Vec<String>,
}

/// Resolve references against a listing. Each task is selected once, in
/// the order first referenced.
pub fn select<'a>(tasks: &'a [Task], refs: &[TaskRef]) -> Selection<'a> {
    let mut selected: Vec<&Task> = Vec::new();
    let mut invalid = Vec::new();
    for r in refs {
        let found = match r {
            TaskRef::Index(i) => i.checked_sub(1).and_then(|i| tasks.get(i as usize)),
            TaskRef::Key(key) => tasks
                .iter()
                .find(|t| t.id == *key || t.alias.as_deref() == Some(key.as_str())),
        };
        match found {
            Some(task) if !selected.iter().any(|s| s.id == task.id) => selected.push(task),
            Some(_) => {}
            None => invalid.push(match r {
                TaskRef::Index(i) => i.to_string(),
                TaskRef::Key(key) => key.clone(),
            }),
        }
    }
    Selection {
        tasks: selected,
        invalid,
    }
}

pub fn fetch(api: &ApiProxy, domain: Domain) -> Result<Vec<Task>> {
    let data = api
        .descend_path(["tasks", "user"])?
        .invoke(HttpMethod::Get, &[("type", domain.query())], None)
        .with_context(|| format!("listing {}", domain.query()))?;
    serde_json::from_value(data).context("unexpected task list format")
}

fn apply(api: &ApiProxy, task: &Task, action: Action) -> Result<()> {
    let node = api.descend("tasks")?.descend(&task.id)?;
    match action {
        Action::Up => node.descend_path(["score", "up"])?.invoke(HttpMethod::Post, &[], None)?,
        Action::Down => node.descend_path(["score", "down"])?.invoke(HttpMethod::Post, &[], None)?,
        Action::Delete => node.invoke(HttpMethod::Delete, &[], None)?,
    };
    Ok(())
}

fn done_message(domain: Domain, action: Action, text: &str) -> String {
    let verb = match (domain, action) {
        (Domain::Habits, Action::Up) => "Incremented",
        (Domain::Habits, Action::Down) => "Decremented",
        (_, Action::Up) => "Completed",
        (_, Action::Down) => "Unchecked",
        (_, Action::Delete) => "Deleted",
    };
    format!("{verb} {} {text}", domain.noun())
}

/// Apply `action` to the referenced tasks; returns one line per task.
fn change(api: &ApiProxy, domain: Domain, action: Action, targets: &Targets) -> Result<Vec<String>> {
    let refs = parse_refs(&targets.ids)?;
    let tasks = fetch(api, domain)?;
    let selection = select(&tasks, &refs);
    for bad in &selection.invalid {
        tracing::error!("task id {bad} is invalid");
    }

    let mut lines = Vec::new();
    for task in selection.tasks {
        if domain == Domain::Habits
            && ((action == Action::Up && !task.up) || (action == Action::Down && !task.down))
        {
            let direction = if action == Action::Up { "up" } else { "down" };
            lines.push(format!("Habit {} cannot be scored {direction}", task.text));
            continue;
        }
        let message = done_message(domain, action, &task.text);
        if targets.dry_run {
            lines.push(format!("{message} (dry run)"));
            continue;
        }
        apply(api, task, action).with_context(|| format!("changing {} {}", domain.noun(), task.text))?;
        lines.push(message);
    }
    Ok(lines)
}

pub fn add_todo(api: &ApiProxy, text: &str) -> Result<Task> {
    let body = json!({"text": text, "type": "todo"});
    let data = api
        .descend_path(["tasks", "user"])?
        .invoke(HttpMethod::Post, &[], Some(&body))
        .context("creating todo")?;
    serde_json::from_value(data).context("unexpected task format")
}

fn print_list(api: &ApiProxy, domain: Domain) -> Result<()> {
    let tasks = fetch(api, domain)?;
    for line in render_list(domain, &tasks) {
        println!("{line}");
    }
    Ok(())
}

fn print_change(api: &ApiProxy, domain: Domain, action: Action, targets: &Targets) -> Result<()> {
    for line in change(api, domain, action, targets)? {
        println!("{line}");
    }
    print_list(api, domain)
}

pub fn habits(session: &Session, cmd: Option<HabitsCommand>) -> Result<()> {
    let api = &session.api;
    match cmd {
        None => print_list(api, Domain::Habits),
        Some(HabitsCommand::Up(t)) => print_change(api, Domain::Habits, Action::Up, &t),
        Some(HabitsCommand::Down(t)) => print_change(api, Domain::Habits, Action::Down, &t),
    }
}

pub fn dailies(session: &Session, cmd: Option<DailiesCommand>) -> Result<()> {
    let api = &session.api;
    match cmd {
        None => print_list(api, Domain::Dailies),
        Some(DailiesCommand::Done(t)) => print_change(api, Domain::Dailies, Action::Up, &t),
        Some(DailiesCommand::Undo(t)) => print_change(api, Domain::Dailies, Action::Down, &t),
    }
}

pub fn todos(session: &Session, cmd: Option<TodosCommand>) -> Result<()> {
    let api = &session.api;
    match cmd {
        None => print_list(api, Domain::Todos),
        Some(TodosCommand::Done(t)) => print_change(api, Domain::Todos, Action::Up, &t),
        Some(TodosCommand::Delete(t)) => print_change(api, Domain::Todos, Action::Delete, &t),
        Some(TodosCommand::Add { text }) => {
            let task = add_todo(api, &text.join(" "))?;
            println!("Added todo {}", task.text);
            print_list(api, Domain::Todos)
        }
    }
}
