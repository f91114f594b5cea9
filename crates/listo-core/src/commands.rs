use anyhow::{Context, anyhow};
use chrono::NaiveDateTime;
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::datetime::parse_due;
use crate::model::{ListId, TaskId, TaskPatch};
use crate::persist::Persistence;
use crate::render::Renderer;
use crate::session::Session;
use crate::store::Store;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "show", "lists", "newlist", "rename", "droplist", "use", "add", "done", "edit", "delete",
        "export", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(session, renderer, inv, now))]
pub fn dispatch<P: Persistence>(
    session: &mut Session<P>,
    renderer: &Renderer,
    inv: Invocation,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    debug!(command, args = ?inv.args, "dispatching command");

    match command {
        "show" => cmd_show(session.store(), renderer, now),
        "lists" => cmd_lists(session.store(), renderer),
        "newlist" => cmd_newlist(session, &inv.args),
        "rename" => cmd_rename(session, &inv.args),
        "droplist" => cmd_droplist(session, &inv.args),
        "use" => cmd_use(session, &inv.args),
        "add" => cmd_add(session, &inv.args),
        "done" => cmd_done(session, &inv.args),
        "edit" => cmd_edit(session, &inv.args),
        "delete" => cmd_delete(session, &inv.args),
        "export" => cmd_export(session.store()),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mod {
    Due(Option<NaiveDateTime>),
    List(String),
    Done(bool),
}

/// Splits arguments into free words and `key:value` modifiers. Everything
/// after `--` counts as words.
fn parse_words_and_mods(args: &[String]) -> anyhow::Result<(Vec<String>, Vec<Mod>)> {
    let mut words = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if !literal && arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg)? {
            mods.push(one_mod);
            continue;
        }

        words.push(arg.clone());
    }

    Ok((words, mods))
}

fn parse_one_mod(tok: &str) -> anyhow::Result<Option<Mod>> {
    if let Some(raw) = tok.strip_prefix("due:") {
        let due = parse_due(raw).with_context(|| format!("invalid due modifier: {tok}"))?;
        return Ok(Some(Mod::Due(due)));
    }
    if let Some(raw) = tok.strip_prefix("list:") {
        return Ok(Some(Mod::List(raw.to_string())));
    }
    if let Some(raw) = tok.strip_prefix("done:") {
        let done = match raw.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" | "1" | "on" => true,
            "n" | "no" | "false" | "0" | "off" => false,
            other => return Err(anyhow!("done: expects yes or no, got: {other}")),
        };
        return Ok(Some(Mod::Done(done)));
    }
    Ok(None)
}

/// A list id, or failing that an exact list name.
fn resolve_list(store: &Store, token: &str) -> anyhow::Result<ListId> {
    let lists = store.lists();
    lists
        .iter()
        .find(|l| l.id.as_str() == token)
        .or_else(|| lists.iter().find(|l| l.name == token))
        .map(|l| l.id.clone())
        .ok_or_else(|| anyhow!("no list matches: {token}"))
}

/// A 1-based position in the active list's sorted view, or a task id.
fn resolve_task_ref(store: &Store, token: &str) -> anyhow::Result<TaskId> {
    let sorted = store.sorted_tasks();
    if let Ok(position) = token.parse::<usize>()
        && position >= 1
        && let Some(task) = sorted.get(position - 1)
    {
        return Ok(task.id.clone());
    }

    store
        .tasks()
        .iter()
        .find(|t| t.id.as_str() == token)
        .map(|t| t.id.clone())
        .ok_or_else(|| anyhow!("no task matches: {token}"))
}

fn first_arg<'a>(args: &'a [String], usage: &str) -> anyhow::Result<&'a str> {
    args.first()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("usage: listo {usage}"))
}

#[instrument(skip(store, renderer, now))]
fn cmd_show(store: &Store, renderer: &Renderer, now: NaiveDateTime) -> anyhow::Result<()> {
    info!("command show");
    let list = store
        .active_list()
        .ok_or_else(|| anyhow!("no lists available"))?;
    renderer.print_tasks(list, &store.sorted_tasks(), now)
}

#[instrument(skip(store, renderer))]
fn cmd_lists(store: &Store, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command lists");
    let active = store.active_list().map(|l| &l.id);
    renderer.print_lists(store.lists(), store.tasks(), active)
}

#[instrument(skip(session, args))]
fn cmd_newlist<P: Persistence>(session: &mut Session<P>, args: &[String]) -> anyhow::Result<()> {
    info!("command newlist");
    let id = session.add_list(&args.join(" "));
    let name = session
        .store()
        .state()
        .list(&id)
        .map(|l| l.name.clone())
        .unwrap_or_default();
    println!("Created list {name} ({id}).");
    Ok(())
}

#[instrument(skip(session, args))]
fn cmd_rename<P: Persistence>(session: &mut Session<P>, args: &[String]) -> anyhow::Result<()> {
    info!("command rename");
    let target = first_arg(args, "rename LIST NAME...")?;
    let id = resolve_list(session.store(), target)?;

    let name = args[1..].join(" ");
    let name = name.trim();
    let current = session.store().state().list(&id).map(|l| l.name.as_str());
    if name.is_empty() || current == Some(name) {
        println!("List unchanged.");
        return Ok(());
    }

    session.rename_list(&id, name);
    println!("Renamed list {id} to {name}.");
    Ok(())
}

#[instrument(skip(session, args))]
fn cmd_droplist<P: Persistence>(session: &mut Session<P>, args: &[String]) -> anyhow::Result<()> {
    info!("command droplist");
    let target = first_arg(args, "droplist LIST")?;
    let id = resolve_list(session.store(), target)?;
    if id.is_inbox() {
        warn!("inbox deletion requested");
        println!("The inbox cannot be deleted.");
        return Ok(());
    }

    let before = session.store().tasks().len();
    session.delete_list(&id);
    let removed = before - session.store().tasks().len();
    println!("Deleted list {id} and {removed} task(s).");
    Ok(())
}

#[instrument(skip(session, args))]
fn cmd_use<P: Persistence>(session: &mut Session<P>, args: &[String]) -> anyhow::Result<()> {
    info!("command use");
    let target = first_arg(args, "use LIST")?;
    let id = resolve_list(session.store(), target)?;
    session.select_list(id.clone());
    println!("Switched to list {id}.");
    Ok(())
}

#[instrument(skip(session, args))]
fn cmd_add<P: Persistence>(session: &mut Session<P>, args: &[String]) -> anyhow::Result<()> {
    info!("command add");
    let (words, mods) = parse_words_and_mods(args)?;

    let mut due = None;
    for one_mod in mods {
        match one_mod {
            Mod::Due(value) => due = value,
            other => return Err(anyhow!("add: unsupported modifier {other:?}")),
        }
    }

    match session.add_task(&words.join(" "), due) {
        Some(id) => println!("Created task {id}."),
        None => println!("Task title is required."),
    }
    Ok(())
}

#[instrument(skip(session, args))]
fn cmd_done<P: Persistence>(session: &mut Session<P>, args: &[String]) -> anyhow::Result<()> {
    info!("command done");
    let target = first_arg(args, "done TASK")?;
    let id = resolve_task_ref(session.store(), target)?;
    session.toggle_task(&id);

    let done = session
        .store()
        .state()
        .task(&id)
        .map(|t| t.done)
        .unwrap_or_default();
    if done {
        println!("Completed task {id}.");
    } else {
        println!("Reopened task {id}.");
    }
    Ok(())
}

fn edit_request(store: &Store, args: &[String]) -> anyhow::Result<TaskPatch> {
    let (words, mods) = parse_words_and_mods(args)?;
    let mut edited = TaskPatch {
        title: (!words.is_empty()).then(|| words.join(" ")),
        ..TaskPatch::default()
    };

    for one_mod in mods {
        match one_mod {
            Mod::Due(value) => edited.due = Some(value),
            Mod::List(token) => edited.list_id = Some(resolve_list(store, &token)?),
            Mod::Done(value) => edited.done = Some(value),
        }
    }
    Ok(edited)
}

#[instrument(skip(session, args))]
fn cmd_edit<P: Persistence>(session: &mut Session<P>, args: &[String]) -> anyhow::Result<()> {
    info!("command edit");
    let target = first_arg(args, "edit TASK [TITLE...] [due:WHEN] [list:LIST] [done:yes|no]")?;
    let id = resolve_task_ref(session.store(), target)?;
    let edited = edit_request(session.store(), &args[1..])?;

    let current = session
        .store()
        .state()
        .task(&id)
        .ok_or_else(|| anyhow!("no task matches: {target}"))?;
    let patch = TaskPatch::diff_against(current, edited);
    if patch.is_empty() {
        println!("Nothing to change.");
        return Ok(());
    }

    debug!(task = %id, ?patch, "applying edit");
    session.edit_task(&id, patch);
    println!("Updated task {id}.");
    Ok(())
}

#[instrument(skip(session, args))]
fn cmd_delete<P: Persistence>(session: &mut Session<P>, args: &[String]) -> anyhow::Result<()> {
    info!("command delete");
    let target = first_arg(args, "delete TASK")?;
    let id = resolve_task_ref(session.store(), target)?;
    session.delete_task(&id);
    println!("Deleted task {id}.");
    Ok(())
}

fn cmd_export(store: &Store) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&store.snapshot())
        .context("failed to serialize snapshot")?;
    println!("{json}");
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "usage: listo [options] [command] [args]\n\n\
         commands:\n  \
           show                         sorted tasks of the active list (default)\n  \
           lists                        all lists\n  \
           newlist NAME...              create a list and switch to it\n  \
           rename LIST NAME...          rename a list\n  \
           droplist LIST                delete a list and its tasks\n  \
           use LIST                     switch the active list\n  \
           add TITLE... [due:WHEN]      add a task to the active list\n  \
           done TASK                    toggle completion\n  \
           edit TASK [TITLE...] [due:WHEN] [list:LIST] [done:yes|no]\n  \
           delete TASK                  delete a task\n  \
           export                       print the stored snapshot\n\n\
         TASK is a position in `show` output or a task id; LIST is an id or name.\n\
         WHEN is YYYY-MM-DDTHH:MM (or YYYY-MM-DD); an empty `due:` clears it."
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::ids::SequentialIds;
    use crate::persist::MemoryStorage;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn session() -> Session<MemoryStorage> {
        Session::open(MemoryStorage::new(), Box::new(SequentialIds::new("id")))
    }

    #[test]
    fn add_parses_due_modifier() {
        let mut session = session();
        cmd_add(&mut session, &args(&["Buy", "milk", "due:2024-01-01T10:00"])).expect("add");
        let task = &session.store().tasks()[0];
        assert_eq!(task.title, "Buy milk");
        assert_eq!(
            task.due,
            NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(10, 0, 0))
        );
    }

    #[test]
    fn literal_marker_keeps_modifier_text_in_title() {
        let (words, mods) =
            parse_words_and_mods(&args(&["--", "due:tomorrow"])).expect("parse");
        assert_eq!(words, vec!["due:tomorrow".to_string()]);
        assert!(mods.is_empty());
    }

    #[test]
    fn blank_add_is_rejected_without_error() {
        let mut session = session();
        cmd_add(&mut session, &args(&[])).expect("add");
        assert!(session.store().tasks().is_empty());
    }

    #[test]
    fn task_refs_resolve_by_position_then_id() {
        let mut session = session();
        let later = session.add_task("Later", None).expect("task created");
        let sooner = session
            .add_task(
                "Sooner",
                NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(9, 0, 0)),
            )
            .expect("task created");

        assert_eq!(resolve_task_ref(session.store(), "1").expect("ref"), sooner);
        assert_eq!(resolve_task_ref(session.store(), "2").expect("ref"), later);
        assert_eq!(
            resolve_task_ref(session.store(), later.as_str()).expect("ref"),
            later
        );
        assert!(resolve_task_ref(session.store(), "9").is_err());
    }

    #[test]
    fn lists_resolve_by_id_or_name() {
        let mut session = session();
        let work = session.add_list("Work");
        assert_eq!(resolve_list(session.store(), "Work").expect("by name"), work);
        assert_eq!(resolve_list(session.store(), work.as_str()).expect("by id"), work);
        assert!(resolve_list(session.store(), "Play").is_err());
    }

    #[test]
    fn edit_only_saves_when_something_changed() {
        let mut session = session();
        let id = session.add_task("Report", None).expect("task created");
        let saves = session.storage().save_count();

        cmd_edit(&mut session, &args(&[id.as_str(), "Report"])).expect("edit");
        assert_eq!(session.storage().save_count(), saves);

        cmd_edit(&mut session, &args(&[id.as_str(), "Final", "report", "done:yes"]))
            .expect("edit");
        let task = session.store().state().task(&id).expect("task");
        assert_eq!(task.title, "Final report");
        assert!(task.done);
        assert_eq!(session.storage().save_count(), saves + 1);
    }

    #[test]
    fn edit_moves_task_between_lists() {
        let mut session = session();
        let id = session.add_task("Report", None).expect("task created");
        let work = session.add_list("Work");
        cmd_edit(&mut session, &args(&[id.as_str(), "list:Work"])).expect("edit");
        assert_eq!(session.store().state().task(&id).expect("task").list_id, work);
    }

    #[test]
    fn rename_with_same_or_blank_name_is_skipped() {
        let mut session = session();
        let work = session.add_list("Work");
        let saves = session.storage().save_count();
        cmd_rename(&mut session, &args(&["Work", "  "])).expect("rename");
        cmd_rename(&mut session, &args(&["Work", "Work"])).expect("rename");
        assert_eq!(session.storage().save_count(), saves);

        cmd_rename(&mut session, &args(&["Work", " Office "])).expect("rename");
        assert_eq!(
            session.store().state().list(&work).map(|l| l.name.as_str()),
            Some("Office")
        );
    }

    #[test]
    fn droplist_refuses_inbox() {
        let mut session = session();
        session.add_task("Keep", None).expect("task created");
        cmd_droplist(&mut session, &args(&["inbox"])).expect("droplist");
        assert_eq!(session.store().lists().len(), 1);
        assert_eq!(session.store().tasks().len(), 1);
    }

    #[test]
    fn done_toggles_by_position() {
        let mut session = session();
        let id = session.add_task("Flip", None).expect("task created");
        cmd_done(&mut session, &args(&["1"])).expect("done");
        assert!(session.store().state().task(&id).expect("task").done);
    }

    #[test]
    fn abbreviation_requires_unique_prefix() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("dr", &known), Some("droplist"));
        assert_eq!(expand_command_abbrev("e", &known), None);
        assert_eq!(expand_command_abbrev("use", &known), Some("use"));
    }
}
