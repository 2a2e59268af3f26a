use clap::{CommandFactory, Parser};
use std::io::{self, BufRead};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tasklist_cli::cli::{Cli, Command, collect_overrides};
use tasklist_core::config::{
    Config, Palette, load_config_with_fallback, merge_overrides, palette_for_theme,
};
use tasklist_core::controller::{Change, RenderedView, TaskList, remaining_label};
use tasklist_core::error::AppError;
use tasklist_core::model::{Task, parse_due_date};
use tasklist_core::stats::{self, DayCount};
use tasklist_core::storage::{FileStore, Persistence, store_dir};
use tasklist_core::sync::syncer_from_settings;
use tracing_subscriber::EnvFilter;

const CHART_WIDTH: usize = 20;

struct Session {
    tasks: TaskList<FileStore>,
    config: Config,
}

#[derive(Tabled)]
struct DayRow {
    #[tabled(rename = "Day")]
    day: &'static str,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Done")]
    completed: usize,
    #[tabled(rename = "Chart")]
    chart: String,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
}

fn open_session(raw_overrides: &[String]) -> Result<Session, AppError> {
    let loaded = load_config_with_fallback();
    if let Some(err) = loaded.error {
        tracing::warn!(error = %err, "falling back to default config");
    }
    let overrides = collect_overrides(raw_overrides)?;
    let config = merge_overrides(&loaded.config, &overrides);

    let store = FileStore::new(store_dir()?);
    let persistence = Persistence::new(store, syncer_from_settings(&config.sync));
    let mut tasks = TaskList::load(persistence);
    if let Some(filter) = config.default_filter {
        tasks.set_filter(filter);
    }

    Ok(Session { tasks, config })
}

fn print_task_json(task: &Task) {
    match serde_json::to_string(task) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("ERROR: {}", AppError::invalid_data(err.to_string())),
    }
}

fn report_change(verb: &str, change: &Change, palette: &Palette, json: bool) {
    if json {
        print_task_json(&change.task);
    } else {
        println!(
            "{} task: {} ({}) {}",
            verb,
            change.task.text,
            change.task.id,
            palette.badge(change.task.priority)
        );
    }

    if !change.saved {
        eprintln!("WARNING: change kept in memory but could not be saved");
    }
}

fn print_view(view: &RenderedView, palette: &Palette, json: bool) {
    if json {
        let payload = serde_json::json!({
            "filter": view.filter,
            "remaining": view.remaining,
            "empty": view.show_empty_state,
            "tasks": view.tasks,
        });
        println!("{payload}");
        return;
    }

    if view.show_empty_state {
        println!("No tasks yet. Add one with: add \"<text>\"");
    } else if view.tasks.is_empty() {
        println!("No {} tasks.", view.filter);
    }

    for task in &view.tasks {
        let mark = if task.completed { "[x]" } else { "[ ]" };
        let text = if task.completed {
            palette.mutedize(&task.text)
        } else {
            task.text.clone()
        };
        let due = task
            .due_date
            .as_deref()
            .map(|date| format!(" (due {date})"))
            .unwrap_or_default();
        println!(
            "{} {} {} | {}{}",
            mark,
            palette.badge(task.priority),
            task.id,
            text,
            due
        );
    }

    println!("{}", view.remaining_label());
}

fn print_stats(tasks: &TaskList<FileStore>, json: bool) {
    let offset = stats::local_offset();
    let days = stats::weekly_completions(tasks.tasks(), stats::local_today(offset), offset);
    let summary = tasks.summary();
    let week_total: usize = days.iter().map(|day| day.completed).sum();

    if json {
        let payload = serde_json::json!({
            "days": days.iter().map(day_json).collect::<Vec<_>>(),
            "completed_this_week": week_total,
            "total": summary.total,
            "completed": summary.completed,
            "remaining": summary.remaining,
        });
        println!("{payload}");
        return;
    }

    let max = days.iter().map(|day| day.completed).max().unwrap_or(0);
    let rows: Vec<DayRow> = days
        .iter()
        .map(|day| DayRow {
            day: day.short_weekday(),
            date: day.date.to_string(),
            completed: day.completed,
            chart: stats::bar(day.completed, max, CHART_WIDTH),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::psql()));
    println!("{week_total} completed this week");
    println!(
        "{} of {} total, {}",
        summary.completed,
        summary.total,
        remaining_label(summary.remaining)
    );
}

fn day_json(day: &DayCount) -> serde_json::Value {
    serde_json::json!({
        "date": day.date.to_string(),
        "weekday": day.short_weekday(),
        "completed": day.completed,
    })
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn split_command_line(line: &str) -> Result<Vec<String>, AppError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in line.chars() {
        if escape {
            if ch != '"' && ch != '\\' {
                current.push('\\');
            }
            current.push(ch);
            escape = false;
            continue;
        }

        if in_quotes && ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }

        if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(ch);
    }

    if in_quotes {
        return Err(AppError::invalid_input("unterminated quote in command"));
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}

fn print_help() {
    let mut cmd = Cli::command();
    let help = cmd.render_help();
    println!("{help}");
}

fn run_command(session: &mut Session, cli: Cli) -> Result<(), AppError> {
    let overrides = collect_overrides(&cli.config_override)?;
    let config = merge_overrides(&session.config, &overrides);

    if let Some(filter) = overrides.default_filter {
        session.tasks.set_filter(filter);
    }

    // Sync overrides hold for this command only.
    let previous_syncer = (overrides.sync_enabled.is_some() || overrides.sync_delay_ms.is_some())
        .then(|| {
            session
                .tasks
                .persistence_mut()
                .replace_syncer(syncer_from_settings(&config.sync))
        });

    let result = execute(&mut session.tasks, cli.command, &config, cli.json);

    if let Some(syncer) = previous_syncer {
        session.tasks.persistence_mut().replace_syncer(syncer);
    }
    result
}

fn execute(
    tasks: &mut TaskList<FileStore>,
    command: Command,
    config: &Config,
    json: bool,
) -> Result<(), AppError> {
    let palette = palette_for_theme(config.theme.as_deref());

    match command {
        Command::Add {
            text,
            priority,
            due,
        } => {
            let text = text.unwrap_or_default();
            let priority = priority.or(config.default_priority);

            let change = match due {
                Some(raw) => tasks.add_with_due(&text, priority, parse_due_date(&raw)?)?,
                None => tasks.add(&text, priority),
            }
            .ok_or_else(|| AppError::invalid_input("text is required"))?;

            report_change("Added", &change, &palette, json);
        }
        Command::Toggle { id } => {
            let change = tasks
                .toggle(&id)
                .ok_or_else(|| AppError::invalid_input("task not found"))?;
            let verb = if change.task.completed {
                "Completed"
            } else {
                "Reopened"
            };
            report_change(verb, &change, &palette, json);
        }
        Command::Delete { id } => {
            let change = tasks
                .delete(&id)
                .ok_or_else(|| AppError::invalid_input("task not found"))?;
            report_change("Deleted", &change, &palette, json);
        }
        Command::List { filter } => {
            if let Some(filter) = filter {
                tasks.set_filter(filter);
            }
            print_view(&tasks.rendered_view(), &palette, json);
        }
        Command::Filter { filter } => {
            tasks.set_filter(filter);
            print_view(&tasks.rendered_view(), &palette, json);
        }
        Command::Stats => print_stats(tasks, json),
    }

    Ok(())
}

fn run_interactive() -> Result<(), AppError> {
    let mut session = open_session(&[])?;

    // Footer line, reprinted whenever the remaining count moves.
    let mut last_remaining = None;
    session.tasks.subscribe(Box::new(move |view: &RenderedView| {
        if last_remaining != Some(view.remaining) {
            println!("{}", view.remaining_label());
            last_remaining = Some(view.remaining);
        }
    }));

    let mut input = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();

    loop {
        input.clear();
        let bytes = stdin_lock
            .read_line(&mut input)
            .map_err(|err| AppError::io(err.to_string()))?;

        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line == "help" || line == "?" {
            print_help();
            continue;
        }

        let args = match split_command_line(line) {
            Ok(args) => args,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                continue;
            }
        };

        if args.is_empty() {
            continue;
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("tasklist".to_string());
        argv.extend(args);

        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(err) => {
                eprintln!("ERROR: {}", normalize_parse_error(err));
                continue;
            }
        };

        if let Err(err) = run_command(&mut session, cli) {
            eprintln!("ERROR: {}", err);
        }
    }

    Ok(())
}

fn main() {
    init_tracing();

    let mut args = std::env::args_os();
    args.next();
    if args.next().is_none() {
        if let Err(err) = run_interactive() {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
        return;
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if !err.use_stderr() {
                let _ = err.print();
                return;
            }
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    let result = open_session(&cli.config_override)
        .and_then(|mut session| run_command(&mut session, cli));
    if let Err(err) = result {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
