use crate::{
    api::UsersApi,
    config::Config,
    directory::{Directory, Status},
    error::LoadFailed,
    model::{FilterChange, User, UserPatch},
    session::{FileTokenStore, Session},
    transcript::Transcript,
    Args,
};
use anyhow::{anyhow, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::io::{self, Write};

pub struct Context {
    pub args: Args,
    pub config: Config,
    pub api: Box<dyn UsersApi>,
    pub session: RefCell<Session<FileTokenStore>>,
    pub directory: RefCell<Directory>,
    pub transcript: RefCell<Transcript>,
    pub session_id: String,
}

/// A parsed user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Exit,
    Status,
    Login { email: String, password: String },
    Logout,
    List,
    Refresh,
    Page(u32),
    Next,
    Prev,
    Search(String),
    Filter(FilterChange),
    Show(u64),
    Edit { id: u64, patch: UserPatch },
    Delete(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

const HELP: &str = "\
Commands:
  login <email> <password>    - sign in
  logout                      - sign out
  status                      - show session and view state
  list                        - show the current page
  refresh                     - refetch the current page
  page <n> | next | prev      - change page
  search [text]               - search name and email (empty clears)
  filter active true|false|all
  filter role <name>|all
  show <id>                   - show one user
  edit <id> field=value ...   - update first_name, last_name, email
  delete <id>                 - delete a user
  help | exit";

pub fn parse_command(line: &str) -> Result<Command> {
    let words = shell_words::split(line)?;
    let Some((name, rest)) = words.split_first() else {
        return Err(anyhow!("Empty command"));
    };

    let command = match name.as_str() {
        "help" | "?" => Command::Help,
        "exit" | "quit" => Command::Exit,
        "status" => Command::Status,
        "login" => Command::Login {
            email: rest.first().cloned().unwrap_or_default(),
            password: rest.get(1).cloned().unwrap_or_default(),
        },
        "logout" => Command::Logout,
        "list" | "users" => Command::List,
        "refresh" => Command::Refresh,
        "page" => Command::Page(parse_number(rest.first(), "page <n>")?),
        "next" => Command::Next,
        "prev" => Command::Prev,
        "search" => Command::Search(rest.join(" ")),
        "filter" => Command::Filter(parse_filter(rest)?),
        "show" => Command::Show(parse_number(rest.first(), "show <id>")?),
        "edit" => {
            let id = parse_number(rest.first(), "edit <id> field=value ...")?;
            let mut patch = UserPatch::default();
            for assignment in rest.iter().skip(1) {
                let (field, value) = assignment
                    .split_once('=')
                    .ok_or_else(|| anyhow!("Expected field=value, got '{}'", assignment))?;
                if !patch.set(field, value) {
                    return Err(anyhow!(
                        "Unknown field '{}'. Editable: first_name, last_name, email",
                        field
                    ));
                }
            }
            if patch.is_empty() {
                return Err(anyhow!("Nothing to update. Usage: edit <id> field=value ..."));
            }
            Command::Edit { id, patch }
        }
        "delete" => Command::Delete(parse_number(rest.first(), "delete <id>")?),
        other => return Err(anyhow!("Unknown command: {}. Type 'help'.", other)),
    };
    Ok(command)
}

fn parse_number<T: std::str::FromStr>(word: Option<&String>, usage: &str) -> Result<T> {
    word.and_then(|w| w.parse().ok())
        .ok_or_else(|| anyhow!("Usage: {}", usage))
}

fn parse_filter(args: &[String]) -> Result<FilterChange> {
    let usage = || anyhow!("Usage: filter active true|false|all, filter role <name>|all");
    let (name, value) = match args {
        [name, value] => (name.as_str(), value.as_str()),
        _ => return Err(usage()),
    };

    match name {
        "active" => match value.to_lowercase().as_str() {
            "true" | "yes" | "active" => Ok(FilterChange::Active(Some(true))),
            "false" | "no" | "inactive" => Ok(FilterChange::Active(Some(false))),
            "all" | "any" => Ok(FilterChange::Active(None)),
            _ => Err(usage()),
        },
        "role" => match value {
            "all" | "any" => Ok(FilterChange::Role(None)),
            role => Ok(FilterChange::Role(Some(role.to_string()))),
        },
        _ => Err(usage()),
    }
}

pub fn run_once(ctx: &Context, line: &str) -> Result<()> {
    let command = parse_command(line)?;
    execute(ctx, command)?;
    Ok(())
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history = dirs::home_dir().map(|home| home.join(".userdesk").join("history.txt"));
    if let Some(path) = &history {
        rl.load_history(path).ok();
    }

    println!("userdesk - type 'help' for commands, 'exit' to quit");
    if !ctx.session.borrow().is_authenticated() {
        println!("Not logged in. Use: login <email> <password>");
    }

    loop {
        match rl.readline("userdesk> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                match parse_command(line).and_then(|command| execute(&ctx, command)) {
                    Ok(Flow::Exit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).ok();
        }
        rl.save_history(path).ok();
    }
    Ok(())
}

pub fn execute(ctx: &Context, command: Command) -> Result<Flow> {
    match command {
        Command::Help => println!("{}", HELP),
        Command::Exit => return Ok(Flow::Exit),
        Command::Status => print_status(ctx),
        Command::Login { email, password } => login(ctx, &email, &password)?,
        Command::Logout => {
            ctx.session.borrow_mut().logout();
            ctx.directory.borrow_mut().reset();
            ctx.transcript.borrow_mut().logout()?;
            println!("Logged out.");
        }
        Command::List => {
            let result = with_directory(ctx, true, |_, _| Ok(()));
            show_after_load(ctx, result)?;
        }
        Command::Refresh => {
            let result = with_directory(ctx, false, |directory, token| {
                let result = directory.fetch(ctx.api.as_ref(), token);
                record_load(ctx, directory, result)
            });
            show_after_load(ctx, result)?;
        }
        Command::Page(n) => go_to_page(ctx, |_| n)?,
        Command::Next => go_to_page(ctx, |current| current.saturating_add(1))?,
        Command::Prev => go_to_page(ctx, |current| current.saturating_sub(1))?,
        Command::Search(text) => {
            let result = with_directory(ctx, false, |directory, token| {
                let result = directory.search(ctx.api.as_ref(), token, &text);
                record_filter(ctx, directory)?;
                record_load(ctx, directory, result)
            });
            show_after_load(ctx, result)?;
        }
        Command::Filter(change) => {
            let result = with_directory(ctx, false, |directory, token| {
                let result = directory.set_filter(ctx.api.as_ref(), token, change);
                record_filter(ctx, directory)?;
                record_load(ctx, directory, result)
            });
            show_after_load(ctx, result)?;
        }
        Command::Show(id) => {
            with_directory(ctx, true, |directory, _| {
                let user = directory
                    .user(id)
                    .ok_or_else(|| anyhow!("User {} is not on the current page", id))?;
                println!("{}", render_user(user));
                if let Some(avatar) = &user.avatar {
                    println!("  avatar: {}", avatar);
                }
                Ok(())
            })?;
        }
        Command::Edit { id, patch } => {
            with_directory(ctx, true, |directory, token| {
                match directory.update_user(ctx.api.as_ref(), token, id, &patch) {
                    Ok(user) => {
                        ctx.transcript
                            .borrow_mut()
                            .user_updated(id, &serde_json::to_value(&patch)?)?;
                        println!("Updated {}", render_user(&user));
                        Ok(())
                    }
                    Err(e) => {
                        ctx.transcript
                            .borrow_mut()
                            .user_update_failed(id, &e.to_string())?;
                        Err(e.into())
                    }
                }
            })?;
        }
        Command::Delete(id) => {
            with_directory(ctx, true, |directory, token| {
                let Some(user) = directory.user(id) else {
                    return Err(anyhow!("User {} is not on the current page", id));
                };
                if !confirm_delete(ctx, user) {
                    println!("Cancelled.");
                    return Ok(());
                }
                match directory.delete_user(ctx.api.as_ref(), token, id) {
                    Ok(user) => {
                        ctx.transcript.borrow_mut().user_deleted(id)?;
                        println!("Deleted {}", user.full_name());
                        Ok(())
                    }
                    Err(e) => {
                        ctx.transcript
                            .borrow_mut()
                            .user_delete_failed(id, &e.to_string())?;
                        Err(e.into())
                    }
                }
            })?;
        }
    }
    Ok(Flow::Continue)
}

fn login(ctx: &Context, email: &str, password: &str) -> Result<()> {
    let result = ctx
        .session
        .borrow_mut()
        .login(ctx.api.as_ref(), email, password);
    match result {
        Ok(()) => {
            ctx.directory.borrow_mut().reset();
            ctx.transcript.borrow_mut().login(email, true, None)?;
            println!("Logged in as {}", email);
            Ok(())
        }
        Err(e) => {
            ctx.transcript
                .borrow_mut()
                .login(email, false, Some(&e.to_string()))?;
            Err(e.into())
        }
    }
}

/// Move relative to the resident page; out-of-range targets are clamped.
/// The first page is loaded first so the page count is known.
fn go_to_page(ctx: &Context, target: impl FnOnce(u32) -> u32) -> Result<()> {
    let result = with_directory(ctx, true, |directory, token| {
        let page = target(directory.page());
        let result = directory.set_page(ctx.api.as_ref(), token, page);
        record_load(ctx, directory, result)
    });
    show_after_load(ctx, result)
}

/// Print the view after a command that loads users. A failed load still
/// shows the resident page with its error banner before the error is
/// returned.
fn show_after_load(ctx: &Context, result: Result<()>) -> Result<()> {
    match result {
        Err(e) if !e.is::<LoadFailed>() => Err(e),
        result => {
            print_view(&ctx.directory.borrow());
            result
        }
    }
}

/// Run `f` against the directory with the session token. Requires a
/// logged-in session. With `load_first`, an idle directory loads its
/// first page before `f` runs; commands that fetch on their own pass
/// `false`.
fn with_directory<F>(ctx: &Context, load_first: bool, f: F) -> Result<()>
where
    F: FnOnce(&mut Directory, Option<&str>) -> Result<()>,
{
    let session = ctx.session.borrow();
    if !session.is_authenticated() {
        return Err(anyhow!("Not logged in. Use: login <email> <password>"));
    }
    let token = session.token();
    let mut directory = ctx.directory.borrow_mut();

    if load_first && directory.status() == Status::Idle {
        let result = directory.fetch(ctx.api.as_ref(), token);
        record_load(ctx, &directory, result)?;
    }
    f(&mut directory, token)
}

fn record_load(ctx: &Context, directory: &Directory, result: Result<(), LoadFailed>) -> Result<()> {
    let mut transcript = ctx.transcript.borrow_mut();
    match result {
        Ok(()) => {
            transcript.page_loaded(
                directory.page(),
                directory.total_pages(),
                directory.users().len(),
            )?;
            Ok(())
        }
        Err(e) => {
            transcript.page_failed(directory.requested_page())?;
            Err(e.into())
        }
    }
}

fn record_filter(ctx: &Context, directory: &Directory) -> Result<()> {
    let criteria = directory.criteria();
    ctx.transcript.borrow_mut().filter(
        &criteria.search_term,
        criteria.active,
        criteria.role.as_deref(),
    )
}

/// Ask before deleting. One-shot mode never prompts: it needs --yes.
fn confirm_delete(ctx: &Context, user: &User) -> bool {
    if ctx.args.yes || !ctx.config.display.confirm_delete {
        return true;
    }
    if ctx.args.command.is_some() {
        eprintln!(
            "Refusing to delete {} without confirmation - use --yes with -c",
            user.full_name()
        );
        return false;
    }

    print!("Delete {}? [y/N]: ", user.full_name());
    io::stdout().flush().ok();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_ok() {
        let input = input.trim().to_lowercase();
        input == "y" || input == "yes"
    } else {
        false
    }
}

fn print_status(ctx: &Context) {
    let session = ctx.session.borrow();
    let directory = ctx.directory.borrow();
    println!("Session: {}", ctx.session_id);
    println!("Transcript: {:?}", ctx.transcript.borrow().path);
    println!("API: {}", ctx.config.api.base_url);
    println!(
        "Logged in: {} (token file: {})",
        if session.is_authenticated() { "yes" } else { "no" },
        session.store().path().display()
    );
    let state = match directory.status() {
        Status::Idle => "idle",
        Status::Loading => "loading",
        Status::Ready => "ready",
        Status::Failed => "failed",
    };
    println!(
        "Directory: {} (page {} of {})",
        state,
        directory.page(),
        directory.total_pages()
    );
    let criteria = directory.criteria();
    if criteria.is_unfiltered() {
        println!("Filters: none");
    } else {
        println!(
            "Filters: search={:?} active={} role={}",
            criteria.search_term,
            criteria
                .active
                .map_or("all".to_string(), |a| a.to_string()),
            criteria.role.as_deref().unwrap_or("all")
        );
    }
}

fn print_view(directory: &Directory) {
    for line in render_view(directory) {
        println!("{}", line);
    }
}

pub fn render_user(user: &User) -> String {
    let mut line = format!("#{} {} <{}>", user.id, user.full_name(), user.email);
    match user.active {
        Some(true) => line.push_str(" [active]"),
        Some(false) => line.push_str(" [inactive]"),
        None => {}
    }
    if let Some(role) = &user.role {
        line.push_str(&format!(" ({})", role));
    }
    line
}

pub fn render_view(directory: &Directory) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(error) = directory.error() {
        lines.push(format!("! {}", error));
    }
    if directory.is_loading() {
        lines.push("Loading...".to_string());
    }

    let summary = directory.summary();
    lines.push(format!(
        "Showing {} of {} users",
        summary.shown, summary.resident
    ));

    let filtered = directory.filtered();
    if filtered.is_empty() {
        lines.push("No users found matching your criteria".to_string());
    }
    lines.extend(filtered.into_iter().map(|user| format!("  {}", render_user(user))));

    if summary.shown > 0 && summary.total_pages > 1 {
        lines.push(format!(
            "Page {} of {} (next / prev / page <n>)",
            summary.page, summary.total_pages
        ));
    }
    lines
}
