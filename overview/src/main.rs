use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use overview::catalog::{TomlCatalog, default_catalog_path, select_project};
use overview::core::{DescriptionListing, Outcome, ProjectMeta, TodoItem};
use overview::mutate::{self, Direction};
use overview::parser::parse_todo_section;
use overview::projectors::digest_projector;
use overview::storage::ProjectCatalog;
use overview::text::{ensure_parent_dir, write_atomic};
use overview::workspace::{Layout, inventory};
use overview::writer;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "overview",
    about = "Project overview documents: TODOs, status history and file listings",
    version
)]
struct Cli {
    /// Catalog file. Defaults to catalog.toml in the platform config directory.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the overview document if it does not exist yet.
    Ensure(ProjectArgs),

    /// List TODO items with their 1-based positions.
    Todos(TodosArgs),

    /// Add a TODO item at the top of the list.
    Add(AddArgs),

    /// Flip an item between open and done.
    Toggle(ItemArgs),

    /// Remove an item.
    Delete(ItemArgs),

    /// Swap an item with its neighbour.
    Move(MoveArgs),

    /// Rebuild the document, keeping Notes, TODO and Status History.
    Regenerate(ProjectArgs),

    /// Rewrite only the Files by Application and Datasheets listing.
    Refresh(ProjectArgs),

    /// Change the project status and record it in the document.
    Status(StatusArgs),

    /// Write the outstanding-TODO digest across all projects.
    Digest(DigestArgs),

    /// Print the overview document path.
    Path(ProjectArgs),
}

#[derive(Debug, Args)]
struct ProjectArgs {
    /// Display name (NUMBER_NAME_RevN) or project number for the latest revision.
    #[arg(long, short)]
    project: String,
}

#[derive(Debug, Args)]
struct TodosArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Include completed items.
    #[arg(long)]
    all: bool,
    /// Emit JSON instead of a human-readable list.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct AddArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Item text; multiple words are joined with spaces.
    #[arg(required = true)]
    text: Vec<String>,
}

#[derive(Debug, Args)]
struct ItemArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Position as shown by `todos`.
    item: usize,
}

#[derive(Debug, Args)]
struct MoveArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Position as shown by `todos`.
    item: usize,
    #[arg(value_enum)]
    direction: MoveDirection,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MoveDirection {
    Up,
    Down,
}

impl From<MoveDirection> for Direction {
    fn from(value: MoveDirection) -> Self {
        match value {
            MoveDirection::Up => Direction::Up,
            MoveDirection::Down => Direction::Down,
        }
    }
}

#[derive(Debug, Args)]
struct StatusArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// New status, e.g. "Active" or "On Hold".
    status: String,
}

#[derive(Debug, Args)]
struct DigestArgs {
    /// Write here instead of OutstandingTodos.txt under the engineering root.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Print the digest instead of writing a file.
    #[arg(long, conflicts_with = "output")]
    stdout: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut session = Session::open(cli.catalog)?;
    match cli.command {
        Commands::Ensure(args) => handle_ensure(&session, args),
        Commands::Todos(args) => handle_todos(&session, args),
        Commands::Add(args) => handle_add(&session, args),
        Commands::Toggle(args) => handle_toggle(&session, args),
        Commands::Delete(args) => handle_delete(&session, args),
        Commands::Move(args) => handle_move(&session, args),
        Commands::Regenerate(args) => handle_regenerate(&session, args),
        Commands::Refresh(args) => handle_refresh(&session, args),
        Commands::Status(args) => handle_status(&mut session, args),
        Commands::Digest(args) => handle_digest(&session, args),
        Commands::Path(args) => handle_path(&session, args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loaded catalog plus the layout its settings describe.
struct Session {
    catalog: TomlCatalog,
    layout: Layout,
}

impl Session {
    fn open(explicit: Option<PathBuf>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path,
            None => default_catalog_path()
                .context("no config directory on this platform; pass --catalog")?,
        };
        debug!(path = %path.display(), "loading catalog");
        let catalog = TomlCatalog::load(&path)?;
        let layout = catalog.settings().layout();
        Ok(Self { catalog, layout })
    }

    fn project(&self, args: &ProjectArgs) -> Result<ProjectMeta> {
        select_project(&self.catalog.projects()?, &args.project)
    }

    fn listing(&self, project: &ProjectMeta) -> Result<DescriptionListing> {
        Ok(inventory(&self.layout, project, &self.catalog.apps()?))
    }

    /// Resolve the project and make sure its overview exists.
    fn ensured(&self, args: &ProjectArgs) -> Result<(ProjectMeta, PathBuf)> {
        let project = self.project(args)?;
        let path = self.layout.overview_path(&project);
        let listing = self.listing(&project)?;
        writer::ensure_exists(&path, &project, &listing)
            .with_context(|| format!("creating {:?}", path))?;
        Ok((project, path))
    }
}

fn handle_ensure(session: &Session, args: ProjectArgs) -> Result<()> {
    let project = session.project(&args)?;
    let path = session.layout.overview_path(&project);
    let listing = session.listing(&project)?;
    let created = writer::ensure_exists(&path, &project, &listing)
        .with_context(|| format!("creating {:?}", path))?;
    if created {
        println!("created {}", path.display());
    } else {
        println!("exists {}", path.display());
    }
    Ok(())
}

fn handle_todos(session: &Session, args: TodosArgs) -> Result<()> {
    let TodosArgs { project, all, json } = args;
    let (_, path) = session.ensured(&project)?;
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
    let listed = numbered(parse_todo_section(&text), all);

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput<'a> {
            position: usize,
            #[serde(flatten)]
            item: &'a TodoItem,
        }

        let payload: Vec<JsonOutput<'_>> = listed
            .iter()
            .map(|(position, item)| JsonOutput {
                position: *position,
                item,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if listed.is_empty() {
        println!("no TODO items");
    } else {
        for (position, item) in &listed {
            println!("{position:>3}. {} {}", item.marker(), item.body());
        }
    }
    Ok(())
}

/// Attach 1-based positions from the full list, then drop completed items unless `all`.
fn numbered(items: Vec<TodoItem>, all: bool) -> Vec<(usize, TodoItem)> {
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| (idx + 1, item))
        .filter(|(_, item)| all || !item.is_completed)
        .collect()
}

fn handle_add(session: &Session, args: AddArgs) -> Result<()> {
    let (_, path) = session.ensured(&args.project)?;
    let text = args.text.join(" ");
    mutate::append_todo(&path, &text).with_context(|| format!("adding TODO to {:?}", path))?;
    println!("added: {text}");
    Ok(())
}

fn handle_toggle(session: &Session, args: ItemArgs) -> Result<()> {
    let (_, path) = session.ensured(&args.project)?;
    let outcome = mutate::toggle_item(&path, to_index(args.item)?)
        .with_context(|| format!("toggling item in {:?}", path))?;
    report(outcome, args.item, "toggled");
    Ok(())
}

fn handle_delete(session: &Session, args: ItemArgs) -> Result<()> {
    let (_, path) = session.ensured(&args.project)?;
    let outcome = mutate::delete_item(&path, to_index(args.item)?)
        .with_context(|| format!("deleting item from {:?}", path))?;
    report(outcome, args.item, "deleted");
    Ok(())
}

fn handle_move(session: &Session, args: MoveArgs) -> Result<()> {
    let (_, path) = session.ensured(&args.project)?;
    let outcome = mutate::move_item(&path, to_index(args.item)?, args.direction.into())
        .with_context(|| format!("moving item in {:?}", path))?;
    report(outcome, args.item, "moved");
    Ok(())
}

fn to_index(item: usize) -> Result<usize> {
    item.checked_sub(1).context("item positions start at 1")
}

fn report(outcome: Outcome, item: usize, verb: &str) {
    match outcome {
        Outcome::Applied => println!("{verb} item {item}"),
        Outcome::Unchanged => println!("nothing changed for item {item}"),
    }
}

fn handle_regenerate(session: &Session, args: ProjectArgs) -> Result<()> {
    let project = session.project(&args)?;
    let path = session.layout.overview_path(&project);
    let listing = session.listing(&project)?;
    writer::regenerate(&path, &project, &listing)
        .with_context(|| format!("regenerating {:?}", path))?;
    println!("regenerated {}", path.display());
    Ok(())
}

fn handle_refresh(session: &Session, args: ProjectArgs) -> Result<()> {
    let (project, path) = session.ensured(&args)?;
    let listing = session.listing(&project)?;
    writer::refresh_files_and_datasheets(&path, &listing)
        .with_context(|| format!("refreshing {:?}", path))?;
    println!("refreshed {}", path.display());
    Ok(())
}

fn handle_status(session: &mut Session, args: StatusArgs) -> Result<()> {
    let StatusArgs { project, status } = args;
    let status = status.trim().to_string();
    if status.is_empty() {
        anyhow::bail!("status must not be empty");
    }

    let (mut meta, path) = session.ensured(&project)?;
    if meta.status == status {
        println!("status is already {status}");
        return Ok(());
    }

    writer::record_status_change(&path, Some(&meta.status), &status)
        .with_context(|| format!("recording status in {:?}", path))?;
    session.catalog.set_status(meta.id, &status)?;
    session.catalog.save().context("saving catalog")?;

    // The header carries the status line; rebuild so it matches the catalog.
    meta.status = status.clone();
    let listing = session.listing(&meta)?;
    writer::regenerate(&path, &meta, &listing)
        .with_context(|| format!("regenerating {:?}", path))?;
    println!("{} -> {status}", meta.display_name());
    Ok(())
}

fn handle_digest(session: &Session, args: DigestArgs) -> Result<()> {
    let projects = digest_projector::collect_outstanding(&session.catalog, &session.layout)?;
    let text = digest_projector::render_digest(&projects, Local::now().naive_local());
    if args.stdout {
        print!("{text}");
        return Ok(());
    }

    let output = args
        .output
        .unwrap_or_else(|| session.layout.digest_path());
    ensure_parent_dir(&output)?;
    write_atomic(&output, &text).with_context(|| format!("writing digest {:?}", output))?;
    println!(
        "wrote {} outstanding items to {}",
        digest_projector::outstanding_count(&projects),
        output.display()
    );
    Ok(())
}

fn handle_path(session: &Session, args: ProjectArgs) -> Result<()> {
    let project = session.project(&args)?;
    println!("{}", session.layout.overview_path(&project).display());
    Ok(())
}
