use std::io::BufRead as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use scenebuild_core::document::ComponentRecord;
use scenebuild_core::editor::Editor;
use scenebuild_core::pipeline::{BuildObserver, BuildOptions, BuildStage, LogObserver, SceneBuilder};
use scenebuild_core::processor::ProcessorRegistry;
use scenebuild_core::registry::ComponentRegistry;
use scenebuild_core::session::{BuildSession, Pacing};
use scenebuild_core::storage::SceneStorage;
use scenebuild_data::{
    BuildDefinition, FsStorage, Preferences, default_component_registry, load_component_registry,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scenebuild", version, about = "Compose scene fragments into one built scene")]
struct Cli {
    /// Preferences file.
    #[arg(long, global = true, default_value = "scenebuild.toml")]
    prefs: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a build definition.
    Build(BuildArgs),
    /// Check that a build definition can run, without building.
    Check(ProjectArgs),
    /// Show or change preferences.
    Prefs(PrefsArgs),
}

#[derive(Args, Debug)]
struct ProjectArgs {
    /// Build definition (RON, TOML or JSON).
    definition: PathBuf,

    /// Asset root. Defaults to the definition's directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Component table, or a directory holding `components.{ron,toml,json}`.
    /// Defaults to the built-in table.
    #[arg(long)]
    components: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Wait for Enter between stages.
    #[arg(long, default_value_t = false)]
    manual: bool,

    /// Pause between stages in automatic mode.
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    /// Open the output when done, overriding the preference.
    #[arg(long)]
    load_result: Option<bool>,
}

#[derive(Args, Debug)]
struct PrefsArgs {
    /// Flip "load built scene on finish".
    #[arg(long, default_value_t = false)]
    toggle: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Build(args) => cmd_build(args, &cli.prefs),
        Command::Check(args) => cmd_check(args),
        Command::Prefs(args) => cmd_prefs(args, &cli.prefs),
    }
}

struct Project {
    definition: BuildDefinition,
    storage: FsStorage,
    registry: ComponentRegistry,
}

fn open_project(args: &ProjectArgs) -> anyhow::Result<Project> {
    let definition = BuildDefinition::load(&args.definition)
        .with_context(|| format!("load build definition '{}'", args.definition.display()))?;
    let root = match &args.root {
        Some(root) => root.clone(),
        None => args
            .definition
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let registry = match &args.components {
        Some(path) => load_component_registry(path)
            .with_context(|| format!("load component table '{}'", path.display()))?,
        None => default_component_registry(),
    };
    Ok(Project {
        definition,
        storage: FsStorage::new(root),
        registry,
    })
}

fn processors() -> ProcessorRegistry {
    let mut registry = ProcessorRegistry::new();
    scenebuild_processors::register_builtin(&mut registry);
    registry
}

/// Logs progress and prompts on stderr while waiting.
struct CliObserver {
    inner: LogObserver,
}

impl BuildObserver for CliObserver {
    fn on_progress(&mut self, label: &str, progress: f32) {
        self.inner.on_progress(label, progress);
    }

    fn on_suspended(&mut self, next: BuildStage) {
        eprintln!("next: {} (press Enter to continue)", next.label());
    }

    fn on_failure(&mut self, error: &scenebuild_core::pipeline::BuildError) {
        eprintln!("Failed to build scene: {error}");
    }
}

fn wait_for_enter(_: &BuildSession, _: BuildStage) {
    let mut line = String::new();
    // EOF or a closed stdin continues the build.
    let _ = std::io::stdin().lock().read_line(&mut line);
}

fn cmd_build(args: BuildArgs, prefs_path: &Path) -> anyhow::Result<()> {
    let project = open_project(&args.project)?;
    let prefs = Preferences::load(prefs_path)
        .with_context(|| format!("load preferences '{}'", prefs_path.display()))?;

    let options = BuildOptions {
        load_built_result: args.load_result.unwrap_or(prefs.load_built_scene_on_finish),
        pacing: if args.manual {
            Pacing::Manual
        } else {
            Pacing::Automatic {
                delay: Duration::from_millis(args.delay_ms),
            }
        },
    };

    let request = project.definition.to_request();
    info!(build = %request.name, fragments = request.fragments.len(), "starting build");

    let mut editor = Editor::with_registry(project.storage, project.registry);
    let builder = SceneBuilder::new(processors());
    let mut observer = CliObserver { inner: LogObserver };
    let run = builder.start(&mut editor, request, options, &mut observer)?;
    let report = run.run_to_completion(wait_for_enter)?;

    print!("{report}");
    for scene in editor.open_scenes() {
        info!(scene = scene.path().unwrap_or("<untitled>"), "open after build");
    }
    Ok(())
}

fn cmd_check(args: ProjectArgs) -> anyhow::Result<()> {
    let project = open_project(&args)?;
    let def = &project.definition;
    let mut problems = 0usize;

    if !def.can_build() {
        println!("error: build '{}' has no output path", def.name);
        problems += 1;
    }
    if def.main_index >= def.fragments.len() {
        println!(
            "error: main index {} is out of range for {} fragments",
            def.main_index,
            def.fragments.len()
        );
        problems += 1;
    }

    for (index, reference) in def.fragments.iter().enumerate() {
        let main = if index == def.main_index { " (main)" } else { "" };
        let Some(reference) = reference else {
            println!("#{index}{main}: null");
            if !main.is_empty() {
                problems += 1;
            }
            continue;
        };
        let Some(path) = project.storage.resolve(reference) else {
            println!("#{index}{main}: '{reference}' not found");
            if !main.is_empty() {
                problems += 1;
            }
            continue;
        };
        match project.storage.read(&path) {
            Ok(doc) => {
                let manifests = doc
                    .nodes
                    .iter()
                    .flat_map(|n| &n.components)
                    .filter(|c| matches!(c, ComponentRecord::FragmentManifest(_)))
                    .count();
                println!(
                    "#{index}{main}: '{path}' {} nodes, {manifests} manifest(s)",
                    doc.nodes.len()
                );
            }
            Err(e) => {
                println!("#{index}{main}: '{path}' unreadable: {e}");
                problems += 1;
            }
        }
    }

    if problems > 0 {
        anyhow::bail!("{problems} problem(s) in '{}'", args.definition.display());
    }
    println!("ok");
    Ok(())
}

fn cmd_prefs(args: PrefsArgs, path: &Path) -> anyhow::Result<()> {
    let prefs = if args.toggle {
        Preferences::toggle_load_built_scene(path)
    } else {
        Preferences::load(path)
    }
    .with_context(|| format!("preferences '{}'", path.display()))?;
    if !path.exists() {
        warn!(path = %path.display(), "preferences file does not exist, showing defaults");
    }
    println!("load_built_scene_on_finish = {}", prefs.load_built_scene_on_finish);
    Ok(())
}
