use clap::{Parser, Subcommand};
use std::path::PathBuf;

use emberstage::defines::MacroStore;
use emberstage::executor::ExecCtx;
use emberstage::planner::StagingItem;
use emberstage::{Result, catalog, config, executor, planner};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the build definition and print the staging plan
    Plan {
        /// Path to a build definition TOML
        build: PathBuf,
    },
    /// Load the build definition, compute the plan, and stage the assets
    Run {
        /// Path to a build definition TOML
        build: PathBuf,
        /// Print what would be staged without touching the filesystem
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the merged macro store (headers plus build flags)
    Macros {
        /// Path to a build definition TOML
        build: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.cmd {
        Command::Plan { build } => cmd_plan(&build),
        Command::Run { build, dry_run } => cmd_run(&build, dry_run),
        Command::Macros { build } => cmd_macros(&build),
    }
}

fn compute_plan(path: &PathBuf) -> Result<(config::BuildEnv, Vec<StagingItem>)> {
    let env = config::load(path.as_path())?;
    let store = MacroStore::load(&env.system_header, &env.user_header, &env.flags);
    let plan = planner::plan(&catalog::builtin_catalog(), &store, &env.root)?;
    Ok((env, plan))
}

fn cmd_plan(path: &PathBuf) -> Result<()> {
    let (_env, plan) = compute_plan(path)?;
    for (i, item) in plan.iter().enumerate() {
        println!(
            "{:>3}. {:<6} {:<40} -> {}",
            i + 1,
            mode_label(item),
            item.source.display(),
            item.dest.display()
        );
    }
    Ok(())
}

fn mode_label(item: &StagingItem) -> &'static str {
    match item.mode {
        catalog::StageMode::Copy => "copy",
        catalog::StageMode::Embed { .. } => "embed",
    }
}

fn cmd_run(path: &PathBuf, dry_run: bool) -> Result<()> {
    let (env, plan) = compute_plan(path)?;
    let ctx = ExecCtx::new(dry_run);
    executor::run_plan(&plan, &env, &ctx)
}

fn cmd_macros(path: &PathBuf) -> Result<()> {
    let env = config::load(path.as_path())?;
    let store = MacroStore::load(&env.system_header, &env.user_header, &env.flags);
    for (name, value) in store.iter() {
        println!("{name} = {value:?}");
    }
    Ok(())
}
