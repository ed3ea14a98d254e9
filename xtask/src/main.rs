use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::process::{Command, Stdio};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "x")]
#[command(about = "Development automation for vmcore")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Library modules with their own unit tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Module {
    Cpu,
    Memory,
    Mmu,
    Timing,
    Executor,
    Devices,
    Snapshot,
    System,
}

impl Module {
    /// Test name filters covering the module
    fn filters(self) -> &'static [&'static str] {
        match self {
            Module::Cpu => &["core::cpu"],
            Module::Memory => &["core::memory"],
            Module::Mmu => &["core::mmu"],
            Module::Timing => &["core::timing"],
            Module::Executor => &["core::executor"],
            Module::Devices => &[
                "core::interrupt",
                "core::timer",
                "core::video",
                "core::controller",
                "core::audio",
                "core::cdrom",
            ],
            Module::Snapshot => &["core::save_state"],
            Module::System => &["core::system"],
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run all CI checks (fmt, clippy, build, test)
    Ci {
        #[arg(long)]
        verbose: bool,
    },
    /// Quick checks before commit (fmt, clippy)
    Check {
        #[arg(long)]
        verbose: bool,
    },
    /// Format code
    Fmt {
        #[arg(long)]
        check: bool,
    },
    /// Run clippy
    Clippy {
        #[arg(long)]
        fix: bool,
    },
    /// Build the project
    Build {
        #[arg(long)]
        release: bool,
    },
    /// Run tests
    Test {
        #[arg(long)]
        doc: bool,
        #[arg(long)]
        ignored: bool,
        /// Run only the unit tests of these modules
        #[arg(short, long, value_enum)]
        module: Vec<Module>,
    },
    /// Run benchmarks
    Bench,
    /// Run the demo under both executors and compare the final registers
    CrossCheck {
        /// Cycles to run
        #[arg(short = 'n', long, default_value = "200000")]
        cycles: u64,
        /// Build in release mode
        #[arg(long)]
        release: bool,
    },
    /// Pre-commit hook (fmt, clippy, test)
    PreCommit,
    /// Install git hooks
    InstallHooks,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci { verbose } => run_ci(verbose),
        Commands::Check { verbose } => run_check(verbose),
        Commands::Fmt { check } => run_fmt(check),
        Commands::Clippy { fix } => run_clippy(fix),
        Commands::Build { release } => run_build(release),
        Commands::Test {
            doc,
            ignored,
            module,
        } => run_test(doc, ignored, &module),
        Commands::Bench => run_bench(),
        Commands::CrossCheck { cycles, release } => run_cross_check(cycles, release),
        Commands::PreCommit => run_pre_commit(),
        Commands::InstallHooks => install_hooks(),
    }
}

/// A named step of a pipeline
type Step = (&'static str, fn() -> Result<()>);

const FMT_CHECK: Step = ("Format Check", || run_fmt(true));
const CLIPPY: Step = ("Clippy", || run_clippy(false));
const BUILD: Step = ("Build", || run_build(false));
const TEST: Step = ("Test", || run_test(false, false, &[]));
const CROSS_CHECK: Step = ("Cross-check", || run_cross_check(200_000, false));

/// Run `steps` in order, stopping at the first failure
fn run_pipeline(title: &str, done: &str, steps: &[Step], verbose: bool) -> Result<()> {
    println!("{}", format!("=== {} ===", title).bold().blue());

    let start = Instant::now();
    for &(name, step) in steps {
        run_task(name, step, verbose)?;
    }

    println!(
        "\n{} {}",
        format!("✓ {} in", done).green().bold(),
        format!("{:.2}s", start.elapsed().as_secs_f64()).bold()
    );
    Ok(())
}

fn run_ci(verbose: bool) -> Result<()> {
    run_pipeline(
        "Running CI Pipeline",
        "CI passed",
        &[FMT_CHECK, CLIPPY, BUILD, TEST, CROSS_CHECK],
        verbose,
    )
}

fn run_check(verbose: bool) -> Result<()> {
    run_pipeline(
        "Running Quick Checks",
        "Checks passed",
        &[FMT_CHECK, CLIPPY],
        verbose,
    )
}

fn run_fmt(check: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("fmt").arg("--all");

    if check {
        cmd.arg("--").arg("--check");
    }

    execute_command(&mut cmd)
}

fn run_clippy(fix: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("clippy").arg("--all-targets").arg("--all-features");

    if fix {
        cmd.arg("--fix");
    } else {
        cmd.arg("--").arg("-D").arg("warnings");
    }

    execute_command(&mut cmd)
}

fn run_build(release: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("build");

    if release {
        cmd.arg("--release");
    }

    execute_command(&mut cmd)
}

fn run_test(doc: bool, ignored: bool, modules: &[Module]) -> Result<()> {
    if doc {
        let mut cmd = Command::new("cargo");
        cmd.arg("test").arg("--all-features").arg("--doc");

        if ignored {
            cmd.arg("--").arg("--ignored");
        }

        return execute_command(&mut cmd);
    }

    if modules.is_empty() {
        let mut cmd = Command::new("cargo");
        cmd.arg("test").arg("--all-features");

        if ignored {
            cmd.arg("--").arg("--ignored");
        }

        return execute_command(&mut cmd);
    }

    let mut failed = Vec::new();

    for &module in modules {
        let name = format!("{:?}", module);
        println!("{} Running {} tests...", "→".blue(), name.bold());

        let mut module_ok = true;
        for filter in module.filters() {
            let mut cmd = Command::new("cargo");
            cmd.arg("test").arg("--all-features").arg("--lib").arg(filter);

            if ignored {
                cmd.arg("--").arg("--ignored");
            }

            if execute_command(&mut cmd).is_err() {
                module_ok = false;
            }
        }

        if module_ok {
            println!("{} {} tests passed\n", "✓".green(), name);
        } else {
            println!("{} {} tests failed\n", "✗".red(), name);
            failed.push(name);
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("Module tests failed: {}", failed.join(", "))
    }
}

fn run_bench() -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("bench");

    execute_command(&mut cmd)
}

/// Run the built-in demo with `--dump-registers` and capture the JSON
fn dump_registers(executor: &str, cycles: u64, release: bool) -> Result<String> {
    let mut cmd = Command::new("cargo");
    cmd.arg("run").arg("--quiet").arg("--bin").arg("vmcore");

    if release {
        cmd.arg("--release");
    }

    cmd.arg("--")
        .arg("--executor")
        .arg(executor)
        .arg("--cycles")
        .arg(cycles.to_string())
        .arg("--dump-registers")
        .env("RUST_LOG", "warn");

    let output = cmd
        .stderr(Stdio::inherit())
        .output()
        .with_context(|| format!("failed to run vmcore with the {} executor", executor))?;

    if !output.status.success() {
        anyhow::bail!("vmcore ({}) failed with exit code: {}", executor, output.status);
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn run_cross_check(cycles: u64, release: bool) -> Result<()> {
    println!("{}", "=== Executor Cross-check ===".bold().blue());
    println!("{} Cycles: {}", "→".blue(), cycles.to_string().bold());
    println!(
        "{} Build mode: {}",
        "→".blue(),
        if release {
            "release".green().bold()
        } else {
            "debug".yellow().bold()
        }
    );
    println!();

    let start = Instant::now();

    let interpreted = dump_registers("interpreter", cycles, release)?;
    let recompiled = dump_registers("recompiler", cycles, release)?;

    if interpreted != recompiled {
        println!("{} Register dumps differ", "✗".red().bold());
        println!("--- interpreter\n{}", interpreted);
        println!("--- recompiler\n{}", recompiled);
        anyhow::bail!("executors disagree after {} cycles", cycles);
    }

    let elapsed = start.elapsed();
    println!(
        "{} Executors agree ({})",
        "✓".green().bold(),
        format!("{:.2}s", elapsed.as_secs_f64()).bold()
    );

    Ok(())
}

fn run_pre_commit() -> Result<()> {
    run_pipeline(
        "Pre-commit Checks",
        "Pre-commit checks passed",
        &[FMT_CHECK, CLIPPY, TEST],
        false,
    )
}

fn install_hooks() -> Result<()> {
    use std::fs;

    println!("{}", "Installing git hooks...".bold());

    let hook_content = r#"#!/bin/sh
# Auto-generated by cargo x install-hooks
set -e

echo "Running pre-commit checks..."
cargo x pre-commit
"#;

    let hook_path = ".git/hooks/pre-commit";
    fs::write(hook_path, hook_content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = fs::metadata(hook_path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(hook_path, perms)?;
    }

    println!("{}", "✓ Git hooks installed".green());
    println!("  Pre-commit hook will run: fmt, clippy, test");

    Ok(())
}

fn run_task<F>(name: &str, task: F, verbose: bool) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    print!("{} {} ... ", "→".blue(), name);

    let start = Instant::now();

    match task() {
        Ok(_) => {
            let elapsed = start.elapsed();
            println!(
                "{} {}",
                "✓".green().bold(),
                if verbose {
                    format!("({:.2}s)", elapsed.as_secs_f64())
                } else {
                    String::new()
                }
            );
            Ok(())
        }
        Err(e) => {
            println!("{}", "✗".red().bold());
            Err(e)
        }
    }
}

fn execute_command(cmd: &mut Command) -> Result<()> {
    let status = cmd
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()?;

    if !status.success() {
        anyhow::bail!("Command failed with exit code: {}", status);
    }

    Ok(())
}
