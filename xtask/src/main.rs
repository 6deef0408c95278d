use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const BINARY: &str = "rds_snapshot_encryptor";
const BINARY_PACKAGE: &str = "snapshot_migration_aws";

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the snapshot encryption workspace",
    long_about = "A unified CLI for CI checks, local runs, and release packaging\n\
                  of the rds_snapshot_encryptor tool."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run rds_snapshot_encryptor with the given arguments
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Build rds_snapshot_encryptor and zip it into dist/
    Package {
        /// Compilation target triple
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Build profile used for the binary
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Build the release binary and smoke-test its CLI
    Smoke,
    /// Run check + smoke
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn build_binary(target: Option<&str>, profile: BuildProfile) {
    let mut cargo_args = vec!["build", "-p", BINARY_PACKAGE, "--bin", BINARY];
    if let Some(target) = target {
        cargo_args.extend(["--target", target]);
    }
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);
}

fn package_binary(target: &str, profile: BuildProfile) {
    ensure_rust_target_installed(target);

    step("Build rds_snapshot_encryptor");
    build_binary(Some(target), profile);

    step("Package release archive");
    let binary_path = Path::new("target")
        .join(target)
        .join(profile.dir_name())
        .join(binary_name(target));
    let dist_dir = Path::new("dist");
    fs::create_dir_all(dist_dir).expect("failed to create dist directory");
    let zip_path = dist_dir.join(format!("{BINARY}-{target}.zip"));

    write_zip(&binary_path, &binary_name(target), &zip_path);
    eprintln!("\nPackaged artifact:\n- {}", zip_path.display());
}

fn ensure_rust_target_installed(target: &str) {
    let output = match Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
    {
        Ok(value) => value,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); continuing without target preflight"
            );
            return;
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "failed to list installed rust targets; run `rustup target list --installed` manually. details: {}",
            stderr.trim()
        );
    }

    let installed = String::from_utf8_lossy(&output.stdout);
    if !installed.lines().any(|line| line.trim() == target) {
        panic!(
            "required rust target `{target}` is not installed. install it with `rustup target add {target}` and re-run `cargo run -p xtask -- package`"
        );
    }
}

fn binary_name(target: &str) -> String {
    if target.contains("windows") {
        format!("{BINARY}.exe")
    } else {
        BINARY.to_string()
    }
}

fn write_zip(binary_path: &Path, entry_name: &str, zip_path: &Path) {
    if !binary_path.exists() {
        panic!("expected binary at '{}'", binary_path.display());
    }

    let binary = fs::read(binary_path).expect("failed to read binary");
    let file = fs::File::create(zip_path).expect("failed to create zip archive");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file(entry_name, options)
        .expect("failed to start binary entry in zip archive");
    zip.write_all(&binary).expect("failed to write binary entry");
    zip.finish().expect("failed to finish zip archive");
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test snapshot_migration_core");
    run_cargo(&["test", "-p", "snapshot_migration_core"]);

    step("Test snapshot_migration_aws");
    run_cargo(&["test", "-p", BINARY_PACKAGE]);
}

fn ci_smoke() {
    step("Build release binary");
    build_binary(None, BuildProfile::Release);

    step("Smoke-test CLI help");
    run_cargo(&[
        "run",
        "-p",
        BINARY_PACKAGE,
        "--bin",
        BINARY,
        "--release",
        "--",
        "--help",
    ]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => {
            let mut cargo_args = vec!["run", "-p", BINARY_PACKAGE, "--bin", BINARY, "--"];
            cargo_args.extend(args.iter().map(String::as_str));
            run_cargo(&cargo_args);
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Smoke => ci_smoke(),
                CiJob::All => {
                    ci_check();
                    ci_smoke();
                }
            }
            eprintln!("\nCI job passed.");
        }
        Commands::Package { target, profile } => {
            package_binary(&target, profile);
        }
    }
}
