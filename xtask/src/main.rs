use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

type TaskResult<T = ()> = Result<T, String>;

const LAMBDA_CRATE: &str = "artifact_relay_lambda";
const TESTED_CRATES: [&str; 2] = ["artifact_relay_core", LAMBDA_CRATE];
const DEFAULT_TARGET: &str = "x86_64-unknown-linux-gnu";

/// A Lambda entry point and the archive it ships in.
struct LambdaBinary {
    bin: &'static str,
    archive: &'static str,
}

const LAMBDAS: [LambdaBinary; 2] = [
    LambdaBinary {
        bin: "copy_files_lambda",
        archive: "copy_files.zip",
    },
    LambdaBinary {
        bin: "clean_bucket_lambda",
        archive: "clean_bucket.zip",
    },
];

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the artifact relay workspace"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI checks
    Ci {
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Build the relay Lambdas and zip each binary as `bootstrap`
    LambdaPackage {
        /// Compilation target triple for the Lambda runtime
        #[arg(long, default_value = DEFAULT_TARGET)]
        target: String,
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
        /// Directory receiving the zip archives
        #[arg(long, default_value = "dist")]
        out_dir: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and crate tests
    Check,
    /// Release build of both Lambda archives
    Package,
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn target_subdir(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }
}

fn cargo(args: &[&str]) -> TaskResult {
    eprintln!("+ cargo {}", args.join(" "));
    let status = Command::new("cargo")
        .args(args)
        .status()
        .map_err(|error| format!("failed to start cargo: {error}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("cargo {} exited with {status}", args[0]))
    }
}

/// Skipped with a warning when rustup itself is unavailable.
fn require_installed_target(target: &str) -> TaskResult {
    let Ok(output) = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
    else {
        eprintln!("warning: rustup not found, assuming target `{target}` is available");
        return Ok(());
    };

    let installed = String::from_utf8_lossy(&output.stdout);
    if installed.lines().any(|line| line.trim() == target) {
        Ok(())
    } else {
        Err(format!(
            "rust target `{target}` is not installed; run `rustup target add {target}`"
        ))
    }
}

fn build_lambdas(target: &str, profile: BuildProfile) -> TaskResult {
    let mut args = vec!["build", "-p", LAMBDA_CRATE, "--target", target];
    for lambda in &LAMBDAS {
        args.extend(["--bin", lambda.bin]);
    }
    if matches!(profile, BuildProfile::Release) {
        args.push("--release");
    }
    cargo(&args)
}

/// Lambda custom runtimes expect an executable named `bootstrap` at the archive root.
fn write_bootstrap_zip(binary: &Path, archive: &Path) -> TaskResult<usize> {
    let bytes = fs::read(binary)
        .map_err(|error| format!("cannot read lambda binary {}: {error}", binary.display()))?;
    let file = File::create(archive)
        .map_err(|error| format!("cannot create {}: {error}", archive.display()))?;

    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)
        .and_then(|_| zip.write_all(&bytes).map_err(Into::into))
        .and_then(|_| zip.finish().map(|_| ()))
        .map_err(|error| format!("cannot write {}: {error}", archive.display()))?;

    Ok(bytes.len())
}

fn package_lambdas(target: &str, profile: BuildProfile, out_dir: &Path) -> TaskResult {
    require_installed_target(target)?;
    build_lambdas(target, profile)?;

    fs::create_dir_all(out_dir)
        .map_err(|error| format!("cannot create {}: {error}", out_dir.display()))?;
    let build_dir = Path::new("target").join(target).join(profile.target_subdir());

    for lambda in &LAMBDAS {
        let archive = out_dir.join(lambda.archive);
        let size = write_bootstrap_zip(&build_dir.join(lambda.bin), &archive)?;
        eprintln!("packaged {} ({size} bytes) -> {}", lambda.bin, archive.display());
    }
    Ok(())
}

fn ci_check() -> TaskResult {
    cargo(&["fmt", "--all", "--", "--check"])?;
    cargo(&["clippy", "--all-targets", "--", "-D", "warnings"])?;
    for crate_name in TESTED_CRATES {
        cargo(&["test", "-p", crate_name])?;
    }
    Ok(())
}

fn run(cli: Cli) -> TaskResult {
    match cli.command {
        Commands::Ci { job } => {
            let package =
                || package_lambdas(DEFAULT_TARGET, BuildProfile::Release, Path::new("dist"));
            match job {
                CiJob::Check => ci_check(),
                CiJob::Package => package(),
                CiJob::All => ci_check().and_then(|_| package()),
            }
        }
        Commands::LambdaPackage {
            target,
            profile,
            out_dir,
        } => package_lambdas(&target, profile, &out_dir),
    }
}

fn main() {
    if let Err(message) = run(Cli::parse()) {
        eprintln!("error: {message}");
        exit(1);
    }
}
