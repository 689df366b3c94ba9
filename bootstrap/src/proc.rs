//! Process execution helpers shared by `RUN`/`START` and the Python sandbox
//! bootstrap. Grounded on `nitro.go`'s `execCommand` (captured output, fails
//! on non-zero exit) and `startCommand` (inherited stdio).

use tokio::process::Command;

use crate::error::{BootstrapError, BootstrapResult};

fn apply_env(command: &mut Command, env: &[String]) {
    command.env_clear();
    command.envs(env.iter().filter_map(|kv| kv.split_once('=')));
}

/// Runs `name args…` synchronously, capturing stdout and stderr. Fails on a
/// non-zero exit code, printing combined output first when `verbose` is set
/// or the command failed — matching `execCommand`'s `CombinedOutput` +
/// conditional print.
pub async fn exec_command(
    name: &str,
    args: &[String],
    env: &[String],
    verbose: bool,
) -> BootstrapResult<()> {
    println!("Running {name} {args:?}");

    let mut command = Command::new(name);
    command.args(args);
    apply_env(&mut command, env);

    let output = command
        .output()
        .await
        .map_err(|e| BootstrapError::CommandFailed(name.to_string(), args.to_vec(), e.to_string()))?;

    let combined = [&output.stdout[..], &output.stderr[..]].concat();
    let printable = String::from_utf8_lossy(&combined);

    if verbose || !output.status.success() {
        println!("{printable}");
    }

    if !output.status.success() {
        return Err(BootstrapError::CommandFailed(
            name.to_string(),
            args.to_vec(),
            format!("exit status {}", output.status),
        ));
    }

    Ok(())
}

/// Runs `name args…` with inherited stdio, for `START`.
pub async fn start_command(name: &str, args: &[String], env: &[String]) -> BootstrapResult<()> {
    println!("Starting {name} {args:?}");

    let mut command = Command::new(name);
    command.args(args);
    apply_env(&mut command, env);

    let status = command
        .status()
        .await
        .map_err(|e| BootstrapError::CommandFailed(name.to_string(), args.to_vec(), e.to_string()))?;

    if !status.success() {
        return Err(BootstrapError::CommandFailed(
            name.to_string(),
            args.to_vec(),
            format!("exit status {status}"),
        ));
    }

    Ok(())
}

/// Mimics `exec.LookPath`: scans `PATH` for the first candidate that exists
/// and is executable.
pub fn which(candidates: &[&'static str]) -> Option<std::path::PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for candidate in candidates {
            let full = dir.join(candidate);
            if is_executable(&full) {
                return Some(full);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}
