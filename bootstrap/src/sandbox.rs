//! The bootstrap interpreter's one defined language binding: a private
//! Python virtual environment created once per target directory. Spec.md
//! §9 calls for this to be a tagged variant (`Python(config) | …`) so
//! adding a language later is a matter of adding a sibling variant plus its
//! own sandbox-prep routine. Grounded on `nitro.go`'s `newPythonEnv` /
//! `findPythonExecutable` / `newEnv`.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::error::{BootstrapError, BootstrapResult};
use crate::proc;

pub enum Env {
    Python(PythonEnv),
}

pub struct PythonEnv {
    venv_python: PathBuf,
}

impl Env {
    /// Dispatches on the main file's extension — the only binding spec.md
    /// §4.6 defines. `python_override` lets `--python PATH` skip `PATH`
    /// discovery entirely.
    pub async fn prepare(
        main_file: &Path,
        python_override: Option<&Path>,
        verbose: bool,
    ) -> BootstrapResult<Env> {
        match main_file.extension().and_then(|e| e.to_str()) {
            Some("py") => Ok(Env::Python(
                PythonEnv::bootstrap(python_override, verbose).await?,
            )),
            other => Err(BootstrapError::UnsupportedFileType(
                other.map(|e| format!(".{e}")).unwrap_or_default(),
            )),
        }
    }

    /// Rewrites the logical name `python` to the sandbox's interpreter path
    /// for `RUN`/`START`; any other name passes through unchanged.
    pub fn translate<'a>(&self, name: &'a str) -> Cow<'a, str> {
        match self {
            Env::Python(py) if name == "python" => {
                Cow::Owned(py.venv_python.to_string_lossy().into_owned())
            }
            _ => Cow::Borrowed(name),
        }
    }
}

#[cfg(not(windows))]
const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];
#[cfg(windows)]
const PYTHON_CANDIDATES: &[&str] = &["py", "python3", "python"];

impl PythonEnv {
    async fn bootstrap(python_override: Option<&Path>, verbose: bool) -> BootstrapResult<PythonEnv> {
        let exe = match python_override {
            Some(path) => path.to_path_buf(),
            None => find_python_executable()?,
        };

        let venv_dir = Path::new("venv");
        if venv_dir.exists() {
            println!("Virtual environment already available.");
        } else {
            println!("Creating virtual environment using {:?}...", exe);
            proc::exec_command(
                &exe.to_string_lossy(),
                &["-m".to_string(), "venv".to_string(), "venv".to_string()],
                &inherited_env(),
                verbose,
            )
            .await
            .map_err(|e| {
                BootstrapError::Directive(
                    "newPythonEnv".to_string(),
                    format!("error initializing virtual environment: {e}"),
                )
            })?;
        }

        let venv_python = venv_python_path();
        if venv_python.exists() {
            println!("Found {:?}", venv_python);
        } else {
            return Err(BootstrapError::Directive(
                "newPythonEnv".to_string(),
                format!("could not find Python executable at {venv_python:?}"),
            ));
        }

        println!("Bootstrapping pip...");
        proc::exec_command(
            &venv_python.to_string_lossy(),
            &[
                "-m".to_string(),
                "ensurepip".to_string(),
                "--upgrade".to_string(),
            ],
            &inherited_env(),
            verbose,
        )
        .await
        .map_err(|e| {
            BootstrapError::Directive(
                "newPythonEnv".to_string(),
                format!("error bootstrapping pip: {e}"),
            )
        })?;

        Ok(PythonEnv { venv_python })
    }
}

#[cfg(windows)]
fn venv_python_path() -> PathBuf {
    Path::new("venv").join("Scripts").join("python.exe")
}

#[cfg(not(windows))]
fn venv_python_path() -> PathBuf {
    Path::new("venv").join("bin").join("python")
}

fn find_python_executable() -> BootstrapResult<PathBuf> {
    proc::which(PYTHON_CANDIDATES).ok_or(BootstrapError::PythonNotFound(PYTHON_CANDIDATES.to_vec()))
}

/// The process's current environment as `NAME=VALUE` pairs, the seed for
/// every child's env list — `ENV` directives append to a copy of this,
/// exactly as `newEnv`'s `vars := os.Environ()` does.
pub fn inherited_env() -> Vec<String> {
    std::env::vars().map(|(k, v)| format!("{k}={v}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_only_rewrites_the_logical_python_name() {
        let env = Env::Python(PythonEnv {
            venv_python: PathBuf::from("venv/bin/python"),
        });
        assert_eq!(env.translate("python"), "venv/bin/python");
        assert_eq!(env.translate("python3"), "python3");
        assert_eq!(env.translate("ls"), "ls");
    }
}
