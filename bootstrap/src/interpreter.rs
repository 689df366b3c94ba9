//! Executes the parsed directive sequence against a prepared [`Env`].
//! Grounded on `nitro.go`'s `interpret`, with the directive dispatch kept in
//! one `match` the same way the original does. Variable expansion
//! (`__path__`/`__dir__`/`__file__`/`__name__`/`__ext__`) is this spec's own
//! extension (spec.md §4.6) — `original_source/` has no analogue to ground
//! it on.

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{BootstrapError, BootstrapResult};
use crate::fetch;
use crate::header::HeaderCommand;
use crate::pathsafe;
use crate::proc;
use crate::sandbox::{self, Env};

/// Properties of the main file's local path substituted into directive
/// arguments. Unknown `__xxx__` tokens are left intact (spec.md §4.6).
pub struct MainFileVars {
    path: String,
    dir: String,
    file: String,
    name: String,
    ext: String,
}

impl MainFileVars {
    pub fn new(main_file: &Path) -> MainFileVars {
        MainFileVars {
            path: main_file.to_string_lossy().into_owned(),
            dir: main_file
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file: main_file
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default(),
            name: main_file
                .file_stem()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ext: main_file
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
        }
    }

    pub fn expand(&self, arg: &str) -> String {
        arg.replace("__path__", &self.path)
            .replace("__dir__", &self.dir)
            .replace("__file__", &self.file)
            .replace("__name__", &self.name)
            .replace("__ext__", &self.ext)
    }
}

pub struct Interpreter<'a> {
    cwd: &'a Path,
    vars: &'a MainFileVars,
    client: reqwest::Client,
    env: Env,
    run_env: Vec<String>,
    base_url: Option<Url>,
    source_url: Option<Url>,
    verbose: bool,
    start_enabled: bool,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        cwd: &'a Path,
        vars: &'a MainFileVars,
        client: reqwest::Client,
        env: Env,
        source_url: Option<Url>,
        verbose: bool,
        start_enabled: bool,
    ) -> Interpreter<'a> {
        Interpreter {
            cwd,
            vars,
            client,
            env,
            run_env: sandbox::inherited_env(),
            base_url: None,
            source_url,
            verbose,
            start_enabled,
        }
    }

    /// Runs every directive in order. Any directive failure aborts the
    /// remaining script, the error naming the directive it came from
    /// (spec.md §7).
    pub async fn run(&mut self, commands: &[HeaderCommand]) -> BootstrapResult<()> {
        for command in commands {
            self.dispatch(command)
                .await
                .map_err(|e| BootstrapError::Directive(command.opcode.clone(), e.to_string()))?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, command: &HeaderCommand) -> BootstrapResult<()> {
        match command.opcode.as_str() {
            "#" => Ok(()),
            "ENV" => self.do_env(&command.args),
            "ECHO" => self.do_echo(&command.args),
            "SHOW" => self.do_show(&command.args).await,
            "FROM" => self.do_from(&command.args),
            "GET" => self.do_get(&command.args).await,
            "FILE" => self.do_file(&command.args).await,
            "RUN" => self.do_run(&command.args).await,
            "START" => self.do_start(&command.args).await,
            other => Err(BootstrapError::UnknownCommand(other.to_string())),
        }
    }

    /// `ENV NAME VALUE` — appends `NAME=<expanded VALUE>` to the process env
    /// used by every later `RUN`/`START`. Spec.md §9 open question (ii):
    /// expansion applies only to `VALUE`, matching `nitro.go`'s
    /// `name+"="+value` (only `value` ever ran through expansion upstream).
    fn do_env(&mut self, args: &[String]) -> BootstrapResult<()> {
        let [name, value] = args else {
            return Err(BootstrapError::Arity("ENV", "ENV name value", args.to_vec()));
        };
        self.run_env.push(format!("{name}={}", self.vars.expand(value)));
        Ok(())
    }

    fn do_echo(&self, args: &[String]) -> BootstrapResult<()> {
        let expanded: Vec<String> = args.iter().map(|a| self.vars.expand(a)).collect();
        println!("{}", expanded.join(" "));
        Ok(())
    }

    async fn do_show(&self, args: &[String]) -> BootstrapResult<()> {
        let [raw_path] = args else {
            return Err(BootstrapError::Arity("SHOW", "SHOW file-path", args.to_vec()));
        };
        let path = pathsafe::resolve(self.cwd, &self.vars.expand(raw_path))?;
        show_file(&path).await
    }

    fn do_from(&mut self, args: &[String]) -> BootstrapResult<()> {
        let [raw_url] = args else {
            return Err(BootstrapError::Arity("FROM", "FROM base-url", args.to_vec()));
        };
        self.base_url = Some(Url::parse(&self.vars.expand(raw_url))?);
        Ok(())
    }

    /// `GET URL [DEST]` — relative URLs resolve against `FROM` when set,
    /// else against the URL the main file itself was downloaded from
    /// (spec.md §4.6); with neither available there is nothing to resolve
    /// against and the directive fails.
    async fn do_get(&mut self, args: &[String]) -> BootstrapResult<()> {
        let (raw_url, raw_dest) = match args {
            [url] => (url.clone(), String::new()),
            [url, dest] => (url.clone(), dest.clone()),
            _ => {
                return Err(BootstrapError::Arity(
                    "GET",
                    "GET remote-url [local-path]",
                    args.to_vec(),
                ))
            }
        };

        let url = self.vars.expand(&raw_url);
        let dest = self.vars.expand(&raw_dest);

        let resolved = if fetch::is_url(&url) {
            url
        } else if let Some(base) = self.base_url.as_ref().or(self.source_url.as_ref()) {
            base.join(&url)?.to_string()
        } else {
            return Err(BootstrapError::NoBaseUrl(url));
        };

        fetch::download_file(&self.client, self.cwd, &resolved, &dest).await?;
        Ok(())
    }

    /// `FILE PATH MARKER` — the heredoc's contents were already collected by
    /// [`crate::header::parse`]; here they're just written out verbatim
    /// (byte-for-byte, after variable expansion) to a path-safe location.
    async fn do_file(&self, args: &[String]) -> BootstrapResult<()> {
        let [raw_path, contents] = args else {
            return Err(BootstrapError::Arity(
                "FILE",
                "FILE target-path eof-marker",
                args.to_vec(),
            ));
        };
        let path = pathsafe::resolve(self.cwd, &self.vars.expand(raw_path))?;
        tokio::fs::write(&path, self.vars.expand(contents)).await?;
        Ok(())
    }

    async fn do_run(&self, args: &[String]) -> BootstrapResult<()> {
        let (name, rest) = self.translate_command(args, "RUN", "RUN cmd args...")?;
        proc::exec_command(&name, &rest, &self.run_env, self.verbose).await
    }

    /// `START CMD args…` — skipped entirely in *clone* mode (spec.md §4.6).
    async fn do_start(&self, args: &[String]) -> BootstrapResult<()> {
        if !self.start_enabled {
            return Ok(());
        }
        let (name, rest) = self.translate_command(args, "START", "START cmd args...")?;
        proc::start_command(&name, &rest, &self.run_env).await
    }

    fn translate_command(
        &self,
        args: &[String],
        opcode: &'static str,
        want: &'static str,
    ) -> BootstrapResult<(String, Vec<String>)> {
        let [name, rest @ ..] = args else {
            return Err(BootstrapError::Arity(opcode, want, args.to_vec()));
        };
        let name = self.vars.expand(name);
        let rest: Vec<String> = rest.iter().map(|a| self.vars.expand(a)).collect();
        Ok((self.env.translate(&name).into_owned(), rest))
    }
}

/// Prints up to the first 256 lines of `path`, matching `showFile`'s
/// "roughly four pages on a HD-sized terminal" cutoff.
async fn show_file(path: &Path) -> BootstrapResult<()> {
    let data = tokio::fs::read_to_string(path).await?;
    for (n, line) in data.lines().enumerate() {
        if n >= 256 {
            println!("--- truncated ---");
            break;
        }
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_substitutes_known_tokens_and_leaves_others() {
        let vars = MainFileVars::new(&PathBuf::from("run/hello.py"));
        assert_eq!(vars.expand("__name__"), "hello");
        assert_eq!(vars.expand("__ext__"), ".py");
        assert_eq!(vars.expand("__unknown__ stays"), "__unknown__ stays");
    }
}
