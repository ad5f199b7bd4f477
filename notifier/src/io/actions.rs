//! [`Platform`] implementation for GitHub Actions runners.
//!
//! Inputs arrive as `INPUT_*` variables. Persisted values are written through
//! the runner's file commands (`GITHUB_ENV`, `GITHUB_STATE`, `GITHUB_OUTPUT`)
//! and read back from the environment of the next invocation. Without those
//! files (old runners, local runs) the legacy stdout workflow commands are
//! used instead.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::io::platform::{Platform, Scope, input_var, job_env_var, step_state_var};

pub struct ActionsPlatform<W: Write = io::Stdout> {
    env: HashMap<String, String>,
    /// Values persisted by this process, readable before the runner re-exports them.
    persisted: HashMap<String, String>,
    env_file: Option<PathBuf>,
    state_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    commands: W,
    delimiter_seq: u32,
}

impl ActionsPlatform<io::Stdout> {
    pub fn from_process_env() -> Self {
        Self::with_env(std::env::vars().collect(), io::stdout())
    }
}

impl<W: Write> ActionsPlatform<W> {
    /// Build from an environment snapshot; workflow commands go to `commands`.
    pub fn with_env(env: HashMap<String, String>, commands: W) -> Self {
        let file = |key: &str| {
            env.get(key)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from)
        };
        Self {
            env_file: file("GITHUB_ENV"),
            state_file: file("GITHUB_STATE"),
            output_file: file("GITHUB_OUTPUT"),
            env,
            persisted: HashMap::new(),
            commands,
            delimiter_seq: 0,
        }
    }

    pub fn into_commands(self) -> W {
        self.commands
    }

    fn issue(&mut self, command: &str, properties: &[(&str, &str)], message: &str) {
        let mut line = format!("::{command}");
        if !properties.is_empty() {
            let props: Vec<String> = properties
                .iter()
                .map(|(k, v)| format!("{k}={}", escape_property(v)))
                .collect();
            line.push(' ');
            line.push_str(&props.join(","));
        }
        line.push_str("::");
        line.push_str(&escape_data(message));
        if let Err(err) = writeln!(self.commands, "{line}") {
            warn!(command, error = %err, "could not issue workflow command");
        }
    }

    fn write_file_command(&mut self, path: &Path, key: &str, value: &str) -> Result<()> {
        self.delimiter_seq += 1;
        let delimiter = format!("ghadelimiter_{}_{}", std::process::id(), self.delimiter_seq);
        if key.contains(&delimiter) || value.contains(&delimiter) {
            bail!("value for '{key}' contains the file command delimiter");
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;
        write!(file, "{key}<<{delimiter}\n{value}\n{delimiter}\n")
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

impl<W: Write> Platform for ActionsPlatform<W> {
    fn input(&self, name: &str) -> Option<String> {
        self.env
            .get(&input_var(name))
            .map(|value| value.trim().to_string())
    }

    fn load(&self, scope: Scope, name: &str) -> Option<String> {
        let key = match scope {
            Scope::Job => job_env_var(name),
            Scope::Step => step_state_var(name),
        };
        self.persisted
            .get(&key)
            .or_else(|| self.env.get(&key))
            .cloned()
    }

    fn save(&mut self, scope: Scope, name: &str, value: &str) -> Result<()> {
        match scope {
            Scope::Job => {
                let key = job_env_var(name);
                match self.env_file.clone() {
                    Some(path) => self.write_file_command(&path, &key, value)?,
                    None => self.issue("set-env", &[("name", &key)], value),
                }
                debug!(%key, "exported job variable");
                self.persisted.insert(key, value.to_string());
            }
            Scope::Step => {
                match self.state_file.clone() {
                    // The runner adds the `STATE_` prefix itself.
                    Some(path) => self.write_file_command(&path, name, value)?,
                    None => self.issue("save-state", &[("name", name)], value),
                }
                debug!(name, "saved step state");
                self.persisted.insert(step_state_var(name), value.to_string());
            }
        }
        Ok(())
    }

    fn set_output(&mut self, name: &str, value: &str) -> Result<()> {
        match self.output_file.clone() {
            Some(path) => self.write_file_command(&path, name, value)?,
            None => self.issue("set-output", &[("name", name)], value),
        }
        Ok(())
    }

    fn mask(&mut self, value: &str) {
        if !value.is_empty() {
            self.issue("add-mask", &[], value);
        }
    }

    fn warning(&mut self, message: &str) {
        self.issue("warning", &[], message);
    }

    fn fail(&mut self, message: &str) {
        self.issue("error", &[], message);
    }
}

fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ActionsFiles;
    use std::fs;

    #[test]
    fn inputs_are_trimmed_and_normalized() {
        let env: HashMap<String, String> = [("INPUT_CHANNEL-NAME", "  #builds \n")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let platform = ActionsPlatform::with_env(env, Vec::new());
        assert_eq!(platform.input("channel-name").as_deref(), Some("#builds"));
        assert_eq!(platform.input("channel-id"), None);
    }

    #[test]
    fn job_values_go_to_env_file_and_are_readable() {
        let files = ActionsFiles::new().expect("files");
        let mut platform = ActionsPlatform::with_env(files.env(), Vec::new());

        platform
            .save(Scope::Job, "message-id", "1700.5")
            .expect("save");
        assert_eq!(
            platform.load(Scope::Job, "message-id").as_deref(),
            Some("1700.5")
        );

        let written = fs::read_to_string(&files.env_file).expect("read env file");
        let mut lines = written.lines();
        let header = lines.next().expect("header");
        assert!(header.starts_with("SLACK_NOTIFICATION_MESSAGE-ID<<ghadelimiter_"));
        assert_eq!(lines.next(), Some("1700.5"));
        let delimiter = header.split("<<").nth(1).expect("delimiter");
        assert_eq!(lines.next(), Some(delimiter));
    }

    #[test]
    fn step_state_and_outputs_use_their_own_files() {
        let files = ActionsFiles::new().expect("files");
        let mut platform = ActionsPlatform::with_env(files.env(), Vec::new());

        platform.save(Scope::Step, "is-post", "true").expect("save");
        platform.set_output("channel-id", "C42").expect("output");

        let state = fs::read_to_string(&files.state_file).expect("read state");
        assert!(state.starts_with("is-post<<"));
        let output = fs::read_to_string(&files.output_file).expect("read output");
        assert!(output.starts_with("channel-id<<"));
        assert!(output.contains("\nC42\n"));
    }

    #[test]
    fn persisted_values_are_read_from_env() {
        let env: HashMap<String, String> = [
            ("SLACK_NOTIFICATION_CHANNEL-ID", "C9"),
            ("STATE_is-post", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let platform = ActionsPlatform::with_env(env, Vec::new());
        assert_eq!(platform.load(Scope::Job, "channel-id").as_deref(), Some("C9"));
        assert_eq!(platform.load(Scope::Step, "is-post").as_deref(), Some("true"));
    }

    #[test]
    fn legacy_commands_without_files() {
        let mut platform = ActionsPlatform::with_env(HashMap::new(), Vec::new());
        platform.save(Scope::Job, "channel-id", "C1").expect("save");
        platform.mask("xoxb-1");
        platform.warning("line one\nline two");
        platform.fail("100% broken");

        let out = String::from_utf8(platform.into_commands()).expect("utf8");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "::set-env name=SLACK_NOTIFICATION_CHANNEL-ID::C1",
                "::add-mask::xoxb-1",
                "::warning::line one%0Aline two",
                "::error::100%25 broken",
            ]
        );
    }
}
