//! Command construction for the external tool, plus the buffer-identity
//! scheme views are keyed by.

/// External command description. `source` is the logical identity a view
/// streams (a file path or commit), used for cache reuse across views.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub source: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn command_line(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }

    pub fn buffer_identity(&self) -> String {
        format!("livediff://{}", self.command_line())
    }
}

/// `git diff` over the worktree or index, in the raw/numstat/shortstat
/// form the tree model parses. `source` limits the diff to one path.
pub fn git_diff_spec(
    git: &str,
    cached: bool,
    extra: &[String],
    source: Option<&str>,
) -> CommandSpec {
    let mut args = vec![
        "diff".to_string(),
        "--raw".to_string(),
        "--numstat".to_string(),
        "--shortstat".to_string(),
    ];
    if cached {
        args.push("--cached".to_string());
    }
    args.extend(extra.iter().cloned());
    if let Some(path) = source {
        args.push("--".to_string());
        args.push(path.to_string());
    }
    let spec = CommandSpec::new(git, args);
    match source {
        Some(path) => spec.with_source(path),
        None => spec,
    }
}

/// Plain `git diff` for the raw streaming view: no structured decoration,
/// the line stream goes to the sink as-is.
pub fn git_diff_plain_spec(git: &str, cached: bool, extra: &[String]) -> CommandSpec {
    let mut args = vec!["diff".to_string()];
    if cached {
        args.push("--cached".to_string());
    }
    args.extend(extra.iter().cloned());
    CommandSpec::new(git, args)
}

/// Plain `git log` for the raw streaming view.
pub fn git_log_plain_spec(git: &str, extra: &[String]) -> CommandSpec {
    let mut args = vec!["log".to_string()];
    args.extend(extra.iter().cloned());
    CommandSpec::new(git, args)
}

/// `git log` with one marker line per commit (`# <hash> <parents>`), the
/// shape the tree model groups by parent.
pub fn git_log_spec(git: &str, extra: &[String]) -> CommandSpec {
    let mut args = vec![
        "log".to_string(),
        "--raw".to_string(),
        "--numstat".to_string(),
        "--shortstat".to_string(),
        "--format=# %H %P".to_string(),
    ];
    args.extend(extra.iter().cloned());
    CommandSpec::new(git, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_spec_builds_command_and_identity() {
        let spec = git_diff_spec("git", true, &["HEAD~3".to_string()], Some("src/main.rs"));
        assert_eq!(
            spec.command_line(),
            "git diff --raw --numstat --shortstat --cached HEAD~3 -- src/main.rs"
        );
        assert_eq!(
            spec.buffer_identity(),
            "livediff://git diff --raw --numstat --shortstat --cached HEAD~3 -- src/main.rs"
        );
        assert_eq!(spec.source.as_deref(), Some("src/main.rs"));
    }

    #[test]
    fn log_spec_requests_parent_markers() {
        let spec = git_log_spec("git", &["-n".to_string(), "10".to_string()]);
        assert!(spec.args.contains(&"--format=# %H %P".to_string()));
        assert!(spec.command_line().starts_with("git log --raw"));
        assert!(spec.source.is_none());
    }
}
