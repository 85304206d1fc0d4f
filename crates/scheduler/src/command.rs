//! Shell command composition and `%TOKEN%` substitution for external jobs.

use std::fmt;
use std::path::Path;

use simrun_core::RunConfig;

use crate::error::SchedulerError;

/// How a command segment is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run the command as given.
    Serial,
    /// Wrap the command with the configured MPI/threading launch prefix.
    Parallel,
}

impl ExecutionMode {
    /// Parse a mode name, case-insensitively.
    pub fn parse(mode: &str) -> Option<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "serial" => Some(Self::Serial),
            "parallel" => Some(Self::Parallel),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// Launch prefixes applied to parallel command segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandPrefixes {
    pub precommand: String,
    pub mpi_command: String,
    pub threading_command: String,
    pub postcommand: String,
}

impl CommandPrefixes {
    /// Build prefixes from run config. The MPI and threading commands are only
    /// used when their counts differ from 1 and a launcher string is set.
    pub fn from_config(config: &RunConfig) -> Self {
        let mpi_command = if config.num_mpi != 1 && !config.parallel_command.is_empty() {
            format!("{} {}", config.parallel_command, config.num_mpi)
        } else {
            String::new()
        };
        let threading_command = if config.num_threads != 1 && !config.threading_command.is_empty()
        {
            format!("{} {}", config.threading_command, config.num_threads)
        } else {
            String::new()
        };
        Self {
            precommand: config.precommand.clone(),
            mpi_command,
            threading_command,
            postcommand: config.postcommand.clone(),
        }
    }

    /// Join `(mode, command)` segments into one shell line.
    ///
    /// Segments are chained with `&&` so a later one only runs when the
    /// earlier ones succeeded.
    pub fn compose<M, C>(&self, segments: &[(M, C)]) -> Result<String, SchedulerError>
    where
        M: AsRef<str>,
        C: AsRef<str>,
    {
        let mut parts = Vec::with_capacity(segments.len());
        for (mode, cmd) in segments {
            let cmd = cmd.as_ref();
            match ExecutionMode::parse(mode.as_ref()) {
                Some(ExecutionMode::Serial) => parts.push(cmd.to_string()),
                Some(ExecutionMode::Parallel) => parts.push(self.wrap_parallel(cmd)),
                None => {
                    return Err(SchedulerError::InvalidExecutionMode {
                        mode: mode.as_ref().to_string(),
                        command: cmd.to_string(),
                    })
                }
            }
        }
        Ok(parts.join(" && "))
    }

    fn wrap_parallel(&self, cmd: &str) -> String {
        let mut line = self.precommand.clone();
        if !self.mpi_command.is_empty() {
            line.push(' ');
            line.push_str(&self.mpi_command);
            line.push(' ');
        }
        if !self.threading_command.is_empty() {
            line.push(' ');
            line.push_str(&self.threading_command);
            line.push(' ');
        }
        line.push_str(cmd);
        line.push(' ');
        line.push_str(&self.postcommand);
        line
    }
}

/// Values substituted into an external command right before it starts.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub slot_index: usize,
    pub current_id: u64,
    pub script_dir: &'a Path,
    pub framework_dir: &'a Path,
    pub base_working_dir: &'a Path,
    pub method: String,
    pub num_cpus: u32,
}

impl TemplateContext<'_> {
    /// Replace known `%TOKEN%`s in a single left-to-right pass.
    ///
    /// Substituted text is never rescanned and unknown tokens are kept verbatim.
    pub fn substitute(&self, command: &str, working_dir: &Path) -> String {
        let mut out = String::with_capacity(command.len());
        let mut rest = command;
        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let value = after
                .find('%')
                .and_then(|end| self.lookup(&after[..end], working_dir).map(|v| (end, v)));
            match value {
                Some((end, value)) => {
                    out.push_str(&value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('%');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn lookup(&self, token: &str, working_dir: &Path) -> Option<String> {
        let value = match token {
            "INDEX" => self.slot_index.to_string(),
            "INDEX1" => (self.slot_index + 1).to_string(),
            "CURRENT_ID" => self.current_id.to_string(),
            "CURRENT_ID1" => (self.current_id + 1).to_string(),
            "SCRIPT_DIR" => self.script_dir.display().to_string(),
            "FRAMEWORK_DIR" => self.framework_dir.display().to_string(),
            "WORKING_DIR" => working_dir.display().to_string(),
            "BASE_WORKING_DIR" => self.base_working_dir.display().to_string(),
            "METHOD" => self.method.clone(),
            "NUM_CPUS" => self.num_cpus.to_string(),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn prefixes(pre: &str) -> CommandPrefixes {
        CommandPrefixes {
            precommand: pre.to_string(),
            ..CommandPrefixes::default()
        }
    }

    #[test]
    fn mode_parse_is_case_insensitive() {
        assert_eq!(ExecutionMode::parse("Serial"), Some(ExecutionMode::Serial));
        assert_eq!(ExecutionMode::parse("PARALLEL"), Some(ExecutionMode::Parallel));
        assert_eq!(ExecutionMode::parse("batch"), None);
    }

    #[test]
    fn compose_serial_and_parallel() {
        let cmd = prefixes("mpirun -n 2 ")
            .compose(&[("serial", "echo A"), ("parallel", "echo B")])
            .unwrap();
        assert_eq!(cmd, "echo A && mpirun -n 2 echo B ");
    }

    #[test]
    fn compose_rejects_unknown_mode() {
        let err = prefixes("")
            .compose(&[("serial", "echo A"), ("mpi", "run.sh")])
            .unwrap_err();
        match err {
            SchedulerError::InvalidExecutionMode { mode, command } => {
                assert_eq!(mode, "mpi");
                assert_eq!(command, "run.sh");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn prefixes_from_config() {
        let mut config = RunConfig::default();
        config.parallel_command = "mpiexec -n".to_string();
        config.num_mpi = 4;
        config.threading_command = "--threads".to_string();
        config.num_threads = 2;
        config.postcommand = "-v".to_string();

        let p = CommandPrefixes::from_config(&config);
        assert_eq!(p.mpi_command, "mpiexec -n 4");
        assert_eq!(p.threading_command, "--threads 2");
        assert_eq!(
            p.compose(&[("parallel", "app -i in")]).unwrap(),
            " mpiexec -n 4  --threads 2 app -i in -v"
        );
    }

    #[test]
    fn single_rank_skips_mpi_command() {
        let mut config = RunConfig::default();
        config.parallel_command = "mpiexec -n".to_string();
        let p = CommandPrefixes::from_config(&config);
        assert!(p.mpi_command.is_empty());
        assert_eq!(p.compose(&[("parallel", "app")]).unwrap(), "app ");
    }

    fn context(paths: &(PathBuf, PathBuf, PathBuf)) -> TemplateContext<'_> {
        TemplateContext {
            slot_index: 2,
            current_id: 7,
            script_dir: &paths.0,
            framework_dir: &paths.1,
            base_working_dir: &paths.2,
            method: "opt".to_string(),
            num_cpus: 4,
        }
    }

    #[test]
    fn substitutes_all_tokens() {
        let paths = (
            PathBuf::from("/scripts"),
            PathBuf::from("/fw"),
            PathBuf::from("/base"),
        );
        let ctx = context(&paths);
        let out = ctx.substitute(
            "%INDEX% %INDEX1% %CURRENT_ID% %CURRENT_ID1% %SCRIPT_DIR% %FRAMEWORK_DIR% \
             %WORKING_DIR% %BASE_WORKING_DIR% %METHOD% %NUM_CPUS%",
            Path::new("/base/run7"),
        );
        assert_eq!(out, "2 3 7 8 /scripts /fw /base/run7 /base opt 4");
    }

    #[test]
    fn unknown_tokens_left_verbatim() {
        let paths = (PathBuf::new(), PathBuf::new(), PathBuf::new());
        let ctx = context(&paths);
        assert_eq!(
            ctx.substitute("run %UNKNOWN% at 50% id=%CURRENT_ID%", Path::new(".")),
            "run %UNKNOWN% at 50% id=7"
        );
        assert_eq!(ctx.substitute("trailing %", Path::new(".")), "trailing %");
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let paths = (
            PathBuf::from("/odd/%INDEX%"),
            PathBuf::new(),
            PathBuf::new(),
        );
        let ctx = context(&paths);
        assert_eq!(
            ctx.substitute("%SCRIPT_DIR%/x", Path::new(".")),
            "/odd/%INDEX%/x"
        );
    }
}
