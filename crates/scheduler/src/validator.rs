use std::path::Path;

/// Optional collaborator that inspects a finished external job's output and
/// can reclassify a zero exit code as a failure.
pub trait ResultValidator: Send + Sync {
    /// Return `true` when the output shows the run failed.
    fn check_for_output_failure(&self, output: &Path, working_dir: &Path) -> bool;
}

impl<F> ResultValidator for F
where
    F: Fn(&Path, &Path) -> bool + Send + Sync,
{
    fn check_for_output_failure(&self, output: &Path, working_dir: &Path) -> bool {
        self(output, working_dir)
    }
}
