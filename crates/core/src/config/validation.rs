use super::types::RunConfig;
use crate::error::ConfigError;

impl RunConfig {
    /// Validate the config: slot count, thread/rank counts and backend sizing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.num_mpi == 0 {
            return Err(ConfigError::Invalid("num_mpi must be at least 1".to_string()));
        }
        if self.num_threads == 0 {
            return Err(ConfigError::Invalid(
                "num_threads must be at least 1".to_string(),
            ));
        }
        if self.parallel.internal_parallel
            && self.parallel.nodes.is_empty()
            && self.parallel.total_cores == 0
        {
            return Err(ConfigError::Invalid(
                "parallel.total_cores must be at least 1 when internal_parallel is on".to_string(),
            ));
        }
        if let Some(ext) = self
            .delete_out_extensions
            .iter()
            .find(|e| e.trim_start_matches('.').is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "delete_out_extensions contains an empty extension '{ext}'"
            )));
        }
        Ok(())
    }
}
