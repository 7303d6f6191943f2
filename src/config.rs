use clap::Parser;
use serde::Deserialize;

#[derive(Parser)]
#[command(name = "grader", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the limits configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Number of grading workers
    #[arg(long = "workers", short = 'w', default_value_t = 2)]
    pub workers: u8,

    /// Grading request files, one JSON submission each
    pub requests: Vec<String>,
}

impl CliArgs {
    /// Load the limits configuration from the specified file, or fall back
    /// to the defaults when none is given.
    pub fn to_limits(&self) -> std::io::Result<LimitsConfig> {
        let Some(path) = &self.config_path else {
            return Ok(LimitsConfig::default());
        };
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }
}

/// Deployment-policy knobs for the grading engine.  The per-task time limit
/// is derived from task complexity; everything else lives here.
#[derive(Deserialize, Debug, Clone)]
pub struct LimitsConfig {
    /// Peak resident memory ceiling for a single test, in megabytes.
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: f64,

    /// Slack added to the declared time limit before the hard kill, to
    /// absorb process-spawn overhead.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Wall-clock budget for the compile step.
    #[serde(default = "default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: default_memory_limit_mb(),
            grace_ms: default_grace_ms(),
            compile_timeout_ms: default_compile_timeout_ms(),
        }
    }
}

fn default_memory_limit_mb() -> f64 {
    128.0
}

fn default_grace_ms() -> u64 {
    500
}

fn default_compile_timeout_ms() -> u64 {
    30_000
}
