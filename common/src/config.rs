//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

impl RuntimeConfig {
    /// Build a multi-threaded tokio runtime honoring the configured thread limits
    pub fn build(&self) -> std::io::Result<tokio::runtime::Runtime> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();
        if self.max_workers > 0 {
            builder.worker_threads(self.max_workers);
        }
        if self.max_blocking_threads > 0 {
            builder.max_blocking_threads(self.max_blocking_threads);
        }
        builder.build()
    }
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

impl OutputConfig {
    /// Default log filter directive for the configured verbosity, used when `RUST_LOG` is unset
    #[must_use]
    pub fn log_directive(&self) -> &'static str {
        if self.quiet {
            return "off";
        }
        match self.verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_log_level() {
        let levels: Vec<_> = (0..5)
            .map(|verbose| {
                OutputConfig {
                    verbose,
                    ..Default::default()
                }
                .log_directive()
            })
            .collect();
        assert_eq!(levels, ["error", "info", "debug", "trace", "trace"]);
    }

    #[test]
    fn quiet_wins_over_verbose() {
        let output = OutputConfig {
            quiet: true,
            verbose: 3,
            print_summary: true,
        };
        assert_eq!(output.log_directive(), "off");
    }

    #[test]
    fn runtime_respects_worker_limit() {
        let runtime = RuntimeConfig {
            max_workers: 2,
            max_blocking_threads: 4,
        }
        .build()
        .unwrap();
        assert_eq!(runtime.metrics().num_workers(), 2);
    }
}
