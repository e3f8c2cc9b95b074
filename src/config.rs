/// Environment variable holding the host RAM ceiling in gigabytes (0 = unlimited).
pub const RAM_GB_ENV: &str = "GPU_FFT_RAM_GB";

/// Environment variable holding the diagnostic verbosity level.
pub const VERBOSE_ENV: &str = "GPU_FFT_VERBOSE";

/// Tunables passed explicitly into every harness entry point.
///
/// # Example
///
/// ```
/// # use gpu_fft_accuracy::config::HarnessConfig;
/// let config = HarnessConfig::default().with_ram_ceiling_gb(4.0).with_verbosity(2);
/// assert_eq!(config.ram_ceiling_bytes, 4_000_000_000);
/// assert!(config.verbose(1));
/// assert!(!config.verbose(2));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Host memory budget above which a configuration is skipped; 0 disables the check.
    pub ram_ceiling_bytes: u64,
    /// Diagnostic detail level; higher values print more.
    pub verbosity: u32,
}

impl HarnessConfig {
    /// Reads [`RAM_GB_ENV`] and [`VERBOSE_ENV`]; unset or unparsable values fall
    /// back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let var = |name: &str| std::env::var(name).ok();
        if let Some(gb) = var(RAM_GB_ENV).and_then(|v| v.trim().parse::<f64>().ok()) {
            config = config.with_ram_ceiling_gb(gb);
        }
        if let Some(level) = var(VERBOSE_ENV).and_then(|v| v.trim().parse::<u32>().ok()) {
            config.verbosity = level;
        }
        config
    }

    #[must_use]
    pub fn with_ram_ceiling_bytes(mut self, bytes: u64) -> Self {
        self.ram_ceiling_bytes = bytes;
        self
    }

    /// Sets the ceiling in decimal gigabytes; negative values disable the check.
    #[must_use]
    pub fn with_ram_ceiling_gb(mut self, gb: f64) -> Self {
        self.ram_ceiling_bytes = if gb > 0.0 { (gb * 1e9) as u64 } else { 0 };
        self
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u32) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// True when diagnostics gated at `level` should be emitted.
    #[must_use]
    pub fn verbose(&self, level: u32) -> bool {
        self.verbosity > level
    }
}
