//! Static board identity, the host-side analogue of the device tree.

/// Board and SoC identity reported by `/sysinfo`.
#[derive(Debug, Clone, Default)]
pub struct BoardInfo {
    /// Board model string.
    pub model: Option<String>,
    /// Board compatible string.
    pub compatible: Option<String>,
    /// CPU compatible string.
    pub cpu_compatible: Option<String>,
    /// CPU clock in Hz, 0 when unknown.
    pub cpu_clock_hz: u64,
    /// RAM size in bytes, 0 when unknown.
    pub ram_size: u64,
}

impl BoardInfo {
    /// Model string with the env fallback chain applied: board info
    /// first, then env `model`, `board_name`, `board`.
    #[must_use]
    pub fn model_or_env(&self, env: &crate::env::EnvStore) -> String {
        if let Some(model) = &self.model
            && !model.is_empty()
        {
            return model.clone();
        }
        for key in ["model", "board_name", "board"] {
            if let Some(value) = env.get_str(key)
                && !value.is_empty()
            {
                return value.to_string();
            }
        }
        String::new()
    }
}
