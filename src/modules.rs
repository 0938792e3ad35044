//! Module-enablement flags.
//!
//! Operator installations can switch whole modules off (e.g. a cluster
//! without the CSI driver). The flags are resolved once at startup and passed
//! into validation as plain data; the validators never read the environment
//! themselves.

/// Environment variable holding a comma-separated list of disabled modules.
const DISABLED_MODULES_ENV: &str = "OPERATOR_DISABLED_MODULES";

/// Which operator modules are enabled for this installation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Modules {
    pub csi_driver: bool,
    pub active_gate: bool,
    pub one_agent: bool,
    pub extensions: bool,
    pub log_monitoring: bool,
    pub edge_connect: bool,
    pub supportability: bool,
}

impl Default for Modules {
    fn default() -> Self {
        Self {
            csi_driver: true,
            active_gate: true,
            one_agent: true,
            extensions: true,
            log_monitoring: true,
            edge_connect: true,
            supportability: true,
        }
    }
}

impl Modules {
    /// Resolve the module flags from the process environment.
    ///
    /// All modules default to enabled; `OPERATOR_DISABLED_MODULES` lists the
    /// ones to switch off, e.g. `csi-driver,edge-connect`. Unknown entries
    /// are ignored.
    pub fn from_env() -> Self {
        match std::env::var(DISABLED_MODULES_ENV) {
            Ok(value) => Self::from_disabled_list(&value),
            Err(_) => Self::default(),
        }
    }

    fn from_disabled_list(list: &str) -> Self {
        let mut modules = Self::default();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry {
                "csi-driver" => modules.csi_driver = false,
                "active-gate" => modules.active_gate = false,
                "one-agent" => modules.one_agent = false,
                "extensions" => modules.extensions = false,
                "log-monitoring" => modules.log_monitoring = false,
                "edge-connect" => modules.edge_connect = false,
                "supportability" => modules.supportability = false,
                unknown => {
                    tracing::warn!(module = %unknown, "Ignoring unknown module in disabled list");
                }
            }
        }
        modules
    }
}
