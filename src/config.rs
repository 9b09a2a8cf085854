//! Compiler-entrypoint configuration.
//!
//! Deliberately not a `clap` surface — command-line parsing belongs to the
//! driver program that embeds this crate, not to the code generator. This is
//! just the handful of knobs the backend itself needs.

use inkwell::OptimizationLevel;

#[derive(Debug, Clone)]
pub struct CodegenConfig {
    /// Disables optimization-friendly codegen and keeps the mapping to
    /// source as direct as possible. Debug-info emission itself is out of
    /// scope; this only picks the `inkwell` optimization level.
    pub debug: bool,
    pub target_triple: Option<String>,
    pub cpu: Option<String>,
    pub cpu_features: Option<String>,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            debug: false,
            target_triple: None,
            cpu: None,
            cpu_features: None,
        }
    }
}

impl CodegenConfig {
    pub fn codegen_opt_level(&self) -> OptimizationLevel {
        if self.debug {
            OptimizationLevel::None
        } else {
            OptimizationLevel::Default
        }
    }

    pub fn resolved_target_triple(&self) -> String {
        self.target_triple
            .clone()
            .unwrap_or_else(|| inkwell::targets::TargetMachine::get_default_triple().to_string())
    }

    pub fn resolved_cpu(&self) -> String {
        self.cpu
            .clone()
            .unwrap_or_else(|| inkwell::targets::TargetMachine::get_host_cpu_name().to_string())
    }

    pub fn resolved_cpu_features(&self) -> String {
        self.cpu_features.clone().unwrap_or_else(|| {
            inkwell::targets::TargetMachine::get_host_cpu_features().to_string()
        })
    }
}
