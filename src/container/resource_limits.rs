use serde::{Deserialize, Serialize};

use crate::error::{Result, TenantBoxError};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Docker refuses memory limits below 6 MiB.
const MIN_MEMORY_BYTES: u64 = 6 * MIB;
const MAX_CPU_CORES: f64 = 256.0;

/// Per-instance limits applied to the main container after bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: CpuLimits,
    pub memory: MemoryLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuLimits {
    pub cores: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryLimits {
    pub limit_bytes: u64,
}

/// Optional overrides supplied with a create request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

impl ResourceLimits {
    /// Parse a CPU share (`"0.5"`, `"2"`) and a memory bound (`"512M"`, `"1G"`).
    pub fn parse(cpu: &str, memory: &str) -> Result<Self> {
        Ok(Self {
            cpu: CpuLimits::parse(cpu)?,
            memory: MemoryLimits::parse(memory)?,
        })
    }

    /// Request overrides win over template defaults.
    pub fn resolve(request: &ResourceRequest, default_cpu: &str, default_memory: &str) -> Result<Self> {
        Self::parse(
            request.cpu.as_deref().unwrap_or(default_cpu),
            request.memory.as_deref().unwrap_or(default_memory),
        )
    }

    pub fn nano_cpus(&self) -> i64 {
        (self.cpu.cores * 1_000_000_000.0).round() as i64
    }

    pub fn memory_bytes(&self) -> i64 {
        i64::try_from(self.memory.limit_bytes).unwrap_or(i64::MAX)
    }
}

impl CpuLimits {
    pub fn parse(value: &str) -> Result<Self> {
        let cores: f64 = value
            .trim()
            .parse()
            .map_err(|_| TenantBoxError::invalid_input(format!("invalid cpu limit '{}'", value)))?;
        if !cores.is_finite() || cores <= 0.0 || cores > MAX_CPU_CORES {
            return Err(TenantBoxError::invalid_input(format!(
                "cpu limit '{}' must be within (0, {}]",
                value, MAX_CPU_CORES
            )));
        }
        Ok(Self { cores })
    }

    /// Shortest decimal form, e.g. `1` or `0.5`.
    pub fn label(&self) -> String {
        format!("{}", self.cores)
    }
}

impl MemoryLimits {
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || TenantBoxError::invalid_input(format!("invalid memory limit '{}'", value));

        let trimmed = value.trim();
        let upper = trimmed.to_ascii_uppercase();
        let upper = upper.strip_suffix('B').unwrap_or(&upper);
        let upper = upper.strip_suffix('I').unwrap_or(upper);

        let (digits, unit) = match upper.chars().last() {
            Some('K') => (&upper[..upper.len() - 1], KIB),
            Some('M') => (&upper[..upper.len() - 1], MIB),
            Some('G') => (&upper[..upper.len() - 1], GIB),
            Some(c) if c.is_ascii_digit() => (upper, 1),
            _ => return Err(invalid()),
        };

        let amount: u64 = digits.parse().map_err(|_| invalid())?;
        let limit_bytes = amount.checked_mul(unit).ok_or_else(invalid)?;
        if limit_bytes < MIN_MEMORY_BYTES {
            return Err(TenantBoxError::invalid_input(format!(
                "memory limit '{}' is below the 6M minimum",
                value
            )));
        }
        Ok(Self { limit_bytes })
    }

    /// Largest whole unit, e.g. `512M` or `1G`.
    pub fn label(&self) -> String {
        let bytes = self.limit_bytes;
        if bytes % GIB == 0 {
            format!("{}G", bytes / GIB)
        } else if bytes % MIB == 0 {
            format!("{}M", bytes / MIB)
        } else if bytes % KIB == 0 {
            format!("{}K", bytes / KIB)
        } else {
            bytes.to_string()
        }
    }
}
