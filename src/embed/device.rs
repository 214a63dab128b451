//! Embedding device selection
//!
//! Probes `nvidia-smi` for free accelerator memory. Any probe failure, a
//! missing binary included, silently selects the CPU.

use tokio::process::Command;
use tracing::{debug, info};

/// Where embedding batches run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Accelerator,
    Cpu,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Accelerator => write!(f, "accelerator"),
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// Largest free-memory figure across GPUs, from nvidia-smi CSV output
fn parse_free_memory_mb(output: &str) -> Option<u64> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u64>().ok())
        .max()
}

/// Pick the device for an embedding run.
///
/// The accelerator is chosen only when `nvidia-smi` runs successfully and
/// reports at least `min_free_mb` of free memory on some GPU.
pub async fn pick_device(min_free_mb: u64) -> Device {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=memory.free", "--format=csv,noheader,nounits"])
        .output()
        .await;

    let free_mb = match output {
        Ok(out) if out.status.success() => {
            parse_free_memory_mb(&String::from_utf8_lossy(&out.stdout))
        }
        _ => None,
    };

    match free_mb {
        Some(free) if free >= min_free_mb => {
            info!(free_mb = free, "Using accelerator for embeddings");
            Device::Accelerator
        }
        Some(free) => {
            debug!(
                free_mb = free,
                min_free_mb, "Accelerator memory below threshold; using CPU"
            );
            Device::Cpu
        }
        None => {
            debug!("No accelerator detected; using CPU");
            Device::Cpu
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_free_memory() {
        assert_eq!(parse_free_memory_mb("8192\n"), Some(8192));
        assert_eq!(parse_free_memory_mb("1024\n16384\n"), Some(16384));
        assert_eq!(parse_free_memory_mb(" 2048 \n"), Some(2048));
        assert_eq!(parse_free_memory_mb(""), None);
        assert_eq!(parse_free_memory_mb("not a number"), None);
    }
}
