// ============================================================
// Layer 6 — Device Selection
// ============================================================
// The compute device is chosen once, from the command line, and
// passed down to everything that allocates tensors:
//
//   auto   → WgpuDevice::default()  (best adapter wgpu finds)
//   cpu    → WgpuDevice::Cpu
//   gpu:N  → WgpuDevice::DiscreteGpu(N)
//   N      → same as gpu:N
//
// No environment variables are read or written.

use anyhow::{bail, Result};
use burn::backend::wgpu::WgpuDevice;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSelector {
    #[default]
    Auto,
    Cpu,
    Gpu(usize),
}

impl DeviceSelector {
    pub fn resolve(&self) -> WgpuDevice {
        match self {
            DeviceSelector::Auto   => WgpuDevice::default(),
            DeviceSelector::Cpu    => WgpuDevice::Cpu,
            DeviceSelector::Gpu(n) => WgpuDevice::DiscreteGpu(*n),
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "auto" => return Ok(DeviceSelector::Auto),
            "cpu"  => return Ok(DeviceSelector::Cpu),
            "gpu"  => return Ok(DeviceSelector::Gpu(0)),
            _ => {}
        }

        let index = s.strip_prefix("gpu:").unwrap_or(&s);
        match index.parse::<usize>() {
            Ok(n) => Ok(DeviceSelector::Gpu(n)),
            Err(_) => bail!("Unknown device '{s}'; expected auto, cpu, gpu or gpu:<index>"),
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Auto   => write!(f, "auto"),
            DeviceSelector::Cpu    => write!(f, "cpu"),
            DeviceSelector::Gpu(n) => write!(f, "gpu:{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_every_form() {
        assert_eq!("auto".parse::<DeviceSelector>().unwrap(), DeviceSelector::Auto);
        assert_eq!("CPU".parse::<DeviceSelector>().unwrap(), DeviceSelector::Cpu);
        assert_eq!("gpu".parse::<DeviceSelector>().unwrap(), DeviceSelector::Gpu(0));
        assert_eq!("gpu:2".parse::<DeviceSelector>().unwrap(), DeviceSelector::Gpu(2));
        assert_eq!("1".parse::<DeviceSelector>().unwrap(), DeviceSelector::Gpu(1));
    }

    #[test]
    fn test_rejects_unknown_names() {
        assert!("tpu".parse::<DeviceSelector>().is_err());
        assert!("gpu:x".parse::<DeviceSelector>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for sel in [DeviceSelector::Auto, DeviceSelector::Cpu, DeviceSelector::Gpu(3)] {
            assert_eq!(sel.to_string().parse::<DeviceSelector>().unwrap(), sel);
        }
    }

    #[test]
    fn test_cpu_resolves_to_cpu_adapter() {
        assert_eq!(DeviceSelector::Cpu.resolve(), WgpuDevice::Cpu);
    }
}
