use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

impl Architecture {
    /// Architecture of the running agent.
    pub fn current() -> Result<Self, ConfigError> {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    fn from_rust_arch(arch: &str) -> Result<Self, ConfigError> {
        match arch {
            "x86_64" => Ok(Self::Amd64),
            "aarch64" => Ok(Self::Arm64),
            other => Err(ConfigError::UnsupportedPlatform(format!(
                "architecture {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }

    pub fn build_tags(&self) -> Vec<String> {
        vec![format!("_{}", self.as_str())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionFamily {
    Debian,
    Rhel,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Distribution {
    Debian,
    Ubuntu,
    Centos,
    Rhel,
    Amazon,
    Flatcar,
    Other(String),
}

impl Distribution {
    /// Read `<fs_root>/etc/os-release`.
    pub fn detect(fs_root: &Path) -> Result<Self, ConfigError> {
        let path = fs_root.join("etc/os-release");
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Load {
            what: "os-release",
            location: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_os_release(&contents))
    }

    pub fn from_os_release(contents: &str) -> Self {
        let mut id = None;
        let mut id_like = None;
        for line in contents.lines() {
            let Some((k, v)) = line.split_once('=') else {
                continue;
            };
            let v = v.trim().trim_matches('"').to_ascii_lowercase();
            match k.trim() {
                "ID" => id = Some(v),
                "ID_LIKE" => id_like = Some(v),
                _ => {}
            }
        }

        match id.as_deref() {
            Some("debian") => Self::Debian,
            Some("ubuntu") => Self::Ubuntu,
            Some("centos") => Self::Centos,
            Some("rhel") => Self::Rhel,
            Some("amzn") => Self::Amazon,
            Some("flatcar") => Self::Flatcar,
            Some(other) => match id_like.as_deref() {
                Some(like) if like.split_whitespace().any(|l| l == "debian") => Self::Debian,
                Some(like) if like.split_whitespace().any(|l| l == "rhel" || l == "fedora") => {
                    Self::Rhel
                }
                _ => Self::Other(other.to_string()),
            },
            None => Self::Other("unknown".to_string()),
        }
    }

    pub fn family(&self) -> DistributionFamily {
        match self {
            Self::Debian | Self::Ubuntu => DistributionFamily::Debian,
            Self::Centos | Self::Rhel | Self::Amazon => DistributionFamily::Rhel,
            Self::Flatcar | Self::Other(_) => DistributionFamily::Other,
        }
    }

    pub fn build_tags(&self) -> Vec<String> {
        let mut tags = vec!["_systemd".to_string()];
        match self.family() {
            DistributionFamily::Debian => tags.push("_debian_family".to_string()),
            DistributionFamily::Rhel => tags.push("_redhat_family".to_string()),
            DistributionFamily::Other => {}
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rust_arch_names() {
        assert_eq!(Architecture::from_rust_arch("x86_64").unwrap(), Architecture::Amd64);
        assert!(Architecture::from_rust_arch("mips").is_err());
    }

    #[test]
    fn detects_ubuntu() {
        let d = Distribution::from_os_release("NAME=\"Ubuntu\"\nID=ubuntu\nID_LIKE=debian\n");
        assert_eq!(d, Distribution::Ubuntu);
        assert_eq!(d.family(), DistributionFamily::Debian);
        assert!(d.build_tags().contains(&"_debian_family".to_string()));
    }

    #[test]
    fn falls_back_to_id_like() {
        let d = Distribution::from_os_release("ID=\"rocky\"\nID_LIKE=\"rhel centos fedora\"\n");
        assert_eq!(d, Distribution::Rhel);
    }
}
