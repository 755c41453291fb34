use std::path::PathBuf;

/// Final merged configuration for the running process.
///
/// Merge order: CLI > ENV > defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub upstream_base: String,
    pub issuer: String,
}

#[derive(Debug, Default)]
pub struct ConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub upstream_base: Option<String>,
    pub issuer: Option<String>,
}

impl ConfigPatch {
    pub fn overlay(&mut self, other: ConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.upstream_base.is_some() {
            self.upstream_base = other.upstream_base;
        }
        if other.issuer.is_some() {
            self.issuer = other.issuer;
        }
    }

    pub fn from_env() -> Self {
        Self {
            host: std::env::var("CODEXD_HOST").ok().filter(|v| !v.is_empty()),
            port: std::env::var("CODEXD_PORT")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            data_dir: std::env::var_os("CODEXD_DATA_DIR").map(PathBuf::from),
            upstream_base: std::env::var("CODEXD_UPSTREAM_BASE")
                .ok()
                .filter(|v| !v.is_empty()),
            issuer: std::env::var("CODEXD_ISSUER").ok().filter(|v| !v.is_empty()),
        }
    }

    pub fn from_args(args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut patch = Self::default();
        let mut args = args.peekable();
        while let Some(flag) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| anyhow::anyhow!("missing value for {name}"))
            };
            match flag.as_str() {
                "--host" => patch.host = Some(value("--host")?),
                "--port" => patch.port = Some(value("--port")?.trim().parse()?),
                "--data-dir" => patch.data_dir = Some(PathBuf::from(value("--data-dir")?)),
                "--upstream-base" => patch.upstream_base = Some(value("--upstream-base")?),
                "--issuer" => patch.issuer = Some(value("--issuer")?),
                other => anyhow::bail!("unknown flag: {other}"),
            }
        }
        Ok(patch)
    }

    pub fn into_config(self) -> Config {
        Config {
            host: self.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: self.port.unwrap_or(1455),
            data_dir: self.data_dir.unwrap_or_else(default_data_dir),
            upstream_base: self
                .upstream_base
                .unwrap_or_else(|| codexd_core::DEFAULT_UPSTREAM_BASE.to_string()),
            issuer: self
                .issuer
                .unwrap_or_else(|| codexd_core::DEFAULT_ISSUER.to_string()),
        }
    }
}

impl Config {
    /// Callback target handed to the OAuth provider. A wildcard bind
    /// address is not browsable, so fall back to loopback there.
    pub fn redirect_uri(&self) -> String {
        let host = if self.host == "0.0.0.0" || self.host == "::" {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };
        format!("http://{host}:{}/auth/callback", self.port)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".codexd"))
        .unwrap_or_else(|| PathBuf::from(".codexd"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_env_overrides_defaults() {
        let mut merged = ConfigPatch {
            port: Some(9000),
            issuer: Some("https://env-issuer".into()),
            ..Default::default()
        };
        merged.overlay(ConfigPatch {
            port: Some(9001),
            ..Default::default()
        });
        let config = merged.into_config();
        assert_eq!(config.port, 9001);
        assert_eq!(config.issuer, "https://env-issuer");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.upstream_base, codexd_core::DEFAULT_UPSTREAM_BASE);
    }

    #[test]
    fn args_parse_known_flags() {
        let patch = ConfigPatch::from_args(
            ["--port", "2000", "--host", "0.0.0.0"]
                .iter()
                .map(|s| s.to_string()),
        )
        .unwrap();
        assert_eq!(patch.port, Some(2000));
        assert_eq!(patch.host.as_deref(), Some("0.0.0.0"));
        assert!(ConfigPatch::from_args(["--bogus".to_string()].into_iter()).is_err());
    }

    #[test]
    fn wildcard_bind_gets_loopback_redirect() {
        let config = ConfigPatch {
            host: Some("0.0.0.0".into()),
            port: Some(1455),
            ..Default::default()
        }
        .into_config();
        assert_eq!(config.redirect_uri(), "http://127.0.0.1:1455/auth/callback");
    }
}
