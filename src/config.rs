use crate::claims::Role;
use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "info";

/// Process configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub default_role: Role,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            default_role: Role::Staff,
        }
    }
}

impl Config {
    /// Reads `.env`, then the environment, then command-line arguments.
    /// Arguments win over the environment.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenv::dotenv();
        let env = |k: &str| std::env::var(k).ok();
        Self::from_sources(env, std::env::args().skip(1))
    }

    pub fn from_sources<E, A>(env: E, args: A) -> anyhow::Result<Self>
    where
        E: Fn(&str) -> Option<String>,
        A: IntoIterator<Item = String>,
    {
        let mut cfg = Config::default();
        if let Some(ws) = env("AULAD_WORKSPACE").filter(|s| !s.trim().is_empty()) {
            cfg.workspace = Some(PathBuf::from(ws));
        }
        if let Some(filter) = env("AULAD_LOG").filter(|s| !s.trim().is_empty()) {
            cfg.log_filter = filter;
        }
        if let Some(role) = env("AULAD_DEFAULT_ROLE") {
            cfg.default_role = Role::parse(&role)
                .ok_or_else(|| anyhow::anyhow!("AULAD_DEFAULT_ROLE: unknown role {:?}", role))?;
        }

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if let Some(v) = arg.strip_prefix("--workspace=") {
                cfg.workspace = Some(PathBuf::from(v));
            } else if arg == "--workspace" {
                let v = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--workspace needs a path"))?;
                cfg.workspace = Some(PathBuf::from(v));
            } else {
                anyhow::bail!("unknown argument: {}", arg);
            }
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_sources() {
        let cfg = Config::from_sources(env_of(&[]), Vec::new()).expect("config");
        assert!(cfg.workspace.is_none());
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.default_role, Role::Staff);
    }

    #[test]
    fn arguments_override_environment() {
        let cfg = Config::from_sources(
            env_of(&[
                ("AULAD_WORKSPACE", "/tmp/env-ws"),
                ("AULAD_LOG", "aulad=debug"),
                ("AULAD_DEFAULT_ROLE", "teacher"),
            ]),
            vec!["--workspace".to_string(), "/tmp/arg-ws".to_string()],
        )
        .expect("config");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/arg-ws")));
        assert_eq!(cfg.log_filter, "aulad=debug");
        assert_eq!(cfg.default_role, Role::Teacher);
    }

    #[test]
    fn rejects_unknown_role_and_arguments() {
        assert!(Config::from_sources(env_of(&[("AULAD_DEFAULT_ROLE", "root")]), Vec::new()).is_err());
        assert!(Config::from_sources(env_of(&[]), vec!["--verbose".to_string()]).is_err());
        assert!(Config::from_sources(env_of(&[]), vec!["--workspace".to_string()]).is_err());
    }
}
