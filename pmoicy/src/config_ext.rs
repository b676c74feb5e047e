//! Extension pour intégrer le client ICY dans pmoconfig
//!
//! Ce module fournit le trait `IcyConfigExt` qui ajoute à `pmoconfig::Config`
//! la gestion des clés `sources.icy.*`.
//!
//! # Exemple
//!
//! ```no_run
//! use pmoconfig::get_config;
//! use pmoicy::{IcyConfigExt, IcySettings};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = get_config();
//! config.set_icy_max_retries(5)?;
//!
//! let settings = IcySettings::from_config(&config)?;
//! assert_eq!(settings.max_retries, 5);
//! # Ok(())
//! # }
//! ```

use crate::settings::{
    IcySettings, DEFAULT_CONNECTION_TIMEOUT_MS, DEFAULT_MAX_RETRIES, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_RETRY_DELAY_MS, DEFAULT_USER_AGENT,
};
use anyhow::Result;
use pmoconfig::Config;
use serde_yaml::Value;

/// Getter/setter pour une clé booléenne de `sources.icy`
macro_rules! icy_bool_key {
    ($getter:ident, $setter:ident, $key:literal, $default:expr) => {
        fn $getter(&self) -> Result<bool> {
            match self.get_value(&["sources", "icy", $key]) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => {
                    self.$setter($default)?;
                    Ok($default)
                }
            }
        }

        fn $setter(&self, value: bool) -> Result<()> {
            self.set_value(&["sources", "icy", $key], Value::Bool(value))
        }
    };
}

/// Getter/setter pour une clé entière de `sources.icy`
macro_rules! icy_u64_key {
    ($getter:ident, $setter:ident, $key:literal, $default:expr) => {
        fn $getter(&self) -> Result<u64> {
            match self.get_value(&["sources", "icy", $key]).ok().and_then(|v| v.as_u64()) {
                Some(n) => Ok(n),
                None => {
                    self.$setter($default)?;
                    Ok($default)
                }
            }
        }

        fn $setter(&self, value: u64) -> Result<()> {
            self.set_value(&["sources", "icy", $key], Value::Number(value.into()))
        }
    };
}

/// Trait d'extension pour gérer la configuration ICY dans pmoconfig
///
/// # Auto-persist des valeurs par défaut
///
/// Les getters persistent automatiquement la valeur par défaut quand la clé
/// est absente ou invalide.
pub trait IcyConfigExt {
    fn get_icy_enable_metadata(&self) -> Result<bool>;
    fn set_icy_enable_metadata(&self, value: bool) -> Result<()>;

    fn get_icy_require_metaint(&self) -> Result<bool>;
    fn set_icy_require_metaint(&self, value: bool) -> Result<()>;

    fn get_icy_strict_metadata(&self) -> Result<bool>;
    fn set_icy_strict_metadata(&self, value: bool) -> Result<()>;

    fn get_icy_auto_reconnect(&self) -> Result<bool>;
    fn set_icy_auto_reconnect(&self, value: bool) -> Result<()>;

    fn get_icy_follow_redirects(&self) -> Result<bool>;
    fn set_icy_follow_redirects(&self, value: bool) -> Result<()>;

    /// Tentatives de reconnexion consécutives (défaut : 3)
    fn get_icy_max_retries(&self) -> Result<u64>;
    fn set_icy_max_retries(&self, value: u64) -> Result<()>;

    fn get_icy_retry_delay_ms(&self) -> Result<u64>;
    fn set_icy_retry_delay_ms(&self, value: u64) -> Result<()>;

    fn get_icy_connection_timeout_ms(&self) -> Result<u64>;
    fn set_icy_connection_timeout_ms(&self, value: u64) -> Result<()>;

    /// Timeout de lecture, 0 pour le désactiver
    fn get_icy_read_timeout_ms(&self) -> Result<u64>;
    fn set_icy_read_timeout_ms(&self, value: u64) -> Result<()>;

    fn get_icy_user_agent(&self) -> Result<String>;
    fn set_icy_user_agent(&self, value: String) -> Result<()>;
}

impl IcyConfigExt for Config {
    icy_bool_key!(
        get_icy_enable_metadata,
        set_icy_enable_metadata,
        "enable_metadata",
        true
    );
    icy_bool_key!(
        get_icy_require_metaint,
        set_icy_require_metaint,
        "require_metaint",
        true
    );
    icy_bool_key!(
        get_icy_strict_metadata,
        set_icy_strict_metadata,
        "strict_metadata",
        false
    );
    icy_bool_key!(
        get_icy_auto_reconnect,
        set_icy_auto_reconnect,
        "auto_reconnect",
        true
    );
    icy_bool_key!(
        get_icy_follow_redirects,
        set_icy_follow_redirects,
        "follow_redirects",
        true
    );

    icy_u64_key!(
        get_icy_max_retries,
        set_icy_max_retries,
        "max_retries",
        DEFAULT_MAX_RETRIES as u64
    );
    icy_u64_key!(
        get_icy_retry_delay_ms,
        set_icy_retry_delay_ms,
        "retry_delay_ms",
        DEFAULT_RETRY_DELAY_MS
    );
    icy_u64_key!(
        get_icy_connection_timeout_ms,
        set_icy_connection_timeout_ms,
        "connection_timeout_ms",
        DEFAULT_CONNECTION_TIMEOUT_MS
    );
    icy_u64_key!(
        get_icy_read_timeout_ms,
        set_icy_read_timeout_ms,
        "read_timeout_ms",
        DEFAULT_READ_TIMEOUT_MS
    );

    fn get_icy_user_agent(&self) -> Result<String> {
        match self.get_value(&["sources", "icy", "user_agent"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Ok(s),
            _ => {
                self.set_icy_user_agent(DEFAULT_USER_AGENT.to_string())?;
                Ok(DEFAULT_USER_AGENT.to_string())
            }
        }
    }

    fn set_icy_user_agent(&self, value: String) -> Result<()> {
        self.set_value(&["sources", "icy", "user_agent"], Value::String(value))
    }
}

impl IcySettings {
    /// Builds the runtime settings from the `sources.icy` section.
    ///
    /// Keys that are not stored in the configuration (buffer sizes) keep
    /// their default value.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            enable_metadata: config.get_icy_enable_metadata()?,
            require_metaint: config.get_icy_require_metaint()?,
            strict_metadata: config.get_icy_strict_metadata()?,
            auto_reconnect: config.get_icy_auto_reconnect()?,
            max_retries: u32::try_from(config.get_icy_max_retries()?).unwrap_or(u32::MAX),
            retry_delay_ms: config.get_icy_retry_delay_ms()?,
            connection_timeout_ms: config.get_icy_connection_timeout_ms()?,
            read_timeout_ms: config.get_icy_read_timeout_ms()?,
            follow_redirects: config.get_icy_follow_redirects()?,
            user_agent: config.get_icy_user_agent()?,
            ..Self::default()
        })
    }
}
