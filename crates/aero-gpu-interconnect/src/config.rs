//! Runtime knobs of the interconnect.

use crate::constant_buffers::MAX_QUICK_BIND_BUFFERS;

/// Descriptor sets handed to the submitter per batch.
pub const DEFAULT_DESCRIPTOR_BATCH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterconnectConfig {
    /// Update only the descriptors reading rebound constant buffers when possible.
    pub quick_bind: bool,
    /// Rebinds between two draws beyond which a full descriptor sync is used.
    pub max_quick_bind_buffers: usize,
    pub descriptor_batch_size: usize,
    /// Push descriptors instead of allocating sets. Quick bind is unavailable in this mode.
    pub push_descriptors: bool,
}

impl Default for InterconnectConfig {
    fn default() -> Self {
        Self {
            quick_bind: true,
            max_quick_bind_buffers: MAX_QUICK_BIND_BUFFERS,
            descriptor_batch_size: DEFAULT_DESCRIPTOR_BATCH_SIZE,
            push_descriptors: false,
        }
    }
}

impl InterconnectConfig {
    /// Defaults, overridden by `AERO_INTERCONNECT_DISABLE_QUICK_BIND` and
    /// `AERO_INTERCONNECT_PUSH_DESCRIPTORS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if env_var_truthy("AERO_INTERCONNECT_DISABLE_QUICK_BIND") {
            config.quick_bind = false;
        }
        if env_var_truthy("AERO_INTERCONNECT_PUSH_DESCRIPTORS") {
            config.push_descriptors = true;
        }
        config
    }

    /// Quick-bind capacity handed to the constant-buffer tracker; zero disables tracking.
    pub(crate) fn quick_bind_capacity(&self) -> usize {
        if self.quick_bind && !self.push_descriptors {
            self.max_quick_bind_buffers.min(MAX_QUICK_BIND_BUFFERS)
        } else {
            0
        }
    }
}

fn env_var_truthy(name: &str) -> bool {
    let Ok(raw) = std::env::var(name) else {
        return false;
    };
    is_truthy(&raw)
}

fn is_truthy(raw: &str) -> bool {
    let v = raw.trim();
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    const DISABLE_QUICK_BIND: &str = "AERO_INTERCONNECT_DISABLE_QUICK_BIND";
    const PUSH_DESCRIPTORS: &str = "AERO_INTERCONNECT_PUSH_DESCRIPTORS";

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        prior: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prior = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, prior }
        }

        fn unset(key: &'static str) -> Self {
            let prior = std::env::var(key).ok();
            std::env::remove_var(key);
            Self { key, prior }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.prior.take() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn from_env_defaults_without_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _quick = EnvVarGuard::unset(DISABLE_QUICK_BIND);
        let _push = EnvVarGuard::unset(PUSH_DESCRIPTORS);

        let config = InterconnectConfig::from_env();
        assert!(config.quick_bind);
        assert!(!config.push_descriptors);
    }

    #[test]
    fn from_env_honors_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        {
            let _quick = EnvVarGuard::set(DISABLE_QUICK_BIND, "yes");
            let _push = EnvVarGuard::set(PUSH_DESCRIPTORS, "1");
            let config = InterconnectConfig::from_env();
            assert!(!config.quick_bind);
            assert!(config.push_descriptors);
            assert_eq!(config.quick_bind_capacity(), 0);
        }

        let _quick = EnvVarGuard::set(DISABLE_QUICK_BIND, "off");
        let _push = EnvVarGuard::unset(PUSH_DESCRIPTORS);
        let config = InterconnectConfig::from_env();
        assert!(config.quick_bind);
        assert!(!config.push_descriptors);
    }

    #[test]
    fn truthy_values() {
        for v in ["1", "true", "TRUE", " yes ", "On"] {
            assert!(is_truthy(v), "{v:?}");
        }
        for v in ["", "0", "false", "off", "2"] {
            assert!(!is_truthy(v), "{v:?}");
        }
    }

    #[test]
    fn push_descriptors_disable_quick_bind() {
        let config = InterconnectConfig {
            push_descriptors: true,
            ..InterconnectConfig::default()
        };
        assert_eq!(config.quick_bind_capacity(), 0);
        assert_eq!(
            InterconnectConfig::default().quick_bind_capacity(),
            MAX_QUICK_BIND_BUFFERS
        );
    }

    #[test]
    fn capacity_is_clamped() {
        let config = InterconnectConfig {
            max_quick_bind_buffers: 64,
            ..InterconnectConfig::default()
        };
        assert_eq!(config.quick_bind_capacity(), MAX_QUICK_BIND_BUFFERS);
    }
}
