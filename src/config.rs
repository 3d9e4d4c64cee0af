//! Engine configuration.

use {
    crate::group::{find, GroupId, Registry},
    anyhow::{ensure, Result},
    std::time::Duration,
};

/// Tunables for one engine instance.
#[derive(Clone, Debug)]
pub struct SaeConfig {
    /// Enabled groups in preference order; negotiation starts with the
    /// first entry.
    pub groups: Vec<GroupId>,
    /// Groups excluded even if listed in `groups`.
    pub disabled_groups: Vec<GroupId>,
    /// Pending-handshake count above which new peers must present an
    /// anti-clogging token.
    pub anti_clogging_threshold: usize,
    /// Retransmissions and renegotiation rounds allowed per context.
    pub max_retries: u32,
    /// Deadline for the peer's next frame before a retransmission.
    pub retry_timeout: Duration,
}

impl Default for SaeConfig {
    fn default() -> Self {
        Self {
            groups:                  vec![GroupId(19)],
            disabled_groups:         Vec::new(),
            anti_clogging_threshold: 5,
            max_retries:             3,
            retry_timeout:           Duration::from_secs(1),
        }
    }
}

impl SaeConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.groups.is_empty(), "no groups enabled");
        ensure!(
            self.enabled_ids().any(|id| find(id).is_some()),
            "no enabled group is implemented"
        );
        ensure!(!self.retry_timeout.is_zero(), "retry timeout must be nonzero");
        Ok(())
    }

    pub(crate) fn registry(&self) -> Registry {
        Registry::new(self.enabled_ids().collect())
    }

    fn enabled_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.groups
            .iter()
            .copied()
            .filter(|id| !self.disabled_groups.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        SaeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_empty_and_unimplemented() {
        let mut config = SaeConfig {
            groups: Vec::new(),
            ..SaeConfig::default()
        };
        assert!(config.validate().is_err());

        config.groups = vec![GroupId(14)];
        assert!(config.validate().is_err(), "group 14 is not implemented");
    }

    #[test]
    fn test_disabled_groups_are_excluded() {
        let config = SaeConfig {
            groups: vec![GroupId(19), GroupId(20)],
            disabled_groups: vec![GroupId(19)],
            ..SaeConfig::default()
        };
        config.validate().unwrap();
        let registry = config.registry();
        assert!(registry.lookup(GroupId(19)).is_err());
        assert!(registry.lookup(GroupId(20)).is_ok());
    }
}
