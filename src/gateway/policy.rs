//! Command-content validation policy
//!
//! A deterministic, side-effect-free classifier over command text. Roles are
//! mapped to policy tiers by priority:
//!
//! - the senior tier is checked only against a deny-list of catastrophic
//!   operations; trusted operators need broad diagnostic latitude, but a few
//!   operations are never survivable to a headless embedded host
//! - standard tiers take an allow-list of command prefixes, then content
//!   deny checks (elevation, path traversal, credential files, chaining),
//!   so an otherwise-legal command can still be blocked by content
//!
//! The tier table is configurable rather than hard-coded to two entries.
//! Validation never executes anything.

use crate::rbac::Role;
use serde::Serialize;

/// Verdict of validating one command for one role
#[derive(Debug, Clone, Serialize)]
pub struct CommandVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CommandVerdict {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// How a tier evaluates command text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierMode {
    /// Everything passes unless it hits the catastrophic deny-list
    DenyListOnly,
    /// Command must prefix-match the allow-list, then survive the content
    /// deny checks and the catastrophic deny-list
    AllowListThenDenyList,
}

/// One policy tier; roles are matched to the highest tier whose
/// `min_priority` they meet
#[derive(Debug, Clone)]
pub struct PolicyTier {
    pub name: String,
    pub min_priority: i32,
    pub mode: TierMode,
}

/// The gateway's command validation policy
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    /// Tiers ordered by descending `min_priority`
    tiers: Vec<PolicyTier>,
    /// Catastrophic operations denied for every tier
    catastrophic: Vec<String>,
    /// Allowed command prefixes for non-senior tiers
    allow_prefixes: Vec<String>,
    /// Content that blocks an otherwise allow-listed command
    content_deny: Vec<String>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                PolicyTier {
                    name: "senior".to_string(),
                    min_priority: 100,
                    mode: TierMode::DenyListOnly,
                },
                PolicyTier {
                    name: "standard".to_string(),
                    min_priority: i32::MIN,
                    mode: TierMode::AllowListThenDenyList,
                },
            ],
            catastrophic: [
                "rm -rf /",
                "rm -fr /",
                "rm -rf --no-preserve-root",
                "of=/dev/",
                "> /dev/sd",
                "mkfs",
                "shutdown",
                "reboot",
                "poweroff",
                "halt",
                "init 0",
                "init 6",
                ":(){",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            allow_prefixes: [
                "uptime",
                "free",
                "df",
                "du -sh",
                "ps",
                "top -bn1",
                "whoami",
                "hostname",
                "date",
                "uname",
                "vcgencmd",
                "cat /proc/",
                "cat /sys/class/thermal/",
                "ls",
                "tail -n",
                "journalctl --no-pager -n",
                "systemctl status",
                "ping -c",
                "ip addr",
                "echo",
                "monsterbox-status",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            content_deny: [
                "sudo ",
                "su ",
                "doas ",
                "../",
                "/etc/shadow",
                "/etc/passwd",
                ".ssh/",
                "authorized_keys",
                "id_rsa",
                ";",
                "&&",
                "||",
                "`",
                "$(",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl CommandPolicy {
    /// Replace the tier table. Tiers are re-sorted by descending
    /// `min_priority`; the last one acts as the catch-all.
    pub fn with_tiers(mut self, mut tiers: Vec<PolicyTier>) -> Self {
        tiers.sort_by(|a, b| b.min_priority.cmp(&a.min_priority));
        self.tiers = tiers;
        self
    }

    /// Replace the allow-list used by standard tiers
    pub fn with_allow_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.allow_prefixes = prefixes;
        self
    }

    /// The tier a role falls into
    pub fn tier_for(&self, role: &Role) -> Option<&PolicyTier> {
        self.tiers.iter().find(|t| role.priority >= t.min_priority)
    }

    /// Classify a command for a role. Purely textual; nothing is executed.
    pub fn validate(&self, command: &str, role: &Role) -> CommandVerdict {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return CommandVerdict::blocked("empty command");
        }

        let Some(tier) = self.tier_for(role) else {
            return CommandVerdict::blocked(format!(
                "no policy tier matches role '{}'",
                role.name
            ));
        };

        let lowered = trimmed.to_lowercase();

        match tier.mode {
            TierMode::DenyListOnly => self.check_catastrophic(&lowered),
            TierMode::AllowListThenDenyList => {
                // Prefix match first, then content checks, in that order
                if !self
                    .allow_prefixes
                    .iter()
                    .any(|p| prefix_allows(p, trimmed))
                {
                    return CommandVerdict::blocked(format!(
                        "command not on the allow-list for tier '{}'",
                        tier.name
                    ));
                }

                for pattern in &self.content_deny {
                    if lowered.contains(pattern.as_str()) {
                        return CommandVerdict::blocked(format!(
                            "blocked content: '{}'",
                            pattern
                        ));
                    }
                }

                self.check_catastrophic(&lowered)
            }
        }
    }

    fn check_catastrophic(&self, lowered: &str) -> CommandVerdict {
        for pattern in &self.catastrophic {
            if lowered.contains(pattern.as_str()) {
                return CommandVerdict::blocked(format!(
                    "catastrophic operation: '{}'",
                    pattern
                ));
            }
        }
        CommandVerdict::ok()
    }
}

/// An allow-prefix matches only at a word boundary: the command is the
/// prefix exactly, or the prefix is followed by whitespace. Prefixes that
/// already end in a separator (e.g. "cat /proc/") carry their own boundary.
fn prefix_allows(prefix: &str, command: &str) -> bool {
    let Some(rest) = command.strip_prefix(prefix) else {
        return false;
    };
    if prefix.ends_with(|c: char| !c.is_alphanumeric()) {
        return true;
    }
    rest.is_empty() || rest.starts_with(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::Permission;

    fn senior_role() -> Role {
        Role::new(
            "keeper",
            "keeper",
            100,
            [Permission::Ssh, Permission::Admin].into_iter().collect(),
        )
    }

    fn operator_role() -> Role {
        Role::new(
            "operator",
            "operator",
            50,
            [Permission::Ssh].into_iter().collect(),
        )
    }

    #[test]
    fn test_senior_passes_diagnostics() {
        let policy = CommandPolicy::default();
        let role = senior_role();

        assert!(policy.validate("uptime", &role).valid);
        assert!(policy.validate("systemctl restart monsterbox", &role).valid);
        assert!(policy.validate("apt-get update", &role).valid);
    }

    #[test]
    fn test_senior_blocked_on_catastrophic() {
        let policy = CommandPolicy::default();
        let role = senior_role();

        assert!(!policy.validate("rm -rf /", &role).valid);
        assert!(!policy.validate("dd if=/dev/zero of=/dev/mmcblk0", &role).valid);
        assert!(!policy.validate("mkfs.ext4 /dev/sda1", &role).valid);
        assert!(!policy.validate("shutdown -h now", &role).valid);
        assert!(!policy.validate("reboot", &role).valid);
    }

    #[test]
    fn test_standard_allow_list() {
        let policy = CommandPolicy::default();
        let role = operator_role();

        assert!(policy.validate("uptime", &role).valid);
        assert!(policy.validate("df -h", &role).valid);
        assert!(policy.validate("monsterbox-status --summary", &role).valid);

        let verdict = policy.validate("apt-get update", &role);
        assert!(!verdict.valid);
        assert!(verdict.reason.unwrap().contains("allow-list"));
    }

    #[test]
    fn test_allow_prefix_stops_at_word_boundary() {
        let policy = CommandPolicy::default();
        let role = operator_role();

        assert!(policy.validate("ls", &role).valid);
        assert!(policy.validate("ls -la /tmp", &role).valid);
        assert!(policy.validate("free -m", &role).valid);
        assert!(policy.validate("cat /proc/cpuinfo", &role).valid);

        // A different binary sharing the prefix is not allow-listed
        assert!(!policy.validate("lsattr /tmp", &role).valid);
        assert!(!policy.validate("freestyle", &role).valid);
        assert!(!policy.validate("dfu-util -l", &role).valid);
    }

    #[test]
    fn test_standard_elevation_blocked_even_with_legal_base() {
        let policy = CommandPolicy::default();
        let role = operator_role();

        assert!(!policy.validate("sudo rm file", &role).valid);
        // Allow-listed prefix, blocked by content
        assert!(!policy.validate("echo sudo reboot", &role).valid);
        assert!(!policy.validate("cat /proc/../etc/shadow", &role).valid);
        assert!(!policy.validate("ls ~/.ssh/", &role).valid);
    }

    #[test]
    fn test_standard_chaining_blocked() {
        let policy = CommandPolicy::default();
        let role = operator_role();

        assert!(!policy.validate("uptime; rm -rf /", &role).valid);
        assert!(!policy.validate("uptime && curl evil.example", &role).valid);
        assert!(!policy.validate("echo $(cat /etc/passwd)", &role).valid);
    }

    #[test]
    fn test_empty_command_blocked() {
        let policy = CommandPolicy::default();
        assert!(!policy.validate("   ", &operator_role()).valid);
        assert!(!policy.validate("", &senior_role()).valid);
    }

    #[test]
    fn test_intermediate_tier_configurable() {
        // Three-tier policy: a maintenance tier between senior and standard
        // that still uses the allow-list but exists as its own band
        let policy = CommandPolicy::default().with_tiers(vec![
            PolicyTier {
                name: "senior".to_string(),
                min_priority: 100,
                mode: TierMode::DenyListOnly,
            },
            PolicyTier {
                name: "maintenance".to_string(),
                min_priority: 75,
                mode: TierMode::DenyListOnly,
            },
            PolicyTier {
                name: "standard".to_string(),
                min_priority: i32::MIN,
                mode: TierMode::AllowListThenDenyList,
            },
        ]);

        let maintenance = Role::new(
            "maintenance",
            "maintenance",
            80,
            [Permission::Ssh].into_iter().collect(),
        );

        assert_eq!(policy.tier_for(&maintenance).unwrap().name, "maintenance");
        assert!(policy.validate("apt-get update", &maintenance).valid);
        assert!(!policy.validate("reboot", &maintenance).valid);
        assert_eq!(
            policy.tier_for(&operator_role()).unwrap().name,
            "standard"
        );
    }

    #[test]
    fn test_validation_is_deterministic() {
        let policy = CommandPolicy::default();
        let role = operator_role();
        let first = policy.validate("uptime", &role);
        let second = policy.validate("uptime", &role);
        assert_eq!(first.valid, second.valid);
    }

    #[test]
    fn test_senior_case_insensitive_deny() {
        let policy = CommandPolicy::default();
        assert!(!policy.validate("Shutdown -h now", &senior_role()).valid);
    }

    #[test]
    fn test_no_tier_for_negative_only_policy() {
        let policy = CommandPolicy::default().with_tiers(vec![PolicyTier {
            name: "senior".to_string(),
            min_priority: 100,
            mode: TierMode::DenyListOnly,
        }]);
        let verdict = policy.validate("uptime", &operator_role());
        assert!(!verdict.valid);
    }
}
