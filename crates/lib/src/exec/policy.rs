//! Static command policy: allow-table (base command -> category), deny-set, and
//! the shell metacharacters that are never accepted in a raw command string.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Descriptive tag attached to every allowlisted base command. Used for logging and
/// reporting only; authorization is allow/deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    Reconnaissance,
    Scanning,
    Enumeration,
    Exploitation,
    PostExploitation,
    Reporting,
    Basic,
}

impl CommandCategory {
    /// Wire name (same as the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            CommandCategory::Reconnaissance => "reconnaissance",
            CommandCategory::Scanning => "scanning",
            CommandCategory::Enumeration => "enumeration",
            CommandCategory::Exploitation => "exploitation",
            CommandCategory::PostExploitation => "post_exploitation",
            CommandCategory::Reporting => "reporting",
            CommandCategory::Basic => "basic",
        }
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use CommandCategory::{Basic, Enumeration, Exploitation, Reconnaissance, Scanning};

/// Base commands that may run, with their category.
const ALLOWED_COMMANDS: &[(&str, CommandCategory)] = &[
    // recon / scanning
    ("nmap", Reconnaissance),
    ("masscan", Scanning),
    ("ping", Reconnaissance),
    ("dig", Reconnaissance),
    ("nslookup", Reconnaissance),
    ("host", Reconnaissance),
    ("whois", Reconnaissance),
    ("netcat", Reconnaissance),
    ("nc", Reconnaissance),
    ("netcat-traditional", Reconnaissance),
    ("searchsploit", Exploitation),
    // web
    ("gobuster", Enumeration),
    ("nikto", Enumeration),
    ("dirb", Enumeration),
    ("sqlmap", Exploitation),
    ("xsser", Exploitation),
    ("curl", Enumeration),
    ("wget", Enumeration),
    ("wfuzz", Enumeration),
    ("ffuf", Enumeration),
    ("whatweb", Enumeration),
    ("wafw00f", Enumeration),
    ("wpscan", Enumeration),
    // cracking
    ("hydra", Exploitation),
    ("john", Exploitation),
    ("hashcat", Exploitation),
    ("medusa", Exploitation),
    ("ncrack", Exploitation),
    ("crunch", Exploitation),
    ("cewl", Enumeration),
    ("hashid", Basic),
    // network capture / wireless
    ("tcpdump", Reconnaissance),
    ("wireshark", Reconnaissance),
    ("tshark", Reconnaissance),
    ("aircrack-ng", Exploitation),
    ("airmon-ng", Reconnaissance),
    ("airodump-ng", Reconnaissance),
    ("aireplay-ng", Exploitation),
    ("traceroute", Reconnaissance),
    ("tracepath", Reconnaissance),
    ("mtr", Reconnaissance),
    ("arping", Reconnaissance),
    ("hping3", Reconnaissance),
    ("fping", Reconnaissance),
    ("telnet", Reconnaissance),
    ("netstat", Reconnaissance),
    ("ss", Reconnaissance),
    // enumeration
    ("enum4linux", Enumeration),
    ("nbtscan", Enumeration),
    ("smbclient", Enumeration),
    ("rpcclient", Enumeration),
    ("showmount", Enumeration),
    ("rpcinfo", Enumeration),
    ("snmpwalk", Enumeration),
    ("onesixtyone", Enumeration),
    // system basics
    ("whoami", Basic),
    ("id", Basic),
    ("pwd", Basic),
    ("ls", Basic),
    ("cat", Basic),
    ("head", Basic),
    ("tail", Basic),
    ("grep", Basic),
    ("awk", Basic),
    ("sed", Basic),
    ("find", Basic),
    ("which", Basic),
    ("whereis", Basic),
    ("file", Basic),
    ("stat", Basic),
    ("du", Basic),
    ("df", Basic),
    ("ps", Basic),
    ("top", Basic),
    ("uname", Basic),
    ("hostname", Basic),
    ("date", Basic),
    ("uptime", Basic),
    ("who", Basic),
    ("w", Basic),
    ("echo", Basic),
    ("printf", Basic),
    ("wc", Basic),
    ("sort", Basic),
    ("uniq", Basic),
    ("cut", Basic),
    ("tr", Basic),
    ("free", Basic),
    ("lsof", Basic),
    ("ifconfig", Basic),
    ("ip", Basic),
    ("route", Basic),
    ("ssh", Basic),
    ("scp", Basic),
    // binary analysis
    ("strings", Basic),
    ("hexdump", Basic),
    ("xxd", Basic),
    ("od", Basic),
    ("binwalk", Basic),
    // tooling
    ("git", Basic),
    ("vim", Basic),
    ("vi", Basic),
    ("nano", Basic),
    ("python3", Basic),
    ("pip", Basic),
    ("pip3", Basic),
];

/// Destructive or privilege-changing commands. Rejected even with benign arguments.
const FORBIDDEN_COMMANDS: &[&str] = &[
    "rm", "rmdir", "del", "format", "fdisk", "mkfs", "dd", "shred", "chmod", "chown", "su",
    "sudo", "passwd", "useradd", "userdel", "reboot", "shutdown",
];

/// Checked against the raw, untokenized command string, in this order.
pub const DANGEROUS_PATTERNS: &[&str] = &["&&", "||", ";", "|", ">", ">>", "<", "`", "$("];

/// Allow-table and deny-set lookups. Built once and shared by the validator,
/// the executor, and the gateway's `/commands/allowed` listing.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    allowed: HashMap<&'static str, CommandCategory>,
    forbidden: &'static [&'static str],
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandPolicy {
    pub fn new() -> Self {
        Self {
            allowed: ALLOWED_COMMANDS.iter().copied().collect(),
            forbidden: FORBIDDEN_COMMANDS,
        }
    }

    /// Category bound to an allowlisted base command.
    pub fn category(&self, base: &str) -> Option<CommandCategory> {
        self.allowed.get(base).copied()
    }

    pub fn is_forbidden(&self, base: &str) -> bool {
        self.forbidden.contains(&base)
    }

    /// First dangerous pattern found in `raw`, if any.
    pub fn dangerous_pattern(&self, raw: &str) -> Option<&'static str> {
        DANGEROUS_PATTERNS.iter().copied().find(|p| raw.contains(p))
    }

    /// Allow-table as base command -> category name, sorted by command.
    pub fn allowed_commands(&self) -> BTreeMap<&'static str, &'static str> {
        self.allowed
            .iter()
            .map(|(cmd, cat)| (*cmd, cat.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_and_forbidden_sets_are_disjoint() {
        let policy = CommandPolicy::new();
        for cmd in FORBIDDEN_COMMANDS {
            assert!(policy.category(cmd).is_none(), "{} is both allowed and forbidden", cmd);
        }
    }

    #[test]
    fn category_lookup() {
        let policy = CommandPolicy::new();
        assert_eq!(policy.category("nmap"), Some(CommandCategory::Reconnaissance));
        assert_eq!(policy.category("masscan"), Some(CommandCategory::Scanning));
        assert_eq!(policy.category("whoami"), Some(CommandCategory::Basic));
        assert_eq!(policy.category("bash"), None);
    }

    #[test]
    fn dangerous_pattern_reports_first_match() {
        let policy = CommandPolicy::new();
        assert_eq!(policy.dangerous_pattern("a && b"), Some("&&"));
        assert_eq!(policy.dangerous_pattern("echo `id`"), Some("`"));
        assert_eq!(policy.dangerous_pattern("echo $(id)"), Some("$("));
        assert_eq!(policy.dangerous_pattern("echo $HOME"), None);
    }

    #[test]
    fn category_serializes_snake_case() {
        let s = serde_json::to_string(&CommandCategory::PostExploitation).unwrap();
        assert_eq!(s, "\"post_exploitation\"");
        assert_eq!(CommandCategory::PostExploitation.to_string(), "post_exploitation");
    }

    #[test]
    fn allowed_commands_listing_is_complete() {
        let listing = CommandPolicy::new().allowed_commands();
        assert_eq!(listing.len(), ALLOWED_COMMANDS.len());
        assert_eq!(listing.get("sqlmap"), Some(&"exploitation"));
    }
}
