//! Command validation: tokenize without shell expansion, resolve the base command,
//! and apply the static policy.

use super::policy::{CommandCategory, CommandPolicy};

/// Why a command string was refused. The `Display` text is what callers see in `stderr`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyRejection {
    #[error("empty command")]
    Empty,
    #[error("parse error: {0}")]
    Parse(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not allowlisted: {0}")]
    NotAllowlisted(String),
    #[error("dangerous pattern: {0}")]
    DangerousPattern(&'static str),
}

/// A command that passed validation: the argument vector to execute and its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCommand {
    pub argv: Vec<String>,
    pub base: String,
    pub category: CommandCategory,
}

/// Final path segment of the first token (`/usr/bin/nmap` -> `nmap`).
pub fn base_command(first_token: &str) -> &str {
    first_token.rsplit('/').next().unwrap_or(first_token)
}

/// Validate a raw command string against `policy`.
///
/// Metacharacters are checked on the raw string, never on tokens, so quoting cannot
/// smuggle them past the check. When a command is both dangerous and not allowlisted
/// the dangerous pattern is the reported reason.
pub fn validate(policy: &CommandPolicy, command: &str) -> Result<ValidatedCommand, PolicyRejection> {
    let result = check(policy, command);
    match &result {
        Ok(v) => log::debug!("command accepted [{}]: {}", v.category, command),
        Err(reason) => log::warn!("command rejected: {:?} ({})", command, reason),
    }
    result
}

fn check(policy: &CommandPolicy, command: &str) -> Result<ValidatedCommand, PolicyRejection> {
    if command.trim().is_empty() {
        return Err(PolicyRejection::Empty);
    }
    let argv = shell_words::split(command).map_err(|e| PolicyRejection::Parse(e.to_string()))?;
    let Some(first) = argv.first() else {
        return Err(PolicyRejection::Empty);
    };
    let base = base_command(first).to_string();

    if let Some(pattern) = policy.dangerous_pattern(command) {
        return Err(PolicyRejection::DangerousPattern(pattern));
    }
    if policy.is_forbidden(&base) {
        return Err(PolicyRejection::Forbidden(base));
    }
    let category = policy
        .category(&base)
        .ok_or_else(|| PolicyRejection::NotAllowlisted(base.clone()))?;
    Ok(ValidatedCommand {
        argv,
        base,
        category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CommandPolicy {
        CommandPolicy::new()
    }

    #[test]
    fn empty_and_whitespace_rejected() {
        assert_eq!(validate(&policy(), ""), Err(PolicyRejection::Empty));
        assert_eq!(validate(&policy(), "   \t "), Err(PolicyRejection::Empty));
        // quotes around nothing tokenize to a single empty argument, not an empty vector
        assert_eq!(
            validate(&policy(), "''"),
            Err(PolicyRejection::NotAllowlisted(String::new()))
        );
    }

    #[test]
    fn unbalanced_quotes_are_a_parse_error() {
        let err = validate(&policy(), "echo 'unterminated").unwrap_err();
        assert!(matches!(err, PolicyRejection::Parse(_)), "{:?}", err);
        assert!(err.to_string().starts_with("parse error:"));
    }

    #[test]
    fn forbidden_commands_rejected_with_benign_args() {
        assert_eq!(
            validate(&policy(), "rm -rf /").unwrap_err().to_string(),
            "forbidden: rm"
        );
        assert_eq!(
            validate(&policy(), "sudo id"),
            Err(PolicyRejection::Forbidden("sudo".to_string()))
        );
        assert_eq!(
            validate(&policy(), "/bin/chmod --help"),
            Err(PolicyRejection::Forbidden("chmod".to_string()))
        );
    }

    #[test]
    fn unknown_commands_rejected() {
        assert_eq!(
            validate(&policy(), "bash -c id"),
            Err(PolicyRejection::NotAllowlisted("bash".to_string()))
        );
    }

    #[test]
    fn metacharacters_rejected_regardless_of_base_command() {
        for cmd in [
            "ls; whoami",
            "ls && whoami",
            "ls || whoami",
            "cat /etc/passwd | grep root",
            "echo hi > out.txt",
            "echo hi >> out.txt",
            "sort < in.txt",
            "echo `id`",
            "echo $(id)",
            "echo 'quoted ; still rejected'",
            "rm -rf / ; ls",
            "bash -c 'a|b'",
        ] {
            let err = validate(&policy(), cmd).unwrap_err();
            assert!(
                matches!(err, PolicyRejection::DangerousPattern(_)),
                "{}: {:?}",
                cmd,
                err
            );
        }
        assert_eq!(
            validate(&policy(), "ls; whoami"),
            Err(PolicyRejection::DangerousPattern(";"))
        );
    }

    #[test]
    fn path_prefixed_command_matches_base_name() {
        let v = validate(&policy(), "/usr/bin/nmap -sV 10.0.0.1").unwrap();
        assert_eq!(v.base, "nmap");
        assert_eq!(v.category, CommandCategory::Reconnaissance);
        assert_eq!(v.argv, vec!["/usr/bin/nmap", "-sV", "10.0.0.1"]);
    }

    #[test]
    fn quoting_is_respected_and_variables_are_not_expanded() {
        let v = validate(&policy(), "echo \"hello world\" $HOME").unwrap();
        assert_eq!(v.argv, vec!["echo", "hello world", "$HOME"]);
    }

    #[test]
    fn base_command_strips_directories() {
        assert_eq!(base_command("/usr/bin/nmap"), "nmap");
        assert_eq!(base_command("nmap"), "nmap");
        assert_eq!(base_command("./tools/"), "");
    }
}
