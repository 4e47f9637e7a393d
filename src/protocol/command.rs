//! Command kinds understood by the server

/// Longest key the memcached protocol allows
pub const MAX_KEY_LENGTH: usize = 250;

/// A command kind. Fieldless so it can index the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// set <key> <flags> <exptime> <bytes> [noreply]
    Set,
    /// add <key> <flags> <exptime> <bytes> [noreply]
    Add,
    /// replace <key> <flags> <exptime> <bytes> [noreply]
    Replace,
    /// append <key> <flags> <exptime> <bytes> [noreply]
    Append,
    /// prepend <key> <flags> <exptime> <bytes> [noreply]
    Prepend,
    /// cas <key> <flags> <exptime> <bytes> <cas unique> [noreply]
    Cas,
    /// get <key>
    Get,
    /// gets <key>
    Gets,
    /// delete <key> [time] [noreply]
    Delete,
    /// incr <key> <delta> [noreply]
    Incr,
    /// decr <key> <delta> [noreply]
    Decr,
    /// stat
    Stat,
    /// 0ops
    ZeroOps,
}

impl Command {
    /// Number of command kinds
    pub const COUNT: usize = 13;

    pub const ALL: [Command; Self::COUNT] = [
        Command::Set,
        Command::Add,
        Command::Replace,
        Command::Append,
        Command::Prepend,
        Command::Cas,
        Command::Get,
        Command::Gets,
        Command::Delete,
        Command::Incr,
        Command::Decr,
        Command::Stat,
        Command::ZeroOps,
    ];

    /// Position in the dispatch table
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Store commands carry a value body that moves into the cache
    #[inline]
    pub fn is_store(self) -> bool {
        matches!(
            self,
            Command::Set
                | Command::Add
                | Command::Replace
                | Command::Append
                | Command::Prepend
                | Command::Cas
        )
    }

    /// Everything except the administrative commands addresses a key
    #[inline]
    pub fn needs_key(self) -> bool {
        !matches!(self, Command::Stat | Command::ZeroOps)
    }

    /// Look a command up by name (case-insensitive, no allocation)
    pub fn from_name(name: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|cmd| name.eq_ignore_ascii_case(cmd.name().as_bytes()))
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Set => "set",
            Command::Add => "add",
            Command::Replace => "replace",
            Command::Append => "append",
            Command::Prepend => "prepend",
            Command::Cas => "cas",
            Command::Get => "get",
            Command::Gets => "gets",
            Command::Delete => "delete",
            Command::Incr => "incr",
            Command::Decr => "decr",
            Command::Stat => "stat",
            Command::ZeroOps => "0ops",
        }
    }
}

/// Check if a key is valid
pub fn is_valid_key(key: &[u8]) -> bool {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return false;
    }
    // Keys cannot contain control characters or whitespace
    key.iter().all(|&b| b > 32 && b < 127)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key(b"valid_key"));
        assert!(is_valid_key(b"key:with:colons"));
        assert!(!is_valid_key(b""));
        assert!(!is_valid_key(b"key with space"));
        assert!(!is_valid_key(&[b'a'; 251])); // Too long
    }

    #[test]
    fn test_indices_match_all() {
        for (i, cmd) in Command::ALL.iter().enumerate() {
            assert_eq!(cmd.index(), i);
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Command::from_name(b"GET"), Some(Command::Get));
        assert_eq!(Command::from_name(b"Prepend"), Some(Command::Prepend));
        assert_eq!(Command::from_name(b"0ops"), Some(Command::ZeroOps));
        assert_eq!(Command::from_name(b"flush_all"), None);
    }

    #[test]
    fn test_store_threshold() {
        assert!(Command::Cas.is_store());
        assert!(Command::Append.is_store());
        assert!(!Command::Get.is_store());
        assert!(!Command::Incr.is_store());
        assert!(!Command::Stat.needs_key());
        assert!(Command::Delete.needs_key());
    }
}
