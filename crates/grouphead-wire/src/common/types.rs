/// Most groups a single insert or revert request can carry.
pub const MAX_GROUPS: usize = u8::MAX as usize;

/// Longest error string put on the wire, in bytes.
pub const MAX_ERROR_LEN: usize = 256;

/// Byte sent by `UpdateDown` when the swap happened.
pub const UPDATE_OK: u8 = 0xff;

/// Request commands, sent as their NUL-terminated name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    GroupHeadInsert,
    GroupHeadRevert,
    MoveDown,
    GetDown,
    UpdateDown,
    AdmCreateGroup,
}

impl Command {
    pub const ALL: [Self; 6] = [
        Self::GroupHeadInsert,
        Self::GroupHeadRevert,
        Self::MoveDown,
        Self::GetDown,
        Self::UpdateDown,
        Self::AdmCreateGroup,
    ];

    pub const fn name(self) -> &'static [u8] {
        match self {
            Self::GroupHeadInsert => b"GroupHeadInsert",
            Self::GroupHeadRevert => b"GroupHeadRevert",
            Self::MoveDown => b"MoveDown",
            Self::GetDown => b"GetDown",
            Self::UpdateDown => b"UpdateDown",
            Self::AdmCreateGroup => b"AdmCreateGroup",
        }
    }

    pub fn parse(name: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for command in Command::ALL {
            assert_eq!(Command::parse(command.name()), Some(command));
        }
        assert_eq!(Command::parse(b"groupheadinsert"), None);
        assert_eq!(Command::parse(b""), None);
    }
}
