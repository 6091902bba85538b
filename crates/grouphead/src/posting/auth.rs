use crate::{STATUS_MODERATED, STATUS_POST};

/// Authentication rank of a poster, lowest first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AuthRank {
    /// May read but never post.
    #[default]
    Reader,
    /// May post to open groups.
    User,
    /// May also post to moderated groups.
    Moderator,
    /// May post anywhere, including groups closed to posting.
    Feeder,
}

impl AuthRank {
    /// Whether this rank may post to a group with the given status byte.
    pub fn test_status(self, status: u8) -> bool {
        match status {
            STATUS_POST => self >= Self::User,
            STATUS_MODERATED => self >= Self::Moderator,
            _ => self >= Self::Feeder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::STATUS_NO_POST;

    #[test]
    fn ranks_unlock_statuses_in_order() {
        assert!(!AuthRank::Reader.test_status(STATUS_POST));
        assert!(AuthRank::User.test_status(STATUS_POST));
        assert!(!AuthRank::User.test_status(STATUS_MODERATED));
        assert!(AuthRank::Moderator.test_status(STATUS_MODERATED));
        assert!(!AuthRank::Moderator.test_status(STATUS_NO_POST));
        assert!(AuthRank::Feeder.test_status(STATUS_NO_POST));
        assert!(AuthRank::Feeder.test_status(b'x'));
    }
}
