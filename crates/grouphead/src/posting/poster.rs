use crate::{
    ArticleDirectStore, ArticleGroupStore, AuthRank, GroupAllocator, GroupList, Overview,
    PostingPolicy, Result, count_lines, parse_head, split_article, split_newsgroups,
};
use bytes::Bytes;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// What happened to a post. At most one flag is set; neither means the
/// article was accepted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PostOutcome {
    /// The article was refused and should not be offered again.
    pub rejected: bool,
    /// Something broke; the article may be retried.
    pub failed: bool,
}

impl PostOutcome {
    pub const ACCEPTED: Self = Self {
        rejected: false,
        failed: false,
    };
    pub const REJECTED: Self = Self {
        rejected: true,
        failed: false,
    };
    pub const FAILED: Self = Self {
        rejected: false,
        failed: true,
    };

    pub const fn is_accepted(self) -> bool {
        !self.rejected && !self.failed
    }
}

/// Takes raw articles through number allocation and storage.
///
/// Numbers are allocated before anything is written. Whatever step fails
/// afterwards, every allocated number is handed back to its group and the
/// message-id store is cleaned up, so a failed post leaves no trace beyond
/// a possible gap in numbering.
pub struct Poster<A, L, D, G, P> {
    allocator: A,
    groups: L,
    direct: D,
    directory: G,
    policy: P,
}

impl<A, L, D, G, P> Poster<A, L, D, G, P>
where
    A: GroupAllocator,
    L: GroupList,
    D: ArticleDirectStore,
    G: ArticleGroupStore,
    P: PostingPolicy,
{
    pub fn new(allocator: A, groups: L, direct: D, directory: G, policy: P) -> Self {
        Self {
            allocator,
            groups,
            direct,
            directory,
            policy,
        }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn group_list(&self) -> &L {
        &self.groups
    }

    pub fn direct(&self) -> &D {
        &self.direct
    }

    pub fn directory(&self) -> &G {
        &self.directory
    }

    /// Accepts, rejects or fails one article.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(rank = ?rank)))]
    pub async fn post(&self, raw: Bytes, rank: AuthRank) -> PostOutcome {
        let (head, body) = split_article(&raw);
        if head.is_empty() || body.is_empty() {
            return PostOutcome::FAILED;
        }
        let info = match parse_head(head) {
            Ok(info) => info,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %_e, "unparsable head");
                return PostOutcome::REJECTED;
            }
        };
        if info.message_id.is_empty() {
            return PostOutcome::FAILED;
        }

        let wanted = split_newsgroups(&info.newsgroups);
        if wanted.is_empty() {
            return PostOutcome::REJECTED;
        }
        let groups = match self.groups.filter_with_auth(rank, wanted).await {
            Ok(groups) if groups.is_empty() => return PostOutcome::REJECTED,
            Ok(groups) => groups,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "group lookup failed");
                return PostOutcome::FAILED;
            }
        };

        let numbers = match self.allocator.insert(&groups).await {
            Ok(numbers) => numbers,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "number allocation failed");
                return PostOutcome::FAILED;
            }
        };

        match self.direct.stat(&info.message_id).await {
            Ok(false) => {}
            Ok(true) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(message_id = ?info.message_id, "duplicate message-id");
                self.release(&groups, &numbers).await;
                return PostOutcome::REJECTED;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "message-id lookup failed");
                self.release(&groups, &numbers).await;
                return PostOutcome::FAILED;
            }
        }

        let lines = count_lines(&body);
        let bytes = i64::try_from(info.raw.len() + 2 + body.len()).unwrap_or(i64::MAX);
        let overview = Overview {
            subject: info.subject,
            from: info.from,
            date: info.date,
            message_id: info.message_id,
            references: info.references,
            bytes,
            lines,
        };
        let expires_at = self.policy.decide(&groups, lines, bytes);

        if let Err(_e) = self.direct.store(expires_at, &overview, info.raw, body).await {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "article write failed");
            self.release(&groups, &numbers).await;
            return PostOutcome::FAILED;
        }
        if let Err(_e) = self
            .directory
            .store_article_infos(&groups, &numbers, expires_at, &overview)
            .await
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "overview write failed");
            if let Err(_e) = self.direct.rollback(&overview.message_id).await {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %_e, "article rollback failed");
            }
            self.release(&groups, &numbers).await;
            return PostOutcome::FAILED;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(groups = groups.len(), expires_at, "article accepted");
        PostOutcome::ACCEPTED
    }

    /// Whether an article with `id` is wanted, and whether posting is
    /// possible at all.
    pub async fn check_post_id(&self, id: &[u8]) -> Result<(bool, bool)> {
        let known = self.direct.stat(id).await?;
        Ok((!known, true))
    }

    async fn release(&self, groups: &[Bytes], numbers: &[u64]) {
        if let Err(_e) = self.allocator.revert(groups, numbers).await {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %_e, groups = groups.len(), "revert failed, numbers stay allocated");
        }
    }
}
