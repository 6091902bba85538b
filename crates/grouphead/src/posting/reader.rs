use crate::{
    Article, ArticleDirectStore, ArticleGroupStore, AuthRank, GroupList, GroupStats, Result,
};
use bytes::Bytes;

/// Read-side queries spanning the group list and both article stores.
pub struct NewsReader<L, D, G> {
    groups: L,
    direct: D,
    directory: G,
}

impl<L, D, G> NewsReader<L, D, G>
where
    L: GroupList,
    D: ArticleDirectStore,
    G: ArticleGroupStore,
{
    pub fn new(groups: L, direct: D, directory: G) -> Self {
        Self {
            groups,
            direct,
            directory,
        }
    }

    /// Message-id and requested parts of the article at `number` in `group`.
    pub async fn article_by_number(
        &self,
        group: &[u8],
        number: u64,
        head: bool,
        body: bool,
    ) -> Result<Option<(Bytes, Article)>> {
        let Some(id) = self.directory.stat(group, number).await? else {
            return Ok(None);
        };
        let article = self.direct.get(&id, head, body).await?;
        Ok(article.map(|a| (id, a)))
    }

    /// Stats of `group`. Listed groups without any article report zeroes;
    /// unknown groups report `None`.
    pub async fn group_stats(&self, group: &[u8]) -> Result<Option<GroupStats>> {
        if let Some(stats) = self.directory.realtime_query(group).await? {
            return Ok(Some(stats));
        }
        let listed = self
            .groups
            .filter_with_auth(AuthRank::Feeder, vec![Bytes::copy_from_slice(group)])
            .await?;
        Ok((!listed.is_empty()).then(GroupStats::default))
    }

    /// Calls `f(group, high, low, status)` for every listed group, by name.
    pub async fn list_active<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], u64, u64, u8) + Send,
    {
        for listing in self.groups.base_list().await? {
            let stats = self
                .directory
                .realtime_query(&listing.group)
                .await?
                .unwrap_or_default();
            f(&listing.group, stats.high, stats.low, listing.status);
        }
        Ok(())
    }

    /// Calls `f(group, description)` for every listed group, by name.
    pub async fn list_descriptions<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) + Send,
    {
        for listing in self.groups.base_list().await? {
            f(&listing.group, &listing.descr);
        }
        Ok(())
    }
}
