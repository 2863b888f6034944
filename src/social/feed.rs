/// Home feed assembly
///
/// The feed covers the viewer and everyone they follow. Author ids are split
/// into chunks no larger than the in-list cap, each chunk is queried
/// concurrently, and the results are merged into one newest-first list.
use super::{FeedItem, Post, SocialStore};
use crate::error::AuraResult;
use futures::future::try_join_all;
use std::collections::HashSet;

/// Split `ids` into chunks of at most `cap`, dropping duplicates
pub fn chunk_ids(ids: &[String], cap: usize) -> Vec<Vec<String>> {
    let mut seen = HashSet::new();
    let unique: Vec<String> = ids
        .iter()
        .filter(|id| seen.insert(id.to_string()))
        .cloned()
        .collect();

    unique.chunks(cap.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// Merge per-chunk results into one list ordered `(created_at, id)` descending
pub fn merge_newest_first(chunks: Vec<Vec<Post>>, limit: usize) -> Vec<Post> {
    let mut posts: Vec<Post> = chunks.into_iter().flatten().collect();
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    posts.dedup_by(|a, b| a.id == b.id);
    posts.truncate(limit);
    posts
}

impl SocialStore {
    pub async fn home_feed(&self, viewer: &str) -> AuraResult<Vec<FeedItem>> {
        let mut authors = self.following_ids(viewer).await?;
        authors.push(viewer.to_string());

        let chunks = chunk_ids(&authors, self.limits.in_list_cap);
        let per_chunk = self.limits.feed_per_chunk;

        let results = try_join_all(
            chunks
                .iter()
                .map(|chunk| self.list_posts_by_authors(chunk, per_chunk)),
        )
        .await?;

        let posts = merge_newest_first(results, self.limits.feed_display);

        let author_ids: Vec<String> = posts.iter().map(|p| p.author_id.clone()).collect();
        let post_ids: Vec<String> = posts.iter().map(|p| p.id.clone()).collect();
        let profiles = self.get_profiles(&author_ids).await?;
        let liked = self.liked_post_ids(viewer, &post_ids).await?;

        tracing::debug!(
            viewer,
            authors = authors.len(),
            chunks = chunks.len(),
            posts = posts.len(),
            "Assembled home feed"
        );

        Ok(posts
            .into_iter()
            .filter_map(|post| {
                let author = profiles.get(&post.author_id)?.clone();
                let liked_by_viewer = liked.contains(&post.id);
                Some(FeedItem {
                    post: post.masked_for(viewer),
                    author,
                    liked_by_viewer,
                })
            })
            .collect())
    }
}
