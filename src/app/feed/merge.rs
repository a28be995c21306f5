use std::cmp::Reverse;
use std::collections::HashSet;

use crate::domain::post::FeedPost;

/// Drops every post whose id was already seen, keeping first occurrences.
pub fn dedupe(posts: Vec<FeedPost>) -> Vec<FeedPost> {
    let mut seen = HashSet::with_capacity(posts.len());
    posts
        .into_iter()
        .filter(|post| seen.insert(post.id))
        .collect()
}

pub fn newest_first(posts: &mut [FeedPost]) {
    posts.sort_by_key(|post| Reverse((post.created_at, post.id)));
}

/// Builds `primary` followed by the posts of `a` and `b` taken in
/// alternating turns, skipping ids already emitted, capped at `limit`.
///
/// Each consumed post is either emitted or repeats an emitted one, so reading
/// the first `limit` posts of every source is enough, and the result for a
/// larger `limit` always extends the result for a smaller one.
pub fn interleave(
    primary: Vec<FeedPost>,
    a: Vec<FeedPost>,
    b: Vec<FeedPost>,
    limit: usize,
) -> Vec<FeedPost> {
    let mut merged = dedupe(primary);
    merged.truncate(limit);
    let mut seen: HashSet<_> = merged.iter().map(|post| post.id).collect();

    let mut sources = [a.into_iter(), b.into_iter()];
    let mut exhausted = [false, false];
    let mut turn = 0;
    while merged.len() < limit && !(exhausted[0] && exhausted[1]) {
        if !exhausted[turn] {
            match sources[turn].find(|post| !seen.contains(&post.id)) {
                Some(post) => {
                    seen.insert(post.id);
                    merged.push(post);
                }
                None => exhausted[turn] = true,
            }
        }
        turn = 1 - turn;
    }
    merged
}
