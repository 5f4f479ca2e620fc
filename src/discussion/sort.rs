//! Chronological ordering of a discussion's posts.

use crate::models::{Post, SortDirection};

/// Sort posts by creation time in the given direction.
///
/// The sort is stable: posts created at the same instant keep their input
/// order, so sorting an already sorted list is a no-op.
pub fn sort_posts(posts: &mut [Post], direction: SortDirection) {
    match direction {
        SortDirection::NewestFirst => posts.sort_by(|a, b| b.created.cmp(&a.created)),
        SortDirection::OldestFirst => posts.sort_by(|a, b| a.created.cmp(&b.created)),
    }
}

#[must_use]
pub fn sorted(mut posts: Vec<Post>, direction: SortDirection) -> Vec<Post> {
    sort_posts(&mut posts, direction);
    posts
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::models::PostId;

    fn post(id: PostId, created: i64) -> Post {
        Post {
            id,
            discussion_id: 1,
            parent: Some(1),
            subject: format!("post {id}"),
            message: String::new(),
            author_id: None,
            author_name: None,
            created: DateTime::<Utc>::from_timestamp(created, 0).unwrap(),
            modified: None,
            can_reply: true,
        }
    }

    fn ids(posts: &[Post]) -> Vec<PostId> {
        posts.iter().map(|p| p.id).collect()
    }

    fn sample() -> Vec<Post> {
        vec![
            post(PostId::Remote(1), 100),
            post(PostId::Remote(2), 300),
            post(PostId::Remote(3), 200),
            post(PostId::Pending(1), 250),
        ]
    }

    #[test]
    fn test_newest_first() {
        let posts = sorted(sample(), SortDirection::NewestFirst);
        assert_eq!(
            ids(&posts),
            vec![
                PostId::Remote(2),
                PostId::Pending(1),
                PostId::Remote(3),
                PostId::Remote(1)
            ]
        );
        assert!(posts.windows(2).all(|w| w[0].created >= w[1].created));
    }

    #[test]
    fn test_oldest_first() {
        let posts = sorted(sample(), SortDirection::OldestFirst);
        assert_eq!(
            ids(&posts),
            vec![
                PostId::Remote(1),
                PostId::Remote(3),
                PostId::Pending(1),
                PostId::Remote(2)
            ]
        );
        assert!(posts.windows(2).all(|w| w[0].created <= w[1].created));
    }

    #[test]
    fn test_sort_is_idempotent() {
        for direction in [SortDirection::NewestFirst, SortDirection::OldestFirst] {
            let once = sorted(sample(), direction);
            let twice = sorted(once.clone(), direction);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_ties_keep_remote_before_local() {
        let posts = vec![
            post(PostId::Remote(5), 100),
            post(PostId::Remote(6), 100),
            post(PostId::Pending(1), 100),
        ];
        for direction in [SortDirection::NewestFirst, SortDirection::OldestFirst] {
            assert_eq!(
                ids(&sorted(posts.clone(), direction)),
                vec![PostId::Remote(5), PostId::Remote(6), PostId::Pending(1)]
            );
        }
    }
}
