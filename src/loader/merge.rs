//! Post merge: reconcile a fresh post list with the previous snapshot

use std::collections::{HashMap, HashSet};

use crate::models::{Loadable, Post};

/// Merge `parsed` (the server's current list) into `cached`.
///
/// Cached posts keep their position; posts the server no longer lists are
/// marked deleted (thread mode only) and new posts are appended. Posts with
/// the remove flag join `removed`, and in thread mode every `replies_from`
/// list is rebuilt without edges from deleted or removed posts.
pub fn merge(
    loadable: &Loadable,
    cached: &[Post],
    parsed: Vec<Post>,
    removed: &mut HashSet<u64>,
) -> Vec<Post> {
    let mut posts = if cached.is_empty() {
        parsed
    } else {
        let server_nos: HashSet<u64> = parsed.iter().map(|p| p.no).collect();
        let cached_nos: HashSet<u64> = cached.iter().map(|p| p.no).collect();

        let mut posts: Vec<Post> = cached.to_vec();
        if loadable.is_thread_mode() {
            for post in &mut posts {
                post.deleted = !server_nos.contains(&post.no);
            }
        }
        posts.extend(parsed.into_iter().filter(|p| !cached_nos.contains(&p.no)));
        posts
    };

    if loadable.is_thread_mode() {
        propagate_reply_filters(&mut posts);
    }

    removed.extend(posts.iter().filter(|p| p.filter.remove).map(|p| p.no));

    if loadable.is_thread_mode() {
        rebuild_replies_from(&mut posts, removed);
    }

    posts
}

/// Recompute back-edges; quotes of posts not in the list are ignored and
/// deleted or removed posts contribute none
fn rebuild_replies_from(posts: &mut [Post], removed: &HashSet<u64>) {
    let index: HashMap<u64, usize> = posts.iter().enumerate().map(|(i, p)| (p.no, i)).collect();
    let mut replies: HashMap<u64, Vec<u64>> = HashMap::new();

    for post in posts.iter() {
        if post.deleted || removed.contains(&post.no) {
            continue;
        }
        for target in &post.replies_to {
            replies.entry(*target).or_default().push(post.no);
        }
    }

    for post in posts.iter_mut() {
        post.replies_from.clear();
    }
    for (target, from) in replies {
        if let Some(&i) = index.get(&target) {
            posts[i].replies_from = from;
        }
    }
}

/// Copy stub/remove flags from posts whose filter applies to replies onto
/// every post in their reply chain that has no filter action of its own
fn propagate_reply_filters(posts: &mut [Post]) {
    let mut children: HashMap<u64, Vec<usize>> = HashMap::new();
    for (i, post) in posts.iter().enumerate() {
        for target in &post.replies_to {
            children.entry(*target).or_default().push(i);
        }
    }

    let parents: Vec<(u64, bool, bool)> = posts
        .iter()
        .filter(|p| !p.is_op && p.filter.replies && (p.filter.stub || p.filter.remove))
        .map(|p| (p.no, p.filter.stub, p.filter.remove))
        .collect();

    for (root, stub, remove) in parents {
        let mut stack = vec![root];
        let mut seen = HashSet::from([root]);
        while let Some(no) = stack.pop() {
            for &i in children.get(&no).map(Vec::as_slice).unwrap_or_default() {
                let child = &mut posts[i];
                if !seen.insert(child.no) {
                    continue;
                }
                if !child.filter.has_action() {
                    child.filter.stub = stub;
                    child.filter.remove = remove;
                    child.filter.replies = true;
                }
                stack.push(child.no);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostBuilder, PostComment};
    use crate::site::Site;

    fn post(no: u64, replies_to: &[u64]) -> Post {
        let mut b = PostBuilder::new("g", no);
        b.op = no == 1;
        b.op_id = 1;
        b.replies_to = replies_to.iter().copied().collect();
        b.build(PostComment::default())
    }

    fn thread() -> Loadable {
        Loadable::thread(Site::FourChan, "g", 1, "")
    }

    fn nos(posts: &[Post]) -> Vec<u64> {
        posts.iter().map(|p| p.no).collect()
    }

    #[test]
    fn empty_cache_takes_server_list() {
        let mut removed = HashSet::new();
        let merged = merge(&thread(), &[], vec![post(1, &[]), post(2, &[1])], &mut removed);
        assert_eq!(nos(&merged), vec![1, 2]);
        assert_eq!(merged[0].replies_from, vec![2]);
    }

    #[test]
    fn missing_posts_are_marked_deleted_and_new_ones_appended() {
        let cached = vec![post(1, &[]), post(2, &[1]), post(3, &[])];
        let server = vec![post(1, &[]), post(3, &[]), post(4, &[2, 3])];
        let mut removed = HashSet::new();
        let merged = merge(&thread(), &cached, server, &mut removed);

        assert_eq!(nos(&merged), vec![1, 2, 3, 4]);
        assert!(!merged[0].deleted);
        assert!(merged[1].deleted);
        assert!(!merged[2].deleted);
        assert!(merged[0].replies_from.is_empty());
        assert_eq!(merged[1].replies_from, vec![4]);
        assert_eq!(merged[2].replies_from, vec![4]);
    }

    #[test]
    fn reappearing_post_is_undeleted() {
        let mut gone = post(2, &[]);
        gone.deleted = true;
        let cached = vec![post(1, &[]), gone];
        let mut removed = HashSet::new();
        let merged = merge(&thread(), &cached, vec![post(1, &[]), post(2, &[])], &mut removed);
        assert!(!merged[1].deleted);
    }

    #[test]
    fn removed_posts_lose_their_back_edges() {
        let mut spam = post(3, &[1]);
        spam.filter.remove = true;
        let mut removed = HashSet::from([4]);
        let merged = merge(
            &thread(),
            &[],
            vec![post(1, &[]), post(2, &[1]), spam, post(4, &[1]), post(5, &[77])],
            &mut removed,
        );

        assert_eq!(merged[0].replies_from, vec![2]);
        assert!(removed.contains(&3));
        assert!(removed.contains(&4));
    }

    #[test]
    fn catalog_never_marks_deleted() {
        let catalog = Loadable::catalog(Site::FourChan, "g");
        let cached = vec![post(10, &[]), post(20, &[])];
        let mut removed = HashSet::new();
        let merged = merge(&catalog, &cached, vec![post(30, &[])], &mut removed);
        assert_eq!(nos(&merged), vec![10, 20, 30]);
        assert!(merged.iter().all(|p| !p.deleted));
        assert!(merged.iter().all(|p| p.replies_from.is_empty()));
    }

    #[test]
    fn reply_filters_follow_the_chain() {
        let mut hidden = post(2, &[1]);
        hidden.filter.stub = true;
        hidden.filter.replies = true;
        let mut removed = HashSet::new();
        let merged = merge(
            &thread(),
            &[],
            vec![post(1, &[]), hidden, post(3, &[2]), post(4, &[3]), post(5, &[1])],
            &mut removed,
        );

        assert!(merged[2].filter.stub);
        assert!(merged[3].filter.stub);
        assert!(!merged[4].filter.stub);
        assert!(!merged[0].filter.stub);
    }
}
