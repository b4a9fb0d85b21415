use postkeep_core::{
    open_db_in_memory, share, Comment, CommentOnly, CommentRepository, CommentSpecs,
    CommentSummary, EntityRef, PageRequest, Post, PostRepository, RepoError, Repository, Sort,
    Specification, SqliteRepository, UnitOfWork, ValidationError,
};

fn begin() -> UnitOfWork {
    UnitOfWork::begin(share(open_db_in_memory().unwrap())).unwrap()
}

fn post_with_comments(
    posts: &PostRepository<'_>,
    title: &str,
    comments: &[(&str, u32, u32, bool)],
) -> EntityRef<Post> {
    let post = EntityRef::new(Post::new(title));
    for (body, up, down, best) in comments {
        let mut comment = Comment::new(*body).with_votes(*up, *down);
        comment.best = *best;
        Post::add_comment(&post, &EntityRef::new(comment));
    }
    posts.save(&post).unwrap()
}

fn bodies(comments: &[EntityRef<Comment>]) -> Vec<String> {
    comments
        .iter()
        .map(|comment| comment.borrow().comment.clone())
        .collect()
}

#[test]
fn saving_post_saves_its_comment() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);

    let post = EntityRef::new(Post::new("jpa"));
    let comment = EntityRef::new(Comment::new("x").with_votes(10, 1));
    Post::add_comment(&post, &comment);
    posts.save(&post).unwrap();

    let all = comments.find_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].borrow().comment, "x");
    assert_eq!(all[0].borrow().post_id, post.borrow().id);
    assert!(all[0].same_instance(&comment));
}

#[test]
fn deleting_post_deletes_all_its_comments() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);

    let post = post_with_comments(
        &posts,
        "cascade",
        &[("one", 0, 0, false), ("two", 0, 0, false), ("three", 0, 0, false)],
    );
    let other = post_with_comments(&posts, "other", &[("stays", 0, 0, false)]);
    let children = post.borrow().comments().to_vec();
    assert_eq!(comments.count().unwrap(), 4);

    posts.delete(&post).unwrap();

    assert_eq!(comments.count().unwrap(), 1);
    assert_eq!(posts.count().unwrap(), 1);
    assert!(!posts.contains(&post));
    assert!(children.iter().all(|child| !comments.contains(child)));
    assert!(post.borrow().comments().is_empty());
    assert_eq!(other.borrow().comments().len(), 1);
}

#[test]
fn deleting_post_through_generic_repository_evicts_comments() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);
    let post = post_with_comments(&posts, "plain", &[("orphan", 1, 0, false)]);
    let child = post.borrow().comments()[0].clone();

    SqliteRepository::<Post>::new(&uow).delete(&post).unwrap();

    assert!(!comments.contains(&child));
    child.borrow_mut().up = 5;
    assert_eq!(posts.count().unwrap(), 0);
    assert_eq!(comments.count().unwrap(), 0);
}

#[test]
fn moving_comment_between_posts_keeps_single_owner() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);
    let from = post_with_comments(&posts, "from", &[]);
    let to = post_with_comments(&posts, "to", &[]);

    let comment = EntityRef::new(Comment::new("travelling"));
    Post::add_comment(&from, &comment);
    posts.save(&from).unwrap();
    Post::add_comment(&to, &comment);
    posts.save(&to).unwrap();

    from.borrow_mut().title = "from, renamed".to_string();
    posts.save(&from).unwrap();

    let to_id = to.borrow().id;
    assert_eq!(comment.borrow().post_id, to_id);
    assert!(from.borrow().comments().is_empty());
    assert_eq!(to.borrow().comments().len(), 1);
    assert!(to.borrow().comments()[0].same_instance(&comment));

    posts.flush().unwrap();
    uow.clear();
    let stored = comments.find_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].borrow().post_id, to_id);
}

#[test]
fn removing_comment_through_detached_copy_unlinks_it() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);
    let managed = post_with_comments(&posts, "jpa", &[("leaving", 0, 0, false)]);
    let post_id = managed.borrow().id.unwrap();
    let comment = managed.borrow().comments()[0].clone();

    let mut copy = Post::new("jpa");
    copy.id = Some(post_id);
    let copy = EntityRef::new(copy);
    Post::add_comment(&copy, &comment);
    assert!(Post::remove_comment(&copy, &comment));

    posts.save(&copy).unwrap();

    assert!(managed.borrow().comments().is_empty());
    assert_eq!(comment.borrow().post_id, None);
    let by_post = Specification::<Comment>::eq("post_id", post_id);
    assert_eq!(comments.count_matching(&by_post).unwrap(), 0);
    assert_eq!(comments.count().unwrap(), 1);
}

#[test]
fn deleting_reloaded_post_still_removes_unloaded_comments() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);

    let post = post_with_comments(&posts, "lazy", &[("a", 0, 0, false), ("b", 0, 0, false)]);
    let id = post.borrow().id.unwrap();
    uow.clear();

    let reloaded = posts.find_by_id(id).unwrap().unwrap();
    assert!(reloaded.borrow().comments().is_empty());
    posts.delete(&reloaded).unwrap();

    assert_eq!(comments.count().unwrap(), 0);
}

#[test]
fn merging_detached_post_saves_new_comments() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);
    let managed = post_with_comments(&posts, "jpa", &[]);

    let mut detached = Post::new("jpa, revised");
    detached.id = managed.borrow().id;
    let detached = EntityRef::new(detached);
    Post::add_comment(&detached, &EntityRef::new(Comment::new("late")));

    let merged = posts.save(&detached).unwrap();

    assert!(merged.same_instance(&managed));
    assert_eq!(managed.borrow().title, "jpa, revised");
    assert_eq!(managed.borrow().comments().len(), 1);
    let all = comments.find_all().unwrap();
    assert_eq!(bodies(&all), vec!["late"]);
    assert_eq!(all[0].borrow().post_id, managed.borrow().id);
}

#[test]
fn closed_projections_read_selected_columns() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);
    let post = post_with_comments(&posts, "jpa", &[("x", 10, 1, false), ("y", 2, 3, false)]);
    post_with_comments(&posts, "other", &[("z", 0, 0, false)]);
    let post_id = post.borrow().id.unwrap();

    let summaries = comments.find_by_post_id::<CommentSummary>(post_id).unwrap();
    assert_eq!(
        summaries.iter().map(CommentSummary::votes).collect::<Vec<_>>(),
        vec!["10 1", "2 3"]
    );

    let only = comments.find_by_post_id::<CommentOnly>(post_id).unwrap();
    assert_eq!(
        only,
        vec![
            CommentOnly {
                comment: "x".to_string()
            },
            CommentOnly {
                comment: "y".to_string()
            }
        ]
    );
}

#[test]
fn specifications_compose() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);
    post_with_comments(
        &posts,
        "spec",
        &[
            ("popular", 10, 0, false),
            ("chosen", 2, 0, true),
            ("ignored", 1, 5, false),
        ],
    );

    let best_or_good = CommentSpecs::is_best().or(CommentSpecs::is_good());
    assert_eq!(comments.count_matching(&best_or_good).unwrap(), 2);

    let best_and_good = CommentSpecs::is_best().and(CommentSpecs::is_good());
    assert_eq!(comments.count_matching(&best_and_good).unwrap(), 0);

    let not_good = comments
        .find_all_matching(&CommentSpecs::is_good().not())
        .unwrap();
    assert_eq!(bodies(&not_good), vec!["chosen", "ignored"]);
}

#[test]
fn body_search_respects_case_and_paging() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);
    post_with_comments(
        &posts,
        "search",
        &[
            ("Spring Data", 5, 0, false),
            ("spring boot", 9, 0, false),
            ("hibernate", 7, 0, false),
            ("SPRING", 1, 0, false),
        ],
    );

    let exact = comments.find_by_comment_contains("Spring").unwrap();
    assert_eq!(bodies(&exact), vec!["Spring Data"]);

    let request = PageRequest::of_sorted(0, 2, Sort::desc("up"));
    let first = comments
        .find_by_comment_contains_ignore_case("spring", &request)
        .unwrap();
    assert_eq!(bodies(first.content()), vec!["spring boot", "Spring Data"]);
    assert_eq!(first.total_elements(), 3);
    assert!(first.has_next());

    let second = comments
        .find_by_comment_contains_ignore_case(
            "spring",
            &PageRequest::of_sorted(1, 2, Sort::desc("up")),
        )
        .unwrap();
    assert_eq!(bodies(second.content()), vec!["SPRING"]);
}

#[test]
fn ignore_case_body_search_folds_non_ascii_letters() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);
    post_with_comments(
        &posts,
        "unicode",
        &[("ÜBER Straße", 3, 0, false), ("uber ride", 1, 0, false)],
    );

    let request = PageRequest::of(0, 10);
    let found = comments
        .find_by_comment_contains_ignore_case("über", &request)
        .unwrap();
    assert_eq!(bodies(found.content()), vec!["ÜBER Straße"]);

    let upper = comments
        .find_by_comment_contains_ignore_case("STRASSE", &request)
        .unwrap();
    assert_eq!(upper.total_elements(), 0);

    let detached = comments
        .find_by_comment_contains_ignore_case_async("Über", &request)
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(detached.len(), 1);
    assert_eq!(detached[0].comment, "ÜBER Straße");
}

#[test]
fn up_votes_filter_is_scoped_to_post() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);
    let post = post_with_comments(
        &posts,
        "votes",
        &[("low", 1, 0, false), ("high", 20, 0, false), ("mid", 8, 0, false)],
    );
    post_with_comments(&posts, "elsewhere", &[("also high", 30, 0, false)]);
    let post_id = post.borrow().id.unwrap();

    let page = comments
        .find_by_up_greater_than_and_post(5, post_id, &PageRequest::of_sorted(0, 10, Sort::asc("up")))
        .unwrap();
    assert_eq!(bodies(page.content()), vec!["mid", "high"]);
    assert_eq!(page.total_pages(), 1);
}

#[test]
fn title_queries() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    for title in ["Spring Data JPA", "Spring Boot", "hibernate", "Spring Boot"] {
        posts.save(&EntityRef::new(Post::new(title))).unwrap();
    }

    let prefixed = posts.find_by_title_starts_with("Spring").unwrap();
    assert_eq!(prefixed.len(), 3);

    let exact = posts
        .find_by_title("Spring Boot", &Sort::desc("id"))
        .unwrap();
    assert_eq!(exact.len(), 2);
    assert!(exact[0].borrow().id > exact[1].borrow().id);

    let page = posts
        .find_by_title_contains("Boot", &PageRequest::of(0, 1))
        .unwrap();
    assert_eq!(page.number_of_elements(), 1);
    assert_eq!(page.total_elements(), 2);
    assert_eq!(posts.count_by_title_contains("a").unwrap(), 2);
}

#[test]
fn comment_is_fetched_together_with_its_post() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let comments = CommentRepository::new(&uow);
    let post = post_with_comments(&posts, "graph", &[("child", 0, 0, false)]);
    let comment_id = post.borrow().comments()[0].borrow().id.unwrap();

    let loaded = comments.get_by_id_with_post(comment_id).unwrap().unwrap();
    assert!(loaded.post.unwrap().same_instance(&post));
    assert!(comments.get_by_id_with_post(comment_id + 100).unwrap().is_none());
}

#[test]
fn oversized_comment_body_is_rejected() {
    let uow = begin();
    let posts = PostRepository::new(&uow);
    let post = EntityRef::new(Post::new("long"));
    Post::add_comment(&post, &EntityRef::new(Comment::new("c".repeat(2001))));

    let err = posts.save(&post).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::TooLong {
            field: "comment",
            max_chars: 2000,
            ..
        })
    ));
}
