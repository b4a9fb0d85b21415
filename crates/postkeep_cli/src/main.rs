//! CLI walkthrough entry point.
//!
//! # Responsibility
//! - Resolve configuration from the environment and open the database.
//! - Run the post/comment walkthrough in one unit of work and print results.
//! - Keep output deterministic for quick local sanity checks.

use log::error;
use postkeep_core::{
    init_from_config, open_configured, share, CommentSpecs, CoreConfig, DomainEventBus,
    PageRequest, PostListener, PostService, RepoResult, Repository, Sort, UnitOfWork,
};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error error={message}");
            eprintln!("postkeep: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let config = CoreConfig::from_env().map_err(|err| err.to_string())?;
    init_from_config(&config)?;
    println!("postkeep_core version={}", postkeep_core::core_version());

    let conn = open_configured(&config.database).map_err(|err| err.to_string())?;
    let uow = UnitOfWork::begin(share(conn)).map_err(|err| err.to_string())?;

    let bus = Arc::new(DomainEventBus::new());
    let listener = PostListener::new();
    listener.subscribe(&bus);

    walkthrough(&uow, Arc::clone(&bus)).map_err(|err| err.to_string())?;
    uow.commit().map_err(|err| err.to_string())?;

    for event in listener.received() {
        println!("published {event}");
    }
    Ok(())
}

fn walkthrough(uow: &UnitOfWork, bus: Arc<DomainEventBus>) -> RepoResult<()> {
    let service = PostService::new(uow, Some(bus));

    let post = service.write_post("jpa")?;
    service.comment_on(&post, "x", 10, 1)?;
    service.comment_on(&post, "Spring Data JPA rocks", 3, 0)?;
    service.publish(&post)?;
    let post_id = post.try_borrow()?.id;

    println!("posts={}", service.posts().count()?);
    println!("comments={}", service.comments().count()?);
    if let Some(post_id) = post_id {
        for summary in service.summaries(post_id)? {
            println!("comment body={} votes={}", summary.comment, summary.votes());
        }
    }

    let good = service
        .comments()
        .count_matching(&CommentSpecs::is_good())?;
    println!("good_comments={good}");

    let page = service.comments().find_by_comment_contains_ignore_case(
        "spring",
        &PageRequest::of_sorted(0, 10, Sort::desc("up")),
    )?;
    println!(
        "search matches={} pages={}",
        page.total_elements(),
        page.total_pages()
    );
    Ok(())
}
